//! Capability probing.
//!
//! Capabilities are read once per `initialize`/`reset_device` cycle and are read-only for every
//! other component until the next reset.

use crate::native::{
    AdapterIdentifier, DeclTypeCaps, DevCaps2, DeviceType, FormatUsage, NativeCaps, NativeDriver,
    NativeFormat, PresentIntervals, RasterCaps, ResourceType, SampleCount, ShaderVersion,
    TextureCaps,
};

pub const VENDOR_ID_AMD: u32 = 0x1002;
pub const VENDOR_ID_INTEL: u32 = 0x8086;
pub const VENDOR_ID_NVIDIA: u32 = 0x10DE;

/// Coarse shader-model tier, derived from the pixel shader version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ShaderModel {
    Sm2,
    Sm3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FloatTextureSupport {
    pub supported: bool,
    pub filtering: bool,
    pub renderable: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FormatSupport {
    pub dxt1: bool,
    pub dxt3: bool,
    pub dxt5: bool,
    pub float32: FloatTextureSupport,
    pub float16: FloatTextureSupport,
    pub luminance: bool,
    pub luminance_alpha: bool,
    pub depth_texture: bool,
    pub vertex_texture: bool,
}

/// Probed capabilities of the current device.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceCaps {
    pub adapter: AdapterIdentifier,
    pub shader_model: ShaderModel,
    pub max_texture_width: u32,
    pub max_texture_height: u32,
    pub texture_filter_anisotropy: bool,
    pub max_anisotropy: f32,
    pub max_point_size: f32,
    pub non_power_of_two_textures: bool,
    pub instancing: bool,
    pub index_u32: bool,
    pub decl_types: DeclTypeCaps,
    pub min_swap_interval: i32,
    pub max_swap_interval: i32,
    pub formats: FormatSupport,
    pub event_queries: bool,
    pub occlusion_queries: bool,
    pub share_handles: bool,
    pub max_supported_samples: SampleCount,
}

/// Reasons a device is below the minimum feature level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapsRejection {
    NoStretchRectFromTextures,
    PixelShaderBelow2_0(ShaderVersion),
}

impl std::fmt::Display for CapsRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoStretchRectFromTextures => {
                f.write_str("device cannot StretchRect from textures (DirectX 8 driver)")
            }
            Self::PixelShaderBelow2_0(v) => {
                write!(f, "pixel shader version {}.{} is below 2.0", v.major, v.minor)
            }
        }
    }
}

/// Reject devices that cannot run the back-end at all.
pub fn check_minimum(native: &NativeCaps) -> Result<(), CapsRejection> {
    if !native
        .dev_caps2
        .contains(DevCaps2::CAN_STRETCHRECT_FROM_TEXTURES)
    {
        return Err(CapsRejection::NoStretchRectFromTextures);
    }
    if native.pixel_shader_version < ShaderVersion::new(2, 0) {
        return Err(CapsRejection::PixelShaderBelow2_0(native.pixel_shader_version));
    }
    Ok(())
}

/// Map advertised presentation intervals to `[min, max]` swap-interval bounds.
pub fn swap_interval_bounds(intervals: PresentIntervals) -> (i32, i32) {
    let mut min = 4;
    let mut max = 0;
    for (bit, interval) in [
        (PresentIntervals::IMMEDIATE, 0),
        (PresentIntervals::ONE, 1),
        (PresentIntervals::TWO, 2),
        (PresentIntervals::THREE, 3),
        (PresentIntervals::FOUR, 4),
    ] {
        if intervals.contains(bit) {
            min = min.min(interval);
            max = max.max(interval);
        }
    }
    if min > max {
        // Nothing advertised: behave as vsync-only.
        return (1, 1);
    }
    (min, max)
}

pub(crate) struct ProbeInput<'a, D: NativeDriver> {
    pub driver: &'a D,
    pub adapter: u32,
    pub device_type: DeviceType,
    pub native: &'a NativeCaps,
    pub identifier: AdapterIdentifier,
    pub extended: bool,
}

impl DeviceCaps {
    /// Derive the capability surface from raw caps plus per-format queries.
    ///
    /// Query support and the multisample maximum need a live device and are filled in by the
    /// device manager afterwards.
    pub(crate) fn probe<D: NativeDriver>(input: ProbeInput<'_, D>) -> Self {
        let ProbeInput {
            driver,
            adapter,
            device_type,
            native,
            identifier,
            extended,
        } = input;

        let check = |usage: FormatUsage, resource: ResourceType, format: NativeFormat| {
            driver.check_device_format(adapter, device_type, usage, resource, format)
        };
        let texture = |usage: FormatUsage, format: NativeFormat| {
            check(usage, ResourceType::Texture, format)
                && check(usage, ResourceType::CubeTexture, format)
        };
        let float_support = |format: NativeFormat| {
            let filtering = texture(FormatUsage::QUERY_FILTER, format);
            let renderable = texture(FormatUsage::RENDER_TARGET, format);
            let supported = filtering || renderable || texture(FormatUsage::empty(), format);
            FloatTextureSupport {
                supported,
                filtering,
                renderable,
            }
        };

        let shader_model = if native.pixel_shader_version >= ShaderVersion::new(3, 0) {
            ShaderModel::Sm3
        } else {
            ShaderModel::Sm2
        };

        let formats = FormatSupport {
            dxt1: check(FormatUsage::empty(), ResourceType::Texture, NativeFormat::Dxt1),
            dxt3: check(FormatUsage::empty(), ResourceType::Texture, NativeFormat::Dxt3),
            dxt5: check(FormatUsage::empty(), ResourceType::Texture, NativeFormat::Dxt5),
            float32: float_support(NativeFormat::A32B32G32R32F),
            float16: float_support(NativeFormat::A16B16G16R16F),
            luminance: check(FormatUsage::empty(), ResourceType::Texture, NativeFormat::L8),
            luminance_alpha: check(FormatUsage::empty(), ResourceType::Texture, NativeFormat::A8L8),
            depth_texture: check(
                FormatUsage::DEPTH_STENCIL,
                ResourceType::Texture,
                NativeFormat::Intz,
            ),
            vertex_texture: shader_model >= ShaderModel::Sm3
                && check(
                    FormatUsage::QUERY_VERTEX_TEXTURE,
                    ResourceType::Texture,
                    NativeFormat::R16F,
                ),
        };

        let non_power_of_two_textures = !native.texture_caps.intersects(
            TextureCaps::POW2 | TextureCaps::CUBEMAP_POW2 | TextureCaps::NON_POW2_CONDITIONAL,
        );
        // Must support at least 2:1 for anisotropic filtering to be advertised.
        let texture_filter_anisotropy =
            native.raster_caps.contains(RasterCaps::ANISOTROPY) && native.max_anisotropy >= 2;
        let (min_swap_interval, max_swap_interval) =
            swap_interval_bounds(native.presentation_intervals);

        Self {
            share_handles: extended && device_type == DeviceType::Hardware,
            adapter: identifier,
            shader_model,
            max_texture_width: native.max_texture_width,
            max_texture_height: native.max_texture_height,
            texture_filter_anisotropy,
            max_anisotropy: if texture_filter_anisotropy {
                native.max_anisotropy as f32
            } else {
                1.0
            },
            max_point_size: native.max_point_size,
            non_power_of_two_textures,
            instancing: shader_model >= ShaderModel::Sm3,
            index_u32: native.max_vertex_index >= (1 << 16),
            decl_types: native.decl_types,
            min_swap_interval,
            max_swap_interval,
            formats,
            event_queries: false,
            occlusion_queries: false,
            max_supported_samples: SampleCount::NONE,
        }
    }

    pub fn vendor_id(&self) -> u32 {
        self.adapter.vendor_id
    }

    /// Some AMD drivers corrupt later draws after a draw with an all-zero colour write mask.
    pub fn zero_color_mask_allowed(&self) -> bool {
        self.vendor_id() != VENDOR_ID_AMD
    }

    pub fn clamp_swap_interval(&self, requested: i32) -> i32 {
        requested.clamp(self.min_swap_interval, self.max_swap_interval)
    }
}
