//! Plain data exchanged with the native device: handles, D3D9 render-state ids and values,
//! formats and capability bits.

use bitflags::bitflags;
use thiserror::Error;

macro_rules! native_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u32);

        impl $name {
            pub fn raw(self) -> u32 {
                self.0
            }
        }
    };
}

native_handle!(
    /// `IDirect3DVertexShader9`.
    VertexShaderHandle
);
native_handle!(
    /// `IDirect3DPixelShader9`.
    PixelShaderHandle
);
native_handle!(
    /// `IDirect3DVertexDeclaration9`.
    VertexDeclarationHandle
);
native_handle!(
    /// `IDirect3DQuery9`.
    QueryHandle
);
native_handle!(
    /// `IDirect3DSurface9`, owned by render-target objects outside this crate.
    SurfaceHandle
);
native_handle!(
    /// `IDirect3DVertexBuffer9`, owned by the vertex data manager outside this crate.
    VertexBufferHandle
);

/// HRESULT-style failure codes reported by the native API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum NativeError {
    #[error("out of video memory")]
    OutOfVideoMemory,
    #[error("out of memory")]
    OutOfMemory,
    #[error("device lost")]
    DeviceLost,
    #[error("device lost and ready to be reset")]
    DeviceNotReset,
    #[error("device removed")]
    DeviceRemoved,
    #[error("not available")]
    NotAvailable,
    #[error("invalid call")]
    InvalidCall,
    #[error("driver internal error")]
    DriverInternal,
}

impl NativeError {
    pub fn is_device_lost(self) -> bool {
        matches!(
            self,
            Self::DeviceLost | Self::DeviceNotReset | Self::DeviceRemoved | Self::DriverInternal
        )
    }

    pub fn is_out_of_memory(self) -> bool {
        matches!(self, Self::OutOfVideoMemory | Self::OutOfMemory)
    }
}

/// Result of `TestCooperativeLevel` / `CheckDeviceState`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CooperativeLevel {
    #[default]
    Ok,
    /// Lost, and the driver is not ready for a reset yet.
    Lost,
    /// Lost, and a reset may be issued now.
    NotReset,
    Hung,
    Removed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DeviceType {
    #[default]
    Hardware,
    /// Software reference rasterizer.
    Reference,
}

bitflags! {
    /// `D3DCREATE_*` behavior flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BehaviorFlags: u32 {
        const FPU_PRESERVE = 0x0000_0002;
        const PURE_DEVICE = 0x0000_0010;
        const SOFTWARE_VERTEX_PROCESSING = 0x0000_0020;
        const HARDWARE_VERTEX_PROCESSING = 0x0000_0040;
        const NO_WINDOW_CHANGES = 0x0000_0800;
    }
}

bitflags! {
    /// `D3DPRESENT_INTERVAL_*` bits advertised by the device.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct PresentIntervals: u32 {
        const ONE = 0x0000_0001;
        const TWO = 0x0000_0002;
        const THREE = 0x0000_0004;
        const FOUR = 0x0000_0008;
        const IMMEDIATE = 0x8000_0000;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct RasterCaps: u32 {
        const SCISSOR_TEST = 0x0100_0000;
        const SLOPE_SCALE_DEPTH_BIAS = 0x0200_0000;
        const DEPTH_BIAS = 0x0400_0000;
        const ANISOTROPY = 0x0002_0000;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct TextureCaps: u32 {
        const POW2 = 0x0000_0002;
        const NON_POW2_CONDITIONAL = 0x0000_0100;
        const CUBEMAP_POW2 = 0x0002_0000;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct DevCaps2: u32 {
        const STREAM_OFFSET = 0x0000_0001;
        const CAN_STRETCHRECT_FROM_TEXTURES = 0x0000_0010;
    }
}

bitflags! {
    /// `D3DDTCAPS_*`: optional vertex declaration types.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct DeclTypeCaps: u32 {
        const UBYTE4 = 0x0001;
        const UBYTE4N = 0x0002;
        const SHORT2N = 0x0004;
        const SHORT4N = 0x0008;
        const USHORT2N = 0x0010;
        const USHORT4N = 0x0020;
        const UDEC3 = 0x0040;
        const DEC3N = 0x0080;
        const FLOAT16_2 = 0x0100;
        const FLOAT16_4 = 0x0200;
    }
}

bitflags! {
    /// `D3DUSAGE_*` bits used with `CheckDeviceFormat`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct FormatUsage: u32 {
        const RENDER_TARGET = 0x0000_0001;
        const DEPTH_STENCIL = 0x0000_0002;
        const QUERY_FILTER = 0x0002_0000;
        const QUERY_VERTEX_TEXTURE = 0x0010_0000;
    }
}

bitflags! {
    /// `D3DUSAGE_*` bits a resource is created with.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ResourceUsage: u32 {
        const RENDER_TARGET = 0x0000_0001;
        const DEPTH_STENCIL = 0x0000_0002;
        const WRITE_ONLY = 0x0000_0008;
        const DYNAMIC = 0x0000_0200;
    }
}

/// `D3DPOOL`: where a resource lives. `Default` resources die with a device reset; `Managed`
/// ones are restored by the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum MemoryPool {
    Default = 0,
    Managed = 1,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceType {
    Surface,
    Texture,
    CubeTexture,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ShaderVersion {
    pub major: u8,
    pub minor: u8,
}

impl ShaderVersion {
    pub const fn new(major: u8, minor: u8) -> Self {
        Self { major, minor }
    }
}

/// The subset of `D3DCAPS9` this back-end consumes.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NativeCaps {
    pub vertex_shader_version: ShaderVersion,
    pub pixel_shader_version: ShaderVersion,
    pub max_texture_width: u32,
    pub max_texture_height: u32,
    pub max_anisotropy: u32,
    pub max_vertex_index: u32,
    pub max_point_size: f32,
    pub raster_caps: RasterCaps,
    pub texture_caps: TextureCaps,
    pub dev_caps2: DevCaps2,
    pub presentation_intervals: PresentIntervals,
    pub decl_types: DeclTypeCaps,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AdapterIdentifier {
    pub vendor_id: u32,
    pub device_id: u32,
    pub description: String,
    /// `DeviceIdentifier` GUID, as raw bytes.
    pub identifier: [u8; 16],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapEffect {
    Discard,
    Copy,
}

/// `D3DPRESENT_PARAMETERS` for the hidden device window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresentParameters {
    pub back_buffer_width: u32,
    pub back_buffer_height: u32,
    pub back_buffer_format: NativeFormat,
    pub windowed: bool,
    pub swap_effect: SwapEffect,
    pub presentation_interval: PresentIntervals,
}

impl Default for PresentParameters {
    fn default() -> Self {
        // The device only ever renders to swap chains and textures created later, so the implicit
        // back buffer is kept as small as the runtime allows.
        Self {
            back_buffer_width: 1,
            back_buffer_height: 1,
            back_buffer_format: NativeFormat::Unknown,
            windowed: true,
            swap_effect: SwapEffect::Discard,
            presentation_interval: PresentIntervals::IMMEDIATE,
        }
    }
}

/// `D3DFORMAT` values this back-end can select.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NativeFormat {
    Unknown,
    A8R8G8B8,
    X8R8G8B8,
    R5G6B5,
    A1R5G5B5,
    A4R4G4B4,
    A8,
    L8,
    A8L8,
    R16F,
    R32F,
    A16B16G16R16F,
    A32B32G32R32F,
    D16,
    D24S8,
    D32,
    Intz,
    Dxt1,
    Dxt3,
    Dxt5,
}

/// `D3DMULTISAMPLE_TYPE` as a sample count. `0` means no multisampling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SampleCount(pub u32);

impl SampleCount {
    pub const NONE: SampleCount = SampleCount(0);
    /// `D3DMULTISAMPLE_NONMASKABLE`: never offered to callers as a sample count.
    pub const NON_MASKABLE: SampleCount = SampleCount(1);
    pub const MAX: SampleCount = SampleCount(16);

    pub fn get(self) -> u32 {
        self.0
    }

    pub fn is_multisampled(self) -> bool {
        self.0 > Self::NON_MASKABLE.0
    }
}

/// `D3DRENDERSTATETYPE` ids issued by this back-end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u32)]
pub enum RenderState {
    ZEnable = 7,
    FillMode = 8,
    ZWriteEnable = 14,
    AlphaTestEnable = 15,
    LastPixel = 16,
    SrcBlend = 19,
    DestBlend = 20,
    CullMode = 22,
    ZFunc = 23,
    DitherEnable = 26,
    AlphaBlendEnable = 27,
    StencilEnable = 52,
    StencilFail = 53,
    StencilZFail = 54,
    StencilPass = 55,
    StencilFunc = 56,
    StencilRef = 57,
    StencilMask = 58,
    StencilWriteMask = 59,
    Lighting = 137,
    ClipPlaneEnable = 152,
    PointSpriteEnable = 156,
    MultisampleAntialias = 161,
    MultisampleMask = 162,
    PointSizeMax = 166,
    ColorWriteEnable = 168,
    BlendOp = 171,
    ScissorTestEnable = 174,
    SlopeScaleDepthBias = 175,
    TwoSidedStencilMode = 185,
    CcwStencilFail = 186,
    CcwStencilZFail = 187,
    CcwStencilPass = 188,
    CcwStencilFunc = 189,
    BlendFactor = 193,
    DepthBias = 195,
    SeparateAlphaBlendEnable = 206,
    SrcBlendAlpha = 207,
    DestBlendAlpha = 208,
    BlendOpAlpha = 209,
}

impl RenderState {
    pub fn id(self) -> u32 {
        self as u32
    }
}

pub const TRUE: u32 = 1;
pub const FALSE: u32 = 0;

/// `D3DZB_*`.
pub const ZB_TRUE: u32 = 1;
pub const ZB_FALSE: u32 = 0;

/// `D3DFILL_SOLID`.
pub const FILL_SOLID: u32 = 3;

/// `D3DCOLORWRITEENABLE_*`.
pub const COLOR_WRITE_RED: u32 = 0x1;
pub const COLOR_WRITE_GREEN: u32 = 0x2;
pub const COLOR_WRITE_BLUE: u32 = 0x4;
pub const COLOR_WRITE_ALPHA: u32 = 0x8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum D3dCompareFunc {
    Never = 1,
    Less = 2,
    Equal = 3,
    LessEqual = 4,
    Greater = 5,
    NotEqual = 6,
    GreaterEqual = 7,
    Always = 8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum D3dBlend {
    Zero = 1,
    One = 2,
    SrcColor = 3,
    InvSrcColor = 4,
    SrcAlpha = 5,
    InvSrcAlpha = 6,
    DestAlpha = 7,
    InvDestAlpha = 8,
    DestColor = 9,
    InvDestColor = 10,
    SrcAlphaSat = 11,
    BlendFactor = 14,
    InvBlendFactor = 15,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum D3dBlendOp {
    Add = 1,
    Subtract = 2,
    RevSubtract = 3,
    Min = 4,
    Max = 5,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum D3dStencilOp {
    Keep = 1,
    Zero = 2,
    Replace = 3,
    IncrSat = 4,
    DecrSat = 5,
    Invert = 6,
    Incr = 7,
    Decr = 8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum D3dCull {
    None = 1,
    Cw = 2,
    Ccw = 3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum D3dPrimitiveType {
    PointList = 1,
    LineList = 2,
    LineStrip = 3,
    TriangleList = 4,
    TriangleStrip = 5,
    TriangleFan = 6,
}

/// `RECT`, in render-target pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct NativeRect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

/// `D3DVIEWPORT9`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct NativeViewport {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub min_z: f32,
    pub max_z: f32,
}

/// `D3DSTREAMSOURCE_*` frequency setting for one stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamFrequency {
    /// Non-instanced (`1`).
    Default,
    /// `D3DSTREAMSOURCE_INDEXEDDATA | instances`.
    IndexedData(u32),
    /// `D3DSTREAMSOURCE_INSTANCEDATA | divisor`.
    InstanceData(u32),
}

impl StreamFrequency {
    pub const INDEXED_DATA: u32 = 1 << 30;
    pub const INSTANCE_DATA: u32 = 2 << 30;

    pub fn to_raw(self) -> u32 {
        match self {
            Self::Default => 1,
            Self::IndexedData(instances) => Self::INDEXED_DATA | instances,
            Self::InstanceData(divisor) => Self::INSTANCE_DATA | divisor,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryKind {
    Event,
    Occlusion,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStatus {
    Signaled,
    Pending,
}

bitflags! {
    /// `D3DCLEAR_*`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ClearFlags: u32 {
        const TARGET = 0x1;
        const ZBUFFER = 0x2;
        const STENCIL = 0x4;
    }
}

/// `D3DFVF_XYZRHW | D3DFVF_DIFFUSE`: pre-transformed position plus a packed colour.
pub const FVF_XYZRHW_DIFFUSE: u32 = 0x004 | 0x040;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_frequency_encodes_d3d_bits() {
        assert_eq!(StreamFrequency::Default.to_raw(), 1);
        assert_eq!(StreamFrequency::IndexedData(100).to_raw(), 0x4000_0064);
        assert_eq!(StreamFrequency::InstanceData(2).to_raw(), 0x8000_0002);
    }

    #[test]
    fn non_maskable_is_not_multisampled() {
        assert!(!SampleCount::NONE.is_multisampled());
        assert!(!SampleCount::NON_MASKABLE.is_multisampled());
        assert!(SampleCount(2).is_multisampled());
    }
}
