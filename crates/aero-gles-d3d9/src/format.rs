//! Abstract (portable API) format selection and multisample fallback.

use hashbrown::HashMap;
use tracing::debug;

use crate::device::DeviceManager;
use crate::error::BackendError;
use crate::native::{NativeDriver, NativeFormat, SampleCount};

/// Sized internal formats of the portable API that reach this layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AbstractFormat {
    Rgba8,
    Bgra8,
    Rgb8,
    Rgb565,
    Rgba4,
    Rgb5A1,
    Alpha8,
    Luminance8,
    LuminanceAlpha8,
    Rgba32F,
    Rgb32F,
    Alpha32F,
    Luminance32F,
    LuminanceAlpha32F,
    Rgba16F,
    Rgb16F,
    Alpha16F,
    Luminance16F,
    LuminanceAlpha16F,
    CompressedRgbDxt1,
    CompressedRgbaDxt1,
    CompressedRgbaDxt3,
    CompressedRgbaDxt5,
    /// ETC1 has no native equivalent on this device generation.
    CompressedEtc1Rgb8,
    DepthComponent16,
    DepthComponent32,
    Depth24Stencil8,
    StencilIndex8,
}

impl AbstractFormat {
    pub fn is_depth_or_stencil(self) -> bool {
        matches!(
            self,
            Self::DepthComponent16
                | Self::DepthComponent32
                | Self::Depth24Stencil8
                | Self::StencilIndex8
        )
    }

    fn is_float32(self) -> bool {
        matches!(
            self,
            Self::Rgba32F
                | Self::Rgb32F
                | Self::Alpha32F
                | Self::Luminance32F
                | Self::LuminanceAlpha32F
        )
    }

    fn is_float16(self) -> bool {
        matches!(
            self,
            Self::Rgba16F
                | Self::Rgb16F
                | Self::Alpha16F
                | Self::Luminance16F
                | Self::LuminanceAlpha16F
        )
    }
}

/// Renderbuffer formats whose multisample support determines the advertised maximum.
const RENDERBUFFER_FORMATS: [AbstractFormat; 6] = [
    AbstractFormat::Rgba8,
    AbstractFormat::Rgb8,
    AbstractFormat::Rgb565,
    AbstractFormat::Rgba4,
    AbstractFormat::Rgb5A1,
    AbstractFormat::Depth24Stencil8,
];

/// Per-format multisample support, indexed by sample count.
type SampleSupport = [bool; SampleCount::MAX.0 as usize + 1];

/// Maps abstract format and sample-count requests onto native equivalents.
#[derive(Debug, Default)]
pub struct ResourceTranslator {
    multisample: HashMap<NativeFormat, SampleSupport>,
}

impl ResourceTranslator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Native storage format for a texture of `format`. Independent of device capabilities: the
    /// caller checks the capability surface before creating the resource.
    pub fn translate_format(&self, format: AbstractFormat) -> Result<NativeFormat, BackendError> {
        use AbstractFormat as F;

        let native = match format {
            F::DepthComponent16 | F::DepthComponent32 | F::Depth24Stencil8 => NativeFormat::Intz,
            F::CompressedRgbDxt1 | F::CompressedRgbaDxt1 => NativeFormat::Dxt1,
            F::CompressedRgbaDxt3 => NativeFormat::Dxt3,
            F::CompressedRgbaDxt5 => NativeFormat::Dxt5,
            f if f.is_float32() => NativeFormat::A32B32G32R32F,
            f if f.is_float16() => NativeFormat::A16B16G16R16F,
            F::Luminance8 => NativeFormat::L8,
            F::LuminanceAlpha8 => NativeFormat::A8L8,
            F::Rgb8 | F::Rgb565 => NativeFormat::X8R8G8B8,
            F::Rgba8 | F::Bgra8 | F::Rgba4 | F::Rgb5A1 | F::Alpha8 => NativeFormat::A8R8G8B8,
            // ETC1 and stencil-only textures.
            _ => return Err(BackendError::UnsupportedFormat(format)),
        };
        Ok(native)
    }

    /// Native surface format for a renderbuffer of `format`.
    pub fn translate_renderbuffer_format(
        &self,
        format: AbstractFormat,
    ) -> Result<NativeFormat, BackendError> {
        use AbstractFormat as F;

        match format {
            F::Rgba4 | F::Rgb5A1 | F::Rgba8 | F::Bgra8 => Ok(NativeFormat::A8R8G8B8),
            F::Rgb565 => Ok(NativeFormat::R5G6B5),
            F::Rgb8 => Ok(NativeFormat::X8R8G8B8),
            F::DepthComponent16 | F::DepthComponent32 | F::Depth24Stencil8 | F::StencilIndex8 => {
                Ok(NativeFormat::D24S8)
            }
            _ => Err(BackendError::UnsupportedFormat(format)),
        }
    }

    /// Largest sample count supported for `format` that does not exceed `requested`.
    ///
    /// Returns [`SampleCount::NONE`] when nothing qualifies. Support is probed once per format and
    /// cached until [`Self::clear_multisample_cache`].
    pub fn nearest_supported_sample_count<D: NativeDriver>(
        &mut self,
        device: &DeviceManager<D>,
        format: NativeFormat,
        requested: SampleCount,
    ) -> SampleCount {
        let support = self.sample_support(device, format);
        let upper = requested.get().min(SampleCount::MAX.get());
        // 1 is the non-maskable type and never offered.
        (2..=upper)
            .rev()
            .find(|&count| support[count as usize])
            .map_or(SampleCount::NONE, SampleCount)
    }

    /// Maximum sample count over every renderable format.
    pub fn max_supported_samples<D: NativeDriver>(
        &mut self,
        device: &DeviceManager<D>,
    ) -> SampleCount {
        let mut max = SampleCount::NONE;
        for format in RENDERBUFFER_FORMATS {
            let Ok(native) = self.translate_renderbuffer_format(format) else {
                continue;
            };
            max = max.max(self.nearest_supported_sample_count(device, native, SampleCount::MAX));
        }
        max
    }

    /// Forget probed multisample support. Called after the device is reset or recreated.
    pub fn clear_multisample_cache(&mut self) {
        self.multisample.clear();
    }

    fn sample_support<D: NativeDriver>(
        &mut self,
        device: &DeviceManager<D>,
        format: NativeFormat,
    ) -> &SampleSupport {
        self.multisample.entry(format).or_insert_with(|| {
            let driver = device.driver();
            let config = device.config();
            let mut support = [false; SampleCount::MAX.0 as usize + 1];
            support[0] = true;
            for count in 2..=SampleCount::MAX.get() {
                support[count as usize] = driver.check_multisample(
                    config.adapter,
                    config.device_type,
                    format,
                    SampleCount(count),
                );
            }
            debug!(?format, ?support, "probed multisample support");
            support
        })
    }
}
