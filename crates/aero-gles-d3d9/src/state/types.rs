//! Fixed-function pipeline state as the portable API describes it.
//!
//! These are the already-validated values handed down by the context layer. Translation to
//! native render-state values lives in [`super::translate`].

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CompareFunc {
    Never,
    Less,
    Equal,
    LessEqual,
    Greater,
    NotEqual,
    GreaterEqual,
    Always,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BlendFactor {
    Zero,
    One,
    SrcColor,
    OneMinusSrcColor,
    DstColor,
    OneMinusDstColor,
    SrcAlpha,
    OneMinusSrcAlpha,
    DstAlpha,
    OneMinusDstAlpha,
    ConstantColor,
    OneMinusConstantColor,
    ConstantAlpha,
    OneMinusConstantAlpha,
    SrcAlphaSaturate,
}

impl BlendFactor {
    pub fn is_constant_alpha(self) -> bool {
        matches!(self, Self::ConstantAlpha | Self::OneMinusConstantAlpha)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BlendEquation {
    Add,
    Subtract,
    ReverseSubtract,
    Min,
    Max,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StencilOp {
    Zero,
    Keep,
    Replace,
    Incr,
    Decr,
    Invert,
    IncrWrap,
    DecrWrap,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CullFace {
    Front,
    Back,
    FrontAndBack,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FrontFace {
    Cw,
    Ccw,
}

#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct Color {
    pub red: f32,
    pub green: f32,
    pub blue: f32,
    pub alpha: f32,
}

impl Color {
    pub const fn new(red: f32, green: f32, blue: f32, alpha: f32) -> Self {
        Self {
            red,
            green,
            blue,
            alpha,
        }
    }
}

/// A window-space rectangle. Width and height may exceed the render target; they are clamped
/// when applied.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub struct Rectangle {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rectangle {
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RasterizerState {
    pub cull_face: bool,
    pub cull_mode: CullFace,
    pub front_face: FrontFace,
    pub polygon_offset_fill: bool,
    pub polygon_offset_factor: f32,
    pub polygon_offset_units: f32,
}

impl Default for RasterizerState {
    fn default() -> Self {
        Self {
            cull_face: false,
            cull_mode: CullFace::Back,
            front_face: FrontFace::Ccw,
            polygon_offset_fill: false,
            polygon_offset_factor: 0.0,
            polygon_offset_units: 0.0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ColorMask {
    pub red: bool,
    pub green: bool,
    pub blue: bool,
    pub alpha: bool,
}

impl ColorMask {
    pub const ALL: Self = Self {
        red: true,
        green: true,
        blue: true,
        alpha: true,
    };
    pub const NONE: Self = Self {
        red: false,
        green: false,
        blue: false,
        alpha: false,
    };
}

impl Default for ColorMask {
    fn default() -> Self {
        Self::ALL
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BlendState {
    pub blend: bool,
    pub source_rgb: BlendFactor,
    pub dest_rgb: BlendFactor,
    pub equation_rgb: BlendEquation,
    pub source_alpha: BlendFactor,
    pub dest_alpha: BlendFactor,
    pub equation_alpha: BlendEquation,
    pub color_mask: ColorMask,
    pub sample_alpha_to_coverage: bool,
    pub dither: bool,
}

impl BlendState {
    /// RGB and alpha use different factors or equations.
    pub fn is_separate(&self) -> bool {
        self.source_rgb != self.source_alpha
            || self.dest_rgb != self.dest_alpha
            || self.equation_rgb != self.equation_alpha
    }

    /// The native blend factor register has no alpha-only mode, so constant-alpha factors need
    /// the constant alpha replicated into every channel.
    pub fn uses_constant_alpha(&self) -> bool {
        self.source_rgb.is_constant_alpha() || self.dest_rgb.is_constant_alpha()
    }
}

impl Default for BlendState {
    fn default() -> Self {
        Self {
            blend: false,
            source_rgb: BlendFactor::One,
            dest_rgb: BlendFactor::Zero,
            equation_rgb: BlendEquation::Add,
            source_alpha: BlendFactor::One,
            dest_alpha: BlendFactor::Zero,
            equation_alpha: BlendEquation::Add,
            color_mask: ColorMask::ALL,
            sample_alpha_to_coverage: false,
            dither: true,
        }
    }
}

/// Stencil configuration for one face.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct StencilFace {
    pub func: CompareFunc,
    pub mask: u32,
    pub writemask: u32,
    pub fail: StencilOp,
    pub pass_depth_fail: StencilOp,
    pub pass_depth_pass: StencilOp,
}

impl Default for StencilFace {
    fn default() -> Self {
        Self {
            func: CompareFunc::Always,
            mask: u32::MAX,
            writemask: u32::MAX,
            fail: StencilOp::Keep,
            pass_depth_fail: StencilOp::Keep,
            pass_depth_pass: StencilOp::Keep,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DepthStencilState {
    pub depth_test: bool,
    pub depth_func: CompareFunc,
    pub depth_mask: bool,
    pub stencil_test: bool,
    pub front: StencilFace,
    pub back: StencilFace,
}

impl Default for DepthStencilState {
    fn default() -> Self {
        Self {
            depth_test: false,
            depth_func: CompareFunc::Less,
            depth_mask: true,
            stencil_test: false,
            front: StencilFace::default(),
            back: StencilFace::default(),
        }
    }
}

/// Dimensions and buffer depths of the currently bound framebuffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub struct RenderTargetInfo {
    pub width: u32,
    pub height: u32,
    pub depth_size: u32,
    pub stencil_size: u32,
}

impl RenderTargetInfo {
    /// Width and height as signed window coordinates, saturating at `i32::MAX`.
    pub fn extent(&self) -> (i32, i32) {
        (
            i32::try_from(self.width).unwrap_or(i32::MAX),
            i32::try_from(self.height).unwrap_or(i32::MAX),
        )
    }
}
