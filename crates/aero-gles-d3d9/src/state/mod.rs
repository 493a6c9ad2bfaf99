mod cache;
pub mod translate;
mod types;

pub use cache::{StateCache, ViewportMapping};
pub use types::{
    BlendEquation, BlendFactor, BlendState, Color, ColorMask, CompareFunc, CullFace,
    DepthStencilState, FrontFace, RasterizerState, Rectangle, RenderTargetInfo, StencilFace,
    StencilOp,
};
