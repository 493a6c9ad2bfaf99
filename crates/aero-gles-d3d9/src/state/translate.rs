use super::types::{
    BlendEquation, BlendFactor, Color, ColorMask, CompareFunc, CullFace, FrontFace, StencilOp,
};
use crate::native::{
    D3dBlend, D3dBlendOp, D3dCompareFunc, D3dCull, D3dStencilOp, COLOR_WRITE_ALPHA,
    COLOR_WRITE_BLUE, COLOR_WRITE_GREEN, COLOR_WRITE_RED,
};

pub fn compare_func(func: CompareFunc) -> D3dCompareFunc {
    match func {
        CompareFunc::Never => D3dCompareFunc::Never,
        CompareFunc::Less => D3dCompareFunc::Less,
        CompareFunc::Equal => D3dCompareFunc::Equal,
        CompareFunc::LessEqual => D3dCompareFunc::LessEqual,
        CompareFunc::Greater => D3dCompareFunc::Greater,
        CompareFunc::NotEqual => D3dCompareFunc::NotEqual,
        CompareFunc::GreaterEqual => D3dCompareFunc::GreaterEqual,
        CompareFunc::Always => D3dCompareFunc::Always,
    }
}

pub fn blend_factor(factor: BlendFactor) -> D3dBlend {
    match factor {
        BlendFactor::Zero => D3dBlend::Zero,
        BlendFactor::One => D3dBlend::One,
        BlendFactor::SrcColor => D3dBlend::SrcColor,
        BlendFactor::OneMinusSrcColor => D3dBlend::InvSrcColor,
        BlendFactor::DstColor => D3dBlend::DestColor,
        BlendFactor::OneMinusDstColor => D3dBlend::InvDestColor,
        BlendFactor::SrcAlpha => D3dBlend::SrcAlpha,
        BlendFactor::OneMinusSrcAlpha => D3dBlend::InvSrcAlpha,
        BlendFactor::DstAlpha => D3dBlend::DestAlpha,
        BlendFactor::OneMinusDstAlpha => D3dBlend::InvDestAlpha,
        // Constant alpha is expressed by replicating alpha into the blend factor register.
        BlendFactor::ConstantColor | BlendFactor::ConstantAlpha => D3dBlend::BlendFactor,
        BlendFactor::OneMinusConstantColor | BlendFactor::OneMinusConstantAlpha => {
            D3dBlend::InvBlendFactor
        }
        BlendFactor::SrcAlphaSaturate => D3dBlend::SrcAlphaSat,
    }
}

pub fn blend_op(equation: BlendEquation) -> D3dBlendOp {
    match equation {
        BlendEquation::Add => D3dBlendOp::Add,
        BlendEquation::Subtract => D3dBlendOp::Subtract,
        BlendEquation::ReverseSubtract => D3dBlendOp::RevSubtract,
        BlendEquation::Min => D3dBlendOp::Min,
        BlendEquation::Max => D3dBlendOp::Max,
    }
}

pub fn stencil_op(op: StencilOp) -> D3dStencilOp {
    match op {
        StencilOp::Zero => D3dStencilOp::Zero,
        StencilOp::Keep => D3dStencilOp::Keep,
        StencilOp::Replace => D3dStencilOp::Replace,
        StencilOp::Incr => D3dStencilOp::IncrSat,
        StencilOp::Decr => D3dStencilOp::DecrSat,
        StencilOp::Invert => D3dStencilOp::Invert,
        StencilOp::IncrWrap => D3dStencilOp::Incr,
        StencilOp::DecrWrap => D3dStencilOp::Decr,
    }
}

/// Native cull mode. The viewport is flipped vertically, which inverts winding.
pub fn cull_mode(cull: CullFace, front_face: FrontFace) -> D3dCull {
    match (cull, front_face) {
        (CullFace::Front, FrontFace::Ccw) => D3dCull::Cw,
        (CullFace::Front, FrontFace::Cw) => D3dCull::Ccw,
        (CullFace::Back, FrontFace::Ccw) => D3dCull::Ccw,
        (CullFace::Back, FrontFace::Cw) => D3dCull::Cw,
        // Both faces culled: the draw is skipped before it reaches the device.
        (CullFace::FrontAndBack, _) => D3dCull::None,
    }
}

pub fn color_mask(mask: ColorMask) -> u32 {
    let mut bits = 0;
    if mask.red {
        bits |= COLOR_WRITE_RED;
    }
    if mask.green {
        bits |= COLOR_WRITE_GREEN;
    }
    if mask.blue {
        bits |= COLOR_WRITE_BLUE;
    }
    if mask.alpha {
        bits |= COLOR_WRITE_ALPHA;
    }
    bits
}

pub fn unorm8(value: f32) -> u32 {
    (value.clamp(0.0, 1.0) * 255.0 + 0.5) as u32
}

/// `D3DCOLOR_RGBA`: packed as ARGB.
pub fn d3d_color(color: Color) -> u32 {
    (unorm8(color.alpha) << 24)
        | (unorm8(color.red) << 16)
        | (unorm8(color.green) << 8)
        | unorm8(color.blue)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn colors_pack_as_argb() {
        assert_eq!(d3d_color(Color::new(1.0, 0.0, 0.0, 1.0)), 0xffff_0000);
        assert_eq!(d3d_color(Color::new(0.0, 0.0, 1.0, 0.5)), 0x8000_00ff);
        assert_eq!(d3d_color(Color::new(2.0, -1.0, 0.0, 0.0)), 0x00ff_0000);
    }

    #[test]
    fn cull_mode_accounts_for_flipped_winding() {
        assert_eq!(cull_mode(CullFace::Back, FrontFace::Ccw), D3dCull::Ccw);
        assert_eq!(cull_mode(CullFace::Front, FrontFace::Ccw), D3dCull::Cw);
        assert_eq!(cull_mode(CullFace::FrontAndBack, FrontFace::Cw), D3dCull::None);
    }

    #[test]
    fn wrapping_and_saturating_stencil_ops_swap_names() {
        assert_eq!(stencil_op(StencilOp::Incr), D3dStencilOp::IncrSat);
        assert_eq!(stencil_op(StencilOp::IncrWrap), D3dStencilOp::Incr);
    }

    #[test]
    fn color_mask_bits() {
        assert_eq!(color_mask(ColorMask::ALL), 0xf);
        assert_eq!(color_mask(ColorMask::NONE), 0);
        assert_eq!(
            color_mask(ColorMask {
                red: false,
                green: true,
                blue: false,
                alpha: true
            }),
            COLOR_WRITE_GREEN | COLOR_WRITE_ALPHA
        );
    }
}
