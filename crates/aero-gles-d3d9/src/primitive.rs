use std::fmt;

use crate::error::BackendError;
use crate::native::D3dPrimitiveType;

/// Draw modes of the portable API.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DrawMode {
    Points,
    Lines,
    LineLoop,
    LineStrip,
    Triangles,
    TriangleStrip,
    TriangleFan,
}

impl fmt::Display for DrawMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DrawMode::Points => "points",
            DrawMode::Lines => "lines",
            DrawMode::LineLoop => "line_loop",
            DrawMode::LineStrip => "line_strip",
            DrawMode::Triangles => "triangles",
            DrawMode::TriangleStrip => "triangle_strip",
            DrawMode::TriangleFan => "triangle_fan",
        };
        f.write_str(s)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PrimitiveTranslation {
    pub primitive: D3dPrimitiveType,
    pub primitive_count: u32,
}

/// Native primitive type and primitive count for `vertex_count` vertices drawn as `mode`.
///
/// Line loops have no native equivalent; the caller closes the loop with an index buffer and
/// draws a line strip instead.
pub fn translate_draw_mode(
    mode: DrawMode,
    vertex_count: u32,
) -> Result<PrimitiveTranslation, BackendError> {
    let (primitive, primitive_count) = match mode {
        DrawMode::Points => (D3dPrimitiveType::PointList, vertex_count),
        DrawMode::Lines => (D3dPrimitiveType::LineList, vertex_count / 2),
        DrawMode::LineStrip => (D3dPrimitiveType::LineStrip, vertex_count.saturating_sub(1)),
        DrawMode::Triangles => (D3dPrimitiveType::TriangleList, vertex_count / 3),
        DrawMode::TriangleStrip => (
            D3dPrimitiveType::TriangleStrip,
            vertex_count.saturating_sub(2),
        ),
        DrawMode::TriangleFan => (D3dPrimitiveType::TriangleFan, vertex_count.saturating_sub(2)),
        DrawMode::LineLoop => {
            return Err(BackendError::UnsupportedConfiguration(format!(
                "{mode} must be expanded to an indexed line strip"
            )))
        }
    };
    Ok(PrimitiveTranslation {
        primitive,
        primitive_count,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitive_counts() {
        let count = |mode, n| translate_draw_mode(mode, n).unwrap().primitive_count;
        assert_eq!(count(DrawMode::Points, 5), 5);
        assert_eq!(count(DrawMode::Lines, 5), 2);
        assert_eq!(count(DrawMode::LineStrip, 5), 4);
        assert_eq!(count(DrawMode::Triangles, 7), 2);
        assert_eq!(count(DrawMode::TriangleStrip, 5), 3);
        assert_eq!(count(DrawMode::TriangleFan, 1), 0);
        assert_eq!(count(DrawMode::LineStrip, 0), 0);
    }

    #[test]
    fn line_loop_is_rejected() {
        assert!(matches!(
            translate_draw_mode(DrawMode::LineLoop, 4),
            Err(BackendError::UnsupportedConfiguration(_))
        ));
    }
}
