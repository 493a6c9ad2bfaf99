use std::sync::Arc;

use tracing::debug;

use super::translate;
use super::types::{
    BlendState, Color, ColorMask, DepthStencilState, FrontFace, RasterizerState, Rectangle,
    RenderTargetInfo,
};
use crate::error::BackendError;
use crate::native::{
    D3dBlend, D3dBlendOp, D3dCull, NativeDevice, NativeRect, NativeViewport, RenderState,
    COLOR_WRITE_GREEN, FALSE, TRUE, ZB_FALSE, ZB_TRUE,
};
use crate::stats::BackendStats;

/// Shader constants derived from the viewport, consumed by the generated shaders.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportMapping {
    pub viewport: NativeViewport,
    /// `dx_HalfPixelSize`: one pixel in clip space, y flipped.
    pub half_pixel_size: [f32; 2],
    /// `dx_FragCoord` transform: half extent and centre of the requested viewport.
    pub frag_coord: [f32; 4],
    /// `dx_DepthFront`: `[(far - near) / 2, (near + far) / 2, far - near]`.
    pub depth_front: [f32; 3],
    /// `gl_DepthRange`: `[near, far, far - near]`.
    pub depth_range: [f32; 3],
}

#[derive(Debug, Clone, Copy)]
struct ForceFlags {
    rasterizer: bool,
    blend: bool,
    depth_stencil: bool,
    scissor: bool,
    viewport: bool,
}

impl ForceFlags {
    const ALL: Self = Self {
        rasterizer: true,
        blend: true,
        depth_stencil: true,
        scissor: true,
        viewport: true,
    };
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct AppliedBlend {
    state: BlendState,
    color: Color,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct AppliedDepthStencil {
    state: DepthStencilState,
    stencil_ref: i32,
    stencil_back_ref: i32,
    front_face_ccw: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct AppliedViewport {
    rect: Rectangle,
    near: f32,
    far: f32,
}

/// Counts native calls issued while applying one state group.
struct StateWriter<'a, Dev> {
    device: &'a mut Dev,
    calls: u64,
}

impl<'a, Dev: NativeDevice> StateWriter<'a, Dev> {
    fn new(device: &'a mut Dev) -> Self {
        Self { device, calls: 0 }
    }

    fn set(&mut self, state: RenderState, value: u32) {
        self.device.set_render_state(state, value);
        self.calls += 1;
    }

    fn enable(&mut self, state: RenderState, enabled: bool) {
        self.set(state, if enabled { TRUE } else { FALSE });
    }

    fn scissor_rect(&mut self, rect: NativeRect) {
        self.device.set_scissor_rect(rect);
        self.calls += 1;
    }

    fn viewport(&mut self, viewport: NativeViewport) {
        self.device.set_viewport(viewport);
        self.calls += 1;
    }
}

/// Last fixed-function state applied to the native device, per group.
///
/// Every `apply_*` compares the desired state with the snapshot and issues native calls only on
/// a difference or when the group's force flag is set. After [`Self::mark_all_dirty`] the
/// snapshot is ignored until each group has been applied again.
#[derive(Debug)]
pub struct StateCache {
    rasterizer: Option<RasterizerState>,
    blend: Option<AppliedBlend>,
    sample_mask: Option<u32>,
    depth_stencil: Option<AppliedDepthStencil>,
    scissor: Option<(Rectangle, bool)>,
    viewport: Option<AppliedViewport>,
    render_target: RenderTargetInfo,
    force: ForceFlags,
    zero_color_mask_allowed: bool,
    stats: Arc<BackendStats>,
}

impl StateCache {
    pub fn new(stats: Arc<BackendStats>) -> Self {
        Self {
            rasterizer: None,
            blend: None,
            sample_mask: None,
            depth_stencil: None,
            scissor: None,
            viewport: None,
            render_target: RenderTargetInfo::default(),
            force: ForceFlags::ALL,
            zero_color_mask_allowed: true,
            stats,
        }
    }

    /// Force every group to be re-issued on its next apply.
    pub fn mark_all_dirty(&mut self) {
        self.force = ForceFlags::ALL;
    }

    pub fn render_target(&self) -> RenderTargetInfo {
        self.render_target
    }

    /// Record the dimensions and buffer depths of a newly bound framebuffer.
    ///
    /// Depth bias and stencil masks depend on buffer depths; scissor and viewport clamping
    /// depend on the target size.
    pub fn set_render_target_info(&mut self, info: RenderTargetInfo) {
        let current = self.render_target;
        if info.depth_size != current.depth_size {
            self.force.rasterizer = true;
            self.force.depth_stencil = true;
        }
        if info.stencil_size != current.stencil_size {
            self.force.depth_stencil = true;
        }
        if info.width != current.width || info.height != current.height {
            self.force.scissor = true;
            self.force.viewport = true;
        }
        self.render_target = info;
    }

    /// Whether an all-zero colour write mask may be programmed directly. Set from the adapter.
    pub fn set_zero_color_mask_allowed(&mut self, allowed: bool) {
        if allowed != self.zero_color_mask_allowed {
            self.zero_color_mask_allowed = allowed;
            self.force.blend = true;
        }
    }

    fn skipped(&self) {
        self.stats.inc_state_groups_skipped();
    }

    fn applied(&self, calls: u64) {
        self.stats.inc_state_groups_applied();
        self.stats.add_render_state_calls(calls);
    }

    pub fn apply_rasterizer<Dev: NativeDevice>(
        &mut self,
        device: &mut Dev,
        state: &RasterizerState,
    ) {
        if !self.force.rasterizer && self.rasterizer.as_ref() == Some(state) {
            self.skipped();
            return;
        }

        let mut w = StateWriter::new(device);
        let cull = if state.cull_face {
            translate::cull_mode(state.cull_mode, state.front_face)
        } else {
            D3dCull::None
        };
        w.set(RenderState::CullMode, cull as u32);

        if state.polygon_offset_fill {
            let depth_size = self.render_target.depth_size;
            if depth_size > 0 {
                // Units are in depth-buffer ULPs: scale by 2^-depth_size.
                let depth_bias = state.polygon_offset_units * 2f32.powi(-(depth_size as i32));
                w.set(
                    RenderState::SlopeScaleDepthBias,
                    state.polygon_offset_factor.to_bits(),
                );
                w.set(RenderState::DepthBias, depth_bias.to_bits());
            }
        } else {
            w.set(RenderState::SlopeScaleDepthBias, 0);
            w.set(RenderState::DepthBias, 0);
        }

        let calls = w.calls;
        self.rasterizer = Some(*state);
        self.force.rasterizer = false;
        self.applied(calls);
    }

    pub fn apply_blend<Dev: NativeDevice>(
        &mut self,
        device: &mut Dev,
        state: &BlendState,
        color: Color,
        sample_mask: u32,
    ) {
        let desired = AppliedBlend {
            state: *state,
            color,
        };
        let blend_changed = self.force.blend || self.blend != Some(desired);
        let mask_changed = self.force.blend || self.sample_mask != Some(sample_mask);
        if !blend_changed && !mask_changed {
            self.skipped();
            return;
        }

        let mut w = StateWriter::new(device);
        if blend_changed {
            if state.blend {
                w.enable(RenderState::AlphaBlendEnable, true);
                let factor = if state.uses_constant_alpha() {
                    translate::d3d_color(Color::new(
                        color.alpha,
                        color.alpha,
                        color.alpha,
                        color.alpha,
                    ))
                } else {
                    translate::d3d_color(color)
                };
                w.set(RenderState::BlendFactor, factor);
                w.set(
                    RenderState::SrcBlend,
                    translate::blend_factor(state.source_rgb) as u32,
                );
                w.set(
                    RenderState::DestBlend,
                    translate::blend_factor(state.dest_rgb) as u32,
                );
                w.set(
                    RenderState::BlendOp,
                    translate::blend_op(state.equation_rgb) as u32,
                );

                if state.is_separate() {
                    w.enable(RenderState::SeparateAlphaBlendEnable, true);
                    w.set(
                        RenderState::SrcBlendAlpha,
                        translate::blend_factor(state.source_alpha) as u32,
                    );
                    w.set(
                        RenderState::DestBlendAlpha,
                        translate::blend_factor(state.dest_alpha) as u32,
                    );
                    w.set(
                        RenderState::BlendOpAlpha,
                        translate::blend_op(state.equation_alpha) as u32,
                    );
                } else {
                    w.enable(RenderState::SeparateAlphaBlendEnable, false);
                }
            } else {
                w.enable(RenderState::AlphaBlendEnable, false);
            }

            if state.sample_alpha_to_coverage {
                debug!("alpha-to-coverage has no native equivalent; ignoring");
            }

            if state.color_mask == ColorMask::NONE && !self.zero_color_mask_allowed {
                // Write green only, with a blend that leaves the destination untouched.
                w.set(RenderState::ColorWriteEnable, COLOR_WRITE_GREEN);
                w.enable(RenderState::AlphaBlendEnable, true);
                w.set(RenderState::SrcBlend, D3dBlend::Zero as u32);
                w.set(RenderState::DestBlend, D3dBlend::One as u32);
                w.set(RenderState::BlendOp, D3dBlendOp::Add as u32);
            } else {
                w.set(
                    RenderState::ColorWriteEnable,
                    translate::color_mask(state.color_mask),
                );
            }
            w.enable(RenderState::DitherEnable, state.dither);
            self.blend = Some(desired);
        }

        if mask_changed {
            w.enable(RenderState::MultisampleAntialias, true);
            w.set(RenderState::MultisampleMask, sample_mask);
            self.sample_mask = Some(sample_mask);
        }

        let calls = w.calls;
        self.force.blend = false;
        self.applied(calls);
    }

    /// Apply depth and stencil state.
    ///
    /// Separate front/back stencil reference, mask or write mask cannot be expressed natively
    /// and are rejected before anything is issued. Without a stencil buffer stencil is simply
    /// disabled, so they are accepted.
    pub fn apply_depth_stencil<Dev: NativeDevice>(
        &mut self,
        device: &mut Dev,
        state: &DepthStencilState,
        stencil_ref: i32,
        stencil_back_ref: i32,
        front_face: FrontFace,
    ) -> Result<(), BackendError> {
        if state.stencil_test
            && self.render_target.stencil_size > 0
            && (state.front.writemask != state.back.writemask
                || state.front.mask != state.back.mask
                || stencil_ref != stencil_back_ref)
        {
            return Err(BackendError::UnsupportedConfiguration(
                "separate front/back stencil reference, mask or write mask".to_string(),
            ));
        }

        let front_face_ccw = front_face == FrontFace::Ccw;
        let desired = AppliedDepthStencil {
            state: *state,
            stencil_ref,
            stencil_back_ref,
            front_face_ccw,
        };
        let current = self.depth_stencil;
        let state_changed = self.force.depth_stencil || current.map(|c| c.state) != Some(*state);
        let stencil_changed = state_changed
            || current.map(|c| (c.stencil_ref, c.stencil_back_ref, c.front_face_ccw))
                != Some((stencil_ref, stencil_back_ref, front_face_ccw));
        if !stencil_changed {
            self.skipped();
            return Ok(());
        }

        let mut w = StateWriter::new(device);
        if state_changed {
            if state.depth_test {
                w.set(RenderState::ZEnable, ZB_TRUE);
                w.set(
                    RenderState::ZFunc,
                    translate::compare_func(state.depth_func) as u32,
                );
            } else {
                w.set(RenderState::ZEnable, ZB_FALSE);
            }
        }

        let stencil_size = self.render_target.stencil_size;
        if state.stencil_test && stencil_size > 0 {
            w.enable(RenderState::StencilEnable, true);
            w.enable(RenderState::TwoSidedStencilMode, true);

            let max_stencil = ((1u64 << stencil_size.min(32)) - 1) as i64;
            let clamped_ref = i64::from(stencil_ref).clamp(0, max_stencil) as u32;
            // Reference, mask and write mask have no counter-clockwise variants.
            w.set(RenderState::StencilRef, clamped_ref);
            w.set(RenderState::StencilMask, state.front.mask);
            w.set(RenderState::StencilWriteMask, state.front.writemask);

            let (cw, ccw) = if front_face_ccw {
                (&state.front, &state.back)
            } else {
                (&state.back, &state.front)
            };
            w.set(RenderState::StencilFunc, translate::compare_func(cw.func) as u32);
            w.set(RenderState::StencilFail, translate::stencil_op(cw.fail) as u32);
            w.set(
                RenderState::StencilZFail,
                translate::stencil_op(cw.pass_depth_fail) as u32,
            );
            w.set(
                RenderState::StencilPass,
                translate::stencil_op(cw.pass_depth_pass) as u32,
            );
            w.set(
                RenderState::CcwStencilFunc,
                translate::compare_func(ccw.func) as u32,
            );
            w.set(
                RenderState::CcwStencilFail,
                translate::stencil_op(ccw.fail) as u32,
            );
            w.set(
                RenderState::CcwStencilZFail,
                translate::stencil_op(ccw.pass_depth_fail) as u32,
            );
            w.set(
                RenderState::CcwStencilPass,
                translate::stencil_op(ccw.pass_depth_pass) as u32,
            );
        } else {
            w.enable(RenderState::StencilEnable, false);
        }
        w.enable(RenderState::ZWriteEnable, state.depth_mask);

        let calls = w.calls;
        self.depth_stencil = Some(desired);
        self.force.depth_stencil = false;
        self.applied(calls);
        Ok(())
    }

    pub fn apply_scissor<Dev: NativeDevice>(
        &mut self,
        device: &mut Dev,
        rect: Rectangle,
        enabled: bool,
    ) {
        if !self.force.scissor && self.scissor == Some((rect, enabled)) {
            self.skipped();
            return;
        }

        let (width, height) = self.render_target.extent();
        let mut w = StateWriter::new(device);
        if enabled {
            w.scissor_rect(NativeRect {
                left: rect.x.clamp(0, width),
                top: rect.y.clamp(0, height),
                right: rect.x.saturating_add(rect.width).clamp(0, width),
                bottom: rect.y.saturating_add(rect.height).clamp(0, height),
            });
        }
        w.enable(RenderState::ScissorTestEnable, enabled);

        let calls = w.calls;
        self.scissor = Some((rect, enabled));
        self.force.scissor = false;
        self.applied(calls);
    }

    /// Apply the viewport clamped to the render target and return the derived shader constants.
    ///
    /// A viewport that clamps to an empty region is reported as
    /// [`BackendError::DegenerateViewport`] and nothing is issued.
    pub fn apply_viewport<Dev: NativeDevice>(
        &mut self,
        device: &mut Dev,
        rect: Rectangle,
        near: f32,
        far: f32,
    ) -> Result<ViewportMapping, BackendError> {
        let (rt_width, rt_height) = self.render_target.extent();
        let x = rect.x.clamp(0, rt_width);
        let y = rect.y.clamp(0, rt_height);
        let width = rect.width.clamp(0, rt_width - x);
        let height = rect.height.clamp(0, rt_height - y);
        if width <= 0 || height <= 0 {
            return Err(BackendError::DegenerateViewport { width, height });
        }

        let viewport = NativeViewport {
            x: x as u32,
            y: y as u32,
            width: width as u32,
            height: height as u32,
            min_z: near,
            max_z: far,
        };
        let mapping = ViewportMapping {
            viewport,
            half_pixel_size: [1.0 / width as f32, -1.0 / height as f32],
            frag_coord: [
                rect.width as f32 * 0.5,
                rect.height as f32 * 0.5,
                rect.x as f32 + rect.width as f32 * 0.5,
                rect.y as f32 + rect.height as f32 * 0.5,
            ],
            depth_front: [(far - near) * 0.5, (near + far) * 0.5, far - near],
            depth_range: [near, far, far - near],
        };

        let desired = AppliedViewport { rect, near, far };
        if !self.force.viewport && self.viewport == Some(desired) {
            self.skipped();
            return Ok(mapping);
        }

        let mut w = StateWriter::new(device);
        w.viewport(viewport);
        let calls = w.calls;
        self.viewport = Some(desired);
        self.force.viewport = false;
        self.applied(calls);
        Ok(mapping)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::recording::{NativeCall, RecordingDevice};
    use crate::native::BehaviorFlags;
    use crate::state::types::{BlendFactor, CompareFunc, CullFace, StencilOp};
    use pretty_assertions::assert_eq;

    fn setup() -> (StateCache, RecordingDevice) {
        let mut cache = StateCache::new(Arc::new(BackendStats::new()));
        cache.set_render_target_info(RenderTargetInfo {
            width: 640,
            height: 480,
            depth_size: 24,
            stencil_size: 8,
        });
        (
            cache,
            RecordingDevice::new(false, BehaviorFlags::HARDWARE_VERTEX_PROCESSING),
        )
    }

    fn stencil_state() -> DepthStencilState {
        let mut state = DepthStencilState {
            depth_test: true,
            depth_func: CompareFunc::LessEqual,
            stencil_test: true,
            ..DepthStencilState::default()
        };
        state.front.func = CompareFunc::Equal;
        state.front.pass_depth_pass = StencilOp::Replace;
        state.back.func = CompareFunc::NotEqual;
        state
    }

    #[test]
    fn identical_rasterizer_state_is_issued_once() {
        let (mut cache, mut device) = setup();
        let state = RasterizerState {
            cull_face: true,
            ..RasterizerState::default()
        };
        cache.apply_rasterizer(&mut device, &state);
        let first = device.calls().len();
        cache.apply_rasterizer(&mut device, &state);
        assert_eq!(device.calls().len(), first);
        assert_eq!(device.render_state_count(RenderState::CullMode), 1);
        assert_eq!(
            device.last_render_state(RenderState::CullMode),
            Some(D3dCull::Ccw as u32)
        );

        let snap = cache.stats.snapshot();
        assert_eq!(snap.state_groups_applied, 1);
        assert_eq!(snap.state_groups_skipped, 1);
        assert_eq!(snap.render_state_calls, first as u64);
    }

    #[test]
    fn mark_all_dirty_reissues_every_group() {
        let (mut cache, mut device) = setup();
        let raster = RasterizerState::default();
        let blend = BlendState::default();
        let ds = DepthStencilState::default();
        let scissor = Rectangle::new(0, 0, 10, 10);
        let viewport = Rectangle::new(0, 0, 640, 480);

        let apply_all = |cache: &mut StateCache, device: &mut RecordingDevice| {
            cache.apply_rasterizer(device, &raster);
            cache.apply_blend(device, &blend, Color::default(), u32::MAX);
            cache
                .apply_depth_stencil(device, &ds, 0, 0, FrontFace::Ccw)
                .unwrap();
            cache.apply_scissor(device, scissor, true);
            cache.apply_viewport(device, viewport, 0.0, 1.0).unwrap();
        };

        apply_all(&mut cache, &mut device);
        let first = device.take_calls();
        apply_all(&mut cache, &mut device);
        assert!(device.calls().is_empty());

        cache.mark_all_dirty();
        apply_all(&mut cache, &mut device);
        assert_eq!(device.take_calls(), first);
    }

    #[test]
    fn depth_size_change_reapplies_depth_bias() {
        let (mut cache, mut device) = setup();
        let state = RasterizerState {
            polygon_offset_fill: true,
            polygon_offset_factor: 1.0,
            polygon_offset_units: 2.0,
            ..RasterizerState::default()
        };
        cache.apply_rasterizer(&mut device, &state);
        assert_eq!(
            device.last_render_state(RenderState::DepthBias),
            Some((2.0f32 / (1u32 << 24) as f32).to_bits())
        );

        let mut info = cache.render_target();
        info.depth_size = 16;
        cache.set_render_target_info(info);
        cache.apply_rasterizer(&mut device, &state);
        assert_eq!(
            device.last_render_state(RenderState::DepthBias),
            Some((2.0f32 / 65536.0).to_bits())
        );
        assert_eq!(device.render_state_count(RenderState::DepthBias), 2);
    }

    #[test]
    fn constant_alpha_is_replicated_into_blend_factor() {
        let (mut cache, mut device) = setup();
        let state = BlendState {
            blend: true,
            source_rgb: BlendFactor::ConstantAlpha,
            dest_rgb: BlendFactor::OneMinusConstantAlpha,
            source_alpha: BlendFactor::ConstantAlpha,
            dest_alpha: BlendFactor::OneMinusConstantAlpha,
            ..BlendState::default()
        };
        cache.apply_blend(&mut device, &state, Color::new(1.0, 0.0, 0.0, 0.0), u32::MAX);
        assert_eq!(device.last_render_state(RenderState::BlendFactor), Some(0));
        assert_eq!(
            device.last_render_state(RenderState::SeparateAlphaBlendEnable),
            Some(FALSE)
        );

        let state = BlendState {
            blend: true,
            source_rgb: BlendFactor::ConstantColor,
            dest_alpha: BlendFactor::One,
            ..BlendState::default()
        };
        cache.apply_blend(&mut device, &state, Color::new(1.0, 0.0, 0.0, 0.0), u32::MAX);
        assert_eq!(
            device.last_render_state(RenderState::BlendFactor),
            Some(0x00ff_0000)
        );
        assert_eq!(
            device.last_render_state(RenderState::SeparateAlphaBlendEnable),
            Some(TRUE)
        );
        assert_eq!(
            device.last_render_state(RenderState::DestBlendAlpha),
            Some(D3dBlend::One as u32)
        );
    }

    #[test]
    fn zero_color_mask_is_emulated_when_disallowed() {
        let (mut cache, mut device) = setup();
        let state = BlendState {
            color_mask: ColorMask::NONE,
            ..BlendState::default()
        };
        cache.apply_blend(&mut device, &state, Color::default(), u32::MAX);
        assert_eq!(device.last_render_state(RenderState::ColorWriteEnable), Some(0));

        cache.set_zero_color_mask_allowed(false);
        cache.apply_blend(&mut device, &state, Color::default(), u32::MAX);
        assert_eq!(
            device.last_render_state(RenderState::ColorWriteEnable),
            Some(COLOR_WRITE_GREEN)
        );
        assert_eq!(
            device.last_render_state(RenderState::SrcBlend),
            Some(D3dBlend::Zero as u32)
        );
        assert_eq!(
            device.last_render_state(RenderState::DestBlend),
            Some(D3dBlend::One as u32)
        );
    }

    #[test]
    fn sample_mask_change_only_touches_multisample_states() {
        let (mut cache, mut device) = setup();
        let state = BlendState::default();
        cache.apply_blend(&mut device, &state, Color::default(), u32::MAX);
        device.clear_calls();
        cache.apply_blend(&mut device, &state, Color::default(), 0x5);
        assert_eq!(
            device.take_calls(),
            vec![
                NativeCall::SetRenderState(RenderState::MultisampleAntialias, TRUE),
                NativeCall::SetRenderState(RenderState::MultisampleMask, 0x5),
            ]
        );
    }

    #[test]
    fn stencil_faces_follow_front_face_winding() {
        let (mut cache, mut device) = setup();
        let state = stencil_state();
        cache
            .apply_depth_stencil(&mut device, &state, 3, 3, FrontFace::Ccw)
            .unwrap();
        assert_eq!(
            device.last_render_state(RenderState::StencilFunc),
            Some(translate::compare_func(CompareFunc::Equal) as u32)
        );
        assert_eq!(
            device.last_render_state(RenderState::CcwStencilFunc),
            Some(translate::compare_func(CompareFunc::NotEqual) as u32)
        );

        // Only the winding changed: stencil is re-issued, depth is not.
        let z_enables = device.render_state_count(RenderState::ZEnable);
        cache
            .apply_depth_stencil(&mut device, &state, 3, 3, FrontFace::Cw)
            .unwrap();
        assert_eq!(device.render_state_count(RenderState::ZEnable), z_enables);
        assert_eq!(
            device.last_render_state(RenderState::StencilFunc),
            Some(translate::compare_func(CompareFunc::NotEqual) as u32)
        );
    }

    #[test]
    fn stencil_reference_is_clamped_to_buffer_depth() {
        let (mut cache, mut device) = setup();
        cache
            .apply_depth_stencil(&mut device, &stencil_state(), 1000, 1000, FrontFace::Ccw)
            .unwrap();
        assert_eq!(device.last_render_state(RenderState::StencilRef), Some(255));
    }

    #[test]
    fn separate_stencil_masks_are_rejected_without_native_calls() {
        let (mut cache, mut device) = setup();
        let mut state = stencil_state();
        state.back.writemask = 0x0f;
        let err = cache
            .apply_depth_stencil(&mut device, &state, 0, 0, FrontFace::Ccw)
            .unwrap_err();
        assert!(matches!(err, BackendError::UnsupportedConfiguration(_)));
        assert!(matches!(
            cache.apply_depth_stencil(&mut device, &stencil_state(), 1, 2, FrontFace::Ccw),
            Err(BackendError::UnsupportedConfiguration(_))
        ));
        assert!(device.calls().is_empty());
    }

    #[test]
    fn stencil_is_disabled_without_stencil_buffer() {
        let (mut cache, mut device) = setup();
        let mut info = cache.render_target();
        info.stencil_size = 0;
        cache.set_render_target_info(info);
        cache
            .apply_depth_stencil(&mut device, &stencil_state(), 1, 1, FrontFace::Ccw)
            .unwrap();
        assert_eq!(
            device.last_render_state(RenderState::StencilEnable),
            Some(FALSE)
        );
        assert_eq!(device.render_state_count(RenderState::StencilFunc), 0);
    }

    #[test]
    fn separate_stencil_is_accepted_without_stencil_buffer() {
        let (mut cache, mut device) = setup();
        let mut info = cache.render_target();
        info.stencil_size = 0;
        cache.set_render_target_info(info);
        let mut state = stencil_state();
        state.back.mask = 0x0f;
        cache
            .apply_depth_stencil(&mut device, &state, 1, 2, FrontFace::Ccw)
            .unwrap();
        assert_eq!(
            device.last_render_state(RenderState::StencilEnable),
            Some(FALSE)
        );
        assert_eq!(device.render_state_count(RenderState::StencilRef), 0);
    }

    #[test]
    fn oversized_render_target_saturates_instead_of_wrapping() {
        let (mut cache, mut device) = setup();
        cache.set_render_target_info(RenderTargetInfo {
            width: u32::MAX,
            height: u32::MAX,
            depth_size: 24,
            stencil_size: 8,
        });
        cache.apply_scissor(&mut device, Rectangle::new(0, 0, 16, 16), true);
        assert_eq!(
            device.calls()[0],
            NativeCall::SetScissorRect(NativeRect {
                left: 0,
                top: 0,
                right: 16,
                bottom: 16,
            })
        );
        let mapping = cache
            .apply_viewport(&mut device, Rectangle::new(0, 0, 16, 16), 0.0, 1.0)
            .unwrap();
        assert_eq!(mapping.viewport.width, 16);
    }

    #[test]
    fn scissor_is_clamped_to_render_target() {
        let (mut cache, mut device) = setup();
        cache.apply_scissor(&mut device, Rectangle::new(-10, 400, 1000, 1000), true);
        assert_eq!(
            device.calls()[0],
            NativeCall::SetScissorRect(NativeRect {
                left: 0,
                top: 400,
                right: 640,
                bottom: 480,
            })
        );

        // Disabling only toggles the enable state.
        device.clear_calls();
        cache.apply_scissor(&mut device, Rectangle::new(-10, 400, 1000, 1000), false);
        assert_eq!(
            device.take_calls(),
            vec![NativeCall::SetRenderState(RenderState::ScissorTestEnable, FALSE)]
        );
    }

    #[test]
    fn target_resize_forces_scissor_and_viewport() {
        let (mut cache, mut device) = setup();
        let rect = Rectangle::new(0, 0, 800, 600);
        cache.apply_scissor(&mut device, rect, true);
        cache.apply_viewport(&mut device, rect, 0.0, 1.0).unwrap();
        device.clear_calls();

        let mut info = cache.render_target();
        info.width = 800;
        info.height = 600;
        cache.set_render_target_info(info);
        cache.apply_scissor(&mut device, rect, true);
        let mapping = cache.apply_viewport(&mut device, rect, 0.0, 1.0).unwrap();
        assert_eq!(mapping.viewport.width, 800);
        assert_eq!(
            device.count_calls(|c| matches!(c, NativeCall::SetScissorRect(_))),
            1
        );
        assert_eq!(
            device.count_calls(|c| matches!(c, NativeCall::SetViewport(_))),
            1
        );
    }

    #[test]
    fn viewport_mapping_constants() {
        let (mut cache, mut device) = setup();
        let mapping = cache
            .apply_viewport(&mut device, Rectangle::new(0, 0, 320, 240), 0.25, 0.75)
            .unwrap();
        assert_eq!(
            mapping,
            ViewportMapping {
                viewport: NativeViewport {
                    x: 0,
                    y: 0,
                    width: 320,
                    height: 240,
                    min_z: 0.25,
                    max_z: 0.75,
                },
                half_pixel_size: [1.0 / 320.0, -1.0 / 240.0],
                frag_coord: [160.0, 120.0, 160.0, 120.0],
                depth_front: [0.25, 0.5, 0.5],
                depth_range: [0.25, 0.75, 0.5],
            }
        );
    }

    #[test]
    fn degenerate_viewport_is_reported_without_native_call() {
        let (mut cache, mut device) = setup();
        let err = cache
            .apply_viewport(&mut device, Rectangle::new(700, 0, 100, 100), 0.0, 1.0)
            .unwrap_err();
        assert!(matches!(
            err,
            BackendError::DegenerateViewport {
                width: 0,
                height: 100
            }
        ));
        assert!(matches!(
            cache.apply_viewport(&mut device, Rectangle::new(0, 0, 10, 0), 0.0, 1.0),
            Err(BackendError::DegenerateViewport { .. })
        ));
        assert!(device.calls().is_empty());

        // The force flag survives the failure.
        cache
            .apply_viewport(&mut device, Rectangle::new(0, 0, 10, 10), 0.0, 1.0)
            .unwrap();
        assert_eq!(device.calls().len(), 1);
    }

    #[test]
    fn culling_both_faces_disables_native_culling() {
        let (mut cache, mut device) = setup();
        let state = RasterizerState {
            cull_face: true,
            cull_mode: CullFace::FrontAndBack,
            ..RasterizerState::default()
        };
        cache.apply_rasterizer(&mut device, &state);
        assert_eq!(
            device.last_render_state(RenderState::CullMode),
            Some(D3dCull::None as u32)
        );
    }
}
