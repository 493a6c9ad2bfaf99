//! The per-draw pipeline: bind render target, bind shaders, bind vertex layout, apply pipeline
//! state, draw.
//!
//! [`RenderBackend`] owns every cache in the crate and the device they were built against. All of
//! it is single-threaded: the backend lives on the thread that owns the native device.

use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use tracing::{debug, warn};

use crate::caps::DeviceCaps;
use crate::compiler::{self, ShaderProfile, ShaderStage};
use crate::config::BackendConfig;
use crate::device::{map_device_error, DeviceEventSink, DeviceManager, DeviceStatus};
use crate::error::{BackendError, BindStage, ResourceKind};
use crate::format::{AbstractFormat, ResourceTranslator};
use crate::native::{
    ClearFlags, D3dCompareFunc, D3dCull, D3dPrimitiveType, D3dStencilOp, MemoryPool,
    NativeDevice, NativeDriver, NativeFormat, NativeRect, PixelShaderHandle, QueryStatus,
    RenderState, ResourceUsage, SampleCount, StreamFrequency, SurfaceHandle, VertexShaderHandle,
    FALSE, FILL_SOLID, FVF_XYZRHW_DIFFUSE, TRUE, ZB_FALSE,
};
use crate::primitive::{translate_draw_mode, DrawMode};
use crate::query_pool::{PooledQuery, QueryPool};
use crate::shader_cache::ShaderObjectCache;
use crate::state::{
    translate, BlendState, Color, ColorMask, CullFace, DepthStencilState, RasterizerState,
    Rectangle, RenderTargetInfo, StateCache, ViewportMapping,
};
use crate::stats::{BackendStats, BackendStatsSnapshot};
use crate::vertex::{ProgramInputs, TranslatedAttribute, VertexFormatCache};

/// A surface plus the serial of the object that owns it. Serials change whenever the owner's
/// storage is reallocated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceBinding {
    pub surface: SurfaceHandle,
    pub serial: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderTargetBinding {
    pub color: SurfaceBinding,
    pub depth_stencil: Option<SurfaceBinding>,
    pub info: RenderTargetInfo,
}

/// A linked program: one vertex and one pixel shader created through this backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShaderProgram {
    pub serial: u32,
    pub vertex: VertexShaderHandle,
    pub pixel: PixelShaderHandle,
}

/// Every fixed-function state group for one draw.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipelineState {
    pub rasterizer: RasterizerState,
    pub blend: BlendState,
    pub blend_color: Color,
    pub sample_mask: u32,
    pub depth_stencil: DepthStencilState,
    pub stencil_ref: i32,
    pub stencil_back_ref: i32,
    pub scissor: Rectangle,
    pub scissor_test: bool,
    pub viewport: Rectangle,
    pub depth_near: f32,
    pub depth_far: f32,
}

impl PipelineState {
    /// Initial context state for a `width`x`height` default framebuffer.
    pub fn for_target(width: i32, height: i32) -> Self {
        let full = Rectangle::new(0, 0, width, height);
        Self {
            rasterizer: RasterizerState::default(),
            blend: BlendState::default(),
            blend_color: Color::default(),
            sample_mask: u32::MAX,
            depth_stencil: DepthStencilState::default(),
            stencil_ref: 0,
            stencil_back_ref: 0,
            scissor: full,
            scissor_test: false,
            viewport: full,
            depth_near: 0.0,
            depth_far: 1.0,
        }
    }
}

/// Buffers to clear. `None` leaves that buffer untouched.
///
/// Clears are scissored like draws, so the current scissor travels with the request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClearRequest {
    pub color: Option<Color>,
    pub depth: Option<f32>,
    pub stencil: Option<i32>,
    pub color_mask: ColorMask,
    pub stencil_writemask: u32,
    pub scissor: Rectangle,
    pub scissor_test: bool,
}

impl Default for ClearRequest {
    fn default() -> Self {
        Self {
            color: None,
            depth: None,
            stencil: None,
            color_mask: ColorMask::ALL,
            stencil_writemask: u32::MAX,
            scissor: Rectangle::default(),
            scissor_test: false,
        }
    }
}

/// Pre-transformed vertex for full-target quads (`FVF_XYZRHW_DIFFUSE`).
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct QuadVertex {
    x: f32,
    y: f32,
    z: f32,
    rhw: f32,
    color: u32,
}

pub struct RenderBackend<D: NativeDriver> {
    device: DeviceManager<D>,
    state: StateCache,
    vertex: VertexFormatCache,
    vertex_shaders: ShaderObjectCache<VertexShaderHandle>,
    pixel_shaders: ShaderObjectCache<PixelShaderHandle>,
    queries: QueryPool,
    translator: ResourceTranslator,
    stats: Arc<BackendStats>,

    bind_stage: BindStage,
    applied_color_serial: Option<u32>,
    // Outer `None`: unknown, re-issue. Inner `None`: no depth-stencil surface bound.
    applied_depth_stencil_serial: Option<Option<u32>>,
    applied_program: Option<u32>,
    repeat_draw: u32,
    skip_draw: bool,
}

impl<D: NativeDriver> RenderBackend<D> {
    pub fn new(driver: D, config: BackendConfig) -> Self {
        let stats = Arc::new(BackendStats::new());
        Self {
            device: DeviceManager::new(driver, config, Arc::clone(&stats)),
            state: StateCache::new(Arc::clone(&stats)),
            vertex: VertexFormatCache::new(Arc::clone(&stats)),
            vertex_shaders: ShaderObjectCache::new(ResourceKind::VertexShader, Arc::clone(&stats)),
            pixel_shaders: ShaderObjectCache::new(ResourceKind::PixelShader, Arc::clone(&stats)),
            queries: QueryPool::new(Arc::clone(&stats)),
            translator: ResourceTranslator::new(),
            stats,
            bind_stage: BindStage::Nothing,
            applied_color_serial: None,
            applied_depth_stencil_serial: None,
            applied_program: None,
            repeat_draw: 1,
            skip_draw: false,
        }
    }

    pub fn initialize(&mut self) -> Result<(), BackendError> {
        self.device.initialize()?;
        self.after_device_ready();
        Ok(())
    }

    fn after_device_ready(&mut self) {
        self.translator.clear_multisample_cache();
        let max_samples = self.translator.max_supported_samples(&self.device);
        self.device.set_max_supported_samples(max_samples);
        if let Some(caps) = self.device.caps() {
            self.state
                .set_zero_color_mask_allowed(caps.zero_color_mask_allowed());
        }
        self.mark_all_state_dirty();
    }

    pub fn status(&self) -> DeviceStatus {
        self.device.status()
    }

    pub fn caps(&self) -> Option<&DeviceCaps> {
        self.device.caps()
    }

    pub fn device(&self) -> &DeviceManager<D> {
        &self.device
    }

    /// The native device regardless of loss state, for tooling and tests.
    pub fn native_device_mut(&mut self) -> Option<&mut D::Device> {
        self.device.native_device_mut()
    }

    pub fn stats(&self) -> BackendStatsSnapshot {
        self.stats.snapshot()
    }

    /// Force every state group and the vertex bindings to be re-issued. Needed whenever native
    /// state was changed behind this backend's back.
    pub fn mark_all_state_dirty(&mut self) {
        self.state.mark_all_dirty();
        self.vertex.mark_state_dirty();
        self.applied_color_serial = None;
        self.applied_depth_stencil_serial = None;
        self.applied_program = None;
        self.bind_stage = BindStage::Nothing;
    }

    pub fn mark_device_lost(&mut self) {
        self.device.mark_device_lost();
    }

    pub fn is_device_lost(&self) -> bool {
        self.device.is_device_lost()
    }

    pub fn test_device_lost(&mut self, notify: bool, sink: &mut dyn DeviceEventSink) -> bool {
        self.device.test_device_lost(notify, sink)
    }

    pub fn test_device_resettable(&mut self) -> bool {
        self.device.test_device_resettable()
    }

    /// Release everything this backend created on the device, then reset it.
    ///
    /// Cached state is invalidated whether or not the reset succeeds. Shader handles handed out
    /// earlier are dead afterwards and must be recreated.
    pub fn reset_device(&mut self, sink: &mut dyn DeviceEventSink) -> Result<(), BackendError> {
        if let Some(device) = self.device.native_device_mut() {
            self.queries.release_all(device);
            self.vertex_shaders
                .clear(|shader| device.release_vertex_shader(shader));
            self.pixel_shaders
                .clear(|shader| device.release_pixel_shader(shader));
            self.vertex.release_all(device);
        }
        self.mark_all_state_dirty();

        self.device.reset_device(sink)?;
        self.after_device_ready();
        Ok(())
    }

    fn require(&self, operation: &'static str, required: BindStage) -> Result<(), BackendError> {
        if self.bind_stage < required {
            return Err(BackendError::InvalidCallSequence {
                operation,
                required,
            });
        }
        Ok(())
    }

    pub fn start_scene(&mut self) -> Result<(), BackendError> {
        self.device.start_scene()
    }

    pub fn end_scene(&mut self) -> Result<(), BackendError> {
        self.device.end_scene()
    }

    pub fn clamp_swap_interval(&self, requested: i32) -> Option<i32> {
        self.device.clamp_swap_interval(requested)
    }

    /// See [`DeviceManager::texture_pool`].
    pub fn texture_pool(&self, usage: ResourceUsage) -> MemoryPool {
        self.device.texture_pool(usage)
    }

    /// See [`DeviceManager::buffer_pool`].
    pub fn buffer_pool(&self, usage: ResourceUsage) -> MemoryPool {
        self.device.buffer_pool(usage)
    }

    pub fn translate_format(&self, format: AbstractFormat) -> Result<NativeFormat, BackendError> {
        self.translator.translate_format(format)
    }

    pub fn translate_renderbuffer_format(
        &self,
        format: AbstractFormat,
    ) -> Result<NativeFormat, BackendError> {
        self.translator.translate_renderbuffer_format(format)
    }

    pub fn nearest_supported_sample_count(
        &mut self,
        format: NativeFormat,
        requested: SampleCount,
    ) -> SampleCount {
        self.translator
            .nearest_supported_sample_count(&self.device, format, requested)
    }

    /// Compile HLSL for the current device's shader model.
    pub fn compile_shader(&self, source: &str, stage: ShaderStage) -> Result<Vec<u8>, BackendError> {
        let model = self
            .device
            .caps()
            .map(|caps| caps.shader_model)
            .ok_or_else(|| {
                BackendError::InitializationFailure("shader compiled before initialize".to_string())
            })?;
        compiler::compile(source, ShaderProfile::new(stage, model))
    }

    pub fn create_vertex_shader(&mut self, bytecode: &[u8]) -> Result<VertexShaderHandle, BackendError> {
        let (device, _) = self.device.usable()?;
        let (shader, _) = self
            .vertex_shaders
            .get_or_create(bytecode, |code| device.create_vertex_shader(code))?;
        Ok(shader)
    }

    pub fn create_pixel_shader(&mut self, bytecode: &[u8]) -> Result<PixelShaderHandle, BackendError> {
        let (device, _) = self.device.usable()?;
        let (shader, _) = self
            .pixel_shaders
            .get_or_create(bytecode, |code| device.create_pixel_shader(code))?;
        Ok(shader)
    }

    /// Take an event query out of the pool.
    pub fn allocate_query(&mut self) -> Result<PooledQuery, BackendError> {
        let (device, _) = self.device.usable()?;
        self.queries.allocate(device)
    }

    pub fn free_query(&mut self, query: PooledQuery) {
        self.queries.free(query);
    }

    /// Bind colour and depth-stencil surfaces. Only surfaces whose serial changed are re-bound.
    pub fn bind_render_target(&mut self, target: &RenderTargetBinding) -> Result<(), BackendError> {
        let (device, _) = self.device.usable()?;
        if self.applied_color_serial != Some(target.color.serial) {
            device.set_render_target(0, Some(target.color.surface));
            self.applied_color_serial = Some(target.color.serial);
        }
        let depth_serial = target.depth_stencil.map(|ds| ds.serial);
        if self.applied_depth_stencil_serial != Some(depth_serial) {
            device.set_depth_stencil_surface(target.depth_stencil.map(|ds| ds.surface));
            self.applied_depth_stencil_serial = Some(depth_serial);
        }
        self.state.set_render_target_info(target.info);
        self.bind_stage = BindStage::RenderTarget;
        Ok(())
    }

    pub fn bind_shaders(&mut self, program: &ShaderProgram) -> Result<(), BackendError> {
        self.require("bind_shaders", BindStage::RenderTarget)?;
        let (device, _) = self.device.usable()?;
        if self.applied_program != Some(program.serial) {
            device.set_vertex_shader(Some(program.vertex));
            device.set_pixel_shader(Some(program.pixel));
            self.applied_program = Some(program.serial);
        }
        self.bind_stage = BindStage::Shaders;
        Ok(())
    }

    /// Bind vertex streams and the declaration for `program`'s inputs.
    ///
    /// Returns the repeat-draw multiplier: how many times [`Self::draw`] re-issues each draw to
    /// emulate instancing when the device cannot instance natively.
    pub fn bind_vertex_layout(
        &mut self,
        attributes: &[TranslatedAttribute],
        program: &ProgramInputs,
        instances: u32,
    ) -> Result<u32, BackendError> {
        self.require("bind_vertex_layout", BindStage::Shaders)?;
        let (device, caps) = self.device.usable()?;
        let repeat_draw = self
            .vertex
            .apply_declaration(device, caps, attributes, program, instances)?;
        self.repeat_draw = repeat_draw;
        self.bind_stage = BindStage::VertexLayout;
        Ok(repeat_draw)
    }

    /// Apply every fixed-function state group, issuing only what changed.
    pub fn apply_state(&mut self, state: &PipelineState) -> Result<ViewportMapping, BackendError> {
        self.require("apply_state", BindStage::VertexLayout)?;
        let (device, _) = self.device.usable()?;
        self.state.apply_rasterizer(device, &state.rasterizer);
        self.state
            .apply_blend(device, &state.blend, state.blend_color, state.sample_mask);
        self.state.apply_depth_stencil(
            device,
            &state.depth_stencil,
            state.stencil_ref,
            state.stencil_back_ref,
            state.rasterizer.front_face,
        )?;
        self.state
            .apply_scissor(device, state.scissor, state.scissor_test);
        let mapping = self.state.apply_viewport(
            device,
            state.viewport,
            state.depth_near,
            state.depth_far,
        )?;
        self.skip_draw =
            state.rasterizer.cull_face && state.rasterizer.cull_mode == CullFace::FrontAndBack;
        Ok(mapping)
    }

    /// Draw `count` vertices starting at `first`, repeated per the bound vertex layout.
    pub fn draw(&mut self, mode: DrawMode, first: u32, count: u32) -> Result<(), BackendError> {
        self.require("draw", BindStage::VertexLayout)?;
        let translation = translate_draw_mode(mode, count)?;
        if translation.primitive_count == 0 || self.skip_draw {
            return Ok(());
        }
        self.device.start_scene()?;
        let (device, _) = self.device.usable()?;
        for _ in 0..self.repeat_draw {
            device
                .draw_primitive(translation.primitive, first, translation.primitive_count)
                .map_err(|err| map_device_error(err, "DrawPrimitive"))?;
        }
        Ok(())
    }

    /// Clear the bound render target, honouring the request's scissor.
    ///
    /// Partial colour masks and partial stencil write masks cannot be expressed by the native
    /// clear; those are drawn as a full-target quad. The quad replaces the bound shaders and
    /// vertex format, so after a masked clear the render target stays bound but the caller must
    /// call [`Self::bind_shaders`] and [`Self::bind_vertex_layout`] again before the next draw.
    /// Every state group is re-issued on the following [`Self::apply_state`].
    pub fn clear(&mut self, request: &ClearRequest) -> Result<(), BackendError> {
        self.require("clear", BindStage::RenderTarget)?;
        let info = self.state.render_target();
        let stencil_unmasked = if info.stencil_size > 0 {
            ((1u64 << info.stencil_size.min(32)) - 1) as u32
        } else {
            0
        };
        let stencil = request
            .stencil
            .map(|value| i64::from(value).clamp(0, i64::from(stencil_unmasked)) as u32);
        let depth = request.depth.map(|value| value.clamp(0.0, 1.0));
        let color = request.color.map(translate::d3d_color).unwrap_or(0);

        let masked_color = request.color.is_some() && request.color_mask != ColorMask::ALL;
        let masked_stencil = stencil.is_some()
            && stencil_unmasked != 0
            && request.stencil_writemask & stencil_unmasked != stencil_unmasked;

        let mut flags = ClearFlags::empty();
        if depth.is_some() && info.depth_size > 0 {
            flags |= ClearFlags::ZBUFFER;
        }
        if !(masked_color || masked_stencil) {
            if request.color.is_some() {
                flags |= ClearFlags::TARGET;
            }
            if stencil.is_some() && stencil_unmasked != 0 {
                flags |= ClearFlags::STENCIL;
            }
            if flags.is_empty() {
                return Ok(());
            }
            let (device, _) = self.device.usable()?;
            self.state
                .apply_scissor(device, request.scissor, request.scissor_test);
            return device
                .clear(flags, color, depth.unwrap_or(1.0), stencil.unwrap_or(0))
                .map_err(|err| map_device_error(err, "Clear"));
        }

        debug!(masked_color, masked_stencil, "clearing with a full-target quad");
        self.device.start_scene()?;
        let (device, _) = self.device.usable()?;
        self.state
            .apply_scissor(device, request.scissor, request.scissor_test);
        device.set_render_state(RenderState::ZWriteEnable, FALSE);
        device.set_render_state(RenderState::ZFunc, D3dCompareFunc::Always as u32);
        device.set_render_state(RenderState::AlphaTestEnable, FALSE);
        device.set_render_state(RenderState::AlphaBlendEnable, FALSE);
        device.set_render_state(RenderState::FillMode, FILL_SOLID);
        device.set_render_state(RenderState::CullMode, D3dCull::None as u32);
        device.set_render_state(RenderState::ZEnable, ZB_FALSE);
        device.set_render_state(RenderState::ClipPlaneEnable, 0);
        let write_mask = if request.color.is_some() {
            translate::color_mask(request.color_mask)
        } else {
            0
        };
        device.set_render_state(RenderState::ColorWriteEnable, write_mask);

        match stencil {
            Some(value) if stencil_unmasked != 0 => {
                device.set_render_state(RenderState::StencilEnable, TRUE);
                device.set_render_state(RenderState::TwoSidedStencilMode, FALSE);
                device.set_render_state(RenderState::StencilFunc, D3dCompareFunc::Always as u32);
                device.set_render_state(RenderState::StencilRef, value);
                device.set_render_state(RenderState::StencilWriteMask, request.stencil_writemask);
                device.set_render_state(RenderState::StencilFail, D3dStencilOp::Replace as u32);
                device.set_render_state(RenderState::StencilZFail, D3dStencilOp::Replace as u32);
                device.set_render_state(RenderState::StencilPass, D3dStencilOp::Replace as u32);
            }
            _ => device.set_render_state(RenderState::StencilEnable, FALSE),
        }

        device.set_pixel_shader(None);
        device.set_vertex_shader(None);
        device.set_fvf(FVF_XYZRHW_DIFFUSE);
        device.set_stream_source_freq(0, StreamFrequency::Default);

        let right = info.width as f32 - 0.5;
        let bottom = info.height as f32 - 0.5;
        let corner = |x, y| QuadVertex {
            x,
            y,
            z: 0.0,
            rhw: 1.0,
            color,
        };
        let quad = [
            corner(-0.5, -0.5),
            corner(right, -0.5),
            corner(-0.5, bottom),
            corner(right, bottom),
        ];
        let result = device
            .draw_primitive_up(
                D3dPrimitiveType::TriangleStrip,
                2,
                bytemuck::cast_slice(&quad),
                std::mem::size_of::<QuadVertex>() as u32,
            )
            .and_then(|()| {
                if flags.is_empty() {
                    Ok(())
                } else {
                    device.clear(flags, color, depth.unwrap_or(1.0), 0)
                }
            });

        // Shaders, vertex format and most render states were replaced.
        let color_serial = self.applied_color_serial;
        let depth_serial = self.applied_depth_stencil_serial;
        self.mark_all_state_dirty();
        self.applied_color_serial = color_serial;
        self.applied_depth_stencil_serial = depth_serial;
        self.bind_stage = BindStage::RenderTarget;

        result.map_err(|err| map_device_error(err, "masked clear"))
    }

    /// Raw bytes of `rect` of `surface`, in the surface's native layout.
    pub fn readback(
        &mut self,
        surface: SurfaceHandle,
        rect: Rectangle,
    ) -> Result<Vec<u8>, BackendError> {
        self.require("readback", BindStage::RenderTarget)?;
        let (device, _) = self.device.usable()?;
        let rect = NativeRect {
            left: rect.x,
            top: rect.y,
            right: rect.x.saturating_add(rect.width),
            bottom: rect.y.saturating_add(rect.height),
        };
        device
            .read_render_target(surface, rect)
            .map_err(|err| map_device_error(err, "GetRenderTargetData"))
    }

    /// Wait for previously submitted GPU work.
    ///
    /// Returns whether the work has completed. Without `block` this is a single flushing poll.
    /// While blocking, device loss is re-tested between polls and reported as
    /// [`BackendError::DeviceLost`].
    pub fn sync(
        &mut self,
        block: bool,
        sink: &mut dyn DeviceEventSink,
    ) -> Result<bool, BackendError> {
        let query = self.allocate_query()?;
        let result = self.wait_for_query(&query, block, sink);
        self.queries.free(query);
        result
    }

    fn wait_for_query(
        &mut self,
        query: &PooledQuery,
        block: bool,
        sink: &mut dyn DeviceEventSink,
    ) -> Result<bool, BackendError> {
        {
            let (device, _) = self.device.usable()?;
            device
                .issue_query_end(query.handle())
                .map_err(|err| map_device_error(err, "Issue"))?;
        }
        loop {
            let (device, _) = self.device.usable()?;
            let status = device
                .query_status(query.handle(), true)
                .map_err(|err| map_device_error(err, "GetData"))?;
            match status {
                QueryStatus::Signaled => return Ok(true),
                QueryStatus::Pending if !block => return Ok(false),
                QueryStatus::Pending => {
                    std::thread::yield_now();
                    if self.device.test_device_lost(true, sink) {
                        warn!("device lost while waiting for GPU work");
                        return Err(BackendError::DeviceLost);
                    }
                }
            }
        }
    }
}
