//! Deterministic recording stand-in for the native API.
//!
//! Every device call is appended to a log so tests (and tooling that wants to inspect the exact
//! native call stream) can count state changes, object creation and releases. The driver side
//! lets callers script capabilities, format and multisample support, creation failures and
//! device loss.

use std::cell::Cell;
use std::collections::{BTreeSet, VecDeque};

use hashbrown::HashMap;

use super::{
    AdapterIdentifier, BehaviorFlags, ClearFlags, CooperativeLevel, D3dPrimitiveType,
    DeclTypeCaps, DevCaps2, DeviceType, FormatUsage, NativeCaps, NativeDevice, NativeDriver,
    NativeError, NativeFormat, NativeRect, NativeViewport, PixelShaderHandle, PresentIntervals,
    PresentParameters, QueryHandle, QueryKind, QueryStatus, RasterCaps, RenderState,
    ResourceType, SampleCount, ShaderVersion, StreamFrequency, SurfaceHandle, VertexBufferHandle,
    VertexDeclarationHandle, VertexShaderHandle,
};
use crate::caps::{DeviceCaps, ProbeInput};
use crate::vertex::VertexElement;

/// One recorded native device call.
#[derive(Debug, Clone, PartialEq)]
pub enum NativeCall {
    Reset,
    BeginScene,
    EndScene,
    SetRenderState(RenderState, u32),
    SetScissorRect(NativeRect),
    SetViewport(NativeViewport),
    SetRenderTarget(u32, Option<SurfaceHandle>),
    SetDepthStencilSurface(Option<SurfaceHandle>),
    CreateVertexShader(VertexShaderHandle),
    CreatePixelShader(PixelShaderHandle),
    ReleaseVertexShader(VertexShaderHandle),
    ReleasePixelShader(PixelShaderHandle),
    SetVertexShader(Option<VertexShaderHandle>),
    SetPixelShader(Option<PixelShaderHandle>),
    CreateVertexDeclaration(VertexDeclarationHandle, Vec<VertexElement>),
    ReleaseVertexDeclaration(VertexDeclarationHandle),
    SetVertexDeclaration(VertexDeclarationHandle),
    SetFvf(u32),
    SetStreamSource {
        stream: u32,
        buffer: VertexBufferHandle,
        offset: u32,
        stride: u32,
    },
    SetStreamSourceFreq(u32, StreamFrequency),
    CreateQuery(QueryHandle, QueryKind),
    ReleaseQuery(QueryHandle),
    IssueQueryEnd(QueryHandle),
    GetQueryData(QueryHandle),
    DrawPrimitive {
        primitive: D3dPrimitiveType,
        start_vertex: u32,
        primitive_count: u32,
    },
    DrawPrimitiveUp {
        primitive: D3dPrimitiveType,
        primitive_count: u32,
        bytes: usize,
        stride: u32,
    },
    Clear {
        flags: ClearFlags,
        color: u32,
        depth: f32,
        stencil: u32,
    },
    ReadRenderTarget(SurfaceHandle, NativeRect),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum LiveObject {
    VertexShader(u32),
    PixelShader(u32),
    Declaration(u32),
    Query(u32),
}

/// Scripted adapter. Fields are public so tests can describe the machine they need.
#[derive(Debug, Clone)]
pub struct RecordingDriver {
    pub adapters: u32,
    pub identifier: AdapterIdentifier,
    pub caps: NativeCaps,
    pub extended: bool,
    /// Supported usages per `(resource, format)`. Missing entries are unsupported.
    pub formats: HashMap<(ResourceType, NativeFormat), FormatUsage>,
    /// Supported sample counts per format (excluding `NONE`, which is always supported).
    pub multisample: HashMap<NativeFormat, Vec<u32>>,
    /// Failures returned by the next `create_device` calls, in order.
    pub create_failures: VecDeque<NativeError>,
    /// Number of `device_caps` calls that report `NotAvailable` before succeeding.
    pub caps_unavailable_polls: Cell<u32>,
    pub devices_created: u32,
    pub multisample_checks: Cell<u32>,
    pub last_behavior: Option<BehaviorFlags>,
    pub last_extended: Option<bool>,
}

impl Default for RecordingDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingDriver {
    /// A shader model 3 adapter with every optional format available.
    pub fn new() -> Self {
        let caps = NativeCaps {
            vertex_shader_version: ShaderVersion::new(3, 0),
            pixel_shader_version: ShaderVersion::new(3, 0),
            max_texture_width: 8192,
            max_texture_height: 8192,
            max_anisotropy: 16,
            max_vertex_index: 0x00ff_ffff,
            max_point_size: 256.0,
            raster_caps: RasterCaps::ANISOTROPY
                | RasterCaps::SCISSOR_TEST
                | RasterCaps::DEPTH_BIAS
                | RasterCaps::SLOPE_SCALE_DEPTH_BIAS,
            texture_caps: crate::native::TextureCaps::empty(),
            dev_caps2: DevCaps2::CAN_STRETCHRECT_FROM_TEXTURES | DevCaps2::STREAM_OFFSET,
            presentation_intervals: PresentIntervals::IMMEDIATE
                | PresentIntervals::ONE
                | PresentIntervals::TWO
                | PresentIntervals::THREE
                | PresentIntervals::FOUR,
            decl_types: DeclTypeCaps::all(),
        };

        let mut formats = HashMap::new();
        let all = FormatUsage::all();
        for format in [
            NativeFormat::A8R8G8B8,
            NativeFormat::X8R8G8B8,
            NativeFormat::R5G6B5,
            NativeFormat::A8,
            NativeFormat::L8,
            NativeFormat::A8L8,
            NativeFormat::R16F,
            NativeFormat::A16B16G16R16F,
            NativeFormat::A32B32G32R32F,
            NativeFormat::Dxt1,
            NativeFormat::Dxt3,
            NativeFormat::Dxt5,
            NativeFormat::Intz,
        ] {
            for resource in [
                ResourceType::Surface,
                ResourceType::Texture,
                ResourceType::CubeTexture,
            ] {
                formats.insert((resource, format), all);
            }
        }
        formats.insert((ResourceType::Surface, NativeFormat::D24S8), all);

        let mut multisample = HashMap::new();
        for format in [
            NativeFormat::A8R8G8B8,
            NativeFormat::X8R8G8B8,
            NativeFormat::R5G6B5,
            NativeFormat::D24S8,
        ] {
            multisample.insert(format, vec![2, 4, 8]);
        }

        Self {
            adapters: 1,
            identifier: AdapterIdentifier {
                vendor_id: crate::caps::VENDOR_ID_NVIDIA,
                device_id: 0x0640,
                description: "Recording Adapter".to_string(),
                identifier: [0; 16],
            },
            caps,
            extended: true,
            formats,
            multisample,
            create_failures: VecDeque::new(),
            caps_unavailable_polls: Cell::new(0),
            devices_created: 0,
            multisample_checks: Cell::new(0),
            last_behavior: None,
            last_extended: None,
        }
    }

    pub fn set_multisample(&mut self, format: NativeFormat, counts: &[u32]) {
        self.multisample.insert(format, counts.to_vec());
    }

    pub fn remove_format(&mut self, format: NativeFormat) {
        self.formats.retain(|(_, f), _| *f != format);
    }

    /// The capability surface a device created from this driver reports, for exercising
    /// components without going through device creation.
    pub fn probed_caps(&self) -> DeviceCaps {
        let mut caps = DeviceCaps::probe(ProbeInput {
            driver: self,
            adapter: 0,
            device_type: DeviceType::Hardware,
            native: &self.caps,
            identifier: self.identifier.clone(),
            extended: self.extended,
        });
        caps.event_queries = true;
        caps.occlusion_queries = true;
        caps
    }
}

impl NativeDriver for RecordingDriver {
    type Device = RecordingDevice;

    fn adapter_count(&self) -> u32 {
        self.adapters
    }

    fn adapter_identifier(&self, adapter: u32) -> Result<AdapterIdentifier, NativeError> {
        if adapter >= self.adapters {
            return Err(NativeError::InvalidCall);
        }
        Ok(self.identifier.clone())
    }

    fn device_caps(&self, adapter: u32, _device_type: DeviceType) -> Result<NativeCaps, NativeError> {
        if adapter >= self.adapters {
            return Err(NativeError::InvalidCall);
        }
        let pending = self.caps_unavailable_polls.get();
        if pending > 0 {
            self.caps_unavailable_polls.set(pending - 1);
            return Err(NativeError::NotAvailable);
        }
        Ok(self.caps.clone())
    }

    fn supports_extended(&self) -> bool {
        self.extended
    }

    fn check_device_format(
        &self,
        _adapter: u32,
        _device_type: DeviceType,
        usage: FormatUsage,
        resource: ResourceType,
        format: NativeFormat,
    ) -> bool {
        self.formats
            .get(&(resource, format))
            .is_some_and(|supported| supported.contains(usage))
    }

    fn check_multisample(
        &self,
        _adapter: u32,
        _device_type: DeviceType,
        format: NativeFormat,
        samples: SampleCount,
    ) -> bool {
        self.multisample_checks.set(self.multisample_checks.get() + 1);
        if samples == SampleCount::NONE {
            return true;
        }
        self.multisample
            .get(&format)
            .is_some_and(|counts| counts.contains(&samples.get()))
    }

    fn create_device(
        &mut self,
        adapter: u32,
        _device_type: DeviceType,
        behavior: BehaviorFlags,
        _params: &PresentParameters,
        extended: bool,
    ) -> Result<RecordingDevice, NativeError> {
        if adapter >= self.adapters {
            return Err(NativeError::InvalidCall);
        }
        if extended && !self.extended {
            return Err(NativeError::NotAvailable);
        }
        self.last_behavior = Some(behavior);
        self.last_extended = Some(extended);
        if let Some(err) = self.create_failures.pop_front() {
            return Err(err);
        }
        self.devices_created += 1;
        Ok(RecordingDevice::new(extended, behavior))
    }
}

/// Device that records every call instead of rendering.
#[derive(Debug)]
pub struct RecordingDevice {
    calls: Vec<NativeCall>,
    next_handle: u32,
    live: BTreeSet<LiveObject>,
    level: CooperativeLevel,
    query_polls: HashMap<u32, u32>,
    extended: bool,
    behavior: BehaviorFlags,
    /// Polls a query reports `Pending` before it signals.
    pub query_pending_polls: u32,
    /// Failures returned by the next object-creation calls, in order.
    pub creation_failures: VecDeque<NativeError>,
    /// Failure returned by the next `reset`.
    pub reset_failure: Option<NativeError>,
    /// Cooperative level to report once a query has been polled this many times while pending.
    pub lose_after_query_polls: Option<(u32, CooperativeLevel)>,
}

impl RecordingDevice {
    pub fn new(extended: bool, behavior: BehaviorFlags) -> Self {
        Self {
            calls: Vec::new(),
            next_handle: 1,
            live: BTreeSet::new(),
            level: CooperativeLevel::Ok,
            query_polls: HashMap::new(),
            extended,
            behavior,
            query_pending_polls: 0,
            creation_failures: VecDeque::new(),
            reset_failure: None,
            lose_after_query_polls: None,
        }
    }

    pub fn is_extended(&self) -> bool {
        self.extended
    }

    pub fn behavior(&self) -> BehaviorFlags {
        self.behavior
    }

    pub fn calls(&self) -> &[NativeCall] {
        &self.calls
    }

    pub fn take_calls(&mut self) -> Vec<NativeCall> {
        std::mem::take(&mut self.calls)
    }

    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    pub fn count_calls(&self, pred: impl Fn(&NativeCall) -> bool) -> usize {
        self.calls.iter().filter(|c| pred(c)).count()
    }

    /// Number of `SetRenderState` calls for `state`.
    pub fn render_state_count(&self, state: RenderState) -> usize {
        self.count_calls(|c| matches!(c, NativeCall::SetRenderState(s, _) if *s == state))
    }

    /// Last value written to `state`, if any.
    pub fn last_render_state(&self, state: RenderState) -> Option<u32> {
        self.calls.iter().rev().find_map(|c| match c {
            NativeCall::SetRenderState(s, v) if *s == state => Some(*v),
            _ => None,
        })
    }

    /// Objects created through this device and not yet released.
    pub fn live_objects(&self) -> usize {
        self.live.len()
    }

    pub fn set_cooperative_level(&mut self, level: CooperativeLevel) {
        self.level = level;
    }

    /// Simulate a lost device that is immediately resettable.
    pub fn lose(&mut self) {
        self.level = CooperativeLevel::NotReset;
    }

    fn alloc_handle(&mut self) -> Result<u32, NativeError> {
        if let Some(err) = self.creation_failures.pop_front() {
            return Err(err);
        }
        if self.level != CooperativeLevel::Ok {
            return Err(NativeError::DeviceLost);
        }
        let handle = self.next_handle;
        self.next_handle += 1;
        Ok(handle)
    }

    fn release(&mut self, object: LiveObject) {
        let removed = self.live.remove(&object);
        debug_assert!(removed, "released {object:?} twice or never created it");
    }
}

impl NativeDevice for RecordingDevice {
    fn cooperative_level(&self) -> CooperativeLevel {
        self.level
    }

    fn reset(&mut self, _params: &PresentParameters) -> Result<(), NativeError> {
        if self.level == CooperativeLevel::Lost {
            return Err(NativeError::DeviceLost);
        }
        if let Some(err) = self.reset_failure.take() {
            return Err(err);
        }
        if !self.live.is_empty() {
            return Err(NativeError::InvalidCall);
        }
        self.query_polls.clear();
        self.level = CooperativeLevel::Ok;
        self.calls.push(NativeCall::Reset);
        Ok(())
    }

    fn begin_scene(&mut self) -> Result<(), NativeError> {
        self.calls.push(NativeCall::BeginScene);
        Ok(())
    }

    fn end_scene(&mut self) -> Result<(), NativeError> {
        self.calls.push(NativeCall::EndScene);
        Ok(())
    }

    fn set_render_state(&mut self, state: RenderState, value: u32) {
        self.calls.push(NativeCall::SetRenderState(state, value));
    }

    fn set_scissor_rect(&mut self, rect: NativeRect) {
        self.calls.push(NativeCall::SetScissorRect(rect));
    }

    fn set_viewport(&mut self, viewport: NativeViewport) {
        self.calls.push(NativeCall::SetViewport(viewport));
    }

    fn set_render_target(&mut self, index: u32, surface: Option<SurfaceHandle>) {
        self.calls.push(NativeCall::SetRenderTarget(index, surface));
    }

    fn set_depth_stencil_surface(&mut self, surface: Option<SurfaceHandle>) {
        self.calls.push(NativeCall::SetDepthStencilSurface(surface));
    }

    fn create_vertex_shader(&mut self, _bytecode: &[u8]) -> Result<VertexShaderHandle, NativeError> {
        let handle = VertexShaderHandle(self.alloc_handle()?);
        self.live.insert(LiveObject::VertexShader(handle.0));
        self.calls.push(NativeCall::CreateVertexShader(handle));
        Ok(handle)
    }

    fn create_pixel_shader(&mut self, _bytecode: &[u8]) -> Result<PixelShaderHandle, NativeError> {
        let handle = PixelShaderHandle(self.alloc_handle()?);
        self.live.insert(LiveObject::PixelShader(handle.0));
        self.calls.push(NativeCall::CreatePixelShader(handle));
        Ok(handle)
    }

    fn release_vertex_shader(&mut self, shader: VertexShaderHandle) {
        self.release(LiveObject::VertexShader(shader.0));
        self.calls.push(NativeCall::ReleaseVertexShader(shader));
    }

    fn release_pixel_shader(&mut self, shader: PixelShaderHandle) {
        self.release(LiveObject::PixelShader(shader.0));
        self.calls.push(NativeCall::ReleasePixelShader(shader));
    }

    fn set_vertex_shader(&mut self, shader: Option<VertexShaderHandle>) {
        self.calls.push(NativeCall::SetVertexShader(shader));
    }

    fn set_pixel_shader(&mut self, shader: Option<PixelShaderHandle>) {
        self.calls.push(NativeCall::SetPixelShader(shader));
    }

    fn create_vertex_declaration(
        &mut self,
        elements: &[VertexElement],
    ) -> Result<VertexDeclarationHandle, NativeError> {
        let handle = VertexDeclarationHandle(self.alloc_handle()?);
        self.live.insert(LiveObject::Declaration(handle.0));
        self.calls
            .push(NativeCall::CreateVertexDeclaration(handle, elements.to_vec()));
        Ok(handle)
    }

    fn release_vertex_declaration(&mut self, declaration: VertexDeclarationHandle) {
        self.release(LiveObject::Declaration(declaration.0));
        self.calls
            .push(NativeCall::ReleaseVertexDeclaration(declaration));
    }

    fn set_vertex_declaration(&mut self, declaration: VertexDeclarationHandle) {
        self.calls.push(NativeCall::SetVertexDeclaration(declaration));
    }

    fn set_fvf(&mut self, fvf: u32) {
        self.calls.push(NativeCall::SetFvf(fvf));
    }

    fn set_stream_source(
        &mut self,
        stream: u32,
        buffer: VertexBufferHandle,
        offset: u32,
        stride: u32,
    ) {
        self.calls.push(NativeCall::SetStreamSource {
            stream,
            buffer,
            offset,
            stride,
        });
    }

    fn set_stream_source_freq(&mut self, stream: u32, frequency: StreamFrequency) {
        self.calls
            .push(NativeCall::SetStreamSourceFreq(stream, frequency));
    }

    fn create_query(&mut self, kind: QueryKind) -> Result<QueryHandle, NativeError> {
        let handle = QueryHandle(self.alloc_handle()?);
        self.live.insert(LiveObject::Query(handle.0));
        self.calls.push(NativeCall::CreateQuery(handle, kind));
        Ok(handle)
    }

    fn release_query(&mut self, query: QueryHandle) {
        self.query_polls.remove(&query.0);
        self.release(LiveObject::Query(query.0));
        self.calls.push(NativeCall::ReleaseQuery(query));
    }

    fn issue_query_end(&mut self, query: QueryHandle) -> Result<(), NativeError> {
        self.query_polls.insert(query.0, 0);
        self.calls.push(NativeCall::IssueQueryEnd(query));
        Ok(())
    }

    fn query_status(&mut self, query: QueryHandle, _flush: bool) -> Result<QueryStatus, NativeError> {
        self.calls.push(NativeCall::GetQueryData(query));
        let polls = self.query_polls.entry(query.0).or_insert(0);
        *polls += 1;
        let polls = *polls;

        if let Some((after, level)) = self.lose_after_query_polls {
            if polls >= after {
                self.level = level;
            }
        }
        // Like real drivers, a lost device may keep reporting "pending" rather than an error.
        if polls <= self.query_pending_polls || self.level != CooperativeLevel::Ok {
            return Ok(QueryStatus::Pending);
        }
        Ok(QueryStatus::Signaled)
    }

    fn draw_primitive(
        &mut self,
        primitive: D3dPrimitiveType,
        start_vertex: u32,
        primitive_count: u32,
    ) -> Result<(), NativeError> {
        self.calls.push(NativeCall::DrawPrimitive {
            primitive,
            start_vertex,
            primitive_count,
        });
        Ok(())
    }

    fn draw_primitive_up(
        &mut self,
        primitive: D3dPrimitiveType,
        primitive_count: u32,
        vertices: &[u8],
        stride: u32,
    ) -> Result<(), NativeError> {
        self.calls.push(NativeCall::DrawPrimitiveUp {
            primitive,
            primitive_count,
            bytes: vertices.len(),
            stride,
        });
        Ok(())
    }

    fn clear(
        &mut self,
        flags: ClearFlags,
        color: u32,
        depth: f32,
        stencil: u32,
    ) -> Result<(), NativeError> {
        self.calls.push(NativeCall::Clear {
            flags,
            color,
            depth,
            stencil,
        });
        Ok(())
    }

    fn read_render_target(
        &mut self,
        surface: SurfaceHandle,
        rect: NativeRect,
    ) -> Result<Vec<u8>, NativeError> {
        self.calls.push(NativeCall::ReadRenderTarget(surface, rect));
        if self.level != CooperativeLevel::Ok {
            return Err(NativeError::DeviceLost);
        }
        let width = (rect.right - rect.left).max(0) as usize;
        let height = (rect.bottom - rect.top).max(0) as usize;
        Ok(vec![0; width * height * 4])
    }
}
