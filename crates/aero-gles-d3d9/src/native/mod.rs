//! Native device interface.
//!
//! The translation core talks to the GPU only through the two traits below. A concrete native API
//! generation (D3D9, D3D9Ex, a recording stand-in for tests) implements them once and is selected
//! when the [`crate::RenderBackend`] is constructed; all dispatch past that point is static.
//!
//! Neither trait is thread-safe by contract: a device is driven from the one thread that owns it.

pub mod recording;
mod types;

pub use types::*;

use crate::vertex::VertexElement;

/// Adapter-level entry point (`IDirect3D9` / `IDirect3D9Ex`).
pub trait NativeDriver {
    type Device: NativeDevice;

    fn adapter_count(&self) -> u32;

    fn adapter_identifier(&self, adapter: u32) -> Result<AdapterIdentifier, NativeError>;

    /// `GetDeviceCaps`. May report [`NativeError::NotAvailable`] while the driver is still
    /// starting up.
    fn device_caps(&self, adapter: u32, device_type: DeviceType) -> Result<NativeCaps, NativeError>;

    /// Whether the platform offers the extended (loss-free swap) device variant.
    fn supports_extended(&self) -> bool;

    fn check_device_format(
        &self,
        adapter: u32,
        device_type: DeviceType,
        usage: FormatUsage,
        resource: ResourceType,
        format: NativeFormat,
    ) -> bool;

    /// `CheckDeviceMultiSampleType` for a windowed surface of `format`.
    fn check_multisample(
        &self,
        adapter: u32,
        device_type: DeviceType,
        format: NativeFormat,
        samples: SampleCount,
    ) -> bool;

    fn create_device(
        &mut self,
        adapter: u32,
        device_type: DeviceType,
        behavior: BehaviorFlags,
        params: &PresentParameters,
        extended: bool,
    ) -> Result<Self::Device, NativeError>;
}

/// Device-level interface (`IDirect3DDevice9` / `IDirect3DDevice9Ex`).
///
/// State setters mirror the native API, which reports no per-call status for them.
pub trait NativeDevice {
    /// `TestCooperativeLevel` (or `CheckDeviceState` on an extended device).
    fn cooperative_level(&self) -> CooperativeLevel;

    /// `Reset` / `ResetEx`. Every object created through this device must have been released.
    fn reset(&mut self, params: &PresentParameters) -> Result<(), NativeError>;

    fn begin_scene(&mut self) -> Result<(), NativeError>;
    fn end_scene(&mut self) -> Result<(), NativeError>;

    fn set_render_state(&mut self, state: RenderState, value: u32);
    fn set_scissor_rect(&mut self, rect: NativeRect);
    fn set_viewport(&mut self, viewport: NativeViewport);

    fn set_render_target(&mut self, index: u32, surface: Option<SurfaceHandle>);
    fn set_depth_stencil_surface(&mut self, surface: Option<SurfaceHandle>);

    fn create_vertex_shader(&mut self, bytecode: &[u8]) -> Result<VertexShaderHandle, NativeError>;
    fn create_pixel_shader(&mut self, bytecode: &[u8]) -> Result<PixelShaderHandle, NativeError>;
    fn release_vertex_shader(&mut self, shader: VertexShaderHandle);
    fn release_pixel_shader(&mut self, shader: PixelShaderHandle);
    fn set_vertex_shader(&mut self, shader: Option<VertexShaderHandle>);
    fn set_pixel_shader(&mut self, shader: Option<PixelShaderHandle>);

    fn create_vertex_declaration(
        &mut self,
        elements: &[VertexElement],
    ) -> Result<VertexDeclarationHandle, NativeError>;
    fn release_vertex_declaration(&mut self, declaration: VertexDeclarationHandle);
    fn set_vertex_declaration(&mut self, declaration: VertexDeclarationHandle);
    /// Fixed-function vertex format, used only for pre-transformed internal geometry.
    fn set_fvf(&mut self, fvf: u32);

    fn set_stream_source(
        &mut self,
        stream: u32,
        buffer: VertexBufferHandle,
        offset: u32,
        stride: u32,
    );
    fn set_stream_source_freq(&mut self, stream: u32, frequency: StreamFrequency);

    fn create_query(&mut self, kind: QueryKind) -> Result<QueryHandle, NativeError>;
    fn release_query(&mut self, query: QueryHandle);
    /// `Issue(D3DISSUE_END)`.
    fn issue_query_end(&mut self, query: QueryHandle) -> Result<(), NativeError>;
    /// `GetData(NULL, 0, flush ? D3DGETDATA_FLUSH : 0)`.
    fn query_status(&mut self, query: QueryHandle, flush: bool) -> Result<QueryStatus, NativeError>;

    fn draw_primitive(
        &mut self,
        primitive: D3dPrimitiveType,
        start_vertex: u32,
        primitive_count: u32,
    ) -> Result<(), NativeError>;
    /// `DrawPrimitiveUP` from caller memory.
    fn draw_primitive_up(
        &mut self,
        primitive: D3dPrimitiveType,
        primitive_count: u32,
        vertices: &[u8],
        stride: u32,
    ) -> Result<(), NativeError>;

    fn clear(
        &mut self,
        flags: ClearFlags,
        color: u32,
        depth: f32,
        stencil: u32,
    ) -> Result<(), NativeError>;

    /// Copy `rect` of a render target into system memory, in the surface's native layout.
    fn read_render_target(
        &mut self,
        surface: SurfaceHandle,
        rect: NativeRect,
    ) -> Result<Vec<u8>, NativeError>;
}
