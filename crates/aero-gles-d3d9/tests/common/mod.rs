//! Shared helpers for `aero-gles-d3d9` integration tests.
//!
//! Everything runs against the recording stand-in, so tests count native calls instead of
//! inspecting pixels.

#![allow(dead_code)]

use aero_gles_d3d9::native::recording::{RecordingDevice, RecordingDriver};
use aero_gles_d3d9::native::{SurfaceHandle, VertexBufferHandle};
use aero_gles_d3d9::state::RenderTargetInfo;
use aero_gles_d3d9::vertex::{ComponentType, ProgramInputs, TranslatedAttribute};
use aero_gles_d3d9::{
    BackendConfig, RenderBackend, RenderTargetBinding, ShaderProgram, SurfaceBinding,
};

pub const TARGET_WIDTH: u32 = 256;
pub const TARGET_HEIGHT: u32 = 128;

/// Route `tracing` output through the test harness. Safe to call from every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

pub fn backend_with(driver: RecordingDriver) -> RenderBackend<RecordingDriver> {
    init_tracing();
    let mut backend = RenderBackend::new(driver, BackendConfig::default());
    backend
        .initialize()
        .expect("recording driver should always initialize");
    backend
}

pub fn backend() -> RenderBackend<RecordingDriver> {
    backend_with(RecordingDriver::new())
}

pub fn device(backend: &mut RenderBackend<RecordingDriver>) -> &mut RecordingDevice {
    backend
        .native_device_mut()
        .expect("backend should own a device after initialize")
}

pub fn render_target() -> RenderTargetBinding {
    RenderTargetBinding {
        color: SurfaceBinding {
            surface: SurfaceHandle(1000),
            serial: 1,
        },
        depth_stencil: Some(SurfaceBinding {
            surface: SurfaceHandle(1001),
            serial: 2,
        }),
        info: RenderTargetInfo {
            width: TARGET_WIDTH,
            height: TARGET_HEIGHT,
            depth_size: 24,
            stencil_size: 8,
        },
    }
}

/// A float4 client array on `buffer` advancing per vertex (`divisor == 0`) or per instance.
pub fn float4_attribute(buffer: u32, divisor: u32) -> TranslatedAttribute {
    TranslatedAttribute {
        array_enabled: true,
        ty: ComponentType::Float,
        normalized: false,
        components: 4,
        buffer: VertexBufferHandle(buffer),
        serial: buffer,
        stride: 16,
        offset: 0,
        divisor,
    }
}

/// A program consuming attributes `0..count` with matching semantic indices.
pub fn program_inputs(count: usize) -> ProgramInputs {
    (0..count).fold(ProgramInputs::new(), |inputs, i| {
        inputs
            .with_input(i, i as u8)
            .expect("attribute index within limits")
    })
}

/// Bind the render target and a trivial program, leaving the vertex layout to the test.
pub fn bind_target_and_program(backend: &mut RenderBackend<RecordingDriver>) -> ShaderProgram {
    backend
        .bind_render_target(&render_target())
        .expect("bind render target");
    let vertex = backend
        .create_vertex_shader(b"vs_3_0 passthrough")
        .expect("create vertex shader");
    let pixel = backend
        .create_pixel_shader(b"ps_3_0 solid")
        .expect("create pixel shader");
    let program = ShaderProgram {
        serial: 1,
        vertex,
        pixel,
    };
    backend.bind_shaders(&program).expect("bind shaders");
    program
}
