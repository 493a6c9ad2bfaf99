//! `aero-gles-d3d9` executes OpenGL ES 2.0 rendering on a Direct3D 9 class device.
//!
//! The crate sits below an already-validating GL context and provides:
//! - Native device ownership, capability probing and the device-loss/reset state machine
//!   (see [`DeviceManager`]).
//! - Redundant-state elimination for the fixed-function pipeline (see [`state::StateCache`]).
//! - A bounded LRU cache of native vertex declarations (see [`vertex::VertexFormatCache`]).
//! - Shader object caching, a synchronization query pool and format/multisample selection.
//! - The per-draw facade tying them together (see [`RenderBackend`]).
//!
//! The native API is reached only through [`native::NativeDriver`] / [`native::NativeDevice`];
//! [`native::recording`] provides a deterministic stand-in.

mod backend;
mod caps;
mod config;
mod device;
mod error;
mod format;
mod query_pool;
mod shader_cache;
mod stats;

pub mod compiler;
pub mod native;
pub mod primitive;
pub mod state;
pub mod vertex;

pub use backend::{
    ClearRequest, PipelineState, RenderBackend, RenderTargetBinding, ShaderProgram,
    SurfaceBinding,
};
pub use caps::{
    check_minimum, swap_interval_bounds, CapsRejection, DeviceCaps, FloatTextureSupport,
    FormatSupport, ShaderModel, VENDOR_ID_AMD, VENDOR_ID_INTEL, VENDOR_ID_NVIDIA,
};
pub use config::{BackendConfig, ADAPTER_ENV, DISABLE_EXTENDED_DEVICE_ENV, REFERENCE_DEVICE_ENV};
pub use device::{DeviceEventSink, DeviceManager, DeviceStatus, NoExternalResources};
pub use error::{BackendError, BindStage, ResourceKind};
pub use format::{AbstractFormat, ResourceTranslator};
pub use query_pool::{PooledQuery, QueryPool};
pub use shader_cache::{ShaderCacheLookupSource, ShaderObjectCache};
pub use stats::{BackendStats, BackendStatsSnapshot};
