use thiserror::Error;

use crate::format::AbstractFormat;
use crate::native::NativeError;

/// Native object categories, used to tag creation failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Device,
    VertexShader,
    PixelShader,
    VertexDeclaration,
    Query,
}

/// Stages of the per-draw bind sequence.
///
/// Ordered: a stage may only be applied once every earlier stage has been applied since the last
/// render target change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BindStage {
    Nothing,
    RenderTarget,
    Shaders,
    VertexLayout,
}

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("no compatible native device could be created: {0}")]
    InitializationFailure(String),
    #[error("the native device is lost and must be reset")]
    DeviceLost,
    #[error("failed to create native {kind:?}: {source}")]
    ResourceCreationFailure {
        kind: ResourceKind,
        #[source]
        source: NativeError,
    },
    #[error("format {0:?} has no native equivalent")]
    UnsupportedFormat(AbstractFormat),
    #[error("unsupported configuration: {0}")]
    UnsupportedConfiguration(String),
    #[error("{operation} requires {required:?} to be bound first")]
    InvalidCallSequence {
        operation: &'static str,
        required: BindStage,
    },
    #[error("the native device cannot be recovered: {0}")]
    Unrecoverable(String),
    #[error("viewport clamps to an empty {width}x{height} region")]
    DegenerateViewport { width: i32, height: i32 },
    #[error("no shader compiler module is loaded")]
    CompilerUnavailable,
    #[error("shader compilation failed: {0}")]
    Compile(String),
}

impl BackendError {
    pub(crate) fn creation(kind: ResourceKind, source: NativeError) -> Self {
        // A lost device surfaces as a creation failure from the driver; report it as the sticky
        // condition so callers take the reset path.
        if source.is_device_lost() {
            return Self::DeviceLost;
        }
        Self::ResourceCreationFailure { kind, source }
    }

    /// Whether this error is per-call recoverable (retry, fall back or skip the draw).
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            Self::Unrecoverable(_) | Self::InitializationFailure(_)
        )
    }
}
