//! Error types for the runtime crate.

use crate::builder::SetupStage;
use ash::vk;
use std::path::PathBuf;
use thiserror::Error;

/// Runtime errors.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// The Vulkan loader library could not be found or loaded.
    #[error("Vulkan loader unavailable: {0}")]
    Loader(String),

    /// GPU initialization failed.
    #[error("GPU initialization failed: {0}")]
    InitError(String),

    /// The instance reports no physical devices.
    #[error("no physical device available")]
    NoSuitableDevice,

    /// The selected device has no queue family advertising compute.
    #[error("device '{0}' has no compute-capable queue family")]
    NoComputeQueueFamily(String),

    /// No memory type satisfies both the requirement mask and the property flags.
    #[error("no memory type with filter={type_bits:#x} flags={flags:?}")]
    NoSuitableMemoryType {
        type_bits: u32,
        flags: vk::MemoryPropertyFlags,
    },

    /// The kernel binary could not be read or is not a SPIR-V word stream.
    #[error("failed to load kernel '{}': {source}", path.display())]
    ShaderLoad {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Buffer allocation failed.
    #[error("Buffer allocation failed: {0}")]
    AllocationError(String),

    /// Compute pipeline creation failed.
    #[error("pipeline creation failed: {0}")]
    PipelineCreation(String),

    /// A buffer or pipeline specification is unusable.
    #[error("invalid specification: {0}")]
    InvalidSpecification(String),

    /// Recording or submitting a command list failed.
    #[error("command submission failed: {0}")]
    CommandError(String),

    /// A task was executed against a context whose device did not create it.
    #[error("task was built against a different device")]
    DeviceMismatch,

    /// A raw Vulkan call returned an error code.
    #[error("{call} failed: {result}")]
    Vulkan {
        call: &'static str,
        result: vk::Result,
    },

    /// One of the builder's setup steps failed; everything acquired before it was released.
    #[error("task setup failed at {stage}: {source}")]
    Build {
        stage: SetupStage,
        #[source]
        source: Box<RuntimeError>,
    },
}

impl RuntimeError {
    /// Adapter for `map_err` on raw `ash` calls.
    pub(crate) fn vulkan(call: &'static str) -> impl FnOnce(vk::Result) -> Self {
        move |result| Self::Vulkan { call, result }
    }

    /// Returns the failed setup stage if this error came out of the builder.
    pub fn stage(&self) -> Option<SetupStage> {
        match self {
            Self::Build { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

/// Specialized Result type for runtime operations.
pub type Result<T> = std::result::Result<T, RuntimeError>;
