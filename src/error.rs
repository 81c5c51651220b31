//! Error types shared by every engine component.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors produced by the engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Terminal or pipe I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The native windowing connection failed or a request was rejected.
    #[error("native backend: {0}")]
    Native(String),

    /// A bridge helper could not be spawned or its pipes broke.
    #[error("bridge backend: {0}")]
    Bridge(String),

    /// Neither event backend could be initialized.
    #[error("no usable event backend (native: {native}; bridge: {bridge})")]
    NoBackend {
        /// Why the native backend was rejected.
        native: String,
        /// Why the bridge backend was rejected.
        bridge: String,
    },

    /// The active backend cannot perform the requested operation.
    #[error("{operation} is not supported by the {backend} backend")]
    Unsupported {
        /// Operation that was attempted.
        operation: &'static str,
        /// Backend that rejected it.
        backend: &'static str,
    },

    /// The accelerator failed; the frame can still be produced on the CPU.
    #[error("accelerator device error: {0}")]
    Device(String),

    /// The device program could not be loaded, compiled or linked.
    #[error("failed to build device program: {0}")]
    ProgramBuild(String),
}

impl EngineError {
    /// Whether the render loop may continue after this error by falling back
    /// to the CPU path.
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::Device(_))
    }
}
