//! Emitter errors.

use std::path::PathBuf;

/// Errors raised while emitting the startup script or the IOC tree.
#[derive(Debug, thiserror::Error)]
pub enum EmitError {
    /// A generated startup-script line exceeds the length limit.
    #[error("startup script line is {length} characters, the limit is 126: {line}")]
    LineTooLong { line: String, length: usize },

    /// The output directory holds something the writer did not produce.
    #[error("output directory {path} contains unexpected entry {entry}; refusing to delete")]
    UnexpectedDirectoryContent { path: PathBuf, entry: String },

    /// The external macro expansion tool failed.
    #[error("msi failed on {template}: {detail}")]
    MsiFailed { template: String, detail: String },

    /// Graph failure during emission.
    #[error(transparent)]
    Core(#[from] iocforge_core::CoreError),

    /// Module lookup failure while writing RELEASE or makefiles.
    #[error(transparent)]
    Registry(#[from] iocforge_registry::RegistryError),

    /// Path-configuration failure.
    #[error(transparent)]
    Target(#[from] iocforge_targets::TargetError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for emitters.
pub type Result<T> = std::result::Result<T, EmitError>;
