//! Target configuration errors.

use std::path::PathBuf;

/// Errors raised while resolving target and install configuration.
#[derive(Debug, thiserror::Error)]
pub enum TargetError {
    /// The EPICS base install is required but was never configured.
    #[error("EPICS base install has not been configured")]
    BaseNotConfigured,

    /// The configured EPICS base install does not exist on disk.
    #[error("EPICS base install not found at {path}")]
    BaseMissing { path: PathBuf },

    /// The module search root does not exist on disk.
    #[error("module search root not found at {path}")]
    SupportRootMissing { path: PathBuf },

    /// The architecture string is empty or malformed.
    #[error("unrecognised target architecture: {arch:?}")]
    UnrecognisedArchitecture { arch: String },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for target operations.
pub type Result<T> = std::result::Result<T, TargetError>;
