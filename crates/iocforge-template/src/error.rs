//! Template and substitution errors.

use std::path::PathBuf;

/// Errors raised while scanning templates or instantiating substitutions.
#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    /// Template file could not be located.
    #[error("template file not found: {path}")]
    FileNotFound { path: PathBuf },

    /// A required argument was not supplied.
    #[error("template {template}: missing required argument {name}")]
    MissingArgument { template: String, name: String },

    /// An argument was supplied that the template does not declare.
    #[error("template {template}: unexpected argument {name}")]
    UnexpectedArgument { template: String, name: String },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for template operations.
pub type Result<T> = std::result::Result<T, TemplateError>;
