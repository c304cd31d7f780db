//! Instance-graph and planner errors.

use std::path::PathBuf;

/// Errors raised while building or closing the instance graph.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// A device definition name was registered twice.
    #[error("device definition {name} is already registered")]
    DuplicateDefinition { name: String },

    /// An instantiation or dependency named a definition that was never
    /// registered.
    #[error("unknown device definition: {name}")]
    UnknownDefinition { name: String },

    /// A dependency is not auto-instantiable and was never instantiated by
    /// user code.
    #[error("device {definition}: dependency {dependency} is not auto-instantiable and has not been instantiated")]
    DependencyNotInstantiated {
        definition: String,
        dependency: String,
    },

    /// A substitution template name was declared twice.
    #[error("template {name} is already declared")]
    DuplicateTemplate { name: String },

    /// A substitution named a template that was never declared.
    #[error("unknown template: {name}")]
    UnknownTemplate { name: String },

    /// Two records were created with the same full name.
    #[error("duplicate record name: {name}")]
    DuplicateRecordName { name: String },

    /// A link referenced a record that is not in the graph.
    #[error("record {record}.{field}: link target {target} does not exist")]
    UnknownLinkTarget {
        record: String,
        field: String,
        target: String,
    },

    /// A link referenced a field its target's record type does not declare.
    #[error("link target {target} has no field {field}")]
    InvalidLinkField { target: String, field: String },

    /// An interrupt-vector allocation would exceed the ceiling.
    #[error("interrupt vector allocation of {count} from {next:#04x} exceeds the ceiling of 255")]
    VectorOverflow { next: u16, count: u16 },

    /// Two data files claimed the same logical path with different sources.
    #[error("data file path collision: {path}")]
    DataFileCollision { path: PathBuf },

    /// Field validation failure surfaced from the descriptor database.
    #[error(transparent)]
    Dbd(#[from] iocforge_dbd::DbdError),

    /// Substitution instantiation failure.
    #[error(transparent)]
    Template(#[from] iocforge_template::TemplateError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for graph operations.
pub type Result<T> = std::result::Result<T, CoreError>;
