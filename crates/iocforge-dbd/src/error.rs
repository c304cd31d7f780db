//! DBD access and reflection errors.

use std::path::PathBuf;

/// Errors raised while reading DBD files or validating record fields.
#[derive(Debug, thiserror::Error)]
pub enum DbdError {
    /// DBD file could not be located.
    #[error("DBD file not found: {path}")]
    FileNotFound { path: PathBuf },

    /// Syntax error in a DBD file.
    #[error("DBD parse error in {file} at line {line}: {detail}")]
    Parse {
        file: String,
        line: usize,
        detail: String,
    },

    /// A record type that no loaded DBD declares.
    #[error("unknown record type: {name}")]
    UnknownRecordType { name: String },

    /// A field name the record type's validator does not recognise.
    #[error("record type {record_type} has no field {field}")]
    UnknownField { record_type: String, field: String },

    /// The database rejected a proposed field value.
    ///
    /// `diagnostic` is the verifier's message, surfaced verbatim.
    #[error("invalid value for {record_type}.{field}: {diagnostic}")]
    InvalidValue {
        record_type: String,
        field: String,
        diagnostic: String,
    },

    /// The `address` alias needs exactly one of INP or OUT to be valid.
    #[error("record type {record_type} has no unambiguous address field")]
    NoAddressField { record_type: String },

    /// Menu referenced by a field but never declared.
    #[error("menu {menu} referenced by {record_type}.{field} is not defined")]
    UndefinedMenu {
        menu: String,
        record_type: String,
        field: String,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for DBD operations.
pub type Result<T> = std::result::Result<T, DbdError>;
