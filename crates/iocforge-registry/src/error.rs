//! Module-registry errors.

use std::path::PathBuf;

/// Errors raised while declaring modules or loading builder manifests.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// Two module declarations produced the same macro identifier.
    #[error("module macro identifier {ident} is already declared (use override to supersede)")]
    DuplicateModule { ident: String },

    /// An override was requested for a module never declared.
    #[error("override requested for {name}, but no prior declaration exists")]
    OverrideWithoutPrior { name: String },

    /// A module declaration was made while another module was loading.
    #[error("cannot declare module {name} while {loading} is being loaded")]
    NestedModuleLoad { loading: String, name: String },

    /// The computed module library path does not exist.
    #[error("module library path does not exist: {path}")]
    LibraryPathMissing { path: PathBuf },

    /// A name was looked up that no declaration registered.
    #[error("unknown module: {name}")]
    UnknownModule { name: String },

    /// A builder manifest failed to parse.
    #[error("builder manifest {path}: {source}")]
    Manifest {
        path: PathBuf,
        source: toml::de::Error,
    },

    /// Instance-graph failure during manifest loading.
    #[error(transparent)]
    Core(#[from] iocforge_core::CoreError),

    /// DBD loading failure during manifest loading.
    #[error(transparent)]
    Dbd(#[from] iocforge_dbd::DbdError),

    /// Template declaration failure during manifest loading.
    #[error(transparent)]
    Template(#[from] iocforge_template::TemplateError),

    /// Path-configuration failure.
    #[error(transparent)]
    Target(#[from] iocforge_targets::TargetError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for registry operations.
pub type Result<T> = std::result::Result<T, RegistryError>;
