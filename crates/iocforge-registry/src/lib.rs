//! Support-module registry for iocforge.
//!
//! A build pins each support module to a version with
//! [`ModuleRegistry::declare_module`], which computes the module's library
//! path and macro identifier and loads its builder manifest: a TOML file
//! declaring the device classes and substitution templates the module
//! contributes. [`ReleaseTree`] reads the `configure/RELEASE` dependency
//! graph a module was built against.

pub mod builder;
pub mod error;
pub mod module;
pub mod tree;

pub use builder::{BuilderManifest, DeviceEntry, TemplateEntry};
pub use error::{RegistryError, Result};
pub use module::{macro_ident, ModuleRegistry, ModuleSpec, ModuleVersion};
pub use tree::{parse_release, ReleaseLeaf, ReleaseTree};
