//! Emitters for iocforge.
//!
//! Everything the declarative phase accumulated in the instance graph is
//! serialised here: the startup script ([`ScriptWriter`]), the record
//! database ([`write_database`]), substitutions files
//! ([`write_substitutions`] or [`expand_inline`] via the external `msi`
//! tool), and the full IOC application tree ([`IocTreeWriter`]). Emission
//! is deterministic: identical graphs produce byte-identical trees, and no
//! partial tree survives an error in an entry the writer owns.

pub mod database;
pub mod error;
pub mod script;
pub mod substitutions;
pub mod tree;

use std::path::Path;

use iocforge_core::InstanceGraph;
use iocforge_dbd::RecordTypeRegistry;
use iocforge_registry::ModuleRegistry;
use iocforge_targets::Configuration;

pub use database::write_database;
pub use error::{EmitError, Result};
pub use script::{ScriptOptions, ScriptWriter};
pub use substitutions::{expand_inline, write_substitutions, SubstitutionsFile};
pub use tree::{EmitReport, IocTreeWriter};

/// Close the graph and write the full IOC tree.
///
/// Deferred record links are resolved first; any dangling reference aborts
/// before a single file is written.
pub fn emit_ioc(
    config: &Configuration,
    graph: &InstanceGraph,
    records: &RecordTypeRegistry,
    modules: &ModuleRegistry,
    root: &Path,
    domain: &str,
    ioc_name: &str,
    options: &ScriptOptions,
) -> Result<EmitReport> {
    graph.resolve_links(records)?;
    IocTreeWriter::new(config, graph, modules).write(root, domain, ioc_name, options)
}
