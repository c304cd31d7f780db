//! Device descriptors and instances.
//!
//! A [`DeviceDefinition`] is the explicit descriptor for one device class:
//! its owning module, dependencies, the files it contributes to the build,
//! and a phase table of initialisation hooks. Hooks are command templates
//! (`$(KEY)` macros) expanded against each instance's parameter map when the
//! planner runs.

use std::collections::BTreeMap;

use indexmap::IndexMap;

/// An initialisation phase bucket.
///
/// `First` orders before every numeric phase; numeric phases order
/// ascending, so negative phases run before the default phase zero and
/// positive phases after it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Phase {
    First,
    At(i32),
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::First => write!(f, "first"),
            Phase::At(n) => write!(f, "{n}"),
        }
    }
}

/// The hooks a device class contributes to one phase.
///
/// `once` runs a single time per class per phase, no matter how many
/// instances exist; `each` runs for every instance in creation order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PhaseHooks {
    pub once: Vec<String>,
    pub each: Vec<String>,
}

impl PhaseHooks {
    pub fn is_empty(&self) -> bool {
        self.once.is_empty() && self.each.is_empty()
    }
}

/// Descriptor for one device class.
#[derive(Debug, Clone, Default)]
pub struct DeviceDefinition {
    /// Class name, unique within the graph.
    pub name: String,
    /// Owning module name.
    pub module: String,
    /// Names of definitions that must be referenced before this one.
    pub dependencies: Vec<String>,
    /// Whether a dependency on this class may instantiate it implicitly.
    pub auto_instantiate: bool,
    /// Shared library files, loaded when dynamic loading is configured.
    pub libraries: Vec<String>,
    /// System libraries named in the source makefile.
    pub system_libraries: Vec<String>,
    /// Binary object files, loaded unconditionally.
    pub binaries: Vec<String>,
    /// DBD files contributing record types.
    pub dbd_files: Vec<String>,
    /// Extra makefile fragments.
    pub makefile_fragments: Vec<String>,
    /// Initialisation hooks keyed by phase.
    pub phases: BTreeMap<Phase, PhaseHooks>,
    /// Hooks run after `iocInit`, in a separate pass.
    pub post_init: PhaseHooks,
}

impl DeviceDefinition {
    pub fn new(name: impl Into<String>, module: impl Into<String>) -> Self {
        DeviceDefinition {
            name: name.into(),
            module: module.into(),
            ..DeviceDefinition::default()
        }
    }

    /// Prepend a base class's dependency list to this one.
    ///
    /// The effective dependency order is each base's aggregated dependencies
    /// followed by this class's own, in declaration order.
    pub fn inherit_dependencies(&mut self, base: &DeviceDefinition) {
        let mut merged = base.dependencies.clone();
        merged.extend(std::mem::take(&mut self.dependencies));
        self.dependencies = merged;
    }

    /// Whether this class contributes anything to a library-load block.
    pub fn has_library_block(&self) -> bool {
        !self.libraries.is_empty() || !self.binaries.is_empty() || !self.dbd_files.is_empty()
    }
}

/// One created instance of a device class.
#[derive(Debug, Clone)]
pub struct DeviceInstance {
    /// Name of the class this instantiates.
    pub definition: String,
    /// Macro bindings fed to hook command templates.
    pub parameters: IndexMap<String, String>,
    /// Commands emitted before `iocInit`, flushed at phase zero.
    pub pre_init_commands: Vec<String>,
    /// Commands emitted after `iocInit`.
    pub post_init_commands: Vec<String>,
}

impl DeviceInstance {
    pub fn new(definition: impl Into<String>, parameters: IndexMap<String, String>) -> Self {
        DeviceInstance {
            definition: definition.into(),
            parameters,
            pre_init_commands: Vec::new(),
            post_init_commands: Vec::new(),
        }
    }

    /// Queue a command to run before `iocInit`.
    pub fn command(&mut self, line: impl Into<String>) {
        self.pre_init_commands.push(line.into());
    }

    /// Queue a command to run after `iocInit`.
    pub fn post_init_command(&mut self, line: impl Into<String>) {
        self.post_init_commands.push(line.into());
    }
}
