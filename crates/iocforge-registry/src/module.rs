//! Module declaration and the registry.
//!
//! `declare_module` pins a support module to a version, computes its
//! library path and macro identifier, locates its builder manifest, and
//! loads the manifest's device classes and templates into the build. The
//! module being loaded is tracked by a marker so definitions bind to the
//! right module and nested declarations are rejected.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;

use iocforge_core::InstanceGraph;
use iocforge_dbd::RecordTypeRegistry;
use iocforge_targets::Configuration;

use crate::builder::BuilderManifest;
use crate::error::{RegistryError, Result};

/// Fold a module name into its macro identifier: uppercased, with
/// non-identifier characters replaced by underscores.
pub fn macro_ident(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}

/// A declared support module pinned to one version.
#[derive(Debug, Clone)]
pub struct ModuleVersion {
    /// Module name as declared.
    pub name: String,
    /// Pinned version string; `None` elides the version path component.
    pub version: Option<String>,
    /// Root under which the module lives.
    pub home: PathBuf,
    /// Whether the name contributes a path component.
    pub use_name: bool,
    /// Macro identifier used in RELEASE files, unique across declarations.
    pub macro_ident: String,
    /// `home / name / version` with elisions per the flags; exists on disk.
    pub lib_path: PathBuf,
}

impl ModuleVersion {
    fn compute_lib_path(name: &str, version: Option<&str>, home: &Path, use_name: bool) -> PathBuf {
        let mut path = home.to_path_buf();
        if use_name {
            path.push(name);
        }
        if let Some(version) = version {
            path.push(version);
        }
        path
    }
}

/// Parameters of one `declare_module` call.
#[derive(Debug, Clone)]
pub struct ModuleSpec {
    pub name: String,
    pub version: Option<String>,
    /// Defaults to the configured support root.
    pub home: Option<PathBuf>,
    pub use_name: bool,
    /// Skip builder-manifest loading entirely.
    pub suppress_import: bool,
    /// Extra directory searched first for `<name>.toml`.
    pub load_path: Option<PathBuf>,
    /// Supersede a prior declaration with the same macro identifier.
    pub override_existing: bool,
    /// Instantiate every auto-instantiable definition this load declares.
    pub auto_instantiate: bool,
}

impl ModuleSpec {
    pub fn new(name: impl Into<String>) -> Self {
        ModuleSpec {
            name: name.into(),
            version: None,
            home: None,
            use_name: true,
            suppress_import: false,
            load_path: None,
            override_existing: false,
            auto_instantiate: false,
        }
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn home(mut self, home: impl Into<PathBuf>) -> Self {
        self.home = Some(home.into());
        self
    }

    pub fn use_name(mut self, use_name: bool) -> Self {
        self.use_name = use_name;
        self
    }

    pub fn suppress_import(mut self) -> Self {
        self.suppress_import = true;
        self
    }

    pub fn load_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.load_path = Some(path.into());
        self
    }

    pub fn override_existing(mut self) -> Self {
        self.override_existing = true;
        self
    }

    pub fn auto_instantiate(mut self) -> Self {
        self.auto_instantiate = true;
        self
    }
}

/// Definition and template names one module's manifest declared.
#[derive(Debug, Default)]
struct Namespace {
    definitions: Vec<String>,
    templates: Vec<String>,
}

/// All declared modules plus their loaded definition namespaces.
#[derive(Debug)]
pub struct ModuleRegistry {
    config: Configuration,
    /// Declared modules keyed by macro identifier, in declaration order.
    modules: IndexMap<String, ModuleVersion>,
    /// Names declared per module, keyed by macro identifier.
    namespaces: IndexMap<String, Namespace>,
    /// Module currently loading its manifest, if any.
    loading: Option<String>,
    warnings: Vec<String>,
}

impl ModuleRegistry {
    pub fn new(config: Configuration) -> Self {
        ModuleRegistry {
            config,
            modules: IndexMap::new(),
            namespaces: IndexMap::new(),
            loading: None,
            warnings: Vec::new(),
        }
    }

    pub fn config(&self) -> &Configuration {
        &self.config
    }

    /// Declare a module and load its builder manifest.
    ///
    /// The library path `home / name / version` must exist. The macro
    /// identifier must be new unless the spec overrides, in which case a
    /// prior declaration must exist and the new declaration supersedes it:
    /// the prior manifest's definitions and templates are removed from the
    /// graph before the new manifest is loaded. Definitions and templates
    /// declared by the manifest are registered in `graph`; DBD files are
    /// loaded into `records` on behalf of their device class. A failed
    /// declaration leaves the registry's module table unchanged.
    pub fn declare_module(
        &mut self,
        spec: ModuleSpec,
        graph: &mut InstanceGraph,
        records: &mut RecordTypeRegistry,
    ) -> Result<&ModuleVersion> {
        if let Some(loading) = &self.loading {
            return Err(RegistryError::NestedModuleLoad {
                loading: loading.clone(),
                name: spec.name,
            });
        }

        let ident = macro_ident(&spec.name);
        match (self.modules.contains_key(&ident), spec.override_existing) {
            (true, false) => return Err(RegistryError::DuplicateModule { ident }),
            (false, true) => {
                return Err(RegistryError::OverrideWithoutPrior { name: spec.name })
            }
            _ => {}
        }

        let home = match &spec.home {
            Some(home) => home.clone(),
            None => self.config.support_root()?.to_path_buf(),
        };
        let lib_path =
            ModuleVersion::compute_lib_path(&spec.name, spec.version.as_deref(), &home, spec.use_name);
        if !lib_path.is_dir() {
            return Err(RegistryError::LibraryPathMissing { path: lib_path });
        }

        let module = ModuleVersion {
            name: spec.name.clone(),
            version: spec.version.clone(),
            home,
            use_name: spec.use_name,
            macro_ident: ident.clone(),
            lib_path: lib_path.clone(),
        };

        if !spec.suppress_import {
            // A superseding load re-declares the same names: the prior
            // manifest's registrations must go first.
            if spec.override_existing {
                if let Some(prior) = self.namespaces.shift_remove(&ident) {
                    for name in &prior.definitions {
                        graph.remove_definition(name);
                    }
                    for name in &prior.templates {
                        graph.remove_template(name);
                    }
                }
            }

            self.loading = Some(spec.name.clone());
            let loaded = self.load_manifest(&spec, &lib_path, graph, records);
            // The marker is cleared whether loading succeeded or not.
            self.loading = None;
            let declared = loaded?;

            if spec.auto_instantiate {
                for name in &declared {
                    if graph.definition(name)?.auto_instantiate {
                        graph.instantiate(name, IndexMap::new())?;
                    }
                }
            }
        }

        self.modules.insert(ident.clone(), module);
        Ok(&self.modules[&ident])
    }

    /// Load the builder manifest of `spec`, registering everything it
    /// declares. Returns the names of the declared definitions.
    fn load_manifest(
        &mut self,
        spec: &ModuleSpec,
        lib_path: &Path,
        graph: &mut InstanceGraph,
        records: &mut RecordTypeRegistry,
    ) -> Result<Vec<String>> {
        let Some(manifest_path) = self.find_manifest(spec, lib_path) else {
            self.warnings
                .push(format!("module {}: no builder manifest found", spec.name));
            return Ok(Vec::new());
        };
        let manifest = BuilderManifest::load(&manifest_path)?;

        let dbd_dir = lib_path.join("dbd");
        let dbd_dir = if dbd_dir.is_dir() {
            dbd_dir
        } else {
            lib_path.to_path_buf()
        };

        let mut namespace = Namespace::default();
        for entry in manifest.devices {
            let definition = entry.into_definition(&spec.name);
            for dbd_file in &definition.dbd_files {
                records.load_dbd_file(&definition.name, &dbd_dir, dbd_file)?;
            }
            namespace.definitions.push(definition.name.clone());
            graph.register_definition(definition)?;
        }
        for entry in manifest.templates {
            let template = entry.into_template(lib_path)?;
            namespace.templates.push(template.name.clone());
            graph.declare_template(template)?;
        }

        let declared = namespace.definitions.clone();
        self.namespaces.insert(macro_ident(&spec.name), namespace);
        Ok(declared)
    }

    /// Search order for the builder manifest.
    fn find_manifest(&self, spec: &ModuleSpec, lib_path: &Path) -> Option<PathBuf> {
        let mut candidates = Vec::new();
        if let Some(load_path) = &spec.load_path {
            candidates.push(load_path.join(format!("{}.toml", spec.name)));
        }
        candidates.push(lib_path.join("etc/builder.toml"));
        candidates.push(lib_path.join("builder.toml"));
        if let Some(defaults) = &self.config.defaults_dir {
            candidates.push(defaults.join(format!("{}.toml", spec.name)));
        }
        candidates.into_iter().find(|c| c.is_file())
    }

    /// Look up a declared module by name.
    pub fn module(&self, name: &str) -> Result<&ModuleVersion> {
        self.modules
            .get(&macro_ident(name))
            .ok_or_else(|| RegistryError::UnknownModule {
                name: name.to_string(),
            })
    }

    /// Declared modules in declaration order.
    pub fn modules(&self) -> impl Iterator<Item = &ModuleVersion> {
        self.modules.values()
    }

    /// Definition names a module's manifest declared.
    pub fn namespace(&self, name: &str) -> Option<&[String]> {
        self.namespaces
            .get(&macro_ident(name))
            .map(|n| n.definitions.as_slice())
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    #[cfg(test)]
    fn mark_loading(&mut self, name: &str) {
        self.loading = Some(name.to_string());
    }
}
