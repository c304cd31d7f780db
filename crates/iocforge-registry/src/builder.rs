//! Builder manifests.
//!
//! Each support module may carry a builder manifest: a TOML file declaring
//! the device classes and substitution templates the module contributes.
//! Loading a manifest registers its device definitions in the instance
//! graph, loads their DBD files into the record-type registry, and declares
//! its templates.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use iocforge_core::{DeviceDefinition, Phase, PhaseHooks};
use iocforge_template::TemplateDefinition;

use crate::error::{RegistryError, Result};

/// The parsed contents of one builder manifest.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct BuilderManifest {
    /// Device class declarations.
    #[serde(default, rename = "device")]
    pub devices: Vec<DeviceEntry>,
    /// Substitution template declarations.
    #[serde(default, rename = "template")]
    pub templates: Vec<TemplateEntry>,
}

/// One `[[device]]` block.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DeviceEntry {
    pub name: String,
    #[serde(default)]
    pub auto_instantiate: bool,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub libraries: Vec<String>,
    #[serde(default)]
    pub system_libraries: Vec<String>,
    #[serde(default)]
    pub binaries: Vec<String>,
    #[serde(default)]
    pub dbd_files: Vec<String>,
    #[serde(default)]
    pub makefile_fragments: Vec<String>,
    /// Per-phase hooks, `[[device.phase]]` blocks.
    #[serde(default, rename = "phase")]
    pub phases: Vec<PhaseEntry>,
    #[serde(default)]
    pub post_init: Option<HookEntry>,
}

/// One `[[device.phase]]` block: `first = true` or `at = <n>` (default 0).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PhaseEntry {
    #[serde(default)]
    pub first: bool,
    #[serde(default)]
    pub at: Option<i32>,
    #[serde(default)]
    pub once: Vec<String>,
    #[serde(default)]
    pub each: Vec<String>,
}

impl PhaseEntry {
    fn phase(&self) -> Phase {
        if self.first {
            Phase::First
        } else {
            Phase::At(self.at.unwrap_or(0))
        }
    }
}

/// Hook command lists for the post-init pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct HookEntry {
    #[serde(default)]
    pub once: Vec<String>,
    #[serde(default)]
    pub each: Vec<String>,
}

/// One `[[template]]` block: either `scan = true` or explicit arguments.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TemplateEntry {
    #[serde(default)]
    pub name: Option<String>,
    pub file: PathBuf,
    #[serde(default)]
    pub scan: bool,
    #[serde(default)]
    pub arguments: Vec<String>,
    #[serde(default)]
    pub defaults: IndexMap<String, String>,
    #[serde(default)]
    pub optional: Vec<String>,
    #[serde(default)]
    pub overwrites: Vec<String>,
}

impl BuilderManifest {
    /// Parse a manifest file.
    pub fn load(path: &Path) -> Result<BuilderManifest> {
        let text = std::fs::read_to_string(path)?;
        toml::from_str(&text).map_err(|source| RegistryError::Manifest {
            path: path.to_path_buf(),
            source,
        })
    }
}

impl DeviceEntry {
    /// Build the device descriptor, bound to `module`.
    pub fn into_definition(self, module: &str) -> DeviceDefinition {
        let mut definition = DeviceDefinition::new(self.name, module);
        definition.auto_instantiate = self.auto_instantiate;
        definition.dependencies = self.dependencies;
        definition.libraries = self.libraries;
        definition.system_libraries = self.system_libraries;
        definition.binaries = self.binaries;
        definition.dbd_files = self.dbd_files;
        definition.makefile_fragments = self.makefile_fragments;
        for entry in self.phases {
            let phase = entry.phase();
            definition.phases.insert(
                phase,
                PhaseHooks {
                    once: entry.once,
                    each: entry.each,
                },
            );
        }
        if let Some(post) = self.post_init {
            definition.post_init = PhaseHooks {
                once: post.once,
                each: post.each,
            };
        }
        definition
    }
}

impl TemplateEntry {
    /// Build the template definition, resolving `file` against `base`.
    pub fn into_template(self, base: &Path) -> Result<TemplateDefinition> {
        let path = if self.file.is_absolute() {
            self.file
        } else {
            base.join(self.file)
        };
        let mut template = if self.scan {
            TemplateDefinition::from_scan(path)?
        } else {
            let mut t = TemplateDefinition::new(path, self.arguments);
            t.defaults = self.defaults;
            t.optional = self.optional;
            t
        };
        if let Some(name) = self.name {
            template.name = name;
        }
        template.overwrites = self.overwrites;
        Ok(template)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manifest_round_trip() {
        let manifest: BuilderManifest = toml::from_str(
            r#"
[[device]]
name = "Asyn"
auto-instantiate = true
libraries = ["asyn"]
dbd-files = ["asyn.dbd"]

[[device.phase]]
at = 0
once = ["asynInit"]
each = ["asynPortConfigure(\"$(PORT)\")"]

[[device]]
name = "Motor"
dependencies = ["Asyn"]

[[device.phase]]
first = true
each = ["motorPreamble"]

[[template]]
name = "motor"
file = "db/motor.template"
arguments = ["P", "N"]
"#,
        )
        .unwrap();

        assert_eq!(manifest.devices.len(), 2);
        assert_eq!(manifest.templates.len(), 1);

        let asyn = manifest.devices[0].clone().into_definition("asyn");
        assert!(asyn.auto_instantiate);
        assert_eq!(asyn.module, "asyn");
        let hooks = asyn.phases.get(&Phase::At(0)).unwrap();
        assert_eq!(hooks.once, vec!["asynInit".to_string()]);

        let motor = manifest.devices[1].clone().into_definition("motor");
        assert!(motor.phases.contains_key(&Phase::First));
        assert_eq!(motor.dependencies, vec!["Asyn".to_string()]);
    }

    #[test]
    fn template_entry_resolves_relative_paths() {
        let entry = TemplateEntry {
            file: PathBuf::from("db/motor.template"),
            arguments: vec!["P".to_string()],
            ..TemplateEntry::default()
        };
        let template = entry.into_template(Path::new("/support/motor/1-0")).unwrap();
        assert_eq!(
            template.path,
            PathBuf::from("/support/motor/1-0/db/motor.template")
        );
        assert_eq!(template.name, "motor");
    }

    #[test]
    fn scanned_template_entry_reads_the_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("db")).unwrap();
        std::fs::write(
            dir.path().join("db/probe.template"),
            "#% macro, P, prefix\n$(P) $(N=1)\n",
        )
        .unwrap();
        let entry = TemplateEntry {
            file: PathBuf::from("db/probe.template"),
            scan: true,
            ..TemplateEntry::default()
        };
        let template = entry.into_template(dir.path()).unwrap();
        assert_eq!(template.required, vec!["P".to_string()]);
        assert_eq!(template.defaults.get("N").map(String::as_str), Some("1"));
    }
}
