//! IOC directory-tree emission.
//!
//! The full-tree variant lays out a buildable EPICS application:
//!
//! ```text
//! <root>/<domain>/<ioc>/
//!   configure/{CONFIG,CONFIG_APP,Makefile,RULES,RULES_DIRS,RULES.ioc,RULES_TOP,RELEASE}
//!   iocBoot/ioc<ioc>/{st<ioc>.cmd, Makefile, 0.req?}
//!   <ioc>App/Db/{<ioc>.db?, <ioc>.expanded.substitutions?, Makefile}
//!   <ioc>App/src/Makefile
//!   dbd/<ioc>.dbd
//!   data/             (only when data files exist)
//!   Makefile
//! ```
//!
//! An existing tree is deleted first, but only if everything inside it is
//! something this writer produces; any other entry aborts the write so a
//! mistyped path cannot destroy unrelated work.

use std::path::{Path, PathBuf};

use iocforge_core::{plan, InstanceGraph};
use iocforge_registry::ModuleRegistry;
use iocforge_targets::Configuration;
use iocforge_template::expand_macros;

use crate::database::write_database;
use crate::error::{EmitError, Result};
use crate::script::{ScriptOptions, ScriptWriter};
use crate::substitutions::write_substitutions;

/// Directory entries the writer owns and may delete on a rewrite.
const TOLERATED_ENTRIES: &[&str] = &[
    "configure", "iocBoot", "bin", "db", "dbd", "Makefile", "data",
];

/// The outcome of a successful tree write.
#[derive(Debug, Clone)]
pub struct EmitReport {
    /// The written IOC directory.
    pub path: PathBuf,
    /// Non-fatal diagnostics gathered during emission.
    pub warnings: Vec<String>,
}

/// Writes one IOC application tree from a closed graph.
pub struct IocTreeWriter<'a> {
    config: &'a Configuration,
    graph: &'a InstanceGraph,
    modules: &'a ModuleRegistry,
}

impl<'a> IocTreeWriter<'a> {
    pub fn new(
        config: &'a Configuration,
        graph: &'a InstanceGraph,
        modules: &'a ModuleRegistry,
    ) -> Self {
        IocTreeWriter {
            config,
            graph,
            modules,
        }
    }

    /// Write the full tree under `<root>/<domain>/<ioc_name>`.
    pub fn write(
        &self,
        root: &Path,
        domain: &str,
        ioc_name: &str,
        options: &ScriptOptions,
    ) -> Result<EmitReport> {
        let ioc_dir = root.join(domain).join(ioc_name);
        clear_existing_tree(&ioc_dir, ioc_name)?;

        let mut warnings = Vec::new();
        let app_dir = ioc_dir.join(format!("{ioc_name}App"));
        std::fs::create_dir_all(ioc_dir.join("configure"))?;
        std::fs::create_dir_all(ioc_dir.join(format!("iocBoot/ioc{ioc_name}")))?;
        std::fs::create_dir_all(app_dir.join("Db"))?;
        std::fs::create_dir_all(app_dir.join("src"))?;
        std::fs::create_dir_all(ioc_dir.join("dbd"))?;

        // Db directory and the databases the boot script loads.
        let mut script_options = options.clone();
        let database = write_database(self.graph);
        if !database.is_empty() {
            std::fs::write(app_dir.join(format!("Db/{ioc_name}.db")), &database)?;
            script_options.databases.push(format!("db/{ioc_name}.db"));
        }
        let substitutions = write_substitutions(self.graph)?;
        if !substitutions.text.is_empty() {
            std::fs::write(
                app_dir.join(format!("Db/{ioc_name}.expanded.substitutions")),
                &substitutions.text,
            )?;
        }
        warnings.extend(substitutions.warnings);
        std::fs::write(app_dir.join("Db/Makefile"), self.db_makefile(ioc_name))?;

        // Startup script.
        let command_plan = plan(self.graph)?;
        let script =
            ScriptWriter::new(self.config, self.graph, &command_plan, &script_options).write()?;
        let boot_dir = ioc_dir.join(format!("iocBoot/ioc{ioc_name}"));
        std::fs::write(boot_dir.join(format!("st{ioc_name}.cmd")), script)?;
        std::fs::write(boot_dir.join("Makefile"), BOOT_MAKEFILE)?;
        let requests = self.autosave_requests();
        if !requests.is_empty() {
            std::fs::write(boot_dir.join("0.req"), requests)?;
        }

        // Build system.
        self.write_configure(&ioc_dir)?;
        std::fs::write(app_dir.join("src/Makefile"), self.src_makefile(ioc_name))?;
        std::fs::write(
            ioc_dir.join(format!("dbd/{ioc_name}.dbd")),
            self.dbd_file(),
        )?;
        std::fs::write(ioc_dir.join("Makefile"), self.top_makefile(ioc_name))?;

        // Data files.
        if self.graph.has_data_files() {
            let data_dir = ioc_dir.join("data");
            std::fs::create_dir_all(&data_dir)?;
            for file in self.graph.data_files() {
                file.flush(&data_dir)?;
            }
        }

        warnings.extend(self.graph.warnings().iter().cloned());
        Ok(EmitReport {
            path: ioc_dir,
            warnings,
        })
    }

    /// Write the simple variant: one startup script and one database file
    /// directly under `dir`.
    pub fn write_simple(
        &self,
        dir: &Path,
        ioc_name: &str,
        options: &ScriptOptions,
    ) -> Result<EmitReport> {
        std::fs::create_dir_all(dir)?;
        let mut script_options = options.clone();

        let database = write_database(self.graph);
        if !database.is_empty() {
            let db_name = format!("{ioc_name}.db");
            std::fs::write(dir.join(&db_name), &database)?;
            script_options.databases.push(db_name);
        }

        let command_plan = plan(self.graph)?;
        let script =
            ScriptWriter::new(self.config, self.graph, &command_plan, &script_options).write()?;
        std::fs::write(dir.join("st.cmd"), script)?;

        Ok(EmitReport {
            path: dir.to_path_buf(),
            warnings: self.graph.warnings().to_vec(),
        })
    }

    fn write_configure(&self, ioc_dir: &Path) -> Result<()> {
        let configure = ioc_dir.join("configure");
        std::fs::write(configure.join("CONFIG"), CONFIG)?;
        std::fs::write(configure.join("CONFIG_APP"), CONFIG_APP)?;
        std::fs::write(configure.join("Makefile"), CONFIGURE_MAKEFILE)?;
        std::fs::write(configure.join("RULES"), RULES)?;
        std::fs::write(configure.join("RULES_DIRS"), RULES_DIRS)?;
        std::fs::write(configure.join("RULES.ioc"), RULES_IOC)?;
        std::fs::write(configure.join("RULES_TOP"), RULES_TOP)?;
        std::fs::write(configure.join("RELEASE"), self.release_file()?)?;
        Ok(())
    }

    /// `configure/RELEASE`: every referenced module by macro identifier and
    /// library path, then the base install.
    fn release_file(&self) -> Result<String> {
        let mut out = String::from("# Generated RELEASE: referenced support modules.\n");
        for name in self.graph.referenced_modules() {
            let module = self.modules.module(name)?;
            out.push_str(&format!(
                "{} = {}\n",
                module.macro_ident,
                module.lib_path.display()
            ));
        }
        if let Some(base) = &self.config.epics_base {
            out.push_str(&format!("EPICS_BASE = {}\n", base.display()));
        }
        Ok(out)
    }

    /// The source Makefile lists module libraries in reverse dependency
    /// order so later libraries resolve symbols from earlier-listed ones.
    fn src_makefile(&self, ioc_name: &str) -> String {
        let mut out = String::from("TOP = ../..\ninclude $(TOP)/configure/CONFIG\n\n");
        out.push_str(&format!("PROD_IOC = {ioc_name}\nDBD += {ioc_name}.dbd\n\n"));
        let definitions: Vec<_> = self.graph.referenced_definitions().collect();
        for definition in definitions.iter().rev() {
            for library in &definition.libraries {
                out.push_str(&format!("{ioc_name}_LIBS += {library}\n"));
            }
            for library in &definition.system_libraries {
                out.push_str(&format!("{ioc_name}_SYS_LIBS += {library}\n"));
            }
            for fragment in &definition.makefile_fragments {
                out.push_str(fragment);
                out.push('\n');
            }
        }
        out.push_str(&format!("{ioc_name}_LIBS += $(EPICS_BASE_IOC_LIBS)\n"));
        out.push_str("\ninclude $(TOP)/configure/RULES\n");
        out
    }

    /// `dbd/<ioc>.dbd`: base plus every referenced device's DBD files.
    fn dbd_file(&self) -> String {
        let mut out = String::from("include \"base.dbd\"\n");
        for definition in self.graph.referenced_definitions() {
            for dbd in &definition.dbd_files {
                out.push_str(&format!("include \"{dbd}\"\n"));
            }
        }
        out
    }

    /// `iocBoot/ioc<ioc>/0.req`: one line per `#% autosave` marker per
    /// substitution instance, macros expanded against the instance's values.
    /// A leading pass number on the marker is dropped.
    fn autosave_requests(&self) -> String {
        let mut out = String::new();
        for template in self.graph.templates() {
            if template.autosave.is_empty() {
                continue;
            }
            for substitution in self
                .graph
                .substitutions()
                .iter()
                .filter(|s| s.template == template.name)
            {
                for entry in &template.autosave {
                    let line = match entry.split_once(char::is_whitespace) {
                        Some((pass, rest)) if pass.parse::<u32>().is_ok() => rest,
                        _ => entry.as_str(),
                    };
                    out.push_str(&expand_macros(line.trim(), &substitution.values));
                    out.push('\n');
                }
            }
        }
        out
    }

    fn db_makefile(&self, ioc_name: &str) -> String {
        let mut out = String::from("TOP = ../..\ninclude $(TOP)/configure/CONFIG\n\n");
        if self.graph.records().next().is_some() {
            out.push_str(&format!("DB += {ioc_name}.db\n"));
        }
        if !self.graph.substitutions().is_empty() {
            out.push_str(&format!("DB += {ioc_name}.expanded.substitutions\n"));
        }
        out.push_str("\ninclude $(TOP)/configure/RULES\n");
        out
    }

    fn top_makefile(&self, ioc_name: &str) -> String {
        format!(
            "TOP = .\ninclude $(TOP)/configure/CONFIG\nDIRS += configure {ioc_name}App iocBoot\ninclude $(TOP)/configure/RULES_TOP\n"
        )
    }
}

/// Delete a previously written tree, refusing if it holds anything the
/// writer does not own.
fn clear_existing_tree(ioc_dir: &Path, ioc_name: &str) -> Result<()> {
    if !ioc_dir.exists() {
        return Ok(());
    }
    let app_suffix = "App";
    let mut entries = Vec::new();
    for entry in std::fs::read_dir(ioc_dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        let tolerated = TOLERATED_ENTRIES.contains(&name.as_str())
            || (name.ends_with(app_suffix) && name.starts_with(ioc_name));
        if !tolerated {
            return Err(EmitError::UnexpectedDirectoryContent {
                path: ioc_dir.to_path_buf(),
                entry: name,
            });
        }
        entries.push(entry.path());
    }
    for path in entries {
        if path.is_dir() {
            std::fs::remove_dir_all(&path)?;
        } else {
            std::fs::remove_file(&path)?;
        }
    }
    Ok(())
}

const CONFIG: &str = "include $(TOP)/configure/CONFIG_APP\n\n# Add any changes to make variables below here.\n";

const CONFIG_APP: &str = "include $(TOP)/configure/RELEASE\n\nCONFIG = $(EPICS_BASE)/configure\ninclude $(CONFIG)/CONFIG\n\nINSTALL_LOCATION = $(TOP)\n";

const CONFIGURE_MAKEFILE: &str = "TOP = ..\ninclude $(TOP)/configure/CONFIG\nTARGETS = $(CONFIG_TARGETS)\nCONFIGS += $(subst ../,,$(wildcard $(CONFIG_INSTALLS)))\ninclude $(TOP)/configure/RULES\n";

const RULES: &str = "include $(CONFIG)/RULES\n";

const RULES_DIRS: &str = "include $(CONFIG)/RULES_DIRS\n";

const RULES_IOC: &str = "include $(CONFIG)/RULES.ioc\n";

const RULES_TOP: &str = "include $(CONFIG)/RULES_TOP\n";

const BOOT_MAKEFILE: &str = "TOP = ../..\ninclude $(TOP)/configure/CONFIG\nARCH = $(IOC_ARCH)\ninclude $(TOP)/configure/RULES.ioc\n";

#[cfg(test)]
mod tests {
    use super::*;
    use iocforge_targets::Architecture;

    fn config() -> Configuration {
        Configuration {
            epics_base: None,
            support_root: None,
            architecture: Architecture::parse("linux-x86_64").unwrap(),
            dynamic_loading: false,
            msi_path: "msi".into(),
            defaults_dir: None,
        }
    }

    #[test]
    fn unexpected_entries_abort_the_rewrite() {
        let dir = tempfile::tempdir().unwrap();
        let ioc_dir = dir.path().join("TS/TS-01");
        std::fs::create_dir_all(ioc_dir.join("my-notes")).unwrap();
        assert!(matches!(
            clear_existing_tree(&ioc_dir, "TS-01"),
            Err(EmitError::UnexpectedDirectoryContent { .. })
        ));
    }

    #[test]
    fn tolerated_entries_are_deleted() {
        let dir = tempfile::tempdir().unwrap();
        let ioc_dir = dir.path().join("TS-01");
        std::fs::create_dir_all(ioc_dir.join("configure")).unwrap();
        std::fs::create_dir_all(ioc_dir.join("TS-01App")).unwrap();
        std::fs::write(ioc_dir.join("Makefile"), "x").unwrap();
        clear_existing_tree(&ioc_dir, "TS-01").unwrap();
        assert!(ioc_dir.exists());
        assert!(!ioc_dir.join("configure").exists());
        assert!(!ioc_dir.join("TS-01App").exists());
        assert!(!ioc_dir.join("Makefile").exists());
    }

    #[test]
    fn autosave_markers_emit_a_request_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut graph = InstanceGraph::new(0xC0);
        let mut template = iocforge_template::TemplateDefinition::new(
            PathBuf::from("db/motor.template"),
            vec!["P".to_string()],
        );
        template.autosave = vec!["0 $(P):M1.VAL".to_string(), "$(P):M1.PREC".to_string()];
        graph.declare_template(template).unwrap();
        let mut args = indexmap::IndexMap::new();
        args.insert("P".to_string(), "BL18I".to_string());
        graph.add_substitution("motor", args).unwrap();

        let modules = ModuleRegistry::new(config());
        let config = config();
        let writer = IocTreeWriter::new(&config, &graph, &modules);
        writer
            .write(dir.path(), "TS", "TS-01", &ScriptOptions::default())
            .unwrap();

        let requests =
            std::fs::read_to_string(dir.path().join("TS/TS-01/iocBoot/iocTS-01/0.req")).unwrap();
        assert_eq!(requests, "BL18I:M1.VAL\nBL18I:M1.PREC\n");
    }

    #[test]
    fn templates_without_autosave_markers_emit_no_request_file() {
        let dir = tempfile::tempdir().unwrap();
        let graph = InstanceGraph::new(0xC0);
        let modules = ModuleRegistry::new(config());
        let config = config();
        let writer = IocTreeWriter::new(&config, &graph, &modules);
        writer
            .write(dir.path(), "TS", "TS-01", &ScriptOptions::default())
            .unwrap();
        assert!(!dir.path().join("TS/TS-01/iocBoot/iocTS-01/0.req").exists());
    }

    #[test]
    fn simple_variant_writes_script_and_database() {
        let dir = tempfile::tempdir().unwrap();
        let graph = InstanceGraph::new(0xC0);
        let modules = ModuleRegistry::new(config());
        let config = config();
        let writer = IocTreeWriter::new(&config, &graph, &modules);
        let report = writer
            .write_simple(dir.path(), "test", &ScriptOptions::default())
            .unwrap();
        assert!(report.path.join("st.cmd").exists());
        // No records: no database file, no dbLoadRecords.
        assert!(!report.path.join("test.db").exists());
        let script = std::fs::read_to_string(report.path.join("st.cmd")).unwrap();
        assert!(!script.contains("dbLoadRecords"));
        assert!(script.contains("iocInit"));
    }
}
