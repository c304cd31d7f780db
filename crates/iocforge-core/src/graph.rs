//! The instance graph.
//!
//! A single [`InstanceGraph`] value accumulates everything one build
//! declares: device definitions and instances, records, substitution
//! templates and their instantiations, data files, and the interrupt-vector
//! allocator. Construction appends to it; once emission starts the graph is
//! read-only and the emitters are the sole writers of the filesystem.

use indexmap::{IndexMap, IndexSet};
use std::path::PathBuf;

use iocforge_dbd::RecordTypeRegistry;
use iocforge_template::{Substitution, TemplateDefinition};

use crate::datafile::DataFile;
use crate::device::{DeviceDefinition, DeviceInstance};
use crate::error::{CoreError, Result};
use crate::record::{Record, RecordNaming, VerbatimNaming};
use crate::vectors::VectorAllocator;

pub struct InstanceGraph {
    naming: Box<dyn RecordNaming>,
    definitions: IndexMap<String, DeviceDefinition>,
    /// Definitions on which use-module has run, in reference order.
    referenced: IndexSet<String>,
    instances: Vec<DeviceInstance>,
    records: IndexMap<String, Record>,
    templates: IndexMap<String, TemplateDefinition>,
    substitutions: Vec<Substitution>,
    data_files: IndexMap<PathBuf, DataFile>,
    vectors: VectorAllocator,
    referenced_modules: IndexSet<String>,
    warnings: Vec<String>,
}

impl InstanceGraph {
    pub fn new(vector_base: u16) -> Self {
        InstanceGraph {
            naming: Box::new(VerbatimNaming),
            definitions: IndexMap::new(),
            referenced: IndexSet::new(),
            instances: Vec::new(),
            records: IndexMap::new(),
            templates: IndexMap::new(),
            substitutions: Vec::new(),
            data_files: IndexMap::new(),
            vectors: VectorAllocator::new(vector_base),
            referenced_modules: IndexSet::new(),
            warnings: Vec::new(),
        }
    }

    /// Replace the active record-naming convention.
    pub fn set_naming(&mut self, naming: Box<dyn RecordNaming>) {
        self.naming = naming;
    }

    // ---- device definitions and instances ----

    pub fn register_definition(&mut self, definition: DeviceDefinition) -> Result<()> {
        if self.definitions.contains_key(&definition.name) {
            return Err(CoreError::DuplicateDefinition {
                name: definition.name,
            });
        }
        self.definitions.insert(definition.name.clone(), definition);
        Ok(())
    }

    /// Remove a registered definition so a superseding declaration can
    /// re-register it. Clears the reference mark as well; instances created
    /// against the old definition keep their name binding.
    pub fn remove_definition(&mut self, name: &str) -> bool {
        self.referenced.shift_remove(name);
        self.definitions.shift_remove(name).is_some()
    }

    pub fn definition(&self, name: &str) -> Result<&DeviceDefinition> {
        self.definitions
            .get(name)
            .ok_or_else(|| CoreError::UnknownDefinition {
                name: name.to_string(),
            })
    }

    /// Create an instance of a registered definition.
    ///
    /// The first instantiation of a definition references its module: every
    /// declared dependency is referenced first, auto-instantiable ones by
    /// creating an instance with no parameters, others by requiring that
    /// user code already instantiated them. Returns the instance index.
    pub fn instantiate(
        &mut self,
        name: &str,
        parameters: IndexMap<String, String>,
    ) -> Result<usize> {
        self.definition(name)?;
        self.use_module(name)?;
        self.instances.push(DeviceInstance::new(name, parameters));
        Ok(self.instances.len() - 1)
    }

    fn use_module(&mut self, name: &str) -> Result<()> {
        if self.referenced.contains(name) {
            return Ok(());
        }
        let dependencies = self.definition(name)?.dependencies.clone();
        for dependency in dependencies {
            if self.referenced.contains(&dependency) {
                continue;
            }
            if self.definition(&dependency)?.auto_instantiate {
                self.instantiate(&dependency, IndexMap::new())?;
            } else {
                return Err(CoreError::DependencyNotInstantiated {
                    definition: name.to_string(),
                    dependency,
                });
            }
        }
        self.referenced.insert(name.to_string());
        let module = self.definition(name)?.module.clone();
        self.referenced_modules.insert(module);
        Ok(())
    }

    pub fn instance(&self, index: usize) -> Option<&DeviceInstance> {
        self.instances.get(index)
    }

    pub fn instance_mut(&mut self, index: usize) -> Option<&mut DeviceInstance> {
        self.instances.get_mut(index)
    }

    /// Instances in creation order.
    pub fn instances(&self) -> &[DeviceInstance] {
        &self.instances
    }

    /// Referenced definitions in reference order; this is the library-load
    /// order of the startup script.
    pub fn referenced_definitions(&self) -> impl Iterator<Item = &DeviceDefinition> {
        self.referenced
            .iter()
            .filter_map(|name| self.definitions.get(name))
    }

    /// Names of every module with a referenced definition.
    pub fn referenced_modules(&self) -> impl Iterator<Item = &str> {
        self.referenced_modules.iter().map(String::as_str)
    }

    // ---- records ----

    /// Create a record, expanding `name` through the naming convention.
    pub fn new_record(
        &mut self,
        registry: &RecordTypeRegistry,
        record_type: &str,
        name: &str,
    ) -> Result<&mut Record> {
        registry.record_type(record_type)?;
        let full_name = self.naming.full_name(name);
        if self.records.contains_key(&full_name) {
            return Err(CoreError::DuplicateRecordName { name: full_name });
        }
        let record = Record::new(full_name.clone(), record_type);
        Ok(self.records.entry(full_name).or_insert(record))
    }

    pub fn record(&self, full_name: &str) -> Option<&Record> {
        self.records.get(full_name)
    }

    pub fn record_mut(&mut self, full_name: &str) -> Option<&mut Record> {
        self.records.get_mut(full_name)
    }

    /// Records in creation order.
    pub fn records(&self) -> impl Iterator<Item = &Record> {
        self.records.values()
    }

    /// Resolve every deferred link value against the closed graph.
    ///
    /// Each link target must name an existing record, and a linked field
    /// must be valid for the target's record type. Run after construction,
    /// before emission.
    pub fn resolve_links(&self, registry: &RecordTypeRegistry) -> Result<()> {
        for record in self.records.values() {
            for (field, link) in record.links() {
                let target = self.records.get(&link.target).ok_or_else(|| {
                    CoreError::UnknownLinkTarget {
                        record: record.full_name.clone(),
                        field: field.to_string(),
                        target: link.target.clone(),
                    }
                })?;
                if let Some(target_field) = &link.field {
                    let validator = &registry.record_type(&target.record_type)?.validator;
                    if !validator.is_valid_field(target_field) {
                        return Err(CoreError::InvalidLinkField {
                            target: link.target.clone(),
                            field: target_field.clone(),
                        });
                    }
                }
            }
        }
        Ok(())
    }

    // ---- substitutions ----

    pub fn declare_template(&mut self, template: TemplateDefinition) -> Result<()> {
        if self.templates.contains_key(&template.name) {
            return Err(CoreError::DuplicateTemplate {
                name: template.name,
            });
        }
        self.templates.insert(template.name.clone(), template);
        Ok(())
    }

    /// Remove a declared template so a superseding declaration can
    /// re-register it.
    pub fn remove_template(&mut self, name: &str) -> bool {
        self.templates.shift_remove(name).is_some()
    }

    pub fn template(&self, name: &str) -> Result<&TemplateDefinition> {
        self.templates
            .get(name)
            .ok_or_else(|| CoreError::UnknownTemplate {
                name: name.to_string(),
            })
    }

    /// Templates in declaration order.
    pub fn templates(&self) -> impl Iterator<Item = &TemplateDefinition> {
        self.templates.values()
    }

    /// Instantiate a declared template with keyword arguments.
    pub fn add_substitution(
        &mut self,
        template: &str,
        arguments: IndexMap<String, String>,
    ) -> Result<()> {
        let substitution = self.template(template)?.instantiate(arguments)?;
        self.substitutions.push(substitution);
        Ok(())
    }

    /// Substitution instances in creation order.
    pub fn substitutions(&self) -> &[Substitution] {
        &self.substitutions
    }

    // ---- data files ----

    /// Register a data file, rejecting a logical-path collision unless both
    /// claims wrap the same source file.
    pub fn add_data_file(&mut self, file: DataFile) -> Result<()> {
        if let Some(existing) = self.data_files.get(&file.logical_path) {
            if existing.same_source(&file) {
                return Ok(());
            }
            return Err(CoreError::DataFileCollision {
                path: file.logical_path,
            });
        }
        self.data_files.insert(file.logical_path.clone(), file);
        Ok(())
    }

    pub fn data_files(&self) -> impl Iterator<Item = &DataFile> {
        self.data_files.values()
    }

    pub fn has_data_files(&self) -> bool {
        !self.data_files.is_empty()
    }

    // ---- vectors and diagnostics ----

    pub fn vectors(&mut self) -> &mut VectorAllocator {
        &mut self.vectors
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }
}

impl std::fmt::Debug for InstanceGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstanceGraph")
            .field("definitions", &self.definitions.keys().collect::<Vec<_>>())
            .field("instances", &self.instances.len())
            .field("records", &self.records.keys().collect::<Vec<_>>())
            .field("substitutions", &self.substitutions.len())
            .field("data_files", &self.data_files.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datafile::DataFile;
    use crate::record::{Link, PrefixNaming};
    use std::path::PathBuf;

    fn graph() -> InstanceGraph {
        InstanceGraph::new(0xC0)
    }

    fn definition(name: &str, module: &str) -> DeviceDefinition {
        DeviceDefinition::new(name, module)
    }

    fn registry() -> RecordTypeRegistry {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("test.dbd"),
            r#"
recordtype(ai) {
    field(VAL, DBF_DOUBLE) { prompt("Value") }
    field(INP, DBF_INLINK) { prompt("Input") }
}
"#,
        )
        .unwrap();
        let mut registry = RecordTypeRegistry::with_native();
        registry
            .load_dbd_file("TestDevice", dir.path(), "test.dbd")
            .unwrap();
        registry
    }

    #[test]
    fn dependency_is_auto_instantiated_once_and_first() {
        let mut g = graph();
        let mut asyn = definition("Asyn", "asyn");
        asyn.auto_instantiate = true;
        g.register_definition(asyn).unwrap();
        let mut motor = definition("Motor", "motor");
        motor.dependencies = vec!["Asyn".to_string()];
        g.register_definition(motor).unwrap();

        g.instantiate("Motor", IndexMap::new()).unwrap();
        g.instantiate("Motor", IndexMap::new()).unwrap();

        let order: Vec<&str> = g.instances().iter().map(|i| i.definition.as_str()).collect();
        assert_eq!(order, vec!["Asyn", "Motor", "Motor"]);

        let libs: Vec<&str> = g.referenced_definitions().map(|d| d.name.as_str()).collect();
        assert_eq!(libs, vec!["Asyn", "Motor"]);
        let modules: Vec<&str> = g.referenced_modules().collect();
        assert_eq!(modules, vec!["asyn", "motor"]);
    }

    #[test]
    fn non_auto_dependency_must_be_instantiated_by_user() {
        let mut g = graph();
        g.register_definition(definition("Asyn", "asyn")).unwrap();
        let mut motor = definition("Motor", "motor");
        motor.dependencies = vec!["Asyn".to_string()];
        g.register_definition(motor).unwrap();

        assert!(matches!(
            g.instantiate("Motor", IndexMap::new()),
            Err(CoreError::DependencyNotInstantiated { .. })
        ));

        // Instantiating the dependency first satisfies the requirement.
        g.instantiate("Asyn", IndexMap::new()).unwrap();
        g.instantiate("Motor", IndexMap::new()).unwrap();
    }

    #[test]
    fn duplicate_definitions_are_rejected() {
        let mut g = graph();
        g.register_definition(definition("D", "m")).unwrap();
        assert!(matches!(
            g.register_definition(definition("D", "m")),
            Err(CoreError::DuplicateDefinition { .. })
        ));
    }

    #[test]
    fn removed_definition_can_be_registered_again() {
        let mut g = graph();
        let mut old = definition("D", "m");
        old.auto_instantiate = true;
        g.register_definition(old).unwrap();
        g.instantiate("D", IndexMap::new()).unwrap();

        assert!(g.remove_definition("D"));
        assert_eq!(g.referenced_definitions().count(), 0);
        assert!(!g.remove_definition("D"));

        let mut new = definition("D", "m");
        new.libraries = vec!["d2".to_string()];
        g.register_definition(new).unwrap();
        assert_eq!(g.definition("D").unwrap().libraries, vec!["d2".to_string()]);
    }

    #[test]
    fn record_names_expand_and_stay_unique() {
        let registry = registry();
        let mut g = graph();
        g.set_naming(Box::new(PrefixNaming::new("BL18I")));
        let record = g.new_record(&registry, "ai", "X").unwrap();
        assert_eq!(record.full_name, "BL18I:X");
        assert!(matches!(
            g.new_record(&registry, "ai", "X"),
            Err(CoreError::DuplicateRecordName { .. })
        ));
    }

    #[test]
    fn link_resolution_after_close() {
        let registry = registry();
        let mut g = graph();
        g.new_record(&registry, "ai", "SRC").unwrap();
        let dst = g.new_record(&registry, "ai", "DST").unwrap();
        dst.set_field(&registry, "INP", Link::new("SRC").to_field("VAL").pp())
            .unwrap();
        g.resolve_links(&registry).unwrap();

        let dangling = g.new_record(&registry, "ai", "BAD").unwrap();
        dangling
            .set_field(&registry, "INP", Link::new("GONE"))
            .unwrap();
        assert!(matches!(
            g.resolve_links(&registry),
            Err(CoreError::UnknownLinkTarget { .. })
        ));
    }

    #[test]
    fn link_to_invalid_target_field_is_rejected() {
        let registry = registry();
        let mut g = graph();
        g.new_record(&registry, "ai", "SRC").unwrap();
        let dst = g.new_record(&registry, "ai", "DST").unwrap();
        dst.set_field(&registry, "INP", Link::new("SRC").to_field("NOPE"))
            .unwrap();
        assert!(matches!(
            g.resolve_links(&registry),
            Err(CoreError::InvalidLinkField { .. })
        ));
    }

    #[test]
    fn substitution_requires_declared_template() {
        let mut g = graph();
        assert!(matches!(
            g.add_substitution("missing", IndexMap::new()),
            Err(CoreError::UnknownTemplate { .. })
        ));

        let template = TemplateDefinition::new(
            PathBuf::from("db/motor.template"),
            vec!["P".to_string()],
        );
        g.declare_template(template.clone()).unwrap();
        assert!(matches!(
            g.declare_template(template),
            Err(CoreError::DuplicateTemplate { .. })
        ));

        let mut args = IndexMap::new();
        args.insert("P".to_string(), "A".to_string());
        g.add_substitution("motor", args).unwrap();
        assert_eq!(g.substitutions().len(), 1);
    }

    #[test]
    fn data_file_collisions() {
        let mut g = graph();
        g.add_data_file(DataFile::from_path("/support/a/lookup.tab"))
            .unwrap();
        // Same source twice is fine.
        g.add_data_file(DataFile::from_path("/support/a/lookup.tab"))
            .unwrap();
        // A different source for the same logical path is not.
        assert!(matches!(
            g.add_data_file(DataFile::from_path("/support/b/lookup.tab")),
            Err(CoreError::DataFileCollision { .. })
        ));
        assert_eq!(g.data_files().count(), 1);
    }
}
