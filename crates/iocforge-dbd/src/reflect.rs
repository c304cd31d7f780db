//! Record-type reflection.
//!
//! Loading a DBD file reflects each newly seen record type into a
//! [`RecordType`]: the type name, the device that first declared it, and a
//! [`FieldValidator`] holding the field table and menu enumerations. The
//! validator answers field-name queries structurally and defers value
//! verification to the underlying database, surfacing its diagnostic
//! verbatim.

use std::path::Path;

use indexmap::IndexMap;

use crate::error::{DbdError, Result};
use crate::parser::NativeDbd;
use crate::staticdb::{CwdGuard, FieldInfo, FieldKind, StaticDatabase};

/// Validates field names and values for one record type.
#[derive(Debug, Clone)]
pub struct FieldValidator {
    record_type: String,
    fields: IndexMap<String, FieldInfo>,
    /// Menu choices per menu field, materialised at reflection time.
    choices: IndexMap<String, Vec<String>>,
}

impl FieldValidator {
    fn from_database(db: &dyn StaticDatabase, record_type: &str) -> Result<FieldValidator> {
        let mut fields = IndexMap::new();
        let mut choices = IndexMap::new();
        for info in db.fields(record_type)? {
            if info.kind == FieldKind::Menu {
                let menu_choices = db.menu_choices(record_type, &info.name).ok_or_else(|| {
                    DbdError::UndefinedMenu {
                        menu: info.menu.clone().unwrap_or_default(),
                        record_type: record_type.to_string(),
                        field: info.name.clone(),
                    }
                })?;
                choices.insert(info.name.clone(), menu_choices);
            }
            fields.insert(info.name.clone(), info);
        }
        Ok(FieldValidator {
            record_type: record_type.to_string(),
            fields,
            choices,
        })
    }

    /// The record type this validator belongs to.
    pub fn record_type(&self) -> &str {
        &self.record_type
    }

    /// Whether `name` is a recognised field of the record type.
    pub fn is_valid_field(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// All recognised field names, in declaration order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// The classification of a field, if it exists.
    pub fn field_kind(&self, name: &str) -> Option<FieldKind> {
        self.fields.get(name).map(|f| f.kind)
    }

    /// The ordered menu choices of a menu field.
    pub fn menu_choices(&self, field: &str) -> Option<&[String]> {
        self.choices.get(field).map(Vec::as_slice)
    }

    /// Check a field name structurally, without a value.
    pub fn check_name(&self, field: &str) -> Result<()> {
        if self.is_valid_field(field) {
            Ok(())
        } else {
            Err(DbdError::UnknownField {
                record_type: self.record_type.clone(),
                field: field.to_string(),
            })
        }
    }

    /// Resolve the `address` alias: the unique one of INP / OUT.
    pub fn address_field(&self) -> Result<&str> {
        match (self.is_valid_field("INP"), self.is_valid_field("OUT")) {
            (true, false) => Ok("INP"),
            (false, true) => Ok("OUT"),
            _ => Err(DbdError::NoAddressField {
                record_type: self.record_type.clone(),
            }),
        }
    }

    /// Check a proposed (field, value) assignment.
    ///
    /// The field name is checked structurally; the value itself is verified
    /// by the database, whose diagnostic is surfaced verbatim on rejection.
    pub fn check(&self, db: &dyn StaticDatabase, field: &str, value: &str) -> Result<()> {
        self.check_name(field)?;
        db.verify(&self.record_type, field, value)
            .map_err(|diagnostic| DbdError::InvalidValue {
                record_type: self.record_type.clone(),
                field: field.to_string(),
                diagnostic,
            })
    }
}

/// A reflected record type.
#[derive(Debug, Clone)]
pub struct RecordType {
    /// Record type name, e.g. `ai`.
    pub name: String,
    /// Name of the device definition whose DBD first declared the type.
    pub device: String,
    /// Field validator for instances of this type.
    pub validator: FieldValidator,
}

/// Owns the descriptor database and every reflected record type.
pub struct RecordTypeRegistry {
    db: Box<dyn StaticDatabase>,
    types: IndexMap<String, RecordType>,
}

impl RecordTypeRegistry {
    /// Wrap an existing database backend.
    pub fn new(db: Box<dyn StaticDatabase>) -> Self {
        RecordTypeRegistry {
            db,
            types: IndexMap::new(),
        }
    }

    /// Registry over the native DBD parser.
    pub fn with_native() -> Self {
        RecordTypeRegistry::new(Box::new(NativeDbd::new()))
    }

    /// Load a DBD file on behalf of `device`.
    ///
    /// Record types already known keep their original device binding; types
    /// newly present after the load are reflected and bound to `device`.
    /// Returns the names of the newly reflected types. The working
    /// directory is saved around the load and restored on every exit.
    pub fn load_dbd_file(
        &mut self,
        device: &str,
        directory: &Path,
        filename: &str,
    ) -> Result<Vec<String>> {
        let _cwd = CwdGuard::push(directory)?;
        self.db.read_database(directory, filename)?;

        let mut added = Vec::new();
        for name in self.db.record_type_names() {
            if self.types.contains_key(&name) {
                continue;
            }
            let validator = FieldValidator::from_database(self.db.as_ref(), &name)?;
            self.types.insert(
                name.clone(),
                RecordType {
                    name: name.clone(),
                    device: device.to_string(),
                    validator,
                },
            );
            added.push(name);
        }
        Ok(added)
    }

    /// Look up a reflected record type.
    pub fn record_type(&self, name: &str) -> Result<&RecordType> {
        self.types
            .get(name)
            .ok_or_else(|| DbdError::UnknownRecordType {
                name: name.to_string(),
            })
    }

    /// Names of every reflected record type, in first-seen order.
    pub fn type_names(&self) -> impl Iterator<Item = &str> {
        self.types.keys().map(String::as_str)
    }

    /// Check a proposed (field, value) assignment against a record type.
    pub fn check_value(&self, record_type: &str, field: &str, value: &str) -> Result<()> {
        let rt = self.record_type(record_type)?;
        rt.validator.check(self.db.as_ref(), field, value)
    }
}

impl std::fmt::Debug for RecordTypeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordTypeRegistry")
            .field("types", &self.types.keys().collect::<Vec<_>>())
            .finish()
    }
}
