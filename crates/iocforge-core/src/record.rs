//! Record instances, link values, and naming conventions.
//!
//! A [`Record`] is a named instance of a reflected record type with an
//! insertion-ordered field map. Scalar values are validated immediately
//! through the record type's validator; [`Link`] values reference other
//! records in the graph and carry their validation until the graph is
//! closed (`InstanceGraph::resolve_links`).

use indexmap::IndexMap;

use iocforge_dbd::{FieldKind, RecordTypeRegistry};

use crate::error::Result;

/// A link processing specifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkSpec {
    /// Process passive.
    Pp,
    /// Channel process.
    Cp,
    /// Maximise severity.
    Ms,
    /// No process.
    Np,
}

impl LinkSpec {
    pub fn as_str(self) -> &'static str {
        match self {
            LinkSpec::Pp => "PP",
            LinkSpec::Cp => "CP",
            LinkSpec::Ms => "MS",
            LinkSpec::Np => "NP",
        }
    }
}

/// A field value referencing another record's field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    /// Full name of the referenced record.
    pub target: String,
    /// Referenced field; `None` links the record itself.
    pub field: Option<String>,
    /// Appended processing specifiers, in application order.
    pub specifiers: Vec<LinkSpec>,
}

impl Link {
    pub fn new(target: impl Into<String>) -> Self {
        Link {
            target: target.into(),
            field: None,
            specifiers: Vec::new(),
        }
    }

    pub fn to_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    pub fn pp(self) -> Self {
        self.with(LinkSpec::Pp)
    }

    pub fn cp(self) -> Self {
        self.with(LinkSpec::Cp)
    }

    pub fn ms(self) -> Self {
        self.with(LinkSpec::Ms)
    }

    pub fn np(self) -> Self {
        self.with(LinkSpec::Np)
    }

    fn with(mut self, spec: LinkSpec) -> Self {
        self.specifiers.push(spec);
        self
    }

    /// The textual form emitted into the database file.
    pub fn render(&self) -> String {
        let mut out = self.target.clone();
        if let Some(field) = &self.field {
            out.push('.');
            out.push_str(field);
        }
        for spec in &self.specifiers {
            out.push(' ');
            out.push_str(spec.as_str());
        }
        out
    }
}

/// A value held in a record's field map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Scalar(String),
    Link(Link),
}

impl FieldValue {
    /// The textual form emitted into the database file.
    pub fn render(&self) -> String {
        match self {
            FieldValue::Scalar(text) => text.clone(),
            FieldValue::Link(link) => link.render(),
        }
    }
}

impl From<String> for FieldValue {
    fn from(text: String) -> Self {
        FieldValue::Scalar(text)
    }
}

impl From<&str> for FieldValue {
    fn from(text: &str) -> Self {
        FieldValue::Scalar(text.to_string())
    }
}

impl From<Link> for FieldValue {
    fn from(link: Link) -> Self {
        FieldValue::Link(link)
    }
}

impl From<&Record> for FieldValue {
    fn from(record: &Record) -> Self {
        FieldValue::Link(Link::new(record.full_name.clone()))
    }
}

/// How user-supplied record names expand into full names.
pub trait RecordNaming {
    fn full_name(&self, name: &str) -> String;
}

/// Names pass through unchanged.
#[derive(Debug, Clone, Default)]
pub struct VerbatimNaming;

impl RecordNaming for VerbatimNaming {
    fn full_name(&self, name: &str) -> String {
        name.to_string()
    }
}

/// Names gain a fixed device prefix.
#[derive(Debug, Clone)]
pub struct PrefixNaming {
    pub prefix: String,
    pub separator: String,
}

impl PrefixNaming {
    pub fn new(prefix: impl Into<String>) -> Self {
        PrefixNaming {
            prefix: prefix.into(),
            separator: ":".to_string(),
        }
    }
}

impl RecordNaming for PrefixNaming {
    fn full_name(&self, name: &str) -> String {
        format!("{}{}{}", self.prefix, self.separator, name)
    }
}

/// A named instance of a record type.
#[derive(Debug, Clone)]
pub struct Record {
    /// Unique full name, expanded through the active naming convention.
    pub full_name: String,
    /// Reflected record type name.
    pub record_type: String,
    fields: IndexMap<String, FieldValue>,
}

impl Record {
    pub fn new(full_name: impl Into<String>, record_type: impl Into<String>) -> Self {
        Record {
            full_name: full_name.into(),
            record_type: record_type.into(),
            fields: IndexMap::new(),
        }
    }

    /// Assign a field value.
    ///
    /// The `address` alias is routed to the record type's unique INP or OUT
    /// field. Scalar values are verified by the descriptor database at
    /// once; link values only have their field name checked here, the
    /// target being resolved when the graph closes.
    pub fn set_field(
        &mut self,
        registry: &RecordTypeRegistry,
        field: &str,
        value: impl Into<FieldValue>,
    ) -> Result<()> {
        let field = self.resolve_alias(registry, field)?;
        let value = value.into();
        match &value {
            FieldValue::Scalar(text) => {
                registry.check_value(&self.record_type, &field, text)?;
            }
            FieldValue::Link(_) => {
                // Structural check only; the target is validated later.
                let validator = &registry.record_type(&self.record_type)?.validator;
                validator.check_name(&field)?;
            }
        }
        self.fields.insert(field, value);
        Ok(())
    }

    /// Delete a field, routing the `address` alias like `set_field`.
    pub fn erase_field(&mut self, registry: &RecordTypeRegistry, field: &str) -> Result<()> {
        let field = self.resolve_alias(registry, field)?;
        self.fields.shift_remove(&field);
        Ok(())
    }

    fn resolve_alias(&self, registry: &RecordTypeRegistry, field: &str) -> Result<String> {
        if field == "address" {
            let validator = &registry.record_type(&self.record_type)?.validator;
            Ok(validator.address_field()?.to_string())
        } else {
            Ok(field.to_string())
        }
    }

    /// Read a field as a link to it.
    pub fn link_to(&self, field: impl Into<String>) -> Link {
        Link::new(self.full_name.clone()).to_field(field)
    }

    /// The stored value of a field, if set.
    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    /// The field map in insertion order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Every link value in the field map, with its field name.
    pub fn links(&self) -> impl Iterator<Item = (&str, &Link)> {
        self.fields.iter().filter_map(|(k, v)| match v {
            FieldValue::Link(link) => Some((k.as_str(), link)),
            FieldValue::Scalar(_) => None,
        })
    }

    /// Whether the record type classifies `field` as a link field.
    pub fn is_link_field(&self, registry: &RecordTypeRegistry, field: &str) -> bool {
        registry
            .record_type(&self.record_type)
            .ok()
            .and_then(|rt| rt.validator.field_kind(field))
            .map(|kind| kind == FieldKind::Link)
            .unwrap_or(false)
    }
}
