//! Template definitions and substitution instances.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TemplateError};
use crate::scan::scan_template;

/// A declared substitution template: a file plus its argument list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateDefinition {
    /// Template identity, used for ordering and `overwrites` references.
    /// Defaults to the file stem.
    pub name: String,
    /// Template file path.
    pub path: PathBuf,
    /// Required argument names, in declared order.
    pub required: Vec<String>,
    /// Defaulted arguments: name → default value.
    #[serde(default)]
    pub defaults: IndexMap<String, String>,
    /// Optional argument names.
    #[serde(default)]
    pub optional: Vec<String>,
    /// Documentation derived from template markers, if scanned.
    #[serde(default)]
    pub description: Option<String>,
    /// Templates that must be expanded before this one.
    #[serde(default)]
    pub overwrites: Vec<String>,
    /// Autosave request lines from `#% autosave` markers: an optional pass
    /// number followed by the line text, macros still unexpanded.
    #[serde(default)]
    pub autosave: Vec<String>,
}

impl TemplateDefinition {
    /// Declare a template with an explicit argument tuple.
    pub fn new(path: PathBuf, arguments: Vec<String>) -> Self {
        TemplateDefinition {
            name: template_name(&path),
            path,
            required: arguments,
            defaults: IndexMap::new(),
            optional: Vec::new(),
            description: None,
            overwrites: Vec::new(),
            autosave: Vec::new(),
        }
    }

    /// Declare a template by scanning its marker comments.
    pub fn from_scan(path: PathBuf) -> Result<Self> {
        let scan = scan_template(&path)?;
        Ok(TemplateDefinition {
            name: template_name(&path),
            path,
            required: scan.required.clone(),
            defaults: scan.defaulted.iter().cloned().collect(),
            optional: scan.optional.clone(),
            description: Some(scan.docstring()).filter(|d| !d.is_empty()),
            overwrites: Vec::new(),
            autosave: scan.autosave,
        })
    }

    /// All declared argument names: required, defaulted, then optional.
    pub fn arguments(&self) -> Vec<&str> {
        let mut args: Vec<&str> = self.required.iter().map(String::as_str).collect();
        args.extend(self.defaults.keys().map(String::as_str));
        args.extend(self.optional.iter().map(String::as_str));
        args
    }

    /// Instantiate this template with keyword arguments.
    ///
    /// The supplied key set must equal the declared argument set: required
    /// keys must be present, defaulted keys fall back to their defaults,
    /// optional keys to the empty string, and unknown keys are rejected.
    pub fn instantiate(&self, supplied: IndexMap<String, String>) -> Result<Substitution> {
        let declared = self.arguments();
        for key in supplied.keys() {
            if !declared.contains(&key.as_str()) {
                return Err(TemplateError::UnexpectedArgument {
                    template: self.name.clone(),
                    name: key.clone(),
                });
            }
        }

        let mut values = IndexMap::new();
        for name in &self.required {
            let value = supplied
                .get(name)
                .cloned()
                .ok_or_else(|| TemplateError::MissingArgument {
                    template: self.name.clone(),
                    name: name.clone(),
                })?;
            values.insert(name.clone(), value);
        }
        for (name, default) in &self.defaults {
            let value = supplied.get(name).cloned().unwrap_or_else(|| default.clone());
            values.insert(name.clone(), value);
        }
        for name in &self.optional {
            let value = supplied.get(name).cloned().unwrap_or_default();
            values.insert(name.clone(), value);
        }

        Ok(Substitution {
            template: self.name.clone(),
            values,
        })
    }
}

/// One keyed instantiation of a template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Substitution {
    /// Name of the template this instantiates.
    pub template: String,
    /// Argument values in the template's declared order.
    pub values: IndexMap<String, String>,
}

impl Substitution {
    /// Macro bindings in `K=V` form, as passed to the expansion tool.
    pub fn macro_bindings(&self) -> String {
        self.values
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Template identity: the file stem.
fn template_name(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

/// Escape a value for a double-quoted substitutions-file cell.
pub fn escape_quoted(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Expand `$(KEY)` references in `text` against `bindings`.
///
/// Unbound references without a default are left untouched; `$(K=default)`
/// falls back to its default. Nested references inside defaults are
/// expanded recursively.
pub fn expand_macros(text: &str, bindings: &IndexMap<String, String>) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;
    while i < chars.len() {
        if chars[i] == '$' && i + 1 < chars.len() && chars[i + 1] == '(' {
            let mut j = i + 2;
            let mut depth = 1usize;
            let mut body = String::new();
            while j < chars.len() && depth > 0 {
                match chars[j] {
                    '(' => {
                        depth += 1;
                        body.push('(');
                    }
                    ')' => {
                        depth -= 1;
                        if depth > 0 {
                            body.push(')');
                        }
                    }
                    c => body.push(c),
                }
                j += 1;
            }
            if depth != 0 {
                out.extend(&chars[i..]);
                break;
            }
            let (name, default) = match body.split_once('=') {
                Some((name, default)) => (name.to_string(), Some(default.to_string())),
                None => (body.clone(), None),
            };
            match (bindings.get(&name), default) {
                (Some(value), _) => out.push_str(value),
                (None, Some(default)) => out.push_str(&expand_macros(&default, bindings)),
                (None, None) => {
                    out.push_str("$(");
                    out.push_str(&body);
                    out.push(')');
                }
            }
            i = j;
        } else {
            out.push(chars[i]);
            i += 1;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bindings(pairs: &[(&str, &str)]) -> IndexMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn definition() -> TemplateDefinition {
        let mut def = TemplateDefinition::new(
            PathBuf::from("db/motor.template"),
            vec!["P".to_string(), "N".to_string()],
        );
        def.defaults.insert("EGU".to_string(), "mm".to_string());
        def.optional.push("DESC".to_string());
        def
    }

    #[test]
    fn instantiation_requires_declared_keys() {
        let def = definition();
        let sub = def
            .instantiate(bindings(&[("P", "BL18I"), ("N", "1")]))
            .unwrap();
        assert_eq!(sub.template, "motor");
        assert_eq!(sub.values.get("P").map(String::as_str), Some("BL18I"));
        assert_eq!(sub.values.get("EGU").map(String::as_str), Some("mm"));
        assert_eq!(sub.values.get("DESC").map(String::as_str), Some(""));

        assert!(matches!(
            def.instantiate(bindings(&[("P", "BL18I")])),
            Err(TemplateError::MissingArgument { .. })
        ));
        assert!(matches!(
            def.instantiate(bindings(&[("P", "a"), ("N", "1"), ("XX", "y")])),
            Err(TemplateError::UnexpectedArgument { .. })
        ));
    }

    #[test]
    fn values_follow_declared_order() {
        let def = definition();
        let sub = def
            .instantiate(bindings(&[
                ("DESC", "axis"),
                ("N", "2"),
                ("P", "BL18I"),
                ("EGU", "deg"),
            ]))
            .unwrap();
        let keys: Vec<&str> = sub.values.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["P", "N", "EGU", "DESC"]);
    }

    #[test]
    fn from_scan_derives_arguments() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("probe.template");
        std::fs::write(
            &path,
            "#% macro, P, device prefix\nrecord(ai, \"$(P):AI\") { field(EGU, \"$(EGU=V)\") }\n",
        )
        .unwrap();
        let def = TemplateDefinition::from_scan(path).unwrap();
        assert_eq!(def.name, "probe");
        assert_eq!(def.required, vec!["P".to_string()]);
        assert_eq!(def.defaults.get("EGU").map(String::as_str), Some("V"));
        assert!(def.description.unwrap().contains("device prefix"));
    }

    #[test]
    fn escaping_for_quoted_cells() {
        assert_eq!(escape_quoted(r#"say "hi""#), r#"say \"hi\""#);
        assert_eq!(escape_quoted(r"back\slash"), r"back\\slash");
    }

    #[test]
    fn macro_expansion() {
        let b = bindings(&[("P", "BL18I"), ("N", "3")]);
        assert_eq!(expand_macros("$(P):M$(N)", &b), "BL18I:M3");
        assert_eq!(expand_macros("$(EGU=mm)", &b), "mm");
        assert_eq!(expand_macros("$(OUT=$(P):OUT)", &b), "BL18I:OUT");
        assert_eq!(expand_macros("$(UNBOUND)", &b), "$(UNBOUND)");
    }

    #[test]
    fn macro_bindings_string() {
        let def = definition();
        let sub = def
            .instantiate(bindings(&[("P", "BL18I"), ("N", "1")]))
            .unwrap();
        assert_eq!(sub.macro_bindings(), "P=BL18I,N=1,EGU=mm,DESC=");
    }
}
