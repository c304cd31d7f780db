//! Template auto-scanning.
//!
//! Derives a template's argument metadata from the template text itself:
//! `$(NAME)` and `$(NAME=default)` references establish the argument set,
//! `#% macro, NAME, description` markers document them, `#% optional, NAME`
//! markers (or a `,undefined` description suffix) flag them optional, and
//! `#% autosave` markers are collected for the autosave request file.

use indexmap::IndexMap;

use std::path::Path;

use crate::error::{Result, TemplateError};

/// A non-fatal observation made while scanning a template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanWarning {
    /// A macro is used in the template but carries no `#% macro` marker.
    UndescribedMacro { name: String },
    /// A `#% macro` marker names a macro the template never uses.
    UnusedDescription { name: String },
}

impl std::fmt::Display for ScanWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScanWarning::UndescribedMacro { name } => {
                write!(f, "macro {name} is used but not described")
            }
            ScanWarning::UnusedDescription { name } => {
                write!(f, "macro {name} is described but never used")
            }
        }
    }
}

/// The result of scanning one template.
#[derive(Debug, Clone, Default)]
pub struct TemplateScan {
    /// Required argument names, in first-occurrence order.
    pub required: Vec<String>,
    /// Defaulted argument names with their defaults, in first-occurrence
    /// order.
    pub defaulted: Vec<(String, String)>,
    /// Optional argument names, in first-occurrence order.
    pub optional: Vec<String>,
    /// Per-argument descriptions from `#% macro` markers.
    pub descriptions: IndexMap<String, String>,
    /// Raw `#% autosave` marker payloads.
    pub autosave: Vec<String>,
    /// Non-fatal scanner observations.
    pub warnings: Vec<ScanWarning>,
}

impl TemplateScan {
    /// The derived argument order: required, then defaulted, then optional.
    pub fn argument_order(&self) -> Vec<String> {
        let mut order: Vec<String> = self.required.clone();
        order.extend(self.defaulted.iter().map(|(name, _)| name.clone()));
        order.extend(self.optional.iter().cloned());
        order
    }

    /// A docstring assembled from the macro descriptions.
    pub fn docstring(&self) -> String {
        self.descriptions
            .iter()
            .map(|(name, text)| format!("{name}: {text}"))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// One `$(NAME)` occurrence found in the text.
#[derive(Debug, Clone, PartialEq, Eq)]
struct MacroUse {
    name: String,
    default: Option<String>,
}

/// Scan a template file.
pub fn scan_template(path: &Path) -> Result<TemplateScan> {
    if !path.is_file() {
        return Err(TemplateError::FileNotFound {
            path: path.to_path_buf(),
        });
    }
    let text = std::fs::read_to_string(path)?;
    Ok(scan_text(&text))
}

/// Scan template text.
pub fn scan_text(text: &str) -> TemplateScan {
    let lines: Vec<&str> = text.lines().collect();

    let mut descriptions: IndexMap<String, String> = IndexMap::new();
    let mut optional_marks: Vec<String> = Vec::new();
    let mut undefined_marks: Vec<String> = Vec::new();
    let mut autosave = Vec::new();

    let mut index = 0;
    while index < lines.len() {
        let line = lines[index];
        index += 1;
        let Some(marker) = line.trim_start().strip_prefix("#%") else {
            continue;
        };
        let marker = marker.trim();
        if let Some(rest) = marker.strip_prefix("macro") {
            let rest = rest.trim_start().trim_start_matches(',').trim_start();
            let Some((name, first_line)) = split_marker(rest) else {
                continue;
            };
            // `,undefined` tagged descriptions flag the macro optional.
            let (first_line, undefined) = match first_line.strip_suffix(",undefined") {
                Some(stripped) => (stripped.trim_end().to_string(), true),
                None => (first_line, false),
            };
            if undefined {
                undefined_marks.push(name.clone());
            }
            let mut description = vec![first_line];
            // Continuation: comment lines with text, up to a blank line or
            // a bare `#`.
            while index < lines.len() {
                let next = lines[index].trim();
                let Some(tail) = next.strip_prefix('#') else {
                    break;
                };
                if next.starts_with("#%") {
                    break;
                }
                let tail = tail.trim();
                if tail.is_empty() {
                    break;
                }
                description.push(tail.to_string());
                index += 1;
            }
            descriptions.insert(name, description.join("\n"));
        } else if let Some(rest) = marker.strip_prefix("optional") {
            let rest = rest.trim_start().trim_start_matches(',').trim();
            for name in rest.split(',').map(str::trim).filter(|n| !n.is_empty()) {
                optional_marks.push(name.to_string());
            }
        } else if let Some(rest) = marker.strip_prefix("autosave") {
            autosave.push(rest.trim().to_string());
        }
    }

    let uses = find_macros(text);

    // Classify: optional beats defaulted beats required.
    let mut required = Vec::new();
    let mut defaulted: Vec<(String, String)> = Vec::new();
    let mut optional = Vec::new();
    let mut seen = indexmap::IndexSet::new();
    let mut defaults: IndexMap<String, String> = IndexMap::new();
    for m in &uses {
        if let Some(default) = &m.default {
            defaults.entry(m.name.clone()).or_insert(default.clone());
        }
        seen.insert(m.name.clone());
    }
    for name in &seen {
        let is_optional =
            optional_marks.iter().any(|n| n == name) || undefined_marks.iter().any(|n| n == name);
        if is_optional {
            optional.push(name.clone());
        } else if let Some(default) = defaults.get(name) {
            defaulted.push((name.clone(), default.clone()));
        } else {
            required.push(name.clone());
        }
    }

    let mut warnings = Vec::new();
    for name in &seen {
        if !descriptions.contains_key(name) {
            warnings.push(ScanWarning::UndescribedMacro { name: name.clone() });
        }
    }
    for name in descriptions.keys() {
        if !seen.contains(name) {
            warnings.push(ScanWarning::UnusedDescription { name: name.clone() });
        }
    }

    TemplateScan {
        required,
        defaulted,
        optional,
        descriptions,
        autosave,
        warnings,
    }
}

/// Split a `NAME, description` marker payload.
fn split_marker(rest: &str) -> Option<(String, String)> {
    let mut parts = rest.splitn(2, ',');
    let name = parts.next()?.trim();
    if name.is_empty() {
        return None;
    }
    let description = parts.next().unwrap_or("").trim().to_string();
    Some((name.to_string(), description))
}

/// Find every `$(NAME)` / `$(NAME=default)` reference, nested parentheses
/// in defaults respected.
fn find_macros(text: &str) -> Vec<MacroUse> {
    let chars: Vec<char> = text.chars().collect();
    let mut uses = Vec::new();
    let mut i = 0;
    while i + 1 < chars.len() {
        if chars[i] != '$' || chars[i + 1] != '(' {
            i += 1;
            continue;
        }
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
            // Unterminated reference: treat the rest as plain text.
            break;
        }
        let (name, default) = match body.split_once('=') {
            Some((name, default)) => (name.to_string(), Some(default.to_string())),
            None => (body, None),
        };
        if !name.is_empty() {
            uses.push(MacroUse { name, default });
        }
        i = j;
    }
    uses
}
