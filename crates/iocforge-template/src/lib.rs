//! Substitution templates for iocforge.
//!
//! A template is a plain-text file containing `$(KEY)` macro references.
//! A [`TemplateDefinition`] names the file and its argument list, written
//! out explicitly or derived by [`scan_template`] from `#%` marker comments
//! in the file. A [`Substitution`] is one keyed instantiation of it.
//! Expansion itself happens at the emission boundary: either as rows of a
//! substitutions file or inline through the external expansion tool.

pub mod error;
pub mod scan;
pub mod template;

pub use error::{Result, TemplateError};
pub use scan::{scan_template, scan_text, ScanWarning, TemplateScan};
pub use template::{escape_quoted, expand_macros, Substitution, TemplateDefinition};
