//! The narrow static-database interface.
//!
//! Everything the rest of the toolchain needs from a descriptor database is
//! expressed by [`StaticDatabase`]: read a file, enumerate record types and
//! their fields, materialise menu choices, verify a proposed value. The
//! descriptor database behind the trait is a shared, accumulating resource:
//! record types from every loaded file stay visible for the process
//! lifetime.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Semantic classification of a record field, derived from its `DBF_` code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FieldKind {
    /// Free text (DBF_STRING).
    String,
    /// Integer of any width or signedness (DBF_CHAR .. DBF_UINT64).
    Integer,
    /// Floating point (DBF_FLOAT, DBF_DOUBLE).
    Real,
    /// Menu choice (DBF_MENU, DBF_ENUM, DBF_DEVICE).
    Menu,
    /// Link to another record (DBF_INLINK, DBF_OUTLINK, DBF_FWDLINK).
    Link,
    /// Not assignable (DBF_NOACCESS).
    NoAccess,
}

impl FieldKind {
    /// Map a `DBF_*` type code to its classification.
    pub fn from_dbf(code: &str) -> Option<FieldKind> {
        Some(match code {
            "DBF_STRING" => FieldKind::String,
            "DBF_CHAR" | "DBF_UCHAR" | "DBF_SHORT" | "DBF_USHORT" | "DBF_LONG"
            | "DBF_ULONG" | "DBF_INT64" | "DBF_UINT64" => FieldKind::Integer,
            "DBF_FLOAT" | "DBF_DOUBLE" => FieldKind::Real,
            "DBF_MENU" | "DBF_ENUM" | "DBF_DEVICE" => FieldKind::Menu,
            "DBF_INLINK" | "DBF_OUTLINK" | "DBF_FWDLINK" => FieldKind::Link,
            "DBF_NOACCESS" => FieldKind::NoAccess,
            _ => return None,
        })
    }
}

/// Descriptor of a single record field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldInfo {
    /// Field name, e.g. `VAL`.
    pub name: String,
    /// Semantic classification.
    pub kind: FieldKind,
    /// Prompt text from the descriptor, if any.
    pub prompt: Option<String>,
    /// Menu name for menu fields.
    pub menu: Option<String>,
}

/// The narrow interface over a static descriptor database.
pub trait StaticDatabase {
    /// Read a DBD file into the shared descriptor database.
    ///
    /// `directory` is also the resolution root for `include` directives.
    fn read_database(&mut self, directory: &Path, filename: &str) -> Result<()>;

    /// Names of every record type currently in the database, in the order
    /// they were first declared.
    fn record_type_names(&self) -> Vec<String>;

    /// Field descriptors of a record type, excluding the synthetic `NAME`
    /// field.
    fn fields(&self, record_type: &str) -> Result<Vec<FieldInfo>>;

    /// The ordered choice strings of a menu field.
    fn menu_choices(&self, record_type: &str, field: &str) -> Option<Vec<String>>;

    /// Verify that `value`, formatted as text, is assignable to the field.
    ///
    /// On rejection the returned string is the verifier's diagnostic,
    /// surfaced verbatim to the caller.
    fn verify(
        &self,
        record_type: &str,
        field: &str,
        value: &str,
    ) -> std::result::Result<(), String>;
}

/// The working directory is process-global state; loads are serialised.
static CWD_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

/// Saves the current working directory and restores it on drop.
///
/// DBD loading through the vendor library resolves includes relative to the
/// working directory, so every load is bracketed by one of these; the
/// restore happens whether or not the load succeeds.
pub struct CwdGuard {
    saved: PathBuf,
    // Held for the guard's lifetime; released after the restore.
    _lock: std::sync::MutexGuard<'static, ()>,
}

impl CwdGuard {
    /// Change into `directory`, remembering where we were.
    pub fn push(directory: &Path) -> Result<CwdGuard> {
        let lock = CWD_LOCK
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let saved = std::env::current_dir()?;
        std::env::set_current_dir(directory)?;
        Ok(CwdGuard { saved, _lock: lock })
    }
}

impl Drop for CwdGuard {
    fn drop(&mut self) {
        // Nothing useful to do if the original directory vanished.
        let _ = std::env::set_current_dir(&self.saved);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dbf_codes_classify() {
        assert_eq!(FieldKind::from_dbf("DBF_STRING"), Some(FieldKind::String));
        assert_eq!(FieldKind::from_dbf("DBF_LONG"), Some(FieldKind::Integer));
        assert_eq!(FieldKind::from_dbf("DBF_DOUBLE"), Some(FieldKind::Real));
        assert_eq!(FieldKind::from_dbf("DBF_MENU"), Some(FieldKind::Menu));
        assert_eq!(FieldKind::from_dbf("DBF_INLINK"), Some(FieldKind::Link));
        assert_eq!(FieldKind::from_dbf("DBF_NOACCESS"), Some(FieldKind::NoAccess));
        assert_eq!(FieldKind::from_dbf("DBF_BOGUS"), None);
    }

    #[test]
    fn cwd_guard_restores_on_drop() {
        let before = std::env::current_dir().unwrap();
        let dir = tempfile::tempdir().unwrap();
        {
            let _guard = CwdGuard::push(dir.path()).unwrap();
            assert_eq!(
                std::env::current_dir().unwrap().canonicalize().unwrap(),
                dir.path().canonicalize().unwrap()
            );
        }
        // Re-acquire the lock so a concurrent load cannot be mid-guard
        // while we sample the restored directory.
        let _lock = CWD_LOCK
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        assert_eq!(std::env::current_dir().unwrap(), before);
    }
}
