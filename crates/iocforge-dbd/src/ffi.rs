//! Bindings to the vendor static-database C library.
//!
//! Only compiled with the `vendor-dbd` feature; the emitted binary then
//! links against the EPICS `dbCore` library. The descriptor database is an
//! opaque resource owned by [`VendorDbd`] and released on drop.

use std::ffi::{c_char, c_int, c_long, CStr, CString};
use std::path::Path;
use std::ptr;

use crate::error::{DbdError, Result};
use crate::staticdb::{FieldInfo, FieldKind, StaticDatabase};

#[repr(C)]
struct DbBase {
    _opaque: [u8; 0],
}

#[repr(C)]
struct DbEntry {
    _opaque: [u8; 0],
}

// DCT field type codes returned by dbGetFieldType.
const DCT_STRING: c_int = 0;
const DCT_INTEGER: c_int = 1;
const DCT_REAL: c_int = 2;
const DCT_MENU: c_int = 3;
const DCT_MENUFORM: c_int = 4;
const DCT_INLINK: c_int = 5;
const DCT_OUTLINK: c_int = 6;
const DCT_FWDLINK: c_int = 7;
const DCT_NOACCESS: c_int = 8;

#[link(name = "dbCore")]
extern "C" {
    fn dbReadDatabase(
        ppdbbase: *mut *mut DbBase,
        filename: *const c_char,
        path: *const c_char,
        substitutions: *const c_char,
    ) -> c_long;
    fn dbAllocEntry(pdbbase: *mut DbBase) -> *mut DbEntry;
    fn dbFreeEntry(pdbentry: *mut DbEntry);
    fn dbFreeBase(pdbbase: *mut DbBase);
    fn dbFirstRecordType(pdbentry: *mut DbEntry) -> c_long;
    fn dbNextRecordType(pdbentry: *mut DbEntry) -> c_long;
    fn dbGetRecordTypeName(pdbentry: *mut DbEntry) -> *const c_char;
    fn dbFindRecordType(pdbentry: *mut DbEntry, record_type: *const c_char) -> c_long;
    fn dbFirstField(pdbentry: *mut DbEntry, dct_only: c_int) -> c_long;
    fn dbNextField(pdbentry: *mut DbEntry, dct_only: c_int) -> c_long;
    fn dbFindField(pdbentry: *mut DbEntry, field: *const c_char) -> c_long;
    fn dbGetFieldName(pdbentry: *mut DbEntry) -> *const c_char;
    fn dbGetFieldType(pdbentry: *mut DbEntry) -> c_int;
    fn dbGetPrompt(pdbentry: *mut DbEntry) -> *const c_char;
    fn dbGetNMenuChoices(pdbentry: *mut DbEntry) -> c_int;
    fn dbGetMenuChoices(pdbentry: *mut DbEntry) -> *mut *mut c_char;
    fn dbVerify(pdbentry: *mut DbEntry, value: *const c_char) -> *const c_char;
}

/// Descriptor database backed by the vendor library.
pub struct VendorDbd {
    base: *mut DbBase,
}

// The toolchain is single-threaded batch; the raw pointer never crosses a
// thread boundary in practice, but the type still refuses to be Sync.
unsafe impl Send for VendorDbd {}

impl VendorDbd {
    /// Create an empty database; the base pointer is allocated lazily by
    /// the first read.
    pub fn new() -> Self {
        VendorDbd {
            base: ptr::null_mut(),
        }
    }

    /// Allocate a cursor entry, run `f` with it, and free it on all exits.
    fn with_entry<T>(&self, f: impl FnOnce(*mut DbEntry) -> T) -> Option<T> {
        if self.base.is_null() {
            return None;
        }
        unsafe {
            let entry = dbAllocEntry(self.base);
            if entry.is_null() {
                return None;
            }
            let out = f(entry);
            dbFreeEntry(entry);
            Some(out)
        }
    }

    fn classify(code: c_int) -> FieldKind {
        match code {
            DCT_STRING => FieldKind::String,
            DCT_INTEGER => FieldKind::Integer,
            DCT_REAL => FieldKind::Real,
            DCT_MENU | DCT_MENUFORM => FieldKind::Menu,
            DCT_INLINK | DCT_OUTLINK | DCT_FWDLINK => FieldKind::Link,
            DCT_NOACCESS => FieldKind::NoAccess,
            _ => FieldKind::NoAccess,
        }
    }
}

impl Default for VendorDbd {
    fn default() -> Self {
        VendorDbd::new()
    }
}

impl Drop for VendorDbd {
    fn drop(&mut self) {
        if !self.base.is_null() {
            unsafe { dbFreeBase(self.base) };
            self.base = ptr::null_mut();
        }
    }
}

fn to_cstring(text: &str) -> CString {
    CString::new(text).unwrap_or_default()
}

unsafe fn from_cstr(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        None
    } else {
        Some(CStr::from_ptr(ptr).to_string_lossy().into_owned())
    }
}

impl StaticDatabase for VendorDbd {
    fn read_database(&mut self, directory: &Path, filename: &str) -> Result<()> {
        let file = to_cstring(filename);
        let path = to_cstring(&directory.to_string_lossy());
        let status =
            unsafe { dbReadDatabase(&mut self.base, file.as_ptr(), path.as_ptr(), ptr::null()) };
        if status != 0 {
            return Err(DbdError::Parse {
                file: filename.to_string(),
                line: 0,
                detail: format!("dbReadDatabase returned status {status}"),
            });
        }
        Ok(())
    }

    fn record_type_names(&self) -> Vec<String> {
        self.with_entry(|entry| {
            let mut names = Vec::new();
            unsafe {
                let mut status = dbFirstRecordType(entry);
                while status == 0 {
                    if let Some(name) = from_cstr(dbGetRecordTypeName(entry)) {
                        names.push(name);
                    }
                    status = dbNextRecordType(entry);
                }
            }
            names
        })
        .unwrap_or_default()
    }

    fn fields(&self, record_type: &str) -> Result<Vec<FieldInfo>> {
        let rtype = to_cstring(record_type);
        self.with_entry(|entry| unsafe {
            if dbFindRecordType(entry, rtype.as_ptr()) != 0 {
                return Err(DbdError::UnknownRecordType {
                    name: record_type.to_string(),
                });
            }
            let mut fields = Vec::new();
            let mut status = dbFirstField(entry, 0);
            while status == 0 {
                if let Some(name) = from_cstr(dbGetFieldName(entry)) {
                    if name != "NAME" {
                        fields.push(FieldInfo {
                            name,
                            kind: Self::classify(dbGetFieldType(entry)),
                            prompt: from_cstr(dbGetPrompt(entry)),
                            menu: None,
                        });
                    }
                }
                status = dbNextField(entry, 0);
            }
            Ok(fields)
        })
        .unwrap_or_else(|| {
            Err(DbdError::UnknownRecordType {
                name: record_type.to_string(),
            })
        })
    }

    fn menu_choices(&self, record_type: &str, field: &str) -> Option<Vec<String>> {
        let rtype = to_cstring(record_type);
        let fname = to_cstring(field);
        self.with_entry(|entry| unsafe {
            if dbFindRecordType(entry, rtype.as_ptr()) != 0
                || dbFindField(entry, fname.as_ptr()) != 0
            {
                return None;
            }
            let count = dbGetNMenuChoices(entry);
            if count <= 0 {
                return None;
            }
            let raw = dbGetMenuChoices(entry);
            if raw.is_null() {
                return None;
            }
            let mut choices = Vec::with_capacity(count as usize);
            for i in 0..count {
                choices.push(from_cstr(*raw.offset(i as isize)).unwrap_or_default());
            }
            Some(choices)
        })
        .flatten()
    }

    fn verify(
        &self,
        record_type: &str,
        field: &str,
        value: &str,
    ) -> std::result::Result<(), String> {
        let rtype = to_cstring(record_type);
        let fname = to_cstring(field);
        let cvalue = to_cstring(value);
        self.with_entry(|entry| unsafe {
            if dbFindRecordType(entry, rtype.as_ptr()) != 0 {
                return Err(format!("unknown record type {record_type}"));
            }
            if dbFindField(entry, fname.as_ptr()) != 0 {
                return Err(format!("unknown field {field}"));
            }
            match from_cstr(dbVerify(entry, cvalue.as_ptr())) {
                None => Ok(()),
                Some(diagnostic) => Err(diagnostic),
            }
        })
        .unwrap_or_else(|| Err("descriptor database is empty".to_string()))
    }
}
