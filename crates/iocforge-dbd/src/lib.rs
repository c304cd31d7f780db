//! DBD descriptor access and record-type reflection for iocforge.
//!
//! DBD files declare record types, their fields, field types, and menu
//! enumerations. This crate reads them through the narrow [`StaticDatabase`]
//! interface and reflects each record type into a [`FieldValidator`] that
//! the record model consults on every field assignment.
//!
//! Two database backends exist:
//! - [`NativeDbd`] parses the textual DBD grammar directly and is the
//!   default, so the toolchain is usable without an EPICS install.
//! - `VendorDbd` (feature `vendor-dbd`) binds the vendor's static-database
//!   C library and defers all parsing and verification to it.

pub mod error;
#[cfg(feature = "vendor-dbd")]
pub mod ffi;
pub mod parser;
pub mod reflect;
pub mod staticdb;

pub use error::{DbdError, Result};
#[cfg(feature = "vendor-dbd")]
pub use ffi::VendorDbd;
pub use parser::NativeDbd;
pub use reflect::{FieldValidator, RecordType, RecordTypeRegistry};
pub use staticdb::{CwdGuard, FieldInfo, FieldKind, StaticDatabase};
