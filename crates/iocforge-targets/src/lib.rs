//! Target architecture model and install-path configuration for iocforge.
//!
//! An IOC is built *for* a target architecture and *against* an EPICS base
//! install plus a support-module search root. This crate decides both:
//! - **Architecture:** the target architecture string and its startup-script
//!   dialect family (vxWorks vs. soft-IOC shell).
//! - **Configuration:** the explicit, idempotent configuration value holding
//!   the base install, module search root, and helper tool locations.

pub mod arch;
pub mod config;
pub mod error;

pub use arch::{ArchFamily, Architecture};
pub use config::Configuration;
pub use error::{Result, TargetError};
