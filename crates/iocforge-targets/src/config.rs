//! Install-path configuration.
//!
//! A single explicit value carries everything location-dependent: the EPICS
//! base install, the support-module search root, the target architecture,
//! and helper tool paths. Components that need a path borrow the
//! configuration rather than consulting process-wide state.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::arch::Architecture;
use crate::error::{Result, TargetError};

/// Resolved install-path and target configuration.
///
/// Construction is cheap and never touches the filesystem; validation
/// happens at the point of use so that a partially configured value can be
/// built up before any module is declared.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Configuration {
    /// EPICS base install directory.
    pub epics_base: Option<PathBuf>,
    /// Root directory searched for support modules (`<root>/<name>/<version>`).
    pub support_root: Option<PathBuf>,
    /// Target architecture.
    pub architecture: Architecture,
    /// Whether the emitted IOC loads shared libraries and DBDs dynamically.
    pub dynamic_loading: bool,
    /// Path of the external macro expansion tool (`msi`).
    pub msi_path: PathBuf,
    /// Directory holding fallback builder manifests for modules without one.
    pub defaults_dir: Option<PathBuf>,
}

impl Configuration {
    /// Build a configuration with explicit paths.
    pub fn new(epics_base: PathBuf, support_root: PathBuf, architecture: Architecture) -> Self {
        Configuration {
            epics_base: Some(epics_base),
            support_root: Some(support_root),
            architecture,
            dynamic_loading: false,
            msi_path: PathBuf::from("msi"),
            defaults_dir: None,
        }
    }

    /// Build a configuration from the process environment.
    ///
    /// Reads `EPICS_BASE`, `SUPPORT`, and `EPICS_HOST_ARCH`. Unset variables
    /// leave the corresponding field unconfigured; they error at first use.
    pub fn from_env(architecture: Option<&str>) -> Result<Self> {
        let arch_name = match architecture {
            Some(a) => a.to_string(),
            None => std::env::var("EPICS_HOST_ARCH").map_err(|_| {
                TargetError::UnrecognisedArchitecture {
                    arch: String::new(),
                }
            })?,
        };
        Ok(Configuration {
            epics_base: std::env::var_os("EPICS_BASE").map(PathBuf::from),
            support_root: std::env::var_os("SUPPORT").map(PathBuf::from),
            architecture: Architecture::parse(&arch_name)?,
            dynamic_loading: false,
            msi_path: PathBuf::from("msi"),
            defaults_dir: None,
        })
    }

    /// The EPICS base install, validated to exist.
    pub fn epics_base(&self) -> Result<&Path> {
        let base = self
            .epics_base
            .as_deref()
            .ok_or(TargetError::BaseNotConfigured)?;
        if !base.is_dir() {
            return Err(TargetError::BaseMissing {
                path: base.to_path_buf(),
            });
        }
        Ok(base)
    }

    /// The support-module search root, validated to exist.
    pub fn support_root(&self) -> Result<&Path> {
        let root = self
            .support_root
            .as_deref()
            .ok_or(TargetError::BaseNotConfigured)?;
        if !root.is_dir() {
            return Err(TargetError::SupportRootMissing {
                path: root.to_path_buf(),
            });
        }
        Ok(root)
    }

    /// Enable dynamic loading of shared libraries and DBDs in the startup
    /// script.
    pub fn with_dynamic_loading(mut self, enabled: bool) -> Self {
        self.dynamic_loading = enabled;
        self
    }

    /// Set the defaults directory searched for fallback builder manifests.
    pub fn with_defaults_dir(mut self, dir: PathBuf) -> Self {
        self.defaults_dir = Some(dir);
        self
    }
}
