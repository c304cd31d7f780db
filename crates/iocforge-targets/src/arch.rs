//! Target architecture strings and startup-script dialect families.
//!
//! EPICS architecture strings look like `vxWorks-ppc604` or `linux-x86_64`.
//! The prefix selects the dialect family used throughout the emitted startup
//! script: vxWorks boot shells and soft-IOC shells quote commands
//! differently, change directory differently, and load code differently.

use serde::{Deserialize, Serialize};

use crate::error::{Result, TargetError};

/// The two supported startup-script dialect families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArchFamily {
    /// vxWorks boot shell: `cd "<path>"`, `putenv "N=V"`, `ld <` loading.
    VxWorks,
    /// Soft-IOC shell (Linux, RTEMS, etc.): `cd("<path>")`, `epicsEnvSet`.
    Ioc,
}

/// A target architecture with its resolved dialect family.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Architecture {
    /// Full architecture string, e.g. `vxWorks-ppc604`.
    pub name: String,
    /// Dialect family derived from the name prefix.
    pub family: ArchFamily,
}

impl Architecture {
    /// Parse an architecture string, selecting the family from its prefix.
    pub fn parse(name: &str) -> Result<Self> {
        if name.is_empty() || !name.contains('-') {
            return Err(TargetError::UnrecognisedArchitecture {
                arch: name.to_string(),
            });
        }
        let family = if name.starts_with("vxWorks-") {
            ArchFamily::VxWorks
        } else {
            ArchFamily::Ioc
        };
        Ok(Architecture {
            name: name.to_string(),
            family,
        })
    }

    /// The change-directory command for this family.
    pub fn cd_command(&self, path: &str) -> String {
        match self.family {
            ArchFamily::VxWorks => format!("cd \"{path}\""),
            ArchFamily::Ioc => format!("cd(\"{path}\")"),
        }
    }

    /// The set-environment-variable command for this family.
    pub fn env_command(&self, name: &str, value: &str) -> String {
        match self.family {
            ArchFamily::VxWorks => format!("putenv \"{name}={value}\""),
            ArchFamily::Ioc => format!("epicsEnvSet(\"{name}\", \"{value}\")"),
        }
    }

    /// The load command for an object or shared library file.
    pub fn load_command(&self, path: &str) -> String {
        match self.family {
            ArchFamily::VxWorks => format!("ld < {path}"),
            ArchFamily::Ioc => format!("dlload(\"{path}\")"),
        }
    }

    /// First vector available for hardware interrupt allocation.
    ///
    /// 0xC0 is the bottom of the user-assignable range on the supported
    /// targets; allocation never exceeds vector 255.
    pub fn vector_base(&self) -> u8 {
        0xC0
    }

    /// Whether this family can load code dynamically after boot.
    ///
    /// vxWorks always loads object files from the boot script; soft IOCs
    /// load shared libraries only when dynamic loading is configured.
    pub fn loads_at_boot(&self) -> bool {
        self.family == ArchFamily::VxWorks
    }
}
