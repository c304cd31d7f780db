//! Startup-script emission.
//!
//! The script is built in three stages sharing one line buffer: a header
//! (change-directory, terminal setup, environment, clock rate, gateway
//! route), a body (one load block per referenced device class, then the
//! planned initialisation), and a footer (`dbLoadRecords`, pre-init
//! commands, `iocInit`, post-init commands). Every line is checked against
//! the 126-character limit as it is pushed.

use indexmap::IndexMap;

use iocforge_core::{CommandPlan, InstanceGraph};
use iocforge_targets::{ArchFamily, Configuration};

use crate::error::{EmitError, Result};

/// Longest line the target boot shells accept.
const MAX_LINE: usize = 126;

/// Per-script knobs that are not part of the instance graph.
#[derive(Debug, Clone, Default)]
pub struct ScriptOptions {
    /// Directory the script changes into before loading anything.
    pub boot_dir: Option<String>,
    /// Environment variables, emitted in insertion order.
    pub env: IndexMap<String, String>,
    /// System clock rate in Hz (vxWorks only).
    pub clock_rate: Option<u32>,
    /// Gateway address for the boot-time network route (vxWorks only).
    pub gateway: Option<String>,
    /// Directory the footer changes into before loading databases.
    pub final_dir: Option<String>,
    /// Database files passed to `dbLoadRecords`, in order.
    pub databases: Vec<String>,
}

/// Emits one startup script for a closed graph and its command plan.
pub struct ScriptWriter<'a> {
    config: &'a Configuration,
    graph: &'a InstanceGraph,
    plan: &'a CommandPlan,
    options: &'a ScriptOptions,
}

impl<'a> ScriptWriter<'a> {
    pub fn new(
        config: &'a Configuration,
        graph: &'a InstanceGraph,
        plan: &'a CommandPlan,
        options: &'a ScriptOptions,
    ) -> Self {
        ScriptWriter {
            config,
            graph,
            plan,
            options,
        }
    }

    /// Produce the complete script text.
    pub fn write(&self) -> Result<String> {
        let mut lines = Vec::new();
        self.header(&mut lines)?;
        self.body(&mut lines)?;
        self.footer(&mut lines)?;
        let mut text = lines.join("\n");
        text.push('\n');
        Ok(text)
    }

    fn header(&self, lines: &mut Vec<String>) -> Result<()> {
        let arch = &self.config.architecture;
        if let Some(dir) = &self.options.boot_dir {
            push(lines, arch.cd_command(dir))?;
        }
        if arch.family == ArchFamily::VxWorks {
            push(lines, "tyBackspaceSet(127)".to_string())?;
        }
        for (name, value) in &self.options.env {
            push(lines, arch.env_command(name, value))?;
        }
        if arch.family == ArchFamily::VxWorks {
            if let Some(rate) = self.options.clock_rate {
                push(lines, format!("sysClkRateSet({rate})"))?;
            }
            if let Some(gateway) = &self.options.gateway {
                push(lines, format!("routeAdd \"0\", \"{gateway}\""))?;
            }
        }
        Ok(())
    }

    fn body(&self, lines: &mut Vec<String>) -> Result<()> {
        let arch = &self.config.architecture;
        let loads_code = arch.loads_at_boot() || self.config.dynamic_loading;
        for definition in self.graph.referenced_definitions() {
            if !definition.has_library_block() {
                continue;
            }
            push(lines, String::new())?;
            push(lines, format!("# {}", definition.name))?;
            for binary in &definition.binaries {
                push(lines, arch.load_command(binary))?;
            }
            if loads_code {
                for library in &definition.libraries {
                    push(lines, arch.load_command(library))?;
                }
                for dbd in &definition.dbd_files {
                    push(lines, database_load(arch.family, dbd))?;
                }
            }
        }

        if !self.plan.body.is_empty() {
            push(lines, String::new())?;
            for command in &self.plan.body {
                push(lines, command.clone())?;
            }
        }
        Ok(())
    }

    fn footer(&self, lines: &mut Vec<String>) -> Result<()> {
        let arch = &self.config.architecture;
        push(lines, String::new())?;
        if let Some(dir) = &self.options.final_dir {
            push(lines, arch.cd_command(dir))?;
        }
        for database in &self.options.databases {
            push(lines, records_load(arch.family, database))?;
        }
        for command in &self.plan.pre_init {
            push(lines, command.clone())?;
        }
        push(lines, "iocInit".to_string())?;
        for command in &self.plan.post_init {
            push(lines, command.clone())?;
        }
        Ok(())
    }
}

fn database_load(family: ArchFamily, file: &str) -> String {
    match family {
        ArchFamily::VxWorks => format!("dbLoadDatabase \"{file}\""),
        ArchFamily::Ioc => format!("dbLoadDatabase(\"{file}\")"),
    }
}

fn records_load(family: ArchFamily, file: &str) -> String {
    match family {
        ArchFamily::VxWorks => format!("dbLoadRecords \"{file}\""),
        ArchFamily::Ioc => format!("dbLoadRecords(\"{file}\")"),
    }
}

fn push(lines: &mut Vec<String>, line: String) -> Result<()> {
    if line.len() > MAX_LINE {
        return Err(EmitError::LineTooLong {
            length: line.len(),
            line,
        });
    }
    lines.push(line);
    Ok(())
}
