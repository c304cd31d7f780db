//! Substitutions-file emission and inline expansion.

use indexmap::IndexMap;

use iocforge_core::InstanceGraph;
use iocforge_targets::Configuration;
use iocforge_template::{escape_quoted, Substitution};

use crate::error::{EmitError, Result};

/// A rendered substitutions file plus emission diagnostics.
#[derive(Debug, Clone)]
pub struct SubstitutionsFile {
    pub text: String,
    pub warnings: Vec<String>,
}

/// Render every substitution instance of the graph.
///
/// Each instantiated template gets a `file` block with a `pattern` line and
/// one quoted row per instance. Templates order by name, except that a
/// template is emitted only after everything in its `overwrites` list; if
/// the overwrite lists form a cycle, the cycle members fall back to
/// declaration order and a warning is recorded.
pub fn write_substitutions(graph: &InstanceGraph) -> Result<SubstitutionsFile> {
    let mut by_template: IndexMap<&str, Vec<&Substitution>> = IndexMap::new();
    for substitution in graph.substitutions() {
        by_template
            .entry(substitution.template.as_str())
            .or_default()
            .push(substitution);
    }

    let (order, warnings) = emission_order(graph, &by_template);

    let mut text = String::new();
    for name in &order {
        let template = graph.template(name)?;
        let instances = &by_template[name.as_str()];
        text.push_str(&format!("file \"{}\"\n{{\n", template.path.display()));
        text.push_str(&format!(
            "    pattern {{ {} }}\n",
            template.arguments().join(", ")
        ));
        for instance in instances {
            let row: Vec<String> = instance
                .values
                .values()
                .map(|v| format!("\"{}\"", escape_quoted(v)))
                .collect();
            text.push_str(&format!("    {{ {} }}\n", row.join(", ")));
        }
        text.push_str("}\n\n");
    }

    Ok(SubstitutionsFile { text, warnings })
}

/// Name order constrained by the overwrites partial order.
fn emission_order(
    graph: &InstanceGraph,
    by_template: &IndexMap<&str, Vec<&Substitution>>,
) -> (Vec<String>, Vec<String>) {
    let mut remaining: Vec<String> = by_template.keys().map(|n| n.to_string()).collect();
    remaining.sort();

    let mut order = Vec::new();
    let mut warnings = Vec::new();
    while !remaining.is_empty() {
        let ready = remaining.iter().position(|name| {
            graph
                .template(name)
                .map(|t| t.overwrites.iter().all(|dep| !remaining.contains(dep)))
                .unwrap_or(true)
        });
        match ready {
            Some(index) => order.push(remaining.remove(index)),
            None => {
                // Overwrite cycle: fall back to declaration order.
                warnings.push(format!(
                    "overwrite cycle between templates {}; using declaration order",
                    remaining.join(", ")
                ));
                let mut rest: Vec<String> = graph
                    .templates()
                    .map(|t| t.name.clone())
                    .filter(|n| remaining.contains(n))
                    .collect();
                order.append(&mut rest);
                remaining.clear();
            }
        }
    }
    (order, warnings)
}

/// Expand a template's instances inline through the external `msi` tool.
///
/// One invocation per instance, with the instance's bindings passed as an
/// explicit macro list; the expansions are concatenated.
pub fn expand_inline(
    config: &Configuration,
    graph: &InstanceGraph,
    template: &str,
) -> Result<String> {
    let definition = graph.template(template)?;
    let mut out = String::new();
    for substitution in graph
        .substitutions()
        .iter()
        .filter(|s| s.template == template)
    {
        let output = std::process::Command::new(&config.msi_path)
            .arg("-M")
            .arg(substitution.macro_bindings())
            .arg(&definition.path)
            .output()?;
        if !output.status.success() {
            return Err(EmitError::MsiFailed {
                template: template.to_string(),
                detail: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }
        out.push_str(&String::from_utf8_lossy(&output.stdout));
    }
    Ok(out)
}
