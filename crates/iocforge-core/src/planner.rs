//! Initialisation planning.
//!
//! The planner linearises device initialisation into a [`CommandPlan`]: for
//! each phase in order, each instance in creation order runs its class's
//! once-per-class hook (guarded so one class fires once per phase across
//! all its instances) and then its per-instance hook. Hook command
//! templates are expanded against the instance's parameter map.

use std::collections::{BTreeSet, HashSet};

use iocforge_template::expand_macros;

use crate::device::Phase;
use crate::error::Result;
use crate::graph::InstanceGraph;

/// The linearised initialisation commands of one build.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandPlan {
    /// Phase-ordered initialisation lines for the script body.
    pub body: Vec<String>,
    /// Instance command lists flushed at phase zero, emitted before
    /// `iocInit`.
    pub pre_init: Vec<String>,
    /// Post-init hooks and command lists, emitted after `iocInit`.
    pub post_init: Vec<String>,
}

/// Compute the command plan for a closed graph.
///
/// The phase set is the union of every referenced definition's phase table;
/// phase zero is always present so instance pre-init command lists flush
/// even when no class hooks into it.
pub fn plan(graph: &InstanceGraph) -> Result<CommandPlan> {
    let mut phases: BTreeSet<Phase> = BTreeSet::new();
    phases.insert(Phase::At(0));
    for definition in graph.referenced_definitions() {
        phases.extend(definition.phases.keys().copied());
    }

    let mut plan = CommandPlan::default();
    let mut once_done: HashSet<(String, Phase)> = HashSet::new();

    for phase in &phases {
        for instance in graph.instances() {
            let definition = graph.definition(&instance.definition)?;
            if let Some(hooks) = definition.phases.get(phase) {
                if once_done.insert((definition.name.clone(), *phase)) {
                    for template in &hooks.once {
                        plan.body.push(expand_macros(template, &instance.parameters));
                    }
                }
                for template in &hooks.each {
                    plan.body.push(expand_macros(template, &instance.parameters));
                }
            }
            if *phase == Phase::At(0) {
                plan.pre_init.extend(instance.pre_init_commands.iter().cloned());
            }
        }
    }

    // Separate pass after all phases: post-init hooks, then each instance's
    // queued post-init commands.
    let mut post_once_done: HashSet<String> = HashSet::new();
    for instance in graph.instances() {
        let definition = graph.definition(&instance.definition)?;
        if post_once_done.insert(definition.name.clone()) {
            for template in &definition.post_init.once {
                plan.post_init
                    .push(expand_macros(template, &instance.parameters));
            }
        }
        for template in &definition.post_init.each {
            plan.post_init
                .push(expand_macros(template, &instance.parameters));
        }
        plan.post_init
            .extend(instance.post_init_commands.iter().cloned());
    }

    Ok(plan)
}
