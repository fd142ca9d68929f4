//! Load-time workflow validation.
//!
//! Everything that can fail before execution is checked here, eagerly:
//! structural graph problems (via [`StepGraph::build`]), fragment lookup and
//! composition for every step, and placeholder coverage. A workflow that
//! passes validation cannot hit `NotFound`, `CompositionError`,
//! `CyclicDependency`, `DanglingReference`, or an unbound placeholder once
//! steps start running.

use super::{StepGraph, Workflow};
use crate::compose::step_fragments;
use crate::error::{Result, SkeinError};
use crate::fragment::FragmentStore;
use crate::template;
use std::collections::{HashMap, HashSet};

/// Validate a workflow against a fragment store.
///
/// Returns the validated step graph for the engine to schedule over.
pub fn validate_workflow(workflow: &Workflow, store: &FragmentStore) -> Result<StepGraph> {
    let graph = StepGraph::build(workflow)?;

    // Variable names satisfiable for every step: declared workflow inputs
    // (required ones are checked against supplied values at run start).
    let workflow_inputs: HashSet<&str> =
        workflow.inputs.iter().map(|i| i.name.as_str()).collect();

    // Output names each step's fragments declare, for closure lookups.
    let mut outputs_by_step: HashMap<&str, Vec<String>> = HashMap::new();
    for step in &workflow.steps {
        let fragments = step_fragments(workflow, step, store)?;
        let names = fragments
            .iter()
            .flat_map(|f| f.meta.outputs.iter().map(|o| o.name.clone()))
            .collect();
        outputs_by_step.insert(&step.id, names);
    }

    for step in &workflow.steps {
        let fragments = step_fragments(workflow, step, store)?;

        // Fragment inputs carrying a default satisfy themselves.
        let defaulted: HashSet<&str> = fragments
            .iter()
            .flat_map(|f| f.meta.inputs.iter())
            .filter(|i| i.default.is_some())
            .map(|i| i.name.as_str())
            .collect();

        // Outputs guaranteed produced before this step runs.
        let closure = graph.dependency_closure(&step.id);
        let upstream: HashSet<&str> = closure
            .iter()
            .flat_map(|id| outputs_by_step[id.as_str()].iter())
            .map(String::as_str)
            .collect();

        for fragment in &fragments {
            let placeholders = template::placeholders(&fragment.body).map_err(|e| {
                SkeinError::MalformedFragment {
                    name: fragment.name().to_string(),
                    reason: e.to_string(),
                }
            })?;

            for name in placeholders {
                let bound = workflow_inputs.contains(name.as_str())
                    || defaulted.contains(name.as_str())
                    || upstream.contains(name.as_str());
                if !bound {
                    return Err(SkeinError::UnboundVariable {
                        name,
                        step: Some(step.id.clone()),
                    });
                }
            }
        }
    }

    Ok(graph)
}

/// Check that every required workflow input without a default has a supplied
/// value. Run once at execution start against the initial variables.
pub fn check_required_inputs(
    workflow: &Workflow,
    vars: &HashMap<String, String>,
) -> Result<()> {
    for input in &workflow.inputs {
        if input.required && input.default.is_none() && !vars.contains_key(&input.name) {
            return Err(SkeinError::UnboundVariable {
                name: input.name.clone(),
                step: None,
            });
        }
    }
    Ok(())
}

/// Bind declared workflow input defaults for any variable not supplied.
pub fn apply_input_defaults(workflow: &Workflow, vars: &mut HashMap<String, String>) {
    for input in &workflow.inputs {
        if let Some(default) = &input.default
            && !vars.contains_key(&input.name)
        {
            vars.insert(input.name.clone(), default.clone());
        }
    }
}
