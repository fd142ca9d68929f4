//! Step graph construction and structural validation.
//!
//! The depends_on relation is turned into an explicit adjacency list exactly
//! once, at load time. All reference-integrity and acyclicity checks happen
//! here; the engine only ever schedules over an already-validated graph.

use super::condition::Condition;
use super::Workflow;
use crate::error::{Result, SkeinError};
use std::collections::{HashMap, HashSet, VecDeque};

/// Validated adjacency-list view of a workflow's steps.
#[derive(Debug)]
pub struct StepGraph {
    /// Step ids in a deterministic topological order.
    order: Vec<String>,
    /// Step id -> ids it depends on.
    deps: HashMap<String, Vec<String>>,
    /// Step id -> ids that depend on it.
    dependents: HashMap<String, Vec<String>>,
    /// Parsed condition per gated step.
    conditions: HashMap<String, Condition>,
}

impl StepGraph {
    /// Build and validate the graph for a workflow.
    ///
    /// Checks, in order: `depends_on` and `on_fail` reference integrity,
    /// acyclicity of the `depends_on` relation, condition syntax, and that
    /// each condition only references steps inside the gated step's
    /// dependency closure.
    pub fn build(workflow: &Workflow) -> Result<Self> {
        let ids: HashSet<&str> = workflow.steps.iter().map(|s| s.id.as_str()).collect();

        let mut deps: HashMap<String, Vec<String>> = HashMap::new();
        let mut dependents: HashMap<String, Vec<String>> = HashMap::new();

        for step in &workflow.steps {
            deps.entry(step.id.clone()).or_default();
            dependents.entry(step.id.clone()).or_default();

            for dep in &step.depends_on {
                if !ids.contains(dep.as_str()) {
                    return Err(SkeinError::DanglingReference {
                        step: step.id.clone(),
                        target: dep.clone(),
                        field: "depends_on",
                    });
                }
                deps.get_mut(&step.id)
                    .expect("entry inserted above")
                    .push(dep.clone());
                dependents.entry(dep.clone()).or_default().push(step.id.clone());
            }

            if let Some(target) = &step.on_fail
                && !ids.contains(target.as_str())
            {
                return Err(SkeinError::DanglingReference {
                    step: step.id.clone(),
                    target: target.clone(),
                    field: "on_fail",
                });
            }
        }

        let order = topological_order(workflow, &deps)?;

        let mut conditions = HashMap::new();
        for step in &workflow.steps {
            let Some(expr) = &step.condition else {
                continue;
            };
            let condition = Condition::parse(expr, &step.id)?;

            if !ids.contains(condition.step.as_str()) {
                return Err(SkeinError::DanglingReference {
                    step: step.id.clone(),
                    target: condition.step.clone(),
                    field: "condition",
                });
            }

            conditions.insert(step.id.clone(), condition);
        }

        let graph = Self {
            order,
            deps,
            dependents,
            conditions,
        };

        // Conditions may only read outputs the dependency closure guarantees
        // to exist by the time the gate is evaluated.
        for step in &workflow.steps {
            if let Some(condition) = graph.conditions.get(&step.id) {
                let closure = graph.dependency_closure(&step.id);
                if !closure.contains(&condition.step) {
                    return Err(SkeinError::UserError(format!(
                        "step '{}': condition '{}' references step '{}' outside its dependency closure",
                        step.id, condition.raw, condition.step
                    )));
                }
            }
        }

        Ok(graph)
    }

    /// Step ids in topological order.
    pub fn topo_order(&self) -> &[String] {
        &self.order
    }

    /// Direct dependencies of a step.
    pub fn deps(&self, id: &str) -> &[String] {
        self.deps.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Steps that directly depend on `id`.
    pub fn dependents(&self, id: &str) -> &[String] {
        self.dependents.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Parsed condition for a step, if it has one.
    pub fn condition(&self, id: &str) -> Option<&Condition> {
        self.conditions.get(id)
    }

    /// Transitive dependencies of a step (not including the step itself).
    pub fn dependency_closure(&self, id: &str) -> HashSet<String> {
        self.walk(id, &self.deps)
    }

    /// Transitive dependents of a step (not including the step itself).
    pub fn descendants(&self, id: &str) -> HashSet<String> {
        self.walk(id, &self.dependents)
    }

    fn walk(&self, id: &str, edges: &HashMap<String, Vec<String>>) -> HashSet<String> {
        let mut seen = HashSet::new();
        let mut queue: VecDeque<&str> = VecDeque::new();
        queue.push_back(id);

        while let Some(current) = queue.pop_front() {
            for next in edges.get(current).map(Vec::as_slice).unwrap_or(&[]) {
                if seen.insert(next.clone()) {
                    queue.push_back(next.as_str());
                }
            }
        }

        seen
    }
}

/// Kahn's algorithm over the depends_on relation.
///
/// Declaration order breaks ties so the result is deterministic.
fn topological_order(
    workflow: &Workflow,
    deps: &HashMap<String, Vec<String>>,
) -> Result<Vec<String>> {
    let mut order = Vec::with_capacity(workflow.steps.len());
    let mut satisfied: HashSet<&str> = HashSet::new();

    loop {
        let mut progressed = false;
        for step in &workflow.steps {
            let id = step.id.as_str();
            if satisfied.contains(id) {
                continue;
            }
            let remaining = deps[id]
                .iter()
                .filter(|d| !satisfied.contains(d.as_str()))
                .count();
            if remaining == 0 {
                satisfied.insert(id);
                order.push(id.to_string());
                progressed = true;
            }
        }
        if !progressed {
            break;
        }
    }

    if order.len() != workflow.steps.len() {
        let stuck = workflow
            .steps
            .iter()
            .find(|s| !satisfied.contains(s.id.as_str()))
            .map(|s| s.id.clone())
            .unwrap_or_default();
        return Err(SkeinError::CyclicDependency {
            workflow: workflow.id.clone(),
            step: stuck,
        });
    }

    Ok(order)
}
