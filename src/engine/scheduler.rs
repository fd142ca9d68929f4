//! The scheduler loop: dispatch, collect, retry.
//!
//! One loop owns all mutable run state (statuses, counters, the execution
//! context). Worker threads only carry an owned [`InvokeRequest`] out and an
//! outcome back over a channel, so no step ever observes another's output
//! before the producer has been recorded as succeeded.

use super::{ExecutionContext, RunOptions, RunReport, StepReport, StepStatus, Terminal};
use crate::compose::{compose_step, step_fragments};
use crate::error::{Result, SkeinError};
use crate::events::{EventAction, RunEvent};
use crate::fragment::{FragmentStore, OutputSpec};
use crate::invoker::{AgentInvoker, AgentOutput, CancelToken, InvokeError, InvokeRequest};
use crate::template::{self, TemplateError};
use crate::workflow::{
    StepGraph, Workflow, apply_input_defaults, check_required_inputs, validate_workflow,
};
use serde_json::{Value, json};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::mpsc;
use std::time::Instant;

/// Execute a workflow to a terminal state.
///
/// Runs every load-time validation first; nothing is dispatched for a
/// workflow that fails any check. A run that starts always returns a
/// [`RunReport`] (the `WorkflowFailed` terminal state is data, not an
/// error), so callers can inspect per-step statuses either way.
pub fn run_workflow(
    workflow: &Workflow,
    store: &FragmentStore,
    initial_vars: HashMap<String, String>,
    invoker: &dyn AgentInvoker,
    options: &RunOptions<'_>,
) -> Result<RunReport> {
    let graph = validate_workflow(workflow, store)?;
    check_required_inputs(workflow, &initial_vars)?;

    let mut vars = initial_vars;
    apply_input_defaults(workflow, &mut vars);

    let mut run = Run {
        workflow,
        store,
        graph: &graph,
        options,
        context: ExecutionContext::new(vars),
        status: workflow
            .steps
            .iter()
            .map(|s| (s.id.clone(), StepStatus::Pending))
            .collect(),
        attempts: HashMap::new(),
        retries: HashMap::new(),
        cancel: CancelToken::new(),
        failure: None,
    };

    run.emit(EventAction::RunStarted, None, json!({}));
    run.execute(invoker)?;

    Ok(run.into_report())
}

/// Result of one worker-thread invocation.
struct Outcome {
    step_id: String,
    attempt: u32,
    result: std::result::Result<AgentOutput, InvokeError>,
    duration_ms: u128,
}

/// All mutable state for one run. The scheduler loop is its only writer.
struct Run<'a> {
    workflow: &'a Workflow,
    store: &'a FragmentStore,
    graph: &'a StepGraph,
    options: &'a RunOptions<'a>,
    context: ExecutionContext,
    status: HashMap<String, StepStatus>,
    attempts: HashMap<String, u32>,
    retries: HashMap<String, u32>,
    cancel: CancelToken,
    failure: Option<(String, String)>,
}

impl Run<'_> {
    fn execute(&mut self, invoker: &dyn AgentInvoker) -> Result<()> {
        let (tx, rx) = mpsc::channel::<Outcome>();

        std::thread::scope(|scope| -> Result<()> {
            let mut running = 0usize;
            // A hard scheduler error stops dispatching but still drains
            // in-flight workers, so the scope join cannot hang on them.
            let mut hard_error: Option<SkeinError> = None;

            loop {
                if self.failure.is_none() && hard_error.is_none() {
                    match self.take_ready(running) {
                        Ok(requests) => {
                            for request in requests {
                                let tx = tx.clone();
                                scope.spawn(move || {
                                    let started = Instant::now();
                                    let step_id = request.step_id.clone();
                                    let attempt = request.attempt;
                                    let result = invoker.invoke(&request);
                                    // The receiver is gone only when the
                                    // scheduler bailed out; the outcome is
                                    // moot then.
                                    let _ = tx.send(Outcome {
                                        step_id,
                                        attempt,
                                        result,
                                        duration_ms: started.elapsed().as_millis(),
                                    });
                                });
                                running += 1;
                            }
                        }
                        Err(e) => {
                            self.cancel.trigger();
                            hard_error = Some(e);
                        }
                    }
                }

                if running == 0 {
                    break;
                }

                let Ok(outcome) = rx.recv() else {
                    break;
                };
                running -= 1;
                if let Err(e) = self.handle_outcome(outcome) {
                    self.cancel.trigger();
                    hard_error.get_or_insert(e);
                }
            }

            match hard_error {
                Some(e) => Err(e),
                None => Ok(()),
            }
        })
    }

    /// Promote pending steps: skip those whose condition gates false, and
    /// return dispatch requests for those that are ready, up to capacity.
    ///
    /// Loops until a fixed point so a skip can unlock its dependents within
    /// the same pass.
    fn take_ready(&mut self, running: usize) -> Result<Vec<InvokeRequest>> {
        let mut dispatches = Vec::new();

        loop {
            let mut progressed = false;

            for id in self.graph.topo_order() {
                match self.status.get(id).copied() {
                    Some(StepStatus::Pending) => {
                        let deps_done = self.graph.deps(id).iter().all(|dep| {
                            matches!(
                                self.status.get(dep).copied(),
                                Some(StepStatus::Succeeded) | Some(StepStatus::Skipped)
                            )
                        });
                        if !deps_done {
                            continue;
                        }

                        if let Some(condition) = self.graph.condition(id)
                            && !condition.evaluate(self.context.outputs())
                        {
                            self.status.insert(id.clone(), StepStatus::Skipped);
                            self.emit(
                                EventAction::StepSkipped,
                                Some(id),
                                json!({"condition": &condition.raw}),
                            );
                            progressed = true;
                            continue;
                        }

                        self.status.insert(id.clone(), StepStatus::Ready);
                        progressed = true;
                    }
                    Some(StepStatus::Ready) => {}
                    _ => continue,
                }

                if self.at_capacity(running + dispatches.len()) {
                    continue;
                }

                dispatches.push(self.prepare_dispatch(id)?);
                progressed = true;
            }

            if !progressed {
                break;
            }
        }

        Ok(dispatches)
    }

    fn at_capacity(&self, in_flight: usize) -> bool {
        self.options.max_parallel > 0 && in_flight >= self.options.max_parallel
    }

    /// Compose and resolve a step's prompt against the current context, mark
    /// it running, and build the invocation request.
    fn prepare_dispatch(&mut self, id: &str) -> Result<InvokeRequest> {
        let step = self
            .workflow
            .step(id)
            .ok_or_else(|| SkeinError::UserError(format!("internal: unknown step '{}'", id)))?;

        let composed = compose_step(self.workflow, step, self.store)?;

        // Fragment-declared defaults fill gaps for this dispatch only; they
        // never persist into the context.
        let mut vars = self.context.vars_snapshot();
        for fragment in step_fragments(self.workflow, step, self.store)? {
            for input in &fragment.meta.inputs {
                if let Some(default) = &input.default
                    && !vars.contains_key(&input.name)
                {
                    vars.insert(input.name.clone(), default.clone());
                }
            }
        }

        let prompt = template::render(&composed.text, &vars).map_err(|e| match e {
            TemplateError::UndefinedVariable { name, .. } => SkeinError::UnboundVariable {
                name,
                step: Some(id.to_string()),
            },
            other => SkeinError::UserError(format!("template error in step '{}': {}", id, other)),
        })?;

        let attempt = {
            let counter = self.attempts.entry(id.to_string()).or_insert(0);
            *counter += 1;
            *counter
        };

        self.status.insert(id.to_string(), StepStatus::Running);
        self.emit(
            EventAction::StepStarted,
            Some(id),
            json!({"attempt": attempt, "fragments": composed.fragments}),
        );

        Ok(InvokeRequest {
            workflow_id: self.workflow.id.clone(),
            step_id: id.to_string(),
            attempt,
            prompt,
            cancel: self.cancel.clone(),
        })
    }

    fn handle_outcome(&mut self, outcome: Outcome) -> Result<()> {
        let id = outcome.step_id;

        match outcome.result {
            Ok(output) => {
                let step = self.workflow.step(&id).ok_or_else(|| {
                    SkeinError::UserError(format!("internal: unknown step '{}'", id))
                })?;
                let declared: Vec<OutputSpec> = step_fragments(self.workflow, step, self.store)?
                    .iter()
                    .flat_map(|f| f.meta.outputs.iter().cloned())
                    .collect();

                let value: Value = output.into_value();
                self.context.record_output(&id, value, &declared);
                self.status.insert(id.clone(), StepStatus::Succeeded);
                self.emit(
                    EventAction::StepSucceeded,
                    Some(&id),
                    json!({"attempt": outcome.attempt, "duration_ms": outcome.duration_ms}),
                );
            }
            Err(err) => {
                self.emit(
                    EventAction::StepFailed,
                    Some(&id),
                    json!({"attempt": outcome.attempt, "error": err.to_string()}),
                );

                if self.failure.is_some() {
                    // Workflow already failing; this was an in-flight step
                    // that got cancelled or lost the race.
                    self.status.insert(id, StepStatus::Failed);
                    return Ok(());
                }

                let step = self.workflow.step(&id).ok_or_else(|| {
                    SkeinError::UserError(format!("internal: unknown step '{}'", id))
                })?;
                let used = self.retries.get(&id).copied().unwrap_or(0);

                if let Some(target) = &step.on_fail
                    && used < step.max_retries
                {
                    self.retries.insert(id.clone(), used + 1);
                    self.reset_for_retry(&id, target);
                    self.emit(
                        EventAction::StepRetried,
                        Some(&id),
                        json!({
                            "target": target,
                            "retry": used + 1,
                            "max_retries": step.max_retries,
                        }),
                    );
                } else {
                    self.status.insert(id.clone(), StepStatus::PermanentlyFailed);
                    self.failure = Some((id, err.to_string()));
                    self.cancel.trigger();
                }
            }
        }

        Ok(())
    }

    /// Reset the failed step, the on_fail target, and every completed step
    /// between them (descendants of the target that are ancestors of the
    /// failed step) back to Pending.
    fn reset_for_retry(&mut self, failed: &str, target: &str) {
        let mut resets: HashSet<String> = HashSet::new();
        resets.insert(failed.to_string());
        resets.insert(target.to_string());

        let mut ancestors = self.graph.dependency_closure(failed);
        ancestors.insert(failed.to_string());
        for id in self.graph.descendants(target) {
            if ancestors.contains(&id) {
                resets.insert(id);
            }
        }

        for id in resets {
            let resettable = id == failed
                || matches!(
                    self.status.get(&id).copied(),
                    Some(StepStatus::Succeeded)
                        | Some(StepStatus::Skipped)
                        | Some(StepStatus::Ready)
                        | Some(StepStatus::Failed)
                );
            if resettable {
                self.status.insert(id, StepStatus::Pending);
            }
        }
    }

    fn emit(&self, action: EventAction, step: Option<&str>, details: Value) {
        let Some(sink) = self.options.sink else {
            return;
        };
        let mut event =
            RunEvent::new(action, self.workflow.id.as_str()).with_details(details);
        if let Some(step) = step {
            event = event.with_step(step);
        }
        sink.emit(&event);
    }

    fn into_report(self) -> RunReport {
        let terminal = match &self.failure {
            Some((step, reason)) => Terminal::WorkflowFailed {
                step: step.clone(),
                reason: reason.clone(),
            },
            None => {
                let unfinished = self.workflow.steps.iter().find(|s| {
                    !matches!(
                        self.status.get(&s.id).copied(),
                        Some(StepStatus::Succeeded) | Some(StepStatus::Skipped)
                    )
                });
                match unfinished {
                    None => Terminal::WorkflowSucceeded,
                    Some(step) => Terminal::WorkflowFailed {
                        step: step.id.clone(),
                        reason: "step never became ready".to_string(),
                    },
                }
            }
        };

        match &terminal {
            Terminal::WorkflowSucceeded => {
                self.emit(EventAction::RunSucceeded, None, json!({}));
            }
            Terminal::WorkflowFailed { step, reason } => {
                self.emit(
                    EventAction::RunFailed,
                    Some(step),
                    json!({"error": reason}),
                );
            }
        }

        let steps: BTreeMap<String, StepReport> = self
            .workflow
            .steps
            .iter()
            .map(|s| {
                (
                    s.id.clone(),
                    StepReport {
                        status: self
                            .status
                            .get(&s.id)
                            .copied()
                            .unwrap_or(StepStatus::Pending),
                        attempts: self.attempts.get(&s.id).copied().unwrap_or(0),
                        retries: self.retries.get(&s.id).copied().unwrap_or(0),
                    },
                )
            })
            .collect();

        RunReport {
            workflow_id: self.workflow.id.clone(),
            terminal,
            steps,
            context: self.context,
        }
    }
}
