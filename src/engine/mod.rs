//! Workflow engine for skein.
//!
//! Executes a validated workflow DAG: each step's prompt is composed and
//! resolved at dispatch time, handed to the [`AgentInvoker`] on a worker
//! thread, and its result recorded in the [`ExecutionContext`]. Steps with
//! no mutual dependency run concurrently; the engine imposes no ordering
//! beyond the declared `depends_on` graph.
//!
//! Per-step state machine:
//!
//! ```text
//! Pending -> Ready -> Running -> Succeeded
//!                             -> Failed -> Pending        (on_fail, retries left)
//!                                       -> PermanentlyFailed (retries exhausted)
//! Pending -> Skipped                                       (condition false)
//! ```
//!
//! The run terminates in `WorkflowSucceeded` only when every step is
//! `Succeeded` or `Skipped`; any `PermanentlyFailed` step halts scheduling,
//! cancels in-flight invocations cooperatively, and terminates the run in
//! `WorkflowFailed` carrying the originating step id and error.
//!
//! [`AgentInvoker`]: crate::invoker::AgentInvoker

use crate::events::EventSink;
use std::collections::BTreeMap;

mod context;
mod scheduler;

pub use context::ExecutionContext;
pub use scheduler::run_workflow;

/// State of one step during and after a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    /// Not yet dispatched; waiting on dependencies or a retry reset.
    Pending,
    /// Dependencies satisfied and condition true; waiting for capacity.
    Ready,
    /// Handed to the agent invoker; result outstanding.
    Running,
    /// Invocation returned successfully; output recorded.
    Succeeded,
    /// Last invocation failed (including cancellation mid-run).
    Failed,
    /// Condition evaluated false; counts as satisfied for dependents.
    Skipped,
    /// Failed with retries exhausted (or none configured).
    PermanentlyFailed,
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepStatus::Pending => write!(f, "pending"),
            StepStatus::Ready => write!(f, "ready"),
            StepStatus::Running => write!(f, "running"),
            StepStatus::Succeeded => write!(f, "succeeded"),
            StepStatus::Failed => write!(f, "failed"),
            StepStatus::Skipped => write!(f, "skipped"),
            StepStatus::PermanentlyFailed => write!(f, "permanently_failed"),
        }
    }
}

/// Terminal state of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Terminal {
    /// Every step succeeded or was skipped.
    WorkflowSucceeded,
    /// A step exhausted its retries; scheduling halted.
    WorkflowFailed {
        /// The step that caused the failure.
        step: String,
        /// The last error observed for that step.
        reason: String,
    },
}

/// Per-step summary in the run report.
#[derive(Debug, Clone)]
pub struct StepReport {
    /// Final status.
    pub status: StepStatus,
    /// How many times the step was invoked.
    pub attempts: u32,
    /// How many on_fail retries the step consumed.
    pub retries: u32,
}

/// Everything a caller learns from a run: final context, per-step status,
/// and the terminal state. Failures are always attributed to an exact step;
/// there is no silent partial success.
#[derive(Debug)]
pub struct RunReport {
    /// The workflow that ran.
    pub workflow_id: String,
    /// Terminal state.
    pub terminal: Terminal,
    /// Per-step outcome, keyed by step id.
    pub steps: BTreeMap<String, StepReport>,
    /// The final execution context.
    pub context: ExecutionContext,
}

impl RunReport {
    /// Whether the run reached `WorkflowSucceeded`.
    pub fn succeeded(&self) -> bool {
        self.terminal == Terminal::WorkflowSucceeded
    }

    /// The failing step and reason, when the run failed.
    pub fn failure(&self) -> Option<(&str, &str)> {
        match &self.terminal {
            Terminal::WorkflowSucceeded => None,
            Terminal::WorkflowFailed { step, reason } => Some((step, reason)),
        }
    }
}

/// Knobs for one run.
pub struct RunOptions<'a> {
    /// Maximum concurrently running steps; 0 means unbounded.
    pub max_parallel: usize,
    /// Where run events go, if anywhere.
    pub sink: Option<&'a dyn EventSink>,
}

impl Default for RunOptions<'_> {
    fn default() -> Self {
        Self {
            max_parallel: 0,
            sink: None,
        }
    }
}
