//! Error types for skein.
//!
//! Uses thiserror for derive macros and provides user-actionable error messages.
//! Load-time validation errors (`NotFound`, `MalformedFragment`,
//! `CompositionError`, `UnboundVariable`, `CyclicDependency`,
//! `DanglingReference`) are raised eagerly before any step executes.

use crate::exit_codes;
use thiserror::Error;

/// Main error type for skein operations.
///
/// Each variant maps to a specific exit code so the CLI can report failures
/// the same way regardless of which layer raised them.
#[derive(Error, Debug)]
pub enum SkeinError {
    /// User provided invalid arguments, or a config/IO problem occurred.
    #[error("{0}")]
    UserError(String),

    /// A referenced fragment is not present in the fragment store.
    #[error("fragment '{0}' not found in the fragment store")]
    NotFound(String),

    /// Fragment frontmatter failed to parse or declared an invalid field.
    #[error("malformed fragment '{name}': {reason}")]
    MalformedFragment {
        /// Name (or source path) of the offending fragment.
        name: String,
        /// What was wrong, naming the offending field where known.
        reason: String,
    },

    /// A step's fragment references could not be assembled into a prompt.
    #[error("cannot compose prompt for step '{step}': {reason}")]
    CompositionError {
        /// The step whose prompt was being composed.
        step: String,
        /// Why composition failed.
        reason: String,
    },

    /// A template placeholder has no supplied value and no declared default.
    #[error("unbound template variable '{name}'{}", in_step_suffix(.step))]
    UnboundVariable {
        /// The placeholder name.
        name: String,
        /// The step whose composed prompt references it, when known.
        step: Option<String>,
    },

    /// The depends_on graph contains a cycle.
    #[error("workflow '{workflow}' has a dependency cycle through step '{step}'")]
    CyclicDependency {
        /// The workflow being validated.
        workflow: String,
        /// A step participating in the cycle.
        step: String,
    },

    /// A depends_on or on_fail reference points at an unknown step.
    #[error("step '{step}' references unknown step '{target}' in {field}")]
    DanglingReference {
        /// The step holding the bad reference.
        step: String,
        /// The referenced id that does not exist.
        target: String,
        /// Which field held the reference (`depends_on`, `on_fail`, `condition`).
        field: &'static str,
    },

    /// An external agent invocation failed or timed out.
    #[error("agent invocation for step '{step}' failed: {reason}")]
    StepInvocation {
        /// The step whose invocation failed.
        step: String,
        /// Failure detail from the invoker.
        reason: String,
    },

    /// The workflow reached its failure terminal state (retries exhausted).
    #[error("workflow failed at step '{step}': {reason}")]
    WorkflowFailed {
        /// The step that exhausted its retries (or had none configured).
        step: String,
        /// The last error observed for that step.
        reason: String,
    },
}

fn in_step_suffix(step: &Option<String>) -> String {
    match step {
        Some(id) => format!(" in step '{}'", id),
        None => String::new(),
    }
}

impl SkeinError {
    /// Returns the appropriate exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            SkeinError::UserError(_) => exit_codes::USER_ERROR,
            SkeinError::NotFound(_)
            | SkeinError::MalformedFragment { .. }
            | SkeinError::CompositionError { .. }
            | SkeinError::UnboundVariable { .. }
            | SkeinError::CyclicDependency { .. }
            | SkeinError::DanglingReference { .. } => exit_codes::VALIDATION_FAILURE,
            SkeinError::WorkflowFailed { .. } => exit_codes::WORKFLOW_FAILURE,
            SkeinError::StepInvocation { .. } => exit_codes::AGENT_FAILURE,
        }
    }
}

/// Result type alias for skein operations.
pub type Result<T> = std::result::Result<T, SkeinError>;
