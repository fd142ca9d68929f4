//! Workflow definition model for skein.
//!
//! Workflows are TOML files: top-level metadata plus a table-of-tables of
//! steps. Parsing produces strongly typed structs; everything structural
//! (reference integrity, acyclicity, placeholder coverage) is validated
//! eagerly at load time before any step can execute.
//!
//! # Workflow File Format
//!
//! ```text
//! id = "feature"
//! role = "role-dev"
//! stacks = ["stack-rust"]
//! include = ["pm-conventions"]
//!
//! [[inputs]]
//! name = "mission"
//!
//! [[steps]]
//! id = "implement"
//! prompt = "phase-implement"
//!
//! [[steps]]
//! id = "qa"
//! prompt = "phase-qa"
//! depends_on = ["implement"]
//! condition = 'implement.status == "ok"'
//! on_fail = "implement"
//! max_retries = 3
//! ```

use crate::error::{Result, SkeinError};
use crate::fragment::InputSpec;
use regex::Regex;
use serde::Deserialize;
use std::path::Path;
use std::sync::LazyLock;

pub mod condition;
mod graph;
mod validate;

pub use graph::StepGraph;
pub use validate::{apply_input_defaults, check_required_inputs, validate_workflow};

/// Regex pattern for valid workflow and step ids.
static ID_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9][a-z0-9_-]*$").expect("Invalid id regex"));

/// One node in a workflow's DAG: a single agent invocation.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Step {
    /// Step id, unique within the workflow.
    pub id: String,

    /// Name of the phase fragment providing the core prompt body.
    pub prompt: String,

    /// Role fragment override for this step. Replaces the workflow role.
    #[serde(default)]
    pub role: Option<String>,

    /// Stack fragment override. When present, fully replaces the
    /// workflow-level list; lists never merge.
    #[serde(default)]
    pub stacks: Option<Vec<String>>,

    /// Include-list override. Same full-replacement policy as `stacks`.
    #[serde(default)]
    pub include: Option<Vec<String>>,

    /// Step ids that must succeed before this step may run.
    #[serde(default)]
    pub depends_on: Vec<String>,

    /// Gate expression over a prior step's recorded output. When it
    /// evaluates false the step is skipped, not failed.
    #[serde(default)]
    pub condition: Option<String>,

    /// Step to reset and re-run when this step fails.
    #[serde(default)]
    pub on_fail: Option<String>,

    /// Upper bound on `on_fail` retries for this step.
    #[serde(default)]
    pub max_retries: u32,
}

/// A workflow definition: declared inputs, default composition lists, and
/// the step DAG.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Workflow {
    /// Workflow identifier.
    pub id: String,

    /// Template variables callers must (or may, given defaults) supply.
    #[serde(default)]
    pub inputs: Vec<InputSpec>,

    /// Default role fragment composed first into every step's prompt.
    #[serde(default)]
    pub role: Option<String>,

    /// Default stack fragments, composed after the phase prompt.
    #[serde(default)]
    pub stacks: Vec<String>,

    /// Default include-list fragments, composed last.
    #[serde(default)]
    pub include: Vec<String>,

    /// The step DAG, in declaration order.
    #[serde(default)]
    pub steps: Vec<Step>,
}

impl Workflow {
    /// Load a workflow from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            SkeinError::UserError(format!(
                "failed to read workflow file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml(&content)
    }

    /// Parse a workflow from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self> {
        let workflow: Workflow = toml::from_str(content)
            .map_err(|e| SkeinError::UserError(format!("failed to parse workflow TOML: {}", e)))?;
        workflow.check_ids()?;
        Ok(workflow)
    }

    /// Find a step by id.
    pub fn step(&self, id: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.id == id)
    }

    /// Find a declared input by name.
    pub fn input(&self, name: &str) -> Option<&InputSpec> {
        self.inputs.iter().find(|i| i.name == name)
    }

    /// Validate id shapes and uniqueness. Structural graph checks live in
    /// [`StepGraph::build`].
    fn check_ids(&self) -> Result<()> {
        if !ID_REGEX.is_match(&self.id) {
            return Err(SkeinError::UserError(format!(
                "invalid workflow id '{}': must be lowercase alphanumeric with '-' or '_'",
                self.id
            )));
        }

        let mut seen = Vec::new();
        for step in &self.steps {
            if !ID_REGEX.is_match(&step.id) {
                return Err(SkeinError::UserError(format!(
                    "workflow '{}': invalid step id '{}': must be lowercase alphanumeric with '-' or '_'",
                    self.id, step.id
                )));
            }
            if seen.contains(&&step.id) {
                return Err(SkeinError::UserError(format!(
                    "workflow '{}': duplicate step id '{}'",
                    self.id, step.id
                )));
            }
            seen.push(&step.id);
        }

        let mut seen_inputs = Vec::new();
        for input in &self.inputs {
            if input.name.is_empty() {
                return Err(SkeinError::UserError(format!(
                    "workflow '{}': input with empty name",
                    self.id
                )));
            }
            if seen_inputs.contains(&&input.name) {
                return Err(SkeinError::UserError(format!(
                    "workflow '{}': duplicate input '{}'",
                    self.id, input.name
                )));
            }
            seen_inputs.push(&input.name);
        }

        Ok(())
    }
}
