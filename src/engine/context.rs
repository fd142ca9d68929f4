//! Execution context: the run-scoped accumulator of resolved template
//! variables and recorded step outputs.
//!
//! The scheduler loop is the single writer; worker threads only ever see
//! immutable snapshots taken at dispatch time. One completed step writes
//! exactly one output key (its own id), so writes never contend.

use crate::fragment::OutputSpec;
use serde_json::Value;
use std::collections::HashMap;

/// Run-scoped key/value store of template variables and step outputs.
///
/// Grows monotonically during a run (a retried step overwrites its own key)
/// and is discarded, or returned inside the run report, at run completion.
#[derive(Debug, Clone, Default)]
pub struct ExecutionContext {
    vars: HashMap<String, String>,
    outputs: HashMap<String, Value>,
}

impl ExecutionContext {
    /// Create a context seeded with the caller's initial variables.
    pub fn new(vars: HashMap<String, String>) -> Self {
        Self {
            vars,
            outputs: HashMap::new(),
        }
    }

    /// Current template variable bindings.
    pub fn vars(&self) -> &HashMap<String, String> {
        &self.vars
    }

    /// Look up one variable.
    pub fn var(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }

    /// Recorded step outputs, keyed by step id.
    pub fn outputs(&self) -> &HashMap<String, Value> {
        &self.outputs
    }

    /// Recorded output of one step.
    pub fn output(&self, step_id: &str) -> Option<&Value> {
        self.outputs.get(step_id)
    }

    /// Snapshot of the variable map for a dispatch.
    pub fn vars_snapshot(&self) -> HashMap<String, String> {
        self.vars.clone()
    }

    /// Record a completed step's output.
    ///
    /// The raw value is stored under the step id for condition evaluation.
    /// Declared outputs additionally become template variables: a field of a
    /// JSON-object result is bound under its declared name; a sole declared
    /// output with no matching field binds the whole result.
    pub fn record_output(&mut self, step_id: &str, value: Value, declared: &[OutputSpec]) {
        for spec in declared {
            match value.get(&spec.name) {
                Some(field) => {
                    self.vars.insert(spec.name.clone(), stringify(field));
                }
                None if declared.len() == 1 => {
                    self.vars.insert(spec.name.clone(), stringify(&value));
                }
                None => {}
            }
        }
        self.outputs.insert(step_id.to_string(), value);
    }
}

/// Template-variable rendering of a JSON value: strings verbatim, everything
/// else as compact JSON.
fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn spec(name: &str) -> OutputSpec {
        OutputSpec {
            name: name.to_string(),
            format: "text".to_string(),
        }
    }

    #[test]
    fn test_record_output_binds_object_fields() {
        let mut ctx = ExecutionContext::default();
        ctx.record_output(
            "qa",
            json!({"verdict": "pass", "blocking": 0}),
            &[spec("verdict")],
        );

        assert_eq!(ctx.var("verdict"), Some("pass"));
        assert_eq!(ctx.output("qa").unwrap()["blocking"], 0);
        // Undeclared fields do not become variables.
        assert_eq!(ctx.var("blocking"), None);
    }

    #[test]
    fn test_sole_output_binds_whole_value() {
        let mut ctx = ExecutionContext::default();
        ctx.record_output("summarize", json!("a short summary"), &[spec("summary")]);
        assert_eq!(ctx.var("summary"), Some("a short summary"));
    }

    #[test]
    fn test_non_string_values_render_as_json() {
        let mut ctx = ExecutionContext::default();
        ctx.record_output("count", json!({"total": 42}), &[spec("total")]);
        assert_eq!(ctx.var("total"), Some("42"));
    }

    #[test]
    fn test_no_declared_outputs_still_records_raw() {
        let mut ctx = ExecutionContext::default();
        ctx.record_output("probe", json!("hello"), &[]);
        assert_eq!(ctx.output("probe"), Some(&json!("hello")));
        assert!(ctx.vars().is_empty());
    }

    #[test]
    fn test_retry_overwrites_same_key() {
        let mut ctx = ExecutionContext::default();
        ctx.record_output("qa", json!({"verdict": "fail"}), &[spec("verdict")]);
        ctx.record_output("qa", json!({"verdict": "pass"}), &[spec("verdict")]);
        assert_eq!(ctx.var("verdict"), Some("pass"));
        assert_eq!(ctx.output("qa").unwrap()["verdict"], "pass");
    }

    #[test]
    fn test_initial_vars_preserved() {
        let ctx = ExecutionContext::new(HashMap::from([(
            "mission".to_string(),
            "ship v1".to_string(),
        )]));
        assert_eq!(ctx.var("mission"), Some("ship v1"));
    }
}
