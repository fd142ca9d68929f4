//! Run event logging for skein.
//!
//! Engine progress is reported as append-only NDJSON (one JSON object per
//! line) so runs can be audited and diagnosed after the fact. Each event
//! carries:
//!
//! - `ts`: RFC3339 timestamp
//! - `action`: what happened (run_started, step_failed, ...)
//! - `actor`: the operator string (`user@HOST`)
//! - `workflow`: the workflow id
//! - `step`: optional step id for step-scoped events
//! - `details`: freeform object with action-specific details
//!
//! The engine pushes events through the [`EventSink`] trait; the CLI wires
//! up an [`NdjsonSink`] appending to a file. Event logging is best-effort:
//! a failing sink never aborts a run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

/// Actions recorded in the run log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventAction {
    /// A workflow run began.
    RunStarted,
    /// A step was dispatched to the agent invoker.
    StepStarted,
    /// A step's invocation returned successfully.
    StepSucceeded,
    /// A step's invocation failed.
    StepFailed,
    /// A failed step triggered an on_fail reset.
    StepRetried,
    /// A step's condition gated it off.
    StepSkipped,
    /// The run reached WorkflowSucceeded.
    RunSucceeded,
    /// The run reached WorkflowFailed.
    RunFailed,
}

impl std::fmt::Display for EventAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventAction::RunStarted => write!(f, "run_started"),
            EventAction::StepStarted => write!(f, "step_started"),
            EventAction::StepSucceeded => write!(f, "step_succeeded"),
            EventAction::StepFailed => write!(f, "step_failed"),
            EventAction::StepRetried => write!(f, "step_retried"),
            EventAction::StepSkipped => write!(f, "step_skipped"),
            EventAction::RunSucceeded => write!(f, "run_succeeded"),
            EventAction::RunFailed => write!(f, "run_failed"),
        }
    }
}

/// One run log record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunEvent {
    /// RFC3339 timestamp when the event occurred.
    pub ts: DateTime<Utc>,

    /// The action that occurred.
    pub action: EventAction,

    /// Who ran the workflow (e.g., `user@HOST`).
    pub actor: String,

    /// The workflow id.
    pub workflow: String,

    /// Step id for step-scoped events.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<String>,

    /// Freeform details object with action-specific information.
    pub details: Value,
}

impl RunEvent {
    /// Create a new event for a workflow with the current timestamp and
    /// environment-derived actor.
    pub fn new(action: EventAction, workflow: impl Into<String>) -> Self {
        Self {
            ts: Utc::now(),
            action,
            actor: actor_string(),
            workflow: workflow.into(),
            step: None,
            details: Value::Object(serde_json::Map::new()),
        }
    }

    /// Set the step id for this event.
    pub fn with_step(mut self, step: impl Into<String>) -> Self {
        self.step = Some(step.into());
        self
    }

    /// Set the details object for this event.
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }

    /// Serialize to a single NDJSON line (no trailing newline).
    pub fn to_ndjson_line(&self) -> Option<String> {
        serde_json::to_string(self).ok()
    }
}

/// Where the engine reports run events.
pub trait EventSink {
    /// Record one event. Implementations must not panic; failures are
    /// swallowed rather than aborting the run.
    fn emit(&self, event: &RunEvent);
}

/// Append-only NDJSON file sink.
#[derive(Debug)]
pub struct NdjsonSink {
    file: Mutex<std::fs::File>,
}

impl NdjsonSink {
    /// Open (creating parent directories and the file as needed) an
    /// append-mode sink at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

impl EventSink for NdjsonSink {
    fn emit(&self, event: &RunEvent) {
        let Some(line) = event.to_ndjson_line() else {
            return;
        };
        if let Ok(mut file) = self.file.lock() {
            let _ = writeln!(file, "{}", line);
        }
    }
}

/// Operator string for event metadata.
fn actor_string() -> String {
    let user = std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string());

    let host = hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    format!("{}@{}", user, host)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_event_serializes_to_single_line() {
        let event = RunEvent::new(EventAction::StepFailed, "feature")
            .with_step("qa")
            .with_details(json!({"attempt": 2, "error": "timed out"}));

        let line = event.to_ndjson_line().unwrap();
        assert!(!line.contains('\n'));

        let parsed: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(parsed["action"], "step_failed");
        assert_eq!(parsed["workflow"], "feature");
        assert_eq!(parsed["step"], "qa");
        assert_eq!(parsed["details"]["attempt"], 2);
        assert!(parsed["actor"].as_str().unwrap().contains('@'));
        assert!(parsed["ts"].is_string());
    }

    #[test]
    fn test_step_field_omitted_for_run_events() {
        let event = RunEvent::new(EventAction::RunStarted, "feature");
        let line = event.to_ndjson_line().unwrap();
        let parsed: Value = serde_json::from_str(&line).unwrap();
        assert!(parsed.get("step").is_none());
    }

    #[test]
    fn test_ndjson_sink_appends_lines() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("runs").join("events.ndjson");

        let sink = NdjsonSink::open(&path).unwrap();
        sink.emit(&RunEvent::new(EventAction::RunStarted, "feature"));
        sink.emit(
            &RunEvent::new(EventAction::StepStarted, "feature").with_step("implement"),
        );

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["action"], "run_started");
        let second: Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second["step"], "implement");
    }

    #[test]
    fn test_action_display_matches_serde() {
        for (action, expected) in [
            (EventAction::RunStarted, "run_started"),
            (EventAction::StepRetried, "step_retried"),
            (EventAction::RunFailed, "run_failed"),
        ] {
            assert_eq!(action.to_string(), expected);
            let json = serde_json::to_value(action).unwrap();
            assert_eq!(json, Value::String(expected.to_string()));
        }
    }
}
