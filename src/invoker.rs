//! Agent invocation boundary.
//!
//! The engine never talks to a network or spawns processes itself; it hands
//! a composed, resolved prompt to an [`AgentInvoker`] and records whatever
//! comes back. The bundled [`CommandInvoker`] runs a configured command per
//! step, piping the prompt to stdin and capturing stdout as the result.
//! With a [`ContainerSpec`] attached, that command runs inside a disposable
//! `docker run` container instead of directly on the host. Embedders supply
//! their own implementation to integrate a different agent transport.

use crate::template;
use serde_json::Value;
use std::collections::HashMap;
use std::io::{Read, Write};
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Cooperative cancellation handle shared between the engine and running
/// invocations.
///
/// The engine triggers it when the workflow fails; invokers are expected to
/// poll it and stop work promptly. Cloning shares the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// Create an untriggered token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal cancellation to every clone of this token.
    pub fn trigger(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation has been signaled.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// One agent invocation: everything the invoker needs to run a step.
#[derive(Debug, Clone)]
pub struct InvokeRequest {
    /// The workflow being executed.
    pub workflow_id: String,
    /// The step being executed.
    pub step_id: String,
    /// 1-based attempt number (first run is 1, retries increment).
    pub attempt: u32,
    /// The composed, fully resolved prompt text.
    pub prompt: String,
    /// Cancellation token the invoker must honor.
    pub cancel: CancelToken,
}

/// Result of a successful agent invocation.
#[derive(Debug, Clone)]
pub struct AgentOutput {
    /// Raw text the agent returned.
    pub text: String,
    /// Structured form, when the text parsed as JSON.
    pub data: Option<Value>,
}

impl AgentOutput {
    /// Build an output from raw agent text, parsing it as JSON when possible.
    pub fn from_text(text: impl Into<String>) -> Self {
        let text = text.into();
        let data = serde_json::from_str::<Value>(text.trim()).ok();
        Self { text, data }
    }

    /// The value recorded in the execution context: structured data when the
    /// agent produced JSON, otherwise the raw text as a JSON string.
    pub fn into_value(self) -> Value {
        match self.data {
            Some(data) => data,
            None => Value::String(self.text),
        }
    }
}

/// Error from one agent invocation. All variants are retryable through the
/// workflow's `on_fail` machinery.
#[derive(Error, Debug, Clone)]
pub enum InvokeError {
    /// The agent ran but reported failure.
    #[error("{0}")]
    Failed(String),

    /// The invocation exceeded its wall-clock budget and was killed.
    #[error("timed out after {0} seconds")]
    TimedOut(u64),

    /// The invocation was cancelled by the engine.
    #[error("cancelled")]
    Cancelled,
}

/// The collaborator contract: hand a prompt to an external agent, get a
/// result back. Implementations must be callable from multiple scheduler
/// worker threads at once.
pub trait AgentInvoker: Send + Sync {
    /// Execute one step invocation. Blocking; the engine runs each call on
    /// its own worker thread.
    fn invoke(&self, request: &InvokeRequest) -> Result<AgentOutput, InvokeError>;
}

/// Container settings for sandboxed agent invocation.
///
/// When attached to a [`CommandInvoker`], each step's command runs inside a
/// fresh `docker run --rm -i` container of the given image. The container
/// lives for exactly one invocation; killing the `docker run` client on
/// timeout or cancellation tears it down with it.
#[derive(Debug, Clone)]
pub struct ContainerSpec {
    /// Image to run the agent command in.
    pub image: String,
    /// Bind mounts, each `HOST:CONTAINER`.
    pub volumes: Vec<String>,
    /// Environment variables, each `NAME=VALUE`.
    pub env: Vec<String>,
}

/// Subprocess-backed invoker used by the CLI.
///
/// The command template may reference `{{workflow}}`, `{{step}}`, and
/// `{{attempt}}`. The prompt is written to the child's stdin; stdout is the
/// agent's result. Non-zero exit, timeout, and cancellation all surface as
/// [`InvokeError`]s.
pub struct CommandInvoker {
    command: String,
    timeout: Duration,
    container: Option<ContainerSpec>,
}

/// Poll interval for child process exit and cancellation checks.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

impl CommandInvoker {
    /// Create an invoker from a command template and per-step timeout.
    pub fn new(command: impl Into<String>, timeout: Duration) -> Self {
        Self {
            command: command.into(),
            timeout,
            container: None,
        }
    }

    /// Run the agent command inside a disposable container per invocation.
    pub fn with_container(mut self, container: ContainerSpec) -> Self {
        self.container = Some(container);
        self
    }

    fn build_command(&self, request: &InvokeRequest) -> Result<Vec<String>, InvokeError> {
        let vars: HashMap<String, String> = HashMap::from([
            ("workflow".to_string(), request.workflow_id.clone()),
            ("step".to_string(), request.step_id.clone()),
            ("attempt".to_string(), request.attempt.to_string()),
        ]);

        let rendered = template::render(&self.command, &vars)
            .map_err(|e| InvokeError::Failed(format!("bad agent command template: {}", e)))?;

        let args = shell_words::split(&rendered).map_err(|e| {
            InvokeError::Failed(format!(
                "failed to parse agent command '{}': {}",
                rendered, e
            ))
        })?;

        if args.is_empty() {
            return Err(InvokeError::Failed(format!(
                "agent command is empty after parsing: '{}'",
                rendered
            )));
        }

        match &self.container {
            Some(container) => Ok(containerize(container, args)),
            None => Ok(args),
        }
    }
}

/// Wrap an agent command in a one-shot `docker run` invocation. `-i` keeps
/// stdin open so the prompt still flows through; `--rm` leaves nothing
/// behind once the step completes.
fn containerize(container: &ContainerSpec, command: Vec<String>) -> Vec<String> {
    let mut args: Vec<String> = ["docker", "run", "--rm", "-i"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    for volume in &container.volumes {
        args.push("-v".to_string());
        args.push(volume.clone());
    }
    for var in &container.env {
        args.push("-e".to_string());
        args.push(var.clone());
    }
    args.push(container.image.clone());
    args.extend(command);
    args
}

impl AgentInvoker for CommandInvoker {
    fn invoke(&self, request: &InvokeRequest) -> Result<AgentOutput, InvokeError> {
        if request.cancel.is_cancelled() {
            return Err(InvokeError::Cancelled);
        }

        let args = self.build_command(request)?;

        let mut child = Command::new(&args[0])
            .args(&args[1..])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                InvokeError::Failed(format!(
                    "failed to execute agent command '{}': {}. \
                     Fix: ensure the command is installed and in PATH.",
                    args[0], e
                ))
            })?;

        // Write the prompt, then close stdin so the agent sees EOF.
        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(request.prompt.as_bytes())
                .map_err(|e| InvokeError::Failed(format!("failed to write prompt: {}", e)))?;
        }

        // Drain pipes on reader threads so a chatty agent cannot deadlock
        // against a full pipe buffer while we poll for exit.
        let stdout_reader = spawn_reader(child.stdout.take());
        let stderr_reader = spawn_reader(child.stderr.take());

        let status = wait_with_deadline(&mut child, self.timeout, &request.cancel)?;

        let stdout = join_reader(stdout_reader);
        let stderr = join_reader(stderr_reader);

        if !status.success() {
            let mut reason = format!(
                "agent command exited with {}",
                status
                    .code()
                    .map(|c| format!("code {}", c))
                    .unwrap_or_else(|| "signal".to_string())
            );
            let stderr = stderr.trim();
            if !stderr.is_empty() {
                reason.push_str(": ");
                reason.push_str(tail(stderr, 500));
            }
            return Err(InvokeError::Failed(reason));
        }

        Ok(AgentOutput::from_text(stdout))
    }
}

/// Wait for the child, killing it on timeout or cancellation.
fn wait_with_deadline(
    child: &mut Child,
    timeout: Duration,
    cancel: &CancelToken,
) -> Result<std::process::ExitStatus, InvokeError> {
    let start = Instant::now();

    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Ok(status),
            Ok(None) => {
                if cancel.is_cancelled() {
                    kill(child);
                    return Err(InvokeError::Cancelled);
                }
                if start.elapsed() >= timeout {
                    kill(child);
                    return Err(InvokeError::TimedOut(timeout.as_secs()));
                }
                std::thread::sleep(POLL_INTERVAL);
            }
            Err(e) => {
                return Err(InvokeError::Failed(format!(
                    "failed to check agent process status: {}",
                    e
                )));
            }
        }
    }
}

fn kill(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

fn spawn_reader<R: Read + Send + 'static>(
    source: Option<R>,
) -> Option<std::thread::JoinHandle<String>> {
    source.map(|mut reader| {
        std::thread::spawn(move || {
            let mut buf = String::new();
            let _ = reader.read_to_string(&mut buf);
            buf
        })
    })
}

fn join_reader(handle: Option<std::thread::JoinHandle<String>>) -> String {
    handle
        .and_then(|h| h.join().ok())
        .unwrap_or_default()
}

/// Last `max` bytes of a string, on a char boundary.
fn tail(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut start = s.len() - max;
    while !s.is_char_boundary(start) {
        start += 1;
    }
    &s[start..]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(prompt: &str) -> InvokeRequest {
        InvokeRequest {
            workflow_id: "feature".to_string(),
            step_id: "implement".to_string(),
            attempt: 1,
            prompt: prompt.to_string(),
            cancel: CancelToken::new(),
        }
    }

    #[test]
    fn test_cancel_token_shared_across_clones() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.trigger();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn test_agent_output_json_detection() {
        let output = AgentOutput::from_text(r#"{"status": "ok"}"#);
        assert!(output.data.is_some());
        assert_eq!(
            output.into_value(),
            serde_json::json!({"status": "ok"})
        );

        let output = AgentOutput::from_text("plain text result");
        assert!(output.data.is_none());
        assert_eq!(
            output.into_value(),
            serde_json::Value::String("plain text result".to_string())
        );
    }

    #[test]
    fn test_command_invoker_pipes_prompt_through() {
        let invoker = CommandInvoker::new("cat", Duration::from_secs(10));
        let output = invoker.invoke(&request("hello agent")).unwrap();
        assert_eq!(output.text, "hello agent");
    }

    #[test]
    fn test_command_invoker_substitutes_step_variables() {
        let invoker = CommandInvoker::new(
            "sh -c 'echo {{workflow}}/{{step}}/{{attempt}}'",
            Duration::from_secs(10),
        );
        let output = invoker.invoke(&request("ignored")).unwrap();
        assert_eq!(output.text.trim(), "feature/implement/1");
    }

    #[test]
    fn test_command_invoker_nonzero_exit_is_failure() {
        let invoker = CommandInvoker::new(
            "sh -c 'echo boom >&2; exit 3'",
            Duration::from_secs(10),
        );
        let err = invoker.invoke(&request("x")).unwrap_err();
        match err {
            InvokeError::Failed(reason) => {
                assert!(reason.contains("code 3"), "{}", reason);
                assert!(reason.contains("boom"), "{}", reason);
            }
            _ => panic!("unexpected error: {:?}", err),
        }
    }

    #[test]
    fn test_command_invoker_timeout_kills_child() {
        let invoker = CommandInvoker::new("sleep 30", Duration::from_millis(200));
        let start = Instant::now();
        let err = invoker.invoke(&request("x")).unwrap_err();
        assert!(matches!(err, InvokeError::TimedOut(_)));
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_command_invoker_honors_pre_cancelled_token() {
        let invoker = CommandInvoker::new("cat", Duration::from_secs(10));
        let mut req = request("x");
        req.cancel.trigger();
        let err = invoker.invoke(&req).unwrap_err();
        assert!(matches!(err, InvokeError::Cancelled));
    }

    #[test]
    fn test_command_invoker_missing_binary() {
        let invoker = CommandInvoker::new(
            "definitely-not-a-real-binary-xyz",
            Duration::from_secs(10),
        );
        let err = invoker.invoke(&request("x")).unwrap_err();
        assert!(matches!(err, InvokeError::Failed(_)));
    }

    #[test]
    fn test_container_spec_wraps_command_in_docker_run() {
        let invoker = CommandInvoker::new("claude -p", Duration::from_secs(10))
            .with_container(ContainerSpec {
                image: "skein-agent:latest".to_string(),
                volumes: vec!["./workspace:/workspace".to_string()],
                env: vec!["GIT_AUTHOR_NAME=skein".to_string()],
            });

        let args = invoker.build_command(&request("x")).unwrap();
        assert_eq!(
            args,
            vec![
                "docker",
                "run",
                "--rm",
                "-i",
                "-v",
                "./workspace:/workspace",
                "-e",
                "GIT_AUTHOR_NAME=skein",
                "skein-agent:latest",
                "claude",
                "-p",
            ]
        );
    }

    #[test]
    fn test_container_spec_preserves_step_variable_substitution() {
        let invoker = CommandInvoker::new(
            "agent --step {{step}}",
            Duration::from_secs(10),
        )
        .with_container(ContainerSpec {
            image: "agent:1".to_string(),
            volumes: vec![],
            env: vec![],
        });

        let args = invoker.build_command(&request("x")).unwrap();
        assert_eq!(
            args,
            vec!["docker", "run", "--rm", "-i", "agent:1", "agent", "--step", "implement"]
        );
    }

    #[test]
    fn test_empty_command_rejected() {
        let invoker = CommandInvoker::new("   ", Duration::from_secs(10));
        let err = invoker.invoke(&request("x")).unwrap_err();
        match err {
            InvokeError::Failed(reason) => assert!(reason.contains("empty")),
            _ => panic!("unexpected error: {:?}", err),
        }
    }
}
