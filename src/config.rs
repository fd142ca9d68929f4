//! Configuration loading and validation.
//!
//! Settings live in `skein.toml` next to the fragment library. Every field
//! has a default so a missing config file is not an error; CLI flags override
//! whatever the file says. Unknown fields are ignored for forward
//! compatibility.

use crate::error::{Result, SkeinError};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default config file name, looked up in the current directory.
pub const CONFIG_FILE: &str = "skein.toml";

/// Configuration for skein.
///
/// This struct represents the contents of `skein.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory holding the fragment library (default: "fragments").
    #[serde(default = "default_fragments_dir")]
    pub fragments_dir: String,

    /// Directory searched for bare workflow names (default: "workflows").
    /// `skein run feature` resolves to `<workflows_dir>/feature.toml` when
    /// no file named `feature` exists.
    #[serde(default = "default_workflows_dir")]
    pub workflows_dir: String,

    /// Agent invocation settings.
    #[serde(default)]
    pub agent: AgentConfig,

    /// Run execution settings.
    #[serde(default)]
    pub run: RunConfig,
}

/// `[agent]` section: how step prompts are handed to an agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Command line to invoke per step. The prompt is written to its stdin;
    /// `{{workflow}}`, `{{step}}` and `{{attempt}}` are substituted into the
    /// command itself.
    #[serde(default = "default_agent_command")]
    pub command: String,

    /// Seconds before an invocation is killed and treated as failed.
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,

    /// When set, the agent command runs inside a disposable container per
    /// step instead of directly on the host.
    #[serde(default)]
    pub container: Option<ContainerConfig>,
}

/// `[agent.container]` section: sandboxed invocation via `docker run`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerConfig {
    /// Image to run the agent command in.
    pub image: String,

    /// Bind mounts, each `HOST:CONTAINER`.
    #[serde(default)]
    pub volumes: Vec<String>,

    /// Environment variables passed into the container, each `NAME=VALUE`.
    #[serde(default)]
    pub env: Vec<String>,
}

/// `[run]` section: scheduling and event-log settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Whether runs append events to the event log.
    #[serde(default = "default_true")]
    pub events: bool,

    /// Event log path (default: ".skein/events.ndjson").
    #[serde(default = "default_events_file")]
    pub events_file: String,

    /// Maximum concurrently running steps; 0 means unbounded.
    #[serde(default)]
    pub max_parallel: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            fragments_dir: default_fragments_dir(),
            workflows_dir: default_workflows_dir(),
            agent: AgentConfig::default(),
            run: RunConfig::default(),
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            command: default_agent_command(),
            timeout_seconds: default_timeout_seconds(),
            container: None,
        }
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            events: default_true(),
            events_file: default_events_file(),
            max_parallel: 0,
        }
    }
}

impl Config {
    /// Load config from a TOML file.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the skein.toml file
    ///
    /// # Returns
    ///
    /// * `Ok(Config)` - Successfully loaded and validated config
    /// * `Err(SkeinError::UserError)` - Read error, parse error, or
    ///   validation failure
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path).map_err(|e| {
            SkeinError::UserError(format!(
                "failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;

        Self::from_toml(&content)
    }

    /// Load config from `path`, or fall back to defaults when the file does
    /// not exist. An explicit path that fails to parse is still an error.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Parse config from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)
            .map_err(|e| SkeinError::UserError(format!("failed to parse config TOML: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate config values.
    ///
    /// Validation rules:
    /// - `agent.command` must be non-empty
    /// - `agent.timeout_seconds` must be positive
    /// - `agent.container`, when present, needs a non-empty image,
    ///   `HOST:CONTAINER` volumes, and `NAME=VALUE` env entries
    pub fn validate(&self) -> Result<()> {
        if self.agent.command.trim().is_empty() {
            return Err(SkeinError::UserError(
                "config validation failed: agent.command must be non-empty".to_string(),
            ));
        }

        if self.agent.timeout_seconds == 0 {
            return Err(SkeinError::UserError(
                "config validation failed: agent.timeout_seconds must be greater than 0"
                    .to_string(),
            ));
        }

        if let Some(container) = &self.agent.container {
            if container.image.trim().is_empty() {
                return Err(SkeinError::UserError(
                    "config validation failed: agent.container.image must be non-empty"
                        .to_string(),
                ));
            }
            for volume in &container.volumes {
                if !volume.contains(':') {
                    return Err(SkeinError::UserError(format!(
                        "config validation failed: agent.container.volumes entry '{}' \
                         must be HOST:CONTAINER",
                        volume
                    )));
                }
            }
            for var in &container.env {
                if !var.contains('=') {
                    return Err(SkeinError::UserError(format!(
                        "config validation failed: agent.container.env entry '{}' \
                         must be NAME=VALUE",
                        var
                    )));
                }
            }
        }

        Ok(())
    }
}

fn default_fragments_dir() -> String {
    "fragments".to_string()
}

fn default_workflows_dir() -> String {
    "workflows".to_string()
}

fn default_agent_command() -> String {
    "claude -p".to_string()
}

fn default_timeout_seconds() -> u64 {
    600
}

fn default_events_file() -> String {
    ".skein/events.ndjson".to_string()
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.fragments_dir, "fragments");
        assert_eq!(config.agent.timeout_seconds, 600);
        assert!(config.run.events);
        assert_eq!(config.run.max_parallel, 0);
        config.validate().unwrap();
    }

    #[test]
    fn test_empty_toml_gives_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.run.events_file, ".skein/events.ndjson");
        assert_eq!(config.agent.command, "claude -p");
    }

    #[test]
    fn test_partial_toml_overrides() {
        let config = Config::from_toml(
            r#"
fragments_dir = "prompts"

[agent]
timeout_seconds = 30

[run]
max_parallel = 4
"#,
        )
        .unwrap();

        assert_eq!(config.fragments_dir, "prompts");
        assert_eq!(config.agent.timeout_seconds, 30);
        assert_eq!(config.agent.command, "claude -p");
        assert_eq!(config.run.max_parallel, 4);
    }

    #[test]
    fn test_unknown_fields_ignored() {
        let config = Config::from_toml("future_setting = true\n").unwrap();
        assert_eq!(config.fragments_dir, "fragments");
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let err = Config::from_toml("[agent]\ntimeout_seconds = 0\n").unwrap_err();
        assert!(err.to_string().contains("timeout_seconds"));
    }

    #[test]
    fn test_empty_agent_command_rejected() {
        let err = Config::from_toml("[agent]\ncommand = \"  \"\n").unwrap_err();
        assert!(err.to_string().contains("agent.command"));
    }

    #[test]
    fn test_container_section_parsed() {
        let config = Config::from_toml(
            r#"
[agent.container]
image = "skein-agent:latest"
volumes = ["./workspace:/workspace"]
env = ["CI=1"]
"#,
        )
        .unwrap();

        let container = config.agent.container.unwrap();
        assert_eq!(container.image, "skein-agent:latest");
        assert_eq!(container.volumes, vec!["./workspace:/workspace"]);
        assert_eq!(container.env, vec!["CI=1"]);
    }

    #[test]
    fn test_container_absent_by_default() {
        let config = Config::from_toml("").unwrap();
        assert!(config.agent.container.is_none());
    }

    #[test]
    fn test_container_empty_image_rejected() {
        let err = Config::from_toml("[agent.container]\nimage = \" \"\n").unwrap_err();
        assert!(err.to_string().contains("container.image"));
    }

    #[test]
    fn test_container_malformed_volume_rejected() {
        let err = Config::from_toml(
            "[agent.container]\nimage = \"a:1\"\nvolumes = [\"/just-a-path\"]\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("HOST:CONTAINER"));
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let config = Config::load_or_default("/nonexistent/skein.toml").unwrap();
        assert_eq!(config.fragments_dir, "fragments");
    }
}
