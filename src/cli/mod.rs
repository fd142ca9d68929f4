//! CLI argument parsing for skein.
//!
//! Uses clap derive macros for declarative argument definitions.
//! This module defines the command structure; actual implementations
//! are in the `commands` module.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Skein: composable prompt pipelines for agentic workflows.
///
/// Prompts are assembled from reusable markdown fragments (role, phase,
/// stack, include) and executed as a dependency graph of agent steps:
/// - Fragments are markdown files with YAML frontmatter
/// - Workflows are TOML files declaring steps, dependencies, and retries
/// - Step outputs feed later steps' templates and conditions
#[derive(Parser, Debug)]
#[command(name = "skein")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the config file (default: ./skein.toml).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands for skein.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Validate a workflow against the fragment library.
    ///
    /// Checks step ids, dependency references, cycles, fragment lookups,
    /// and template variable coverage. Does not invoke any agent.
    Validate(ValidateArgs),

    /// Compose one step's prompt and print it.
    ///
    /// Assembles the step's fragments in role, phase, stack, include order.
    /// With --resolve, also substitutes template variables from --var.
    Compose(ComposeArgs),

    /// Execute a workflow to completion.
    ///
    /// Dispatches each step's resolved prompt to the agent command,
    /// honoring dependencies, conditions, and on_fail retries.
    Run(RunArgs),

    /// List the fragments in the library.
    ///
    /// Shows each fragment's name, type, and declared inputs/outputs.
    Fragments(FragmentsArgs),
}

/// Arguments for the `validate` command.
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to the workflow TOML file.
    pub workflow: PathBuf,

    /// Fragment library directory (overrides config).
    #[arg(long)]
    pub fragments: Option<PathBuf>,
}

/// Arguments for the `compose` command.
#[derive(Parser, Debug)]
pub struct ComposeArgs {
    /// Path to the workflow TOML file.
    pub workflow: PathBuf,

    /// Step id whose prompt to compose.
    pub step: String,

    /// Fragment library directory (overrides config).
    #[arg(long)]
    pub fragments: Option<PathBuf>,

    /// Template variable as NAME=VALUE (repeatable).
    #[arg(long = "var", value_name = "NAME=VALUE")]
    pub vars: Vec<String>,

    /// Substitute template variables instead of printing placeholders.
    #[arg(long)]
    pub resolve: bool,
}

/// Arguments for the `run` command.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Path to the workflow TOML file.
    pub workflow: PathBuf,

    /// Fragment library directory (overrides config).
    #[arg(long)]
    pub fragments: Option<PathBuf>,

    /// Workflow input as NAME=VALUE (repeatable).
    #[arg(long = "var", value_name = "NAME=VALUE")]
    pub vars: Vec<String>,

    /// Agent command line (overrides config). The prompt is piped to stdin.
    #[arg(long)]
    pub agent_cmd: Option<String>,

    /// Per-step timeout in seconds (overrides config).
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Run the agent command inside a disposable container of this image
    /// (overrides config).
    #[arg(long)]
    pub container_image: Option<String>,

    /// Maximum concurrently running steps; 0 means unbounded (overrides config).
    #[arg(long)]
    pub max_parallel: Option<usize>,

    /// Disable the run event log.
    #[arg(long)]
    pub no_events: bool,

    /// Event log path (overrides config).
    #[arg(long)]
    pub events_file: Option<PathBuf>,
}

/// Arguments for the `fragments` command.
#[derive(Parser, Debug)]
pub struct FragmentsArgs {
    /// Fragment library directory (overrides config).
    #[arg(long)]
    pub fragments: Option<PathBuf>,
}

impl Cli {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_validate() {
        let cli = Cli::try_parse_from(["skein", "validate", "feature.toml"]).unwrap();
        match cli.command {
            Command::Validate(args) => {
                assert_eq!(args.workflow, PathBuf::from("feature.toml"));
                assert!(args.fragments.is_none());
            }
            _ => panic!("Expected Validate command"),
        }
    }

    #[test]
    fn parse_compose_with_vars() {
        let cli = Cli::try_parse_from([
            "skein",
            "compose",
            "feature.toml",
            "implement",
            "--var",
            "mission=ship v1",
            "--var",
            "lang=rust",
            "--resolve",
        ])
        .unwrap();
        match cli.command {
            Command::Compose(args) => {
                assert_eq!(args.step, "implement");
                assert_eq!(args.vars, vec!["mission=ship v1", "lang=rust"]);
                assert!(args.resolve);
            }
            _ => panic!("Expected Compose command"),
        }
    }

    #[test]
    fn parse_run_overrides() {
        let cli = Cli::try_parse_from([
            "skein",
            "run",
            "feature.toml",
            "--agent-cmd",
            "mock-agent",
            "--timeout",
            "30",
            "--max-parallel",
            "2",
            "--no-events",
            "--container-image",
            "skein-agent:latest",
        ])
        .unwrap();
        match cli.command {
            Command::Run(args) => {
                assert_eq!(args.agent_cmd.as_deref(), Some("mock-agent"));
                assert_eq!(args.timeout, Some(30));
                assert_eq!(args.max_parallel, Some(2));
                assert!(args.no_events);
                assert_eq!(args.container_image.as_deref(), Some("skein-agent:latest"));
            }
            _ => panic!("Expected Run command"),
        }
    }

    #[test]
    fn parse_global_config_flag() {
        let cli =
            Cli::try_parse_from(["skein", "fragments", "--config", "other.toml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("other.toml")));
        assert!(matches!(cli.command, Command::Fragments(_)));
    }
}
