//! Implementation of the `skein run` command.
//!
//! Wires the workflow engine to the subprocess invoker and the NDJSON event
//! log, applying CLI overrides on top of the config. Prints a per-step
//! outcome summary; a failed run surfaces as a `WorkflowFailed` error so the
//! process exits with the workflow-failure code.

use crate::cli::RunArgs;
use crate::config::Config;
use crate::engine::{RunOptions, run_workflow};
use crate::error::{Result, SkeinError};
use crate::events::{EventSink, NdjsonSink};
use crate::invoker::{CommandInvoker, ContainerSpec};
use std::path::PathBuf;
use std::time::Duration;

pub fn cmd_run(args: RunArgs, config: &Config) -> Result<()> {
    let store = super::load_store(args.fragments.as_ref(), config)?;
    let workflow = super::load_workflow(&args.workflow, config)?;
    let vars = super::parse_vars(&args.vars)?;

    let command = args
        .agent_cmd
        .clone()
        .unwrap_or_else(|| config.agent.command.clone());
    let timeout = Duration::from_secs(args.timeout.unwrap_or(config.agent.timeout_seconds));
    let mut invoker = CommandInvoker::new(command, timeout);
    if let Some(container) = container_spec(&args, config) {
        invoker = invoker.with_container(container);
    }

    let sink = open_sink(&args, config)?;
    let options = RunOptions {
        max_parallel: args.max_parallel.unwrap_or(config.run.max_parallel),
        sink: sink.as_ref().map(|s| s as &dyn EventSink),
    };

    let report = run_workflow(&workflow, &store, vars, &invoker, &options)?;

    println!("workflow '{}'", report.workflow_id);
    for (id, step) in &report.steps {
        let attempts = match step.attempts {
            0 | 1 => String::new(),
            n => format!(" ({} attempts)", n),
        };
        println!("  {:<24} {}{}", id, step.status, attempts);
    }

    match report.failure() {
        None => {
            println!("workflow succeeded");
            Ok(())
        }
        Some((step, reason)) => Err(SkeinError::WorkflowFailed {
            step: step.to_string(),
            reason: reason.to_string(),
        }),
    }
}

/// Container settings from the `--container-image` flag and the
/// `[agent.container]` config section. The flag overrides the image while
/// keeping configured mounts and env; flag-only use gets a bare container.
fn container_spec(args: &RunArgs, config: &Config) -> Option<ContainerSpec> {
    let configured = config.agent.container.as_ref();
    let image = args
        .container_image
        .clone()
        .or_else(|| configured.map(|c| c.image.clone()))?;

    Some(ContainerSpec {
        image,
        volumes: configured.map(|c| c.volumes.clone()).unwrap_or_default(),
        env: configured.map(|c| c.env.clone()).unwrap_or_default(),
    })
}

/// Open the event log unless disabled by flag or config.
fn open_sink(args: &RunArgs, config: &Config) -> Result<Option<NdjsonSink>> {
    if args.no_events || (!config.run.events && args.events_file.is_none()) {
        return Ok(None);
    }

    let path = args
        .events_file
        .clone()
        .unwrap_or_else(|| PathBuf::from(&config.run.events_file));

    let sink = NdjsonSink::open(&path).map_err(|e| {
        SkeinError::UserError(format!(
            "failed to open event log '{}': {}",
            path.display(),
            e
        ))
    })?;

    Ok(Some(sink))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ContainerConfig;
    use clap::Parser;

    fn run_args(extra: &[&str]) -> RunArgs {
        let mut argv = vec!["run", "feature.toml"];
        argv.extend(extra);
        RunArgs::try_parse_from(argv).unwrap()
    }

    fn containered_config() -> Config {
        let mut config = Config::default();
        config.agent.container = Some(ContainerConfig {
            image: "configured:1".to_string(),
            volumes: vec!["./ws:/ws".to_string()],
            env: vec!["CI=1".to_string()],
        });
        config
    }

    #[test]
    fn test_container_spec_absent_without_flag_or_config() {
        assert!(container_spec(&run_args(&[]), &Config::default()).is_none());
    }

    #[test]
    fn test_container_spec_from_config() {
        let spec = container_spec(&run_args(&[]), &containered_config()).unwrap();
        assert_eq!(spec.image, "configured:1");
        assert_eq!(spec.volumes, vec!["./ws:/ws"]);
    }

    #[test]
    fn test_container_image_flag_overrides_config_image() {
        let args = run_args(&["--container-image", "override:2"]);
        let spec = container_spec(&args, &containered_config()).unwrap();
        assert_eq!(spec.image, "override:2");
        // Configured mounts and env survive an image override.
        assert_eq!(spec.volumes, vec!["./ws:/ws"]);
        assert_eq!(spec.env, vec!["CI=1"]);
    }

    #[test]
    fn test_container_image_flag_alone_gets_bare_container() {
        let args = run_args(&["--container-image", "solo:3"]);
        let spec = container_spec(&args, &Config::default()).unwrap();
        assert_eq!(spec.image, "solo:3");
        assert!(spec.volumes.is_empty());
        assert!(spec.env.is_empty());
    }
}
