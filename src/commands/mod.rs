//! Command implementations for skein.
//!
//! This module provides the dispatcher that routes CLI commands to their
//! implementations, plus the small shared helpers every command needs:
//! config resolution, fragment-library loading, and `--var` parsing.

mod compose;
mod fragments;
mod run;
mod validate_cmd;

use crate::cli::{Cli, Command};
use crate::config::{CONFIG_FILE, Config};
use crate::error::{Result, SkeinError};
use crate::fragment::FragmentStore;
use crate::workflow::Workflow;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Dispatch a command to its implementation.
///
/// This is the main entry point for command execution. Each command
/// is routed to its handler function.
pub fn dispatch(cli: Cli) -> Result<()> {
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Command::Validate(args) => validate_cmd::cmd_validate(args, &config),
        Command::Compose(args) => compose::cmd_compose(args, &config),
        Command::Run(args) => run::cmd_run(args, &config),
        Command::Fragments(args) => fragments::cmd_fragments(args, &config),
    }
}

/// Resolve the config: an explicit `--config` path must exist and parse;
/// otherwise `./skein.toml` is used when present, defaults when not.
fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::load(path),
        None => Config::load_or_default(CONFIG_FILE),
    }
}

/// Load the fragment library from the `--fragments` override or the
/// configured directory.
fn load_store(flag: Option<&PathBuf>, config: &Config) -> Result<FragmentStore> {
    let dir = flag
        .cloned()
        .unwrap_or_else(|| PathBuf::from(&config.fragments_dir));

    if !dir.is_dir() {
        return Err(SkeinError::UserError(format!(
            "fragment directory '{}' does not exist. \
             Fix: create it or pass --fragments pointing at your library.",
            dir.display()
        )));
    }

    FragmentStore::load_dir(&dir)
}

/// Load a workflow definition.
///
/// An existing path loads directly; a bare name falls back to
/// `<workflows_dir>/<name>.toml`.
fn load_workflow(path: &Path, config: &Config) -> Result<Workflow> {
    if path.exists() {
        return Workflow::load(path);
    }

    if path.components().count() == 1 && path.extension().is_none() {
        let fallback =
            Path::new(&config.workflows_dir).join(format!("{}.toml", path.display()));
        if fallback.exists() {
            return Workflow::load(&fallback);
        }
    }

    Err(SkeinError::UserError(format!(
        "workflow '{}' not found (also looked in '{}')",
        path.display(),
        config.workflows_dir
    )))
}

/// Parse repeated `--var NAME=VALUE` arguments into a variable map.
///
/// The value may contain `=`; only the first one splits. Duplicate names
/// are an error rather than a silent last-one-wins.
fn parse_vars(pairs: &[String]) -> Result<HashMap<String, String>> {
    let mut vars = HashMap::new();

    for pair in pairs {
        let Some((name, value)) = pair.split_once('=') else {
            return Err(SkeinError::UserError(format!(
                "invalid --var '{}': expected NAME=VALUE",
                pair
            )));
        };
        if name.is_empty() {
            return Err(SkeinError::UserError(format!(
                "invalid --var '{}': variable name is empty",
                pair
            )));
        }
        if vars.insert(name.to_string(), value.to_string()).is_some() {
            return Err(SkeinError::UserError(format!(
                "duplicate --var '{}'",
                name
            )));
        }
    }

    Ok(vars)
}
