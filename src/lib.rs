//! Skein: composable prompt pipelines for agentic workflows.
//!
//! Prompts are assembled from reusable markdown fragments and executed as a
//! dependency graph of agent steps. The crate splits into:
//!
//! - [`fragment`]: fragment files (YAML frontmatter + markdown body) and the
//!   library loaded from a directory
//! - [`compose`]: ordered assembly of one step's fragments into a prompt
//! - [`template`]: `{{name}}` placeholder substitution
//! - [`workflow`]: workflow definitions, the dependency graph, conditions,
//!   and load-time validation
//! - [`engine`]: the scheduler executing a workflow to a terminal state
//! - [`invoker`]: the agent boundary, including the subprocess invoker
//! - [`events`]: the NDJSON run log
//!
//! Embedders drive [`engine::run_workflow`] with their own
//! [`invoker::AgentInvoker`]; the `skein` binary wires in the subprocess
//! invoker and the CLI.

pub mod cli;
pub mod commands;
pub mod compose;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod exit_codes;
pub mod fragment;
pub mod invoker;
pub mod template;
pub mod workflow;
