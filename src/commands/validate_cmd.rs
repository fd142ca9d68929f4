//! Implementation of the `skein validate` command.
//!
//! Runs every load-time check against a workflow without invoking any
//! agent: step id and input declarations, dependency and on_fail reference
//! integrity, cycle detection, per-step fragment composition, and template
//! variable coverage. Any failure aborts with a validation exit code.

use crate::cli::ValidateArgs;
use crate::config::Config;
use crate::error::Result;
use crate::workflow::validate_workflow;

pub fn cmd_validate(args: ValidateArgs, config: &Config) -> Result<()> {
    let store = super::load_store(args.fragments.as_ref(), config)?;
    let workflow = super::load_workflow(&args.workflow, config)?;

    let graph = validate_workflow(&workflow, &store)?;

    println!("workflow '{}' is valid", workflow.id);
    println!("  steps:     {}", workflow.steps.len());
    println!("  fragments: {}", store.len());
    if !workflow.steps.is_empty() {
        println!("  order:     {}", graph.topo_order().join(" -> "));
    }

    Ok(())
}
