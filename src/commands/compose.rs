//! Implementation of the `skein compose` command.
//!
//! Assembles one step's prompt from its fragments and prints it. The whole
//! workflow is validated first so a broken sibling step is caught here just
//! as it would be at run time. With `--resolve`, template variables from
//! `--var` (and fragment-declared defaults) are substituted; placeholders
//! for values only produced at run time make `--resolve` fail.

use crate::cli::ComposeArgs;
use crate::config::Config;
use crate::error::{Result, SkeinError};
use crate::template::{self, TemplateError};
use crate::workflow::{apply_input_defaults, validate_workflow};
use crate::compose::{compose_step, step_fragments};

pub fn cmd_compose(args: ComposeArgs, config: &Config) -> Result<()> {
    let store = super::load_store(args.fragments.as_ref(), config)?;
    let workflow = super::load_workflow(&args.workflow, config)?;

    validate_workflow(&workflow, &store)?;

    let step = workflow.step(&args.step).ok_or_else(|| {
        SkeinError::UserError(format!(
            "workflow '{}' has no step '{}'",
            workflow.id, args.step
        ))
    })?;

    let composed = compose_step(&workflow, step, &store)?;

    if !args.resolve {
        println!("{}", composed.text);
        return Ok(());
    }

    let mut vars = super::parse_vars(&args.vars)?;
    apply_input_defaults(&workflow, &mut vars);
    for fragment in step_fragments(&workflow, step, &store)? {
        for input in &fragment.meta.inputs {
            if let Some(default) = &input.default
                && !vars.contains_key(&input.name)
            {
                vars.insert(input.name.clone(), default.clone());
            }
        }
    }

    let resolved = template::render(&composed.text, &vars).map_err(|e| match e {
        TemplateError::UndefinedVariable { name, .. } => SkeinError::UnboundVariable {
            name,
            step: Some(args.step.clone()),
        },
        other => SkeinError::UserError(format!(
            "template error in step '{}': {}",
            args.step, other
        )),
    })?;

    println!("{}", resolved);
    Ok(())
}
