//! Implementation of the `skein fragments` command.
//!
//! Lists the fragment library: name, type, and declared inputs/outputs,
//! in deterministic name order.

use crate::cli::FragmentsArgs;
use crate::config::Config;
use crate::error::Result;

pub fn cmd_fragments(args: FragmentsArgs, config: &Config) -> Result<()> {
    let store = super::load_store(args.fragments.as_ref(), config)?;

    if store.is_empty() {
        println!("no fragments found");
        return Ok(());
    }

    for fragment in store.iter() {
        println!("{:<32} {}", fragment.name(), fragment.meta.fragment_type);

        for input in &fragment.meta.inputs {
            let detail = match (&input.default, input.required) {
                (Some(default), _) => format!(" (default: \"{}\")", default),
                (None, false) => " (optional)".to_string(),
                (None, true) => String::new(),
            };
            println!("    in:  {{{{{}}}}}{}", input.name, detail);
        }
        for output in &fragment.meta.outputs {
            println!("    out: {} [{}]", output.name, output.format);
        }
    }

    println!("\n{} fragment(s)", store.len());
    Ok(())
}
