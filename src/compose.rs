//! Prompt composition: deterministic assembly of fragments into one prompt.
//!
//! Order is fixed: role body (if any) -> phase prompt -> stack prompts in
//! listed order -> include list. Step-level `role`/`stacks`/`include` fully
//! replace their workflow-level counterparts; lists never merge, so there is
//! no ambiguity about positions when both levels name the same fragment.
//!
//! Fragments are joined with [`FRAGMENT_SEPARATOR`], a visible marker, so a
//! reader of the final prompt can tell where one fragment ends and the next
//! begins.

use crate::error::{Result, SkeinError};
use crate::fragment::{Fragment, FragmentStore, FragmentType};
use crate::workflow::{Step, Workflow};

/// Fixed separator inserted between composed fragment bodies.
pub const FRAGMENT_SEPARATOR: &str = "\n\n---\n\n";

/// The composed prompt for one step, before template resolution.
#[derive(Debug, Clone)]
pub struct ComposedPrompt {
    /// The step this prompt belongs to.
    pub step_id: String,
    /// Names of the fragments used, in composition order.
    pub fragments: Vec<String>,
    /// The concatenated prompt text.
    pub text: String,
}

/// Compose the prompt text for a step.
///
/// Fails with `CompositionError` when a referenced fragment is missing, has
/// the wrong type for its position, or would appear twice in one prompt.
pub fn compose_step(
    workflow: &Workflow,
    step: &Step,
    store: &FragmentStore,
) -> Result<ComposedPrompt> {
    let parts = step_fragments(workflow, step, store)?;

    let fragments = parts.iter().map(|f| f.name().to_string()).collect();
    let text = parts
        .iter()
        .map(|f| f.body.as_str())
        .collect::<Vec<_>>()
        .join(FRAGMENT_SEPARATOR);

    Ok(ComposedPrompt {
        step_id: step.id.clone(),
        fragments,
        text,
    })
}

/// Resolve a step's fragment references in composition order.
///
/// Load-time validation also uses this to reach declared inputs, defaults,
/// and outputs without building the final text.
pub fn step_fragments<'a>(
    workflow: &Workflow,
    step: &Step,
    store: &'a FragmentStore,
) -> Result<Vec<&'a Fragment>> {
    let mut parts: Vec<&Fragment> = Vec::new();

    if let Some(name) = step.role.as_ref().or(workflow.role.as_ref()) {
        parts.push(lookup(store, &step.id, name, Some(FragmentType::Role))?);
    }

    parts.push(lookup(store, &step.id, &step.prompt, Some(FragmentType::Phase))?);

    for name in step.stacks.as_ref().unwrap_or(&workflow.stacks) {
        parts.push(lookup(store, &step.id, name, Some(FragmentType::Stack))?);
    }

    for name in step.include.as_ref().unwrap_or(&workflow.include) {
        parts.push(lookup(store, &step.id, name, None)?);
    }

    let mut seen: Vec<&str> = Vec::with_capacity(parts.len());
    for fragment in &parts {
        if seen.contains(&fragment.name()) {
            return Err(SkeinError::CompositionError {
                step: step.id.clone(),
                reason: format!("fragment '{}' referenced more than once", fragment.name()),
            });
        }
        seen.push(fragment.name());
    }

    Ok(parts)
}

fn lookup<'a>(
    store: &'a FragmentStore,
    step_id: &str,
    name: &str,
    expected: Option<FragmentType>,
) -> Result<&'a Fragment> {
    let fragment = store.get(name).map_err(|_| SkeinError::CompositionError {
        step: step_id.to_string(),
        reason: format!("fragment '{}' not found in the fragment store", name),
    })?;

    if let Some(expected) = expected
        && fragment.meta.fragment_type != expected
    {
        return Err(SkeinError::CompositionError {
            step: step_id.to_string(),
            reason: format!(
                "fragment '{}' has type '{}', expected '{}'",
                name, fragment.meta.fragment_type, expected
            ),
        });
    }

    Ok(fragment)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fragment::Fragment;

    fn fragment(name: &str, ftype: &str, body: &str) -> Fragment {
        let content = format!("---\nname: {}\ntype: {}\n---\n{}", name, ftype, body);
        Fragment::parse(&content, name).unwrap()
    }

    fn store() -> FragmentStore {
        FragmentStore::from_fragments(vec![
            fragment("role-dev", "role", "You are a developer."),
            fragment("phase-implement", "phase", "Implement {{mission}}."),
            fragment("phase-qa", "phase", "Review the work."),
            fragment("stack-rust", "stack", "Use cargo."),
            fragment("stack-docker", "stack", "Use containers."),
            fragment("pm-conventions", "pm", "Follow house rules."),
        ])
        .unwrap()
    }

    fn workflow(toml: &str) -> Workflow {
        Workflow::from_toml(toml).unwrap()
    }

    #[test]
    fn test_composition_order_and_separator() {
        let wf = workflow(
            r#"
id = "feature"
role = "role-dev"
stacks = ["stack-rust", "stack-docker"]
include = ["pm-conventions"]

[[steps]]
id = "implement"
prompt = "phase-implement"
"#,
        );
        let composed = compose_step(&wf, wf.step("implement").unwrap(), &store()).unwrap();

        assert_eq!(
            composed.fragments,
            vec![
                "role-dev",
                "phase-implement",
                "stack-rust",
                "stack-docker",
                "pm-conventions"
            ]
        );
        // Byte-for-byte: body, separator, body, ... in declared order.
        assert_eq!(
            composed.text,
            format!(
                "You are a developer.{sep}Implement {{{{mission}}}}.{sep}Use cargo.{sep}Use containers.{sep}Follow house rules.",
                sep = FRAGMENT_SEPARATOR
            )
        );
    }

    #[test]
    fn test_no_role_no_lists() {
        let wf = workflow(
            r#"
id = "feature"

[[steps]]
id = "qa"
prompt = "phase-qa"
"#,
        );
        let composed = compose_step(&wf, wf.step("qa").unwrap(), &store()).unwrap();
        assert_eq!(composed.fragments, vec!["phase-qa"]);
        assert_eq!(composed.text, "Review the work.");
    }

    #[test]
    fn test_step_include_fully_replaces_workflow_include() {
        let wf = workflow(
            r#"
id = "feature"
include = ["pm-conventions"]

[[steps]]
id = "qa"
prompt = "phase-qa"
include = ["stack-docker"]
"#,
        );
        let composed = compose_step(&wf, wf.step("qa").unwrap(), &store()).unwrap();
        // Workflow-level include does not leak in.
        assert_eq!(composed.fragments, vec!["phase-qa", "stack-docker"]);
    }

    #[test]
    fn test_step_empty_include_suppresses_workflow_include() {
        let wf = workflow(
            r#"
id = "feature"
include = ["pm-conventions"]

[[steps]]
id = "qa"
prompt = "phase-qa"
include = []
"#,
        );
        let composed = compose_step(&wf, wf.step("qa").unwrap(), &store()).unwrap();
        assert_eq!(composed.fragments, vec!["phase-qa"]);
    }

    #[test]
    fn test_step_role_overrides_workflow_role() {
        let wf = workflow(
            r#"
id = "feature"

[[steps]]
id = "implement"
prompt = "phase-implement"
role = "role-dev"
"#,
        );
        let composed = compose_step(&wf, wf.step("implement").unwrap(), &store()).unwrap();
        assert_eq!(composed.fragments[0], "role-dev");
    }

    #[test]
    fn test_missing_fragment_is_composition_error() {
        let wf = workflow(
            r#"
id = "feature"

[[steps]]
id = "implement"
prompt = "phase-missing"
"#,
        );
        let err = compose_step(&wf, wf.step("implement").unwrap(), &store()).unwrap_err();
        match err {
            SkeinError::CompositionError { step, reason } => {
                assert_eq!(step, "implement");
                assert!(reason.contains("phase-missing"));
            }
            _ => panic!("unexpected error: {:?}", err),
        }
    }

    #[test]
    fn test_wrong_fragment_type_is_composition_error() {
        let wf = workflow(
            r#"
id = "feature"
role = "stack-rust"

[[steps]]
id = "qa"
prompt = "phase-qa"
"#,
        );
        let err = compose_step(&wf, wf.step("qa").unwrap(), &store()).unwrap_err();
        match err {
            SkeinError::CompositionError { reason, .. } => {
                assert!(reason.contains("type 'stack'"));
                assert!(reason.contains("expected 'role'"));
            }
            _ => panic!("unexpected error: {:?}", err),
        }
    }

    #[test]
    fn test_duplicate_fragment_is_composition_error() {
        let wf = workflow(
            r#"
id = "feature"
stacks = ["stack-rust"]
include = ["stack-rust"]

[[steps]]
id = "qa"
prompt = "phase-qa"
"#,
        );
        let err = compose_step(&wf, wf.step("qa").unwrap(), &store()).unwrap_err();
        match err {
            SkeinError::CompositionError { reason, .. } => {
                assert!(reason.contains("referenced more than once"));
            }
            _ => panic!("unexpected error: {:?}", err),
        }
    }

    #[test]
    fn test_composition_is_deterministic() {
        let wf = workflow(
            r#"
id = "feature"
role = "role-dev"
stacks = ["stack-rust"]

[[steps]]
id = "implement"
prompt = "phase-implement"
"#,
        );
        let step = wf.step("implement").unwrap();
        let a = compose_step(&wf, step, &store()).unwrap();
        let b = compose_step(&wf, step, &store()).unwrap();
        assert_eq!(a.text, b.text);
        assert_eq!(a.fragments, b.fragments);
    }
}
