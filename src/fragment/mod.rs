//! Fragment model for skein.
//!
//! A fragment is a named, reusable block of prompt text: YAML frontmatter
//! carrying structured metadata, followed by a free-text body. Fragments are
//! immutable once loaded.
//!
//! # Fragment File Format
//!
//! Fragments use YAML frontmatter delimited by `---` lines:
//!
//! ```text
//! ---
//! name: phase-implement
//! type: phase
//! inputs:
//!   - name: mission
//!   - name: style
//!     required: false
//!     default: concise
//! outputs:
//!   - name: status
//!     format: json
//! ---
//!
//! Implement the following mission: {{mission}}
//! ```
//!
//! Unknown frontmatter fields are rejected rather than silently ignored, so a
//! typo like `outpts:` fails loudly at load time instead of dropping the
//! declaration.

use crate::error::{Result, SkeinError};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

mod store;

pub use store::FragmentStore;

/// Regex pattern for valid fragment names.
static FRAGMENT_NAME_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9][a-z0-9_-]*$").expect("Invalid fragment name regex"));

/// The role a fragment plays in composition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FragmentType {
    /// A phase prompt: the core instruction body for one workflow step.
    Phase,
    /// A stack prompt: language/toolchain-specific guidance.
    Stack,
    /// A role body: persona and operating rules, always composed first.
    Role,
    /// Project-management guidance, usable in include lists.
    Pm,
    /// Business-context guidance, usable in include lists.
    Biz,
}

impl std::fmt::Display for FragmentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FragmentType::Phase => write!(f, "phase"),
            FragmentType::Stack => write!(f, "stack"),
            FragmentType::Role => write!(f, "role"),
            FragmentType::Pm => write!(f, "pm"),
            FragmentType::Biz => write!(f, "biz"),
        }
    }
}

/// A declared input of a fragment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InputSpec {
    /// Template variable name this input binds.
    pub name: String,

    /// Whether a value must be supplied when no default exists.
    #[serde(default = "default_required")]
    pub required: bool,

    /// Fallback value used when the execution context has no binding.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
}

fn default_required() -> bool {
    true
}

/// A declared output of a fragment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputSpec {
    /// Context key the producing step's result is recorded under.
    pub name: String,

    /// Expected result format (freeform tag, e.g. "json" or "text").
    #[serde(default = "default_format")]
    pub format: String,
}

fn default_format() -> String {
    "text".to_string()
}

/// Fragment frontmatter fields.
///
/// Every field is explicitly typed and unknown fields are denied; loose
/// metadata in prompt files is exactly where typos hide.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FragmentMeta {
    /// Fragment name (e.g., "phase-implement"). Lookup key in the store.
    pub name: String,

    /// The fragment's composition role.
    #[serde(rename = "type")]
    pub fragment_type: FragmentType,

    /// Template variables this fragment's body may reference.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inputs: Vec<InputSpec>,

    /// Context keys a step built on this fragment produces.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub outputs: Vec<OutputSpec>,
}

/// A parsed fragment: metadata plus body text.
#[derive(Debug, Clone)]
pub struct Fragment {
    /// The parsed frontmatter metadata.
    pub meta: FragmentMeta,
    /// The body content (everything after the closing `---`), with
    /// surrounding blank lines trimmed so composition controls spacing.
    pub body: String,
}

impl Fragment {
    /// Parse a fragment from its file content.
    ///
    /// `source` names the fragment in errors before the `name` field is
    /// known (typically the file path).
    ///
    /// # Examples
    ///
    /// ```
    /// use skein::fragment::Fragment;
    ///
    /// let content = "---\nname: phase-qa\ntype: phase\n---\nRun the QA checklist.";
    /// let fragment = Fragment::parse(content, "phase-qa.md").unwrap();
    /// assert_eq!(fragment.meta.name, "phase-qa");
    /// assert_eq!(fragment.body, "Run the QA checklist.");
    /// ```
    pub fn parse(content: &str, source: &str) -> Result<Self> {
        let normalized = content.replace("\r\n", "\n");
        let (frontmatter_yaml, body) = extract_frontmatter(&normalized, source)?;

        let meta: FragmentMeta =
            serde_yaml::from_str(&frontmatter_yaml).map_err(|e| SkeinError::MalformedFragment {
                name: source.to_string(),
                reason: e.to_string(),
            })?;

        validate_meta(&meta, source)?;

        Ok(Self {
            meta,
            body: body.trim_matches('\n').to_string(),
        })
    }

    /// The fragment's lookup name.
    pub fn name(&self) -> &str {
        &self.meta.name
    }

    /// Find a declared input by name.
    pub fn input(&self, name: &str) -> Option<&InputSpec> {
        self.meta.inputs.iter().find(|i| i.name == name)
    }
}

/// Split frontmatter YAML from the body.
fn extract_frontmatter(normalized: &str, source: &str) -> Result<(String, String)> {
    let malformed = |reason: &str| SkeinError::MalformedFragment {
        name: source.to_string(),
        reason: reason.to_string(),
    };

    if !normalized.starts_with("---") {
        return Err(malformed("must start with '---' frontmatter delimiter"));
    }

    let first_newline = normalized
        .find('\n')
        .ok_or_else(|| malformed("frontmatter is incomplete"))?;

    let rest = &normalized[first_newline + 1..];
    let closing_pos = rest
        .find("\n---")
        .ok_or_else(|| malformed("missing closing '---' frontmatter delimiter"))?;

    let frontmatter = rest[..closing_pos + 1].to_string();

    // Body starts after the closing delimiter line.
    let after_delim = &rest[closing_pos + 1..];
    let body = match after_delim.find('\n') {
        Some(nl) => after_delim[nl + 1..].to_string(),
        None => String::new(),
    };

    Ok((frontmatter, body))
}

/// Validate parsed metadata beyond what serde can express.
fn validate_meta(meta: &FragmentMeta, source: &str) -> Result<()> {
    let malformed = |reason: String| SkeinError::MalformedFragment {
        name: source.to_string(),
        reason,
    };

    if !FRAGMENT_NAME_REGEX.is_match(&meta.name) {
        return Err(malformed(format!(
            "invalid name '{}': must be lowercase alphanumeric with '-' or '_'",
            meta.name
        )));
    }

    let mut seen_inputs = Vec::new();
    for input in &meta.inputs {
        if input.name.is_empty() {
            return Err(malformed("field 'inputs': entry with empty name".to_string()));
        }
        if seen_inputs.contains(&&input.name) {
            return Err(malformed(format!(
                "field 'inputs': duplicate input '{}'",
                input.name
            )));
        }
        seen_inputs.push(&input.name);
    }

    let mut seen_outputs = Vec::new();
    for output in &meta.outputs {
        if output.name.is_empty() {
            return Err(malformed(
                "field 'outputs': entry with empty name".to_string(),
            ));
        }
        if seen_outputs.contains(&&output.name) {
            return Err(malformed(format!(
                "field 'outputs': duplicate output '{}'",
                output.name
            )));
        }
        seen_outputs.push(&output.name);
    }

    Ok(())
}
