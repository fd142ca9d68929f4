//! Template resolver for `{{name}}` placeholder substitution.
//!
//! Composed prompt bodies reference execution-context values with
//! double-brace placeholders. Resolution is a single pass: a substituted
//! value is never re-scanned, so a value containing `{{...}}` cannot trigger
//! further expansion. This rules out expansion loops and prompt injection
//! through step outputs.
//!
//! # Syntax
//!
//! - `{{name}}` - substitutes the value bound to `name`
//! - a lone `{` or `}` is literal text
//!
//! # Error Handling
//!
//! Undefined variables are an error rather than a silent empty substitution,
//! so typos in placeholder names surface immediately. The same scanner backs
//! [`placeholders`], which load-time validation uses to cross-check declared
//! workflow inputs against the placeholders actually present.

use std::collections::HashMap;
use std::fmt;

/// Error type for template scanning and rendering failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateError {
    /// A placeholder was referenced but no value is bound to it.
    UndefinedVariable {
        /// The name of the undefined variable.
        name: String,
        /// Byte position of the opening `{{`.
        position: usize,
    },
    /// A `{{` was found without a closing `}}`.
    UnmatchedBraces {
        /// Byte position of the unclosed `{{`.
        position: usize,
    },
    /// An empty placeholder (`{{}}` or `{{  }}`) was found.
    EmptyPlaceholder {
        /// Byte position of the empty placeholder.
        position: usize,
    },
}

impl fmt::Display for TemplateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TemplateError::UndefinedVariable { name, position } => {
                write!(
                    f,
                    "undefined variable '{}' at position {} in template",
                    name, position
                )
            }
            TemplateError::UnmatchedBraces { position } => {
                write!(
                    f,
                    "unmatched '{{{{' at position {} in template",
                    position
                )
            }
            TemplateError::EmptyPlaceholder { position } => {
                write!(f, "empty placeholder at position {} in template", position)
            }
        }
    }
}

impl std::error::Error for TemplateError {}

/// One scanned piece of a template: literal text or a placeholder name.
enum Piece<'a> {
    Literal(&'a str),
    Placeholder { name: String, position: usize },
}

/// Scan a template into literal and placeholder pieces.
///
/// Shared by [`render`] and [`placeholders`] so both agree on syntax.
fn scan(template: &str) -> Result<Vec<Piece<'_>>, TemplateError> {
    let mut pieces = Vec::new();
    let mut rest = template;
    let mut offset = 0;

    while let Some(open) = rest.find("{{") {
        if open > 0 {
            pieces.push(Piece::Literal(&rest[..open]));
        }

        let after_open = &rest[open + 2..];
        let close = after_open
            .find("}}")
            .ok_or(TemplateError::UnmatchedBraces {
                position: offset + open,
            })?;

        let raw_name = &after_open[..close];
        let name = raw_name.trim();
        if name.is_empty() {
            return Err(TemplateError::EmptyPlaceholder {
                position: offset + open,
            });
        }

        pieces.push(Piece::Placeholder {
            name: name.to_string(),
            position: offset + open,
        });

        let consumed = open + 2 + close + 2;
        offset += consumed;
        rest = &rest[consumed..];
    }

    if !rest.is_empty() {
        pieces.push(Piece::Literal(rest));
    }

    Ok(pieces)
}

/// Render a template by substituting every `{{name}}` placeholder.
///
/// Pure function of (template, variables): rendering the same inputs twice
/// yields identical output.
///
/// # Examples
///
/// ```
/// use std::collections::HashMap;
/// use skein::template::render;
///
/// let mut vars = HashMap::new();
/// vars.insert("mission".to_string(), "ship v1".to_string());
///
/// let out = render("Mission: {{mission}}", &vars).unwrap();
/// assert_eq!(out, "Mission: ship v1");
/// ```
pub fn render(
    template: &str,
    variables: &HashMap<String, String>,
) -> Result<String, TemplateError> {
    let pieces = scan(template)?;
    let mut result = String::with_capacity(template.len());

    for piece in pieces {
        match piece {
            Piece::Literal(text) => result.push_str(text),
            Piece::Placeholder { name, position } => match variables.get(&name) {
                Some(value) => result.push_str(value),
                None => {
                    return Err(TemplateError::UndefinedVariable { name, position });
                }
            },
        }
    }

    Ok(result)
}

/// List placeholder names referenced by a template, in first-occurrence
/// order, deduplicated.
///
/// Used by load-time validation to check every placeholder in a composed
/// prompt against the workflow's declared inputs before any step runs.
pub fn placeholders(template: &str) -> Result<Vec<String>, TemplateError> {
    let pieces = scan(template)?;
    let mut names = Vec::new();

    for piece in pieces {
        if let Piece::Placeholder { name, .. } = piece
            && !names.contains(&name)
        {
            names.push(name);
        }
    }

    Ok(names)
}

/// Helper to create a variables map from a list of key-value pairs.
pub fn vars<I, K, V>(pairs: I) -> HashMap<String, String>
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}
