//! Step gate expressions.
//!
//! Conditions are a deliberately narrow grammar over prior step outputs:
//!
//! ```text
//! qa.status == "pass"
//! qa.findings.count != 0
//! security-review.approved
//! ```
//!
//! The first path segment names a step; remaining segments index into that
//! step's recorded JSON output. A bare path is tested for truthiness.
//! Conditions are parsed at workflow load time so syntax errors surface
//! before any agent runs, and the referenced step is checked against the
//! gated step's dependency closure.

use crate::error::{Result, SkeinError};
use serde_json::Value;
use std::collections::HashMap;

/// Comparison applied to the resolved path value.
#[derive(Debug, Clone, PartialEq)]
pub enum Comparison {
    /// Bare path: true unless the value is absent, null, false, or "".
    Truthy,
    /// Path value equals the literal.
    Eq(Value),
    /// Path value does not equal the literal.
    Ne(Value),
}

/// A parsed condition expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    /// The step whose output the condition reads.
    pub step: String,
    /// Path into that step's JSON output (may be empty: whole output).
    pub path: Vec<String>,
    /// The comparison to apply.
    pub comparison: Comparison,
    /// Original expression text, kept for error messages.
    pub raw: String,
}

impl Condition {
    /// Parse a condition expression.
    ///
    /// `owner` is the step carrying the condition, used in error messages.
    pub fn parse(expr: &str, owner: &str) -> Result<Self> {
        let invalid = |reason: &str| {
            SkeinError::UserError(format!(
                "step '{}': invalid condition '{}': {}",
                owner, expr, reason
            ))
        };

        let expr = expr.trim();
        if expr.is_empty() {
            return Err(invalid("empty expression"));
        }

        let (path_part, comparison) = if let Some((lhs, rhs)) = expr.split_once("==") {
            (lhs.trim(), Comparison::Eq(parse_literal(rhs.trim(), owner, expr)?))
        } else if let Some((lhs, rhs)) = expr.split_once("!=") {
            (lhs.trim(), Comparison::Ne(parse_literal(rhs.trim(), owner, expr)?))
        } else {
            (expr, Comparison::Truthy)
        };

        let mut segments = path_part.split('.');
        let step = segments
            .next()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| invalid("missing step reference"))?
            .to_string();

        let mut path = Vec::new();
        for segment in segments {
            if segment.is_empty() {
                return Err(invalid("empty path segment"));
            }
            path.push(segment.to_string());
        }

        if step.contains(char::is_whitespace) {
            return Err(invalid("step reference contains whitespace"));
        }

        Ok(Self {
            step,
            path,
            comparison,
            raw: expr.to_string(),
        })
    }

    /// Evaluate against recorded step outputs.
    ///
    /// A missing step output or path resolves to null, which compares as
    /// not-equal to any literal and is falsy.
    pub fn evaluate(&self, outputs: &HashMap<String, Value>) -> bool {
        let resolved = outputs
            .get(&self.step)
            .map(|output| walk(output, &self.path))
            .unwrap_or(Value::Null);

        match &self.comparison {
            Comparison::Truthy => is_truthy(&resolved),
            Comparison::Eq(literal) => &resolved == literal,
            Comparison::Ne(literal) => &resolved != literal,
        }
    }
}

/// Walk a dot path into a JSON value. Missing keys resolve to null.
fn walk(value: &Value, path: &[String]) -> Value {
    let mut current = value;
    for segment in path {
        match current.get(segment) {
            Some(next) => current = next,
            None => return Value::Null,
        }
    }
    current.clone()
}

/// Absent, null, false, and empty string gate to false; everything else
/// (including 0) passes.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::String(s) => !s.is_empty(),
        _ => true,
    }
}

/// Parse a comparison literal: quoted string, number, or boolean.
fn parse_literal(raw: &str, owner: &str, expr: &str) -> Result<Value> {
    let invalid = |reason: &str| {
        SkeinError::UserError(format!(
            "step '{}': invalid condition '{}': {}",
            owner, expr, reason
        ))
    };

    if raw.is_empty() {
        return Err(invalid("missing comparison literal"));
    }

    if let Some(inner) = raw
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
    {
        if inner.contains('"') {
            return Err(invalid("string literal contains an embedded quote"));
        }
        return Ok(Value::String(inner.to_string()));
    }

    match raw {
        "true" => return Ok(Value::Bool(true)),
        "false" => return Ok(Value::Bool(false)),
        _ => {}
    }

    if let Ok(n) = raw.parse::<i64>() {
        return Ok(Value::Number(n.into()));
    }

    Err(invalid(
        "comparison literal must be a quoted string, integer, or boolean",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn outputs(pairs: &[(&str, Value)]) -> HashMap<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_parse_equality() {
        let cond = Condition::parse(r#"qa.status == "pass""#, "deploy").unwrap();
        assert_eq!(cond.step, "qa");
        assert_eq!(cond.path, vec!["status".to_string()]);
        assert_eq!(cond.comparison, Comparison::Eq(json!("pass")));
    }

    #[test]
    fn test_parse_inequality_with_number() {
        let cond = Condition::parse("qa.findings != 0", "deploy").unwrap();
        assert_eq!(cond.comparison, Comparison::Ne(json!(0)));
    }

    #[test]
    fn test_parse_bare_path_is_truthy() {
        let cond = Condition::parse("security-review.approved", "merge").unwrap();
        assert_eq!(cond.step, "security-review");
        assert_eq!(cond.comparison, Comparison::Truthy);
    }

    #[test]
    fn test_parse_bare_step_reads_whole_output() {
        let cond = Condition::parse("qa", "deploy").unwrap();
        assert!(cond.path.is_empty());
    }

    #[test]
    fn test_parse_rejects_bad_syntax() {
        assert!(Condition::parse("", "s").is_err());
        assert!(Condition::parse("qa..status", "s").is_err());
        assert!(Condition::parse("qa.status ==", "s").is_err());
        assert!(Condition::parse("qa.status == unquoted", "s").is_err());
        assert!(Condition::parse(r#"qa status == "x""#, "s").is_err());
    }

    #[test]
    fn test_evaluate_equality() {
        let cond = Condition::parse(r#"qa.status == "pass""#, "deploy").unwrap();
        assert!(cond.evaluate(&outputs(&[("qa", json!({"status": "pass"}))])));
        assert!(!cond.evaluate(&outputs(&[("qa", json!({"status": "fail"}))])));
    }

    #[test]
    fn test_evaluate_missing_output_is_null() {
        let cond = Condition::parse(r#"qa.status == "pass""#, "deploy").unwrap();
        assert!(!cond.evaluate(&outputs(&[])));

        // Null never equals a literal, and != is its complement.
        let cond = Condition::parse(r#"qa.status != "pass""#, "deploy").unwrap();
        assert!(cond.evaluate(&outputs(&[])));
    }

    #[test]
    fn test_evaluate_nested_path() {
        let cond = Condition::parse("qa.report.blocking != 0", "deploy").unwrap();
        assert!(cond.evaluate(&outputs(&[("qa", json!({"report": {"blocking": 2}}))])));
        assert!(!cond.evaluate(&outputs(&[("qa", json!({"report": {"blocking": 0}}))])));
    }

    #[test]
    fn test_evaluate_truthiness() {
        let cond = Condition::parse("qa.approved", "merge").unwrap();
        assert!(cond.evaluate(&outputs(&[("qa", json!({"approved": true}))])));
        assert!(!cond.evaluate(&outputs(&[("qa", json!({"approved": false}))])));
        assert!(!cond.evaluate(&outputs(&[("qa", json!({"approved": null}))])));
        assert!(!cond.evaluate(&outputs(&[("qa", json!({"approved": ""}))])));
        assert!(cond.evaluate(&outputs(&[("qa", json!({"approved": "yes"}))])));
        assert!(!cond.evaluate(&outputs(&[])));
    }

    #[test]
    fn test_evaluate_whole_output_string() {
        let cond = Condition::parse(r#"qa == "ok""#, "deploy").unwrap();
        assert!(cond.evaluate(&outputs(&[("qa", json!("ok"))])));
        assert!(!cond.evaluate(&outputs(&[("qa", json!("not ok"))])));
    }
}
