//! Value comparison policies
//!
//! Text grammars observe every value as a string, so comparisons work on the
//! textual form and fall back to numeric or boolean readings when the policy
//! asks for them. Store grammars hand over typed values, which take the same
//! path after [`render_value`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// How an observed value is checked against a desired one
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparison {
    /// Equal after collapsing whitespace runs; numbers compare numerically
    #[default]
    Exact,
    /// Observed number must be >= desired
    AtLeast,
    /// Observed number must be <= desired
    AtMost,
    /// Both sides read as booleans (`yes/no/true/false/on/off/1/0`)
    Boolean,
}

impl Comparison {
    /// Whether `observed` satisfies `desired` under this policy.
    ///
    /// Objects are matched as subsets: every desired key must be present in
    /// the observed object and satisfy the policy recursively. Arrays must
    /// contain a satisfying element for each desired element.
    pub fn satisfies(&self, observed: &Value, desired: &Value) -> bool {
        match (observed, desired) {
            (Value::Object(have), Value::Object(want)) => want.iter().all(|(key, value)| {
                have.get(key)
                    .is_some_and(|found| self.satisfies(found, value))
            }),
            (Value::Array(have), Value::Array(want)) => want
                .iter()
                .all(|value| have.iter().any(|found| self.satisfies(found, value))),
            (Value::Object(_) | Value::Array(_), _) | (_, Value::Object(_) | Value::Array(_)) => {
                false
            }
            _ => self.satisfies_text(&render_value(observed), desired),
        }
    }

    /// Text-grammar form of [`Comparison::satisfies`].
    pub fn satisfies_text(&self, observed: &str, desired: &Value) -> bool {
        let wanted = render_value(desired);
        match self {
            Self::Exact => {
                if normalize_whitespace(observed) == normalize_whitespace(&wanted) {
                    return true;
                }
                // A typed desired number matches `900` and `900.0` alike
                desired.is_number()
                    && matches!(
                        (parse_number(observed), parse_number(&wanted)),
                        (Some(a), Some(b)) if a == b
                    )
            }
            Self::AtLeast => match (parse_number(observed), parse_number(&wanted)) {
                (Some(have), Some(want)) => have >= want,
                _ => false,
            },
            Self::AtMost => match (parse_number(observed), parse_number(&wanted)) {
                (Some(have), Some(want)) => have <= want,
                _ => false,
            },
            Self::Boolean => match (parse_bool(observed), parse_bool(&wanted)) {
                (Some(have), Some(want)) => have == want,
                _ => false,
            },
        }
    }
}

/// Render a desired value the way it appears in a text grammar.
pub fn render_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

/// Collapse interior whitespace runs to a single space and trim the ends.
pub fn normalize_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Read a boolean in any of the spellings configuration files use.
pub fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "yes" | "true" | "on" | "1" => Some(true),
        "no" | "false" | "off" | "0" => Some(false),
        _ => None,
    }
}

/// Read a finite decimal number. Rejects `inf`, `nan` and friends.
pub fn parse_number(value: &str) -> Option<f64> {
    let trimmed = value.trim();
    let first = trimmed.trim_start_matches(['-', '+']).chars().next()?;
    if !first.is_ascii_digit() && first != '.' {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|n| n.is_finite())
}
