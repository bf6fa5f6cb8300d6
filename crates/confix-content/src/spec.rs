//! Desired-state specifications
//!
//! A [`DesiredStateSpec`] is an explicitly ordered list of entries. Order is
//! significant: missing keys are appended to a target in spec order, so the
//! rendered output is deterministic.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::compare::Comparison;
use crate::document::EntryKey;
use crate::error::{Error, Result};

/// Whether desired entries should be present in or absent from the target
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    #[default]
    Present,
    Absent,
}

/// One desired key/value with its comparison policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DesiredEntry {
    /// Block scope for tagged-block grammars
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    pub key: String,
    /// Desired value. Under [`Intent::Absent`], `null` means "any value".
    pub value: Value,
    #[serde(default)]
    pub comparison: Comparison,
}

impl DesiredEntry {
    pub fn new(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            tag: None,
            key: key.into(),
            value: value.into(),
            comparison: Comparison::Exact,
        }
    }

    pub fn tagged(tag: impl Into<String>, key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            tag: Some(tag.into()),
            ..Self::new(key, value)
        }
    }

    pub fn with_comparison(mut self, comparison: Comparison) -> Self {
        self.comparison = comparison;
        self
    }

    /// The (tag, key) pair this entry is looked up by.
    pub fn entry_key(&self) -> EntryKey {
        EntryKey {
            tag: self.tag.clone(),
            key: self.key.clone(),
        }
    }

    /// The value as it should appear in a text grammar.
    pub fn rendered_value(&self) -> String {
        crate::compare::render_value(&self.value)
    }
}

/// Ordered desired state handed to an editor
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DesiredStateSpec {
    #[serde(default)]
    entries: Vec<DesiredEntry>,
}

impl DesiredStateSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: add an untagged exact-match entry.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.entries.push(DesiredEntry::new(key, value));
        self
    }

    /// Builder: add a prepared entry.
    pub fn with_entry(mut self, entry: DesiredEntry) -> Self {
        self.entries.push(entry);
        self
    }

    pub fn push(&mut self, entry: DesiredEntry) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[DesiredEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// First entry for a (tag, key) pair.
    pub fn get(&self, key: &EntryKey) -> Option<&DesiredEntry> {
        self.entries
            .iter()
            .find(|e| e.tag == key.tag && e.key == key.key)
    }

    /// Build a spec from a plain mapping such as
    /// `{"ClientAliveInterval": 900, "MaxAuthTries": {"value": 4, "compare": "at_most"}}`.
    ///
    /// Mapping order becomes spec order. A nested object whose only keys are
    /// `value` and optionally `compare` sets a comparison policy; any other
    /// nested object is kept as a value (profile option trees).
    pub fn from_mapping(mapping: &Value) -> Result<Self> {
        let object = mapping.as_object().ok_or_else(|| Error::InvalidSpec {
            message: format!("expected a mapping, got {}", type_name(mapping)),
        })?;

        let mut spec = Self::new();
        for (key, value) in object {
            spec.push(entry_from_value(None, key, value)?);
        }
        Ok(spec)
    }

    /// Build a spec for tagged-block grammars from `{tag: {key: value}}`.
    ///
    /// Scalars at the top level are untagged entries.
    pub fn from_tagged_mapping(mapping: &Value) -> Result<Self> {
        let object = mapping.as_object().ok_or_else(|| Error::InvalidSpec {
            message: format!("expected a mapping, got {}", type_name(mapping)),
        })?;

        let mut spec = Self::new();
        for (tag, block) in object {
            match block.as_object() {
                Some(keys) if !is_policy_wrapper(block) => {
                    for (key, value) in keys {
                        spec.push(entry_from_value(Some(tag.clone()), key, value)?);
                    }
                }
                _ => spec.push(entry_from_value(None, tag, block)?),
            }
        }
        Ok(spec)
    }
}

fn is_policy_wrapper(value: &Value) -> bool {
    value.as_object().is_some_and(|obj| {
        obj.contains_key("value") && obj.keys().all(|k| k == "value" || k == "compare")
    })
}

fn entry_from_value(tag: Option<String>, key: &str, value: &Value) -> Result<DesiredEntry> {
    if key.trim().is_empty() {
        return Err(Error::InvalidSpec {
            message: "empty key".to_string(),
        });
    }

    let (value, comparison) = if is_policy_wrapper(value) {
        let comparison = match value.get("compare") {
            Some(c) => serde_json::from_value(c.clone()).map_err(|e| Error::InvalidSpec {
                message: format!("key {key}: {e}"),
            })?,
            None => Comparison::Exact,
        };
        (value["value"].clone(), comparison)
    } else {
        (value.clone(), Comparison::Exact)
    };

    Ok(DesiredEntry {
        tag,
        key: key.to_string(),
        value,
        comparison,
    })
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
