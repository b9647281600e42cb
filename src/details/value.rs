//! Recursive value type for lease details and deltas

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// A structured detail value.
///
/// Mappings recurse during a merge; every other variant (including
/// sequences) is replaced wholesale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DetailValue {
    Null,
    Bool(bool),
    Int(i64),
    /// Integers above `i64::MAX`, kept exact rather than widened to a float
    UInt(u64),
    Float(f64),
    String(String),
    Array(Vec<DetailValue>),
    Object(Details),
}

/// A mapping of detail keys to values, ordered by key.
pub type Details = BTreeMap<String, DetailValue>;

impl DetailValue {
    /// True if this value is a mapping (the only variant a merge recurses into).
    pub fn is_object(&self) -> bool {
        matches!(self, Self::Object(_))
    }

    pub fn as_object(&self) -> Option<&Details> {
        match self {
            Self::Object(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            _ => None,
        }
    }
}

impl From<serde_json::Value> for DetailValue {
    fn from(value: serde_json::Value) -> Self {
        use serde_json::Value;
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(b),
            Value::Number(n) => match (n.as_i64(), n.as_u64()) {
                (Some(i), _) => Self::Int(i),
                (None, Some(u)) => Self::UInt(u),
                (None, None) => Self::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(s) => Self::String(s),
            Value::Array(items) => Self::Array(items.into_iter().map(Self::from).collect()),
            Value::Object(map) => Self::Object(
                map.into_iter()
                    .map(|(k, v)| (k, Self::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<&str> for DetailValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for DetailValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<i64> for DetailValue {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<f64> for DetailValue {
    fn from(n: f64) -> Self {
        Self::Float(n)
    }
}

impl From<bool> for DetailValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<Details> for DetailValue {
    fn from(map: Details) -> Self {
        Self::Object(map)
    }
}

/// Errors from reading a details mapping out of client input
#[derive(Debug, Error)]
pub enum DetailsError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("expected a JSON object, found {0}")]
    NotAMapping(&'static str),
}

fn kind_of(value: &serde_json::Value) -> &'static str {
    use serde_json::Value;
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Convert an already-parsed JSON value into a details mapping.
///
/// A JSON string whose content is itself a JSON object is unwrapped once,
/// so stringified deltas are accepted too.
pub fn details_from_json(value: serde_json::Value) -> Result<Details, DetailsError> {
    match value {
        serde_json::Value::Object(map) => Ok(map
            .into_iter()
            .map(|(k, v)| (k, DetailValue::from(v)))
            .collect()),
        serde_json::Value::String(inner) => {
            let parsed: serde_json::Value = serde_json::from_str(&inner)?;
            match parsed {
                serde_json::Value::Object(_) => details_from_json(parsed),
                other => Err(DetailsError::NotAMapping(kind_of(&other))),
            }
        }
        other => Err(DetailsError::NotAMapping(kind_of(&other))),
    }
}

/// Parse a details mapping from JSON text.
pub fn details_from_str(text: &str) -> Result<Details, DetailsError> {
    let value: serde_json::Value = serde_json::from_str(text)?;
    details_from_json(value)
}
