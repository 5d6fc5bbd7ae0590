//! The variable bag carried between triggers of one workflow instance.
//!
//! Variables are named, typed values serialized to storage after every
//! committed transition and rehydrated into the next trigger request when the
//! caller supplies none. The representation is a tagged union so the stored
//! form stays language-neutral: `{"kind": "int", "value": 3}` rather than an
//! opaque blob keyed by a runtime type name.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// A single typed variable value.
///
/// # Example
///
/// ```
/// use flowgate::VariableValue;
///
/// let v = VariableValue::Int(3);
/// let json = serde_json::to_value(&v).unwrap();
/// assert_eq!(json["kind"], "int");
/// assert_eq!(json["value"], 3);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum VariableValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Timestamp(#[serde(with = "time::serde::rfc3339")] OffsetDateTime),
    /// Escape hatch for structured values that fit no scalar kind.
    Json(serde_json::Value),
}

impl VariableValue {
    /// The value as a bool, if it is one.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            VariableValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// The value as an integer, if it is one.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            VariableValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// The value as a float, if it is one.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            VariableValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// The value as text, if it is one.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            VariableValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// The value as a timestamp, if it is one.
    pub fn as_timestamp(&self) -> Option<OffsetDateTime> {
        match self {
            VariableValue::Timestamp(t) => Some(*t),
            _ => None,
        }
    }
}

impl From<bool> for VariableValue {
    fn from(v: bool) -> Self {
        VariableValue::Bool(v)
    }
}

impl From<i64> for VariableValue {
    fn from(v: i64) -> Self {
        VariableValue::Int(v)
    }
}

impl From<f64> for VariableValue {
    fn from(v: f64) -> Self {
        VariableValue::Float(v)
    }
}

impl From<&str> for VariableValue {
    fn from(v: &str) -> Self {
        VariableValue::Text(v.to_owned())
    }
}

impl From<String> for VariableValue {
    fn from(v: String) -> Self {
        VariableValue::Text(v)
    }
}

impl From<OffsetDateTime> for VariableValue {
    fn from(v: OffsetDateTime) -> Self {
        VariableValue::Timestamp(v)
    }
}

/// Named variables attached to one workflow instance.
///
/// The bag is replaced wholesale on each committed transition; guards and
/// actions see the merged view the coordinator rehydrates for them. Keys are
/// kept sorted so the serialized form is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VariableBag(BTreeMap<String, VariableValue>);

impl VariableBag {
    /// Create an empty bag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a variable, replacing any previous value under the same name.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<VariableValue>) {
        self.0.insert(name.into(), value.into());
    }

    /// Builder-style [`set`](Self::set).
    pub fn with(mut self, name: impl Into<String>, value: impl Into<VariableValue>) -> Self {
        self.set(name, value);
        self
    }

    /// Look up a variable by name.
    pub fn get(&self, name: &str) -> Option<&VariableValue> {
        self.0.get(name)
    }

    /// Remove a variable, returning its previous value.
    pub fn remove(&mut self, name: &str) -> Option<VariableValue> {
        self.0.remove(name)
    }

    /// Whether the bag holds no variables.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of variables in the bag.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Iterate over `(name, value)` pairs in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &VariableValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Serialize the bag for storage.
    pub fn to_json(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(self)
    }

    /// Rehydrate a bag from its stored form.
    pub fn from_json(value: serde_json::Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }
}

impl<K: Into<String>, V: Into<VariableValue>> FromIterator<(K, V)> for VariableBag {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}
