//! Trade records: sparse maps from variable display name to loosely typed value.

use crate::domain::formula_eval::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub type TradeId = i64;

/// A stored field value. A missing key means "not filled in yet".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Bool(bool),
    Number(f64),
    Text(String),
    Tags(Vec<String>),
}

impl FieldValue {
    /// Plain-text rendering, as written to CSV and shown in listings.
    pub fn to_text(&self) -> String {
        match self {
            FieldValue::Bool(b) => b.to_string(),
            FieldValue::Number(n) => n.to_string(),
            FieldValue::Text(s) => s.clone(),
            FieldValue::Tags(tags) => tags.join(", "),
        }
    }
}

impl From<f64> for FieldValue {
    fn from(n: f64) -> Self {
        FieldValue::Number(n)
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_string())
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        FieldValue::Bool(b)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TradeRecord {
    pub id: TradeId,
    pub fields: BTreeMap<String, FieldValue>,
}

impl TradeRecord {
    pub fn new(id: TradeId) -> Self {
        Self {
            id,
            fields: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, name: &str, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(name.to_string(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    pub fn set(&mut self, name: &str, value: FieldValue) {
        self.fields.insert(name.to_string(), value);
    }

    pub fn remove(&mut self, name: &str) -> Option<FieldValue> {
        self.fields.remove(name)
    }

    /// Move the value stored under `old` to `new`. Returns false when the
    /// trade has no `old` key. An existing `new` key is overwritten.
    pub fn rename_field(&mut self, old: &str, new: &str) -> bool {
        match self.fields.remove(old) {
            Some(value) => {
                self.fields.insert(new.to_string(), value);
                true
            }
            None => false,
        }
    }
}

/// Convert an evaluation result to its stored form: finite numbers rounded
/// to two decimals, booleans as `"TRUE"`/`"FALSE"`, text unchanged, anything
/// without a finite value as `"N/A"`.
pub fn coerce_for_storage(value: &Value) -> FieldValue {
    match value {
        Value::Number(n) if n.is_finite() => {
            let rounded = (n * 100.0).round() / 100.0;
            FieldValue::Number(if rounded == 0.0 { 0.0 } else { rounded })
        }
        Value::Number(_) => FieldValue::Text("N/A".to_string()),
        Value::Text(s) => FieldValue::Text(s.clone()),
        Value::Bool(true) => FieldValue::Text("TRUE".to_string()),
        Value::Bool(false) => FieldValue::Text("FALSE".to_string()),
    }
}
