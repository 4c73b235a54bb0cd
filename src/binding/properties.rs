//! Binding Properties - strict accessors over declared JSON properties
//!
//! function.json authors write keys in any case (`queueName`, `QueueName`),
//! so lookups here are case-insensitive. Accessors never coerce: asking
//! for a string where the metadata holds a number is a `DataFormat` error.

use serde_json::{Map, Value};

use crate::error::{Result, WeftError};

/// Case-insensitive, strictly typed view over a binding's raw properties
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BindingProperties {
    raw: Map<String, Value>,
}

impl BindingProperties {
    pub fn new(raw: Map<String, Value>) -> Self {
        Self { raw }
    }

    /// Raw value for a key (case-insensitive)
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.raw.get(key).or_else(|| {
            self.raw
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(key))
                .map(|(_, v)| v)
        })
    }

    /// Non-null raw value for a key
    pub fn get_non_null(&self, key: &str) -> Option<&Value> {
        self.get(key).filter(|v| !v.is_null())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn str(&self, key: &str) -> Result<Option<&str>> {
        match self.get_non_null(key) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s)),
            Some(other) => Err(mismatch(key, "string", other)),
        }
    }

    pub fn bool(&self, key: &str) -> Result<Option<bool>> {
        match self.get_non_null(key) {
            None => Ok(None),
            Some(Value::Bool(b)) => Ok(Some(*b)),
            Some(other) => Err(mismatch(key, "bool", other)),
        }
    }

    pub fn i64(&self, key: &str) -> Result<Option<i64>> {
        match self.get_non_null(key) {
            None => Ok(None),
            Some(Value::Number(n)) => n
                .as_i64()
                .map(Some)
                .ok_or_else(|| mismatch(key, "integer", &Value::Number(n.clone()))),
            Some(other) => Err(mismatch(key, "integer", other)),
        }
    }

    pub fn f64(&self, key: &str) -> Result<Option<f64>> {
        match self.get_non_null(key) {
            None => Ok(None),
            Some(Value::Number(n)) => Ok(n.as_f64()),
            Some(other) => Err(mismatch(key, "number", other)),
        }
    }

    pub fn array(&self, key: &str) -> Result<Option<&Vec<Value>>> {
        match self.get_non_null(key) {
            None => Ok(None),
            Some(Value::Array(items)) => Ok(Some(items)),
            Some(other) => Err(mismatch(key, "array", other)),
        }
    }

    pub fn object(&self, key: &str) -> Result<Option<&Map<String, Value>>> {
        match self.get_non_null(key) {
            None => Ok(None),
            Some(Value::Object(map)) => Ok(Some(map)),
            Some(other) => Err(mismatch(key, "object", other)),
        }
    }

    /// Array of strings (e.g. http `methods`)
    pub fn string_list(&self, key: &str) -> Result<Option<Vec<String>>> {
        let Some(items) = self.array(key)? else {
            return Ok(None);
        };
        items
            .iter()
            .map(|item| match item {
                Value::String(s) => Ok(s.clone()),
                other => Err(mismatch(key, "array of strings", other)),
            })
            .collect::<Result<Vec<_>>>()
            .map(Some)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.raw.iter()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.raw
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.raw
    }
}

impl From<Map<String, Value>> for BindingProperties {
    fn from(raw: Map<String, Value>) -> Self {
        Self::new(raw)
    }
}

/// Name of a JSON value's kind for diagnostics
pub fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn mismatch(key: &str, expected: &str, actual: &Value) -> WeftError {
    WeftError::data_format(format!(
        "property '{}' expected {}, got {}",
        key,
        expected,
        value_kind(actual)
    ))
}
