//! Binding Data - trigger-supplied parameter values
//!
//! Binding data is the `name -> value` bag a trigger hands to the rest of
//! the function's bindings (`{id}`, `{name}`, `{Region}`...). Keys compare
//! case-insensitively, matching how function.json authors write them.

use std::collections::HashMap;

use serde_json::{Map, Value};

/// Case-insensitive `name -> value` map of template parameters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BindingData {
    /// lowercase key -> (original key, value)
    entries: HashMap<String, (String, String)>,
}

impl BindingData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value, replacing any entry whose key differs only by case
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        self.entries
            .insert(key.to_lowercase(), (key, value.into()));
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .get(&key.to_lowercase())
            .map(|(_, value)| value.as_str())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(&key.to_lowercase())
    }

    /// Merge another bag into this one (other wins on conflicts)
    pub fn merge(&mut self, other: BindingData) {
        self.entries.extend(other.entries);
    }

    /// Merge another bag, keeping existing entries on conflicts
    pub fn merge_missing(&mut self, other: BindingData) {
        for (lower, entry) in other.entries {
            self.entries.entry(lower).or_insert(entry);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate (original key, value) pairs
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .values()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }

    /// Snapshot as a JSON object (used for event logging)
    pub fn to_value(&self) -> Value {
        let map: Map<String, Value> = self
            .iter()
            .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
            .collect();
        Value::Object(map)
    }
}

impl FromIterator<(String, String)> for BindingData {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        let mut data = Self::new();
        for (key, value) in iter {
            data.insert(key, value);
        }
        data
    }
}

/// Convert structured trigger data into template parameters
///
/// Strings pass through and integers render in decimal. Every other
/// value kind (floats, bools, null, objects, arrays) has no path-safe
/// rendering and is skipped.
pub fn binding_data_parameters(values: &Map<String, Value>) -> BindingData {
    let mut data = BindingData::new();
    for (key, value) in values {
        let rendered = match value {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) if n.is_i64() || n.is_u64() => Some(n.to_string()),
            _ => None,
        };
        if let Some(rendered) = rendered {
            data.insert(key.clone(), rendered);
        }
    }
    data
}

/// Match a concrete path against a `{parameter}` pattern and capture values
///
/// The first path segment (container) must match case-insensitively.
/// Parameters are matched right-to-left, each one extending back to the
/// literal character that precedes it in the pattern.
///
/// Example: `input/{name}.{ext}` vs `input/photo.png` → `{name: photo, ext: png}`
pub fn extract_binding_data(pattern: &str, actual: &str) -> Option<BindingData> {
    match (pattern.split_once('/'), actual.split_once('/')) {
        (Some((pattern_container, pattern_rest)), Some((actual_container, actual_rest))) => {
            if !pattern_container.eq_ignore_ascii_case(actual_container) {
                return None;
            }
            match_reverse(pattern_rest, actual_rest)
        }
        (None, None) => match_reverse(pattern, actual),
        (None, Some((actual_container, _))) => {
            // Container-only pattern matches every path inside the container
            pattern
                .eq_ignore_ascii_case(actual_container)
                .then(BindingData::new)
        }
        (Some(_), None) => None,
    }
}

fn match_reverse(pattern: &str, actual: &str) -> Option<BindingData> {
    let pattern: Vec<char> = pattern.chars().collect();
    let actual: Vec<char> = actual.chars().collect();
    let mut data = BindingData::new();

    let mut ip = pattern.len() as isize - 1;
    let mut ia = actual.len() as isize - 1;

    while ip >= 0 && ia >= 0 {
        let ch = pattern[ip as usize];
        if ch == '}' {
            let start = pattern[..ip as usize].iter().rposition(|c| *c == '{')?;
            let name: String = pattern[start + 1..ip as usize].iter().collect();

            if start == 0 {
                // Leading parameter takes the rest of the path
                let value: String = actual[..=ia as usize].iter().collect();
                data.insert(name, value);
                return Some(data);
            }

            let delimiter = pattern[start - 1];
            let actual_start = actual[..=ia as usize]
                .iter()
                .rposition(|c| *c == delimiter)?;
            let value: String = actual[actual_start + 1..=ia as usize].iter().collect();
            data.insert(name, value);

            ip = start as isize - 1;
            ia = actual_start as isize;
        } else if ch == actual[ia as usize] {
            ip -= 1;
            ia -= 1;
        } else {
            return None;
        }
    }

    (ip == ia).then_some(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn keys_are_case_insensitive() {
        let mut data = BindingData::new();
        data.insert("Region", "eu");
        assert_eq!(data.get("region"), Some("eu"));
        assert_eq!(data.get("REGION"), Some("eu"));
        data.insert("REGION", "us");
        assert_eq!(data.len(), 1);
        assert_eq!(data.get("Region"), Some("us"));
    }

    #[test]
    fn parameters_skip_unrenderable_values() {
        let values = json!({
            "id": 42,
            "name": "photo",
            "ratio": 0.5,
            "flag": true,
            "nested": {"a": 1},
            "missing": null
        });
        let data = binding_data_parameters(values.as_object().unwrap());
        assert_eq!(data.get("id"), Some("42"));
        assert_eq!(data.get("name"), Some("photo"));
        assert_eq!(data.len(), 2);
    }

    #[test]
    fn extract_name_and_extension() {
        let data = extract_binding_data("input/{name}.{ext}", "input/photo.png").unwrap();
        assert_eq!(data.get("name"), Some("photo"));
        assert_eq!(data.get("ext"), Some("png"));
    }

    #[test]
    fn extract_leading_parameter_takes_rest() {
        let data = extract_binding_data("input/{name}", "input/a/b/c.txt").unwrap();
        assert_eq!(data.get("name"), Some("a/b/c.txt"));
    }

    #[test]
    fn extract_container_mismatch() {
        assert!(extract_binding_data("input/{name}", "output/photo.png").is_none());
    }

    #[test]
    fn extract_container_is_case_insensitive() {
        assert!(extract_binding_data("Input/{name}", "input/x").is_some());
    }

    #[test]
    fn extract_literal_mismatch() {
        assert!(extract_binding_data("input/{name}.png", "input/photo.jpg").is_none());
    }

    #[test]
    fn extract_container_only_pattern() {
        let data = extract_binding_data("input", "input/photo.png").unwrap();
        assert!(data.is_empty());
    }

    #[test]
    fn extract_literal_paths() {
        assert!(extract_binding_data("input/a.txt", "input/a.txt").is_some());
        assert!(extract_binding_data("input/a.txt", "input/ba.txt").is_none());
    }

    #[test]
    fn extract_multiple_segments() {
        let data =
            extract_binding_data("logs/{year}/{month}/{file}.log", "logs/2024/05/app.log").unwrap();
        assert_eq!(data.get("year"), Some("2024"));
        assert_eq!(data.get("month"), Some("05"));
        assert_eq!(data.get("file"), Some("app"));
    }
}
