//! Binding Templates - `{parameter}` substitution
//!
//! A template is compiled once from a raw path such as `out-{id}` or
//! `{Region}/{Zone}` and bound per invocation against trigger binding data.
//!
//! Rules:
//! - Literal text passes through untouched
//! - `{name}` is replaced by the binding data value for `name` (case-insensitive)
//! - A missing value is an error, never an empty substitution
//! - A template without parameters ignores binding data entirely

use std::borrow::Cow;
use std::sync::Arc;

use dashmap::DashMap;

use crate::error::{Result, WeftError};

use super::data::BindingData;

/// Compiled template fragment
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    Parameter(String),
}

/// Compiled `{parameter}` pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingTemplate {
    pattern: String,
    segments: Vec<Segment>,
    /// Unique parameter names in order of first appearance
    parameter_names: Vec<String>,
}

impl BindingTemplate {
    /// Compile a raw pattern
    ///
    /// Fails on unbalanced braces and on empty or invalid parameter names.
    pub fn parse(pattern: &str) -> Result<Self> {
        let malformed = |position: usize, reason: &str| WeftError::MalformedTemplate {
            template: pattern.to_string(),
            position,
            reason: reason.to_string(),
        };

        let mut segments = Vec::new();
        let mut parameter_names: Vec<String> = Vec::new();
        let mut literal = String::new();
        let mut chars = pattern.char_indices();

        while let Some((i, ch)) = chars.next() {
            match ch {
                '{' => {
                    let mut name = String::new();
                    let mut closed = false;
                    for (j, inner) in chars.by_ref() {
                        match inner {
                            '}' => {
                                closed = true;
                                break;
                            }
                            '{' => return Err(malformed(j, "nested '{' inside parameter")),
                            c => name.push(c),
                        }
                    }
                    if !closed {
                        return Err(malformed(i, "missing closing '}'"));
                    }
                    let name = name.trim();
                    if name.is_empty() {
                        return Err(malformed(i, "empty parameter name"));
                    }
                    if !name.chars().all(is_name_char) {
                        return Err(malformed(i, "parameter names may only contain letters, digits, '_', '-' and '.'"));
                    }

                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    if !parameter_names
                        .iter()
                        .any(|existing| existing.eq_ignore_ascii_case(name))
                    {
                        parameter_names.push(name.to_string());
                    }
                    segments.push(Segment::Parameter(name.to_string()));
                }
                '}' => return Err(malformed(i, "unexpected '}' without matching '{'")),
                c => literal.push(c),
            }
        }

        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Ok(Self {
            pattern: pattern.to_string(),
            segments,
            parameter_names,
        })
    }

    /// Raw pattern this template was compiled from
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Parameter names the template requires
    pub fn parameter_names(&self) -> &[String] {
        &self.parameter_names
    }

    pub fn is_parameterized(&self) -> bool {
        !self.parameter_names.is_empty()
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Bind the template against binding data
    ///
    /// Returns `Cow::Borrowed` of the raw pattern when there is nothing to
    /// substitute; `data` is not consulted in that case.
    pub fn bind<'a>(&'a self, data: Option<&BindingData>) -> Result<Cow<'a, str>> {
        if !self.is_parameterized() {
            return Ok(Cow::Borrowed(&self.pattern));
        }

        let mut result = String::with_capacity(self.pattern.len() + 32);
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => result.push_str(text),
                Segment::Parameter(name) => {
                    let value = data.and_then(|d| d.get(name)).ok_or_else(|| {
                        WeftError::MissingBindingData {
                            parameter: name.clone(),
                            template: self.pattern.clone(),
                        }
                    })?;
                    result.push_str(value);
                }
            }
        }

        Ok(Cow::Owned(result))
    }
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '-' | '.')
}

/// Compiled template cache keyed by raw pattern
#[derive(Debug, Default)]
pub struct TemplateCache {
    templates: DashMap<String, Arc<BindingTemplate>>,
}

impl TemplateCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a compiled template, compiling and caching it on first use
    pub fn get_or_parse(&self, pattern: &str) -> Result<Arc<BindingTemplate>> {
        if let Some(cached) = self.templates.get(pattern) {
            return Ok(Arc::clone(&cached));
        }

        let template = Arc::new(BindingTemplate::parse(pattern)?);
        self.templates
            .insert(pattern.to_string(), Arc::clone(&template));
        Ok(template)
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data(pairs: &[(&str, &str)]) -> BindingData {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn parse_collects_parameter_names() {
        let template = BindingTemplate::parse("{Region}/{Zone}/{region}.log").unwrap();
        assert_eq!(template.parameter_names(), &["Region", "Zone"]);
        assert!(template.is_parameterized());
        assert_eq!(template.segments().len(), 6);
    }

    #[test]
    fn bind_substitutes_values() {
        let template = BindingTemplate::parse("out-{id}").unwrap();
        let result = template.bind(Some(&data(&[("id", "42")]))).unwrap();
        assert_eq!(result, "out-42");
        assert!(matches!(result, Cow::Owned(_)));
    }

    #[test]
    fn bind_is_case_insensitive() {
        let template = BindingTemplate::parse("{Region}/{Zone}").unwrap();
        let result = template
            .bind(Some(&data(&[("region", "eu"), ("ZONE", "1")])))
            .unwrap();
        assert_eq!(result, "eu/1");
    }

    #[test]
    fn bind_missing_value_is_error() {
        let template = BindingTemplate::parse("{a}/{b}").unwrap();
        let err = template.bind(Some(&data(&[("a", "x")]))).unwrap_err();
        assert_eq!(err.code(), "WEFT-002");
        assert!(err.to_string().contains("'b'"));
    }

    #[test]
    fn bind_without_data_fails_for_parameterized() {
        let template = BindingTemplate::parse("{a}").unwrap();
        assert!(template.bind(None).is_err());
    }

    #[test]
    fn literal_template_ignores_data() {
        let template = BindingTemplate::parse("samples-output").unwrap();
        assert!(!template.is_parameterized());
        let result = template.bind(None).unwrap();
        assert_eq!(result, "samples-output");
        assert!(matches!(result, Cow::Borrowed(_)));
        let result = template.bind(Some(&data(&[("x", "y")]))).unwrap();
        assert_eq!(result, "samples-output");
    }

    #[test]
    fn bind_is_deterministic() {
        let template = BindingTemplate::parse("a-{x}-{y}-{x}").unwrap();
        let values = data(&[("x", "1"), ("y", "2")]);
        let first = template.bind(Some(&values)).unwrap().into_owned();
        for _ in 0..10 {
            assert_eq!(template.bind(Some(&values)).unwrap(), first);
        }
        assert_eq!(first, "a-1-2-1");
    }

    #[test]
    fn parse_rejects_unclosed_brace() {
        let err = BindingTemplate::parse("out-{id").unwrap_err();
        assert_eq!(err.code(), "WEFT-001");
        assert!(err.to_string().contains("missing closing"));
    }

    #[test]
    fn parse_rejects_stray_closing_brace() {
        let err = BindingTemplate::parse("out-}id").unwrap_err();
        assert!(matches!(err, WeftError::MalformedTemplate { position: 4, .. }));
    }

    #[test]
    fn parse_rejects_empty_name() {
        assert!(BindingTemplate::parse("out-{}").is_err());
        assert!(BindingTemplate::parse("out-{  }").is_err());
    }

    #[test]
    fn parse_rejects_nested_brace() {
        assert!(BindingTemplate::parse("{a{b}}").is_err());
    }

    #[test]
    fn cache_compiles_once() {
        let cache = TemplateCache::new();
        let a = cache.get_or_parse("q-{id}").unwrap();
        let b = cache.get_or_parse("q-{id}").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.len(), 1);
        assert!(cache.get_or_parse("q-{").is_err());
        assert_eq!(cache.len(), 1);
    }
}
