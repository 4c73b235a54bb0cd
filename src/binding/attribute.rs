//! Attribute Resolution - declared properties → attribute descriptor
//!
//! Each binding kind registers an [`AttributeShape`]: an ordered list of
//! constructors (required fields) plus optional named properties. Resolving
//! a declaration picks the longest constructor whose parameters are all
//! present (non-null, case-insensitive), then fills the named properties.
//!
//! ```text
//! shape:  (a) | (a, b) | (a, b, c)
//! {a, b, c} → (a, b, c)
//! {a, b}    → (a, b)
//! {a}       → (a)
//! {}        → AmbiguousOrMissingConstructor
//! ```
//!
//! Ties on parameter count go to the constructor declared first.

use serde_json::{Map, Value};

use crate::convert::ElementKind;
use crate::error::{Result, WeftError};

use super::properties::BindingProperties;

/// Optional named property of a shape
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertySpec {
    pub name: String,
    /// Nullable-wrapped properties are never populated from metadata
    pub nullable: bool,
}

/// Where an output binding sends its value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkKind {
    /// Batch-capable sink fed item by item (`queue`, `table`...)
    Collector,
    /// One value per invocation (`blob`, `http`...)
    Single,
}

/// Declarative description of a binding attribute
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeShape {
    /// Binding `type` discriminator this shape serves
    pub binding_type: String,
    /// Attribute name used in diagnostics (`QueueAttribute`)
    pub attribute: String,
    constructors: Vec<Vec<String>>,
    properties: Vec<PropertySpec>,
    pub element_kind: ElementKind,
    pub sink: SinkKind,
}

impl AttributeShape {
    pub fn new(binding_type: impl Into<String>, attribute: impl Into<String>) -> Self {
        Self {
            binding_type: binding_type.into(),
            attribute: attribute.into(),
            constructors: Vec::new(),
            properties: Vec::new(),
            element_kind: ElementKind::String,
            sink: SinkKind::Single,
        }
    }

    /// Add a constructor; declaration order is the tie-break order
    pub fn constructor(mut self, params: &[&str]) -> Self {
        self.constructors
            .push(params.iter().map(|p| p.to_string()).collect());
        self
    }

    pub fn property(mut self, name: &str) -> Self {
        self.properties.push(PropertySpec {
            name: name.to_string(),
            nullable: false,
        });
        self
    }

    pub fn nullable_property(mut self, name: &str) -> Self {
        self.properties.push(PropertySpec {
            name: name.to_string(),
            nullable: true,
        });
        self
    }

    pub fn element(mut self, kind: ElementKind) -> Self {
        self.element_kind = kind;
        self
    }

    pub fn collector(mut self) -> Self {
        self.sink = SinkKind::Collector;
        self
    }

    pub fn constructors(&self) -> &[Vec<String>] {
        &self.constructors
    }

    pub fn properties(&self) -> &[PropertySpec] {
        &self.properties
    }

    pub fn is_collector(&self) -> bool {
        self.sink == SinkKind::Collector
    }
}

/// Synthesized attribute instance: constructor arguments + named properties
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AttributeDescriptor {
    pub attribute: String,
    /// Selected constructor's parameters, in order
    pub constructor_args: Vec<(String, Value)>,
    pub named_properties: Map<String, Value>,
}

impl AttributeDescriptor {
    pub fn new(attribute: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into(),
            ..Default::default()
        }
    }

    /// Look up a constructor argument or named property (case-insensitive)
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.constructor_args
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v)
            .or_else(|| {
                self.named_properties
                    .iter()
                    .find(|(k, _)| k.eq_ignore_ascii_case(name))
                    .map(|(_, v)| v)
            })
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    /// Logical destination: the first string constructor argument
    pub fn destination(&self) -> &str {
        self.constructor_args
            .iter()
            .find_map(|(_, v)| v.as_str())
            .unwrap_or(&self.attribute)
    }

    /// Replace a value wherever it lives
    pub fn set(&mut self, name: &str, value: Value) {
        if let Some((_, slot)) = self
            .constructor_args
            .iter_mut()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
        {
            *slot = value;
            return;
        }
        let key = self
            .named_properties
            .keys()
            .find(|k| k.eq_ignore_ascii_case(name))
            .cloned()
            .unwrap_or_else(|| name.to_string());
        self.named_properties.insert(key, value);
    }

    /// All string-valued entries (constructor args first)
    pub fn string_values(&self) -> impl Iterator<Item = (&str, &str)> {
        self.constructor_args
            .iter()
            .map(|(k, v)| (k.as_str(), v))
            .chain(self.named_properties.iter().map(|(k, v)| (k.as_str(), v)))
            .filter_map(|(k, v)| v.as_str().map(|s| (k, s)))
    }
}

/// Resolve declared properties against a shape
pub fn resolve_attribute(
    shape: &AttributeShape,
    properties: &BindingProperties,
) -> Result<AttributeDescriptor> {
    let mut selected: Option<Vec<(String, Value)>> = None;

    for params in shape.constructors() {
        let args: Option<Vec<(String, Value)>> = params
            .iter()
            .map(|p| properties.get_non_null(p).map(|v| (p.clone(), v.clone())))
            .collect();
        let Some(args) = args else {
            continue;
        };
        // strictly greater keeps the first-declared constructor on ties
        if selected.as_ref().map_or(true, |best| args.len() > best.len()) {
            selected = Some(args);
        }
    }

    let constructor_args = selected.ok_or_else(|| WeftError::AmbiguousOrMissingConstructor {
        attribute: shape.attribute.clone(),
    })?;

    let mut named_properties = Map::new();
    for property in shape.properties() {
        if property.nullable {
            continue;
        }
        if constructor_args
            .iter()
            .any(|(k, _)| k.eq_ignore_ascii_case(&property.name))
        {
            continue;
        }
        if let Some(value) = properties.get_non_null(&property.name) {
            named_properties.insert(property.name.clone(), value.clone());
        }
    }

    Ok(AttributeDescriptor {
        attribute: shape.attribute.clone(),
        constructor_args,
        named_properties,
    })
}
