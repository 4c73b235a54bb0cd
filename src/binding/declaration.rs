//! Binding Declarations - function.json → Rust types
//!
//! ```json
//! {
//!   "bindings": [
//!     { "name": "order", "type": "queueTrigger", "direction": "in", "queueName": "orders" },
//!     { "name": "receipt", "type": "queue", "direction": "out", "queueName": "receipts-{id}" }
//!   ]
//! }
//! ```
//!
//! Declarations are immutable once parsed. Everything other than
//! `name`/`type`/`direction` stays in the raw property bag and is matched
//! against the binding kind's attribute shape later.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::convert::DataKind;
use crate::error::{Result, WeftError};

use super::properties::{value_kind, BindingProperties};

/// File name of per-function metadata inside a function directory
pub const FUNCTION_METADATA_FILE: &str = "function.json";

/// Binding direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    In,
    Out,
    InOut,
}

impl Direction {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "in" => Some(Self::In),
            "out" => Some(Self::Out),
            "inout" => Some(Self::InOut),
            _ => None,
        }
    }

    pub fn is_input(&self) -> bool {
        matches!(self, Self::In | Self::InOut)
    }

    pub fn is_output(&self) -> bool {
        matches!(self, Self::Out | Self::InOut)
    }

    /// Storage access implied by the direction (`access` attribute argument)
    pub fn access(&self) -> &'static str {
        match self {
            Self::In => "read",
            Self::Out => "write",
            Self::InOut => "readwrite",
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::In => f.write_str("in"),
            Self::Out => f.write_str("out"),
            Self::InOut => f.write_str("inout"),
        }
    }
}

/// One declared binding of a function
#[derive(Debug, Clone, PartialEq)]
pub struct BindingDeclaration {
    pub name: String,
    /// Discriminator selecting the binding kind (`queue`, `blobTrigger`...)
    pub binding_type: String,
    pub direction: Direction,
    /// Requested data kind (`dataType`), if declared
    pub data_kind: Option<DataKind>,
    pub raw_properties: BindingProperties,
}

impl BindingDeclaration {
    pub fn new(
        name: impl Into<String>,
        binding_type: impl Into<String>,
        direction: Direction,
        raw_properties: Map<String, Value>,
    ) -> Result<Self> {
        let name = name.into();
        let raw_properties = BindingProperties::new(raw_properties);
        let data_kind = match raw_properties.str("dataType") {
            Ok(Some(raw)) => Some(DataKind::parse(raw)?),
            Ok(None) => None,
            Err(e) => {
                return Err(WeftError::InvalidDeclaration {
                    binding: name,
                    reason: e.to_string(),
                })
            }
        };

        Ok(Self {
            name,
            binding_type: binding_type.into(),
            direction,
            data_kind,
            raw_properties,
        })
    }

    /// Parse a single entry of the `bindings` array
    pub fn from_value(value: &Value) -> Result<Self> {
        let Value::Object(map) = value else {
            return Err(WeftError::InvalidDeclaration {
                binding: "<unnamed>".to_string(),
                reason: format!("expected object, got {}", value_kind(value)),
            });
        };

        let mut raw = map.clone();
        let name = take_string(&mut raw, "name").unwrap_or_default();
        if name.trim().is_empty() {
            return Err(WeftError::InvalidDeclaration {
                binding: "<unnamed>".to_string(),
                reason: "missing 'name'".to_string(),
            });
        }

        let binding_type =
            take_string(&mut raw, "type").ok_or_else(|| WeftError::InvalidDeclaration {
                binding: name.clone(),
                reason: "missing 'type'".to_string(),
            })?;

        let direction = match take_string(&mut raw, "direction") {
            None => Direction::In,
            Some(raw_direction) => {
                Direction::parse(&raw_direction).ok_or_else(|| WeftError::InvalidDeclaration {
                    binding: name.clone(),
                    reason: format!(
                        "direction '{}' must be one of in, out, inout",
                        raw_direction
                    ),
                })?
            }
        };

        Self::new(name, binding_type, direction, raw)
    }

    pub fn is_trigger(&self) -> bool {
        is_trigger_type(&self.binding_type)
    }

    pub fn is_return(&self) -> bool {
        self.name == crate::util::RETURN_BINDING_NAME
    }
}

/// Trigger binding types end in `Trigger` (`queueTrigger`, `httpTrigger`)
pub fn is_trigger_type(binding_type: &str) -> bool {
    binding_type.to_ascii_lowercase().ends_with("trigger")
}

/// Remove a key (case-insensitive) and return it if it held a string
fn take_string(raw: &mut Map<String, Value>, key: &str) -> Option<String> {
    let actual_key = raw.keys().find(|k| k.eq_ignore_ascii_case(key))?.clone();
    match raw.remove(&actual_key) {
        Some(Value::String(s)) => Some(s),
        _ => None,
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FunctionJson {
    #[serde(default)]
    bindings: Vec<Value>,
    #[serde(default)]
    disabled: bool,
    script_file: Option<String>,
    entry_point: Option<String>,
}

/// Declarative metadata for one function
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionMetadata {
    pub name: String,
    pub bindings: Vec<BindingDeclaration>,
    pub disabled: bool,
    pub script_file: Option<String>,
    pub entry_point: Option<String>,
}

impl FunctionMetadata {
    /// Build metadata from declarations, validating trigger and name rules
    pub fn new(name: impl Into<String>, bindings: Vec<BindingDeclaration>) -> Result<Self> {
        let metadata = Self {
            name: name.into(),
            bindings,
            disabled: false,
            script_file: None,
            entry_point: None,
        };
        metadata.validate()?;
        Ok(metadata)
    }

    /// Parse a function.json document
    pub fn from_json(name: impl Into<String>, json: &str) -> Result<Self> {
        let name = name.into();
        let raw: FunctionJson =
            serde_json::from_str(json).map_err(|e| WeftError::InvalidMetadata {
                function: name.clone(),
                reason: e.to_string(),
            })?;

        let bindings = raw
            .bindings
            .iter()
            .map(BindingDeclaration::from_value)
            .collect::<Result<Vec<_>>>()?;

        let metadata = Self {
            name,
            bindings,
            disabled: raw.disabled,
            script_file: raw.script_file,
            entry_point: raw.entry_point,
        };
        metadata.validate()?;
        Ok(metadata)
    }

    fn validate(&self) -> Result<()> {
        let invalid = |reason: String| WeftError::InvalidMetadata {
            function: self.name.clone(),
            reason,
        };

        let triggers = self.bindings.iter().filter(|b| b.is_trigger()).count();
        if triggers != 1 {
            return Err(invalid(format!(
                "expected exactly one trigger binding, found {}",
                triggers
            )));
        }

        for (i, binding) in self.bindings.iter().enumerate() {
            if self.bindings[..i]
                .iter()
                .any(|other| other.name.eq_ignore_ascii_case(&binding.name))
            {
                return Err(invalid(format!("duplicate binding name '{}'", binding.name)));
            }
        }

        Ok(())
    }

    /// The function's single trigger binding
    pub fn trigger(&self) -> &BindingDeclaration {
        // validate() guarantees exactly one
        self.bindings
            .iter()
            .find(|b| b.is_trigger())
            .unwrap_or(&self.bindings[0])
    }

    pub fn input_bindings(&self) -> impl Iterator<Item = &BindingDeclaration> {
        self.bindings
            .iter()
            .filter(|b| !b.is_trigger() && b.direction.is_input())
    }

    pub fn output_bindings(&self) -> impl Iterator<Item = &BindingDeclaration> {
        self.bindings.iter().filter(|b| b.direction.is_output())
    }
}

/// Metadata load result for one function directory
#[derive(Debug)]
pub struct LoadedFunction {
    pub name: String,
    pub path: PathBuf,
    pub metadata: Result<FunctionMetadata>,
}

/// Read every `<root>/<function>/function.json`
///
/// A malformed file only fails its own function; directories without
/// metadata are skipped. Results are sorted by function name.
pub fn load_function_metadata(root: &Path) -> Result<Vec<LoadedFunction>> {
    if !root.is_dir() {
        return Err(WeftError::Config {
            reason: format!("functions root '{}' is not a directory", root.display()),
        });
    }

    let mut loaded = Vec::new();
    for entry in WalkDir::new(root)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|e| WeftError::Io(std::io::Error::other(e.to_string())))?;
        if !entry.file_type().is_dir() {
            continue;
        }

        let path = entry.path().join(FUNCTION_METADATA_FILE);
        if !path.is_file() {
            debug!(dir = %entry.path().display(), "No function.json, skipping");
            continue;
        }

        let name = entry.file_name().to_string_lossy().into_owned();
        let metadata = fs::read_to_string(&path)
            .map_err(WeftError::from)
            .and_then(|json| FunctionMetadata::from_json(name.clone(), &json));
        if let Err(e) = &metadata {
            warn!(function = %name, error = %e, "Failed to load function metadata");
        }

        loaded.push(LoadedFunction {
            name,
            path,
            metadata,
        });
    }

    Ok(loaded)
}
