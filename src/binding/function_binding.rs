//! Resolved bindings and the per-invocation binding context

use std::fmt;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::convert::{DataKind, DomainValue};
use crate::error::{Result, WeftError};

use super::attribute::AttributeDescriptor;
use super::data::BindingData;
use super::declaration::{BindingDeclaration, Direction};

/// Parameter type a function body expects for a binding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParameterType {
    String,
    Binary,
    Stream,
    Json,
    /// Batch output written item by item
    Collector,
}

impl ParameterType {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "string" => Some(Self::String),
            "binary" | "bytes" => Some(Self::Binary),
            "stream" => Some(Self::Stream),
            "json" | "object" => Some(Self::Json),
            "collector" => Some(Self::Collector),
            _ => None,
        }
    }

    /// Whether a declared `dataType` is compatible with this parameter
    pub fn accepts(&self, kind: DataKind) -> bool {
        matches!(
            (self, kind),
            (Self::String | Self::Json, DataKind::String)
                | (Self::Binary, DataKind::Binary)
                | (Self::Stream | Self::Binary, DataKind::Stream)
                | (Self::Collector, _)
        )
    }
}

impl fmt::Display for ParameterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::String => "string",
            Self::Binary => "binary",
            Self::Stream => "stream",
            Self::Json => "json",
            Self::Collector => "collector",
        };
        f.write_str(name)
    }
}

/// Per-invocation binding state
///
/// - triggers: `input_value` holds the trigger payload, `bind` fills `bound_value`
/// - inputs: `bind` reads through the binder into `bound_value`
/// - outputs: `input_value` holds what the body produced; `bind` writes it
///   and may leave a result (the HTTP response) in `bound_value`
pub struct BindingContext {
    pub bound_value: Option<DomainValue>,
    pub input_value: Option<DomainValue>,
    pub binding_data: BindingData,
    /// Attributes bound during this invocation, in binding order
    pub attributes: Vec<AttributeDescriptor>,
    pub cancellation: CancellationToken,
}

impl BindingContext {
    pub fn new(binding_data: BindingData, cancellation: CancellationToken) -> Self {
        Self {
            bound_value: None,
            input_value: None,
            binding_data,
            attributes: Vec::new(),
            cancellation,
        }
    }

    pub fn with_input(mut self, value: Option<DomainValue>) -> Self {
        self.input_value = value;
        self
    }
}

impl fmt::Debug for BindingContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BindingContext")
            .field("bound_value", &self.bound_value)
            .field("input_value", &self.input_value)
            .field("binding_data", &self.binding_data)
            .field("attributes", &self.attributes.len())
            .finish()
    }
}

/// A binding resolved from a declaration by a provider
#[async_trait]
pub trait FunctionBinding: Send + Sync {
    fn declaration(&self) -> &BindingDeclaration;

    fn name(&self) -> &str {
        &self.declaration().name
    }

    fn direction(&self) -> Direction {
        self.declaration().direction
    }

    fn is_trigger(&self) -> bool {
        self.declaration().is_trigger()
    }

    /// Whether the binding can produce / accept this parameter type
    fn can_bind(&self, parameter: ParameterType) -> bool;

    /// The attribute this binding would apply to a parameter of this type
    fn synthetic_attribute(&self, parameter: ParameterType) -> Result<AttributeDescriptor>;

    /// Contribute trigger-derived values (path segments, route and query
    /// parameters) before any other binding is bound
    fn populate_binding_data(
        &self,
        _trigger_value: Option<&DomainValue>,
        _data: &mut BindingData,
    ) -> Result<()> {
        Ok(())
    }

    async fn bind(&self, context: &mut BindingContext) -> Result<()>;
}

impl fmt::Debug for dyn FunctionBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let decl = self.declaration();
        f.debug_struct("FunctionBinding")
            .field("name", &decl.name)
            .field("type", &decl.binding_type)
            .field("direction", &decl.direction)
            .finish()
    }
}

/// Standard `UnsupportedParameterType` error for a binding
pub(crate) fn unsupported_parameter(
    binding: &BindingDeclaration,
    parameter: ParameterType,
) -> WeftError {
    WeftError::UnsupportedParameterType {
        binding: binding.name.clone(),
        parameter_type: parameter.to_string(),
    }
}
