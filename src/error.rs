// The #[error] attribute from thiserror uses struct fields via string interpolation,
// but Rust's unused_assignments lint doesn't recognize this.
#![allow(unused_assignments)]

//! Weft Error Types with Error Codes
//!
//! Error code ranges:
//! - WEFT-000-009: Template errors
//! - WEFT-010-019: Conversion errors
//! - WEFT-020-029: Declaration/provider/extension errors
//! - WEFT-030-039: Singleton errors
//! - WEFT-040-049: Invocation pipeline errors
//! - WEFT-050-059: Config/IO errors
//! - WEFT-060-069: Binder (external capability) errors
//!
//! Declaration errors are raised while a function is indexed and only fail
//! that function. Everything else surfaces per invocation.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, WeftError>;

/// Error type produced by user code: function bodies, filters and binders.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Trait for errors that provide fix suggestions
pub trait FixSuggestion {
    fn fix_suggestion(&self) -> Option<&str>;
}

/// Pipeline phase a filter failed in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterPhase {
    Executing,
    Executed,
}

impl std::fmt::Display for FilterPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Executing => f.write_str("executing"),
            Self::Executed => f.write_str("executed"),
        }
    }
}

fn format_aggregate(errors: &[WeftError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// All error variants are part of the public API.
#[derive(Error, Debug)]
pub enum WeftError {
    // ═══════════════════════════════════════════
    // TEMPLATE ERRORS (000-009)
    // ═══════════════════════════════════════════
    #[error("[WEFT-001] Malformed template '{template}' at position {position}: {reason}")]
    MalformedTemplate {
        template: String,
        position: usize,
        reason: String,
    },

    #[error("[WEFT-002] No value for parameter '{parameter}' in template '{template}'")]
    MissingBindingData { parameter: String, template: String },

    // ═══════════════════════════════════════════
    // CONVERSION ERRORS (010-019)
    // ═══════════════════════════════════════════
    #[error("[WEFT-010] Data format error: {reason}")]
    DataFormat { reason: String },

    #[error("[WEFT-011] Cannot convert {from} to {to}")]
    UnsupportedConversion { from: String, to: String },

    // ═══════════════════════════════════════════
    // DECLARATION / PROVIDER ERRORS (020-029)
    // ═══════════════════════════════════════════
    #[error("[WEFT-020] Binding '{binding}' declares unknown type '{binding_type}'")]
    UnknownBindingType {
        binding: String,
        binding_type: String,
    },

    #[error("[WEFT-021] No constructor of '{attribute}' can be satisfied by the declared properties")]
    AmbiguousOrMissingConstructor { attribute: String },

    #[error("[WEFT-022] Invalid binding declaration '{binding}': {reason}")]
    InvalidDeclaration { binding: String, reason: String },

    #[error("[WEFT-023] Binding '{binding}' cannot bind to parameter type {parameter_type}")]
    UnsupportedParameterType {
        binding: String,
        parameter_type: String,
    },

    #[error("[WEFT-024] Extension '{name}' refers to unknown type '{type_name}'")]
    ExtensionNotFound { name: String, type_name: String },

    #[error("[WEFT-025] Invalid extension manifest '{path}': {reason}")]
    Manifest { path: String, reason: String },

    #[error("[WEFT-026] Invalid function metadata for '{function}': {reason}")]
    InvalidMetadata { function: String, reason: String },

    // ═══════════════════════════════════════════
    // SINGLETON ERRORS (030-039)
    // ═══════════════════════════════════════════
    #[error("[WEFT-030] Unable to acquire singleton lock '{lock_id}' (timeout of {timeout_ms}ms exceeded)")]
    LockAcquisitionTimeout { lock_id: String, timeout_ms: u64 },

    #[error("[WEFT-031] Lease store failure for '{lock_id}': {reason}")]
    LeaseStore { lock_id: String, reason: String },

    #[error("[WEFT-032] Invalid singleton configuration: {reason}")]
    InvalidSingleton { reason: String },

    // ═══════════════════════════════════════════
    // INVOCATION PIPELINE ERRORS (040-049)
    // ═══════════════════════════════════════════
    #[error("[WEFT-040] Exception while executing function '{function}' (id: {instance_id}): {source}")]
    FunctionInvocation {
        function: String,
        instance_id: String,
        #[source]
        source: Box<WeftError>,
    },

    #[error("[WEFT-041] Timeout value of {timeout_ms}ms exceeded by function '{function}'")]
    FunctionTimeout {
        function: String,
        timeout_ms: u64,
        /// Whether the body finished within the grace period after cancellation
        cancellation_honored: bool,
    },

    #[error("[WEFT-042] Filter '{filter}' failed in {phase} phase: {source}")]
    FilterFailed {
        filter: String,
        phase: FilterPhase,
        #[source]
        source: BoxError,
    },

    #[error("[WEFT-043] Function '{function}' failed: {source}")]
    FunctionFailed {
        function: String,
        #[source]
        source: BoxError,
    },

    #[error("[WEFT-044] {} errors: {}", .errors.len(), format_aggregate(.errors))]
    Aggregate { errors: Vec<WeftError> },

    #[error("[WEFT-045] Function '{function}' was cancelled")]
    Cancelled { function: String },

    #[error("[WEFT-046] Function '{name}' not found")]
    FunctionNotFound { name: String },

    // ═══════════════════════════════════════════
    // CONFIG / IO ERRORS (050-059)
    // ═══════════════════════════════════════════
    #[error("[WEFT-050] Configuration error: {reason}")]
    Config { reason: String },

    #[error("[WEFT-051] IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("[WEFT-052] JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // ═══════════════════════════════════════════
    // BINDER ERRORS (060-069)
    // ═══════════════════════════════════════════
    #[error("[WEFT-060] Binder failed for '{target}': {source}")]
    Binder {
        target: String,
        #[source]
        source: BoxError,
    },
}

impl WeftError {
    /// Get the error code (e.g., "WEFT-001")
    pub fn code(&self) -> &'static str {
        match self {
            Self::MalformedTemplate { .. } => "WEFT-001",
            Self::MissingBindingData { .. } => "WEFT-002",
            Self::DataFormat { .. } => "WEFT-010",
            Self::UnsupportedConversion { .. } => "WEFT-011",
            Self::UnknownBindingType { .. } => "WEFT-020",
            Self::AmbiguousOrMissingConstructor { .. } => "WEFT-021",
            Self::InvalidDeclaration { .. } => "WEFT-022",
            Self::UnsupportedParameterType { .. } => "WEFT-023",
            Self::ExtensionNotFound { .. } => "WEFT-024",
            Self::Manifest { .. } => "WEFT-025",
            Self::InvalidMetadata { .. } => "WEFT-026",
            Self::LockAcquisitionTimeout { .. } => "WEFT-030",
            Self::LeaseStore { .. } => "WEFT-031",
            Self::InvalidSingleton { .. } => "WEFT-032",
            Self::FunctionInvocation { .. } => "WEFT-040",
            Self::FunctionTimeout { .. } => "WEFT-041",
            Self::FilterFailed { .. } => "WEFT-042",
            Self::FunctionFailed { .. } => "WEFT-043",
            Self::Aggregate { .. } => "WEFT-044",
            Self::Cancelled { .. } => "WEFT-045",
            Self::FunctionNotFound { .. } => "WEFT-046",
            Self::Config { .. } => "WEFT-050",
            Self::Io(_) => "WEFT-051",
            Self::Json(_) => "WEFT-052",
            Self::Binder { .. } => "WEFT-060",
        }
    }

    /// Errors detected while indexing a function (never at invocation time)
    pub fn is_declaration_error(&self) -> bool {
        matches!(
            self,
            Self::MalformedTemplate { .. }
                | Self::UnknownBindingType { .. }
                | Self::AmbiguousOrMissingConstructor { .. }
                | Self::InvalidDeclaration { .. }
                | Self::UnsupportedParameterType { .. }
                | Self::InvalidMetadata { .. }
                | Self::InvalidSingleton { .. }
        )
    }

    /// Per-invocation binding failures
    pub fn is_binding_error(&self) -> bool {
        matches!(
            self,
            Self::MissingBindingData { .. }
                | Self::DataFormat { .. }
                | Self::UnsupportedConversion { .. }
                | Self::Binder { .. }
        )
    }

    /// Walk through `FunctionInvocation` wrappers to the underlying failure
    pub fn root(&self) -> &WeftError {
        match self {
            Self::FunctionInvocation { source, .. } => source.root(),
            other => other,
        }
    }

    pub(crate) fn data_format(reason: impl Into<String>) -> Self {
        Self::DataFormat {
            reason: reason.into(),
        }
    }

    pub(crate) fn unsupported(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self::UnsupportedConversion {
            from: from.into(),
            to: to.into(),
        }
    }
}

impl FixSuggestion for WeftError {
    fn fix_suggestion(&self) -> Option<&str> {
        match self {
            WeftError::MalformedTemplate { .. } => {
                Some("Balance every '{' with '}' and give each parameter a name")
            }
            WeftError::MissingBindingData { .. } => {
                Some("Make sure the trigger supplies every {parameter} used in the binding")
            }
            WeftError::DataFormat { .. } => Some("Check the payload is well-formed JSON"),
            WeftError::UnsupportedConversion { .. } => {
                Some("Use dataType 'string', 'binary' or 'stream'")
            }
            WeftError::UnknownBindingType { .. } => {
                Some("Register the extension that provides this binding type")
            }
            WeftError::AmbiguousOrMissingConstructor { .. } => {
                Some("Add the required properties for this binding type to function.json")
            }
            WeftError::InvalidDeclaration { .. } => {
                Some("Check name, type and direction of the binding")
            }
            WeftError::UnsupportedParameterType { .. } => {
                Some("Change the parameter type or the binding's dataType")
            }
            WeftError::ExtensionNotFound { .. } => {
                Some("Register the extension type in the ExtensionCatalog")
            }
            WeftError::Manifest { .. } => Some("Check the manifest has an 'extensions' array"),
            WeftError::InvalidMetadata { .. } => {
                Some("Declare exactly one trigger and unique binding names")
            }
            WeftError::LockAcquisitionTimeout { .. } => {
                Some("Increase lock_acquisition_timeout or narrow the singleton scope")
            }
            WeftError::LeaseStore { .. } => Some("Check the lease store is reachable"),
            WeftError::InvalidSingleton { .. } => {
                Some("Host scope needs a scope id; listener mode needs function scope")
            }
            WeftError::FunctionTimeout { .. } => {
                Some("Increase function_timeout or observe the cancellation token")
            }
            WeftError::FunctionNotFound { .. } => Some("Check the function was indexed"),
            WeftError::Config { .. } => Some("Check the TOML syntax of the config file"),
            WeftError::FunctionInvocation { source, .. } => source.fix_suggestion(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_binding_data_code_and_display() {
        let err = WeftError::MissingBindingData {
            parameter: "b".into(),
            template: "{a}/{b}".into(),
        };
        assert_eq!(err.code(), "WEFT-002");
        assert!(err.to_string().contains("[WEFT-002]"));
        assert!(err.to_string().contains("'b'"));
        assert!(err.is_binding_error());
        assert!(!err.is_declaration_error());
    }

    #[test]
    fn test_declaration_errors_are_classified() {
        let err = WeftError::UnknownBindingType {
            binding: "out".into(),
            binding_type: "foo".into(),
        };
        assert!(err.is_declaration_error());
        assert!(err.fix_suggestion().is_some());
    }

    #[test]
    fn test_invocation_wrapper_keeps_cause() {
        use std::error::Error;

        let inner = WeftError::LockAcquisitionTimeout {
            lock_id: "host/fn".into(),
            timeout_ms: 10,
        };
        let err = WeftError::FunctionInvocation {
            function: "fn".into(),
            instance_id: "1234".into(),
            source: Box::new(inner),
        };
        assert_eq!(err.code(), "WEFT-040");
        assert_eq!(err.root().code(), "WEFT-030");
        assert!(err.source().is_some());
        assert_eq!(
            err.fix_suggestion(),
            Some("Increase lock_acquisition_timeout or narrow the singleton scope")
        );
    }

    #[test]
    fn test_function_failed_source_is_downcastable() {
        use std::error::Error;

        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk gone");
        let err = WeftError::FunctionFailed {
            function: "fn".into(),
            source: Box::new(io),
        };
        let source = err.source().unwrap();
        assert!(source.downcast_ref::<std::io::Error>().is_some());
    }

    #[test]
    fn test_aggregate_display_lists_all() {
        let err = WeftError::Aggregate {
            errors: vec![
                WeftError::data_format("bad"),
                WeftError::unsupported("bytes", "int32"),
            ],
        };
        let msg = err.to_string();
        assert!(msg.starts_with("[WEFT-044] 2 errors"));
        assert!(msg.contains("WEFT-010"));
        assert!(msg.contains("WEFT-011"));
    }

    #[test]
    fn test_io_error_from_std() {
        let err: WeftError = std::io::Error::new(std::io::ErrorKind::NotFound, "x").into();
        assert_eq!(err.code(), "WEFT-051");
    }
}
