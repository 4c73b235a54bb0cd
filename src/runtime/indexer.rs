//! Function Indexer - metadata → invocable descriptors
//!
//! Every declaration goes through the provider registry. A failure only
//! fails its own function; the report carries the rest.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, instrument, warn};

use crate::binding::{
    BindingDeclaration, FunctionBinding, FunctionMetadata, LoadedFunction, ParameterType,
    ProviderRegistry,
};
use crate::error::{BoxError, Result, WeftError};
use crate::singleton::SingletonAttribute;

use super::filter::FunctionFilter;
use super::function::{FunctionBody, FunctionCall, FunctionDescriptor, FunctionOutputs};

/// Stand-in body for functions indexed without code (diagnostics, `weft check`)
struct MissingBody {
    function: String,
}

#[async_trait]
impl FunctionBody for MissingBody {
    async fn invoke(&self, _call: FunctionCall) -> std::result::Result<FunctionOutputs, BoxError> {
        Err(format!("no body registered for function '{}'", self.function).into())
    }
}

/// Result of indexing a set of functions
#[derive(Debug, Default)]
pub struct IndexReport {
    pub functions: Vec<FunctionDescriptor>,
    /// Function name → why it could not be indexed
    pub errors: Vec<(String, WeftError)>,
    /// Functions skipped because their metadata says `disabled`
    pub disabled: Vec<String>,
}

impl IndexReport {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    /// Case-insensitive lookup
    pub fn get(&self, name: &str) -> Result<&FunctionDescriptor> {
        self.functions
            .iter()
            .find(|f| f.name().eq_ignore_ascii_case(name))
            .ok_or_else(|| WeftError::FunctionNotFound {
                name: name.to_string(),
            })
    }

    pub fn error_for(&self, name: &str) -> Option<&WeftError> {
        self.errors
            .iter()
            .find(|(function, _)| function.eq_ignore_ascii_case(name))
            .map(|(_, error)| error)
    }
}

/// Builds [`FunctionDescriptor`]s from metadata
pub struct FunctionIndexer {
    registry: ProviderRegistry,
    bodies: HashMap<String, Arc<dyn FunctionBody>>,
    singletons: HashMap<String, SingletonAttribute>,
    filters: HashMap<String, Vec<Arc<dyn FunctionFilter>>>,
    timeouts: HashMap<String, Duration>,
    parameter_types: HashMap<(String, String), ParameterType>,
}

impl FunctionIndexer {
    pub fn new(registry: ProviderRegistry) -> Self {
        Self {
            registry,
            bodies: HashMap::new(),
            singletons: HashMap::new(),
            filters: HashMap::new(),
            timeouts: HashMap::new(),
            parameter_types: HashMap::new(),
        }
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    pub fn body(mut self, function: &str, body: Arc<dyn FunctionBody>) -> Self {
        self.bodies.insert(key(function), body);
        self
    }

    pub fn singleton(mut self, function: &str, attribute: SingletonAttribute) -> Self {
        self.singletons.insert(key(function), attribute);
        self
    }

    pub fn filter(mut self, function: &str, filter: impl FunctionFilter + 'static) -> Self {
        self.filters.entry(key(function)).or_default().push(Arc::new(filter));
        self
    }

    pub fn timeout(mut self, function: &str, timeout: Duration) -> Self {
        self.timeouts.insert(key(function), timeout);
        self
    }

    /// Declare the parameter type a binding is consumed as; checked with `can_bind`
    pub fn parameter_type(mut self, function: &str, binding: &str, parameter: ParameterType) -> Self {
        self.parameter_types.insert((key(function), key(binding)), parameter);
        self
    }

    #[instrument(skip(self, functions), fields(count = functions.len()))]
    pub fn index(&self, functions: &[FunctionMetadata]) -> IndexReport {
        let mut report = IndexReport::default();
        for metadata in functions {
            self.index_into(metadata, &mut report);
        }
        info!(
            indexed = report.functions.len(),
            failed = report.errors.len(),
            disabled = report.disabled.len(),
            "functions indexed"
        );
        report
    }

    /// Index the output of `load_function_metadata`; load failures are reported per function
    pub fn index_loaded(&self, functions: &[LoadedFunction]) -> IndexReport {
        let mut report = IndexReport::default();
        for loaded in functions {
            match &loaded.metadata {
                Ok(metadata) => self.index_into(metadata, &mut report),
                Err(e) => {
                    warn!(function = %loaded.name, path = %loaded.path.display(), error = %e, "function metadata invalid");
                    report.errors.push((loaded.name.clone(), clone_load_error(&loaded.name, e)));
                }
            }
        }
        report
    }

    fn index_into(&self, metadata: &FunctionMetadata, report: &mut IndexReport) {
        if metadata.disabled {
            debug!(function = %metadata.name, "function disabled, skipping");
            report.disabled.push(metadata.name.clone());
            return;
        }
        match self.index_one(metadata) {
            Ok(descriptor) => report.functions.push(descriptor),
            Err(e) => {
                warn!(function = %metadata.name, error = %e, "function failed to index");
                report.errors.push((metadata.name.clone(), e));
            }
        }
    }

    fn index_one(&self, metadata: &FunctionMetadata) -> Result<FunctionDescriptor> {
        let function_key = key(&metadata.name);
        let resolve = |declaration: &BindingDeclaration| -> Result<Arc<dyn FunctionBinding>> {
            let binding = self.registry.try_create_binding(declaration)?;
            if let Some(parameter) = self
                .parameter_types
                .get(&(function_key.clone(), key(&binding.declaration().name)))
            {
                binding.synthetic_attribute(*parameter)?;
            }
            Ok(binding)
        };

        let trigger = resolve(metadata.trigger())?;
        let body: Arc<dyn FunctionBody> = match self.bodies.get(&function_key) {
            Some(body) => Arc::clone(body),
            None => Arc::new(MissingBody {
                function: metadata.name.clone(),
            }),
        };

        let mut builder = FunctionDescriptor::builder(&metadata.name, trigger, body);
        for declaration in metadata.bindings.iter().filter(|b| !b.is_trigger()) {
            let binding = resolve(declaration)?;
            if declaration.direction.is_input() {
                builder = builder.input(Arc::clone(&binding));
            }
            if declaration.direction.is_output() {
                builder = builder.output(binding);
            }
        }
        for filter in self.filters.get(&function_key).into_iter().flatten() {
            builder = builder.filter_arc(Arc::clone(filter));
        }
        if let Some(attribute) = self.singletons.get(&function_key) {
            builder = builder.singleton(attribute.clone());
        }
        if let Some(timeout) = self.timeouts.get(&function_key) {
            builder = builder.timeout(*timeout);
        }
        builder.build()
    }
}

fn key(name: &str) -> String {
    name.to_ascii_lowercase()
}

/// Load errors live in the caller's `LoadedFunction`; the report needs its own copy
fn clone_load_error(function: &str, error: &WeftError) -> WeftError {
    WeftError::InvalidMetadata {
        function: function.to_string(),
        reason: match error {
            WeftError::InvalidMetadata { reason, .. } => reason.clone(),
            other => other.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::{default_registry, DictionaryNameResolver, MemoryBinder};
    use std::collections::HashMap as Map;

    fn registry() -> ProviderRegistry {
        default_registry(
            Arc::new(MemoryBinder::new()),
            Arc::new(DictionaryNameResolver::new(Map::new())),
        )
    }

    fn metadata(name: &str, json: &str) -> FunctionMetadata {
        FunctionMetadata::from_json(name, json).expect("metadata")
    }

    #[test]
    fn one_bad_function_does_not_stop_the_rest() {
        let good = metadata(
            "Good",
            r#"{"bindings":[
                {"name":"msg","type":"queueTrigger","queueName":"in"},
                {"name":"out","type":"queue","direction":"out","queueName":"out-{id}"}
            ]}"#,
        );
        let bad = metadata(
            "Bad",
            r#"{"bindings":[
                {"name":"msg","type":"queueTrigger","queueName":"in"},
                {"name":"thing","type":"widget","direction":"out"}
            ]}"#,
        );

        let report = FunctionIndexer::new(registry()).index(&[good, bad]);
        assert_eq!(report.functions.len(), 1);
        assert!(report.get("good").is_ok());
        assert_eq!(report.error_for("Bad").map(|e| e.code()), Some("WEFT-020"));
        assert_eq!(report.get("Bad").map(|_| ()).unwrap_err().code(), "WEFT-046");
    }

    #[test]
    fn disabled_functions_are_skipped() {
        let disabled = metadata(
            "Off",
            r#"{"disabled":true,"bindings":[{"name":"t","type":"timerTrigger","schedule":"0 * * * * *"}]}"#,
        );
        let report = FunctionIndexer::new(registry()).index(&[disabled]);
        assert!(report.functions.is_empty());
        assert_eq!(report.disabled, vec!["Off".to_string()]);
        assert!(report.is_ok());
    }

    #[test]
    fn declared_parameter_type_is_checked() {
        let function = metadata(
            "Fn",
            r#"{"bindings":[
                {"name":"msg","type":"queueTrigger","queueName":"in"},
                {"name":"out","type":"queue","direction":"out","queueName":"out"}
            ]}"#,
        );
        let indexer = FunctionIndexer::new(registry()).parameter_type("fn", "out", ParameterType::Collector);
        assert!(indexer.index(std::slice::from_ref(&function)).is_ok());

        let function = metadata(
            "Fn",
            r#"{"bindings":[
                {"name":"msg","type":"queueTrigger","queueName":"in"},
                {"name":"input","type":"blob","direction":"in","path":"c/b"}
            ]}"#,
        );
        let indexer = FunctionIndexer::new(registry()).parameter_type("Fn", "input", ParameterType::Collector);
        let report = indexer.index(&[function]);
        assert_eq!(report.error_for("Fn").map(|e| e.code()), Some("WEFT-023"));
    }
}
