//! Function bodies and descriptors
//!
//! A [`FunctionDescriptor`] is what the indexer produces for one function:
//! resolved bindings, filters, optional singleton attribute and the body.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;

use crate::binding::FunctionBinding;
use crate::convert::DomainValue;
use crate::error::{BoxError, Result, WeftError};
use crate::singleton::SingletonAttribute;

use super::context::InvocationContext;
use super::filter::{FilterChain, FunctionFilter};

/// Values the body hands to output bindings, keyed by binding name
/// (`$return` for the return value)
pub type FunctionOutputs = HashMap<String, DomainValue>;

/// Everything the body receives
#[derive(Debug)]
pub struct FunctionCall {
    pub context: Arc<InvocationContext>,
    /// Bound trigger and input values, keyed by binding name
    pub inputs: HashMap<String, DomainValue>,
}

impl FunctionCall {
    pub fn input(&self, name: &str) -> Option<&DomainValue> {
        self.inputs
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value)
    }

    /// Remove an input, taking ownership (streams can only be read once)
    pub fn take_input(&mut self, name: &str) -> Option<DomainValue> {
        let key = self
            .inputs
            .keys()
            .find(|key| key.eq_ignore_ascii_case(name))
            .cloned()?;
        self.inputs.remove(&key)
    }
}

/// The user code of a function
#[async_trait]
pub trait FunctionBody: Send + Sync {
    async fn invoke(&self, call: FunctionCall) -> std::result::Result<FunctionOutputs, BoxError>;
}

/// Adapter turning an async closure into a [`FunctionBody`]
pub struct FnBody<F>(F);

#[async_trait]
impl<F> FunctionBody for FnBody<F>
where
    F: Fn(FunctionCall) -> BoxFuture<'static, std::result::Result<FunctionOutputs, BoxError>> + Send + Sync,
{
    async fn invoke(&self, call: FunctionCall) -> std::result::Result<FunctionOutputs, BoxError> {
        (self.0)(call).await
    }
}

/// Wrap an async closure as a body
///
/// ```ignore
/// let body = body_fn(|call| async move {
///     Ok(FunctionOutputs::from([("$return".into(), "done".into())]))
/// });
/// ```
pub fn body_fn<F, Fut>(f: F) -> Arc<dyn FunctionBody>
where
    F: Fn(FunctionCall) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<FunctionOutputs, BoxError>> + Send + 'static,
{
    Arc::new(FnBody(move |call| -> BoxFuture<'static, _> { Box::pin(f(call)) }))
}

/// A fully indexed function, ready to invoke
#[derive(Clone)]
pub struct FunctionDescriptor {
    name: String,
    trigger: Arc<dyn FunctionBinding>,
    inputs: Vec<Arc<dyn FunctionBinding>>,
    outputs: Vec<Arc<dyn FunctionBinding>>,
    filters: FilterChain,
    singleton: Option<SingletonAttribute>,
    timeout: Option<Duration>,
    body: Arc<dyn FunctionBody>,
}

impl FunctionDescriptor {
    pub fn builder(
        name: impl Into<String>,
        trigger: Arc<dyn FunctionBinding>,
        body: Arc<dyn FunctionBody>,
    ) -> FunctionDescriptorBuilder {
        FunctionDescriptorBuilder {
            name: name.into(),
            trigger,
            inputs: Vec::new(),
            outputs: Vec::new(),
            filters: FilterChain::new(),
            singleton: None,
            timeout: None,
            body,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn trigger(&self) -> &Arc<dyn FunctionBinding> {
        &self.trigger
    }

    pub fn inputs(&self) -> &[Arc<dyn FunctionBinding>] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[Arc<dyn FunctionBinding>] {
        &self.outputs
    }

    pub fn filters(&self) -> &FilterChain {
        &self.filters
    }

    pub fn singleton(&self) -> Option<&SingletonAttribute> {
        self.singleton.as_ref()
    }

    /// Per-function timeout, overriding the host's
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn body(&self) -> &Arc<dyn FunctionBody> {
        &self.body
    }
}

impl fmt::Debug for FunctionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionDescriptor")
            .field("name", &self.name)
            .field("trigger", &self.trigger.name())
            .field("inputs", &self.inputs.iter().map(|b| b.name()).collect::<Vec<_>>())
            .field("outputs", &self.outputs.iter().map(|b| b.name()).collect::<Vec<_>>())
            .field("filters", &self.filters)
            .field("singleton", &self.singleton)
            .field("timeout", &self.timeout)
            .finish()
    }
}

pub struct FunctionDescriptorBuilder {
    name: String,
    trigger: Arc<dyn FunctionBinding>,
    inputs: Vec<Arc<dyn FunctionBinding>>,
    outputs: Vec<Arc<dyn FunctionBinding>>,
    filters: FilterChain,
    singleton: Option<SingletonAttribute>,
    timeout: Option<Duration>,
    body: Arc<dyn FunctionBody>,
}

impl FunctionDescriptorBuilder {
    pub fn input(mut self, binding: Arc<dyn FunctionBinding>) -> Self {
        self.inputs.push(binding);
        self
    }

    pub fn output(mut self, binding: Arc<dyn FunctionBinding>) -> Self {
        self.outputs.push(binding);
        self
    }

    pub fn filter(mut self, filter: impl FunctionFilter + 'static) -> Self {
        self.filters.push(Arc::new(filter));
        self
    }

    pub fn filter_arc(mut self, filter: Arc<dyn FunctionFilter>) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn singleton(mut self, attribute: SingletonAttribute) -> Self {
        self.singleton = Some(attribute);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Validate and build
    ///
    /// Fails on an invalid singleton attribute or when a binding sits in
    /// the wrong slot.
    pub fn build(self) -> Result<FunctionDescriptor> {
        let invalid = |reason: String| WeftError::InvalidMetadata {
            function: self.name.clone(),
            reason,
        };

        if !self.trigger.is_trigger() {
            return Err(invalid(format!("'{}' is not a trigger binding", self.trigger.name())));
        }
        if let Some(binding) = self.outputs.iter().find(|b| !b.direction().is_output()) {
            return Err(invalid(format!("'{}' is not an output binding", binding.name())));
        }
        if let Some(attribute) = &self.singleton {
            attribute.validate(true)?;
        }

        Ok(FunctionDescriptor {
            name: self.name,
            trigger: self.trigger,
            inputs: self.inputs,
            outputs: self.outputs,
            filters: self.filters,
            singleton: self.singleton,
            timeout: self.timeout,
            body: self.body,
        })
    }
}
