//! Function Executor - runs one invocation through the pipeline
//!
//! ```text
//! populate binding data (trigger)
//!   → singleton lock (function mode)
//!   → bind trigger + inputs
//!   → executing filters (registration order)
//!   → body (raced against timeout and caller cancellation)
//!   → bind outputs
//!   → release lock
//!   → executed filters (reverse order, best-effort)
//! ```
//!
//! Every error leaving [`FunctionExecutor::invoke`] is wrapped in
//! `FunctionInvocation` with the function name and instance id.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::binding::{BindingContext, BindingData, FunctionBinding};
use crate::config::HostConfig;
use crate::convert::DomainValue;
use crate::error::{FilterPhase, Result, WeftError};
use crate::event::{EventEmitter, EventKind, NoopEmitter};
use crate::singleton::{SingletonLock, SingletonManager, SingletonMode};

use super::context::{InvocationContext, InvocationState};
use super::filter::{FilterChain, FunctionFilter, FunctionOutcome};
use super::function::{FunctionCall, FunctionDescriptor, FunctionOutputs};

/// What a caller supplies for one invocation
#[derive(Debug, Default)]
pub struct InvocationRequest {
    /// Trigger payload (queue message, blob contents, HTTP request...)
    pub trigger_value: Option<DomainValue>,
    /// Binding data known up front; the trigger may add to it
    pub binding_data: BindingData,
    pub cancellation: CancellationToken,
}

impl InvocationRequest {
    pub fn new(trigger_value: impl Into<DomainValue>) -> Self {
        Self {
            trigger_value: Some(trigger_value.into()),
            ..Self::default()
        }
    }

    /// Request without a trigger payload (timers, manual calls)
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_binding_data(mut self, data: BindingData) -> Self {
        self.binding_data = data;
        self
    }

    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.binding_data.insert(key, value);
        self
    }

    pub fn with_cancellation(mut self, cancellation: CancellationToken) -> Self {
        self.cancellation = cancellation;
        self
    }
}

/// Outcome of a successful invocation
#[derive(Debug)]
pub struct InvocationResult {
    pub instance_id: String,
    /// Values left by output bindings (e.g. the HTTP response), keyed by binding name
    pub outputs: HashMap<String, DomainValue>,
    /// Final state of the filter properties bag
    pub properties: HashMap<String, Value>,
    pub duration: Duration,
}

enum Abort {
    Cancelled,
    Timeout(Duration),
}

/// Runs invocations; cheap to clone and share
#[derive(Clone)]
pub struct FunctionExecutor {
    singleton: Option<SingletonManager>,
    emitter: Arc<dyn EventEmitter>,
    filters: FilterChain,
    timeout: Option<Duration>,
    grace: Duration,
}

impl FunctionExecutor {
    pub fn new(config: &HostConfig) -> Self {
        Self {
            singleton: None,
            emitter: Arc::new(NoopEmitter),
            filters: FilterChain::new(),
            timeout: config.function_timeout,
            grace: config.timeout_grace,
        }
    }

    pub fn with_singleton_manager(mut self, manager: SingletonManager) -> Self {
        self.singleton = Some(manager);
        self
    }

    pub fn with_emitter(mut self, emitter: Arc<dyn EventEmitter>) -> Self {
        self.emitter = emitter;
        self
    }

    /// Host-wide filter; runs before every function's own filters
    pub fn with_filter(mut self, filter: impl FunctionFilter + 'static) -> Self {
        self.filters.push(Arc::new(filter));
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    pub fn filters(&self) -> &FilterChain {
        &self.filters
    }

    /// Invoke `function` once
    #[instrument(skip(self, function, request), fields(function = %function.name()))]
    pub async fn invoke(
        &self,
        function: &FunctionDescriptor,
        request: InvocationRequest,
    ) -> Result<InvocationResult> {
        let instance_id: Arc<str> = Uuid::new_v4().to_string().into();
        let started = Instant::now();

        self.emitter.emit(EventKind::InvocationStarted {
            instance_id: Arc::clone(&instance_id),
            function: function.name().to_string(),
            binding_data: request.binding_data.to_value(),
        });

        match self.run(function, &instance_id, request).await {
            Ok((outputs, properties)) => {
                let duration = started.elapsed();
                self.emitter.emit(EventKind::InvocationCompleted {
                    instance_id: Arc::clone(&instance_id),
                    duration_ms: duration.as_millis() as u64,
                });
                Ok(InvocationResult {
                    instance_id: instance_id.to_string(),
                    outputs,
                    properties,
                    duration,
                })
            }
            Err(e) => {
                warn!(instance_id = %instance_id, error = %e, "invocation failed");
                self.emitter.emit(EventKind::InvocationFailed {
                    instance_id: Arc::clone(&instance_id),
                    error: e.to_string(),
                    code: e.code().to_string(),
                });
                Err(WeftError::FunctionInvocation {
                    function: function.name().to_string(),
                    instance_id: instance_id.to_string(),
                    source: Box::new(e),
                })
            }
        }
    }

    async fn run(
        &self,
        function: &FunctionDescriptor,
        instance_id: &Arc<str>,
        request: InvocationRequest,
    ) -> Result<(HashMap<String, DomainValue>, HashMap<String, Value>)> {
        let InvocationRequest {
            trigger_value,
            mut binding_data,
            cancellation,
        } = request;

        if cancellation.is_cancelled() {
            return Err(WeftError::Cancelled {
                function: function.name().to_string(),
            });
        }

        function
            .trigger()
            .populate_binding_data(trigger_value.as_ref(), &mut binding_data)?;

        let context = Arc::new(InvocationContext::new(
            Arc::clone(instance_id),
            function.name(),
            binding_data,
            cancellation.child_token(),
        ));

        let mut lock = self.acquire_lock(function, &context, &cancellation).await?;
        let result = self
            .run_locked(function, &context, &cancellation, trigger_value, &mut lock)
            .await;
        self.release_lock(&context, &mut lock).await;

        if result.is_err() {
            context.transition(InvocationState::Failed);
        } else {
            context.transition(InvocationState::Completed);
        }
        result.map(|outputs| (outputs, context.properties().snapshot()))
    }

    async fn run_locked(
        &self,
        function: &FunctionDescriptor,
        context: &Arc<InvocationContext>,
        cancellation: &CancellationToken,
        trigger_value: Option<DomainValue>,
        lock: &mut Option<SingletonLock>,
    ) -> Result<HashMap<String, DomainValue>> {
        let mut inputs = HashMap::new();
        if let Some(value) = self.bind(function.trigger(), trigger_value, context).await? {
            inputs.insert(function.trigger().name().to_string(), value);
        }
        for binding in function.inputs() {
            if let Some(value) = self.bind(binding, None, context).await? {
                inputs.insert(binding.name().to_string(), value);
            }
        }

        // ═══════════════════════════════════════════
        // EXECUTING FILTERS
        // ═══════════════════════════════════════════
        context.transition(InvocationState::ExecutingFilters);
        let filters = function.filters().after(&self.filters);
        let mut ran: Vec<&Arc<dyn FunctionFilter>> = Vec::with_capacity(filters.len());

        for filter in filters.iter() {
            self.emitter.emit(EventKind::FilterExecuting {
                instance_id: Arc::clone(context.instance_id_arc()),
                filter: filter.name().to_string(),
            });
            if let Err(source) = filter.executing(context).await {
                let error = self.filter_failed(context, filter.name(), FilterPhase::Executing, source);
                self.release_lock(context, lock).await;
                let hook_errors = self.run_aborted_hooks(context, &ran, &error).await;
                return Err(aggregate(std::iter::once(error).chain(hook_errors).collect()));
            }
            ran.push(filter);
        }

        // ═══════════════════════════════════════════
        // BODY + OUTPUTS
        // ═══════════════════════════════════════════
        context.transition(InvocationState::Invoking);
        let call = FunctionCall {
            context: Arc::clone(context),
            inputs,
        };
        let primary = match self.run_body(function, call, context, cancellation).await {
            Ok(outputs) => self.bind_outputs(function, outputs, context).await,
            Err(e) => Err(e),
        };
        // a failed body gives the lease up before any executed filter runs
        self.release_lock(context, lock).await;

        // ═══════════════════════════════════════════
        // EXECUTED FILTERS
        // ═══════════════════════════════════════════
        context.transition(InvocationState::ExecutedFilters);
        let outcome = match &primary {
            Ok(_) => FunctionOutcome::Succeeded,
            Err(e) => FunctionOutcome::Failed(e),
        };
        let mut filter_errors = Vec::new();
        for filter in ran.iter().rev() {
            match filter.executed(context, outcome).await {
                Ok(()) => {
                    self.emitter.emit(EventKind::FilterExecuted {
                        instance_id: Arc::clone(context.instance_id_arc()),
                        filter: filter.name().to_string(),
                    });
                }
                Err(source) => {
                    filter_errors.push(self.filter_failed(context, filter.name(), FilterPhase::Executed, source));
                }
            }
        }

        match primary {
            Ok(outputs) if filter_errors.is_empty() => Ok(outputs),
            Ok(_) => Err(aggregate(filter_errors)),
            Err(e) => Err(aggregate(std::iter::once(e).chain(filter_errors).collect())),
        }
    }

    /// Executed hooks for filters that asked to see an aborted start
    async fn run_aborted_hooks(
        &self,
        context: &InvocationContext,
        ran: &[&Arc<dyn FunctionFilter>],
        error: &WeftError,
    ) -> Vec<WeftError> {
        let mut errors = Vec::new();
        for filter in ran.iter().rev().filter(|f| f.observes_aborted_start()) {
            match filter.executed(context, FunctionOutcome::StartAborted(error)).await {
                Ok(()) => {
                    self.emitter.emit(EventKind::FilterExecuted {
                        instance_id: Arc::clone(context.instance_id_arc()),
                        filter: filter.name().to_string(),
                    });
                }
                Err(source) => {
                    errors.push(self.filter_failed(context, filter.name(), FilterPhase::Executed, source));
                }
            }
        }
        errors
    }

    fn filter_failed(
        &self,
        context: &InvocationContext,
        filter: &str,
        phase: FilterPhase,
        source: crate::error::BoxError,
    ) -> WeftError {
        warn!(instance_id = %context.instance_id(), filter, %phase, error = %source, "filter failed");
        self.emitter.emit(EventKind::filter_failed(
            context.instance_id_arc(),
            filter,
            phase,
            &source,
        ));
        WeftError::FilterFailed {
            filter: filter.to_string(),
            phase,
            source,
        }
    }

    /// Run the body once, racing it against the timeout and caller cancellation
    ///
    /// On abort the body's token is cancelled and it gets the grace period
    /// to finish; whether it did is reported on `FunctionTimeout`.
    async fn run_body(
        &self,
        function: &FunctionDescriptor,
        call: FunctionCall,
        context: &InvocationContext,
        cancellation: &CancellationToken,
    ) -> Result<FunctionOutputs> {
        let instance_id = context.instance_id_arc();
        self.emitter.emit(EventKind::BodyStarted {
            instance_id: Arc::clone(instance_id),
        });

        let started = Instant::now();
        let timeout = function.timeout().or(self.timeout);
        let body = Arc::clone(function.body());
        let mut invocation = body.invoke(call);
        let deadline = async {
            match timeout {
                Some(timeout) => tokio::time::sleep(timeout).await,
                None => std::future::pending::<()>().await,
            }
        };

        let abort = tokio::select! {
            biased;
            result = &mut invocation => {
                return match result {
                    Ok(outputs) => {
                        self.emitter.emit(EventKind::BodyCompleted {
                            instance_id: Arc::clone(instance_id),
                            duration_ms: started.elapsed().as_millis() as u64,
                        });
                        Ok(outputs)
                    }
                    Err(source) => {
                        self.emitter.emit(EventKind::BodyFailed {
                            instance_id: Arc::clone(instance_id),
                            error: source.to_string(),
                        });
                        Err(WeftError::FunctionFailed {
                            function: function.name().to_string(),
                            source,
                        })
                    }
                };
            }
            _ = cancellation.cancelled() => Abort::Cancelled,
            _ = deadline => Abort::Timeout(timeout.unwrap_or_default()),
        };

        context.cancellation().cancel();
        let honored = tokio::time::timeout(self.grace, &mut invocation).await.is_ok();
        debug!(instance_id = %instance_id, honored, "body aborted");

        let error = match abort {
            Abort::Cancelled => WeftError::Cancelled {
                function: function.name().to_string(),
            },
            Abort::Timeout(timeout) => WeftError::FunctionTimeout {
                function: function.name().to_string(),
                timeout_ms: timeout.as_millis() as u64,
                cancellation_honored: honored,
            },
        };
        self.emitter.emit(EventKind::BodyFailed {
            instance_id: Arc::clone(instance_id),
            error: error.to_string(),
        });
        Err(error)
    }

    async fn bind_outputs(
        &self,
        function: &FunctionDescriptor,
        mut outputs: FunctionOutputs,
        context: &InvocationContext,
    ) -> Result<HashMap<String, DomainValue>> {
        let mut bound = HashMap::new();
        for binding in function.outputs() {
            let key = outputs
                .keys()
                .find(|key| key.eq_ignore_ascii_case(binding.name()))
                .cloned();
            let Some(value) = key.and_then(|key| outputs.remove(&key)) else {
                debug!(binding = binding.name(), "no value for output binding");
                continue;
            };
            if let Some(result) = self.bind(binding, Some(value), context).await? {
                bound.insert(binding.name().to_string(), result);
            }
        }
        for name in outputs.keys() {
            warn!(function = function.name(), output = %name, "output has no matching binding");
        }
        Ok(bound)
    }

    async fn bind(
        &self,
        binding: &Arc<dyn FunctionBinding>,
        value: Option<DomainValue>,
        context: &InvocationContext,
    ) -> Result<Option<DomainValue>> {
        let mut binding_context =
            BindingContext::new(context.binding_data().clone(), context.cancellation().clone())
                .with_input(value);
        binding.bind(&mut binding_context).await?;

        let attribute = binding_context
            .attributes
            .last()
            .map(|attribute| attribute.destination().to_string())
            .unwrap_or_default();
        self.emitter.emit(EventKind::BindingResolved {
            instance_id: Arc::clone(context.instance_id_arc()),
            binding: binding.name().to_string(),
            attribute,
        });
        Ok(binding_context.bound_value)
    }

    async fn acquire_lock(
        &self,
        function: &FunctionDescriptor,
        context: &InvocationContext,
        cancellation: &CancellationToken,
    ) -> Result<Option<SingletonLock>> {
        let Some(attribute) = function.singleton().filter(|a| a.mode == SingletonMode::Function) else {
            return Ok(None);
        };
        let manager = self.singleton.as_ref().ok_or_else(|| WeftError::InvalidSingleton {
            reason: format!("function '{}' is a singleton but no lease store is configured", function.name()),
        })?;

        let lock_id = manager.invocation_lock_id(function.name(), attribute, context.binding_data())?;
        let lock = tokio::select! {
            lock = manager.lock_for(&lock_id, context.instance_id(), attribute) => lock?,
            _ = cancellation.cancelled() => {
                return Err(WeftError::Cancelled {
                    function: function.name().to_string(),
                });
            }
        };

        self.emitter.emit(EventKind::LockAcquired {
            instance_id: Arc::clone(context.instance_id_arc()),
            lock_id,
        });
        Ok(Some(lock))
    }

    /// Release a held lock; a no-op once released
    async fn release_lock(&self, context: &InvocationContext, lock: &mut Option<SingletonLock>) {
        let (Some(lock), Some(manager)) = (lock.take(), self.singleton.as_ref()) else {
            return;
        };
        let lock_id = lock.lock_id().to_string();
        if let Err(e) = manager.release(lock).await {
            // the lease expires on its own once renewal has stopped
            warn!(lock_id = %lock_id, error = %e, "singleton lock release failed");
        }
        self.emitter.emit(EventKind::LockReleased {
            instance_id: Arc::clone(context.instance_id_arc()),
            lock_id,
        });
    }
}

impl std::fmt::Debug for FunctionExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionExecutor")
            .field("filters", &self.filters)
            .field("timeout", &self.timeout)
            .field("grace", &self.grace)
            .field("singleton", &self.singleton.is_some())
            .finish()
    }
}

fn aggregate(mut errors: Vec<WeftError>) -> WeftError {
    if errors.len() == 1 {
        errors.remove(0)
    } else {
        WeftError::Aggregate { errors }
    }
}
