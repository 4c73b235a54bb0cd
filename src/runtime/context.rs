//! Invocation context shared by filters and the function body

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::binding::BindingData;

/// Per-invocation state machine
///
/// ```text
/// Created → ExecutingFilters → Invoking → ExecutedFilters → Completed | Failed
/// ```
/// A failing executing filter or a failed lock acquisition goes straight to
/// `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationState {
    Created,
    ExecutingFilters,
    Invoking,
    ExecutedFilters,
    Completed,
    Failed,
}

/// Shared bag for passing values between executing and executed filters
#[derive(Debug, Default)]
pub struct Properties {
    values: Mutex<HashMap<String, Value>>,
}

impl Properties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, key: impl Into<String>, value: Value) {
        self.values.lock().insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.values.lock().get(key).cloned()
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        self.values.lock().remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.lock().contains_key(key)
    }

    pub fn snapshot(&self) -> HashMap<String, Value> {
        self.values.lock().clone()
    }
}

/// What filters and the body see of an invocation
pub struct InvocationContext {
    instance_id: Arc<str>,
    function: String,
    binding_data: BindingData,
    properties: Properties,
    cancellation: CancellationToken,
    state: Mutex<InvocationState>,
}

impl InvocationContext {
    pub fn new(
        instance_id: Arc<str>,
        function: impl Into<String>,
        binding_data: BindingData,
        cancellation: CancellationToken,
    ) -> Self {
        Self {
            instance_id,
            function: function.into(),
            binding_data,
            properties: Properties::new(),
            cancellation,
            state: Mutex::new(InvocationState::Created),
        }
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    pub(crate) fn instance_id_arc(&self) -> &Arc<str> {
        &self.instance_id
    }

    pub fn function(&self) -> &str {
        &self.function
    }

    pub fn binding_data(&self) -> &BindingData {
        &self.binding_data
    }

    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    /// Signalled on caller cancellation or timeout
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn state(&self) -> InvocationState {
        *self.state.lock()
    }

    pub(crate) fn transition(&self, next: InvocationState) {
        let mut state = self.state.lock();
        debug!(instance_id = %self.instance_id, from = ?*state, to = ?next, "invocation state");
        *state = next;
    }
}

impl fmt::Debug for InvocationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InvocationContext")
            .field("instance_id", &self.instance_id)
            .field("function", &self.function)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn properties_round_trip() {
        let props = Properties::new();
        props.set("correlation", json!("abc"));
        assert!(props.contains("correlation"));
        assert_eq!(props.get("correlation"), Some(json!("abc")));
        assert_eq!(props.remove("correlation"), Some(json!("abc")));
        assert!(props.snapshot().is_empty());
    }

    #[test]
    fn transitions_are_observable() {
        let ctx = InvocationContext::new("id".into(), "Fn", BindingData::new(), CancellationToken::new());
        assert_eq!(ctx.state(), InvocationState::Created);
        ctx.transition(InvocationState::Invoking);
        assert_eq!(ctx.state(), InvocationState::Invoking);
    }
}
