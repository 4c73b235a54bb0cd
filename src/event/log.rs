//! InvocationLog - append-only record of what each invocation did
//!
//! The executor emits one event per pipeline step. Tests read the log back
//! to assert ordering (filters before body, executed filters reversed...).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::FilterPhase;

/// Single event in the invocation log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvocationEvent {
    /// Monotonic sequence ID
    pub id: u64,
    /// Time since the log was created (ms)
    pub timestamp_ms: u64,
    /// Wall-clock time, for correlating with other hosts' logs
    pub recorded_at: DateTime<Utc>,
    pub kind: EventKind,
}

/// Invocation event types
///
/// `instance_id` is the per-invocation uuid; Arc<str> keeps clones cheap.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    // ═══════════════════════════════════════════
    // INVOCATION LEVEL
    // ═══════════════════════════════════════════
    InvocationStarted {
        instance_id: Arc<str>,
        function: String,
        binding_data: Value,
    },
    InvocationCompleted {
        instance_id: Arc<str>,
        duration_ms: u64,
    },
    InvocationFailed {
        instance_id: Arc<str>,
        error: String,
        code: String,
    },

    // ═══════════════════════════════════════════
    // BINDINGS / LOCKS
    // ═══════════════════════════════════════════
    BindingResolved {
        instance_id: Arc<str>,
        binding: String,
        attribute: String,
    },
    LockAcquired {
        instance_id: Arc<str>,
        lock_id: String,
    },
    LockReleased {
        instance_id: Arc<str>,
        lock_id: String,
    },

    // ═══════════════════════════════════════════
    // FILTERS / BODY
    // ═══════════════════════════════════════════
    FilterExecuting {
        instance_id: Arc<str>,
        filter: String,
    },
    FilterExecuted {
        instance_id: Arc<str>,
        filter: String,
    },
    FilterFailed {
        instance_id: Arc<str>,
        filter: String,
        phase: String,
        error: String,
    },
    BodyStarted {
        instance_id: Arc<str>,
    },
    BodyCompleted {
        instance_id: Arc<str>,
        duration_ms: u64,
    },
    BodyFailed {
        instance_id: Arc<str>,
        error: String,
    },
}

impl EventKind {
    pub fn instance_id(&self) -> &str {
        match self {
            Self::InvocationStarted { instance_id, .. }
            | Self::InvocationCompleted { instance_id, .. }
            | Self::InvocationFailed { instance_id, .. }
            | Self::BindingResolved { instance_id, .. }
            | Self::LockAcquired { instance_id, .. }
            | Self::LockReleased { instance_id, .. }
            | Self::FilterExecuting { instance_id, .. }
            | Self::FilterExecuted { instance_id, .. }
            | Self::FilterFailed { instance_id, .. }
            | Self::BodyStarted { instance_id }
            | Self::BodyCompleted { instance_id, .. }
            | Self::BodyFailed { instance_id, .. } => instance_id,
        }
    }

    pub(crate) fn filter_failed(
        instance_id: &Arc<str>,
        filter: &str,
        phase: FilterPhase,
        error: &dyn std::fmt::Display,
    ) -> Self {
        Self::FilterFailed {
            instance_id: Arc::clone(instance_id),
            filter: filter.to_string(),
            phase: phase.to_string(),
            error: error.to_string(),
        }
    }
}

/// Thread-safe, append-only invocation log
#[derive(Clone)]
pub struct InvocationLog {
    events: Arc<RwLock<Vec<InvocationEvent>>>,
    start_time: Instant,
    next_id: Arc<AtomicU64>,
}

impl InvocationLog {
    pub fn new() -> Self {
        Self {
            events: Arc::new(RwLock::new(Vec::new())),
            start_time: Instant::now(),
            next_id: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Emit an event (returns event ID)
    pub fn emit(&self, kind: EventKind) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let event = InvocationEvent {
            id,
            timestamp_ms: self.start_time.elapsed().as_millis() as u64,
            recorded_at: Utc::now(),
            kind,
        };
        self.events.write().push(event);
        id
    }

    pub fn events(&self) -> Vec<InvocationEvent> {
        self.events.read().clone()
    }

    /// Zero-copy access; holds the read lock for the callback's duration
    pub fn with_events<T>(&self, f: impl FnOnce(&[InvocationEvent]) -> T) -> T {
        f(&self.events.read())
    }

    /// Events of one invocation, in emission order
    pub fn for_instance(&self, instance_id: &str) -> Vec<InvocationEvent> {
        self.with_events(|events| {
            events
                .iter()
                .filter(|e| e.kind.instance_id() == instance_id)
                .cloned()
                .collect()
        })
    }

    pub fn to_json(&self) -> Value {
        self.with_events(|events| serde_json::to_value(events).unwrap_or(Value::Null))
    }

    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InvocationLog {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InvocationLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InvocationLog")
            .field("len", &self.len())
            .finish()
    }
}
