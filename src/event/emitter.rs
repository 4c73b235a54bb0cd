//! EventEmitter Trait - lets the executor log to a real trail or nowhere

use super::log::{EventKind, InvocationLog};

/// Sink for invocation events
pub trait EventEmitter: Send + Sync {
    /// Emit an event and return its ID
    fn emit(&self, kind: EventKind) -> u64;
}

impl EventEmitter for InvocationLog {
    fn emit(&self, kind: EventKind) -> u64 {
        InvocationLog::emit(self, kind)
    }
}

/// Discards every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEmitter;

impl EventEmitter for NoopEmitter {
    fn emit(&self, _kind: EventKind) -> u64 {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn emitters_are_object_safe() {
        let log = InvocationLog::new();
        let emitters: Vec<Arc<dyn EventEmitter>> = vec![Arc::new(log.clone()), Arc::new(NoopEmitter)];
        for emitter in &emitters {
            emitter.emit(EventKind::BodyStarted {
                instance_id: "i".into(),
            });
        }
        assert_eq!(log.len(), 1);
    }
}
