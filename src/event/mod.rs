//! Event Module - invocation audit trail
//!
//! Key types:
//! - `InvocationEvent`: envelope with id + timestamp + kind
//! - `EventKind`: invocation, binding, lock, filter and body events
//! - `InvocationLog`: thread-safe, append-only log
//! - `EventEmitter`: trait for dependency injection
//! - `NoopEmitter`: no-op emitter when no trail is wanted

mod emitter;
mod log;

pub use emitter::{EventEmitter, NoopEmitter};
pub use log::{EventKind, InvocationEvent, InvocationLog};
