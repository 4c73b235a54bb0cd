//! Singleton Coordination - lease-based mutual exclusion
//!
//! - `lease`: `LeaseStore` capability + in-memory implementation
//! - `manager`: lock ids, polling acquisition, renewal, release
//! - `listener`: listener-mode locking with a recovery poller
//!
//! Two lock kinds compose independently: a listener lock (one host
//! instance listens for a trigger) and an invocation lock (one concurrent
//! execution per scope key).

mod lease;
mod listener;
mod manager;

pub use lease::{InMemoryLeaseStore, LeaseStore};
pub use listener::{Listener, SingletonListener};
pub use manager::{
    format_lock_id, SingletonAttribute, SingletonLock, SingletonManager, SingletonMode,
    SingletonScope,
};
