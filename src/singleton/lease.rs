//! Lease Store - the only shared mutable state of singleton coordination
//!
//! Leases are keyed by lock id and owned by a holder id. A lease that is
//! not renewed before its period elapses may be taken by another holder.

use std::time::Duration;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::time::Instant;

use crate::error::Result;

/// Backing store for singleton leases
#[async_trait]
pub trait LeaseStore: Send + Sync {
    /// Take the lease if it is free, expired or already ours
    async fn try_acquire(&self, lock_id: &str, holder_id: &str, period: Duration) -> Result<bool>;

    /// Extend a lease we hold; `false` if it was lost
    async fn renew(&self, lock_id: &str, holder_id: &str, period: Duration) -> Result<bool>;

    /// Give up a lease; releasing someone else's lease is a no-op
    async fn release(&self, lock_id: &str, holder_id: &str) -> Result<()>;

    /// Current holder of an unexpired lease
    async fn owner(&self, lock_id: &str) -> Result<Option<String>>;
}

#[derive(Debug, Clone)]
struct LeaseRecord {
    holder_id: String,
    expires_at: Instant,
}

impl LeaseRecord {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

/// In-process lease store with expiry
#[derive(Debug, Default)]
pub struct InMemoryLeaseStore {
    leases: DashMap<String, LeaseRecord>,
}

impl InMemoryLeaseStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live leases
    pub fn active(&self) -> usize {
        self.prune_expired();
        self.leases.len()
    }

    /// Records currently stored, including expired ones not yet pruned
    pub fn len(&self) -> usize {
        self.leases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.leases.is_empty()
    }

    /// Drop leases whose holders stopped renewing; returns how many went
    pub fn prune_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.leases.len();
        self.leases.retain(|_, record| record.is_live(now));
        before.saturating_sub(self.leases.len())
    }
}

#[async_trait]
impl LeaseStore for InMemoryLeaseStore {
    async fn try_acquire(&self, lock_id: &str, holder_id: &str, period: Duration) -> Result<bool> {
        // abandoned leases would otherwise stay forever
        self.prune_expired();
        let now = Instant::now();
        let record = LeaseRecord {
            holder_id: holder_id.to_string(),
            expires_at: now + period,
        };

        match self.leases.entry(lock_id.to_string()) {
            Entry::Vacant(slot) => {
                slot.insert(record);
                Ok(true)
            }
            Entry::Occupied(mut slot) => {
                let current = slot.get();
                if current.holder_id == holder_id || !current.is_live(now) {
                    slot.insert(record);
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
        }
    }

    async fn renew(&self, lock_id: &str, holder_id: &str, period: Duration) -> Result<bool> {
        let now = Instant::now();
        match self.leases.get_mut(lock_id) {
            Some(mut record) if record.holder_id == holder_id && record.is_live(now) => {
                record.expires_at = now + period;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn release(&self, lock_id: &str, holder_id: &str) -> Result<()> {
        self.leases
            .remove_if(lock_id, |_, record| record.holder_id == holder_id);
        Ok(())
    }

    async fn owner(&self, lock_id: &str) -> Result<Option<String>> {
        let now = Instant::now();
        Ok(self
            .leases
            .get(lock_id)
            .filter(|record| record.is_live(now))
            .map(|record| record.holder_id.clone()))
    }
}
