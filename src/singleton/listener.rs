//! Singleton Listener - at most one host instance listens for a trigger
//!
//! On start the listener lock is tried once. If another instance holds it,
//! a recovery poller retries on the listener recovery interval and starts
//! the inner listener as soon as the lock is obtained. Stop cancels the
//! poller, stops the inner listener if it was started and releases the lock.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::binding::BindingData;
use crate::error::Result;

use super::manager::{SingletonLock, SingletonManager};

/// Trigger listener lifecycle
#[async_trait]
pub trait Listener: Send + Sync {
    async fn start(&self, cancellation: CancellationToken) -> Result<()>;
    async fn stop(&self) -> Result<()>;
}

#[derive(Default)]
struct ListenerState {
    lock: Option<SingletonLock>,
    recovery: Option<JoinHandle<()>>,
    recovery_stop: Option<CancellationToken>,
}

/// Wraps a listener so only the listener lock holder runs it
pub struct SingletonListener<L: Listener + 'static> {
    inner: Arc<L>,
    manager: SingletonManager,
    function: String,
    lock_id: String,
    holder_id: String,
    state: Arc<Mutex<ListenerState>>,
}

impl<L: Listener + 'static> SingletonListener<L> {
    pub fn new(inner: L, manager: SingletonManager, function: &str, holder_id: impl Into<String>) -> Self {
        let lock_id = manager.listener_lock_id(function, "");
        Self {
            inner: Arc::new(inner),
            manager,
            function: function.to_string(),
            lock_id,
            holder_id: holder_id.into(),
            state: Arc::new(Mutex::new(ListenerState::default())),
        }
    }

    /// Scope the listener lock; only `%setting%` tokens are resolved since
    /// no invocation data exists when a listener starts
    pub fn with_scope_id(mut self, scope_id: &str) -> Result<Self> {
        let scope_id = self.manager.bound_scope_id(Some(scope_id), &BindingData::new())?;
        self.lock_id = self.manager.listener_lock_id(&self.function, &scope_id);
        Ok(self)
    }

    pub fn lock_id(&self) -> &str {
        &self.lock_id
    }

    /// Whether this instance holds the listener lock (and runs the listener)
    pub async fn is_listening(&self) -> bool {
        self.state.lock().await.lock.is_some()
    }

    pub fn inner(&self) -> &L {
        &self.inner
    }

    fn spawn_recovery(&self, cancellation: CancellationToken, stop: CancellationToken) -> JoinHandle<()> {
        let inner = Arc::clone(&self.inner);
        let manager = self.manager.clone();
        let state = Arc::clone(&self.state);
        let lock_id = self.lock_id.clone();
        let holder_id = self.holder_id.clone();
        let interval = manager.config().listener_lock_recovery_polling_interval;
        let period = manager.config().listener_lock_period;

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = stop.cancelled() => return,
                    _ = cancellation.cancelled() => return,
                    _ = tokio::time::sleep(interval) => {}
                }

                match manager.try_lock(&lock_id, &holder_id, period).await {
                    Ok(Some(lock)) => {
                        let mut state = state.lock().await;
                        if stop.is_cancelled() {
                            drop(state);
                            let _ = manager.release(lock).await;
                            return;
                        }
                        info!(lock_id = %lock_id, "listener lock recovered, starting listener");
                        if let Err(e) = inner.start(cancellation.clone()).await {
                            warn!(lock_id = %lock_id, error = %e, "listener failed to start after recovery");
                            drop(state);
                            let _ = manager.release(lock).await;
                            return;
                        }
                        state.lock = Some(lock);
                        return;
                    }
                    Ok(None) => debug!(lock_id = %lock_id, "listener lock still held elsewhere"),
                    Err(e) => warn!(lock_id = %lock_id, error = %e, "listener lock recovery attempt failed"),
                }
            }
        })
    }
}

#[async_trait]
impl<L: Listener + 'static> Listener for SingletonListener<L> {
    async fn start(&self, cancellation: CancellationToken) -> Result<()> {
        let period = self.manager.config().listener_lock_period;
        let acquired = self.manager.try_lock(&self.lock_id, &self.holder_id, period).await?;

        let mut state = self.state.lock().await;
        match acquired {
            Some(lock) => {
                if let Err(e) = self.inner.start(cancellation).await {
                    drop(state);
                    self.manager.release(lock).await?;
                    return Err(e);
                }
                state.lock = Some(lock);
            }
            None => {
                debug!(lock_id = %self.lock_id, "listener lock held elsewhere, polling for recovery");
                let stop = CancellationToken::new();
                state.recovery = Some(self.spawn_recovery(cancellation, stop.clone()));
                state.recovery_stop = Some(stop);
            }
        }
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        let (recovery, stop) = {
            let mut state = self.state.lock().await;
            (state.recovery.take(), state.recovery_stop.take())
        };
        if let Some(stop) = stop {
            stop.cancel();
        }
        if let Some(handle) = recovery {
            let _ = handle.await;
        }

        let lock = self.state.lock().await.lock.take();
        if let Some(lock) = lock {
            let stopped = self.inner.stop().await;
            self.manager.release(lock).await?;
            stopped?;
        }
        Ok(())
    }
}
