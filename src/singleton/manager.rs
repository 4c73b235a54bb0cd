//! Singleton Manager - lease acquisition, renewal and release
//!
//! Lock ids:
//! ```text
//! function scope: {host_id}/{function}            (no scope id)
//!                 {host_id}/{function}.{scope_id}
//! host scope:     {host_id}/{scope_id}
//! listener:       {host_id}/{function}.Listener
//! ```
//!
//! Acquisition polls the lease store on a fixed interval until the
//! timeout elapses. A held lease is renewed in the background at half its
//! period until released.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::binding::{BindingData, BindingTemplate, EnvNameResolver, NameResolver};
use crate::config::SingletonConfig;
use crate::error::{Result, WeftError};

use super::lease::LeaseStore;

/// What the lock id is scoped to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SingletonScope {
    /// Per function (plus optional scope id)
    #[default]
    Function,
    /// Shared by every function using the same scope id
    Host,
}

/// What the lock serialises
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SingletonMode {
    /// Each invocation holds the lock while it runs
    #[default]
    Function,
    /// At most one host instance runs the trigger listener
    Listener,
}

/// Singleton declaration attached to a function
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SingletonAttribute {
    /// Scope expression, may contain `{parameter}` and `%setting%` tokens
    pub scope_id: Option<String>,
    pub scope: SingletonScope,
    pub mode: SingletonMode,
    /// Overrides the configured acquisition timeout
    pub lock_acquisition_timeout: Option<Duration>,
}

impl SingletonAttribute {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_scope_id(mut self, scope_id: impl Into<String>) -> Self {
        self.scope_id = Some(scope_id.into());
        self
    }

    pub fn with_scope(mut self, scope: SingletonScope) -> Self {
        self.scope = scope;
        self
    }

    pub fn with_mode(mut self, mode: SingletonMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_lock_acquisition_timeout(mut self, timeout: Duration) -> Self {
        self.lock_acquisition_timeout = Some(timeout);
        self
    }

    /// Check the combination is meaningful for a function
    pub fn validate(&self, function_is_triggered: bool) -> Result<()> {
        let invalid = |reason: &str| {
            Err(WeftError::InvalidSingleton {
                reason: reason.to_string(),
            })
        };

        let has_scope_id = self
            .scope_id
            .as_deref()
            .is_some_and(|s| !s.trim().is_empty());
        if self.scope == SingletonScope::Host && !has_scope_id {
            return invalid("a scope id is required when using host scope");
        }
        if self.mode == SingletonMode::Listener {
            if self.scope == SingletonScope::Host {
                return invalid("listener mode cannot be combined with host scope");
            }
            if !function_is_triggered {
                return invalid("listener mode requires a triggered function");
            }
        }
        Ok(())
    }
}

/// Build a lock id
pub fn format_lock_id(host_id: &str, function: &str, scope: SingletonScope, scope_id: &str) -> String {
    match scope {
        SingletonScope::Host => format!("{}/{}", host_id, scope_id),
        SingletonScope::Function if scope_id.is_empty() => format!("{}/{}", host_id, function),
        SingletonScope::Function => format!("{}/{}.{}", host_id, function, scope_id),
    }
}

/// A held lease; dropping it stops renewal (the lease then expires)
pub struct SingletonLock {
    lock_id: String,
    holder_id: String,
    renewal_stop: CancellationToken,
    renewal: Option<JoinHandle<()>>,
}

impl SingletonLock {
    pub fn lock_id(&self) -> &str {
        &self.lock_id
    }

    pub fn holder_id(&self) -> &str {
        &self.holder_id
    }
}

impl fmt::Debug for SingletonLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SingletonLock")
            .field("lock_id", &self.lock_id)
            .field("holder_id", &self.holder_id)
            .finish()
    }
}

impl Drop for SingletonLock {
    fn drop(&mut self) {
        self.renewal_stop.cancel();
    }
}

/// Coordinates singleton leases for a host
#[derive(Clone)]
pub struct SingletonManager {
    store: Arc<dyn LeaseStore>,
    config: SingletonConfig,
    host_id: String,
    names: Arc<dyn NameResolver>,
}

impl SingletonManager {
    pub fn new(store: Arc<dyn LeaseStore>, config: SingletonConfig, host_id: impl Into<String>) -> Self {
        Self {
            store,
            config,
            host_id: host_id.into(),
            names: Arc::new(EnvNameResolver),
        }
    }

    pub fn with_name_resolver(mut self, names: Arc<dyn NameResolver>) -> Self {
        self.names = names;
        self
    }

    pub fn config(&self) -> &SingletonConfig {
        &self.config
    }

    pub fn host_id(&self) -> &str {
        &self.host_id
    }

    pub fn format_lock_id(&self, function: &str, scope: SingletonScope, scope_id: &str) -> String {
        format_lock_id(&self.host_id, function, scope, scope_id)
    }

    /// Listener lock id; a scope id goes between the function and the suffix
    pub fn listener_lock_id(&self, function: &str, scope_id: &str) -> String {
        format!("{}.Listener", self.format_lock_id(function, SingletonScope::Function, scope_id))
    }

    /// Resolve a scope expression against an invocation's binding data
    ///
    /// `%setting%` tokens are resolved first, then `{parameter}` tokens.
    pub fn bound_scope_id(&self, scope_expr: Option<&str>, data: &BindingData) -> Result<String> {
        let Some(expr) = scope_expr.filter(|e| !e.is_empty()) else {
            return Ok(String::new());
        };
        let resolved = self.names.resolve_whole_string(expr)?;
        let template = BindingTemplate::parse(&resolved)?;
        Ok(template.bind(Some(data))?.into_owned())
    }

    /// Lock id for one invocation of `function`
    pub fn invocation_lock_id(
        &self,
        function: &str,
        attribute: &SingletonAttribute,
        data: &BindingData,
    ) -> Result<String> {
        let scope_id = self.bound_scope_id(attribute.scope_id.as_deref(), data)?;
        Ok(self.format_lock_id(function, attribute.scope, &scope_id))
    }

    /// One acquisition attempt; starts renewal on success
    pub async fn try_lock(&self, lock_id: &str, holder_id: &str, period: Duration) -> Result<Option<SingletonLock>> {
        if !self.store.try_acquire(lock_id, holder_id, period).await? {
            return Ok(None);
        }
        debug!(lock_id, holder_id, "singleton lock acquired");

        let renewal_stop = CancellationToken::new();
        let renewal = self.spawn_renewal(lock_id, holder_id, period, renewal_stop.clone());
        Ok(Some(SingletonLock {
            lock_id: lock_id.to_string(),
            holder_id: holder_id.to_string(),
            renewal_stop,
            renewal: Some(renewal),
        }))
    }

    /// Acquire, polling until `timeout` elapses
    #[instrument(skip(self))]
    pub async fn lock(&self, lock_id: &str, holder_id: &str, timeout: Duration) -> Result<SingletonLock> {
        let deadline = Instant::now() + timeout;
        let poll = self.config.lock_acquisition_polling_interval;

        loop {
            if let Some(lock) = self.try_lock(lock_id, holder_id, self.config.lock_period).await? {
                return Ok(lock);
            }

            let now = Instant::now();
            if now >= deadline {
                warn!(lock_id, "singleton lock acquisition timed out");
                return Err(WeftError::LockAcquisitionTimeout {
                    lock_id: lock_id.to_string(),
                    timeout_ms: timeout.as_millis() as u64,
                });
            }
            tokio::time::sleep(poll.min(deadline - now)).await;
        }
    }

    /// Acquire the invocation lock for an attribute
    pub async fn lock_for(&self, lock_id: &str, holder_id: &str, attribute: &SingletonAttribute) -> Result<SingletonLock> {
        let timeout = attribute
            .lock_acquisition_timeout
            .unwrap_or(self.config.lock_acquisition_timeout);
        self.lock(lock_id, holder_id, timeout).await
    }

    /// Stop renewal and give the lease back
    pub async fn release(&self, mut lock: SingletonLock) -> Result<()> {
        lock.renewal_stop.cancel();
        if let Some(handle) = lock.renewal.take() {
            // renewal exits promptly once cancelled
            let _ = handle.await;
        }
        self.store.release(&lock.lock_id, &lock.holder_id).await?;
        debug!(lock_id = %lock.lock_id, "singleton lock released");
        Ok(())
    }

    /// Holder of a live lease
    pub async fn lock_owner(&self, lock_id: &str) -> Result<Option<String>> {
        self.store.owner(lock_id).await
    }

    fn spawn_renewal(&self, lock_id: &str, holder_id: &str, period: Duration, stop: CancellationToken) -> JoinHandle<()> {
        let store = Arc::clone(&self.store);
        let lock_id = lock_id.to_string();
        let holder_id = holder_id.to_string();
        // renew well inside the period, however short it is
        let interval = period / 2;

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = stop.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {}
                }
                match store.renew(&lock_id, &holder_id, period).await {
                    Ok(true) => {}
                    Ok(false) => {
                        warn!(lock_id = %lock_id, "singleton lease lost before renewal");
                        break;
                    }
                    Err(e) => warn!(lock_id = %lock_id, error = %e, "singleton lease renewal failed"),
                }
            }
        })
    }
}

impl fmt::Debug for SingletonManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SingletonManager")
            .field("host_id", &self.host_id)
            .field("config", &self.config)
            .finish()
    }
}
