//! Host Configuration
//!
//! Loaded from a TOML file, then overridden by environment variables.
//!
//! ## Priority Order (highest to lowest)
//!
//! 1. Environment variables (`WEFT_HOST_ID`, `WEFT_FUNCTION_TIMEOUT_SECS`,
//!    `WEFT_EXTENSIONS_MANIFEST`)
//! 2. Config file
//! 3. Defaults
//!
//! ```toml
//! host_id = "orders-host"
//! function_timeout = 300
//! extensions_manifest = "extensions.json"
//!
//! [singleton]
//! lock_period = 15
//! lock_acquisition_timeout = 60
//!
//! [app_settings]
//! ORDERS_QUEUE = "orders"
//! ```
//!
//! Durations are written in seconds (fractions allowed).

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::binding::DictionaryNameResolver;
use crate::error::{Result, WeftError};
use crate::util::constants::{
    DEFAULT_HOST_ID, LISTENER_LOCK_PERIOD, LISTENER_LOCK_RECOVERY_POLLING_INTERVAL,
    LOCK_ACQUISITION_POLLING_INTERVAL, LOCK_ACQUISITION_TIMEOUT, LOCK_PERIOD,
    MINIMUM_LOCK_PERIOD, TIMEOUT_GRACE_PERIOD,
};

/// Host-level configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HostConfig {
    /// Prefix of every singleton lock id
    pub host_id: String,

    /// Per-invocation timeout; `None` means unbounded
    #[serde(with = "secs_opt", skip_serializing_if = "Option::is_none")]
    pub function_timeout: Option<Duration>,

    /// How long a timed-out body gets to honour cancellation
    #[serde(with = "secs")]
    pub timeout_grace: Duration,

    /// Extension manifest to load at startup
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extensions_manifest: Option<PathBuf>,

    pub singleton: SingletonConfig,

    /// Values for `%setting%` tokens in binding declarations
    pub app_settings: HashMap<String, String>,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            host_id: DEFAULT_HOST_ID.to_string(),
            function_timeout: None,
            timeout_grace: TIMEOUT_GRACE_PERIOD,
            extensions_manifest: None,
            singleton: SingletonConfig::default(),
            app_settings: HashMap::new(),
        }
    }
}

/// Singleton lease timings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SingletonConfig {
    /// Lease length for invocation locks (renewed at half this period)
    #[serde(with = "secs")]
    pub lock_period: Duration,
    /// Lease length for listener locks
    #[serde(with = "secs")]
    pub listener_lock_period: Duration,
    /// Default time to wait for a lock before failing the invocation
    #[serde(with = "secs")]
    pub lock_acquisition_timeout: Duration,
    #[serde(with = "secs")]
    pub lock_acquisition_polling_interval: Duration,
    /// Retry interval for a listener that did not get its lock
    #[serde(with = "secs")]
    pub listener_lock_recovery_polling_interval: Duration,
}

impl Default for SingletonConfig {
    fn default() -> Self {
        Self {
            lock_period: LOCK_PERIOD,
            listener_lock_period: LISTENER_LOCK_PERIOD,
            lock_acquisition_timeout: LOCK_ACQUISITION_TIMEOUT,
            lock_acquisition_polling_interval: LOCK_ACQUISITION_POLLING_INTERVAL,
            listener_lock_recovery_polling_interval: LISTENER_LOCK_RECOVERY_POLLING_INTERVAL,
        }
    }
}

impl SingletonConfig {
    pub fn validate(&self) -> Result<()> {
        let checks = [
            ("lock_period", self.lock_period),
            ("listener_lock_period", self.listener_lock_period),
            ("lock_acquisition_polling_interval", self.lock_acquisition_polling_interval),
            (
                "listener_lock_recovery_polling_interval",
                self.listener_lock_recovery_polling_interval,
            ),
        ];
        for (name, value) in checks {
            if value.is_zero() {
                return Err(WeftError::Config {
                    reason: format!("singleton.{} must be greater than zero", name),
                });
            }
        }
        for (name, value) in [
            ("lock_period", self.lock_period),
            ("listener_lock_period", self.listener_lock_period),
        ] {
            if value < MINIMUM_LOCK_PERIOD {
                return Err(WeftError::Config {
                    reason: format!(
                        "singleton.{} must be at least {}ms",
                        name,
                        MINIMUM_LOCK_PERIOD.as_millis()
                    ),
                });
            }
        }
        Ok(())
    }
}

impl HostConfig {
    /// Load configuration from a TOML file
    ///
    /// Returns defaults if the file doesn't exist, an error if it exists
    /// but is malformed.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|e| WeftError::Config {
            reason: format!("Failed to read config file: {}", e),
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).map_err(|e| WeftError::Config {
            reason: format!("Failed to parse config file: {}", e),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Merge with environment variables (env wins)
    pub fn with_env(mut self) -> Result<Self> {
        if let Ok(host_id) = std::env::var("WEFT_HOST_ID") {
            if !host_id.is_empty() {
                self.host_id = host_id;
            }
        }

        if let Ok(raw) = std::env::var("WEFT_FUNCTION_TIMEOUT_SECS") {
            if !raw.is_empty() {
                let secs: f64 = raw.parse().map_err(|_| WeftError::Config {
                    reason: format!("WEFT_FUNCTION_TIMEOUT_SECS '{}' is not a number", raw),
                })?;
                self.function_timeout = Some(duration_from_secs(secs).map_err(|reason| WeftError::Config { reason })?);
            }
        }

        if let Ok(path) = std::env::var("WEFT_EXTENSIONS_MANIFEST") {
            if !path.is_empty() {
                self.extensions_manifest = Some(PathBuf::from(path));
            }
        }

        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        if self.host_id.trim().is_empty() {
            return Err(WeftError::Config {
                reason: "host_id must not be empty".to_string(),
            });
        }
        if self.function_timeout.is_some_and(|t| t.is_zero()) {
            return Err(WeftError::Config {
                reason: "function_timeout must be greater than zero".to_string(),
            });
        }
        self.singleton.validate()
    }

    /// Name resolver over `app_settings`, falling back to the environment
    pub fn name_resolver(&self) -> DictionaryNameResolver {
        DictionaryNameResolver::new(self.app_settings.clone()).with_env_fallback()
    }
}

fn duration_from_secs(secs: f64) -> std::result::Result<Duration, String> {
    Duration::try_from_secs_f64(secs).map_err(|e| format!("invalid duration {}: {}", secs, e))
}

mod secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        super::duration_from_secs(secs).map_err(serde::de::Error::custom)
    }
}

mod secs_opt {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => serializer.serialize_f64(d.as_secs_f64()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Duration>, D::Error> {
        Option::<f64>::deserialize(deserializer)?
            .map(|secs| super::duration_from_secs(secs).map_err(serde::de::Error::custom))
            .transpose()
    }
}
