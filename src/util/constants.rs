//! Centralized constants for Weft runtime configuration
//!
//! All timeout and period values in one place for easy tuning.

use std::time::Duration;

// ═══════════════════════════════════════════════════════════════
// Singleton Leases
// ═══════════════════════════════════════════════════════════════

/// Lease period for function-mode singleton locks
pub const LOCK_PERIOD: Duration = Duration::from_secs(15);

/// Lease period for listener-mode singleton locks
pub const LISTENER_LOCK_PERIOD: Duration = Duration::from_secs(60);

/// How long an invocation waits for a singleton lock before failing
pub const LOCK_ACQUISITION_TIMEOUT: Duration = Duration::from_secs(60);

/// Delay between lock acquisition attempts
pub const LOCK_ACQUISITION_POLLING_INTERVAL: Duration = Duration::from_secs(1);

/// Delay between attempts to take over a listener lock held elsewhere
pub const LISTENER_LOCK_RECOVERY_POLLING_INTERVAL: Duration = Duration::from_secs(60);

/// Shortest lease period accepted from configuration
pub const MINIMUM_LOCK_PERIOD: Duration = Duration::from_millis(500);

// ═══════════════════════════════════════════════════════════════
// Invocation
// ═══════════════════════════════════════════════════════════════

/// Time a timed-out function gets to observe its cancellation token
pub const TIMEOUT_GRACE_PERIOD: Duration = Duration::from_secs(2);

/// Binding name used for a function's return value
pub const RETURN_BINDING_NAME: &str = "$return";

/// Host id used when none is configured
pub const DEFAULT_HOST_ID: &str = "weft-host";

// ═══════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listener_lock_outlives_function_lock() {
        assert!(LISTENER_LOCK_PERIOD > LOCK_PERIOD);
    }

    #[test]
    fn minimum_lock_period_is_below_default() {
        assert!(MINIMUM_LOCK_PERIOD < LOCK_PERIOD);
    }

    #[test]
    fn polling_is_shorter_than_timeout() {
        assert!(LOCK_ACQUISITION_POLLING_INTERVAL < LOCK_ACQUISITION_TIMEOUT);
    }
}
