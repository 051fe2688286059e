//! Lock acquisition options

use std::time::Duration;

/// Default lease validity
pub const DEFAULT_TTL: Duration = Duration::from_secs(60);

/// Default number of re-attempts after the first refused acquisition
pub const DEFAULT_RETRIES: u32 = 10;

/// Default delay between acquisition attempts
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_millis(10);

/// Options for one critical-section invocation
///
/// `ttl` bounds how long the store keeps the lease alive and must cover the
/// expected duration of the unit of work: once it elapses the store may hand
/// the key to another caller even if the original holder is still running.
/// The default of one minute is short, so long-running sections must raise it.
///
/// Worst-case blocking before acquisition fails is roughly
/// `(retries + 1) * retry_interval` plus the store round-trips.
#[derive(Debug, Clone)]
pub struct LockOptions {
    /// Lease validity duration
    pub ttl: Duration,
    /// Re-attempts after the first refused acquisition
    pub retries: u32,
    /// Delay between acquisition attempts
    pub retry_interval: Duration,
}

impl Default for LockOptions {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_TTL,
            retries: DEFAULT_RETRIES,
            retry_interval: DEFAULT_RETRY_INTERVAL,
        }
    }
}

impl LockOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn with_retry_interval(mut self, retry_interval: Duration) -> Self {
        self.retry_interval = retry_interval;
        self
    }
}
