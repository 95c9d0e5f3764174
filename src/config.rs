//! Default tuning for the resilience layer
//!
//! Every "magic number" the layer relies on lives here as a named constant and
//! flows to call sites through [`ResilienceOptions`].

use std::time::Duration;

/// Cool-down applied when a throttling response carries no retry hint
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(60);

/// Longest cool-down honoured from a server hint; larger hints are clamped
pub const MAX_COOLDOWN: Duration = Duration::from_secs(3600);

/// Time-to-live for entries written after a successful call
pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

/// Number of throttled attempts before falling back to the cache
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// First backoff step
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(1000);

/// Upper bound for a backoff step, before jitter
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_millis(60_000);

/// Maximum jitter as a fraction of the computed backoff
pub const JITTER_FACTOR: f64 = 0.1;

/// Per-call tuning for [`crate::resilience::ResilientClient`]
#[derive(Debug, Clone, PartialEq)]
pub struct ResilienceOptions {
    /// Throttled attempts allowed before falling back
    pub max_retries: u32,
    /// First backoff step
    pub base_delay: Duration,
    /// Backoff cap (jitter may add up to 10% on top)
    pub max_delay: Duration,
    /// Lifetime of the entry written on success
    pub ttl: Duration,
    /// Whether the durable cache tier is read and written
    pub use_durable_tier: bool,
    /// Upper bound for a single attempt; `None` leaves it to the operation
    pub attempt_timeout: Option<Duration>,
    /// Treat a timed-out attempt like a throttled one instead of failing fast
    pub retry_on_timeout: bool,
    /// Serve a fresh cached value without calling the operation
    pub prefer_cache: bool,
}

impl Default for ResilienceOptions {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            ttl: DEFAULT_TTL,
            use_durable_tier: true,
            attempt_timeout: None,
            retry_on_timeout: false,
            prefer_cache: false,
        }
    }
}

impl ResilienceOptions {
    /// Sets the number of throttled attempts before falling back
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Sets the backoff base and cap
    pub fn with_backoff(mut self, base_delay: Duration, max_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self.max_delay = max_delay;
        self
    }

    /// Sets the TTL used for the write-through on success
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Enables or disables the durable cache tier
    pub fn with_durable_tier(mut self, enabled: bool) -> Self {
        self.use_durable_tier = enabled;
        self
    }

    /// Bounds every attempt by `timeout`
    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = Some(timeout);
        self
    }

    /// Makes timed-out attempts retryable
    pub fn with_retry_on_timeout(mut self, retry: bool) -> Self {
        self.retry_on_timeout = retry;
        self
    }

    /// Serves fresh cache hits before touching the network
    pub fn with_prefer_cache(mut self, prefer: bool) -> Self {
        self.prefer_cache = prefer;
        self
    }

    /// Attempts actually made; zero is treated as a single attempt
    pub(crate) fn attempt_budget(&self) -> u32 {
        self.max_retries.max(1)
    }
}
