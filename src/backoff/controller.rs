//! Per-endpoint rate-limit bookkeeping and retry delays

use chrono::Utc;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::ThrottleSignal;
use crate::config::{DEFAULT_COOLDOWN, JITTER_FACTOR, MAX_COOLDOWN};

/// Rate limit observed for one endpoint key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitState {
    /// Server-advised or default cool-down in seconds
    pub retry_after_seconds: u64,
    /// Quota left when the limit was recorded (informational)
    pub remaining_requests: u32,
    /// When the limit clears
    pub reset_at: Instant,
}

impl RateLimitState {
    /// A state is active until `reset_at`
    pub fn is_active_at(&self, now: Instant) -> bool {
        now < self.reset_at
    }
}

/// Tracks throttling per endpoint and computes retry delays
///
/// Purely advisory: nothing here sleeps or fails. The orchestrator decides
/// whether and how long to wait. Instances are meant to be created once and
/// shared by reference (or `Arc`).
#[derive(Debug)]
pub struct BackoffController {
    states: RwLock<HashMap<String, RateLimitState>>,
    default_cooldown: Duration,
}

impl Default for BackoffController {
    fn default() -> Self {
        Self::new()
    }
}

impl BackoffController {
    /// Creates a controller using the standard 60 second default cool-down
    pub fn new() -> Self {
        Self::with_default_cooldown(DEFAULT_COOLDOWN)
    }

    /// Creates a controller with a custom cool-down for hint-less throttling
    pub fn with_default_cooldown(default_cooldown: Duration) -> Self {
        Self {
            states: RwLock::new(HashMap::new()),
            default_cooldown,
        }
    }

    /// How long to wait before calling `endpoint_key` again
    ///
    /// Zero when no active limit is recorded.
    pub fn wait_time(&self, endpoint_key: &str) -> Duration {
        let now = Instant::now();
        self.states
            .read()
            .get(endpoint_key)
            .filter(|state| state.is_active_at(now))
            .map(|state| state.reset_at.saturating_duration_since(now))
            .unwrap_or(Duration::ZERO)
    }

    /// Returns the active limit for `endpoint_key`, if any
    pub fn state(&self, endpoint_key: &str) -> Option<RateLimitState> {
        let now = Instant::now();
        self.states
            .read()
            .get(endpoint_key)
            .filter(|state| state.is_active_at(now))
            .cloned()
    }

    /// Records a throttling signal for `endpoint_key`, replacing any previous state
    ///
    /// The cool-down comes from `Retry-After`, then from the reset time, then
    /// from the default so an unresponsive server is never hammered. The
    /// cool-down is capped at [`MAX_COOLDOWN`].
    pub fn record_limit(&self, endpoint_key: &str, signal: &ThrottleSignal) -> RateLimitState {
        let requested_seconds = signal
            .retry_after_seconds
            .or_else(|| signal.seconds_until_reset(Utc::now()))
            .unwrap_or_else(|| self.default_cooldown.as_secs());

        let max_seconds = MAX_COOLDOWN.as_secs();
        if requested_seconds > max_seconds {
            warn!(
                endpoint = endpoint_key,
                requested_secs = requested_seconds,
                max_wait = max_seconds,
                "Rate limit cool-down too long, capping wait time"
            );
        }
        let retry_after_seconds = requested_seconds.min(max_seconds);

        let now = Instant::now();
        let state = RateLimitState {
            retry_after_seconds,
            remaining_requests: signal.remaining_requests.unwrap_or(0),
            reset_at: now
                .checked_add(Duration::from_secs(retry_after_seconds))
                .unwrap_or(now),
        };

        warn!(
            endpoint = endpoint_key,
            retry_after_secs = retry_after_seconds,
            remaining = state.remaining_requests,
            "Rate limit recorded"
        );

        let mut states = self.states.write();
        states.retain(|_, existing| existing.is_active_at(now));
        states.insert(endpoint_key.to_string(), state.clone());
        state
    }

    /// Drops every inactive state, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut states = self.states.write();
        let before = states.len();
        states.retain(|_, state| state.is_active_at(now));
        let purged = before - states.len();
        if purged > 0 {
            debug!(purged, "Purged expired rate limits");
        }
        purged
    }

    /// Forgets every recorded limit
    pub fn clear(&self) {
        self.states.write().clear();
    }

    /// Number of states currently held, active or not
    pub fn tracked_endpoints(&self) -> usize {
        self.states.read().len()
    }
}

/// Exponential backoff for the given 1-based attempt
///
/// `min(base * 2^(attempt - 1), max)` plus up to 10% random jitter, so the
/// result never exceeds `max * 1.1`. Saturates at `Duration::MAX`.
pub fn backoff_delay(attempt: u32, base_delay: Duration, max_delay: Duration) -> Duration {
    let exponent = attempt.saturating_sub(1).min(31);
    let delay = base_delay
        .checked_mul(1u32 << exponent)
        .unwrap_or(max_delay)
        .min(max_delay);

    let jitter = fastrand::f64() * JITTER_FACTOR;
    delay.saturating_add(delay.mul_f64(jitter))
}
