//! Failures reported by wrapped operations and by the orchestrator

use thiserror::Error;

use crate::backoff::ThrottleSignal;

/// How a single attempt of a wrapped operation failed
///
/// Operations must tell throttling apart from everything else; only the
/// former is retried.
#[derive(Debug, Error)]
pub enum CallError<E> {
    /// The server imposed a rate limit (HTTP 429)
    #[error("Throttled by upstream")]
    Throttled(ThrottleSignal),

    /// The attempt ran out of time
    #[error("Attempt timed out")]
    TimedOut,

    /// Any other failure: network, 5xx, malformed response
    #[error("{0}")]
    Failed(E),
}

impl<E> CallError<E> {
    /// Shorthand for a throttle without metadata
    pub fn throttled() -> Self {
        CallError::Throttled(ThrottleSignal::new())
    }

    pub fn is_throttled(&self) -> bool {
        matches!(self, CallError::Throttled(_))
    }
}

/// Error returned to callers when no cached value could stand in
#[derive(Debug, Error)]
pub enum ResilienceError<E> {
    /// Every attempt was throttled
    #[error("Rate limit exceeded for '{key}' after {attempts} attempts, retry in {retry_after_seconds}s")]
    RateLimitExceeded {
        key: String,
        attempts: u32,
        /// Last known cool-down, for caller-side messaging or rescheduling
        retry_after_seconds: u64,
    },

    /// The operation failed with a non-throttling error
    #[error("Request for '{key}' failed after {attempts} attempt(s): {error}")]
    OperationFailed { key: String, attempts: u32, error: E },

    /// The last attempt timed out
    #[error("Request for '{key}' timed out after {attempts} attempt(s)")]
    TimedOut { key: String, attempts: u32 },

    /// The network was reported offline so nothing was attempted
    #[error("Offline and nothing cached for '{key}'")]
    Offline { key: String },
}

impl<E> ResilienceError<E> {
    /// The key the failed call was made for
    pub fn key(&self) -> &str {
        match self {
            ResilienceError::RateLimitExceeded { key, .. }
            | ResilienceError::OperationFailed { key, .. }
            | ResilienceError::TimedOut { key, .. }
            | ResilienceError::Offline { key } => key,
        }
    }

    /// Attempts made before giving up
    pub fn attempts(&self) -> u32 {
        match self {
            ResilienceError::RateLimitExceeded { attempts, .. }
            | ResilienceError::OperationFailed { attempts, .. }
            | ResilienceError::TimedOut { attempts, .. } => *attempts,
            ResilienceError::Offline { .. } => 0,
        }
    }

    /// Cool-down to show the user, only for rate-limit failures
    pub fn retry_after_seconds(&self) -> Option<u64> {
        match self {
            ResilienceError::RateLimitExceeded {
                retry_after_seconds,
                ..
            } => Some(*retry_after_seconds),
            _ => None,
        }
    }

    /// Short message suitable for end users
    pub fn user_message(&self) -> String {
        match self {
            ResilienceError::RateLimitExceeded {
                retry_after_seconds,
                ..
            } => format!("Too many requests, try again in {retry_after_seconds} seconds."),
            ResilienceError::Offline { .. } => {
                "You appear to be offline and this data has not been loaded before.".to_string()
            }
            ResilienceError::OperationFailed { .. } | ResilienceError::TimedOut { .. } => {
                "Could not load data. Please try again later.".to_string()
            }
        }
    }
}
