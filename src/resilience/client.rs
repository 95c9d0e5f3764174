//! The resilient call primitive
//!
//! `ResilientClient::execute` wraps an unreliable operation: it waits out known
//! rate limits, retries throttled attempts with jittered backoff, writes
//! successes through to the cache and, when the call cannot succeed, serves the
//! last cached value even if it has expired.

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{AssumeOnline, CallError, Connectivity, ResilienceError};
use crate::backoff::{backoff_delay, BackoffController};
use crate::cache::{CachedData, FallbackCache, Tiers};
use crate::config::ResilienceOptions;

/// Where a returned value came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Fetched by this call
    Live,
    /// Served from the cache
    Cache {
        /// The entry had outlived its TTL
        stale: bool,
        /// When the entry was stored
        stored_at: DateTime<Utc>,
    },
}

/// Value produced by a resilient call
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome<T> {
    /// The data returned to the caller
    pub value: T,
    /// Whether `value` is live or came from the cache
    pub origin: Origin,
}

impl<T> Outcome<T> {
    fn live(value: T) -> Self {
        Self {
            value,
            origin: Origin::Live,
        }
    }

    fn cached(cached: CachedData<T>) -> Self {
        Self {
            value: cached.data,
            origin: Origin::Cache {
                stale: cached.is_expired,
                stored_at: cached.stored_at,
            },
        }
    }

    /// Discards the origin
    pub fn into_value(self) -> T {
        self.value
    }

    /// True when the value was fetched by this call
    pub fn is_live(&self) -> bool {
        self.origin == Origin::Live
    }

    /// True when the value is an expired cache entry
    pub fn is_stale(&self) -> bool {
        matches!(self.origin, Origin::Cache { stale: true, .. })
    }
}

/// Entry point for calls to unreliable, quota-limited APIs
///
/// Cheap to clone; clones share rate-limit state and cache. Concurrent calls
/// for the same key are not coalesced, each runs its own retry sequence.
#[derive(Debug, Clone)]
pub struct ResilientClient {
    backoff: Arc<BackoffController>,
    cache: Arc<FallbackCache>,
    connectivity: Arc<dyn Connectivity>,
    options: ResilienceOptions,
}

impl Default for ResilientClient {
    fn default() -> Self {
        Self::new()
    }
}

impl ResilientClient {
    /// Creates a client with a volatile-only cache and default options
    pub fn new() -> Self {
        Self {
            backoff: Arc::new(BackoffController::new()),
            cache: Arc::new(FallbackCache::new()),
            connectivity: Arc::new(AssumeOnline),
            options: ResilienceOptions::default(),
        }
    }

    /// Uses `cache` for write-through and fallback
    pub fn with_cache(mut self, cache: Arc<FallbackCache>) -> Self {
        self.cache = cache;
        self
    }

    /// Shares rate-limit state with other clients
    pub fn with_backoff(mut self, backoff: Arc<BackoffController>) -> Self {
        self.backoff = backoff;
        self
    }

    /// Uses `connectivity` for the offline pre-check
    pub fn with_connectivity(mut self, connectivity: Arc<dyn Connectivity>) -> Self {
        self.connectivity = connectivity;
        self
    }

    /// Options used by [`ResilientClient::execute`]
    pub fn with_options(mut self, options: ResilienceOptions) -> Self {
        self.options = options;
        self
    }

    /// Rate-limit state consulted before each attempt
    pub fn backoff(&self) -> &BackoffController {
        &self.backoff
    }

    /// Cache written on success and read on failure
    pub fn cache(&self) -> &FallbackCache {
        &self.cache
    }

    /// Options applied by [`ResilientClient::execute`]
    pub fn options(&self) -> &ResilienceOptions {
        &self.options
    }

    /// Runs `operation` under `key` with the client's options
    ///
    /// See [`ResilientClient::execute_with`].
    pub async fn execute<T, E, F, Fut>(
        &self,
        key: &str,
        operation: F,
    ) -> Result<Outcome<T>, ResilienceError<E>>
    where
        T: Serialize + DeserializeOwned,
        E: Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, CallError<E>>>,
    {
        self.execute_with(key, &self.options, operation).await
    }

    /// Runs `operation` under `key`
    ///
    /// `key` scopes both the rate-limit state and the cache entry, so it must be
    /// stable across calls with the same meaning.
    ///
    /// # Behavior
    /// - With `prefer_cache`, a fresh cached value is returned without calling out
    /// - When the environment reports offline, goes straight to the cache
    /// - Before each attempt, sleeps out any active rate limit for `key`
    /// - Throttled attempts are recorded and retried after a backoff, up to
    ///   `max_retries` attempts in total
    /// - Any other failure is not retried
    /// - Success is written to the cache with `ttl` and returned
    /// - On failure, the cached value is returned even if expired
    ///
    /// # Errors
    /// The classified failure, when nothing is cached under `key`.
    pub async fn execute_with<T, E, F, Fut>(
        &self,
        key: &str,
        options: &ResilienceOptions,
        mut operation: F,
    ) -> Result<Outcome<T>, ResilienceError<E>>
    where
        T: Serialize + DeserializeOwned,
        E: Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, CallError<E>>>,
    {
        let tiers = Tiers::from_durable(options.use_durable_tier);

        if options.prefer_cache {
            if let Some(cached) = self.cache.get_stale_in::<T>(key, tiers) {
                if !cached.is_expired {
                    debug!(key, "Serving fresh cached value");
                    return Ok(Outcome::cached(cached));
                }
            }
        }

        let error = if self.connectivity.status().is_offline() {
            info!(key, "Offline, skipping network attempt");
            ResilienceError::Offline {
                key: key.to_string(),
            }
        } else {
            match self.attempt(key, options, &mut operation).await {
                Ok(value) => {
                    if let Err(e) = self.cache.set_in(key, &value, options.ttl, tiers) {
                        warn!(key, error = %e, "Failed to cache result");
                    }
                    return Ok(Outcome::live(value));
                }
                Err(error) => error,
            }
        };

        match self.cache.get_stale_in::<T>(key, tiers) {
            Some(cached) => {
                info!(
                    key,
                    stale = cached.is_expired,
                    error = %error,
                    "Serving cached value after failure"
                );
                Ok(Outcome::cached(cached))
            }
            None => Err(error),
        }
    }

    /// The retry loop: runs attempts until success, a non-retryable failure or
    /// an exhausted budget
    async fn attempt<T, E, F, Fut>(
        &self,
        key: &str,
        options: &ResilienceOptions,
        operation: &mut F,
    ) -> Result<T, ResilienceError<E>>
    where
        E: Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, CallError<E>>>,
    {
        let budget = options.attempt_budget();
        let mut attempt = 0;

        loop {
            attempt += 1;

            let wait = self.backoff.wait_time(key);
            if !wait.is_zero() {
                info!(
                    key,
                    attempt,
                    wait_ms = wait.as_millis() as u64,
                    "Waiting for rate limit to clear"
                );
                tokio::time::sleep(wait).await;
            }

            let result = match options.attempt_timeout {
                Some(limit) => tokio::time::timeout(limit, operation())
                    .await
                    .unwrap_or(Err(CallError::TimedOut)),
                None => operation().await,
            };

            match result {
                Ok(value) => {
                    debug!(key, attempt, "Call succeeded");
                    return Ok(value);
                }
                Err(CallError::Throttled(signal)) => {
                    let state = self.backoff.record_limit(key, &signal);
                    if attempt >= budget {
                        warn!(key, attempts = attempt, "Retries exhausted while throttled");
                        return Err(ResilienceError::RateLimitExceeded {
                            key: key.to_string(),
                            attempts: attempt,
                            retry_after_seconds: state.retry_after_seconds,
                        });
                    }
                }
                Err(CallError::TimedOut) if options.retry_on_timeout && attempt < budget => {
                    warn!(key, attempt, "Attempt timed out, retrying");
                }
                Err(CallError::TimedOut) => {
                    warn!(key, attempt, "Attempt timed out");
                    return Err(ResilienceError::TimedOut {
                        key: key.to_string(),
                        attempts: attempt,
                    });
                }
                Err(CallError::Failed(error)) => {
                    warn!(key, attempt, error = %error, "Call failed, not retrying");
                    return Err(ResilienceError::OperationFailed {
                        key: key.to_string(),
                        attempts: attempt,
                        error,
                    });
                }
            }

            let delay = backoff_delay(attempt, options.base_delay, options.max_delay);
            debug!(key, attempt, delay_ms = delay.as_millis() as u64, "Backing off");
            tokio::time::sleep(delay).await;
        }
    }
}
