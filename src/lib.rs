//! Trailhead API resilience layer
//!
//! Rate-limit aware retries and a two-tier fallback cache for calls to
//! unreliable, quota-limited public APIs. Exposes the CLI module for use in
//! integration tests.

pub mod backoff;
pub mod cache;
pub mod cli;
pub mod config;
pub mod http;
pub mod resilience;

pub use backoff::{backoff_delay, BackoffController, RateLimitState, ThrottleSignal};
pub use cache::{CacheEntry, CachedData, DurableStore, FallbackCache, FileStore, MemoryStore, Tiers};
pub use config::ResilienceOptions;
pub use resilience::{
    CallError, Connectivity, NetworkStatus, OfflineSwitch, Origin, Outcome, ResilienceError,
    ResilientClient,
};
