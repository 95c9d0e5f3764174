//! Cache module for keeping API responses across failures
//!
//! This module provides a two-tier cache: a volatile in-process map and a
//! best-effort durable store that survives restarts. Entries carry their own
//! TTL. Expired entries are hidden from normal reads but can still be read
//! explicitly, allowing callers to serve stale data when APIs are unavailable.

mod entry;
mod fallback;
mod store;

pub use entry::{CacheEntry, CachedData};
pub use fallback::{CacheError, FallbackCache, Tiers};
pub use store::{DurableStore, FileStore, MemoryStore, StoreError};
