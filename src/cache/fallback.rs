//! Two-tier fallback cache
//!
//! Provides a `FallbackCache` that keeps entries in a volatile in-process map
//! and, best-effort, in a [`DurableStore`] that survives restarts. Every entry
//! carries its own TTL.

use chrono::Utc;
use parking_lot::RwLock;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use super::{CacheEntry, CachedData, DurableStore, FileStore};

/// Prefix for keys written to the durable store, so `clear_all` only touches ours
const DURABLE_PREFIX: &str = "api_cache:";

/// Errors that can occur when writing to the cache
#[derive(Debug, Error)]
pub enum CacheError {
    /// The value could not be represented as JSON
    #[error("Failed to serialize cache value: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Which tiers an operation may touch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tiers {
    /// Only the in-process map
    VolatileOnly,
    /// The in-process map, then the durable store
    All,
}

impl Tiers {
    /// `All` when `durable` is set, else `VolatileOnly`
    pub fn from_durable(durable: bool) -> Self {
        if durable {
            Tiers::All
        } else {
            Tiers::VolatileOnly
        }
    }
}

/// Key-value cache with per-entry expiry across a volatile and a durable tier
///
/// The volatile tier is authoritative; the durable tier only extends an entry's
/// lifetime across restarts. Durable failures are logged and never fail a call.
/// Keys are opaque and no TTL is defaulted here.
#[derive(Debug, Default)]
pub struct FallbackCache {
    volatile: RwLock<HashMap<String, CacheEntry<Value>>>,
    durable: Option<Arc<dyn DurableStore>>,
}

impl FallbackCache {
    /// Creates a volatile-only cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a cache backed by `store` for the durable tier
    pub fn with_durable(store: Arc<dyn DurableStore>) -> Self {
        Self {
            volatile: RwLock::new(HashMap::new()),
            durable: Some(store),
        }
    }

    /// Creates a cache backed by the XDG file store
    ///
    /// Falls back to volatile-only when no cache directory can be determined.
    pub fn with_file_store() -> Self {
        match FileStore::new() {
            Some(store) => Self::with_durable(Arc::new(store)),
            None => {
                warn!("No cache directory available, durable tier disabled");
                Self::new()
            }
        }
    }

    /// Whether a durable tier is configured
    pub fn has_durable_tier(&self) -> bool {
        self.durable.is_some()
    }

    /// Stores `value` under `key` in both tiers
    ///
    /// # Errors
    /// Only if `value` cannot be serialized. Durable write failures are logged.
    pub fn set<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) -> Result<(), CacheError> {
        self.set_in(key, value, ttl, Tiers::All)
    }

    /// Stores `value` under `key` in the selected tiers
    pub fn set_in<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
        tiers: Tiers,
    ) -> Result<(), CacheError> {
        let entry = CacheEntry::new(serde_json::to_value(value)?, ttl);
        self.put_entry(key, entry, tiers);
        Ok(())
    }

    /// Stores a prepared entry, keeping its `stored_at`
    ///
    /// Useful to seed the cache with data fetched elsewhere.
    pub fn put_entry(&self, key: &str, entry: CacheEntry<Value>, tiers: Tiers) {
        if tiers == Tiers::All {
            self.write_durable(key, &entry);
        }
        self.volatile.write().insert(key.to_string(), entry);
        debug!(key, "Cache entry stored");
    }

    /// Returns the fresh value for `key` from either tier
    ///
    /// Checks the volatile tier first. A fresh durable hit is promoted into the
    /// volatile tier. Expired entries met on the way are evicted.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.get_in(key, Tiers::All)
    }

    /// Like [`FallbackCache::get`], restricted to the selected tiers
    pub fn get_in<T: DeserializeOwned>(&self, key: &str, tiers: Tiers) -> Option<T> {
        let now = Utc::now();

        if let Some(entry) = self.read_volatile(key) {
            if entry.is_fresh_at(now) {
                debug!(key, tier = "volatile", "Cache hit");
                return decode(key, entry.value);
            }
            self.evict_volatile_if_stale(key);
        }

        if tiers == Tiers::VolatileOnly {
            return None;
        }

        let entry = self.read_durable(key)?;
        if !entry.is_fresh_at(now) {
            debug!(key, "Evicting expired durable entry");
            self.remove_durable(key);
            return None;
        }

        debug!(key, tier = "durable", "Cache hit, promoting");
        self.volatile.write().insert(key.to_string(), entry.clone());
        decode(key, entry.value)
    }

    /// Returns the entry for `key` even if it has expired
    ///
    /// Nothing is evicted, so the fallback path can still serve data a normal
    /// [`FallbackCache::get`] would reject. An expired volatile entry is
    /// compared with the durable one and the more recently stored wins. Fresh
    /// durable hits are promoted.
    pub fn get_stale<T: DeserializeOwned>(&self, key: &str) -> Option<CachedData<T>> {
        self.get_stale_in(key, Tiers::All)
    }

    /// Like [`FallbackCache::get_stale`], restricted to the selected tiers
    pub fn get_stale_in<T: DeserializeOwned>(&self, key: &str, tiers: Tiers) -> Option<CachedData<T>> {
        let now = Utc::now();

        let volatile = self.read_volatile(key);
        let consult_durable =
            tiers == Tiers::All && !volatile.as_ref().is_some_and(|entry| entry.is_fresh_at(now));
        let durable = if consult_durable { self.read_durable(key) } else { None };

        let entry = match (volatile, durable) {
            (Some(local), Some(shared)) if shared.stored_at <= local.stored_at => local,
            (_, Some(shared)) => {
                if shared.is_fresh_at(now) {
                    debug!(key, tier = "durable", "Stale read found fresh entry, promoting");
                    self.volatile.write().insert(key.to_string(), shared.clone());
                }
                shared
            }
            (Some(local), None) => local,
            (None, None) => return None,
        };

        let is_expired = !entry.is_fresh_at(now);
        let stored_at = entry.stored_at;
        decode(key, entry.value).map(|data| CachedData {
            data,
            stored_at,
            is_expired,
        })
    }

    /// Removes `key` from both tiers; removing a missing key is a no-op
    pub fn clear(&self, key: &str) {
        self.volatile.write().remove(key);
        self.remove_durable(key);
    }

    /// Removes every entry from both tiers
    pub fn clear_all(&self) {
        self.volatile.write().clear();

        let Some(store) = &self.durable else {
            return;
        };
        let keys = match store.keys() {
            Ok(keys) => keys,
            Err(e) => {
                warn!(error = %e, "Failed to list durable cache keys");
                return;
            }
        };
        for durable_key in keys.iter().filter(|k| k.starts_with(DURABLE_PREFIX)) {
            if let Err(e) = store.remove_item(durable_key) {
                warn!(key = %durable_key, error = %e, "Failed to remove durable cache entry");
            }
        }
    }

    /// Number of entries in the volatile tier, fresh or not
    pub fn volatile_len(&self) -> usize {
        self.volatile.read().len()
    }

    fn read_volatile(&self, key: &str) -> Option<CacheEntry<Value>> {
        self.volatile.read().get(key).cloned()
    }

    /// Re-checks under the write lock so a concurrent fresh write is not lost
    fn evict_volatile_if_stale(&self, key: &str) {
        let now = Utc::now();
        let mut volatile = self.volatile.write();
        if volatile.get(key).is_some_and(|entry| !entry.is_fresh_at(now)) {
            debug!(key, "Evicting expired volatile entry");
            volatile.remove(key);
        }
    }

    fn read_durable(&self, key: &str) -> Option<CacheEntry<Value>> {
        let store = self.durable.as_ref()?;
        let raw = match store.get_item(&durable_key(key)) {
            Ok(raw) => raw?,
            Err(e) => {
                warn!(key, error = %e, "Durable cache read failed");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(key, error = %e, "Discarding unreadable durable cache entry");
                self.remove_durable(key);
                None
            }
        }
    }

    fn write_durable(&self, key: &str, entry: &CacheEntry<Value>) {
        let Some(store) = &self.durable else {
            return;
        };
        let result = serde_json::to_string(entry)
            .map_err(|e| e.to_string())
            .and_then(|json| {
                store
                    .set_item(&durable_key(key), &json)
                    .map_err(|e| e.to_string())
            });
        if let Err(error) = result {
            warn!(key, %error, "Durable cache write failed, keeping volatile entry only");
        }
    }

    fn remove_durable(&self, key: &str) {
        if let Some(store) = &self.durable {
            if let Err(e) = store.remove_item(&durable_key(key)) {
                warn!(key, error = %e, "Failed to remove durable cache entry");
            }
        }
    }
}

fn durable_key(key: &str) -> String {
    format!("{DURABLE_PREFIX}{key}")
}

fn decode<T: DeserializeOwned>(key: &str, value: Value) -> Option<T> {
    match serde_json::from_value(value) {
        Ok(data) => Some(data),
        Err(e) => {
            debug!(key, error = %e, "Cached value does not match requested type");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{MemoryStore, StoreError};
    use chrono::TimeDelta;
    use serde::Deserialize;
    use tempfile::TempDir;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Campsite {
        name: String,
        sites: u32,
    }

    fn campsite(name: &str) -> Campsite {
        Campsite {
            name: name.to_string(),
            sites: 42,
        }
    }

    fn create_test_cache() -> (FallbackCache, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let cache = FallbackCache::with_durable(store.clone());
        (cache, store)
    }

    /// Store that rejects every operation, like storage disabled in a sandbox
    #[derive(Debug)]
    struct BrokenStore;

    impl DurableStore for BrokenStore {
        fn get_item(&self, _key: &str) -> Result<Option<String>, StoreError> {
            Err(StoreError::Unavailable("disabled".to_string()))
        }
        fn set_item(&self, _key: &str, _value: &str) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("disabled".to_string()))
        }
        fn remove_item(&self, _key: &str) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("disabled".to_string()))
        }
        fn keys(&self) -> Result<Vec<String>, StoreError> {
            Err(StoreError::Unavailable("disabled".to_string()))
        }
    }

    fn aged_entry(value: &Campsite, age: TimeDelta, ttl: Duration) -> CacheEntry<Value> {
        CacheEntry::stored_at(serde_json::to_value(value).unwrap(), Utc::now() - age, ttl)
    }

    #[test]
    fn test_set_then_get_returns_value() {
        let (cache, store) = create_test_cache();

        cache.set("camps", &campsite("Alice Lake"), Duration::from_secs(60)).unwrap();

        assert_eq!(cache.get::<Campsite>("camps"), Some(campsite("Alice Lake")));
        assert_eq!(store.len(), 1, "Durable tier should be written too");
    }

    #[test]
    fn test_get_returns_none_for_missing_key() {
        let (cache, _store) = create_test_cache();
        assert!(cache.get::<Campsite>("nonexistent").is_none());
    }

    #[test]
    fn test_expired_entry_is_absent_and_evicted() {
        let (cache, store) = create_test_cache();
        let entry = aged_entry(&campsite("Porteau"), TimeDelta::minutes(10), Duration::from_secs(300));
        cache.put_entry("camps", entry, Tiers::All);

        assert!(cache.get::<Campsite>("camps").is_none());
        assert_eq!(cache.volatile_len(), 0, "Volatile entry should be evicted");
        assert!(store.is_empty(), "Durable entry should be evicted");
    }

    #[test]
    fn test_expires_after_ttl_elapses() {
        let (cache, _store) = create_test_cache();
        cache.set("camps", &campsite("Golden Ears"), Duration::from_millis(20)).unwrap();
        assert!(cache.get::<Campsite>("camps").is_some());

        std::thread::sleep(std::time::Duration::from_millis(40));

        assert!(cache.get::<Campsite>("camps").is_none());
    }

    #[test]
    fn test_durable_hit_is_promoted() {
        let store = Arc::new(MemoryStore::new());
        let before_restart = FallbackCache::with_durable(store.clone());
        before_restart.set("camps", &campsite("Garibaldi"), Duration::from_secs(300)).unwrap();

        // A fresh instance over the same store models a process restart
        let cache = FallbackCache::with_durable(store.clone());
        assert_eq!(cache.volatile_len(), 0);
        assert_eq!(cache.get::<Campsite>("camps"), Some(campsite("Garibaldi")));

        store.remove_item("api_cache:camps").unwrap();
        assert_eq!(
            cache.get_in::<Campsite>("camps", Tiers::VolatileOnly),
            Some(campsite("Garibaldi")),
            "Second read should be served by the volatile tier alone"
        );
    }

    #[test]
    fn test_volatile_only_ignores_durable_tier() {
        let (cache, store) = create_test_cache();
        cache
            .set_in("camps", &campsite("Cultus"), Duration::from_secs(60), Tiers::VolatileOnly)
            .unwrap();
        assert!(store.is_empty());

        let restarted = FallbackCache::with_durable(store.clone());
        cache.set("other", &campsite("Chilliwack"), Duration::from_secs(60)).unwrap();
        assert!(restarted.get_in::<Campsite>("other", Tiers::VolatileOnly).is_none());
        assert!(restarted.get_in::<Campsite>("other", Tiers::All).is_some());
    }

    #[test]
    fn test_get_stale_returns_expired_entry_without_evicting() {
        let (cache, _store) = create_test_cache();
        let entry = aged_entry(&campsite("Porteau"), TimeDelta::minutes(10), Duration::from_secs(300));
        cache.put_entry("camps", entry, Tiers::All);

        let stale = cache.get_stale::<Campsite>("camps").expect("stale entry should be returned");
        assert_eq!(stale.data, campsite("Porteau"));
        assert!(stale.is_expired);
        assert_eq!(cache.volatile_len(), 1);
    }

    #[test]
    fn test_get_stale_reads_durable_after_restart() {
        let store = Arc::new(MemoryStore::new());
        let before_restart = FallbackCache::with_durable(store.clone());
        let entry = aged_entry(&campsite("Porteau"), TimeDelta::hours(2), Duration::from_secs(60));
        before_restart.put_entry("camps", entry, Tiers::All);

        let cache = FallbackCache::with_durable(store);
        let stale = cache.get_stale::<Campsite>("camps").expect("durable stale entry");
        assert!(stale.is_expired);
        assert_eq!(cache.volatile_len(), 0, "Stale entries are not promoted");
    }

    #[test]
    fn test_get_stale_prefers_newer_durable_entry() {
        let (cache, store) = create_test_cache();
        let old = aged_entry(&campsite("Porteau"), TimeDelta::hours(2), Duration::from_secs(60));
        cache.put_entry("camps", old, Tiers::VolatileOnly);

        // Another process refreshed the shared store after this one cached its copy
        let other_process = FallbackCache::with_durable(store);
        let newer = aged_entry(&campsite("Cultus"), TimeDelta::minutes(30), Duration::from_secs(60));
        other_process.put_entry("camps", newer, Tiers::All);

        let stale = cache.get_stale::<Campsite>("camps").expect("durable entry should win");
        assert_eq!(stale.data, campsite("Cultus"));
        assert!(stale.is_expired);
    }

    #[test]
    fn test_get_stale_promotes_fresh_durable_over_expired_volatile() {
        let (cache, store) = create_test_cache();
        let old = aged_entry(&campsite("Porteau"), TimeDelta::hours(2), Duration::from_secs(60));
        cache.put_entry("camps", old, Tiers::VolatileOnly);

        FallbackCache::with_durable(store)
            .set("camps", &campsite("Golden Ears"), Duration::from_secs(300))
            .unwrap();

        let cached = cache.get_stale::<Campsite>("camps").unwrap();
        assert_eq!(cached.data, campsite("Golden Ears"));
        assert!(!cached.is_expired);
        assert_eq!(
            cache.get_in::<Campsite>("camps", Tiers::VolatileOnly),
            Some(campsite("Golden Ears"))
        );
    }

    #[test]
    fn test_get_stale_keeps_newer_volatile_entry() {
        let (cache, store) = create_test_cache();
        let older = aged_entry(&campsite("Porteau"), TimeDelta::hours(3), Duration::from_secs(60));
        FallbackCache::with_durable(store).put_entry("camps", older, Tiers::All);

        let newer = aged_entry(&campsite("Cultus"), TimeDelta::hours(1), Duration::from_secs(60));
        cache.put_entry("camps", newer, Tiers::VolatileOnly);

        let stale = cache.get_stale::<Campsite>("camps").unwrap();
        assert_eq!(stale.data, campsite("Cultus"));
    }

    #[test]
    fn test_get_stale_fresh_entry_is_not_expired() {
        let (cache, _store) = create_test_cache();
        cache.set("camps", &campsite("Alice Lake"), Duration::from_secs(60)).unwrap();

        let cached = cache.get_stale::<Campsite>("camps").unwrap();
        assert!(!cached.is_expired);
    }

    #[test]
    fn test_overwrite_existing_entry() {
        let (cache, _store) = create_test_cache();
        cache.set("camps", &campsite("first"), Duration::from_secs(60)).unwrap();
        cache.set("camps", &campsite("second"), Duration::from_secs(60)).unwrap();

        assert_eq!(cache.get::<Campsite>("camps"), Some(campsite("second")));
    }

    #[test]
    fn test_type_mismatch_reads_as_absent() {
        let (cache, _store) = create_test_cache();
        cache.set("camps", &"just a string", Duration::from_secs(60)).unwrap();
        assert!(cache.get::<Campsite>("camps").is_none());
    }

    #[test]
    fn test_empty_payload_is_cached() {
        let (cache, _store) = create_test_cache();
        cache.set("camps", &Vec::<Campsite>::new(), Duration::from_secs(60)).unwrap();
        assert_eq!(cache.get::<Vec<Campsite>>("camps"), Some(Vec::new()));
    }

    #[test]
    fn test_clear_removes_from_both_tiers() {
        let (cache, store) = create_test_cache();
        cache.set("camps", &campsite("Alice Lake"), Duration::from_secs(60)).unwrap();

        cache.clear("camps");
        cache.clear("camps");

        assert!(cache.get::<Campsite>("camps").is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_clear_all_is_idempotent_and_spares_foreign_keys() {
        let (cache, store) = create_test_cache();
        cache.clear_all();

        store.set_item("session_token", "keep me").unwrap();
        cache.set("a", &1, Duration::from_secs(60)).unwrap();
        cache.set("b", &2, Duration::from_secs(60)).unwrap();

        cache.clear_all();
        cache.clear_all();

        assert!(cache.get::<i32>("a").is_none());
        assert!(cache.get::<i32>("b").is_none());
        assert_eq!(store.keys().unwrap(), vec!["session_token".to_string()]);
    }

    #[test]
    fn test_broken_durable_tier_degrades_to_volatile() {
        let cache = FallbackCache::with_durable(Arc::new(BrokenStore));

        cache.set("camps", &campsite("Alice Lake"), Duration::from_secs(60)).unwrap();

        assert_eq!(cache.get::<Campsite>("camps"), Some(campsite("Alice Lake")));
        assert!(cache.get::<Campsite>("missing").is_none());
        cache.clear("camps");
        cache.clear_all();
    }

    #[test]
    fn test_unreadable_durable_entry_is_discarded() {
        let (cache, store) = create_test_cache();
        store.set_item("api_cache:camps", "not json").unwrap();

        assert!(cache.get::<Campsite>("camps").is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_file_store_survives_restart() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let store = || Arc::new(FileStore::with_dir(temp_dir.path().to_path_buf()));

        FallbackCache::with_durable(store())
            .set("camps", &campsite("Golden Ears"), Duration::from_secs(300))
            .unwrap();

        let cache = FallbackCache::with_durable(store());
        assert_eq!(cache.get::<Campsite>("camps"), Some(campsite("Golden Ears")));
    }

    #[test]
    fn test_volatile_only_cache() {
        let cache = FallbackCache::new();
        assert!(!cache.has_durable_tier());

        cache.set("camps", &campsite("Alice Lake"), Duration::from_secs(60)).unwrap();
        assert!(cache.get::<Campsite>("camps").is_some());
    }
}
