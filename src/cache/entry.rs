//! Cache entries and their serialized form

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A cached value with its own expiry
///
/// Serialized as `{"value": ..., "storedAt": <unix millis>, "ttl": <millis>}`
/// when written to the durable tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry<T> {
    /// The cached payload
    pub value: T,
    /// When the payload was stored
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub stored_at: DateTime<Utc>,
    /// How long the payload stays fresh
    #[serde(with = "duration_millis")]
    pub ttl: Duration,
}

impl<T> CacheEntry<T> {
    /// Creates an entry stored now
    pub fn new(value: T, ttl: Duration) -> Self {
        Self {
            value,
            stored_at: Utc::now(),
            ttl,
        }
    }

    /// Creates an entry with an explicit storage time
    pub fn stored_at(value: T, stored_at: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            value,
            stored_at,
            ttl,
        }
    }

    /// Fresh iff `now - stored_at <= ttl`
    pub fn is_fresh_at(&self, now: DateTime<Utc>) -> bool {
        match TimeDelta::from_std(self.ttl) {
            Ok(ttl) => now.signed_duration_since(self.stored_at) <= ttl,
            // A TTL beyond chrono's range never runs out
            Err(_) => true,
        }
    }

    /// Freshness against the current time
    pub fn is_fresh(&self) -> bool {
        self.is_fresh_at(Utc::now())
    }
}

/// Result of a stale-tolerant read, including metadata about freshness
#[derive(Debug, Clone, PartialEq)]
pub struct CachedData<T> {
    /// The cached data
    pub data: T,
    /// When the data was originally cached
    pub stored_at: DateTime<Utc>,
    /// Whether the entry outlived its TTL
    pub is_expired: bool,
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis().min(u64::MAX as u128) as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
