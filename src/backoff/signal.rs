//! Throttling signals extracted from HTTP responses

use chrono::{DateTime, Duration, TimeZone, Utc};
use reqwest::header::HeaderMap;

/// Header carrying the server's cool-down, in seconds or as an HTTP-date
const RETRY_AFTER: &str = "retry-after";

/// Headers carrying the remaining quota, most specific first
const REMAINING_HEADERS: [&str; 2] = ["x-ratelimit-remaining", "ratelimit-remaining"];

/// Headers carrying the reset time, most specific first
const RESET_HEADERS: [&str; 2] = ["x-ratelimit-reset", "ratelimit-reset"];

/// Reset values above this are unix timestamps, anything below is a delta in seconds
const EPOCH_THRESHOLD: i64 = 1_000_000_000;

/// Metadata accompanying a throttled (HTTP 429) response
///
/// Every field is optional; the backoff controller fills the gaps with its
/// default cool-down.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThrottleSignal {
    /// Seconds the server asked us to wait
    pub retry_after_seconds: Option<u64>,
    /// Requests left in the current window
    pub remaining_requests: Option<u32>,
    /// Wall-clock time the server says the limit clears
    pub reset_at: Option<DateTime<Utc>>,
}

impl ThrottleSignal {
    /// A signal with no metadata at all
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the explicit retry-after hint
    pub fn with_retry_after(mut self, seconds: u64) -> Self {
        self.retry_after_seconds = Some(seconds);
        self
    }

    /// Sets the remaining quota
    pub fn with_remaining(mut self, remaining: u32) -> Self {
        self.remaining_requests = Some(remaining);
        self
    }

    /// Sets the wall-clock reset time
    pub fn with_reset_at(mut self, reset_at: DateTime<Utc>) -> Self {
        self.reset_at = Some(reset_at);
        self
    }

    /// Reads rate-limit headers from a response
    pub fn from_headers(headers: &HeaderMap) -> Self {
        Self::from_headers_at(headers, Utc::now())
    }

    /// Reads rate-limit headers, resolving relative values against `now`
    ///
    /// `Retry-After` accepts delta-seconds or an HTTP-date. Reset headers accept
    /// either a unix timestamp or a delta in seconds. Malformed values are ignored.
    pub fn from_headers_at(headers: &HeaderMap, now: DateTime<Utc>) -> Self {
        let retry_after_seconds = header_str(headers, &[RETRY_AFTER])
            .and_then(|value| parse_retry_after(value, now));

        let remaining_requests = header_str(headers, &REMAINING_HEADERS)
            .and_then(|value| value.trim().parse::<u32>().ok());

        let reset_at = header_str(headers, &RESET_HEADERS)
            .and_then(|value| value.trim().parse::<i64>().ok())
            .and_then(|raw| {
                if raw >= EPOCH_THRESHOLD {
                    Utc.timestamp_opt(raw, 0).single()
                } else {
                    Some(now + Duration::seconds(raw.max(0)))
                }
            });

        Self {
            retry_after_seconds,
            remaining_requests,
            reset_at,
        }
    }

    /// Seconds until `reset_at`, rounded up, if a reset time is known
    pub(crate) fn seconds_until_reset(&self, now: DateTime<Utc>) -> Option<u64> {
        let reset_at = self.reset_at?;
        let millis = (reset_at - now).num_milliseconds().max(0) as u64;
        Some(millis.div_ceil(1000))
    }
}

/// Returns the first of `names` present with a valid UTF-8 value
fn header_str<'a>(headers: &'a HeaderMap, names: &[&str]) -> Option<&'a str> {
    names
        .iter()
        .find_map(|name| headers.get(*name).and_then(|value| value.to_str().ok()))
}

/// Parses a `Retry-After` value as delta-seconds or an HTTP-date
fn parse_retry_after(value: &str, now: DateTime<Utc>) -> Option<u64> {
    let value = value.trim();
    if let Ok(seconds) = value.parse::<u64>() {
        return Some(seconds);
    }

    let date = DateTime::parse_from_rfc2822(value).ok()?;
    let millis = (date.with_timezone(&Utc) - now).num_milliseconds().max(0) as u64;
    Some(millis.div_ceil(1000))
}
