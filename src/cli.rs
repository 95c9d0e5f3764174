//! Command-line interface parsing for trailhead-fetch
//!
//! This module handles parsing of CLI arguments using clap and turns them into
//! the [`ResilienceOptions`] and cache setup used for the request.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::cache::{FallbackCache, FileStore};
use crate::config::{
    ResilienceOptions, DEFAULT_BASE_DELAY, DEFAULT_MAX_DELAY, DEFAULT_MAX_RETRIES, DEFAULT_TTL,
};

/// Error types for CLI argument validation
#[derive(Debug, Error)]
pub enum CliError {
    /// The backoff cap is below the first backoff step
    #[error("Invalid backoff: max delay {max_ms}ms is below base delay {base_ms}ms")]
    InvalidBackoff { base_ms: u64, max_ms: u64 },
}

/// Fetch JSON from a public API through the resilience layer
#[derive(Parser, Debug)]
#[command(name = "trailhead-fetch")]
#[command(about = "Fetch JSON with rate-limit aware retries and a stale-tolerant cache")]
#[command(version)]
pub struct Cli {
    /// URL to GET
    pub url: String,

    /// Cache and rate-limit key (defaults to the URL)
    #[arg(long)]
    pub key: Option<String>,

    /// Throttled attempts before falling back to the cache
    #[arg(long, env = "TRAILHEAD_MAX_RETRIES", default_value_t = DEFAULT_MAX_RETRIES)]
    pub max_retries: u32,

    /// First backoff step in milliseconds
    #[arg(long, env = "TRAILHEAD_BASE_DELAY_MS", default_value_t = DEFAULT_BASE_DELAY.as_millis() as u64)]
    pub base_delay_ms: u64,

    /// Backoff cap in milliseconds
    #[arg(long, env = "TRAILHEAD_MAX_DELAY_MS", default_value_t = DEFAULT_MAX_DELAY.as_millis() as u64)]
    pub max_delay_ms: u64,

    /// Lifetime of the cached response in seconds
    #[arg(long, env = "TRAILHEAD_TTL_SECS", default_value_t = DEFAULT_TTL.as_secs())]
    pub ttl_secs: u64,

    /// Per-attempt timeout in seconds
    #[arg(long, env = "TRAILHEAD_TIMEOUT_SECS")]
    pub timeout_secs: Option<u64>,

    /// Retry attempts that time out
    #[arg(long)]
    pub retry_on_timeout: bool,

    /// Serve a fresh cached response without calling the API
    #[arg(long)]
    pub prefer_cache: bool,

    /// Keep the cache in memory only
    #[arg(long)]
    pub no_durable: bool,

    /// Directory for the durable cache (defaults to the XDG cache directory)
    #[arg(long, env = "TRAILHEAD_CACHE_DIR")]
    pub cache_dir: Option<PathBuf>,
}

impl Cli {
    /// The key the request is cached and rate-limited under
    pub fn cache_key(&self) -> &str {
        self.key.as_deref().unwrap_or(&self.url)
    }

    /// Builds the resilience options from the parsed flags
    ///
    /// # Returns
    /// * `Ok(ResilienceOptions)` with the requested tuning
    /// * `Err(CliError::InvalidBackoff)` if the cap is below the base delay
    pub fn options(&self) -> Result<ResilienceOptions, CliError> {
        if self.max_delay_ms < self.base_delay_ms {
            return Err(CliError::InvalidBackoff {
                base_ms: self.base_delay_ms,
                max_ms: self.max_delay_ms,
            });
        }

        let mut options = ResilienceOptions::default()
            .with_max_retries(self.max_retries)
            .with_backoff(
                Duration::from_millis(self.base_delay_ms),
                Duration::from_millis(self.max_delay_ms),
            )
            .with_ttl(Duration::from_secs(self.ttl_secs))
            .with_durable_tier(!self.no_durable)
            .with_retry_on_timeout(self.retry_on_timeout)
            .with_prefer_cache(self.prefer_cache);
        if let Some(secs) = self.timeout_secs {
            options = options.with_attempt_timeout(Duration::from_secs(secs));
        }
        Ok(options)
    }

    /// Builds the cache: volatile only, a custom directory, or the XDG default
    pub fn cache(&self) -> FallbackCache {
        if self.no_durable {
            return FallbackCache::new();
        }
        match &self.cache_dir {
            Some(dir) => FallbackCache::with_durable(Arc::new(FileStore::with_dir(dir.clone()))),
            None => FallbackCache::with_file_store(),
        }
    }
}
