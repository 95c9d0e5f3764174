//! Rate-limit detection and backoff
//!
//! [`BackoffController`] remembers, per endpoint key, when a server-imposed
//! limit clears and computes jittered exponential delays between retries.
//! [`ThrottleSignal`] carries whatever cool-down metadata a 429 response had.

mod controller;
mod signal;

pub use controller::{backoff_delay, BackoffController, RateLimitState};
pub use signal::ThrottleSignal;
