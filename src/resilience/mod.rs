//! Resilient call orchestration
//!
//! Combines the backoff controller and the fallback cache into a single
//! primitive, [`ResilientClient::execute`], that callers use instead of
//! calling an unreliable API directly.

mod client;
mod connectivity;
mod error;

pub use client::{Origin, Outcome, ResilientClient};
pub use connectivity::{AssumeOnline, Connectivity, NetworkStatus, OfflineSwitch};
pub use error::{CallError, ResilienceError};
