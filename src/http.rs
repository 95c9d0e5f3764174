//! HTTP transport adapter
//!
//! Performs JSON GET requests with `reqwest` and classifies the outcome the way
//! the orchestrator expects: 429 becomes a throttle signal, anything else that
//! is not a success becomes an ordinary failure.

use reqwest::header::HeaderMap;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::backoff::ThrottleSignal;
use crate::resilience::CallError;

/// Errors that can occur when fetching JSON over HTTP
#[derive(Debug, Error)]
pub enum HttpError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    /// Server answered with a non-success status other than 429
    #[error("Unexpected HTTP status {0}")]
    Status(StatusCode),

    /// Failed to parse JSON response
    #[error("Failed to parse JSON response: {0}")]
    ParseError(#[from] serde_json::Error),
}

/// Client for fetching JSON documents from public APIs
#[derive(Debug, Clone, Default)]
pub struct ApiClient {
    client: Client,
}

impl ApiClient {
    /// Create a new ApiClient with default settings
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }

    /// Create a new ApiClient with a custom HTTP client
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    /// Fetch and decode the JSON document at `url`
    ///
    /// # Returns
    /// * `Ok(T)` - The decoded body of a 2xx response
    /// * `Err(CallError::Throttled)` - On 429, with any rate-limit headers
    /// * `Err(CallError::TimedOut)` - If the client's timeout elapsed
    /// * `Err(CallError::Failed)` - For every other failure
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, CallError<HttpError>> {
        let response = self.client.get(url).send().await.map_err(request_error)?;
        classify(response.status(), response.headers())?;

        let text = response.text().await.map_err(request_error)?;
        serde_json::from_str(&text).map_err(|e| CallError::Failed(e.into()))
    }
}

/// Maps a response status to the orchestrator's failure classes
pub fn classify(status: StatusCode, headers: &HeaderMap) -> Result<(), CallError<HttpError>> {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(CallError::Throttled(ThrottleSignal::from_headers(headers)));
    }
    if !status.is_success() {
        return Err(CallError::Failed(HttpError::Status(status)));
    }
    Ok(())
}

fn request_error(error: reqwest::Error) -> CallError<HttpError> {
    if error.is_timeout() {
        CallError::TimedOut
    } else {
        CallError::Failed(error.into())
    }
}
