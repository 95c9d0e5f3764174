//! trailhead-fetch - fetch JSON from a public API through the resilience layer
//!
//! Performs one GET with rate-limit aware retries. On failure the last cached
//! response is printed instead, even if it has expired.

use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::error;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use trailhead_resilience::cli::{Cli, CliError};
use trailhead_resilience::http::{ApiClient, HttpError};
use trailhead_resilience::{Origin, Outcome, ResilienceError, ResilientClient};

/// Why a run failed
#[derive(Debug, thiserror::Error)]
enum RunError {
    #[error(transparent)]
    Cli(#[from] CliError),

    #[error(transparent)]
    Call(#[from] ResilienceError<HttpError>),

    #[error("Failed to format response: {0}")]
    Output(#[from] serde_json::Error),
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(RunError::Call(e)) => {
            error!(error = %e, "Request failed");
            eprintln!("{}", e.user_message());
            ExitCode::from(1)
        }
        Err(e) => {
            error!(error = %e, "Critical failure");
            ExitCode::from(2)
        }
    }
}

/// Initializes tracing with environment filter support.
///
/// Logs go to stderr so stdout carries only the JSON document. Log level comes
/// from `RUST_LOG` and falls back to "info".
fn init_tracing() {
    tracing_subscriber::registry()
        .with(fmt::layer().compact().with_target(false).with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
}

async fn run(cli: Cli) -> Result<(), RunError> {
    let options = cli.options()?;
    let client = ResilientClient::new()
        .with_cache(Arc::new(cli.cache()))
        .with_options(options);
    let api = ApiClient::new();

    let outcome: Outcome<serde_json::Value> = client
        .execute(cli.cache_key(), || api.get_json(&cli.url))
        .await?;

    match outcome.origin {
        Origin::Live => {}
        Origin::Cache { stale, stored_at } => eprintln!(
            "Served from cache ({}, stored {})",
            if stale { "stale" } else { "fresh" },
            stored_at.to_rfc3339()
        ),
    }
    println!("{}", serde_json::to_string_pretty(&outcome.value)?);
    Ok(())
}
