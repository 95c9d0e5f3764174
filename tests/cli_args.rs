//! Integration tests for CLI argument handling
//!
//! Runs the binary for flag validation and checks option parsing through the
//! library.

use std::process::Command;

/// Helper to run the CLI with given args and capture output
fn run_cli(args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_trailhead-fetch"))
        .args(args)
        .env_remove("TRAILHEAD_MAX_RETRIES")
        .env_remove("TRAILHEAD_CACHE_DIR")
        .output()
        .expect("Failed to execute trailhead-fetch")
}

#[test]
fn test_help_flag_exits_successfully() {
    let output = run_cli(&["--help"]);
    assert!(output.status.success(), "Expected --help to exit successfully");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("trailhead-fetch"), "Help should mention the binary");
    assert!(stdout.contains("max-retries"), "Help should mention --max-retries");
    assert!(stdout.contains("prefer-cache"), "Help should mention --prefer-cache");
}

#[test]
fn test_missing_url_fails() {
    let output = run_cli(&[]);
    assert!(!output.status.success(), "Expected missing URL to fail");
}

#[test]
fn test_non_numeric_retries_fails() {
    let output = run_cli(&["https://example.com", "--max-retries", "lots"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("max-retries"), "Should name the bad flag: {}", stderr);
}

#[test]
fn test_inverted_backoff_exits_with_error() {
    let output = run_cli(&[
        "https://example.com",
        "--base-delay-ms",
        "500",
        "--max-delay-ms",
        "10",
        "--no-durable",
    ]);
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn test_unreachable_host_without_cache_fails_cleanly() {
    // Port 9 on localhost is the discard port and is normally closed
    let output = run_cli(&["http://127.0.0.1:9/camps", "--no-durable"]);
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Could not load data"), "stderr: {}", stderr);
}

#[cfg(test)]
mod unit_tests {
    //! Unit tests for CLI parsing that don't require running the binary

    use clap::Parser;
    use std::time::Duration;
    use trailhead_resilience::cli::Cli;

    #[test]
    fn test_cli_url_is_default_key() {
        let cli = Cli::parse_from(["trailhead-fetch", "https://example.com/campgrounds"]);
        assert_eq!(cli.cache_key(), "https://example.com/campgrounds");
    }

    #[test]
    fn test_cli_timeout_flag() {
        let cli = Cli::parse_from(["trailhead-fetch", "https://example.com", "--timeout-secs", "3"]);
        let options = cli.options().unwrap();
        assert_eq!(options.attempt_timeout, Some(Duration::from_secs(3)));
        assert!(!options.retry_on_timeout);
    }

    #[test]
    fn test_cli_custom_cache_dir() {
        let dir = tempfile::TempDir::new().unwrap();
        let cli = Cli::parse_from([
            "trailhead-fetch",
            "https://example.com",
            "--cache-dir",
            dir.path().to_str().unwrap(),
        ]);
        let cache = cli.cache();
        cache.set("k", &1, Duration::from_secs(60)).unwrap();
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}
