//! # `RequestExecutor` Live Check
//!
//! Exercises `lib_stats::RequestExecutor` against an httpbin-compatible
//! service (`https://httpbin.org/` by default) in both calling styles.
//!
//! ## Purpose:
//! The unit and integration tests use scripted transports and a local mock
//! server. This binary checks the same paths over a real network: URL joining,
//! query parameters, the default header set, error classification, retries
//! and handle release.
//!
//! Run with `cargo run -p project_tests --bin test_executor_live -- --help`.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

use anyhow::{Context, Result, bail};
use clap::Parser;
use lib_stats::loggers::init_console_logging;
use lib_stats::{ClientConfig, ClientError, ClientOptions, ErrorKind, QueryParams, RequestExecutor};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// # Check Arguments
#[derive(Parser, Debug)]
#[command(author, version, about = "Live check for the lib_stats request executor")]
struct Args {
    /// Root URL of an httpbin-compatible service.
    #[arg(long, env = "STATS_BASE_URL", default_value = "https://httpbin.org/")]
    base_url: String,

    /// Additional attempts after the first.
    #[arg(long, default_value_t = 1)]
    max_retries: i64,

    /// Per-attempt timeout in seconds.
    #[arg(long, default_value_t = 15.0)]
    timeout_secs: f64,

    /// Minimum spacing between requests in seconds.
    #[arg(long, default_value_t = 0.5)]
    rate_limit_secs: f64,

    /// Log level used when `RUST_LOG` is not set.
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON lines.
    #[arg(long)]
    json_logs: bool,
}

/// # Httpbin Response Model
///
/// The parts of an httpbin `/get` echo the check inspects.
#[derive(Debug, Deserialize)]
struct HttpbinEcho {
    /// Query parameters as the server saw them.
    args: HashMap<String, String>,
    /// Request headers as the server saw them.
    headers: HashMap<String, String>,
    /// The URL that was hit.
    url: String,
}

fn build_executor(args: &Args) -> Result<RequestExecutor> {
    // 1. Environment (and .env) first, then explicit flags on top
    let cli = ClientOptions {
        base_url: Some(args.base_url.clone()),
        timeout_secs: Some(args.timeout_secs),
        max_retries: Some(args.max_retries),
        rate_limit_interval_secs: Some(args.rate_limit_secs),
        backoff_base_secs: Some(0.5),
        backoff_max_secs: Some(2.0),
        ..ClientOptions::default()
    };
    let options = ClientOptions::from_env()?.merge(cli);

    // 2. Validate once; nothing is sent yet
    let config = ClientConfig::try_from(options)?;
    info!(base_url = %config.base_url(), "live check configured");
    Ok(RequestExecutor::new(config))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_console_logging(&args.log_level, args.json_logs)?;

    let exec = Arc::new(build_executor(&args)?);
    let params = QueryParams::new()
        .with("LeagueID", "00")
        .with("Season", "2023-24")
        .with("LastNGames", 0)
        .with("PlusMinus", false);

    println!("--- Starting RequestExecutor Live Check ---");

    // --- TEST 1: Async GET, query params and default headers ---
    println!("\n[Test 1] Async GET with query parameters...");
    let echo: HttpbinEcho = exec.get_json_async("get", &params).await?;
    if echo.args.get("Season").map(String::as_str) != Some("2023-24") {
        bail!("query parameters were not echoed back: {:?}", echo.args);
    }
    let agent = echo
        .headers
        .get("User-Agent")
        .context("server did not echo a User-Agent")?;
    println!("✅ URL: {}", echo.url);
    println!("✅ User-Agent: {agent}");

    // --- TEST 2: Blocking GET from the blocking pool ---
    println!("\n[Test 2] Blocking GET via spawn_blocking...");
    let worker = Arc::clone(&exec);
    let blocking_params = params.clone();
    let value = tokio::task::spawn_blocking(move || worker.get("/get", &blocking_params)).await??;
    let keys = value.as_object().map_or(0, |o| o.len());
    println!("✅ Blocking call returned {keys} top-level keys");

    // --- TEST 3: 404 is classified and not retried ---
    println!("\n[Test 3] Not found classification...");
    match exec.get_async("status/404", &QueryParams::new()).await {
        Err(ClientError::NotFound { endpoint, .. }) => println!("✅ NotFound for {endpoint}"),
        other => bail!("expected NotFound, got {other:?}"),
    }

    // --- TEST 4: 5xx is retried then surfaced unchanged ---
    println!("\n[Test 4] Server error retries...");
    let before = exec.attempts().len();
    match exec.get_async("status/503", &QueryParams::new()).await {
        Err(err) if err.kind() == ErrorKind::Server => {
            let made = exec.attempts().len() - before;
            println!("✅ {err} after {made} attempts");
        }
        other => bail!("expected ServerError, got {other:?}"),
    }

    // --- TEST 5: Non-JSON 2xx bodies are parse errors ---
    println!("\n[Test 5] Parse error classification...");
    match exec.get_async("html", &QueryParams::new()).await {
        Err(err) if err.kind() == ErrorKind::Parse => println!("✅ {}", err.context()),
        other => bail!("expected ParseError, got {other:?}"),
    }

    // --- TEST 6: Attempt history ---
    println!("\n[Test 6] Attempt history...");
    for record in exec.attempts() {
        println!("{}", serde_json::to_string(&record)?);
    }

    exec.close_async().await;
    println!("\n--- All checks passed ---");
    Ok(())
}
