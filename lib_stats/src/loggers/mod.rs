//! # Console Logging
//!
//! The library itself only emits `tracing` events. Binaries and tests that
//! want to see them call [`init_console_logging`] once at startup.

use thiserror::Error;
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Errors raised while installing the global subscriber.
#[derive(Debug, Error)]
pub enum LoggerError {
    /// The level or `RUST_LOG` directive could not be parsed.
    #[error("invalid log filter: {0}")]
    Filter(#[from] ParseError),

    /// A global subscriber is already installed.
    #[error("failed to install tracing subscriber: {0}")]
    Install(String),
}

/// # Initialize console logging
///
/// ## Logic:
/// 1. `RUST_LOG` wins when set; otherwise `level` (e.g. `"info"`,
///    `"lib_stats=debug"`) is used.
/// 2. Events go to stdout, as JSON lines when `json` is true.
///
/// # Errors
/// `LoggerError::Install` when called a second time in the same process.
pub fn init_console_logging(level: &str, json: bool) -> Result<(), LoggerError> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(level)?,
    };

    let registry = tracing_subscriber::registry().with(env_filter);
    let installed = if json {
        registry
            .with(fmt::layer().json().with_target(true).with_current_span(false))
            .try_init()
    } else {
        registry.with(fmt::layer().with_target(true)).try_init()
    };

    installed.map_err(|e| LoggerError::Install(e.to_string()))
}
