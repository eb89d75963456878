//! # lib_stats
//!
//! Resilient request layer for a JSON-over-HTTP statistics service: one
//! executor per client with rate limiting, retries, a circuit breaker and a
//! closed error taxonomy, callable from blocking and async code alike.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

/// Client configuration and environment loading.
pub mod configs;
/// The error taxonomy.
pub mod errors;
/// Console logging setup for binaries and tests.
#[cfg(feature = "loggers")]
pub mod loggers;
/// Rate limiter, circuit breaker and retry policy.
pub mod resilience;
/// Request execution over HTTP.
pub mod retrieve;

// Re-export the everyday surface
pub use configs::client_config::{ClientConfig, ClientConfigBuilder, ClientOptions};
pub use errors::{ClientError, ErrorContext, ErrorKind};
pub use resilience::circuit_breaker::{CircuitBreaker, CircuitState};
pub use resilience::rate_limiter::RateLimiter;
pub use resilience::retry_policy::RetryPolicy;
pub use retrieve::attempts::{AttemptRecord, CallStyle, OutcomeKind};
pub use retrieve::executor::RequestExecutor;
pub use retrieve::params::{QueryParams, Scalar};
