//! # Resilience Module
//!
//! The building blocks the request executor composes around every call.
//!
//! ## Contained Modules:
//!
//! - **`rate_limiter`**: minimum spacing between dispatches of one client,
//!   usable from blocking and async code through one shared lock.
//! - **`circuit_breaker`**: consecutive-failure counting with fail-fast while
//!   open and a lazily admitted single trial call after the cooldown.
//! - **`retry_policy`**: the one retry predicate and bounded exponential
//!   backoff curve both calling styles use.
//!
//! All state is owned by a single client instance; nothing here is global.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

/// Consecutive-failure circuit breaker with a single trial call.
pub mod circuit_breaker;
/// Minimum-interval rate limiter shared by both calling styles.
pub mod rate_limiter;
/// Retry predicate and backoff curve.
pub mod retry_policy;
