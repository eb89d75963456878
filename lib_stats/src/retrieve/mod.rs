//! # Data Retrieval Module
//!
//! The HTTP side of the client: request preparation, the transport seam,
//! response classification and the executor that ties them to the resilience
//! primitives.
//!
//! ## Purpose:
//! Endpoint wrappers only name a path and its query parameters. Everything
//! else (browser-like headers, timeouts, throttling, retries, fail-fast while
//! the service is down, JSON decoding, error classification) happens here,
//! identically for blocking and async callers.
//!
//! ## Contained Modules:
//!
//! - **`executor`**: the `RequestExecutor` with `get` / `get_async`.
//! - **`transport`**: the `reqwest` transports and the traits tests script.
//! - **`attempts`**: status classification and the attempt history.
//! - **`params`**: ordered query parameters.
//! - **`headers`**: the default header set and override merging.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

/// Attempt classification and bounded diagnostic history.
pub mod attempts;
/// The request executor.
pub mod executor;
/// Default browser-like headers.
pub mod headers;
/// Query parameter container.
pub mod params;
/// Transport traits and `reqwest` implementations.
pub mod transport;
