//! # Error Taxonomy
//!
//! Every failure that crosses the public boundary of this crate is a
//! [`ClientError`]. The set of variants is closed: endpoint collaborators can
//! catch broadly (any `ClientError`), by family ([`ClientError::is_network`],
//! [`ClientError::is_http`]) or narrowly (match on a variant or on
//! [`ErrorKind`]).
//!
//! ## Families:
//! - **Network**: `Timeout` and `Network`. Both are transient and retried.
//! - **HTTP**: `NotFound`, `Http`, `Server` and `RateLimited`. Only `Server` is
//!   retried by default.
//! - **Standalone**: `Configuration`, `Parse` and `CircuitOpen`, none of which
//!   is retried.
//!
//! The textual form of every error carries its message together with all of its
//! structured fields, so a logged error can be diagnosed without a debugger.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

mod context;

pub use context::ErrorContext;

use serde::Serialize;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Number of characters of a response body kept in messages and contexts.
pub const BODY_EXCERPT_LEN: usize = 200;

/// # Error Kind
///
/// A copyable discriminant of [`ClientError`], convenient for comparisons in
/// tests and for metrics labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    /// An invalid constructor option.
    Configuration,
    /// An attempt did not finish within the per-attempt timeout.
    Timeout,
    /// Connection, DNS or other transport-level failure.
    Network,
    /// HTTP status 500 or above.
    Server,
    /// HTTP status 404.
    NotFound,
    /// Any other non-success HTTP status.
    Http,
    /// A 2xx response whose body is not valid JSON for the expected shape.
    Parse,
    /// HTTP status 429.
    RateLimited,
    /// The circuit breaker is open.
    CircuitOpen,
}

impl ErrorKind {
    /// Returns the canonical name of the kind, e.g. `"ServerError"`.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Configuration => "ConfigurationError",
            ErrorKind::Timeout => "TimeoutError",
            ErrorKind::Network => "NetworkError",
            ErrorKind::Server => "ServerError",
            ErrorKind::NotFound => "NotFoundError",
            ErrorKind::Http => "HTTPError",
            ErrorKind::Parse => "ParseError",
            ErrorKind::RateLimited => "RateLimitError",
            ErrorKind::CircuitOpen => "CircuitBreakerError",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// # Client Error
///
/// The single root error type of the request layer.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ClientError {
    /// A constructor option failed validation. Raised before any I/O.
    #[error("ConfigurationError: invalid value for `{option}`: {reason} (option={option})")]
    Configuration {
        /// Name of the offending option.
        option: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// The attempt did not complete within the configured timeout.
    #[error("TimeoutError: request timed out (endpoint={endpoint}, timeout={timeout:?})")]
    Timeout {
        /// Endpoint path that was requested.
        endpoint: String,
        /// The per-attempt timeout that elapsed.
        timeout: Duration,
    },

    /// The request could not be delivered (connect, DNS, reset, ...).
    #[error("NetworkError: {message} (endpoint={endpoint})")]
    Network {
        /// Endpoint path that was requested.
        endpoint: String,
        /// Transport-level description of the failure.
        message: String,
    },

    /// The service answered with a 5xx status.
    #[error(
        "ServerError: server returned HTTP {status_code} (endpoint={endpoint}, status_code={status_code}, body={})",
        excerpt(.body)
    )]
    Server {
        /// Endpoint path that was requested.
        endpoint: String,
        /// Raw HTTP status.
        status_code: u16,
        /// Full response body.
        body: String,
    },

    /// The service answered with 404.
    #[error(
        "NotFoundError: resource not found (endpoint={endpoint}, status_code=404, body={})",
        excerpt(.body)
    )]
    NotFound {
        /// Endpoint path that was requested.
        endpoint: String,
        /// Full response body.
        body: String,
    },

    /// The service answered with a non-success status not covered by a more
    /// specific kind.
    #[error(
        "HTTPError: request failed with HTTP {status_code} (endpoint={endpoint}, status_code={status_code}, body={})",
        excerpt(.body)
    )]
    Http {
        /// Endpoint path that was requested.
        endpoint: String,
        /// Raw HTTP status.
        status_code: u16,
        /// Full response body.
        body: String,
    },

    /// The service answered 2xx but the body could not be parsed.
    #[error("ParseError: {reason} (endpoint={endpoint}, body={excerpt})")]
    Parse {
        /// Endpoint path that was requested.
        endpoint: String,
        /// The first characters of the offending body.
        excerpt: String,
        /// Parser diagnostic.
        reason: String,
    },

    /// The service explicitly throttled the request (429).
    #[error(
        "RateLimitError: throttled by remote service (endpoint={endpoint}, status_code=429, retry_after={}, body={})",
        fmt_retry_after(.retry_after),
        excerpt(.body)
    )]
    RateLimited {
        /// Endpoint path that was requested.
        endpoint: String,
        /// Server supplied `Retry-After` hint, if any.
        retry_after: Option<Duration>,
        /// Full response body.
        body: String,
    },

    /// The circuit breaker is open; no request was sent.
    #[error(
        "CircuitBreakerError: circuit breaker is open (failure_count={failure_count}, reset_timeout={reset_timeout:?})"
    )]
    CircuitOpen {
        /// Consecutive failures recorded when the call was rejected.
        failure_count: u32,
        /// Configured cooldown before a trial call is admitted.
        reset_timeout: Duration,
    },
}

impl ClientError {
    /// Creates a configuration error for `option`.
    pub fn configuration(option: impl Into<String>, reason: impl Into<String>) -> Self {
        ClientError::Configuration {
            option: option.into(),
            reason: reason.into(),
        }
    }

    /// Returns the discriminant of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ClientError::Configuration { .. } => ErrorKind::Configuration,
            ClientError::Timeout { .. } => ErrorKind::Timeout,
            ClientError::Network { .. } => ErrorKind::Network,
            ClientError::Server { .. } => ErrorKind::Server,
            ClientError::NotFound { .. } => ErrorKind::NotFound,
            ClientError::Http { .. } => ErrorKind::Http,
            ClientError::Parse { .. } => ErrorKind::Parse,
            ClientError::RateLimited { .. } => ErrorKind::RateLimited,
            ClientError::CircuitOpen { .. } => ErrorKind::CircuitOpen,
        }
    }

    /// Transient failures that the default retry policy retries.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ClientError::Timeout { .. } | ClientError::Network { .. } | ClientError::Server { .. }
        )
    }

    /// `Timeout` is a specialization of `Network`.
    pub fn is_network(&self) -> bool {
        matches!(self, ClientError::Timeout { .. } | ClientError::Network { .. })
    }

    /// Every error produced from an HTTP status code.
    pub fn is_http(&self) -> bool {
        matches!(
            self,
            ClientError::Server { .. }
                | ClientError::NotFound { .. }
                | ClientError::Http { .. }
                | ClientError::RateLimited { .. }
        )
    }

    /// The HTTP status behind this error, if one was received.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ClientError::Server { status_code, .. } | ClientError::Http { status_code, .. } => {
                Some(*status_code)
            }
            ClientError::NotFound { .. } => Some(404),
            ClientError::RateLimited { .. } => Some(429),
            _ => None,
        }
    }

    /// The endpoint path the failed call targeted.
    pub fn endpoint(&self) -> Option<&str> {
        match self {
            ClientError::Timeout { endpoint, .. }
            | ClientError::Network { endpoint, .. }
            | ClientError::Server { endpoint, .. }
            | ClientError::NotFound { endpoint, .. }
            | ClientError::Http { endpoint, .. }
            | ClientError::Parse { endpoint, .. }
            | ClientError::RateLimited { endpoint, .. } => Some(endpoint),
            ClientError::Configuration { .. } | ClientError::CircuitOpen { .. } => None,
        }
    }

    /// The server's `Retry-After` hint for a throttled request.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            ClientError::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Builds the structured diagnostic context of this error.
    pub fn context(&self) -> ErrorContext {
        let mut ctx = ErrorContext::new(self.kind(), self.to_string());
        match self {
            ClientError::Configuration { option, reason } => {
                ctx.insert("option", option.as_str());
                ctx.insert("reason", reason.as_str());
            }
            ClientError::Timeout { endpoint, timeout } => {
                ctx.insert("endpoint", endpoint.as_str());
                ctx.insert("timeout_secs", timeout.as_secs_f64());
            }
            ClientError::Network { endpoint, message } => {
                ctx.insert("endpoint", endpoint.as_str());
                ctx.insert("cause", message.as_str());
            }
            ClientError::Server {
                endpoint,
                status_code,
                body,
            }
            | ClientError::Http {
                endpoint,
                status_code,
                body,
            } => {
                ctx.insert("endpoint", endpoint.as_str());
                ctx.insert("status_code", *status_code);
                ctx.insert("body_excerpt", excerpt(body));
            }
            ClientError::NotFound { endpoint, body } => {
                ctx.insert("endpoint", endpoint.as_str());
                ctx.insert("status_code", 404);
                ctx.insert("body_excerpt", excerpt(body));
            }
            ClientError::Parse {
                endpoint,
                excerpt,
                reason,
            } => {
                ctx.insert("endpoint", endpoint.as_str());
                ctx.insert("body_excerpt", excerpt.as_str());
                ctx.insert("reason", reason.as_str());
            }
            ClientError::RateLimited {
                endpoint,
                retry_after,
                body,
            } => {
                ctx.insert("endpoint", endpoint.as_str());
                ctx.insert("status_code", 429);
                if let Some(hint) = retry_after {
                    ctx.insert("retry_after_secs", hint.as_secs_f64());
                }
                ctx.insert("body_excerpt", excerpt(body));
            }
            ClientError::CircuitOpen {
                failure_count,
                reset_timeout,
            } => {
                ctx.insert("failure_count", *failure_count);
                ctx.insert("reset_timeout_secs", reset_timeout.as_secs_f64());
            }
        }
        ctx
    }
}

/// Truncates a body to [`BODY_EXCERPT_LEN`] characters, marking the cut.
pub fn excerpt(body: &str) -> String {
    let mut chars = body.chars();
    let head: String = chars.by_ref().take(BODY_EXCERPT_LEN).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}

fn fmt_retry_after(hint: &Option<Duration>) -> String {
    match hint {
        Some(d) => format!("{d:?}"),
        None => "none".to_string(),
    }
}
