//! # Attempt Classification and History
//!
//! Turns the raw result of one HTTP attempt into either a parsed JSON value or
//! a [`ClientError`], and keeps a bounded record of recent attempts for
//! diagnostics.

use crate::errors::{excerpt, ClientError, ErrorKind};
use crate::retrieve::transport::{PreparedRequest, RawResponse, TransportError};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use serde::Serialize;
use serde_json::Value;
use std::collections::VecDeque;
use std::time::Duration;

/// Which public entry point issued an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CallStyle {
    /// `get` / `get_json`.
    Blocking,
    /// `get_async` / `get_json_async`.
    Async,
}

/// How a single attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OutcomeKind {
    /// A 2xx response with a parseable body.
    Success,
    /// Any classified failure.
    Failure(ErrorKind),
}

/// The classified result of one attempt.
#[derive(Debug, Clone)]
pub struct AttemptOutcome {
    /// HTTP status, when a response was received at all.
    pub status: Option<u16>,
    /// Parsed body or the classified failure.
    pub result: Result<Value, ClientError>,
}

impl AttemptOutcome {
    /// The outcome reduced to its kind.
    pub fn kind(&self) -> OutcomeKind {
        match &self.result {
            Ok(_) => OutcomeKind::Success,
            Err(e) => OutcomeKind::Failure(e.kind()),
        }
    }
}

/// # Classify an attempt
///
/// ## Logic:
/// 1. Transport timeout → `Timeout`; any other transport failure → `Network`.
/// 2. 2xx → parse the body as JSON (`Parse` on failure, an empty body included).
/// 3. 404 → `NotFound`; 429 → `RateLimited` with the `Retry-After` hint.
/// 4. 500 and above → `Server`; every other status → `Http`.
pub fn classify(
    request: &PreparedRequest,
    response: Result<RawResponse, TransportError>,
) -> AttemptOutcome {
    let endpoint = request.endpoint.clone();

    let response = match response {
        Ok(response) => response,
        Err(TransportError::Timeout) => {
            return AttemptOutcome {
                status: None,
                result: Err(ClientError::Timeout {
                    endpoint,
                    timeout: request.timeout,
                }),
            }
        }
        Err(other) => {
            return AttemptOutcome {
                status: None,
                result: Err(ClientError::Network {
                    endpoint,
                    message: other.to_string(),
                }),
            }
        }
    };

    let status = response.status;
    let result = match status {
        200..=299 => parse_body(endpoint, &response.body),
        404 => Err(ClientError::NotFound {
            endpoint,
            body: response.body,
        }),
        429 => Err(ClientError::RateLimited {
            endpoint,
            retry_after: retry_after(&response.headers),
            body: response.body,
        }),
        500..=u16::MAX => Err(ClientError::Server {
            endpoint,
            status_code: status,
            body: response.body,
        }),
        _ => Err(ClientError::Http {
            endpoint,
            status_code: status,
            body: response.body,
        }),
    };

    AttemptOutcome {
        status: Some(status),
        result,
    }
}

fn parse_body(endpoint: String, body: &str) -> Result<Value, ClientError> {
    serde_json::from_str(body).map_err(|e| ClientError::Parse {
        endpoint,
        excerpt: excerpt(body),
        reason: e.to_string(),
    })
}

/// Reads `Retry-After` as delta-seconds or as an HTTP date.
pub fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    let raw = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();

    if let Ok(secs) = raw.parse::<f64>() {
        return Duration::try_from_secs_f64(secs).ok();
    }

    let at = DateTime::parse_from_rfc2822(raw).ok()?.with_timezone(&Utc);
    (at - Utc::now()).to_std().ok().or(Some(Duration::ZERO))
}

/// # Attempt Record
///
/// One line of the diagnostic history.
#[derive(Debug, Clone, Serialize)]
pub struct AttemptRecord {
    /// Always `GET` for this client.
    pub method: &'static str,
    /// Full URL including the query string.
    pub url: String,
    /// Endpoint path as given by the caller.
    pub endpoint: String,
    /// Query parameters as sent.
    pub params: Vec<(String, String)>,
    /// Entry point that issued the attempt.
    pub style: CallStyle,
    /// 1-based attempt number within the call.
    pub attempt: u32,
    /// How the attempt ended.
    pub outcome: OutcomeKind,
    /// HTTP status, when a response was received.
    pub status: Option<u16>,
    /// Wall time spent in the transport.
    pub elapsed: Duration,
    /// When the attempt finished.
    pub at: DateTime<Utc>,
}

impl AttemptRecord {
    /// Builds the record of a finished attempt.
    pub fn new(
        request: &PreparedRequest,
        style: CallStyle,
        attempt: u32,
        outcome: &AttemptOutcome,
        elapsed: Duration,
    ) -> Self {
        Self {
            method: "GET",
            url: request.full_url(),
            endpoint: request.endpoint.clone(),
            params: request.query.clone(),
            style,
            attempt,
            outcome: outcome.kind(),
            status: outcome.status,
            elapsed,
            at: Utc::now(),
        }
    }
}

/// Bounded ring of the most recent attempts of one client.
#[derive(Debug)]
pub struct AttemptHistory {
    capacity: usize,
    records: Mutex<VecDeque<AttemptRecord>>,
}

impl AttemptHistory {
    /// A ring holding at most `capacity` records. Zero disables recording.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            records: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    /// Appends a record, evicting the oldest when full.
    pub fn record(&self, record: AttemptRecord) {
        if self.capacity == 0 {
            return;
        }
        let mut records = self.records.lock();
        while records.len() >= self.capacity {
            records.pop_front();
        }
        records.push_back(record);
    }

    /// Oldest first.
    pub fn snapshot(&self) -> Vec<AttemptRecord> {
        self.records.lock().iter().cloned().collect()
    }

    /// The most recent record.
    pub fn last(&self) -> Option<AttemptRecord> {
        self.records.lock().back().cloned()
    }
}
