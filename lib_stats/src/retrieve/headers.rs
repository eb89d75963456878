//! # Request Headers
//!
//! The built-in, browser-like header set sent with every request, and the
//! per-instance merge of caller overrides on top of it.

use crate::errors::ClientError;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use std::collections::BTreeMap;

/// Headers every request carries unless overridden. Never mutated at runtime;
/// each client merges its overrides into its own copy.
pub const DEFAULT_HEADERS: &[(&str, &str)] = &[
    ("accept", "application/json, text/plain, */*"),
    ("accept-language", "en-US,en;q=0.9"),
    ("cache-control", "no-cache"),
    ("dnt", "1"),
    ("pragma", "no-cache"),
    (
        "sec-ch-ua",
        "\"Google Chrome\";v=\"135\", \"Not-A.Brand\";v=\"8\", \"Chromium\";v=\"135\"",
    ),
    ("sec-ch-ua-mobile", "?0"),
    ("sec-ch-ua-platform", "\"Windows\""),
    ("sec-fetch-dest", "empty"),
    ("sec-fetch-mode", "cors"),
    ("sec-fetch-site", "same-site"),
    (
        "user-agent",
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/135.0.0.0 Safari/537.36",
    ),
];

/// Builds a fresh `HeaderMap` from [`DEFAULT_HEADERS`].
pub fn default_header_map() -> HeaderMap {
    let mut headers = HeaderMap::new();

    for (name, value) in DEFAULT_HEADERS {
        if let (Ok(h_name), Ok(h_value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            headers.insert(h_name, h_value);
        }
    }

    headers
}

/// Merges `overrides` on top of the defaults.
///
/// An override replaces the default with the same (case-insensitive) name,
/// defaults without an override are inherited, and names in neither set are
/// not sent.
///
/// # Errors
/// Returns `ClientError::Configuration` for option `headers` when a name or
/// value is not a valid HTTP header.
pub fn merge_headers(overrides: &BTreeMap<String, String>) -> Result<HeaderMap, ClientError> {
    let mut headers = default_header_map();

    for (name, value) in overrides {
        let h_name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
            ClientError::configuration("headers", format!("invalid header name `{name}`: {e}"))
        })?;
        let h_value = HeaderValue::from_str(value).map_err(|e| {
            ClientError::configuration("headers", format!("invalid value for header `{name}`: {e}"))
        })?;
        headers.insert(h_name, h_value);
    }

    Ok(headers)
}
