//! # Client Configuration
//!
//! `ClientOptions` is the loose, partially filled input (from code, a JSON
//! file or the environment). `ClientConfig` is the validated, immutable result
//! a `RequestExecutor` is built from. Validation happens exactly once, in
//! `ClientConfig::try_from`, and never touches the network.

use crate::errors::ClientError;
use crate::retrieve::headers::merge_headers;
use reqwest::header::HeaderMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use url::Url;

/// Prefix shared by every environment variable read by [`ClientOptions::from_env`].
pub const ENV_PREFIX: &str = "STATS_";

const ENV_HEADER_PREFIX: &str = "STATS_HEADER_";

const DEFAULT_TIMEOUT_SECS: f64 = 30.0;
const DEFAULT_MAX_RETRIES: i64 = 3;
const DEFAULT_RATE_LIMIT_INTERVAL_SECS: f64 = 0.0;
const DEFAULT_BACKOFF_BASE_SECS: f64 = 1.0;
const DEFAULT_BACKOFF_MAX_SECS: f64 = 10.0;
const DEFAULT_FAILURE_THRESHOLD: i64 = 5;
const DEFAULT_RESET_TIMEOUT_SECS: f64 = 60.0;
const DEFAULT_HISTORY_CAPACITY: usize = 64;

/// # Client Options
///
/// Every field is optional; unset fields fall back to the defaults when the
/// options are turned into a [`ClientConfig`]. Numeric fields use signed and
/// floating types on purpose so that out-of-range input can be reported as a
/// `ConfigurationError` rather than being unrepresentable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientOptions {
    /// Root the executor joins endpoint paths onto.
    pub base_url: Option<String>,
    /// Per-attempt timeout in seconds. Must be > 0.
    pub timeout_secs: Option<f64>,
    /// Additional attempts after the first. Must be >= 0.
    pub max_retries: Option<i64>,
    /// Minimum spacing between dispatches in seconds. 0 disables throttling.
    pub rate_limit_interval_secs: Option<f64>,
    /// Enables the circuit breaker.
    pub circuit_breaker: Option<bool>,
    /// Header overrides merged over the built-in defaults.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// First retry delay in seconds.
    pub backoff_base_secs: Option<f64>,
    /// Ceiling of the retry delay in seconds.
    pub backoff_max_secs: Option<f64>,
    /// Consecutive failures that open the circuit breaker.
    pub failure_threshold: Option<i64>,
    /// Circuit breaker cooldown in seconds.
    pub reset_timeout_secs: Option<f64>,
    /// Retry 429 responses, honouring `Retry-After`.
    pub retry_on_rate_limit: Option<bool>,
    /// Number of attempt records kept for diagnostics.
    pub history_capacity: Option<usize>,
}

impl ClientOptions {
    /// Merges two option sets; `other` overrides `self` for `Some` values and
    /// per header key.
    pub fn merge(self, other: ClientOptions) -> ClientOptions {
        let mut headers = self.headers;
        headers.extend(other.headers);

        ClientOptions {
            base_url: other.base_url.or(self.base_url),
            timeout_secs: other.timeout_secs.or(self.timeout_secs),
            max_retries: other.max_retries.or(self.max_retries),
            rate_limit_interval_secs: other
                .rate_limit_interval_secs
                .or(self.rate_limit_interval_secs),
            circuit_breaker: other.circuit_breaker.or(self.circuit_breaker),
            headers,
            backoff_base_secs: other.backoff_base_secs.or(self.backoff_base_secs),
            backoff_max_secs: other.backoff_max_secs.or(self.backoff_max_secs),
            failure_threshold: other.failure_threshold.or(self.failure_threshold),
            reset_timeout_secs: other.reset_timeout_secs.or(self.reset_timeout_secs),
            retry_on_rate_limit: other.retry_on_rate_limit.or(self.retry_on_rate_limit),
            history_capacity: other.history_capacity.or(self.history_capacity),
        }
    }

    /// Reads options from the process environment, loading a `.env` file first
    /// when one is present.
    ///
    /// # Errors
    /// Returns `ClientError::Configuration` naming the variable whose value
    /// does not parse, or `.env` when that file exists but cannot be read.
    pub fn from_env() -> Result<Self, ClientError> {
        load_dotenv(dotenvy::dotenv())?;
        Self::from_vars(std::env::vars())
    }

    /// Builds options from an explicit list of `STATS_*` variables.
    pub fn from_vars<I, K, V>(vars: I) -> Result<Self, ClientError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut options = ClientOptions::default();

        for (key, value) in vars {
            let key = key.as_ref();
            if !key.starts_with(ENV_PREFIX) {
                continue;
            }
            let value: String = value.into();
            let value = value.trim();

            if let Some(header) = key.strip_prefix(ENV_HEADER_PREFIX) {
                let name = header.to_ascii_lowercase().replace('_', "-");
                options.headers.insert(name, value.to_string());
                continue;
            }

            match key {
                "STATS_BASE_URL" => options.base_url = Some(value.to_string()),
                "STATS_TIMEOUT_SECS" => options.timeout_secs = Some(parse_var(key, value)?),
                "STATS_MAX_RETRIES" => options.max_retries = Some(parse_var(key, value)?),
                "STATS_RATE_LIMIT_INTERVAL_SECS" => {
                    options.rate_limit_interval_secs = Some(parse_var(key, value)?)
                }
                "STATS_CIRCUIT_BREAKER" => options.circuit_breaker = Some(parse_flag(key, value)?),
                "STATS_BACKOFF_BASE_SECS" => {
                    options.backoff_base_secs = Some(parse_var(key, value)?)
                }
                "STATS_BACKOFF_MAX_SECS" => options.backoff_max_secs = Some(parse_var(key, value)?),
                "STATS_FAILURE_THRESHOLD" => {
                    options.failure_threshold = Some(parse_var(key, value)?)
                }
                "STATS_RESET_TIMEOUT_SECS" => {
                    options.reset_timeout_secs = Some(parse_var(key, value)?)
                }
                "STATS_RETRY_ON_RATE_LIMIT" => {
                    options.retry_on_rate_limit = Some(parse_flag(key, value)?)
                }
                "STATS_HISTORY_CAPACITY" => options.history_capacity = Some(parse_var(key, value)?),
                _ => {}
            }
        }

        Ok(options)
    }
}

fn parse_var<T>(key: &str, value: &str) -> Result<T, ClientError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .parse::<T>()
        .map_err(|e| ClientError::configuration(key, format!("cannot parse `{value}`: {e}")))
}

fn parse_flag(key: &str, value: &str) -> Result<bool, ClientError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ClientError::configuration(
            key,
            format!("expected a boolean, got `{value}`"),
        )),
    }
}

/// # Client Configuration
///
/// Validated and frozen at construction. The merged header map is computed
/// here once so every request of the instance shares it.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    base_url: Url,
    timeout: Duration,
    max_retries: u32,
    rate_limit_interval: Duration,
    circuit_breaker: bool,
    header_overrides: BTreeMap<String, String>,
    headers: HeaderMap,
    backoff_base: Duration,
    backoff_max: Duration,
    failure_threshold: u32,
    reset_timeout: Duration,
    retry_on_rate_limit: bool,
    history_capacity: usize,
}

impl ClientConfig {
    /// Starts a builder rooted at `base_url`.
    pub fn builder(base_url: impl Into<String>) -> ClientConfigBuilder {
        ClientConfigBuilder {
            options: ClientOptions {
                base_url: Some(base_url.into()),
                ..ClientOptions::default()
            },
        }
    }

    /// The base URL, always ending in `/`.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Ceiling for a single HTTP attempt.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Additional attempts after the first.
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Minimum spacing between dispatches.
    pub fn rate_limit_interval(&self) -> Duration {
        self.rate_limit_interval
    }

    /// Whether calls go through the circuit breaker.
    pub fn circuit_breaker_enabled(&self) -> bool {
        self.circuit_breaker
    }

    /// The caller's header overrides as given.
    pub fn header_overrides(&self) -> &BTreeMap<String, String> {
        &self.header_overrides
    }

    /// Defaults merged with overrides; what is actually sent.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// First retry delay.
    pub fn backoff_base(&self) -> Duration {
        self.backoff_base
    }

    /// Retry delay ceiling.
    pub fn backoff_max(&self) -> Duration {
        self.backoff_max
    }

    /// Consecutive failures that open the breaker.
    pub fn failure_threshold(&self) -> u32 {
        self.failure_threshold
    }

    /// Breaker cooldown.
    pub fn reset_timeout(&self) -> Duration {
        self.reset_timeout
    }

    /// Whether 429 responses are retried.
    pub fn retry_on_rate_limit(&self) -> bool {
        self.retry_on_rate_limit
    }

    /// Attempt records kept for diagnostics.
    pub fn history_capacity(&self) -> usize {
        self.history_capacity
    }
}

impl TryFrom<ClientOptions> for ClientConfig {
    type Error = ClientError;

    fn try_from(options: ClientOptions) -> Result<Self, Self::Error> {
        // 1. Base URL: absolute http(s), normalized to end with a slash
        let raw_url = options
            .base_url
            .ok_or_else(|| ClientError::configuration("base_url", "a base URL is required"))?;
        let base_url = parse_base_url(&raw_url)?;

        // 2. Durations and counters
        let timeout = seconds(
            "timeout",
            options.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS),
            false,
        )?;
        let max_retries = non_negative_count(
            "max_retries",
            options.max_retries.unwrap_or(DEFAULT_MAX_RETRIES),
        )?;
        let rate_limit_interval = seconds(
            "rate_limit_interval",
            options
                .rate_limit_interval_secs
                .unwrap_or(DEFAULT_RATE_LIMIT_INTERVAL_SECS),
            true,
        )?;
        let backoff_base = seconds(
            "backoff_base",
            options.backoff_base_secs.unwrap_or(DEFAULT_BACKOFF_BASE_SECS),
            true,
        )?;
        let backoff_max = seconds(
            "backoff_max",
            options.backoff_max_secs.unwrap_or(DEFAULT_BACKOFF_MAX_SECS),
            true,
        )?;
        if backoff_max < backoff_base {
            return Err(ClientError::configuration(
                "backoff_max",
                format!("must not be below backoff_base ({backoff_base:?})"),
            ));
        }
        let failure_threshold = non_negative_count(
            "failure_threshold",
            options.failure_threshold.unwrap_or(DEFAULT_FAILURE_THRESHOLD),
        )?;
        if failure_threshold == 0 {
            return Err(ClientError::configuration(
                "failure_threshold",
                "must be at least 1",
            ));
        }
        let reset_timeout = seconds(
            "reset_timeout",
            options
                .reset_timeout_secs
                .unwrap_or(DEFAULT_RESET_TIMEOUT_SECS),
            true,
        )?;

        // 3. Headers: defaults merged with overrides
        let headers = merge_headers(&options.headers)?;

        Ok(ClientConfig {
            base_url,
            timeout,
            max_retries,
            rate_limit_interval,
            circuit_breaker: options.circuit_breaker.unwrap_or(true),
            header_overrides: options.headers,
            headers,
            backoff_base,
            backoff_max,
            failure_threshold,
            reset_timeout,
            retry_on_rate_limit: options.retry_on_rate_limit.unwrap_or(false),
            history_capacity: options
                .history_capacity
                .unwrap_or(DEFAULT_HISTORY_CAPACITY),
        })
    }
}

fn parse_base_url(raw: &str) -> Result<Url, ClientError> {
    let mut url = Url::parse(raw).map_err(|e| {
        ClientError::configuration("base_url", format!("`{raw}` is not a valid absolute URL: {e}"))
    })?;

    if !matches!(url.scheme(), "http" | "https") || url.cannot_be_a_base() {
        return Err(ClientError::configuration(
            "base_url",
            format!("`{raw}` must be an http or https URL"),
        ));
    }

    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }

    Ok(url)
}

/// A missing `.env` file is the common case; any other load failure is not.
fn load_dotenv<T>(result: Result<T, dotenvy::Error>) -> Result<(), ClientError> {
    match result {
        Ok(_) => Ok(()),
        Err(e) if e.not_found() => Ok(()),
        Err(e) => Err(ClientError::configuration(".env", e.to_string())),
    }
}

fn seconds(option: &str, value: f64, allow_zero: bool) -> Result<Duration, ClientError> {
    if !value.is_finite() {
        return Err(ClientError::configuration(
            option,
            format!("must be a finite number of seconds, got {value}"),
        ));
    }
    if value < 0.0 {
        return Err(ClientError::configuration(
            option,
            format!("must not be negative, got {value}"),
        ));
    }
    if value == 0.0 && !allow_zero {
        return Err(ClientError::configuration(option, "must be greater than zero"));
    }
    Duration::try_from_secs_f64(value)
        .map_err(|e| ClientError::configuration(option, format!("out of range: {e}")))
}

fn non_negative_count(option: &str, value: i64) -> Result<u32, ClientError> {
    if value < 0 {
        return Err(ClientError::configuration(
            option,
            format!("must not be negative, got {value}"),
        ));
    }
    u32::try_from(value)
        .map_err(|_| ClientError::configuration(option, format!("too large, got {value}")))
}

/// # Client Config Builder
///
/// Fluent front-end over [`ClientOptions`]; `build` runs the same validation
/// as `ClientConfig::try_from`.
#[derive(Debug, Clone)]
pub struct ClientConfigBuilder {
    options: ClientOptions,
}

impl ClientConfigBuilder {
    /// Per-attempt timeout in seconds.
    pub fn timeout_secs(mut self, secs: f64) -> Self {
        self.options.timeout_secs = Some(secs);
        self
    }

    /// Additional attempts after the first.
    pub fn max_retries(mut self, retries: i64) -> Self {
        self.options.max_retries = Some(retries);
        self
    }

    /// Minimum spacing between dispatches in seconds.
    pub fn rate_limit_interval_secs(mut self, secs: f64) -> Self {
        self.options.rate_limit_interval_secs = Some(secs);
        self
    }

    /// Enables or disables the circuit breaker.
    pub fn circuit_breaker(mut self, enabled: bool) -> Self {
        self.options.circuit_breaker = Some(enabled);
        self
    }

    /// Adds a header override.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.headers.insert(name.into(), value.into());
        self
    }

    /// Retry delay curve: first delay and ceiling, in seconds.
    pub fn backoff_secs(mut self, base: f64, max: f64) -> Self {
        self.options.backoff_base_secs = Some(base);
        self.options.backoff_max_secs = Some(max);
        self
    }

    /// Consecutive failures that open the breaker.
    pub fn failure_threshold(mut self, threshold: i64) -> Self {
        self.options.failure_threshold = Some(threshold);
        self
    }

    /// Breaker cooldown in seconds.
    pub fn reset_timeout_secs(mut self, secs: f64) -> Self {
        self.options.reset_timeout_secs = Some(secs);
        self
    }

    /// Retry 429 responses.
    pub fn retry_on_rate_limit(mut self, enabled: bool) -> Self {
        self.options.retry_on_rate_limit = Some(enabled);
        self
    }

    /// Attempt records kept for diagnostics.
    pub fn history_capacity(mut self, capacity: usize) -> Self {
        self.options.history_capacity = Some(capacity);
        self
    }

    /// Overlays a whole option set (e.g. loaded from the environment).
    pub fn options(mut self, options: ClientOptions) -> Self {
        self.options = self.options.merge(options);
        self
    }

    /// Validates and freezes the configuration.
    ///
    /// # Errors
    /// Returns `ClientError::Configuration` naming the first invalid option.
    pub fn build(self) -> Result<ClientConfig, ClientError> {
        ClientConfig::try_from(self.options)
    }
}
