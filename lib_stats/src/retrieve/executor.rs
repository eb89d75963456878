//! # Request Executor
//!
//! The client core endpoint collaborators call. One executor owns one
//! validated configuration, one rate limiter, at most one circuit breaker, and
//! one lazily created transport handle per calling style.
//!
//! ## Per-call sequence (both styles):
//! 1. Resolve the target URL (no I/O).
//! 2. Ask the breaker for admission; an open breaker fails fast.
//! 3. For each attempt: wait for the rate limiter, send, classify, record.
//! 4. Retry transient failures with bounded exponential backoff; surface the
//!    last error unchanged once the attempts are spent.
//!
//! Steps 3 and 4 are one operation from the breaker's point of view, so a call
//! that exhausts its retries counts as a single failure.

use crate::configs::client_config::{ClientConfig, ClientOptions};
use crate::errors::{excerpt, ClientError};
use crate::resilience::circuit_breaker::CircuitBreaker;
use crate::resilience::rate_limiter::RateLimiter;
use crate::resilience::retry_policy::RetryPolicy;
use crate::retrieve::attempts::{
    classify, AttemptHistory, AttemptOutcome, AttemptRecord, CallStyle,
};
use crate::retrieve::params::QueryParams;
use crate::retrieve::transport::{
    AsyncTransport, BlockingTransport, PreparedRequest, RawResponse, ReqwestTransportFactory,
    TransportError, TransportFactory,
};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

/// What follows a finished attempt.
enum Step {
    Done(Result<Value, ClientError>),
    Retry(Duration),
}

/// # Request Executor
///
/// `Send + Sync`: share it behind an `Arc` between threads and tasks. The
/// blocking methods must not run on an async runtime worker; wrap them in
/// `tokio::task::spawn_blocking` there.
pub struct RequestExecutor {
    config: ClientConfig,
    policy: RetryPolicy,
    rate_limiter: RateLimiter,
    circuit_breaker: Option<CircuitBreaker>,
    factory: Arc<dyn TransportFactory>,
    blocking: Mutex<Option<Arc<dyn BlockingTransport>>>,
    non_blocking: Mutex<Option<Arc<dyn AsyncTransport>>>,
    history: AttemptHistory,
}

impl fmt::Debug for RequestExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestExecutor")
            .field("base_url", &self.config.base_url().as_str())
            .field("policy", &self.policy)
            .field("rate_limiter", &self.rate_limiter)
            .field("circuit_breaker", &self.circuit_breaker)
            .field("blocking_open", &self.blocking.lock().is_some())
            .field("async_open", &self.non_blocking.lock().is_some())
            .finish()
    }
}

impl RequestExecutor {
    /// # New `RequestExecutor`
    ///
    /// Uses `reqwest` for both calling styles. No connection is opened until
    /// the first call.
    pub fn new(config: ClientConfig) -> Self {
        Self::with_transport(config, Arc::new(ReqwestTransportFactory))
    }

    /// Builds an executor whose transport handles come from `factory`.
    pub fn with_transport(config: ClientConfig, factory: Arc<dyn TransportFactory>) -> Self {
        let circuit_breaker = config
            .circuit_breaker_enabled()
            .then(|| CircuitBreaker::new(config.failure_threshold(), config.reset_timeout()));

        Self {
            policy: RetryPolicy::from_config(&config),
            rate_limiter: RateLimiter::new(config.rate_limit_interval()),
            circuit_breaker,
            factory,
            blocking: Mutex::new(None),
            non_blocking: Mutex::new(None),
            history: AttemptHistory::new(config.history_capacity()),
            config,
        }
    }

    /// Validates `options` and builds a `reqwest`-backed executor.
    ///
    /// # Errors
    /// `ClientError::Configuration` for the first invalid option. Nothing is
    /// sent over the network.
    pub fn from_options(options: ClientOptions) -> Result<Self, ClientError> {
        Ok(Self::new(ClientConfig::try_from(options)?))
    }

    /// The validated configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// The breaker, when enabled.
    pub fn circuit_breaker(&self) -> Option<&CircuitBreaker> {
        self.circuit_breaker.as_ref()
    }

    /// The rate limiter shared by both calling styles.
    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    /// Recent attempts, oldest first.
    pub fn attempts(&self) -> Vec<AttemptRecord> {
        self.history.snapshot()
    }

    /// The most recent attempt.
    pub fn last_attempt(&self) -> Option<AttemptRecord> {
        self.history.last()
    }

    /// # Blocking GET
    ///
    /// ## Arguments
    /// * `endpoint` - path relative to the base URL; a leading `/` is ignored.
    /// * `params` - query parameters, sent in insertion order.
    ///
    /// # Errors
    /// Any [`ClientError`]; see the module docs for the sequence.
    ///
    /// # Panics
    /// When called from within an async runtime worker.
    pub fn get(&self, endpoint: &str, params: &QueryParams) -> Result<Value, ClientError> {
        let request = self.prepare(endpoint, params)?;
        match &self.circuit_breaker {
            Some(breaker) => breaker.call(|| self.run_blocking(&request)),
            None => self.run_blocking(&request),
        }
    }

    /// # Async GET
    ///
    /// Same contract, attempts and delays as [`RequestExecutor::get`].
    pub async fn get_async(
        &self,
        endpoint: &str,
        params: &QueryParams,
    ) -> Result<Value, ClientError> {
        let request = self.prepare(endpoint, params)?;
        match &self.circuit_breaker {
            Some(breaker) => breaker.call_async(self.run_async(&request)).await,
            None => self.run_async(&request).await,
        }
    }

    /// Blocking GET deserialized into `T`.
    ///
    /// A body that is valid JSON but does not fit `T` is a
    /// `ClientError::Parse`. The breaker has already recorded the call as a
    /// success at that point.
    pub fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        params: &QueryParams,
    ) -> Result<T, ClientError> {
        let value = self.get(endpoint, params)?;
        decode(endpoint, &value)
    }

    /// Async GET deserialized into `T`.
    pub async fn get_json_async<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        params: &QueryParams,
    ) -> Result<T, ClientError> {
        let value = self.get_async(endpoint, params).await?;
        decode(endpoint, &value)
    }

    /// Releases both transport handles. Safe to call repeatedly; each handle
    /// is released once. A later call opens fresh handles.
    pub fn close(&self) {
        if let Some(transport) = self.blocking.lock().take() {
            transport.close();
            release_blocking(transport);
        }
        if let Some(transport) = self.non_blocking.lock().take() {
            transport.close();
        }
    }

    /// Cooperative form of [`RequestExecutor::close`]. The blocking handle is
    /// dropped on the blocking pool.
    pub async fn close_async(&self) {
        let blocking = self.blocking.lock().take();
        if let Some(transport) = blocking {
            transport.close();
            if let Err(e) = tokio::task::spawn_blocking(move || drop(transport)).await {
                warn!(error = %e, "blocking transport release did not complete");
            }
        }

        let non_blocking = self.non_blocking.lock().take();
        if let Some(transport) = non_blocking {
            transport.close();
        }
    }

    fn prepare(
        &self,
        endpoint: &str,
        params: &QueryParams,
    ) -> Result<PreparedRequest, ClientError> {
        // 1. Construct the full absolute URL
        let base = self.config.base_url();
        let url = base.join(endpoint.trim_start_matches('/')).map_err(|e| {
            ClientError::configuration("endpoint", format!("cannot join `{endpoint}`: {e}"))
        })?;

        if url.origin() != base.origin() {
            return Err(ClientError::configuration(
                "endpoint",
                format!("`{endpoint}` leaves the configured base URL"),
            ));
        }

        // 2. Everything else is fixed per instance
        Ok(PreparedRequest {
            endpoint: endpoint.to_string(),
            url,
            query: params.to_query_pairs(),
            headers: self.config.headers().clone(),
            timeout: self.config.timeout(),
        })
    }

    fn run_blocking(&self, request: &PreparedRequest) -> Result<Value, ClientError> {
        let transport = self.blocking_transport()?;
        let mut attempt = 1;
        loop {
            self.rate_limiter.acquire();
            let started = Instant::now();
            let response = transport.send(request);
            match self.settle(request, CallStyle::Blocking, attempt, response, started.elapsed()) {
                Step::Done(result) => return result,
                Step::Retry(delay) => std::thread::sleep(delay),
            }
            attempt += 1;
        }
    }

    async fn run_async(&self, request: &PreparedRequest) -> Result<Value, ClientError> {
        let transport = self.async_transport()?;
        let mut attempt = 1;
        loop {
            self.rate_limiter.acquire_async().await;
            let started = Instant::now();
            let response = transport.send(request).await;
            match self.settle(request, CallStyle::Async, attempt, response, started.elapsed()) {
                Step::Done(result) => return result,
                Step::Retry(delay) => tokio::time::sleep(delay).await,
            }
            attempt += 1;
        }
    }

    /// Classifies, records and logs one attempt, then asks the policy what
    /// comes next. Shared by both styles.
    fn settle(
        &self,
        request: &PreparedRequest,
        style: CallStyle,
        attempt: u32,
        response: Result<RawResponse, TransportError>,
        elapsed: Duration,
    ) -> Step {
        let outcome: AttemptOutcome = classify(request, response);
        let record = AttemptRecord::new(request, style, attempt, &outcome, elapsed);
        debug!(
            endpoint = %request.endpoint,
            url = %record.url,
            style = ?style,
            attempt,
            status = ?outcome.status,
            outcome = ?record.outcome,
            elapsed_ms = elapsed.as_millis() as u64,
            "attempt finished"
        );
        self.history.record(record);

        let error = match outcome.result {
            Ok(value) => return Step::Done(Ok(value)),
            Err(error) => error,
        };

        match self.policy.next_delay(attempt, &error) {
            Some(delay) => {
                warn!(
                    endpoint = %request.endpoint,
                    attempt,
                    max_attempts = self.policy.max_attempts(),
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "retrying request"
                );
                Step::Retry(delay)
            }
            None => {
                error!(
                    endpoint = %request.endpoint,
                    attempts = attempt,
                    kind = %error.kind(),
                    error = %error,
                    "request failed"
                );
                Step::Done(Err(error))
            }
        }
    }

    fn blocking_transport(&self) -> Result<Arc<dyn BlockingTransport>, ClientError> {
        let mut slot = self.blocking.lock();
        if let Some(transport) = slot.as_ref() {
            return Ok(Arc::clone(transport));
        }
        let transport = self.factory.blocking(&self.config).map_err(transport_setup_error)?;
        debug!(style = "blocking", "opened transport handle");
        *slot = Some(Arc::clone(&transport));
        Ok(transport)
    }

    fn async_transport(&self) -> Result<Arc<dyn AsyncTransport>, ClientError> {
        let mut slot = self.non_blocking.lock();
        if let Some(transport) = slot.as_ref() {
            return Ok(Arc::clone(transport));
        }
        let transport = self
            .factory
            .non_blocking(&self.config)
            .map_err(transport_setup_error)?;
        debug!(style = "async", "opened transport handle");
        *slot = Some(Arc::clone(&transport));
        Ok(transport)
    }
}

impl Drop for RequestExecutor {
    fn drop(&mut self) {
        self.close();
    }
}

fn transport_setup_error(err: TransportError) -> ClientError {
    ClientError::configuration("transport", err.to_string())
}

// `reqwest::blocking::Client` must not be dropped on a runtime worker.
fn release_blocking(transport: Arc<dyn BlockingTransport>) {
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn_blocking(move || drop(transport));
        }
        Err(_) => drop(transport),
    }
}

fn decode<T: DeserializeOwned>(endpoint: &str, value: &Value) -> Result<T, ClientError> {
    T::deserialize(value).map_err(|e| ClientError::Parse {
        endpoint: endpoint.to_string(),
        excerpt: excerpt(&value.to_string()),
        reason: e.to_string(),
    })
}
