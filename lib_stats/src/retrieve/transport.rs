//! # HTTP Transport
//!
//! The seam between the request executor and the HTTP library. The executor
//! only ever sees a [`PreparedRequest`] going out and a [`RawResponse`] or a
//! [`TransportError`] coming back, so no `reqwest` type leaks past this module
//! and tests can script transports without a network.
//!
//! Two transports exist, one per calling style, and each client creates them
//! lazily through a [`TransportFactory`]:
//! - [`ReqwestBlockingTransport`] over `reqwest::blocking::Client`;
//! - [`ReqwestAsyncTransport`] over `reqwest::Client`.

use crate::configs::client_config::ClientConfig;
use async_trait::async_trait;
use reqwest::header::HeaderMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use url::Url;

/// Redirect hops followed before an attempt fails.
const MAX_REDIRECTS: usize = 5;

/// # Prepared Request
///
/// A fully resolved GET: absolute URL, query pairs, merged headers and the
/// per-attempt timeout.
#[derive(Debug, Clone)]
pub struct PreparedRequest {
    /// The endpoint path as the caller gave it.
    pub endpoint: String,
    /// Base URL joined with the endpoint path.
    pub url: Url,
    /// Query parameters, already rendered to text.
    pub query: Vec<(String, String)>,
    /// Headers to send.
    pub headers: HeaderMap,
    /// Ceiling for this single attempt.
    pub timeout: Duration,
}

impl PreparedRequest {
    /// The URL with the query string appended, for diagnostics.
    pub fn full_url(&self) -> String {
        let mut url = self.url.clone();
        if !self.query.is_empty() {
            url.query_pairs_mut()
                .extend_pairs(self.query.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        }
        url.to_string()
    }
}

/// # Raw Response
///
/// Status, headers and body text of a completed exchange, before any
/// classification.
#[derive(Debug, Clone)]
pub struct RawResponse {
    /// The numeric HTTP status code.
    pub status: u16,
    /// The headers returned by the server.
    pub headers: HeaderMap,
    /// The body as text.
    pub body: String,
}

impl RawResponse {
    /// A response with no headers.
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }
}

/// Transport-level failures, before classification.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The attempt exceeded its timeout.
    #[error("request timed out")]
    Timeout,

    /// The connection could not be established (refused, DNS, TLS).
    #[error("connection failed: {0}")]
    Connect(String),

    /// Any other failure while sending or reading the response.
    #[error("transport failure: {0}")]
    Other(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout
        } else if err.is_connect() || err.is_request() {
            TransportError::Connect(err.to_string())
        } else {
            TransportError::Other(err.to_string())
        }
    }
}

/// A transport used from the blocking calling style.
pub trait BlockingTransport: Send + Sync {
    /// Performs one GET attempt.
    fn send(&self, request: &PreparedRequest) -> Result<RawResponse, TransportError>;

    /// Releases pooled connections. Called at most once per handle.
    fn close(&self) {}
}

/// A transport used from the cooperative calling style.
#[async_trait]
pub trait AsyncTransport: Send + Sync {
    /// Performs one GET attempt.
    async fn send(&self, request: &PreparedRequest) -> Result<RawResponse, TransportError>;

    /// Releases pooled connections. Called at most once per handle.
    fn close(&self) {}
}

/// Creates the per-style transport handles of a client.
pub trait TransportFactory: Send + Sync {
    /// Handle for the blocking style.
    fn blocking(
        &self,
        config: &ClientConfig,
    ) -> Result<Arc<dyn BlockingTransport>, TransportError>;

    /// Handle for the cooperative style.
    fn non_blocking(
        &self,
        config: &ClientConfig,
    ) -> Result<Arc<dyn AsyncTransport>, TransportError>;
}

/// Builds `reqwest` clients configured from a [`ClientConfig`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ReqwestTransportFactory;

impl TransportFactory for ReqwestTransportFactory {
    fn blocking(
        &self,
        config: &ClientConfig,
    ) -> Result<Arc<dyn BlockingTransport>, TransportError> {
        Ok(Arc::new(ReqwestBlockingTransport::new(config)?))
    }

    fn non_blocking(
        &self,
        config: &ClientConfig,
    ) -> Result<Arc<dyn AsyncTransport>, TransportError> {
        Ok(Arc::new(ReqwestAsyncTransport::new(config)?))
    }
}

/// # Blocking reqwest transport
///
/// Must be created, used and dropped outside of an async runtime worker;
/// `reqwest::blocking` panics otherwise.
#[derive(Debug)]
pub struct ReqwestBlockingTransport {
    inner: reqwest::blocking::Client,
}

impl ReqwestBlockingTransport {
    /// Builds the underlying client with the configured timeout.
    pub fn new(config: &ClientConfig) -> Result<Self, TransportError> {
        let inner = reqwest::blocking::Client::builder()
            .timeout(config.timeout())
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .build()?;
        Ok(Self { inner })
    }
}

impl BlockingTransport for ReqwestBlockingTransport {
    fn send(&self, request: &PreparedRequest) -> Result<RawResponse, TransportError> {
        // 1. Build and execute the GET
        let response = self
            .inner
            .get(request.url.clone())
            .query(&request.query)
            .headers(request.headers.clone())
            .timeout(request.timeout)
            .send()?;

        // 2. Capture metadata before the body consumes the response
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response.text()?;

        Ok(RawResponse {
            status,
            headers,
            body,
        })
    }

    fn close(&self) {
        debug!(style = "blocking", "releasing HTTP connection pool");
    }
}

/// # Async reqwest transport
#[derive(Debug)]
pub struct ReqwestAsyncTransport {
    inner: reqwest::Client,
}

impl ReqwestAsyncTransport {
    /// Builds the underlying client with the configured timeout.
    pub fn new(config: &ClientConfig) -> Result<Self, TransportError> {
        let inner = reqwest::Client::builder()
            .timeout(config.timeout())
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .build()?;
        Ok(Self { inner })
    }
}

#[async_trait]
impl AsyncTransport for ReqwestAsyncTransport {
    async fn send(&self, request: &PreparedRequest) -> Result<RawResponse, TransportError> {
        let response: reqwest::Response = self
            .inner
            .get(request.url.clone())
            .query(&request.query)
            .headers(request.headers.clone())
            .timeout(request.timeout)
            .send()
            .await?;

        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response.text().await?;

        Ok(RawResponse {
            status,
            headers,
            body,
        })
    }

    fn close(&self) {
        debug!(style = "async", "releasing HTTP connection pool");
    }
}
