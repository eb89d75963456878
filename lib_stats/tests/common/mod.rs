//! Scripted in-memory transports shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use lib_stats::retrieve::transport::{
    AsyncTransport, BlockingTransport, PreparedRequest, RawResponse, TransportError,
    TransportFactory,
};
use lib_stats::{ClientConfig, ClientConfigBuilder, RequestExecutor};
use parking_lot::Mutex;
use reqwest::header::{HeaderValue, RETRY_AFTER};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Instant;

pub const BASE_URL: &str = "https://stats.example.com/stats/";

type Script = dyn Fn(u32) -> Result<RawResponse, TransportError> + Send + Sync;

/// Answers every send from a script keyed by the 1-based send number, and
/// counts what the executor does with its handles.
pub struct Backend {
    script: Box<Script>,
    sends: AtomicU32,
    opened: AtomicU32,
    closes: AtomicU32,
    requests: Mutex<Vec<(Instant, PreparedRequest)>>,
}

impl Backend {
    pub fn new<F>(script: F) -> Arc<Self>
    where
        F: Fn(u32) -> Result<RawResponse, TransportError> + Send + Sync + 'static,
    {
        Arc::new(Self {
            script: Box::new(script),
            sends: AtomicU32::new(0),
            opened: AtomicU32::new(0),
            closes: AtomicU32::new(0),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn always(status: u16, body: &'static str) -> Arc<Self> {
        Self::new(move |_| Ok(RawResponse::new(status, body)))
    }

    pub fn sends(&self) -> u32 {
        self.sends.load(Ordering::SeqCst)
    }

    pub fn opened(&self) -> u32 {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> u32 {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<PreparedRequest> {
        self.requests.lock().iter().map(|(_, r)| r.clone()).collect()
    }

    pub fn sent_at(&self) -> Vec<Instant> {
        self.requests.lock().iter().map(|(at, _)| *at).collect()
    }

    fn answer(&self, request: &PreparedRequest) -> Result<RawResponse, TransportError> {
        let n = self.sends.fetch_add(1, Ordering::SeqCst) + 1;
        self.requests.lock().push((Instant::now(), request.clone()));
        (self.script)(n)
    }
}

struct ScriptedTransport(Arc<Backend>);

impl BlockingTransport for ScriptedTransport {
    fn send(&self, request: &PreparedRequest) -> Result<RawResponse, TransportError> {
        self.0.answer(request)
    }

    fn close(&self) {
        self.0.closes.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl AsyncTransport for ScriptedTransport {
    async fn send(&self, request: &PreparedRequest) -> Result<RawResponse, TransportError> {
        tokio::task::yield_now().await;
        self.0.answer(request)
    }

    fn close(&self) {
        self.0.closes.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct ScriptedFactory(pub Arc<Backend>);

impl TransportFactory for ScriptedFactory {
    fn blocking(&self, _: &ClientConfig) -> Result<Arc<dyn BlockingTransport>, TransportError> {
        self.0.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(ScriptedTransport(Arc::clone(&self.0))))
    }

    fn non_blocking(&self, _: &ClientConfig) -> Result<Arc<dyn AsyncTransport>, TransportError> {
        self.0.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(ScriptedTransport(Arc::clone(&self.0))))
    }
}

/// A builder with millisecond backoff so retry tests stay fast.
pub fn fast_config(max_retries: i64) -> ClientConfigBuilder {
    ClientConfig::builder(BASE_URL)
        .max_retries(max_retries)
        .backoff_secs(0.001, 0.004)
}

pub fn executor(builder: ClientConfigBuilder, backend: &Arc<Backend>) -> RequestExecutor {
    let config = builder.build().expect("valid test configuration");
    RequestExecutor::with_transport(config, Arc::new(ScriptedFactory(Arc::clone(backend))))
}

pub fn ok_json(body: &'static str) -> Result<RawResponse, TransportError> {
    Ok(RawResponse::new(200, body))
}

pub fn throttled(retry_after_secs: &'static str) -> Result<RawResponse, TransportError> {
    let mut response = RawResponse::new(429, "slow down");
    response
        .headers
        .insert(RETRY_AFTER, HeaderValue::from_static(retry_after_secs));
    Ok(response)
}
