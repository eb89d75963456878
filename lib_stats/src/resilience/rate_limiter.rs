//! # Rate Limiter
//!
//! Enforces a minimum spacing between two dispatches from the same client.
//!
//! The check of the last dispatch time, the suspension and the update of the
//! timestamp form one critical section behind a single `tokio::sync::Mutex`.
//! Both calling styles go through that same lock (`blocking_lock` for the
//! blocking form, `lock().await` for the cooperative one), so concurrent
//! callers of either style are serialized and never under-wait.

use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::trace;

/// # Rate Limiter
///
/// A pure delay primitive: `acquire` has no inputs, no return value and
/// cannot fail.
#[derive(Debug)]
pub struct RateLimiter {
    /// Minimum spacing between dispatches. Zero disables waiting.
    min_interval: Duration,
    /// When the previous dispatch was let through. Never moves backwards.
    last_dispatch: Mutex<Option<Instant>>,
}

impl RateLimiter {
    /// Creates a limiter with the given minimum spacing.
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_dispatch: Mutex::new(None),
        }
    }

    /// The configured spacing.
    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Blocks the calling thread until a dispatch is allowed.
    ///
    /// # Panics
    /// Panics when called from within an asynchronous execution context; use
    /// [`RateLimiter::acquire_async`] there.
    pub fn acquire(&self) {
        let mut last = self.last_dispatch.blocking_lock();
        if let Some(wait) = self.pending_wait(*last) {
            trace!(wait_ms = wait.as_millis() as u64, "rate limiter delaying blocking dispatch");
            std::thread::sleep(wait);
        }
        *last = Some(Instant::now());
    }

    /// Suspends the calling task until a dispatch is allowed.
    pub async fn acquire_async(&self) {
        let mut last = self.last_dispatch.lock().await;
        if let Some(wait) = self.pending_wait(*last) {
            trace!(wait_ms = wait.as_millis() as u64, "rate limiter delaying async dispatch");
            tokio::time::sleep(wait).await;
        }
        *last = Some(Instant::now());
    }

    fn pending_wait(&self, last: Option<Instant>) -> Option<Duration> {
        if self.min_interval.is_zero() {
            return None;
        }
        let elapsed = last?.elapsed();
        self.min_interval
            .checked_sub(elapsed)
            .filter(|wait| !wait.is_zero())
    }
}
