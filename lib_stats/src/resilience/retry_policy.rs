//! # Retry Policy
//!
//! The single retry decision used by both calling styles: which failures are
//! retried, how many attempts a call may take, and how long to wait between
//! them. Keeping it in one place guarantees that `get` and `get_async` make
//! the same number of attempts with the same delays.

use crate::configs::client_config::ClientConfig;
use crate::errors::ClientError;
use backon::{BackoffBuilder, ExponentialBuilder};
use std::time::Duration;

/// # Retry Policy
///
/// Delay after the `n`-th failed attempt (1-based) is
/// `min(base * 2^(n-1), ceiling)`, without jitter. The schedule itself comes
/// from `backon`; its `max_times` is the retry budget.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    max_retries: u32,
    ceiling: Duration,
    schedule: ExponentialBuilder,
    retry_on_rate_limit: bool,
}

impl RetryPolicy {
    /// Creates a policy; `ceiling` below `base` is raised to `base`.
    pub fn new(max_retries: u32, base: Duration, ceiling: Duration) -> Self {
        let ceiling = ceiling.max(base);
        let schedule = ExponentialBuilder::default()
            .with_min_delay(base)
            .with_max_delay(ceiling)
            .with_factor(2.0)
            .with_max_times(max_retries as usize);

        Self {
            max_retries,
            ceiling,
            schedule,
            retry_on_rate_limit: false,
        }
    }

    /// Also retry 429 responses, waiting at least the server's hint.
    pub fn with_rate_limit_retries(mut self, enabled: bool) -> Self {
        self.retry_on_rate_limit = enabled;
        self
    }

    /// Builds the policy a client's configuration describes.
    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(config.max_retries(), config.backoff_base(), config.backoff_max())
            .with_rate_limit_retries(config.retry_on_rate_limit())
    }

    /// Total attempts a call may take, the first one included.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Whether `error` is worth another attempt.
    pub fn should_retry(&self, error: &ClientError) -> bool {
        error.is_retryable()
            || (self.retry_on_rate_limit && matches!(error, ClientError::RateLimited { .. }))
    }

    /// Delay after the `attempt`-th failed attempt, ignoring the retry budget.
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.schedule
            .with_max_times(attempt as usize)
            .build()
            .last()
            .unwrap_or(Duration::ZERO)
    }

    /// Decides what follows a failed attempt: `Some(delay)` to try again,
    /// `None` to give up and surface `error` unchanged.
    pub fn next_delay(&self, attempt: u32, error: &ClientError) -> Option<Duration> {
        if !self.should_retry(error) {
            return None;
        }
        let index = attempt.checked_sub(1)? as usize;
        let delay = self.schedule.build().nth(index)?;
        Some(match error.retry_after() {
            Some(hint) => hint.max(delay).min(self.ceiling),
            None => delay,
        })
    }
}
