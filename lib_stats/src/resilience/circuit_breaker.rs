//! # Circuit Breaker
//!
//! Counts consecutive failures of wrapped calls and fails fast once the
//! threshold is reached, until a cooldown has elapsed.
//!
//! ## States:
//! - **Closed**: calls pass through; each failure increments the counter, any
//!   success resets it.
//! - **Open**: calls are rejected with `CircuitBreakerError` without invoking
//!   the wrapped operation.
//! - **Half-open**: the cooldown has elapsed. The reset is lazy (evaluated when
//!   a caller arrives, no background timer): the counter is cleared and a
//!   single trial call is admitted. Its success closes the breaker, its
//!   failure reopens it. Callers arriving while the trial is in flight are
//!   rejected.
//!
//! All bookkeeping sits behind one mutex so the open check, the counter
//! update and the timestamp write are atomic with respect to other callers of
//! either calling style. The lock is never held while the wrapped operation
//! runs.

use crate::errors::ClientError;
use parking_lot::Mutex;
use serde::Serialize;
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Observable state of a breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CircuitState {
    /// Normal operation.
    Closed,
    /// Failing fast.
    Open,
    /// Cooldown elapsed; a trial call is available or in flight.
    HalfOpen,
}

#[derive(Debug, Clone, Copy)]
enum Phase {
    Closed,
    Open { opened_at: Instant },
    // Trial in flight; `expired` is the opening time to restore if the trial
    // is abandoned without an outcome.
    Probing { expired: Instant },
}

#[derive(Debug)]
struct Inner {
    phase: Phase,
    failures: u32,
}

/// # Circuit Breaker
///
/// Owned by one client instance and shared by its blocking and async paths.
#[derive(Debug)]
pub struct CircuitBreaker {
    failure_threshold: u32,
    reset_timeout: Duration,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    /// Creates a closed breaker. A threshold of zero is treated as one.
    pub fn new(failure_threshold: u32, reset_timeout: Duration) -> Self {
        Self {
            failure_threshold: failure_threshold.max(1),
            reset_timeout,
            inner: Mutex::new(Inner {
                phase: Phase::Closed,
                failures: 0,
            }),
        }
    }

    /// Consecutive failures that open the breaker.
    pub fn failure_threshold(&self) -> u32 {
        self.failure_threshold
    }

    /// Cooldown before a trial call is admitted.
    pub fn reset_timeout(&self) -> Duration {
        self.reset_timeout
    }

    /// Current consecutive failure count.
    pub fn failure_count(&self) -> u32 {
        self.inner.lock().failures
    }

    /// True while calls would be rejected without being attempted.
    pub fn is_open(&self) -> bool {
        let inner = self.inner.lock();
        match inner.phase {
            Phase::Closed => false,
            Phase::Open { opened_at } => opened_at.elapsed() < self.reset_timeout,
            Phase::Probing { .. } => true,
        }
    }

    /// Snapshot of the breaker state.
    pub fn state(&self) -> CircuitState {
        let inner = self.inner.lock();
        match inner.phase {
            Phase::Closed => CircuitState::Closed,
            Phase::Open { opened_at } if opened_at.elapsed() < self.reset_timeout => {
                CircuitState::Open
            }
            Phase::Open { .. } | Phase::Probing { .. } => CircuitState::HalfOpen,
        }
    }

    /// Closes the breaker and clears the counter.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.phase = Phase::Closed;
        inner.failures = 0;
        info!(action = "circuit_reset", "circuit breaker manually reset");
    }

    /// Runs `op` under the breaker (blocking form).
    ///
    /// # Errors
    /// `ClientError::CircuitOpen` without running `op` while the breaker is
    /// open; otherwise whatever `op` returned, unchanged.
    pub fn call<T, F>(&self, op: F) -> Result<T, ClientError>
    where
        F: FnOnce() -> Result<T, ClientError>,
    {
        let permit = self.try_acquire()?;
        let result = op();
        permit.settle(result.is_ok());
        result
    }

    /// Runs `op` under the breaker (cooperative form). Same contract as
    /// [`CircuitBreaker::call`].
    pub async fn call_async<T, F>(&self, op: F) -> Result<T, ClientError>
    where
        F: Future<Output = Result<T, ClientError>>,
    {
        let permit = self.try_acquire()?;
        let result = op.await;
        permit.settle(result.is_ok());
        result
    }

    fn try_acquire(&self) -> Result<Permit<'_>, ClientError> {
        let mut inner = self.inner.lock();
        match inner.phase {
            Phase::Closed => Ok(Permit::new(self, false)),
            Phase::Open { opened_at } if opened_at.elapsed() >= self.reset_timeout => {
                inner.failures = 0;
                inner.phase = Phase::Probing { expired: opened_at };
                info!(
                    state_transition = "open -> half-open",
                    action = "trial_admitted",
                    "circuit breaker cooldown elapsed, admitting one trial call"
                );
                Ok(Permit::new(self, true))
            }
            Phase::Open { .. } | Phase::Probing { .. } => {
                debug!(
                    action = "call_rejected",
                    failure_count = inner.failures,
                    "circuit breaker is open"
                );
                Err(ClientError::CircuitOpen {
                    failure_count: inner.failures,
                    reset_timeout: self.reset_timeout,
                })
            }
        }
    }

    fn on_success(&self, trial: bool) {
        let mut inner = self.inner.lock();
        inner.failures = 0;
        inner.phase = Phase::Closed;
        if trial {
            info!(
                state_transition = "half-open -> closed",
                action = "circuit_closed",
                "circuit breaker closed after successful trial call"
            );
        }
    }

    fn on_failure(&self, trial: bool) {
        let mut inner = self.inner.lock();
        inner.failures = inner.failures.saturating_add(1);

        // The cooldown runs from the transition into Open; late failures of
        // calls admitted earlier only add to the count.
        let opens = match inner.phase {
            Phase::Closed => inner.failures >= self.failure_threshold,
            Phase::Probing { .. } => trial,
            Phase::Open { .. } => false,
        };

        if opens {
            inner.phase = Phase::Open {
                opened_at: Instant::now(),
            };
            let transition = if trial { "half-open -> open" } else { "closed -> open" };
            warn!(
                state_transition = transition,
                action = "circuit_opened",
                failure_count = inner.failures,
                threshold = self.failure_threshold,
                reset_timeout_ms = self.reset_timeout.as_millis() as u64,
                "circuit breaker opened"
            );
        } else {
            debug!(
                action = "failure_recorded",
                failure_count = inner.failures,
                threshold = self.failure_threshold,
                "circuit breaker failure recorded"
            );
        }
    }

    fn abandon_trial(&self) {
        let mut inner = self.inner.lock();
        if let Phase::Probing { expired } = inner.phase {
            inner.phase = Phase::Open { opened_at: expired };
            debug!(action = "trial_abandoned", "circuit breaker trial dropped without outcome");
        }
    }
}

/// Admission ticket for one wrapped call. Dropping an unsettled trial permit
/// (cancelled future, panic) hands the trial to the next caller.
#[derive(Debug)]
struct Permit<'a> {
    breaker: &'a CircuitBreaker,
    trial: bool,
    settled: bool,
}

impl<'a> Permit<'a> {
    fn new(breaker: &'a CircuitBreaker, trial: bool) -> Self {
        Self {
            breaker,
            trial,
            settled: false,
        }
    }

    fn settle(mut self, success: bool) {
        self.settled = true;
        if success {
            self.breaker.on_success(self.trial);
        } else {
            self.breaker.on_failure(self.trial);
        }
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        if !self.settled && self.trial {
            self.breaker.abandon_trial();
        }
    }
}
