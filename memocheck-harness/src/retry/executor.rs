//! Retry executor.
//!
//! Retry exists to absorb eventual-consistency windows, not to hide bugs: only
//! [`OperationError::Transient`] is retried. Assertion failures and unexpected
//! errors surface on their first occurrence.

use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use memocheck_core::{TimeProvider, TokioTimeProvider};

use crate::error::OperationError;

use super::policy::RetryPolicy;

/// Counters of what the executor did, shared between clones.
#[derive(Debug, Default)]
pub struct RetryStats {
    attempts: AtomicU32,
    retries: AtomicU32,
}

impl RetryStats {
    /// Total operation invocations.
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::Relaxed)
    }

    /// Invocations that were retries of a transient failure.
    pub fn retries(&self) -> u32 {
        self.retries.load(Ordering::Relaxed)
    }
}

/// Runs operations under a [`RetryPolicy`].
#[derive(Debug, Clone)]
pub struct RetryExecutor<T: TimeProvider = TokioTimeProvider> {
    time: T,
    stats: Arc<RetryStats>,
}

impl Default for RetryExecutor<TokioTimeProvider> {
    fn default() -> Self {
        Self::new(TokioTimeProvider::new())
    }
}

impl<T: TimeProvider> RetryExecutor<T> {
    /// Create an executor sleeping through `time`.
    pub fn new(time: T) -> Self {
        Self {
            time,
            stats: Arc::new(RetryStats::default()),
        }
    }

    /// Counters accumulated by this executor and its clones.
    pub fn stats(&self) -> &RetryStats {
        &self.stats
    }

    /// Run `operation` under `policy`.
    ///
    /// The closure receives the 1-based attempt number. With retry disabled it
    /// runs exactly once. With retry enabled, transient failures are retried
    /// until `max_attempts` total attempts have run, then the last failure is
    /// returned unchanged.
    pub async fn execute<F, Fut, R>(
        &self,
        policy: &RetryPolicy,
        mut operation: F,
    ) -> Result<R, OperationError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<R, OperationError>>,
    {
        let budget = policy.attempt_budget();
        let mut attempt = 1;
        loop {
            self.stats.attempts.fetch_add(1, Ordering::Relaxed);
            tracing::debug!("Attempt {}/{}", attempt, budget);

            let err = match operation(attempt).await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if !policy.enabled() || !err.is_transient() {
                return Err(err);
            }
            if attempt >= budget {
                tracing::error!("Retry budget of {} attempt(s) exhausted: {}", budget, err);
                return Err(err);
            }

            let delay = policy.backoff().delay(attempt);
            tracing::warn!(
                "Attempt {}/{} failed transiently ({}), retrying in {:?}",
                attempt,
                budget,
                err,
                delay
            );
            if !delay.is_zero() {
                self.time.sleep(delay).await;
            }
            self.stats.retries.fetch_add(1, Ordering::Relaxed);
            attempt += 1;
        }
    }
}
