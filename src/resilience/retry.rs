//! Retry with exponential backoff.
//!
//! Each attempt's failure is classified; only retryable categories are tried
//! again, and only while the policy has retries left. The whole run races a
//! cancellation token so a caller can abandon it during an attempt or a
//! backoff sleep.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio_retry::RetryIf;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::classify::{AppError, RemoteFailure, classify_with_context};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1_000,
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub const fn new(max_retries: u32, base_delay_ms: u64, multiplier: f64) -> Self {
        Self {
            max_retries,
            base_delay_ms,
            multiplier,
        }
    }

    /// Delay before the `retry`-th retry (1-indexed):
    /// `base_delay_ms * multiplier^(retry - 1)`.
    #[must_use]
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exponent = i32::try_from(retry.saturating_sub(1)).unwrap_or(i32::MAX);
        #[allow(clippy::cast_precision_loss)]
        let millis = self.base_delay_ms as f64 * self.multiplier.powi(exponent);
        Duration::try_from_secs_f64(millis / 1_000.0).unwrap_or(Duration::MAX)
    }

    /// The full sequence of backoff delays this policy allows.
    #[must_use]
    pub const fn schedule(&self) -> Backoff {
        Backoff {
            policy: *self,
            next_retry: 1,
        }
    }
}

/// Deterministic backoff strategy yielding one delay per permitted retry.
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: RetryPolicy,
    next_retry: u32,
}

impl Iterator for Backoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        if self.next_retry > self.policy.max_retries {
            return None;
        }
        let delay = self.policy.delay_for(self.next_retry);
        self.next_retry += 1;
        Some(delay)
    }
}

/// Terminal state of a retried operation.
#[derive(Debug)]
pub enum RetryOutcome<T> {
    Succeeded(T),
    Failed(AppError),
    Cancelled,
}

impl<T> RetryOutcome<T> {
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, RetryOutcome::Cancelled)
    }
}

/// Runs `operation` until it succeeds, fails permanently, or `cancel` fires.
pub async fn run<F, Fut, T, E>(
    operation: F,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
) -> RetryOutcome<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Into<RemoteFailure>,
{
    run_with_context(operation, policy, cancel, &BTreeMap::new()).await
}

/// Like [`run`], attaching `context` (plus the attempt number) to every
/// classified failure.
pub async fn run_with_context<F, Fut, T, E>(
    mut operation: F,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    context: &BTreeMap<String, String>,
) -> RetryOutcome<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Into<RemoteFailure>,
{
    if cancel.is_cancelled() {
        return RetryOutcome::Cancelled;
    }

    let attempts = AtomicU32::new(0);
    let max_retries = policy.max_retries;

    let action = || {
        let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(attempt, "Starting attempt");
        let mut context = context.clone();
        context.insert("attempt".to_string(), attempt.to_string());
        let fut = operation();
        async move {
            fut.await
                .map_err(|failure| classify_with_context(failure.into(), context))
        }
    };

    let condition = |error: &AppError| {
        let attempt = attempts.load(Ordering::SeqCst);
        if !error.is_retryable() {
            debug!(attempt, category = %error.category(), "Failure is not retryable");
            return false;
        }
        if attempt > max_retries {
            return false;
        }
        warn!(
            attempt,
            max_retries,
            category = %error.category(),
            "Retryable failure: {}",
            error.message()
        );
        true
    };

    let strategy = policy.schedule().inspect(|delay| {
        debug!(
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "Backing off before retry"
        );
    });

    tokio::select! {
        biased;
        () = cancel.cancelled() => {
            info!(attempts = attempts.load(Ordering::SeqCst), "Retry run cancelled");
            RetryOutcome::Cancelled
        }
        result = RetryIf::spawn(strategy, action, condition) => match result {
            Ok(value) => {
                let attempts = attempts.load(Ordering::SeqCst);
                if attempts > 1 {
                    info!(attempts, "Operation succeeded after retries");
                }
                RetryOutcome::Succeeded(value)
            }
            Err(error) => {
                warn!(
                    attempts = attempts.load(Ordering::SeqCst),
                    category = %error.category(),
                    "Operation failed: {}",
                    error.message()
                );
                RetryOutcome::Failed(error)
            }
        }
    }
}
