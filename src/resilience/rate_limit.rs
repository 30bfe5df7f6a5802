//! Sliding-window admission control for outbound model calls.
//!
//! Each provider key owns a ledger of admission instants. A call is admitted
//! when fewer than `max_requests` admissions fall inside the trailing window
//! and the optional minimum spacing since the last admission has elapsed.
//! Otherwise the caller sleeps for exactly the time the binding constraint
//! needs and re-checks.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Admission limits for a single provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub max_requests: u32,
    pub window_ms: u64,
    #[serde(default)]
    pub min_spacing_ms: Option<u64>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 10,
            window_ms: 60_000,
            min_spacing_ms: None,
        }
    }
}

impl RateLimitConfig {
    #[must_use]
    pub const fn new(max_requests: u32, window_ms: u64) -> Self {
        Self {
            max_requests,
            window_ms,
            min_spacing_ms: None,
        }
    }

    #[must_use]
    pub const fn with_min_spacing(mut self, min_spacing_ms: u64) -> Self {
        self.min_spacing_ms = Some(min_spacing_ms);
        self
    }

    /// # Errors
    ///
    /// Returns [`RateLimitError::InvalidConfig`] when `max_requests` is zero or
    /// the window is empty.
    pub fn validate(&self, provider: &str) -> Result<(), RateLimitError> {
        if self.max_requests < 1 {
            return Err(RateLimitError::InvalidConfig {
                provider: provider.to_string(),
                reason: "max_requests must be at least 1".to_string(),
            });
        }
        if self.window_ms == 0 {
            return Err(RateLimitError::InvalidConfig {
                provider: provider.to_string(),
                reason: "window_ms must be greater than 0".to_string(),
            });
        }
        Ok(())
    }

    fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    fn min_spacing(&self) -> Option<Duration> {
        self.min_spacing_ms.map(Duration::from_millis)
    }

    fn merge(&mut self, overrides: &RateLimitOverrides) {
        if let Some(max_requests) = overrides.max_requests {
            self.max_requests = max_requests;
        }
        if let Some(window_ms) = overrides.window_ms {
            self.window_ms = window_ms;
        }
        if let Some(min_spacing_ms) = overrides.min_spacing_ms {
            self.min_spacing_ms = Some(min_spacing_ms);
        }
    }
}

/// Partial update applied by [`RateLimiter::configure`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitOverrides {
    pub max_requests: Option<u32>,
    pub window_ms: Option<u64>,
    pub min_spacing_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RateLimitError {
    #[error("Invalid rate limit for provider `{provider}`: {reason}")]
    InvalidConfig { provider: String, reason: String },
}

/// Result of a cancellable admission request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admitted,
    Cancelled,
}

#[derive(Debug)]
struct ProviderState {
    config: RateLimitConfig,
    ledger: VecDeque<Instant>,
    /// Most recent admission. Survives pruning, since the spacing can be
    /// longer than the window.
    last_admission: Option<Instant>,
}

impl ProviderState {
    fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            ledger: VecDeque::new(),
            last_admission: None,
        }
    }

    /// Drops admissions that are no longer inside `(now - window, now]`.
    ///
    /// An admission exactly `window` old no longer counts, so a caller
    /// blocked by it is admitted at `oldest + window` rather than one tick
    /// later.
    fn prune(&mut self, now: Instant) {
        let window = self.config.window();
        while let Some(&oldest) = self.ledger.front() {
            if now.saturating_duration_since(oldest) >= window {
                self.ledger.pop_front();
            } else {
                break;
            }
        }
    }

    /// How long the caller must wait before it can be admitted, if at all.
    fn wait_needed(&self, now: Instant) -> Option<Duration> {
        let max = self.config.max_requests as usize;
        let mut wait = Duration::ZERO;

        if self.ledger.len() >= max {
            // Enough entries must expire to leave room for one more.
            let blocking = self.ledger[self.ledger.len() - max];
            wait = (blocking + self.config.window()).saturating_duration_since(now);
        }

        if let (Some(spacing), Some(last)) = (self.config.min_spacing(), self.last_admission) {
            wait = wait.max((last + spacing).saturating_duration_since(now));
        }

        (!wait.is_zero()).then_some(wait)
    }
}

/// Per-provider rate limiter shared by every in-flight summarization.
#[derive(Debug)]
pub struct RateLimiter {
    default_config: RateLimitConfig,
    providers: Mutex<HashMap<String, ProviderState>>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(RateLimitConfig::default())
    }
}

impl RateLimiter {
    /// Creates a limiter that applies `default_config` to providers without
    /// an explicit configuration.
    #[must_use]
    pub fn new(default_config: RateLimitConfig) -> Self {
        Self {
            default_config,
            providers: Mutex::new(HashMap::new()),
        }
    }

    /// Merges `overrides` into the configuration for `provider`.
    ///
    /// Only later `acquire` calls see the change.
    pub async fn configure(&self, provider: &str, overrides: RateLimitOverrides) {
        let mut providers = self.providers.lock().await;
        let state = providers
            .entry(provider.to_string())
            .or_insert_with(|| ProviderState::new(self.default_config));
        state.config.merge(&overrides);
        debug!(provider, config = ?state.config, "Rate limit configured");
    }

    /// Returns the configuration that currently applies to `provider`.
    pub async fn config_for(&self, provider: &str) -> RateLimitConfig {
        self.providers
            .lock()
            .await
            .get(provider)
            .map_or(self.default_config, |state| state.config)
    }

    /// Number of admissions for `provider` inside the current window.
    pub async fn in_window(&self, provider: &str) -> usize {
        let mut providers = self.providers.lock().await;
        providers.get_mut(provider).map_or(0, |state| {
            state.prune(Instant::now());
            state.ledger.len()
        })
    }

    /// Waits until `provider` has capacity, then records the admission.
    ///
    /// # Errors
    ///
    /// Returns [`RateLimitError::InvalidConfig`] when the provider's
    /// configuration cannot admit anything.
    pub async fn acquire(&self, provider: &str) -> Result<(), RateLimitError> {
        self.acquire_inner(provider, None).await.map(|_| ())
    }

    /// Like [`acquire`](Self::acquire), but gives up as soon as `cancel` fires.
    ///
    /// A cancelled request leaves the ledger untouched.
    ///
    /// # Errors
    ///
    /// Returns [`RateLimitError::InvalidConfig`] when the provider's
    /// configuration cannot admit anything.
    pub async fn acquire_until_cancelled(
        &self,
        provider: &str,
        cancel: &CancellationToken,
    ) -> Result<Admission, RateLimitError> {
        self.acquire_inner(provider, Some(cancel)).await
    }

    async fn acquire_inner(
        &self,
        provider: &str,
        cancel: Option<&CancellationToken>,
    ) -> Result<Admission, RateLimitError> {
        loop {
            if cancel.is_some_and(CancellationToken::is_cancelled) {
                return Ok(Admission::Cancelled);
            }

            let wait = {
                let mut providers = self.providers.lock().await;
                let state = providers
                    .entry(provider.to_string())
                    .or_insert_with(|| ProviderState::new(self.default_config));
                state.config.validate(provider)?;

                let now = Instant::now();
                state.prune(now);
                match state.wait_needed(now) {
                    None => {
                        state.ledger.push_back(now);
                        state.last_admission = Some(now);
                        debug!(provider, in_window = state.ledger.len(), "Request admitted");
                        return Ok(Admission::Admitted);
                    }
                    Some(wait) => wait,
                }
            };

            debug!(
                provider,
                wait_ms = u64::try_from(wait.as_millis()).unwrap_or(u64::MAX),
                "Rate limit reached, waiting for capacity"
            );

            match cancel {
                Some(token) => {
                    tokio::select! {
                        biased;
                        () = token.cancelled() => return Ok(Admission::Cancelled),
                        () = tokio::time::sleep(wait) => {}
                    }
                }
                None => tokio::time::sleep(wait).await,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn admits_up_to_limit_then_waits_for_window() {
        let limiter = RateLimiter::new(RateLimitConfig::new(2, 1_000));
        let start = Instant::now();

        limiter.acquire("openai").await.unwrap();
        limiter.acquire("openai").await.unwrap();
        assert_eq!(start.elapsed(), Duration::ZERO);

        limiter.acquire("openai").await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(1_000));
    }

    #[tokio::test(start_paused = true)]
    async fn enforces_minimum_spacing() {
        let limiter = RateLimiter::new(RateLimitConfig::new(10, 1_000).with_min_spacing(100));
        let start = Instant::now();

        limiter.acquire("openai").await.unwrap();
        limiter.acquire("openai").await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn spacing_longer_than_window_still_applies() {
        let limiter = RateLimiter::new(RateLimitConfig::new(5, 100).with_min_spacing(500));

        limiter.acquire("openai").await.unwrap();
        let first = Instant::now();
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(limiter.in_window("openai").await, 0);

        limiter.acquire("openai").await.unwrap();
        assert!(first.elapsed() >= Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn admission_exactly_one_window_old_no_longer_counts() {
        let limiter = RateLimiter::new(RateLimitConfig::new(1, 1_000));
        limiter.acquire("openai").await.unwrap();
        let first = Instant::now();

        tokio::time::sleep(Duration::from_millis(1_000)).await;
        assert_eq!(limiter.in_window("openai").await, 0);

        limiter.acquire("openai").await.unwrap();
        assert!(first.elapsed() < Duration::from_millis(1_002));
    }

    #[tokio::test(start_paused = true)]
    async fn providers_do_not_share_ledgers() {
        let limiter = RateLimiter::new(RateLimitConfig::new(1, 1_000));
        let start = Instant::now();

        limiter.acquire("openai").await.unwrap();
        limiter.acquire("anthropic").await.unwrap();
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(limiter.in_window("openai").await, 1);
        assert_eq!(limiter.in_window("anthropic").await, 1);
    }

    #[tokio::test]
    async fn zero_max_requests_fails_fast() {
        let limiter = RateLimiter::default();
        limiter
            .configure(
                "broken",
                RateLimitOverrides {
                    max_requests: Some(0),
                    ..RateLimitOverrides::default()
                },
            )
            .await;

        let err = limiter.acquire("broken").await.unwrap_err();
        assert!(matches!(err, RateLimitError::InvalidConfig { ref provider, .. } if provider == "broken"));
    }

    #[tokio::test]
    async fn configure_merges_partial_overrides() {
        let limiter = RateLimiter::new(RateLimitConfig::new(5, 2_000));
        limiter
            .configure(
                "openai",
                RateLimitOverrides {
                    min_spacing_ms: Some(250),
                    ..RateLimitOverrides::default()
                },
            )
            .await;

        let config = limiter.config_for("openai").await;
        assert_eq!(config, RateLimitConfig::new(5, 2_000).with_min_spacing(250));
        assert_eq!(limiter.config_for("unknown").await, RateLimitConfig::new(5, 2_000));
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_wait_does_not_record_admission() {
        let limiter = Arc::new(RateLimiter::new(RateLimitConfig::new(1, 10_000)));
        limiter.acquire("openai").await.unwrap();

        let token = CancellationToken::new();
        let waiter = {
            let limiter = Arc::clone(&limiter);
            let token = token.clone();
            tokio::spawn(async move { limiter.acquire_until_cancelled("openai", &token).await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        token.cancel();

        assert_eq!(waiter.await.unwrap().unwrap(), Admission::Cancelled);
        assert_eq!(limiter.in_window("openai").await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_callers_never_exceed_window() {
        let limiter = Arc::new(RateLimiter::new(RateLimitConfig::new(3, 1_000)));
        let mut handles = Vec::new();
        for _ in 0..10 {
            let limiter = Arc::clone(&limiter);
            handles.push(tokio::spawn(async move {
                limiter.acquire("openai").await.unwrap();
                Instant::now()
            }));
        }

        let mut admitted = Vec::new();
        for handle in handles {
            admitted.push(handle.await.unwrap());
        }
        admitted.sort();

        for pair in admitted.windows(4) {
            assert!(pair[3].duration_since(pair[0]) >= Duration::from_millis(1_000));
        }
    }
}
