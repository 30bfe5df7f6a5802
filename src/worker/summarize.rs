//! End-to-end summarization: admission, retried remote call, simulated typing.
//!
//! Each call to [`SummaryCoordinator::produce_streamed_summary`] spawns one
//! task that owns the whole invocation and reports through a
//! [`SummaryHandle`]. The handle's cancellation token is observed at every
//! suspension point: the rate-limit wait, each attempt and backoff, and every
//! typing pause.

use futures::Stream;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

use super::streaming;
use crate::ai::{Summarizer, TextExtractor};
use crate::core::config::{SummarizerSettings, TimingConfig};
use crate::core::models::{StreamingState, SummaryEvent};
use crate::errors::SummaryError;
use crate::resilience::retry::{self, RetryOutcome, RetryPolicy};
use crate::resilience::{Admission, AppError, ErrorCategory, RateLimiter, RemoteFailure};

const EVENT_BUFFER: usize = 32;

/// Composes rate limiting, retries and simulated streaming.
#[derive(Debug, Clone)]
pub struct SummaryCoordinator {
    limiter: Arc<RateLimiter>,
    settings: SummarizerSettings,
}

impl SummaryCoordinator {
    /// Creates a coordinator with its own limiter, using the settings' rate
    /// limit as the default for every provider.
    ///
    /// # Errors
    ///
    /// Returns [`SummaryError::Config`] or [`SummaryError::RateLimit`] for
    /// settings that can never work.
    pub fn new(settings: SummarizerSettings) -> Result<Self, SummaryError> {
        let limiter = Arc::new(RateLimiter::new(settings.rate_limit));
        Self::with_limiter(settings, limiter)
    }

    /// Creates a coordinator sharing `limiter` with other coordinators.
    ///
    /// Admission follows `limiter`'s own configuration; `settings.rate_limit`
    /// is only checked for validity here, never applied. Use
    /// [`RateLimiter::configure`] to change a shared limiter.
    ///
    /// # Errors
    ///
    /// See [`SummaryCoordinator::new`].
    pub fn with_limiter(
        settings: SummarizerSettings,
        limiter: Arc<RateLimiter>,
    ) -> Result<Self, SummaryError> {
        settings.validate()?;
        Ok(Self { limiter, settings })
    }

    #[must_use]
    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    #[must_use]
    pub const fn settings(&self) -> &SummarizerSettings {
        &self.settings
    }

    /// Starts summarizing `source_text` and returns a handle to its events.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`SummaryError::EmptySource`] for blank input. Nothing is sent
    /// anywhere in that case.
    pub fn produce_streamed_summary(
        &self,
        source_text: impl Into<String>,
        identifier: impl Into<String>,
        summarizer: Arc<dyn Summarizer>,
    ) -> Result<SummaryHandle, SummaryError> {
        let source_text: String = source_text.into();
        if source_text.trim().is_empty() {
            return Err(SummaryError::EmptySource);
        }

        let correlation_id = Uuid::new_v4().to_string();
        let cancel = CancellationToken::new();
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);

        let job = Job {
            correlation_id: correlation_id.clone(),
            provider_key: self.settings.provider_key.clone(),
            identifier: identifier.into(),
            source_text: Arc::from(source_text),
            summarizer,
            limiter: Arc::clone(&self.limiter),
            retry: self.settings.retry,
            timing: self.settings.timing,
            request_timeout: self.settings.request_timeout(),
            cancel: cancel.clone(),
        };

        let span = info_span!(
            "summary",
            correlation_id = %job.correlation_id,
            identifier = %job.identifier,
            provider = %job.provider_key,
        );
        tokio::spawn(job.run(tx).instrument(span));

        Ok(SummaryHandle {
            correlation_id,
            events: rx,
            cancel,
            finished: false,
        })
    }

    /// Extracts text from `bytes` and summarizes it.
    ///
    /// Pages are joined with blank lines before summarizing.
    ///
    /// # Errors
    ///
    /// Returns [`SummaryError::Extraction`] when the extractor fails and
    /// [`SummaryError::EmptySource`] when the document has no text.
    pub fn summarize_document(
        &self,
        bytes: &[u8],
        identifier: impl Into<String>,
        extractor: &dyn TextExtractor,
        summarizer: Arc<dyn Summarizer>,
    ) -> Result<SummaryHandle, SummaryError> {
        let pages = extractor.extract_text(bytes)?;
        debug!(pages = pages.len(), "Extracted document text");
        self.produce_streamed_summary(pages.join("\n\n"), identifier, summarizer)
    }
}

/// Everything one invocation owns.
struct Job {
    correlation_id: String,
    provider_key: String,
    identifier: String,
    source_text: Arc<str>,
    summarizer: Arc<dyn Summarizer>,
    limiter: Arc<RateLimiter>,
    retry: RetryPolicy,
    timing: TimingConfig,
    request_timeout: Option<Duration>,
    cancel: CancellationToken,
}

impl Job {
    async fn run(self, tx: mpsc::Sender<SummaryEvent>) {
        info!("Starting summary");

        match self
            .limiter
            .acquire_until_cancelled(&self.provider_key, &self.cancel)
            .await
        {
            Ok(Admission::Admitted) => {}
            Ok(Admission::Cancelled) => {
                info!("Cancelled while waiting for rate limit");
                let _ = tx.send(SummaryEvent::Cancelled).await;
                return;
            }
            Err(e) => {
                error!("Rate limiter rejected request: {}", e);
                let err = AppError::local(ErrorCategory::Validation, &e.to_string())
                    .with_context("provider", self.provider_key.clone());
                let _ = tx.send(SummaryEvent::Failed(err)).await;
                return;
            }
        }

        let segments = match retry::run_with_context(
            || self.attempt(),
            &self.retry,
            &self.cancel,
            &self.error_context(),
        )
        .await
        {
            RetryOutcome::Succeeded(segments) => segments,
            RetryOutcome::Failed(err) => {
                error!(
                    category = %err.category(),
                    status = ?err.status_code(),
                    cause = ?err.cause(),
                    "Summary failed: {}",
                    err.message()
                );
                let _ = tx.send(SummaryEvent::Failed(err)).await;
                return;
            }
            RetryOutcome::Cancelled => {
                info!("Cancelled before a summary arrived");
                let _ = tx.send(SummaryEvent::Cancelled).await;
                return;
            }
        };

        info!(bullets = segments.len(), "Summary received, streaming");

        let mut simulation = streaming::simulate(segments, self.timing, self.cancel.child_token());
        while let Some(state) = simulation.next_state().await {
            if tx.send(SummaryEvent::Snapshot(state)).await.is_err() {
                debug!("Summary handle dropped, stopping stream");
                simulation.stop();
                return;
            }
        }

        if self.cancel.is_cancelled() {
            info!("Cancelled while streaming");
            let _ = tx.send(SummaryEvent::Cancelled).await;
        } else {
            info!("Summary streamed");
        }
    }

    fn attempt(
        &self,
    ) -> impl Future<Output = Result<Vec<String>, RemoteFailure>> + Send {
        let summarizer = Arc::clone(&self.summarizer);
        let source_text = Arc::clone(&self.source_text);
        let identifier = self.identifier.clone();
        let request_timeout = self.request_timeout;

        async move {
            let call = summarizer.summarize(&source_text, &identifier);
            match request_timeout {
                Some(limit) => tokio::time::timeout(limit, call).await.unwrap_or_else(|_| {
                    warn!(
                        timeout_ms = u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
                        "Summarization attempt timed out"
                    );
                    Err(RemoteFailure::Timeout(limit))
                }),
                None => call.await,
            }
        }
    }

    fn error_context(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("correlation_id".to_string(), self.correlation_id.clone()),
            ("identifier".to_string(), self.identifier.clone()),
            ("provider".to_string(), self.provider_key.clone()),
        ])
    }
}

/// How an invocation ended, as seen by [`SummaryHandle::finish`].
#[derive(Debug, Clone)]
pub enum SummaryOutcome {
    Completed(StreamingState),
    Failed(AppError),
    Cancelled,
}

/// Caller's side of one summarization.
///
/// Yields snapshots in order, then exactly one terminal event: a complete
/// snapshot, `Failed`, or `Cancelled`. After [`cancel`](Self::cancel) no
/// further snapshots are yielded. Dropping the handle cancels the work.
#[derive(Debug)]
pub struct SummaryHandle {
    correlation_id: String,
    events: mpsc::Receiver<SummaryEvent>,
    cancel: CancellationToken,
    finished: bool,
}

impl SummaryHandle {
    #[must_use]
    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    /// Stops the invocation wherever it currently is.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Token shared by every stage of this invocation.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Waits for the next event. Returns `None` after the terminal event.
    pub async fn next_event(&mut self) -> Option<SummaryEvent> {
        if self.finished {
            return None;
        }

        let event = tokio::select! {
            biased;
            () = self.cancel.cancelled() => Some(SummaryEvent::Cancelled),
            event = self.events.recv() => event,
        };

        match event {
            Some(SummaryEvent::Snapshot(_)) if self.cancel.is_cancelled() => {
                self.finish_events();
                Some(SummaryEvent::Cancelled)
            }
            Some(event) => {
                if event.is_terminal() {
                    self.finish_events();
                }
                Some(event)
            }
            None => {
                self.finish_events();
                None
            }
        }
    }

    /// Drains the handle and reports how the invocation ended.
    pub async fn finish(mut self) -> SummaryOutcome {
        let mut last = None;
        while let Some(event) = self.next_event().await {
            last = Some(event);
        }
        match last {
            Some(SummaryEvent::Snapshot(state)) if state.is_complete => {
                SummaryOutcome::Completed(state)
            }
            Some(SummaryEvent::Failed(err)) => SummaryOutcome::Failed(err),
            _ => SummaryOutcome::Cancelled,
        }
    }

    /// Adapts the handle into a [`Stream`] of events.
    pub fn into_stream(self) -> impl Stream<Item = SummaryEvent> {
        futures::stream::unfold(self, |mut handle| async move {
            let event = handle.next_event().await?;
            Some((event, handle))
        })
    }

    fn finish_events(&mut self) {
        self.finished = true;
        self.events.close();
    }
}

impl Drop for SummaryHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
