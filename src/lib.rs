/// TLDR docs - streamed bullet-point summaries of documents.
///
/// A document's text is sent to a remote summarizer under a per-provider
/// rate limit, retried on transient failures, and the finished summary is
/// replayed to the caller one character at a time so it reads like a live
/// stream.
///
/// # Architecture
///
/// The crate is layered:
/// - `resilience` for rate limiting, failure classification and retries
/// - `worker` for the summary coordinator and the typing simulator
/// - `ai` for the remote summarizer (`OpenAI` Responses API) and text extraction
/// - `core` for configuration and the frames handed to callers
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use tldr_docs::ai::{LlmClient, PlainTextExtractor};
/// use tldr_docs::core::config::AppConfig;
/// use tldr_docs::core::models::SummaryEvent;
/// use tldr_docs::worker::SummaryCoordinator;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     // Set up structured logging
///     tldr_docs::setup_logging();
///
///     let config = AppConfig::from_env()?;
///     let coordinator = SummaryCoordinator::new(config.summarizer.clone())?;
///     let client = Arc::new(LlmClient::from_config(&config)?);
///
///     let bytes = std::fs::read("report.txt")?;
///     let mut handle =
///         coordinator.summarize_document(&bytes, "report.txt", &PlainTextExtractor, client)?;
///
///     while let Some(event) = handle.next_event().await {
///         match event {
///             SummaryEvent::Snapshot(state) if state.is_complete => {
///                 for bullet in &state.bullet_points {
///                     println!("- {bullet}");
///                 }
///             }
///             SummaryEvent::Snapshot(_) => {}
///             SummaryEvent::Failed(err) => eprintln!("{}", err.user_message()),
///             SummaryEvent::Cancelled => eprintln!("cancelled"),
///         }
///     }
///
///     Ok(())
/// }
/// ```
// Module declarations
pub mod ai;
pub mod core;
pub mod errors;
pub mod resilience;
pub mod utils;
pub mod worker;

pub use crate::core::models::{StreamingState, SummaryEvent};
pub use crate::errors::SummaryError;
pub use crate::resilience::{AppError, ErrorCategory};

/// Configure structured logging with JSON format.
///
/// Sets up tracing-subscriber with a JSON formatter. The level comes from
/// `RUST_LOG` and defaults to `info`. Calling it again after a subscriber is
/// installed does nothing.
///
/// # Example
///
/// ```
/// // Initialize structured logging once at startup
/// tldr_docs::setup_logging();
/// ```
pub fn setup_logging() {
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = fmt::layer().json().with_target(true);

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init();
}
