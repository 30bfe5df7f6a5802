//! Collaborators the summarization core calls out to.
//!
//! The core never talks HTTP or parses documents itself; it is handed a
//! [`Summarizer`] and, for raw documents, a [`TextExtractor`].

use async_trait::async_trait;

use crate::errors::SummaryError;
use crate::resilience::RemoteFailure;

pub mod client;
pub mod extract;

// Re-export main types for convenience
pub use client::{LlmClient, estimate_tokens, parse_bullets};
pub use extract::PlainTextExtractor;

/// The remote summarization call.
///
/// Implementations make a single attempt: no retries, no rate limiting.
#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Returns the summary of `source_text` as ordered bullet texts.
    async fn summarize(
        &self,
        source_text: &str,
        identifier: &str,
    ) -> Result<Vec<String>, RemoteFailure>;
}

/// Turns raw document bytes into page texts.
pub trait TextExtractor: Send + Sync {
    /// # Errors
    ///
    /// Returns [`SummaryError::Extraction`] when the bytes are not a readable
    /// document.
    fn extract_text(&self, bytes: &[u8]) -> Result<Vec<String>, SummaryError>;
}
