use thiserror::Error;

use crate::resilience::rate_limit::RateLimitError;

/// Local failures raised before any remote call is attempted.
///
/// Remote failures never use this type; they are classified into
/// [`AppError`](crate::resilience::AppError) instead.
#[derive(Debug, Error)]
pub enum SummaryError {
    #[error("There is no text to summarize")]
    EmptySource,

    #[error("Failed to extract document text: {0}")]
    Extraction(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Failed to send HTTP request: {0}")]
    HttpError(String),

    #[error(transparent)]
    RateLimit(#[from] RateLimitError),
}

impl From<reqwest::Error> for SummaryError {
    fn from(error: reqwest::Error) -> Self {
        SummaryError::HttpError(error.to_string())
    }
}
