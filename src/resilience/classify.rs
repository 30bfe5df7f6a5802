//! Failure classification.
//!
//! Every remote failure is normalized into an [`AppError`] carrying a fixed
//! [`ErrorCategory`] and a retryable flag. Classification is ordered: a status
//! code wins over message text, and message text wins over nothing at all.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::utils::redact_secrets;

/// Raw failure returned by a [`Summarizer`](crate::ai::Summarizer).
#[derive(Debug, Error)]
pub enum RemoteFailure {
    /// The service answered with a non-success status.
    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },

    /// A failure that only carries text.
    #[error("{0}")]
    Message(String),

    /// The attempt exceeded its time budget.
    #[error("request timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    /// A failure with nothing usable to inspect.
    #[error("unrecognized failure")]
    Opaque,
}

impl RemoteFailure {
    #[must_use]
    pub const fn status_code(&self) -> Option<u16> {
        match self {
            RemoteFailure::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    #[must_use]
    pub fn message(&self) -> Option<String> {
        match self {
            RemoteFailure::Status { message, .. } | RemoteFailure::Message(message) => {
                Some(message.clone())
            }
            RemoteFailure::Timeout(_) => Some(self.to_string()),
            RemoteFailure::Opaque => None,
        }
    }
}

impl From<reqwest::Error> for RemoteFailure {
    fn from(error: reqwest::Error) -> Self {
        if let Some(status) = error.status() {
            return RemoteFailure::Status {
                status: status.as_u16(),
                message: error.to_string(),
            };
        }
        if error.is_timeout() || error.is_connect() || error.is_request() {
            return RemoteFailure::Message(format!("network error: {error}"));
        }
        RemoteFailure::Message(error.to_string())
    }
}

impl From<String> for RemoteFailure {
    fn from(message: String) -> Self {
        RemoteFailure::Message(message)
    }
}

impl From<&str> for RemoteFailure {
    fn from(message: &str) -> Self {
        RemoteFailure::Message(message.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorCategory {
    Network,
    Authentication,
    RateLimit,
    Validation,
    Server,
    Client,
    Unknown,
}

impl ErrorCategory {
    /// Whether failures in this category are worth another attempt.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(
            self,
            ErrorCategory::Network | ErrorCategory::RateLimit | ErrorCategory::Server
        )
    }

    fn from_status(status: u16) -> Option<Self> {
        match status {
            401 | 403 => Some(ErrorCategory::Authentication),
            422 => Some(ErrorCategory::Validation),
            429 => Some(ErrorCategory::RateLimit),
            400..=499 => Some(ErrorCategory::Client),
            500.. => Some(ErrorCategory::Server),
            _ => None,
        }
    }

    fn from_message(message: &str) -> Self {
        let lowered = message.to_lowercase();
        if lowered.contains("network") || lowered.contains("connection") {
            ErrorCategory::Network
        } else if lowered.contains("auth")
            || lowered.contains("unauthorized")
            || lowered.contains("api key")
        {
            ErrorCategory::Authentication
        } else if lowered.contains("rate limit") {
            ErrorCategory::RateLimit
        } else {
            ErrorCategory::Client
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorCategory::Network => "network",
            ErrorCategory::Authentication => "authentication",
            ErrorCategory::RateLimit => "rateLimit",
            ErrorCategory::Validation => "validation",
            ErrorCategory::Server => "server",
            ErrorCategory::Client => "client",
            ErrorCategory::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// A classified failure, safe to show to users through [`AppError::user_message`].
#[derive(Debug, Clone, Error, Serialize)]
#[serde(rename_all = "camelCase")]
#[error("{category} error: {message}")]
pub struct AppError {
    message: String,
    category: ErrorCategory,
    status_code: Option<u16>,
    retryable: bool,
    timestamp: DateTime<Utc>,
    context: BTreeMap<String, String>,
    #[serde(skip)]
    #[source]
    cause: Option<Arc<RemoteFailure>>,
}

impl AppError {
    /// Builds an error for a local problem that never reached the remote service.
    #[must_use]
    pub fn local(category: ErrorCategory, message: &str) -> Self {
        Self {
            message: redact_secrets(message),
            category,
            status_code: None,
            retryable: category.is_retryable(),
            timestamp: Utc::now(),
            context: BTreeMap::new(),
            cause: None,
        }
    }

    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Sanitized technical description.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        self.category
    }

    #[must_use]
    pub const fn status_code(&self) -> Option<u16> {
        self.status_code
    }

    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        self.retryable
    }

    #[must_use]
    pub const fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    #[must_use]
    pub const fn context(&self) -> &BTreeMap<String, String> {
        &self.context
    }

    /// The original failure, for logging only.
    #[must_use]
    pub fn cause(&self) -> Option<&RemoteFailure> {
        self.cause.as_deref()
    }

    /// Sentence suitable for display in a user interface.
    #[must_use]
    pub const fn user_message(&self) -> &'static str {
        match self.category {
            ErrorCategory::Network => {
                "We couldn't reach the summarization service. Please check your connection and try again."
            }
            ErrorCategory::Authentication => {
                "The summarization service rejected our credentials. Please check the API key configuration."
            }
            ErrorCategory::RateLimit => {
                "The summarization service is busy right now. Please wait a moment and try again."
            }
            ErrorCategory::Validation => {
                "This document couldn't be summarized. It may be too long or in an unsupported format."
            }
            ErrorCategory::Server => {
                "The summarization service is having trouble. Please try again later."
            }
            ErrorCategory::Client | ErrorCategory::Unknown => {
                "Sorry, I couldn't generate a summary at this time. Please try again later."
            }
        }
    }
}

/// Classifies a raw failure.
#[must_use]
pub fn classify(failure: RemoteFailure) -> AppError {
    classify_with_context(failure, BTreeMap::new())
}

/// Classifies a raw failure and attaches `context` to the result.
#[must_use]
pub fn classify_with_context(
    failure: RemoteFailure,
    context: BTreeMap<String, String>,
) -> AppError {
    let status_code = failure.status_code();
    let message = failure.message();

    let by_shape = match &failure {
        RemoteFailure::Timeout(_) => Some(ErrorCategory::Network),
        _ => status_code.and_then(ErrorCategory::from_status),
    };
    let category = by_shape
        .or_else(|| message.as_deref().map(ErrorCategory::from_message))
        .unwrap_or(ErrorCategory::Unknown);

    let text = message.unwrap_or_else(|| failure.to_string());

    AppError {
        message: redact_secrets(&text),
        category,
        status_code,
        retryable: category.is_retryable(),
        timestamp: Utc::now(),
        context,
        cause: Some(Arc::new(failure)),
    }
}
