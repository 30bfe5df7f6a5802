use std::error::Error;
use std::time::Duration;
use tldr_docs::errors::SummaryError;
use tldr_docs::resilience::{
    AppError, ErrorCategory, RateLimitConfig, RemoteFailure, classify,
};

#[test]
fn test_summary_error_implements_error_trait() {
    fn assert_error<T: Error>(_: &T) {}

    let error = SummaryError::Extraction("bad bytes".to_string());
    assert_error(&error);
}

#[test]
fn test_summary_error_display() {
    assert_eq!(
        format!("{}", SummaryError::EmptySource),
        "There is no text to summarize"
    );
    assert_eq!(
        format!("{}", SummaryError::Config("missing key".to_string())),
        "Invalid configuration: missing key"
    );
    assert_eq!(
        format!("{}", SummaryError::HttpError("Connection error".to_string())),
        "Failed to send HTTP request: Connection error"
    );
}

#[test]
fn test_summary_error_from_conversions() {
    let rate_err = RateLimitConfig::new(0, 1_000).validate("openai").unwrap_err();
    let summary_err: SummaryError = rate_err.into();
    assert!(summary_err.to_string().contains("openai"));

    #[allow(unused)]
    #[allow(clippy::items_after_statements)]
    fn _check_reqwest_conversion(err: reqwest::Error) -> SummaryError {
        // Only verifies the conversion exists
        SummaryError::from(err)
    }
}

#[tokio::test]
async fn test_reqwest_errors_become_http_errors() {
    let err = reqwest::Client::new()
        .get("not a url")
        .send()
        .await
        .unwrap_err();

    assert!(matches!(SummaryError::from(err), SummaryError::HttpError(_)));
}

#[test]
fn test_app_error_keeps_cause_as_source() {
    let err = classify(RemoteFailure::Timeout(Duration::from_millis(250)));

    assert_eq!(err.category(), ErrorCategory::Network);
    assert!(err.is_retryable());
    let source = err.source().expect("classified errors carry their cause");
    assert_eq!(source.to_string(), "request timed out after 250ms");
}

#[test]
fn test_app_error_serializes_without_cause() {
    let err = classify(RemoteFailure::Status {
        status: 429,
        message: "slow down".to_string(),
    })
    .with_context("provider", "openai");

    let json = serde_json::to_value(&err).unwrap();
    assert_eq!(json["category"], "rateLimit");
    assert_eq!(json["retryable"], true);
    assert_eq!(json["context"]["provider"], "openai");
    assert!(json.get("cause").is_none());
}

#[test]
fn test_local_errors_have_no_status() {
    let err = AppError::local(ErrorCategory::Validation, "bad limiter");
    assert_eq!(err.status_code(), None);
    assert!(err.cause().is_none());
    assert_eq!(format!("{err}"), "validation error: bad limiter");
}
