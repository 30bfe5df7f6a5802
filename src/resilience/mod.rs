//! Admission control, failure classification and retries for remote calls.

pub mod classify;
pub mod rate_limit;
pub mod retry;

pub use classify::{AppError, ErrorCategory, RemoteFailure, classify, classify_with_context};
pub use rate_limit::{Admission, RateLimitConfig, RateLimitError, RateLimitOverrides, RateLimiter};
pub use retry::{Backoff, RetryOutcome, RetryPolicy};
