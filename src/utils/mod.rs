//! Small text helpers shared across the crate.

pub mod redact;

pub use redact::redact_secrets;
