use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::errors::SummaryError;
use crate::resilience::{RateLimitConfig, RetryPolicy};

pub const DEFAULT_PROVIDER_KEY: &str = "openai";

/// Pacing of simulated typing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimingConfig {
    pub min_char_delay_ms: u64,
    pub max_char_delay_ms: u64,
    pub inter_segment_pause_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            min_char_delay_ms: 20,
            max_char_delay_ms: 60,
            inter_segment_pause_ms: 350,
        }
    }
}

impl TimingConfig {
    /// No delays at all; snapshots are produced back to back.
    #[must_use]
    pub const fn instant() -> Self {
        Self {
            min_char_delay_ms: 0,
            max_char_delay_ms: 0,
            inter_segment_pause_ms: 0,
        }
    }

    #[must_use]
    pub const fn inter_segment_pause(&self) -> Duration {
        Duration::from_millis(self.inter_segment_pause_ms)
    }
}

/// Everything the summarization coordinator needs besides its collaborators.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummarizerSettings {
    pub provider_key: String,
    pub rate_limit: RateLimitConfig,
    pub retry: RetryPolicy,
    pub timing: TimingConfig,
    /// Per-attempt budget for the remote call. Elapsed budgets count as
    /// network failures.
    pub request_timeout_ms: Option<u64>,
}

impl Default for SummarizerSettings {
    fn default() -> Self {
        Self {
            provider_key: DEFAULT_PROVIDER_KEY.to_string(),
            rate_limit: RateLimitConfig::default(),
            retry: RetryPolicy::default(),
            timing: TimingConfig::default(),
            request_timeout_ms: Some(120_000),
        }
    }
}

impl SummarizerSettings {
    #[must_use]
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }

    /// # Errors
    ///
    /// Returns [`SummaryError::Config`] for settings that can never work.
    pub fn validate(&self) -> Result<(), SummaryError> {
        self.rate_limit.validate(&self.provider_key)?;
        if self.retry.base_delay_ms == 0 {
            return Err(SummaryError::Config(
                "retry base delay must be greater than 0".to_string(),
            ));
        }
        if !(self.retry.multiplier >= 1.0) {
            return Err(SummaryError::Config(format!(
                "retry multiplier must be at least 1, got {}",
                self.retry.multiplier
            )));
        }
        if self.timing.min_char_delay_ms > self.timing.max_char_delay_ms {
            return Err(SummaryError::Config(format!(
                "min char delay ({}ms) exceeds max char delay ({}ms)",
                self.timing.min_char_delay_ms, self.timing.max_char_delay_ms
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub openai_api_key: String,
    pub openai_org_id: Option<String>,
    pub openai_model: Option<String>,
    pub summarizer: SummarizerSettings,
}

impl AppConfig {
    /// # Errors
    ///
    /// Returns [`SummaryError::Config`] when a required variable is missing or
    /// a numeric variable does not parse.
    pub fn from_env() -> Result<Self, SummaryError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    ///
    /// # Errors
    ///
    /// See [`AppConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, SummaryError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let openai_api_key = lookup("OPENAI_API_KEY")
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| SummaryError::Config("OPENAI_API_KEY is not set".to_string()))?;

        let defaults = SummarizerSettings::default();
        let rate_limit = RateLimitConfig {
            max_requests: parse_var(&lookup, "TLDR_RATE_MAX_REQUESTS")?
                .unwrap_or(defaults.rate_limit.max_requests),
            window_ms: parse_var(&lookup, "TLDR_RATE_WINDOW_MS")?
                .unwrap_or(defaults.rate_limit.window_ms),
            min_spacing_ms: parse_var(&lookup, "TLDR_RATE_MIN_SPACING_MS")?
                .or(defaults.rate_limit.min_spacing_ms),
        };
        let retry = RetryPolicy {
            max_retries: parse_var(&lookup, "TLDR_MAX_RETRIES")?
                .unwrap_or(defaults.retry.max_retries),
            base_delay_ms: parse_var(&lookup, "TLDR_RETRY_BASE_DELAY_MS")?
                .unwrap_or(defaults.retry.base_delay_ms),
            multiplier: parse_var(&lookup, "TLDR_RETRY_MULTIPLIER")?
                .unwrap_or(defaults.retry.multiplier),
        };
        let timing = TimingConfig {
            min_char_delay_ms: parse_var(&lookup, "TLDR_MIN_CHAR_DELAY_MS")?
                .unwrap_or(defaults.timing.min_char_delay_ms),
            max_char_delay_ms: parse_var(&lookup, "TLDR_MAX_CHAR_DELAY_MS")?
                .unwrap_or(defaults.timing.max_char_delay_ms),
            inter_segment_pause_ms: parse_var(&lookup, "TLDR_SEGMENT_PAUSE_MS")?
                .unwrap_or(defaults.timing.inter_segment_pause_ms),
        };

        let summarizer = SummarizerSettings {
            provider_key: lookup("TLDR_PROVIDER_KEY").unwrap_or(defaults.provider_key),
            rate_limit,
            retry,
            timing,
            request_timeout_ms: parse_var(&lookup, "TLDR_REQUEST_TIMEOUT_MS")?
                .or(defaults.request_timeout_ms),
        };
        summarizer.validate()?;

        Ok(Self {
            openai_api_key,
            openai_org_id: lookup("OPENAI_ORG_ID"),
            openai_model: lookup("OPENAI_MODEL"),
            summarizer,
        })
    }
}

fn parse_var<F, T>(lookup: &F, name: &str) -> Result<Option<T>, SummaryError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    lookup(name)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|e| SummaryError::Config(format!("{name}: {e}")))
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn requires_api_key() {
        let err = AppConfig::from_lookup(lookup_from(&[])).unwrap_err();
        assert!(matches!(err, SummaryError::Config(ref m) if m.contains("OPENAI_API_KEY")));
    }

    #[test]
    fn falls_back_to_defaults() {
        let config = AppConfig::from_lookup(lookup_from(&[("OPENAI_API_KEY", "k")])).unwrap();
        assert_eq!(config.summarizer.provider_key, DEFAULT_PROVIDER_KEY);
        assert_eq!(config.summarizer.retry, RetryPolicy::default());
        assert_eq!(config.summarizer.timing, TimingConfig::default());
        assert!(config.openai_model.is_none());
    }

    #[test]
    fn reads_overrides() {
        let config = AppConfig::from_lookup(lookup_from(&[
            ("OPENAI_API_KEY", "k"),
            ("OPENAI_MODEL", "gpt-5-mini"),
            ("TLDR_RATE_MAX_REQUESTS", "3"),
            ("TLDR_RATE_MIN_SPACING_MS", "200"),
            ("TLDR_MAX_RETRIES", "5"),
            ("TLDR_RETRY_MULTIPLIER", "1.5"),
            ("TLDR_SEGMENT_PAUSE_MS", "0"),
        ]))
        .unwrap();

        assert_eq!(config.openai_model.as_deref(), Some("gpt-5-mini"));
        assert_eq!(config.summarizer.rate_limit.max_requests, 3);
        assert_eq!(config.summarizer.rate_limit.min_spacing_ms, Some(200));
        assert_eq!(config.summarizer.retry.max_retries, 5);
        assert!((config.summarizer.retry.multiplier - 1.5).abs() < f64::EPSILON);
        assert_eq!(config.summarizer.timing.inter_segment_pause_ms, 0);
    }

    #[test]
    fn rejects_unparseable_numbers() {
        let err = AppConfig::from_lookup(lookup_from(&[
            ("OPENAI_API_KEY", "k"),
            ("TLDR_MAX_RETRIES", "lots"),
        ]))
        .unwrap_err();
        assert!(matches!(err, SummaryError::Config(ref m) if m.starts_with("TLDR_MAX_RETRIES")));
    }

    #[test]
    fn rejects_zero_request_limit() {
        let err = AppConfig::from_lookup(lookup_from(&[
            ("OPENAI_API_KEY", "k"),
            ("TLDR_RATE_MAX_REQUESTS", "0"),
        ]))
        .unwrap_err();
        assert!(matches!(err, SummaryError::RateLimit(_)));
    }

    #[test]
    fn rejects_inverted_char_delays() {
        let settings = SummarizerSettings {
            timing: TimingConfig {
                min_char_delay_ms: 80,
                max_char_delay_ms: 10,
                inter_segment_pause_ms: 0,
            },
            ..SummarizerSettings::default()
        };
        assert!(settings.validate().is_err());
    }
}
