//! Retry configuration, delay calculation, and failure classification.
//!
//! [`classify`] maps a [`ProviderError`] to a [`LecternError`] by status
//! code and case-insensitive message matching, in priority order: rate
//! limit, quota, transient, everything else. [`RetryConfig`] then decides
//! which classes are retried and how long to wait between attempts.

use std::time::Duration;

use super::traits::ProviderError;
use crate::LecternError;

/// Message fragments that mark a rate limit.
const RATE_LIMIT_MARKERS: &[&str] = &["rate limit", "ratelimit", "429", "too many requests"];

/// Message fragments that mark quota exhaustion.
const QUOTA_MARKERS: &[&str] = &["quota", "403"];

/// Message fragments that mark a transient failure.
const TRANSIENT_MARKERS: &[&str] = &[
    "timeout",
    "timed out",
    "connection",
    "network",
    "503",
    "service unavailable",
    "temporarily unavailable",
    "500",
    "502",
    "504",
];

/// Configuration for retry behaviour.
///
/// Backoff is exponential: `initial_delay * 2^attempt`, capped at
/// `max_delay`. The defaults wait 1s, 2s, 4s, ...
///
/// ```rust
/// # use lectern::RetryConfig;
/// # use std::time::Duration;
/// let config = RetryConfig::new()
///     .max_attempts(5)
///     .initial_delay(Duration::from_millis(200))
///     .retry_unclassified(false);
/// ```
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts (including the initial request).
    /// 1 = no retry. Default: 3.
    pub max_attempts: u32,
    /// Base delay before the first retry. Default: 1s.
    pub initial_delay: Duration,
    /// Maximum delay between retries. Default: 60s.
    pub max_delay: Duration,
    /// Timeout for a single provider call. Default: 60s.
    pub request_timeout: Duration,
    /// Retry errors matching no known class. Default: true.
    pub retry_unclassified: bool,
    /// Retry prompts blocked by a safety filter. Default: true.
    pub retry_blocked: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            request_timeout: Duration::from_secs(60),
            retry_unclassified: true,
            retry_blocked: true,
        }
    }
}

impl RetryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a config that disables retries (single attempt).
    pub fn disabled() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Set maximum attempts (including the initial request).
    pub fn max_attempts(mut self, n: u32) -> Self {
        self.max_attempts = n;
        self
    }

    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn retry_unclassified(mut self, enabled: bool) -> Self {
        self.retry_unclassified = enabled;
        self
    }

    pub fn retry_blocked(mut self, enabled: bool) -> Self {
        self.retry_blocked = enabled;
        self
    }

    /// Delay before retrying after attempt `attempt` (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay = self
            .initial_delay
            .saturating_mul(2u32.saturating_pow(attempt));
        delay.min(self.max_delay)
    }

    /// Whether a classified failure is worth another attempt.
    pub fn should_retry(&self, err: &LecternError) -> bool {
        match err {
            LecternError::AiProvider(_) => self.retry_unclassified,
            LecternError::AiBlocked { .. } => self.retry_blocked,
            other => other.is_transient(),
        }
    }
}

/// Reclassify a provider failure.
pub fn classify(err: &ProviderError) -> LecternError {
    let message = err.message.to_lowercase();
    let mentions = |markers: &[&str]| markers.iter().any(|m| message.contains(m));
    let text = err.to_string();

    match err.status {
        Some(429) => return LecternError::AiRateLimited(text),
        Some(403) if !mentions(RATE_LIMIT_MARKERS) => return LecternError::AiQuota(text),
        Some(500 | 502 | 503 | 504)
            if !mentions(RATE_LIMIT_MARKERS) && !mentions(QUOTA_MARKERS) =>
        {
            return LecternError::AiTransient(text);
        }
        _ => {}
    }

    if mentions(RATE_LIMIT_MARKERS) {
        LecternError::AiRateLimited(text)
    } else if mentions(QUOTA_MARKERS) {
        LecternError::AiQuota(text)
    } else if mentions(TRANSIENT_MARKERS) {
        LecternError::AiTransient(text)
    } else {
        LecternError::AiProvider(text)
    }
}
