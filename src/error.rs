//! Lectern error types

use std::time::Duration;

use crate::quota::Action;

/// Lectern error types
#[derive(Debug, thiserror::Error)]
pub enum LecternError {
    // Caller errors
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    // Quota errors
    #[error(
        "quota exceeded for {action}: {limit} requests per {}s, retry in {}s",
        window.as_secs(),
        crate::quota::retry_after_secs(*retry_after)
    )]
    QuotaExceeded {
        action: Action,
        limit: u64,
        window: Duration,
        retry_after: Duration,
    },

    #[error("quota store error: {0}")]
    QuotaStore(String),

    #[error("cache store error: {0}")]
    CacheStore(String),

    // Provider errors, reclassified at the client boundary
    #[error("AI rate limit: {0}")]
    AiRateLimited(String),

    #[error("AI quota exceeded: {0}")]
    AiQuota(String),

    #[error("transient AI error: {0}")]
    AiTransient(String),

    #[error("prompt blocked by safety filter: {reason}")]
    AiBlocked { reason: String },

    #[error("empty response from model")]
    EmptyResponse,

    #[error("AI provider error: {0}")]
    AiProvider(String),

    /// Terminal failure after the client gave up.
    #[error("AI service failed after {attempts} attempt(s): {source}")]
    AiService {
        attempts: u32,
        #[source]
        source: Box<LecternError>,
    },

    #[error("operation cancelled")]
    Cancelled,

    // Transport / data errors
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl LecternError {
    /// Whether a failed provider attempt may be retried.
    ///
    /// Unclassified provider errors and safety blocks are transient here;
    /// [`RetryConfig`](crate::providers::RetryConfig) can narrow that.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            LecternError::AiRateLimited(_)
                | LecternError::AiQuota(_)
                | LecternError::AiTransient(_)
                | LecternError::AiBlocked { .. }
                | LecternError::EmptyResponse
                | LecternError::AiProvider(_)
                | LecternError::Http(_)
        )
    }

    /// Seconds a caller should wait, if the error carries a hint.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            LecternError::QuotaExceeded { retry_after, .. } => Some(*retry_after),
            _ => None,
        }
    }

    /// Message safe to show to an end user.
    ///
    /// Quota rejections name the limit and the wait; everything else is a
    /// generic apology with no internal detail.
    pub fn user_message(&self) -> String {
        match self {
            LecternError::QuotaExceeded {
                limit,
                window,
                retry_after,
                ..
            } => format!(
                "Rate limit exceeded. You can make {limit} requests per {} seconds. \
                 Please try again in {} seconds.",
                window.as_secs(),
                crate::quota::retry_after_secs(*retry_after).max(1)
            ),
            LecternError::InvalidArgument(msg) => format!("Invalid request: {msg}"),
            LecternError::Cancelled => "The request was cancelled.".to_string(),
            _ => "Sorry, the AI service is temporarily unavailable. Please try again later."
                .to_string(),
        }
    }
}

/// Result type alias for Lectern operations
pub type Result<T> = std::result::Result<T, LecternError>;
