//! Request, response, and cancellation types for [`AiClient`](super::AiClient).

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::providers::GenerationConfig;

/// Options for one logical generation.
///
/// ```rust
/// # use lectern::GenerateRequest;
/// let request = GenerateRequest::new("What is the main finding?")
///     .context("...document text...")
///     .max_retries(3)
///     .use_cache(true);
/// ```
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub prompt: String,
    /// Document text placed ahead of the question.
    pub context: Option<String>,
    /// Attempt cap for this call; `None` uses the client's retry config.
    pub max_retries: Option<u32>,
    pub use_cache: bool,
    /// Cache TTL for this call; `None` uses the namespace default.
    pub cache_ttl: Option<Duration>,
    pub config: GenerationConfig,
    pub cancel: Option<CancelToken>,
}

impl GenerateRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            context: None,
            max_retries: None,
            use_cache: false,
            cache_ttl: None,
            config: GenerationConfig::default(),
            cancel: None,
        }
    }

    pub fn context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.max_retries = Some(n);
        self
    }

    pub fn use_cache(mut self, enabled: bool) -> Self {
        self.use_cache = enabled;
        self
    }

    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = Some(ttl);
        self
    }

    pub fn generation_config(mut self, config: GenerationConfig) -> Self {
        self.config = config;
        self
    }

    pub fn cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Prompt actually sent to the model (and used as cache key).
    pub fn full_prompt(&self) -> String {
        match &self.context {
            Some(context) => format!("Context: {context}\n\nQuestion: {}", self.prompt),
            None => self.prompt.clone(),
        }
    }
}

/// Result of a successful generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiResponse {
    pub message: String,
    /// Wall-clock time from the first attempt to success.
    pub response_time_ms: u64,
    /// Whether the answer was served from the response cache.
    pub cached: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens_used: Option<u64>,
}

/// Cooperative cancellation for an in-flight generation.
///
/// Cloning shares the token; cancelling any clone cancels all. The client
/// checks it before each attempt and while waiting out a backoff.
#[derive(Debug, Clone)]
pub struct CancelToken {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once the token is cancelled.
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives as long as `self`, so this cannot close early.
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}
