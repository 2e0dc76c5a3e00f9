//! Retrying, caching AI client.
//!
//! [`AiClient::generate`] is the single path to the model. Per call:
//!
//! 1. Reject empty prompts with [`LecternError::InvalidArgument`].
//! 2. Prepend the context, if any.
//! 3. With `use_cache`, serve a cache hit and stop.
//! 4. Otherwise attempt the provider call up to the attempt cap, each
//!    attempt bounded by the request timeout. Failures are classified by
//!    [`classify`]; retryable ones back off `initial_delay * 2^attempt`
//!    before the next attempt.
//! 5. On success write the answer to the cache (with `use_cache`).
//! 6. When attempts run out, or a failure isn't retryable, return
//!    [`LecternError::AiService`] wrapping the last failure.
//!
//! Backoff waits are `tokio::time::sleep`, so only the calling task is
//! suspended. A [`CancelToken`] is observed before every attempt and
//! during every backoff.

mod request;

pub use request::{AiResponse, CancelToken, GenerateRequest};

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use crate::cache::ResponseCache;
use crate::providers::{GenerationConfig, GenerativeModel, RetryConfig, classify, safe_get_text};
use crate::telemetry;
use crate::{LecternError, Result};

/// Single chokepoint for LLM calls.
pub struct AiClient {
    retry: RetryConfig,
    cache: Option<Arc<ResponseCache>>,
}

impl AiClient {
    pub fn new(retry: RetryConfig) -> Self {
        Self { retry, cache: None }
    }

    /// Attach a response cache, used by requests with `use_cache`.
    pub fn with_cache(mut self, cache: Arc<ResponseCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn retry_config(&self) -> &RetryConfig {
        &self.retry
    }

    pub async fn generate(
        &self,
        model: &dyn GenerativeModel,
        request: &GenerateRequest,
    ) -> Result<AiResponse> {
        if request.prompt.trim().is_empty() {
            return Err(LecternError::InvalidArgument(
                "prompt must not be empty".to_string(),
            ));
        }

        let prompt = request.full_prompt();
        let model_id = model.model_id();
        let cache = self.cache.as_deref().filter(|_| request.use_cache);

        if let Some(cache) = cache
            && let Some(hit) = cache.get::<AiResponse>(&prompt, model_id).await
        {
            record_request(model_id, "cached");
            return Ok(AiResponse {
                cached: true,
                ..hit.value
            });
        }

        let max_attempts = request.max_retries.unwrap_or(self.retry.max_attempts).max(1);
        let started = Instant::now();
        let mut attempts = 0;
        let mut last_err = None;

        while attempts < max_attempts {
            if request.cancel.as_ref().is_some_and(|c| c.is_cancelled()) {
                return Err(LecternError::Cancelled);
            }
            let attempt = attempts;
            attempts += 1;

            match self.attempt(model, &prompt, &request.config).await {
                Ok((message, tokens_used)) => {
                    let elapsed = started.elapsed();
                    let response = AiResponse {
                        message,
                        response_time_ms: elapsed.as_millis() as u64,
                        cached: false,
                        tokens_used,
                    };
                    if let Some(cache) = cache {
                        cache
                            .set(&prompt, &response, model_id, request.cache_ttl)
                            .await;
                    }
                    debug!(
                        model = model_id,
                        attempts,
                        elapsed_ms = response.response_time_ms,
                        "generation succeeded"
                    );
                    record_request(model_id, "ok");
                    metrics::histogram!(telemetry::REQUEST_DURATION_SECONDS, "model" => model_id.to_owned())
                        .record(elapsed.as_secs_f64());
                    return Ok(response);
                }
                Err(e) if self.retry.should_retry(&e) => {
                    if attempts < max_attempts {
                        let delay = self.retry.delay_for_attempt(attempt);
                        warn!(
                            model = model_id,
                            attempt = attempts,
                            max_attempts,
                            delay_ms = delay.as_millis() as u64,
                            error = %e,
                            "retrying after failed generation"
                        );
                        metrics::counter!(telemetry::RETRIES_TOTAL, "model" => model_id.to_owned())
                            .increment(1);
                        backoff(delay, request.cancel.as_ref()).await?;
                    }
                    last_err = Some(e);
                }
                Err(e) => {
                    warn!(
                        model = model_id,
                        attempt = attempts,
                        error = %e,
                        "generation failed, not retrying"
                    );
                    last_err = Some(e);
                    break;
                }
            }
        }

        record_request(model_id, "error");
        Err(LecternError::AiService {
            attempts,
            source: Box::new(last_err.unwrap_or(LecternError::EmptyResponse)),
        })
    }

    /// One provider call, classified.
    async fn attempt(
        &self,
        model: &dyn GenerativeModel,
        prompt: &str,
        config: &GenerationConfig,
    ) -> Result<(String, Option<u64>)> {
        let timeout = self.retry.request_timeout;
        let response = match tokio::time::timeout(timeout, model.generate_content(prompt, config)).await
        {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => return Err(classify(&e)),
            Err(_) => {
                return Err(LecternError::AiTransient(format!(
                    "request timed out after {}s",
                    timeout.as_secs_f64()
                )));
            }
        };

        let text = safe_get_text(Some(&response));
        if text.is_empty() {
            return Err(match response.block_reason() {
                Some(reason) => LecternError::AiBlocked {
                    reason: reason.to_string(),
                },
                None => LecternError::EmptyResponse,
            });
        }
        Ok((text, response.tokens_used()))
    }
}

async fn backoff(delay: Duration, cancel: Option<&CancelToken>) -> Result<()> {
    match cancel {
        None => {
            tokio::time::sleep(delay).await;
            Ok(())
        }
        Some(token) => tokio::select! {
            _ = tokio::time::sleep(delay) => Ok(()),
            _ = token.cancelled() => Err(LecternError::Cancelled),
        },
    }
}

fn record_request(model: &str, status: &'static str) {
    metrics::counter!(telemetry::REQUESTS_TOTAL,
        "model" => model.to_owned(),
        "status" => status,
    )
    .increment(1);
}
