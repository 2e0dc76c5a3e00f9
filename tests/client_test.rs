//! Tests for [`AiClient`]: retries, backoff, classification, caching,
//! timeouts, and cancellation. Time is paused so backoff waits are
//! instant and observable.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use lectern::{
    AiClient, CacheConfig, CancelToken, GenerateContentResponse, GenerateRequest,
    GenerationConfig, GenerativeModel, Lectern, LecternError, ProviderError, ResponseCache,
    RetryConfig,
};
use tokio::time::Instant;

type Outcome = std::result::Result<GenerateContentResponse, ProviderError>;

// ============================================================================
// Mock models
// ============================================================================

/// Plays back scripted outcomes, then repeats a final one forever.
struct ScriptedModel {
    script: Mutex<VecDeque<Outcome>>,
    then: Outcome,
    calls: AtomicU32,
    last_prompt: Mutex<Option<String>>,
}

impl ScriptedModel {
    fn new(script: Vec<Outcome>, then: Outcome) -> Self {
        Self {
            script: Mutex::new(script.into()),
            then,
            calls: AtomicU32::new(0),
            last_prompt: Mutex::new(None),
        }
    }

    /// Fails `n` times with `err`, then answers `"ok"`.
    fn fail_then_succeed(n: usize, err: ProviderError) -> Self {
        Self::new(vec![Err(err); n], Ok(GenerateContentResponse::from_text("ok")))
    }

    fn always(outcome: Outcome) -> Self {
        Self::new(Vec::new(), outcome)
    }

    fn call_count(&self) -> u32 {
        self.calls.load(Ordering::Relaxed)
    }

    fn last_prompt(&self) -> Option<String> {
        self.last_prompt.lock().unwrap().clone()
    }
}

#[async_trait]
impl GenerativeModel for ScriptedModel {
    fn model_id(&self) -> &str {
        "mock-model"
    }

    async fn generate_content(&self, prompt: &str, _config: &GenerationConfig) -> Outcome {
        self.calls.fetch_add(1, Ordering::Relaxed);
        *self.last_prompt.lock().unwrap() = Some(prompt.to_string());
        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or_else(|| self.then.clone())
    }
}

/// Never answers.
struct HangingModel {
    calls: AtomicU32,
}

#[async_trait]
impl GenerativeModel for HangingModel {
    fn model_id(&self) -> &str {
        "hanging"
    }

    async fn generate_content(&self, _prompt: &str, _config: &GenerationConfig) -> Outcome {
        self.calls.fetch_add(1, Ordering::Relaxed);
        std::future::pending().await
    }
}

fn unavailable() -> ProviderError {
    ProviderError::new("Service temporarily unavailable")
}

fn client() -> AiClient {
    AiClient::new(RetryConfig::default())
}

fn cached_client() -> AiClient {
    let cache = Arc::new(ResponseCache::in_memory(&CacheConfig::default()));
    AiClient::new(RetryConfig::default()).with_cache(cache)
}

/// Unwrap the terminal error into its attempt count and last failure.
fn service_failure(err: LecternError) -> (u32, LecternError) {
    match err {
        LecternError::AiService { attempts, source } => (attempts, *source),
        other => panic!("expected AiService, got {other:?}"),
    }
}

// ============================================================================
// Retry behaviour
// ============================================================================

#[tokio::test(start_paused = true)]
async fn transient_failures_are_retried_until_success() {
    let model = ScriptedModel::fail_then_succeed(2, unavailable());
    let started = Instant::now();

    let response = client()
        .generate(&model, &GenerateRequest::new("hi"))
        .await
        .unwrap();

    assert_eq!(response.message, "ok");
    assert!(!response.cached);
    assert_eq!(model.call_count(), 3);
    // Backoff waits of 1s then 2s.
    assert!(started.elapsed() >= Duration::from_secs(3));
    assert!(response.response_time_ms >= 3000);
}

#[tokio::test(start_paused = true)]
async fn exhausted_retries_return_service_error() {
    let model = ScriptedModel::always(Err(unavailable()));

    let err = client()
        .generate(&model, &GenerateRequest::new("hi").max_retries(2))
        .await
        .unwrap_err();

    let (attempts, last) = service_failure(err);
    assert_eq!(attempts, 2);
    assert!(matches!(last, LecternError::AiTransient(_)));
    assert_eq!(model.call_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn service_error_hides_detail_from_users() {
    let model = ScriptedModel::always(Err(ProviderError::new("internal stack trace here")));

    let err = client()
        .generate(&model, &GenerateRequest::new("hi"))
        .await
        .unwrap_err();

    let message = err.user_message();
    assert!(message.contains("temporarily unavailable"));
    assert!(!message.contains("stack trace"));
}

#[tokio::test(start_paused = true)]
async fn zero_retries_still_attempts_once() {
    let model = ScriptedModel::always(Err(unavailable()));

    let err = client()
        .generate(&model, &GenerateRequest::new("hi").max_retries(0))
        .await
        .unwrap_err();

    assert_eq!(service_failure(err).0, 1);
    assert_eq!(model.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn backoff_doubles_and_is_capped() {
    let model = ScriptedModel::always(Err(unavailable()));
    let retry = RetryConfig::new()
        .max_attempts(5)
        .initial_delay(Duration::from_secs(1))
        .max_delay(Duration::from_secs(3));
    let started = Instant::now();

    let _ = AiClient::new(retry)
        .generate(&model, &GenerateRequest::new("hi"))
        .await;

    // 1 + 2 + 3 + 3
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(9), "{elapsed:?}");
    assert!(elapsed < Duration::from_secs(10), "{elapsed:?}");
    assert_eq!(model.call_count(), 5);
}

#[tokio::test(start_paused = true)]
async fn rate_limit_status_is_retried() {
    let model = ScriptedModel::fail_then_succeed(
        1,
        ProviderError::with_status(429, "RESOURCE_EXHAUSTED: slow down"),
    );

    let response = client()
        .generate(&model, &GenerateRequest::new("hi"))
        .await
        .unwrap();
    assert_eq!(response.message, "ok");
    assert_eq!(model.call_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn unclassified_errors_retried_by_default() {
    let model = ScriptedModel::always(Err(ProviderError::new("Invalid API key")));

    let err = client()
        .generate(&model, &GenerateRequest::new("hi"))
        .await
        .unwrap_err();

    let (attempts, last) = service_failure(err);
    assert_eq!(attempts, 3);
    assert!(matches!(last, LecternError::AiProvider(_)));
}

#[tokio::test(start_paused = true)]
async fn strict_policy_stops_on_unclassified_errors() {
    let model = ScriptedModel::always(Err(ProviderError::new("Invalid API key")));
    let client = AiClient::new(RetryConfig::new().retry_unclassified(false));

    let err = client
        .generate(&model, &GenerateRequest::new("hi"))
        .await
        .unwrap_err();

    assert_eq!(service_failure(err).0, 1);
    assert_eq!(model.call_count(), 1);
}

// ============================================================================
// Blocked and empty responses
// ============================================================================

#[tokio::test(start_paused = true)]
async fn blocked_prompt_retried_by_default() {
    let model = ScriptedModel::always(Ok(GenerateContentResponse::blocked("SAFETY")));

    let err = client()
        .generate(&model, &GenerateRequest::new("hi"))
        .await
        .unwrap_err();

    let (attempts, last) = service_failure(err);
    assert_eq!(attempts, 3);
    match last {
        LecternError::AiBlocked { reason } => assert_eq!(reason, "SAFETY"),
        other => panic!("expected AiBlocked, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn blocked_prompt_not_retried_when_disabled() {
    let model = ScriptedModel::always(Ok(GenerateContentResponse::blocked("SAFETY")));
    let client = AiClient::new(RetryConfig::new().retry_blocked(false));

    let err = client
        .generate(&model, &GenerateRequest::new("hi"))
        .await
        .unwrap_err();

    assert_eq!(service_failure(err).0, 1);
    assert_eq!(model.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn empty_response_is_retried() {
    let model = ScriptedModel::new(
        vec![Ok(GenerateContentResponse::default())],
        Ok(GenerateContentResponse::from_text("second time")),
    );

    let response = client()
        .generate(&model, &GenerateRequest::new("hi"))
        .await
        .unwrap();
    assert_eq!(response.message, "second time");
    assert_eq!(model.call_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn token_usage_is_reported() {
    let body = serde_json::json!({
        "candidates": [{
            "content": {"parts": [{"text": "answer"}], "role": "model"},
            "finishReason": "STOP"
        }],
        "usageMetadata": {"promptTokenCount": 10, "candidatesTokenCount": 7, "totalTokenCount": 17}
    });
    let parsed: GenerateContentResponse = serde_json::from_value(body).unwrap();
    let model = ScriptedModel::always(Ok(parsed));

    let response = client()
        .generate(&model, &GenerateRequest::new("hi"))
        .await
        .unwrap();
    assert_eq!(response.tokens_used, Some(17));
}

// ============================================================================
// Prompt handling
// ============================================================================

#[tokio::test]
async fn empty_prompt_is_rejected_without_calling_model() {
    let model = ScriptedModel::always(Ok(GenerateContentResponse::from_text("ok")));

    for prompt in ["", "   ", "\n\t"] {
        let err = client()
            .generate(&model, &GenerateRequest::new(prompt))
            .await
            .unwrap_err();
        assert!(matches!(err, LecternError::InvalidArgument(_)));
    }
    assert_eq!(model.call_count(), 0);
}

#[tokio::test]
async fn context_is_prepended_to_prompt() {
    let model = ScriptedModel::always(Ok(GenerateContentResponse::from_text("ok")));

    client()
        .generate(
            &model,
            &GenerateRequest::new("What is the total?").context("Invoice: 40 EUR"),
        )
        .await
        .unwrap();

    assert_eq!(
        model.last_prompt().as_deref(),
        Some("Context: Invoice: 40 EUR\n\nQuestion: What is the total?")
    );
}

// ============================================================================
// Caching
// ============================================================================

#[tokio::test]
async fn cache_hit_skips_model() {
    let model = ScriptedModel::always(Ok(GenerateContentResponse::from_text("cached answer")));
    let client = cached_client();
    let request = GenerateRequest::new("What is Rust?").use_cache(true);

    let first = client.generate(&model, &request).await.unwrap();
    assert!(!first.cached);

    let second = client.generate(&model, &request).await.unwrap();
    assert!(second.cached);
    assert_eq!(second.message, "cached answer");
    assert_eq!(model.call_count(), 1);
}

#[tokio::test]
async fn cache_ignored_without_use_cache() {
    let model = ScriptedModel::always(Ok(GenerateContentResponse::from_text("fresh")));
    let client = cached_client();
    let request = GenerateRequest::new("What is Rust?");

    client.generate(&model, &request).await.unwrap();
    let second = client.generate(&model, &request).await.unwrap();
    assert!(!second.cached);
    assert_eq!(model.call_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn failures_are_not_cached() {
    let model = ScriptedModel::new(
        vec![Err(unavailable())],
        Ok(GenerateContentResponse::from_text("eventually")),
    );
    let client = AiClient::new(RetryConfig::new().max_attempts(1))
        .with_cache(Arc::new(ResponseCache::in_memory(&CacheConfig::default())));
    let request = GenerateRequest::new("q").use_cache(true);

    assert!(client.generate(&model, &request).await.is_err());
    let response = client.generate(&model, &request).await.unwrap();
    assert!(!response.cached);
    assert_eq!(response.message, "eventually");
}

// ============================================================================
// Timeouts and cancellation
// ============================================================================

#[tokio::test(start_paused = true)]
async fn hung_attempts_time_out_and_retry() {
    let model = HangingModel {
        calls: AtomicU32::new(0),
    };
    let retry = RetryConfig::new()
        .max_attempts(2)
        .request_timeout(Duration::from_secs(5));
    let started = Instant::now();

    let err = AiClient::new(retry)
        .generate(&model, &GenerateRequest::new("hi"))
        .await
        .unwrap_err();

    let (attempts, last) = service_failure(err);
    assert_eq!(attempts, 2);
    assert!(matches!(last, LecternError::AiTransient(ref m) if m.contains("timed out")));
    assert_eq!(model.calls.load(Ordering::Relaxed), 2);
    // Two timeouts and one 1s backoff.
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(11), "{elapsed:?}");
    assert!(elapsed < Duration::from_secs(12), "{elapsed:?}");
}

#[tokio::test]
async fn cancelled_before_start() {
    let model = ScriptedModel::always(Ok(GenerateContentResponse::from_text("ok")));
    let token = CancelToken::new();
    token.cancel();

    let err = client()
        .generate(&model, &GenerateRequest::new("hi").cancel_token(token))
        .await
        .unwrap_err();
    assert!(matches!(err, LecternError::Cancelled));
    assert_eq!(model.call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn cancel_interrupts_backoff() {
    let model = ScriptedModel::always(Err(unavailable()));
    let retry = RetryConfig::new().initial_delay(Duration::from_secs(30));
    let client = AiClient::new(retry);
    let token = CancelToken::new();
    let request = GenerateRequest::new("hi").cancel_token(token.clone());
    let started = Instant::now();

    let (result, ()) = tokio::join!(client.generate(&model, &request), async {
        tokio::time::sleep(Duration::from_secs(1)).await;
        token.cancel();
    });

    assert!(matches!(result, Err(LecternError::Cancelled)));
    assert_eq!(model.call_count(), 1);
    assert!(started.elapsed() < Duration::from_secs(30));
}

// ============================================================================
// Quota-gated stack
// ============================================================================

#[tokio::test(start_paused = true)]
async fn ask_is_gated_by_ai_request_quota() {
    let lectern = Lectern::builder().build().unwrap();
    let model = ScriptedModel::always(Ok(GenerateContentResponse::from_text("ok")));
    let request = GenerateRequest::new("hi");

    for _ in 0..5 {
        lectern.ask(99_i64, &model, &request).await.unwrap();
    }
    let err = lectern.ask(99_i64, &model, &request).await.unwrap_err();
    assert!(matches!(err, LecternError::QuotaExceeded { .. }));
    assert_eq!(model.call_count(), 5);

    tokio::time::advance(Duration::from_secs(61)).await;
    lectern.ask(99_i64, &model, &request).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn ask_serves_cache_hits_through_quota() {
    let lectern = Lectern::builder().build().unwrap();
    let model = ScriptedModel::always(Ok(GenerateContentResponse::from_text("ok")));
    let request = GenerateRequest::new("hi").use_cache(true);

    lectern.ask("user-1", &model, &request).await.unwrap();
    let hit = lectern.ask("user-1", &model, &request).await.unwrap();
    assert!(hit.cached);
    assert_eq!(model.call_count(), 1);

    let info = lectern
        .limiter()
        .info("user-1", lectern::Action::AiRequests, None)
        .await
        .unwrap();
    assert_eq!(info.current, 2);
}

#[tokio::test(start_paused = true)]
async fn ask_with_empty_prompt_does_not_charge_quota() {
    let lectern = Lectern::builder().build().unwrap();
    let model = ScriptedModel::always(Ok(GenerateContentResponse::from_text("ok")));

    for prompt in ["", "   ", "\n\t", "  ", " "] {
        let err = lectern
            .ask(7_i64, &model, &GenerateRequest::new(prompt))
            .await
            .unwrap_err();
        assert!(matches!(err, LecternError::InvalidArgument(_)));
    }
    assert_eq!(model.call_count(), 0);

    let answer = lectern
        .ask(7_i64, &model, &GenerateRequest::new("What is the summary?"))
        .await
        .unwrap();
    assert_eq!(answer.message, "ok");

    let info = lectern
        .limiter()
        .info(7_i64, lectern::Action::AiRequests, None)
        .await
        .unwrap();
    assert_eq!(info.current, 1);
    assert_eq!(model.call_count(), 1);
}
