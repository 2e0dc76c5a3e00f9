//! Gemini `generateContent` REST client.
//!
//! See: <https://ai.google.dev/api/generate-content>

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::response::GenerateContentResponse;
use super::traits::{GenerationConfig, GenerativeModel, ProviderError};
use crate::{LecternError, Result};

/// Default base URL for the Gemini API
const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Model used when none is configured.
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash";

/// One Gemini model reachable with an API key.
#[derive(Clone)]
pub struct GeminiModel {
    api_key: String,
    model: String,
    http: Client,
    base_url: String,
}

impl GeminiModel {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self> {
        Self::with_base_url(api_key, model, DEFAULT_BASE_URL)
    }

    /// Create a client with a custom base URL (for testing with wiremock).
    pub fn with_base_url(
        api_key: impl Into<String>,
        model: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Result<Self> {
        // Outer bound only; per-attempt timeouts are applied by the caller.
        let http = Client::builder()
            .timeout(Duration::from_secs(300))
            .build()
            .map_err(|e| LecternError::Http(e.to_string()))?;

        Ok(Self {
            api_key: api_key.into(),
            model: model.into(),
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    async fn call(
        &self,
        prompt: &str,
        config: &GenerationConfig,
    ) -> std::result::Result<GenerateContentResponse, ProviderError> {
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let body = GenerateContentRequest {
            contents: [RequestContent {
                role: "user",
                parts: [RequestPart { text: prompt }],
            }],
            generation_config: (!config.is_empty()).then_some(config),
        };

        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(api_error(status.as_u16(), &body));
        }

        response
            .json()
            .await
            .map_err(|e| ProviderError::new(format!("invalid response body: {e}")))
    }
}

#[async_trait]
impl GenerativeModel for GeminiModel {
    fn model_id(&self) -> &str {
        &self.model
    }

    async fn generate_content(
        &self,
        prompt: &str,
        config: &GenerationConfig,
    ) -> std::result::Result<GenerateContentResponse, ProviderError> {
        self.call(prompt, config).await
    }
}

fn transport_error(err: reqwest::Error) -> ProviderError {
    if err.is_timeout() {
        ProviderError::new(format!("request timed out: {err}"))
    } else if err.is_connect() {
        ProviderError::new(format!("connection error: {err}"))
    } else {
        ProviderError::new(format!("network error: {err}"))
    }
}

/// Map an error response to a provider error, preferring the API's own
/// `{"error": {"status", "message"}}` body.
fn api_error(status: u16, body: &str) -> ProviderError {
    let message = serde_json::from_str::<ErrorEnvelope>(body)
        .ok()
        .map(|e| match e.error.status {
            Some(s) => format!("{s}: {}", e.error.message),
            None => e.error.message,
        })
        .unwrap_or_else(|| format!("Gemini API error: {}", body.trim()));
    ProviderError::with_status(status, message)
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: [RequestContent<'a>; 1],
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<&'a GenerationConfig>,
}

#[derive(Serialize)]
struct RequestContent<'a> {
    role: &'static str,
    parts: [RequestPart<'a>; 1],
}

#[derive(Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: Option<String>,
}
