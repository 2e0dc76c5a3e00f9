//! Provider seam for text generation.
//!
//! A [`GenerativeModel`] is one model on one provider. It reports failures
//! as [`ProviderError`], the provider-native shape: an optional HTTP
//! status plus the provider's message. [`AiClient`](crate::AiClient)
//! reclassifies these into [`LecternError`](crate::LecternError) variants,
//! so callers never see provider errors directly.

use std::fmt;

use async_trait::async_trait;
use serde::Serialize;

use super::response::GenerateContentResponse;

/// Sampling parameters forwarded to the provider.
///
/// Every field is optional; unset fields are omitted from the request so
/// the provider default applies.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub stop_sequences: Vec<String>,
}

impl GenerationConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.temperature = Some(t);
        self
    }

    pub fn max_output_tokens(mut self, n: u32) -> Self {
        self.max_output_tokens = Some(n);
        self
    }

    pub fn top_p(mut self, p: f32) -> Self {
        self.top_p = Some(p);
        self
    }

    pub fn top_k(mut self, k: u32) -> Self {
        self.top_k = Some(k);
        self
    }

    pub fn stop_sequence(mut self, s: impl Into<String>) -> Self {
        self.stop_sequences.push(s.into());
        self
    }

    /// Whether every field is unset.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Failure reported by a provider call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderError {
    /// HTTP status, when the failure came from a response.
    pub status: Option<u16>,
    pub message: String,
}

impl ProviderError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            status: None,
            message: message.into(),
        }
    }

    pub fn with_status(status: u16, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            message: message.into(),
        }
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "{status} {}", self.message),
            None => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for ProviderError {}

/// A single text-generation model.
#[async_trait]
pub trait GenerativeModel: Send + Sync {
    /// Model identifier; also part of the response cache key.
    fn model_id(&self) -> &str;

    /// Run one generation. No retries; the caller owns that.
    async fn generate_content(
        &self,
        prompt: &str,
        config: &GenerationConfig,
    ) -> std::result::Result<GenerateContentResponse, ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_serializes_to_empty_object() {
        let json = serde_json::to_value(GenerationConfig::new()).unwrap();
        assert_eq!(json, serde_json::json!({}));
        assert!(GenerationConfig::new().is_empty());
    }

    #[test]
    fn config_uses_camel_case() {
        let config = GenerationConfig::new()
            .temperature(0.2)
            .max_output_tokens(256)
            .stop_sequence("END");
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["maxOutputTokens"], 256);
        assert_eq!(json["stopSequences"][0], "END");
        assert!(json.get("topK").is_none());
        assert!(!config.is_empty());
    }

    #[test]
    fn provider_error_display_includes_status() {
        assert_eq!(
            ProviderError::with_status(429, "slow down").to_string(),
            "429 slow down"
        );
        assert_eq!(ProviderError::new("boom").to_string(), "boom");
    }
}
