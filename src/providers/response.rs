//! Generate-content response shape and safe text extraction.
//!
//! Mirrors the Gemini `generateContent` response. Blocked prompts come
//! back without candidates (and a `promptFeedback.blockReason`), blocked
//! answers come back with a safety finish reason and no text, so reading
//! the text is fallible: [`GenerateContentResponse::text`] errors in those
//! cases and [`safe_get_text`] turns every such case into `""`.

use serde::Deserialize;

use super::traits::ProviderError;

/// Finish reasons that mean the answer was withheld by a filter.
const BLOCKING_FINISH_REASONS: &[&str] = &[
    "SAFETY",
    "RECITATION",
    "BLOCKLIST",
    "PROHIBITED_CONTENT",
    "SPII",
];

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    #[serde(default)]
    pub prompt_feedback: Option<PromptFeedback>,
    #[serde(default)]
    pub usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    #[serde(default)]
    pub content: Option<Content>,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Content {
    #[serde(default)]
    pub parts: Vec<Part>,
    #[serde(default)]
    pub role: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Part {
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptFeedback {
    #[serde(default)]
    pub block_reason: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageMetadata {
    #[serde(default)]
    pub prompt_token_count: Option<u64>,
    #[serde(default)]
    pub candidates_token_count: Option<u64>,
    #[serde(default)]
    pub total_token_count: Option<u64>,
}

impl GenerateContentResponse {
    /// Response carrying a single text part.
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            candidates: vec![Candidate {
                content: Some(Content {
                    parts: vec![Part {
                        text: Some(text.into()),
                    }],
                    role: Some("model".to_string()),
                }),
                finish_reason: Some("STOP".to_string()),
            }],
            ..Self::default()
        }
    }

    /// Response for a prompt rejected by the safety filter.
    pub fn blocked(reason: impl Into<String>) -> Self {
        Self {
            prompt_feedback: Some(PromptFeedback {
                block_reason: Some(reason.into()),
            }),
            ..Self::default()
        }
    }

    /// Concatenated text of the first candidate.
    ///
    /// Errors when there is no candidate, the candidate has no content,
    /// or none of its parts carry text.
    pub fn text(&self) -> std::result::Result<String, ProviderError> {
        let candidate = self.candidates.first().ok_or_else(|| match self.block_reason() {
            Some(reason) => ProviderError::new(format!("response has no candidates, blocked: {reason}")),
            None => ProviderError::new("response has no candidates"),
        })?;
        let content = candidate.content.as_ref().ok_or_else(|| {
            ProviderError::new(format!(
                "candidate has no content (finish reason: {})",
                candidate.finish_reason.as_deref().unwrap_or("unknown")
            ))
        })?;
        let mut parts = content.parts.iter().filter_map(|p| p.text.as_deref()).peekable();
        if parts.peek().is_none() {
            return Err(ProviderError::new("candidate has no text parts"));
        }
        Ok(parts.collect())
    }

    /// Why the prompt or answer was blocked, if it was.
    pub fn block_reason(&self) -> Option<&str> {
        if let Some(reason) = self
            .prompt_feedback
            .as_ref()
            .and_then(|f| f.block_reason.as_deref())
        {
            return Some(reason);
        }
        self.candidates
            .first()
            .and_then(|c| c.finish_reason.as_deref())
            .filter(|r| BLOCKING_FINISH_REASONS.contains(r))
    }

    pub fn tokens_used(&self) -> Option<u64> {
        self.usage_metadata.as_ref().and_then(|u| u.total_token_count)
    }
}

/// Text of a response, or `""` when there is none. Never fails.
pub fn safe_get_text(response: Option<&GenerateContentResponse>) -> String {
    response.and_then(|r| r.text().ok()).unwrap_or_default()
}
