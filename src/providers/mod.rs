//! Provider layer: the generation seam, the Gemini client, and retry
//! policy.

pub mod gemini;
pub mod response;
pub mod retry;
pub mod traits;

pub use gemini::{DEFAULT_GEMINI_MODEL, GeminiModel};
pub use response::{
    Candidate, Content, GenerateContentResponse, Part, PromptFeedback, UsageMetadata,
    safe_get_text,
};
pub use retry::{RetryConfig, classify};
pub use traits::{GenerationConfig, GenerativeModel, ProviderError};
