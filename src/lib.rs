//! Lectern - quota, response caching and retries for document Q&A over LLMs
//!
//! This crate sits between request handlers (a chat bot, a REST API) and a
//! generative model. It provides:
//!
//! - [`QuotaLimiter`]: fixed-window per-subject, per-action quotas with
//!   free, premium, and admin tiers.
//! - [`ResponseCache`]: answers keyed by a hash of the normalised prompt
//!   and model, with a per-entry TTL.
//! - [`AiClient`]: bounded retries with exponential backoff, per-attempt
//!   timeouts, and failure classification.
//!
//! Storage sits behind the [`QuotaStore`] and [`CacheStore`] traits; the
//! in-memory implementations are used unless a shared backend is supplied.
//!
//! # Example
//!
//! ```rust,no_run
//! use lectern::{GeminiModel, GenerateRequest, Lectern, truncate_context};
//!
//! #[tokio::main]
//! async fn main() -> lectern::Result<()> {
//!     let lectern = Lectern::builder().build()?;
//!     let model = GeminiModel::new("AIza-your-key", "gemini-2.0-flash")?;
//!
//!     let document = std::fs::read_to_string("report.txt").unwrap_or_default();
//!     let request = GenerateRequest::new("What is the main finding?")
//!         .context(truncate_context(&document, None, 30_000))
//!         .use_cache(true);
//!
//!     match lectern.ask(42_i64, &model, &request).await {
//!         Ok(answer) => println!("{}", answer.message),
//!         Err(e) => println!("{}", e.user_message()),
//!     }
//!     Ok(())
//! }
//! ```

pub mod builder;
pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod providers;
pub mod quota;
pub mod store;
pub mod telemetry;
pub mod text;

// Re-export main types at crate root
pub use builder::{Lectern, LecternBuilder};
pub use cache::{CacheConfig, CacheStats, Cached, ResponseCache, cache_key};
pub use client::{AiClient, AiResponse, CancelToken, GenerateRequest};
pub use config::{Config, Secrets};
pub use error::{LecternError, Result};
pub use providers::{
    GeminiModel, GenerateContentResponse, GenerationConfig, GenerativeModel, ProviderError,
    RetryConfig, safe_get_text,
};
pub use quota::{
    Action, Limit, QuotaInfo, QuotaLimiter, StaticTierResolver, StoreFailurePolicy, SubjectId,
    Tier, TierResolver, TierTable,
};
pub use store::{CacheStore, MemoryCacheStore, MemoryQuotaStore, QuotaStore};
pub use text::truncate_context;
