//! Caching subsystem.
//!
//! [`response::ResponseCache`] is the only cache: generation results keyed
//! by normalised prompt and model. It sits in front of the provider inside
//! [`AiClient`](crate::AiClient); a hit bypasses retry logic and the
//! provider call entirely.

pub mod response;

pub use response::{
    CacheConfig, CacheStats, Cached, DEFAULT_MODEL, ResponseCache, cache_key,
};
