//! Content-addressed response cache for AI generations.
//!
//! [`ResponseCache`] stores generation results under a key derived from
//! the normalised prompt and model id, so repeated questions skip the
//! provider entirely. Entries expire by TTL and can be bulk-cleared per
//! namespace.
//!
//! # Key derivation
//!
//! `"{namespace}:" + hex(sha256(be_u64(len(p)) + p + model))` where
//! `p = lower(trim(prompt))`. The length prefix keeps prompt and model
//! apart, so no choice of either can collide with another pair.
//! Prompts differing only in surrounding whitespace or case share a slot;
//! raw prompts are never stored as keys.
//!
//! Namespaces may not contain `:`. Clearing `ns` deletes every key under
//! `ns:`, which would otherwise include a namespace named `ns:sub`.
//!
//! # Failure handling
//!
//! The cache is an opportunistic side channel. Backend errors are logged
//! and counted, never raised: reads degrade to misses and writes report
//! `false`. Concurrent writers for the same key are last-write-wins.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::LecternError;
use crate::store::{CacheStore, MemoryCacheStore};
use crate::telemetry;

/// Model id used when the caller doesn't name one.
pub const DEFAULT_MODEL: &str = "default";

/// Configuration for the response cache.
///
/// ```rust
/// # use lectern::CacheConfig;
/// # use std::time::Duration;
/// let config = CacheConfig::new()
///     .namespace("answers")
///     .ttl(Duration::from_secs(600));
/// ```
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Whether reads and writes reach the store at all. Default: true.
    pub enabled: bool,
    /// Key prefix isolating this cache in a shared store. Must be non-empty
    /// and free of `:`. Default: `ai_response`.
    pub namespace: String,
    /// Default time-to-live for entries. Default: 1 hour.
    pub ttl: Duration,
    /// Capacity of the in-memory store built by [`ResponseCache::in_memory`].
    /// Default: 10,000.
    pub max_entries: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            namespace: "ai_response".to_string(),
            ttl: Duration::from_secs(3600),
            max_entries: 10_000,
        }
    }
}

impl CacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn max_entries(mut self, n: u64) -> Self {
        self.max_entries = n;
        self
    }

    /// Reject namespaces that are empty or contain the `:` key separator.
    pub fn validate(&self) -> crate::Result<()> {
        if self.namespace.is_empty() {
            return Err(LecternError::Configuration(
                "cache namespace must not be empty".to_string(),
            ));
        }
        if self.namespace.contains(':') {
            return Err(LecternError::Configuration(format!(
                "cache namespace {:?} must not contain ':'",
                self.namespace
            )));
        }
        Ok(())
    }
}

/// A value served from the cache.
///
/// Returned only on hits; receiving one is the marker that the value did
/// not come from the provider.
#[derive(Debug, Clone, PartialEq)]
pub struct Cached<T> {
    pub value: T,
    /// Unix timestamp (seconds) of the write.
    pub cached_at: u64,
}

/// Introspection snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub enabled: bool,
    pub total_keys: u64,
    pub total_size_bytes: u64,
    pub namespace: String,
}

#[derive(Serialize, Deserialize)]
struct Envelope<T> {
    payload: T,
    cached_at: u64,
}

/// Namespaced, TTL-bound cache of generation results.
pub struct ResponseCache {
    store: Arc<dyn CacheStore>,
    namespace: String,
    ttl: Duration,
    enabled: bool,
}

impl ResponseCache {
    /// Cache over a shared store.
    pub fn new(store: Arc<dyn CacheStore>, config: &CacheConfig) -> Self {
        Self {
            store,
            namespace: config.namespace.clone(),
            ttl: config.ttl,
            enabled: config.enabled,
        }
    }

    /// Cache over a fresh process-local store.
    pub fn in_memory(config: &CacheConfig) -> Self {
        Self::new(
            Arc::new(MemoryCacheStore::with_max_entries(config.max_entries)),
            config,
        )
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Look up a cached value. Misses, disabled caches, backend failures
    /// and undecodable entries all return `None`.
    pub async fn get<T: DeserializeOwned>(&self, prompt: &str, model: &str) -> Option<Cached<T>> {
        if !self.enabled {
            return None;
        }
        let key = cache_key(&self.namespace, prompt, model);
        let raw = match self.store.get(&key).await {
            Ok(raw) => raw,
            Err(e) => {
                self.backend_failure("get", &e);
                return None;
            }
        };

        let Some(raw) = raw else {
            debug!(namespace = %self.namespace, model, "cache miss");
            metrics::counter!(telemetry::CACHE_MISSES_TOTAL, "namespace" => self.namespace.clone())
                .increment(1);
            return None;
        };

        match serde_json::from_str::<Envelope<T>>(&raw) {
            Ok(envelope) => {
                debug!(namespace = %self.namespace, model, "cache hit");
                metrics::counter!(telemetry::CACHE_HITS_TOTAL, "namespace" => self.namespace.clone())
                    .increment(1);
                Some(Cached {
                    value: envelope.payload,
                    cached_at: envelope.cached_at,
                })
            }
            Err(e) => {
                self.backend_failure("decode", &LecternError::Json(e));
                None
            }
        }
    }

    /// Store a value. `ttl = None` uses the namespace default. Returns
    /// whether the write succeeded.
    pub async fn set<T: Serialize>(
        &self,
        prompt: &str,
        value: &T,
        model: &str,
        ttl: Option<Duration>,
    ) -> bool {
        if !self.enabled {
            return false;
        }
        let envelope = Envelope {
            payload: value,
            cached_at: unix_now(),
        };
        let raw = match serde_json::to_string(&envelope) {
            Ok(raw) => raw,
            Err(e) => {
                self.backend_failure("encode", &LecternError::Json(e));
                return false;
            }
        };
        let key = cache_key(&self.namespace, prompt, model);
        match self.store.set(&key, raw, ttl.unwrap_or(self.ttl)).await {
            Ok(()) => true,
            Err(e) => {
                self.backend_failure("set", &e);
                false
            }
        }
    }

    /// Invalidate one entry. Returns whether it existed.
    pub async fn delete(&self, prompt: &str, model: &str) -> bool {
        if !self.enabled {
            return false;
        }
        let key = cache_key(&self.namespace, prompt, model);
        match self.store.delete(&key).await {
            Ok(existed) => existed,
            Err(e) => {
                self.backend_failure("delete", &e);
                false
            }
        }
    }

    /// Delete every entry in this namespace. Returns the number removed.
    pub async fn clear_namespace(&self) -> u64 {
        if !self.enabled {
            return 0;
        }
        match self.store.delete_prefix(&self.prefix()).await {
            Ok(n) => n,
            Err(e) => {
                self.backend_failure("clear", &e);
                0
            }
        }
    }

    pub async fn stats(&self) -> CacheStats {
        let (total_keys, total_size_bytes) = if self.enabled {
            self.store.usage(&self.prefix()).await.unwrap_or_else(|e| {
                self.backend_failure("stats", &e);
                (0, 0)
            })
        } else {
            (0, 0)
        };
        CacheStats {
            enabled: self.enabled,
            total_keys,
            total_size_bytes,
            namespace: self.namespace.clone(),
        }
    }

    fn prefix(&self) -> String {
        format!("{}:", self.namespace)
    }

    fn backend_failure(&self, operation: &'static str, err: &LecternError) {
        warn!(
            namespace = %self.namespace,
            store = self.store.name(),
            operation,
            error = %err,
            "response cache unavailable, continuing without it"
        );
        metrics::counter!(telemetry::CACHE_ERRORS_TOTAL,
            "namespace" => self.namespace.clone(),
            "operation" => operation,
        )
        .increment(1);
    }
}

/// Derive the store key for a prompt and model.
pub fn cache_key(namespace: &str, prompt: &str, model: &str) -> String {
    let normalized = prompt.trim().to_lowercase();
    let mut hasher = Sha256::new();
    hasher.update((normalized.len() as u64).to_be_bytes());
    hasher.update(normalized.as_bytes());
    hasher.update(model.as_bytes());
    format!("{namespace}:{}", hex::encode(hasher.finalize()))
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
