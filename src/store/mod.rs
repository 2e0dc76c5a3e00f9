//! Shared key-value store seams.
//!
//! Quota counters and cached responses live in a TTL-capable store that
//! every process instance can reach, so limits and caches are global
//! rather than per-process. Two traits describe what each consumer
//! needs from that store:
//!
//! - [`QuotaStore`]: fixed-window counters with an atomic
//!   admit-or-reject primitive.
//! - [`CacheStore`]: opaque string values with per-entry TTL and
//!   prefix-scoped bulk operations.
//!
//! Handles are created once at startup and passed into
//! [`QuotaLimiter`](crate::QuotaLimiter) and
//! [`ResponseCache`](crate::ResponseCache) as `Arc<dyn _>`. The
//! [`memory`] module ships process-local implementations; a networked
//! backend (e.g. redis with a Lua admission script) implements the same
//! traits.

pub mod memory;

pub use memory::{MemoryCacheStore, MemoryQuotaStore};

use std::time::Duration;

use async_trait::async_trait;

use crate::Result;

/// Remaining lifetime of a stored key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyTtl {
    /// The key does not exist (or has already expired).
    Missing,
    /// The key exists but carries no expiry. For quota counters this is
    /// an inconsistent state that the limiter repairs.
    Persistent,
    /// The key expires after this duration.
    Expires(Duration),
}

/// Outcome of a single [`QuotaStore::acquire`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The counter was created or incremented; `count` is the new value.
    Admitted { count: u64 },
    /// The counter is at or above the limit and was left untouched.
    Rejected { count: u64, ttl: KeyTtl },
}

/// Fixed-window counter storage for the quota limiter.
///
/// Implementations must make [`acquire`](Self::acquire) atomic per key:
/// concurrent callers for the same key never both observe `count < limit`
/// for the last free slot.
#[async_trait]
pub trait QuotaStore: Send + Sync {
    /// Backend name for logging.
    fn name(&self) -> &str;

    /// Admit one request against `key`.
    ///
    /// Missing key: create it with count 1 and expiry `window`.
    /// Existing key below `limit`: increment, keep the original expiry.
    /// Otherwise: reject without incrementing and report the key's TTL.
    async fn acquire(&self, key: &str, limit: u64, window: Duration) -> Result<Admission>;

    /// Current count, or `None` when no window is open.
    async fn count(&self, key: &str) -> Result<Option<u64>>;

    /// Remaining lifetime of the counter.
    async fn ttl(&self, key: &str) -> Result<KeyTtl>;

    /// Replace the counter with a fresh window holding one request.
    async fn restart_window(&self, key: &str, window: Duration) -> Result<()>;

    /// Delete the counter. Returns whether it existed.
    async fn delete(&self, key: &str) -> Result<bool>;
}

/// Key/value storage for the response cache.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Backend name for logging.
    fn name(&self) -> &str;

    /// Look up a value.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store a value that expires after `ttl`. Overwrites silently.
    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<()>;

    /// Delete a value. Returns whether it existed.
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Delete every key starting with `prefix`. Returns the number removed.
    async fn delete_prefix(&self, prefix: &str) -> Result<u64>;

    /// Number of live keys under `prefix` and the summed byte size of
    /// their values.
    async fn usage(&self, prefix: &str) -> Result<(u64, u64)>;
}
