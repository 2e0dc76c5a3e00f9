//! Process-local store implementations.
//!
//! Useful for single-process deployments and tests. Limits and caches are
//! only shared within one process; multi-instance deployments need a
//! networked backend behind the same traits.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use moka::Expiry;
use moka::future::Cache;
use tokio::time::Instant;

use super::{Admission, CacheStore, KeyTtl, QuotaStore};
use crate::Result;

/// Default maximum number of entries held by [`MemoryCacheStore`].
pub const DEFAULT_MAX_ENTRIES: u64 = 10_000;

/// Minimum interval between sweeps of expired quota counters.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

// ============================================================================
// Quota counters
// ============================================================================

#[derive(Debug, Clone, Copy)]
struct Counter {
    count: u64,
    expires_at: Option<Instant>,
}

impl Counter {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }

    fn ttl(&self, now: Instant) -> KeyTtl {
        match self.expires_at {
            Some(at) => KeyTtl::Expires(at.saturating_duration_since(now)),
            None => KeyTtl::Persistent,
        }
    }
}

#[derive(Debug)]
struct Counters {
    map: HashMap<String, Counter>,
    last_sweep: Instant,
}

impl Default for Counters {
    fn default() -> Self {
        Self {
            map: HashMap::new(),
            last_sweep: Instant::now(),
        }
    }
}

impl Counters {
    /// Drop every expired counter, at most once per [`SWEEP_INTERVAL`].
    fn sweep(&mut self, now: Instant) {
        if now.saturating_duration_since(self.last_sweep) < SWEEP_INTERVAL {
            return;
        }
        let before = self.map.len();
        self.map.retain(|_, c| c.is_live(now));
        self.last_sweep = now;
        let swept = before - self.map.len();
        if swept > 0 {
            tracing::trace!(swept, remaining = self.map.len(), "swept expired quota counters");
        }
    }
}

/// In-memory fixed-window counters.
///
/// Admission happens under a single mutex, so the check and the increment
/// are atomic. Uses `tokio::time::Instant` so windows follow a paused
/// test clock. Expired counters are dropped when their key is next touched,
/// and `acquire` periodically sweeps the rest.
#[derive(Debug, Default)]
pub struct MemoryQuotaStore {
    counters: Mutex<Counters>,
}

impl MemoryQuotaStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a counter directly. `expiry = None` stores a counter without an
    /// expiry, the state the limiter self-heals from.
    pub fn set_counter(&self, key: &str, count: u64, expiry: Option<Duration>) {
        let expires_at = expiry.map(|d| Instant::now() + d);
        self.lock()
            .map
            .insert(key.to_string(), Counter { count, expires_at });
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Counters> {
        self.counters.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Live counter for `key`, pruning it if its window has elapsed.
    fn live(map: &mut HashMap<String, Counter>, key: &str, now: Instant) -> Option<Counter> {
        match map.get(key) {
            Some(c) if c.is_live(now) => Some(*c),
            Some(_) => {
                map.remove(key);
                None
            }
            None => None,
        }
    }
}

#[async_trait]
impl QuotaStore for MemoryQuotaStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn acquire(&self, key: &str, limit: u64, window: Duration) -> Result<Admission> {
        let now = Instant::now();
        let mut counters = self.lock();
        counters.sweep(now);
        let map = &mut counters.map;
        match Self::live(map, key, now) {
            None => {
                map.insert(
                    key.to_string(),
                    Counter {
                        count: 1,
                        expires_at: Some(now + window),
                    },
                );
                Ok(Admission::Admitted { count: 1 })
            }
            Some(c) if c.count < limit => {
                let count = c.count + 1;
                map.insert(key.to_string(), Counter { count, ..c });
                Ok(Admission::Admitted { count })
            }
            Some(c) => Ok(Admission::Rejected {
                count: c.count,
                ttl: c.ttl(now),
            }),
        }
    }

    async fn count(&self, key: &str) -> Result<Option<u64>> {
        let mut counters = self.lock();
        Ok(Self::live(&mut counters.map, key, Instant::now()).map(|c| c.count))
    }

    async fn ttl(&self, key: &str) -> Result<KeyTtl> {
        let now = Instant::now();
        let mut counters = self.lock();
        Ok(Self::live(&mut counters.map, key, now).map_or(KeyTtl::Missing, |c| c.ttl(now)))
    }

    async fn restart_window(&self, key: &str, window: Duration) -> Result<()> {
        self.set_counter(key, 1, Some(window));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let now = Instant::now();
        let mut counters = self.lock();
        Ok(counters.map.remove(key).is_some_and(|c| c.is_live(now)))
    }
}

// ============================================================================
// Cached values
// ============================================================================

#[derive(Debug, Clone)]
struct StoredValue {
    value: String,
    ttl: Duration,
}

/// Expiry policy reading the TTL stored alongside each value.
struct PerEntryTtl;

impl Expiry<String, StoredValue> for PerEntryTtl {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &StoredValue,
        _created_at: std::time::Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &StoredValue,
        _updated_at: std::time::Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// In-memory cache store backed by moka.
///
/// Bounded LRU with per-entry TTL. Thread-safe; moka handles concurrent
/// access internally.
pub struct MemoryCacheStore {
    cache: Cache<String, StoredValue>,
}

impl MemoryCacheStore {
    /// Create a store with the default capacity (10,000 entries).
    pub fn new() -> Self {
        Self::with_max_entries(DEFAULT_MAX_ENTRIES)
    }

    /// Create a store with a custom capacity.
    pub fn with_max_entries(max: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(max)
            .expire_after(PerEntryTtl)
            .build();
        Self { cache }
    }
}

impl Default for MemoryCacheStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.cache.get(key).await.map(|v| v.value))
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<()> {
        self.cache
            .insert(key.to_string(), StoredValue { value, ttl })
            .await;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.cache.remove(key).await.is_some())
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<u64> {
        let keys: Vec<String> = self
            .cache
            .iter()
            .filter(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.as_ref().clone())
            .collect();
        let mut removed = 0;
        for key in keys {
            if self.cache.remove(&key).await.is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn usage(&self, prefix: &str) -> Result<(u64, u64)> {
        Ok(self
            .cache
            .iter()
            .filter(|(k, _)| k.starts_with(prefix))
            .fold((0, 0), |(keys, bytes), (_, v)| {
                (keys + 1, bytes + v.value.len() as u64)
            }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_secs(60);

    #[tokio::test(start_paused = true)]
    async fn acquire_creates_then_increments() {
        let store = MemoryQuotaStore::new();
        assert_eq!(
            store.acquire("k", 2, WINDOW).await.unwrap(),
            Admission::Admitted { count: 1 }
        );
        assert_eq!(
            store.acquire("k", 2, WINDOW).await.unwrap(),
            Admission::Admitted { count: 2 }
        );
        assert_eq!(
            store.acquire("k", 2, WINDOW).await.unwrap(),
            Admission::Rejected {
                count: 2,
                ttl: KeyTtl::Expires(WINDOW)
            }
        );
        // Rejection does not increment
        assert_eq!(store.count("k").await.unwrap(), Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn increment_keeps_original_expiry() {
        let store = MemoryQuotaStore::new();
        store.acquire("k", 5, WINDOW).await.unwrap();
        tokio::time::advance(Duration::from_secs(20)).await;
        store.acquire("k", 5, WINDOW).await.unwrap();
        assert_eq!(
            store.ttl("k").await.unwrap(),
            KeyTtl::Expires(Duration::from_secs(40))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn window_expiry_clears_counter() {
        let store = MemoryQuotaStore::new();
        store.acquire("k", 1, WINDOW).await.unwrap();
        tokio::time::advance(WINDOW + Duration::from_secs(1)).await;
        assert_eq!(store.count("k").await.unwrap(), None);
        assert_eq!(store.ttl("k").await.unwrap(), KeyTtl::Missing);
        assert_eq!(
            store.acquire("k", 1, WINDOW).await.unwrap(),
            Admission::Admitted { count: 1 }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn acquire_sweeps_expired_counters() {
        let store = MemoryQuotaStore::new();
        for i in 0..10_000 {
            store.acquire(&format!("user:{i}"), 5, WINDOW).await.unwrap();
        }
        assert_eq!(store.lock().map.len(), 10_000);

        tokio::time::advance(Duration::from_secs(3600)).await;
        store.acquire("newcomer", 5, WINDOW).await.unwrap();

        let counters = store.lock();
        assert_eq!(counters.map.len(), 1);
        assert!(counters.map.contains_key("newcomer"));
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_keeps_live_and_persistent_counters() {
        let store = MemoryQuotaStore::new();
        store.acquire("short", 5, WINDOW).await.unwrap();
        store.acquire("long", 5, Duration::from_secs(3600)).await.unwrap();
        store.set_counter("stuck", 2, None);

        tokio::time::advance(SWEEP_INTERVAL + Duration::from_secs(1)).await;
        store.acquire("other", 5, WINDOW).await.unwrap();

        let counters = store.lock();
        assert!(!counters.map.contains_key("short"));
        assert!(counters.map.contains_key("long"));
        assert!(counters.map.contains_key("stuck"));
        assert_eq!(counters.map.len(), 3);
    }

    #[tokio::test]
    async fn persistent_counter_reports_persistent_ttl() {
        let store = MemoryQuotaStore::new();
        store.set_counter("k", 3, None);
        assert_eq!(store.ttl("k").await.unwrap(), KeyTtl::Persistent);
        assert!(matches!(
            store.acquire("k", 3, WINDOW).await.unwrap(),
            Admission::Rejected {
                ttl: KeyTtl::Persistent,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn delete_reports_existence() {
        let store = MemoryQuotaStore::new();
        assert!(!store.delete("k").await.unwrap());
        store.acquire("k", 1, WINDOW).await.unwrap();
        assert!(store.delete("k").await.unwrap());
        assert_eq!(store.count("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn cache_store_prefix_operations() {
        let store = MemoryCacheStore::new();
        store.set("a:1", "xx".into(), WINDOW).await.unwrap();
        store.set("a:2", "yyy".into(), WINDOW).await.unwrap();
        store.set("b:1", "z".into(), WINDOW).await.unwrap();

        assert_eq!(store.usage("a:").await.unwrap(), (2, 5));
        assert_eq!(store.delete_prefix("a:").await.unwrap(), 2);
        assert_eq!(store.usage("a:").await.unwrap(), (0, 0));
        assert_eq!(store.get("b:1").await.unwrap().as_deref(), Some("z"));
    }

    #[tokio::test]
    async fn cache_store_entry_expires() {
        let store = MemoryCacheStore::new();
        store
            .set("k", "v".into(), Duration::from_millis(50))
            .await
            .unwrap();
        assert!(store.get("k").await.unwrap().is_some());
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(store.get("k").await.unwrap().is_none());
    }
}
