//! Builder for assembling the quota, cache, and client stack.

use std::sync::Arc;

use crate::cache::{CacheConfig, ResponseCache};
use crate::client::{AiClient, AiResponse, GenerateRequest};
use crate::config::Config;
use crate::providers::{GenerativeModel, RetryConfig};
use crate::quota::{Action, QuotaLimiter, StoreFailurePolicy, SubjectId, TierResolver, TierTable};
use crate::store::{CacheStore, MemoryCacheStore, MemoryQuotaStore, QuotaStore};
use crate::{LecternError, Result};

/// The assembled stack: one limiter, one cache, one client.
pub struct Lectern {
    limiter: Arc<QuotaLimiter>,
    cache: Arc<ResponseCache>,
    client: AiClient,
}

impl Lectern {
    /// Create a new builder for configuring the stack.
    pub fn builder() -> LecternBuilder {
        LecternBuilder::new()
    }

    pub fn limiter(&self) -> &Arc<QuotaLimiter> {
        &self.limiter
    }

    pub fn cache(&self) -> &Arc<ResponseCache> {
        &self.cache
    }

    pub fn client(&self) -> &AiClient {
        &self.client
    }

    /// Answer a question for `subject`, counted against its
    /// `ai_requests` quota.
    ///
    /// A rejected subject never reaches the model. An empty prompt is
    /// refused before the quota is charged.
    pub async fn ask(
        &self,
        subject: impl Into<SubjectId>,
        model: &dyn GenerativeModel,
        request: &GenerateRequest,
    ) -> Result<AiResponse> {
        if request.prompt.trim().is_empty() {
            return Err(LecternError::InvalidArgument(
                "prompt must not be empty".to_string(),
            ));
        }
        self.limiter
            .gate(subject, Action::AiRequests, self.client.generate(model, request))
            .await
    }
}

/// Builder for [`Lectern`].
pub struct LecternBuilder {
    quota_store: Option<Arc<dyn QuotaStore>>,
    cache_store: Option<Arc<dyn CacheStore>>,
    tiers: TierTable,
    resolver: Option<Arc<dyn TierResolver>>,
    failure_policy: StoreFailurePolicy,
    cache_config: CacheConfig,
    retry: RetryConfig,
}

impl Default for LecternBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl LecternBuilder {
    pub fn new() -> Self {
        Self {
            quota_store: None,
            cache_store: None,
            tiers: TierTable::default(),
            resolver: None,
            failure_policy: StoreFailurePolicy::default(),
            cache_config: CacheConfig::default(),
            retry: RetryConfig::default(),
        }
    }

    /// Backend for quota counters (default: in-memory).
    pub fn quota_store(mut self, store: Arc<dyn QuotaStore>) -> Self {
        self.quota_store = Some(store);
        self
    }

    /// Backend for cached responses (default: in-memory, sized by the
    /// cache config).
    pub fn cache_store(mut self, store: Arc<dyn CacheStore>) -> Self {
        self.cache_store = Some(store);
        self
    }

    pub fn tiers(mut self, tiers: TierTable) -> Self {
        self.tiers = tiers;
        self
    }

    pub fn tier_resolver(mut self, resolver: Arc<dyn TierResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn failure_policy(mut self, policy: StoreFailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    pub fn cache_config(mut self, config: CacheConfig) -> Self {
        self.cache_config = config;
        self
    }

    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Take tiers, failure policy, cache and retry settings from a loaded
    /// [`Config`]. Tier overrides are validated here.
    pub fn apply_config(mut self, config: &Config) -> Result<Self> {
        self.tiers = config.tier_table()?;
        self.failure_policy = config.quota.failure_policy;
        self.cache_config = config.cache_config();
        self.retry = config.retry_config();
        Ok(self)
    }

    /// Build the stack.
    pub fn build(self) -> Result<Lectern> {
        self.tiers.validate()?;
        self.cache_config.validate()?;

        let quota_store = self
            .quota_store
            .unwrap_or_else(|| Arc::new(MemoryQuotaStore::new()));
        let mut limiter = QuotaLimiter::new(quota_store)
            .with_tiers(self.tiers)
            .with_failure_policy(self.failure_policy);
        if let Some(resolver) = self.resolver {
            limiter = limiter.with_resolver(resolver);
        }

        let cache_store = self.cache_store.unwrap_or_else(|| {
            Arc::new(MemoryCacheStore::with_max_entries(
                self.cache_config.max_entries,
            ))
        });
        let cache = Arc::new(ResponseCache::new(cache_store, &self.cache_config));
        let client = AiClient::new(self.retry).with_cache(Arc::clone(&cache));

        Ok(Lectern {
            limiter: Arc::new(limiter),
            cache,
            client,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quota::{Limit, Tier};

    #[test]
    fn build_with_defaults() {
        let lectern = Lectern::builder().build().unwrap();
        assert!(lectern.cache().is_enabled());
        assert_eq!(lectern.cache().namespace(), "ai_response");
        assert_eq!(lectern.client().retry_config().max_attempts, 3);
    }

    #[test]
    fn build_rejects_inverted_tiers() {
        let tiers = TierTable::new().with_limit(Tier::Premium, Action::AiRequests, Limit::new(1, 60));
        let result = Lectern::builder().tiers(tiers).build();
        assert!(matches!(result, Err(LecternError::Configuration(_))));
    }

    #[test]
    fn build_rejects_nested_cache_namespace() {
        let result = Lectern::builder()
            .cache_config(CacheConfig::new().namespace("answers:drafts"))
            .build();
        assert!(matches!(result, Err(LecternError::Configuration(_))));
    }

    #[test]
    fn apply_config_carries_sections() {
        let config: Config = toml::from_str(
            r#"
            [cache]
            namespace = "answers"

            [retry]
            max_attempts = 7
            "#,
        )
        .unwrap();
        let lectern = Lectern::builder().apply_config(&config).unwrap().build().unwrap();
        assert_eq!(lectern.cache().namespace(), "answers");
        assert_eq!(lectern.client().retry_config().max_attempts, 7);
    }
}
