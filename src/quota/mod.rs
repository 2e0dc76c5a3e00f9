//! Per-subject request quotas.
//!
//! [`QuotaLimiter`] is a synchronous gate in front of quota-gated actions.
//! Each `(subject, action)` pair owns a fixed-window counter in a shared
//! [`QuotaStore`]; the subject's [`Tier`] decides the limit and window.
//!
//! # Admission
//!
//! Admission is a single [`QuotaStore::acquire`] call: the store creates
//! the counter with the window as expiry, increments it while below the
//! limit, and otherwise rejects without incrementing. Rejections surface
//! as [`LecternError::QuotaExceeded`] carrying the counter's remaining TTL
//! as `retry_after`. No retries happen here.
//!
//! A counter that is full but has no expiry would block its subject
//! forever; the limiter restarts the window instead and admits the
//! request.
//!
//! # Store failures
//!
//! What happens when the store itself fails is an explicit
//! [`StoreFailurePolicy`]. The default fails closed.

pub mod tiers;

pub use tiers::{Action, Limit, Tier, TierTable, default_limit};

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::store::{Admission, KeyTtl, QuotaStore};
use crate::telemetry;
use crate::{LecternError, Result};

/// Identifier of the entity a quota applies to (typically a user id).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubjectId(String);

impl SubjectId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SubjectId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for SubjectId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<i64> for SubjectId {
    fn from(id: i64) -> Self {
        Self(id.to_string())
    }
}

impl From<u64> for SubjectId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

impl From<i32> for SubjectId {
    fn from(id: i32) -> Self {
        Self(id.to_string())
    }
}

/// Store key of the counter for `(subject, action)`.
pub fn quota_key(subject: &SubjectId, action: Action) -> String {
    format!("rate_limit:{subject}:{action}")
}

/// Looks up the tier of a subject when the caller doesn't supply one.
#[async_trait]
pub trait TierResolver: Send + Sync {
    async fn tier_for(&self, subject: &SubjectId) -> Result<Tier>;
}

/// Fixed subject → tier assignments, everything else gets a default tier.
#[derive(Debug, Clone, Default)]
pub struct StaticTierResolver {
    assignments: HashMap<SubjectId, Tier>,
    default: Tier,
}

impl StaticTierResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign a tier to a subject.
    pub fn assign(mut self, subject: impl Into<SubjectId>, tier: Tier) -> Self {
        self.assignments.insert(subject.into(), tier);
        self
    }

    /// Tier for unassigned subjects. Default: free.
    pub fn default_tier(mut self, tier: Tier) -> Self {
        self.default = tier;
        self
    }
}

#[async_trait]
impl TierResolver for StaticTierResolver {
    async fn tier_for(&self, subject: &SubjectId) -> Result<Tier> {
        Ok(self.assignments.get(subject).copied().unwrap_or(self.default))
    }
}

/// Behaviour when the quota store is unreachable or errors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreFailurePolicy {
    /// Reject the request with [`LecternError::QuotaStore`].
    #[default]
    FailClosed,
    /// Log and admit the request without counting it.
    FailOpen,
}

/// Read-only view of one counter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuotaInfo {
    pub tier: Tier,
    pub action: Action,
    pub limit: u64,
    pub window_secs: u64,
    pub current: u64,
    pub remaining: u64,
    pub reset_in_secs: u64,
}

/// Fixed-window quota gate keyed by subject and action.
pub struct QuotaLimiter {
    store: Arc<dyn QuotaStore>,
    tiers: TierTable,
    resolver: Option<Arc<dyn TierResolver>>,
    failure_policy: StoreFailurePolicy,
}

impl QuotaLimiter {
    /// Limiter with built-in tiers, no resolver (everyone is free tier
    /// unless a tier is passed explicitly) and a fail-closed store policy.
    pub fn new(store: Arc<dyn QuotaStore>) -> Self {
        Self {
            store,
            tiers: TierTable::default(),
            resolver: None,
            failure_policy: StoreFailurePolicy::default(),
        }
    }

    pub fn with_tiers(mut self, tiers: TierTable) -> Self {
        self.tiers = tiers;
        self
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn TierResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn with_failure_policy(mut self, policy: StoreFailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    pub fn tiers(&self) -> &TierTable {
        &self.tiers
    }

    /// Admit one request for `subject` performing `action`.
    ///
    /// Returns `Ok(())` when allowed. A full window yields
    /// [`LecternError::QuotaExceeded`]; store errors follow the
    /// configured [`StoreFailurePolicy`].
    pub async fn check(
        &self,
        subject: impl Into<SubjectId>,
        action: Action,
        tier: Option<Tier>,
    ) -> Result<()> {
        let subject = subject.into();
        let tier = self.resolve_tier(&subject, tier).await;
        let limit = self.tiers.limit(tier, action);
        let key = quota_key(&subject, action);

        let admission = match self.store.acquire(&key, limit.limit, limit.window()).await {
            Ok(admission) => admission,
            Err(e) => return self.on_store_failure(e, action, tier),
        };

        match admission {
            Admission::Admitted { count } => {
                debug!(%subject, %action, %tier, count, limit = limit.limit, "quota admitted");
                record(action, tier, "allowed");
                Ok(())
            }
            Admission::Rejected {
                ttl: KeyTtl::Expires(retry_after),
                ..
            } if !retry_after.is_zero() => {
                debug!(
                    %subject,
                    %action,
                    %tier,
                    retry_after_secs = retry_after.as_secs(),
                    "quota exceeded"
                );
                record(action, tier, "rejected");
                Err(LecternError::QuotaExceeded {
                    action,
                    limit: limit.limit,
                    window: limit.window(),
                    retry_after,
                })
            }
            Admission::Rejected { count, ttl } => {
                warn!(
                    %subject,
                    %action,
                    count,
                    ?ttl,
                    store = self.store.name(),
                    "quota counter has no usable expiry, restarting window"
                );
                if let Err(e) = self.store.restart_window(&key, limit.window()).await {
                    return self.on_store_failure(e, action, tier);
                }
                record(action, tier, "reset");
                Ok(())
            }
        }
    }

    /// Run `f` only if `subject` is admitted for `action`.
    pub async fn gate<F, T>(&self, subject: impl Into<SubjectId>, action: Action, f: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        self.check(subject, action, None).await?;
        f.await
    }

    /// Current state of a counter. Does not mutate it.
    pub async fn info(
        &self,
        subject: impl Into<SubjectId>,
        action: Action,
        tier: Option<Tier>,
    ) -> Result<QuotaInfo> {
        let subject = subject.into();
        let tier = self.resolve_tier(&subject, tier).await;
        let limit = self.tiers.limit(tier, action);
        let key = quota_key(&subject, action);

        let current = self.store.count(&key).await.map_err(into_store_error)?.unwrap_or(0);
        let reset_in = match self.store.ttl(&key).await.map_err(into_store_error)? {
            KeyTtl::Expires(d) => d,
            KeyTtl::Missing | KeyTtl::Persistent => limit.window(),
        };

        Ok(QuotaInfo {
            tier,
            action,
            limit: limit.limit,
            window_secs: limit.window_secs,
            current,
            remaining: limit.limit.saturating_sub(current),
            reset_in_secs: reset_in.as_secs(),
        })
    }

    /// Delete the counter for `(subject, action)`. Returns whether one existed.
    pub async fn reset(&self, subject: impl Into<SubjectId>, action: Action) -> Result<bool> {
        let subject = subject.into();
        let existed = self
            .store
            .delete(&quota_key(&subject, action))
            .await
            .map_err(into_store_error)?;
        debug!(%subject, %action, existed, "quota reset");
        Ok(existed)
    }

    async fn resolve_tier(&self, subject: &SubjectId, explicit: Option<Tier>) -> Tier {
        if let Some(tier) = explicit {
            return tier;
        }
        let Some(resolver) = &self.resolver else {
            return Tier::Free;
        };
        match resolver.tier_for(subject).await {
            Ok(tier) => tier,
            Err(e) => {
                warn!(%subject, error = %e, "tier lookup failed, using free tier");
                Tier::Free
            }
        }
    }

    fn on_store_failure(&self, err: LecternError, action: Action, tier: Tier) -> Result<()> {
        match self.failure_policy {
            StoreFailurePolicy::FailClosed => Err(into_store_error(err)),
            StoreFailurePolicy::FailOpen => {
                warn!(
                    %action,
                    store = self.store.name(),
                    error = %err,
                    "quota store failed, admitting request unmetered"
                );
                record(action, tier, "fail_open");
                Ok(())
            }
        }
    }
}

fn into_store_error(err: LecternError) -> LecternError {
    match err {
        LecternError::QuotaStore(_) => err,
        other => LecternError::QuotaStore(other.to_string()),
    }
}

fn record(action: Action, tier: Tier, outcome: &'static str) {
    metrics::counter!(telemetry::QUOTA_CHECKS_TOTAL,
        "action" => action.as_str(),
        "tier" => tier.as_str(),
        "outcome" => outcome,
    )
    .increment(1);
}

/// Wait suggested by a quota rejection, rounded up to whole seconds.
pub fn retry_after_secs(retry_after: Duration) -> u64 {
    let secs = retry_after.as_secs();
    if retry_after.subsec_nanos() > 0 { secs + 1 } else { secs }
}
