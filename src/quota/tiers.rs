//! Tiers, actions, and the limit table.
//!
//! A [`Tier`] is a named quota class; each tier maps every [`Action`] to a
//! [`Limit`]. The built-in table is total over `Tier × Action`; config
//! overrides replace individual cells and are validated so that richer
//! tiers never get less than poorer ones.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{LecternError, Result};

/// Quota class of a subject.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    #[default]
    Free,
    Premium,
    Admin,
}

impl Tier {
    /// All tiers, lowest first.
    pub const ALL: [Tier; 3] = [Tier::Free, Tier::Premium, Tier::Admin];

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Free => "free",
            Tier::Premium => "premium",
            Tier::Admin => "admin",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = LecternError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "free" => Ok(Tier::Free),
            "premium" => Ok(Tier::Premium),
            "admin" => Ok(Tier::Admin),
            other => Err(LecternError::InvalidArgument(format!("unknown tier: {other}"))),
        }
    }
}

/// A quota-gated action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    AiRequests,
    DocumentUpload,
    ApiCalls,
}

impl Action {
    pub const ALL: [Action; 3] = [Action::AiRequests, Action::DocumentUpload, Action::ApiCalls];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::AiRequests => "ai_requests",
            Action::DocumentUpload => "document_upload",
            Action::ApiCalls => "api_calls",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = LecternError;

    fn from_str(s: &str) -> Result<Self> {
        Action::ALL
            .into_iter()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| LecternError::InvalidArgument(format!("unknown action: {s}")))
    }
}

/// Request budget for one window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Limit {
    pub limit: u64,
    pub window_secs: u64,
}

impl Limit {
    pub const fn new(limit: u64, window_secs: u64) -> Self {
        Self { limit, window_secs }
    }

    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

/// Built-in limit for a tier/action pair.
pub const fn default_limit(tier: Tier, action: Action) -> Limit {
    match (tier, action) {
        (Tier::Free, Action::AiRequests) => Limit::new(5, 60),
        (Tier::Free, Action::DocumentUpload) => Limit::new(10, 3600),
        (Tier::Free, Action::ApiCalls) => Limit::new(100, 3600),
        (Tier::Premium, Action::AiRequests) => Limit::new(50, 60),
        (Tier::Premium, Action::DocumentUpload) => Limit::new(100, 3600),
        (Tier::Premium, Action::ApiCalls) => Limit::new(1_000, 3600),
        (Tier::Admin, Action::AiRequests) => Limit::new(1_000, 60),
        (Tier::Admin, Action::DocumentUpload) => Limit::new(1_000, 3600),
        (Tier::Admin, Action::ApiCalls) => Limit::new(10_000, 3600),
    }
}

/// Limit table for every tier and action.
///
/// Cells without an override fall back to [`default_limit`], so lookups
/// never fail.
#[derive(Debug, Clone, Default)]
pub struct TierTable {
    overrides: HashMap<(Tier, Action), Limit>,
}

impl TierTable {
    /// Table with only built-in limits.
    pub fn new() -> Self {
        Self::default()
    }

    /// Override one cell.
    pub fn with_limit(mut self, tier: Tier, action: Action, limit: Limit) -> Self {
        self.overrides.insert((tier, action), limit);
        self
    }

    pub fn limit(&self, tier: Tier, action: Action) -> Limit {
        self.overrides
            .get(&(tier, action))
            .copied()
            .unwrap_or(default_limit(tier, action))
    }

    /// Check that windows and limits are non-zero and that limits never
    /// decrease from free to premium to admin.
    pub fn validate(&self) -> Result<()> {
        for action in Action::ALL {
            let mut previous: Option<(Tier, Limit)> = None;
            for tier in Tier::ALL {
                let limit = self.limit(tier, action);
                if limit.window_secs == 0 {
                    return Err(LecternError::Configuration(format!(
                        "{tier}.{action}: window_secs must be non-zero"
                    )));
                }
                if limit.limit == 0 {
                    return Err(LecternError::Configuration(format!(
                        "{tier}.{action}: limit must be at least 1"
                    )));
                }
                if let Some((lower, prev)) = previous
                    && limit.limit < prev.limit
                {
                    return Err(LecternError::Configuration(format!(
                        "{tier}.{action} limit {} is below {lower}.{action} limit {}",
                        limit.limit, prev.limit
                    )));
                }
                previous = Some((tier, limit));
            }
        }
        Ok(())
    }
}
