//! Configuration loading.
//!
//! Configuration is loaded from TOML files with the following resolution order:
//! 1. `--config <path>` (CLI flag)
//! 2. `~/.lectern/config.toml` (user)
//! 3. `/etc/lectern/config.toml` (system)
//!
//! Secrets are loaded separately with mandatory permission checks:
//! 1. `~/.lectern/secrets.toml` (user, must be 0600)
//! 2. `/etc/lectern/secrets.toml` (system, must be 0600)

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::cache::CacheConfig;
use crate::providers::{DEFAULT_GEMINI_MODEL, RetryConfig};
use crate::quota::{Action, Limit, StoreFailurePolicy, Tier, TierTable};
use crate::{LecternError, Result};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub quota: QuotaConfig,
    #[serde(default)]
    pub cache: CacheSection,
    #[serde(default)]
    pub retry: RetrySection,
    #[serde(default)]
    pub gemini: GeminiConfig,
}

/// Quota limiter settings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QuotaConfig {
    #[serde(default)]
    pub failure_policy: StoreFailurePolicy,
    /// Per-tier, per-action overrides of the built-in limits.
    #[serde(default)]
    pub tiers: HashMap<Tier, HashMap<Action, Limit>>,
}

/// Response cache settings.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheSection {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    /// Default entry TTL in seconds (default: 3600).
    #[serde(default = "default_cache_ttl")]
    pub ttl_secs: u64,
    #[serde(default = "default_max_entries")]
    pub max_entries: u64,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            enabled: true,
            namespace: default_namespace(),
            ttl_secs: default_cache_ttl(),
            max_entries: default_max_entries(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_namespace() -> String {
    "ai_response".to_string()
}

fn default_cache_ttl() -> u64 {
    3600
}

fn default_max_entries() -> u64 {
    10_000
}

/// Retry and timeout settings for the AI client.
#[derive(Debug, Clone, Deserialize)]
pub struct RetrySection {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_max_delay_secs")]
    pub max_delay_secs: u64,
    #[serde(default = "default_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_true")]
    pub retry_unclassified: bool,
    #[serde(default = "default_true")]
    pub retry_blocked: bool,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_secs: default_max_delay_secs(),
            request_timeout_secs: default_timeout(),
            retry_unclassified: true,
            retry_blocked: true,
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay_ms() -> u64 {
    1000
}

fn default_max_delay_secs() -> u64 {
    60
}

fn default_timeout() -> u64 {
    60
}

/// Gemini provider settings.
#[derive(Debug, Clone, Deserialize)]
pub struct GeminiConfig {
    #[serde(default = "default_model")]
    pub model: String,
    /// Override for the API base URL.
    #[serde(default)]
    pub base_url: Option<String>,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            base_url: None,
        }
    }
}

fn default_model() -> String {
    DEFAULT_GEMINI_MODEL.to_string()
}

/// Secrets configuration (API keys).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Secrets {
    #[serde(default)]
    pub gemini: Option<ApiKeySecret>,
}

/// A single API key secret.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiKeySecret {
    pub api_key: String,
}

/// Environment variables consulted for the Gemini key, in order.
const GEMINI_ENV_VARS: &[&str] = &["GEMINI_API_KEY", "GOOGLE_API_KEY"];

impl Config {
    /// Load configuration from the standard locations.
    ///
    /// Resolution order:
    /// 1. Explicit path (if provided)
    /// 2. `~/.lectern/config.toml`
    /// 3. `/etc/lectern/config.toml`
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let path = Self::resolve_config_path(explicit_path)?;
        Self::load_from_file(&path)
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            LecternError::Configuration(format!("Failed to read config file {path:?}: {e}"))
        })?;
        toml::from_str(&content).map_err(|e| {
            LecternError::Configuration(format!("Failed to parse config file {path:?}: {e}"))
        })
    }

    /// Like [`Config::load`], but falls back to defaults when no config
    /// file exists in the standard locations.
    pub fn load_or_default(explicit_path: Option<&Path>) -> Result<Self> {
        match (explicit_path, Self::find_config_path()) {
            (Some(path), _) => Self::load(Some(path)),
            (None, Some(path)) => Self::load_from_file(&path),
            (None, None) => Ok(Self::default()),
        }
    }

    /// Resolve the config file path.
    fn resolve_config_path(explicit: Option<&Path>) -> Result<PathBuf> {
        if let Some(path) = explicit {
            if path.exists() {
                return Ok(path.to_path_buf());
            }
            return Err(LecternError::Configuration(format!(
                "Config file not found: {path:?}"
            )));
        }

        Self::find_config_path().ok_or_else(|| {
            LecternError::Configuration(
                "No config file found. Create ~/.lectern/config.toml or /etc/lectern/config.toml"
                    .to_string(),
            )
        })
    }

    /// First existing config file among the user and system locations.
    fn find_config_path() -> Option<PathBuf> {
        // User config
        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".lectern").join("config.toml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        // System config
        let system_config = PathBuf::from("/etc/lectern/config.toml");
        system_config.exists().then_some(system_config)
    }

    /// Built-in tiers with the configured overrides applied, validated.
    pub fn tier_table(&self) -> Result<TierTable> {
        let mut table = TierTable::new();
        for (tier, actions) in &self.quota.tiers {
            for (action, limit) in actions {
                table = table.with_limit(*tier, *action, *limit);
            }
        }
        table.validate()?;
        Ok(table)
    }

    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig::new()
            .enabled(self.cache.enabled)
            .namespace(self.cache.namespace.clone())
            .ttl(Duration::from_secs(self.cache.ttl_secs))
            .max_entries(self.cache.max_entries)
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig::new()
            .max_attempts(self.retry.max_attempts)
            .initial_delay(Duration::from_millis(self.retry.initial_delay_ms))
            .max_delay(Duration::from_secs(self.retry.max_delay_secs))
            .request_timeout(Duration::from_secs(self.retry.request_timeout_secs))
            .retry_unclassified(self.retry.retry_unclassified)
            .retry_blocked(self.retry.retry_blocked)
    }
}

impl Secrets {
    /// Load secrets from the standard locations with permission checks.
    ///
    /// Resolution order:
    /// 1. `~/.lectern/secrets.toml` (if exists, must be 0600)
    /// 2. `/etc/lectern/secrets.toml` (if exists, must be 0600)
    ///
    /// Returns empty secrets if no file exists (the key may come from env vars).
    pub fn load() -> Result<Self> {
        if let Some(home) = dirs::home_dir() {
            let user_secrets = home.join(".lectern").join("secrets.toml");
            if user_secrets.exists() {
                return Self::load_from_file(&user_secrets);
            }
        }

        let system_secrets = PathBuf::from("/etc/lectern/secrets.toml");
        if system_secrets.exists() {
            return Self::load_from_file(&system_secrets);
        }

        Ok(Secrets::default())
    }

    /// Load one secrets file after checking its permissions.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        Self::check_permissions(path)?;
        let content = fs::read_to_string(path).map_err(|e| {
            LecternError::Configuration(format!("Failed to read secrets file {path:?}: {e}"))
        })?;
        toml::from_str(&content).map_err(|e| {
            LecternError::Configuration(format!("Failed to parse secrets file {path:?}: {e}"))
        })
    }

    /// Check that the secrets file has secure permissions (0600 or 0400).
    #[cfg(unix)]
    fn check_permissions(path: &Path) -> Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let metadata = fs::metadata(path).map_err(|e| {
            LecternError::Configuration(format!("Failed to stat secrets file {path:?}: {e}"))
        })?;

        let mode = metadata.permissions().mode();
        // Reject if group or other bits are set
        if mode & 0o077 != 0 {
            return Err(LecternError::Configuration(format!(
                "Secrets file {path:?} has insecure permissions {:o}. Must be 0600 or 0400.",
                mode & 0o777
            )));
        }

        Ok(())
    }

    #[cfg(not(unix))]
    fn check_permissions(_path: &Path) -> Result<()> {
        Ok(())
    }

    /// Gemini API key, falling back to `GEMINI_API_KEY` then `GOOGLE_API_KEY`.
    pub fn gemini_api_key(&self) -> Option<String> {
        self.gemini.as_ref().map(|s| s.api_key.clone()).or_else(|| {
            GEMINI_ENV_VARS
                .iter()
                .find_map(|var| std::env::var(var).ok().filter(|v| !v.is_empty()))
        })
    }
}
