//! Engine configuration.
//!
//! Values can come from defaults, environment variables (`RULE_*`) or a JSON
//! document. All loaders validate before returning.

use crate::error::{EngineError, EngineResult};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

pub const ENV_CACHE_TTL: &str = "RULE_CACHE_TTL_SECONDS";
pub const ENV_COOLDOWN: &str = "RULE_COOLDOWN_SECONDS";
pub const ENV_MAX_COOLDOWN: &str = "RULE_MAX_COOLDOWN_SECONDS";
pub const ENV_FUZZY_THRESHOLD: &str = "RULE_FUZZY_THRESHOLD";
pub const ENV_CASE_SENSITIVE: &str = "RULE_CASE_SENSITIVE";

/// Configuration consumed by the rule cache and matcher.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Freshness bound for cached rule sets. 0 disables caching.
    pub cache_ttl_secs: u64,
    /// Cooldown applied to rules without an override
    pub default_cooldown_secs: u64,
    /// Upper bound on any rule's effective cooldown; longer overrides are clamped
    pub max_cooldown_secs: u64,
    /// Minimum normalized similarity in (0, 1] for fuzzy rules
    pub fuzzy_threshold: f64,
    /// Case sensitivity for exact and contains rules
    pub case_sensitive: bool,
    /// Compile regex rules case-insensitively
    pub regex_case_insensitive: bool,
    /// Messages starting with '/' are bot commands and never match
    pub skip_commands: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: 10,
            default_cooldown_secs: 8,
            max_cooldown_secs: 24 * 60 * 60,
            fuzzy_threshold: 0.80,
            case_sensitive: true,
            regex_case_insensitive: true,
            skip_commands: true,
        }
    }
}

impl EngineConfig {
    /// Reads overrides from `RULE_*` environment variables on top of defaults.
    pub fn from_env() -> EngineResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable variable source.
    pub fn from_lookup<F>(lookup: F) -> EngineResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(raw) = lookup(ENV_CACHE_TTL) {
            config.cache_ttl_secs = parse_var(ENV_CACHE_TTL, &raw)?;
        }
        if let Some(raw) = lookup(ENV_COOLDOWN) {
            config.default_cooldown_secs = parse_var(ENV_COOLDOWN, &raw)?;
        }
        if let Some(raw) = lookup(ENV_MAX_COOLDOWN) {
            config.max_cooldown_secs = parse_var(ENV_MAX_COOLDOWN, &raw)?;
        }
        if let Some(raw) = lookup(ENV_FUZZY_THRESHOLD) {
            config.fuzzy_threshold = parse_var(ENV_FUZZY_THRESHOLD, &raw)?;
        }
        if let Some(raw) = lookup(ENV_CASE_SENSITIVE) {
            config.case_sensitive = parse_var(ENV_CASE_SENSITIVE, &raw)?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn from_json_str(json: &str) -> EngineResult<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| EngineError::InvalidConfig(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> EngineResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            EngineError::InvalidConfig(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> EngineResult<()> {
        if !(self.fuzzy_threshold > 0.0 && self.fuzzy_threshold <= 1.0) {
            return Err(EngineError::InvalidConfig(format!(
                "fuzzy_threshold must be in (0, 1], got {}",
                self.fuzzy_threshold
            )));
        }
        if self.default_cooldown_secs > self.max_cooldown_secs {
            return Err(EngineError::InvalidConfig(format!(
                "default_cooldown_secs ({}) exceeds max_cooldown_secs ({})",
                self.default_cooldown_secs, self.max_cooldown_secs
            )));
        }
        Ok(())
    }
}

fn parse_var<T>(key: &str, raw: &str) -> EngineResult<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|e| EngineError::InvalidConfig(format!("{}={:?}: {}", key, raw, e)))
}

/// Configuration for the background maintenance task.
#[derive(Debug, Clone)]
pub struct MaintenanceConfig {
    /// Interval between maintenance cycles
    pub interval: Duration,
    /// Whether the task runs at all
    pub enabled: bool,
    /// Cooldown entries older than this are dropped. The scheduler raises it
    /// to the engine's `max_cooldown_secs` when smaller.
    pub cooldown_retention: Duration,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5 * 60),
            enabled: true,
            cooldown_retention: Duration::from_secs(60 * 60),
        }
    }
}
