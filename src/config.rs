//! Configuration for the cache system
//!
//! [`CacheSettings`] carries the process-wide knobs (key prefix, caching
//! switch, validation cadence). [`StoreConfig`] describes one cache level so
//! chains can be declared in configuration files.

use crate::cache::store::{
    CacheStore, EvictionPolicy, LocalCache, LocalCacheBuilder, DEFAULT_VALIDATE_EVERY,
};
use crate::error::{CacheError, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Key prefix used when no service name is configured
pub const DEFAULT_SERVICE_NAME: &str = "unnamed_service";

/// Environment variable holding the service name
pub const ENV_SERVICE_NAME: &str = "SKILL_NAME";

/// Environment variable switching caches on or off
pub const ENV_CACHES_ACTIVE: &str = "SKILL_CACHES_ACTIVE";

/// Environment variable holding the validation cadence
pub const ENV_VALIDATE_EVERY: &str = "SKILL_CACHE_VALIDATE_EVERY";

/// Process-wide cache settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// Service (skill) name, used as key prefix
    pub service_name: String,

    /// Whether memoized calls use their caches at all
    pub caches_active: bool,

    /// Number of `set` calls between two validation passes of a store
    pub validate_every: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            service_name: DEFAULT_SERVICE_NAME.to_string(),
            caches_active: true,
            validate_every: DEFAULT_VALIDATE_EVERY,
        }
    }
}

impl CacheSettings {
    /// Create a new builder for cache settings
    pub fn builder() -> CacheSettingsBuilder {
        CacheSettingsBuilder::default()
    }

    /// Read settings from the environment, loading `.env` first if present
    ///
    /// Unset variables fall back to the defaults; malformed ones are errors.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read settings through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let service_name = lookup(ENV_SERVICE_NAME)
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(defaults.service_name);

        let caches_active = match lookup(ENV_CACHES_ACTIVE) {
            Some(raw) => parse_flag(&raw).ok_or_else(|| {
                CacheError::ConfigError(format!(
                    "{} must be a boolean, got {:?}",
                    ENV_CACHES_ACTIVE, raw
                ))
            })?,
            None => defaults.caches_active,
        };

        let validate_every = match lookup(ENV_VALIDATE_EVERY) {
            Some(raw) => raw.trim().parse().map_err(|_| {
                CacheError::ConfigError(format!(
                    "{} must be an integer, got {:?}",
                    ENV_VALIDATE_EVERY, raw
                ))
            })?,
            None => defaults.validate_every,
        };

        let settings = Self {
            service_name,
            caches_active,
            validate_every,
        };
        settings.validate()?;

        debug!("Loaded cache settings: {:?}", settings);
        Ok(settings)
    }

    /// Parse settings from JSON
    pub fn from_json(json: &str) -> Result<Self> {
        let settings: Self = serde_json::from_str(json)
            .map_err(|e| CacheError::ConfigError(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Validate the settings
    pub fn validate(&self) -> Result<()> {
        if self.service_name.is_empty() {
            return Err(CacheError::ConfigError("service_name must not be empty".to_string()));
        }

        if self.validate_every == 0 {
            return Err(CacheError::ConfigError(
                "validate_every must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Builder for cache settings
#[derive(Debug, Default)]
pub struct CacheSettingsBuilder {
    service_name: Option<String>,
    caches_active: Option<bool>,
    validate_every: Option<u64>,
}

impl CacheSettingsBuilder {
    /// Set the service name (key prefix)
    pub fn service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = Some(name.into());
        self
    }

    /// Switch caches on or off
    pub fn caches_active(mut self, active: bool) -> Self {
        self.caches_active = Some(active);
        self
    }

    /// Set the validation cadence
    pub fn validate_every(mut self, n: u64) -> Self {
        self.validate_every = Some(n);
        self
    }

    /// Build and validate the settings
    pub fn build(self) -> Result<CacheSettings> {
        let defaults = CacheSettings::default();

        let settings = CacheSettings {
            service_name: self.service_name.unwrap_or(defaults.service_name),
            caches_active: self.caches_active.unwrap_or(defaults.caches_active),
            validate_every: self.validate_every.unwrap_or(defaults.validate_every),
        };
        settings.validate()?;
        Ok(settings)
    }
}

/// Declarative definition of one cache level
///
/// ```json
/// [{"policy": "lru", "max_size": 100}, {"policy": "timeout", "timeout_secs": 3600}]
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum StoreConfig {
    Unconditional,
    Fifo {
        #[serde(default = "default_max_size")]
        max_size: usize,
    },
    Lru {
        #[serde(default = "default_max_size")]
        max_size: usize,
    },
    Timeout {
        #[serde(default = "default_timeout_secs")]
        timeout_secs: f64,
    },
    SoftTimeout {
        #[serde(default = "default_timeout_secs")]
        timeout_secs: f64,
        #[serde(default = "default_threshold")]
        threshold: f64,
    },
}

fn default_max_size() -> usize {
    100
}

fn default_timeout_secs() -> f64 {
    60.0
}

fn default_threshold() -> f64 {
    0.75
}

impl StoreConfig {
    /// Parse a chain definition from a JSON array
    pub fn chain_from_json(json: &str) -> Result<Vec<StoreConfig>> {
        serde_json::from_str(json).map_err(|e| CacheError::ConfigError(e.to_string()))
    }

    /// Resolve into an eviction policy, checking parameters
    pub fn policy(&self) -> Result<EvictionPolicy> {
        let policy = match self {
            StoreConfig::Unconditional => EvictionPolicy::Unconditional,
            StoreConfig::Fifo { max_size } => EvictionPolicy::Fifo { max_size: *max_size },
            StoreConfig::Lru { max_size } => EvictionPolicy::Lru { max_size: *max_size },
            StoreConfig::Timeout { timeout_secs } => EvictionPolicy::Timeout {
                timeout: timeout_from_secs(*timeout_secs)?,
            },
            StoreConfig::SoftTimeout {
                timeout_secs,
                threshold,
            } => EvictionPolicy::SoftTimeout {
                timeout: timeout_from_secs(*timeout_secs)?,
                threshold: *threshold,
            },
        };
        policy.validate()?;
        Ok(policy)
    }

    /// Build the described store
    pub fn build<V>(&self, settings: &CacheSettings) -> Result<Arc<dyn CacheStore<V>>>
    where
        V: Clone + Send + 'static,
    {
        let store: LocalCache<V> = LocalCacheBuilder::new(self.policy()?)
            .validate_every(settings.validate_every)
            .build()?;
        Ok(Arc::new(store))
    }
}

fn timeout_from_secs(secs: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(secs).map_err(|e| {
        CacheError::ConfigError(format!("invalid timeout of {} seconds: {}", secs, e))
    })
}
