//! # Skill Cache (skill-cache)
//!
//! Local multi-level caches and call memoization for skill services.
//!
//! ## Features
//!
//! - Five eviction policies behind one [`CacheStore`] trait
//! - Chains of stores with write-back of lower-level hits
//! - Memoization of sync, fallible and async computations
//! - Settings from the environment (`SKILL_NAME`, `SKILL_CACHES_ACTIVE`,
//!   `SKILL_CACHE_VALIDATE_EVERY`) or JSON
//!
//! ## Memoizing a Function
//!
//! ```no_run
//! use skill_cache::{CacheSettings, CallCache, CallIdentity, StoreConfig};
//!
//! fn main() -> anyhow::Result<()> {
//!     let settings = CacheSettings::from_env()?;
//!     let chain = StoreConfig::chain_from_json(
//!         r#"[{"policy": "lru", "max_size": 100}, {"policy": "timeout", "timeout_secs": 3600}]"#,
//!     )?;
//!
//!     let translate = CallCache::from_configs(&chain, false, &settings)?.memoize(
//!         CallIdentity::new("translate"),
//!         |(text, lang): &(String, String)| format!("[{}] {}", lang, text),
//!     );
//!
//!     let args = ("hello".to_string(), "de".to_string());
//!     println!("{}", translate.call(&args)?);
//!     Ok(())
//! }
//! ```
//!
//! ## Switching Caches Off
//!
//! ```
//! use skill_cache::{CacheStore, CachingSwitch, CallCache, CallIdentity, LocalCache};
//! use std::sync::Arc;
//!
//! let switch = CachingSwitch::new(true);
//! let store: Arc<dyn CacheStore<u32>> = Arc::new(LocalCache::unconditional());
//! let cache = CallCache::new(vec![store.clone()], false)
//!     .unwrap()
//!     .with_switch(switch.clone());
//!
//! switch.disable();
//! cache.call(&CallIdentity::new("answer"), &(), || 42).unwrap();
//! assert!(store.is_empty());
//! ```

pub mod cache;
pub mod config;
pub mod error;

// Re-export main types for convenience
pub use cache::{
    CacheEntry, CacheKey, CacheStats, CacheStore, CachingSwitch, CallCache, CallIdentity, Clock,
    EvictionPolicy, KeyGenerator, LocalCache, LocalCacheBuilder, ManualClock, Memoized,
    SystemClock,
};
pub use config::{CacheSettings, CacheSettingsBuilder, StoreConfig};
pub use error::{CacheError, Result};
