//! # Local Caches and Call Memoization
//!
//! In-process caches for services that repeatedly answer the same expensive
//! lookups (geocoding, translations, remote configuration).
//!
//! ## Features
//!
//! - **Eviction Policies**: unconditional, FIFO, LRU, hard timeout and soft
//!   timeout with a refresh hint
//! - **Multi-Level Chains**: stores are probed fastest first, hits are written
//!   back into the levels that missed
//! - **Deterministic Keys**: service prefix plus SHA-512 of a canonical
//!   JSON encoding of the call
//! - **Injectable Clock**: expiry can be driven by a manual clock in tests
//!
//! ## Example
//!
//! ```rust
//! use skill_cache::cache::{CacheStore, CallCache, CallIdentity, LocalCache};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # fn example() -> skill_cache::Result<()> {
//! let stores: Vec<Arc<dyn CacheStore<String>>> = vec![
//!     Arc::new(LocalCache::lru(100)),
//!     Arc::new(LocalCache::timeout(Duration::from_secs(3600))),
//! ];
//! let cache = CallCache::new(stores, false)?;
//!
//! let identity = CallIdentity::new("geo::forward_lookup");
//! let coordinates = cache.call(&identity, &("Berlin",), || "52.52,13.40".to_string())?;
//! assert_eq!(coordinates, "52.52,13.40");
//! # Ok(())
//! # }
//! # example().unwrap();
//! ```

mod canonical;
pub mod chain;
pub mod clock;
pub mod entry;
pub mod key;
pub mod store;
pub mod types;

pub use chain::{CachingSwitch, CallCache, Memoized};
pub use clock::{Clock, ManualClock, SystemClock};
pub use entry::CacheEntry;
pub use key::{CallIdentity, KeyGenerator};
pub use store::{
    start_auto_validation, CacheStore, EvictionPolicy, LocalCache, LocalCacheBuilder,
    DEFAULT_VALIDATE_EVERY,
};
pub use types::{CacheKey, CacheStats};
