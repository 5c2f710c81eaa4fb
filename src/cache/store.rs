//! Local cache stores and their eviction policies
//!
//! Every store keeps its entries in insertion order (oldest first). The
//! policies differ in when an entry leaves:
//!
//! - `Unconditional`: only on `delete` / `purge`
//! - `Fifo`: oldest insertion first once `max_size` is exceeded
//! - `Lru`: least recently read first once `max_size` is exceeded
//! - `Timeout` / `SoftTimeout`: once older than `timeout`, lazily on read and
//!   on the periodic validation pass

use crate::cache::{
    clock::{Clock, SystemClock},
    entry::CacheEntry,
    types::{CacheKey, CacheStats},
};
use crate::error::{CacheError, Result};
use lru::LruCache;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Number of `set` calls between two validation passes
pub const DEFAULT_VALIDATE_EVERY: u64 = 1000;

/// Capability set shared by every cache level in a chain
///
/// A miss is always reported as [`CacheError::KeyNotFound`].
pub trait CacheStore<V>: Send + Sync {
    /// Human readable description, used in logs
    fn name(&self) -> String;

    /// Return the payload if present and not expired
    fn get(&self, key: &[u8]) -> Result<V>;

    /// Like [`get`](Self::get), with a miss folded into `None`
    fn get_or_absent(&self, key: &[u8]) -> Option<V> {
        self.get(key).ok()
    }

    /// Return the payload and whether the caller should refresh it soon
    fn get_with_refresh_hint(&self, key: &[u8]) -> Result<(V, bool)> {
        Ok((self.get(key)?, false))
    }

    /// Return the payload ignoring expiry
    fn get_unconditional(&self, key: &[u8]) -> Result<V>;

    /// Insert or replace an entry, then apply the eviction policy
    fn set(&self, key: CacheKey, value: V);

    /// Remove an entry; absent keys are ignored
    fn delete(&self, key: &[u8]);

    /// Mark an entry as read without returning it
    fn touch(&self, key: &[u8]) -> Result<()>;

    /// Drop every entry
    fn purge(&self);

    /// Evict whatever the policy says should no longer be there
    fn validate(&self);

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn stats(&self) -> CacheStats;
}

/// Eviction policy of a [`LocalCache`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EvictionPolicy {
    /// Keep everything
    Unconditional,

    /// Bounded, evicts the oldest insertion
    Fifo { max_size: usize },

    /// Bounded, evicts the least recently read entry
    Lru { max_size: usize },

    /// Entries expire `timeout` after insertion
    Timeout { timeout: Duration },

    /// Like `Timeout`, and reads past `timeout * threshold` ask for a refresh
    SoftTimeout { timeout: Duration, threshold: f64 },
}

impl EvictionPolicy {
    /// Check policy parameters
    pub fn validate(&self) -> Result<()> {
        if let EvictionPolicy::SoftTimeout { threshold, .. } = self {
            if !(*threshold > 0.0 && *threshold < 1.0) {
                return Err(CacheError::ConfigError(format!(
                    "threshold must be larger than 0 and smaller than 1, got {}",
                    threshold
                )));
            }
        }
        Ok(())
    }

    /// Size bound, for bounded policies
    pub fn max_size(&self) -> Option<usize> {
        match self {
            EvictionPolicy::Fifo { max_size } | EvictionPolicy::Lru { max_size } => Some(*max_size),
            _ => None,
        }
    }

    /// Maximum entry age, for expiring policies
    pub fn timeout(&self) -> Option<Duration> {
        match self {
            EvictionPolicy::Timeout { timeout } | EvictionPolicy::SoftTimeout { timeout, .. } => {
                Some(*timeout)
            }
            _ => None,
        }
    }

    fn expires(&self) -> bool {
        self.timeout().is_some()
    }

    /// Age from which a soft-timeout read reports `should_refresh`
    fn refresh_after(&self) -> Option<Duration> {
        match self {
            EvictionPolicy::SoftTimeout { timeout, threshold } => Some(timeout.mul_f64(*threshold)),
            _ => None,
        }
    }
}

impl fmt::Display for EvictionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvictionPolicy::Unconditional => write!(f, "unconditional"),
            EvictionPolicy::Fifo { max_size } => write!(f, "fifo size {}", max_size),
            EvictionPolicy::Lru { max_size } => write!(f, "lru size {}", max_size),
            EvictionPolicy::Timeout { timeout } => write!(f, "timeout {:?}", timeout),
            EvictionPolicy::SoftTimeout { timeout, threshold } => {
                write!(f, "soft timeout {:?} threshold {:.2}", timeout, threshold)
            }
        }
    }
}

/// In-process cache level
///
/// The map is guarded by a mutex per store; the chain protocol on top of it
/// is not atomic across stores.
pub struct LocalCache<V> {
    policy: EvictionPolicy,
    validate_every: u64,
    clock: Arc<dyn Clock>,
    store: Mutex<EntryMap<V>>,
}

/// Internal storage. Without promotion the `lru` list keeps insertion order,
/// so the "LRU" end is the oldest insertion for every policy but `Lru`.
struct EntryMap<V> {
    entries: LruCache<CacheKey, CacheEntry<V>>,
    sets: u64,
    stats: CacheStats,
}

impl<V> LocalCache<V> {
    fn from_parts(policy: EvictionPolicy, validate_every: u64, clock: Arc<dyn Clock>) -> Self {
        info!("Initializing local cache ({})", policy);

        Self {
            policy,
            validate_every,
            clock,
            store: Mutex::new(EntryMap {
                entries: LruCache::unbounded(),
                sets: 0,
                stats: CacheStats::default(),
            }),
        }
    }

    fn with_policy(policy: EvictionPolicy) -> Self {
        Self::from_parts(policy, DEFAULT_VALIDATE_EVERY, Arc::new(SystemClock))
    }

    /// Create a store for `policy` with the system clock
    pub fn new(policy: EvictionPolicy) -> Result<Self> {
        LocalCacheBuilder::new(policy).build()
    }

    /// Store without eviction
    pub fn unconditional() -> Self {
        Self::with_policy(EvictionPolicy::Unconditional)
    }

    /// Store keeping the `max_size` most recent insertions
    pub fn fifo(max_size: usize) -> Self {
        Self::with_policy(EvictionPolicy::Fifo { max_size })
    }

    /// Store keeping the `max_size` most recently read entries
    pub fn lru(max_size: usize) -> Self {
        Self::with_policy(EvictionPolicy::Lru { max_size })
    }

    /// Store whose entries expire after `timeout`
    pub fn timeout(timeout: Duration) -> Self {
        Self::with_policy(EvictionPolicy::Timeout { timeout })
    }

    /// Store whose entries expire after `timeout` and ask for a refresh
    /// after `timeout * threshold`
    pub fn soft_timeout(timeout: Duration, threshold: f64) -> Result<Self> {
        Self::new(EvictionPolicy::SoftTimeout { timeout, threshold })
    }

    pub fn policy(&self) -> &EvictionPolicy {
        &self.policy
    }

    fn lock(&self) -> MutexGuard<'_, EntryMap<V>> {
        self.store.lock().unwrap_or_else(|poisoned| {
            warn!("Cache lock poisoned, recovering ({})", self.policy);
            poisoned.into_inner()
        })
    }

    /// Shared lookup for `get` and `get_with_refresh_hint`
    fn lookup(&self, key: &[u8]) -> Result<(V, bool)>
    where
        V: Clone,
    {
        let now = self.clock.now();
        let mut guard = self.lock();
        let store = &mut *guard;

        let expired = match store.entries.peek(key) {
            None => {
                debug!("Cache miss ({})", self.policy);
                store.stats.misses += 1;
                return Err(CacheError::key_not_found(key));
            }
            Some(entry) => self
                .policy
                .timeout()
                .map(|timeout| entry.is_expired(timeout, now))
                .unwrap_or(false),
        };

        if expired {
            debug!("Cache entry expired ({})", self.policy);
            store.entries.pop(key);
            store.stats.misses += 1;
            store.stats.evictions_ttl += 1;
            store.stats.entries = store.entries.len();
            return Err(CacheError::key_not_found(key));
        }

        let entry = if matches!(self.policy, EvictionPolicy::Lru { .. }) {
            store.entries.get_mut(key)
        } else {
            store.entries.peek_mut(key)
        };
        let Some(entry) = entry else {
            return Err(CacheError::key_not_found(key));
        };

        let refresh = self
            .policy
            .refresh_after()
            .map(|after| entry.age(now) >= after)
            .unwrap_or(false);
        let value = entry.read(now).clone();
        store.stats.hits += 1;

        debug!("Cache hit ({})", self.policy);
        Ok((value, refresh))
    }

    /// Drop entries beyond the size bound, oldest (or least recently read) first
    fn enforce_bound(&self, store: &mut EntryMap<V>, max_size: usize) {
        while store.entries.len() > max_size {
            if store.entries.pop_lru().is_none() {
                break;
            }
            store.stats.evictions_size += 1;
        }
    }

    /// Drop expired entries from the oldest end, stopping at the first live one.
    ///
    /// Assumes insertion order is age order, which holds because every entry
    /// shares the same timeout and `set` re-inserts replaced keys at the end
    /// for expiring policies.
    fn evict_expired(&self, store: &mut EntryMap<V>, timeout: Duration) {
        let now = self.clock.now();
        let mut evicted = 0;

        while let Some((_, oldest)) = store.entries.peek_lru() {
            if !oldest.is_expired(timeout, now) {
                break;
            }
            store.entries.pop_lru();
            evicted += 1;
        }

        if evicted > 0 {
            debug!("Evicted {} expired entries ({})", evicted, self.policy);
            store.stats.evictions_ttl += evicted;
        }
    }

    fn validate_locked(&self, store: &mut EntryMap<V>) {
        match self.policy {
            EvictionPolicy::Unconditional => {}
            EvictionPolicy::Fifo { max_size } | EvictionPolicy::Lru { max_size } => {
                self.enforce_bound(store, max_size)
            }
            EvictionPolicy::Timeout { timeout } | EvictionPolicy::SoftTimeout { timeout, .. } => {
                self.evict_expired(store, timeout)
            }
        }
        store.stats.entries = store.entries.len();
    }
}

impl<V> CacheStore<V> for LocalCache<V>
where
    V: Clone + Send,
{
    fn name(&self) -> String {
        format!("LocalCache {}", self.policy)
    }

    fn get(&self, key: &[u8]) -> Result<V> {
        self.lookup(key).map(|(value, _)| value)
    }

    fn get_with_refresh_hint(&self, key: &[u8]) -> Result<(V, bool)> {
        self.lookup(key)
    }

    fn get_unconditional(&self, key: &[u8]) -> Result<V> {
        let now = self.clock.now();
        let mut guard = self.lock();
        let store = &mut *guard;

        match store.entries.peek_mut(key) {
            Some(entry) => {
                let value = entry.read(now).clone();
                store.stats.hits += 1;
                Ok(value)
            }
            None => {
                store.stats.misses += 1;
                Err(CacheError::key_not_found(key))
            }
        }
    }

    fn set(&self, key: CacheKey, value: V) {
        let entry = CacheEntry::new(value, self.clock.now());
        let mut guard = self.lock();
        let store = &mut *guard;

        // Expiring policies move a replaced key to the newest end so insertion
        // order stays age order; the others keep its position.
        if !self.policy.expires() && store.entries.contains(&key) {
            if let Some(existing) = store.entries.peek_mut(&key) {
                *existing = entry;
            }
        } else {
            store.entries.put(key, entry);
        }
        store.sets += 1;

        if let Some(max_size) = self.policy.max_size() {
            self.enforce_bound(store, max_size);
        }

        if store.sets % self.validate_every == 0 {
            debug!("Cache validate hook triggered ({})", self.policy);
            self.validate_locked(store);
        }

        store.stats.entries = store.entries.len();
    }

    fn delete(&self, key: &[u8]) {
        let mut store = self.lock();
        if store.entries.pop(key).is_some() {
            store.stats.invalidations += 1;
            store.stats.entries = store.entries.len();
        }
    }

    fn touch(&self, key: &[u8]) -> Result<()> {
        let now = self.clock.now();
        let mut store = self.lock();
        match store.entries.peek_mut(key) {
            Some(entry) => {
                entry.touch(now);
                Ok(())
            }
            None => Err(CacheError::key_not_found(key)),
        }
    }

    fn purge(&self) {
        let mut store = self.lock();
        let count = store.entries.len();
        store.entries.clear();
        store.stats.invalidations += count as u64;
        store.stats.entries = 0;

        info!("Purged {} entries from {}", count, self.name());
    }

    fn validate(&self) {
        let mut store = self.lock();
        self.validate_locked(&mut store);
    }

    fn len(&self) -> usize {
        self.lock().entries.len()
    }

    fn stats(&self) -> CacheStats {
        self.lock().stats.clone()
    }
}

impl<V> fmt::Debug for LocalCache<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalCache")
            .field("policy", &self.policy)
            .field("validate_every", &self.validate_every)
            .finish()
    }
}

/// Builder for [`LocalCache`] with validation
pub struct LocalCacheBuilder {
    policy: EvictionPolicy,
    validate_every: Option<u64>,
    clock: Option<Arc<dyn Clock>>,
}

impl LocalCacheBuilder {
    pub fn new(policy: EvictionPolicy) -> Self {
        Self {
            policy,
            validate_every: None,
            clock: None,
        }
    }

    /// Run a validation pass every `n` sets
    pub fn validate_every(mut self, n: u64) -> Self {
        self.validate_every = Some(n);
        self
    }

    /// Use `clock` instead of the system clock
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Build the store
    pub fn build<V>(self) -> Result<LocalCache<V>> {
        self.policy.validate()?;

        let validate_every = self.validate_every.unwrap_or(DEFAULT_VALIDATE_EVERY);
        if validate_every == 0 {
            return Err(CacheError::ConfigError(
                "validate_every must be greater than 0".to_string(),
            ));
        }

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        Ok(LocalCache::from_parts(self.policy, validate_every, clock))
    }
}

/// Background task validating a store at a fixed interval
///
/// Complements the every-N-sets hook for stores that see few writes.
pub async fn start_auto_validation<V>(store: Arc<dyn CacheStore<V>>, interval: Duration)
where
    V: 'static,
{
    info!(
        "Starting automatic validation for {} (interval: {:?})",
        store.name(),
        interval
    );

    loop {
        tokio::time::sleep(interval).await;
        store.validate();
        debug!("Auto validation: {} entries left in {}", store.len(), store.name());
    }
}
