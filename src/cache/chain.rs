//! Call memoization over a chain of cache stores
//!
//! ```text
//! key ─▶ L1 ─miss─▶ L2 ─hit─▶ write back into L1 ─▶ value
//!         └─ all miss ─▶ compute ─▶ write into L1..Ln ─▶ value
//! ```
//!
//! Only wrap computations that are idempotent and free of side effects for
//! the arguments given: a hit skips the computation entirely.

use crate::cache::{
    key::{CallIdentity, KeyGenerator},
    store::CacheStore,
    types::CacheKey,
};
use crate::config::{CacheSettings, StoreConfig};
use crate::error::{CacheError, Result};
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, debug_span, info, Instrument};

/// Shared on/off switch for memoized calls
///
/// Clones share the same flag, so flipping one affects every call cache
/// built with it.
#[derive(Clone)]
pub struct CachingSwitch {
    active: Arc<AtomicBool>,
}

impl CachingSwitch {
    pub fn new(active: bool) -> Self {
        Self {
            active: Arc::new(AtomicBool::new(active)),
        }
    }

    pub fn from_settings(settings: &CacheSettings) -> Self {
        Self::new(settings.caches_active)
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub fn set(&self, active: bool) {
        info!("Caches {}", if active { "activated" } else { "deactivated" });
        self.active.store(active, Ordering::Release);
    }

    pub fn enable(&self) {
        self.set(true)
    }

    pub fn disable(&self) {
        self.set(false)
    }
}

impl Default for CachingSwitch {
    fn default() -> Self {
        Self::new(true)
    }
}

impl fmt::Debug for CachingSwitch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachingSwitch")
            .field("active", &self.is_active())
            .finish()
    }
}

/// Memoizes computations over an ordered chain of stores, fastest first
pub struct CallCache<V> {
    stores: Vec<Arc<dyn CacheStore<V>>>,
    ignore_first_argument: bool,
    key_generator: KeyGenerator,
    switch: CachingSwitch,
}

impl<V> CallCache<V>
where
    V: Clone + Send + 'static,
{
    /// Call cache with default settings
    ///
    /// With `ignore_first_argument`, the first positional argument (a
    /// receiver, typically) is left out of the key.
    pub fn new(stores: Vec<Arc<dyn CacheStore<V>>>, ignore_first_argument: bool) -> Result<Self> {
        Self::with_settings(stores, ignore_first_argument, &CacheSettings::default())
    }

    /// Call cache keyed under the configured service name
    pub fn with_settings(
        stores: Vec<Arc<dyn CacheStore<V>>>,
        ignore_first_argument: bool,
        settings: &CacheSettings,
    ) -> Result<Self> {
        if stores.is_empty() {
            return Err(CacheError::ConfigError(
                "a call cache needs a non-empty chain of cache stores".to_string(),
            ));
        }

        debug!(
            "Initializing CallCache with chain: {}",
            stores.iter().map(|s| s.name()).collect::<Vec<_>>().join("; ")
        );

        Ok(Self {
            stores,
            ignore_first_argument,
            key_generator: KeyGenerator::from_settings(settings)
                .with_hashing(true)
                .with_type_safe(true),
            switch: CachingSwitch::from_settings(settings),
        })
    }

    /// Call cache over stores built from their configuration
    pub fn from_configs(
        configs: &[StoreConfig],
        ignore_first_argument: bool,
        settings: &CacheSettings,
    ) -> Result<Self> {
        let stores = configs
            .iter()
            .map(|config| config.build(settings))
            .collect::<Result<Vec<_>>>()?;
        Self::with_settings(stores, ignore_first_argument, settings)
    }

    /// Share an existing switch instead of the one derived from settings
    pub fn with_switch(mut self, switch: CachingSwitch) -> Self {
        self.switch = switch;
        self
    }

    pub fn with_key_generator(mut self, key_generator: KeyGenerator) -> Self {
        self.key_generator = key_generator;
        self
    }

    pub fn stores(&self) -> &[Arc<dyn CacheStore<V>>] {
        &self.stores
    }

    pub fn switch(&self) -> &CachingSwitch {
        &self.switch
    }

    /// Key under which a call's result is cached
    pub fn key_for<A, K>(&self, identity: &CallIdentity, args: &A, kwargs: &K) -> Result<CacheKey>
    where
        A: Serialize + ?Sized,
        K: Serialize + ?Sized,
    {
        let skip = usize::from(self.ignore_first_argument);
        self.key_generator.generate_skipping(identity, args, kwargs, skip)
    }

    /// Memoized call with positional arguments only
    pub fn call<A, F>(&self, identity: &CallIdentity, args: &A, f: F) -> Result<V>
    where
        A: Serialize + ?Sized,
        F: FnOnce() -> V,
    {
        self.call_with_kwargs(identity, args, &(), f)
    }

    /// Memoized call
    pub fn call_with_kwargs<A, K, F>(
        &self,
        identity: &CallIdentity,
        args: &A,
        kwargs: &K,
        f: F,
    ) -> Result<V>
    where
        A: Serialize + ?Sized,
        K: Serialize + ?Sized,
        F: FnOnce() -> V,
    {
        self.try_call(identity, args, kwargs, || Ok::<V, CacheError>(f()))
    }

    /// Memoized call of a fallible computation
    ///
    /// The computation's error is returned as is and nothing is cached.
    pub fn try_call<A, K, F, E>(
        &self,
        identity: &CallIdentity,
        args: &A,
        kwargs: &K,
        f: F,
    ) -> std::result::Result<V, E>
    where
        A: Serialize + ?Sized,
        K: Serialize + ?Sized,
        F: FnOnce() -> std::result::Result<V, E>,
        E: From<CacheError>,
    {
        if !self.switch.is_active() {
            return f();
        }

        let span = debug_span!("cached call", function = %identity);
        let _enter = span.enter();

        let key = self.key_for(identity, args, kwargs)?;
        if let Some(value) = self.lookup(&key) {
            return Ok(value);
        }

        debug!("Cache miss.");
        let value = debug_span!("original call").in_scope(f)?;
        self.fill(&key, &value);
        Ok(value)
    }

    /// Memoized call of an async computation
    ///
    /// Store operations stay synchronous; only the computation is awaited.
    pub async fn call_async<A, K, F, Fut, E>(
        &self,
        identity: &CallIdentity,
        args: &A,
        kwargs: &K,
        f: F,
    ) -> std::result::Result<V, E>
    where
        A: Serialize + ?Sized,
        K: Serialize + ?Sized,
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<V, E>>,
        E: From<CacheError>,
    {
        if !self.switch.is_active() {
            return f().await;
        }

        let span = debug_span!("cached call", function = %identity);

        let key = self.key_for(identity, args, kwargs)?;
        if let Some(value) = span.in_scope(|| self.lookup(&key)) {
            return Ok(value);
        }

        debug!(parent: &span, "Cache miss.");
        let value = f()
            .instrument(debug_span!(parent: &span, "original call"))
            .await?;
        span.in_scope(|| self.fill(&key, &value));
        Ok(value)
    }

    /// Wrap `f` into a memoized function of `A`
    pub fn memoize<A, F>(self, identity: CallIdentity, f: F) -> Memoized<A, V, F>
    where
        A: Serialize,
        F: Fn(&A) -> V,
    {
        Memoized {
            cache: self,
            identity,
            f,
            _args: PhantomData,
        }
    }

    /// Probe the chain in order; on a hit, back-fill the levels that missed
    fn lookup(&self, key: &[u8]) -> Option<V> {
        let mut downstream: Vec<&Arc<dyn CacheStore<V>>> = Vec::new();

        for store in &self.stores {
            match store.get(key) {
                Ok(value) => {
                    debug!("Cache hit L{} ({}).", downstream.len() + 1, store.name());
                    if !downstream.is_empty() {
                        let _span = debug_span!("update downstream caches").entered();
                        for missed in downstream {
                            missed.set(key.to_vec(), value.clone());
                        }
                    }
                    return Some(value);
                }
                Err(_) => downstream.push(store),
            }
        }

        None
    }

    /// Write a freshly computed value into every level
    fn fill(&self, key: &[u8], value: &V) {
        let _span = debug_span!("update upstream caches").entered();
        for store in &self.stores {
            store.set(key.to_vec(), value.clone());
        }
    }
}

impl<V> fmt::Debug for CallCache<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallCache")
            .field("stores", &self.stores.iter().map(|s| s.name()).collect::<Vec<_>>())
            .field("ignore_first_argument", &self.ignore_first_argument)
            .field("key_generator", &self.key_generator)
            .field("switch", &self.switch)
            .finish()
    }
}

/// A function of `A` whose results are memoized by a [`CallCache`]
pub struct Memoized<A, V, F> {
    cache: CallCache<V>,
    identity: CallIdentity,
    f: F,
    _args: PhantomData<fn(&A)>,
}

impl<A, V, F> Memoized<A, V, F>
where
    A: Serialize,
    V: Clone + Send + 'static,
    F: Fn(&A) -> V,
{
    /// Call the wrapped function, or answer from the caches
    pub fn call(&self, args: &A) -> Result<V> {
        self.cache.call(&self.identity, args, || (self.f)(args))
    }

    pub fn identity(&self) -> &CallIdentity {
        &self.identity
    }

    pub fn cache(&self) -> &CallCache<V> {
        &self.cache
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::store::LocalCache;
    use std::sync::atomic::AtomicUsize;

    fn chain(levels: usize) -> (CallCache<String>, Vec<Arc<LocalCache<String>>>) {
        let stores: Vec<Arc<LocalCache<String>>> =
            (0..levels).map(|_| Arc::new(LocalCache::unconditional())).collect();
        let dyn_stores = stores
            .iter()
            .map(|s| s.clone() as Arc<dyn CacheStore<String>>)
            .collect();
        (CallCache::new(dyn_stores, false).unwrap(), stores)
    }

    fn lookup_city() -> CallIdentity {
        CallIdentity::new("location::forward_lookup")
    }

    #[test]
    fn test_empty_chain_is_rejected() {
        let result = CallCache::<String>::new(Vec::new(), false);
        assert!(matches!(result, Err(CacheError::ConfigError(_))));
    }

    #[test]
    fn test_promotion_from_lower_level() {
        let (cache, stores) = chain(2);
        let key = cache.key_for(&lookup_city(), &("Bonn",), &()).unwrap();
        stores[1].set(key.clone(), "v".to_string());

        let calls = AtomicUsize::new(0);
        let value = cache
            .call(&lookup_city(), &("Bonn",), || {
                calls.fetch_add(1, Ordering::SeqCst);
                "computed".to_string()
            })
            .unwrap();

        assert_eq!(value, "v");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(stores[0].get(&key).unwrap(), "v");
    }

    #[test]
    fn test_full_miss_fills_every_level() {
        let (cache, stores) = chain(2);
        let calls = AtomicUsize::new(0);

        let value = cache
            .call(&lookup_city(), &("Bonn",), || {
                calls.fetch_add(1, Ordering::SeqCst);
                "x".to_string()
            })
            .unwrap();

        let key = cache.key_for(&lookup_city(), &("Bonn",), &()).unwrap();
        assert_eq!(value, "x");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(stores[0].get(&key).unwrap(), "x");
        assert_eq!(stores[1].get(&key).unwrap(), "x");
    }

    #[test]
    fn test_hit_in_first_level_skips_the_rest() {
        let (cache, stores) = chain(3);
        let key = cache.key_for(&lookup_city(), &("Bonn",), &()).unwrap();
        stores[0].set(key.clone(), "fast".to_string());

        let value = cache
            .call(&lookup_city(), &("Bonn",), || "computed".to_string())
            .unwrap();

        assert_eq!(value, "fast");
        assert!(stores[1].is_empty());
        assert_eq!(stores[2].stats().misses + stores[2].stats().hits, 0);
    }

    #[test]
    fn test_ignore_first_argument() {
        let store: Arc<dyn CacheStore<String>> = Arc::new(LocalCache::unconditional());
        let cache = CallCache::new(vec![store], true).unwrap();

        let a = cache.key_for(&lookup_city(), &("service-a", "Bonn"), &()).unwrap();
        let b = cache.key_for(&lookup_city(), &("service-b", "Bonn"), &()).unwrap();
        assert_eq!(a, b);

        let calls = AtomicUsize::new(0);
        for receiver in ["service-a", "service-b"] {
            cache
                .call(&lookup_city(), &(receiver, "Bonn"), || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    "50.7,7.1".to_string()
                })
                .unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_disabled_switch_bypasses_stores() {
        let (cache, stores) = chain(1);
        let switch = CachingSwitch::new(true);
        let cache = cache.with_switch(switch.clone());

        switch.disable();
        let calls = AtomicUsize::new(0);
        for _ in 0..3 {
            cache
                .call(&lookup_city(), &("Bonn",), || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    "x".to_string()
                })
                .unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(stores[0].is_empty());

        switch.enable();
        cache.call(&lookup_city(), &("Bonn",), || "x".to_string()).unwrap();
        assert_eq!(stores[0].len(), 1);
    }

    #[test]
    fn test_errors_propagate_and_are_not_cached() {
        #[derive(Debug, PartialEq)]
        enum LookupError {
            Unavailable,
            Cache(String),
        }

        impl From<CacheError> for LookupError {
            fn from(e: CacheError) -> Self {
                LookupError::Cache(e.to_string())
            }
        }

        let (cache, stores) = chain(2);
        let result: std::result::Result<String, LookupError> =
            cache.try_call(&lookup_city(), &("Bonn",), &(), || Err(LookupError::Unavailable));

        assert_eq!(result, Err(LookupError::Unavailable));
        assert!(stores.iter().all(|s| s.is_empty()));
    }

    #[test]
    fn test_memoized_function() {
        let store: Arc<dyn CacheStore<String>> = Arc::new(LocalCache::lru(10));
        let calls = AtomicUsize::new(0);
        let greet = CallCache::new(vec![store], false)
            .unwrap()
            .memoize(CallIdentity::new("greet"), |(name,): &(String,)| {
                calls.fetch_add(1, Ordering::SeqCst);
                format!("Hello, {}!", name)
            });

        let args = ("Ada".to_string(),);
        assert_eq!(greet.call(&args).unwrap(), "Hello, Ada!");
        assert_eq!(greet.call(&args).unwrap(), "Hello, Ada!");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(greet.identity().name, "greet");
    }

    #[test]
    fn test_call_async_with_tokio_test() {
        let (cache, stores) = chain(1);

        let value: std::result::Result<String, CacheError> = tokio_test::block_on(cache.call_async(
            &lookup_city(),
            &("Bonn",),
            &(),
            || async { Ok("50.7,7.1".to_string()) },
        ));

        assert_eq!(value.unwrap(), "50.7,7.1");
        assert_eq!(stores[0].len(), 1);
    }
}
