//! Memoization Demo Application
//!
//! Wraps a slow lookup in a two-level cache chain and shows hits, promotion
//! and the caching switch.
//!
//! Usage:
//!   cargo run --example memoize_demo
//!
//! Environment variables:
//!   SKILL_NAME                  - key prefix (default: unnamed_service)
//!   SKILL_CACHES_ACTIVE         - switch caches on or off (default: true)
//!   SKILL_CACHE_VALIDATE_EVERY  - sets between validation passes (default: 1000)
//!   RUST_LOG                    - log filter, e.g. `skill_cache=debug`

use skill_cache::{CacheSettings, CacheStore, CallCache, CallIdentity, LocalCache};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;
use tracing_subscriber::EnvFilter;

async fn slow_geocode(city: &str) -> anyhow::Result<String> {
    tokio::time::sleep(Duration::from_millis(300)).await;
    Ok(format!("coordinates of {}", city))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("=== Call Cache Demo ===");

    let settings = CacheSettings::from_env()?;
    info!("Using key prefix {:?}", settings.service_name);

    let fast: Arc<dyn CacheStore<String>> = Arc::new(LocalCache::lru(2));
    let slow: Arc<dyn CacheStore<String>> = Arc::new(LocalCache::timeout(Duration::from_secs(600)));
    let cache = CallCache::with_settings(vec![fast.clone(), slow.clone()], false, &settings)?;
    let identity = CallIdentity::new("slow_geocode");

    info!("\n--- Cold and warm calls ---");
    for city in ["Berlin", "Berlin", "Paris", "Rome", "Berlin"] {
        let started = Instant::now();
        let coordinates = cache
            .call_async(&identity, &(city,), &(), || slow_geocode(city))
            .await?;
        info!("{} -> {} ({:?})", city, coordinates, started.elapsed());
    }

    info!("L1: {}", fast.stats());
    info!("L2: {}", slow.stats());

    info!("\n--- Caching switched off ---");
    cache.switch().disable();
    let started = Instant::now();
    cache
        .call_async(&identity, &("Berlin",), &(), || slow_geocode("Berlin"))
        .await?;
    info!("Berlin recomputed in {:?}", started.elapsed());

    Ok(())
}
