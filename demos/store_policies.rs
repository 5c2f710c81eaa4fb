//! Store Policies Demo
//!
//! Walks through each eviction policy using a manual clock.
//!
//! Usage:
//!   cargo run --example store_policies

use skill_cache::{
    CacheStore, EvictionPolicy, LocalCache, LocalCacheBuilder, ManualClock, StoreConfig,
};
use std::time::Duration;
use tracing::{info, Level};

fn key(name: &str) -> Vec<u8> {
    name.as_bytes().to_vec()
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();

    info!("--- FIFO (max 2) ---");
    let fifo = LocalCache::fifo(2);
    for name in ["a", "b", "c"] {
        fifo.set(key(name), name.to_string());
    }
    info!("a present: {}", fifo.get(&key("a")).is_ok());
    info!("{}", fifo.stats());

    info!("--- LRU (max 2) ---");
    let lru = LocalCache::lru(2);
    lru.set(key("a"), 1);
    lru.set(key("b"), 2);
    lru.get(&key("a"))?;
    lru.set(key("c"), 3);
    info!("a present: {}, b present: {}", lru.get(&key("a")).is_ok(), lru.get(&key("b")).is_ok());

    info!("--- Soft timeout (10s, threshold 0.5) ---");
    let clock = ManualClock::shared();
    let soft: LocalCache<String> = LocalCacheBuilder::new(EvictionPolicy::SoftTimeout {
        timeout: Duration::from_secs(10),
        threshold: 0.5,
    })
    .clock(clock.clone())
    .build()?;
    soft.set(key("forecast"), "sunny".to_string());

    for step in [4, 2, 5] {
        clock.advance(Duration::from_secs(step));
        match soft.get_with_refresh_hint(&key("forecast")) {
            Ok((value, refresh)) => info!("+{}s: {} (refresh: {})", step, value, refresh),
            Err(e) => info!("+{}s: {}", step, e),
        }
    }

    info!("--- From configuration ---");
    let chain = StoreConfig::chain_from_json(
        r#"[{"policy": "lru", "max_size": 100}, {"policy": "timeout", "timeout_secs": 3600}]"#,
    )?;
    for config in &chain {
        info!("{}", config.policy()?);
    }

    Ok(())
}
