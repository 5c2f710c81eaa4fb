//! Cache entry with creation and last-read timestamps

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A cached payload plus the timestamps eviction policies look at
///
/// Timestamps come from the owning store's clock, so every method takes the
/// current instant explicitly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry<V> {
    payload: V,

    /// When the payload was stored
    pub created_at: DateTime<Utc>,

    /// Last successful read (for LRU tracking and idle time)
    pub last_read_at: DateTime<Utc>,
}

impl<V> CacheEntry<V> {
    /// Create a new entry, created and last read at `now`
    pub fn new(payload: V, now: DateTime<Utc>) -> Self {
        Self {
            payload,
            created_at: now,
            last_read_at: now,
        }
    }

    /// Time since the entry was stored
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        (now - self.created_at).to_std().unwrap_or(Duration::ZERO)
    }

    /// Time since the entry was last read
    pub fn idle_time(&self, now: DateTime<Utc>) -> Duration {
        (now - self.last_read_at).to_std().unwrap_or(Duration::ZERO)
    }

    /// Mark the entry as read without returning the payload
    pub fn touch(&mut self, now: DateTime<Utc>) {
        // a clock stepping backwards must not break last_read_at >= created_at
        if now > self.last_read_at {
            self.last_read_at = now;
        }
    }

    /// Return the payload, counting as an access
    pub fn read(&mut self, now: DateTime<Utc>) -> &V {
        self.touch(now);
        &self.payload
    }

    /// Borrow the payload without touching the entry
    pub fn peek(&self) -> &V {
        &self.payload
    }

    pub fn into_payload(self) -> V {
        self.payload
    }

    /// Whether the entry is older than `timeout`
    pub fn is_expired(&self, timeout: Duration, now: DateTime<Utc>) -> bool {
        self.age(now) > timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn test_cache_entry_creation() {
        let entry = CacheEntry::new("forecast".to_string(), t0());

        assert_eq!(entry.peek(), "forecast");
        assert_eq!(entry.created_at, entry.last_read_at);
        assert_eq!(entry.age(t0()), Duration::ZERO);
    }

    #[test]
    fn test_age_and_idle_time() {
        let mut entry = CacheEntry::new(1u32, t0());

        let later = t0() + ChronoDuration::seconds(30);
        entry.touch(later);

        let now = t0() + ChronoDuration::seconds(45);
        assert_eq!(entry.age(now), Duration::from_secs(45));
        assert_eq!(entry.idle_time(now), Duration::from_secs(15));
    }

    #[test]
    fn test_read_touches_entry() {
        let mut entry = CacheEntry::new(vec![1, 2, 3], t0());
        let now = t0() + ChronoDuration::seconds(5);

        assert_eq!(entry.read(now), &vec![1, 2, 3]);
        assert_eq!(entry.last_read_at, now);
        assert_eq!(entry.created_at, t0());
    }

    #[test]
    fn test_touch_never_moves_backwards() {
        let mut entry = CacheEntry::new((), t0());
        entry.touch(t0() - ChronoDuration::seconds(10));
        assert!(entry.last_read_at >= entry.created_at);
    }

    #[test]
    fn test_entry_expiration() {
        let entry = CacheEntry::new("value", t0());
        let timeout = Duration::from_secs(10);

        assert!(!entry.is_expired(timeout, t0() + ChronoDuration::seconds(10)));
        assert!(entry.is_expired(timeout, t0() + ChronoDuration::seconds(11)));
    }
}
