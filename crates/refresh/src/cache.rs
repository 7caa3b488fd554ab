//! In-memory freshness cache.
//!
//! Uses `DashMap` so lookups for distinct cities never contend on a global
//! lock; operations on one key are atomic through the shard lock.

use std::time::{Duration, Instant};

use dashmap::DashMap;

/// A cached payload with the instant it was stored.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub payload: V,
    pub stored_at: Instant,
}

impl<V> CacheEntry<V> {
    /// Stale only once the age exceeds `ttl`. A zero TTL never hits.
    pub fn is_fresh(&self, ttl: Duration) -> bool {
        !ttl.is_zero() && self.stored_at.elapsed() <= ttl
    }
}

/// Thread-safe cache keyed by normalized city identifier.
///
/// TTL is passed per lookup so live and forecast consumers can apply
/// different freshness windows.
#[derive(Debug)]
pub struct FreshnessCache<V> {
    entries: DashMap<String, CacheEntry<V>>,
}

impl<V: Clone> FreshnessCache<V> {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Payload for `key` if it is younger than `ttl`. A stale entry is
    /// evicted as part of the lookup.
    pub fn get(&self, key: &str, ttl: Duration) -> Option<V> {
        self.get_entry(key, ttl).map(|e| e.payload)
    }

    /// Like [`FreshnessCache::get`] but keeps the store instant.
    pub fn get_entry(&self, key: &str, ttl: Duration) -> Option<CacheEntry<V>> {
        if let Some(entry) = self.entries.get(key) {
            if entry.is_fresh(ttl) {
                return Some(entry.clone());
            }
        }
        // Re-check under the write lock: a concurrent `set` may have just
        // replaced the stale entry with a fresh one.
        self.entries.remove_if(key, |_, e| !e.is_fresh(ttl));
        None
    }

    /// Replace any entry for `key`; last writer wins.
    pub fn set(&self, key: &str, payload: V) {
        self.entries.insert(
            key.to_string(),
            CacheEntry {
                payload,
                stored_at: Instant::now(),
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<V: Clone> Default for FreshnessCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_get_after_set_hits() {
        let cache = FreshnessCache::new();
        cache.set("hanoi", 42u32);
        assert_eq!(cache.get("hanoi", Duration::from_secs(60)), Some(42));
    }

    #[test]
    fn test_zero_ttl_misses_and_evicts() {
        let cache = FreshnessCache::new();
        cache.set("hanoi", 42u32);
        assert_eq!(cache.get("hanoi", Duration::ZERO), None);
        assert!(cache.is_empty(), "stale entry should be evicted on lookup");
        assert_eq!(cache.get("hanoi", Duration::from_secs(60)), None);
    }

    #[test]
    fn test_entry_expires_after_ttl() {
        let cache = FreshnessCache::new();
        cache.set("hue", "reading".to_string());
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(cache.get("hue", Duration::from_millis(10)), None);
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn test_age_equal_to_ttl_is_still_fresh() {
        let entry = CacheEntry {
            payload: 1u32,
            stored_at: Instant::now(),
        };
        let age = entry.stored_at.elapsed();
        // Any TTL at least as large as the current age keeps the entry.
        assert!(entry.is_fresh(age + Duration::from_secs(1)));
        assert!(!entry.is_fresh(Duration::ZERO));

        let old = CacheEntry {
            payload: 1u32,
            stored_at: Instant::now() - Duration::from_millis(50),
        };
        assert!(!old.is_fresh(Duration::from_millis(10)));
        assert!(old.is_fresh(Duration::from_secs(1)));
    }

    #[test]
    fn test_missing_key_misses() {
        let cache: FreshnessCache<u32> = FreshnessCache::new();
        assert_eq!(cache.get("nowhere", Duration::from_secs(60)), None);
    }

    #[test]
    fn test_set_replaces_last_writer_wins() {
        let cache = FreshnessCache::new();
        cache.set("hanoi", 1u32);
        let first = cache.get_entry("hanoi", Duration::from_secs(60)).unwrap();
        cache.set("hanoi", 2u32);
        let second = cache.get_entry("hanoi", Duration::from_secs(60)).unwrap();
        assert_eq!(second.payload, 2);
        assert!(second.stored_at >= first.stored_at);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_ttl_is_per_lookup() {
        let cache = FreshnessCache::new();
        cache.set("hanoi", 7u32);
        std::thread::sleep(Duration::from_millis(20));
        // A long window still sees it; a short one evicts it.
        assert_eq!(cache.get("hanoi", Duration::from_secs(3600)), Some(7));
        assert_eq!(cache.get("hanoi", Duration::from_millis(5)), None);
    }

    #[test]
    fn test_concurrent_writers_leave_one_entry_per_key() {
        let cache: Arc<FreshnessCache<usize>> = Arc::new(FreshnessCache::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let cache = cache.clone();
                std::thread::spawn(move || {
                    for n in 0..200 {
                        cache.set(&format!("city-{}", i % 2), n);
                        let _ = cache.get(&format!("city-{}", (i + 1) % 2), Duration::from_secs(60));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("city-0", Duration::from_secs(60)), Some(199));
    }
}
