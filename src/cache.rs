use std::time::{Duration, Instant};

use dashmap::DashMap;

struct CacheEntry<T> {
    value: T,
    expires_at: Instant,
}

/// Keyed expiring store shared by all provider clients. Values are cloned
/// out; a `None`/empty value is cached the same way as a positive one so
/// repeated failing lookups for the same key stay off the network.
pub struct TtlCache<T> {
    map: DashMap<String, CacheEntry<T>>,
}

impl<T: Clone> TtlCache<T> {
    pub fn new() -> Self {
        Self { map: DashMap::new() }
    }

    pub fn get(&self, key: &str) -> Option<T> {
        if let Some(entry) = self.map.get(key) {
            if entry.expires_at > Instant::now() {
                return Some(entry.value.clone());
            }
        }
        // Expired entries are dropped on access; the cache stays bounded by
        // the working set of keys.
        self.map.remove_if(key, |_, e| e.expires_at <= Instant::now());
        None
    }

    pub fn insert(&self, key: impl Into<String>, value: T, ttl: Duration) {
        self.map.insert(
            key.into(),
            CacheEntry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    pub fn remove(&self, key: &str) {
        self.map.remove(key);
    }
}

impl<T: Clone> Default for TtlCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn returns_value_within_ttl_and_drops_it_after() {
        let cache = TtlCache::new();
        cache.insert("k", 42, Duration::from_millis(30));
        assert_eq!(cache.get("k"), Some(42));
        std::thread::sleep(Duration::from_millis(40));
        assert_eq!(cache.get("k"), None);
    }

    #[test]
    fn caches_negative_entries() {
        let cache: TtlCache<Option<String>> = TtlCache::new();
        cache.insert("missing", None, Duration::from_secs(60));
        // A hit carrying `None` is distinguishable from no entry at all.
        assert_eq!(cache.get("missing"), Some(None));
        assert_eq!(cache.get("other"), None);
    }

    #[test]
    fn remove_clears_the_entry() {
        let cache = TtlCache::new();
        cache.insert("k", 1, Duration::from_secs(60));
        cache.remove("k");
        assert_eq!(cache.get("k"), None);
    }
}
