//! In-process TTL cache

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;
use tokio::time::Instant;

struct Slot<V> {
    value: V,
    expires_at: Instant,
}

/// Map of values that expire `ttl` after they were last written
pub struct MemoryCache<V> {
    entries: RwLock<HashMap<String, Slot<V>>>,
    ttl: Duration,
}

impl<V: Clone> MemoryCache<V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    pub fn get(&self, key: &str) -> Option<V> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries
            .get(key)
            .filter(|slot| slot.expires_at > Instant::now())
            .map(|slot| slot.value.clone())
    }

    pub fn set(&self, key: &str, value: V) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.insert(
            key.to_string(),
            Slot {
                value,
                expires_at: Instant::now() + self.ttl,
            },
        );
    }

    pub fn clear(&self) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Drop expired entries; returns how many were removed
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|_, slot| slot.expires_at > now);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire_after_ttl() {
        let cache = MemoryCache::new(Duration::from_secs(60));
        cache.set("k", 1u32);
        assert_eq!(cache.get("k"), Some(1));

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(cache.get("k"), None);
        assert_eq!(cache.purge_expired(), 1);
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_overwrite_refreshes_ttl() {
        let cache = MemoryCache::new(Duration::from_secs(60));
        cache.set("k", 1u32);
        tokio::time::advance(Duration::from_secs(45)).await;
        cache.set("k", 2u32);
        tokio::time::advance(Duration::from_secs(45)).await;

        assert_eq!(cache.get("k"), Some(2));
        assert_eq!(cache.purge_expired(), 0);
    }

    #[test]
    fn test_clear() {
        let cache = MemoryCache::new(Duration::from_secs(60));
        cache.set("a", "x".to_string());
        cache.set("b", "y".to_string());
        assert_eq!(cache.len(), 2);

        cache.clear();
        assert_eq!(cache.get("a"), None);
    }
}
