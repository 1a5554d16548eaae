//! Memory-over-durable cache with promotion on durable hits

use std::sync::Arc;
use std::time::Duration;

use super::{MemoryCache, PersistentStore};

/// Cache reading memory first, then the durable store
///
/// Cloning is cheap; clones share both layers.
pub struct LayeredCache<V> {
    memory: Arc<MemoryCache<V>>,
    persistent: Arc<dyn PersistentStore<V>>,
}

impl<V> Clone for LayeredCache<V> {
    fn clone(&self) -> Self {
        Self {
            memory: Arc::clone(&self.memory),
            persistent: Arc::clone(&self.persistent),
        }
    }
}

impl<V> LayeredCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new(memory_ttl: Duration, persistent: Arc<dyn PersistentStore<V>>) -> Self {
        Self {
            memory: Arc::new(MemoryCache::new(memory_ttl)),
            persistent,
        }
    }

    /// Memory hit, else durable hit (promoted into memory), else `None`
    pub async fn get(&self, key: &str) -> Option<V> {
        if let Some(value) = self.memory.get(key) {
            return Some(value);
        }

        let value = self.persistent.get(key).await?;
        self.memory.set(key, value.clone());
        Some(value)
    }

    /// Write through both layers
    pub async fn set(&self, key: &str, value: V) {
        self.persistent.set(key, &value).await;
        self.memory.set(key, value);
    }

    /// Empty both layers
    pub async fn clear(&self) {
        self.memory.clear();
        self.persistent.clear().await;
    }

    pub fn purge_expired(&self) -> usize {
        self.memory.purge_expired()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct CountingStore {
        values: Mutex<HashMap<String, String>>,
        reads: AtomicUsize,
    }

    #[async_trait]
    impl PersistentStore<String> for CountingStore {
        async fn get(&self, key: &str) -> Option<String> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            self.values.lock().unwrap().get(key).cloned()
        }

        async fn set(&self, key: &str, value: &String) {
            self.values.lock().unwrap().insert(key.to_string(), value.clone());
        }

        async fn clear(&self) {
            self.values.lock().unwrap().clear();
        }
    }

    #[tokio::test]
    async fn test_durable_hit_is_promoted() {
        let store = Arc::new(CountingStore::default());
        store
            .values
            .lock()
            .unwrap()
            .insert("k".to_string(), "v".to_string());
        let cache: LayeredCache<String> = LayeredCache::new(Duration::from_secs(60), store.clone());

        assert_eq!(cache.get("k").await.as_deref(), Some("v"));
        assert_eq!(cache.get("k").await.as_deref(), Some("v"));
        assert_eq!(store.reads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_miss_in_both_layers() {
        let store = Arc::new(CountingStore::default());
        let cache: LayeredCache<String> = LayeredCache::new(Duration::from_secs(60), store.clone());

        assert!(cache.get("absent").await.is_none());
        assert_eq!(store.reads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_set_writes_through_and_clear_empties_both() {
        let store = Arc::new(CountingStore::default());
        let cache: LayeredCache<String> = LayeredCache::new(Duration::from_secs(60), store.clone());

        cache.set("k", "v".to_string()).await;
        assert_eq!(store.values.lock().unwrap().get("k").map(String::as_str), Some("v"));
        assert_eq!(cache.get("k").await.as_deref(), Some("v"));
        assert_eq!(store.reads.load(Ordering::SeqCst), 0);

        cache.clear().await;
        assert!(cache.get("k").await.is_none());
    }
}
