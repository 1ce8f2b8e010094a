use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;

#[derive(Clone, Debug)]
struct CacheEntry<V> {
    value: V,
    loaded_at: Instant,
}

/// Shared value cache with time-based refresh.
///
/// Readers within `ttl` of the last load get the cached value. A stale or
/// missing entry is reloaded through the caller's loader; a failed load leaves
/// the previous entry in place and returns the error.
#[derive(Debug)]
pub struct TtlCache<K, V> {
    entries: Arc<RwLock<HashMap<K, CacheEntry<V>>>>,
}

impl<K, V> Clone for TtlCache<K, V> {
    fn clone(&self) -> Self {
        Self { entries: Arc::clone(&self.entries) }
    }
}

impl<K, V> Default for TtlCache<K, V> {
    fn default() -> Self {
        Self { entries: Arc::new(RwLock::new(HashMap::new())) }
    }
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get_or_refresh<F, Fut, E>(&self, key: K, ttl: Duration, loader: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(entry) = self.entries.read().await.get(&key) {
            if entry.loaded_at.elapsed() < ttl {
                return Ok(entry.value.clone());
            }
        }

        let value = loader().await?;
        self.entries
            .write()
            .await
            .insert(key, CacheEntry { value: value.clone(), loaded_at: Instant::now() });
        Ok(value)
    }

    pub async fn invalidate(&self, key: &K) {
        self.entries.write().await.remove(key);
    }
}
