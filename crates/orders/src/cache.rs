//! Read-through cache for read-mostly lookups.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;

use tokio::sync::RwLock;

#[derive(Debug)]
struct Entries<K, V> {
    values: HashMap<K, V>,
    /// Bumped per key on every invalidation.
    generations: HashMap<K, u64>,
    /// Bumped on [`ReadThroughCache::clear`].
    epoch: u64,
}

impl<K: Eq + Hash, V> Entries<K, V> {
    fn stamp(&self, key: &K) -> (u64, u64) {
        (self.epoch, self.generations.get(key).copied().unwrap_or(0))
    }
}

/// A shared map filled on first read and invalidated on write.
///
/// A load that overlaps an invalidation of its key returns what it read but
/// does not store it, so a write is never shadowed by an older read.
#[derive(Debug)]
pub struct ReadThroughCache<K, V> {
    name: &'static str,
    entries: Arc<RwLock<Entries<K, V>>>,
}

impl<K, V> Clone for ReadThroughCache<K, V> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            entries: Arc::clone(&self.entries),
        }
    }
}

impl<K, V> ReadThroughCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Creates an empty cache. `name` labels the hit/miss metrics.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            entries: Arc::new(RwLock::new(Entries {
                values: HashMap::new(),
                generations: HashMap::new(),
                epoch: 0,
            })),
        }
    }

    /// Returns the cached value, or runs `load` and caches what it finds.
    ///
    /// Absent values are not cached.
    pub async fn get_or_load<E, F, Fut>(&self, key: &K, load: F) -> Result<Option<V>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<V>, E>>,
    {
        let stamp = {
            let entries = self.entries.read().await;
            if let Some(value) = entries.values.get(key) {
                metrics::counter!("cache_hits_total", "cache" => self.name).increment(1);
                return Ok(Some(value.clone()));
            }
            entries.stamp(key)
        };

        metrics::counter!("cache_misses_total", "cache" => self.name).increment(1);
        let loaded = load().await?;
        if let Some(value) = &loaded {
            let mut entries = self.entries.write().await;
            if entries.stamp(key) == stamp {
                entries.values.insert(key.clone(), value.clone());
            } else {
                metrics::counter!("cache_stale_loads_total", "cache" => self.name).increment(1);
            }
        }
        Ok(loaded)
    }

    pub async fn invalidate(&self, key: &K) {
        let mut entries = self.entries.write().await;
        entries.values.remove(key);
        *entries.generations.entry(key.clone()).or_insert(0) += 1;
    }

    pub async fn clear(&self) {
        let mut entries = self.entries.write().await;
        entries.values.clear();
        entries.generations.clear();
        entries.epoch += 1;
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.values.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.values.is_empty()
    }
}
