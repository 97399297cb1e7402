use crate::prelude::{Arc, Mutex};
use lru::LruCache;
use std::num::NonZeroUsize;

/// LRU cache of fetched tile bytes keyed by request URL
///
/// Clones share storage, so several layers pointing at the same service can
/// share one cache.
#[derive(Debug, Clone)]
pub struct TileCache {
    cache: Arc<Mutex<LruCache<String, Arc<Vec<u8>>>>>,
}

impl TileCache {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            cache: Arc::new(Mutex::new(LruCache::new(capacity))),
        }
    }

    /// Cache holding `capacity` tiles, or `None` when caching is disabled (zero)
    pub fn with_capacity(capacity: usize) -> Option<Self> {
        NonZeroUsize::new(capacity).map(Self::new)
    }

    /// Get tile bytes, promoting the entry
    pub fn get(&self, url: &str) -> Option<Arc<Vec<u8>>> {
        self.cache.lock().ok()?.get(url).cloned()
    }

    pub fn insert(&self, url: String, data: Arc<Vec<u8>>) {
        if let Ok(mut cache) = self.cache.lock() {
            if let Some((evicted, _)) = cache.push(url, data) {
                log::trace!("evicted cached tile {}", evicted);
            }
        }
    }

    /// Check without promoting the entry
    pub fn contains(&self, url: &str) -> bool {
        self.cache
            .lock()
            .map(|cache| cache.contains(url))
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.cache.lock().map(|cache| cache.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.cache
            .lock()
            .map(|cache| cache.cap().get())
            .unwrap_or(0)
    }

    pub fn clear(&self) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bytes(n: u8) -> Arc<Vec<u8>> {
        Arc::new(vec![n])
    }

    #[test]
    fn test_zero_capacity_disables_cache() {
        assert!(TileCache::with_capacity(0).is_none());
        assert_eq!(TileCache::with_capacity(8).map(|c| c.capacity()), Some(8));
    }

    #[test]
    fn test_least_recently_used_is_evicted() {
        let cache = TileCache::with_capacity(2).unwrap();
        cache.insert("a".to_string(), bytes(1));
        cache.insert("b".to_string(), bytes(2));
        assert!(cache.get("a").is_some());
        cache.insert("c".to_string(), bytes(3));

        assert!(cache.contains("a"));
        assert!(!cache.contains("b"));
        assert!(cache.contains("c"));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_clones_share_storage() {
        let cache = TileCache::with_capacity(4).unwrap();
        let shared = cache.clone();
        shared.insert("a".to_string(), bytes(7));
        assert_eq!(cache.get("a").map(|d| d[0]), Some(7));
        cache.clear();
        assert!(shared.is_empty());
    }
}
