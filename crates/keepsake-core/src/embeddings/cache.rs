//! Embedding cache
//!
//! Memoizes `(model, text) -> vector` by content hash, independent of which
//! memory the text belongs to. Bounded LRU.

use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use lru::LruCache;
use serde::Serialize;

/// Cache key: blake3 over `model || 0x00 || text`
pub type CacheKey = [u8; 32];

/// Cache counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    /// Maximum entries
    pub capacity: usize,
    /// Current entries
    pub len: usize,
    /// Lookups served from the cache
    pub hits: u64,
    /// Lookups that fell through to the provider
    pub misses: u64,
}

impl CacheStats {
    /// Hits over total lookups
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// LRU cache of embeddings keyed by content hash
pub struct EmbeddingCache {
    entries: Mutex<LruCache<CacheKey, Vec<f32>>>,
    capacity: usize,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl EmbeddingCache {
    /// Create a cache holding up to `capacity` vectors (minimum 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let bound = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(bound)),
            capacity,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Hash a model/text pair
    pub fn key(model: &str, text: &str) -> CacheKey {
        let mut hasher = blake3::Hasher::new();
        hasher.update(model.as_bytes());
        hasher.update(&[0]);
        hasher.update(text.as_bytes());
        *hasher.finalize().as_bytes()
    }

    /// Look up a vector, counting the hit or miss
    pub fn get(&self, model: &str, text: &str) -> Option<Vec<f32>> {
        let key = Self::key(model, text);
        // A poisoned cache still holds valid vectors
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        match entries.get(&key) {
            Some(vector) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(vector.clone())
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Insert a vector, evicting the least recently used entry when full
    pub fn put(&self, model: &str, text: &str, vector: Vec<f32>) {
        let key = Self::key(model, text);
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.put(key, vector);
    }

    /// Drop every entry (counters are kept)
    pub fn clear(&self) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.clear();
    }

    /// Current counters
    pub fn stats(&self) -> CacheStats {
        let len = self
            .entries
            .lock()
            .map(|entries| entries.len())
            .unwrap_or_else(|e| e.into_inner().len());
        CacheStats {
            capacity: self.capacity,
            len,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}
