//! Rendered page cache

use crate::pdf::RenderedPage;
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::Arc;

struct CacheInner {
    lru: LruCache<String, Arc<RenderedPage>>,
    total_bytes: usize,
}

/// Cache of rendered pages with entry count and byte budget limits
pub struct RenderCache {
    inner: Mutex<CacheInner>,
    max_bytes: usize,
}

impl RenderCache {
    /// Create a new cache with the specified entry capacity and byte budget
    pub fn new(capacity: usize, max_bytes: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(CacheInner {
                lru: LruCache::new(capacity),
                total_bytes: 0,
            }),
            max_bytes,
        }
    }

    /// Store a rendered page.
    /// Rejects pages larger than max_bytes entirely.
    /// Evicts LRU entries until the byte budget is satisfied.
    pub fn put(&self, key: String, page: Arc<RenderedPage>) {
        let new_size = page.byte_size();

        if new_size > self.max_bytes {
            tracing::debug!(key = %key, bytes = new_size, "page too large to cache");
            return;
        }

        let mut inner = self.inner.lock();

        if let Some(old) = inner.lru.pop(&key) {
            inner.total_bytes = inner.total_bytes.saturating_sub(old.byte_size());
        }

        while inner.total_bytes + new_size > self.max_bytes {
            if let Some((_evicted_key, evicted)) = inner.lru.pop_lru() {
                inner.total_bytes = inner.total_bytes.saturating_sub(evicted.byte_size());
            } else {
                break;
            }
        }

        // Count-based eviction from `push` is not reported by `put`.
        if let Some((_evicted_key, evicted)) = inner.lru.push(key, page) {
            inner.total_bytes = inner.total_bytes.saturating_sub(evicted.byte_size());
        }
        inner.total_bytes += new_size;
    }

    /// Get a rendered page
    pub fn get(&self, key: &str) -> Option<Arc<RenderedPage>> {
        self.inner.lock().lru.get(key).cloned()
    }

    /// Check if a key exists in the cache
    pub fn contains(&self, key: &str) -> bool {
        self.inner.lock().lru.contains(key)
    }

    /// Remove an entry from the cache
    pub fn remove(&self, key: &str) -> Option<Arc<RenderedPage>> {
        let mut inner = self.inner.lock();
        let page = inner.lru.pop(key)?;
        inner.total_bytes = inner.total_bytes.saturating_sub(page.byte_size());
        Some(page)
    }

    /// Clear all entries from the cache
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.lru.clear();
        inner.total_bytes = 0;
    }

    pub fn len(&self) -> usize {
        self.inner.lock().lru.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().lru.is_empty()
    }

    /// Total pixel bytes currently stored
    pub fn total_bytes(&self) -> usize {
        self.inner.lock().total_bytes
    }
}
