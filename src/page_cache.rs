use lru::LruCache;
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Cache key for the rendered index listing. The index is the only cached
/// fragment and it is keyed by name, not by query string.
pub const INDEX_PAGE_KEY: &str = "index_page";

struct Entry {
    body: String,
    stored_at: Instant,
}

/// LRU cache of rendered page fragments with time-based expiry. Writes do
/// not invalidate entries; staleness is bounded only by the TTL.
pub struct PageCache {
    inner: Mutex<LruCache<String, Entry>>,
    ttl: Duration,
}

impl PageCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        PageCache {
            inner: Mutex::new(LruCache::new(
                NonZeroUsize::new(capacity.max(1)).unwrap(),
            )),
            ttl,
        }
    }

    pub async fn get(&self, key: &str) -> Option<String> {
        let mut cache = self.inner.lock().await;
        if let Some(entry) = cache.get(key) {
            if entry.stored_at.elapsed() < self.ttl {
                return Some(entry.body.clone());
            }
        }
        // Missing or past its TTL; drop whatever is there
        cache.pop(key);
        None
    }

    pub async fn insert(&self, key: &str, body: String) {
        let mut cache = self.inner.lock().await;
        cache.put(
            key.to_string(),
            Entry {
                body,
                stored_at: Instant::now(),
            },
        );
    }

    /// Drops a single entry, forcing the next read to re-render.
    pub async fn purge(&self, key: &str) {
        self.inner.lock().await.pop(key);
    }
}
