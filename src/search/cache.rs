//! Parsed content cache for the search path
//!
//! Caches the front matter parse of each file so repeated queries do not
//! re-parse unchanged documents. Entries expire after a fixed time-to-live and
//! the least recently used entry is evicted once the cache is full.

use crate::frontmatter::ParsedContent;
use rustc_hash::{FxHashMap, FxHasher};
use std::collections::BTreeMap;
use std::hash::Hasher;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Hash identifying the exact content an entry was parsed from.
pub fn fingerprint(content: &str) -> u64 {
    let mut hasher = FxHasher::default();
    hasher.write(content.as_bytes());
    hasher.write_usize(content.len());
    hasher.finish()
}

struct CacheEntry {
    parsed: Arc<ParsedContent>,
    fingerprint: u64,
    inserted_at: Instant,
    /// Position in `recency`
    last_used: u64,
}

/// Entries plus a recency index keyed by a monotonic use counter, so a hit
/// and an eviction are both logarithmic.
#[derive(Default)]
struct CacheInner {
    entries: FxHashMap<String, CacheEntry>,
    recency: BTreeMap<u64, String>,
    tick: u64,
}

impl CacheInner {
    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    fn touch(&mut self, key: &str) {
        let tick = self.next_tick();
        if let Some(entry) = self.entries.get_mut(key) {
            let previous = std::mem::replace(&mut entry.last_used, tick);
            self.recency.remove(&previous);
            self.recency.insert(tick, key.to_string());
        }
    }

    fn remove(&mut self, key: &str) -> bool {
        match self.entries.remove(key) {
            Some(entry) => {
                self.recency.remove(&entry.last_used);
                true
            }
            None => false,
        }
    }

    fn evict_oldest(&mut self) {
        if let Some((_, oldest)) = self.recency.pop_first() {
            self.entries.remove(&oldest);
        }
    }
}

/// Bounded, time-limited cache from file path to parsed content.
///
/// Shared between the indexer (which clears it on invalidation) and the
/// search engine; `set` for the same key and content is idempotent.
pub struct ContentCache {
    inner: Mutex<CacheInner>,
    capacity: usize,
    ttl: Duration,
}

impl ContentCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(CacheInner::default()),
            capacity: capacity.max(1),
            ttl,
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Get the cached parse of `path`, provided it was parsed from content
    /// with the same fingerprint and has not expired.
    pub fn get(&self, path: &str, fingerprint: u64) -> Option<Arc<ParsedContent>> {
        let mut inner = self.lock();

        let (fresh, matches) = match inner.entries.get(path) {
            Some(entry) => (
                entry.inserted_at.elapsed() < self.ttl,
                entry.fingerprint == fingerprint,
            ),
            None => return None,
        };

        if !fresh || !matches {
            inner.remove(path);
            return None;
        }

        inner.touch(path);
        inner.entries.get(path).map(|e| Arc::clone(&e.parsed))
    }

    /// Insert or replace the parse of `path`.
    pub fn set(&self, path: &str, fingerprint: u64, parsed: Arc<ParsedContent>) {
        let mut inner = self.lock();

        if !inner.remove(path) && inner.entries.len() >= self.capacity {
            inner.evict_oldest();
        }

        let tick = inner.next_tick();
        inner.entries.insert(
            path.to_string(),
            CacheEntry {
                parsed,
                fingerprint,
                inserted_at: Instant::now(),
                last_used: tick,
            },
        );
        inner.recency.insert(tick, path.to_string());
    }

    /// Drop the entry for one path.
    pub fn remove(&self, path: &str) -> bool {
        self.lock().remove(path)
    }

    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.entries.clear();
        inner.recency.clear();
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontmatter::parse;

    fn parsed(text: &str) -> Arc<ParsedContent> {
        Arc::new(parse(text, "name"))
    }

    #[test]
    fn test_cache_basic() {
        let cache = ContentCache::new(3, Duration::from_secs(60));
        let fp = fingerprint("# One");
        cache.set("/a.md", fp, parsed("# One"));

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("/a.md", fp).unwrap().title, "One");
        assert!(cache.get("/b.md", fp).is_none());
    }

    #[test]
    fn test_changed_content_is_not_trusted() {
        let cache = ContentCache::new(3, Duration::from_secs(60));
        cache.set("/a.md", fingerprint("# One"), parsed("# One"));

        assert!(cache.get("/a.md", fingerprint("# Two")).is_none());
        // The stale entry is dropped
        assert!(cache.is_empty());
    }

    #[test]
    fn test_cache_eviction_lru() {
        let cache = ContentCache::new(2, Duration::from_secs(60));
        let fp = fingerprint("x");
        cache.set("/1", fp, parsed("x"));
        cache.set("/2", fp, parsed("x"));

        // Access /1 to make it most recently used
        assert!(cache.get("/1", fp).is_some());

        cache.set("/3", fp, parsed("x"));
        assert_eq!(cache.len(), 2);
        assert!(cache.get("/1", fp).is_some());
        assert!(cache.get("/2", fp).is_none());
        assert!(cache.get("/3", fp).is_some());
    }

    #[test]
    fn test_expiry() {
        let cache = ContentCache::new(2, Duration::ZERO);
        let fp = fingerprint("x");
        cache.set("/1", fp, parsed("x"));
        assert!(cache.get("/1", fp).is_none());
    }

    #[test]
    fn test_set_same_key_is_idempotent() {
        let cache = ContentCache::new(2, Duration::from_secs(60));
        let fp = fingerprint("x");
        cache.set("/1", fp, parsed("x"));
        cache.set("/1", fp, parsed("x"));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_remove_and_clear() {
        let cache = ContentCache::new(4, Duration::from_secs(60));
        let fp = fingerprint("x");
        cache.set("/1", fp, parsed("x"));
        cache.set("/2", fp, parsed("x"));

        assert!(cache.remove("/1"));
        assert!(!cache.remove("/1"));
        assert_eq!(cache.len(), 1);

        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_repeated_hits_keep_recency_consistent() {
        let cache = ContentCache::new(3, Duration::from_secs(60));
        let fp = fingerprint("x");
        for key in ["/1", "/2", "/3"] {
            cache.set(key, fp, parsed("x"));
        }
        for _ in 0..100 {
            assert!(cache.get("/1", fp).is_some());
            assert!(cache.get("/2", fp).is_some());
        }
        cache.set("/2", fp, parsed("x"));

        // /3 is least recently used, then /1
        cache.set("/4", fp, parsed("x"));
        assert!(cache.get("/3", fp).is_none());
        cache.set("/5", fp, parsed("x"));
        assert!(cache.get("/1", fp).is_none());
        assert_eq!(cache.len(), 3);

        let inner = cache.lock();
        assert_eq!(inner.recency.len(), inner.entries.len());
    }
}
