//! Search boundary: the indexed document set plus the engine that queries it.
//!
//! Documents are loaded lazily through a caller-supplied loader the first time
//! a searchable query arrives after the set was marked stale. Single documents
//! can be updated in place with [`SearchService::upsert`] and
//! [`SearchService::remove`].

use crate::config::SearchConfig;
use crate::search::cache::ContentCache;
use crate::search::engine::{SearchEngine, SearchFile};
use crate::search::query::{SearchQuery, SearchResult};

use rustc_hash::FxHashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;
use tracing::{debug, info};

#[derive(Default)]
struct Documents {
    files: Vec<SearchFile>,
    positions: FxHashMap<String, usize>,
    /// Generation the set was loaded at, `None` before the first load
    loaded_at: Option<u64>,
}

impl Documents {
    fn reindex_positions(&mut self) {
        self.positions = self
            .files
            .iter()
            .enumerate()
            .map(|(i, f)| (f.path.clone(), i))
            .collect();
    }
}

pub struct SearchService {
    engine: SearchEngine,
    documents: RwLock<Documents>,
    /// Bumped whenever the loaded set stops being trustworthy
    generation: AtomicU64,
    load_lock: tokio::sync::Mutex<()>,
}

impl SearchService {
    pub fn new(cache: Arc<ContentCache>, config: SearchConfig) -> Self {
        Self {
            engine: SearchEngine::new(cache, config),
            documents: RwLock::new(Documents::default()),
            generation: AtomicU64::new(0),
            load_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn engine(&self) -> &SearchEngine {
        &self.engine
    }

    /// Whether the document set is loaded and not stale.
    pub fn is_indexed(&self) -> bool {
        let documents = self.documents.read().unwrap_or_else(PoisonError::into_inner);
        documents.loaded_at == Some(self.generation.load(Ordering::SeqCst))
    }

    pub fn document_count(&self) -> usize {
        self.documents
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .files
            .len()
    }

    /// Load the document set through `loader` unless it is already current.
    ///
    /// Concurrent callers wait for a single load.
    pub async fn ensure_indexed<F, Fut>(&self, loader: F)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Vec<SearchFile>>,
    {
        if self.is_indexed() {
            return;
        }
        let _guard = self.load_lock.lock().await;
        if self.is_indexed() {
            return;
        }

        let generation = self.generation.load(Ordering::SeqCst);
        let started = Instant::now();
        let files = loader().await;

        let mut documents = self.documents.write().unwrap_or_else(PoisonError::into_inner);
        documents.files = files;
        documents.reindex_positions();
        documents.loaded_at = Some(generation);
        info!(
            documents = documents.files.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Search documents loaded"
        );
    }

    /// Force the next `ensure_indexed` to reload.
    pub fn mark_stale(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        debug!("Search documents marked stale");
    }

    /// Search the loaded documents.
    pub fn search(&self, query: &SearchQuery) -> Vec<SearchResult> {
        if !query.is_searchable() {
            return Vec::new();
        }
        let documents = self.documents.read().unwrap_or_else(PoisonError::into_inner);
        self.engine.search(&documents.files, query)
    }

    pub fn matches(&self, file: &SearchFile, query: &SearchQuery) -> bool {
        self.engine.matches(file, query)
    }

    pub fn count_matches(&self, query: &SearchQuery) -> usize {
        if !query.is_searchable() {
            return 0;
        }
        let documents = self.documents.read().unwrap_or_else(PoisonError::into_inner);
        self.engine.count_matches(&documents.files, query)
    }

    pub fn suggestions(&self, query: &SearchQuery) -> Vec<String> {
        if !query.is_searchable() {
            return Vec::new();
        }
        let documents = self.documents.read().unwrap_or_else(PoisonError::into_inner);
        self.engine.suggestions(&documents.files, query)
    }

    /// Insert or replace one document.
    pub fn upsert(&self, file: SearchFile) {
        self.engine.cache().remove(&file.path);
        let mut documents = self.documents.write().unwrap_or_else(PoisonError::into_inner);
        match documents.positions.get(&file.path).copied() {
            Some(i) => documents.files[i] = file,
            None => {
                let i = documents.files.len();
                documents.positions.insert(file.path.clone(), i);
                documents.files.push(file);
            }
        }
    }

    /// Drop one document. Returns whether it was present.
    pub fn remove(&self, path: &str) -> bool {
        self.engine.cache().remove(path);
        let mut documents = self.documents.write().unwrap_or_else(PoisonError::into_inner);
        let Some(i) = documents.positions.get(path).copied() else {
            return false;
        };
        documents.files.remove(i);
        documents.reindex_positions();
        true
    }

    /// Drop every document and cached parse; the next query reloads.
    pub fn clear(&self) {
        {
            let mut documents = self.documents.write().unwrap_or_else(PoisonError::into_inner);
            *documents = Documents::default();
        }
        self.engine.cache().clear();
        self.mark_stale();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn service() -> SearchService {
        SearchService::new(
            Arc::new(ContentCache::new(100, Duration::from_secs(60))),
            SearchConfig::default(),
        )
    }

    fn docs() -> Vec<SearchFile> {
        vec![
            SearchFile::new("/p/a.md", "# Alpha\nfirst"),
            SearchFile::new("/p/b.md", "# Beta\nsecond"),
        ]
    }

    #[tokio::test]
    async fn test_loads_once_until_stale() {
        let service = service();
        let loads = &AtomicUsize::new(0);
        let loader = move || async move {
            loads.fetch_add(1, Ordering::SeqCst);
            docs()
        };

        service.ensure_indexed(loader).await;
        service.ensure_indexed(loader).await;
        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert_eq!(service.document_count(), 2);

        service.mark_stale();
        assert!(!service.is_indexed());
        service.ensure_indexed(loader).await;
        assert_eq!(loads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_concurrent_loads_share_one() {
        let service = service();
        let loads = &AtomicUsize::new(0);
        let loader = move || async move {
            loads.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            docs()
        };
        tokio::join!(
            service.ensure_indexed(loader),
            service.ensure_indexed(loader),
            service.ensure_indexed(loader)
        );
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_upsert_and_remove() {
        let service = service();
        service.ensure_indexed(|| async { docs() }).await;

        service.upsert(SearchFile::new("/p/a.md", "# Alpha\nchanged"));
        assert!(service.search(&SearchQuery::new("first")).is_empty());
        assert_eq!(service.search(&SearchQuery::new("changed")).len(), 1);

        service.upsert(SearchFile::new("/p/c.md", "# Gamma"));
        assert_eq!(service.document_count(), 3);

        assert!(service.remove("/p/b.md"));
        assert!(!service.remove("/p/b.md"));
        assert!(service.search(&SearchQuery::new("second")).is_empty());
        assert_eq!(service.search(&SearchQuery::new("gamma"))[0].id, "/p/c.md");
    }

    #[tokio::test]
    async fn test_clear() {
        let service = service();
        service.ensure_indexed(|| async { docs() }).await;
        assert_eq!(service.count_matches(&SearchQuery::new("second")), 1);

        service.clear();
        assert!(!service.is_indexed());
        assert_eq!(service.document_count(), 0);
        assert!(service.engine().cache().is_empty());
    }
}
