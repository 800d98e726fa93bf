//! The prompt library service.
//!
//! [`PromptLibrary`] is the one object a running instance owns. It wires the
//! content store, the structural index, the search boundary and the shared
//! parsed-content cache together, and funnels every mutation through the
//! invalidate/rebuild API so the index and the search documents never drift
//! from each other.

use crate::config::Config;
use crate::index::walker::is_prompt_path;
use crate::index::{IndexPhase, InvalidationReason, PromptIndexer, PromptStructure};
use crate::search::{ContentCache, SearchFile, SearchQuery, SearchResult, SearchService};
use crate::store::{ContentStore, FsContentStore};

use anyhow::Result;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::warn;

#[derive(Clone)]
pub struct PromptLibrary {
    store: Arc<dyn ContentStore>,
    indexer: PromptIndexer,
    search: Arc<SearchService>,
    readme_name: String,
}

impl PromptLibrary {
    /// Library over the local filesystem.
    pub fn new(config: &Config) -> Result<Self> {
        Self::with_store(config, Arc::new(FsContentStore::new()))
    }

    /// Library over any content store.
    pub fn with_store(config: &Config, store: Arc<dyn ContentStore>) -> Result<Self> {
        let cache = Arc::new(ContentCache::new(
            config.search.cache_max_entries,
            config.search.cache_ttl(),
        ));
        let indexer = PromptIndexer::new(&config.library, Arc::clone(&store), Arc::clone(&cache))?;
        let search = Arc::new(SearchService::new(cache, config.search.clone()));
        Ok(Self {
            store,
            indexer,
            search,
            readme_name: config.library.readme_name.clone(),
        })
    }

    pub fn root(&self) -> &Path {
        self.indexer.root()
    }

    pub fn indexer(&self) -> &PromptIndexer {
        &self.indexer
    }

    pub fn search_service(&self) -> &SearchService {
        &self.search
    }

    pub fn phase(&self) -> IndexPhase {
        self.indexer.phase()
    }

    /// Cached structure, possibly empty or stale. Never walks.
    pub fn current(&self) -> Arc<PromptStructure> {
        self.indexer.get()
    }

    /// Up-to-date structure, walking first when needed.
    pub async fn structure(&self) -> Arc<PromptStructure> {
        self.indexer.ensure_and_get().await
    }

    pub async fn build(&self) -> Arc<PromptStructure> {
        self.indexer.build().await
    }

    /// Record an external change (for example from the file watcher).
    pub fn invalidate(&self, reason: InvalidationReason, path: Option<&Path>) {
        self.indexer.invalidate(reason, path);
        self.search.mark_stale();
    }

    /// Debounced rebuild, coalesced with other requests in the same window.
    pub async fn rebuild(&self) -> Arc<PromptStructure> {
        self.search.mark_stale();
        self.indexer.rebuild().await
    }

    /// Rebuild right away, bypassing the debounce window.
    pub async fn rebuild_now(&self) -> Arc<PromptStructure> {
        self.search.mark_stale();
        self.indexer.rebuild_now().await
    }

    /// Ranked search over every prompt.
    ///
    /// An inactive, empty or invalid query returns immediately without
    /// indexing or reading anything.
    pub async fn search(&self, query: &SearchQuery) -> Vec<SearchResult> {
        if !self.accepts(query) {
            return Vec::new();
        }
        self.ensure_documents().await;
        self.search.search(query)
    }

    pub async fn count_matches(&self, query: &SearchQuery) -> usize {
        if !self.accepts(query) {
            return 0;
        }
        self.ensure_documents().await;
        self.search.count_matches(query)
    }

    pub async fn suggestions(&self, query: &SearchQuery) -> Vec<String> {
        if !self.accepts(query) {
            return Vec::new();
        }
        self.ensure_documents().await;
        self.search.suggestions(query)
    }

    /// Whether one prompt matches. A missing or unreadable file never matches.
    pub async fn matches(&self, path: &Path, query: &SearchQuery) -> bool {
        if !self.accepts(query) {
            return false;
        }
        match self.store.read(path).await {
            Ok(content) => self
                .search
                .matches(&SearchFile::new(path.to_string_lossy(), content), query),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read prompt for matching");
                false
            }
        }
    }

    pub async fn create_prompt(&self, folder: Option<&Path>, name: &str) -> Result<PathBuf> {
        let result = self.indexer.create_prompt(folder, name).await;
        self.search.mark_stale();
        result
    }

    pub async fn create_folder(&self, parent: Option<&Path>, name: &str) -> Result<PathBuf> {
        self.indexer.create_folder(parent, name).await
    }

    pub async fn delete_prompt(&self, path: &Path) -> Result<()> {
        let result = self.indexer.delete_prompt(path).await;
        self.search.mark_stale();
        result
    }

    pub async fn delete_folder(&self, path: &Path) -> Result<()> {
        let result = self.indexer.delete_folder(path).await;
        self.search.mark_stale();
        result
    }

    /// Replace a prompt's content and update its search document in place.
    pub async fn write_prompt(&self, path: &Path, content: &str) -> Result<()> {
        let result = self.indexer.write_prompt(path, content).await;
        match &result {
            Ok(()) => {
                let path = self.resolve(path);
                if is_prompt_path(&path, &self.readme_name) {
                    self.search
                        .upsert(SearchFile::new(path.to_string_lossy(), content));
                }
            }
            Err(_) => self.search.mark_stale(),
        }
        result
    }

    /// Gate shared by every search entry point, checked before any loading.
    fn accepts(&self, query: &SearchQuery) -> bool {
        if !query.is_searchable() {
            return false;
        }
        let max_fuzzy_distance = self.search.engine().config().max_fuzzy_distance;
        match query.validate(max_fuzzy_distance) {
            Ok(()) => true,
            Err(e) => {
                warn!(query = %query.text(), error = %e, "Rejected search query");
                false
            }
        }
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root().join(path)
        }
    }

    async fn ensure_documents(&self) {
        self.search.ensure_indexed(|| self.load_documents()).await;
    }

    /// Read every prompt of the current structure. Unreadable files are skipped.
    async fn load_documents(&self) -> Vec<SearchFile> {
        let structure = self.indexer.ensure_and_get().await;
        let mut files = Vec::with_capacity(structure.prompt_count());
        for prompt in structure.all_prompts() {
            match self.store.read(&prompt.path).await {
                Ok(content) => files.push(SearchFile::new(prompt.path.to_string_lossy(), content)),
                Err(e) => {
                    warn!(path = %prompt.path.display(), error = %e, "Skipping unreadable prompt for search");
                }
            }
        }
        files
    }
}
