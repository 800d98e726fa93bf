//! Cached prompt index with rebuild coalescing.
//!
//! [`PromptIndexer`] owns the single [`PromptStructure`] of the library. The
//! structure is rebuilt wholesale from a directory walk; there is no partial
//! update. The state machine:
//!
//! - `Empty`: never built, `get()` returns an empty structure
//! - `Fresh`: built and not invalidated since the walk started
//! - `Stale`: invalidated, the next `ensure_and_get()` walks again
//!
//! At most one walk runs at a time. Callers that ask for a build while one is
//! in flight await that same walk. Debounced rebuilds additionally wait for a
//! short window so a burst of filesystem events costs a single walk.

use crate::config::LibraryConfig;
use crate::frontmatter::prompt_template;
use crate::index::path_filter::PathFilter;
use crate::index::structure::PromptStructure;
use crate::index::walker::{self, WalkOptions};
use crate::search::ContentCache;
use crate::store::ContentStore;
use crate::utils::slugify;

use anyhow::{bail, ensure, Result};
use futures_util::future::{BoxFuture, FutureExt, Shared};
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Lifecycle phase of the cached structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexPhase {
    Empty,
    Fresh,
    Stale,
}

/// Why the index was invalidated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidationReason {
    Created,
    Modified,
    Deleted,
    /// Explicit refresh with no specific file
    Refresh,
}

impl fmt::Display for InvalidationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Created => "created",
            Self::Modified => "modified",
            Self::Deleted => "deleted",
            Self::Refresh => "refresh",
        };
        f.write_str(s)
    }
}

/// Output of one walk: the structure and the invalidation epoch it started at.
#[derive(Clone)]
struct BuildOutcome {
    structure: Arc<PromptStructure>,
    epoch: u64,
}

type SharedBuild = Shared<BoxFuture<'static, BuildOutcome>>;

struct IndexState {
    structure: Arc<PromptStructure>,
    phase: IndexPhase,
    /// Bumped on every invalidation
    epoch: u64,
    in_flight: Option<SharedBuild>,
    debounced: Option<SharedBuild>,
}

struct IndexerInner {
    root: PathBuf,
    readme_name: String,
    filter: PathFilter,
    debounce: Duration,
    store: Arc<dyn ContentStore>,
    content_cache: Arc<ContentCache>,
    state: Mutex<IndexState>,
    walks: AtomicUsize,
}

impl IndexerInner {
    fn lock_state(&self) -> MutexGuard<'_, IndexState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Return the in-flight walk, or start one.
    fn join_or_start_build(self: &Arc<Self>) -> SharedBuild {
        let mut state = self.lock_state();
        if let Some(build) = &state.in_flight {
            return build.clone();
        }

        let epoch = state.epoch;
        let inner = Arc::clone(self);
        let build = async move {
            let structure = Arc::new(inner.walk().await);
            inner.commit(&structure, epoch);
            BuildOutcome { structure, epoch }
        }
        .boxed()
        .shared();

        state.in_flight = Some(build.clone());
        build
    }

    /// Await walks until one that started at or after `epoch` has completed.
    async fn build_at_least(self: &Arc<Self>, epoch: u64) -> Arc<PromptStructure> {
        loop {
            let outcome = self.join_or_start_build().await;
            if outcome.epoch >= epoch {
                return outcome.structure;
            }
        }
    }

    async fn walk(&self) -> PromptStructure {
        let started = Instant::now();
        let walk_number = self.walks.fetch_add(1, Ordering::SeqCst) + 1;
        let options = WalkOptions {
            root: &self.root,
            filter: &self.filter,
            readme_name: &self.readme_name,
        };

        let structure = walker::walk(self.store.as_ref(), &options).await;

        info!(
            walk = walk_number,
            folders = structure.folders.len(),
            prompts = structure.prompt_count(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Prompt index built"
        );
        structure
    }

    fn commit(&self, structure: &Arc<PromptStructure>, epoch: u64) {
        let mut state = self.lock_state();
        state.structure = Arc::clone(structure);
        state.in_flight = None;
        state.phase = if state.epoch == epoch {
            IndexPhase::Fresh
        } else {
            IndexPhase::Stale
        };
    }
}

/// The prompt library's structural index.
///
/// Cheap to clone; clones share the same cached state.
#[derive(Clone)]
pub struct PromptIndexer {
    inner: Arc<IndexerInner>,
}

impl PromptIndexer {
    pub fn new(
        config: &LibraryConfig,
        store: Arc<dyn ContentStore>,
        content_cache: Arc<ContentCache>,
    ) -> Result<Self> {
        let filter = PathFilter::new(&config.exclude_patterns)?;
        Ok(Self {
            inner: Arc::new(IndexerInner {
                root: config.root_path(),
                readme_name: config.readme_name.clone(),
                filter,
                debounce: config.debounce(),
                store,
                content_cache,
                state: Mutex::new(IndexState {
                    structure: Arc::new(PromptStructure::empty()),
                    phase: IndexPhase::Empty,
                    epoch: 0,
                    in_flight: None,
                    debounced: None,
                }),
                walks: AtomicUsize::new(0),
            }),
        })
    }

    pub fn root(&self) -> &Path {
        &self.inner.root
    }

    pub fn phase(&self) -> IndexPhase {
        self.inner.lock_state().phase
    }

    /// Number of directory walks performed so far.
    pub fn walk_count(&self) -> usize {
        self.inner.walks.load(Ordering::SeqCst)
    }

    /// Current cached structure without triggering any work.
    pub fn get(&self) -> Arc<PromptStructure> {
        Arc::clone(&self.inner.lock_state().structure)
    }

    /// Walk the root, or join the walk already in flight.
    pub async fn build(&self) -> Arc<PromptStructure> {
        self.inner.join_or_start_build().await.structure
    }

    /// Mark the structure stale. Does not walk.
    ///
    /// Also clears the parsed content cache, since cached parses may be stale
    /// for the same reason the structure is.
    pub fn invalidate(&self, reason: InvalidationReason, path: Option<&Path>) {
        {
            let mut state = self.inner.lock_state();
            state.epoch += 1;
            if state.phase == IndexPhase::Fresh {
                state.phase = IndexPhase::Stale;
            }
        }
        self.inner.content_cache.clear();

        match path {
            Some(path) => debug!(%reason, path = %path.display(), "Prompt index invalidated"),
            None => debug!(%reason, "Prompt index invalidated"),
        }
    }

    /// Current structure, walking first if it is empty or stale.
    pub async fn ensure_and_get(&self) -> Arc<PromptStructure> {
        let (phase, epoch) = {
            let state = self.inner.lock_state();
            (state.phase, state.epoch)
        };
        if phase == IndexPhase::Fresh {
            return self.get();
        }
        self.inner.build_at_least(epoch).await
    }

    /// Debounced rebuild: waits for the debounce window, collapsing every
    /// request made during it into a single walk.
    pub async fn rebuild(&self) -> Arc<PromptStructure> {
        self.invalidate(InvalidationReason::Refresh, None);

        let pending = {
            let mut state = self.inner.lock_state();
            match state.debounced.clone() {
                Some(pending) => pending,
                None => {
                    let inner = Arc::clone(&self.inner);
                    let pending = async move {
                        tokio::time::sleep(inner.debounce).await;
                        let epoch = {
                            let mut state = inner.lock_state();
                            state.debounced = None;
                            state.epoch
                        };
                        let structure = inner.build_at_least(epoch).await;
                        BuildOutcome { structure, epoch }
                    }
                    .boxed()
                    .shared();
                    state.debounced = Some(pending.clone());
                    pending
                }
            }
        };

        pending.await.structure
    }

    /// Immediate rebuild: skips the debounce window and returns only once a
    /// walk that started after this call has completed.
    pub async fn rebuild_now(&self) -> Arc<PromptStructure> {
        self.invalidate(InvalidationReason::Refresh, None);
        let epoch = self.inner.lock_state().epoch;
        self.inner.build_at_least(epoch).await
    }

    /// Create a prompt file from the default template.
    ///
    /// `folder` is relative to the root (or absolute inside it); `None` means
    /// the root itself. The index is rebuilt before this returns, whether or
    /// not the store operation succeeded.
    pub async fn create_prompt(&self, folder: Option<&Path>, name: &str) -> Result<PathBuf> {
        let stem = slugify(name);
        ensure!(!stem.is_empty(), "Prompt name is empty: {:?}", name);
        let dir = self.resolve_inside_root(folder)?;
        let path = dir.join(format!("{}.md", stem));

        let result = self
            .inner
            .store
            .create_prompt(&path, &prompt_template(name.trim()))
            .await;
        self.after_mutation(InvalidationReason::Created, &path).await;
        result.map(|_| path)
    }

    /// Create a folder named `name` under `parent` (the root when `None`).
    pub async fn create_folder(&self, parent: Option<&Path>, name: &str) -> Result<PathBuf> {
        let name = name.trim();
        ensure!(!name.is_empty(), "Folder name is empty");
        ensure!(
            !name.contains(['/', '\\']) && name != "." && name != "..",
            "Invalid folder name: {:?}",
            name
        );
        let path = self.resolve_inside_root(parent)?.join(name);

        let result = self.inner.store.create_folder(&path).await;
        self.after_mutation(InvalidationReason::Created, &path).await;
        result.map(|_| path)
    }

    pub async fn delete_prompt(&self, path: &Path) -> Result<()> {
        let path = self.resolve_inside_root(Some(path))?;
        let result = self.inner.store.delete_prompt(&path).await;
        self.after_mutation(InvalidationReason::Deleted, &path).await;
        result
    }

    /// Delete a folder and everything in it. The root itself cannot be deleted.
    pub async fn delete_folder(&self, path: &Path) -> Result<()> {
        let path = self.resolve_inside_root(Some(path))?;
        if path == self.inner.root {
            bail!("Refusing to delete the prompt root: {}", path.display());
        }
        let result = self.inner.store.delete_folder(&path).await;
        self.after_mutation(InvalidationReason::Deleted, &path).await;
        result
    }

    /// Replace a prompt's content.
    pub async fn write_prompt(&self, path: &Path, content: &str) -> Result<()> {
        let path = self.resolve_inside_root(Some(path))?;
        let result = self.inner.store.write(&path, content).await;
        self.after_mutation(InvalidationReason::Modified, &path).await;
        result
    }

    async fn after_mutation(&self, reason: InvalidationReason, path: &Path) {
        self.invalidate(reason, Some(path));
        let epoch = self.inner.lock_state().epoch;
        self.inner.build_at_least(epoch).await;
    }

    /// Resolve a root-relative (or absolute) path and make sure it stays inside the root.
    fn resolve_inside_root(&self, path: Option<&Path>) -> Result<PathBuf> {
        let root = &self.inner.root;
        let Some(path) = path else {
            return Ok(root.clone());
        };

        ensure!(
            !path.components().any(|c| c == Component::ParentDir),
            "Path must not contain '..': {}",
            path.display()
        );
        let resolved = if path.is_absolute() {
            path.to_path_buf()
        } else {
            root.join(path)
        };
        ensure!(
            resolved.starts_with(root),
            "Path is outside the prompt root: {}",
            resolved.display()
        );
        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{FsContentStore, StoreEntry};
    use async_trait::async_trait;
    use futures_util::future::join_all;
    use std::fs;
    use tempfile::TempDir;
    use tokio::sync::Semaphore;

    fn indexer_for(root: &Path, store: Arc<dyn ContentStore>) -> PromptIndexer {
        let mut config = LibraryConfig::with_root(root);
        config.debounce_ms = 20;
        let cache = Arc::new(ContentCache::new(16, Duration::from_secs(60)));
        PromptIndexer::new(&config, store, cache).unwrap()
    }

    fn fixture() -> TempDir {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("one.md"), "# One").unwrap();
        fs::create_dir(temp_dir.path().join("folder")).unwrap();
        fs::write(temp_dir.path().join("folder/two.md"), "# Two").unwrap();
        temp_dir
    }

    /// Store whose directory listings wait for a permit, so tests can hold a
    /// walk in flight.
    struct GatedStore {
        inner: FsContentStore,
        gate: Arc<Semaphore>,
    }

    #[async_trait]
    impl ContentStore for GatedStore {
        async fn read(&self, path: &Path) -> Result<String> {
            self.inner.read(path).await
        }
        async fn write(&self, path: &Path, content: &str) -> Result<()> {
            self.inner.write(path, content).await
        }
        async fn exists(&self, path: &Path) -> bool {
            self.inner.exists(path).await
        }
        async fn list_dir(&self, path: &Path) -> Result<Vec<StoreEntry>> {
            let _permit = self.gate.acquire().await?;
            self.inner.list_dir(path).await
        }
        async fn canonical_path(&self, path: &Path) -> PathBuf {
            self.inner.canonical_path(path).await
        }
        async fn create_prompt(&self, path: &Path, content: &str) -> Result<()> {
            self.inner.create_prompt(path, content).await
        }
        async fn create_folder(&self, path: &Path) -> Result<()> {
            self.inner.create_folder(path).await
        }
        async fn delete_prompt(&self, path: &Path) -> Result<()> {
            self.inner.delete_prompt(path).await
        }
        async fn delete_folder(&self, path: &Path) -> Result<()> {
            self.inner.delete_folder(path).await
        }
    }

    #[tokio::test]
    async fn test_phases_and_idempotent_build() {
        let temp_dir = fixture();
        let indexer = indexer_for(temp_dir.path(), Arc::new(FsContentStore::new()));

        assert_eq!(indexer.phase(), IndexPhase::Empty);
        assert!(indexer.get().is_empty());
        assert_eq!(indexer.walk_count(), 0);

        let first = indexer.build().await;
        assert_eq!(indexer.phase(), IndexPhase::Fresh);
        let second = indexer.build().await;
        assert_eq!(*first, *second);
        assert_eq!(first.prompt_count(), 2);

        indexer.invalidate(InvalidationReason::Modified, Some(&temp_dir.path().join("one.md")));
        assert_eq!(indexer.phase(), IndexPhase::Stale);
        // get() never walks
        let _ = indexer.get();
        assert_eq!(indexer.walk_count(), 2);

        indexer.ensure_and_get().await;
        assert_eq!(indexer.phase(), IndexPhase::Fresh);
        assert_eq!(indexer.walk_count(), 3);

        // Fresh: no walk
        indexer.ensure_and_get().await;
        assert_eq!(indexer.walk_count(), 3);
    }

    #[tokio::test]
    async fn test_invalidate_on_empty_stays_empty() {
        let temp_dir = fixture();
        let indexer = indexer_for(temp_dir.path(), Arc::new(FsContentStore::new()));
        indexer.invalidate(InvalidationReason::Refresh, None);
        assert_eq!(indexer.phase(), IndexPhase::Empty);
    }

    #[tokio::test]
    async fn test_concurrent_builds_share_one_walk() {
        let temp_dir = fixture();
        let gate = Arc::new(Semaphore::new(0));
        let store = Arc::new(GatedStore {
            inner: FsContentStore::new(),
            gate: Arc::clone(&gate),
        });
        let indexer = indexer_for(temp_dir.path(), store);

        let builds = join_all((0..5).map(|_| indexer.build()));
        let release = async {
            tokio::task::yield_now().await;
            gate.add_permits(100);
        };
        let (results, _) = tokio::join!(builds, release);

        assert_eq!(indexer.walk_count(), 1);
        for result in &results {
            assert!(Arc::ptr_eq(result, &results[0]));
        }
    }

    #[tokio::test]
    async fn test_invalidation_during_walk_leaves_stale() {
        let temp_dir = fixture();
        let gate = Arc::new(Semaphore::new(0));
        let store = Arc::new(GatedStore {
            inner: FsContentStore::new(),
            gate: Arc::clone(&gate),
        });
        let indexer = indexer_for(temp_dir.path(), store);

        let build = indexer.build();
        let interfere = async {
            tokio::task::yield_now().await;
            indexer.invalidate(InvalidationReason::Created, None);
            gate.add_permits(100);
        };
        tokio::join!(build, interfere);

        assert_eq!(indexer.phase(), IndexPhase::Stale);
        assert_eq!(indexer.walk_count(), 1);
    }

    #[tokio::test]
    async fn test_rebuild_now_waits_for_fresh_walk() {
        let temp_dir = fixture();
        let gate = Arc::new(Semaphore::new(0));
        let store = Arc::new(GatedStore {
            inner: FsContentStore::new(),
            gate: Arc::clone(&gate),
        });
        let indexer = indexer_for(temp_dir.path(), store);
        let new_file = temp_dir.path().join("three.md");

        let early = indexer.build();
        let late = async {
            tokio::task::yield_now().await;
            fs::write(&new_file, "# Three").unwrap();
            gate.add_permits(100);
            indexer.rebuild_now().await
        };
        let (_, structure) = tokio::join!(early, late);

        assert!(structure.find_prompt(&new_file).is_some());
        assert_eq!(indexer.phase(), IndexPhase::Fresh);
    }

    #[tokio::test]
    async fn test_debounced_rebuilds_coalesce() {
        let temp_dir = fixture();
        let indexer = indexer_for(temp_dir.path(), Arc::new(FsContentStore::new()));
        indexer.build().await;
        let before = indexer.walk_count();

        let results = join_all((0..8).map(|_| indexer.rebuild())).await;

        assert_eq!(indexer.walk_count(), before + 1);
        for result in &results {
            assert!(Arc::ptr_eq(result, &results[0]));
        }
        assert_eq!(indexer.phase(), IndexPhase::Fresh);
    }

    #[tokio::test]
    async fn test_mutations_visible_immediately() {
        let temp_dir = fixture();
        let indexer = indexer_for(temp_dir.path(), Arc::new(FsContentStore::new()));
        indexer.build().await;

        let path = indexer
            .create_prompt(Some(Path::new("folder")), "Code Review")
            .await
            .unwrap();
        assert_eq!(path, temp_dir.path().join("folder/code-review.md"));
        let structure = indexer.get();
        let prompt = structure.find_prompt(&path).unwrap();
        assert_eq!(prompt.title, "Code Review");

        assert!(indexer.create_prompt(Some(Path::new("folder")), "Code Review").await.is_err());
        assert!(indexer.create_prompt(Some(Path::new("../escape")), "x").await.is_err());
        assert!(indexer.create_folder(None, "a/b").await.is_err());

        indexer.delete_prompt(&path).await.unwrap();
        assert!(indexer.get().find_prompt(&path).is_none());
        assert!(indexer.delete_folder(temp_dir.path()).await.is_err());
    }

    #[tokio::test]
    async fn test_missing_root_builds_empty() {
        let temp_dir = TempDir::new().unwrap();
        let indexer = indexer_for(&temp_dir.path().join("gone"), Arc::new(FsContentStore::new()));
        let structure = indexer.ensure_and_get().await;
        assert!(structure.is_empty());
        assert_eq!(indexer.phase(), IndexPhase::Fresh);
    }
}
