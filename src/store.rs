//! Content store: the filesystem boundary of the prompt library.
//!
//! The indexer and search layers never touch the disk directly. They go
//! through [`ContentStore`], so every read, listing and mutation is fallible
//! I/O the caller can recover from, and tests can substitute their own store.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Kind of a directory entry returned by [`ContentStore::list_dir`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
}

/// A single entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreEntry {
    pub path: PathBuf,
    pub kind: EntryKind,
    /// Size in bytes (0 for directories)
    pub size: u64,
}

impl StoreEntry {
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }

    /// Final path component as UTF-8 (lossy).
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Storage operations the library depends on.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Read a whole file as UTF-8.
    async fn read(&self, path: &Path) -> Result<String>;

    /// Replace the content of a file, creating it if needed.
    async fn write(&self, path: &Path, content: &str) -> Result<()>;

    async fn exists(&self, path: &Path) -> bool;

    /// List the direct children of a directory.
    async fn list_dir(&self, path: &Path) -> Result<Vec<StoreEntry>>;

    /// Identity of a directory once links are resolved, used by the walk to
    /// visit each real folder once. Stores without links return the path as is.
    async fn canonical_path(&self, path: &Path) -> PathBuf;

    /// Create a new prompt file. Fails if the file already exists.
    async fn create_prompt(&self, path: &Path, content: &str) -> Result<()>;

    /// Create a folder (and any missing parents).
    async fn create_folder(&self, path: &Path) -> Result<()>;

    async fn delete_prompt(&self, path: &Path) -> Result<()>;

    /// Remove a folder and everything below it.
    async fn delete_folder(&self, path: &Path) -> Result<()>;
}

/// [`ContentStore`] backed by the local filesystem through `tokio::fs`.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsContentStore;

impl FsContentStore {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ContentStore for FsContentStore {
    async fn read(&self, path: &Path) -> Result<String> {
        tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read file: {}", path.display()))
    }

    async fn write(&self, path: &Path, content: &str) -> Result<()> {
        tokio::fs::write(path, content)
            .await
            .with_context(|| format!("Failed to write file: {}", path.display()))
    }

    async fn exists(&self, path: &Path) -> bool {
        tokio::fs::try_exists(path).await.unwrap_or(false)
    }

    async fn list_dir(&self, path: &Path) -> Result<Vec<StoreEntry>> {
        let mut dir = tokio::fs::read_dir(path)
            .await
            .with_context(|| format!("Failed to list directory: {}", path.display()))?;

        let mut entries = Vec::new();
        while let Some(entry) = dir
            .next_entry()
            .await
            .with_context(|| format!("Failed to read entry in: {}", path.display()))?
        {
            // Follows symlinks, so linked folders and files are indexed like real ones
            let metadata = match tokio::fs::metadata(entry.path()).await {
                Ok(m) => m,
                Err(e) => {
                    tracing::debug!(path = %entry.path().display(), error = %e, "Skipping unreadable entry");
                    continue;
                }
            };
            let (kind, size) = if metadata.is_dir() {
                (EntryKind::Directory, 0)
            } else if metadata.is_file() {
                (EntryKind::File, metadata.len())
            } else {
                continue;
            };
            entries.push(StoreEntry {
                path: entry.path(),
                kind,
                size,
            });
        }

        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(entries)
    }

    async fn canonical_path(&self, path: &Path) -> PathBuf {
        tokio::fs::canonicalize(path)
            .await
            .unwrap_or_else(|_| path.to_path_buf())
    }

    async fn create_prompt(&self, path: &Path, content: &str) -> Result<()> {
        use tokio::io::AsyncWriteExt;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .await
            .with_context(|| format!("Failed to create prompt: {}", path.display()))?;
        file.write_all(content.as_bytes())
            .await
            .with_context(|| format!("Failed to write prompt: {}", path.display()))?;
        file.flush().await?;
        Ok(())
    }

    async fn create_folder(&self, path: &Path) -> Result<()> {
        tokio::fs::create_dir_all(path)
            .await
            .with_context(|| format!("Failed to create folder: {}", path.display()))
    }

    async fn delete_prompt(&self, path: &Path) -> Result<()> {
        if !self.exists(path).await {
            bail!("Prompt does not exist: {}", path.display());
        }
        tokio::fs::remove_file(path)
            .await
            .with_context(|| format!("Failed to delete prompt: {}", path.display()))
    }

    async fn delete_folder(&self, path: &Path) -> Result<()> {
        tokio::fs::remove_dir_all(path)
            .await
            .with_context(|| format!("Failed to delete folder: {}", path.display()))
    }
}
