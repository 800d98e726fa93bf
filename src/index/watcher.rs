//! File watcher feeding index invalidation
//!
//! Uses the notify crate to watch the prompt root and reports changes to
//! markdown files and folders as [`FileChange`] values. The watcher only
//! reports; the consumer decides when to invalidate and rebuild.

use crate::index::indexer::InvalidationReason;
use crate::index::path_filter::PathFilter;
use crate::utils::is_markdown_file;

use anyhow::{Context, Result};
use notify_debouncer_full::notify::{EventKind, RecommendedWatcher, RecursiveMode};
use notify_debouncer_full::{new_debouncer, DebouncedEvent, Debouncer, RecommendedCache};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tracing::{debug, error, info};

/// A relevant change below the prompt root
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileChange {
    Created(PathBuf),
    Modified(PathBuf),
    Deleted(PathBuf),
}

impl FileChange {
    pub fn path(&self) -> &Path {
        match self {
            Self::Created(p) | Self::Modified(p) | Self::Deleted(p) => p,
        }
    }

    pub fn reason(&self) -> InvalidationReason {
        match self {
            Self::Created(_) => InvalidationReason::Created,
            Self::Modified(_) => InvalidationReason::Modified,
            Self::Deleted(_) => InvalidationReason::Deleted,
        }
    }
}

/// File watcher handle. Dropping it stops watching.
pub struct FileWatcher {
    rx: UnboundedReceiver<FileChange>,
    _debouncer: Debouncer<RecommendedWatcher, RecommendedCache>,
}

impl FileWatcher {
    /// Start watching `root` recursively.
    pub fn new(root: &Path, debounce: Duration, exclude_patterns: &[String]) -> Result<Self> {
        let (tx, rx) = mpsc::unbounded_channel::<FileChange>();
        let filter = PathFilter::new(exclude_patterns)?;
        let handler_root = root.to_path_buf();

        let mut debouncer = new_debouncer(
            debounce,
            None,
            move |result: Result<Vec<DebouncedEvent>, Vec<notify_debouncer_full::notify::Error>>| {
                match result {
                    Ok(events) => {
                        for event in events {
                            let changes =
                                classify(&event.kind, &event.paths, &handler_root, &filter);
                            for change in changes {
                                if tx.send(change).is_err() {
                                    debug!("File watcher channel closed");
                                    return;
                                }
                            }
                        }
                    }
                    Err(errors) => {
                        for error in errors {
                            error!("File watcher error: {:?}", error);
                        }
                    }
                }
            },
        )?;

        debouncer
            .watch(root, RecursiveMode::Recursive)
            .with_context(|| format!("Failed to watch prompt root: {}", root.display()))?;
        info!(path = %root.display(), "Watching prompt root for changes");

        Ok(Self {
            rx,
            _debouncer: debouncer,
        })
    }

    /// Wait for the next change. Returns `None` once the watcher has shut down.
    pub async fn recv(&mut self) -> Option<FileChange> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<FileChange> {
        self.rx.try_recv().ok()
    }

    /// Wait for the next change, then take every change already queued
    /// behind it, so a burst is handled with one rebuild.
    pub async fn recv_batch(&mut self) -> Option<Vec<FileChange>> {
        let first = self.rx.recv().await?;
        Some(drain_batch(first, &mut self.rx))
    }
}

/// `first` plus everything queued in `rx`, with repeats of the same change dropped.
fn drain_batch(first: FileChange, rx: &mut UnboundedReceiver<FileChange>) -> Vec<FileChange> {
    let mut batch = vec![first];
    while let Ok(change) = rx.try_recv() {
        if !batch.contains(&change) {
            batch.push(change);
        }
    }
    batch
}

/// Turn one notify event into the changes the index cares about.
fn classify(
    kind: &EventKind,
    paths: &[PathBuf],
    root: &Path,
    filter: &PathFilter,
) -> Vec<FileChange> {
    let relevant = paths
        .iter()
        .filter(|path| path.starts_with(root) && !filter.is_excluded(root, path))
        .filter(|path| is_relevant(path));

    match kind {
        EventKind::Create(_) => relevant.cloned().map(FileChange::Created).collect(),
        EventKind::Modify(_) => relevant.cloned().map(FileChange::Modified).collect(),
        EventKind::Remove(_) => relevant.cloned().map(FileChange::Deleted).collect(),
        EventKind::Any | EventKind::Access(_) | EventKind::Other => Vec::new(),
    }
}

/// Markdown files and folders. A removed folder no longer exists on disk, so
/// an extensionless path is treated as one.
fn is_relevant(path: &Path) -> bool {
    is_markdown_file(path) || path.is_dir() || path.extension().is_none()
}
