//! Directory walk that turns the prompt root into a [`PromptStructure`].

use crate::frontmatter::{self, validate_tags};
use crate::index::path_filter::PathFilter;
use crate::index::structure::{Folder, Prompt, PromptStructure};
use crate::store::{ContentStore, StoreEntry};
use crate::utils::is_markdown_file;
use rustc_hash::FxHashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Folders nested deeper than this are not walked.
const MAX_DEPTH: usize = 32;

/// Options controlling which entries become prompts and folders.
pub struct WalkOptions<'a> {
    pub root: &'a Path,
    pub filter: &'a PathFilter,
    /// File name never indexed as a prompt (compared case insensitively)
    pub readme_name: &'a str,
}

impl WalkOptions<'_> {
    fn is_prompt_file(&self, entry: &StoreEntry) -> bool {
        !entry.is_dir() && is_prompt_path(&entry.path, self.readme_name)
    }
}

/// Whether a file at `path` is indexed as a prompt: markdown, and not the
/// reserved readme name.
pub fn is_prompt_path(path: &Path, readme_name: &str) -> bool {
    is_markdown_file(path)
        && !path
            .file_name()
            .is_some_and(|name| name.to_string_lossy().eq_ignore_ascii_case(readme_name))
}

/// Walk the root and build a sorted structure.
///
/// A missing or unreadable root yields an empty structure. A folder that
/// cannot be listed keeps its entry but contributes no prompts, and a file
/// that cannot be read is skipped. Each real directory is walked once, so a
/// link back to an ancestor or a second link to the same folder is ignored.
pub async fn walk(store: &dyn ContentStore, options: &WalkOptions<'_>) -> PromptStructure {
    let mut structure = PromptStructure::empty();

    let entries = match store.list_dir(options.root).await {
        Ok(entries) => entries,
        Err(e) => {
            warn!(root = %options.root.display(), error = %e, "Prompt root unavailable, using empty structure");
            return structure;
        }
    };

    let mut visited: FxHashSet<PathBuf> = FxHashSet::default();
    visited.insert(store.canonical_path(options.root).await);

    let mut pending: Vec<(PathBuf, usize)> = Vec::new();
    for entry in entries {
        if options.filter.is_excluded(options.root, &entry.path) {
            continue;
        }
        if entry.is_dir() {
            pending.push((entry.path, 1));
        } else if options.is_prompt_file(&entry) {
            if let Some(prompt) = load_prompt(store, &entry).await {
                structure.root_prompts.push(prompt);
            }
        }
    }

    while let Some((dir, depth)) = pending.pop() {
        if !visited.insert(store.canonical_path(&dir).await) {
            debug!(path = %dir.display(), "Folder already walked through another path, skipping");
            continue;
        }

        let mut folder = Folder {
            name: file_name(&dir),
            path: dir,
            prompts: Vec::new(),
        };

        match store.list_dir(&folder.path).await {
            Ok(entries) => {
                for entry in entries {
                    if options.filter.is_excluded(options.root, &entry.path) {
                        continue;
                    }
                    if entry.is_dir() {
                        if depth < MAX_DEPTH {
                            pending.push((entry.path, depth + 1));
                        } else {
                            debug!(path = %entry.path.display(), "Folder nesting too deep, not walking");
                        }
                    } else if options.is_prompt_file(&entry) {
                        if let Some(prompt) = load_prompt(store, &entry).await {
                            folder.prompts.push(prompt);
                        }
                    }
                }
            }
            Err(e) => {
                warn!(folder = %folder.path.display(), error = %e, "Failed to list folder, keeping it empty");
            }
        }

        structure.folders.push(folder);
    }

    structure.sort();
    structure
}

/// Read and parse one prompt file.
async fn load_prompt(store: &dyn ContentStore, entry: &StoreEntry) -> Option<Prompt> {
    let content = match store.read(&entry.path).await {
        Ok(content) => content,
        Err(e) => {
            warn!(path = %entry.path.display(), error = %e, "Skipping unreadable prompt");
            return None;
        }
    };

    let name = entry
        .path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let parsed = frontmatter::parse(&content, &name);

    Some(Prompt {
        title: parsed.title,
        description: parsed.description,
        tags: validate_tags(&parsed.tags),
        path: entry.path.clone(),
        file_size: entry.size,
        name,
    })
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::FsContentStore;
    use anyhow::{bail, Result};
    use async_trait::async_trait;
    use std::fs;
    use tempfile::TempDir;

    /// Store that fails to read one file and to list one folder.
    struct FailingStore {
        inner: FsContentStore,
        unreadable: PathBuf,
        unlistable: PathBuf,
    }

    #[async_trait]
    impl ContentStore for FailingStore {
        async fn read(&self, path: &Path) -> Result<String> {
            if path == self.unreadable {
                bail!("permission denied: {}", path.display());
            }
            self.inner.read(path).await
        }
        async fn write(&self, path: &Path, content: &str) -> Result<()> {
            self.inner.write(path, content).await
        }
        async fn exists(&self, path: &Path) -> bool {
            self.inner.exists(path).await
        }
        async fn list_dir(&self, path: &Path) -> Result<Vec<StoreEntry>> {
            if path == self.unlistable {
                bail!("permission denied: {}", path.display());
            }
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

    async fn walk_dir(root: &Path, excludes: &[&str]) -> PromptStructure {
        let patterns: Vec<String> = excludes.iter().map(|s| s.to_string()).collect();
        let filter = PathFilter::new(&patterns).unwrap();
        let options = WalkOptions {
            root,
            filter: &filter,
            readme_name: "README.md",
        };
        walk(&FsContentStore::new(), &options).await
    }

    #[tokio::test]
    async fn test_walk_builds_folders_and_prompts() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::write(root.join("zeta.md"), "# Zeta").unwrap();
        fs::write(root.join("alpha.md"), "---\ntitle: Alpha\ntags: [One, two]\n---\nbody").unwrap();
        fs::write(root.join("README.md"), "# Readme").unwrap();
        fs::write(root.join("notes.txt"), "ignored").unwrap();
        fs::create_dir_all(root.join("coding/rust")).unwrap();
        fs::write(root.join("coding/review.md"), "# Review").unwrap();
        fs::write(root.join("coding/rust/lifetimes.md"), "text").unwrap();
        fs::create_dir(root.join("empty")).unwrap();

        let structure = walk_dir(root, &[]).await;

        let root_titles: Vec<&str> = structure.root_prompts.iter().map(|p| p.title.as_str()).collect();
        assert_eq!(root_titles, vec!["Alpha", "Zeta"]);
        assert_eq!(structure.root_prompts[0].tags[0].as_str(), "one");

        let folder_names: Vec<&str> = structure.folders.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(folder_names, vec!["coding", "empty", "rust"]);
        assert_eq!(structure.folders[0].prompts.len(), 1);
        assert_eq!(structure.folders[2].prompts[0].title, "lifetimes");
        assert!(structure.folders[1].prompts.is_empty());
        assert_eq!(structure.prompt_count(), 4);
    }

    #[tokio::test]
    async fn test_missing_root_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let structure = walk_dir(&temp_dir.path().join("missing"), &[]).await;
        assert!(structure.is_empty());
    }

    #[tokio::test]
    async fn test_excluded_directories_skipped() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::create_dir_all(root.join(".git/refs")).unwrap();
        fs::write(root.join(".git/notes.md"), "x").unwrap();
        fs::write(root.join("keep.md"), "x").unwrap();

        let structure = walk_dir(root, &["**/.git/**"]).await;
        assert!(structure.folders.is_empty());
        assert_eq!(structure.prompt_count(), 1);
    }

    #[tokio::test]
    async fn test_unreadable_file_and_folder_are_isolated() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::write(root.join("good.md"), "# Good").unwrap();
        fs::write(root.join("broken.md"), "# Broken").unwrap();
        fs::create_dir_all(root.join("locked")).unwrap();
        fs::write(root.join("locked/hidden.md"), "# Hidden").unwrap();
        fs::create_dir_all(root.join("open")).unwrap();
        fs::write(root.join("open/visible.md"), "# Visible").unwrap();

        let store = FailingStore {
            inner: FsContentStore::new(),
            unreadable: root.join("broken.md"),
            unlistable: root.join("locked"),
        };
        let filter = PathFilter::new(&[]).unwrap();
        let options = WalkOptions {
            root,
            filter: &filter,
            readme_name: "README.md",
        };
        let structure = walk(&store, &options).await;

        let root_titles: Vec<&str> = structure.root_prompts.iter().map(|p| p.title.as_str()).collect();
        assert_eq!(root_titles, vec!["Good"]);

        let locked = structure.find_folder(&root.join("locked")).unwrap();
        assert!(locked.prompts.is_empty());
        let open = structure.find_folder(&root.join("open")).unwrap();
        assert_eq!(open.prompts[0].title, "Visible");
        assert_eq!(structure.prompt_count(), 2);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlink_cycle_walked_once() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::write(root.join("one.md"), "# One").unwrap();
        fs::create_dir(root.join("a")).unwrap();
        fs::write(root.join("a/two.md"), "# Two").unwrap();
        std::os::unix::fs::symlink(root, root.join("a/loop")).unwrap();
        // Second name for an already walked folder
        std::os::unix::fs::symlink(root.join("a"), root.join("alias")).unwrap();

        let structure = walk_dir(root, &[]).await;

        assert_eq!(structure.folders.len(), 1);
        assert_eq!(structure.prompt_count(), 2);
        let twos = structure.all_prompts().filter(|p| p.title == "Two").count();
        assert_eq!(twos, 1);
    }
}
