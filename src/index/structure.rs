//! In-memory structure of the prompt library: folders and the prompts they hold.

use crate::frontmatter::Tag;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// One indexed markdown file. `path` is its identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Prompt {
    /// File stem
    pub name: String,
    pub title: String,
    pub path: PathBuf,
    pub description: Option<String>,
    pub tags: Vec<Tag>,
    pub file_size: u64,
}

impl Prompt {
    pub fn has_tag(&self, tag: &str) -> bool {
        let wanted = tag.trim().to_lowercase();
        self.tags.iter().any(|t| t.as_str() == wanted)
    }
}

/// A directory below the root with its direct-child prompts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Folder {
    pub name: String,
    pub path: PathBuf,
    pub prompts: Vec<Prompt>,
}

/// Result of an index build.
///
/// Every prompt lives in exactly one place: `root_prompts` or one folder's
/// `prompts`. Folders are a flat list; nesting follows from their paths.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptStructure {
    /// All folders in the tree, sorted by name
    pub folders: Vec<Folder>,
    /// Prompts directly under the root, sorted by title
    pub root_prompts: Vec<Prompt>,
}

impl PromptStructure {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.folders.is_empty() && self.root_prompts.is_empty()
    }

    /// Apply the canonical ordering: folders by name, prompts by title.
    /// Paths break ties so that ordering never depends on listing order.
    pub fn sort(&mut self) {
        sort_prompts(&mut self.root_prompts);
        for folder in &mut self.folders {
            sort_prompts(&mut folder.prompts);
        }
        self.folders
            .sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.path.cmp(&b.path)));
    }

    /// Root prompts first, then each folder's prompts in folder order.
    pub fn all_prompts(&self) -> impl Iterator<Item = &Prompt> {
        self.root_prompts
            .iter()
            .chain(self.folders.iter().flat_map(|f| f.prompts.iter()))
    }

    pub fn prompt_count(&self) -> usize {
        self.root_prompts.len() + self.folders.iter().map(|f| f.prompts.len()).sum::<usize>()
    }

    pub fn find_prompt(&self, path: &Path) -> Option<&Prompt> {
        self.all_prompts().find(|p| p.path == path)
    }

    pub fn find_folder(&self, path: &Path) -> Option<&Folder> {
        self.folders.iter().find(|f| f.path == path)
    }

    /// Folders whose direct parent directory is `parent` (the root or a folder path).
    pub fn child_folders<'a>(&'a self, parent: &'a Path) -> impl Iterator<Item = &'a Folder> + 'a {
        self.folders
            .iter()
            .filter(move |f| f.path.parent() == Some(parent))
    }

    /// Prompts carrying `tag` (case insensitive), in `all_prompts` order.
    pub fn prompts_with_tag<'a>(&'a self, tag: &str) -> Vec<&'a Prompt> {
        self.all_prompts().filter(|p| p.has_tag(tag)).collect()
    }

    /// Every tag with the number of prompts using it. A prompt listing a tag
    /// twice counts once.
    pub fn tag_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for prompt in self.all_prompts() {
            let mut seen: Vec<&str> = Vec::with_capacity(prompt.tags.len());
            for tag in &prompt.tags {
                if !seen.contains(&tag.as_str()) {
                    seen.push(tag.as_str());
                    *counts.entry(tag.to_string()).or_insert(0) += 1;
                }
            }
        }
        counts
    }

    pub fn total_size(&self) -> u64 {
        self.all_prompts().map(|p| p.file_size).sum()
    }
}

fn sort_prompts(prompts: &mut [Prompt]) {
    prompts.sort_by(|a, b| a.title.cmp(&b.title).then_with(|| a.path.cmp(&b.path)));
}
