//! Path exclusion using glob patterns.
//!
//! Applied by the directory walk and the file watcher so that version control
//! folders, dependency trees and other configured paths never become folders
//! or prompts.

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::Path;

/// Filters paths by exclude patterns.
///
/// Patterns are matched against the path relative to the library root, with
/// `/` separators, so `**/.git/**` and `archive/**` both behave as expected.
#[derive(Debug, Default)]
pub struct PathFilter {
    exclude: Option<GlobSet>,
}

impl PathFilter {
    /// Build a filter. An empty pattern list excludes nothing.
    pub fn new(exclude_patterns: &[String]) -> Result<Self> {
        if exclude_patterns.is_empty() {
            return Ok(Self::default());
        }

        let mut builder = GlobSetBuilder::new();
        for pattern in exclude_patterns {
            let glob = Glob::new(pattern)
                .with_context(|| format!("Invalid exclude glob pattern: {}", pattern))?;
            builder.add(glob);
            // `dir/**` should also reject `dir` itself so the walk never descends into it
            if let Some(dir) = pattern.strip_suffix("/**") {
                if !dir.is_empty() {
                    let glob = Glob::new(dir)
                        .with_context(|| format!("Invalid exclude glob pattern: {}", dir))?;
                    builder.add(glob);
                }
            }
        }

        Ok(Self {
            exclude: Some(builder.build().context("Failed to build exclude GlobSet")?),
        })
    }

    /// Check whether `path` (somewhere under `root`) is excluded.
    pub fn is_excluded(&self, root: &Path, path: &Path) -> bool {
        let Some(set) = &self.exclude else {
            return false;
        };
        let relative = path.strip_prefix(root).unwrap_or(path);
        let normalized = relative.to_string_lossy().replace('\\', "/");
        set.is_match(normalized.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.exclude.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter(patterns: &[&str]) -> PathFilter {
        let patterns: Vec<String> = patterns.iter().map(|s| s.to_string()).collect();
        PathFilter::new(&patterns).unwrap()
    }

    #[test]
    fn test_empty_filter_excludes_nothing() {
        let f = PathFilter::new(&[]).unwrap();
        assert!(f.is_empty());
        assert!(!f.is_excluded(Path::new("/root"), Path::new("/root/.git")));
    }

    #[test]
    fn test_directory_and_contents_excluded() {
        let f = filter(&["**/.git/**", "archive/**"]);
        let root = Path::new("/lib");

        assert!(f.is_excluded(root, Path::new("/lib/.git")));
        assert!(f.is_excluded(root, Path::new("/lib/.git/HEAD")));
        assert!(f.is_excluded(root, Path::new("/lib/sub/.git")));
        assert!(f.is_excluded(root, Path::new("/lib/archive")));
        assert!(f.is_excluded(root, Path::new("/lib/archive/old.md")));
        assert!(!f.is_excluded(root, Path::new("/lib/notes/archive.md")));
        assert!(!f.is_excluded(root, Path::new("/lib/prompt.md")));
    }

    #[test]
    fn test_file_pattern() {
        let f = filter(&["**/*.draft.md"]);
        let root = Path::new("/lib");
        assert!(f.is_excluded(root, Path::new("/lib/a/b.draft.md")));
        assert!(!f.is_excluded(root, Path::new("/lib/a/b.md")));
    }

    #[test]
    fn test_invalid_pattern() {
        let patterns = vec!["[unclosed".to_string()];
        assert!(PathFilter::new(&patterns).is_err());
    }
}
