//! Configuration management for prompt_search
//!
//! Supports loading configuration from TOML files with environment and CLI overrides.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::utils::expand_tilde;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub library: LibraryConfig,

    #[serde(default)]
    pub search: SearchConfig,
}

/// Prompt library (indexer) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibraryConfig {
    /// Root directory holding the prompt files (`~` is expanded)
    #[serde(default = "default_root")]
    pub root: String,

    /// File name that is never indexed as a prompt
    #[serde(default = "default_readme_name")]
    pub readme_name: String,

    /// Glob patterns (relative to the root) skipped by the walk and the watcher
    #[serde(default = "default_exclude_patterns")]
    pub exclude_patterns: Vec<String>,

    /// Run the watcher (instead of printing the tree) when no subcommand is given
    #[serde(default)]
    pub watch: bool,

    /// Window in which debounced rebuild requests are collapsed into one walk
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

/// Search engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Result limit used when a query does not set one
    #[serde(default = "default_limit")]
    pub default_limit: usize,

    /// Characters of context kept on each side of a match
    #[serde(default = "default_context_radius")]
    pub context_radius: usize,

    /// Maximum number of parsed files kept in the content cache
    #[serde(default = "default_cache_max_entries")]
    pub cache_max_entries: usize,

    /// Seconds a parsed file stays in the content cache
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,

    /// Suggestion count used when a query does not set one
    #[serde(default = "default_max_suggestions")]
    pub max_suggestions: usize,

    /// Largest edit distance a fuzzy query may request
    #[serde(default = "default_max_fuzzy_distance")]
    pub max_fuzzy_distance: u8,
}

fn default_root() -> String {
    "~/prompts".to_string()
}

fn default_readme_name() -> String {
    "README.md".to_string()
}

fn default_exclude_patterns() -> Vec<String> {
    vec![
        "**/.git/**".to_string(),
        "**/node_modules/**".to_string(),
        "**/.obsidian/**".to_string(),
    ]
}

fn default_debounce_ms() -> u64 {
    300
}

fn default_limit() -> usize {
    100
}

fn default_context_radius() -> usize {
    40
}

fn default_cache_max_entries() -> usize {
    1000
}

fn default_cache_ttl_secs() -> u64 {
    300
}

fn default_max_suggestions() -> usize {
    10
}

fn default_max_fuzzy_distance() -> u8 {
    3
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            readme_name: default_readme_name(),
            exclude_patterns: default_exclude_patterns(),
            watch: false,
            debounce_ms: default_debounce_ms(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
            context_radius: default_context_radius(),
            cache_max_entries: default_cache_max_entries(),
            cache_ttl_secs: default_cache_ttl_secs(),
            max_suggestions: default_max_suggestions(),
            max_fuzzy_distance: default_max_fuzzy_distance(),
        }
    }
}

impl LibraryConfig {
    /// Create a config for the given root with all other values at their defaults.
    pub fn with_root(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_string_lossy().into_owned(),
            ..Default::default()
        }
    }

    /// Root directory with `~` expanded
    pub fn root_path(&self) -> PathBuf {
        expand_tilde(&self.root)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

impl SearchConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

impl Config {
    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from default locations
    ///
    /// Search order:
    /// 1. PROMPT_SEARCH_CONFIG environment variable
    /// 2. ./prompt_search.toml (current directory)
    /// 3. ~/.config/prompt_search/config.toml (user config)
    pub fn from_default_locations() -> Result<Option<(Self, PathBuf)>> {
        if let Ok(env_path) = std::env::var("PROMPT_SEARCH_CONFIG") {
            let path = PathBuf::from(&env_path);
            if path.exists() {
                let config = Self::from_file(&path)?;
                return Ok(Some((config, path)));
            }
        }

        let local_path = PathBuf::from("prompt_search.toml");
        if local_path.exists() {
            let config = Self::from_file(&local_path)?;
            return Ok(Some((config, local_path)));
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_path = config_dir.join("prompt_search").join("config.toml");
            if user_path.exists() {
                let config = Self::from_file(&user_path)?;
                return Ok(Some((config, user_path)));
            }
        }

        Ok(None)
    }

    /// Apply environment variable overrides.
    /// PROMPT_SEARCH_ROOT replaces `library.root`.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(root) = std::env::var("PROMPT_SEARCH_ROOT") {
            if !root.is_empty() {
                self.library.root = root;
            }
        }
        self
    }

    /// Merge CLI overrides into the configuration
    pub fn with_overrides(mut self, root: Option<String>, watch: bool) -> Self {
        if let Some(root) = root {
            self.library.root = root;
        }
        if watch {
            self.library.watch = true;
        }
        self
    }

    /// Generate a template configuration file
    pub fn generate_template() -> String {
        r#"# Prompt Search Configuration
# Generated template - customize as needed

[library]
# Directory holding your prompt markdown files
root = "~/prompts"

# File name that is never indexed as a prompt
readme_name = "README.md"

# Patterns (relative to root) skipped while indexing
exclude_patterns = [
    "**/.git/**",
    "**/node_modules/**",
    "**/.obsidian/**",
]

# Watch and rebuild on file changes when run without a subcommand (default: false)
# watch = false

# Burst window for collapsing rebuild requests, in milliseconds
debounce_ms = 300

[search]
# Maximum results returned when a query sets no limit
default_limit = 100

# Characters of context shown on each side of a match
context_radius = 40

# Parsed-content cache bounds
cache_max_entries = 1000
cache_ttl_secs = 300

# Autocomplete suggestions returned when a query sets no limit
max_suggestions = 10

# Largest edit distance accepted for fuzzy queries
max_fuzzy_distance = 3
"#
        .to_string()
    }

    /// Write template config to the specified path
    pub fn write_template(path: &Path) -> Result<()> {
        let template = Self::generate_template();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        std::fs::write(path, template)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }
}
