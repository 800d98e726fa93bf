pub mod indexer;
pub mod path_filter;
pub mod structure;
pub mod walker;
pub mod watcher;

pub use indexer::{IndexPhase, InvalidationReason, PromptIndexer};
pub use path_filter::PathFilter;
pub use structure::{Folder, Prompt, PromptStructure};
pub use watcher::{FileChange, FileWatcher};
