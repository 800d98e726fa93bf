//! Indexing and search for a directory of markdown prompts.
//!
//! The crate walks a prompt root into a cached [`PromptStructure`] of folders
//! and prompts, and runs multi-field ranked text search over the prompt files.
//! [`PromptLibrary`] ties both together behind a single service object.

pub mod config;
pub mod frontmatter;
pub mod index;
pub mod library;
pub mod search;
pub mod store;
pub mod telemetry;
pub mod utils;

pub use config::Config;
pub use index::{IndexPhase, InvalidationReason, PromptIndexer, PromptStructure};
pub use library::PromptLibrary;
pub use search::{SearchQuery, SearchResult, SearchScope};
pub use store::{ContentStore, FsContentStore};
