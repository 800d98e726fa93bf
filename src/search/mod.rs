pub mod cache;
pub mod engine;
pub mod fuzzy;
pub mod matcher;
pub mod query;
pub mod service;

pub use cache::ContentCache;
pub use engine::{SearchEngine, SearchFile};
pub use query::{FieldKind, FuzzyOptions, Match, SearchQuery, SearchResult, SearchScope};
pub use service::SearchService;
