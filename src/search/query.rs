//! Query and result types shared by the search engine and its callers.

use anyhow::{ensure, Result};
use serde::{Deserialize, Serialize};

/// Which document fields a query looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchScope {
    /// Title and description
    Titles,
    /// Body, plus the raw front matter when requested
    Content,
    /// Every field including tags
    #[default]
    #[serde(alias = "both")]
    All,
}

/// Bounded edit-distance matching of whole words.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FuzzyOptions {
    pub max_distance: u8,
    /// Also accept words that start with the query word
    #[serde(default)]
    pub prefix: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchQuery {
    pub query: String,
    #[serde(default)]
    pub scope: SearchScope,
    #[serde(default)]
    pub case_sensitive: bool,
    #[serde(default)]
    pub fuzzy: Option<FuzzyOptions>,
    #[serde(default)]
    pub match_whole_word: bool,
    #[serde(default)]
    pub include_front_matter: bool,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub max_suggestions: Option<usize>,
    /// An inactive query yields nothing and triggers no indexing work
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

impl SearchQuery {
    /// Active, case-insensitive substring query over all fields.
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            scope: SearchScope::All,
            case_sensitive: false,
            fuzzy: None,
            match_whole_word: false,
            include_front_matter: false,
            limit: None,
            max_suggestions: None,
            is_active: true,
        }
    }

    pub fn scope(mut self, scope: SearchScope) -> Self {
        self.scope = scope;
        self
    }

    pub fn case_sensitive(mut self, case_sensitive: bool) -> Self {
        self.case_sensitive = case_sensitive;
        self
    }

    pub fn fuzzy(mut self, max_distance: u8, prefix: bool) -> Self {
        self.fuzzy = Some(FuzzyOptions { max_distance, prefix });
        self
    }

    pub fn whole_word(mut self, whole_word: bool) -> Self {
        self.match_whole_word = whole_word;
        self
    }

    pub fn include_front_matter(mut self, include: bool) -> Self {
        self.include_front_matter = include;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn active(mut self, is_active: bool) -> Self {
        self.is_active = is_active;
        self
    }

    /// Trimmed query text
    pub fn text(&self) -> &str {
        self.query.trim()
    }

    /// Whether the query may do any work at all.
    pub fn is_searchable(&self) -> bool {
        self.is_active && !self.text().is_empty()
    }

    /// Reject option combinations the engine does not accept.
    pub fn validate(&self, max_fuzzy_distance: u8) -> Result<()> {
        if let Some(fuzzy) = &self.fuzzy {
            ensure!(
                fuzzy.max_distance <= max_fuzzy_distance,
                "Fuzzy distance {} exceeds the maximum of {}",
                fuzzy.max_distance,
                max_fuzzy_distance
            );
        }
        ensure!(self.limit != Some(0), "Result limit must be greater than zero");
        ensure!(
            self.max_suggestions != Some(0),
            "Suggestion limit must be greater than zero"
        );
        Ok(())
    }
}

/// Document field a match was found in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FieldKind {
    Title,
    Tags,
    Description,
    Content,
    FrontMatter,
}

impl FieldKind {
    /// Points a single match in this field is worth.
    pub fn base_score(self) -> u32 {
        match self {
            Self::Title => 10,
            Self::Tags => 7,
            Self::Description => 5,
            Self::Content | Self::FrontMatter => 1,
        }
    }
}

/// One occurrence of the query in a document field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Match {
    pub field: FieldKind,
    /// Byte offset into the field text
    pub offset: usize,
    /// Byte length of the matched text
    pub length: usize,
    /// Text around the match, with `...` where it was clipped
    pub context: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Path of the matching document
    pub id: String,
    pub title: String,
    pub score: u32,
    pub matches: Vec<Match>,
    /// Context of the match in the highest scoring field
    pub snippet: Option<String>,
}
