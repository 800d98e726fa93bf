use crate::config::SearchConfig;
use crate::frontmatter::{self, validate_tags, ParsedContent};
use crate::search::cache::{fingerprint, ContentCache};
use crate::search::matcher::{context_window, is_standalone, Hit, QueryMatcher};
use crate::search::query::{FieldKind, Match, SearchQuery, SearchResult, SearchScope};

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

/// Extra points when the matched text is as long as the query
const EXACT_LENGTH_BONUS: u32 = 2;
/// Extra points when the match has whitespace (or the field edge) on both sides
const STANDALONE_BONUS: u32 = 3;

/// A document handed to the engine: its path and raw content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchFile {
    pub path: String,
    pub content: String,
}

impl SearchFile {
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }

    fn stem(&self) -> String {
        Path::new(&self.path)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Stateless multi-field search over a supplied set of files.
///
/// Parsing goes through the shared [`ContentCache`]; everything else is
/// computed per call.
pub struct SearchEngine {
    cache: Arc<ContentCache>,
    config: SearchConfig,
}

impl SearchEngine {
    pub fn new(cache: Arc<ContentCache>, config: SearchConfig) -> Self {
        Self { cache, config }
    }

    pub fn cache(&self) -> &Arc<ContentCache> {
        &self.cache
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Parse a file, reusing the cached parse when the content is unchanged.
    pub fn parse(&self, file: &SearchFile) -> Arc<ParsedContent> {
        let fp = fingerprint(&file.content);
        if let Some(parsed) = self.cache.get(&file.path, fp) {
            return parsed;
        }
        let parsed = Arc::new(frontmatter::parse(&file.content, &file.stem()));
        self.cache.set(&file.path, fp, Arc::clone(&parsed));
        parsed
    }

    /// Ranked results, best first, truncated to the query (or default) limit.
    pub fn search(&self, files: &[SearchFile], query: &SearchQuery) -> Vec<SearchResult> {
        let Some(matcher) = self.prepare(query) else {
            return Vec::new();
        };

        let mut results: Vec<SearchResult> = files
            .iter()
            .filter_map(|file| self.search_file(file, query, &matcher))
            .collect();

        // Stable: equal scores keep input order
        results.sort_by(|a, b| b.score.cmp(&a.score));
        results.truncate(query.limit.unwrap_or(self.config.default_limit));

        debug!(query = %query.text(), results = results.len(), "Search complete");
        results
    }

    /// Whether `file` has at least one match.
    pub fn matches(&self, file: &SearchFile, query: &SearchQuery) -> bool {
        let Some(matcher) = self.prepare(query) else {
            return false;
        };
        let parsed = self.parse(file);
        fields(&parsed, query)
            .iter()
            .any(|(_, text)| matcher.is_match(text))
    }

    /// Total number of matches across all files, without any limit.
    pub fn count_matches(&self, files: &[SearchFile], query: &SearchQuery) -> usize {
        let Some(matcher) = self.prepare(query) else {
            return 0;
        };
        files
            .iter()
            .map(|file| {
                let parsed = self.parse(file);
                fields(&parsed, query)
                    .iter()
                    .map(|(_, text)| matcher.find_all(text).len())
                    .sum::<usize>()
            })
            .sum()
    }

    /// Distinct titles and tags starting with the query text, then those
    /// containing it.
    pub fn suggestions(&self, files: &[SearchFile], query: &SearchQuery) -> Vec<String> {
        if !query.is_searchable() {
            return Vec::new();
        }
        let limit = query.max_suggestions.unwrap_or(self.config.max_suggestions);
        let fold = |s: &str| {
            if query.case_sensitive {
                s.to_string()
            } else {
                s.to_lowercase()
            }
        };
        let needle = fold(query.text());

        let mut candidates: Vec<String> = Vec::new();
        for file in files {
            let parsed = self.parse(file);
            candidates.push(parsed.title.clone());
            candidates.extend(validate_tags(&parsed.tags).into_iter().map(String::from));
        }

        let mut prefixed = Vec::new();
        let mut containing = Vec::new();
        for candidate in candidates {
            let folded = fold(&candidate);
            if folded.starts_with(&needle) {
                prefixed.push(candidate);
            } else if folded.contains(&needle) {
                containing.push(candidate);
            }
        }

        let mut suggestions: Vec<String> = Vec::new();
        for candidate in prefixed.into_iter().chain(containing) {
            if suggestions.len() >= limit {
                break;
            }
            if !suggestions.contains(&candidate) {
                suggestions.push(candidate);
            }
        }
        suggestions
    }

    /// Gate, validate and compile a query. `None` means "no results".
    fn prepare(&self, query: &SearchQuery) -> Option<QueryMatcher> {
        if !query.is_searchable() {
            return None;
        }
        if let Err(e) = query.validate(self.config.max_fuzzy_distance) {
            warn!(query = %query.text(), error = %e, "Rejected search query");
            return None;
        }
        match QueryMatcher::new(query) {
            Ok(matcher) => Some(matcher),
            Err(e) => {
                warn!(query = %query.text(), error = %e, "Failed to compile search query");
                None
            }
        }
    }

    fn search_file(
        &self,
        file: &SearchFile,
        query: &SearchQuery,
        matcher: &QueryMatcher,
    ) -> Option<SearchResult> {
        let parsed = self.parse(file);
        let mut matches = Vec::new();
        let mut score = 0u32;
        let mut snippet: Option<(u32, String)> = None;

        for (field, text) in fields(&parsed, query) {
            for hit in matcher.find_all(&text) {
                score += score_hit(field, &text, &hit);
                let context = context_window(&text, &hit, self.config.context_radius);
                if snippet
                    .as_ref()
                    .map_or(true, |(best, _)| field.base_score() > *best)
                {
                    snippet = Some((field.base_score(), context.clone()));
                }
                matches.push(Match {
                    field,
                    offset: hit.offset,
                    length: hit.length,
                    context,
                });
            }
        }

        if matches.is_empty() {
            return None;
        }

        Some(SearchResult {
            id: file.path.clone(),
            title: parsed.title.clone(),
            score,
            matches,
            snippet: snippet.map(|(_, s)| s),
        })
    }
}

fn score_hit(field: FieldKind, text: &str, hit: &Hit) -> u32 {
    let mut score = field.base_score();
    if hit.exact_length {
        score += EXACT_LENGTH_BONUS;
    }
    if is_standalone(text, hit) {
        score += STANDALONE_BONUS;
    }
    score
}

/// The field texts a query looks at, in scan order.
fn fields(parsed: &ParsedContent, query: &SearchQuery) -> Vec<(FieldKind, String)> {
    let mut out = Vec::new();
    let all = query.scope == SearchScope::All;

    if matches!(query.scope, SearchScope::Titles | SearchScope::All) {
        out.push((FieldKind::Title, parsed.title.clone()));
    }
    if all {
        for tag in validate_tags(&parsed.tags) {
            out.push((FieldKind::Tags, tag.into()));
        }
    }
    if matches!(query.scope, SearchScope::Titles | SearchScope::All) {
        if let Some(description) = &parsed.description {
            out.push((FieldKind::Description, description.clone()));
        }
    }
    if matches!(query.scope, SearchScope::Content | SearchScope::All) {
        out.push((FieldKind::Content, parsed.body.clone()));
        if query.include_front_matter {
            if let Some(front_matter) = &parsed.front_matter {
                out.push((FieldKind::FrontMatter, front_matter.clone()));
            }
        }
    }
    out
}
