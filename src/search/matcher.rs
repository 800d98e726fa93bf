//! Text matching for a single query.
//!
//! A [`QueryMatcher`] is compiled once per query and then run over every
//! field of every document. Three strategies exist:
//!
//! - case-sensitive substring: `memchr::memmem` over the raw bytes
//! - case-insensitive or whole-word: an escaped `regex` pattern
//! - fuzzy: per-word bounded edit distance, optionally accepting prefixes
//!
//! Substring scans restart one character past each hit, so overlapping
//! occurrences such as `aa` in `aaa` are all reported.

use crate::search::fuzzy::{bounded_levenshtein, is_word_char, words};
use crate::search::query::{FuzzyOptions, SearchQuery};

use anyhow::{Context, Result};
use memchr::memmem::Finder;
use regex::{Regex, RegexBuilder};

/// One occurrence inside a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hit {
    /// Byte offset
    pub offset: usize,
    /// Byte length
    pub length: usize,
    /// The matched text has as many characters as the query (word)
    pub exact_length: bool,
}

enum Strategy {
    Literal(Finder<'static>),
    Pattern(Regex),
    Fuzzy {
        words: Vec<String>,
        options: FuzzyOptions,
    },
}

pub struct QueryMatcher {
    strategy: Strategy,
    case_sensitive: bool,
    query_chars: usize,
}

impl QueryMatcher {
    /// Compile the matcher for `query`. The query text must be non-empty.
    pub fn new(query: &SearchQuery) -> Result<Self> {
        let text = query.text();
        let case_sensitive = query.case_sensitive;

        let strategy = if let Some(options) = query.fuzzy {
            let words = words(text)
                .map(|(_, w)| fold(w, case_sensitive))
                .collect::<Vec<_>>();
            anyhow::ensure!(!words.is_empty(), "Fuzzy query has no words: {:?}", text);
            Strategy::Fuzzy { words, options }
        } else if case_sensitive && !query.match_whole_word {
            Strategy::Literal(Finder::new(text.as_bytes()).into_owned())
        } else {
            let mut pattern = regex::escape(text);
            if query.match_whole_word {
                if text.chars().next().is_some_and(is_word_char) {
                    pattern.insert_str(0, r"\b");
                }
                if text.chars().last().is_some_and(is_word_char) {
                    pattern.push_str(r"\b");
                }
            }
            let regex = RegexBuilder::new(&pattern)
                .case_insensitive(!case_sensitive)
                .build()
                .with_context(|| format!("Failed to compile query pattern: {}", pattern))?;
            Strategy::Pattern(regex)
        };

        Ok(Self {
            strategy,
            case_sensitive,
            query_chars: text.chars().count(),
        })
    }

    /// Every hit in `text`, in order of offset.
    pub fn find_all(&self, text: &str) -> Vec<Hit> {
        let mut hits = Vec::new();
        match &self.strategy {
            Strategy::Literal(finder) => {
                let mut pos = 0;
                while pos < text.len() {
                    let Some(found) = finder.find(&text.as_bytes()[pos..]) else {
                        break;
                    };
                    let offset = pos + found;
                    let length = finder.needle().len();
                    hits.push(Hit {
                        offset,
                        length,
                        exact_length: true,
                    });
                    pos = offset + char_len_at(text, offset);
                }
            }
            Strategy::Pattern(regex) => {
                let mut pos = 0;
                while pos < text.len() {
                    let Some(found) = regex.find_at(text, pos) else {
                        break;
                    };
                    hits.push(Hit {
                        offset: found.start(),
                        length: found.len(),
                        exact_length: found.as_str().chars().count() == self.query_chars,
                    });
                    pos = found.start() + char_len_at(text, found.start());
                }
            }
            Strategy::Fuzzy { words: query_words, options } => {
                let max = usize::from(options.max_distance);
                for (offset, word) in words(text) {
                    let folded = fold(word, self.case_sensitive);
                    let matched = query_words.iter().find(|q| {
                        bounded_levenshtein(&folded, q, max).is_some()
                            || (options.prefix && folded.starts_with(q.as_str()))
                    });
                    if let Some(query_word) = matched {
                        hits.push(Hit {
                            offset,
                            length: word.len(),
                            exact_length: word.chars().count() == query_word.chars().count(),
                        });
                    }
                }
            }
        }
        hits
    }

    pub fn is_match(&self, text: &str) -> bool {
        match &self.strategy {
            Strategy::Literal(finder) => finder.find(text.as_bytes()).is_some(),
            Strategy::Pattern(regex) => regex.is_match(text),
            Strategy::Fuzzy { .. } => !self.find_all(text).is_empty(),
        }
    }
}

fn fold(text: &str, case_sensitive: bool) -> String {
    if case_sensitive {
        text.to_string()
    } else {
        text.to_lowercase()
    }
}

fn char_len_at(text: &str, offset: usize) -> usize {
    text[offset..].chars().next().map_or(1, char::len_utf8)
}

/// Whitespace (or the edge of the text) directly before and after the hit.
pub fn is_standalone(text: &str, hit: &Hit) -> bool {
    let before = text[..hit.offset].chars().next_back();
    let after = text[hit.offset + hit.length..].chars().next();
    before.map_or(true, char::is_whitespace) && after.map_or(true, char::is_whitespace)
}

/// Up to `radius` characters on each side of the hit, with `...` marking a
/// clipped end. Line breaks are flattened to spaces.
pub fn context_window(text: &str, hit: &Hit, radius: usize) -> String {
    let start = text[..hit.offset]
        .char_indices()
        .rev()
        .nth(radius.saturating_sub(1))
        .map_or(0, |(i, _)| i);
    let start = if radius == 0 { hit.offset } else { start };

    let tail = &text[hit.offset + hit.length..];
    let end = hit.offset
        + hit.length
        + tail
            .char_indices()
            .nth(radius)
            .map_or(tail.len(), |(i, _)| i);

    let mut window = String::with_capacity(end - start + 6);
    if start > 0 {
        window.push_str("...");
    }
    window.push_str(&text[start..end].replace(['\r', '\n', '\t'], " "));
    if end < text.len() {
        window.push_str("...");
    }
    window
}
