//! Front matter parsing for prompt markdown files.
//!
//! Handles the restricted header format used by prompt files:
//!
//! ```text
//! ---
//! title: "Code Review"
//! description: Review a diff for bugs
//! tags: [review, code]
//! ---
//! Body text
//! ```
//!
//! Only `key: value` lines and single-line bracketed lists are understood.
//! Anything else in the header makes the whole block malformed, in which case
//! the file is treated as having no metadata at all.

use anyhow::{ensure, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Line that opens and closes a front matter block.
const DELIMITER: &str = "---";

/// Metadata and body extracted from a prompt file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedContent {
    /// Resolved display title (front matter, first heading, or file name)
    pub title: String,
    /// Description from the front matter, if any
    pub description: Option<String>,
    /// Tags in declaration order, trimmed and unquoted (not yet validated)
    pub tags: Vec<String>,
    /// Content after the closing delimiter, trimmed
    pub body: String,
    /// Raw text between the delimiters when a valid block was found
    pub front_matter: Option<String>,
}

#[derive(Default)]
struct Metadata {
    title: Option<String>,
    description: Option<String>,
    tags: Vec<String>,
}

/// Parse raw file content into metadata and body.
///
/// `fallback_name` is the file stem; it becomes the title (hyphens replaced by
/// spaces) when neither the front matter nor a `# heading` provides one.
/// Never fails: malformed headers degrade to "no metadata".
pub fn parse(raw: &str, fallback_name: &str) -> ParsedContent {
    let (metadata, body, front_matter) = match split_front_matter(raw) {
        Some((block, body)) => match parse_metadata(block) {
            Some(metadata) => (metadata, body.trim().to_string(), Some(block.to_string())),
            None => {
                tracing::debug!(name = fallback_name, "Malformed front matter, treating as body");
                (Metadata::default(), raw.trim().to_string(), None)
            }
        },
        None => (Metadata::default(), raw.trim().to_string(), None),
    };

    let title = metadata
        .title
        .filter(|t| !t.is_empty())
        .or_else(|| first_heading(&body))
        .unwrap_or_else(|| crate::utils::display_name(fallback_name));

    ParsedContent {
        title,
        description: metadata.description.filter(|d| !d.is_empty()),
        tags: metadata.tags,
        body,
        front_matter,
    }
}

/// Split content into (header block, remainder) if it opens with a delimiter
/// line and a matching closing delimiter line follows.
fn split_front_matter(raw: &str) -> Option<(&str, &str)> {
    let raw = raw.strip_prefix('\u{feff}').unwrap_or(raw);
    let first_end = raw.find('\n').unwrap_or(raw.len());
    if raw[..first_end].trim_end() != DELIMITER {
        return None;
    }

    let block_start = (first_end + 1).min(raw.len());
    let mut pos = block_start;
    for line in raw[block_start..].split_inclusive('\n') {
        if line.trim_end() == DELIMITER {
            let block = &raw[block_start..pos];
            let body = &raw[pos + line.len()..];
            return Some((block.trim_end_matches(['\n', '\r']), body));
        }
        pos += line.len();
    }
    None
}

/// Parse header lines. Returns `None` when any line is not `key: value`.
fn parse_metadata(block: &str) -> Option<Metadata> {
    let mut metadata = Metadata::default();

    for line in block.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let (key, value) = trimmed.split_once(':')?;
        let key = key.trim();
        if key.is_empty() || key.contains(char::is_whitespace) {
            return None;
        }
        let value = value.trim();

        match key {
            "title" => metadata.title = Some(unquote(value).to_string()),
            "description" => metadata.description = Some(unquote(value).to_string()),
            "tags" => metadata.tags = parse_list(value),
            _ => {}
        }
    }

    Some(metadata)
}

/// Parse `[a, "b", c]` into its elements. A bare scalar is a single element.
fn parse_list(value: &str) -> Vec<String> {
    let inner = match value.strip_prefix('[').and_then(|v| v.strip_suffix(']')) {
        Some(inner) => inner,
        None => value,
    };

    inner
        .split(',')
        .map(|item| unquote(item.trim()).trim().to_string())
        .filter(|item| !item.is_empty())
        .collect()
}

/// Strip a single pair of surrounding double quotes.
fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}

/// Text of the first level-one heading (`# Title`) in the body.
fn first_heading(body: &str) -> Option<String> {
    body.lines()
        .map(str::trim_start)
        .find_map(|line| line.strip_prefix("# "))
        .map(|heading| heading.trim().to_string())
        .filter(|heading| !heading.is_empty())
}

/// A validated, lowercase tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Tag(String);

impl Tag {
    /// Longest tag accepted.
    pub const MAX_LEN: usize = 64;

    /// Normalize and validate a raw tag string.
    pub fn parse(raw: &str) -> Result<Self> {
        let tag = raw.trim().to_lowercase();
        ensure!(!tag.is_empty(), "tag is empty");
        ensure!(
            tag.chars().count() <= Self::MAX_LEN,
            "tag exceeds {} characters: {}",
            Self::MAX_LEN,
            tag
        );
        ensure!(
            !tag.chars().any(|c| c.is_control() || matches!(c, ',' | '[' | ']' | '"')),
            "tag contains a reserved character: {:?}",
            tag
        );
        Ok(Self(tag))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Tag {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<Tag> for String {
    fn from(tag: Tag) -> Self {
        tag.0
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Validate raw tags, skipping (and logging) the ones that fail.
pub fn validate_tags(raw: &[String]) -> Vec<Tag> {
    raw.iter()
        .filter_map(|t| match Tag::parse(t) {
            Ok(tag) => Some(tag),
            Err(e) => {
                tracing::debug!(tag = %t, error = %e, "Skipping invalid tag");
                None
            }
        })
        .collect()
}

/// Default content for a newly created prompt.
pub fn prompt_template(title: &str) -> String {
    format!(
        "---\ntitle: \"{}\"\ndescription: \"\"\ntags: []\n---\n\n# {}\n",
        title.replace('"', "'"),
        title
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_with_front_matter() {
        let content = "---\ntitle: \"Code Review\"\ntags: [a, b]\n---\nBody text";
        let parsed = parse(content, "code-review");

        assert_eq!(parsed.title, "Code Review");
        assert_eq!(parsed.tags, vec!["a", "b"]);
        assert_eq!(parsed.body, "Body text");
        assert_eq!(parsed.description, None);
        assert!(parsed.front_matter.is_some());
    }

    #[test]
    fn test_heading_title_without_front_matter() {
        let parsed = parse("# My Title\n\nSome words", "file-name");
        assert_eq!(parsed.title, "My Title");
        assert_eq!(parsed.body, "# My Title\n\nSome words");
    }

    #[test]
    fn test_heading_preferred_over_file_name() {
        let content = "---\ndescription: d\n---\n\n# From Heading\ntext";
        let parsed = parse(content, "from-file");
        assert_eq!(parsed.title, "From Heading");
        assert_eq!(parsed.description.as_deref(), Some("d"));
    }

    #[test]
    fn test_file_name_fallback() {
        let parsed = parse("no heading here", "write-unit-tests");
        assert_eq!(parsed.title, "write unit tests");
    }

    #[test]
    fn test_second_level_heading_is_not_a_title() {
        let parsed = parse("## Section\nbody", "fallback");
        assert_eq!(parsed.title, "fallback");
    }

    #[test]
    fn test_unterminated_front_matter_is_body() {
        let content = "---\ntitle: Broken\nno closing delimiter";
        let parsed = parse(content, "broken");
        assert_eq!(parsed.title, "broken");
        assert!(parsed.front_matter.is_none());
        assert_eq!(parsed.body, content);
    }

    #[test]
    fn test_unparseable_line_degrades_to_no_metadata() {
        let content = "---\ntitle: Good\ntags:\n  - one\n---\nBody";
        let parsed = parse(content, "multi-line");
        assert_eq!(parsed.title, "multi line");
        assert!(parsed.tags.is_empty());
        assert_eq!(parsed.body, content);
    }

    #[test]
    fn test_quoted_tags_and_unknown_keys() {
        let content = "---\nauthor: someone\ntags: [\"Rust\", ' spaced ', \"\"]\ntitle: T\n---\n";
        let parsed = parse(content, "x");
        assert_eq!(parsed.title, "T");
        assert_eq!(parsed.tags, vec!["Rust", "' spaced '"]);
        assert_eq!(parsed.body, "");
    }

    #[test]
    fn test_only_one_pair_of_quotes_stripped() {
        let parsed = parse("---\ntitle: \"\"Nested\"\"\n---\n", "x");
        assert_eq!(parsed.title, "\"Nested\"");
    }

    #[test]
    fn test_crlf_front_matter() {
        let content = "---\r\ntitle: Windows\r\ntags: [x]\r\n---\r\nBody\r\n";
        let parsed = parse(content, "w");
        assert_eq!(parsed.title, "Windows");
        assert_eq!(parsed.tags, vec!["x"]);
        assert_eq!(parsed.body, "Body");
    }

    #[test]
    fn test_scalar_tags_value() {
        let parsed = parse("---\ntags: single\n---\n", "x");
        assert_eq!(parsed.tags, vec!["single"]);
    }

    #[test]
    fn test_tag_validation() {
        assert_eq!(Tag::parse("  Rust ").unwrap().as_str(), "rust");
        assert!(Tag::parse("   ").is_err());
        assert!(Tag::parse("a,b").is_err());
        assert!(Tag::parse(&"x".repeat(Tag::MAX_LEN + 1)).is_err());

        let tags = validate_tags(&["Ok".to_string(), "".to_string(), "ok".to_string()]);
        assert_eq!(tags.len(), 2);
        assert_eq!(tags[0], tags[1]);
    }

    #[test]
    fn test_template_round_trips_through_parser() {
        let parsed = parse(&prompt_template("Daily Standup"), "daily-standup");
        assert_eq!(parsed.title, "Daily Standup");
        assert!(parsed.tags.is_empty());
        assert_eq!(parsed.body, "# Daily Standup");
    }
}
