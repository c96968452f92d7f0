use std::convert::Infallible;
use std::str::FromStr;

use fancy_regex::Regex;

use crate::error::Result;
use crate::layers::Submission;

/// Fields searched by [`FieldSelector::All`].
pub const ALL_FIELDS: [&str; 5] = ["title", "abstract", "keywords", "primary_area", "TLDR"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldSelector {
    All,
    /// Checked in order. Names the record does not know read as empty.
    Named(Vec<String>),
}

impl FieldSelector {
    pub fn names(&self) -> Vec<&str> {
        match self {
            FieldSelector::All => ALL_FIELDS.to_vec(),
            FieldSelector::Named(names) => names.iter().map(String::as_str).collect(),
        }
    }
}

impl Default for FieldSelector {
    fn default() -> Self {
        FieldSelector::Named(vec!["title".to_string(), "abstract".to_string()])
    }
}

impl FromStr for FieldSelector {
    type Err = Infallible;

    /// `all`, or a comma separated list such as `title,keywords`.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        if s.trim() == "all" {
            return Ok(FieldSelector::All);
        }
        Ok(FieldSelector::Named(
            s.split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_string)
                .collect(),
        ))
    }
}

pub enum TextMatcher {
    /// Case-sensitive containment.
    Substring(String),
    /// Case-insensitive search, lookaround allowed.
    Regex(Regex),
}

impl TextMatcher {
    pub fn new(pattern: &str, is_regex: bool) -> Result<Self> {
        if is_regex {
            let regex = Regex::new(&format!("(?i){}", pattern))?;
            Ok(TextMatcher::Regex(regex))
        } else {
            Ok(TextMatcher::Substring(pattern.to_string()))
        }
    }

    /// True as soon as one of `fields` matches.
    pub fn matches(&self, record: &Submission, fields: &FieldSelector) -> bool {
        fields.names().into_iter().any(|field| {
            let text = record.field_text(field);
            let hit = self.is_match(&text);
            if hit {
                tracing::debug!("{} matched on {}", record.id, field);
            }
            hit
        })
    }

    fn is_match(&self, text: &str) -> bool {
        match self {
            TextMatcher::Substring(needle) => text.contains(needle.as_str()),
            TextMatcher::Regex(regex) => match regex.is_match(text) {
                Ok(hit) => hit,
                Err(e) => {
                    tracing::warn!("Regex evaluation gave up, treating as no match: {}", e);
                    false
                }
            },
        }
    }
}

pub fn matches(
    record: &Submission,
    pattern: &str,
    fields: &FieldSelector,
    is_regex: bool,
) -> Result<bool> {
    Ok(TextMatcher::new(pattern, is_regex)?.matches(record, fields))
}

/// Keeps the records that match, in input order.
pub fn search(
    records: Vec<Submission>,
    pattern: &str,
    fields: &FieldSelector,
    is_regex: bool,
) -> Result<Vec<Submission>> {
    let matcher = TextMatcher::new(pattern, is_regex)?;
    Ok(records
        .into_iter()
        .filter(|record| matcher.matches(record, fields))
        .collect())
}

/// `(?=.*a)(?=.*b)`: every word must occur somewhere in the field. Words are
/// used as regex fragments, not escaped.
pub fn all_of_pattern<S: AsRef<str>>(words: &[S]) -> String {
    words
        .iter()
        .map(|word| format!("(?=.*{})", word.as_ref()))
        .collect()
}

/// `a|b`: any one word suffices.
pub fn any_of_pattern<S: AsRef<str>>(words: &[S]) -> String {
    words
        .iter()
        .map(|word| word.as_ref())
        .collect::<Vec<_>>()
        .join("|")
}
