use std::borrow::Cow;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A `{"value": ...}` wrapper as found in OpenReview note and group content.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct ContentValue {
    #[serde(default)]
    pub value: Option<serde_json::Value>,
}

impl ContentValue {
    pub fn as_str(&self) -> Option<&str> {
        self.value.as_ref().and_then(|v| v.as_str())
    }
}

/// A note exactly as the platform returns it.
#[derive(Debug, Deserialize, Clone)]
pub struct RawSubmission {
    pub id: String,
    #[serde(default)]
    pub content: HashMap<String, ContentValue>,
    #[serde(default)]
    pub cdate: Option<i64>,
    #[serde(default)]
    pub odate: Option<i64>,
    #[serde(default)]
    pub mdate: Option<i64>,
}

/// Venue group. Holds the sub-identifiers used to select submission subsets.
#[derive(Debug, Deserialize, Clone)]
pub struct VenueGroup {
    pub id: String,
    #[serde(default)]
    pub content: HashMap<String, ContentValue>,
}

#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct Submission {
    pub id: String,
    pub title: String,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    pub keywords: Vec<String>,
    pub primary_area: String,
    #[serde(rename = "TLDR")]
    pub tldr: String,
    pub creation_date: Option<String>,
    pub original_date: Option<String>,
    pub modification_date: Option<String>,
    pub forum_link: String,
    pub pdf_link: String,
}

impl Submission {
    /// Flattened text of a field by its record name.
    ///
    /// Unknown names and absent dates read as the empty string so callers can
    /// pass arbitrary field lists without failing.
    pub fn field_text(&self, name: &str) -> Cow<'_, str> {
        match name {
            "id" => Cow::Borrowed(&self.id),
            "title" => Cow::Borrowed(&self.title),
            "abstract" => Cow::Borrowed(&self.abstract_text),
            "keywords" => Cow::Owned(self.keywords.join(" ")),
            "primary_area" => Cow::Borrowed(&self.primary_area),
            "TLDR" => Cow::Borrowed(&self.tldr),
            "creation_date" => Cow::Borrowed(self.creation_date.as_deref().unwrap_or("")),
            "original_date" => Cow::Borrowed(self.original_date.as_deref().unwrap_or("")),
            "modification_date" => {
                Cow::Borrowed(self.modification_date.as_deref().unwrap_or(""))
            }
            "forum_link" => Cow::Borrowed(&self.forum_link),
            "pdf_link" => Cow::Borrowed(&self.pdf_link),
            _ => Cow::Borrowed(""),
        }
    }
}

pub mod discovery;
pub mod normalize;
pub mod matching;
pub mod download;

#[cfg(test)]
pub(crate) fn sample_submission(id: &str, title: &str, abstract_text: &str) -> Submission {
    Submission {
        id: id.to_string(),
        title: title.to_string(),
        abstract_text: abstract_text.to_string(),
        keywords: vec![],
        primary_area: String::new(),
        tldr: String::new(),
        creation_date: None,
        original_date: None,
        modification_date: None,
        forum_link: format!("https://openreview.net/forum?id={}", id),
        pdf_link: format!("https://openreview.net/pdf?id={}", id),
    }
}
