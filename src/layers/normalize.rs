use chrono::{Local, TimeZone};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::layers::{RawSubmission, Submission};

pub const FORUM_URL: &str = "https://openreview.net/forum?id=";
pub const PDF_URL: &str = "https://openreview.net/pdf?id=";

/// Flattens a raw note into a [`Submission`].
pub fn normalize(raw: &RawSubmission) -> Result<Submission> {
    Ok(Submission {
        id: raw.id.clone(),
        title: required_str(raw, "title")?,
        abstract_text: required_str(raw, "abstract")?,
        keywords: required_keywords(raw)?,
        primary_area: required_str(raw, "primary_area")?,
        tldr: raw
            .content
            .get("TLDR")
            .and_then(|c| c.as_str())
            .unwrap_or_default()
            .to_string(),
        creation_date: format_timestamp(raw.cdate),
        original_date: format_timestamp(raw.odate),
        modification_date: format_timestamp(raw.mdate),
        forum_link: format!("{}{}", FORUM_URL, raw.id),
        pdf_link: format!("{}{}", PDF_URL, raw.id),
    })
}

/// Milliseconds since the epoch to a local `YYYY-MM-DD`. Zero counts as unset.
pub fn format_timestamp(millis: Option<i64>) -> Option<String> {
    let millis = millis.filter(|ms| *ms != 0)?;
    Local
        .timestamp_millis_opt(millis)
        .single()
        .map(|dt| dt.format("%Y-%m-%d").to_string())
}

fn required_value<'a>(raw: &'a RawSubmission, field: &str) -> Result<&'a Value> {
    raw.content
        .get(field)
        .and_then(|c| c.value.as_ref())
        .filter(|v| !v.is_null())
        .ok_or_else(|| Error::missing(field))
}

fn required_str(raw: &RawSubmission, field: &str) -> Result<String> {
    match required_value(raw, field)? {
        Value::String(s) => Ok(s.clone()),
        _ => Err(Error::FieldType {
            field: field.to_string(),
            expected: "string",
        }),
    }
}

fn required_keywords(raw: &RawSubmission) -> Result<Vec<String>> {
    let type_error = || Error::FieldType {
        field: "keywords".to_string(),
        expected: "list of strings",
    };

    match required_value(raw, "keywords")? {
        Value::String(s) => Ok(vec![s.clone()]),
        Value::Array(items) => items
            .iter()
            .map(|item| item.as_str().map(str::to_string).ok_or_else(type_error))
            .collect(),
        _ => Err(type_error()),
    }
}
