use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Unrecognized submission status passed to the fetcher
    #[error("invalid status: {value}. Valid options are: {}", .allowed.join(", "))]
    InvalidArgument {
        value: String,
        allowed: &'static [&'static str],
    },

    #[error("missing required field: {field}")]
    MissingField { field: String },

    #[error("field {field} has unexpected type, expected {expected}")]
    FieldType { field: String, expected: &'static str },

    #[error("invalid search pattern: {0}")]
    InvalidPattern(#[from] fancy_regex::Error),

    /// Any failure talking to the OpenReview API. Aborts the run.
    #[error("remote query failed: {0}")]
    RemoteQuery(String),

    /// A single file could not be fetched or written. Never aborts a batch.
    #[error("download of {url} failed: {reason}")]
    Download { url: String, reason: String },
}

impl Error {
    pub fn missing(field: impl Into<String>) -> Self {
        Error::MissingField { field: field.into() }
    }

    pub fn download(url: &str, reason: impl std::fmt::Display) -> Self {
        Error::Download {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }
}
