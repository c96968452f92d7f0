use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use governor::clock::DefaultClock;
use governor::state::{direct::NotKeyed, InMemoryState};
use governor::{Quota, RateLimiter};
use nonzero_ext::nonzero;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::layers::{ContentValue, RawSubmission, VenueGroup};

pub const DEFAULT_BASE_URL: &str = "https://api2.openreview.net";

/// Largest page the notes endpoint will return.
const MAX_PAGE_SIZE: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionStatus {
    All,
    Accepted,
    UnderReview,
    Withdrawn,
    DeskRejected,
}

impl SubmissionStatus {
    pub const NAMES: &'static [&'static str] =
        &["all", "accepted", "under_review", "withdrawn", "desk_rejected"];

    pub fn as_str(self) -> &'static str {
        match self {
            SubmissionStatus::All => "all",
            SubmissionStatus::Accepted => "accepted",
            SubmissionStatus::UnderReview => "under_review",
            SubmissionStatus::Withdrawn => "withdrawn",
            SubmissionStatus::DeskRejected => "desk_rejected",
        }
    }

    /// Maps the status onto the query that selects it within `venue`.
    pub fn resolve(self, venue: &VenueGroup) -> Result<NoteQuery> {
        let sub_id = |key: &str| {
            venue
                .content
                .get(key)
                .and_then(ContentValue::as_str)
                .map(str::to_string)
                .ok_or_else(|| Error::missing(key))
        };

        match self {
            SubmissionStatus::All => Ok(NoteQuery::Invitation(format!(
                "{}/-/{}",
                venue.id,
                sub_id("submission_name")?
            ))),
            // Provisional: groups carry no accepted-venue key, the top-level id stands in.
            SubmissionStatus::Accepted => Ok(NoteQuery::VenueId(venue.id.clone())),
            SubmissionStatus::UnderReview => Ok(NoteQuery::VenueId(sub_id("submission_venue_id")?)),
            SubmissionStatus::Withdrawn => Ok(NoteQuery::VenueId(sub_id("withdrawn_venue_id")?)),
            SubmissionStatus::DeskRejected => {
                Ok(NoteQuery::VenueId(sub_id("desk_rejected_venue_id")?))
            }
        }
    }
}

impl FromStr for SubmissionStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "all" => Ok(SubmissionStatus::All),
            "accepted" => Ok(SubmissionStatus::Accepted),
            "under_review" => Ok(SubmissionStatus::UnderReview),
            "withdrawn" => Ok(SubmissionStatus::Withdrawn),
            "desk_rejected" => Ok(SubmissionStatus::DeskRejected),
            other => Err(Error::InvalidArgument {
                value: other.to_string(),
                allowed: Self::NAMES,
            }),
        }
    }
}

impl fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NoteQuery {
    /// Every note posted under an invitation, e.g. `ICLR.cc/2025/Conference/-/Submission`.
    Invitation(String),
    /// Notes whose `content.venueid` equals the given identifier.
    VenueId(String),
}

impl NoteQuery {
    fn to_query_string(&self) -> String {
        match self {
            NoteQuery::Invitation(inv) => format!("invitation={}", urlencoding::encode(inv)),
            NoteQuery::VenueId(id) => format!("content.venueid={}", urlencoding::encode(id)),
        }
    }
}

impl fmt::Display for NoteQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NoteQuery::Invitation(inv) => write!(f, "invitation {}", inv),
            NoteQuery::VenueId(id) => write!(f, "venueid {}", id),
        }
    }
}

#[derive(Deserialize)]
struct LoginResponse {
    token: String,
}

#[derive(Deserialize)]
struct GroupsResponse {
    #[serde(default)]
    groups: Vec<VenueGroup>,
}

#[derive(Deserialize)]
struct NotesResponse {
    #[serde(default)]
    notes: Vec<RawSubmission>,
    count: Option<usize>,
}

pub struct OpenReviewClient {
    client: Client,
    base_url: String,
    token: Option<String>,
    page_size: usize,
    limiter: Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>,
}

impl OpenReviewClient {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        // OpenReview throttles aggressive clients, stay well under it.
        let quota = Quota::per_second(nonzero!(5u32));

        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: None,
            page_size: MAX_PAGE_SIZE,
            limiter: Arc::new(RateLimiter::direct(quota)),
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.clamp(1, MAX_PAGE_SIZE);
        self
    }

    pub async fn login(&mut self, username: &str, password: &str) -> Result<()> {
        self.limiter.until_ready().await;

        let url = format!("{}/login", self.base_url);
        tracing::info!("Logging in to OpenReview as {}", username);
        let body = serde_json::json!({ "id": username, "password": password });
        match self.client.post(&url).json(&body).send().await {
            Ok(resp) => {
                let login: LoginResponse = decode(&url, resp).await?;
                self.token = Some(login.token);
                Ok(())
            }
            Err(e) => Err(Error::RemoteQuery(format!("POST {}: {}", url, e))),
        }
    }

    pub async fn get_group(&self, id: &str) -> Result<VenueGroup> {
        let url = format!("{}/groups?id={}", self.base_url, urlencoding::encode(id));
        let resp: GroupsResponse = self.get_json(&url).await?;
        resp.groups
            .into_iter()
            .next()
            .ok_or_else(|| Error::RemoteQuery(format!("group not found: {}", id)))
    }

    /// Pages through the notes endpoint until an empty or short page, or the
    /// reported count. A server that keeps repeating a page is an error.
    pub async fn get_all_notes(&self, query: &NoteQuery) -> Result<Vec<RawSubmission>> {
        let mut notes = Vec::new();
        let mut offset = 0;
        let mut previous_first_id: Option<String> = None;

        loop {
            let url = format!(
                "{}/notes?{}&limit={}&offset={}",
                self.base_url,
                query.to_query_string(),
                self.page_size,
                offset
            );
            let page: NotesResponse = self.get_json(&url).await?;
            let fetched = page.notes.len();
            if fetched == 0 {
                break;
            }

            let first_id = page.notes[0].id.clone();
            if offset > 0 && previous_first_id.as_deref() == Some(first_id.as_str()) {
                return Err(Error::RemoteQuery(format!(
                    "{} returned the same page again at offset {}, paging is not honored",
                    url, offset
                )));
            }
            previous_first_id = Some(first_id);

            notes.extend(page.notes);
            offset += fetched;
            tracing::debug!("Fetched {} notes ({} total) for {}", fetched, offset, query);

            let reached_count = page.count.is_some_and(|count| offset >= count);
            if fetched < self.page_size || reached_count {
                break;
            }
        }

        Ok(notes)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        self.limiter.until_ready().await;

        let mut request = self.client.get(url);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        tracing::info!("Querying OpenReview: {}", url);
        match request.send().await {
            Ok(resp) => decode(url, resp).await,
            Err(e) => Err(Error::RemoteQuery(format!("GET {}: {}", url, e))),
        }
    }
}

async fn decode<T: DeserializeOwned>(url: &str, resp: Response) -> Result<T> {
    if !resp.status().is_success() {
        return Err(Error::RemoteQuery(format!(
            "OpenReview API error for {}: {}",
            url,
            resp.status()
        )));
    }
    resp.json()
        .await
        .map_err(|e| Error::RemoteQuery(format!("Undecodable response from {}: {}", url, e)))
}

/// Looks up the venue group and returns every note matching `status`.
pub async fn fetch_submissions(
    client: &OpenReviewClient,
    venue_id: &str,
    status: SubmissionStatus,
) -> Result<Vec<RawSubmission>> {
    let venue = client.get_group(venue_id).await?;
    let query = status.resolve(&venue)?;
    tracing::info!("Fetching {} submissions of {} by {}", status, venue_id, query);
    client.get_all_notes(&query).await
}
