//! Data model (spec §3). Plain structs mirroring the entities the relational
//! store would persist; the store traits in `crate::store` are the only code
//! that mutates them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type Id = String;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tenant {
    pub id: Id,
    pub email: Option<String>,
    pub poll_interval_minutes: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Keyword {
    pub id: Id,
    pub tenant_id: Id,
    /// OR-group of phrases; matching any one counts as a hit.
    pub phrases: Vec<String>,
    pub exclusions: Vec<String>,
    pub proximity_window: usize,
    pub require_order: bool,
    pub use_stemming: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Keyword {
    pub fn new(tenant_id: impl Into<String>, phrases: Vec<String>) -> Self {
        Self {
            id: uuid_like(),
            tenant_id: tenant_id.into(),
            phrases,
            exclusions: Vec::new(),
            proximity_window: 15,
            require_order: false,
            use_stemming: false,
            is_active: true,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubredditStatus {
    Active,
    Inaccessible,
    Private,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoredSubreddit {
    pub id: Id,
    pub tenant_id: Id,
    /// Lowercased, stored without the `r/` prefix.
    pub name: String,
    pub status: SubredditStatus,
    pub include_media_posts: bool,
    pub dedupe_crossposts: bool,
    pub filter_bots: bool,
    pub last_polled_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    pub id: Id,
    pub tenant_id: Id,
    pub url: String,
    pub is_primary: bool,
    pub is_active: bool,
    pub last_tested_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Post,
    Comment,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditContent {
    pub id: Id,
    /// Provider's post/comment id, e.g. `t3_abc123`.
    pub source_id: String,
    pub subreddit: String,
    pub content_type: ContentType,
    pub title: Option<String>,
    pub body: String,
    pub author: String,
    pub normalized_text: String,
    pub content_hash: String,
    pub created_at_remote: DateTime<Utc>,
    pub fetched_at: DateTime<Utc>,
    pub is_deleted: bool,
    pub is_media_post: bool,
    pub permalink: String,
    /// Set when this row is a crosspost/mirror of an earlier-ingested id.
    pub crosspost_of: Option<Id>,
}

impl RedditContent {
    /// The pre-normalization text the Match Engine extracts snippets from.
    pub fn raw_text(&self) -> String {
        match &self.title {
            Some(t) if !t.is_empty() => format!("{t}\n\n{}", self.body),
            _ => self.body.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertStatus {
    Pending,
    Sent,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Match {
    pub id: Id,
    pub tenant_id: Id,
    pub keyword_id: Id,
    pub content_id: Id,
    pub content_type: ContentType,
    pub subreddit: String,
    pub matched_phrase: String,
    pub also_matched: Vec<String>,
    pub snippet: String,
    pub full_text: String,
    pub proximity_score: f32,
    pub reddit_url: String,
    pub reddit_author: String,
    pub is_deleted: bool,
    pub detected_at: DateTime<Utc>,
    pub alert_sent_at: Option<DateTime<Utc>>,
    pub alert_status: AlertStatus,
}

/// Cheap process-local unique id. The durable store's real implementation is
/// an external collaborator (§6); this is only used by the in-memory
/// reference store and by tests.
pub fn uuid_like() -> String {
    use std::sync::atomic::{AtomicU64, Ordering};
    static COUNTER: AtomicU64 = AtomicU64::new(1);
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    let ts = Utc::now().timestamp_nanos_opt().unwrap_or(0);
    format!("{ts:x}-{n:x}")
}
