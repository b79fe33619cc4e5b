//! Durable-store seam (§6: "the relational store, treated as an abstract
//! durable collection"). The pipeline only ever talks to these traits; the
//! in-memory reference implementation in `memory` is a stand-in for the real
//! store, which is an external collaborator outside this crate's scope.

pub mod memory;

use crate::error::Result;
use crate::model::{ContentType, Id, Keyword, Match, MonitoredSubreddit, RedditContent, WebhookConfig};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// A freshly-fetched item awaiting content dedup (§4.3), before it has an id.
#[derive(Debug, Clone)]
pub struct NewRedditContent {
    pub source_id: String,
    pub subreddit: String,
    pub content_type: ContentType,
    pub title: Option<String>,
    pub body: String,
    pub author: String,
    pub normalized_text: String,
    pub content_hash: String,
    pub created_at_remote: DateTime<Utc>,
    pub is_media_post: bool,
    pub permalink: String,
}

#[async_trait]
pub trait ContentStore: Send + Sync {
    async fn find_by_hash(
        &self,
        subreddit: &str,
        content_type: ContentType,
        content_hash: &str,
    ) -> Result<Option<RedditContent>>;

    async fn insert(&self, candidate: NewRedditContent) -> Result<RedditContent>;

    async fn touch_fetched_at(&self, id: &Id, at: DateTime<Utc>) -> Result<()>;

    async fn record_crosspost(&self, original_id: &Id, new_source_id: &str) -> Result<()>;

    /// Content for `subreddit` with `createdAtRemote >= since`, oldest first
    /// (§4.5 ordering guarantee).
    async fn content_since(&self, subreddit: &str, since: DateTime<Utc>) -> Result<Vec<RedditContent>>;

    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64>;
}

#[async_trait]
pub trait MatchStore: Send + Sync {
    async fn exists(&self, tenant_id: &Id, keyword_id: &Id, content_id: &Id) -> Result<bool>;

    /// Insert a new match. Store-level unique-conflict (already exists) is
    /// reported as `Ok(false)` — §7 StoreConflict is success, not an error.
    async fn insert(&self, m: Match) -> Result<bool>;

    async fn pending_for_tenant(
        &self,
        tenant_id: &Id,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> Result<Vec<Match>>;

    async fn mark_sent(&self, id: &Id, at: DateTime<Utc>) -> Result<()>;
    async fn mark_failed(&self, id: &Id) -> Result<()>;

    /// True if a match for this keyword already exists whose content is a
    /// crosspost origin reachable from `content_id` (§4.5 dedupeCrossposts).
    async fn crosspost_already_matched(&self, keyword_id: &Id, origin_content_id: &Id) -> Result<bool>;

    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64>;
}

#[async_trait]
pub trait SubredditStore: Send + Sync {
    async fn list_all(&self) -> Result<Vec<MonitoredSubreddit>>;
    async fn set_status(&self, id: &Id, status: crate::model::SubredditStatus) -> Result<()>;
    async fn set_last_polled_at(&self, id: &Id, at: DateTime<Utc>) -> Result<()>;
}

/// Snapshot of one tenant's active config, as read by the Match Engine and
/// Poller (§4.9). Never mutated in place by the pipeline.
#[derive(Debug, Clone)]
pub struct TenantSnapshot {
    pub keywords: Vec<Keyword>,
    pub subreddits: Vec<MonitoredSubreddit>,
    pub webhooks: Vec<WebhookConfig>,
    pub email: Option<String>,
    pub version: u64,
}

impl TenantSnapshot {
    pub fn primary_webhook(&self) -> Option<&WebhookConfig> {
        self.webhooks.iter().find(|w| w.is_primary && w.is_active)
    }
}

#[async_trait]
pub trait TenantConfigSource: Send + Sync {
    async fn load_snapshot(&self, tenant_id: &Id) -> Result<TenantSnapshot>;
    async fn all_tenant_ids(&self) -> Result<Vec<Id>>;
    async fn current_version(&self, tenant_id: &Id) -> Result<u64>;
}
