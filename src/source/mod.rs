//! Forum source seam (§6: "the forum-API client, treated as an abstract
//! source that yields posts/comments"). The Poller only ever talks to this
//! trait; `reddit_api` is the real implementation, `fixture` backs tests.

pub mod fixture;
pub mod reddit_api;

use crate::error::{ReddalertError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// A single post or top-level comment, pre-normalization. `title` is `Some`
/// for posts, `None` for comments.
#[derive(Debug, Clone)]
pub struct SourceItem {
    pub source_id: String,
    pub subreddit: String,
    pub author: String,
    pub title: Option<String>,
    pub body: String,
    pub created_at_remote: DateTime<Utc>,
    pub permalink: String,
    pub is_media_post: bool,
    pub is_deleted: bool,
}

#[async_trait]
pub trait RedditSource: Send + Sync {
    async fn list_new_posts(&self, subreddit: &str, since_id: Option<&str>) -> Result<Vec<SourceItem>>;
    async fn list_top_level_comments(&self, post_id: &str, since_id: Option<&str>) -> Result<Vec<SourceItem>>;
}

/// Classify an HTTP response status into the §7 error taxonomy for
/// subreddit-scoped calls.
pub fn classify_status(status: u16) -> Option<ReddalertError> {
    match status {
        404 | 403 => Some(ReddalertError::PermanentSource { status }),
        429 | 500..=599 => Some(ReddalertError::TransientSource(anyhow::anyhow!(
            "source returned status {status}"
        ))),
        _ => None,
    }
}
