//! Poller (§4.4). Per-subreddit incremental ingestion shared across tenants,
//! with rate-limit pacing and subreddit status tracking.
//!
//! Grounded on the teacher's ingest loop shape (fetch → normalize → hash →
//! dedup → persist) and `notify::antiflutter`'s single-gate cooldown check,
//! here generalized to a per-subreddit cadence gate plus a shared
//! `TokenBucket` (§ratelimit).

use crate::dedup::{content_hash, dedupe_content, ContentDedupOutcome};
use crate::error::{ReddalertError, Result};
use crate::model::{ContentType, Id, SubredditStatus};
use crate::normalize::normalize;
use crate::ratelimit::TokenBucket;
use crate::source::{RedditSource, SourceItem};
use crate::store::{ContentStore, NewRedditContent, SubredditStore};
use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::Arc;
use tokio::time::{Duration, Instant};
use tracing::{info, warn};

const QUARANTINE: Duration = Duration::from_secs(3600);

#[derive(Default)]
struct SubredditPollState {
    last_seen_post_id: Option<String>,
    last_shared_poll: Option<Instant>,
    quarantined_until: Option<Instant>,
}

pub struct Poller {
    source: Arc<dyn RedditSource>,
    content_store: Arc<dyn ContentStore>,
    subreddit_store: Arc<dyn SubredditStore>,
    bucket: Arc<TokenBucket>,
    state: Mutex<HashMap<String, SubredditPollState>>,
}

/// Outcome of polling one subreddit, for scheduler-level metrics/logging.
#[derive(Debug, Default)]
pub struct PollOutcome {
    pub posts_ingested: usize,
    pub comments_ingested: usize,
    pub duplicates_skipped: usize,
}

fn raw_text(title: &Option<String>, body: &str) -> String {
    match title {
        Some(t) if !t.is_empty() => format!("{t}\n\n{body}"),
        _ => body.to_string(),
    }
}

fn known_bot_authors() -> &'static [&'static str] {
    &["automoderator", "botdefense", "repostsleuthbot"]
}

static RE_BOT_SUFFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bbot\b$").expect("bot suffix regex"));

/// True if `author` looks like a bot account (§4.4: `/(?i)\bbot\b$/` or a
/// small built-in list). Applied at match time, not here — kept alongside
/// the poller since it classifies poller-sourced data. Word-boundary
/// semantics mean "helperbot" is not flagged, but "helper-bot" is.
pub fn looks_like_bot(author: &str) -> bool {
    RE_BOT_SUFFIX.is_match(author) || known_bot_authors().contains(&author.to_lowercase().as_str())
}

impl Poller {
    pub fn new(
        source: Arc<dyn RedditSource>,
        content_store: Arc<dyn ContentStore>,
        subreddit_store: Arc<dyn SubredditStore>,
        bucket: Arc<TokenBucket>,
    ) -> Self {
        Self {
            source,
            content_store,
            subreddit_store,
            bucket,
            state: Mutex::new(HashMap::new()),
        }
    }

    /// Poll a single subreddit if its cadence gate is due and it isn't
    /// quarantined. `cadence` is the minimum `pollIntervalMinutes` among all
    /// tenants currently subscribed to it (§4.4 step 1).
    pub async fn poll_subreddit(
        &self,
        subreddit_id: &Id,
        subreddit_name: &str,
        cadence: Duration,
    ) -> Result<PollOutcome> {
        if !self.due(subreddit_name, cadence) {
            return Ok(PollOutcome::default());
        }

        let since_id = {
            let state = self.state.lock().unwrap();
            state.get(subreddit_name).and_then(|s| s.last_seen_post_id.clone())
        };

        self.bucket.acquire().await;
        let posts = match self.source.list_new_posts(subreddit_name, since_id.as_deref()).await {
            Ok(posts) => posts,
            Err(e) => return self.handle_source_error(subreddit_id, subreddit_name, e).await,
        };

        let mut outcome = PollOutcome::default();
        let mut newest_id = since_id;

        for post in &posts {
            newest_id = Some(post.source_id.clone());
            if self.ingest_item(post, ContentType::Post, &mut outcome).await.is_ok()
                && !post.is_deleted
            {
                self.bucket.acquire().await;
                match self.source.list_top_level_comments(&post.source_id, None).await {
                    Ok(comments) => {
                        for comment in &comments {
                            let mut tagged = comment.clone();
                            tagged.subreddit = subreddit_name.to_string();
                            let _ = self.ingest_item(&tagged, ContentType::Comment, &mut outcome).await;
                        }
                    }
                    Err(e) => {
                        warn!(subreddit = %subreddit_name, post = %post.source_id, error = %e, "failed to fetch comments");
                    }
                }
            }
        }

        {
            let mut state = self.state.lock().unwrap();
            let entry = state.entry(subreddit_name.to_string()).or_default();
            entry.last_seen_post_id = newest_id;
            entry.last_shared_poll = Some(Instant::now());
            entry.quarantined_until = None;
        }
        self.subreddit_store.set_status(subreddit_id, SubredditStatus::Active).await?;
        self.subreddit_store.set_last_polled_at(subreddit_id, Utc::now()).await?;
        crate::metrics::record_subreddit_status(subreddit_name, SubredditStatus::Active);
        crate::metrics::record_ingest((outcome.posts_ingested + outcome.comments_ingested) as u64);
        crate::metrics::record_dedup(outcome.duplicates_skipped as u64);

        info!(
            subreddit = %subreddit_name,
            posts = outcome.posts_ingested,
            comments = outcome.comments_ingested,
            dups = outcome.duplicates_skipped,
            "poll complete"
        );
        Ok(outcome)
    }

    fn due(&self, subreddit_name: &str, cadence: Duration) -> bool {
        let state = self.state.lock().unwrap();
        match state.get(subreddit_name) {
            None => true,
            Some(s) => {
                if let Some(until) = s.quarantined_until {
                    if Instant::now() < until {
                        return false;
                    }
                }
                match s.last_shared_poll {
                    None => true,
                    Some(last) => Instant::now().saturating_duration_since(last) >= cadence,
                }
            }
        }
    }

    async fn handle_source_error(
        &self,
        subreddit_id: &Id,
        subreddit_name: &str,
        e: ReddalertError,
    ) -> Result<PollOutcome> {
        match &e {
            ReddalertError::PermanentSource { status } => {
                let status_value = if *status == 404 {
                    SubredditStatus::Inaccessible
                } else {
                    SubredditStatus::Private
                };
                self.subreddit_store.set_status(subreddit_id, status_value).await?;
                crate::metrics::record_subreddit_status(subreddit_name, status_value);
                let mut state = self.state.lock().unwrap();
                let entry = state.entry(subreddit_name.to_string()).or_default();
                entry.quarantined_until = Some(Instant::now() + QUARANTINE);
                warn!(subreddit = %subreddit_name, status = status, "subreddit quarantined");
            }
            ReddalertError::TransientSource(err) => {
                warn!(subreddit = %subreddit_name, error = %err, "transient source error, cursor not advanced");
            }
            other => {
                warn!(subreddit = %subreddit_name, error = %other, "unclassified source error, cursor not advanced");
            }
        }
        Err(e)
    }

    async fn ingest_item(
        &self,
        item: &SourceItem,
        content_type: ContentType,
        outcome: &mut PollOutcome,
    ) -> Result<()> {
        let raw = raw_text(&item.title, &item.body);
        let normalized = normalize(&raw);
        let normalized_text = normalized.sentences.join(" ");
        let hash = content_hash(&normalized_text);

        let candidate = NewRedditContent {
            source_id: item.source_id.clone(),
            subreddit: item.subreddit.clone(),
            content_type,
            title: item.title.clone(),
            body: item.body.clone(),
            author: item.author.clone(),
            normalized_text,
            content_hash: hash,
            created_at_remote: item.created_at_remote,
            is_media_post: item.is_media_post,
            permalink: item.permalink.clone(),
        };

        match dedupe_content(self.content_store.as_ref(), candidate).await {
            Ok(ContentDedupOutcome::Inserted(_)) => {
                match content_type {
                    ContentType::Post => outcome.posts_ingested += 1,
                    ContentType::Comment => outcome.comments_ingested += 1,
                }
                Ok(())
            }
            Ok(_) => {
                outcome.duplicates_skipped += 1;
                Ok(())
            }
            Err(e) => {
                warn!(source_id = %item.source_id, error = %e, "content ingestion failed");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::fixture::FixtureSource;
    use crate::store::memory::MemoryStore;
    use chrono::Utc;

    fn item(id: &str) -> SourceItem {
        SourceItem {
            source_id: id.to_string(),
            subreddit: "rust".to_string(),
            author: "alice".to_string(),
            title: Some("hi".to_string()),
            body: "arbitrage betting talk".to_string(),
            created_at_remote: Utc::now(),
            permalink: format!("/r/rust/comments/{id}"),
            is_media_post: false,
            is_deleted: false,
        }
    }

    #[tokio::test]
    async fn ingests_new_posts_and_skips_on_replay() {
        let source: Arc<dyn RedditSource> =
            Arc::new(FixtureSource::new().with_posts("rust", vec![item("a"), item("b")]));
        let content_store: Arc<dyn ContentStore> = Arc::new(MemoryStore::new());
        let subreddit_store: Arc<dyn SubredditStore> = Arc::new(MemoryStore::new());
        let bucket = Arc::new(TokenBucket::new(100, 6000));
        let poller = Poller::new(source, content_store, subreddit_store, bucket);

        let outcome = poller
            .poll_subreddit(&"sub1".to_string(), "rust", Duration::from_secs(0))
            .await
            .unwrap();
        assert_eq!(outcome.posts_ingested, 2);
    }

    #[test]
    fn bot_author_detection() {
        assert!(!looks_like_bot("HelperBot"));
        assert!(looks_like_bot("helper-bot"));
        assert!(looks_like_bot("AutoModerator"));
        assert!(!looks_like_bot("alice"));
    }
}
