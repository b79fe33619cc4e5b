//! Deduplicator (§4.3). Two independent layers: content-hash dedup at
//! ingestion, and a short-term in-memory guard in front of the match store's
//! unique constraint at emission.
//!
//! Grounded on the teacher's `ingest::normalize_filter_dedup` (hash-set
//! windowing before a store write) and `history.rs`'s `Mutex`-guarded
//! membership set.

use crate::error::Result;
use crate::model::{Id, RedditContent};
use crate::store::{ContentStore, NewRedditContent};
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::sync::Mutex;

/// `contentHash = sha256(normalizedText)` (§3 RedditContent invariant).
pub fn content_hash(normalized_text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalized_text.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[derive(Debug)]
pub enum ContentDedupOutcome {
    Inserted(RedditContent),
    TouchedExisting(RedditContent),
    CrosspostRecorded { origin: RedditContent, new_source_id: String },
}

/// Content dedup at ingestion (§4.3). Looks up `(subreddit, contentType,
/// contentHash)`; same `sourceId` refreshes `fetchedAt`, a different
/// `sourceId` is recorded as a crosspost reference, otherwise the candidate
/// is a genuinely new row.
pub async fn dedupe_content(
    store: &dyn ContentStore,
    candidate: NewRedditContent,
) -> Result<ContentDedupOutcome> {
    let existing = store
        .find_by_hash(&candidate.subreddit, candidate.content_type, &candidate.content_hash)
        .await?;

    match existing {
        Some(row) if row.source_id == candidate.source_id => {
            store.touch_fetched_at(&row.id, Utc::now()).await?;
            Ok(ContentDedupOutcome::TouchedExisting(row))
        }
        Some(row) => {
            store.record_crosspost(&row.id, &candidate.source_id).await?;
            Ok(ContentDedupOutcome::CrosspostRecorded {
                origin: row,
                new_source_id: candidate.source_id,
            })
        }
        None => {
            let row = store.insert(candidate).await?;
            Ok(ContentDedupOutcome::Inserted(row))
        }
    }
}

/// Short-term in-memory guard on `(tenantId, keywordId, contentId)`, avoiding
/// a store round-trip for matches already seen this process's lifetime. The
/// store's own unique constraint (§3) is still the authority under races;
/// this is purely an optimization.
#[derive(Default)]
pub struct MatchDedupGuard {
    seen: Mutex<HashSet<(Id, Id, Id)>>,
}

impl MatchDedupGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` the first time this key is seen, `false` thereafter.
    pub fn remember_if_new(&self, tenant_id: &Id, keyword_id: &Id, content_id: &Id) -> bool {
        let key = (tenant_id.clone(), keyword_id.clone(), content_id.clone());
        self.seen.lock().unwrap().insert(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ContentType;
    use crate::store::memory::MemoryStore;

    fn new_content(subreddit: &str, source_id: &str, hash: &str) -> NewRedditContent {
        NewRedditContent {
            source_id: source_id.to_string(),
            subreddit: subreddit.to_string(),
            content_type: ContentType::Post,
            title: Some("hello".into()),
            body: "body text".into(),
            author: "alice".into(),
            normalized_text: "body text".into(),
            content_hash: hash.to_string(),
            created_at_remote: Utc::now(),
            is_media_post: false,
            permalink: "/r/rust/comments/1".into(),
        }
    }

    #[test]
    fn content_hash_is_sha256_hex() {
        let h = content_hash("hello world");
        assert_eq!(h.len(), 64);
        assert!(h.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(h, content_hash("hello world"));
        assert_ne!(h, content_hash("hello world!"));
    }

    #[tokio::test]
    async fn first_ingestion_inserts() {
        let store = MemoryStore::new();
        let outcome = dedupe_content(&store, new_content("rust", "t3_a", "h1")).await.unwrap();
        assert!(matches!(outcome, ContentDedupOutcome::Inserted(_)));
    }

    #[tokio::test]
    async fn re_ingestion_same_source_touches_existing() {
        let store = MemoryStore::new();
        dedupe_content(&store, new_content("rust", "t3_a", "h1")).await.unwrap();
        let outcome = dedupe_content(&store, new_content("rust", "t3_a", "h1")).await.unwrap();
        assert!(matches!(outcome, ContentDedupOutcome::TouchedExisting(_)));
    }

    #[tokio::test]
    async fn crosspost_with_different_source_id_is_recorded_not_duplicated() {
        let store = MemoryStore::new();
        dedupe_content(&store, new_content("rust", "t3_a", "h1")).await.unwrap();
        let outcome = dedupe_content(&store, new_content("rust", "t3_b", "h1")).await.unwrap();
        match outcome {
            ContentDedupOutcome::CrosspostRecorded { origin, new_source_id } => {
                assert_eq!(origin.source_id, "t3_a");
                assert_eq!(new_source_id, "t3_b");
            }
            other => panic!("expected crosspost, got {other:?}"),
        }
    }

    #[test]
    fn match_dedup_guard_remembers_once() {
        let guard = MatchDedupGuard::new();
        let t = "tenant1".to_string();
        let k = "kw1".to_string();
        let c = "content1".to_string();
        assert!(guard.remember_if_new(&t, &k, &c));
        assert!(!guard.remember_if_new(&t, &k, &c));
    }
}
