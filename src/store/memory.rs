//! In-memory reference implementation of the store traits.
//!
//! Grounded on the teacher's `history.rs` (`Mutex<HashMap<...>>` guarding
//! shared mutable state behind a narrow method surface) and `rolling.rs`
//! (per-key accumulation). Stands in for the durable store (§6, an external
//! collaborator); production deployments would swap this for a real
//! relational adapter behind the same traits.

use super::{ContentStore, MatchStore, NewRedditContent, SubredditStore, TenantConfigSource, TenantSnapshot};
use crate::error::{ReddalertError, Result};
use crate::model::{ContentType, Id, Keyword, Match, MonitoredSubreddit, RedditContent, SubredditStatus, WebhookConfig};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Default)]
struct ContentTable {
    by_id: HashMap<Id, RedditContent>,
    /// (subreddit, contentType, contentHash) -> content id, for §4.3 dedup lookups.
    by_hash: HashMap<(String, ContentTypeKey, String), Id>,
    /// sourceId -> origin content id, for crossposts recorded by §4.3.
    crosspost_edges: HashMap<String, Id>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum ContentTypeKey {
    Post,
    Comment,
}

impl From<ContentType> for ContentTypeKey {
    fn from(c: ContentType) -> Self {
        match c {
            ContentType::Post => ContentTypeKey::Post,
            ContentType::Comment => ContentTypeKey::Comment,
        }
    }
}

#[derive(Default)]
struct MatchTable {
    by_id: HashMap<Id, Match>,
    /// (tenantId, keywordId, contentId) -> match id, for the §3 unique constraint.
    by_key: HashMap<(Id, Id, Id), Id>,
}

#[derive(Default)]
struct TenantTable {
    keywords: HashMap<Id, Vec<Keyword>>,
    subreddits: HashMap<Id, Vec<MonitoredSubreddit>>,
    webhooks: HashMap<Id, Vec<WebhookConfig>>,
    emails: HashMap<Id, String>,
    versions: HashMap<Id, u64>,
}

/// Single shared in-memory store backing all the trait seams. A real
/// deployment would split these across a connection pool; one process-wide
/// `Mutex` per table is enough for the reference implementation and tests.
pub struct MemoryStore {
    content: Mutex<ContentTable>,
    matches: Mutex<MatchTable>,
    subreddits_by_id: Mutex<HashMap<Id, MonitoredSubreddit>>,
    tenants: Mutex<TenantTable>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            content: Mutex::new(ContentTable::default()),
            matches: Mutex::new(MatchTable::default()),
            subreddits_by_id: Mutex::new(HashMap::new()),
            tenants: Mutex::new(TenantTable::default()),
        }
    }

    /// Seed a tenant's config (stands in for the API layer, which is the
    /// only writer in a real deployment). Bumps the tenant's version.
    pub fn seed_tenant(
        &self,
        tenant_id: &Id,
        keywords: Vec<Keyword>,
        subreddits: Vec<MonitoredSubreddit>,
        webhooks: Vec<WebhookConfig>,
    ) {
        let mut by_sub_id = self.subreddits_by_id.lock().unwrap();
        for s in &subreddits {
            by_sub_id.insert(s.id.clone(), s.clone());
        }
        drop(by_sub_id);

        let mut tenants = self.tenants.lock().unwrap();
        tenants.keywords.insert(tenant_id.clone(), keywords);
        tenants.subreddits.insert(tenant_id.clone(), subreddits);
        tenants.webhooks.insert(tenant_id.clone(), webhooks);
        *tenants.versions.entry(tenant_id.clone()).or_insert(0) += 1;
    }

    pub fn bump_version(&self, tenant_id: &Id) {
        let mut tenants = self.tenants.lock().unwrap();
        *tenants.versions.entry(tenant_id.clone()).or_insert(0) += 1;
    }

    pub fn set_tenant_email(&self, tenant_id: &Id, email: impl Into<String>) {
        let mut tenants = self.tenants.lock().unwrap();
        tenants.emails.insert(tenant_id.clone(), email.into());
        *tenants.versions.entry(tenant_id.clone()).or_insert(0) += 1;
    }

    /// Origin content id recorded for `source_id` via `record_crosspost`, if any.
    pub fn crosspost_origin_of(&self, source_id: &str) -> Option<Id> {
        self.content.lock().unwrap().crosspost_edges.get(source_id).cloned()
    }
}

#[async_trait]
impl ContentStore for MemoryStore {
    async fn find_by_hash(
        &self,
        subreddit: &str,
        content_type: ContentType,
        content_hash: &str,
    ) -> Result<Option<RedditContent>> {
        let table = self.content.lock().unwrap();
        let key = (subreddit.to_string(), content_type.into(), content_hash.to_string());
        Ok(table.by_hash.get(&key).and_then(|id| table.by_id.get(id)).cloned())
    }

    async fn insert(&self, candidate: NewRedditContent) -> Result<RedditContent> {
        let mut table = self.content.lock().unwrap();
        let key = (
            candidate.subreddit.clone(),
            candidate.content_type.into(),
            candidate.content_hash.clone(),
        );
        if table.by_hash.contains_key(&key) {
            return Err(ReddalertError::StoreConflict(format!(
                "content hash already present for {}/{:?}",
                candidate.subreddit, candidate.content_type
            )));
        }
        let row = RedditContent {
            id: crate::model::uuid_like(),
            source_id: candidate.source_id,
            subreddit: candidate.subreddit,
            content_type: candidate.content_type,
            title: candidate.title,
            body: candidate.body,
            author: candidate.author,
            normalized_text: candidate.normalized_text,
            content_hash: candidate.content_hash,
            created_at_remote: candidate.created_at_remote,
            fetched_at: Utc::now(),
            is_deleted: false,
            is_media_post: candidate.is_media_post,
            permalink: candidate.permalink,
            crosspost_of: None,
        };
        table.by_hash.insert(key, row.id.clone());
        table.by_id.insert(row.id.clone(), row.clone());
        Ok(row)
    }

    async fn touch_fetched_at(&self, id: &Id, at: DateTime<Utc>) -> Result<()> {
        let mut table = self.content.lock().unwrap();
        if let Some(row) = table.by_id.get_mut(id) {
            row.fetched_at = at;
        }
        Ok(())
    }

    async fn record_crosspost(&self, original_id: &Id, new_source_id: &str) -> Result<()> {
        let mut table = self.content.lock().unwrap();
        table.crosspost_edges.insert(new_source_id.to_string(), original_id.clone());
        Ok(())
    }

    async fn content_since(&self, subreddit: &str, since: DateTime<Utc>) -> Result<Vec<RedditContent>> {
        let table = self.content.lock().unwrap();
        let mut rows: Vec<RedditContent> = table
            .by_id
            .values()
            .filter(|c| c.subreddit == subreddit && c.created_at_remote >= since)
            .cloned()
            .collect();
        rows.sort_by_key(|c| c.created_at_remote);
        Ok(rows)
    }

    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut table = self.content.lock().unwrap();
        let doomed: Vec<Id> = table
            .by_id
            .values()
            .filter(|c| c.created_at_remote < cutoff)
            .map(|c| c.id.clone())
            .collect();
        for id in &doomed {
            if let Some(row) = table.by_id.remove(id) {
                let key = (row.subreddit, row.content_type.into(), row.content_hash);
                table.by_hash.remove(&key);
            }
        }
        Ok(doomed.len() as u64)
    }
}

#[async_trait]
impl MatchStore for MemoryStore {
    async fn exists(&self, tenant_id: &Id, keyword_id: &Id, content_id: &Id) -> Result<bool> {
        let table = self.matches.lock().unwrap();
        let key = (tenant_id.clone(), keyword_id.clone(), content_id.clone());
        Ok(table.by_key.contains_key(&key))
    }

    async fn insert(&self, m: Match) -> Result<bool> {
        let mut table = self.matches.lock().unwrap();
        let key = (m.tenant_id.clone(), m.keyword_id.clone(), m.content_id.clone());
        if table.by_key.contains_key(&key) {
            return Ok(false);
        }
        table.by_key.insert(key, m.id.clone());
        table.by_id.insert(m.id.clone(), m);
        Ok(true)
    }

    async fn pending_for_tenant(
        &self,
        tenant_id: &Id,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> Result<Vec<Match>> {
        let table = self.matches.lock().unwrap();
        let mut rows: Vec<Match> = table
            .by_id
            .values()
            .filter(|m| {
                m.tenant_id == *tenant_id
                    && m.alert_status == crate::model::AlertStatus::Pending
                    && m.detected_at >= window_start
                    && m.detected_at <= window_end
            })
            .cloned()
            .collect();
        rows.sort_by_key(|m| m.detected_at);
        Ok(rows)
    }

    async fn mark_sent(&self, id: &Id, at: DateTime<Utc>) -> Result<()> {
        let mut table = self.matches.lock().unwrap();
        if let Some(row) = table.by_id.get_mut(id) {
            row.alert_status = crate::model::AlertStatus::Sent;
            row.alert_sent_at = Some(at);
        }
        Ok(())
    }

    async fn mark_failed(&self, id: &Id) -> Result<()> {
        let mut table = self.matches.lock().unwrap();
        if let Some(row) = table.by_id.get_mut(id) {
            row.alert_status = crate::model::AlertStatus::Failed;
        }
        Ok(())
    }

    async fn crosspost_already_matched(&self, keyword_id: &Id, origin_content_id: &Id) -> Result<bool> {
        let table = self.matches.lock().unwrap();
        Ok(table
            .by_id
            .values()
            .any(|m| m.keyword_id == *keyword_id && m.content_id == *origin_content_id))
    }

    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut table = self.matches.lock().unwrap();
        let doomed: Vec<Id> = table
            .by_id
            .values()
            .filter(|m| m.detected_at < cutoff)
            .map(|m| m.id.clone())
            .collect();
        for id in &doomed {
            if let Some(row) = table.by_id.remove(id) {
                let key = (row.tenant_id, row.keyword_id, row.content_id);
                table.by_key.remove(&key);
            }
        }
        Ok(doomed.len() as u64)
    }
}

#[async_trait]
impl SubredditStore for MemoryStore {
    async fn list_all(&self) -> Result<Vec<MonitoredSubreddit>> {
        let table = self.subreddits_by_id.lock().unwrap();
        Ok(table.values().cloned().collect())
    }

    async fn set_status(&self, id: &Id, status: SubredditStatus) -> Result<()> {
        let mut table = self.subreddits_by_id.lock().unwrap();
        if let Some(row) = table.get_mut(id) {
            row.status = status;
        }
        let mut tenants = self.tenants.lock().unwrap();
        for rows in tenants.subreddits.values_mut() {
            for row in rows.iter_mut() {
                if row.id == *id {
                    row.status = status;
                }
            }
        }
        Ok(())
    }

    async fn set_last_polled_at(&self, id: &Id, at: DateTime<Utc>) -> Result<()> {
        let mut table = self.subreddits_by_id.lock().unwrap();
        if let Some(row) = table.get_mut(id) {
            row.last_polled_at = Some(at);
        }
        let mut tenants = self.tenants.lock().unwrap();
        for rows in tenants.subreddits.values_mut() {
            for row in rows.iter_mut() {
                if row.id == *id {
                    row.last_polled_at = Some(at);
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl TenantConfigSource for MemoryStore {
    async fn load_snapshot(&self, tenant_id: &Id) -> Result<TenantSnapshot> {
        let tenants = self.tenants.lock().unwrap();
        Ok(TenantSnapshot {
            keywords: tenants.keywords.get(tenant_id).cloned().unwrap_or_default(),
            subreddits: tenants.subreddits.get(tenant_id).cloned().unwrap_or_default(),
            webhooks: tenants.webhooks.get(tenant_id).cloned().unwrap_or_default(),
            email: tenants.emails.get(tenant_id).cloned(),
            version: *tenants.versions.get(tenant_id).unwrap_or(&0),
        })
    }

    async fn all_tenant_ids(&self) -> Result<Vec<Id>> {
        let tenants = self.tenants.lock().unwrap();
        Ok(tenants.keywords.keys().cloned().collect())
    }

    async fn current_version(&self, tenant_id: &Id) -> Result<u64> {
        let tenants = self.tenants.lock().unwrap();
        Ok(*tenants.versions.get(tenant_id).unwrap_or(&0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Keyword;

    fn content(subreddit: &str, hash: &str, source_id: &str) -> NewRedditContent {
        NewRedditContent {
            source_id: source_id.to_string(),
            subreddit: subreddit.to_string(),
            content_type: ContentType::Post,
            title: Some("t".into()),
            body: "body".into(),
            author: "alice".into(),
            normalized_text: "body".into(),
            content_hash: hash.to_string(),
            created_at_remote: Utc::now(),
            is_media_post: false,
            permalink: "/r/x/1".into(),
        }
    }

    #[tokio::test]
    async fn content_hash_uniqueness_enforced() {
        let store = MemoryStore::new();
        let row = store.insert(content("rust", "h1", "t3_a")).await.unwrap();
        assert!(!row.id.is_empty());
        let conflict = store.insert(content("rust", "h1", "t3_b")).await;
        assert!(matches!(conflict, Err(ReddalertError::StoreConflict(_))));
    }

    #[tokio::test]
    async fn match_unique_key_enforced() {
        let store = MemoryStore::new();
        let m = crate::model::Match {
            id: "m1".into(),
            tenant_id: "t1".into(),
            keyword_id: "k1".into(),
            content_id: "c1".into(),
            content_type: ContentType::Post,
            subreddit: "rust".into(),
            matched_phrase: "foo".into(),
            also_matched: vec![],
            snippet: "...".into(),
            full_text: "foo bar".into(),
            proximity_score: 1.0,
            reddit_url: "/r/x/1".into(),
            reddit_author: "alice".into(),
            is_deleted: false,
            detected_at: Utc::now(),
            alert_sent_at: None,
            alert_status: crate::model::AlertStatus::Pending,
        };
        assert!(store.insert(m.clone()).await.unwrap());
        assert!(!store.insert(m).await.unwrap());
    }

    #[tokio::test]
    async fn record_crosspost_points_at_origin_not_itself() {
        let store = MemoryStore::new();
        let origin = store.insert(content("rust", "h1", "t3_a")).await.unwrap();
        store.record_crosspost(&origin.id, "t3_b").await.unwrap();
        assert_eq!(store.crosspost_origin_of("t3_b"), Some(origin.id.clone()));
        assert_ne!(store.crosspost_origin_of("t3_b"), Some("t3_b".to_string()));
    }

    #[tokio::test]
    async fn tenant_snapshot_roundtrip() {
        let store = MemoryStore::new();
        let kw = Keyword::new("t1", vec!["foo".into()]);
        store.seed_tenant("t1", vec![kw], vec![], vec![]);
        let snap = store.load_snapshot(&"t1".to_string()).await.unwrap();
        assert_eq!(snap.keywords.len(), 1);
        assert_eq!(snap.version, 1);
    }
}
