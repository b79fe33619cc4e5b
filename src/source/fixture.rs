//! Fixture-backed `RedditSource` for tests: returns preset items instead of
//! making network calls. Grounded on the teacher's test-double source
//! providers used in the ingest pipeline tests.

use super::{RedditSource, SourceItem};
use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Default)]
pub struct FixtureSource {
    posts: Mutex<HashMap<String, Vec<SourceItem>>>,
    comments: Mutex<HashMap<String, Vec<SourceItem>>>,
}

impl FixtureSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_posts(self, subreddit: &str, items: Vec<SourceItem>) -> Self {
        self.posts.lock().unwrap().insert(subreddit.to_string(), items);
        self
    }

    pub fn with_comments(self, post_id: &str, items: Vec<SourceItem>) -> Self {
        self.comments.lock().unwrap().insert(post_id.to_string(), items);
        self
    }
}

#[async_trait]
impl RedditSource for FixtureSource {
    async fn list_new_posts(&self, subreddit: &str, since_id: Option<&str>) -> Result<Vec<SourceItem>> {
        let posts = self.posts.lock().unwrap();
        let items = posts.get(subreddit).cloned().unwrap_or_default();
        Ok(filter_since(items, since_id))
    }

    async fn list_top_level_comments(&self, post_id: &str, since_id: Option<&str>) -> Result<Vec<SourceItem>> {
        let comments = self.comments.lock().unwrap();
        let items = comments.get(post_id).cloned().unwrap_or_default();
        Ok(filter_since(items, since_id))
    }
}

fn filter_since(items: Vec<SourceItem>, since_id: Option<&str>) -> Vec<SourceItem> {
    match since_id {
        None => items,
        Some(id) => match items.iter().position(|i| i.source_id == id) {
            Some(pos) => items[pos + 1..].to_vec(),
            None => items,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn item(id: &str) -> SourceItem {
        SourceItem {
            source_id: id.to_string(),
            subreddit: "rust".to_string(),
            author: "alice".to_string(),
            title: Some("hi".to_string()),
            body: "body".to_string(),
            created_at_remote: Utc::now(),
            permalink: format!("/r/rust/comments/{id}"),
            is_media_post: false,
            is_deleted: false,
        }
    }

    #[tokio::test]
    async fn since_id_excludes_already_seen() {
        let src = FixtureSource::new().with_posts("rust", vec![item("a"), item("b"), item("c")]);
        let items = src.list_new_posts("rust", Some("a")).await.unwrap();
        assert_eq!(items.iter().map(|i| i.source_id.clone()).collect::<Vec<_>>(), vec!["b", "c"]);
    }

    #[tokio::test]
    async fn no_since_id_returns_all() {
        let src = FixtureSource::new().with_posts("rust", vec![item("a"), item("b")]);
        let items = src.list_new_posts("rust", None).await.unwrap();
        assert_eq!(items.len(), 2);
    }
}
