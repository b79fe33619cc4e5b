//! Real `RedditSource` backed by Reddit's OAuth JSON API. Grounded on the
//! teacher's `reqwest`-based notifier clients (timeout + status-based error
//! classification) generalized from a POST sink to a paginated GET source.

use super::{classify_status, RedditSource, SourceItem};
use crate::error::{ReddalertError, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::debug;

const TOKEN_URL: &str = "https://www.reddit.com/api/v1/access_token";
const API_BASE: &str = "https://oauth.reddit.com";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

struct CachedToken {
    value: String,
    expires_at: Instant,
}

pub struct RedditApiSource {
    client: reqwest::Client,
    app_id: String,
    app_secret: String,
    user_agent: String,
    token: Mutex<Option<CachedToken>>,
}

impl RedditApiSource {
    pub fn new(app_id: impl Into<String>, app_secret: impl Into<String>, user_agent: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .expect("reqwest client builds"),
            app_id: app_id.into(),
            app_secret: app_secret.into(),
            user_agent: user_agent.into(),
            token: Mutex::new(None),
        }
    }

    async fn bearer_token(&self) -> Result<String> {
        {
            let guard = self.token.lock().unwrap();
            if let Some(cached) = guard.as_ref() {
                if cached.expires_at > Instant::now() {
                    return Ok(cached.value.clone());
                }
            }
        }

        let resp = self
            .client
            .post(TOKEN_URL)
            .basic_auth(&self.app_id, Some(&self.app_secret))
            .header("User-Agent", &self.user_agent)
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(|e| ReddalertError::TransientSource(e.into()))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            return Err(classify_status(status)
                .unwrap_or_else(|| ReddalertError::TransientSource(anyhow::anyhow!("token request failed: {status}"))));
        }

        #[derive(Deserialize)]
        struct TokenResponse {
            access_token: String,
            expires_in: u64,
        }
        let body: TokenResponse = resp
            .json()
            .await
            .map_err(|e| ReddalertError::TransientSource(e.into()))?;

        let expires_at = Instant::now() + Duration::from_secs(body.expires_in.saturating_sub(30));
        *self.token.lock().unwrap() = Some(CachedToken {
            value: body.access_token.clone(),
            expires_at,
        });
        Ok(body.access_token)
    }

    async fn get_listing(&self, path: &str) -> Result<ListingEnvelope> {
        let token = self.bearer_token().await?;
        let url = format!("{API_BASE}{path}");
        let resp = self
            .client
            .get(&url)
            .bearer_auth(token)
            .header("User-Agent", &self.user_agent)
            .send()
            .await
            .map_err(|e| ReddalertError::TransientSource(e.into()))?;

        let status = resp.status().as_u16();
        if let Some(err) = classify_status(status) {
            return Err(err);
        }
        if !resp.status().is_success() {
            return Err(ReddalertError::TransientSource(anyhow::anyhow!(
                "unexpected status {status} from {path}"
            )));
        }

        resp.json::<ListingEnvelope>()
            .await
            .map_err(|e| ReddalertError::ContentMalformed(e.to_string()))
    }
}

#[async_trait]
impl RedditSource for RedditApiSource {
    async fn list_new_posts(&self, subreddit: &str, since_id: Option<&str>) -> Result<Vec<SourceItem>> {
        let path = match since_id {
            Some(id) => format!("/r/{subreddit}/new.json?limit=100&after=t3_{id}&raw_json=1"),
            None => format!("/r/{subreddit}/new.json?limit=100&raw_json=1"),
        };
        let envelope = self.get_listing(&path).await?;
        Ok(envelope
            .data
            .children
            .into_iter()
            .map(|c| c.data.into_post_item(subreddit))
            .collect())
    }

    async fn list_top_level_comments(&self, post_id: &str, since_id: Option<&str>) -> Result<Vec<SourceItem>> {
        let path = format!("/comments/{post_id}.json?depth=1&limit=500&raw_json=1");
        let token = self.bearer_token().await?;
        let url = format!("{API_BASE}{path}");
        let resp = self
            .client
            .get(&url)
            .bearer_auth(token)
            .header("User-Agent", &self.user_agent)
            .send()
            .await
            .map_err(|e| ReddalertError::TransientSource(e.into()))?;

        let status = resp.status().as_u16();
        if let Some(err) = classify_status(status) {
            return Err(err);
        }
        if !resp.status().is_success() {
            return Err(ReddalertError::TransientSource(anyhow::anyhow!(
                "unexpected status {status} from {path}"
            )));
        }

        // Reddit's comments endpoint returns a 2-element array: [post listing, comment listing].
        let envelopes: Vec<ListingEnvelope> = resp
            .json()
            .await
            .map_err(|e| ReddalertError::ContentMalformed(e.to_string()))?;
        let comments = envelopes
            .into_iter()
            .nth(1)
            .map(|e| e.data.children)
            .unwrap_or_default();

        let mut items: Vec<SourceItem> = comments
            .into_iter()
            .filter_map(|c| c.data.into_comment_item(post_id))
            .collect();

        if let Some(id) = since_id {
            if let Some(pos) = items.iter().position(|i| i.source_id == id) {
                items = items.split_off(pos + 1);
            }
        }
        Ok(items)
    }
}

#[derive(Deserialize)]
struct ListingEnvelope {
    data: ListingData,
}

#[derive(Deserialize)]
struct ListingData {
    children: Vec<ListingChild>,
}

#[derive(Deserialize)]
struct ListingChild {
    data: ItemData,
}

#[derive(Deserialize)]
struct ItemData {
    id: String,
    author: Option<String>,
    title: Option<String>,
    #[serde(default)]
    selftext: String,
    #[serde(default)]
    body: String,
    created_utc: f64,
    permalink: Option<String>,
    #[serde(default)]
    is_video: bool,
    #[serde(default)]
    post_hint: Option<String>,
    #[serde(default)]
    removed_by_category: Option<String>,
    #[serde(default)]
    body_html: Option<String>,
}

impl ItemData {
    fn created_at(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.created_utc as i64, 0)
            .single()
            .unwrap_or_else(Utc::now)
    }

    fn is_media(&self) -> bool {
        self.is_video
            || matches!(
                self.post_hint.as_deref(),
                Some("image") | Some("hosted:video") | Some("rich:video") | Some("link")
            )
    }

    fn into_post_item(self, subreddit: &str) -> SourceItem {
        let permalink = self.permalink.clone().unwrap_or_default();
        let is_deleted = self.removed_by_category.is_some() || self.author.as_deref() == Some("[deleted]");
        SourceItem {
            source_id: self.id.clone(),
            subreddit: subreddit.to_string(),
            author: self.author.clone().unwrap_or_else(|| "[unknown]".to_string()),
            title: self.title.clone(),
            body: self.selftext.clone(),
            created_at_remote: self.created_at(),
            permalink,
            is_media_post: self.is_media(),
            is_deleted,
        }
    }

    fn into_comment_item(self, _post_id: &str) -> Option<SourceItem> {
        if self.body_html.is_none() && self.body.is_empty() {
            debug!(id = %self.id, "skipping non-comment listing child (likely a 'more' stub)");
            return None;
        }
        let permalink = self.permalink.clone().unwrap_or_default();
        let is_deleted = self.author.as_deref() == Some("[deleted]");
        Some(SourceItem {
            source_id: self.id.clone(),
            subreddit: String::new(),
            author: self.author.clone().unwrap_or_else(|| "[unknown]".to_string()),
            title: None,
            body: self.body.clone(),
            created_at_remote: self.created_at(),
            permalink,
            is_media_post: false,
            is_deleted,
        })
    }
}
