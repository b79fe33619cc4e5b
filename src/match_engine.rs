//! Multi-tenant Match Engine (§4.5). Fans a batch of newly ingested content
//! rows out across every (tenant, keyword) pair subscribed to the content's
//! subreddit, applying per-tenant filters, the proximity matcher, and the
//! match-dedup guard.
//!
//! Grounded on the teacher's `analyze` pipeline shape (one content item
//! walked through a sequence of independent checks, each able to short
//! circuit) combined with `relevance.rs`'s direct use of the matcher.

use crate::dedup::MatchDedupGuard;
use crate::matcher::match_keyword;
use crate::model::{AlertStatus, Id, Match, MonitoredSubreddit, RedditContent};
use crate::normalize::normalize;
use crate::poller::looks_like_bot;
use crate::store::{MatchStore, TenantConfigSource, TenantSnapshot};
use crate::tenant_config::TenantConfigReader;
use chrono::Utc;
use tracing::{debug, warn};

const SNIPPET_MAX_LEN: usize = 200;
const ELLIPSIS: &str = "…";

/// Locate the matched token span inside the original (pre-normalization)
/// text by sequentially searching for each matched token. Best-effort: the
/// normalizer's URL/markdown stripping means this is an approximation, not
/// an exact byte mapping.
fn locate_span_in_raw(raw: &str, tokens_in_span: &[String]) -> Option<(usize, usize)> {
    let lower = raw.to_lowercase();
    let mut cursor = 0usize;
    let mut first_start = None;
    let mut last_end = 0usize;
    for tok in tokens_in_span {
        let pos = lower[cursor..].find(tok.as_str())?;
        let start = cursor + pos;
        let end = start + tok.len();
        first_start.get_or_insert(start);
        last_end = end;
        cursor = end;
    }
    first_start.map(|s| (s, last_end))
}

fn floor_boundary(s: &str, mut idx: usize) -> usize {
    while idx > 0 && !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

fn ceil_boundary(s: &str, mut idx: usize) -> usize {
    while idx < s.len() && !s.is_char_boundary(idx) {
        idx += 1;
    }
    idx
}

/// Build the `snippet` field (§4.5 step 3): at most `SNIPPET_MAX_LEN` chars
/// of `raw` centered on `[start, end)`, with `…` markers when truncated. The
/// ellipsis width is budgeted out of `SNIPPET_MAX_LEN` up front so the
/// returned string (content plus markers) never exceeds the limit.
fn extract_snippet(raw: &str, start: usize, end: usize) -> String {
    if raw.is_empty() {
        return String::new();
    }
    let match_len = end.saturating_sub(start);
    if match_len >= SNIPPET_MAX_LEN {
        let budget = SNIPPET_MAX_LEN.saturating_sub(ELLIPSIS.len()).min(raw.len() - start);
        let cut = ceil_boundary(raw, start + budget);
        return format!("{}{}", &raw[start..cut], ELLIPSIS);
    }

    // Reserve room for up to two ellipsis markers so content + markers
    // together stay within SNIPPET_MAX_LEN.
    let remaining = SNIPPET_MAX_LEN.saturating_sub(match_len).saturating_sub(2 * ELLIPSIS.len());
    let left_budget = remaining / 2;
    let right_budget = remaining - left_budget;

    let window_start = floor_boundary(raw, start.saturating_sub(left_budget));
    let window_end = ceil_boundary(raw, (end + right_budget).min(raw.len()));

    let mut snippet = String::new();
    if window_start > 0 {
        snippet.push_str(ELLIPSIS);
    }
    snippet.push_str(raw[window_start..window_end].trim());
    if window_end < raw.len() {
        snippet.push_str(ELLIPSIS);
    }
    snippet
}

fn passes_filters(content: &RedditContent, sub_cfg: &MonitoredSubreddit) -> bool {
    if content.is_media_post && !sub_cfg.include_media_posts {
        return false;
    }
    if sub_cfg.filter_bots && looks_like_bot(&content.author) {
        return false;
    }
    true
}

async fn dedupe_crosspost_ok(
    match_store: &dyn MatchStore,
    keyword_id: &Id,
    content: &RedditContent,
    dedupe_crossposts: bool,
) -> bool {
    if !dedupe_crossposts {
        return true;
    }
    match &content.crosspost_of {
        None => true,
        Some(origin_id) => match match_store.crosspost_already_matched(keyword_id, origin_id).await {
            Ok(already) => !already,
            Err(_) => true,
        },
    }
}

/// Evaluate one content row against one tenant's snapshot, inserting any
/// resulting Match rows. Returns the matches actually inserted (post-dedup).
async fn match_content_for_tenant(
    content: &RedditContent,
    tenant_id: &Id,
    snapshot: &TenantSnapshot,
    match_store: &dyn MatchStore,
    dedup_guard: &MatchDedupGuard,
) -> Vec<Match> {
    let Some(sub_cfg) = snapshot.subreddits.iter().find(|s| s.name == content.subreddit) else {
        return Vec::new();
    };
    if !passes_filters(content, sub_cfg) {
        return Vec::new();
    }

    let tokens = normalize(&content.normalized_text).tokens;
    let raw = content.raw_text();
    let mut produced = Vec::new();

    for keyword in snapshot.keywords.iter().filter(|k| k.is_active) {
        if !dedupe_crosspost_ok(match_store, &keyword.id, content, sub_cfg.dedupe_crossposts).await {
            continue;
        }

        let Some(hit) = match_keyword(&tokens, keyword) else {
            continue;
        };

        if !dedup_guard.remember_if_new(tenant_id, &keyword.id, &content.id) {
            continue;
        }

        let span_tokens: Vec<String> = tokens[hit.span_start..=hit.span_end].to_vec();
        let (snip_start, snip_end) = locate_span_in_raw(&raw, &span_tokens).unwrap_or((0, raw.len().min(SNIPPET_MAX_LEN)));
        let snippet = extract_snippet(&raw, snip_start, snip_end);

        let m = Match {
            id: crate::model::uuid_like(),
            tenant_id: tenant_id.clone(),
            keyword_id: keyword.id.clone(),
            content_id: content.id.clone(),
            content_type: content.content_type,
            subreddit: content.subreddit.clone(),
            matched_phrase: hit.phrase.clone(),
            also_matched: hit.also_matched.clone(),
            snippet,
            full_text: raw.clone(),
            proximity_score: hit.score,
            reddit_url: content.permalink.clone(),
            reddit_author: content.author.clone(),
            is_deleted: content.is_deleted,
            detected_at: Utc::now(),
            alert_sent_at: None,
            alert_status: AlertStatus::Pending,
        };

        match match_store.insert(m.clone()).await {
            Ok(true) => produced.push(m),
            Ok(false) => debug!(content_id = %content.id, keyword_id = %keyword.id, "match store reported conflict, skipping"),
            Err(e) => warn!(content_id = %content.id, keyword_id = %keyword.id, error = %e, "failed to persist match"),
        }
    }

    produced
}

/// Run the match engine over a batch of newly persisted content rows,
/// oldest-first (§4.5 ordering), across every tenant subscribed to each
/// row's subreddit.
pub async fn run_batch<S: TenantConfigSource>(
    mut content_rows: Vec<RedditContent>,
    reader: &TenantConfigReader<S>,
    match_store: &dyn MatchStore,
    dedup_guard: &MatchDedupGuard,
) -> Vec<Match> {
    content_rows.sort_by_key(|c| c.created_at_remote);

    let tenant_ids = match reader.all_tenant_ids().await {
        Ok(ids) => ids,
        Err(e) => {
            warn!(error = %e, "failed to list tenants for match engine run");
            return Vec::new();
        }
    };

    let mut all_matches = Vec::new();
    for content in &content_rows {
        for tenant_id in &tenant_ids {
            let snapshot = match reader.get(tenant_id).await {
                Ok(s) => s,
                Err(e) => {
                    warn!(tenant_id = %tenant_id, error = %e, "failed to load tenant snapshot");
                    continue;
                }
            };
            if !snapshot.subreddits.iter().any(|s| s.name == content.subreddit) {
                continue;
            }
            let produced = match_content_for_tenant(content, tenant_id, &snapshot, match_store, dedup_guard).await;
            if !produced.is_empty() {
                crate::metrics::record_matches(produced.len() as u64);
            }
            all_matches.extend(produced);
        }
    }
    all_matches
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ContentType, Keyword, SubredditStatus, WebhookConfig};
    use crate::store::memory::MemoryStore;
    use std::sync::Arc;

    fn content(body: &str, subreddit: &str) -> RedditContent {
        let normalized_text = normalize(body).sentences.join(" ");
        RedditContent {
            id: "c1".into(),
            source_id: "t3_1".into(),
            subreddit: subreddit.into(),
            content_type: ContentType::Post,
            title: None,
            body: body.into(),
            author: "alice".into(),
            normalized_text,
            content_hash: "hash".into(),
            created_at_remote: Utc::now(),
            fetched_at: Utc::now(),
            is_deleted: false,
            is_media_post: false,
            permalink: "/r/rust/comments/1".into(),
            crosspost_of: None,
        }
    }

    fn sub_cfg(name: &str) -> MonitoredSubreddit {
        MonitoredSubreddit {
            id: "sub1".into(),
            tenant_id: "t1".into(),
            name: name.into(),
            status: SubredditStatus::Active,
            include_media_posts: true,
            dedupe_crossposts: false,
            filter_bots: false,
            last_polled_at: None,
        }
    }

    #[tokio::test]
    async fn emits_a_match_for_subscribed_tenant() {
        let store = Arc::new(MemoryStore::new());
        let kw = Keyword::new("t1", vec!["arbitrage betting".into()]);
        store.seed_tenant("t1", vec![kw], vec![sub_cfg("rust")], vec![WebhookConfig {
            id: "w1".into(),
            tenant_id: "t1".into(),
            url: "https://discord.com/api/webhooks/1/a".into(),
            is_primary: true,
            is_active: true,
            last_tested_at: None,
        }]);

        let reader = TenantConfigReader::new(store.clone());
        let guard = MatchDedupGuard::new();
        let c = content("I recommend arbitrage betting strategies today.", "rust");

        let matches = run_batch(vec![c], &reader, store.as_ref(), &guard).await;
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].matched_phrase, "arbitrage betting");
        assert!(matches[0].snippet.len() <= SNIPPET_MAX_LEN);
    }

    #[tokio::test]
    async fn media_post_filtered_when_tenant_excludes_media() {
        let store = Arc::new(MemoryStore::new());
        let kw = Keyword::new("t1", vec!["arbitrage betting".into()]);
        let mut sub = sub_cfg("rust");
        sub.include_media_posts = false;
        store.seed_tenant("t1", vec![kw], vec![sub], vec![]);

        let reader = TenantConfigReader::new(store.clone());
        let guard = MatchDedupGuard::new();
        let mut c = content("arbitrage betting post", "rust");
        c.is_media_post = true;

        let matches = run_batch(vec![c], &reader, store.as_ref(), &guard).await;
        assert!(matches.is_empty());
    }

    #[test]
    fn snippet_truncates_with_ellipsis() {
        let raw = "x".repeat(500);
        let snippet = extract_snippet(&raw, 250, 253);
        assert!(snippet.len() <= SNIPPET_MAX_LEN);
        assert!(snippet.starts_with('…'));
        assert!(snippet.ends_with('…'));
    }
}
