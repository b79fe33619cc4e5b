//! Alert Dispatcher (§4.6). Batches pending matches per `(tenantId,
//! primaryWebhookId)`, formats rich embeds, sends with retry-with-backoff,
//! and falls back to email after retries are exhausted.
//!
//! Grounded on the teacher's `notify::discord::DiscordNotifier` (embed
//! construction, reqwest POST, retry classification) and
//! `notify::antiflutter`'s batching-window shape, generalized from a single
//! cooldown gate to the 2-minute accumulate-or-flush rule spec.md §4.6
//! defines.

pub mod email_fallback;
pub mod webhook;

use crate::error::Result;
use crate::model::Match;
use crate::store::{MatchStore, TenantConfigSource, TenantSnapshot};
use crate::tenant_config::TenantConfigReader;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use email_fallback::EmailSender;
use rand::Rng;
use serde::Serialize;
use std::sync::Arc;
use tokio::time::Duration;
use tracing::{info, warn};
use webhook::{SendError, WebhookSender};

const BATCH_WINDOW: ChronoDuration = ChronoDuration::minutes(2);
const BATCH_THRESHOLD: usize = 3;
const MAX_EMBEDS_PER_CALL: usize = 10;
const MAX_RETRIES: u32 = 3;
const BACKOFFS_SECS: [u64; 3] = [1, 4, 16];

#[derive(Debug, Serialize)]
pub struct Embed {
    pub title: String,
    pub description: String,
    pub url: String,
    pub fields: Vec<EmbedField>,
    pub timestamp: String,
    pub color: u32,
}

#[derive(Debug, Serialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

#[derive(Debug, Serialize)]
pub struct WebhookPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    pub embeds: Vec<Embed>,
}

fn embed_for(m: &Match) -> Embed {
    Embed {
        title: format!("\"{}\" mentioned in r/{}", m.matched_phrase, m.subreddit),
        description: m.snippet.clone(),
        url: m.reddit_url.clone(),
        fields: vec![
            EmbedField { name: "Author".into(), value: m.reddit_author.clone(), inline: true },
            EmbedField { name: "Proximity".into(), value: format!("{:.2}", m.proximity_score), inline: true },
        ],
        timestamp: m.detected_at.to_rfc3339(),
        color: 0x5865F2,
    }
}

fn jittered_backoff(attempt: usize) -> Duration {
    let base = BACKOFFS_SECS[attempt] as f64;
    let jitter = rand::thread_rng().gen_range(-0.2..=0.2);
    Duration::from_secs_f64((base * (1.0 + jitter)).max(0.0))
}

pub struct Dispatcher<S: TenantConfigSource> {
    reader: Arc<TenantConfigReader<S>>,
    match_store: Arc<dyn MatchStore>,
    webhook_sender: Arc<dyn WebhookSender>,
    email_sender: Arc<dyn EmailSender>,
}

impl<S: TenantConfigSource> Dispatcher<S> {
    pub fn new(
        reader: Arc<TenantConfigReader<S>>,
        match_store: Arc<dyn MatchStore>,
        webhook_sender: Arc<dyn WebhookSender>,
        email_sender: Arc<dyn EmailSender>,
    ) -> Self {
        Self { reader, match_store, webhook_sender, email_sender }
    }

    /// One dispatch tick (§4.7, every 30s): apply the batching rule across
    /// every tenant.
    pub async fn run_tick(&self) -> Result<()> {
        let tenant_ids = self.reader.all_tenant_ids().await?;
        let now = Utc::now();

        for tenant_id in &tenant_ids {
            let snapshot = match self.reader.get(tenant_id).await {
                Ok(s) => s,
                Err(e) => {
                    warn!(tenant_id = %tenant_id, error = %e, "skipping dispatch for tenant, snapshot load failed");
                    continue;
                }
            };
            let Some(webhook) = snapshot.primary_webhook() else {
                continue;
            };

            let window_start = now - BATCH_WINDOW;
            let recent = self
                .match_store
                .pending_for_tenant(tenant_id, window_start, now)
                .await
                .unwrap_or_default();
            let older = self
                .match_store
                .pending_for_tenant(tenant_id, DateTime::<Utc>::MIN_UTC, window_start)
                .await
                .unwrap_or_default();

            if recent.len() >= BATCH_THRESHOLD {
                self.send_batched(&webhook.url, tenant_id, recent, &snapshot).await;
            }
            for m in older {
                self.send_one(&webhook.url, tenant_id, m, &snapshot).await;
            }
        }
        Ok(())
    }

    async fn send_batched(&self, webhook_url: &str, tenant_id: &str, matches: Vec<Match>, snapshot: &TenantSnapshot) {
        for chunk in matches.chunks(MAX_EMBEDS_PER_CALL) {
            let payload = WebhookPayload {
                content: Some(format!("{} new matches", chunk.len())),
                embeds: chunk.iter().map(embed_for).collect(),
            };
            let result = self.send_with_retry(webhook_url, &payload).await;
            self.finalize(chunk, result, tenant_id, snapshot).await;
        }
    }

    async fn send_one(&self, webhook_url: &str, tenant_id: &str, m: Match, snapshot: &TenantSnapshot) {
        let payload = WebhookPayload { content: None, embeds: vec![embed_for(&m)] };
        let result = self.send_with_retry(webhook_url, &payload).await;
        self.finalize(std::slice::from_ref(&m), result, tenant_id, snapshot).await;
    }

    async fn send_with_retry(&self, url: &str, payload: &WebhookPayload) -> std::result::Result<(), SendError> {
        let mut attempt = 0usize;
        loop {
            match self.webhook_sender.send(url, payload).await {
                Ok(()) => return Ok(()),
                Err(e) if attempt + 1 >= MAX_RETRIES as usize => return Err(e),
                Err(e) => {
                    let wait = e.retry_after.unwrap_or_else(|| jittered_backoff(attempt));
                    crate::metrics::record_webhook_retry();
                    warn!(url, attempt, error = %e.message, "webhook send failed, retrying");
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
            }
        }
    }

    async fn finalize(
        &self,
        sent: &[Match],
        result: std::result::Result<(), SendError>,
        tenant_id: &str,
        snapshot: &TenantSnapshot,
    ) {
        match result {
            Ok(()) => {
                let now = Utc::now();
                for m in sent {
                    let _ = self.match_store.mark_sent(&m.id, now).await;
                }
                crate::metrics::record_alert_sent(sent.len() as u64);
                info!(tenant_id, count = sent.len(), "alerts delivered");
            }
            Err(e) => {
                for m in sent {
                    let _ = self.match_store.mark_failed(&m.id).await;
                }
                crate::metrics::record_alert_failed(sent.len() as u64);
                warn!(tenant_id, count = sent.len(), error = %e.message, "alert delivery exhausted retries, falling back");
                self.fallback(sent, tenant_id, snapshot).await;
            }
        }
    }

    /// §7 WebhookDeliveryFailed: email the tenant (if they have one on file)
    /// after 3 failed webhook attempts. The match row stays queryable with
    /// `alertStatus = failed`.
    async fn fallback(&self, sent: &[Match], tenant_id: &str, snapshot: &TenantSnapshot) {
        let Some(email) = &snapshot.email else {
            return;
        };
        for m in sent {
            if let Err(e) = self
                .email_sender
                .send_fallback(email, &format!("Alert failed: {}", m.matched_phrase), &m.snippet)
                .await
            {
                warn!(tenant_id, match_id = %m.id, error = %e, "fallback email also failed");
            }
        }
    }
}
