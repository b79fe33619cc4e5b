//! Webhook sink seam (§6: "the chat-webhook transport, treated as an
//! abstract POST sink"). Grounded on the teacher's
//! `notify::discord::DiscordNotifier::send`, generalized to a pluggable
//! trait so tests don't need a live Discord endpoint.

use super::WebhookPayload;
use async_trait::async_trait;
use std::fmt;
use std::time::Duration;

#[derive(Debug)]
pub struct SendError {
    pub status: Option<u16>,
    pub retry_after: Option<Duration>,
    pub message: String,
}

impl fmt::Display for SendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

#[async_trait]
pub trait WebhookSender: Send + Sync {
    async fn send(&self, url: &str, payload: &WebhookPayload) -> Result<(), SendError>;
}

pub struct HttpWebhookSender {
    client: reqwest::Client,
}

impl Default for HttpWebhookSender {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpWebhookSender {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(15))
                .build()
                .expect("reqwest client builds"),
        }
    }
}

#[async_trait]
impl WebhookSender for HttpWebhookSender {
    async fn send(&self, url: &str, payload: &WebhookPayload) -> Result<(), SendError> {
        let resp = self.client.post(url).json(payload).send().await.map_err(|e| SendError {
            status: None,
            retry_after: None,
            message: e.to_string(),
        })?;

        if resp.status().is_success() {
            return Ok(());
        }

        let status = resp.status().as_u16();
        let retry_after = resp
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_secs);

        Err(SendError {
            status: Some(status),
            retry_after,
            message: format!("webhook call returned status {status}"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::Embed;

    fn payload() -> WebhookPayload {
        WebhookPayload {
            content: None,
            embeds: vec![Embed {
                title: "t".into(),
                description: "d".into(),
                url: "https://reddit.com/r/rust/comments/1".into(),
                fields: vec![],
                timestamp: "2026-01-01T00:00:00Z".into(),
                color: 0,
            }],
        }
    }

    #[tokio::test]
    async fn unreachable_host_reports_transient_send_error() {
        let sender = HttpWebhookSender::new();
        let result = sender.send("http://127.0.0.1:0/webhook", &payload()).await;
        assert!(result.is_err());
    }
}
