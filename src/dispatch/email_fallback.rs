//! Email fallback sink (§6, §7 WebhookDeliveryFailed). Used only after a
//! webhook has exhausted its retries. Grounded on the `lettre` SMTP-builder
//! pattern used across the example pack's notification code, adapted to the
//! teacher's optional-config-gated notifier shape (`SmtpSettings` is `None`
//! unless all four SMTP env vars are set).

use crate::config::SmtpSettings;
use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send_fallback(&self, to: &str, subject: &str, body: &str) -> anyhow::Result<()>;
}

pub struct SmtpEmailSender {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpEmailSender {
    pub fn new(settings: &SmtpSettings) -> anyhow::Result<Self> {
        let creds = Credentials::new(settings.user.clone(), settings.pass.clone());
        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(&settings.host)?
            .credentials(creds)
            .build();
        let from: Mailbox = settings.from.parse()?;
        Ok(Self { transport, from })
    }
}

#[async_trait]
impl EmailSender for SmtpEmailSender {
    async fn send_fallback(&self, to: &str, subject: &str, body: &str) -> anyhow::Result<()> {
        let to_mailbox: Mailbox = to.parse()?;
        let message = Message::builder()
            .from(self.from.clone())
            .to(to_mailbox)
            .subject(format!("Reddalert: {subject}"))
            .body(body.to_string())?;
        self.transport.send(message).await?;
        Ok(())
    }
}

/// Used when no SMTP settings are configured; logs instead of sending so the
/// dispatcher's fallback path still has somewhere to go.
#[derive(Default)]
pub struct NullEmailSender;

#[async_trait]
impl EmailSender for NullEmailSender {
    async fn send_fallback(&self, to: &str, subject: &str, _body: &str) -> anyhow::Result<()> {
        tracing::info!(to, subject, "SMTP not configured, dropping fallback email");
        Ok(())
    }
}
