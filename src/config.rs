//! Worker configuration, loaded from the environment per spec §6.
//!
//! Follows the teacher's `from_env()` convention (see former
//! `notify::discord::DiscordNotifier::from_env`): required variables panic
//! with a descriptive message at startup rather than failing deep in the
//! pipeline; optional ones fall back to documented defaults.

use anyhow::{Context, Result};
use regex::Regex;

#[derive(Clone)]
pub struct Settings {
    pub forum_app_id: String,
    pub forum_app_secret: String,
    pub forum_user_agent: String,
    pub poll_interval_minutes: u32,
    pub retention_days: i64,
    pub webhook_url_pattern: Regex,
    pub smtp: Option<SmtpSettings>,
}

#[derive(Clone)]
pub struct SmtpSettings {
    pub host: String,
    pub user: String,
    pub pass: String,
    pub from: String,
}

const DEFAULT_WEBHOOK_PATTERN: &str =
    r"^https://(discord\.com|discordapp\.com)/api/webhooks/\d+/[\w-]+$";

impl Settings {
    /// Load settings from the process environment. Loads a `.env` file first
    /// (if present) the way the teacher's binaries do via `dotenvy`.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();

        let forum_app_id = std::env::var("FORUM_APP_ID").context("FORUM_APP_ID missing")?;
        let forum_app_secret =
            std::env::var("FORUM_APP_SECRET").context("FORUM_APP_SECRET missing")?;
        let forum_user_agent =
            std::env::var("FORUM_USER_AGENT").context("FORUM_USER_AGENT missing")?;

        let poll_interval_minutes = std::env::var("POLL_INTERVAL_MINUTES")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(1)
            .clamp(1, 1440);

        let retention_days = std::env::var("RETENTION_DAYS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(90);

        let pattern = std::env::var("WEBHOOK_URL_PATTERN")
            .unwrap_or_else(|_| DEFAULT_WEBHOOK_PATTERN.to_string());
        let webhook_url_pattern =
            Regex::new(&pattern).context("WEBHOOK_URL_PATTERN is not a valid regex")?;

        let smtp = match (
            std::env::var("SMTP_HOST"),
            std::env::var("SMTP_USER"),
            std::env::var("SMTP_PASS"),
            std::env::var("NOTIFY_EMAIL_FROM"),
        ) {
            (Ok(host), Ok(user), Ok(pass), Ok(from)) => Some(SmtpSettings { host, user, pass, from }),
            _ => None,
        };

        Ok(Self {
            forum_app_id,
            forum_app_secret,
            forum_user_agent,
            poll_interval_minutes,
            retention_days,
            webhook_url_pattern,
            smtp,
        })
    }

    /// True if `url` matches the configured webhook pattern (SSRF guard, §6).
    pub fn accepts_webhook_url(&self, url: &str) -> bool {
        self.webhook_url_pattern.is_match(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_pattern_accepts_discord_webhooks() {
        let re = Regex::new(DEFAULT_WEBHOOK_PATTERN).unwrap();
        assert!(re.is_match("https://discord.com/api/webhooks/123456/abcDEF-_123"));
        assert!(!re.is_match("https://evil.example.com/steal"));
    }
}
