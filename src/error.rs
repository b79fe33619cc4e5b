//! Error taxonomy for the ingestion-matching-alerting pipeline.
//!
//! Mirrors the error kinds named in spec §7. Tenant-scoped errors
//! (`ContentMalformed`, `MatcherInvariantViolation`, `WebhookDeliveryFailed`)
//! are caught and logged at the component boundary so one tenant's failure
//! never blocks another; `StoreUnavailable` is scheduler-level and pauses all
//! ticks until the store recovers.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReddalertError {
    #[error("transient source error: {0}")]
    TransientSource(#[source] anyhow::Error),

    #[error("permanent source error: subreddit inaccessible (status {status})")]
    PermanentSource { status: u16 },

    #[error("malformed content skipped: {0}")]
    ContentMalformed(String),

    #[error("keyword config inconsistent for keyword {keyword_id}: {reason}")]
    MatcherInvariantViolation { keyword_id: String, reason: String },

    #[error("webhook delivery failed after retries: {0}")]
    WebhookDeliveryFailed(#[source] anyhow::Error),

    #[error("store conflict (treated as success): {0}")]
    StoreConflict(String),

    #[error("durable store unavailable: {0}")]
    StoreUnavailable(#[source] anyhow::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, ReddalertError>;
