//! Prometheus wiring (§10.5). Counters mirror the shape described, one-time
//! registration via the `ensure_metrics_described` pattern so series show up
//! on `/metrics` even before their first increment.

use axum::{routing::get, Router};
use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "reddalert_ingest_events_total",
            "Posts/comments fetched from monitored subreddits."
        );
        describe_counter!(
            "reddalert_ingest_dedup_total",
            "Fetched items recognized as duplicates or crossposts."
        );
        describe_counter!(
            "reddalert_matches_emitted_total",
            "Keyword matches inserted by the match engine."
        );
        describe_counter!(
            "reddalert_alerts_sent_total",
            "Webhook alerts delivered successfully."
        );
        describe_counter!(
            "reddalert_alerts_failed_total",
            "Webhook alerts that exhausted retries."
        );
        describe_counter!(
            "reddalert_webhook_retry_total",
            "Webhook send attempts that failed and were retried."
        );
        describe_gauge!(
            "reddalert_subreddit_status",
            "Per-subreddit status (0=active, 1=inaccessible, 2=private)."
        );
    });
}

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    pub fn init() -> Self {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .expect("prometheus: install recorder");
        ensure_metrics_described();
        Self { handle }
    }

    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}

pub fn record_ingest(count: u64) {
    counter!("reddalert_ingest_events_total").increment(count);
}

pub fn record_dedup(count: u64) {
    counter!("reddalert_ingest_dedup_total").increment(count);
}

pub fn record_matches(count: u64) {
    counter!("reddalert_matches_emitted_total").increment(count);
}

pub fn record_alert_sent(count: u64) {
    counter!("reddalert_alerts_sent_total").increment(count);
}

pub fn record_alert_failed(count: u64) {
    counter!("reddalert_alerts_failed_total").increment(count);
}

pub fn record_webhook_retry() {
    counter!("reddalert_webhook_retry_total").increment(1);
}

pub fn record_subreddit_status(name: &str, status: crate::model::SubredditStatus) {
    let value = match status {
        crate::model::SubredditStatus::Active => 0.0,
        crate::model::SubredditStatus::Inaccessible => 1.0,
        crate::model::SubredditStatus::Private => 2.0,
    };
    gauge!("reddalert_subreddit_status", "subreddit" => name.to_string()).set(value);
}
