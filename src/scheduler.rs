//! Scheduler (§4.7). A cooperative time wheel driving the poll/match/dispatch
//! ticks plus the daily retention sweep, shut down cleanly on a cancellation
//! signal (§5: "in-flight ticks finish their current item, commit, and
//! terminate; no partial writes").
//!
//! Grounded on the news-pipeline orchestrator's stats-tracked run loop
//! (`other_examples`), rewritten around `tokio::select!` over independent
//! `tokio::time::interval` ticks rather than a single polling loop.

use crate::dedup::MatchDedupGuard;
use crate::dispatch::Dispatcher;
use crate::match_engine;
use crate::poller::Poller;
use crate::store::{ContentStore, MatchStore, SubredditStore, TenantConfigSource};
use crate::tenant_config::TenantConfigReader;
use chrono::{Duration as ChronoDuration, Utc};
use std::sync::Arc;
use tokio::time::{interval, Duration};
use tracing::{info, warn};

const MATCH_TICK: Duration = Duration::from_secs(30);
const DISPATCH_TICK: Duration = Duration::from_secs(30);
const RETENTION_TICK: Duration = Duration::from_secs(24 * 3600);

pub struct Scheduler<S: TenantConfigSource> {
    poller: Arc<Poller>,
    reader: Arc<TenantConfigReader<S>>,
    content_store: Arc<dyn ContentStore>,
    match_store: Arc<dyn MatchStore>,
    subreddit_store: Arc<dyn SubredditStore>,
    dispatcher: Arc<Dispatcher<S>>,
    dedup_guard: Arc<MatchDedupGuard>,
    poll_interval: Duration,
    retention_days: i64,
}

impl<S: TenantConfigSource + 'static> Scheduler<S> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        poller: Arc<Poller>,
        reader: Arc<TenantConfigReader<S>>,
        content_store: Arc<dyn ContentStore>,
        match_store: Arc<dyn MatchStore>,
        subreddit_store: Arc<dyn SubredditStore>,
        dispatcher: Arc<Dispatcher<S>>,
        poll_interval: Duration,
        retention_days: i64,
    ) -> Self {
        Self {
            poller,
            reader,
            content_store,
            match_store,
            subreddit_store,
            dispatcher,
            dedup_guard: Arc::new(MatchDedupGuard::new()),
            poll_interval,
            retention_days,
        }
    }

    /// Run the scheduler until `shutdown` resolves. Each tick's in-flight
    /// work is awaited to completion before the next select iteration, so a
    /// shutdown signal never interrupts a tick mid-write.
    pub async fn run(&self, shutdown: impl std::future::Future<Output = ()>) {
        tokio::pin!(shutdown);
        let mut poll_tick = interval(self.poll_interval);
        let mut match_tick = interval(MATCH_TICK);
        let mut dispatch_tick = interval(DISPATCH_TICK);
        let mut retention_tick = interval(RETENTION_TICK);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("shutdown signal received, scheduler stopping");
                    break;
                }
                _ = poll_tick.tick() => self.run_poll_tick().await,
                _ = match_tick.tick() => self.run_match_tick().await,
                _ = dispatch_tick.tick() => self.run_dispatch_tick().await,
                _ = retention_tick.tick() => self.run_retention_sweep().await,
            }
        }
    }

    async fn run_poll_tick(&self) {
        let subreddits = match self.subreddit_store.list_all().await {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "failed to list subreddits for poll tick");
                return;
            }
        };

        // Group by name so shared subreddits are fetched once regardless of
        // how many tenants monitor them (§4.4 step 1).
        let mut by_name: std::collections::HashMap<String, Vec<&crate::model::MonitoredSubreddit>> =
            std::collections::HashMap::new();
        for s in &subreddits {
            by_name.entry(s.name.clone()).or_default().push(s);
        }

        for (name, rows) in by_name {
            let min_cadence_minutes = rows.iter().map(|_| self.poll_interval.as_secs() / 60).min().unwrap_or(1).max(1);
            let cadence = Duration::from_secs(min_cadence_minutes * 60);
            let representative = rows[0];
            if let Err(e) = self.poller.poll_subreddit(&representative.id, &name, cadence).await {
                warn!(subreddit = %name, error = %e, "poll tick failed for subreddit");
            }
        }
    }

    async fn run_match_tick(&self) {
        let tenant_ids = match self.reader.all_tenant_ids().await {
            Ok(ids) => ids,
            Err(e) => {
                warn!(error = %e, "failed to list tenants for match tick");
                return;
            }
        };

        let mut subreddit_names: std::collections::HashSet<String> = std::collections::HashSet::new();
        for tenant_id in &tenant_ids {
            if let Ok(snap) = self.reader.get(tenant_id).await {
                subreddit_names.extend(snap.subreddits.iter().map(|s| s.name.clone()));
            }
        }

        let since = Utc::now() - ChronoDuration::minutes(10);
        let mut content_rows = Vec::new();
        for name in subreddit_names {
            match self.content_store.content_since(&name, since).await {
                Ok(rows) => content_rows.extend(rows),
                Err(e) => warn!(subreddit = %name, error = %e, "failed to load content for match tick"),
            }
        }

        let matches = match_engine::run_batch(content_rows, &self.reader, self.match_store.as_ref(), &self.dedup_guard).await;
        if !matches.is_empty() {
            info!(count = matches.len(), "match tick produced matches");
        }
    }

    async fn run_dispatch_tick(&self) {
        if let Err(e) = self.dispatcher.run_tick().await {
            warn!(error = %e, "dispatch tick failed");
        }
    }

    async fn run_retention_sweep(&self) {
        let cutoff = Utc::now() - ChronoDuration::days(self.retention_days);
        match self.content_store.delete_older_than(cutoff).await {
            Ok(n) => info!(deleted = n, "retention sweep removed content rows"),
            Err(e) => warn!(error = %e, "retention sweep failed for content"),
        }
        match self.match_store.delete_older_than(cutoff).await {
            Ok(n) => info!(deleted = n, "retention sweep removed match rows"),
            Err(e) => warn!(error = %e, "retention sweep failed for matches"),
        }
    }
}
