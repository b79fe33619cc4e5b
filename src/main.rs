//! # Reddalert — Binary Entrypoint
//! Boots tracing, loads `Settings`, wires the in-memory store + pipeline, and
//! blocks until a shutdown signal arrives (§10.4).
//!
//! ## Endpoints (while the worker runs)
//! - `GET /health` — liveness check
//! - `GET /metrics` — Prometheus exposition

use clap::{Parser, Subcommand};
use reddalert::config::Settings;
use reddalert::dispatch::email_fallback::{EmailSender, NullEmailSender, SmtpEmailSender};
use reddalert::dispatch::webhook::HttpWebhookSender;
use reddalert::dispatch::Dispatcher;
use reddalert::metrics::Metrics;
use reddalert::poller::Poller;
use reddalert::ratelimit::TokenBucket;
use reddalert::scheduler::Scheduler;
use reddalert::source::reddit_api::RedditApiSource;
use reddalert::store::memory::MemoryStore;
use reddalert::tenant_config::TenantConfigReader;
use std::sync::Arc;
use tokio::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "reddalert", about = "Multi-tenant Reddit keyword monitoring worker")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Boot the worker (scheduler + health/metrics HTTP surface).
    Worker {
        #[command(subcommand)]
        action: WorkerAction,
    },
}

#[derive(Subcommand)]
enum WorkerAction {
    /// Run the poll/match/dispatch scheduler until interrupted.
    Run,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .json()
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Worker { action: WorkerAction::Run } => run_worker().await,
    }
}

async fn run_worker() -> anyhow::Result<()> {
    let settings = Settings::from_env()?;

    let source: Arc<RedditApiSource> = Arc::new(RedditApiSource::new(
        settings.forum_app_id.clone(),
        settings.forum_app_secret.clone(),
        settings.forum_user_agent.clone(),
    ));
    let store = Arc::new(MemoryStore::new());
    let bucket = Arc::new(TokenBucket::new(100, 6000));

    let poller = Arc::new(Poller::new(
        source,
        store.clone(),
        store.clone(),
        bucket,
    ));
    let reader = Arc::new(TenantConfigReader::new(store.clone()));

    let email_sender: Arc<dyn EmailSender> = match &settings.smtp {
        Some(smtp) => Arc::new(SmtpEmailSender::new(smtp)?),
        None => Arc::new(NullEmailSender),
    };
    let dispatcher = Arc::new(Dispatcher::new(
        reader.clone(),
        store.clone(),
        Arc::new(HttpWebhookSender::new()),
        email_sender,
    ));

    let scheduler = Scheduler::new(
        poller,
        reader,
        store.clone(),
        store.clone(),
        store.clone(),
        dispatcher,
        Duration::from_secs(u64::from(settings.poll_interval_minutes) * 60),
        settings.retention_days,
    );

    let metrics = Metrics::init();
    let app = reddalert::api::router(&metrics);
    let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
    let http_server = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "health/metrics server stopped unexpectedly");
        }
    });

    tracing::info!("reddalert worker starting");
    scheduler.run(shutdown_signal()).await;
    http_server.abort();
    tracing::info!("reddalert worker stopped");
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
