//! Observability HTTP surface (§10.5): `/health` liveness probe plus the
//! Prometheus `/metrics` route, merged with `Metrics::router`.
//!
//! Trimmed from the teacher's `api.rs` router-building shape down to what
//! this service needs — no request-handling endpoints, since the worker's
//! only job is the scheduler loop.

use axum::{routing::get, Router};
use tower_http::cors::CorsLayer;

use crate::metrics::Metrics;

pub fn router(metrics: &Metrics) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .merge(metrics.router())
        .layer(CorsLayer::very_permissive())
}
