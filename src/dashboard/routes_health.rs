//! # Health & Observability Endpoints
//!
//! | Endpoint | Purpose |
//! |----------|---------|
//! | `GET /healthz` | Liveness, always 200 while the process serves HTTP |
//! | `GET /readyz` | Readiness, `SELECT 1` against the store with a 2 s timeout |
//! | `GET /metrics` | Prometheus scrape endpoint |

use super::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use std::sync::Arc;

pub async fn handler_healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

/// 503 when the store is unreachable or slow, so traffic is held back until
/// it recovers.
pub async fn handler_readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let check =
        tokio::time::timeout(std::time::Duration::from_secs(2), state.db.health_check()).await;

    match check {
        Ok(Ok(())) => (StatusCode::OK, "ok"),
        Ok(Err(_)) => (StatusCode::SERVICE_UNAVAILABLE, "database unreachable"),
        Err(_) => (StatusCode::SERVICE_UNAVAILABLE, "database timeout"),
    }
}

pub async fn handler_metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let body = state.prom_metrics.encode();
    (
        StatusCode::OK,
        [(
            "content-type",
            "application/openmetrics-text; version=1.0.0; charset=utf-8",
        )],
        body,
    )
}
