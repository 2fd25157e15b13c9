//! # Dashboard — HTTP and WebSocket Surface
//!
//! Runs an Axum server exposing the job channel, session ingestion, history
//! queries, CSV export and operational probes. The operator UI is external;
//! an optional static directory is served as the fallback route.
//!
//! | Route | Handler |
//! |-------|---------|
//! | `GET /ws/search` | [`websocket`] — one search job per connection |
//! | `POST /api/session` | [`routes_session`] — browser-extension session upload |
//! | `GET /api/history`, `GET /api/tasks`, `GET /export/csv` | [`routes_history`] |
//! | `GET /healthz`, `GET /readyz`, `GET /metrics` | [`routes_health`] |

mod routes_health;
mod routes_history;
mod routes_session;
mod websocket;

use anyhow::Result;
use axum::extract::Request;
use axum::http::{HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::routing::{get, post};
use axum::Router;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::services::ServeDir;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn, Instrument};

use crate::pipeline::{Pipeline, PipelineConfig};
use crate::scraper::driver::BrowserLauncher;
use crate::{db, prom_metrics};

pub struct AppState {
    pub db: db::Database,
    pub pipeline: Pipeline,
    pub prom_metrics: Arc<prom_metrics::Metrics>,
}

impl AppState {
    pub fn new(
        db: db::Database,
        config: PipelineConfig,
        launcher: Arc<dyn BrowserLauncher>,
    ) -> Result<Arc<Self>> {
        let prom_metrics = Arc::new(prom_metrics::Metrics::new());
        let pipeline = Pipeline::new(db.clone(), config, launcher)?.with_metrics(prom_metrics.clone());
        Ok(Arc::new(AppState {
            db,
            pipeline,
            prom_metrics,
        }))
    }
}

/// Records request latency, propagates or assigns `x-request-id`, and runs
/// the request inside a tracing span carrying that id.
async fn metrics_middleware(
    axum::extract::State(state): axum::extract::State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> axum::response::Response {
    let request_id = req
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let method = req.method().to_string();
    let raw_path = req.uri().path().to_string();
    let norm_path = normalize_path(&raw_path);
    let start = std::time::Instant::now();

    let span = tracing::info_span!(
        "request",
        request_id = %request_id,
        method = %method,
        path = %raw_path,
    );
    let mut response = next.run(req).instrument(span).await;

    state
        .prom_metrics
        .http_request_duration
        .get_or_create(&prom_metrics::HttpLabel {
            method,
            path: norm_path,
        })
        .observe(start.elapsed().as_secs_f64());

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert("x-request-id", value);
    }
    response
}

/// Collapse numeric ids so histogram labels stay bounded.
fn normalize_path(path: &str) -> String {
    path.split('/')
        .map(|seg| {
            if !seg.is_empty() && seg.chars().all(|c| c.is_ascii_digit()) {
                ":id"
            } else {
                seg
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

pub fn build_router(state: Arc<AppState>, static_dir: Option<&Path>) -> Router {
    let mut app = Router::new()
        .route("/ws/search", get(websocket::handler_ws_search))
        .route("/api/session", post(routes_session::handler_api_session))
        .route("/api/history", get(routes_history::handler_api_history))
        .route("/api/tasks", get(routes_history::handler_api_tasks))
        .route("/export/csv", get(routes_history::handler_export_csv))
        .route("/healthz", get(routes_health::handler_healthz))
        .route("/readyz", get(routes_health::handler_readyz))
        .route("/metrics", get(routes_health::handler_metrics));

    if let Some(dir) = static_dir {
        app = app.fallback_service(ServeDir::new(dir).append_index_html_on_directories(true));
    }

    app.layer(
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any),
    )
    .layer(CatchPanicLayer::new())
    .layer(axum::middleware::from_fn_with_state(
        state.clone(),
        metrics_middleware,
    ))
    .layer(TraceLayer::new_for_http())
    .layer(RequestBodyLimitLayer::new(1024 * 1024))
    .layer(TimeoutLayer::with_status_code(
        StatusCode::REQUEST_TIMEOUT,
        Duration::from_secs(30),
    ))
    .with_state(state)
}

pub async fn run(state: Arc<AppState>, addr: SocketAddr, static_dir: Option<&Path>) -> Result<()> {
    let app = build_router(state, static_dir);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "dashboard running");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("dashboard shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("received SIGINT, shutting down"),
                    _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
                }
            }
            Err(e) => {
                warn!(error = %e, "cannot install SIGTERM handler, waiting for SIGINT only");
                ctrl_c.await.ok();
                info!("received SIGINT, shutting down");
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("received SIGINT, shutting down");
    }
}
