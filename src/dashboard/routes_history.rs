//! History queries and CSV export.

use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;

use super::AppState;
use crate::db::DomainResult;

const MAX_LIMIT: i64 = 1000;

#[derive(Deserialize)]
pub(super) struct LimitQuery {
    limit: Option<i64>,
}

impl LimitQuery {
    fn resolve(&self, default: i64) -> i64 {
        self.limit.unwrap_or(default).clamp(1, MAX_LIMIT)
    }
}

fn internal_error(context: &str, e: anyhow::Error) -> axum::response::Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({"error": format!("{}: {}", context, e)})),
    )
        .into_response()
}

/// Most recent results first, default 50.
pub(super) async fn handler_api_history(
    State(state): State<Arc<AppState>>,
    Query(q): Query<LimitQuery>,
) -> impl IntoResponse {
    match state.db.recent_results(q.resolve(50)).await {
        Ok(rows) => Json(rows).into_response(),
        Err(e) => internal_error("Failed to load history", e),
    }
}

/// Most recent tasks first, default 10.
pub(super) async fn handler_api_tasks(
    State(state): State<Arc<AppState>>,
    Query(q): Query<LimitQuery>,
) -> impl IntoResponse {
    match state.db.recent_tasks(q.resolve(10)).await {
        Ok(rows) => Json(rows).into_response(),
        Err(e) => internal_error("Failed to load tasks", e),
    }
}

pub(super) fn results_csv(rows: &[DomainResult]) -> String {
    let mut csv = String::from("name,bl,age_years,status\n");
    for r in rows {
        csv.push_str(&format!(
            "{},{},{},{}\n",
            r.name, r.bl, r.age_years, r.status
        ));
    }
    csv
}

/// Results of the most recent task; 404 before any task exists.
pub(super) async fn handler_export_csv(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let task = match state.db.latest_task().await {
        Ok(Some(t)) => t,
        Ok(None) => {
            return (
                StatusCode::NOT_FOUND,
                Json(serde_json::json!({"error": "No results to export"})),
            )
                .into_response()
        }
        Err(e) => return internal_error("Failed to load latest task", e),
    };
    match state.db.results_for_task(task.id).await {
        Ok(rows) => (
            [
                (header::CONTENT_TYPE, "text/csv"),
                (
                    header::CONTENT_DISPOSITION,
                    "attachment; filename=\"domains.csv\"",
                ),
            ],
            results_csv(&rows),
        )
            .into_response(),
        Err(e) => internal_error("Failed to load results", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DomainStatus;

    #[test]
    fn csv_has_header_and_rows() {
        let row = DomainResult {
            id: 1,
            task_id: 1,
            name: "quietlibrary.com".into(),
            bl: 120,
            age_years: 14,
            status: DomainStatus::Available,
            source_page: 2,
            found_at: chrono::Utc::now(),
        };
        assert_eq!(
            results_csv(&[row]),
            "name,bl,age_years,status\nquietlibrary.com,120,14,available\n"
        );
    }

    #[test]
    fn limit_is_clamped() {
        assert_eq!(LimitQuery { limit: None }.resolve(50), 50);
        assert_eq!(LimitQuery { limit: Some(0) }.resolve(50), 1);
        assert_eq!(LimitQuery { limit: Some(5000) }.resolve(10), MAX_LIMIT);
    }
}
