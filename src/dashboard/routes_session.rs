//! Session ingestion for the browser extension.
//!
//! `storage_state` may arrive either as a JSON object or as a string holding
//! already-serialized JSON; in both cases the bytes are stored verbatim, so
//! the body is parsed here rather than through the `Json` extractor.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::value::RawValue;
use std::sync::Arc;
use tracing::{error, info};

use super::AppState;

#[derive(Deserialize)]
pub(super) struct SessionUpload {
    #[serde(default)]
    username: String,
    storage_state: Box<RawValue>,
}

/// The blob to persist: the string's contents when a string was sent, the raw
/// JSON text otherwise.
fn blob_of(raw: &RawValue) -> String {
    match serde_json::from_str::<String>(raw.get()) {
        Ok(inner) => inner,
        Err(_) => raw.get().to_string(),
    }
}

pub(super) async fn handler_api_session(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> impl IntoResponse {
    let upload: SessionUpload = match serde_json::from_slice(&body) {
        Ok(u) => u,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({"error": format!("invalid session upload: {}", e)})),
            )
                .into_response()
        }
    };
    let username = upload.username.trim();
    if username.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"error": "username is required"})),
        )
            .into_response();
    }

    let blob = blob_of(&upload.storage_state);
    match state.db.upsert_session(username, &blob).await {
        Ok(account) => {
            state.prom_metrics.sessions_uploaded.inc();
            info!(account = %account.username, bytes = blob.len(), "session uploaded");
            Json(serde_json::json!({
                "message": format!("Session for {} updated successfully", account.username),
                "account": account,
            }))
            .into_response()
        }
        Err(e) => {
            error!(username, error = %e, "failed to store session");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"error": format!("Failed to store session: {}", e)})),
            )
                .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_blob_is_kept_verbatim() {
        let body = r#"{"username":"m1","storage_state":{"origins":[],"cookies":[{"name":"a","value":"1"}]}}"#;
        let upload: SessionUpload = serde_json::from_str(body).unwrap();
        assert_eq!(
            blob_of(&upload.storage_state),
            r#"{"origins":[],"cookies":[{"name":"a","value":"1"}]}"#
        );
    }

    #[test]
    fn string_blob_is_unwrapped() {
        let body = r#"{"username":"m1","storage_state":"{\"cookies\":[]}"}"#;
        let upload: SessionUpload = serde_json::from_str(body).unwrap();
        assert_eq!(blob_of(&upload.storage_state), r#"{"cookies":[]}"#);
    }
}
