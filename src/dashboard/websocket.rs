//! Job channel: the client sends one `{target_count, username}` request and
//! receives the pipeline's messages until `done` or `error`.
//!
//! Closing the socket drops the receiving half of the job channel; the
//! pipeline notices at its next report and fails the task.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use std::sync::Arc;
use tracing::{info, warn};

use super::AppState;
use crate::events::{self, JobMessage};
use crate::pipeline::SearchRequest;

pub(super) async fn handler_ws_search(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| search_loop(socket, state))
}

async fn send(socket: &mut WebSocket, msg: &JobMessage) -> bool {
    match serde_json::to_string(msg) {
        Ok(text) => socket.send(Message::Text(text.into())).await.is_ok(),
        Err(e) => {
            warn!(error = %e, "failed to serialize job message");
            true
        }
    }
}

async fn read_request(socket: &mut WebSocket) -> Option<Result<SearchRequest, String>> {
    while let Some(msg) = socket.recv().await {
        match msg {
            Ok(Message::Text(text)) => {
                return Some(serde_json::from_str(text.as_str()).map_err(|e| e.to_string()))
            }
            Ok(Message::Binary(bytes)) => {
                return Some(serde_json::from_slice(&bytes).map_err(|e| e.to_string()))
            }
            Ok(Message::Close(_)) | Err(_) => return None,
            Ok(_) => {}
        }
    }
    None
}

async fn search_loop(mut socket: WebSocket, state: Arc<AppState>) {
    info!("search socket connected");
    let request = match read_request(&mut socket).await {
        Some(Ok(req)) => req,
        Some(Err(e)) => {
            send(&mut socket, &JobMessage::error(format!("invalid request: {}", e))).await;
            return;
        }
        None => {
            info!("search socket closed before a request arrived");
            return;
        }
    };
    info!(target = request.target_count, username = %request.username, "search requested");

    let (reporter, mut rx) = events::channel();
    let job_state = state.clone();
    let job = tokio::spawn(async move {
        // The outcome has already been reported through the channel.
        let _ = job_state.pipeline.run(request, &reporter).await;
    });

    loop {
        tokio::select! {
            msg = rx.recv() => {
                let Some(msg) = msg else { break };
                if !send(&mut socket, &msg).await {
                    info!("search socket send failed, client gone");
                    break;
                }
                if msg.is_terminal() {
                    break;
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => {
                        info!("search socket disconnected");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }
    drop(rx);
    if job.is_finished() {
        if let Err(e) = job.await {
            warn!(error = %e, "search task panicked");
        }
    }
}
