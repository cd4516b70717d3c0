//! Per-job websocket: status frames pushed until the job is terminal.

use crate::state::SharedState;
use atelier_protocol::{CoreError, JobId, ProgressStatus};
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Path, State, WebSocketUpgrade};
use axum::response::{IntoResponse, Response};
use std::sync::atomic::Ordering;
use tracing::debug;

pub async fn job_ws(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    upgrade: WebSocketUpgrade,
) -> Response {
    let job_id = match JobId::parse(&id) {
        Ok(job_id) => job_id,
        Err(e) => return crate::error::ApiError(CoreError::bad_input(e.to_string())).into_response(),
    };
    upgrade.on_upgrade(move |socket| stream_job(state, job_id, socket))
}

async fn stream_job(state: SharedState, job_id: JobId, mut socket: WebSocket) {
    state.active_websockets.fetch_add(1, Ordering::Relaxed);
    let (subscriber_id, mut rx) = state.monitor.subscribe(&job_id).await;

    // Reconcile first: the subscriber may have missed earlier frames.
    if let Some(snapshot) = state.monitor.get_progress(&job_id).await {
        if let Ok(body) = serde_json::to_string(&snapshot) {
            let _ = socket.send(Message::Text(body.into())).await;
        }
    }

    loop {
        tokio::select! {
            update = rx.recv() => {
                let Some(update) = update else { break };
                let terminal = matches!(
                    update.status,
                    ProgressStatus::Completed | ProgressStatus::Failed
                );
                match serde_json::to_string(&update) {
                    Ok(body) => {
                        if socket.send(Message::Text(body.into())).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        debug!("Progress frame serialization failed: {}", e);
                        break;
                    }
                }
                if terminal {
                    break;
                }
            }
            incoming = socket.recv() => {
                // The client hung up (or sent something; we only push).
                match incoming {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(_)) => break,
                    _ => {}
                }
            }
        }
    }

    state.monitor.unsubscribe(&job_id, subscriber_id).await;
    let _ = socket.send(Message::Close(None)).await;
    state.active_websockets.fetch_sub(1, Ordering::Relaxed);
}
