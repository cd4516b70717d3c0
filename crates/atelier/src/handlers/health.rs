//! `/health`.

use crate::state::SharedState;
use atelier_protocol::http::HealthResponse;
use axum::extract::State;
use axum::Json;
use std::sync::atomic::Ordering;

pub async fn health(State(state): State<SharedState>) -> Json<HealthResponse> {
    let backend_up = state.comfy.check_health().await;
    let queue = if backend_up {
        state.comfy.get_queue_status().await.unwrap_or_default()
    } else {
        Default::default()
    };
    Json(HealthResponse {
        status: if backend_up { "ok" } else { "degraded" },
        model_preloaded: backend_up,
        queue_size: queue.running + queue.pending,
        active_websockets: state.active_websockets.load(Ordering::Relaxed),
        jobs_in_memory: state.manager.jobs_in_memory().await,
    })
}
