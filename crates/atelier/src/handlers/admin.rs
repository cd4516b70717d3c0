//! Admin endpoints - reference-index rebuild.

use crate::error::{ApiError, ApiResult};
use crate::state::SharedState;
use atelier_index::RebuildReport;
use atelier_protocol::CoreError;
use axum::extract::State;
use axum::Json;
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RebuildRequest {
    #[serde(default)]
    pub incremental: bool,
}

pub async fn rebuild_index(
    State(state): State<SharedState>,
    Json(request): Json<RebuildRequest>,
) -> ApiResult<Json<RebuildReport>> {
    let rebuilder = state.rebuilder.as_ref().ok_or_else(|| {
        ApiError(CoreError::upstream(
            "reference index is not configured on this deployment",
        ))
    })?;
    let report = rebuilder.rebuild(request.incremental).await?;
    Ok(Json(report))
}
