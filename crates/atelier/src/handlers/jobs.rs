//! Job read/cancel endpoints.

use crate::error::{ApiError, ApiResult};
use crate::state::SharedState;
use atelier_protocol::http::JobListQuery;
use atelier_protocol::{CoreError, Job, JobId};
use axum::extract::{Path, Query, State};
use axum::Json;

const DEFAULT_LIST_LIMIT: usize = 50;
const MAX_LIST_LIMIT: usize = 500;

fn parse_job_id(raw: &str) -> Result<JobId, ApiError> {
    JobId::parse(raw).map_err(|e| ApiError(CoreError::bad_input(e.to_string())))
}

pub async fn get_job(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Job>> {
    let job_id = parse_job_id(&id)?;
    // The cache is the fast path; the catalog recovers jobs from earlier
    // runs.
    if let Some(job) = state.manager.get_job(&job_id).await {
        return Ok(Json(job));
    }
    let job = state
        .catalog
        .jobs()
        .get(&job_id)
        .await?
        .ok_or_else(|| ApiError(CoreError::not_found(format!("job {id}"))))?;
    Ok(Json(job))
}

pub async fn list_jobs(
    State(state): State<SharedState>,
    Query(query): Query<JobListQuery>,
) -> ApiResult<Json<Vec<Job>>> {
    let limit = query.limit.unwrap_or(DEFAULT_LIST_LIMIT).min(MAX_LIST_LIMIT);
    let offset = query.offset.unwrap_or(0);
    let jobs = state
        .catalog
        .jobs()
        .list(limit as i64, offset as i64, query.status)
        .await?;
    Ok(Json(jobs))
}

pub async fn cancel_job(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Job>> {
    let job_id = parse_job_id(&id)?;
    let job = atelier_jobs::cancel_job(&state.manager, &state.monitor, &state.comfy, &job_id)
        .await?;
    Ok(Json(job))
}
