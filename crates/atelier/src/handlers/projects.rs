//! Project endpoints.

use crate::error::{ApiError, ApiResult};
use crate::state::SharedState;
use atelier_catalog::{ProjectStats, ProjectUpsert};
use atelier_protocol::http::CreateProjectRequest;
use atelier_protocol::{CoreError, Project, ResourceId};
use axum::extract::{Path, State};
use axum::Json;

pub async fn create_project(
    State(state): State<SharedState>,
    Json(request): Json<CreateProjectRequest>,
) -> ApiResult<Json<Project>> {
    if let Some(id) = &request.id {
        ResourceId::parse(id)?;
    }
    let project = state
        .catalog
        .projects()
        .upsert(ProjectUpsert {
            id: request.id,
            name: request.name,
            description: request.description,
            default_style: request.default_style,
        })
        .await?;
    Ok(Json(project))
}

pub async fn list_projects(State(state): State<SharedState>) -> ApiResult<Json<Vec<Project>>> {
    Ok(Json(state.catalog.projects().list().await?))
}

pub async fn get_project(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Project>> {
    ResourceId::parse(&id)?;
    let project = state
        .catalog
        .projects()
        .get(&id)
        .await?
        .ok_or_else(|| ApiError(CoreError::not_found(format!("project {id}"))))?;
    Ok(Json(project))
}

pub async fn project_stats(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<Json<ProjectStats>> {
    ResourceId::parse(&id)?;
    state
        .catalog
        .projects()
        .get(&id)
        .await?
        .ok_or_else(|| ApiError(CoreError::not_found(format!("project {id}"))))?;
    Ok(Json(state.catalog.quality().get_project_stats(&id).await?))
}
