//! Narrative-state endpoints.

use crate::error::{ApiError, ApiResult};
use crate::state::SharedState;
use atelier_narrative::NarrativeEvent;
use atelier_protocol::{
    CharacterSceneState, CoreError, RegenerationEntry, ResourceId, StatePatch, StateSource,
};
use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;

pub async fn scene_states(
    State(state): State<SharedState>,
    Path(scene_id): Path<String>,
) -> ApiResult<Json<Vec<CharacterSceneState>>> {
    ResourceId::parse(&scene_id)?;
    Ok(Json(state.narrative.get_scene_states(&scene_id).await?))
}

pub async fn get_state(
    State(state): State<SharedState>,
    Path((scene_id, slug)): Path<(String, String)>,
) -> ApiResult<Json<CharacterSceneState>> {
    ResourceId::parse(&scene_id)?;
    let found = state
        .narrative
        .get_state(&scene_id, &slug)
        .await?
        .ok_or_else(|| {
            ApiError(CoreError::not_found(format!(
                "no state for {slug} in scene {scene_id}"
            )))
        })?;
    Ok(Json(found))
}

/// Manual override. The write is sticky: propagation will never replace it.
pub async fn put_state(
    State(state): State<SharedState>,
    Path((scene_id, slug)): Path<(String, String)>,
    Json(patch): Json<StatePatch>,
) -> ApiResult<Json<CharacterSceneState>> {
    ResourceId::parse(&scene_id)?;
    if patch.is_empty() {
        return Err(ApiError(CoreError::bad_input(
            "state patch contains no fields",
        )));
    }
    let written = state
        .narrative
        .set_state(&scene_id, &slug, &patch, StateSource::Manual)
        .await?;
    // A manual edit ripples forward immediately.
    state
        .hooks
        .handle(NarrativeEvent::StateUpdated {
            scene_id: scene_id.clone(),
            source: StateSource::Manual,
        })
        .await?;
    Ok(Json(written))
}

pub async fn delete_state(
    State(state): State<SharedState>,
    Path((scene_id, slug)): Path<(String, String)>,
) -> ApiResult<Json<serde_json::Value>> {
    ResourceId::parse(&scene_id)?;
    let deleted = state.narrative.delete_state(&scene_id, &slug).await?;
    if !deleted {
        return Err(ApiError(CoreError::not_found(format!(
            "no state for {slug} in scene {scene_id}"
        ))));
    }
    Ok(Json(serde_json::json!({ "deleted": true })))
}

#[derive(Serialize)]
pub struct InitializeResponse {
    pub initialized: usize,
    pub states: Vec<CharacterSceneState>,
}

pub async fn initialize_scene(
    State(state): State<SharedState>,
    Path(scene_id): Path<String>,
) -> ApiResult<Json<InitializeResponse>> {
    ResourceId::parse(&scene_id)?;
    let scene = state
        .catalog
        .scenes()
        .get_scene(&scene_id)
        .await?
        .ok_or_else(|| ApiError(CoreError::not_found(format!("scene {scene_id}"))))?;
    let states = state
        .narrative
        .initialize_from_description(&scene_id, &scene.project_id)
        .await?;
    Ok(Json(InitializeResponse {
        initialized: states.len(),
        states,
    }))
}

#[derive(Serialize)]
pub struct PropagateResponse {
    pub propagated: usize,
    pub states: Vec<CharacterSceneState>,
}

pub async fn propagate_scene(
    State(state): State<SharedState>,
    Path(scene_id): Path<String>,
) -> ApiResult<Json<PropagateResponse>> {
    ResourceId::parse(&scene_id)?;
    let scene = state
        .catalog
        .scenes()
        .get_scene(&scene_id)
        .await?
        .ok_or_else(|| ApiError(CoreError::not_found(format!("scene {scene_id}"))))?;
    let states = state
        .narrative
        .propagate_forward(&scene_id, &scene.project_id)
        .await?;
    Ok(Json(PropagateResponse {
        propagated: states.len(),
        states,
    }))
}

pub async fn state_timeline(
    State(state): State<SharedState>,
    Path((project_id, slug)): Path<(String, String)>,
) -> ApiResult<Json<Vec<CharacterSceneState>>> {
    ResourceId::parse(&project_id)?;
    Ok(Json(
        state.narrative.get_state_timeline(&project_id, &slug).await?,
    ))
}

pub async fn regeneration_queue(
    State(state): State<SharedState>,
    Path(project_id): Path<String>,
) -> ApiResult<Json<Vec<RegenerationEntry>>> {
    ResourceId::parse(&project_id)?;
    Ok(Json(
        state
            .catalog
            .narrative()
            .list_regeneration_pending(&project_id)
            .await?,
    ))
}
