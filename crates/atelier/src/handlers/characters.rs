//! Character endpoints - creation, bible, merge-patch, detail.

use crate::error::{ApiError, ApiResult};
use crate::state::SharedState;
use atelier_catalog::CharacterUpsert;
use atelier_protocol::http::{CharacterPatch, CreateCharacterRequest};
use atelier_protocol::{Character, CoreError, ResourceId};
use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;

pub async fn create_character(
    State(state): State<SharedState>,
    Json(request): Json<CreateCharacterRequest>,
) -> ApiResult<Json<Character>> {
    ResourceId::parse(&request.project_id)?;
    state
        .catalog
        .projects()
        .get(&request.project_id)
        .await?
        .ok_or_else(|| {
            ApiError(CoreError::not_found(format!(
                "project {}",
                request.project_id
            )))
        })?;

    let character = state
        .catalog
        .characters()
        .upsert(CharacterUpsert {
            project_id: request.project_id,
            name: request.name,
            description: request.description,
            design_prompt: request.design_prompt,
            appearance: request.appearance.unwrap_or_default(),
            personality: request.personality,
            personality_tags: request.personality_tags.unwrap_or_default(),
            background: request.background,
            role: request.role,
            relationships: request.relationships.unwrap_or_default(),
            voice_profile: request.voice_profile.unwrap_or_default(),
            lora_path: request.lora_path,
            lora_trigger: request.lora_trigger,
        })
        .await?;
    Ok(Json(character))
}

pub async fn get_character(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Character>> {
    let character = state
        .catalog
        .characters()
        .get_by_id(&id)
        .await?
        .ok_or_else(|| ApiError(CoreError::not_found(format!("character {id}"))))?;
    Ok(Json(character))
}

/// The full creative reference for one character: the record plus its
/// narrative timeline.
#[derive(Serialize)]
pub struct CharacterBible {
    pub character: Character,
    pub scene_states: Vec<atelier_protocol::CharacterSceneState>,
}

pub async fn character_bible(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<Json<CharacterBible>> {
    let character = state
        .catalog
        .characters()
        .get_by_id(&id)
        .await?
        .ok_or_else(|| ApiError(CoreError::not_found(format!("character {id}"))))?;
    let scene_states = state
        .catalog
        .narrative()
        .get_state_timeline(&character.project_id, &character.slug)
        .await?;
    Ok(Json(CharacterBible {
        character,
        scene_states,
    }))
}

pub async fn patch_character(
    State(state): State<SharedState>,
    Path(slug): Path<String>,
    Json(patch): Json<CharacterPatch>,
) -> ApiResult<Json<Character>> {
    let character = state.catalog.characters().patch(&slug, &patch).await?;
    Ok(Json(character))
}

pub async fn character_detail(
    State(state): State<SharedState>,
    Path(slug): Path<String>,
) -> ApiResult<Json<Character>> {
    let character = state
        .catalog
        .characters()
        .find_by_slug(&slug)
        .await?
        .ok_or_else(|| ApiError(CoreError::not_found(format!("character {slug}"))))?;
    Ok(Json(character))
}
