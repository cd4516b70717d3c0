//! Narrative state engine - CRUD, AI initialization, forward propagation.

use crate::decay::apply_decay;
use atelier_catalog::CatalogStore;
use atelier_echo::{extract_json, EchoClient, EchoQuery};
use atelier_protocol::{
    CharacterSceneState, CoreError, CoreResult, StatePatch, StateSource,
};
use std::time::Duration;
use tracing::{info, warn};

/// Wall-clock bound for the narrative LLM call.
pub const NARRATIVE_LLM_TIMEOUT: Duration = Duration::from_secs(120);

pub struct NarrativeEngine {
    catalog: CatalogStore,
    echo: Option<EchoClient>,
}

impl NarrativeEngine {
    pub fn new(catalog: CatalogStore, echo: Option<EchoClient>) -> Self {
        Self { catalog, echo }
    }

    // ------------------------------------------------------------------
    // CRUD
    // ------------------------------------------------------------------

    pub async fn get_state(
        &self,
        scene_id: &str,
        slug: &str,
    ) -> CoreResult<Option<CharacterSceneState>> {
        Ok(self.catalog.narrative().get_state(scene_id, slug).await?)
    }

    pub async fn get_scene_states(
        &self,
        scene_id: &str,
    ) -> CoreResult<Vec<CharacterSceneState>> {
        Ok(self.catalog.narrative().get_scene_states(scene_id).await?)
    }

    /// Merge-on-update write. Unset patch fields keep stored values; every
    /// write bumps the version; the source is stored verbatim.
    pub async fn set_state(
        &self,
        scene_id: &str,
        slug: &str,
        patch: &StatePatch,
        source: StateSource,
    ) -> CoreResult<CharacterSceneState> {
        Ok(self
            .catalog
            .narrative()
            .upsert_state(scene_id, slug, patch, source)
            .await?)
    }

    pub async fn delete_state(&self, scene_id: &str, slug: &str) -> CoreResult<bool> {
        Ok(self.catalog.narrative().delete_state(scene_id, slug).await?)
    }

    pub async fn get_state_timeline(
        &self,
        project_id: &str,
        slug: &str,
    ) -> CoreResult<Vec<CharacterSceneState>> {
        Ok(self
            .catalog
            .narrative()
            .get_state_timeline(project_id, slug)
            .await?)
    }

    // ------------------------------------------------------------------
    // AI initialization
    // ------------------------------------------------------------------

    /// Seed states for every character appearing in the scene's shots. The
    /// LLM gets the scene text plus each character's design prompt; its
    /// answer is a JSON array of per-character state objects. When it
    /// cannot be reached or parsed, characters get neutral defaults.
    pub async fn initialize_from_description(
        &self,
        scene_id: &str,
        project_id: &str,
    ) -> CoreResult<Vec<CharacterSceneState>> {
        let scene = self
            .catalog
            .scenes()
            .get_scene(scene_id)
            .await?
            .ok_or_else(|| CoreError::not_found(format!("scene {scene_id}")))?;

        let mut slugs: Vec<String> = Vec::new();
        for shot in self.catalog.scenes().list_shots(scene_id).await? {
            for slug in shot.characters_present {
                if !slugs.contains(&slug) {
                    slugs.push(slug);
                }
            }
        }
        if slugs.is_empty() {
            return Ok(Vec::new());
        }

        let mut design_lines = Vec::new();
        for slug in &slugs {
            if let Some(character) = self
                .catalog
                .characters()
                .get_by_slug(project_id, slug)
                .await?
            {
                design_lines.push(format!(
                    "- {} ({}): {}",
                    character.name,
                    slug,
                    character.design_prompt.as_deref().unwrap_or("no design prompt")
                ));
            } else {
                design_lines.push(format!("- {slug}: unknown character"));
            }
        }

        let patches = self
            .ask_for_initial_states(&scene.description, &scene.location, &scene.mood, &design_lines, &slugs)
            .await;

        let mut states = Vec::new();
        for slug in &slugs {
            let patch = patches
                .iter()
                .find(|(s, _)| s == slug)
                .map(|(_, p)| p.clone())
                .unwrap_or_default();
            let state = self
                .catalog
                .narrative()
                .upsert_state(scene_id, slug, &patch, StateSource::AiInitialized)
                .await?;
            states.push(state);
        }
        info!(
            "Initialized {} character states for scene {}",
            states.len(),
            scene_id
        );
        Ok(states)
    }

    async fn ask_for_initial_states(
        &self,
        description: &Option<String>,
        location: &Option<String>,
        mood: &Option<String>,
        design_lines: &[String],
        slugs: &[String],
    ) -> Vec<(String, StatePatch)> {
        let Some(echo) = &self.echo else {
            return Vec::new();
        };

        let query = EchoQuery::new(
            format!(
                "Given this scene, describe each character's physical state.\n\
                 Scene: {}\nLocation: {}\nMood: {}\nCharacters:\n{}\n\n\
                 Answer with a JSON array; one object per character with keys \
                 character_slug, clothing, hair_state, body_state (clean|wet|damp|\
                 bloody|stained|dirty|dusty|sweaty), emotional_state, energy_level \
                 (normal|tired|exhausted|energized|hyperactive), location_in_scene, \
                 carrying (array).",
                description.as_deref().unwrap_or("(none)"),
                location.as_deref().unwrap_or("(none)"),
                mood.as_deref().unwrap_or("(none)"),
                design_lines.join("\n"),
            ),
            "narrative-init",
        );

        let response = match echo.query(&query, NARRATIVE_LLM_TIMEOUT).await {
            Ok(response) => response,
            Err(e) => {
                warn!("Narrative initialization LLM call failed: {}", e);
                return Vec::new();
            }
        };
        let Some(value) = extract_json(&response.response) else {
            warn!("Narrative initialization answer had no JSON");
            return Vec::new();
        };
        let Some(items) = value.as_array() else {
            return Vec::new();
        };

        let mut patches = Vec::new();
        for item in items {
            let Some(slug) = item
                .get("character_slug")
                .or_else(|| item.get("slug"))
                .and_then(|v| v.as_str())
            else {
                continue;
            };
            if !slugs.iter().any(|s| s == slug) {
                continue;
            }
            match serde_json::from_value::<StatePatch>(strip_slug(item.clone())) {
                Ok(patch) => patches.push((slug.to_string(), patch)),
                Err(e) => warn!("State object for {} did not parse: {}", slug, e),
            }
        }
        patches
    }

    // ------------------------------------------------------------------
    // Forward propagation
    // ------------------------------------------------------------------

    /// Carry every character's state from the source scene through all
    /// later scenes of the project.
    ///
    /// Walking downstream in scene order with a rolling state: a scene
    /// holding a manual row is never overwritten - its explicit fields fold
    /// into the rolling state and no decay step is consumed there. Every
    /// other scene receives one decay step and a `propagated` write.
    /// Re-running from the same source is idempotent apart from version
    /// bumps on the touched non-manual rows.
    pub async fn propagate_forward(
        &self,
        source_scene_id: &str,
        project_id: &str,
    ) -> CoreResult<Vec<CharacterSceneState>> {
        let source_scene = self
            .catalog
            .scenes()
            .get_scene(source_scene_id)
            .await?
            .ok_or_else(|| CoreError::not_found(format!("scene {source_scene_id}")))?;
        let source_states = self
            .catalog
            .narrative()
            .get_scene_states(source_scene_id)
            .await?;
        if source_states.is_empty() {
            return Ok(Vec::new());
        }

        let downstream = self
            .catalog
            .scenes()
            .scenes_after(project_id, source_scene.scene_number)
            .await?;

        let mut written = Vec::new();
        for source_state in &source_states {
            let slug = &source_state.character_slug;
            let mut rolling = source_state.clone();

            for scene in &downstream {
                let existing = self.catalog.narrative().get_state(&scene.id, slug).await?;
                if let Some(existing) = existing {
                    if existing.state_source == StateSource::Manual {
                        // Manual rows stay untouched; their explicit fields
                        // become part of the rolling state.
                        explicit_fields(&existing).apply_to(&mut rolling);
                        continue;
                    }
                }

                rolling = apply_decay(&rolling);
                let state = self
                    .catalog
                    .narrative()
                    .upsert_state(
                        &scene.id,
                        slug,
                        &StatePatch::from_state(&rolling),
                        StateSource::Propagated,
                    )
                    .await?;
                written.push(state);
            }
        }

        info!(
            "Propagated {} states forward from scene {}",
            written.len(),
            source_scene_id
        );
        Ok(written)
    }
}

/// The fields of a stored row that were explicitly set - everything that
/// differs from a fresh default state. (The store cannot distinguish "set
/// to the default" from "never set"; defaults do not override the rolling
/// state.)
fn explicit_fields(state: &CharacterSceneState) -> StatePatch {
    let defaults = CharacterSceneState::new("", "");
    StatePatch {
        clothing: state.clothing.clone(),
        hair_state: state.hair_state.clone(),
        injuries: (!state.injuries.is_empty()).then(|| state.injuries.clone()),
        accessories: (!state.accessories.is_empty()).then(|| state.accessories.clone()),
        body_state: (state.body_state != defaults.body_state).then_some(state.body_state),
        emotional_state: (state.emotional_state != defaults.emotional_state)
            .then(|| state.emotional_state.clone()),
        energy_level: (state.energy_level != defaults.energy_level).then_some(state.energy_level),
        relationship_context: (!state.relationship_context.is_empty())
            .then(|| state.relationship_context.clone()),
        location_in_scene: state.location_in_scene.clone(),
        carrying: (!state.carrying.is_empty()).then(|| state.carrying.clone()),
    }
}

fn strip_slug(mut value: serde_json::Value) -> serde_json::Value {
    if let Some(object) = value.as_object_mut() {
        object.remove("character_slug");
        object.remove("slug");
    }
    value
}
