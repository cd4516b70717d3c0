//! Event-driven invalidation - the hooks between narrative edits and the
//! regeneration queue.
//!
//! Handlers are idempotent: regeneration inserts collapse on the queue's
//! unique index, so double-delivery of an event never duplicates work.

use crate::engine::NarrativeEngine;
use atelier_catalog::{CatalogStore, NewRegeneration};
use atelier_protocol::{CoreError, CoreResult, StateSource};
use tracing::info;

/// Shot fields whose change invalidates a rendered shot.
const SHOT_CONTENT_FIELDS: &[&str] = &[
    "motion_prompt",
    "characters_present",
    "shot_type",
    "camera_angle",
];

/// Priorities per invalidation source.
const PRIORITY_SCENE_EDIT: i64 = 3;
const PRIORITY_SHOT_EDIT: i64 = 5;
const PRIORITY_EPISODE_EDIT: i64 = 2;

/// Events the narrative engine reacts to.
#[derive(Debug, Clone)]
pub enum NarrativeEvent {
    SceneUpdated {
        scene_id: String,
        changed_fields: Vec<String>,
    },
    ShotUpdated {
        shot_id: String,
        changed_fields: Vec<String>,
    },
    EpisodeUpdated {
        episode_id: String,
    },
    StateUpdated {
        scene_id: String,
        source: StateSource,
    },
}

/// What a hook did, for logging and tests.
#[derive(Debug, Clone, Default)]
pub struct HookOutcome {
    pub propagated_states: usize,
    pub regenerations_enqueued: usize,
}

pub struct NarrativeHooks {
    catalog: CatalogStore,
    engine: NarrativeEngine,
}

impl NarrativeHooks {
    pub fn new(catalog: CatalogStore, engine: NarrativeEngine) -> Self {
        Self { catalog, engine }
    }

    pub async fn handle(&self, event: NarrativeEvent) -> CoreResult<HookOutcome> {
        match event {
            NarrativeEvent::SceneUpdated {
                scene_id,
                changed_fields,
            } => self.on_scene_updated(&scene_id, &changed_fields).await,
            NarrativeEvent::ShotUpdated {
                shot_id,
                changed_fields,
            } => self.on_shot_updated(&shot_id, &changed_fields).await,
            NarrativeEvent::EpisodeUpdated { episode_id } => {
                self.on_episode_updated(&episode_id).await
            }
            NarrativeEvent::StateUpdated { scene_id, source } => {
                self.on_state_updated(&scene_id, source).await
            }
        }
    }

    /// A scene edit re-propagates its states and marks every rendered
    /// downstream shot stale.
    async fn on_scene_updated(
        &self,
        scene_id: &str,
        changed_fields: &[String],
    ) -> CoreResult<HookOutcome> {
        let scene = self
            .catalog
            .scenes()
            .get_scene(scene_id)
            .await?
            .ok_or_else(|| CoreError::not_found(format!("scene {scene_id}")))?;
        let mut outcome = HookOutcome::default();

        let has_states = !self
            .catalog
            .narrative()
            .get_scene_states(scene_id)
            .await?
            .is_empty();
        if has_states {
            outcome.propagated_states = self
                .engine
                .propagate_forward(scene_id, &scene.project_id)
                .await?
                .len();
        }

        let source_field = changed_fields
            .first()
            .cloned()
            .unwrap_or_else(|| "scene".to_string());
        let stale = self
            .catalog
            .scenes()
            .completed_downstream_shots(&scene.project_id, scene.scene_number)
            .await?;
        for shot in &stale {
            let inserted = self
                .catalog
                .narrative()
                .enqueue_regeneration(&NewRegeneration {
                    scene_id: shot.scene_id.clone(),
                    shot_id: Some(shot.shot_id.clone()),
                    reason: "upstream scene edited".to_string(),
                    priority: PRIORITY_SCENE_EDIT,
                    source_scene_id: Some(scene_id.to_string()),
                    source_field: Some(source_field.clone()),
                })
                .await?;
            if inserted {
                outcome.regenerations_enqueued += 1;
            }
        }

        if outcome.regenerations_enqueued > 0 {
            info!(
                "Scene {} edit queued {} downstream shots for regeneration",
                scene_id, outcome.regenerations_enqueued
            );
        }
        Ok(outcome)
    }

    /// A shot edit matters only when content-bearing fields changed and the
    /// shot already rendered.
    async fn on_shot_updated(
        &self,
        shot_id: &str,
        changed_fields: &[String],
    ) -> CoreResult<HookOutcome> {
        let mut content_changed: Vec<&str> = changed_fields
            .iter()
            .map(String::as_str)
            .filter(|f| SHOT_CONTENT_FIELDS.contains(f))
            .collect();
        if content_changed.is_empty() {
            return Ok(HookOutcome::default());
        }
        content_changed.sort_unstable();

        let Some(shot) = self.catalog.scenes().get_shot(shot_id).await? else {
            return Err(CoreError::not_found(format!("shot {shot_id}")));
        };
        if shot.output_video_path.is_none() {
            return Ok(HookOutcome::default());
        }

        let inserted = self
            .catalog
            .narrative()
            .enqueue_regeneration(&NewRegeneration {
                scene_id: shot.scene_id.clone(),
                shot_id: Some(shot.id.clone()),
                reason: format!("Shot content changed: {}", content_changed.join(", ")),
                priority: PRIORITY_SHOT_EDIT,
                source_scene_id: None,
                source_field: Some(content_changed.join(",")),
            })
            .await?;

        Ok(HookOutcome {
            propagated_states: 0,
            regenerations_enqueued: usize::from(inserted),
        })
    }

    /// Restructuring an episode invalidates its already-rendered scenes.
    async fn on_episode_updated(&self, episode_id: &str) -> CoreResult<HookOutcome> {
        let scenes = self.catalog.scenes().episode_scenes(episode_id).await?;
        let mut outcome = HookOutcome::default();
        for scene in scenes
            .iter()
            .filter(|s| s.generation_status.as_deref() == Some("completed"))
        {
            let inserted = self
                .catalog
                .narrative()
                .enqueue_regeneration(&NewRegeneration {
                    scene_id: scene.id.clone(),
                    shot_id: None,
                    reason: "episode restructured".to_string(),
                    priority: PRIORITY_EPISODE_EDIT,
                    source_scene_id: None,
                    source_field: Some(format!("episode_{episode_id}")),
                })
                .await?;
            if inserted {
                outcome.regenerations_enqueued += 1;
            }
        }
        Ok(outcome)
    }

    /// Manual overrides ripple forward immediately.
    async fn on_state_updated(
        &self,
        scene_id: &str,
        source: StateSource,
    ) -> CoreResult<HookOutcome> {
        if source != StateSource::Manual {
            return Ok(HookOutcome::default());
        }
        let scene = self
            .catalog
            .scenes()
            .get_scene(scene_id)
            .await?
            .ok_or_else(|| CoreError::not_found(format!("scene {scene_id}")))?;
        let propagated = self
            .engine
            .propagate_forward(scene_id, &scene.project_id)
            .await?;
        Ok(HookOutcome {
            propagated_states: propagated.len(),
            regenerations_enqueued: 0,
        })
    }
}
