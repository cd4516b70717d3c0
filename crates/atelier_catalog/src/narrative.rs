//! Character scene-state rows and the regeneration queue.
//!
//! Writes are merge-on-update: unset patch fields keep the stored value,
//! every write bumps `version`, and the provenance (`state_source`) is
//! stored verbatim. Whether a manual row may be replaced is the engine's
//! decision, not the store's.

use crate::error::{CatalogError, Result};
use atelier_protocol::{
    BodyState, CharacterSceneState, EnergyLevel, Injury, RegenerationEntry, RegenerationStatus,
    StatePatch, StateSource,
};
use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqlitePool};
use std::collections::HashMap;
use std::str::FromStr;

#[derive(Debug, Clone, FromRow)]
struct StateRow {
    scene_id: String,
    character_slug: String,
    clothing: Option<String>,
    hair_state: Option<String>,
    injuries: String,
    accessories: String,
    body_state: String,
    emotional_state: String,
    energy_level: String,
    relationship_context: String,
    location_in_scene: Option<String>,
    carrying: String,
    state_source: String,
    version: i64,
    updated_at: DateTime<Utc>,
}

impl StateRow {
    fn into_state(self) -> Result<CharacterSceneState> {
        let injuries: Vec<Injury> = serde_json::from_str(&self.injuries)?;
        let accessories: Vec<String> = serde_json::from_str(&self.accessories)?;
        let relationship_context: HashMap<String, String> =
            serde_json::from_str(&self.relationship_context)?;
        let carrying: Vec<String> = serde_json::from_str(&self.carrying)?;
        let body_state = serde_json::from_value(serde_json::Value::String(self.body_state))?;
        let energy_level = serde_json::from_value(serde_json::Value::String(self.energy_level))?;
        let state_source = StateSource::from_str(&self.state_source)
            .map_err(CatalogError::bad_input)?;
        Ok(CharacterSceneState {
            scene_id: self.scene_id,
            character_slug: self.character_slug,
            clothing: self.clothing,
            hair_state: self.hair_state,
            injuries,
            accessories,
            body_state,
            emotional_state: self.emotional_state,
            energy_level,
            relationship_context,
            location_in_scene: self.location_in_scene,
            carrying,
            state_source,
            version: self.version,
            updated_at: self.updated_at,
        })
    }
}

/// A regeneration-queue insert. `ON CONFLICT DO NOTHING` makes
/// double-delivery of the same event a no-op.
#[derive(Debug, Clone)]
pub struct NewRegeneration {
    pub scene_id: String,
    pub shot_id: Option<String>,
    pub reason: String,
    pub priority: i64,
    pub source_scene_id: Option<String>,
    pub source_field: Option<String>,
}

#[derive(Debug, Clone, FromRow)]
struct RegenerationRow {
    id: i64,
    scene_id: String,
    shot_id: Option<String>,
    reason: String,
    priority: i64,
    source_scene_id: Option<String>,
    source_field: Option<String>,
    status: String,
    created_at: DateTime<Utc>,
    processed_at: Option<DateTime<Utc>>,
}

impl From<RegenerationRow> for RegenerationEntry {
    fn from(row: RegenerationRow) -> Self {
        let status = match row.status.as_str() {
            "processed" => RegenerationStatus::Processed,
            _ => RegenerationStatus::Pending,
        };
        RegenerationEntry {
            id: row.id,
            scene_id: row.scene_id,
            shot_id: row.shot_id,
            reason: row.reason,
            priority: row.priority,
            source_scene_id: row.source_scene_id,
            source_field: row.source_field,
            status,
            created_at: row.created_at,
            processed_at: row.processed_at,
        }
    }
}

pub struct NarrativeStore {
    pool: SqlitePool,
}

impl NarrativeStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get_state(
        &self,
        scene_id: &str,
        slug: &str,
    ) -> Result<Option<CharacterSceneState>> {
        let row: Option<StateRow> = sqlx::query_as(
            "SELECT * FROM character_scene_state WHERE scene_id = ? AND character_slug = ?",
        )
        .bind(scene_id)
        .bind(slug)
        .fetch_optional(&self.pool)
        .await?;
        row.map(StateRow::into_state).transpose()
    }

    pub async fn get_scene_states(&self, scene_id: &str) -> Result<Vec<CharacterSceneState>> {
        let rows: Vec<StateRow> = sqlx::query_as(
            "SELECT * FROM character_scene_state WHERE scene_id = ? ORDER BY character_slug ASC",
        )
        .bind(scene_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(StateRow::into_state).collect()
    }

    /// Merge a patch into the row for `(scene_id, slug)`, creating it if
    /// absent. Returns the stored state after the write.
    pub async fn upsert_state(
        &self,
        scene_id: &str,
        slug: &str,
        patch: &StatePatch,
        source: StateSource,
    ) -> Result<CharacterSceneState> {
        let mut state = match self.get_state(scene_id, slug).await? {
            Some(existing) => {
                let mut merged = existing;
                patch.apply_to(&mut merged);
                merged.version += 1;
                merged
            }
            None => {
                let mut fresh = CharacterSceneState::new(scene_id, slug);
                patch.apply_to(&mut fresh);
                fresh
            }
        };
        state.state_source = source;
        state.updated_at = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO character_scene_state
                (scene_id, character_slug, clothing, hair_state, injuries, accessories,
                 body_state, emotional_state, energy_level, relationship_context,
                 location_in_scene, carrying, state_source, version, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(scene_id, character_slug) DO UPDATE SET
                clothing = excluded.clothing,
                hair_state = excluded.hair_state,
                injuries = excluded.injuries,
                accessories = excluded.accessories,
                body_state = excluded.body_state,
                emotional_state = excluded.emotional_state,
                energy_level = excluded.energy_level,
                relationship_context = excluded.relationship_context,
                location_in_scene = excluded.location_in_scene,
                carrying = excluded.carrying,
                state_source = excluded.state_source,
                version = excluded.version,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&state.scene_id)
        .bind(&state.character_slug)
        .bind(&state.clothing)
        .bind(&state.hair_state)
        .bind(serde_json::to_string(&state.injuries)?)
        .bind(serde_json::to_string(&state.accessories)?)
        .bind(state.body_state.as_str())
        .bind(&state.emotional_state)
        .bind(state.energy_level.as_str())
        .bind(serde_json::to_string(&state.relationship_context)?)
        .bind(&state.location_in_scene)
        .bind(serde_json::to_string(&state.carrying)?)
        .bind(state.state_source.as_str())
        .bind(state.version)
        .bind(state.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(state)
    }

    pub async fn delete_state(&self, scene_id: &str, slug: &str) -> Result<bool> {
        let affected = sqlx::query(
            "DELETE FROM character_scene_state WHERE scene_id = ? AND character_slug = ?",
        )
        .bind(scene_id)
        .bind(slug)
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(affected > 0)
    }

    /// All states of one character across a project, in scene order.
    pub async fn get_state_timeline(
        &self,
        project_id: &str,
        slug: &str,
    ) -> Result<Vec<CharacterSceneState>> {
        let rows: Vec<StateRow> = sqlx::query_as(
            r#"
            SELECT css.* FROM character_scene_state css
            JOIN scenes s ON s.id = css.scene_id
            WHERE s.project_id = ? AND css.character_slug = ?
            ORDER BY s.scene_number ASC
            "#,
        )
        .bind(project_id)
        .bind(slug)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(StateRow::into_state).collect()
    }

    // ------------------------------------------------------------------
    // Regeneration queue
    // ------------------------------------------------------------------

    /// Enqueue a downstream invalidation. Returns `false` when an identical
    /// entry already exists.
    pub async fn enqueue_regeneration(&self, entry: &NewRegeneration) -> Result<bool> {
        let affected = sqlx::query(
            r#"
            INSERT INTO regeneration_queue
                (scene_id, shot_id, reason, priority, source_scene_id, source_field,
                 status, created_at)
            VALUES (?, ?, ?, ?, ?, ?, 'pending', ?)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(&entry.scene_id)
        .bind(&entry.shot_id)
        .bind(&entry.reason)
        .bind(entry.priority)
        .bind(&entry.source_scene_id)
        .bind(&entry.source_field)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(affected > 0)
    }

    /// Pending entries for a project, most urgent first.
    pub async fn list_regeneration_pending(
        &self,
        project_id: &str,
    ) -> Result<Vec<RegenerationEntry>> {
        let rows: Vec<RegenerationRow> = sqlx::query_as(
            r#"
            SELECT rq.* FROM regeneration_queue rq
            JOIN scenes s ON s.id = rq.scene_id
            WHERE s.project_id = ? AND rq.status = 'pending'
            ORDER BY rq.priority DESC, rq.created_at ASC
            "#,
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(RegenerationEntry::from).collect())
    }

    pub async fn mark_regeneration_processed(&self, id: i64) -> Result<bool> {
        let affected = sqlx::query(
            r#"
            UPDATE regeneration_queue
            SET status = 'processed', processed_at = ?
            WHERE id = ? AND status = 'pending'
            "#,
        )
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(affected > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CatalogStore, ProjectUpsert};
    use atelier_protocol::Scene;

    async fn store_with_scene() -> CatalogStore {
        let store = CatalogStore::memory().await.unwrap();
        store
            .projects()
            .upsert(ProjectUpsert {
                id: Some("p1".to_string()),
                name: "P1".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        store
            .scenes()
            .upsert_scene(&Scene {
                id: "s1".to_string(),
                project_id: "p1".to_string(),
                scene_number: 1,
                title: None,
                description: None,
                location: None,
                mood: None,
                time_of_day: None,
                weather: None,
                narrative_text: None,
                generation_status: None,
                output_video_path: None,
                dialogue_audio_path: None,
            })
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_upsert_merges_and_bumps_version() {
        let store = store_with_scene().await;
        let narrative = store.narrative();

        let first = narrative
            .upsert_state(
                "s1",
                "hero",
                &StatePatch {
                    emotional_state: Some("furious".to_string()),
                    body_state: Some(BodyState::Wet),
                    ..Default::default()
                },
                StateSource::Manual,
            )
            .await
            .unwrap();
        assert_eq!(first.version, 1);

        let second = narrative
            .upsert_state(
                "s1",
                "hero",
                &StatePatch {
                    clothing: Some("torn cloak".to_string()),
                    ..Default::default()
                },
                StateSource::Manual,
            )
            .await
            .unwrap();
        assert_eq!(second.version, 2);
        // Merge keeps previously set fields.
        assert_eq!(second.emotional_state, "furious");
        assert_eq!(second.body_state, BodyState::Wet);
        assert_eq!(second.clothing.as_deref(), Some("torn cloak"));
    }

    #[tokio::test]
    async fn test_set_then_get_roundtrip() {
        let store = store_with_scene().await;
        let narrative = store.narrative();
        narrative
            .upsert_state(
                "s1",
                "hero",
                &StatePatch {
                    energy_level: Some(EnergyLevel::Exhausted),
                    carrying: Some(vec!["lantern".to_string()]),
                    ..Default::default()
                },
                StateSource::AiInitialized,
            )
            .await
            .unwrap();

        let loaded = narrative.get_state("s1", "hero").await.unwrap().unwrap();
        assert_eq!(loaded.energy_level, EnergyLevel::Exhausted);
        assert_eq!(loaded.carrying, vec!["lantern"]);
        assert_eq!(loaded.state_source, StateSource::AiInitialized);
    }

    #[tokio::test]
    async fn test_regeneration_dedup() {
        let store = store_with_scene().await;
        let narrative = store.narrative();

        let entry = NewRegeneration {
            scene_id: "s1".to_string(),
            shot_id: None,
            reason: "upstream scene edited".to_string(),
            priority: 3,
            source_scene_id: Some("s0".to_string()),
            source_field: Some("description".to_string()),
        };
        assert!(narrative.enqueue_regeneration(&entry).await.unwrap());
        // Second delivery of the same event inserts nothing.
        assert!(!narrative.enqueue_regeneration(&entry).await.unwrap());

        let pending = narrative.list_regeneration_pending("p1").await.unwrap();
        assert_eq!(pending.len(), 1);

        assert!(narrative
            .mark_regeneration_processed(pending[0].id)
            .await
            .unwrap());
        assert!(narrative
            .list_regeneration_pending("p1")
            .await
            .unwrap()
            .is_empty());
    }
}
