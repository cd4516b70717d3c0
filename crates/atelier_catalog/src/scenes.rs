//! Scene, shot, and episode persistence.

use crate::error::{CatalogError, Result};
use atelier_protocol::{Episode, EpisodeScene, Scene, Shot};
use sqlx::{FromRow, SqlitePool};
use uuid::Uuid;

#[derive(Debug, Clone, FromRow)]
struct SceneRow {
    id: String,
    project_id: String,
    scene_number: i64,
    title: Option<String>,
    description: Option<String>,
    location: Option<String>,
    mood: Option<String>,
    time_of_day: Option<String>,
    weather: Option<String>,
    narrative_text: Option<String>,
    generation_status: Option<String>,
    output_video_path: Option<String>,
    dialogue_audio_path: Option<String>,
}

impl From<SceneRow> for Scene {
    fn from(row: SceneRow) -> Self {
        Scene {
            id: row.id,
            project_id: row.project_id,
            scene_number: row.scene_number,
            title: row.title,
            description: row.description,
            location: row.location,
            mood: row.mood,
            time_of_day: row.time_of_day,
            weather: row.weather,
            narrative_text: row.narrative_text,
            generation_status: row.generation_status,
            output_video_path: row.output_video_path,
            dialogue_audio_path: row.dialogue_audio_path,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
struct ShotRow {
    id: String,
    scene_id: String,
    shot_number: i64,
    shot_type: Option<String>,
    camera_angle: Option<String>,
    motion_prompt: Option<String>,
    characters_present: String,
    dialogue_text: Option<String>,
    dialogue_character: Option<String>,
    status: Option<String>,
    output_video_path: Option<String>,
}

impl ShotRow {
    fn into_shot(self) -> Result<Shot> {
        let characters_present: Vec<String> = serde_json::from_str(&self.characters_present)?;
        Ok(Shot {
            id: self.id,
            scene_id: self.scene_id,
            shot_number: self.shot_number,
            shot_type: self.shot_type,
            camera_angle: self.camera_angle,
            motion_prompt: self.motion_prompt,
            characters_present,
            dialogue_text: self.dialogue_text,
            dialogue_character: self.dialogue_character,
            status: self.status,
            output_video_path: self.output_video_path,
        })
    }
}

/// Reference to a completed shot downstream of an edited scene.
#[derive(Debug, Clone, FromRow)]
pub struct CompletedShotRef {
    pub scene_id: String,
    pub shot_id: String,
}

pub struct SceneStore {
    pool: SqlitePool,
}

impl SceneStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn upsert_scene(&self, scene: &Scene) -> Result<Scene> {
        let id = if scene.id.is_empty() {
            Uuid::new_v4().to_string()
        } else {
            scene.id.clone()
        };
        sqlx::query(
            r#"
            INSERT INTO scenes
                (id, project_id, scene_number, title, description, location, mood,
                 time_of_day, weather, narrative_text, generation_status,
                 output_video_path, dialogue_audio_path)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                scene_number = excluded.scene_number,
                title = excluded.title,
                description = excluded.description,
                location = excluded.location,
                mood = excluded.mood,
                time_of_day = excluded.time_of_day,
                weather = excluded.weather,
                narrative_text = excluded.narrative_text,
                generation_status = excluded.generation_status,
                output_video_path = excluded.output_video_path,
                dialogue_audio_path = excluded.dialogue_audio_path
            "#,
        )
        .bind(&id)
        .bind(&scene.project_id)
        .bind(scene.scene_number)
        .bind(&scene.title)
        .bind(&scene.description)
        .bind(&scene.location)
        .bind(&scene.mood)
        .bind(&scene.time_of_day)
        .bind(&scene.weather)
        .bind(&scene.narrative_text)
        .bind(&scene.generation_status)
        .bind(&scene.output_video_path)
        .bind(&scene.dialogue_audio_path)
        .execute(&self.pool)
        .await?;

        self.get_scene(&id)
            .await?
            .ok_or_else(|| CatalogError::not_found(format!("scene {id} missing after upsert")))
    }

    pub async fn get_scene(&self, id: &str) -> Result<Option<Scene>> {
        let row: Option<SceneRow> = sqlx::query_as("SELECT * FROM scenes WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Scene::from))
    }

    /// All scenes of a project in narrative order.
    pub async fn list_scenes(&self, project_id: &str) -> Result<Vec<Scene>> {
        let rows: Vec<SceneRow> = sqlx::query_as(
            "SELECT * FROM scenes WHERE project_id = ? ORDER BY scene_number ASC",
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Scene::from).collect())
    }

    /// Scenes strictly after the given scene number, in order. This is the
    /// propagation walk.
    pub async fn scenes_after(&self, project_id: &str, scene_number: i64) -> Result<Vec<Scene>> {
        let rows: Vec<SceneRow> = sqlx::query_as(
            r#"
            SELECT * FROM scenes
            WHERE project_id = ? AND scene_number > ?
            ORDER BY scene_number ASC
            "#,
        )
        .bind(project_id)
        .bind(scene_number)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Scene::from).collect())
    }

    pub async fn delete_scene(&self, id: &str) -> Result<bool> {
        let affected = sqlx::query("DELETE FROM scenes WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(affected > 0)
    }

    // ------------------------------------------------------------------
    // Shots
    // ------------------------------------------------------------------

    pub async fn upsert_shot(&self, shot: &Shot) -> Result<Shot> {
        let id = if shot.id.is_empty() {
            Uuid::new_v4().to_string()
        } else {
            shot.id.clone()
        };
        sqlx::query(
            r#"
            INSERT INTO shots
                (id, scene_id, shot_number, shot_type, camera_angle, motion_prompt,
                 characters_present, dialogue_text, dialogue_character, status,
                 output_video_path)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                shot_number = excluded.shot_number,
                shot_type = excluded.shot_type,
                camera_angle = excluded.camera_angle,
                motion_prompt = excluded.motion_prompt,
                characters_present = excluded.characters_present,
                dialogue_text = excluded.dialogue_text,
                dialogue_character = excluded.dialogue_character,
                status = excluded.status,
                output_video_path = excluded.output_video_path
            "#,
        )
        .bind(&id)
        .bind(&shot.scene_id)
        .bind(shot.shot_number)
        .bind(&shot.shot_type)
        .bind(&shot.camera_angle)
        .bind(&shot.motion_prompt)
        .bind(serde_json::to_string(&shot.characters_present)?)
        .bind(&shot.dialogue_text)
        .bind(&shot.dialogue_character)
        .bind(&shot.status)
        .bind(&shot.output_video_path)
        .execute(&self.pool)
        .await?;

        self.get_shot(&id)
            .await?
            .ok_or_else(|| CatalogError::not_found(format!("shot {id} missing after upsert")))
    }

    pub async fn get_shot(&self, id: &str) -> Result<Option<Shot>> {
        let row: Option<ShotRow> = sqlx::query_as("SELECT * FROM shots WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(ShotRow::into_shot).transpose()
    }

    pub async fn list_shots(&self, scene_id: &str) -> Result<Vec<Shot>> {
        let rows: Vec<ShotRow> =
            sqlx::query_as("SELECT * FROM shots WHERE scene_id = ? ORDER BY shot_number ASC")
                .bind(scene_id)
                .fetch_all(&self.pool)
                .await?;
        rows.into_iter().map(ShotRow::into_shot).collect()
    }

    /// Downstream shots that already rendered and would go stale if an
    /// upstream scene changed: status completed/accepted_best with an output
    /// video, in scenes after `scene_number`.
    pub async fn completed_downstream_shots(
        &self,
        project_id: &str,
        scene_number: i64,
    ) -> Result<Vec<CompletedShotRef>> {
        let rows: Vec<CompletedShotRef> = sqlx::query_as(
            r#"
            SELECT s.id AS scene_id, sh.id AS shot_id
            FROM scenes s
            JOIN shots sh ON sh.scene_id = s.id
            WHERE s.project_id = ?
              AND s.scene_number > ?
              AND sh.status IN ('completed', 'accepted_best')
              AND sh.output_video_path IS NOT NULL
            ORDER BY s.scene_number ASC, sh.shot_number ASC
            "#,
        )
        .bind(project_id)
        .bind(scene_number)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    // ------------------------------------------------------------------
    // Episodes
    // ------------------------------------------------------------------

    pub async fn upsert_episode(&self, episode: &Episode) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO episodes (id, project_id, title, description)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                description = excluded.description
            "#,
        )
        .bind(&episode.id)
        .bind(&episode.project_id)
        .bind(&episode.title)
        .bind(&episode.description)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_episode(&self, id: &str) -> Result<Option<Episode>> {
        #[derive(FromRow)]
        struct EpisodeRow {
            id: String,
            project_id: String,
            title: String,
            description: Option<String>,
        }
        let row: Option<EpisodeRow> = sqlx::query_as("SELECT * FROM episodes WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| Episode {
            id: r.id,
            project_id: r.project_id,
            title: r.title,
            description: r.description,
        }))
    }

    pub async fn list_episodes(&self, project_id: &str) -> Result<Vec<Episode>> {
        #[derive(FromRow)]
        struct EpisodeRow {
            id: String,
            project_id: String,
            title: String,
            description: Option<String>,
        }
        let rows: Vec<EpisodeRow> =
            sqlx::query_as("SELECT * FROM episodes WHERE project_id = ? ORDER BY id ASC")
                .bind(project_id)
                .fetch_all(&self.pool)
                .await?;
        Ok(rows
            .into_iter()
            .map(|r| Episode {
                id: r.id,
                project_id: r.project_id,
                title: r.title,
                description: r.description,
            })
            .collect())
    }

    pub async fn link_episode_scene(&self, link: &EpisodeScene) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO episode_scenes (episode_id, scene_id, position)
            VALUES (?, ?, ?)
            ON CONFLICT(episode_id, scene_id) DO UPDATE SET position = excluded.position
            "#,
        )
        .bind(&link.episode_id)
        .bind(&link.scene_id)
        .bind(link.position)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Scenes of an episode in `position` order.
    pub async fn episode_scenes(&self, episode_id: &str) -> Result<Vec<Scene>> {
        let rows: Vec<SceneRow> = sqlx::query_as(
            r#"
            SELECT s.* FROM scenes s
            JOIN episode_scenes es ON es.scene_id = s.id
            WHERE es.episode_id = ?
            ORDER BY es.position ASC
            "#,
        )
        .bind(episode_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Scene::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CatalogStore, ProjectUpsert};

    async fn store_with_project() -> CatalogStore {
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
    }

    fn scene(id: &str, number: i64) -> Scene {
        Scene {
            id: id.to_string(),
            project_id: "p1".to_string(),
            scene_number: number,
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
        }
    }

    #[tokio::test]
    async fn test_scene_ordering() {
        let store = store_with_project().await;
        let scenes = store.scenes();
        scenes.upsert_scene(&scene("s3", 3)).await.unwrap();
        scenes.upsert_scene(&scene("s1", 1)).await.unwrap();
        scenes.upsert_scene(&scene("s2", 2)).await.unwrap();

        let listed = scenes.list_scenes("p1").await.unwrap();
        let numbers: Vec<i64> = listed.iter().map(|s| s.scene_number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);

        let after = scenes.scenes_after("p1", 1).await.unwrap();
        assert_eq!(after.len(), 2);
        assert_eq!(after[0].id, "s2");
    }

    #[tokio::test]
    async fn test_shot_characters_roundtrip() {
        let store = store_with_project().await;
        let scenes = store.scenes();
        scenes.upsert_scene(&scene("s1", 1)).await.unwrap();

        let shot = Shot {
            id: "sh1".to_string(),
            scene_id: "s1".to_string(),
            shot_number: 1,
            shot_type: Some("wide".to_string()),
            camera_angle: None,
            motion_prompt: Some("slow pan".to_string()),
            characters_present: vec!["kai".to_string(), "mira".to_string()],
            dialogue_text: None,
            dialogue_character: None,
            status: Some("completed".to_string()),
            output_video_path: Some("/out/sh1.mp4".to_string()),
        };
        scenes.upsert_shot(&shot).await.unwrap();

        let loaded = scenes.get_shot("sh1").await.unwrap().unwrap();
        assert_eq!(loaded.characters_present, vec!["kai", "mira"]);
    }

    #[tokio::test]
    async fn test_completed_downstream_shots() {
        let store = store_with_project().await;
        let scenes = store.scenes();
        for (id, n) in [("s1", 1), ("s2", 2), ("s3", 3)] {
            scenes.upsert_scene(&scene(id, n)).await.unwrap();
        }
        for (shot_id, scene_id, status, output) in [
            ("sh1", "s1", "completed", Some("/out/sh1.mp4")),
            ("sh2", "s2", "completed", Some("/out/sh2.mp4")),
            ("sh3", "s2", "pending", None),
            ("sh4", "s3", "accepted_best", Some("/out/sh4.mp4")),
        ] {
            scenes
                .upsert_shot(&Shot {
                    id: shot_id.to_string(),
                    scene_id: scene_id.to_string(),
                    shot_number: 1,
                    shot_type: None,
                    camera_angle: None,
                    motion_prompt: None,
                    characters_present: vec![],
                    dialogue_text: None,
                    dialogue_character: None,
                    status: Some(status.to_string()),
                    output_video_path: output.map(String::from),
                })
                .await
                .unwrap();
        }

        let stale = scenes.completed_downstream_shots("p1", 1).await.unwrap();
        let ids: Vec<&str> = stale.iter().map(|s| s.shot_id.as_str()).collect();
        assert_eq!(ids, vec!["sh2", "sh4"]);
    }
}
