//! Project and generation-style persistence.

use crate::error::{CatalogError, Result};
use atelier_protocol::{GenerationStyle, Project};
use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqlitePool};
use uuid::Uuid;

#[derive(Debug, Clone, FromRow)]
struct ProjectRow {
    id: String,
    name: String,
    description: Option<String>,
    default_style: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ProjectRow> for Project {
    fn from(row: ProjectRow) -> Self {
        Project {
            id: row.id,
            name: row.name,
            description: row.description,
            default_style: row.default_style,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Fields accepted when creating or updating a project.
#[derive(Debug, Clone, Default)]
pub struct ProjectUpsert {
    pub id: Option<String>,
    pub name: String,
    pub description: Option<String>,
    pub default_style: Option<String>,
}

pub struct ProjectStore {
    pool: SqlitePool,
}

impl ProjectStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert or update a project. A missing id gets a fresh UUID.
    pub async fn upsert(&self, upsert: ProjectUpsert) -> Result<Project> {
        if upsert.name.trim().is_empty() {
            return Err(CatalogError::bad_input("project name must not be empty"));
        }
        let id = upsert
            .id
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO projects (id, name, description, default_style, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                description = excluded.description,
                default_style = excluded.default_style,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&id)
        .bind(&upsert.name)
        .bind(&upsert.description)
        .bind(&upsert.default_style)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        self.get(&id)
            .await?
            .ok_or_else(|| CatalogError::not_found(format!("project {id} missing after upsert")))
    }

    pub async fn get(&self, id: &str) -> Result<Option<Project>> {
        let row: Option<ProjectRow> = sqlx::query_as("SELECT * FROM projects WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Project::from))
    }

    pub async fn list(&self) -> Result<Vec<Project>> {
        let rows: Vec<ProjectRow> =
            sqlx::query_as("SELECT * FROM projects ORDER BY created_at ASC")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(Project::from).collect())
    }

    pub async fn delete(&self, id: &str) -> Result<bool> {
        let affected = sqlx::query("DELETE FROM projects WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(affected > 0)
    }

    // ------------------------------------------------------------------
    // Generation styles
    // ------------------------------------------------------------------

    pub async fn upsert_style(&self, style: &GenerationStyle) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO generation_styles
                (name, checkpoint, positive_prompt, negative_prompt, cfg_scale,
                 steps, sampler, scheduler, width, height)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(name) DO UPDATE SET
                checkpoint = excluded.checkpoint,
                positive_prompt = excluded.positive_prompt,
                negative_prompt = excluded.negative_prompt,
                cfg_scale = excluded.cfg_scale,
                steps = excluded.steps,
                sampler = excluded.sampler,
                scheduler = excluded.scheduler,
                width = excluded.width,
                height = excluded.height
            "#,
        )
        .bind(&style.name)
        .bind(&style.checkpoint)
        .bind(&style.positive_prompt)
        .bind(&style.negative_prompt)
        .bind(style.cfg_scale)
        .bind(style.steps)
        .bind(&style.sampler)
        .bind(&style.scheduler)
        .bind(style.width)
        .bind(style.height)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_style(&self, name: &str) -> Result<Option<GenerationStyle>> {
        #[derive(FromRow)]
        struct StyleRow {
            name: String,
            checkpoint: String,
            positive_prompt: String,
            negative_prompt: String,
            cfg_scale: f64,
            steps: i64,
            sampler: String,
            scheduler: String,
            width: i64,
            height: i64,
        }

        let row: Option<StyleRow> =
            sqlx::query_as("SELECT * FROM generation_styles WHERE name = ?")
                .bind(name)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|r| GenerationStyle {
            name: r.name,
            checkpoint: r.checkpoint,
            positive_prompt: r.positive_prompt,
            negative_prompt: r.negative_prompt,
            cfg_scale: r.cfg_scale,
            steps: r.steps,
            sampler: r.sampler,
            scheduler: r.scheduler,
            width: r.width,
            height: r.height,
        }))
    }

    /// Style referenced by the project's `default_style`, if both exist.
    pub async fn get_project_style(&self, project_id: &str) -> Result<Option<GenerationStyle>> {
        let Some(project) = self.get(project_id).await? else {
            return Ok(None);
        };
        match project.default_style {
            Some(name) => self.get_style(&name).await,
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CatalogStore;

    #[tokio::test]
    async fn test_project_upsert_roundtrip() {
        let store = CatalogStore::memory().await.unwrap();
        let projects = store.projects();

        let created = projects
            .upsert(ProjectUpsert {
                id: Some("tower-anime".to_string()),
                name: "Tower Anime".to_string(),
                description: Some("pilot season".to_string()),
                default_style: None,
            })
            .await
            .unwrap();
        assert_eq!(created.id, "tower-anime");

        let updated = projects
            .upsert(ProjectUpsert {
                id: Some("tower-anime".to_string()),
                name: "Tower Anime (revised)".to_string(),
                description: None,
                default_style: Some("neon_noir".to_string()),
            })
            .await
            .unwrap();
        assert_eq!(updated.name, "Tower Anime (revised)");
        assert_eq!(updated.default_style.as_deref(), Some("neon_noir"));
        assert_eq!(projects.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_empty_name_rejected() {
        let store = CatalogStore::memory().await.unwrap();
        let result = store
            .projects()
            .upsert(ProjectUpsert {
                name: "  ".to_string(),
                ..Default::default()
            })
            .await;
        assert!(matches!(result, Err(CatalogError::BadInput(_))));
    }

    #[tokio::test]
    async fn test_style_lookup_via_project() {
        let store = CatalogStore::memory().await.unwrap();
        let projects = store.projects();

        projects
            .upsert_style(&GenerationStyle {
                name: "neon_noir".to_string(),
                checkpoint: "counterfeit_v3.safetensors".to_string(),
                positive_prompt: "neon, rain".to_string(),
                negative_prompt: "lowres".to_string(),
                cfg_scale: 7.0,
                steps: 20,
                sampler: "euler".to_string(),
                scheduler: "normal".to_string(),
                width: 512,
                height: 768,
            })
            .await
            .unwrap();

        projects
            .upsert(ProjectUpsert {
                id: Some("p1".to_string()),
                name: "P1".to_string(),
                default_style: Some("neon_noir".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();

        let style = projects.get_project_style("p1").await.unwrap().unwrap();
        assert_eq!(style.checkpoint, "counterfeit_v3.safetensors");
    }
}
