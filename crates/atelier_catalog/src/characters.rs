//! Character persistence - slugs, JSON columns, whitelist patching.

use crate::error::{CatalogError, Result};
use atelier_protocol::catalog::slugify;
use atelier_protocol::http::CharacterPatch;
use atelier_protocol::{Appearance, Character, VoiceProfile};
use chrono::{DateTime, Utc};
use sqlx::{FromRow, QueryBuilder, Sqlite, SqlitePool};
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow)]
struct CharacterRow {
    id: String,
    project_id: String,
    name: String,
    slug: String,
    description: Option<String>,
    design_prompt: Option<String>,
    appearance: String,
    personality: Option<String>,
    personality_tags: String,
    background: Option<String>,
    role: Option<String>,
    relationships: String,
    voice_profile: String,
    lora_path: Option<String>,
    lora_trigger: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl CharacterRow {
    fn into_character(self) -> Result<Character> {
        let appearance: Appearance = serde_json::from_str(&self.appearance)?;
        let personality_tags: Vec<String> = serde_json::from_str(&self.personality_tags)?;
        let relationships: HashMap<String, String> = serde_json::from_str(&self.relationships)?;
        let voice_profile: VoiceProfile = serde_json::from_str(&self.voice_profile)?;
        Ok(Character {
            id: self.id,
            project_id: self.project_id,
            name: self.name,
            slug: self.slug,
            description: self.description,
            design_prompt: self.design_prompt,
            appearance,
            personality: self.personality,
            personality_tags,
            background: self.background,
            role: self.role,
            relationships,
            voice_profile,
            lora_path: self.lora_path,
            lora_trigger: self.lora_trigger,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Fields accepted when creating a character.
#[derive(Debug, Clone, Default)]
pub struct CharacterUpsert {
    pub project_id: String,
    pub name: String,
    pub description: Option<String>,
    pub design_prompt: Option<String>,
    pub appearance: Appearance,
    pub personality: Option<String>,
    pub personality_tags: Vec<String>,
    pub background: Option<String>,
    pub role: Option<String>,
    pub relationships: HashMap<String, String>,
    pub voice_profile: VoiceProfile,
    pub lora_path: Option<String>,
    pub lora_trigger: Option<String>,
}

pub struct CharacterStore {
    pool: SqlitePool,
}

impl CharacterStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert or update a character, keyed by `(project_id, slug)`. The slug
    /// is derived from the name and never changes on update.
    pub async fn upsert(&self, upsert: CharacterUpsert) -> Result<Character> {
        let slug = slugify(&upsert.name);
        if slug.is_empty() {
            return Err(CatalogError::bad_input(format!(
                "character name {:?} produces an empty slug",
                upsert.name
            )));
        }
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO characters
                (id, project_id, name, slug, description, design_prompt, appearance,
                 personality, personality_tags, background, role, relationships,
                 voice_profile, lora_path, lora_trigger, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(project_id, slug) DO UPDATE SET
                name = excluded.name,
                description = excluded.description,
                design_prompt = excluded.design_prompt,
                appearance = excluded.appearance,
                personality = excluded.personality,
                personality_tags = excluded.personality_tags,
                background = excluded.background,
                role = excluded.role,
                relationships = excluded.relationships,
                voice_profile = excluded.voice_profile,
                lora_path = excluded.lora_path,
                lora_trigger = excluded.lora_trigger,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&id)
        .bind(&upsert.project_id)
        .bind(&upsert.name)
        .bind(&slug)
        .bind(&upsert.description)
        .bind(&upsert.design_prompt)
        .bind(serde_json::to_string(&upsert.appearance)?)
        .bind(&upsert.personality)
        .bind(serde_json::to_string(&upsert.personality_tags)?)
        .bind(&upsert.background)
        .bind(&upsert.role)
        .bind(serde_json::to_string(&upsert.relationships)?)
        .bind(serde_json::to_string(&upsert.voice_profile)?)
        .bind(&upsert.lora_path)
        .bind(&upsert.lora_trigger)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        self.get_by_slug(&upsert.project_id, &slug)
            .await?
            .ok_or_else(|| {
                CatalogError::not_found(format!("character {slug} missing after upsert"))
            })
    }

    pub async fn get_by_slug(&self, project_id: &str, slug: &str) -> Result<Option<Character>> {
        let row: Option<CharacterRow> =
            sqlx::query_as("SELECT * FROM characters WHERE project_id = ? AND slug = ?")
                .bind(project_id)
                .bind(slug)
                .fetch_optional(&self.pool)
                .await?;
        row.map(CharacterRow::into_character).transpose()
    }

    /// Slug lookup without project scoping (the story API addresses
    /// characters by bare slug). First match wins.
    pub async fn find_by_slug(&self, slug: &str) -> Result<Option<Character>> {
        let row: Option<CharacterRow> =
            sqlx::query_as("SELECT * FROM characters WHERE slug = ? ORDER BY created_at ASC")
                .bind(slug)
                .fetch_optional(&self.pool)
                .await?;
        row.map(CharacterRow::into_character).transpose()
    }

    pub async fn get_by_id(&self, id: &str) -> Result<Option<Character>> {
        let row: Option<CharacterRow> = sqlx::query_as("SELECT * FROM characters WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(CharacterRow::into_character).transpose()
    }

    pub async fn list(&self, project_id: &str) -> Result<Vec<Character>> {
        let rows: Vec<CharacterRow> =
            sqlx::query_as("SELECT * FROM characters WHERE project_id = ? ORDER BY name ASC")
                .bind(project_id)
                .fetch_all(&self.pool)
                .await?;
        rows.into_iter().map(CharacterRow::into_character).collect()
    }

    /// Case-insensitive name search with an exact-match boost. Characters
    /// are resolved here, directly against the store - never through the
    /// reference index, which cannot be trusted to match names reliably.
    pub async fn search_by_name(&self, name: &str, limit: i64) -> Result<Vec<Character>> {
        let pattern = format!("%{}%", name);
        let rows: Vec<CharacterRow> = sqlx::query_as(
            r#"
            SELECT * FROM characters
            WHERE name LIKE ?
            ORDER BY CASE WHEN LOWER(name) = LOWER(?) THEN 0 ELSE 1 END, name ASC
            LIMIT ?
            "#,
        )
        .bind(&pattern)
        .bind(name)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(CharacterRow::into_character).collect()
    }

    /// Whitelisted multi-field merge-update. JSON-valued fields are
    /// re-serialized explicitly; a patch with zero set fields is rejected.
    /// Always touches `updated_at`.
    pub async fn patch(&self, slug: &str, patch: &CharacterPatch) -> Result<Character> {
        if patch.is_empty() {
            return Err(CatalogError::bad_input(
                "patch contains no updatable fields",
            ));
        }

        let existing = self
            .find_by_slug(slug)
            .await?
            .ok_or_else(|| CatalogError::not_found(format!("character {slug}")))?;

        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE characters SET ");
        {
            let mut fields = builder.separated(", ");
            if let Some(v) = &patch.description {
                fields
                    .push("description = ")
                    .push_bind_unseparated(v.clone());
            }
            if let Some(v) = &patch.design_prompt {
                fields
                    .push("design_prompt = ")
                    .push_bind_unseparated(v.clone());
            }
            if let Some(v) = &patch.appearance {
                fields
                    .push("appearance = ")
                    .push_bind_unseparated(serde_json::to_string(v)?);
            }
            if let Some(v) = &patch.personality {
                fields
                    .push("personality = ")
                    .push_bind_unseparated(v.clone());
            }
            if let Some(v) = &patch.personality_tags {
                fields
                    .push("personality_tags = ")
                    .push_bind_unseparated(serde_json::to_string(v)?);
            }
            if let Some(v) = &patch.background {
                fields.push("background = ").push_bind_unseparated(v.clone());
            }
            if let Some(v) = &patch.role {
                fields.push("role = ").push_bind_unseparated(v.clone());
            }
            if let Some(v) = &patch.relationships {
                fields
                    .push("relationships = ")
                    .push_bind_unseparated(serde_json::to_string(v)?);
            }
            if let Some(v) = &patch.voice_profile {
                fields
                    .push("voice_profile = ")
                    .push_bind_unseparated(serde_json::to_string(v)?);
            }
            if let Some(v) = &patch.lora_path {
                fields.push("lora_path = ").push_bind_unseparated(v.clone());
            }
            if let Some(v) = &patch.lora_trigger {
                fields
                    .push("lora_trigger = ")
                    .push_bind_unseparated(v.clone());
            }
            fields
                .push("updated_at = ")
                .push_bind_unseparated(Utc::now());
        }

        builder.push(" WHERE id = ").push_bind(existing.id.clone());
        builder.build().execute(&self.pool).await?;

        self.get_by_id(&existing.id).await?.ok_or_else(|| {
            CatalogError::not_found(format!("character {slug} vanished during patch"))
        })
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

    fn kai() -> CharacterUpsert {
        CharacterUpsert {
            project_id: "p1".to_string(),
            name: "Kai".to_string(),
            design_prompt: Some("young swordsman, silver hair".to_string()),
            lora_path: Some("kai.safetensors".to_string()),
            lora_trigger: Some("kai_character".to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_upsert_derives_slug() {
        let store = store_with_project().await;
        let character = store.characters().upsert(kai()).await.unwrap();
        assert_eq!(character.slug, "kai");
        assert_eq!(character.lora_trigger.as_deref(), Some("kai_character"));
    }

    #[tokio::test]
    async fn test_search_by_name_exact_first() {
        let store = store_with_project().await;
        let characters = store.characters();
        characters.upsert(kai()).await.unwrap();
        characters
            .upsert(CharacterUpsert {
                project_id: "p1".to_string(),
                name: "Kaito".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();

        let hits = characters.search_by_name("Kai", 10).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].name, "Kai");
    }

    #[tokio::test]
    async fn test_patch_roundtrip() {
        let store = store_with_project().await;
        let characters = store.characters();
        characters.upsert(kai()).await.unwrap();

        let patch = CharacterPatch {
            role: Some("protagonist".to_string()),
            personality_tags: Some(vec!["stoic".to_string(), "loyal".to_string()]),
            appearance: Some(Appearance {
                hair: Some("silver, short".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let patched = characters.patch("kai", &patch).await.unwrap();
        assert_eq!(patched.role.as_deref(), Some("protagonist"));
        assert_eq!(patched.personality_tags, vec!["stoic", "loyal"]);
        assert_eq!(patched.appearance.hair.as_deref(), Some("silver, short"));
        // Untouched fields survive the patch.
        assert_eq!(
            patched.design_prompt.as_deref(),
            Some("young swordsman, silver hair")
        );
        assert!(patched.updated_at >= patched.created_at);
    }

    #[tokio::test]
    async fn test_empty_patch_rejected() {
        let store = store_with_project().await;
        store.characters().upsert(kai()).await.unwrap();
        let result = store
            .characters()
            .patch("kai", &CharacterPatch::default())
            .await;
        assert!(matches!(result, Err(CatalogError::BadInput(_))));
    }

    #[tokio::test]
    async fn test_duplicate_slug_updates_in_place() {
        let store = store_with_project().await;
        let characters = store.characters();
        characters.upsert(kai()).await.unwrap();
        characters
            .upsert(CharacterUpsert {
                description: Some("revised".to_string()),
                ..kai()
            })
            .await
            .unwrap();
        assert_eq!(characters.list("p1").await.unwrap().len(), 1);
    }
}
