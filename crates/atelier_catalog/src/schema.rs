//! Idempotent schema initialization.
//!
//! Every table is `CREATE TABLE IF NOT EXISTS`; the server calls
//! [`init_schema`] once at startup. Timestamps are stored as RFC3339 text,
//! JSON-valued columns as text.

use crate::error::Result;
use sqlx::SqlitePool;
use tracing::debug;

/// Create all catalog tables and indexes.
pub async fn init_schema(pool: &SqlitePool) -> Result<()> {
    let statements: &[&str] = &[
        r#"
        CREATE TABLE IF NOT EXISTS projects (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            description TEXT,
            default_style TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS generation_styles (
            name TEXT PRIMARY KEY,
            checkpoint TEXT NOT NULL,
            positive_prompt TEXT NOT NULL DEFAULT '',
            negative_prompt TEXT NOT NULL DEFAULT '',
            cfg_scale REAL NOT NULL DEFAULT 7.0,
            steps INTEGER NOT NULL DEFAULT 20,
            sampler TEXT NOT NULL DEFAULT 'euler',
            scheduler TEXT NOT NULL DEFAULT 'normal',
            width INTEGER NOT NULL DEFAULT 512,
            height INTEGER NOT NULL DEFAULT 512
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS characters (
            id TEXT PRIMARY KEY,
            project_id TEXT NOT NULL REFERENCES projects(id),
            name TEXT NOT NULL,
            slug TEXT NOT NULL,
            description TEXT,
            design_prompt TEXT,
            appearance TEXT NOT NULL DEFAULT '{}',
            personality TEXT,
            personality_tags TEXT NOT NULL DEFAULT '[]',
            background TEXT,
            role TEXT,
            relationships TEXT NOT NULL DEFAULT '{}',
            voice_profile TEXT NOT NULL DEFAULT '{}',
            lora_path TEXT,
            lora_trigger TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE (project_id, slug)
        )
        "#,
        "CREATE INDEX IF NOT EXISTS idx_characters_name ON characters(name)",
        r#"
        CREATE TABLE IF NOT EXISTS scenes (
            id TEXT PRIMARY KEY,
            project_id TEXT NOT NULL REFERENCES projects(id),
            scene_number INTEGER NOT NULL,
            title TEXT,
            description TEXT,
            location TEXT,
            mood TEXT,
            time_of_day TEXT,
            weather TEXT,
            narrative_text TEXT,
            generation_status TEXT,
            output_video_path TEXT,
            dialogue_audio_path TEXT
        )
        "#,
        "CREATE INDEX IF NOT EXISTS idx_scenes_project_number ON scenes(project_id, scene_number)",
        r#"
        CREATE TABLE IF NOT EXISTS shots (
            id TEXT PRIMARY KEY,
            scene_id TEXT NOT NULL REFERENCES scenes(id),
            shot_number INTEGER NOT NULL,
            shot_type TEXT,
            camera_angle TEXT,
            motion_prompt TEXT,
            characters_present TEXT NOT NULL DEFAULT '[]',
            dialogue_text TEXT,
            dialogue_character TEXT,
            status TEXT,
            output_video_path TEXT
        )
        "#,
        "CREATE INDEX IF NOT EXISTS idx_shots_scene ON shots(scene_id, shot_number)",
        r#"
        CREATE TABLE IF NOT EXISTS episodes (
            id TEXT PRIMARY KEY,
            project_id TEXT NOT NULL REFERENCES projects(id),
            title TEXT NOT NULL,
            description TEXT
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS episode_scenes (
            episode_id TEXT NOT NULL REFERENCES episodes(id),
            scene_id TEXT NOT NULL REFERENCES scenes(id),
            position INTEGER NOT NULL,
            PRIMARY KEY (episode_id, scene_id)
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS jobs (
            id TEXT PRIMARY KEY,
            job_type TEXT NOT NULL,
            prompt TEXT NOT NULL,
            parameters TEXT NOT NULL DEFAULT '{}',
            status TEXT NOT NULL,
            backend_id TEXT,
            output_path TEXT,
            organized_path TEXT,
            created_at TEXT NOT NULL,
            started_at TEXT,
            completed_at TEXT,
            error_message TEXT,
            project_id TEXT,
            character_id TEXT,
            total_time_secs REAL
        )
        "#,
        "CREATE INDEX IF NOT EXISTS idx_jobs_status ON jobs(status, created_at)",
        r#"
        CREATE TABLE IF NOT EXISTS character_scene_state (
            scene_id TEXT NOT NULL,
            character_slug TEXT NOT NULL,
            clothing TEXT,
            hair_state TEXT,
            injuries TEXT NOT NULL DEFAULT '[]',
            accessories TEXT NOT NULL DEFAULT '[]',
            body_state TEXT NOT NULL DEFAULT 'clean',
            emotional_state TEXT NOT NULL DEFAULT 'calm',
            energy_level TEXT NOT NULL DEFAULT 'normal',
            relationship_context TEXT NOT NULL DEFAULT '{}',
            location_in_scene TEXT,
            carrying TEXT NOT NULL DEFAULT '[]',
            state_source TEXT NOT NULL DEFAULT 'auto',
            version INTEGER NOT NULL DEFAULT 1,
            updated_at TEXT NOT NULL,
            PRIMARY KEY (scene_id, character_slug)
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS regeneration_queue (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            scene_id TEXT NOT NULL,
            shot_id TEXT,
            reason TEXT NOT NULL,
            priority INTEGER NOT NULL DEFAULT 0,
            source_scene_id TEXT,
            source_field TEXT,
            status TEXT NOT NULL DEFAULT 'pending',
            created_at TEXT NOT NULL,
            processed_at TEXT
        )
        "#,
        // NULLs compare distinct in plain UNIQUE constraints; COALESCE makes
        // double-delivered events collapse onto one row.
        r#"
        CREATE UNIQUE INDEX IF NOT EXISTS idx_regen_dedup
        ON regeneration_queue(
            scene_id,
            COALESCE(shot_id, ''),
            COALESCE(source_scene_id, ''),
            COALESCE(source_field, '')
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS quality_feedback (
            generation_id TEXT PRIMARY KEY,
            prompt_id TEXT NOT NULL UNIQUE,
            project_id TEXT,
            generation_params TEXT NOT NULL DEFAULT '{}',
            contract_passed INTEGER NOT NULL,
            quality_score REAL NOT NULL,
            structural_gates TEXT NOT NULL DEFAULT '{}',
            motion_gates TEXT NOT NULL DEFAULT '{}',
            quality_gates TEXT NOT NULL DEFAULT '{}',
            frame_samples TEXT NOT NULL DEFAULT '[]',
            recommendations TEXT NOT NULL DEFAULT '[]',
            successful_elements TEXT NOT NULL DEFAULT '[]',
            failed_elements TEXT NOT NULL DEFAULT '[]',
            analysis_notes TEXT,
            output_path TEXT,
            file_size_bytes INTEGER,
            duration_secs REAL,
            frame_count INTEGER,
            human_score REAL,
            human_notes TEXT,
            created_at TEXT NOT NULL
        )
        "#,
    ];

    for statement in statements {
        sqlx::query(statement).execute(pool).await?;
    }

    debug!("Catalog schema initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{create_pool, CatalogConfig};

    #[tokio::test]
    async fn test_init_schema_is_idempotent() {
        let pool = create_pool(&CatalogConfig::sqlite_memory()).await.unwrap();
        init_schema(&pool).await.unwrap();
        init_schema(&pool).await.unwrap();
    }
}
