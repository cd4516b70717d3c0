//! Quality-feedback persistence and learned-element aggregation.

use crate::error::Result;
use atelier_protocol::QualityFeedback;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqlitePool};

#[derive(Debug, Clone, FromRow)]
struct FeedbackRow {
    generation_id: String,
    prompt_id: String,
    project_id: Option<String>,
    generation_params: String,
    contract_passed: bool,
    quality_score: f64,
    structural_gates: String,
    motion_gates: String,
    quality_gates: String,
    frame_samples: String,
    recommendations: String,
    successful_elements: String,
    failed_elements: String,
    analysis_notes: Option<String>,
    output_path: Option<String>,
    file_size_bytes: Option<i64>,
    duration_secs: Option<f64>,
    frame_count: Option<i64>,
    human_score: Option<f64>,
    human_notes: Option<String>,
    created_at: DateTime<Utc>,
}

impl FeedbackRow {
    fn into_feedback(self) -> Result<QualityFeedback> {
        Ok(QualityFeedback {
            generation_id: self.generation_id,
            prompt_id: self.prompt_id,
            project_id: self.project_id,
            generation_params: serde_json::from_str(&self.generation_params)?,
            contract_passed: self.contract_passed,
            quality_score: self.quality_score,
            structural_gates: serde_json::from_str(&self.structural_gates)?,
            motion_gates: serde_json::from_str(&self.motion_gates)?,
            quality_gates: serde_json::from_str(&self.quality_gates)?,
            frame_samples: serde_json::from_str(&self.frame_samples)?,
            recommendations: serde_json::from_str(&self.recommendations)?,
            successful_elements: serde_json::from_str(&self.successful_elements)?,
            failed_elements: serde_json::from_str(&self.failed_elements)?,
            analysis_notes: self.analysis_notes,
            output_path: self.output_path,
            file_size_bytes: self.file_size_bytes,
            duration_secs: self.duration_secs,
            frame_count: self.frame_count,
            human_score: self.human_score,
            human_notes: self.human_notes,
            created_at: self.created_at,
        })
    }
}

/// Per-project aggregates for the stats endpoint.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct ProjectStats {
    pub total_jobs: i64,
    pub completed_jobs: i64,
    pub failed_jobs: i64,
    pub feedback_count: i64,
    pub pass_rate: f64,
    pub avg_quality_score: f64,
}

pub struct QualityStore {
    pool: SqlitePool,
}

impl QualityStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a feedback record. `prompt_id` is unique; re-reviewing the
    /// same generation is a conflict the caller decides how to handle.
    pub async fn insert(&self, feedback: &QualityFeedback) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO quality_feedback
                (generation_id, prompt_id, project_id, generation_params,
                 contract_passed, quality_score, structural_gates, motion_gates,
                 quality_gates, frame_samples, recommendations, successful_elements,
                 failed_elements, analysis_notes, output_path, file_size_bytes,
                 duration_secs, frame_count, human_score, human_notes, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&feedback.generation_id)
        .bind(&feedback.prompt_id)
        .bind(&feedback.project_id)
        .bind(serde_json::to_string(&feedback.generation_params)?)
        .bind(feedback.contract_passed)
        .bind(feedback.quality_score)
        .bind(serde_json::to_string(&feedback.structural_gates)?)
        .bind(serde_json::to_string(&feedback.motion_gates)?)
        .bind(serde_json::to_string(&feedback.quality_gates)?)
        .bind(serde_json::to_string(&feedback.frame_samples)?)
        .bind(serde_json::to_string(&feedback.recommendations)?)
        .bind(serde_json::to_string(&feedback.successful_elements)?)
        .bind(serde_json::to_string(&feedback.failed_elements)?)
        .bind(&feedback.analysis_notes)
        .bind(&feedback.output_path)
        .bind(feedback.file_size_bytes)
        .bind(feedback.duration_secs)
        .bind(feedback.frame_count)
        .bind(feedback.human_score)
        .bind(&feedback.human_notes)
        .bind(feedback.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_recent(&self, project_id: &str, limit: i64) -> Result<Vec<QualityFeedback>> {
        let rows: Vec<FeedbackRow> = sqlx::query_as(
            r#"
            SELECT * FROM quality_feedback
            WHERE project_id = ?
            ORDER BY created_at DESC
            LIMIT ?
            "#,
        )
        .bind(project_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(FeedbackRow::into_feedback).collect()
    }

    /// Merged, deduplicated successful/failed prompt elements across all
    /// feedback of a project.
    pub async fn get_learned_elements(
        &self,
        project_id: &str,
    ) -> Result<(Vec<String>, Vec<String>)> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            "SELECT successful_elements, failed_elements FROM quality_feedback WHERE project_id = ?",
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;

        let mut successful = Vec::new();
        let mut failed = Vec::new();
        for (ok_json, bad_json) in rows {
            let ok: Vec<String> = serde_json::from_str(&ok_json)?;
            let bad: Vec<String> = serde_json::from_str(&bad_json)?;
            for item in ok {
                if !successful.contains(&item) {
                    successful.push(item);
                }
            }
            for item in bad {
                if !failed.contains(&item) {
                    failed.push(item);
                }
            }
        }
        Ok((successful, failed))
    }

    pub async fn get_project_stats(&self, project_id: &str) -> Result<ProjectStats> {
        let (total_jobs, completed_jobs, failed_jobs): (i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT
                COUNT(*),
                COUNT(*) FILTER (WHERE status = 'completed'),
                COUNT(*) FILTER (WHERE status IN ('failed', 'timeout'))
            FROM jobs WHERE project_id = ?
            "#,
        )
        .bind(project_id)
        .fetch_one(&self.pool)
        .await?;

        let (feedback_count, passed, avg_quality): (i64, i64, Option<f64>) = sqlx::query_as(
            r#"
            SELECT
                COUNT(*),
                COUNT(*) FILTER (WHERE contract_passed = 1),
                AVG(quality_score)
            FROM quality_feedback WHERE project_id = ?
            "#,
        )
        .bind(project_id)
        .fetch_one(&self.pool)
        .await?;

        let pass_rate = if feedback_count > 0 {
            passed as f64 / feedback_count as f64
        } else {
            0.0
        };

        Ok(ProjectStats {
            total_jobs,
            completed_jobs,
            failed_jobs,
            feedback_count,
            pass_rate,
            avg_quality_score: avg_quality.unwrap_or(0.0),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CatalogError, CatalogStore};

    fn feedback(generation_id: &str, prompt_id: &str, passed: bool, score: f64) -> QualityFeedback {
        QualityFeedback {
            generation_id: generation_id.to_string(),
            prompt_id: prompt_id.to_string(),
            project_id: Some("p1".to_string()),
            generation_params: serde_json::json!({"steps": 20}),
            contract_passed: passed,
            quality_score: score,
            structural_gates: serde_json::json!({}),
            motion_gates: serde_json::json!({}),
            quality_gates: serde_json::json!({}),
            frame_samples: vec![],
            recommendations: vec![],
            successful_elements: vec!["masterpiece".to_string()],
            failed_elements: if passed { vec![] } else { vec!["blurry".to_string()] },
            analysis_notes: None,
            output_path: None,
            file_size_bytes: None,
            duration_secs: None,
            frame_count: None,
            human_score: None,
            human_notes: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_insert_and_recent() {
        let store = CatalogStore::memory().await.unwrap();
        let quality = store.quality();
        quality.insert(&feedback("g1", "pr1", true, 0.8)).await.unwrap();
        quality.insert(&feedback("g2", "pr2", false, 0.3)).await.unwrap();

        let recent = quality.get_recent("p1", 10).await.unwrap();
        assert_eq!(recent.len(), 2);
    }

    #[tokio::test]
    async fn test_duplicate_prompt_id_conflicts() {
        let store = CatalogStore::memory().await.unwrap();
        let quality = store.quality();
        quality.insert(&feedback("g1", "pr1", true, 0.8)).await.unwrap();
        let result = quality.insert(&feedback("g2", "pr1", true, 0.9)).await;
        assert!(matches!(result, Err(CatalogError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_learned_elements_dedup() {
        let store = CatalogStore::memory().await.unwrap();
        let quality = store.quality();
        quality.insert(&feedback("g1", "pr1", true, 0.8)).await.unwrap();
        quality.insert(&feedback("g2", "pr2", false, 0.2)).await.unwrap();

        let (successful, failed) = quality.get_learned_elements("p1").await.unwrap();
        assert_eq!(successful, vec!["masterpiece"]);
        assert_eq!(failed, vec!["blurry"]);
    }

    #[tokio::test]
    async fn test_project_stats() {
        let store = CatalogStore::memory().await.unwrap();
        let quality = store.quality();
        quality.insert(&feedback("g1", "pr1", true, 0.8)).await.unwrap();
        quality.insert(&feedback("g2", "pr2", false, 0.4)).await.unwrap();

        let stats = quality.get_project_stats("p1").await.unwrap();
        assert_eq!(stats.feedback_count, 2);
        assert!((stats.pass_rate - 0.5).abs() < 1e-9);
        assert!((stats.avg_quality_score - 0.6).abs() < 1e-9);
    }
}
