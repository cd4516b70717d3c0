//! Job persistence - the recovery path behind the in-memory cache.

use crate::error::{CatalogError, Result};
use atelier_protocol::{Job, JobId, JobStatus, JobType};
use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqlitePool};
use std::collections::HashMap;
use std::str::FromStr;

#[derive(Debug, Clone, FromRow)]
struct JobRow {
    id: String,
    job_type: String,
    prompt: String,
    parameters: String,
    status: String,
    backend_id: Option<String>,
    output_path: Option<String>,
    organized_path: Option<String>,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    error_message: Option<String>,
    project_id: Option<String>,
    character_id: Option<String>,
    total_time_secs: Option<f64>,
}

impl JobRow {
    fn into_job(self) -> Result<Job> {
        let parameters: HashMap<String, serde_json::Value> =
            serde_json::from_str(&self.parameters)?;
        let job_type = JobType::from_str(&self.job_type)
            .map_err(|e| CatalogError::bad_input(e.to_string()))?;
        let status = JobStatus::from_str(&self.status)
            .map_err(|e| CatalogError::bad_input(e.to_string()))?;
        let id =
            JobId::parse(&self.id).map_err(|e| CatalogError::bad_input(e.to_string()))?;
        Ok(Job {
            id,
            job_type,
            prompt: self.prompt,
            parameters,
            status,
            backend_id: self.backend_id,
            output_path: self.output_path,
            organized_path: self.organized_path,
            created_at: self.created_at,
            started_at: self.started_at,
            completed_at: self.completed_at,
            error_message: self.error_message,
            project_id: self.project_id,
            character_id: self.character_id,
            total_time_secs: self.total_time_secs,
        })
    }
}

pub struct JobStore {
    pool: SqlitePool,
}

impl JobStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Write a job through to the database (insert or full-row update).
    pub async fn save(&self, job: &Job) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO jobs
                (id, job_type, prompt, parameters, status, backend_id, output_path,
                 organized_path, created_at, started_at, completed_at, error_message,
                 project_id, character_id, total_time_secs)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                status = excluded.status,
                backend_id = excluded.backend_id,
                output_path = excluded.output_path,
                organized_path = excluded.organized_path,
                started_at = excluded.started_at,
                completed_at = excluded.completed_at,
                error_message = excluded.error_message,
                total_time_secs = excluded.total_time_secs
            "#,
        )
        .bind(job.id.as_str())
        .bind(job.job_type.as_str())
        .bind(&job.prompt)
        .bind(serde_json::to_string(&job.parameters)?)
        .bind(job.status.as_str())
        .bind(&job.backend_id)
        .bind(&job.output_path)
        .bind(&job.organized_path)
        .bind(job.created_at)
        .bind(job.started_at)
        .bind(job.completed_at)
        .bind(&job.error_message)
        .bind(&job.project_id)
        .bind(&job.character_id)
        .bind(job.total_time_secs)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get(&self, id: &JobId) -> Result<Option<Job>> {
        let row: Option<JobRow> = sqlx::query_as("SELECT * FROM jobs WHERE id = ?")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.map(JobRow::into_job).transpose()
    }

    /// Newest first, optional status filter.
    pub async fn list(
        &self,
        limit: i64,
        offset: i64,
        status: Option<JobStatus>,
    ) -> Result<Vec<Job>> {
        let rows: Vec<JobRow> = match status {
            Some(status) => {
                sqlx::query_as(
                    r#"
                    SELECT * FROM jobs WHERE status = ?
                    ORDER BY created_at DESC LIMIT ? OFFSET ?
                    "#,
                )
                .bind(status.as_str())
                .bind(limit)
                .bind(offset)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as(
                    "SELECT * FROM jobs ORDER BY created_at DESC LIMIT ? OFFSET ?",
                )
                .bind(limit)
                .bind(offset)
                .fetch_all(&self.pool)
                .await?
            }
        };
        rows.into_iter().map(JobRow::into_job).collect()
    }

    /// Jobs still marked non-terminal; used on startup to recover the cache.
    pub async fn list_active(&self) -> Result<Vec<Job>> {
        let rows: Vec<JobRow> = sqlx::query_as(
            "SELECT * FROM jobs WHERE status IN ('queued', 'processing') ORDER BY created_at ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(JobRow::into_job).collect()
    }

    /// Delete terminal jobs completed before the cutoff. Returns rows removed.
    pub async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let affected = sqlx::query(
            r#"
            DELETE FROM jobs
            WHERE status IN ('completed', 'failed', 'timeout', 'cancelled')
              AND completed_at IS NOT NULL
              AND completed_at < ?
            "#,
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(affected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CatalogStore;
    use chrono::Duration;

    #[tokio::test]
    async fn test_save_and_reload() {
        let store = CatalogStore::memory().await.unwrap();
        let jobs = store.jobs();

        let mut job = Job::new(JobType::Image, "portrait of a woman");
        job.project_id = Some("p1".to_string());
        jobs.save(&job).await.unwrap();

        job.status = JobStatus::Processing;
        job.started_at = Some(Utc::now());
        job.backend_id = Some("prompt-abc".to_string());
        jobs.save(&job).await.unwrap();

        let loaded = jobs.get(&job.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, JobStatus::Processing);
        assert_eq!(loaded.backend_id.as_deref(), Some("prompt-abc"));
        assert!(loaded.started_at.is_some());
    }

    #[tokio::test]
    async fn test_list_filters_by_status() {
        let store = CatalogStore::memory().await.unwrap();
        let jobs = store.jobs();

        let queued = Job::new(JobType::Image, "a");
        jobs.save(&queued).await.unwrap();
        let mut done = Job::new(JobType::Video, "b");
        done.status = JobStatus::Completed;
        done.completed_at = Some(Utc::now());
        jobs.save(&done).await.unwrap();

        let all = jobs.list(50, 0, None).await.unwrap();
        assert_eq!(all.len(), 2);
        let completed = jobs.list(50, 0, Some(JobStatus::Completed)).await.unwrap();
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].id, done.id);
    }

    #[tokio::test]
    async fn test_delete_older_than_keeps_active() {
        let store = CatalogStore::memory().await.unwrap();
        let jobs = store.jobs();

        let mut old = Job::new(JobType::Image, "old");
        old.status = JobStatus::Completed;
        old.completed_at = Some(Utc::now() - Duration::hours(48));
        jobs.save(&old).await.unwrap();

        let active = Job::new(JobType::Image, "active");
        jobs.save(&active).await.unwrap();

        let removed = jobs
            .delete_older_than(Utc::now() - Duration::hours(24))
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert!(jobs.get(&active.id).await.unwrap().is_some());
        assert!(jobs.get(&old.id).await.unwrap().is_none());
    }
}
