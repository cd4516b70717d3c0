//! Job manager - the in-memory cache is the fast path, the catalog the
//! recovery path.
//!
//! Only `create_job` mints ids. Every state change runs through the status
//! state machine; a failed write-through logs a warning but never rolls
//! back the in-memory transition.

use atelier_catalog::CatalogStore;
use atelier_protocol::{
    CoreError, CoreResult, Job, JobId, JobStatistics, JobStatus, JobType,
};
use chrono::{Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// Optional fields applied together with a status change.
#[derive(Debug, Clone, Default)]
pub struct JobUpdate {
    pub backend_id: Option<String>,
    pub output_path: Option<String>,
    pub organized_path: Option<String>,
    pub error_message: Option<String>,
    pub total_time_secs: Option<f64>,
}

#[derive(Clone)]
pub struct JobManager {
    jobs: Arc<RwLock<HashMap<JobId, Job>>>,
    catalog: CatalogStore,
}

impl JobManager {
    pub fn new(catalog: CatalogStore) -> Self {
        Self {
            jobs: Arc::new(RwLock::new(HashMap::new())),
            catalog,
        }
    }

    /// Reload non-terminal jobs from the catalog into the cache (startup
    /// recovery).
    pub async fn recover(&self) -> CoreResult<usize> {
        let active = self.catalog.jobs().list_active().await.map_err(CoreError::from)?;
        let count = active.len();
        let mut jobs = self.jobs.write().await;
        for job in active {
            jobs.insert(job.id.clone(), job);
        }
        if count > 0 {
            info!("Recovered {} active jobs from the catalog", count);
        }
        Ok(count)
    }

    /// Create a new queued job. This is the only place ids are minted.
    pub async fn create_job(
        &self,
        job_type: JobType,
        prompt: impl Into<String>,
        parameters: HashMap<String, serde_json::Value>,
        project_id: Option<String>,
        character_id: Option<String>,
    ) -> Job {
        let mut job = Job::new(job_type, prompt).with_parameters(parameters);
        job.project_id = project_id;
        job.character_id = character_id;

        self.jobs.write().await.insert(job.id.clone(), job.clone());
        info!("Created job {} ({})", job.id, job.job_type);
        self.write_through(&job).await;
        job
    }

    pub async fn get_job(&self, id: &JobId) -> Option<Job> {
        self.jobs.read().await.get(id).cloned()
    }

    /// Apply a status transition plus optional fields. Violating the state
    /// machine is a `Conflict`.
    pub async fn update_job_status(
        &self,
        id: &JobId,
        status: JobStatus,
        update: JobUpdate,
    ) -> CoreResult<Job> {
        let job = {
            let mut jobs = self.jobs.write().await;
            let job = jobs
                .get_mut(id)
                .ok_or_else(|| CoreError::not_found(format!("job {id}")))?;

            if job.status != status && !job.status.can_transition_to(status) {
                return Err(CoreError::conflict(format!(
                    "invalid job transition {} -> {}",
                    job.status, status
                )));
            }

            // Timestamps are stamped exactly once, on the edge that owns
            // them.
            if job.status == JobStatus::Queued
                && status == JobStatus::Processing
                && job.started_at.is_none()
            {
                job.started_at = Some(Utc::now());
            }
            if !job.status.is_terminal() && status.is_terminal() && job.completed_at.is_none() {
                job.completed_at = Some(Utc::now());
                if let (Some(started), None) = (job.started_at, update.total_time_secs) {
                    job.total_time_secs =
                        Some((Utc::now() - started).num_milliseconds() as f64 / 1000.0);
                }
            }

            job.status = status;
            if let Some(backend_id) = update.backend_id {
                job.backend_id = Some(backend_id);
            }
            if let Some(output_path) = update.output_path {
                job.output_path = Some(output_path);
            }
            if let Some(organized_path) = update.organized_path {
                job.organized_path = Some(organized_path);
            }
            if let Some(error_message) = update.error_message {
                job.error_message = Some(error_message);
            }
            if let Some(total) = update.total_time_secs {
                job.total_time_secs = Some(total);
            }
            job.clone()
        };

        info!("Job {} -> {}", id, status);
        self.write_through(&job).await;
        Ok(job)
    }

    /// Newest first, optional status filter.
    pub async fn list_jobs(&self, status: Option<JobStatus>, limit: usize) -> Vec<Job> {
        let jobs = self.jobs.read().await;
        let mut listed: Vec<Job> = jobs
            .values()
            .filter(|job| status.map_or(true, |s| job.status == s))
            .cloned()
            .collect();
        listed.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        listed.truncate(limit);
        listed
    }

    /// Drop terminal jobs older than the cutoff from cache and catalog.
    pub async fn cleanup_old_jobs(&self, hours: i64) -> usize {
        let cutoff = Utc::now() - Duration::hours(hours);
        let removed = {
            let mut jobs = self.jobs.write().await;
            let before = jobs.len();
            jobs.retain(|_, job| {
                !(job.status.is_terminal()
                    && job.completed_at.is_some_and(|done| done < cutoff))
            });
            before - jobs.len()
        };
        if let Err(e) = self.catalog.jobs().delete_older_than(cutoff).await {
            warn!("Job cleanup write-through failed: {}", e);
        }
        if removed > 0 {
            info!("Cleaned up {} old jobs", removed);
        }
        removed
    }

    pub async fn statistics(&self) -> JobStatistics {
        let jobs = self.jobs.read().await;
        let mut stats = JobStatistics {
            total: jobs.len(),
            ..Default::default()
        };
        for job in jobs.values() {
            *stats
                .by_status
                .entry(job.status.as_str().to_string())
                .or_insert(0) += 1;
            *stats
                .by_type
                .entry(job.job_type.as_str().to_string())
                .or_insert(0) += 1;
        }
        stats
    }

    pub async fn jobs_in_memory(&self) -> usize {
        self.jobs.read().await.len()
    }

    /// Mirror the job to the catalog. The in-memory cache stays
    /// authoritative when this fails - the warning is the contract.
    async fn write_through(&self, job: &Job) {
        if let Err(e) = self.catalog.jobs().save(job).await {
            warn!("Write-through for job {} failed: {}", job.id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn manager() -> JobManager {
        JobManager::new(CatalogStore::memory().await.unwrap())
    }

    #[tokio::test]
    async fn test_lifecycle_stamps_timestamps() {
        let manager = manager().await;
        let job = manager
            .create_job(JobType::Image, "portrait", HashMap::new(), None, None)
            .await;
        assert_eq!(job.status, JobStatus::Queued);
        assert!(job.started_at.is_none());

        let job = manager
            .update_job_status(
                &job.id,
                JobStatus::Processing,
                JobUpdate {
                    backend_id: Some("prompt-1".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(job.started_at.is_some());
        assert!(job.completed_at.is_none());

        let job = manager
            .update_job_status(&job.id, JobStatus::Completed, JobUpdate::default())
            .await
            .unwrap();
        assert!(job.completed_at.is_some());
        assert!(job.completed_at.unwrap() >= job.created_at);
        assert!(job.total_time_secs.is_some());
    }

    #[tokio::test]
    async fn test_invalid_transition_conflicts() {
        let manager = manager().await;
        let job = manager
            .create_job(JobType::Image, "x", HashMap::new(), None, None)
            .await;

        // queued -> completed skips processing.
        let result = manager
            .update_job_status(&job.id, JobStatus::Completed, JobUpdate::default())
            .await;
        assert!(matches!(result, Err(CoreError::Conflict(_))));

        // Terminal states are final.
        manager
            .update_job_status(&job.id, JobStatus::Cancelled, JobUpdate::default())
            .await
            .unwrap();
        let result = manager
            .update_job_status(&job.id, JobStatus::Processing, JobUpdate::default())
            .await;
        assert!(matches!(result, Err(CoreError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_write_through_persists() {
        let catalog = CatalogStore::memory().await.unwrap();
        let manager = JobManager::new(catalog.clone());
        let job = manager
            .create_job(JobType::Video, "clip", HashMap::new(), None, None)
            .await;

        let stored = catalog.jobs().get(&job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Queued);
        assert_eq!(stored.prompt, "clip");
    }

    #[tokio::test]
    async fn test_recover_reloads_active() {
        let catalog = CatalogStore::memory().await.unwrap();
        {
            let manager = JobManager::new(catalog.clone());
            manager
                .create_job(JobType::Image, "survives restart", HashMap::new(), None, None)
                .await;
        }
        let manager = JobManager::new(catalog);
        assert_eq!(manager.jobs_in_memory().await, 0);
        let recovered = manager.recover().await.unwrap();
        assert_eq!(recovered, 1);
        assert_eq!(manager.jobs_in_memory().await, 1);
    }

    #[tokio::test]
    async fn test_cleanup_and_statistics() {
        let manager = manager().await;
        let old = manager
            .create_job(JobType::Image, "old", HashMap::new(), None, None)
            .await;
        manager
            .update_job_status(&old.id, JobStatus::Cancelled, JobUpdate::default())
            .await
            .unwrap();
        // Force the completion timestamp into the past.
        {
            let mut jobs = manager.jobs.write().await;
            jobs.get_mut(&old.id).unwrap().completed_at =
                Some(Utc::now() - Duration::hours(48));
        }
        manager
            .create_job(JobType::Video, "fresh", HashMap::new(), None, None)
            .await;

        let removed = manager.cleanup_old_jobs(24).await;
        assert_eq!(removed, 1);

        let stats = manager.statistics().await;
        assert_eq!(stats.total, 1);
        assert_eq!(stats.by_type.get("video"), Some(&1));
        assert_eq!(stats.by_status.get("queued"), Some(&1));
    }
}
