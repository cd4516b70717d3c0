//! Job lifecycle: manager (C8), status monitor (C9), and the worker pool.

pub mod manager;
pub mod monitor;
pub mod worker;

pub use manager::{JobManager, JobUpdate};
pub use monitor::{CompletionEvent, StatusMonitor, POLL_INTERVAL};
pub use worker::{spawn_workers, JobQueue, DEFAULT_WORKERS};

use atelier_comfy::ComfyClient;
use atelier_protocol::{CoreResult, Job, JobId, JobStatus};
use tracing::info;

/// Cancel a job: the local state flips immediately, monitoring stops
/// within one poll cycle, the catalog records "Cancelled by user", and the
/// backend interrupt is best-effort - the backend may continue briefly.
pub async fn cancel_job(
    manager: &JobManager,
    monitor: &StatusMonitor,
    comfy: &ComfyClient,
    job_id: &JobId,
) -> CoreResult<Job> {
    let job = manager
        .update_job_status(
            job_id,
            JobStatus::Cancelled,
            JobUpdate {
                error_message: Some("Cancelled by user".to_string()),
                ..Default::default()
            },
        )
        .await?;

    monitor.unregister(job_id).await;

    if comfy.interrupt().await {
        info!("Backend interrupt acknowledged for job {}", job_id);
    } else {
        info!("Backend interrupt for job {} was not acknowledged", job_id);
    }

    Ok(job)
}

#[cfg(test)]
mod tests {
    use super::*;
    use atelier_catalog::CatalogStore;
    use atelier_protocol::JobType;
    use std::collections::HashMap;

    #[tokio::test]
    async fn test_cancel_sets_error_and_unregisters() {
        let catalog = CatalogStore::memory().await.unwrap();
        let manager = JobManager::new(catalog.clone());
        let comfy = ComfyClient::new("http://127.0.0.1:1");
        let (monitor, _completions) = StatusMonitor::new(manager.clone(), comfy.clone());

        let job = manager
            .create_job(JobType::Image, "x", HashMap::new(), None, None)
            .await;
        monitor
            .register(job.id.clone(), "bp-1".to_string(), JobType::Image)
            .await;

        // Interrupt fails (nothing listens on port 1) but cancellation is
        // still immediate.
        let cancelled = cancel_job(&manager, &monitor, &comfy, &job.id)
            .await
            .unwrap();
        assert_eq!(cancelled.status, JobStatus::Cancelled);
        assert_eq!(cancelled.error_message.as_deref(), Some("Cancelled by user"));
        assert!(cancelled.completed_at.is_some());
        assert_eq!(monitor.watched_count().await, 0);

        // The write-through carried the cancellation to the catalog.
        let stored = catalog.jobs().get(&job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Cancelled);
    }
}
