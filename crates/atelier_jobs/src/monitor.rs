//! Status monitor - one background task polling all running jobs.
//!
//! Every 1.5s each registered job is polled against the backend history.
//! Changed states fan out to subscribers without blocking the poll cycle;
//! progress never moves backward; exceeding the per-type wall-clock bound
//! transitions the job to `timeout`. Cancelled jobs leave the watch set
//! within one cycle.

use crate::manager::{JobManager, JobUpdate};
use atelier_comfy::{ComfyClient, HistoryEntry};
use atelier_protocol::{JobId, JobStatus, JobType, ProgressStatus, ProgressUpdate};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, info, warn};

/// Poll interval for the monitor loop.
pub const POLL_INTERVAL: Duration = Duration::from_millis(1500);

/// What happened to a watched job; the completion pipeline consumes these.
#[derive(Debug)]
pub enum CompletionEvent {
    /// The backend finished and produced these files (relative to its
    /// output directory).
    Finished { job_id: JobId, files: Vec<String> },
    /// The backend reported an error or finished without outputs.
    Failed { job_id: JobId, reason: String },
    /// The wall-clock bound was exceeded.
    TimedOut { job_id: JobId },
}

struct Watched {
    backend_prompt_id: String,
    job_type: JobType,
    started: Instant,
    last_progress: Option<(ProgressStatus, u8)>,
    last_update: Option<ProgressUpdate>,
}

struct Subscriber {
    id: u64,
    tx: mpsc::UnboundedSender<ProgressUpdate>,
}

struct MonitorState {
    watched: HashMap<JobId, Watched>,
    subscribers: HashMap<JobId, Vec<Subscriber>>,
    next_subscriber_id: u64,
}

/// Handle to the monitor. Cheap to clone; `run` drives the loop.
#[derive(Clone)]
pub struct StatusMonitor {
    state: Arc<Mutex<MonitorState>>,
    manager: JobManager,
    comfy: ComfyClient,
    completions: mpsc::UnboundedSender<CompletionEvent>,
}

impl StatusMonitor {
    /// Returns the monitor and the receiving end of the completion events.
    pub fn new(
        manager: JobManager,
        comfy: ComfyClient,
    ) -> (Self, mpsc::UnboundedReceiver<CompletionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                state: Arc::new(Mutex::new(MonitorState {
                    watched: HashMap::new(),
                    subscribers: HashMap::new(),
                    next_subscriber_id: 0,
                })),
                manager,
                comfy,
                completions: tx,
            },
            rx,
        )
    }

    /// Start tracking a submitted job.
    pub async fn register(&self, job_id: JobId, backend_prompt_id: String, job_type: JobType) {
        let mut state = self.state.lock().await;
        state.watched.insert(
            job_id.clone(),
            Watched {
                backend_prompt_id,
                job_type,
                started: Instant::now(),
                last_progress: None,
                last_update: None,
            },
        );
        debug!("Monitoring job {}", job_id);
    }

    /// Stop tracking a job. Idempotent.
    pub async fn unregister(&self, job_id: &JobId) {
        self.state.lock().await.watched.remove(job_id);
    }

    /// Subscribe to a job's progress frames.
    pub async fn subscribe(
        &self,
        job_id: &JobId,
    ) -> (u64, mpsc::UnboundedReceiver<ProgressUpdate>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.state.lock().await;
        state.next_subscriber_id += 1;
        let id = state.next_subscriber_id;
        state
            .subscribers
            .entry(job_id.clone())
            .or_default()
            .push(Subscriber { id, tx });
        (id, rx)
    }

    /// Unsubscribe immediately. Calling twice is a no-op.
    pub async fn unsubscribe(&self, job_id: &JobId, subscriber_id: u64) {
        let mut state = self.state.lock().await;
        if let Some(subscribers) = state.subscribers.get_mut(job_id) {
            subscribers.retain(|s| s.id != subscriber_id);
            if subscribers.is_empty() {
                state.subscribers.remove(job_id);
            }
        }
    }

    /// Last published frame for a job - the reconciliation path for
    /// subscribers that missed messages.
    pub async fn get_progress(&self, job_id: &JobId) -> Option<ProgressUpdate> {
        self.state
            .lock()
            .await
            .watched
            .get(job_id)
            .and_then(|w| w.last_update.clone())
    }

    pub async fn watched_count(&self) -> usize {
        self.state.lock().await.watched.len()
    }

    pub async fn subscriber_count(&self) -> usize {
        self.state
            .lock()
            .await
            .subscribers
            .values()
            .map(Vec::len)
            .sum()
    }

    /// Drive the poll loop until `shutdown` flips to true.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(POLL_INTERVAL);
        info!("Status monitor started");
        loop {
            tokio::select! {
                _ = ticker.tick() => self.poll_cycle().await,
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("Status monitor stopped");
    }

    /// One pass over every watched job.
    pub async fn poll_cycle(&self) {
        let snapshot: Vec<(JobId, String, JobType, Instant)> = {
            let state = self.state.lock().await;
            state
                .watched
                .iter()
                .map(|(id, w)| {
                    (
                        id.clone(),
                        w.backend_prompt_id.clone(),
                        w.job_type,
                        w.started,
                    )
                })
                .collect()
        };

        for (job_id, backend_prompt_id, job_type, started) in snapshot {
            // Cancellation (or any terminal state reached elsewhere) stops
            // monitoring within this cycle.
            match self.manager.get_job(&job_id).await {
                Some(job) if job.status.is_terminal() => {
                    self.unregister(&job_id).await;
                    continue;
                }
                None => {
                    self.unregister(&job_id).await;
                    continue;
                }
                _ => {}
            }

            if started.elapsed() > Duration::from_secs(job_type.timeout_secs()) {
                warn!(
                    "Job {} exceeded its {}s bound, timing out",
                    job_id,
                    job_type.timeout_secs()
                );
                self.publish(
                    &job_id,
                    &backend_prompt_id,
                    ProgressStatus::Failed,
                    100,
                    Some(format!(
                        "generation exceeded {}s wall-clock bound",
                        job_type.timeout_secs()
                    )),
                    started,
                )
                .await;
                self.unregister(&job_id).await;
                let _ = self
                    .completions
                    .send(CompletionEvent::TimedOut { job_id });
                continue;
            }

            let entry = match self.comfy.get_history(&backend_prompt_id).await {
                Ok(entry) => entry,
                Err(e) => {
                    debug!("History poll for {} failed: {}", job_id, e);
                    None
                }
            };

            let (status, percent, error) = derive_progress(entry.as_ref());
            self.publish(&job_id, &backend_prompt_id, status, percent, error, started)
                .await;

            match status {
                ProgressStatus::Completed => {
                    let files = entry.map(|e| e.output_files()).unwrap_or_default();
                    self.unregister(&job_id).await;
                    let _ = self
                        .completions
                        .send(CompletionEvent::Finished { job_id, files });
                }
                ProgressStatus::Failed => {
                    self.unregister(&job_id).await;
                    let _ = self.completions.send(CompletionEvent::Failed {
                        job_id,
                        reason: "backend reported an error".to_string(),
                    });
                }
                _ => {}
            }
        }
    }

    /// Publish one frame if it advances the job's progress. Fan-out never
    /// blocks: per-subscriber channels are unbounded and send failures
    /// (dropped receivers) are ignored.
    async fn publish(
        &self,
        job_id: &JobId,
        backend_prompt_id: &str,
        status: ProgressStatus,
        percent: u8,
        error: Option<String>,
        started: Instant,
    ) {
        let mut state = self.state.lock().await;
        let Some(watched) = state.watched.get_mut(job_id) else {
            return;
        };

        match watched.last_progress {
            // Drop unchanged frames and anything that would move backward.
            Some((last_status, last_percent))
                if last_status == status && last_percent == percent =>
            {
                return
            }
            Some((_, last_percent)) if percent < last_percent => return,
            _ => {}
        }

        watched.last_progress = Some((status, percent));
        let update = ProgressUpdate {
            job_id: job_id.clone(),
            backend_prompt_id: backend_prompt_id.to_string(),
            status,
            progress_percent: percent,
            current_step: None,
            total_steps: None,
            estimated_completion: None,
            generation_time: started.elapsed().as_secs_f64(),
            error_message: error,
            timestamp: Utc::now(),
        };
        watched.last_update = Some(update.clone());

        if let Some(subscribers) = state.subscribers.get(job_id) {
            for subscriber in subscribers {
                let _ = subscriber.tx.send(update.clone());
            }
        }
    }
}

/// Map a history entry (or its absence) to coarse progress.
fn derive_progress(entry: Option<&HistoryEntry>) -> (ProgressStatus, u8, Option<String>) {
    match entry {
        None => (ProgressStatus::Processing, 10, None),
        Some(entry) if entry.is_error() => (
            ProgressStatus::Failed,
            100,
            Some("backend reported an error".to_string()),
        ),
        Some(entry) if entry.is_complete() => (ProgressStatus::Completed, 100, None),
        Some(_) => (ProgressStatus::Processing, 50, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atelier_catalog::CatalogStore;
    use std::collections::HashMap as StdHashMap;

    async fn fixture() -> (StatusMonitor, mpsc::UnboundedReceiver<CompletionEvent>, JobManager)
    {
        let catalog = CatalogStore::memory().await.unwrap();
        let manager = JobManager::new(catalog);
        let comfy = ComfyClient::new("http://127.0.0.1:1");
        let (monitor, completions) = StatusMonitor::new(manager.clone(), comfy);
        (monitor, completions, manager)
    }

    #[tokio::test]
    async fn test_subscribe_unsubscribe_idempotent() {
        let (monitor, _completions, _manager) = fixture().await;
        let job_id = JobId::new();
        let (sub_id, _rx) = monitor.subscribe(&job_id).await;
        assert_eq!(monitor.subscriber_count().await, 1);
        monitor.unsubscribe(&job_id, sub_id).await;
        monitor.unsubscribe(&job_id, sub_id).await;
        assert_eq!(monitor.subscriber_count().await, 0);
    }

    #[tokio::test]
    async fn test_progress_never_moves_backward() {
        let (monitor, _completions, _manager) = fixture().await;
        let job_id = JobId::new();
        monitor
            .register(job_id.clone(), "bp-1".to_string(), JobType::Image)
            .await;
        let (_sub, mut rx) = monitor.subscribe(&job_id).await;

        let started = Instant::now();
        monitor
            .publish(&job_id, "bp-1", ProgressStatus::Processing, 50, None, started)
            .await;
        // A regressed frame is discarded.
        monitor
            .publish(&job_id, "bp-1", ProgressStatus::Processing, 10, None, started)
            .await;
        monitor
            .publish(&job_id, "bp-1", ProgressStatus::Completed, 100, None, started)
            .await;

        let first = rx.recv().await.unwrap();
        assert_eq!(first.progress_percent, 50);
        let second = rx.recv().await.unwrap();
        assert_eq!(second.progress_percent, 100);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_duplicate_frames_dropped() {
        let (monitor, _completions, _manager) = fixture().await;
        let job_id = JobId::new();
        monitor
            .register(job_id.clone(), "bp-1".to_string(), JobType::Image)
            .await;
        let (_sub, mut rx) = monitor.subscribe(&job_id).await;

        let started = Instant::now();
        for _ in 0..3 {
            monitor
                .publish(&job_id, "bp-1", ProgressStatus::Processing, 50, None, started)
                .await;
        }
        assert!(rx.recv().await.is_some());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_cancelled_job_leaves_watch_set() {
        let (monitor, _completions, manager) = fixture().await;
        let job = manager
            .create_job(JobType::Image, "x", StdHashMap::new(), None, None)
            .await;
        monitor
            .register(job.id.clone(), "bp-1".to_string(), JobType::Image)
            .await;
        manager
            .update_job_status(&job.id, JobStatus::Cancelled, JobUpdate::default())
            .await
            .unwrap();

        // One poll cycle is enough to drop it. The history call targets an
        // unroutable port but cancellation is checked first.
        monitor.poll_cycle().await;
        assert_eq!(monitor.watched_count().await, 0);
    }

    #[test]
    fn test_derive_progress() {
        assert!(matches!(
            derive_progress(None),
            (ProgressStatus::Processing, 10, None)
        ));
        let complete: HistoryEntry = serde_json::from_value(serde_json::json!({
            "status": {"completed": true},
            "outputs": {"7": {"images": [{"filename": "a.png"}]}}
        }))
        .unwrap();
        assert!(matches!(
            derive_progress(Some(&complete)),
            (ProgressStatus::Completed, 100, None)
        ));
    }
}
