//! Fixed-capacity worker pool draining the generation queue.
//!
//! Workers are generic over the job handler: each worker pops one job id,
//! runs the handler to completion (resolve → compose → submit → hand off to
//! the monitor), and moves on. Workers never block on job completion -
//! that belongs to the completion pipeline fed by the monitor.

use atelier_protocol::JobId;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::info;

/// Default worker count.
pub const DEFAULT_WORKERS: usize = 3;
/// Queue depth before enqueues start failing fast.
const QUEUE_CAPACITY: usize = 256;

/// Sending half of the generation queue.
#[derive(Clone)]
pub struct JobQueue {
    tx: mpsc::Sender<JobId>,
}

impl JobQueue {
    /// Enqueue a job for the worker pool. Errors when the queue is full or
    /// the pool shut down.
    pub async fn enqueue(&self, job_id: JobId) -> Result<(), JobId> {
        self.tx.try_send(job_id).map_err(|e| match e {
            mpsc::error::TrySendError::Full(id) => id,
            mpsc::error::TrySendError::Closed(id) => id,
        })
    }

    /// Rough queue position for a newly enqueued job.
    pub fn depth(&self) -> usize {
        QUEUE_CAPACITY - self.tx.capacity()
    }
}

/// Spawn `count` workers over a shared queue. The handler runs one job at a
/// time per worker.
pub fn spawn_workers<F, Fut>(count: usize, handler: F) -> JobQueue
where
    F: Fn(JobId) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let (tx, rx) = mpsc::channel::<JobId>(QUEUE_CAPACITY);
    let rx = Arc::new(Mutex::new(rx));
    let handler = Arc::new(handler);

    let count = if count == 0 { DEFAULT_WORKERS } else { count };
    for worker_id in 0..count {
        let rx = Arc::clone(&rx);
        let handler = Arc::clone(&handler);
        tokio::spawn(async move {
            info!("Worker {} started", worker_id);
            loop {
                let job_id = {
                    let mut rx = rx.lock().await;
                    rx.recv().await
                };
                let Some(job_id) = job_id else {
                    break;
                };
                handler(job_id).await;
            }
            info!("Worker {} stopped", worker_id);
        });
    }

    JobQueue { tx }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_workers_drain_queue() {
        let processed = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&processed);
        let queue = spawn_workers(3, move |_job_id| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        for _ in 0..10 {
            queue.enqueue(JobId::new()).await.unwrap();
        }

        // Workers run on the same runtime; give them a few polls.
        for _ in 0..50 {
            if processed.load(Ordering::SeqCst) == 10 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(processed.load(Ordering::SeqCst), 10);
    }

    #[tokio::test]
    async fn test_jobs_process_one_at_a_time_per_worker() {
        let concurrent = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let (c, p) = (Arc::clone(&concurrent), Arc::clone(&peak));
        let queue = spawn_workers(1, move |_job_id| {
            let (c, p) = (Arc::clone(&c), Arc::clone(&p));
            async move {
                let now = c.fetch_add(1, Ordering::SeqCst) + 1;
                p.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(std::time::Duration::from_millis(5)).await;
                c.fetch_sub(1, Ordering::SeqCst);
            }
        });

        for _ in 0..5 {
            queue.enqueue(JobId::new()).await.unwrap();
        }
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }
}
