//! The submission and query facade the HTTP layer talks to.

use crate::housekeeper::{Housekeeper, HousekeeperConfig};
use crate::job::RenderJob;
use crate::queue::{JobQueue, QueueError};
use crate::worker::RenderWorker;
use platen_browser::{EnginePool, PoolStats};
use platen_store::{StoreError, Task, TaskStats, TaskStatus, TaskStore};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info};
use uuid::Uuid;

/// Configuration for the render service.
#[derive(Clone, Debug)]
pub struct ServiceConfig {
    /// Fixed number of background render workers
    pub worker_count: usize,
    /// Job queue capacity; submissions beyond it are rejected
    pub queue_capacity: usize,
    /// Directory rendered PDFs are written to
    pub pdf_dir: PathBuf,
    pub housekeeper: HousekeeperConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            worker_count: 3,
            queue_capacity: 100,
            pdf_dir: PathBuf::from("./pdf"),
            housekeeper: HousekeeperConfig::default(),
        }
    }
}

/// Result of a successful submission.
#[derive(Debug, Clone)]
pub struct Submission {
    pub task_id: String,
    pub status: TaskStatus,
    pub queue_size: usize,
}

#[derive(Error, Debug)]
pub enum SubmitError {
    /// The queue rejected the job; the task row has been rolled back.
    #[error("job queue is at capacity")]
    QueueFull,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Snapshot served by the health endpoint.
#[derive(Debug, Clone)]
pub struct ServiceHealth {
    pub active_tasks: i64,
    pub queue_size: usize,
    pub pool: PoolStats,
}

/// Snapshot served by the stats endpoint.
#[derive(Debug, Clone)]
pub struct ServiceStats {
    pub tasks: TaskStats,
    pub queue_size: usize,
    pub pool: PoolStats,
}

/// Wires the store, queue, pool, workers and housekeeper together and
/// exposes the four operations the HTTP layer needs.
pub struct RenderService {
    store: TaskStore,
    pool: Arc<EnginePool>,
    queue: JobQueue,
    workers: Vec<tokio::task::JoinHandle<()>>,
    housekeeper: Housekeeper,
    running: Arc<AtomicBool>,
}

impl RenderService {
    /// Starts the workers and housekeeper; the service is live on return.
    pub fn start(config: ServiceConfig, store: TaskStore, pool: Arc<EnginePool>) -> Self {
        let queue = JobQueue::new(config.queue_capacity);
        let running = Arc::new(AtomicBool::new(true));

        let workers = (0..config.worker_count)
            .map(|i| {
                let worker = RenderWorker::new(
                    format!("worker-{i}"),
                    queue.clone(),
                    store.clone(),
                    Arc::clone(&pool),
                    config.pdf_dir.clone(),
                    Arc::clone(&running),
                );
                tokio::spawn(worker.run())
            })
            .collect();

        let housekeeper = Housekeeper::start(Arc::clone(&pool), store.clone(), config.housekeeper);

        info!(
            workers = config.worker_count,
            queue_capacity = config.queue_capacity,
            pdf_dir = %config.pdf_dir.display(),
            "Render service started"
        );

        Self {
            store,
            pool,
            queue,
            workers,
            housekeeper,
            running,
        }
    }

    /// Creates the task row and enqueues the job. If the queue refuses, the
    /// row is deleted again so a rejected submission leaves no trace.
    pub async fn submit(&self, url: String, host_prefix: String) -> Result<Submission, SubmitError> {
        let task_id = Uuid::new_v4().to_string();
        let task = self.store.create(&task_id).await?;

        let job = RenderJob {
            task_id: task_id.clone(),
            url: url.clone(),
            host_prefix,
        };

        if let Err(e) = self.queue.enqueue(job) {
            if let Err(remove_err) = self.store.remove(&task_id).await {
                error!(
                    task_id = %task_id,
                    error = %remove_err,
                    "Failed to roll back task after queue rejection"
                );
            }
            return Err(match e {
                QueueError::Full | QueueError::Closed => SubmitError::QueueFull,
            });
        }

        info!(
            task_id = %task_id,
            url = %url,
            queue_size = self.queue.len(),
            "Render task submitted"
        );

        Ok(Submission {
            task_id,
            status: task.status,
            queue_size: self.queue.len(),
        })
    }

    pub async fn status(&self, task_id: &str) -> Result<Task, StoreError> {
        self.store.get(task_id).await
    }

    pub async fn health(&self) -> Result<ServiceHealth, StoreError> {
        let stats = self.store.stats().await?;
        Ok(ServiceHealth {
            active_tasks: stats.active,
            queue_size: self.queue.len(),
            pool: self.pool.stats().await,
        })
    }

    pub async fn stats(&self) -> Result<ServiceStats, StoreError> {
        Ok(ServiceStats {
            tasks: self.store.stats().await?,
            queue_size: self.queue.len(),
            pool: self.pool.stats().await,
        })
    }

    /// Stops the housekeeper and workers, then closes every engine.
    pub async fn shutdown(&self) {
        info!("Shutting down render service");
        self.running.store(false, Ordering::Relaxed);
        self.housekeeper.shutdown();
        for worker in &self.workers {
            worker.abort();
        }
        self.pool.shutdown().await;
        info!("Render service shutdown complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_config_defaults() {
        let config = ServiceConfig::default();
        assert_eq!(config.worker_count, 3);
        assert_eq!(config.queue_capacity, 100);
        assert_eq!(config.pdf_dir, PathBuf::from("./pdf"));
    }
}
