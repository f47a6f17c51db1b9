//! Bounded in-memory job queue.
//!
//! Jobs are dequeued in enqueue order; there is no priority. When the queue
//! is at capacity enqueue fails fast so the submitter can roll the task row
//! back and tell the client to retry later.

use crate::job::RenderJob;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::Mutex;
use tracing::debug;

#[derive(Error, Debug)]
pub enum QueueError {
    /// The queue is at capacity.
    #[error("job queue is full")]
    Full,

    /// All consumers are gone; the service is shutting down.
    #[error("job queue is closed")]
    Closed,
}

/// FIFO of pending render jobs with a hard capacity.
#[derive(Clone)]
pub struct JobQueue {
    tx: mpsc::Sender<RenderJob>,
    rx: Arc<Mutex<mpsc::Receiver<RenderJob>>>,
}

impl JobQueue {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity);
        Self {
            tx,
            rx: Arc::new(Mutex::new(rx)),
        }
    }

    /// Adds a job, failing fast with [`QueueError::Full`] at capacity.
    pub fn enqueue(&self, job: RenderJob) -> Result<(), QueueError> {
        match self.tx.try_send(job) {
            Ok(()) => {
                debug!(queue_size = self.len(), "Job enqueued");
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(_)) => Err(QueueError::Full),
            Err(mpsc::error::TrySendError::Closed(_)) => Err(QueueError::Closed),
        }
    }

    /// Takes the next job, waiting while the queue is empty. `None` means
    /// the queue has been closed.
    ///
    /// Workers share one receiver behind a mutex, so each job is handed to
    /// exactly one of them.
    pub async fn next_job(&self) -> Option<RenderJob> {
        let mut rx = self.rx.lock().await;
        rx.recv().await
    }

    /// Number of jobs currently waiting.
    pub fn len(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.tx.max_capacity()
    }
}
