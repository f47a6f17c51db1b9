//! Render worker: turns queued jobs into completed or failed tasks.

use crate::job::RenderJob;
use crate::queue::JobQueue;
use platen_browser::EnginePool;
use platen_store::TaskStore;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// One background consumer of the job queue.
///
/// Nothing thrown inside the loop escapes it: render and pool failures are
/// recorded on the task, store failures while recording are logged, and the
/// worker moves on to the next job either way.
pub struct RenderWorker {
    id: String,
    queue: JobQueue,
    store: TaskStore,
    pool: Arc<EnginePool>,
    pdf_dir: PathBuf,
    running: Arc<AtomicBool>,
}

impl RenderWorker {
    pub fn new(
        id: String,
        queue: JobQueue,
        store: TaskStore,
        pool: Arc<EnginePool>,
        pdf_dir: PathBuf,
        running: Arc<AtomicBool>,
    ) -> Self {
        Self {
            id,
            queue,
            store,
            pool,
            pdf_dir,
            running,
        }
    }

    /// Main worker loop. Exits when the service stops or the queue closes.
    pub async fn run(self) {
        info!(worker_id = %self.id, "Render worker started");

        while self.running.load(Ordering::Relaxed) {
            match self.queue.next_job().await {
                Some(job) => self.process(job).await,
                None => break,
            }
        }

        info!(worker_id = %self.id, "Render worker stopped");
    }

    async fn process(&self, job: RenderJob) {
        debug!(
            worker_id = %self.id,
            task_id = %job.task_id,
            url = %job.url,
            "Processing render job"
        );

        // A task that cannot be moved to processing must not be rendered:
        // the completion write is conditional on that state, so rendering
        // anyway would strand the row and orphan the artifact.
        if let Err(e) = self.store.mark_processing(&job.task_id).await {
            warn!(
                task_id = %job.task_id,
                error = %e,
                "Failed to mark task processing, skipping render"
            );
            self.record_failure(&job.task_id, &format!("store: {e}")).await;
            return;
        }

        let (engine, handle_id) = match self.pool.acquire().await {
            Ok(acquired) => acquired,
            Err(e) => {
                error!(task_id = %job.task_id, error = %e, "Engine acquire failed");
                self.record_failure(&job.task_id, &format!("pool: {e}")).await;
                return;
            }
        };

        let file_name = format!("{}.pdf", Uuid::new_v4());
        let output = self.pdf_dir.join(&file_name);
        let started = Instant::now();

        match engine.render_pdf(&job.url, &output).await {
            Ok(()) => {
                let pdf_url = format!("{}pdf/{}", job.host_prefix, file_name);
                info!(
                    worker_id = %self.id,
                    task_id = %job.task_id,
                    pdf_url = %pdf_url,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Render completed"
                );
                if let Err(e) = self.store.complete(&job.task_id, &pdf_url, &file_name).await {
                    error!(task_id = %job.task_id, error = %e, "Failed to record completion");
                }
            }
            Err(e) => {
                warn!(
                    worker_id = %self.id,
                    task_id = %job.task_id,
                    error = %e,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Render failed"
                );
                self.record_failure(&job.task_id, &e.to_string()).await;
            }
        }

        // The engine goes back whatever happened above.
        self.pool.release(handle_id).await;
    }

    async fn record_failure(&self, task_id: &str, message: &str) {
        if let Err(e) = self.store.fail(task_id, message).await {
            error!(task_id = %task_id, error = %e, "Failed to record task failure");
        }
    }
}
