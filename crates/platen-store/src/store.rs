//! PostgreSQL-backed task store.
//!
//! Every mutating call is a single conditional statement, so state
//! transitions stay linearizable under concurrent callers: an `UPDATE` that
//! matches zero rows means the transition was invalid (or the row is gone),
//! never that the write was silently lost.

use crate::errors::{Result, StoreError};
use crate::task::{Task, TaskStats, TaskStatus};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::time::Duration;
use tracing::{debug, info};

/// Row shape of `pdf_tasks`; converted at the boundary so the rest of the
/// system only sees [`Task`].
#[derive(sqlx::FromRow)]
struct TaskRow {
    task_id: String,
    status: String,
    pdf_url: Option<String>,
    pdf_file_name: Option<String>,
    error: Option<String>,
    created_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl TaskRow {
    fn into_task(self) -> Result<Task> {
        let status = TaskStatus::parse(&self.status).ok_or_else(|| {
            StoreError::Database(sqlx::Error::Decode(
                format!("unknown task status '{}'", self.status).into(),
            ))
        })?;
        Ok(Task {
            task_id: self.task_id,
            status,
            pdf_url: self.pdf_url,
            pdf_file_name: self.pdf_file_name,
            error: self.error,
            created_at: self.created_at,
            completed_at: self.completed_at,
        })
    }
}

const SELECT_COLUMNS: &str =
    "task_id, status, pdf_url, pdf_file_name, error, created_at, completed_at";

/// Durable mapping from task id to task state.
#[derive(Clone)]
pub struct TaskStore {
    pool: PgPool,
}

impl TaskStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates the `pdf_tasks` table and its indexes if absent.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS pdf_tasks (
                task_id TEXT PRIMARY KEY,
                status TEXT NOT NULL,
                pdf_url TEXT,
                pdf_file_name TEXT,
                error TEXT,
                created_at TIMESTAMPTZ NOT NULL,
                completed_at TIMESTAMPTZ
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_pdf_tasks_status ON pdf_tasks (status)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_pdf_tasks_created_at ON pdf_tasks (created_at)")
            .execute(&self.pool)
            .await?;

        info!("Task store schema ready");
        Ok(())
    }

    /// Inserts a new task in `queued` state.
    pub async fn create(&self, task_id: &str) -> Result<Task> {
        let created_at = Utc::now();
        let result = sqlx::query(
            "INSERT INTO pdf_tasks (task_id, status, created_at) VALUES ($1, $2, $3)",
        )
        .bind(task_id)
        .bind(TaskStatus::Queued.as_str())
        .bind(created_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => {
                debug!(task_id = %task_id, "Task created");
                Ok(Task {
                    task_id: task_id.to_string(),
                    status: TaskStatus::Queued,
                    pdf_url: None,
                    pdf_file_name: None,
                    error: None,
                    created_at,
                    completed_at: None,
                })
            }
            Err(sqlx::Error::Database(db))
                if matches!(db.kind(), sqlx::error::ErrorKind::UniqueViolation) =>
            {
                Err(StoreError::Duplicate(task_id.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn get(&self, task_id: &str) -> Result<Task> {
        let row: Option<TaskRow> = sqlx::query_as(&format!(
            "SELECT {SELECT_COLUMNS} FROM pdf_tasks WHERE task_id = $1"
        ))
        .bind(task_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => row.into_task(),
            None => Err(StoreError::NotFound(task_id.to_string())),
        }
    }

    /// Marks a queued task as picked up by a worker. Valid only from
    /// `pending` or `queued`; a second worker hitting the same id gets
    /// `InvalidTransition`.
    pub async fn mark_processing(&self, task_id: &str) -> Result<()> {
        let updated = sqlx::query(
            "UPDATE pdf_tasks SET status = 'processing'
             WHERE task_id = $1 AND status IN ('pending', 'queued')",
        )
        .bind(task_id)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if updated == 0 {
            return Err(self.transition_error(task_id).await);
        }
        debug!(task_id = %task_id, "Task marked processing");
        Ok(())
    }

    /// Records a successful render. Valid only from `processing`.
    pub async fn complete(&self, task_id: &str, pdf_url: &str, pdf_file_name: &str) -> Result<()> {
        let updated = sqlx::query(
            "UPDATE pdf_tasks
             SET status = 'completed', pdf_url = $2, pdf_file_name = $3, completed_at = $4
             WHERE task_id = $1 AND status = 'processing'",
        )
        .bind(task_id)
        .bind(pdf_url)
        .bind(pdf_file_name)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?
        .rows_affected();

        if updated == 0 {
            return Err(self.transition_error(task_id).await);
        }
        info!(task_id = %task_id, pdf_file_name = %pdf_file_name, "Task completed");
        Ok(())
    }

    /// Records a failed render. Valid from any non-terminal state.
    pub async fn fail(&self, task_id: &str, error: &str) -> Result<()> {
        let updated = sqlx::query(
            "UPDATE pdf_tasks SET status = 'failed', error = $2, completed_at = $3
             WHERE task_id = $1 AND status NOT IN ('completed', 'failed')",
        )
        .bind(task_id)
        .bind(error)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?
        .rows_affected();

        if updated == 0 {
            return Err(self.transition_error(task_id).await);
        }
        info!(task_id = %task_id, error = %error, "Task failed");
        Ok(())
    }

    /// Hard delete, used to roll back a submission the queue rejected.
    pub async fn remove(&self, task_id: &str) -> Result<()> {
        let deleted = sqlx::query("DELETE FROM pdf_tasks WHERE task_id = $1")
            .bind(task_id)
            .execute(&self.pool)
            .await?
            .rows_affected();

        if deleted == 0 {
            return Err(StoreError::NotFound(task_id.to_string()));
        }
        debug!(task_id = %task_id, "Task removed");
        Ok(())
    }

    pub async fn list_by_status(&self, status: TaskStatus) -> Result<Vec<Task>> {
        let rows: Vec<TaskRow> = sqlx::query_as(&format!(
            "SELECT {SELECT_COLUMNS} FROM pdf_tasks WHERE status = $1 ORDER BY created_at"
        ))
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TaskRow::into_task).collect()
    }

    /// Aggregate counters in one round trip.
    pub async fn stats(&self) -> Result<TaskStats> {
        let (total, completed, failed, active, avg_secs): (i64, i64, i64, i64, Option<f64>) =
            sqlx::query_as(
                "SELECT
                    COUNT(*),
                    COUNT(*) FILTER (WHERE status = 'completed'),
                    COUNT(*) FILTER (WHERE status = 'failed'),
                    COUNT(*) FILTER (WHERE status IN ('queued', 'processing')),
                    (AVG(EXTRACT(EPOCH FROM (completed_at - created_at)))
                        FILTER (WHERE status = 'completed' AND completed_at IS NOT NULL)
                    )::double precision
                 FROM pdf_tasks",
            )
            .fetch_one(&self.pool)
            .await?;

        Ok(TaskStats {
            total,
            completed,
            failed,
            active,
            average_processing_time: avg_secs.unwrap_or(0.0),
        })
    }

    /// Deletes terminal rows whose `completed_at` is older than the window.
    /// Returns the number of rows removed.
    pub async fn purge_older_than(&self, older_than: Duration) -> Result<u64> {
        let Ok(age) = chrono::Duration::from_std(older_than) else {
            return Ok(0);
        };
        let cutoff = Utc::now() - age;

        let removed = sqlx::query(
            "DELETE FROM pdf_tasks
             WHERE status IN ('completed', 'failed') AND completed_at < $1",
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if removed > 0 {
            info!(removed, cutoff = %cutoff, "Purged old tasks");
        }
        Ok(removed)
    }

    /// Distinguishes a missing row from an invalid transition after a
    /// conditional update matched nothing.
    async fn transition_error(&self, task_id: &str) -> StoreError {
        match self.get(task_id).await {
            Ok(task) => StoreError::InvalidTransition {
                task_id: task_id.to_string(),
                from: task.status.as_str().to_string(),
            },
            Err(e) => e,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_conversion_preserves_fields() {
        let now = Utc::now();
        let row = TaskRow {
            task_id: "t-1".into(),
            status: "completed".into(),
            pdf_url: Some("http://localhost/pdf/a.pdf".into()),
            pdf_file_name: Some("a.pdf".into()),
            error: None,
            created_at: now,
            completed_at: Some(now),
        };

        let task = row.into_task().unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.pdf_file_name.as_deref(), Some("a.pdf"));
        assert_eq!(task.created_at, now);
    }

    #[test]
    fn row_conversion_rejects_unknown_status() {
        let row = TaskRow {
            task_id: "t-2".into(),
            status: "exploded".into(),
            pdf_url: None,
            pdf_file_name: None,
            error: None,
            created_at: Utc::now(),
            completed_at: None,
        };

        assert!(matches!(row.into_task(), Err(StoreError::Database(_))));
    }
}
