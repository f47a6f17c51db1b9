use thiserror::Error;

/// Failures surfaced by the task store.
#[derive(Error, Debug)]
pub enum StoreError {
    /// A task with this id already exists.
    #[error("task {0} already exists")]
    Duplicate(String),

    /// No task with this id.
    #[error("task {0} not found")]
    NotFound(String),

    /// The row exists but is not in a state the requested transition
    /// accepts (e.g. completing a task that is not processing).
    #[error("task {task_id} cannot transition from '{from}'")]
    InvalidTransition { task_id: String, from: String },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;
