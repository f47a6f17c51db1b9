//! Durable task state for the Platen render service.
//!
//! One PostgreSQL table, `pdf_tasks`, holds every submitted render request.
//! API handlers and render workers coordinate exclusively through this
//! store: the submitter creates a row, the worker that pulled the job is its
//! only writer afterwards, and the housekeeper deletes terminal rows past
//! the retention window.

pub mod errors;
pub mod store;
pub mod task;

pub use errors::StoreError;
pub use store::TaskStore;
pub use task::{Task, TaskStats, TaskStatus};
