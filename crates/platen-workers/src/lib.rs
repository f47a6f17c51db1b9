//! Background task execution for the Platen render service.
//!
//! Submissions flow through a bounded in-memory queue to a fixed set of
//! render workers; each worker checks an engine out of the pool, renders,
//! records the outcome in the task store and returns the engine. A periodic
//! housekeeper purges old task rows and drives pool scale-down.

pub mod housekeeper;
pub mod job;
pub mod queue;
pub mod service;
pub mod worker;

pub use housekeeper::{Housekeeper, HousekeeperConfig};
pub use job::RenderJob;
pub use queue::{JobQueue, QueueError};
pub use service::{
    RenderService, ServiceConfig, ServiceHealth, ServiceStats, Submission, SubmitError,
};
pub use worker::RenderWorker;
