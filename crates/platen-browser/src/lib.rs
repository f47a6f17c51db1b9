//! Headless Chromium engine management for the Platen render service.
//!
//! This crate owns everything between "we need a PDF of this URL" and the
//! Chromium processes that produce it:
//!
//! - [`EnginePool`]: an elastic pool of warm browser engines with bounded
//!   reuse, contention-driven scale-up and idle scale-down.
//! - [`ChromiumLauncher`]: launches engines with the service's flag set and
//!   a unique profile directory per instance.
//! - [`RenderEngine`] / [`EngineLauncher`]: the seam between pool policy
//!   and browser plumbing, so the pool can be exercised without Chromium.

pub mod config;
pub mod engine;
pub mod launcher;
pub mod pool;

pub use config::{PoolConfig, RenderConfig};
pub use engine::{EngineLauncher, RenderEngine};
pub use launcher::{discover_executable, ChromiumLauncher};
pub use pool::{EnginePool, PoolError, PoolStats};
