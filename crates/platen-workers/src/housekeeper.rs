//! Periodic maintenance: pool scale-down and task retention.

use platen_browser::EnginePool;
use platen_store::TaskStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, sleep};
use tracing::{error, info};

#[derive(Clone, Debug)]
pub struct HousekeeperConfig {
    /// How often the pool is checked for idle engines to retire
    pub scale_down_interval: Duration,
    /// How often terminal task rows are swept
    pub sweep_interval: Duration,
    /// Age past which terminal rows are deleted
    pub retention: Duration,
}

impl Default for HousekeeperConfig {
    fn default() -> Self {
        Self {
            scale_down_interval: Duration::from_secs(10),
            sweep_interval: Duration::from_secs(300),
            retention: Duration::from_secs(3600),
        }
    }
}

/// Owns the two periodic background tasks. Both run until aborted by
/// [`Housekeeper::shutdown`]; neither ever propagates an error.
pub struct Housekeeper {
    tasks: Vec<tokio::task::JoinHandle<()>>,
}

impl Housekeeper {
    pub fn start(pool: Arc<EnginePool>, store: TaskStore, config: HousekeeperConfig) -> Self {
        let monitor = {
            let pool = Arc::clone(&pool);
            let period = config.scale_down_interval;
            tokio::spawn(async move {
                let mut ticker = interval(period);
                ticker.tick().await; // first tick is immediate
                loop {
                    ticker.tick().await;
                    pool.scale_down_check().await;
                }
            })
        };

        let sweeper = {
            let retention = config.retention;
            let period = config.sweep_interval;
            tokio::spawn(async move {
                let mut ticker = interval(period);
                ticker.tick().await;
                loop {
                    ticker.tick().await;
                    match store.purge_older_than(retention).await {
                        Ok(removed) => {
                            info!(removed, "Task retention sweep complete");
                        }
                        Err(e) => {
                            error!(error = %e, "Task retention sweep failed");
                            sleep(Duration::from_secs(5)).await;
                        }
                    }
                }
            })
        };

        info!(
            scale_down_interval_secs = config.scale_down_interval.as_secs(),
            sweep_interval_secs = config.sweep_interval.as_secs(),
            retention_secs = config.retention.as_secs(),
            "Housekeeper started"
        );

        Self {
            tasks: vec![monitor, sweeper],
        }
    }

    /// Cancels both periodic tasks.
    pub fn shutdown(&self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

impl Drop for Housekeeper {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_service_cadence() {
        let config = HousekeeperConfig::default();
        assert_eq!(config.scale_down_interval, Duration::from_secs(10));
        assert_eq!(config.sweep_interval, Duration::from_secs(300));
        assert_eq!(config.retention, Duration::from_secs(3600));
    }
}
