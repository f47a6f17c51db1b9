use anyhow::{Context, Result};
use platen_browser::{discover_executable, ChromiumLauncher, EnginePool, PoolConfig, RenderConfig};
use platen_store::TaskStore;
use platen_workers::{RenderService, ServiceConfig};
use sqlx::postgres::PgPoolOptions;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Application configuration, resolved from the environment at startup.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database_url: String,
    pub pdf_dir: PathBuf,
    pub pool: PoolConfig,
    pub render: RenderConfig,
    pub service: ServiceConfig,
}

impl AppConfig {
    /// Reads `DATABASE_URL` (required), `CHROMIUM_PATH`/`PDF_DIR` and the
    /// optional sizing overrides.
    pub fn from_env() -> Result<Self> {
        let database_url =
            std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
        let pdf_dir = std::env::var("PDF_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./pdf"));

        let mut pool = PoolConfig::default();
        if let Some(v) = env_usize("MIN_INSTANCES") {
            pool.min_instances = v;
        }
        if let Some(v) = env_usize("MAX_INSTANCES") {
            pool.max_instances = v;
        }

        let render = RenderConfig {
            executable: discover_executable(),
            ..RenderConfig::default()
        };

        let mut service = ServiceConfig {
            pdf_dir: pdf_dir.clone(),
            ..ServiceConfig::default()
        };
        if let Some(v) = env_usize("WORKER_COUNT") {
            service.worker_count = v;
        }
        if let Some(v) = env_usize("QUEUE_CAPACITY") {
            service.queue_capacity = v;
        }

        Ok(Self {
            database_url,
            pdf_dir,
            pool,
            render,
            service,
        })
    }
}

fn env_usize(key: &str) -> Option<usize> {
    std::env::var(key).ok()?.parse().ok()
}

/// Shared state behind every request handler.
pub struct AppState {
    pub service: RenderService,
    pub pdf_dir: PathBuf,
}

impl AppState {
    /// Brings up every dependency: artifact directory, database schema,
    /// engine pool warm-up, workers and housekeeper.
    pub async fn new(config: AppConfig) -> Result<Arc<Self>> {
        let pdf_dir = std::path::absolute(&config.pdf_dir)
            .unwrap_or_else(|_| config.pdf_dir.clone());
        tokio::fs::create_dir_all(&pdf_dir)
            .await
            .with_context(|| format!("failed to create PDF directory {}", pdf_dir.display()))?;
        info!(pdf_dir = %pdf_dir.display(), "PDF directory ready");

        let pg = PgPoolOptions::new()
            .max_connections(10)
            .connect(&config.database_url)
            .await
            .context("failed to connect to PostgreSQL")?;
        let store = TaskStore::new(pg);
        store.migrate().await.context("failed to run schema setup")?;

        match &config.render.executable {
            Some(path) => info!(executable = %path.display(), "Using Chromium executable"),
            None => info!("No Chromium executable configured, relying on auto-detection"),
        }

        let launcher = Arc::new(ChromiumLauncher::new(config.render.clone()));
        let pool = Arc::new(EnginePool::new(launcher, config.pool.clone()));

        let mut service_config = config.service.clone();
        service_config.pdf_dir = pdf_dir.clone();
        let service = RenderService::start(service_config, store, pool);

        Ok(Arc::new(Self { service, pdf_dir }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // One test so the env-var mutations cannot race each other.
    #[test]
    fn config_requires_database_url_and_defaults_the_rest() {
        std::env::remove_var("DATABASE_URL");
        assert!(AppConfig::from_env().is_err());

        std::env::set_var("DATABASE_URL", "postgres://localhost/platen");
        std::env::remove_var("MIN_INSTANCES");
        std::env::remove_var("MAX_INSTANCES");

        let config = AppConfig::from_env().unwrap();
        assert_eq!(config.pool.min_instances, 3);
        assert_eq!(config.pool.max_instances, 20);
        assert_eq!(config.service.worker_count, 3);
        assert_eq!(config.pdf_dir, PathBuf::from("./pdf"));

        std::env::remove_var("DATABASE_URL");
    }
}
