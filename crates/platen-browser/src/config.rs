use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the render engine pool.
#[derive(Clone, Debug)]
pub struct PoolConfig {
    /// Minimum number of engines kept alive while the pool is running
    pub min_instances: usize,
    /// Hard cap on concurrent engines
    pub max_instances: usize,
    /// Renders an engine may serve before it is retired
    pub max_uses: u32,
    /// Maximum engine lifetime regardless of use count
    pub max_age: Duration,
    /// Overall deadline for `acquire` before it fails with `Exhausted`
    pub acquire_timeout: Duration,
    /// Sleep between re-checks while waiting for a released engine
    pub acquire_poll_interval: Duration,
    /// Minimum spacing between scale events (each direction gated separately)
    pub min_scale_interval: Duration,
    /// Idle time after which an engine above the minimum may be retired
    pub scale_down_idle: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_instances: 3,
            max_instances: 20,
            max_uses: 3,
            max_age: Duration::from_secs(600),
            acquire_timeout: Duration::from_secs(10),
            acquire_poll_interval: Duration::from_millis(100),
            min_scale_interval: Duration::from_secs(30),
            scale_down_idle: Duration::from_secs(300),
        }
    }
}

/// Configuration for a single render operation.
#[derive(Clone, Debug)]
pub struct RenderConfig {
    /// Viewport applied to every page before navigation
    pub viewport_width: u32,
    pub viewport_height: u32,
    /// User agent presented to the target site
    pub user_agent: String,
    /// Navigation deadline (goto + load)
    pub nav_timeout: Duration,
    /// Paper size in inches (A4)
    pub paper_width: f64,
    pub paper_height: f64,
    /// Uniform page margin in inches
    pub margin: f64,
    /// Explicit Chromium executable; `None` lets chromiumoxide detect one
    pub executable: Option<PathBuf>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            viewport_width: 1024,
            viewport_height: 768,
            user_agent: concat!(
                "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 ",
                "(KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36 Platen"
            )
            .to_string(),
            nav_timeout: Duration::from_secs(30),
            paper_width: 8.27,
            paper_height: 11.69,
            margin: 0.5,
            executable: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_config_defaults() {
        let config = PoolConfig::default();
        assert_eq!(config.min_instances, 3);
        assert_eq!(config.max_instances, 20);
        assert_eq!(config.max_uses, 3);
        assert_eq!(config.acquire_timeout, Duration::from_secs(10));
        assert!(config.acquire_poll_interval <= Duration::from_millis(100));
    }

    #[test]
    fn render_config_defaults() {
        let config = RenderConfig::default();
        assert_eq!(config.viewport_width, 1024);
        assert_eq!(config.viewport_height, 768);
        assert_eq!(config.nav_timeout, Duration::from_secs(30));
        assert!(config.executable.is_none());
    }
}
