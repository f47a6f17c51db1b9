//! Chromium-backed implementation of the engine traits.

use crate::config::RenderConfig;
use crate::engine::{EngineLauncher, RenderEngine};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::emulation::{
    SetDeviceMetricsOverrideParams, SetUserAgentOverrideParams,
};
use chromiumoxide::cdp::browser_protocol::page::PrintToPdfParams;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Flags every engine is launched with. The backgrounding flags matter for
/// long-lived reuse: a throttled renderer produces blank or truncated PDFs.
const LAUNCH_FLAGS: &[&str] = &[
    "--no-sandbox",
    "--disable-setuid-sandbox",
    "--disable-dev-shm-usage",
    "--disable-gpu",
    "--disable-extensions",
    "--disable-plugins",
    "--no-first-run",
    "--no-default-browser-check",
    "--disable-background-timer-throttling",
    "--disable-backgrounding-occluded-windows",
    "--disable-renderer-backgrounding",
];

/// Well-known install locations checked before falling back to `$PATH`.
const EXECUTABLE_CANDIDATES: &[&str] = &[
    "/usr/bin/chromium",
    "/usr/bin/chromium-browser",
    "/usr/bin/google-chrome",
    "/usr/bin/google-chrome-stable",
    "/snap/bin/chromium",
];

const PATH_NAMES: &[&str] = &["chromium", "chromium-browser", "google-chrome", "chrome"];

/// Locates a Chromium executable: `CHROMIUM_PATH` wins, then the candidate
/// list, then a `$PATH` lookup. `None` means chromiumoxide's own detection
/// gets to try.
pub fn discover_executable() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("CHROMIUM_PATH") {
        return Some(PathBuf::from(path));
    }

    for candidate in EXECUTABLE_CANDIDATES {
        let path = Path::new(candidate);
        if path.exists() {
            return Some(path.to_path_buf());
        }
    }

    let path_var = std::env::var_os("PATH")?;
    for dir in std::env::split_paths(&path_var) {
        for name in PATH_NAMES {
            let candidate = dir.join(name);
            if candidate.exists() {
                return Some(candidate);
            }
        }
    }

    None
}

/// Launches Chromium engines for the pool.
pub struct ChromiumLauncher {
    render_config: RenderConfig,
}

impl ChromiumLauncher {
    pub fn new(render_config: RenderConfig) -> Self {
        Self { render_config }
    }
}

#[async_trait]
impl EngineLauncher for ChromiumLauncher {
    async fn launch(&self) -> Result<Arc<dyn RenderEngine>> {
        // Chrome enforces SingletonLock at the profile level, so every
        // concurrent instance needs its own user-data directory.
        let profile_dir =
            TempDir::new().map_err(|e| anyhow!("failed to create profile directory: {}", e))?;

        let mut builder = BrowserConfig::builder();
        for flag in LAUNCH_FLAGS {
            builder = builder.arg(*flag);
        }
        if let Some(executable) = &self.render_config.executable {
            builder = builder.chrome_executable(executable);
        }

        let mut browser_config = builder
            .build()
            .map_err(|e| anyhow!("failed to build browser config: {}", e))?;
        browser_config.user_data_dir = Some(profile_dir.path().to_path_buf());

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .context("failed to launch Chromium")?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!(error = %e, "Browser event error");
                }
            }
        });

        debug!(profile_dir = ?profile_dir.path(), "Launched Chromium engine");

        Ok(Arc::new(ChromiumEngine {
            browser: Mutex::new(browser),
            handler_task,
            render_config: self.render_config.clone(),
            _profile_dir: profile_dir,
        }))
    }
}

/// One live Chromium process driven over CDP.
pub struct ChromiumEngine {
    browser: Mutex<Browser>,
    handler_task: tokio::task::JoinHandle<()>,
    render_config: RenderConfig,
    // Keeps the profile directory alive for the browser's lifetime.
    _profile_dir: TempDir,
}

impl ChromiumEngine {
    async fn drive_page(&self, page: &Page, url: &str, output: &Path) -> Result<()> {
        page.execute(
            SetUserAgentOverrideParams::builder()
                .user_agent(self.render_config.user_agent.clone())
                .build()
                .map_err(|e| anyhow!("failed to build user agent params: {}", e))?,
        )
        .await
        .context("failed to set user agent")?;

        page.execute(
            SetDeviceMetricsOverrideParams::builder()
                .width(self.render_config.viewport_width as i64)
                .height(self.render_config.viewport_height as i64)
                .device_scale_factor(1.0)
                .mobile(false)
                .build()
                .map_err(|e| anyhow!("failed to build viewport params: {}", e))?,
        )
        .await
        .context("failed to set viewport")?;

        let navigation = async {
            page.goto(url).await.context("navigation failed")?;
            page.wait_for_navigation()
                .await
                .context("page failed to load")?;
            Ok::<_, anyhow::Error>(())
        };
        tokio::time::timeout(self.render_config.nav_timeout, navigation)
            .await
            .map_err(|_| {
                anyhow!(
                    "navigation timed out after {}s",
                    self.render_config.nav_timeout.as_secs()
                )
            })??;

        let params = PrintToPdfParams {
            print_background: Some(false),
            prefer_css_page_size: Some(true),
            paper_width: Some(self.render_config.paper_width),
            paper_height: Some(self.render_config.paper_height),
            margin_top: Some(self.render_config.margin),
            margin_bottom: Some(self.render_config.margin),
            margin_left: Some(self.render_config.margin),
            margin_right: Some(self.render_config.margin),
            ..Default::default()
        };
        let pdf = page.pdf(params).await.context("failed to print page")?;

        tokio::fs::write(output, &pdf)
            .await
            .with_context(|| format!("failed to write {}", output.display()))?;

        debug!(url = %url, output = ?output, bytes = pdf.len(), "Rendered PDF");
        Ok(())
    }
}

#[async_trait]
impl RenderEngine for ChromiumEngine {
    async fn render_pdf(&self, url: &str, output: &Path) -> Result<()> {
        let page = {
            let browser = self.browser.lock().await;
            browser
                .new_page("about:blank")
                .await
                .context("failed to open page")?
        };

        let result = self.drive_page(&page, url, output).await;

        if let Err(e) = page.close().await {
            debug!(error = %e, "Failed to close page");
        }

        result
    }

    async fn close(&self) {
        let mut browser = self.browser.lock().await;
        if let Err(e) = browser.close().await {
            warn!(error = %e, "Error closing browser");
        }
        self.handler_task.abort();
    }
}

impl Drop for ChromiumEngine {
    fn drop(&mut self) {
        self.handler_task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn launch_flags_cover_required_set() {
        for required in [
            "--no-sandbox",
            "--disable-setuid-sandbox",
            "--disable-dev-shm-usage",
            "--disable-gpu",
            "--disable-renderer-backgrounding",
        ] {
            assert!(LAUNCH_FLAGS.contains(&required), "missing {required}");
        }
    }

    #[test]
    fn chromium_path_env_takes_precedence() {
        // Temporarily point CHROMIUM_PATH at a known value.
        std::env::set_var("CHROMIUM_PATH", "/opt/chromium/chrome");
        let found = discover_executable();
        std::env::remove_var("CHROMIUM_PATH");
        assert_eq!(found, Some(PathBuf::from("/opt/chromium/chrome")));
    }
}
