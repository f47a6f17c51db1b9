use anyhow::Result;
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

/// One live render engine: a headless browser process that can load a URL
/// and print it to a PDF file.
///
/// Implementations must tolerate `close` being called more than once and
/// must not propagate shutdown errors: a dying browser is logged, not
/// surfaced.
#[async_trait]
pub trait RenderEngine: Send + Sync {
    /// Render `url` to a PDF written at `output`.
    async fn render_pdf(&self, url: &str, output: &Path) -> Result<()>;

    /// Attempt an orderly shutdown of the underlying browser process.
    async fn close(&self);
}

/// Factory for render engines, injected into the pool.
///
/// The production implementation launches Chromium; tests substitute a stub
/// so pool policy can be exercised without a browser binary.
#[async_trait]
pub trait EngineLauncher: Send + Sync {
    async fn launch(&self) -> Result<Arc<dyn RenderEngine>>;
}

impl std::fmt::Debug for dyn RenderEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn RenderEngine")
    }
}
