mod errors;
mod handlers;
mod models;
mod state;

use crate::state::{AppConfig, AppState};
use axum::{
    routing::{get, post},
    Router,
};
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};

#[derive(Parser)]
#[command(name = "platen-api")]
#[command(about = "Platen HTML-to-PDF rendering service")]
struct Args {
    #[arg(long, default_value = "0.0.0.0:8080")]
    bind: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Tracing first, before anything can log.
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        bind_address = %args.bind,
        "Starting Platen API server"
    );

    let config = AppConfig::from_env()?;
    let state = AppState::new(config).await?;

    let app = Router::new()
        .route("/generate_pdf", post(handlers::generate_pdf))
        .route("/pdf_status/:task_id", get(handlers::pdf_status))
        .route("/health", get(handlers::health))
        .route("/stats", get(handlers::stats))
        .nest_service("/pdf", ServeDir::new(&state.pdf_dir))
        .fallback(handlers::not_found)
        .with_state(state.clone())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = args.bind.parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!(bind_address = %addr, "Platen API server ready");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(state.clone()))
        .await?;

    tracing::info!("Platen API server shutdown complete");
    Ok(())
}

/// Waits for SIGINT or SIGTERM, then tears the service down: housekeeper
/// and workers stop, every engine closes.
async fn shutdown_signal(state: Arc<AppState>) {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut handler) => {
                handler.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        },
    }

    state.service.shutdown().await;
}
