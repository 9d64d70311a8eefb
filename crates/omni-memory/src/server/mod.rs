//! HTTP surface
//!
//! Exposes the two memory tools plus health and stats routes:
//! - `GET /health`
//! - `GET /tools` for tool definitions
//! - `POST /tools/semantic-storage` and `POST /tools/semantic-recall`
//! - `GET /stats` for record counts
//!
//! Tool routes answer 200 with an envelope for every outcome. Only a body
//! that cannot be read as JSON is rejected by the extractor.

pub mod handlers;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;
use crate::error::{MemoryError, Result};
use crate::tools::MemoryTools;

/// Shared application state for all handlers
pub struct AppState {
    pub tools: MemoryTools,
}

/// Create the router with all routes configured
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health_handler))
        .route("/tools", get(handlers::definitions_handler))
        .route("/tools/semantic-storage", post(handlers::store_handler))
        .route("/tools/semantic-recall", post(handlers::recall_handler))
        .route("/stats", get(handlers::stats_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve until ctrl-c or SIGTERM
pub async fn serve(config: &ServerConfig, state: Arc<AppState>) -> Result<()> {
    let addr: SocketAddr = config
        .listen_addr
        .parse()
        .map_err(|e| MemoryError::Config(format!("Invalid listen address: {e}")))?;

    let app = create_router(state);

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| MemoryError::Config(format!("Failed to bind to {addr}: {e}")))?;

    tracing::info!("Memory server listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Memory server shut down gracefully");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {e}");
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
}
