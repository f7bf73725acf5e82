//! API Server Module
//!
//! Router assembly and the listener loop.

use anyhow::Result;
use axum::{
    routing::{get, post},
    Router,
};
use meterml_core::MeteredService;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::handlers::{
    get_balance, get_metadata, health_check, predict, top_up, train_from_file, train_from_upload,
    ApiState,
};
use crate::models::ApiConfig;

/// Main API server
pub struct ApiServer {
    /// Server configuration
    config: ApiConfig,
    /// Shared state
    state: Arc<ApiState>,
}

impl ApiServer {
    /// Create a new API server
    pub fn new(config: ApiConfig, service: Arc<MeteredService>) -> Self {
        let state = Arc::new(ApiState {
            service,
            version: config.version.clone(),
        });

        Self { config, state }
    }

    /// Routes with shared state and request tracing
    pub fn router(&self) -> Router {
        Router::new()
            .route("/health", get(health_check))
            // Metered operations
            .route("/metadata", get(get_metadata))
            .route("/train/fromfile", post(train_from_file))
            .route("/train/upload", post(train_from_upload))
            .route("/predict", post(predict))
            // Account operations
            .route("/balance/:username", get(get_balance))
            .route("/balance/:username/topup", post(top_up))
            .layer(TraceLayer::new_for_http())
            .with_state(Arc::clone(&self.state))
    }

    /// Start the API server and run until Ctrl-C
    pub async fn start(&self) -> Result<()> {
        let addr = self.config.bind_address()?;
        let app = self.router();

        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!("MeterML API server listening on {}", listener.local_addr()?);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| anyhow::anyhow!("Failed to start API server: {}", e))?;

        info!("MeterML API server stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
