//! Request and response bodies

use meterml_core::config::ServerConfig;
use meterml_core::{FeatureRow, TrainingMetrics, TrainingOutcome};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use uuid::Uuid;

/// Listener settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
    pub version: String,
}

impl ApiConfig {
    pub fn bind_address(&self) -> anyhow::Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid listen address {}:{}: {}", self.host, self.port, e))
    }
}

impl From<&ServerConfig> for ApiConfig {
    fn from(server: &ServerConfig) -> Self {
        Self {
            host: server.host.clone(),
            port: server.port,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Credentials carried on metered routes
#[derive(Debug, Clone, Deserialize)]
pub struct CredentialsQuery {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrainFileQuery {
    pub username: String,
    pub password: String,
    /// File name inside the data directory; the configured default when absent
    pub dataset: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainResponse {
    pub message: String,
    pub metrics: TrainingMetrics,
    pub model_id: Uuid,
    pub published: bool,
    pub train_rows: usize,
    pub test_rows: usize,
    pub dropped_rows: usize,
}

impl From<TrainingOutcome> for TrainResponse {
    fn from(outcome: TrainingOutcome) -> Self {
        let message = if outcome.published {
            "Model trained and published"
        } else {
            "Model trained but could not be published; previous model remains active"
        };
        Self {
            message: message.to_string(),
            metrics: outcome.metrics,
            model_id: outcome.model_id,
            published: outcome.published,
            train_rows: outcome.train_rows,
            test_rows: outcome.test_rows,
            dropped_rows: outcome.dropped_rows,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PredictRequest {
    pub features: FeatureRow,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictResponse {
    pub prediction: f64,
    pub model_id: Uuid,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TopUpRequest {
    pub amount: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceResponse {
    pub username: String,
    pub balance: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    pub model_ready: bool,
}
