//! API Handlers Module
//!
//! Thin adapters from HTTP requests to [`MeteredService`] calls.

use axum::{
    body::Bytes,
    debug_handler,
    extract::State,
    http::{header, HeaderMap},
    response::Json,
};
use meterml_core::{CoreError, MeteredService, ServiceMetadata};
use std::sync::Arc;

use crate::error::ApiResult;
use crate::extract::{ApiJson, ApiPath, ApiQuery};
use crate::models::{
    BalanceResponse, CredentialsQuery, HealthResponse, PredictRequest, PredictResponse,
    TopUpRequest, TrainFileQuery, TrainResponse,
};

/// Represents the state of the API server
pub struct ApiState {
    /// Metered service facade
    pub service: Arc<MeteredService>,
    /// Reported by the health check
    pub version: String,
}

/// Health check endpoint (free, unauthenticated)
#[debug_handler]
pub async fn health_check(State(state): State<Arc<ApiState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: "meterml-api".to_string(),
        version: state.version.clone(),
        model_ready: state.service.lifecycle().state().is_ready(),
    })
}

/// Feature schema and current model summary
#[debug_handler]
pub async fn get_metadata(
    State(state): State<Arc<ApiState>>,
    ApiQuery(credentials): ApiQuery<CredentialsQuery>,
) -> ApiResult<ServiceMetadata> {
    tracing::debug!("Metadata requested by {}", credentials.username);

    let metadata = state
        .service
        .metadata(&credentials.username, &credentials.password)
        .await?;
    Ok(Json(metadata))
}

/// Train on a dataset file from the data directory
#[debug_handler]
pub async fn train_from_file(
    State(state): State<Arc<ApiState>>,
    ApiQuery(query): ApiQuery<TrainFileQuery>,
) -> ApiResult<TrainResponse> {
    tracing::debug!(
        "Train from file requested by {} (dataset: {:?})",
        query.username,
        query.dataset
    );

    let outcome = state
        .service
        .train_from_file(&query.username, &query.password, query.dataset.as_deref())
        .await?;
    Ok(Json(outcome.into()))
}

/// Train on a CSV request body
#[debug_handler]
pub async fn train_from_upload(
    State(state): State<Arc<ApiState>>,
    ApiQuery(credentials): ApiQuery<CredentialsQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<TrainResponse> {
    tracing::debug!(
        "Train from upload requested by {} ({} bytes)",
        credentials.username,
        body.len()
    );

    if let Some(content_type) = headers.get(header::CONTENT_TYPE) {
        let content_type = content_type.to_str().unwrap_or_default();
        if !is_csv_content_type(content_type) {
            return Err(CoreError::MalformedDataset(format!(
                "expected a CSV upload, got content type '{content_type}'"
            ))
            .into());
        }
    }

    let outcome = state
        .service
        .train_from_upload(&credentials.username, &credentials.password, body.to_vec())
        .await?;
    Ok(Json(outcome.into()))
}

/// Predict one row with the current model
#[debug_handler]
pub async fn predict(
    State(state): State<Arc<ApiState>>,
    ApiQuery(credentials): ApiQuery<CredentialsQuery>,
    ApiJson(request): ApiJson<PredictRequest>,
) -> ApiResult<PredictResponse> {
    tracing::debug!(
        "Prediction requested by {} with {} fields",
        credentials.username,
        request.features.len()
    );

    let prediction = state
        .service
        .predict(&credentials.username, &credentials.password, &request.features)
        .await?;
    Ok(Json(PredictResponse {
        prediction: prediction.value,
        model_id: prediction.model_id,
    }))
}

/// Current balance (free)
#[debug_handler]
pub async fn get_balance(
    State(state): State<Arc<ApiState>>,
    ApiPath(username): ApiPath<String>,
) -> ApiResult<BalanceResponse> {
    let balance = state.service.balance(&username).await?;
    Ok(Json(BalanceResponse { username, balance }))
}

/// Add credit to an account (free)
#[debug_handler]
pub async fn top_up(
    State(state): State<Arc<ApiState>>,
    ApiPath(username): ApiPath<String>,
    ApiJson(request): ApiJson<TopUpRequest>,
) -> ApiResult<BalanceResponse> {
    tracing::debug!("Top-up of {} for {}", request.amount, username);

    let balance = state.service.top_up(&username, request.amount).await?;
    Ok(Json(BalanceResponse { username, balance }))
}

fn is_csv_content_type(content_type: &str) -> bool {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    matches!(
        essence.as_str(),
        "text/csv" | "application/csv" | "text/plain" | "application/octet-stream"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_csv_content_types() {
        assert!(is_csv_content_type("text/csv"));
        assert!(is_csv_content_type("text/csv; charset=utf-8"));
        assert!(is_csv_content_type("Application/Octet-Stream"));
        assert!(!is_csv_content_type("application/json"));
        assert!(!is_csv_content_type("image/png"));
    }
}
