//! Mapping of core errors onto HTTP responses

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use meterml_core::{CoreError, SchemaMismatch};
use serde::{Deserialize, Serialize};

/// JSON error body: `{"error": <kind>, "detail": <message>}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<SchemaMismatchBody>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaMismatchBody {
    pub missing: Vec<String>,
    pub unexpected: Vec<String>,
    pub invalid: Vec<String>,
}

impl From<&SchemaMismatch> for SchemaMismatchBody {
    fn from(mismatch: &SchemaMismatch) -> Self {
        Self {
            missing: mismatch.missing.clone(),
            unexpected: mismatch.unexpected.clone(),
            invalid: mismatch.invalid.clone(),
        }
    }
}

/// Error returned by every handler
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Core(#[from] CoreError),
    /// The request did not parse into the handler's inputs
    #[error("{detail}")]
    Rejected { status: StatusCode, detail: String },
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        let core = match self {
            ApiError::Core(core) => core,
            ApiError::Rejected { status, .. } => return *status,
        };
        match core {
            CoreError::Unauthorized => StatusCode::UNAUTHORIZED,
            CoreError::InsufficientCredit { .. } => StatusCode::PAYMENT_REQUIRED,
            CoreError::AccountNotFound(_) | CoreError::DatasetNotFound(_) => StatusCode::NOT_FOUND,
            CoreError::AccountExists(_) => StatusCode::CONFLICT,
            CoreError::InvalidAmount(_)
            | CoreError::MalformedDataset(_)
            | CoreError::NoModelTrained => StatusCode::BAD_REQUEST,
            CoreError::SchemaError { .. }
            | CoreError::SchemaMismatch(_)
            | CoreError::EmptyTrainingSet
            | CoreError::FitError(_) => StatusCode::UNPROCESSABLE_ENTITY,
            CoreError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            ApiError::Core(core) => core.kind(),
            ApiError::Rejected { .. } => "invalid_request",
        }
    }
}

macro_rules! from_rejection {
    ($($rejection:ty),*) => {
        $(
            impl From<$rejection> for ApiError {
                fn from(rejection: $rejection) -> Self {
                    ApiError::Rejected {
                        status: rejection.status(),
                        detail: rejection.body_text(),
                    }
                }
            }
        )*
    };
}

from_rejection!(JsonRejection, QueryRejection, PathRejection);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        } else {
            tracing::debug!("Request rejected ({}): {}", status, self);
        }

        let detail = match &self {
            // Internal details stay in the log
            ApiError::Core(CoreError::Internal(_)) => "Internal server error".to_string(),
            other => other.to_string(),
        };
        let fields = match &self {
            ApiError::Core(CoreError::SchemaMismatch(mismatch)) => {
                Some(SchemaMismatchBody::from(mismatch))
            }
            _ => None,
        };

        let body = ErrorBody {
            error: self.kind().to_string(),
            detail,
            fields,
        };
        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = std::result::Result<Json<T>, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (CoreError::Unauthorized, 401),
            (CoreError::InsufficientCredit { balance: 1, cost: 5 }, 402),
            (CoreError::DatasetNotFound("x.csv".to_string()), 404),
            (CoreError::AccountExists("ann".to_string()), 409),
            (CoreError::NoModelTrained, 400),
            (CoreError::EmptyTrainingSet, 422),
            (CoreError::Internal("disk".to_string()), 500),
        ];
        for (err, code) in cases {
            assert_eq!(ApiError::from(err).status().as_u16(), code);
        }
    }

    #[test]
    fn test_rejections_keep_their_status() {
        let rejected = ApiError::Rejected {
            status: StatusCode::UNSUPPORTED_MEDIA_TYPE,
            detail: "Expected request with `Content-Type: application/json`".to_string(),
        };
        assert_eq!(rejected.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
        assert_eq!(rejected.kind(), "invalid_request");
    }
}
