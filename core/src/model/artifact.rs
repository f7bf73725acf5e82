//! Fitted model artifact and its binary encoding

use chrono::{DateTime, Utc};
use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::preprocess::FeatureTransform;
use super::regressor::{FittedRegressor, RegressorKind};
use super::schema::FeatureSchema;
use crate::error::{CoreError, CoreResult};

const MAGIC: &[u8; 4] = b"MMLA";
const FORMAT_VERSION: u16 = 1;

/// Held-out evaluation of a fit
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrainingMetrics {
    /// Mean squared error
    pub mse: f64,
    /// Coefficient of determination
    pub r2: f64,
}

/// Feature transform chained with a fitted regressor
#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct FittedPipeline {
    transform: FeatureTransform,
    regressor: FittedRegressor,
}

impl FittedPipeline {
    pub fn new(transform: FeatureTransform, regressor: FittedRegressor) -> Self {
        Self {
            transform,
            regressor,
        }
    }

    pub fn transform(&self) -> &FeatureTransform {
        &self.transform
    }

    pub fn regressor(&self) -> &FittedRegressor {
        &self.regressor
    }

    /// Encode raw rows and predict one value per row
    pub fn predict(
        &self,
        categorical: &[Vec<String>],
        numeric: ArrayView2<f64>,
    ) -> CoreResult<Vec<f64>> {
        let design: Array2<f64> = self.transform.transform(categorical, numeric);
        Ok(self.regressor.predict_batch(design.view())?.to_vec())
    }
}

/// Immutable result of one successful training run
#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub schema: FeatureSchema,
    pub pipeline: FittedPipeline,
    pub metrics: TrainingMetrics,
    pub train_rows: usize,
    pub test_rows: usize,
}

impl ModelArtifact {
    pub fn new(
        schema: FeatureSchema,
        pipeline: FittedPipeline,
        metrics: TrainingMetrics,
        train_rows: usize,
        test_rows: usize,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            schema,
            pipeline,
            metrics,
            train_rows,
            test_rows,
        }
    }

    pub fn regressor_kind(&self) -> RegressorKind {
        self.pipeline.regressor().kind()
    }

    /// Serialize with a magic header and format version
    pub fn encode(&self) -> CoreResult<Vec<u8>> {
        let body = bincode::serialize(self).map_err(|e| CoreError::internal("encode artifact", e))?;
        let mut bytes = Vec::with_capacity(MAGIC.len() + 2 + body.len());
        bytes.extend_from_slice(MAGIC);
        bytes.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        bytes.extend_from_slice(&body);
        Ok(bytes)
    }

    pub fn decode(bytes: &[u8]) -> CoreResult<Self> {
        let header_len = MAGIC.len() + 2;
        if bytes.len() < header_len || &bytes[..MAGIC.len()] != MAGIC {
            return Err(CoreError::Internal(
                "model artifact has an unrecognised header".to_string(),
            ));
        }
        let version = u16::from_le_bytes([bytes[MAGIC.len()], bytes[MAGIC.len() + 1]]);
        if version != FORMAT_VERSION {
            return Err(CoreError::Internal(format!(
                "model artifact format version {version} is not supported"
            )));
        }
        bincode::deserialize(&bytes[header_len..]).map_err(|e| CoreError::internal("decode artifact", e))
    }
}
