//! Single-row prediction against a published artifact

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;
use uuid::Uuid;

use super::lifecycle::ArtifactHandle;
use crate::error::{CoreError, CoreResult, SchemaMismatch};

/// One input field as sent by a client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeatureValue {
    Number(f64),
    Text(String),
    /// Anything else JSON can carry (null, bool, list, object)
    Other(serde_json::Value),
}

impl FeatureValue {
    fn as_category(&self) -> Option<String> {
        match self {
            FeatureValue::Text(text) => Some(text.trim().to_string()),
            FeatureValue::Number(value) if value.is_finite() => {
                if value.fract() == 0.0 && value.abs() < 1e15 {
                    Some(format!("{}", *value as i64))
                } else {
                    Some(value.to_string())
                }
            }
            _ => None,
        }
    }

    fn as_number(&self) -> Option<f64> {
        let number = match self {
            FeatureValue::Number(value) => Some(*value),
            FeatureValue::Text(text) => text.trim().parse::<f64>().ok(),
            FeatureValue::Other(_) => None,
        };
        number.filter(|value| value.is_finite())
    }
}

impl From<f64> for FeatureValue {
    fn from(value: f64) -> Self {
        FeatureValue::Number(value)
    }
}

impl From<&str> for FeatureValue {
    fn from(value: &str) -> Self {
        FeatureValue::Text(value.to_string())
    }
}

/// Field name to value
pub type FeatureRow = BTreeMap<String, FeatureValue>;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Prediction {
    pub value: f64,
    pub model_id: Uuid,
}

/// Applies an artifact's pipeline to request rows
pub struct PredictionService;

impl PredictionService {
    /// The row must carry exactly the schema's feature fields. Categories never
    /// seen in training are accepted and contribute nothing.
    pub fn predict(handle: &ArtifactHandle, row: &FeatureRow) -> CoreResult<Prediction> {
        let schema = &handle.schema;
        let mut mismatch = SchemaMismatch::default();

        for name in schema.feature_names() {
            if !row.contains_key(name) {
                mismatch.missing.push(name.to_string());
            }
        }
        for name in row.keys() {
            if !schema.is_categorical(name) && !schema.is_numeric(name) {
                mismatch.unexpected.push(name.clone());
            }
        }

        let mut categorical = Vec::with_capacity(schema.categorical().len());
        for name in schema.categorical() {
            if let Some(value) = row.get(name) {
                match value.as_category() {
                    Some(category) => categorical.push(category),
                    None => mismatch.invalid.push(name.clone()),
                }
            }
        }
        let mut numeric = Vec::with_capacity(schema.numeric().len());
        for name in schema.numeric() {
            if let Some(value) = row.get(name) {
                match value.as_number() {
                    Some(number) => numeric.push(number),
                    None => mismatch.invalid.push(name.clone()),
                }
            }
        }

        if !mismatch.is_empty() {
            return Err(CoreError::SchemaMismatch(mismatch));
        }

        let numeric = Array2::from_shape_vec((1, numeric.len()), numeric)
            .map_err(|e| CoreError::internal("assemble prediction row", e))?;
        let values = handle.pipeline.predict(&[categorical], numeric.view())?;
        let value = values
            .first()
            .copied()
            .ok_or_else(|| CoreError::Internal("pipeline returned no prediction".to_string()))?;

        debug!("Predicted {} with model {}", value, handle.id());
        Ok(Prediction {
            value,
            model_id: handle.id(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModelConfig;
    use crate::model::lifecycle::ModelLifecycleManager;
    use crate::model::trainer::tests::lesson_dataset;
    use crate::model::trainer::ModelTrainer;
    use std::sync::Arc;

    fn trained_handle() -> ArtifactHandle {
        let lifecycle = Arc::new(ModelLifecycleManager::new());
        ModelTrainer::new(&ModelConfig::default(), Arc::clone(&lifecycle))
            .train(&lesson_dataset(60))
            .unwrap();
        lifecycle.acquire_read().unwrap()
    }

    fn row(city: FeatureValue, age: FeatureValue) -> FeatureRow {
        let mut row = FeatureRow::new();
        row.insert("City".to_string(), city);
        row.insert("Age".to_string(), age);
        row
    }

    #[test]
    fn test_prediction_follows_training_relationship() {
        let handle = trained_handle();
        let paris = PredictionService::predict(&handle, &row("Paris".into(), 30.0.into())).unwrap();
        let rome = PredictionService::predict(&handle, &row("Rome".into(), 30.0.into())).unwrap();

        assert_eq!(paris.model_id, handle.id());
        assert!((paris.value - 120.0).abs() < 1.0, "got {}", paris.value);
        assert!((rome.value - paris.value - 10.0).abs() < 1.0);
    }

    #[test]
    fn test_unknown_category_matches_no_known_level() {
        let handle = trained_handle();
        let price = |city: &str| {
            PredictionService::predict(&handle, &row(city.into(), 30.0.into()))
                .unwrap()
                .value
        };
        let known = [price("Berlin"), price("Paris"), price("Rome")];
        let lisbon = price("Lisbon");

        assert_eq!(lisbon, price("Oslo"));
        assert!((lisbon - known[0]).abs() > 5.0, "unseen city priced as Berlin");
        assert!((lisbon - known[2]).abs() > 5.0, "unseen city priced as Rome");
        // An unseen city carries the average city effect
        let average = known.iter().sum::<f64>() / 3.0;
        assert!((lisbon - average).abs() < 1e-6);
    }

    #[test]
    fn test_numeric_strings_are_coerced() {
        let handle = trained_handle();
        let from_text = PredictionService::predict(&handle, &row("Rome".into(), " 30 ".into())).unwrap();
        let from_number = PredictionService::predict(&handle, &row("Rome".into(), 30.0.into())).unwrap();
        assert_eq!(from_text.value, from_number.value);
    }

    #[test]
    fn test_mismatched_fields_are_reported() {
        let handle = trained_handle();
        let mut bad = row(FeatureValue::Other(serde_json::Value::Null), "old".into());
        bad.remove("City");
        bad.insert("Colour".to_string(), "red".into());

        match PredictionService::predict(&handle, &bad) {
            Err(CoreError::SchemaMismatch(mismatch)) => {
                assert_eq!(mismatch.missing, vec!["City"]);
                assert_eq!(mismatch.unexpected, vec!["Colour"]);
                assert_eq!(mismatch.invalid, vec!["Age"]);
            }
            other => panic!("expected SchemaMismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_feature_values_deserialize_untagged() {
        let row: FeatureRow =
            serde_json::from_str(r#"{"City": "Rome", "Age": 30, "Flag": true}"#).unwrap();
        assert_eq!(row["City"], FeatureValue::Text("Rome".to_string()));
        assert_eq!(row["Age"], FeatureValue::Number(30.0));
        assert!(matches!(row["Flag"], FeatureValue::Other(_)));
    }
}
