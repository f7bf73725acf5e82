//! Model training
//!
//! Splits a validated dataset into train and test subsets with a seeded
//! shuffle, fits the feature transform and regressor on the training subset,
//! evaluates on the held-out subset and publishes the resulting artifact.

use ndarray::{Array1, Axis};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

use super::artifact::{FittedPipeline, ModelArtifact, TrainingMetrics};
use super::lifecycle::ModelLifecycleManager;
use super::preprocess::FeatureTransform;
use super::regressor::Regressor;
use crate::config::ModelConfig;
use crate::dataset::ValidatedDataset;
use crate::error::{CoreError, CoreResult};

/// What a training run produced
#[derive(Debug, Clone, Serialize)]
pub struct TrainingOutcome {
    pub metrics: TrainingMetrics,
    pub model_id: Uuid,
    /// False when the artifact could not be published; the previous model stays current
    pub published: bool,
    pub train_rows: usize,
    pub test_rows: usize,
    pub dropped_rows: usize,
}

/// Row indices of a deterministic train/test partition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Split {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

impl Split {
    /// Shuffle `0..rows` with `seed`; the first `ceil(rows * test_fraction)`
    /// indices are held out, the rest train
    pub fn new(rows: usize, test_fraction: f64, seed: u64) -> Self {
        let mut order: Vec<usize> = (0..rows).collect();
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
        order.shuffle(&mut rng);

        let test_rows = ((rows as f64) * test_fraction).ceil() as usize;
        let train = order.split_off(test_rows.min(rows));
        Self { train, test: order }
    }
}

pub struct ModelTrainer {
    regressor: Regressor,
    test_fraction: f64,
    seed: u64,
    lifecycle: Arc<ModelLifecycleManager>,
}

impl ModelTrainer {
    pub fn new(config: &ModelConfig, lifecycle: Arc<ModelLifecycleManager>) -> Self {
        Self {
            regressor: Regressor::from_config(config),
            test_fraction: config.test_fraction,
            seed: config.seed,
            lifecycle,
        }
    }

    /// Fit, evaluate and publish. Metrics are returned even if publishing fails.
    pub fn train(&self, dataset: &ValidatedDataset) -> CoreResult<TrainingOutcome> {
        let split = Split::new(dataset.rows(), self.test_fraction, self.seed);
        if split.train.is_empty() {
            return Err(CoreError::EmptyTrainingSet);
        }

        info!(
            "Training {} regressor on {} rows ({} held out)",
            self.regressor.kind(),
            split.train.len(),
            split.test.len()
        );

        let train_categorical = select_rows(&dataset.categorical, &split.train);
        let train_numeric = dataset.numeric.select(Axis(0), &split.train);
        let train_target = dataset.target.select(Axis(0), &split.train);

        let transform = FeatureTransform::fit(
            dataset.schema.categorical(),
            dataset.schema.numeric(),
            &train_categorical,
            train_numeric.view(),
        );
        let design = transform.transform(&train_categorical, train_numeric.view());
        let regressor = self
            .regressor
            .fit(&design, &train_target, &transform.indicator_blocks())?;
        let pipeline = FittedPipeline::new(transform, regressor);

        let test_categorical = select_rows(&dataset.categorical, &split.test);
        let test_numeric = dataset.numeric.select(Axis(0), &split.test);
        let test_target = dataset.target.select(Axis(0), &split.test);
        let predicted = Array1::from_vec(pipeline.predict(&test_categorical, test_numeric.view())?);
        let metrics = evaluate(&test_target, &predicted);

        info!("Training finished: mse={:.4}, r2={:.4}", metrics.mse, metrics.r2);

        let artifact = ModelArtifact::new(
            dataset.schema.clone(),
            pipeline,
            metrics,
            split.train.len(),
            split.test.len(),
        );
        let model_id = artifact.id;
        let published = match self.lifecycle.publish(artifact) {
            Ok(_) => true,
            Err(e) => {
                error!("Trained model {} was not published: {}", model_id, e);
                false
            }
        };

        Ok(TrainingOutcome {
            metrics,
            model_id,
            published,
            train_rows: split.train.len(),
            test_rows: split.test.len(),
            dropped_rows: dataset.dropped_rows,
        })
    }
}

fn select_rows(rows: &[Vec<String>], indices: &[usize]) -> Vec<Vec<String>> {
    indices.iter().map(|&idx| rows[idx].clone()).collect()
}

/// Mean squared error and R². A constant held-out target scores R² of 1.0
/// when predicted exactly, otherwise 0.0.
pub fn evaluate(actual: &Array1<f64>, predicted: &Array1<f64>) -> TrainingMetrics {
    if actual.is_empty() {
        return TrainingMetrics {
            mse: f64::NAN,
            r2: f64::NAN,
        };
    }

    let n = actual.len() as f64;
    let ss_res: f64 = actual
        .iter()
        .zip(predicted.iter())
        .map(|(y, p)| (y - p).powi(2))
        .sum();
    let mean = actual.sum() / n;
    let ss_tot: f64 = actual.iter().map(|y| (y - mean).powi(2)).sum();

    let r2 = if ss_tot == 0.0 {
        if ss_res == 0.0 {
            1.0
        } else {
            0.0
        }
    } else {
        1.0 - ss_res / ss_tot
    };

    TrainingMetrics {
        mse: ss_res / n,
        r2,
    }
}
