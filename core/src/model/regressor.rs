//! Regression capability
//!
//! [`Regressor`] fits a design matrix against a target and yields a
//! [`FittedRegressor`] that predicts one scalar per design row. The concrete
//! estimator is chosen from configuration through [`RegressorKind`].

use linfa::prelude::*;
use linfa::Dataset;
use linfa_elasticnet::ElasticNet;
use linfa_linear::LinearRegression;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use smartcore::ensemble::random_forest_regressor::{
    RandomForestRegressor, RandomForestRegressorParameters,
};
use smartcore::linalg::basic::matrix::DenseMatrix;
use std::ops::Range;
use tracing::debug;

use crate::config::ModelConfig;
use crate::error::{CoreError, CoreResult};

/// Seed of the forest's bootstrap and feature sampling
const FOREST_SEED: u64 = 0;

type Forest = RandomForestRegressor<f64, f64, DenseMatrix<f64>, Vec<f64>>;

/// Estimator selection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegressorKind {
    /// Ordinary least squares
    #[default]
    Linear,
    /// L2-penalised least squares
    Ridge,
    /// Bagged regression trees
    RandomForest,
}

impl std::fmt::Display for RegressorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegressorKind::Linear => write!(f, "linear"),
            RegressorKind::Ridge => write!(f, "ridge"),
            RegressorKind::RandomForest => write!(f, "random_forest"),
        }
    }
}

/// Configured, not yet fitted, estimator
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Regressor {
    Linear,
    Ridge { penalty: f64 },
    RandomForest { trees: usize, seed: u64 },
}

impl Regressor {
    pub fn from_config(config: &ModelConfig) -> Self {
        match config.regressor {
            RegressorKind::Linear => Regressor::Linear,
            RegressorKind::Ridge => Regressor::Ridge {
                penalty: config.ridge_penalty,
            },
            RegressorKind::RandomForest => Regressor::RandomForest {
                trees: config.forest_trees,
                seed: FOREST_SEED,
            },
        }
    }

    pub fn kind(&self) -> RegressorKind {
        match self {
            Regressor::Linear => RegressorKind::Linear,
            Regressor::Ridge { .. } => RegressorKind::Ridge,
            Regressor::RandomForest { .. } => RegressorKind::RandomForest,
        }
    }

    /// Fit on a design matrix (one row per sample) and its target.
    ///
    /// `indicator_blocks` names the one-hot column ranges of the design; each
    /// of them is collinear with the intercept.
    pub fn fit(
        &self,
        features: &Array2<f64>,
        target: &Array1<f64>,
        indicator_blocks: &[Range<usize>],
    ) -> CoreResult<FittedRegressor> {
        if features.nrows() != target.len() {
            return Err(CoreError::FitError(format!(
                "Features and targets must have same number of samples: {} vs {}",
                features.nrows(),
                target.len()
            )));
        }
        if features.nrows() == 0 {
            return Err(CoreError::EmptyTrainingSet);
        }

        debug!(
            "Fitting {} regressor on {} samples x {} features",
            self.kind(),
            features.nrows(),
            features.ncols()
        );

        match self {
            Regressor::Linear => {
                fit_least_squares(features, target, indicator_blocks).map(FittedRegressor::Linear)
            }
            Regressor::Ridge { penalty } => {
                let model = ElasticNet::params()
                    .penalty(*penalty)
                    .l1_ratio(0.0)
                    .fit(&Dataset::new(features.clone(), target.clone()))
                    .map_err(|e| CoreError::FitError(format!("Ridge regression failed: {e}")))?;
                LinearPredictor::checked(model.hyperplane().to_vec(), model.intercept())
                    .map(FittedRegressor::Ridge)
            }
            Regressor::RandomForest { trees, seed } => {
                let x = dense_matrix(features.view())?;
                let y = target.to_vec();
                let parameters = RandomForestRegressorParameters::default()
                    .with_n_trees(*trees)
                    .with_seed(*seed);
                let forest: Forest = RandomForestRegressor::fit(&x, &y, parameters)
                    .map_err(|e| CoreError::FitError(format!("Random forest failed: {e}")))?;
                Ok(FittedRegressor::RandomForest(ForestPredictor {
                    forest,
                    width: features.ncols(),
                }))
            }
        }
    }
}

/// Least squares with the first indicator of every block left out of the
/// solve, so the system has full rank. The solution is then re-expressed
/// over all indicators with each block's weights centred on zero; a row
/// whose block is all zeros gets the average effect of that feature.
fn fit_least_squares(
    features: &Array2<f64>,
    target: &Array1<f64>,
    indicator_blocks: &[Range<usize>],
) -> CoreResult<LinearPredictor> {
    let keep: Vec<usize> = (0..features.ncols())
        .filter(|column| !indicator_blocks.iter().any(|block| block.start == *column))
        .collect();
    let reduced = features.select(Axis(1), &keep);

    let model = LinearRegression::default()
        .fit(&Dataset::new(reduced, target.clone()))
        .map_err(|e| CoreError::FitError(format!("Linear regression failed: {e}")))?;

    let mut coefficients = vec![0.0; features.ncols()];
    for (&column, &weight) in keep.iter().zip(model.params().iter()) {
        coefficients[column] = weight;
    }
    let mut intercept = model.intercept();
    for block in indicator_blocks.iter().filter(|block| !block.is_empty()) {
        let weights = &mut coefficients[block.clone()];
        let shift = weights.iter().sum::<f64>() / weights.len() as f64;
        weights.iter_mut().for_each(|weight| *weight -= shift);
        intercept += shift;
    }

    LinearPredictor::checked(coefficients, intercept)
}

fn dense_matrix(features: ArrayView2<f64>) -> CoreResult<DenseMatrix<f64>> {
    let rows: Vec<Vec<f64>> = features.rows().into_iter().map(|row| row.to_vec()).collect();
    DenseMatrix::from_2d_vec(&rows).map_err(|e| CoreError::Internal(format!("design matrix: {e}")))
}

/// `intercept + coefficients . x`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearPredictor {
    coefficients: Vec<f64>,
    intercept: f64,
}

impl LinearPredictor {
    fn checked(coefficients: Vec<f64>, intercept: f64) -> CoreResult<Self> {
        if !intercept.is_finite() || coefficients.iter().any(|c| !c.is_finite()) {
            return Err(CoreError::FitError(
                "fitted coefficients are not finite (collinear or degenerate features)".to_string(),
            ));
        }
        Ok(Self {
            coefficients,
            intercept,
        })
    }

    pub fn coefficients(&self) -> &[f64] {
        &self.coefficients
    }

    pub fn intercept(&self) -> f64 {
        self.intercept
    }

    fn predict(&self, features: ArrayView1<f64>) -> f64 {
        features
            .iter()
            .zip(self.coefficients.iter())
            .fold(self.intercept, |acc, (x, w)| acc + x * w)
    }
}

/// Fitted forest with the design width it was trained on
#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct ForestPredictor {
    forest: Forest,
    width: usize,
}

impl ForestPredictor {
    fn predict_batch(&self, features: ArrayView2<f64>) -> CoreResult<Array1<f64>> {
        if features.nrows() == 0 {
            return Ok(Array1::zeros(0));
        }
        if features.ncols() != self.width {
            return Err(CoreError::Internal(format!(
                "forest expects {} features, got {}",
                self.width,
                features.ncols()
            )));
        }
        let predictions = self
            .forest
            .predict(&dense_matrix(features)?)
            .map_err(|e| CoreError::Internal(format!("forest prediction failed: {e}")))?;
        Ok(Array1::from_vec(predictions))
    }
}

/// A fitted estimator, stored inside the model artifact
#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub enum FittedRegressor {
    Linear(LinearPredictor),
    Ridge(LinearPredictor),
    RandomForest(ForestPredictor),
}

impl FittedRegressor {
    pub fn kind(&self) -> RegressorKind {
        match self {
            FittedRegressor::Linear(_) => RegressorKind::Linear,
            FittedRegressor::Ridge(_) => RegressorKind::Ridge,
            FittedRegressor::RandomForest(_) => RegressorKind::RandomForest,
        }
    }

    /// Weights of the linear variants
    pub fn linear(&self) -> Option<&LinearPredictor> {
        match self {
            FittedRegressor::Linear(model) | FittedRegressor::Ridge(model) => Some(model),
            FittedRegressor::RandomForest(_) => None,
        }
    }

    /// Predict every row of a design matrix
    pub fn predict_batch(&self, features: ArrayView2<f64>) -> CoreResult<Array1<f64>> {
        match self {
            FittedRegressor::Linear(model) | FittedRegressor::Ridge(model) => Ok(features
                .rows()
                .into_iter()
                .map(|row| model.predict(row))
                .collect()),
            FittedRegressor::RandomForest(model) => model.predict_batch(features),
        }
    }
}
