//! Regression model: schema, feature transform, estimators, training,
//! artifact publication and prediction

pub mod artifact;
pub mod lifecycle;
pub mod prediction;
pub mod preprocess;
pub mod regressor;
pub mod schema;
pub mod trainer;

pub use artifact::{FittedPipeline, ModelArtifact, TrainingMetrics};
pub use lifecycle::{ArtifactHandle, ArtifactStore, LifecycleState, ModelLifecycleManager};
pub use prediction::{FeatureRow, FeatureValue, Prediction, PredictionService};
pub use preprocess::FeatureTransform;
pub use regressor::{FittedRegressor, Regressor, RegressorKind};
pub use schema::FeatureSchema;
pub use trainer::{ModelTrainer, TrainingOutcome};
