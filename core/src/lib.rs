//! MeterML Core Module
//!
//! Metered regression service core: a credit gate that charges prepaid
//! balances without overdraft, and a model lifecycle that publishes trained
//! artifacts atomically while predictions keep running.
//!
//! [`MeteredService`] is the facade the API and CLI call into.

pub mod config;
pub mod credit;
pub mod dataset;
pub mod error;
pub mod model;
pub mod service;

pub use config::ServiceConfig;
pub use credit::{AuthorizedIdentity, CreditGate, CreditLedger, CredentialVerifier, MeteredOperation};
pub use dataset::{DatasetIngestor, ValidatedDataset};
pub use error::{CoreError, CoreResult, SchemaMismatch};
pub use model::{
    ArtifactHandle, FeatureRow, FeatureSchema, FeatureValue, ModelLifecycleManager, Prediction,
    RegressorKind, TrainingMetrics, TrainingOutcome,
};
pub use service::{MeteredService, ModelSummary, ServiceMetadata};

pub use meterml_databases::AccountSummary;
