//! Metered Service Facade
//!
//! One entry point per externally visible operation. Metered operations pass
//! through the [`CreditGate`] first; training and prediction then go through
//! the model lifecycle.

use chrono::{DateTime, Utc};
use meterml_databases::{AccountStore, AccountSummary, MemoryAccountStore, SqliteAccountStore};
use serde::Serialize;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::{ServiceConfig, StorageConfig};
use crate::credit::{CreditGate, CreditLedger, CredentialVerifier, MeteredOperation};
use crate::dataset::{DatasetIngestor, ValidatedDataset};
use crate::error::{CoreError, CoreResult};
use crate::model::{
    ArtifactStore, FeatureRow, FeatureSchema, ModelArtifact, ModelLifecycleManager,
    ModelTrainer, Prediction, PredictionService, RegressorKind, TrainingMetrics, TrainingOutcome,
};

/// Summary of the published model
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelSummary {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub regressor: RegressorKind,
    pub metrics: TrainingMetrics,
    pub train_rows: usize,
    pub test_rows: usize,
}

impl From<&ModelArtifact> for ModelSummary {
    fn from(artifact: &ModelArtifact) -> Self {
        Self {
            id: artifact.id,
            created_at: artifact.created_at,
            regressor: artifact.regressor_kind(),
            metrics: artifact.metrics,
            train_rows: artifact.train_rows,
            test_rows: artifact.test_rows,
        }
    }
}

/// Feature schema description returned by the metadata operation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceMetadata {
    pub categorical_features: Vec<String>,
    pub numeric_features: Vec<String>,
    pub target: String,
    pub model: Option<ModelSummary>,
}

pub struct MeteredService {
    gate: CreditGate,
    store: Arc<dyn AccountStore>,
    lifecycle: Arc<ModelLifecycleManager>,
    trainer: Arc<ModelTrainer>,
    schema: FeatureSchema,
    storage: StorageConfig,
}

impl MeteredService {
    /// Open the account store and artifact named by `config`
    pub async fn build(config: &ServiceConfig) -> CoreResult<Self> {
        let store: Arc<dyn AccountStore> = if config.storage.is_in_memory() {
            info!("Using in-memory account store");
            Arc::new(MemoryAccountStore::new())
        } else {
            Arc::new(SqliteAccountStore::connect(&config.storage.database_url).await?)
        };

        let artifact_store = ArtifactStore::new(&config.storage.artifact_path);
        let lifecycle = tokio::task::spawn_blocking(move || ModelLifecycleManager::open(artifact_store))
            .await
            .map_err(|e| CoreError::internal("artifact recovery task", e))??;

        Self::with_parts(config, store, Arc::new(lifecycle))
    }

    /// Assemble from an existing store and lifecycle
    pub fn with_parts(
        config: &ServiceConfig,
        store: Arc<dyn AccountStore>,
        lifecycle: Arc<ModelLifecycleManager>,
    ) -> CoreResult<Self> {
        let verifier = CredentialVerifier::new(Arc::clone(&store), &config.security)?;
        let gate = CreditGate::new(verifier, CreditLedger::new(Arc::clone(&store)));
        let trainer = Arc::new(ModelTrainer::new(&config.model, Arc::clone(&lifecycle)));

        Ok(Self {
            gate,
            store,
            lifecycle,
            trainer,
            schema: config.model.schema(),
            storage: config.storage.clone(),
        })
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    pub fn lifecycle(&self) -> &Arc<ModelLifecycleManager> {
        &self.lifecycle
    }

    async fn charge(
        &self,
        identity: &str,
        secret: &str,
        operation: MeteredOperation,
    ) -> CoreResult<()> {
        let authorized = self.gate.authorize_operation(identity, secret, operation).await?;
        info!(
            "Charged {} {} credits for {} ({} remaining)",
            authorized.identity(),
            authorized.charged(),
            operation,
            authorized.remaining()
        );
        Ok(())
    }

    /// Describe the feature schema and the current model (cost 1)
    pub async fn metadata(&self, identity: &str, secret: &str) -> CoreResult<ServiceMetadata> {
        self.charge(identity, secret, MeteredOperation::Metadata).await?;

        let model = self
            .lifecycle
            .acquire_read()
            .ok()
            .map(|handle| ModelSummary::from(&*handle));
        Ok(ServiceMetadata {
            categorical_features: self.schema.categorical().to_vec(),
            numeric_features: self.schema.numeric().to_vec(),
            target: self.schema.target().to_string(),
            model,
        })
    }

    /// Train on a dataset file from the data directory (cost 1)
    pub async fn train_from_file(
        &self,
        identity: &str,
        secret: &str,
        dataset: Option<&str>,
    ) -> CoreResult<TrainingOutcome> {
        self.charge(identity, secret, MeteredOperation::Train).await?;

        let name = dataset.unwrap_or(&self.storage.default_dataset);
        let path = resolve_dataset(&self.storage.data_dir, name)?;
        info!("Training from dataset file {}", path.display());

        let schema = self.schema.clone();
        self.run_training(move || DatasetIngestor::ingest_file(&path, &schema))
            .await
    }

    /// Train on uploaded CSV bytes (cost 1)
    pub async fn train_from_upload(
        &self,
        identity: &str,
        secret: &str,
        csv: Vec<u8>,
    ) -> CoreResult<TrainingOutcome> {
        self.charge(identity, secret, MeteredOperation::Train).await?;

        if csv.iter().all(u8::is_ascii_whitespace) {
            return Err(CoreError::MalformedDataset("upload is empty".to_string()));
        }
        info!("Training from uploaded dataset ({} bytes)", csv.len());

        let schema = self.schema.clone();
        self.run_training(move || DatasetIngestor::ingest(&csv, &schema))
            .await
    }

    async fn run_training<F>(&self, load: F) -> CoreResult<TrainingOutcome>
    where
        F: FnOnce() -> CoreResult<ValidatedDataset> + Send + 'static,
    {
        let trainer = Arc::clone(&self.trainer);
        tokio::task::spawn_blocking(move || {
            let dataset = load()?;
            trainer.train(&dataset)
        })
        .await
        .map_err(|e| CoreError::internal("training task", e))?
    }

    /// Predict one row with the current model (cost 5)
    pub async fn predict(
        &self,
        identity: &str,
        secret: &str,
        row: &FeatureRow,
    ) -> CoreResult<Prediction> {
        self.charge(identity, secret, MeteredOperation::Predict).await?;

        let handle = self.lifecycle.acquire_read()?;
        PredictionService::predict(&handle, row)
    }

    /// Current balance (free)
    pub async fn balance(&self, identity: &str) -> CoreResult<u64> {
        self.gate.ledger().balance(identity).await
    }

    /// Add credit (free)
    pub async fn top_up(&self, identity: &str, amount: u64) -> CoreResult<u64> {
        self.gate.ledger().credit(identity, amount).await
    }

    /// Create an account with a hashed password
    pub async fn register(
        &self,
        identity: &str,
        password: &str,
        balance: u64,
    ) -> CoreResult<AccountSummary> {
        let hash = self.gate.verifier().hash_secret(password).await?;
        let account = self.store.create_account(identity, &hash, balance).await?;
        info!("Registered account {} with {} credits", identity, balance);
        Ok(account)
    }

    pub async fn remove(&self, identity: &str) -> CoreResult<()> {
        self.store.remove_account(identity).await?;
        info!("Removed account {}", identity);
        Ok(())
    }

    pub async fn list_accounts(&self) -> CoreResult<Vec<AccountSummary>> {
        Ok(self.store.list_accounts().await?)
    }
}

/// Resolve a bare dataset file name inside `data_dir`
fn resolve_dataset(data_dir: &Path, name: &str) -> CoreResult<PathBuf> {
    let candidate = Path::new(name);
    let mut components = candidate.components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => {
            let path = data_dir.join(candidate);
            debug!("Resolved dataset {} to {}", name, path.display());
            Ok(path)
        }
        _ => Err(CoreError::DatasetNotFound(name.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dataset_names_stay_inside_data_dir() {
        let dir = Path::new("data");
        assert_eq!(
            resolve_dataset(dir, "music_students_data.csv").unwrap(),
            PathBuf::from("data/music_students_data.csv")
        );
        for bad in ["", "..", "../secrets.csv", "/etc/passwd", "nested/file.csv"] {
            assert!(
                matches!(resolve_dataset(dir, bad), Err(CoreError::DatasetNotFound(_))),
                "accepted {bad:?}"
            );
        }
    }
}
