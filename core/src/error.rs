//! Error taxonomy for the metered core
//!
//! Client-facing conditions (bad credentials, low balance, bad input, workflow
//! order) are distinct variants; everything the client cannot fix collapses
//! into [`CoreError::Internal`].

use meterml_databases::StoreError;
use serde::Serialize;

/// Errors surfaced by core operations
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Invalid credentials")]
    Unauthorized,

    #[error("Not enough credit: balance {balance}, cost {cost}")]
    InsufficientCredit { balance: u64, cost: u64 },

    #[error("Account not found: {0}")]
    AccountNotFound(String),

    #[error("Account already exists: {0}")]
    AccountExists(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Dataset is missing required columns: {}", .missing.join(", "))]
    SchemaError { missing: Vec<String> },

    #[error("Dataset could not be parsed: {0}")]
    MalformedDataset(String),

    #[error("Dataset not found: {0}")]
    DatasetNotFound(String),

    #[error("No rows left for training after validation")]
    EmptyTrainingSet,

    #[error("Model fitting failed: {0}")]
    FitError(String),

    #[error("Model not trained yet. Train first.")]
    NoModelTrained,

    #[error("Request does not match the model schema: {0}")]
    SchemaMismatch(SchemaMismatch),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Field-level detail for a prediction request that does not fit the schema
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SchemaMismatch {
    /// Schema fields absent from the request
    pub missing: Vec<String>,
    /// Request fields the schema does not know
    pub unexpected: Vec<String>,
    /// Fields present with a value of the wrong kind
    pub invalid: Vec<String>,
}

impl SchemaMismatch {
    pub fn is_empty(&self) -> bool {
        self.missing.is_empty() && self.unexpected.is_empty() && self.invalid.is_empty()
    }
}

impl std::fmt::Display for SchemaMismatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut parts = Vec::new();
        if !self.missing.is_empty() {
            parts.push(format!("missing [{}]", self.missing.join(", ")));
        }
        if !self.unexpected.is_empty() {
            parts.push(format!("unexpected [{}]", self.unexpected.join(", ")));
        }
        if !self.invalid.is_empty() {
            parts.push(format!("invalid [{}]", self.invalid.join(", ")));
        }
        write!(f, "{}", parts.join("; "))
    }
}

impl CoreError {
    /// Stable machine-readable kind, used in API error bodies
    pub fn kind(&self) -> &'static str {
        match self {
            CoreError::Unauthorized => "unauthorized",
            CoreError::InsufficientCredit { .. } => "insufficient_credit",
            CoreError::AccountNotFound(_) => "account_not_found",
            CoreError::AccountExists(_) => "account_exists",
            CoreError::InvalidAmount(_) => "invalid_amount",
            CoreError::SchemaError { .. } => "schema_error",
            CoreError::MalformedDataset(_) => "malformed_dataset",
            CoreError::DatasetNotFound(_) => "dataset_not_found",
            CoreError::EmptyTrainingSet => "empty_training_set",
            CoreError::FitError(_) => "fit_error",
            CoreError::NoModelTrained => "no_model_trained",
            CoreError::SchemaMismatch(_) => "schema_mismatch",
            CoreError::Internal(_) => "internal",
        }
    }

    /// Whether the caller can fix this by changing input, credentials or balance
    pub fn is_client_error(&self) -> bool {
        !matches!(self, CoreError::Internal(_))
    }

    pub(crate) fn internal(context: &str, err: impl std::fmt::Display) -> Self {
        CoreError::Internal(format!("{context}: {err}"))
    }
}

impl From<StoreError> for CoreError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::AccountNotFound(name) => CoreError::AccountNotFound(name),
            StoreError::AccountExists(name) => CoreError::AccountExists(name),
            StoreError::InsufficientCredit { balance, cost } => {
                CoreError::InsufficientCredit { balance, cost }
            }
            StoreError::BalanceOverflow(name) => {
                CoreError::InvalidAmount(format!("balance of {name} would overflow"))
            }
            StoreError::Backend(e) => CoreError::internal("account storage", e),
        }
    }
}

/// Result type for core operations
pub type CoreResult<T> = std::result::Result<T, CoreError>;
