//! Configuration Management Module
//!
//! Layered service configuration: built-in defaults, then an optional TOML
//! file, then `METERML__`-prefixed environment variables
//! (`METERML__SERVER__PORT=9000`).

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::model::regressor::RegressorKind;
use crate::model::schema::FeatureSchema;

/// Config file looked up in the working directory when no path is given
pub const DEFAULT_CONFIG_FILE: &str = "meterml";

/// Environment variable prefix
pub const ENV_PREFIX: &str = "METERML";

/// Top-level service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServiceConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub model: ModelConfig,
    pub security: SecurityConfig,
    pub logging: LoggingConfig,
}

/// HTTP listener settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
        }
    }
}

/// Where accounts, datasets and the model artifact live
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite URL, or `memory` for the in-process ledger
    pub database_url: String,
    /// Published model artifact
    pub artifact_path: PathBuf,
    /// Directory named datasets are resolved in
    pub data_dir: PathBuf,
    /// Dataset used by train-from-file when no name is given
    pub default_dataset: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://ml_server.db".to_string(),
            artifact_path: PathBuf::from("saved_models/model.bin"),
            data_dir: PathBuf::from("data"),
            default_dataset: "music_students_data.csv".to_string(),
        }
    }
}

impl StorageConfig {
    /// Whether the ledger should live in process memory
    pub fn is_in_memory(&self) -> bool {
        self.database_url.eq_ignore_ascii_case("memory")
    }
}

/// Feature schema and estimator selection
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ModelConfig {
    pub categorical: Vec<String>,
    pub numeric: Vec<String>,
    pub target: String,
    pub regressor: RegressorKind,
    /// L2 penalty used by the ridge regressor
    pub ridge_penalty: f64,
    /// Number of trees grown by the random forest regressor
    pub forest_trees: usize,
    /// Share of rows held out for evaluation
    pub test_fraction: f64,
    /// Seed for the train/test partition
    pub seed: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            categorical: vec![
                "Subject/Instrument".to_string(),
                "City".to_string(),
                "Month".to_string(),
            ],
            numeric: vec!["Age".to_string()],
            target: "Price".to_string(),
            regressor: RegressorKind::Linear,
            ridge_penalty: 1.0,
            forest_trees: 200,
            test_fraction: 0.2,
            seed: 0,
        }
    }
}

impl ModelConfig {
    /// Feature schema described by this configuration
    pub fn schema(&self) -> FeatureSchema {
        FeatureSchema::new(
            self.categorical.clone(),
            self.numeric.clone(),
            self.target.clone(),
        )
    }
}

/// Argon2id cost parameters for credential hashing
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SecurityConfig {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            memory_kib: 19_456,
            iterations: 2,
            parallelism: 1,
        }
    }
}

/// Log output settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive, overridden by `RUST_LOG`
    pub level: String,
    /// Emit JSON lines instead of human-readable text
    pub json: bool,
    /// Also append logs to this file
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file: None,
        }
    }
}

impl ServiceConfig {
    /// Load defaults, then `path` (or `./meterml.toml` if present), then the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file_source = match path {
            Some(path) => config::File::from(path).required(true),
            None => config::File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        let settings = config::Config::builder()
            .add_source(config::Config::try_from(&ServiceConfig::default())?)
            .add_source(file_source)
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to assemble configuration")?;

        let loaded: ServiceConfig = settings
            .try_deserialize()
            .context("Failed to parse configuration")?;
        loaded.validate()?;

        match path {
            Some(path) => info!("Loaded configuration from {}", path.display()),
            None => info!("Loaded configuration from defaults and environment"),
        }
        Ok(loaded)
    }

    /// Layer a TOML document over the defaults (no file or environment lookup)
    pub fn from_toml(contents: &str) -> Result<Self> {
        let loaded: ServiceConfig = config::Config::builder()
            .add_source(config::Config::try_from(&ServiceConfig::default())?)
            .add_source(config::File::from_str(contents, config::FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        loaded.validate()?;
        Ok(loaded)
    }

    /// Write this configuration as TOML, creating parent directories
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| anyhow!("Failed to serialize TOML config: {}", e))?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write config file {}", path.display()))?;
        Ok(())
    }

    /// Reject configurations the service cannot run with
    pub fn validate(&self) -> Result<()> {
        let model = &self.model;
        if model.target.trim().is_empty() {
            return Err(anyhow!("model.target must not be empty"));
        }
        if model.categorical.is_empty() && model.numeric.is_empty() {
            return Err(anyhow!("model needs at least one feature column"));
        }

        let mut seen = HashSet::new();
        for column in model
            .categorical
            .iter()
            .chain(model.numeric.iter())
            .chain(std::iter::once(&model.target))
        {
            if !seen.insert(column.as_str()) {
                return Err(anyhow!("column '{}' is declared more than once", column));
            }
        }

        if !(model.test_fraction > 0.0 && model.test_fraction < 1.0) {
            return Err(anyhow!(
                "model.test_fraction must be in (0, 1), got {}",
                model.test_fraction
            ));
        }
        if !(model.ridge_penalty.is_finite() && model.ridge_penalty >= 0.0) {
            return Err(anyhow!("model.ridge_penalty must be a non-negative number"));
        }
        if model.forest_trees == 0 {
            return Err(anyhow!("model.forest_trees must be at least 1"));
        }

        let security = &self.security;
        if security.memory_kib == 0 || security.iterations == 0 || security.parallelism == 0 {
            return Err(anyhow!("security cost parameters must all be at least 1"));
        }
        Ok(())
    }
}
