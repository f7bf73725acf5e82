//! Feature schema shared by ingestion, training and prediction

use serde::{Deserialize, Serialize};

/// Ordered column layout a model is trained against
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSchema {
    categorical: Vec<String>,
    numeric: Vec<String>,
    target: String,
}

impl FeatureSchema {
    pub fn new(categorical: Vec<String>, numeric: Vec<String>, target: String) -> Self {
        Self {
            categorical,
            numeric,
            target,
        }
    }

    pub fn categorical(&self) -> &[String] {
        &self.categorical
    }

    pub fn numeric(&self) -> &[String] {
        &self.numeric
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// Categorical columns, then numeric columns, then the target
    pub fn required_columns(&self) -> Vec<&str> {
        self.categorical
            .iter()
            .chain(self.numeric.iter())
            .map(String::as_str)
            .chain(std::iter::once(self.target.as_str()))
            .collect()
    }

    /// Input fields a prediction request must supply
    pub fn feature_names(&self) -> impl Iterator<Item = &str> {
        self.categorical
            .iter()
            .chain(self.numeric.iter())
            .map(String::as_str)
    }

    pub fn is_categorical(&self, name: &str) -> bool {
        self.categorical.iter().any(|c| c == name)
    }

    pub fn is_numeric(&self, name: &str) -> bool {
        self.numeric.iter().any(|c| c == name)
    }
}
