//! Dataset ingestion
//!
//! Parses CSV bytes, checks the required columns and coerces values. Rows with
//! a missing or unparseable required value are dropped, never fatal.

use ndarray::{Array1, Array2};
use polars::prelude::*;
use std::io::{Cursor, ErrorKind};
use std::path::Path;
use tracing::{debug, warn};

use crate::error::{CoreError, CoreResult};
use crate::model::schema::FeatureSchema;

/// Cell spellings read as missing, in addition to blank cells
const MISSING_MARKERS: &[&str] = &[
    "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN", "<NA>",
    "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

/// Rows that passed validation, split by column role
#[derive(Debug, Clone)]
pub struct ValidatedDataset {
    pub schema: FeatureSchema,
    /// Row-major, one value per categorical column
    pub categorical: Vec<Vec<String>>,
    /// One column per numeric feature
    pub numeric: Array2<f64>,
    pub target: Array1<f64>,
    /// Rows removed for missing or unparseable values
    pub dropped_rows: usize,
}

impl ValidatedDataset {
    pub fn rows(&self) -> usize {
        self.target.len()
    }

    pub fn is_empty(&self) -> bool {
        self.target.is_empty()
    }
}

/// Stateless CSV validator
pub struct DatasetIngestor;

impl DatasetIngestor {
    /// Validate raw CSV bytes against `schema`
    pub fn ingest(bytes: &[u8], schema: &FeatureSchema) -> CoreResult<ValidatedDataset> {
        let frame = CsvReadOptions::default()
            .with_has_header(true)
            .with_infer_schema_length(Some(0))
            .into_reader_with_file_handle(Cursor::new(bytes.to_vec()))
            .finish()
            .map_err(|e| CoreError::MalformedDataset(e.to_string()))?;

        let headers: Vec<String> = frame
            .get_column_names()
            .iter()
            .map(|name| name.to_string())
            .collect();
        let missing: Vec<String> = schema
            .required_columns()
            .into_iter()
            .filter(|column| !headers.iter().any(|h| h.as_str() == *column))
            .map(str::to_string)
            .collect();
        if !missing.is_empty() {
            return Err(CoreError::SchemaError { missing });
        }

        let categorical_cells = schema
            .categorical()
            .iter()
            .map(|column| text_column(&frame, column))
            .collect::<CoreResult<Vec<_>>>()?;
        let numeric_cells = schema
            .numeric()
            .iter()
            .map(|column| number_column(&frame, column))
            .collect::<CoreResult<Vec<_>>>()?;
        let target_cells = number_column(&frame, schema.target())?;

        let height = frame.height();
        let mut categorical = Vec::with_capacity(height);
        let mut numeric = Vec::with_capacity(height * numeric_cells.len());
        let mut target = Vec::with_capacity(height);
        let mut dropped_rows = 0;

        for row in 0..height {
            let text_values: Option<Vec<String>> = categorical_cells
                .iter()
                .map(|column| column[row].clone())
                .collect();
            let number_values: Option<Vec<f64>> =
                numeric_cells.iter().map(|column| column[row]).collect();

            match (text_values, number_values, target_cells[row]) {
                (Some(text_values), Some(number_values), Some(y)) => {
                    categorical.push(text_values);
                    numeric.extend(number_values);
                    target.push(y);
                }
                _ => dropped_rows += 1,
            }
        }

        if dropped_rows > 0 {
            warn!(
                "Dropped {} of {} rows with missing or non-numeric values",
                dropped_rows, height
            );
        }

        let kept = target.len();
        let numeric = Array2::from_shape_vec((kept, schema.numeric().len()), numeric)
            .map_err(|e| CoreError::internal("assemble numeric features", e))?;
        debug!("Ingested {} rows ({} dropped)", kept, dropped_rows);

        Ok(ValidatedDataset {
            schema: schema.clone(),
            categorical,
            numeric,
            target: Array1::from_vec(target),
            dropped_rows,
        })
    }

    /// Read and validate a CSV file
    pub fn ingest_file(path: &Path, schema: &FeatureSchema) -> CoreResult<ValidatedDataset> {
        let bytes = std::fs::read(path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => CoreError::DatasetNotFound(path.display().to_string()),
            _ => CoreError::internal("read dataset", e),
        })?;
        debug!("Read {} bytes from {}", bytes.len(), path.display());
        Self::ingest(&bytes, schema)
    }
}

fn is_missing(cell: &str) -> bool {
    let trimmed = cell.trim();
    trimmed.is_empty() || MISSING_MARKERS.contains(&trimmed)
}

fn text_column(frame: &DataFrame, name: &str) -> CoreResult<Vec<Option<String>>> {
    let values = frame
        .column(name)
        .and_then(|series| series.str())
        .map_err(|e| CoreError::MalformedDataset(e.to_string()))?;

    Ok(values
        .into_iter()
        .map(|cell| match cell {
            Some(cell) if !is_missing(cell) => Some(cell.trim().to_string()),
            _ => None,
        })
        .collect())
}

fn number_column(frame: &DataFrame, name: &str) -> CoreResult<Vec<Option<f64>>> {
    Ok(text_column(frame, name)?
        .into_iter()
        .map(|cell| {
            cell.and_then(|text| text.parse::<f64>().ok())
                .filter(|value| value.is_finite())
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn schema() -> FeatureSchema {
        FeatureSchema::new(
            vec!["City".to_string(), "Month".to_string()],
            vec!["Age".to_string()],
            "Price".to_string(),
        )
    }

    #[test]
    fn test_valid_rows_are_split_by_role() {
        let csv = "City,Month,Age,Price,Notes\nParis,Jan,31,120.5,x\nRome, Feb ,22,80,\n";
        let dataset = DatasetIngestor::ingest(csv.as_bytes(), &schema()).unwrap();

        assert_eq!(dataset.rows(), 2);
        assert_eq!(dataset.dropped_rows, 0);
        assert_eq!(dataset.categorical[1], vec!["Rome", "Feb"]);
        assert_eq!(dataset.numeric[(0, 0)], 31.0);
        assert_eq!(dataset.target.to_vec(), vec![120.5, 80.0]);
    }

    #[test]
    fn test_missing_columns_are_named_exactly() {
        let csv = "City,Age\nParis,31\n";
        match DatasetIngestor::ingest(csv.as_bytes(), &schema()) {
            Err(CoreError::SchemaError { missing }) => {
                assert_eq!(missing, vec!["Month".to_string(), "Price".to_string()])
            }
            other => panic!("expected SchemaError, got {other:?}"),
        }
    }

    #[test]
    fn test_bad_values_drop_rows() {
        let csv = "City,Month,Age,Price\n\
                   Paris,Jan,thirty,100\n\
                   Paris,,30,100\n\
                   NA,Jan,30,100\n\
                   Oslo,Mar,40,inf\n\
                   Oslo,Mar,40,90\n";
        let dataset = DatasetIngestor::ingest(csv.as_bytes(), &schema()).unwrap();

        assert_eq!(dataset.rows(), 1);
        assert_eq!(dataset.dropped_rows, 4);
        assert_eq!(dataset.categorical[0], vec!["Oslo", "Mar"]);
    }

    #[test]
    fn test_all_rows_dropped_is_not_an_ingest_error() {
        let csv = "City,Month,Age,Price\nParis,Jan,,100\n";
        let dataset = DatasetIngestor::ingest(csv.as_bytes(), &schema()).unwrap();
        assert!(dataset.is_empty());
        assert_eq!(dataset.numeric.dim(), (0, 1));
    }

    #[test]
    fn test_missing_file_is_dataset_not_found() {
        let dir = TempDir::new().unwrap();
        let result = DatasetIngestor::ingest_file(&dir.path().join("absent.csv"), &schema());
        assert!(matches!(result, Err(CoreError::DatasetNotFound(_))));
    }

    #[test]
    fn test_empty_input_is_malformed() {
        assert!(matches!(
            DatasetIngestor::ingest(b"", &schema()),
            Err(CoreError::MalformedDataset(_))
        ));
    }
}
