//! Feature transform: one-hot categoricals and z-scored numerics
//!
//! The transform is fit on the training subset only and stored inside the
//! artifact, so prediction applies exactly the statistics seen at training.

use ndarray::{Array1, Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::ops::Range;

/// Indicator encoding for one categorical column.
///
/// Categories are kept sorted with one indicator column each. Values not seen
/// at fit time encode as all zeros and so match no known level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryEncoder {
    column: String,
    categories: Vec<String>,
}

impl CategoryEncoder {
    fn fit<'a>(column: &str, values: impl Iterator<Item = &'a str>) -> Self {
        let categories: BTreeSet<&str> = values.collect();
        Self {
            column: column.to_string(),
            categories: categories.into_iter().map(str::to_string).collect(),
        }
    }

    pub fn column(&self) -> &str {
        &self.column
    }

    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    /// Number of indicator columns produced
    pub fn width(&self) -> usize {
        self.categories.len()
    }

    /// Indicator column set by `value`, `None` for unseen values
    fn indicator(&self, value: &str) -> Option<usize> {
        self.categories
            .binary_search_by(|c| c.as_str().cmp(value))
            .ok()
    }
}

/// Z-score scaling for one numeric column (population standard deviation)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    column: String,
    mean: f64,
    scale: f64,
}

impl StandardScaler {
    pub fn column(&self) -> &str {
        &self.column
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    fn apply(&self, value: f64) -> f64 {
        (value - self.mean) / self.scale
    }
}

/// Fitted encoding of a raw feature row into a numeric design row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureTransform {
    encoders: Vec<CategoryEncoder>,
    scalers: Vec<StandardScaler>,
}

impl FeatureTransform {
    /// Learn categories and scaling statistics.
    ///
    /// `categorical` is row-major with one value per categorical column;
    /// `numeric` has one column per numeric feature. Both must have the same
    /// number of rows, and at least one row.
    pub fn fit(
        categorical_columns: &[String],
        numeric_columns: &[String],
        categorical: &[Vec<String>],
        numeric: ArrayView2<f64>,
    ) -> Self {
        let encoders = categorical_columns
            .iter()
            .enumerate()
            .map(|(idx, column)| {
                CategoryEncoder::fit(column, categorical.iter().map(|row| row[idx].as_str()))
            })
            .collect();

        let means = numeric
            .mean_axis(Axis(0))
            .unwrap_or_else(|| Array1::zeros(numeric.ncols()));
        let stds = numeric.std_axis(Axis(0), 0.0);

        let scalers = numeric_columns
            .iter()
            .enumerate()
            .map(|(idx, column)| StandardScaler {
                column: column.clone(),
                mean: means[idx],
                // Constant columns pass through centred
                scale: if stds[idx] == 0.0 { 1.0 } else { stds[idx] },
            })
            .collect();

        Self { encoders, scalers }
    }

    pub fn encoders(&self) -> &[CategoryEncoder] {
        &self.encoders
    }

    pub fn scalers(&self) -> &[StandardScaler] {
        &self.scalers
    }

    /// Width of the design matrix produced by [`FeatureTransform::transform`]
    pub fn output_width(&self) -> usize {
        self.encoders.iter().map(CategoryEncoder::width).sum::<usize>() + self.scalers.len()
    }

    /// Column ranges of the design matrix holding each categorical's indicators.
    ///
    /// Within a block exactly one column is set for a known value, so every
    /// block sums to the constant column.
    pub fn indicator_blocks(&self) -> Vec<Range<usize>> {
        let mut offset = 0;
        self.encoders
            .iter()
            .map(|encoder| {
                let block = offset..offset + encoder.width();
                offset = block.end;
                block
            })
            .collect()
    }

    /// Encode rows into a design matrix
    pub fn transform(&self, categorical: &[Vec<String>], numeric: ArrayView2<f64>) -> Array2<f64> {
        let rows = numeric.nrows();
        let mut design = Array2::zeros((rows, self.output_width()));

        for row_idx in 0..rows {
            let mut offset = 0;
            for (col_idx, encoder) in self.encoders.iter().enumerate() {
                if let Some(hot) = encoder.indicator(&categorical[row_idx][col_idx]) {
                    design[(row_idx, offset + hot)] = 1.0;
                }
                offset += encoder.width();
            }
            for (col_idx, scaler) in self.scalers.iter().enumerate() {
                design[(row_idx, offset + col_idx)] = scaler.apply(numeric[(row_idx, col_idx)]);
            }
        }

        design
    }
}
