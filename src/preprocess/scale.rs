//! Scaling transforms with fit-before-transform enforced at the type level.
//!
//! `fit` consumes raw data and produces a fitted scaler; `transform` and
//! `inverse_transform` exist only on the fitted type, so calling them
//! before fitting is unrepresentable.

use crate::error::{ForecastError, Result};
use serde::{Deserialize, Serialize};

const EPS: f64 = 1e-10;

/// Min/max scaler mapping each column to the [0, 1] range.
pub struct MinMaxScaler;

impl MinMaxScaler {
    /// Fit per-column min/max statistics on column-major data.
    pub fn fit(columns: &[Vec<f64>]) -> Result<FittedScaler> {
        if columns.is_empty() || columns.iter().any(|c| c.is_empty()) {
            return Err(ForecastError::EmptyData);
        }

        let mut mins = Vec::with_capacity(columns.len());
        let mut ranges = Vec::with_capacity(columns.len());
        for column in columns {
            let min = column
                .iter()
                .copied()
                .filter(|v| v.is_finite())
                .fold(f64::INFINITY, f64::min);
            let max = column
                .iter()
                .copied()
                .filter(|v| v.is_finite())
                .fold(f64::NEG_INFINITY, f64::max);
            if !min.is_finite() || !max.is_finite() {
                return Err(ForecastError::ComputationError(
                    "scaler fit on column with no finite values".to_string(),
                ));
            }
            let range = max - min;
            mins.push(min);
            ranges.push(if range < EPS { 1.0 } else { range });
        }

        Ok(FittedScaler { mins, ranges })
    }

    /// Fit on a single column.
    pub fn fit_column(values: &[f64]) -> Result<FittedScaler> {
        Self::fit(std::slice::from_ref(&values.to_vec()))
    }
}

/// Fitted min/max statistics; the only type exposing `transform`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedScaler {
    mins: Vec<f64>,
    ranges: Vec<f64>,
}

impl FittedScaler {
    /// Number of columns the scaler was fit on.
    pub fn n_columns(&self) -> usize {
        self.mins.len()
    }

    /// Transform one column using the statistics fit for it.
    pub fn transform_column(&self, column: usize, values: &[f64]) -> Result<Vec<f64>> {
        let (min, range) = self.stats(column)?;
        Ok(values.iter().map(|&v| (v - min) / range).collect())
    }

    /// Transform column-major data; column count must match the fit.
    pub fn transform(&self, columns: &[Vec<f64>]) -> Result<Vec<Vec<f64>>> {
        if columns.len() != self.n_columns() {
            return Err(ForecastError::DimensionMismatch {
                expected: self.n_columns(),
                got: columns.len(),
            });
        }
        columns
            .iter()
            .enumerate()
            .map(|(i, column)| self.transform_column(i, column))
            .collect()
    }

    /// Recover original-scale values for one column.
    pub fn inverse_transform_column(&self, column: usize, values: &[f64]) -> Result<Vec<f64>> {
        let (min, range) = self.stats(column)?;
        Ok(values.iter().map(|&v| v * range + min).collect())
    }

    fn stats(&self, column: usize) -> Result<(f64, f64)> {
        if column >= self.n_columns() {
            return Err(ForecastError::DimensionMismatch {
                expected: self.n_columns(),
                got: column + 1,
            });
        }
        Ok((self.mins[column], self.ranges[column]))
    }
}

/// Zero-mean, unit-variance scaler over row-major data.
///
/// Used internally by the sequence forecasters on flattened windows.
pub struct StandardScaler;

impl StandardScaler {
    /// Fit per-dimension mean/std on row-major data.
    pub fn fit(rows: &[Vec<f64>]) -> Result<FittedStandardScaler> {
        let first = rows.first().ok_or(ForecastError::EmptyData)?;
        let dims = first.len();
        if dims == 0 {
            return Err(ForecastError::EmptyData);
        }
        if rows.iter().any(|r| r.len() != dims) {
            return Err(ForecastError::DimensionMismatch {
                expected: dims,
                got: rows.iter().map(|r| r.len()).find(|&l| l != dims).unwrap_or(0),
            });
        }

        let n = rows.len() as f64;
        let mut means = vec![0.0; dims];
        for row in rows {
            for (m, v) in means.iter_mut().zip(row) {
                *m += v;
            }
        }
        for m in &mut means {
            *m /= n;
        }

        let mut stds = vec![0.0; dims];
        for row in rows {
            for ((s, v), m) in stds.iter_mut().zip(row).zip(&means) {
                *s += (v - m).powi(2);
            }
        }
        for s in &mut stds {
            let std = (*s / n).sqrt();
            *s = if std < EPS { 1.0 } else { std };
        }

        Ok(FittedStandardScaler { means, stds })
    }
}

/// Fitted standardization statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedStandardScaler {
    means: Vec<f64>,
    stds: Vec<f64>,
}

impl FittedStandardScaler {
    /// Number of input dimensions.
    pub fn dims(&self) -> usize {
        self.means.len()
    }

    /// Standardize a single row.
    pub fn transform_row(&self, row: &[f64]) -> Result<Vec<f64>> {
        if row.len() != self.dims() {
            return Err(ForecastError::DimensionMismatch {
                expected: self.dims(),
                got: row.len(),
            });
        }
        Ok(row
            .iter()
            .zip(self.means.iter().zip(&self.stds))
            .map(|(v, (m, s))| (v - m) / s)
            .collect())
    }
}
