//! TimeSeries data structure for the demand signal and its covariates.

use crate::error::{ForecastError, Result};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;

/// A univariate target series with optional named covariate columns.
///
/// Timestamps must be strictly increasing with a fixed step (e.g. hourly).
/// The target may contain NaN gaps; the preprocessor repairs or drops them.
#[derive(Debug, Clone)]
pub struct TimeSeries {
    timestamps: Vec<DateTime<Utc>>,
    target: Vec<f64>,
    covariate_names: Vec<String>,
    covariates: HashMap<String, Vec<f64>>,
}

impl TimeSeries {
    /// Create a series from timestamps and target values.
    pub fn new(timestamps: Vec<DateTime<Utc>>, target: Vec<f64>) -> Result<Self> {
        if target.len() != timestamps.len() {
            return Err(ForecastError::DimensionMismatch {
                expected: timestamps.len(),
                got: target.len(),
            });
        }
        for i in 1..timestamps.len() {
            if timestamps[i] <= timestamps[i - 1] {
                return Err(ForecastError::TimestampError(
                    "timestamps must be strictly increasing".to_string(),
                ));
            }
        }
        Ok(Self {
            timestamps,
            target,
            covariate_names: Vec::new(),
            covariates: HashMap::new(),
        })
    }

    /// Attach a named covariate column (e.g. temperature).
    pub fn with_covariate(mut self, name: &str, values: Vec<f64>) -> Result<Self> {
        if values.len() != self.timestamps.len() {
            return Err(ForecastError::DimensionMismatch {
                expected: self.timestamps.len(),
                got: values.len(),
            });
        }
        if !self.covariates.contains_key(name) {
            self.covariate_names.push(name.to_string());
        }
        self.covariates.insert(name.to_string(), values);
        Ok(self)
    }

    /// Number of observations.
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    /// Check if the series is empty.
    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    /// Get timestamps.
    pub fn timestamps(&self) -> &[DateTime<Utc>] {
        &self.timestamps
    }

    /// Get the target values.
    pub fn target(&self) -> &[f64] {
        &self.target
    }

    /// Covariate column names in insertion order.
    pub fn covariate_names(&self) -> &[String] {
        &self.covariate_names
    }

    /// Get a covariate column by name.
    pub fn covariate(&self, name: &str) -> Option<&[f64]> {
        self.covariates.get(name).map(|v| v.as_slice())
    }

    /// The most recent timestamp, if any.
    pub fn last_timestamp(&self) -> Option<DateTime<Utc>> {
        self.timestamps.last().copied()
    }

    /// Extract a half-open slice `[start, end)` of the series.
    pub fn slice(&self, start: usize, end: usize) -> Result<TimeSeries> {
        if start > end {
            return Err(ForecastError::InvalidParameter(
                "start must be <= end".to_string(),
            ));
        }
        if end > self.len() {
            return Err(ForecastError::InvalidParameter(format!(
                "slice end {} exceeds series length {}",
                end,
                self.len()
            )));
        }

        let covariates: HashMap<String, Vec<f64>> = self
            .covariates
            .iter()
            .map(|(name, values)| (name.clone(), values[start..end].to_vec()))
            .collect();

        Ok(TimeSeries {
            timestamps: self.timestamps[start..end].to_vec(),
            target: self.target[start..end].to_vec(),
            covariate_names: self.covariate_names.clone(),
            covariates,
        })
    }

    /// Infer the fixed step between samples from the modal timestamp spacing.
    pub fn infer_step(&self) -> Result<Duration> {
        if self.len() < 2 {
            return Err(ForecastError::InsufficientData {
                needed: 2,
                got: self.len(),
            });
        }

        let mut counts: HashMap<i64, usize> = HashMap::new();
        for pair in self.timestamps.windows(2) {
            let diff = (pair[1] - pair[0]).num_seconds();
            *counts.entry(diff).or_insert(0) += 1;
        }

        let modal = counts
            .into_iter()
            .max_by_key(|&(_, count)| count)
            .map(|(diff, _)| diff)
            .ok_or_else(|| {
                ForecastError::TimestampError("empty spacing data".to_string())
            })?;

        Ok(Duration::seconds(modal))
    }

    /// Whether the target contains NaN or infinite values.
    pub fn has_missing_values(&self) -> bool {
        self.target.iter().any(|v| !v.is_finite())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn make_timestamps(n: usize) -> Vec<DateTime<Utc>> {
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        (0..n).map(|i| base + Duration::hours(i as i64)).collect()
    }

    #[test]
    fn constructs_with_target_and_covariates() {
        let ts = TimeSeries::new(make_timestamps(3), vec![1.0, 2.0, 3.0])
            .unwrap()
            .with_covariate("temperature", vec![20.0, 21.0, 19.5])
            .unwrap();

        assert_eq!(ts.len(), 3);
        assert_eq!(ts.target(), &[1.0, 2.0, 3.0]);
        assert_eq!(ts.covariate_names(), &["temperature"]);
        assert_eq!(ts.covariate("temperature"), Some([20.0, 21.0, 19.5].as_slice()));
        assert_eq!(ts.covariate("humidity"), None);
    }

    #[test]
    fn rejects_non_increasing_timestamps() {
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let timestamps = vec![base, base + Duration::hours(2), base + Duration::hours(1)];
        let result = TimeSeries::new(timestamps, vec![1.0, 2.0, 3.0]);
        assert!(matches!(result, Err(ForecastError::TimestampError(_))));

        let timestamps = vec![base, base + Duration::hours(1), base + Duration::hours(1)];
        let result = TimeSeries::new(timestamps, vec![1.0, 2.0, 3.0]);
        assert!(matches!(result, Err(ForecastError::TimestampError(_))));
    }

    #[test]
    fn rejects_mismatched_column_lengths() {
        let result = TimeSeries::new(make_timestamps(3), vec![1.0, 2.0]);
        assert!(matches!(
            result,
            Err(ForecastError::DimensionMismatch { expected: 3, got: 2 })
        ));

        let result = TimeSeries::new(make_timestamps(3), vec![1.0, 2.0, 3.0])
            .unwrap()
            .with_covariate("temperature", vec![20.0]);
        assert!(result.is_err());
    }

    #[test]
    fn slice_preserves_covariates() {
        let ts = TimeSeries::new(make_timestamps(5), vec![1.0, 2.0, 3.0, 4.0, 5.0])
            .unwrap()
            .with_covariate("temperature", vec![10.0, 11.0, 12.0, 13.0, 14.0])
            .unwrap();

        let sliced = ts.slice(1, 4).unwrap();
        assert_eq!(sliced.len(), 3);
        assert_eq!(sliced.target(), &[2.0, 3.0, 4.0]);
        assert_eq!(sliced.covariate("temperature"), Some([11.0, 12.0, 13.0].as_slice()));
    }

    #[test]
    fn infers_hourly_step() {
        let ts = TimeSeries::new(make_timestamps(10), (0..10).map(|i| i as f64).collect())
            .unwrap();
        assert_eq!(ts.infer_step().unwrap(), Duration::hours(1));
    }

    #[test]
    fn infer_step_needs_two_points() {
        let ts = TimeSeries::new(make_timestamps(1), vec![1.0]).unwrap();
        assert!(matches!(
            ts.infer_step(),
            Err(ForecastError::InsufficientData { needed: 2, got: 1 })
        ));
    }

    #[test]
    fn detects_missing_values() {
        let ts = TimeSeries::new(make_timestamps(3), vec![1.0, f64::NAN, 3.0]).unwrap();
        assert!(ts.has_missing_values());

        let ts = TimeSeries::new(make_timestamps(3), vec![1.0, 2.0, 3.0]).unwrap();
        assert!(!ts.has_missing_values());
    }
}
