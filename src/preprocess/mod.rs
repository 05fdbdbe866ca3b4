//! Feature preprocessing: time/lag/rolling features, missing-value repair,
//! scaling and supervised windowing.

mod scale;
pub mod window;

pub use scale::{FittedScaler, FittedStandardScaler, MinMaxScaler, StandardScaler};

use crate::config::ForecastConfig;
use crate::core::TimeSeries;
use crate::error::{ForecastError, Result};
use chrono::{Datelike, Timelike};
use std::f64::consts::PI;

/// Maximum run of consecutive gaps closed by forward-fill before
/// interpolation takes over.
const FORWARD_FILL_LIMIT: usize = 3;

/// A fixed-length window of past rows plus the next scaled target value.
///
/// Each row is `[target, feature_0, feature_1, ...]`, all scaled.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureWindow {
    /// Window rows in chronological order.
    pub rows: Vec<Vec<f64>>,
    /// The scaled target value immediately following the window.
    pub label: f64,
}

impl FeatureWindow {
    /// Number of time steps in the window.
    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    /// Number of columns per row (1 target + features).
    pub fn n_cols(&self) -> usize {
        self.rows.first().map(|r| r.len()).unwrap_or(0)
    }
}

/// Model-ready output of a preprocessing call.
#[derive(Debug, Clone)]
pub struct PreparedData {
    /// Supervised windows in chronological order (never shuffled; training
    /// splits hold out the most recent fraction).
    pub windows: Vec<FeatureWindow>,
    /// Names of the feature columns, in row order after the target.
    pub feature_names: Vec<String>,
    /// Scaler fit on the target column; reuse for inverse-transforming
    /// predictions.
    pub target_scaler: FittedScaler,
    /// Per-column scaler fit on the feature matrix.
    pub feature_scaler: FittedScaler,
    /// The most recent `sequence_length` scaled rows, for forecasting.
    pub latest_window: Vec<Vec<f64>>,
}

impl PreparedData {
    /// Scaled training labels in chronological order.
    pub fn labels(&self) -> Vec<f64> {
        self.windows.iter().map(|w| w.label).collect()
    }
}

/// Turns a raw time-indexed series into supervised windows and scaled
/// features.
pub struct Preprocessor;

impl Preprocessor {
    /// Build features, repair gaps, scale, and window the series.
    ///
    /// Rows lacking history for the largest lag or rolling window are
    /// dropped after bounded forward-fill and linear interpolation; they
    /// are never zero-filled.
    pub fn fit_transform(series: &TimeSeries, config: &ForecastConfig) -> Result<PreparedData> {
        if series.is_empty() {
            return Err(ForecastError::EmptyData);
        }

        let target = series.target();
        let (mut feature_columns, feature_names) = build_features(series, config);
        let mut target_column = target.to_vec();

        repair_column(&mut target_column);
        for column in &mut feature_columns {
            repair_column(column);
        }

        // Drop rows still missing in any column.
        let keep: Vec<usize> = (0..target_column.len())
            .filter(|&i| {
                target_column[i].is_finite()
                    && feature_columns.iter().all(|c| c[i].is_finite())
            })
            .collect();

        let needed = config.sequence_length + 1;
        if keep.len() < needed {
            return Err(ForecastError::InsufficientData {
                needed,
                got: keep.len(),
            });
        }

        let target_kept: Vec<f64> = keep.iter().map(|&i| target_column[i]).collect();
        let features_kept: Vec<Vec<f64>> = feature_columns
            .iter()
            .map(|c| keep.iter().map(|&i| c[i]).collect())
            .collect();

        let target_scaler = MinMaxScaler::fit_column(&target_kept)?;
        let feature_scaler = MinMaxScaler::fit(&features_kept)?;

        let scaled_target = target_scaler.transform_column(0, &target_kept)?;
        let scaled_features = feature_scaler.transform(&features_kept)?;

        let n = scaled_target.len();
        let seq = config.sequence_length;
        let make_row = |j: usize| -> Vec<f64> {
            let mut row = Vec::with_capacity(1 + scaled_features.len());
            row.push(scaled_target[j]);
            for column in &scaled_features {
                row.push(column[j]);
            }
            row
        };

        let mut windows = Vec::with_capacity(n - seq);
        for i in seq..n {
            windows.push(FeatureWindow {
                rows: (i - seq..i).map(make_row).collect(),
                label: scaled_target[i],
            });
        }

        let latest_window: Vec<Vec<f64>> = (n - seq..n).map(make_row).collect();

        Ok(PreparedData {
            windows,
            feature_names,
            target_scaler,
            feature_scaler,
            latest_window,
        })
    }
}

/// Build the raw (unscaled) feature columns and their names.
fn build_features(series: &TimeSeries, config: &ForecastConfig) -> (Vec<Vec<f64>>, Vec<String>) {
    let timestamps = series.timestamps();
    let target = series.target();
    let target_name = &config.target_column;

    let mut columns: Vec<Vec<f64>> = Vec::new();
    let mut names: Vec<String> = Vec::new();

    // Cyclical time encodings plus raw calendar flags.
    let mut push = |name: &str, column: Vec<f64>| {
        names.push(name.to_string());
        columns.push(column);
    };

    push(
        "hour_sin",
        timestamps
            .iter()
            .map(|t| (2.0 * PI * t.hour() as f64 / 24.0).sin())
            .collect(),
    );
    push(
        "hour_cos",
        timestamps
            .iter()
            .map(|t| (2.0 * PI * t.hour() as f64 / 24.0).cos())
            .collect(),
    );
    push(
        "month_sin",
        timestamps
            .iter()
            .map(|t| (2.0 * PI * t.month() as f64 / 12.0).sin())
            .collect(),
    );
    push(
        "month_cos",
        timestamps
            .iter()
            .map(|t| (2.0 * PI * t.month() as f64 / 12.0).cos())
            .collect(),
    );
    push(
        "day_of_week",
        timestamps
            .iter()
            .map(|t| t.weekday().num_days_from_monday() as f64)
            .collect(),
    );
    push(
        "is_weekend",
        timestamps
            .iter()
            .map(|t| {
                if t.weekday().num_days_from_monday() >= 5 {
                    1.0
                } else {
                    0.0
                }
            })
            .collect(),
    );

    for name in series.covariate_names() {
        if let Some(values) = series.covariate(name) {
            names.push(name.clone());
            columns.push(values.to_vec());
        }
    }

    for &lag in &config.lags {
        let column: Vec<f64> = (0..target.len())
            .map(|i| if i >= lag { target[i - lag] } else { f64::NAN })
            .collect();
        names.push(format!("{target_name}_lag_{lag}"));
        columns.push(column);
    }

    for &w in &config.rolling_windows {
        names.push(format!("{target_name}_rolling_mean_{w}"));
        columns.push(window::rolling_mean(target, w, false));
        names.push(format!("{target_name}_rolling_std_{w}"));
        columns.push(window::rolling_std(target, w, false));
    }

    (columns, names)
}

/// Bounded forward-fill followed by linear interpolation of interior gaps.
fn repair_column(values: &mut [f64]) {
    forward_fill(values, FORWARD_FILL_LIMIT);
    interpolate_interior(values);
}

fn forward_fill(values: &mut [f64], limit: usize) {
    let mut last_valid: Option<f64> = None;
    let mut run = 0usize;
    for v in values.iter_mut() {
        if v.is_finite() {
            last_valid = Some(*v);
            run = 0;
        } else if let Some(fill) = last_valid {
            run += 1;
            if run <= limit {
                *v = fill;
            }
        }
    }
}

fn interpolate_interior(values: &mut [f64]) {
    let n = values.len();
    let mut i = 0;
    while i < n {
        if values[i].is_finite() {
            i += 1;
            continue;
        }
        let start = i;
        while i < n && !values[i].is_finite() {
            i += 1;
        }
        let end = i;

        // Interior gaps only; leading and trailing NaN runs are left for
        // the caller to drop.
        if start > 0 && end < n {
            let left = values[start - 1];
            let right = values[end];
            let segments = (end - start + 1) as f64;
            for (k, idx) in (start..end).enumerate() {
                let t = (k + 1) as f64 / segments;
                values[idx] = left + t * (right - left);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn make_series(n: usize) -> TimeSeries {
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let timestamps: Vec<DateTime<Utc>> =
            (0..n).map(|i| base + Duration::hours(i as i64)).collect();
        let values: Vec<f64> = (0..n)
            .map(|i| 100.0 + 20.0 * (i as f64 * 2.0 * PI / 24.0).sin())
            .collect();
        TimeSeries::new(timestamps, values).unwrap()
    }

    fn small_config() -> ForecastConfig {
        ForecastConfig {
            sequence_length: 8,
            lags: vec![1, 4],
            rolling_windows: vec![4],
            ..ForecastConfig::default()
        }
    }

    #[test]
    fn produces_chronological_windows_with_labels() {
        let series = make_series(60);
        let prepared = Preprocessor::fit_transform(&series, &small_config()).unwrap();

        assert!(!prepared.windows.is_empty());
        let first = &prepared.windows[0];
        assert_eq!(first.n_rows(), 8);
        // 6 time features + 2 lags + rolling mean/std.
        assert_eq!(first.n_cols(), 1 + prepared.feature_names.len());
        assert_eq!(prepared.feature_names.len(), 6 + 2 + 2);

        // The label of window i is the target column of window i+1's last row.
        let w0 = &prepared.windows[0];
        let w1 = &prepared.windows[1];
        assert_relative_eq!(w0.label, w1.rows.last().unwrap()[0], epsilon = 1e-12);
    }

    #[test]
    fn lag_feature_matches_shifted_target() {
        let series = make_series(60);
        let config = small_config();
        let prepared = Preprocessor::fit_transform(&series, &config).unwrap();

        let lag_idx = prepared
            .feature_names
            .iter()
            .position(|n| n == "demand_lag_4")
            .unwrap();

        // Within any window, the lag-4 feature of row j equals the target
        // column of row j-4 (both scaled by their own scalers, so compare
        // after inverse transforms).
        let w = &prepared.windows[3];
        for j in 4..w.n_rows() {
            let lag_scaled = w.rows[j][1 + lag_idx];
            let lag_raw = prepared
                .feature_scaler
                .inverse_transform_column(lag_idx, &[lag_scaled])
                .unwrap()[0];
            let target_scaled = w.rows[j - 4][0];
            let target_raw = prepared
                .target_scaler
                .inverse_transform_column(0, &[target_scaled])
                .unwrap()[0];
            assert_relative_eq!(lag_raw, target_raw, epsilon = 1e-9);
        }
    }

    #[test]
    fn rows_without_lag_history_are_dropped() {
        // 20 usable points with lag 4: rows 0..4 have no lag-4 history and
        // must be dropped, leaving 16 rows -> 16 - 8 windows.
        let series = make_series(20);
        let prepared = Preprocessor::fit_transform(&series, &small_config()).unwrap();
        assert_eq!(prepared.windows.len(), 20 - 4 - 8);
    }

    #[test]
    fn insufficient_rows_is_an_error_before_any_model_call() {
        let series = make_series(12);
        let result = Preprocessor::fit_transform(&series, &small_config());
        assert!(matches!(
            result,
            Err(ForecastError::InsufficientData { needed: 9, .. })
        ));
    }

    #[test]
    fn covariates_become_feature_columns() {
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let n = 40;
        let timestamps: Vec<DateTime<Utc>> =
            (0..n).map(|i| base + Duration::hours(i as i64)).collect();
        let target: Vec<f64> = (0..n).map(|i| 100.0 + i as f64).collect();
        let temp: Vec<f64> = (0..n).map(|i| 15.0 + (i % 24) as f64).collect();

        let series = TimeSeries::new(timestamps, target)
            .unwrap()
            .with_covariate("temperature", temp)
            .unwrap();

        let prepared = Preprocessor::fit_transform(&series, &small_config()).unwrap();
        assert!(prepared
            .feature_names
            .iter()
            .any(|n| n == "temperature"));
    }

    #[test]
    fn latest_window_covers_most_recent_rows() {
        let series = make_series(60);
        let prepared = Preprocessor::fit_transform(&series, &small_config()).unwrap();

        assert_eq!(prepared.latest_window.len(), 8);
        // Its last row is one step past the last supervised window's rows.
        let last_supervised = prepared.windows.last().unwrap();
        assert_relative_eq!(
            prepared.latest_window[7][0],
            last_supervised.label,
            epsilon = 1e-12
        );
    }

    #[test]
    fn forward_fill_respects_limit() {
        let mut values = vec![1.0, f64::NAN, f64::NAN, f64::NAN, f64::NAN, 6.0];
        forward_fill(&mut values, 3);
        assert_eq!(&values[1..4], &[1.0, 1.0, 1.0]);
        assert!(values[4].is_nan());
    }

    #[test]
    fn interpolation_fills_interior_gaps_only() {
        let mut values = vec![f64::NAN, 2.0, f64::NAN, 4.0, f64::NAN];
        interpolate_interior(&mut values);
        assert!(values[0].is_nan());
        assert_relative_eq!(values[2], 3.0, epsilon = 1e-10);
        assert!(values[4].is_nan());
    }

    #[test]
    fn gap_in_target_is_repaired_not_zero_filled() {
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let n = 40;
        let timestamps: Vec<DateTime<Utc>> =
            (0..n).map(|i| base + Duration::hours(i as i64)).collect();
        let mut target: Vec<f64> = (0..n).map(|i| 100.0 + i as f64).collect();
        target[20] = f64::NAN;

        let series = TimeSeries::new(timestamps, target).unwrap();
        let prepared = Preprocessor::fit_transform(&series, &small_config()).unwrap();

        // All windows are finite; the gap was filled with the previous
        // value rather than zero.
        for w in &prepared.windows {
            for row in &w.rows {
                assert!(row.iter().all(|v| v.is_finite()));
            }
        }
    }
}
