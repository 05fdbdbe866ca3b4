//! Statistical anomaly detection over the demand history.
//!
//! Three detectors run side by side: a centered rolling z-score (the
//! primary detector), a whole-series IQR fence, and a step-to-step
//! sudden-change check. Results are descriptive; nothing here feeds back
//! into the forecasters.

use crate::config::AnomalyConfig;
use crate::error::{ForecastError, Result};
use crate::preprocess::window::{rolling_mean, rolling_std};
use crate::utils::stats;
use chrono::{DateTime, Utc};
use serde::Serialize;

const EPS: f64 = 1e-10;
const IQR_FENCE: f64 = 1.5;
/// Extra IQR beyond the fence that upgrades severity.
const IQR_HIGH_MARGIN: f64 = 1.0;
/// Z-score multiple that upgrades severity.
const ZSCORE_HIGH_FACTOR: f64 = 1.5;
/// Change-threshold multiple that upgrades severity.
const CHANGE_HIGH_FACTOR: f64 = 2.0;

const MAX_ZSCORE_ALERTS: usize = 5;
const MAX_CHANGE_ALERTS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Severity {
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ChangeDirection {
    Spike,
    Drop,
}

/// A point flagged by the z-score or IQR detector.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnomalyRecord {
    /// Position in the input slice.
    pub index: usize,
    pub value: f64,
    /// Detector-specific score (|z| for z-score, IQR distance for IQR).
    pub score: f64,
    pub severity: Severity,
    /// Range the detector considered normal at this point.
    pub expected_range: (f64, f64),
}

/// A step-to-step jump flagged by the sudden-change detector.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SuddenChange {
    /// Position of the second point of the jump.
    pub index: usize,
    pub from_value: f64,
    pub to_value: f64,
    /// Signed change as a percentage of the previous value.
    pub change_percent: f64,
    pub direction: ChangeDirection,
    pub severity: Severity,
}

/// Combined output of one analysis pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnomalyReport {
    pub zscore: Vec<AnomalyRecord>,
    pub iqr: Vec<AnomalyRecord>,
    pub sudden_changes: Vec<SuddenChange>,
    /// Combined count across all three detectors.
    pub total_anomalies: usize,
    /// Primary (z-score) anomaly count as a percentage of the series,
    /// rounded to two decimals.
    pub anomaly_rate: f64,
}

/// A human-readable alert derived from a report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alert {
    pub timestamp: DateTime<Utc>,
    pub severity: Severity,
    pub message: String,
    pub recommendation: String,
}

/// Runs the three statistical detectors.
pub struct AnomalyDetector {
    config: AnomalyConfig,
}

impl AnomalyDetector {
    pub fn new(config: AnomalyConfig) -> Self {
        Self { config }
    }

    /// Analyze a series of observed values.
    pub fn analyze(&self, values: &[f64]) -> Result<AnomalyReport> {
        if values.is_empty() {
            return Err(ForecastError::EmptyData);
        }

        let zscore = self.detect_zscore(values);
        let iqr = self.detect_iqr(values);
        let sudden_changes = self.detect_sudden_changes(values);

        let total_anomalies = zscore.len() + iqr.len() + sudden_changes.len();
        let rate = zscore.len() as f64 / values.len() as f64 * 100.0;
        let anomaly_rate = (rate * 100.0).round() / 100.0;

        log::debug!(
            "anomaly: {} z-score, {} iqr, {} sudden changes over {} points",
            zscore.len(),
            iqr.len(),
            sudden_changes.len(),
            values.len()
        );

        Ok(AnomalyReport {
            zscore,
            iqr,
            sudden_changes,
            total_anomalies,
            anomaly_rate,
        })
    }

    /// Centered rolling z-score against the configured window.
    ///
    /// Points without a full surrounding window (both edges of the
    /// series) have no defined rolling std and are skipped.
    fn detect_zscore(&self, values: &[f64]) -> Vec<AnomalyRecord> {
        let means = rolling_mean(values, self.config.window, true);
        let stds = rolling_std(values, self.config.window, true);
        let threshold = self.config.threshold;

        values
            .iter()
            .enumerate()
            .filter_map(|(i, &v)| {
                let (mean, std) = (means[i], stds[i]);
                if !mean.is_finite() || !std.is_finite() || std < EPS {
                    return None;
                }
                let z = (v - mean) / std;
                if z.abs() <= threshold {
                    return None;
                }
                Some(AnomalyRecord {
                    index: i,
                    value: v,
                    score: z.abs(),
                    severity: if z.abs() > ZSCORE_HIGH_FACTOR * threshold {
                        Severity::High
                    } else {
                        Severity::Medium
                    },
                    expected_range: (mean - threshold * std, mean + threshold * std),
                })
            })
            .collect()
    }

    /// Tukey fences over the whole series.
    ///
    /// A zero IQR (near-constant data) still flags values off the fence;
    /// scores then fall back to absolute distance.
    fn detect_iqr(&self, values: &[f64]) -> Vec<AnomalyRecord> {
        let q1 = stats::quantile(values, 0.25);
        let q3 = stats::quantile(values, 0.75);
        let iqr = q3 - q1;
        if !iqr.is_finite() {
            return Vec::new();
        }
        let lower = q1 - IQR_FENCE * iqr;
        let upper = q3 + IQR_FENCE * iqr;
        let denom = if iqr < EPS { 1.0 } else { iqr };

        values
            .iter()
            .enumerate()
            .filter_map(|(i, &v)| {
                let distance = if v < lower {
                    (lower - v) / denom
                } else if v > upper {
                    (v - upper) / denom
                } else {
                    return None;
                };
                let high = v < lower - IQR_HIGH_MARGIN * iqr || v > upper + IQR_HIGH_MARGIN * iqr;
                Some(AnomalyRecord {
                    index: i,
                    value: v,
                    score: distance,
                    severity: if high { Severity::High } else { Severity::Medium },
                    expected_range: (lower, upper),
                })
            })
            .collect()
    }

    /// Consecutive-step percentage jumps.
    fn detect_sudden_changes(&self, values: &[f64]) -> Vec<SuddenChange> {
        let threshold = self.config.sudden_change_threshold;
        values
            .windows(2)
            .enumerate()
            .filter_map(|(i, pair)| {
                let (prev, curr) = (pair[0], pair[1]);
                if prev.abs() < EPS {
                    return None;
                }
                let change = (curr - prev) / prev.abs();
                if change.abs() <= threshold {
                    return None;
                }
                Some(SuddenChange {
                    index: i + 1,
                    from_value: prev,
                    to_value: curr,
                    change_percent: change * 100.0,
                    direction: if change > 0.0 {
                        ChangeDirection::Spike
                    } else {
                        ChangeDirection::Drop
                    },
                    severity: if change.abs() > CHANGE_HIGH_FACTOR * threshold {
                        Severity::High
                    } else {
                        Severity::Medium
                    },
                })
            })
            .collect()
    }

    /// Score a single value against a history, 0 (normal) to 100.
    pub fn anomaly_score(&self, value: f64, history: &[f64]) -> Result<f64> {
        if history.len() < 2 {
            return Err(ForecastError::InsufficientData {
                needed: 2,
                got: history.len(),
            });
        }
        let mean = stats::mean(history);
        let std = stats::std_dev(history);
        if !std.is_finite() || std < EPS {
            return Ok(if (value - mean).abs() < EPS { 0.0 } else { 100.0 });
        }
        let z = ((value - mean) / std).abs();
        let score = (z / self.config.threshold * 100.0).min(100.0);
        Ok((score * 100.0).round() / 100.0)
    }

    /// Turn a report into a capped alert list: the first z-score hits
    /// followed by the first sudden changes, in detection order.
    pub fn alerts(&self, values: &[f64], timestamps: &[DateTime<Utc>]) -> Result<Vec<Alert>> {
        if values.len() != timestamps.len() {
            return Err(ForecastError::DimensionMismatch {
                expected: values.len(),
                got: timestamps.len(),
            });
        }
        let report = self.analyze(values)?;

        let mut alerts = Vec::new();
        for record in report.zscore.into_iter().take(MAX_ZSCORE_ALERTS) {
            let (low, high) = record.expected_range;
            alerts.push(Alert {
                timestamp: timestamps[record.index],
                severity: record.severity,
                message: format!(
                    "Demand of {:.1} outside expected range {:.1} to {:.1} (score {:.1})",
                    record.value, low, high, record.score
                ),
                recommendation:
                    "Verify metering data for this interval and check for unusual consumption events"
                        .to_string(),
            });
        }
        for change in report.sudden_changes.into_iter().take(MAX_CHANGE_ALERTS) {
            let verb = match change.direction {
                ChangeDirection::Spike => "jumped",
                ChangeDirection::Drop => "fell",
            };
            alerts.push(Alert {
                timestamp: timestamps[change.index],
                severity: change.severity,
                message: format!(
                    "Demand {verb} {:.1}% between consecutive readings ({:.1} to {:.1})",
                    change.change_percent.abs(),
                    change.from_value,
                    change.to_value
                ),
                recommendation:
                    "Check for equipment switching, outages, or data transmission gaps"
                        .to_string(),
            });
        }
        Ok(alerts)
    }
}
