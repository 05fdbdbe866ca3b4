//! Additive trend + Fourier seasonality model.
//!
//! The fit is a ridge-regularized linear regression over a design matrix
//! of a piecewise-linear trend (evenly spaced changepoint hinges) and
//! daily/weekly/yearly Fourier terms. Prediction intervals come from the
//! in-sample residual spread and a normal quantile.

use crate::config::TrendConfig;
use crate::core::TimeSeries;
use crate::error::{ForecastError, Result};
use crate::models::persist::{self, LoadOutcome, Loaded};
use crate::models::trend::{TrendModel, TrendPoint};
use crate::utils::stats;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal};
use std::f64::consts::PI;
use std::path::Path;

const HOURS_PER_DAY: f64 = 24.0;
const HOURS_PER_WEEK: f64 = 168.0;
/// Mean tropical year in hours.
const HOURS_PER_YEAR: f64 = 8766.0;
/// Yearly terms need enough history to be identifiable.
const YEARLY_MIN_SPAN_HOURS: f64 = 1.5 * HOURS_PER_YEAR;

const DAILY_ORDER: usize = 4;
const WEEKLY_ORDER: usize = 3;
const YEARLY_ORDER: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct DecompositionState {
    beta: Vec<f64>,
    origin: DateTime<Utc>,
    span_hours: f64,
    changepoints: Vec<f64>,
    yearly: bool,
    residual_std: f64,
    interval_z: f64,
}

/// Trend + seasonality regression; the default trend forecaster.
#[derive(Debug, Clone)]
pub struct SeasonalDecomposition {
    config: TrendConfig,
    state: Option<DecompositionState>,
}

impl SeasonalDecomposition {
    pub fn new(config: TrendConfig) -> Self {
        Self {
            config,
            state: None,
        }
    }

    /// Design row for a point `hours` after the training origin, with the
    /// trend coordinate normalized by the training span.
    fn design_row(hours: f64, span_hours: f64, changepoints: &[f64], yearly: bool) -> Vec<f64> {
        let t_norm = hours / span_hours;
        let mut row = Vec::with_capacity(
            2 + changepoints.len() + 2 * (DAILY_ORDER + WEEKLY_ORDER + YEARLY_ORDER),
        );
        row.push(1.0);
        row.push(t_norm);
        for &c in changepoints {
            row.push((t_norm - c).max(0.0));
        }
        for k in 1..=DAILY_ORDER {
            let arg = 2.0 * PI * k as f64 * hours / HOURS_PER_DAY;
            row.push(arg.sin());
            row.push(arg.cos());
        }
        for k in 1..=WEEKLY_ORDER {
            let arg = 2.0 * PI * k as f64 * hours / HOURS_PER_WEEK;
            row.push(arg.sin());
            row.push(arg.cos());
        }
        if yearly {
            for k in 1..=YEARLY_ORDER {
                let arg = 2.0 * PI * k as f64 * hours / HOURS_PER_YEAR;
                row.push(arg.sin());
                row.push(arg.cos());
            }
        }
        row
    }

    /// Per-coefficient ridge penalties: the trend shifts at changepoints
    /// and the seasonal amplitudes are shrunk, scaled by the configured
    /// flexibility knobs.
    fn penalties(&self, n_changepoints: usize, yearly: bool) -> Vec<f64> {
        let mut lambda = vec![1e-8, 1e-8];
        lambda.extend(std::iter::repeat(1.0 / self.config.changepoint_flexibility).take(n_changepoints));
        let n_seasonal = 2 * (DAILY_ORDER + WEEKLY_ORDER + if yearly { YEARLY_ORDER } else { 0 });
        lambda.extend(std::iter::repeat(1.0 / self.config.seasonality_strength).take(n_seasonal));
        lambda
    }

    fn predict_one(state: &DecompositionState, timestamp: DateTime<Utc>) -> TrendPoint {
        let hours = (timestamp - state.origin).num_seconds() as f64 / 3600.0;
        let row = Self::design_row(hours, state.span_hours, &state.changepoints, state.yearly);
        let point: f64 = row.iter().zip(&state.beta).map(|(x, b)| x * b).sum();
        let half_width = state.interval_z * state.residual_std;
        TrendPoint {
            point,
            lower: point - half_width,
            upper: point + half_width,
            confidence: None,
        }
    }
}

impl TrendModel for SeasonalDecomposition {
    fn name(&self) -> &'static str {
        "seasonal_decomposition"
    }

    fn is_trained(&self) -> bool {
        self.state.is_some()
    }

    fn train(&mut self, series: &TimeSeries) -> Result<()> {
        // Gaps in the target are simply left out of the regression.
        let observed: Vec<(DateTime<Utc>, f64)> = series
            .timestamps()
            .iter()
            .zip(series.target())
            .filter(|(_, y)| y.is_finite())
            .map(|(&t, &y)| (t, y))
            .collect();
        if observed.is_empty() {
            return Err(ForecastError::EmptyData);
        }
        let timestamps: Vec<DateTime<Utc>> = observed.iter().map(|(t, _)| *t).collect();
        let target: Vec<f64> = observed.iter().map(|(_, y)| *y).collect();
        let origin = timestamps[0];
        let span_hours =
            ((*timestamps.last().ok_or(ForecastError::EmptyData)? - origin).num_seconds() as f64
                / 3600.0)
                .max(1.0);

        // Evenly spaced changepoints over the interior of the history.
        let n_cp = self.config.changepoints;
        let changepoints: Vec<f64> = (1..=n_cp)
            .map(|j| j as f64 / (n_cp + 1) as f64)
            .collect();
        let yearly = span_hours >= YEARLY_MIN_SPAN_HOURS;

        let design: Vec<Vec<f64>> = timestamps
            .iter()
            .map(|&t| {
                let hours = (t - origin).num_seconds() as f64 / 3600.0;
                Self::design_row(hours, span_hours, &changepoints, yearly)
            })
            .collect();
        let n_params = design[0].len();
        if target.len() < n_params {
            return Err(ForecastError::InsufficientData {
                needed: n_params,
                got: target.len(),
            });
        }

        // Normal equations with a diagonal ridge term.
        let lambda = self.penalties(changepoints.len(), yearly);
        let mut xtx = vec![vec![0.0; n_params]; n_params];
        let mut xty = vec![0.0; n_params];
        for (row, &y) in design.iter().zip(&target) {
            for i in 0..n_params {
                xty[i] += row[i] * y;
                for j in i..n_params {
                    xtx[i][j] += row[i] * row[j];
                }
            }
        }
        for i in 0..n_params {
            for j in 0..i {
                xtx[i][j] = xtx[j][i];
            }
            xtx[i][i] += lambda[i];
        }

        let beta = solve_symmetric(&mut xtx, &mut xty)?;

        let residuals: Vec<f64> = design
            .iter()
            .zip(&target)
            .map(|(row, &y)| y - row.iter().zip(&beta).map(|(x, b)| x * b).sum::<f64>())
            .collect();
        let residual_std = {
            let s = stats::std_dev(&residuals);
            if s.is_finite() {
                s
            } else {
                0.0
            }
        };

        let level = self.config.interval_level.clamp(0.5, 0.999);
        let normal = Normal::new(0.0, 1.0)
            .map_err(|e| ForecastError::ComputationError(e.to_string()))?;
        let interval_z = normal.inverse_cdf(0.5 + level / 2.0);

        log::info!(
            "{}: fit {n_params} coefficients over {:.0} hours (residual std {residual_std:.3})",
            self.name(),
            span_hours
        );

        self.state = Some(DecompositionState {
            beta,
            origin,
            span_hours,
            changepoints,
            yearly,
            residual_std,
            interval_z,
        });
        Ok(())
    }

    fn predict_future(&self, timestamps: &[DateTime<Utc>]) -> Result<Vec<TrendPoint>> {
        let state = self.state.as_ref().ok_or(ForecastError::NotTrained {
            model: "seasonal_decomposition",
        })?;
        Ok(timestamps
            .iter()
            .map(|&t| Self::predict_one(state, t))
            .collect())
    }

    fn save(&self, path: &Path) -> Result<()> {
        let state = self.state.as_ref().ok_or(ForecastError::NotTrained {
            model: "seasonal_decomposition",
        })?;
        persist::save_json(state, path)
    }

    fn load(&mut self, path: &Path) -> Result<LoadOutcome> {
        let loaded: Loaded<DecompositionState> = persist::load_json(path)?;
        let outcome = loaded.status();
        if let Loaded::Loaded(state) = loaded {
            self.state = Some(state);
        }
        Ok(outcome)
    }
}

/// Solve `A x = b` for a symmetric positive-definite `A` by Gaussian
/// elimination with partial pivoting. Consumes both arguments.
fn solve_symmetric(a: &mut [Vec<f64>], b: &mut [f64]) -> Result<Vec<f64>> {
    let n = b.len();
    for col in 0..n {
        let pivot_row = (col..n)
            .max_by(|&i, &j| {
                a[i][col]
                    .abs()
                    .partial_cmp(&a[j][col].abs())
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .unwrap_or(col);
        if a[pivot_row][col].abs() < 1e-12 {
            return Err(ForecastError::ComputationError(
                "singular design matrix in trend fit".to_string(),
            ));
        }
        a.swap(col, pivot_row);
        b.swap(col, pivot_row);

        for row in col + 1..n {
            let factor = a[row][col] / a[col][col];
            if factor == 0.0 {
                continue;
            }
            for k in col..n {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = vec![0.0; n];
    for row in (0..n).rev() {
        let mut sum = b[row];
        for col in row + 1..n {
            sum -= a[row][col] * x[col];
        }
        x[row] = sum / a[row][row];
    }
    Ok(x)
}
