//! Hour-of-day / day-of-week pattern table.
//!
//! A lightweight fallback for the decomposition model: average demand per
//! hour of day, modulated by a day-of-week factor, with a small seeded
//! jitter so repeated horizons do not produce perfectly flat lines.

use crate::config::TrendConfig;
use crate::core::TimeSeries;
use crate::error::{ForecastError, Result};
use crate::models::persist::{self, LoadOutcome, Loaded};
use crate::models::trend::{TrendModel, TrendPoint};
use crate::utils::stats;
use chrono::{DateTime, Datelike, Timelike, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use std::path::Path;

const EPS: f64 = 1e-10;
/// Interval half-width as a fraction of the historical spread.
const UNCERTAINTY_FRACTION: f64 = 0.3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct PatternState {
    hourly: Vec<f64>,
    daily: Vec<f64>,
    global_mean: f64,
    global_std: f64,
}

/// Seasonal profile lookup; the non-parametric trend forecaster.
#[derive(Debug, Clone)]
pub struct PatternTable {
    config: TrendConfig,
    state: Option<PatternState>,
}

impl PatternTable {
    pub fn new(config: TrendConfig) -> Self {
        Self {
            config,
            state: None,
        }
    }

    /// Confidence decays with horizon position and is clamped to the
    /// configured band.
    fn horizon_confidence(&self, index: usize, horizon: usize) -> f64 {
        let decay = (-(index as f64) / (horizon as f64 * 0.5)).exp();
        (self.config.confidence_base * decay)
            .clamp(self.config.confidence_floor, self.config.confidence_ceiling)
    }
}

impl TrendModel for PatternTable {
    fn name(&self) -> &'static str {
        "pattern_table"
    }

    fn is_trained(&self) -> bool {
        self.state.is_some()
    }

    fn train(&mut self, series: &TimeSeries) -> Result<()> {
        // Gaps in the target simply do not contribute to any bucket.
        let observed: Vec<(&DateTime<Utc>, f64)> = series
            .timestamps()
            .iter()
            .zip(series.target())
            .filter(|(_, v)| v.is_finite())
            .map(|(t, &v)| (t, v))
            .collect();
        if observed.is_empty() {
            return Err(ForecastError::EmptyData);
        }
        let finite: Vec<f64> = observed.iter().map(|(_, v)| *v).collect();

        let global_mean = stats::mean(&finite);
        let std = stats::std_dev(&finite);
        let global_std = if std.is_finite() { std } else { 0.0 };

        let mut hourly_sum = vec![0.0; 24];
        let mut hourly_count = vec![0usize; 24];
        let mut daily_sum = vec![0.0; 7];
        let mut daily_count = vec![0usize; 7];
        for (t, v) in observed {
            let h = t.hour() as usize;
            let d = t.weekday().num_days_from_monday() as usize;
            hourly_sum[h] += v;
            hourly_count[h] += 1;
            daily_sum[d] += v;
            daily_count[d] += 1;
        }

        // Unobserved buckets fall back to the global mean.
        let hourly: Vec<f64> = hourly_sum
            .iter()
            .zip(&hourly_count)
            .map(|(&s, &c)| if c > 0 { s / c as f64 } else { global_mean })
            .collect();
        let daily: Vec<f64> = daily_sum
            .iter()
            .zip(&daily_count)
            .map(|(&s, &c)| if c > 0 { s / c as f64 } else { global_mean })
            .collect();

        self.state = Some(PatternState {
            hourly,
            daily,
            global_mean,
            global_std,
        });
        Ok(())
    }

    fn predict_future(&self, timestamps: &[DateTime<Utc>]) -> Result<Vec<TrendPoint>> {
        let state = self.state.as_ref().ok_or(ForecastError::NotTrained {
            model: "pattern_table",
        })?;

        let jitter_std = self.config.jitter_fraction * state.global_std;
        let jitter = Normal::new(0.0, jitter_std)
            .map_err(|e| ForecastError::InvalidParameter(format!("jitter: {e}")))?;
        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let half_width = UNCERTAINTY_FRACTION * state.global_std;
        let horizon = timestamps.len().max(1);

        Ok(timestamps
            .iter()
            .enumerate()
            .map(|(i, t)| {
                let hour = t.hour() as usize;
                let dow = t.weekday().num_days_from_monday() as usize;
                let factor = if state.global_mean.abs() < EPS {
                    1.0
                } else {
                    state.daily[dow] / state.global_mean
                };
                let point = state.hourly[hour] * factor + jitter.sample(&mut rng);
                TrendPoint {
                    point,
                    lower: point - half_width,
                    upper: point + half_width,
                    confidence: Some(self.horizon_confidence(i, horizon)),
                }
            })
            .collect())
    }

    fn save(&self, path: &Path) -> Result<()> {
        let state = self.state.as_ref().ok_or(ForecastError::NotTrained {
            model: "pattern_table",
        })?;
        persist::save_json(state, path)
    }

    fn load(&mut self, path: &Path) -> Result<LoadOutcome> {
        let loaded: Loaded<PatternState> = persist::load_json(path)?;
        let outcome = loaded.status();
        if let Loaded::Loaded(state) = loaded {
            self.state = Some(state);
        }
        Ok(outcome)
    }
}
