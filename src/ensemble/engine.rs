//! Top-level forecasting engine.
//!
//! Owns the configured sequence and trend forecasters, runs the
//! preprocessing pipeline, and combines their outputs. A single model
//! failing at forecast time degrades the ensemble to the surviving model
//! instead of failing the call.

use crate::anomaly::{AnomalyDetector, AnomalyReport};
use crate::config::ForecastConfig;
use crate::core::{ForecastResult, TimeSeries};
use crate::ensemble::combine;
use crate::error::{ForecastError, Result};
use crate::models::sequence::build_sequence_model;
use crate::models::trend::build_trend_model;
use crate::models::{SequenceModel, TrendModel, TrendPoint};
use crate::preprocess::Preprocessor;
use crate::utils::metrics::{calculate_metrics, AccuracyMetrics};
use chrono::{DateTime, Utc};
use std::path::Path;

const SEQUENCE_ARTIFACT: &str = "sequence.json";
const TREND_ARTIFACT: &str = "trend.json";

/// Holdout evaluation summary.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationReport {
    /// Number of trailing observations held out.
    pub holdout: usize,
    /// Accuracy of the combined forecast over the holdout.
    pub metrics: AccuracyMetrics,
}

/// Forecasting engine combining a sequence and a trend model.
pub struct Engine {
    config: ForecastConfig,
    sequence: Box<dyn SequenceModel>,
    trend: Box<dyn TrendModel>,
}

impl Engine {
    /// Build an engine with the variants named in the configuration.
    pub fn new(config: ForecastConfig) -> Self {
        let sequence = build_sequence_model(config.sequence_variant, &config.sequence);
        let trend = build_trend_model(config.trend_variant, &config.trend);
        Self {
            config,
            sequence,
            trend,
        }
    }

    pub fn config(&self) -> &ForecastConfig {
        &self.config
    }

    /// Train both forecasters on the full history.
    pub fn train(&mut self, series: &TimeSeries) -> Result<()> {
        let prepared = Preprocessor::fit_transform(series, &self.config)?;
        let report = self
            .sequence
            .train(&prepared.windows, self.config.validation_split)?;
        log::info!(
            "engine: {} finished ({} epochs, early_stopped={})",
            self.sequence.name(),
            report.epochs_run,
            report.early_stopped
        );
        self.trend.train(series)?;
        Ok(())
    }

    /// Forecast `n_steps` past the end of `series`.
    ///
    /// Each model that fails is logged and dropped from the ensemble;
    /// only both failing is an error.
    pub fn forecast(&self, series: &TimeSeries, n_steps: usize) -> Result<ForecastResult> {
        if n_steps == 0 {
            return Ok(ForecastResult::default());
        }
        let step = series.infer_step()?;
        let last = series
            .last_timestamp()
            .ok_or(ForecastError::EmptyData)?;
        let timestamps: Vec<DateTime<Utc>> =
            (1..=n_steps as i32).map(|i| last + step * i).collect();

        let sequence = match self.sequence_forecast(series, n_steps) {
            Ok(values) => Some(values),
            Err(e) => {
                log::warn!(
                    "engine: {} dropped from ensemble: {e}",
                    self.sequence.name()
                );
                None
            }
        };
        let trend: Option<Vec<TrendPoint>> = match self.trend.predict_future(&timestamps) {
            Ok(points) => Some(points),
            Err(e) => {
                log::warn!("engine: {} dropped from ensemble: {e}", self.trend.name());
                None
            }
        };

        combine(
            &timestamps,
            sequence.as_deref(),
            trend.as_deref(),
            self.config.ensemble_weights,
        )
    }

    /// Roll the sequence model forward and map back to original units.
    fn sequence_forecast(&self, series: &TimeSeries, n_steps: usize) -> Result<Vec<f64>> {
        let prepared = Preprocessor::fit_transform(series, &self.config)?;
        let scaled = self
            .sequence
            .predict_sequence(&prepared.latest_window, n_steps, None)?;
        prepared.target_scaler.inverse_transform_column(0, &scaled)
    }

    /// Train on all but the trailing `holdout` observations and score the
    /// combined forecast against them.
    ///
    /// Leaves the engine trained on the truncated history; retrain on the
    /// full series before forecasting for production use.
    pub fn evaluate(&mut self, series: &TimeSeries, holdout: usize) -> Result<EvaluationReport> {
        if holdout == 0 || holdout >= series.len() {
            return Err(ForecastError::InvalidParameter(format!(
                "holdout {} must be in 1..{}",
                holdout,
                series.len()
            )));
        }
        let head = series.slice(0, series.len() - holdout)?;
        self.train(&head)?;

        let forecast = self.forecast(&head, holdout)?;
        let actual = &series.target()[series.len() - holdout..];
        let predicted = forecast.points();
        let lower: Vec<f64> = forecast.iter().map(|r| r.lower_bound).collect();
        let upper: Vec<f64> = forecast.iter().map(|r| r.upper_bound).collect();

        let metrics = calculate_metrics(actual, &predicted, Some((&lower, &upper)))?;
        log::info!(
            "engine: holdout {holdout} -> mae {:.3}, rmse {:.3}",
            metrics.mae,
            metrics.rmse
        );
        Ok(EvaluationReport { holdout, metrics })
    }

    /// Run the configured anomaly detectors over the series history.
    pub fn detect_anomalies(&self, series: &TimeSeries) -> Result<AnomalyReport> {
        AnomalyDetector::new(self.config.anomaly.clone()).analyze(series.target())
    }

    /// Persist both model artifacts under `dir`.
    pub fn save_models(&self, dir: &Path) -> Result<()> {
        self.sequence.save(&dir.join(SEQUENCE_ARTIFACT))?;
        self.trend.save(&dir.join(TREND_ARTIFACT))
    }

    /// Restore model artifacts from `dir`.
    ///
    /// Returns `Ok(true)` only when both artifacts loaded. Missing or
    /// corrupt artifacts are logged and skipped so the caller can retrain;
    /// a partial load keeps whichever model was restored.
    pub fn load_models(&mut self, dir: &Path) -> Result<bool> {
        let seq = self.sequence.load(&dir.join(SEQUENCE_ARTIFACT))?;
        if !seq.is_loaded() {
            log::warn!("engine: {} artifact not restored: {seq:?}", self.sequence.name());
        }
        let tr = self.trend.load(&dir.join(TREND_ARTIFACT))?;
        if !tr.is_loaded() {
            log::warn!("engine: {} artifact not restored: {tr:?}", self.trend.name());
        }
        Ok(seq.is_loaded() && tr.is_loaded())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SequenceVariant;
    use chrono::{Duration, TimeZone};
    use std::f64::consts::PI;

    fn fast_config() -> ForecastConfig {
        ForecastConfig {
            sequence_length: 8,
            lags: vec![1, 4],
            rolling_windows: vec![4],
            sequence_variant: SequenceVariant::FeedForward,
            sequence: crate::config::SequenceConfig {
                hidden_sizes: vec![8],
                epochs: 15,
                ..Default::default()
            },
            ..ForecastConfig::default()
        }
    }

    fn demand_series(n: usize) -> TimeSeries {
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let timestamps: Vec<DateTime<Utc>> =
            (0..n).map(|i| base + Duration::hours(i as i64)).collect();
        let values: Vec<f64> = (0..n)
            .map(|i| 120.0 + 30.0 * (i as f64 * 2.0 * PI / 24.0).sin())
            .collect();
        TimeSeries::new(timestamps, values).unwrap()
    }

    #[test]
    fn train_then_forecast_produces_a_full_horizon() {
        let series = demand_series(300);
        let mut engine = Engine::new(fast_config());
        engine.train(&series).unwrap();

        let forecast = engine.forecast(&series, 24).unwrap();
        assert_eq!(forecast.horizon(), 24);

        let last = series.last_timestamp().unwrap();
        for (i, row) in forecast.iter().enumerate() {
            assert_eq!(row.timestamp, last + Duration::hours(i as i64 + 1));
            assert!(row.predicted_value.is_finite());
            assert!(row.lower_bound <= row.predicted_value);
            assert!(row.predicted_value <= row.upper_bound);
            assert!((0.0..=100.0).contains(&row.confidence));
            assert!(row.sequence_estimate.is_some());
            assert!(row.trend_estimate.is_some());
        }
    }

    #[test]
    fn untrained_engine_cannot_forecast() {
        let series = demand_series(300);
        let engine = Engine::new(fast_config());
        assert!(matches!(
            engine.forecast(&series, 12),
            Err(ForecastError::EnsembleFailure)
        ));
    }

    #[test]
    fn zero_step_forecast_is_empty() {
        let series = demand_series(300);
        let mut engine = Engine::new(fast_config());
        engine.train(&series).unwrap();
        assert!(engine.forecast(&series, 0).unwrap().is_empty());
    }

    #[test]
    fn evaluate_scores_a_holdout() {
        let series = demand_series(320);
        let mut engine = Engine::new(fast_config());
        let report = engine.evaluate(&series, 24).unwrap();

        assert_eq!(report.holdout, 24);
        assert!(report.metrics.mae.is_finite());
        assert!(report.metrics.interval_coverage.is_some());
    }

    #[test]
    fn evaluate_rejects_degenerate_holdouts() {
        let series = demand_series(100);
        let mut engine = Engine::new(fast_config());
        assert!(engine.evaluate(&series, 0).is_err());
        assert!(engine.evaluate(&series, 100).is_err());
    }

    #[test]
    fn save_load_round_trips_the_forecast() {
        let series = demand_series(300);
        let mut engine = Engine::new(fast_config());
        engine.train(&series).unwrap();
        let before = engine.forecast(&series, 12).unwrap();

        let dir = tempfile::tempdir().unwrap();
        engine.save_models(dir.path()).unwrap();

        let mut restored = Engine::new(fast_config());
        assert!(restored.load_models(dir.path()).unwrap());
        let after = restored.forecast(&series, 12).unwrap();
        assert_eq!(after, before);
    }

    #[test]
    fn missing_artifacts_report_false_and_keep_partial_state() {
        let series = demand_series(300);
        let mut engine = Engine::new(fast_config());
        engine.train(&series).unwrap();

        let dir = tempfile::tempdir().unwrap();
        engine.save_models(dir.path()).unwrap();
        std::fs::remove_file(dir.path().join(SEQUENCE_ARTIFACT)).unwrap();

        let mut restored = Engine::new(fast_config());
        assert!(!restored.load_models(dir.path()).unwrap());

        // The trend model survived; the ensemble degrades to it.
        let forecast = restored.forecast(&series, 6).unwrap();
        assert!(forecast.rows()[0].sequence_estimate.is_none());
        assert!(forecast.rows()[0].trend_estimate.is_some());
    }

    #[test]
    fn detect_anomalies_runs_over_history() {
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let timestamps: Vec<DateTime<Utc>> =
            (0..100).map(|i| base + Duration::hours(i as i64)).collect();
        let mut values = vec![100.0; 100];
        values[50] = 1000.0;
        let series = TimeSeries::new(timestamps, values).unwrap();

        let engine = Engine::new(fast_config());
        let report = engine.detect_anomalies(&series).unwrap();
        assert!(report.total_anomalies > 0);
    }
}
