//! Windowed sequence forecasters.
//!
//! Both variants consume the supervised windows produced by the
//! preprocessor and emit one-step-ahead predictions in scaled space.
//! Multi-step forecasts come from the shared autoregressive rollout in
//! [`SequenceModel::predict_sequence`].

mod feedforward;
mod recurrent;

pub use feedforward::WindowRegressor;
pub use recurrent::RecurrentNet;

use crate::config::{SequenceConfig, SequenceVariant};
use crate::error::{ForecastError, Result};
use crate::models::persist::LoadOutcome;
use crate::preprocess::FeatureWindow;
use std::path::Path;

/// Summary of one training run.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingReport {
    /// Epochs actually run (may be fewer than configured).
    pub epochs_run: usize,
    /// Final training loss (MSE in scaled space).
    pub train_loss: f64,
    /// Final validation loss, if a validation split was held out.
    pub val_loss: Option<f64>,
    /// Whether patience ran out before all configured epochs were used.
    pub early_stopped: bool,
}

/// One-step-ahead forecaster over fixed-length feature windows.
///
/// Object safe; the engine holds the configured variant as a boxed trait
/// object.
pub trait SequenceModel {
    /// Short identifier used in logs and artifact names.
    fn name(&self) -> &'static str;

    /// Whether the model has been trained.
    fn is_trained(&self) -> bool;

    /// `(window_length, columns_per_row)` the model was trained on.
    fn input_shape(&self) -> Option<(usize, usize)>;

    /// Train on chronological windows, holding out the most recent
    /// `validation_split` fraction for early stopping.
    fn train(&mut self, windows: &[FeatureWindow], validation_split: f64)
        -> Result<TrainingReport>;

    /// Predict the next scaled target value after `window`.
    fn predict_next(&self, window: &[Vec<f64>]) -> Result<f64>;

    /// Write the trained state to a JSON artifact.
    fn save(&self, path: &Path) -> Result<()>;

    /// Replace this model's state from an artifact, if one can be read.
    fn load(&mut self, path: &Path) -> Result<LoadOutcome>;

    /// Forecast `n_steps` ahead by feeding each prediction back into the
    /// window.
    ///
    /// `known_future` optionally supplies one scaled feature row per step
    /// (its target column is overwritten by the prediction); steps without
    /// a supplied row carry the last observed row's features forward.
    fn predict_sequence(
        &self,
        last_window: &[Vec<f64>],
        n_steps: usize,
        known_future: Option<&[Vec<f64>]>,
    ) -> Result<Vec<f64>> {
        let mut window: Vec<Vec<f64>> = last_window.to_vec();
        let template = match window.last() {
            Some(row) => row.clone(),
            None => return Err(ForecastError::EmptyData),
        };

        let mut predictions = Vec::with_capacity(n_steps);
        for step in 0..n_steps {
            let next = self.predict_next(&window)?;
            predictions.push(next);

            let mut row = match known_future.and_then(|rows| rows.get(step)) {
                Some(future_row) => {
                    if future_row.len() != template.len() {
                        return Err(ForecastError::DimensionMismatch {
                            expected: template.len(),
                            got: future_row.len(),
                        });
                    }
                    future_row.clone()
                }
                None => template.clone(),
            };
            row[0] = next;
            window.rotate_left(1);
            if let Some(last) = window.last_mut() {
                *last = row;
            }
        }
        Ok(predictions)
    }
}

/// Construct the configured sequence forecaster.
pub fn build_sequence_model(
    variant: SequenceVariant,
    config: &SequenceConfig,
) -> Box<dyn SequenceModel> {
    match variant {
        SequenceVariant::Recurrent => Box::new(RecurrentNet::new(config.clone())),
        SequenceVariant::FeedForward => Box::new(WindowRegressor::new(config.clone())),
    }
}

/// Split windows chronologically: training head, validation tail.
///
/// The tail is the most recent fraction; windows are never shuffled.
pub(crate) fn split_validation(
    windows: &[FeatureWindow],
    validation_split: f64,
) -> (&[FeatureWindow], &[FeatureWindow]) {
    let n = windows.len();
    let n_val = ((n as f64 * validation_split).round() as usize).min(n.saturating_sub(1));
    windows.split_at(n - n_val)
}

/// Early-stopping and learning-rate-plateau bookkeeping shared by both
/// trainers.
#[derive(Debug, Clone)]
pub(crate) struct PlateauSchedule {
    best: f64,
    stall: usize,
    lr_stall: usize,
}

impl PlateauSchedule {
    pub fn new() -> Self {
        Self {
            best: f64::INFINITY,
            stall: 0,
            lr_stall: 0,
        }
    }

    /// Record an epoch's monitored loss. Returns true on improvement, in
    /// which case the caller should snapshot its weights.
    pub fn observe(&mut self, loss: f64) -> bool {
        if loss < self.best {
            self.best = loss;
            self.stall = 0;
            self.lr_stall = 0;
            true
        } else {
            self.stall += 1;
            self.lr_stall += 1;
            false
        }
    }

    pub fn should_stop(&self, patience: usize) -> bool {
        self.stall >= patience
    }

    /// Whether the learning rate should be reduced this epoch; resets the
    /// reduction counter when it fires.
    pub fn should_reduce_lr(&mut self, lr_patience: usize) -> bool {
        if self.lr_stall >= lr_patience {
            self.lr_stall = 0;
            true
        } else {
            false
        }
    }
}

/// Validate a prediction window against the trained input shape.
pub(crate) fn check_window(
    window: &[Vec<f64>],
    shape: Option<(usize, usize)>,
    model: &'static str,
) -> Result<(usize, usize)> {
    let (rows, cols) = shape.ok_or(ForecastError::NotTrained { model })?;
    if window.len() != rows {
        return Err(ForecastError::DimensionMismatch {
            expected: rows,
            got: window.len(),
        });
    }
    for row in window {
        if row.len() != cols {
            return Err(ForecastError::DimensionMismatch {
                expected: cols,
                got: row.len(),
            });
        }
    }
    Ok((rows, cols))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dummy_windows(n: usize) -> Vec<FeatureWindow> {
        (0..n)
            .map(|i| FeatureWindow {
                rows: vec![vec![i as f64, 0.0]; 4],
                label: i as f64,
            })
            .collect()
    }

    #[test]
    fn validation_split_holds_out_recent_tail() {
        let windows = dummy_windows(10);
        let (train, val) = split_validation(&windows, 0.2);
        assert_eq!(train.len(), 8);
        assert_eq!(val.len(), 2);
        // The tail is the most recent data.
        assert_eq!(val[1].label, 9.0);
    }

    #[test]
    fn validation_split_never_consumes_everything() {
        let windows = dummy_windows(2);
        let (train, val) = split_validation(&windows, 1.0);
        assert_eq!(train.len(), 1);
        assert_eq!(val.len(), 1);
    }

    #[test]
    fn plateau_schedule_stops_after_patience() {
        let mut sched = PlateauSchedule::new();
        assert!(sched.observe(1.0));
        assert!(!sched.observe(1.5));
        assert!(!sched.observe(1.4));
        assert!(!sched.should_stop(3));
        assert!(!sched.observe(1.3));
        assert!(sched.should_stop(3));
    }

    #[test]
    fn plateau_schedule_requests_lr_reduction_once_per_stall() {
        let mut sched = PlateauSchedule::new();
        sched.observe(1.0);
        sched.observe(2.0);
        sched.observe(2.0);
        assert!(sched.should_reduce_lr(2));
        // Counter resets after the reduction.
        assert!(!sched.should_reduce_lr(2));
    }

    #[test]
    fn check_window_rejects_untrained_and_mismatched() {
        let window = vec![vec![0.0, 1.0]; 4];
        assert!(matches!(
            check_window(&window, None, "test"),
            Err(ForecastError::NotTrained { .. })
        ));
        assert!(matches!(
            check_window(&window, Some((5, 2)), "test"),
            Err(ForecastError::DimensionMismatch { expected: 5, got: 4 })
        ));
        assert_eq!(check_window(&window, Some((4, 2)), "test").unwrap(), (4, 2));
    }
}
