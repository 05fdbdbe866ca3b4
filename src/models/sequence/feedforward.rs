//! Feed-forward sequence regressor.
//!
//! Flattens each feature window into a single vector, standardizes it,
//! and fits a small dense ReLU network with Adam. Lighter to train than
//! the recurrent variant at the cost of ignoring step order beyond
//! position in the flattened vector.

use crate::config::SequenceConfig;
use crate::error::{ForecastError, Result};
use crate::models::nn::{relu, relu_deriv, Adam, AdamMoments, Dense, DenseGrad};
use crate::models::persist::{self, LoadOutcome, Loaded};
use crate::models::sequence::{
    check_window, split_validation, PlateauSchedule, SequenceModel, TrainingReport,
};
use crate::preprocess::{FeatureWindow, FittedStandardScaler, StandardScaler};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct RegressorState {
    layers: Vec<Dense>,
    scaler: FittedStandardScaler,
    input_rows: usize,
    input_cols: usize,
}

/// Dense network over flattened windows.
#[derive(Debug, Clone)]
pub struct WindowRegressor {
    config: SequenceConfig,
    state: Option<RegressorState>,
}

impl WindowRegressor {
    pub fn new(config: SequenceConfig) -> Self {
        Self {
            config,
            state: None,
        }
    }

    fn forward(layers: &[Dense], input: &[f64]) -> f64 {
        let mut activation = input.to_vec();
        for (i, layer) in layers.iter().enumerate() {
            let mut out = layer.forward(&activation);
            if i + 1 < layers.len() {
                out.iter_mut().for_each(|v| *v = relu(*v));
            }
            activation = out;
        }
        activation[0]
    }

    /// Forward pass keeping each layer's post-activation output for
    /// backpropagation.
    fn forward_cached(layers: &[Dense], input: &[f64]) -> (Vec<Vec<f64>>, f64) {
        let mut outputs: Vec<Vec<f64>> = Vec::with_capacity(layers.len());
        let mut activation = input.to_vec();
        for (i, layer) in layers.iter().enumerate() {
            let mut out = layer.forward(&activation);
            if i + 1 < layers.len() {
                out.iter_mut().for_each(|v| *v = relu(*v));
            }
            outputs.push(out.clone());
            activation = out;
        }
        let prediction = activation[0];
        (outputs, prediction)
    }

    fn backward(
        layers: &[Dense],
        grads: &mut [DenseGrad],
        input: &[f64],
        outputs: &[Vec<f64>],
        d_loss: f64,
    ) {
        let mut delta = vec![d_loss];
        for i in (0..layers.len()).rev() {
            let layer_input = if i == 0 { input } else { &outputs[i - 1] };
            let mut d_input = grads[i].accumulate(&layers[i], layer_input, &delta);
            if i > 0 {
                // Gate through the ReLU of the layer below.
                for (d, y) in d_input.iter_mut().zip(&outputs[i - 1]) {
                    *d *= relu_deriv(*y);
                }
            }
            delta = d_input;
        }
    }
}

impl SequenceModel for WindowRegressor {
    fn name(&self) -> &'static str {
        "window_regressor"
    }

    fn is_trained(&self) -> bool {
        self.state.is_some()
    }

    fn input_shape(&self) -> Option<(usize, usize)> {
        self.state.as_ref().map(|s| (s.input_rows, s.input_cols))
    }

    fn train(
        &mut self,
        windows: &[FeatureWindow],
        validation_split: f64,
    ) -> Result<TrainingReport> {
        if windows.len() < 2 {
            return Err(ForecastError::InsufficientData {
                needed: 2,
                got: windows.len(),
            });
        }
        let rows = windows[0].n_rows();
        let cols = windows[0].n_cols();
        if let Some(w) = windows
            .iter()
            .find(|w| w.n_rows() != rows || w.n_cols() != cols)
        {
            let (expected, got) = if w.n_cols() != cols {
                (cols, w.n_cols())
            } else {
                (rows, w.n_rows())
            };
            return Err(ForecastError::DimensionMismatch { expected, got });
        }

        let (train, val) = split_validation(windows, validation_split);

        let flatten = |w: &FeatureWindow| -> Vec<f64> {
            w.rows.iter().flatten().copied().collect()
        };
        let train_inputs: Vec<Vec<f64>> = train.iter().map(flatten).collect();
        let scaler = StandardScaler::fit(&train_inputs)?;
        let train_inputs: Vec<Vec<f64>> = train_inputs
            .iter()
            .map(|r| scaler.transform_row(r))
            .collect::<Result<_>>()?;
        let train_labels: Vec<f64> = train.iter().map(|w| w.label).collect();
        let val_inputs: Vec<Vec<f64>> = val
            .iter()
            .map(|w| scaler.transform_row(&flatten(w)))
            .collect::<Result<_>>()?;
        let val_labels: Vec<f64> = val.iter().map(|w| w.label).collect();

        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let mut layers: Vec<Dense> = Vec::new();
        let mut width = rows * cols;
        for &hidden in &self.config.hidden_sizes {
            layers.push(Dense::new(width, hidden, &mut rng));
            width = hidden;
        }
        layers.push(Dense::new(width, 1, &mut rng));

        let mut grads: Vec<DenseGrad> = layers.iter().map(DenseGrad::zeros_like).collect();
        let mut moments: Vec<(AdamMoments, AdamMoments)> = layers
            .iter()
            .map(|l| (AdamMoments::new(l.w.data.len()), AdamMoments::new(l.b.len())))
            .collect();
        let mut adam = Adam::new(self.config.learning_rate);
        let mut schedule = PlateauSchedule::new();
        let mut best_layers = layers.clone();
        let batch_size = self.config.batch_size.max(1);

        let mut order: Vec<usize> = (0..train_inputs.len()).collect();
        let mut epochs_run = 0;
        let mut early_stopped = false;
        let mut train_loss = f64::INFINITY;
        let mut val_loss = None;

        for _ in 0..self.config.epochs {
            epochs_run += 1;
            order.shuffle(&mut rng);

            let mut epoch_loss = 0.0;
            for batch in order.chunks(batch_size) {
                grads.iter_mut().for_each(DenseGrad::reset);
                let scale = 2.0 / batch.len() as f64;
                for &idx in batch {
                    let input = &train_inputs[idx];
                    let (outputs, prediction) = Self::forward_cached(&layers, input);
                    let err = prediction - train_labels[idx];
                    epoch_loss += err * err;
                    Self::backward(&layers, &mut grads, input, &outputs, scale * err);
                }
                adam.begin_step();
                for ((layer, grad), (m_w, m_b)) in
                    layers.iter_mut().zip(&grads).zip(&mut moments)
                {
                    adam.update(&mut layer.w.data, &grad.dw.data, m_w);
                    adam.update(&mut layer.b, &grad.db, m_b);
                }
            }
            train_loss = epoch_loss / train_inputs.len() as f64;

            let monitored = if val_inputs.is_empty() {
                train_loss
            } else {
                let loss = val_inputs
                    .iter()
                    .zip(&val_labels)
                    .map(|(input, &label)| {
                        let err = Self::forward(&layers, input) - label;
                        err * err
                    })
                    .sum::<f64>()
                    / val_inputs.len() as f64;
                val_loss = Some(loss);
                loss
            };

            if schedule.observe(monitored) {
                best_layers = layers.clone();
            }
            if schedule.should_stop(self.config.patience) {
                early_stopped = true;
                break;
            }
            if schedule.should_reduce_lr(self.config.lr_patience) {
                adam.lr = (adam.lr * 0.5).max(self.config.min_learning_rate);
                log::debug!("{}: learning rate reduced to {}", self.name(), adam.lr);
            }
        }

        self.state = Some(RegressorState {
            layers: best_layers,
            scaler,
            input_rows: rows,
            input_cols: cols,
        });

        log::info!(
            "{}: trained for {epochs_run} epochs (train loss {train_loss:.6})",
            self.name()
        );
        Ok(TrainingReport {
            epochs_run,
            train_loss,
            val_loss,
            early_stopped,
        })
    }

    fn predict_next(&self, window: &[Vec<f64>]) -> Result<f64> {
        check_window(window, self.input_shape(), "window_regressor")?;
        let state = self
            .state
            .as_ref()
            .ok_or(ForecastError::NotTrained {
                model: "window_regressor",
            })?;

        let flat: Vec<f64> = window.iter().flatten().copied().collect();
        let input = state.scaler.transform_row(&flat)?;
        Ok(Self::forward(&state.layers, &input))
    }

    fn save(&self, path: &Path) -> Result<()> {
        let state = self
            .state
            .as_ref()
            .ok_or(ForecastError::NotTrained {
                model: "window_regressor",
            })?;
        persist::save_json(state, path)
    }

    fn load(&mut self, path: &Path) -> Result<LoadOutcome> {
        let loaded: Loaded<RegressorState> = persist::load_json(path)?;
        let outcome = loaded.status();
        if let Loaded::Loaded(state) = loaded {
            self.state = Some(state);
        }
        Ok(outcome)
    }
}
