//! Recurrent sequence forecaster.
//!
//! Stacked simple recurrent layers (tanh) with inverted dropout between
//! them and a linear head on the final hidden state. Trained with full
//! backpropagation through time, Adam, early stopping and plateau-based
//! learning-rate reduction.

use crate::config::SequenceConfig;
use crate::error::{ForecastError, Result};
use crate::models::nn::{dropout_mask, Adam, AdamMoments, Dense, DenseGrad, Matrix};
use crate::models::persist::{self, LoadOutcome, Loaded};
use crate::models::sequence::{
    check_window, split_validation, PlateauSchedule, SequenceModel, TrainingReport,
};
use crate::preprocess::FeatureWindow;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// `h_t = tanh(Wx x_t + Wh h_{t-1} + b)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct RecurrentLayer {
    wx: Matrix,
    wh: Matrix,
    b: Vec<f64>,
}

impl RecurrentLayer {
    fn new(inputs: usize, size: usize, rng: &mut StdRng) -> Self {
        Self {
            wx: Matrix::glorot(size, inputs, rng),
            wh: Matrix::glorot(size, size, rng),
            b: vec![0.0; size],
        }
    }

    fn size(&self) -> usize {
        self.b.len()
    }

    fn step(&self, x: &[f64], h_prev: &[f64]) -> Vec<f64> {
        let mut z = self.wx.matvec(x);
        let rec = self.wh.matvec(h_prev);
        for ((z, r), b) in z.iter_mut().zip(&rec).zip(&self.b) {
            *z = (*z + r + b).tanh();
        }
        z
    }
}

#[derive(Debug, Clone)]
struct RecurrentGrad {
    dwx: Matrix,
    dwh: Matrix,
    db: Vec<f64>,
}

impl RecurrentGrad {
    fn zeros_like(layer: &RecurrentLayer) -> Self {
        Self {
            dwx: Matrix::zeros(layer.wx.rows, layer.wx.cols),
            dwh: Matrix::zeros(layer.wh.rows, layer.wh.cols),
            db: vec![0.0; layer.b.len()],
        }
    }

    fn reset(&mut self) {
        self.dwx.fill_zero();
        self.dwh.fill_zero();
        self.db.iter_mut().for_each(|v| *v = 0.0);
    }
}

/// Per-layer activations kept for backpropagation through time.
struct LayerCache {
    /// Inputs at each timestep (post-dropout outputs of the layer below).
    xs: Vec<Vec<f64>>,
    /// Hidden states at each timestep (pre-dropout).
    hs: Vec<Vec<f64>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct RecurrentState {
    layers: Vec<RecurrentLayer>,
    head: Dense,
    input_rows: usize,
    input_cols: usize,
}

/// Stacked recurrent network; the default sequence forecaster.
#[derive(Debug, Clone)]
pub struct RecurrentNet {
    config: SequenceConfig,
    state: Option<RecurrentState>,
}

impl RecurrentNet {
    pub fn new(config: SequenceConfig) -> Self {
        Self {
            config,
            state: None,
        }
    }

    /// Run the stack over a window. Returns per-layer caches and the top
    /// layer's (post-dropout) output sequence.
    fn run_stack(
        layers: &[RecurrentLayer],
        window: &[Vec<f64>],
        masks: Option<&[Vec<f64>]>,
    ) -> (Vec<LayerCache>, Vec<Vec<f64>>) {
        let mut inputs: Vec<Vec<f64>> = window.to_vec();
        let mut caches = Vec::with_capacity(layers.len());

        for (l, layer) in layers.iter().enumerate() {
            let mut h = vec![0.0; layer.size()];
            let mut hs = Vec::with_capacity(inputs.len());
            let mut outs = Vec::with_capacity(inputs.len());
            for x in &inputs {
                h = layer.step(x, &h);
                hs.push(h.clone());
                let out = match masks {
                    Some(masks) => h.iter().zip(&masks[l]).map(|(v, m)| v * m).collect(),
                    None => h.clone(),
                };
                outs.push(out);
            }
            caches.push(LayerCache { xs: inputs, hs });
            inputs = outs;
        }

        (caches, inputs)
    }

    fn predict_raw(state: &RecurrentState, window: &[Vec<f64>]) -> f64 {
        let (_, top) = Self::run_stack(&state.layers, window, None);
        match top.last() {
            Some(last) => state.head.forward(last)[0],
            None => 0.0,
        }
    }

    /// Backpropagation through time for one sample; gradients accumulate.
    #[allow(clippy::too_many_arguments)]
    fn backward(
        layers: &[RecurrentLayer],
        head: &Dense,
        grads: &mut [RecurrentGrad],
        head_grad: &mut DenseGrad,
        caches: &[LayerCache],
        top: &[Vec<f64>],
        masks: &[Vec<f64>],
        d_loss: f64,
    ) {
        let steps = top.len();
        let top_layer = layers.len() - 1;

        // Head sees the last post-dropout output of the top layer.
        let d_top_last = head_grad.accumulate(head, &top[steps - 1], &[d_loss]);

        // Gradients w.r.t. each layer's post-dropout output sequence.
        let mut d_out: Vec<Vec<f64>> = vec![vec![0.0; layers[top_layer].size()]; steps];
        d_out[steps - 1] = d_top_last;

        for l in (0..layers.len()).rev() {
            let layer = &layers[l];
            let cache = &caches[l];
            let mask = &masks[l];

            let mut d_below: Vec<Vec<f64>> = cache
                .xs
                .iter()
                .map(|x| vec![0.0; x.len()])
                .collect();
            let mut dh_next = vec![0.0; layer.size()];

            for t in (0..steps).rev() {
                // Through the dropout mask, plus the recurrent carry.
                let mut dh: Vec<f64> = d_out[t]
                    .iter()
                    .zip(mask)
                    .map(|(d, m)| d * m)
                    .collect();
                for (dh, carry) in dh.iter_mut().zip(&dh_next) {
                    *dh += carry;
                }

                // tanh' = 1 - h^2.
                let dz: Vec<f64> = dh
                    .iter()
                    .zip(&cache.hs[t])
                    .map(|(d, h)| d * (1.0 - h * h))
                    .collect();

                let h_prev = if t == 0 {
                    vec![0.0; layer.size()]
                } else {
                    cache.hs[t - 1].clone()
                };
                grads[l].dwx.add_outer(&dz, &cache.xs[t]);
                grads[l].dwh.add_outer(&dz, &h_prev);
                for (g, d) in grads[l].db.iter_mut().zip(&dz) {
                    *g += d;
                }

                d_below[t] = layer.wx.matvec_t(&dz);
                dh_next = layer.wh.matvec_t(&dz);
            }

            d_out = d_below;
        }
    }
}

impl SequenceModel for RecurrentNet {
    fn name(&self) -> &'static str {
        "recurrent_net"
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
        if rows == 0 || cols == 0 {
            return Err(ForecastError::EmptyData);
        }
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

        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let mut layers: Vec<RecurrentLayer> = Vec::new();
        let mut width = cols;
        for &hidden in &self.config.hidden_sizes {
            layers.push(RecurrentLayer::new(width, hidden, &mut rng));
            width = hidden;
        }
        if layers.is_empty() {
            return Err(ForecastError::InvalidParameter(
                "hidden_sizes must not be empty".to_string(),
            ));
        }
        let mut head = Dense::new(width, 1, &mut rng);

        let mut grads: Vec<RecurrentGrad> =
            layers.iter().map(RecurrentGrad::zeros_like).collect();
        let mut head_grad = DenseGrad::zeros_like(&head);
        let mut moments: Vec<(AdamMoments, AdamMoments, AdamMoments)> = layers
            .iter()
            .map(|l| {
                (
                    AdamMoments::new(l.wx.data.len()),
                    AdamMoments::new(l.wh.data.len()),
                    AdamMoments::new(l.b.len()),
                )
            })
            .collect();
        let mut head_moments = (
            AdamMoments::new(head.w.data.len()),
            AdamMoments::new(head.b.len()),
        );

        let mut adam = Adam::new(self.config.learning_rate);
        let mut schedule = PlateauSchedule::new();
        let mut best = (layers.clone(), head.clone());
        let batch_size = self.config.batch_size.max(1);

        let mut order: Vec<usize> = (0..train.len()).collect();
        let mut epochs_run = 0;
        let mut early_stopped = false;
        let mut train_loss = f64::INFINITY;
        let mut val_loss = None;

        for _ in 0..self.config.epochs {
            epochs_run += 1;
            order.shuffle(&mut rng);

            let mut epoch_loss = 0.0;
            for batch in order.chunks(batch_size) {
                grads.iter_mut().for_each(RecurrentGrad::reset);
                head_grad.reset();
                let scale = 2.0 / batch.len() as f64;

                for &idx in batch {
                    let window = &train[idx].rows;
                    let masks: Vec<Vec<f64>> = layers
                        .iter()
                        .map(|l| dropout_mask(l.size(), self.config.dropout, &mut rng))
                        .collect();
                    let (caches, top) = Self::run_stack(&layers, window, Some(&masks));
                    let prediction = head.forward(&top[top.len() - 1])[0];
                    let err = prediction - train[idx].label;
                    epoch_loss += err * err;
                    Self::backward(
                        &layers,
                        &head,
                        &mut grads,
                        &mut head_grad,
                        &caches,
                        &top,
                        &masks,
                        scale * err,
                    );
                }

                adam.begin_step();
                for ((layer, grad), (m_wx, m_wh, m_b)) in
                    layers.iter_mut().zip(&grads).zip(&mut moments)
                {
                    adam.update(&mut layer.wx.data, &grad.dwx.data, m_wx);
                    adam.update(&mut layer.wh.data, &grad.dwh.data, m_wh);
                    adam.update(&mut layer.b, &grad.db, m_b);
                }
                adam.update(&mut head.w.data, &head_grad.dw.data, &mut head_moments.0);
                adam.update(&mut head.b, &head_grad.db, &mut head_moments.1);
            }
            train_loss = epoch_loss / train.len() as f64;

            let monitored = if val.is_empty() {
                train_loss
            } else {
                let loss = val
                    .iter()
                    .map(|w| {
                        let (_, top) = Self::run_stack(&layers, &w.rows, None);
                        let err = head.forward(&top[top.len() - 1])[0] - w.label;
                        err * err
                    })
                    .sum::<f64>()
                    / val.len() as f64;
                val_loss = Some(loss);
                loss
            };

            if schedule.observe(monitored) {
                best = (layers.clone(), head.clone());
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

        let (layers, head) = best;
        self.state = Some(RecurrentState {
            layers,
            head,
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
        check_window(window, self.input_shape(), "recurrent_net")?;
        let state = self.state.as_ref().ok_or(ForecastError::NotTrained {
            model: "recurrent_net",
        })?;
        Ok(Self::predict_raw(state, window))
    }

    fn save(&self, path: &Path) -> Result<()> {
        let state = self.state.as_ref().ok_or(ForecastError::NotTrained {
            model: "recurrent_net",
        })?;
        persist::save_json(state, path)
    }

    fn load(&mut self, path: &Path) -> Result<LoadOutcome> {
        let loaded: Loaded<RecurrentState> = persist::load_json(path)?;
        let outcome = loaded.status();
        if let Loaded::Loaded(state) = loaded {
            self.state = Some(state);
        }
        Ok(outcome)
    }
}
