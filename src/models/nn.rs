//! Shared plumbing for the gradient-trained sequence regressors: dense
//! layers, Adam updates and dropout masks.

use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Row-major weight matrix (`rows` outputs, `cols` inputs).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct Matrix {
    pub rows: usize,
    pub cols: usize,
    pub data: Vec<f64>,
}

impl Matrix {
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![0.0; rows * cols],
        }
    }

    /// Glorot-uniform initialization.
    pub fn glorot(rows: usize, cols: usize, rng: &mut StdRng) -> Self {
        let limit = (6.0 / (rows + cols) as f64).sqrt();
        let data = (0..rows * cols)
            .map(|_| rng.gen_range(-limit..limit))
            .collect();
        Self { rows, cols, data }
    }

    /// `y = W x`.
    pub fn matvec(&self, x: &[f64]) -> Vec<f64> {
        debug_assert_eq!(x.len(), self.cols);
        (0..self.rows)
            .map(|r| {
                let row = &self.data[r * self.cols..(r + 1) * self.cols];
                row.iter().zip(x).map(|(w, v)| w * v).sum()
            })
            .collect()
    }

    /// `y = W^T x`.
    pub fn matvec_t(&self, x: &[f64]) -> Vec<f64> {
        debug_assert_eq!(x.len(), self.rows);
        let mut result = vec![0.0; self.cols];
        for r in 0..self.rows {
            let row = &self.data[r * self.cols..(r + 1) * self.cols];
            for (out, w) in result.iter_mut().zip(row) {
                *out += w * x[r];
            }
        }
        result
    }

    /// Accumulate the outer product `dy x^T` into the matrix.
    pub fn add_outer(&mut self, dy: &[f64], x: &[f64]) {
        debug_assert_eq!(dy.len(), self.rows);
        debug_assert_eq!(x.len(), self.cols);
        for (r, g) in dy.iter().enumerate() {
            let row = &mut self.data[r * self.cols..(r + 1) * self.cols];
            for (w, v) in row.iter_mut().zip(x) {
                *w += g * v;
            }
        }
    }

    pub fn fill_zero(&mut self) {
        self.data.iter_mut().for_each(|v| *v = 0.0);
    }
}

/// Fully connected layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct Dense {
    pub w: Matrix,
    pub b: Vec<f64>,
}

impl Dense {
    pub fn new(inputs: usize, outputs: usize, rng: &mut StdRng) -> Self {
        Self {
            w: Matrix::glorot(outputs, inputs, rng),
            b: vec![0.0; outputs],
        }
    }

    /// Linear forward pass (activation applied by the caller).
    pub fn forward(&self, x: &[f64]) -> Vec<f64> {
        let mut y = self.w.matvec(x);
        for (v, b) in y.iter_mut().zip(&self.b) {
            *v += b;
        }
        y
    }
}

/// Gradient accumulator matching a [`Dense`] layer.
#[derive(Debug, Clone)]
pub(crate) struct DenseGrad {
    pub dw: Matrix,
    pub db: Vec<f64>,
}

impl DenseGrad {
    pub fn zeros_like(layer: &Dense) -> Self {
        Self {
            dw: Matrix::zeros(layer.w.rows, layer.w.cols),
            db: vec![0.0; layer.b.len()],
        }
    }

    pub fn reset(&mut self) {
        self.dw.fill_zero();
        self.db.iter_mut().for_each(|v| *v = 0.0);
    }

    /// Backward pass for `y = W x + b` given upstream gradient `dy`;
    /// accumulates into this gradient and returns `dx`.
    pub fn accumulate(&mut self, layer: &Dense, x: &[f64], dy: &[f64]) -> Vec<f64> {
        self.dw.add_outer(dy, x);
        for (g, d) in self.db.iter_mut().zip(dy) {
            *g += d;
        }
        layer.w.matvec_t(dy)
    }
}

/// First and second moment buffers for one parameter tensor.
#[derive(Debug, Clone, Default)]
pub(crate) struct AdamMoments {
    m: Vec<f64>,
    v: Vec<f64>,
}

impl AdamMoments {
    pub fn new(len: usize) -> Self {
        Self {
            m: vec![0.0; len],
            v: vec![0.0; len],
        }
    }
}

/// Adam optimizer shared across a model's parameter tensors.
#[derive(Debug, Clone)]
pub(crate) struct Adam {
    pub lr: f64,
    beta1: f64,
    beta2: f64,
    eps: f64,
    t: u64,
}

impl Adam {
    pub fn new(lr: f64) -> Self {
        Self {
            lr,
            beta1: 0.9,
            beta2: 0.999,
            eps: 1e-8,
            t: 0,
        }
    }

    /// Advance the step counter; call once per optimizer step.
    pub fn begin_step(&mut self) {
        self.t += 1;
    }

    /// Apply one bias-corrected update to a parameter tensor.
    pub fn update(&self, params: &mut [f64], grads: &[f64], moments: &mut AdamMoments) {
        debug_assert_eq!(params.len(), grads.len());
        let t = self.t.max(1) as i32;
        let bias1 = 1.0 - self.beta1.powi(t);
        let bias2 = 1.0 - self.beta2.powi(t);
        for i in 0..params.len() {
            moments.m[i] = self.beta1 * moments.m[i] + (1.0 - self.beta1) * grads[i];
            moments.v[i] = self.beta2 * moments.v[i] + (1.0 - self.beta2) * grads[i] * grads[i];
            let m_hat = moments.m[i] / bias1;
            let v_hat = moments.v[i] / bias2;
            params[i] -= self.lr * m_hat / (v_hat.sqrt() + self.eps);
        }
    }
}

#[inline]
pub(crate) fn relu(x: f64) -> f64 {
    x.max(0.0)
}

#[inline]
pub(crate) fn relu_deriv(y: f64) -> f64 {
    if y > 0.0 {
        1.0
    } else {
        0.0
    }
}

/// Inverted dropout mask: entries are 0 with probability `p`, otherwise
/// `1/(1-p)` so that expected activations are unchanged.
pub(crate) fn dropout_mask(len: usize, p: f64, rng: &mut StdRng) -> Vec<f64> {
    if p <= 0.0 {
        return vec![1.0; len];
    }
    let keep = 1.0 - p;
    (0..len)
        .map(|_| {
            if rng.gen::<f64>() < keep {
                1.0 / keep
            } else {
                0.0
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::SeedableRng;

    #[test]
    fn matvec_and_transpose_agree() {
        let m = Matrix {
            rows: 2,
            cols: 3,
            data: vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0],
        };
        let y = m.matvec(&[1.0, 0.0, -1.0]);
        assert_relative_eq!(y[0], -2.0, epsilon = 1e-12);
        assert_relative_eq!(y[1], -2.0, epsilon = 1e-12);

        let x = m.matvec_t(&[1.0, 1.0]);
        assert_relative_eq!(x[0], 5.0, epsilon = 1e-12);
        assert_relative_eq!(x[1], 7.0, epsilon = 1e-12);
        assert_relative_eq!(x[2], 9.0, epsilon = 1e-12);
    }

    #[test]
    fn dense_gradient_matches_finite_difference() {
        let mut rng = StdRng::seed_from_u64(7);
        let layer = Dense::new(3, 2, &mut rng);
        let x = vec![0.5, -1.0, 2.0];

        // Loss = sum(y); dL/dy = 1.
        let mut grad = DenseGrad::zeros_like(&layer);
        let dx = grad.accumulate(&layer, &x, &[1.0, 1.0]);

        let eps = 1e-6;
        for i in 0..x.len() {
            let mut xp = x.clone();
            xp[i] += eps;
            let fp: f64 = layer.forward(&xp).iter().sum();
            let f0: f64 = layer.forward(&x).iter().sum();
            assert_relative_eq!(dx[i], (fp - f0) / eps, epsilon = 1e-4);
        }
        // db accumulates dy directly.
        assert_relative_eq!(grad.db[0], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn adam_reduces_quadratic_loss() {
        // Minimize (w - 3)^2.
        let mut params = vec![0.0];
        let mut moments = AdamMoments::new(1);
        let mut adam = Adam::new(0.1);

        for _ in 0..500 {
            adam.begin_step();
            let grad = 2.0 * (params[0] - 3.0);
            adam.update(&mut params, &[grad], &mut moments);
        }
        assert_relative_eq!(params[0], 3.0, epsilon = 1e-2);
    }

    #[test]
    fn dropout_mask_preserves_expectation() {
        let mut rng = StdRng::seed_from_u64(1);
        let mask = dropout_mask(10_000, 0.2, &mut rng);
        let mean: f64 = mask.iter().sum::<f64>() / mask.len() as f64;
        assert!((mean - 1.0).abs() < 0.05);

        let no_drop = dropout_mask(4, 0.0, &mut rng);
        assert_eq!(no_drop, vec![1.0; 4]);
    }
}
