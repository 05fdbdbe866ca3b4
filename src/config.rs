//! Configuration for the forecasting pipeline and anomaly detection.
//!
//! Every knob has a default; `ForecastConfig::default()` reproduces the
//! stock pipeline (24-hour windows, hourly/daily/weekly lags, 0.6/0.4
//! ensemble weights).

use serde::{Deserialize, Serialize};

/// Which sequence forecaster realization to construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SequenceVariant {
    /// Multi-layer recurrent network with dropout.
    #[default]
    Recurrent,
    /// Shallow feed-forward regressor over the flattened window.
    FeedForward,
}

/// Which trend/seasonal forecaster realization to construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TrendVariant {
    /// Trend + Fourier seasonality decomposition with native intervals.
    #[default]
    Decomposition,
    /// Hour-of-day / day-of-week pattern table.
    PatternTable,
}

/// Training hyperparameters for the sequence forecasters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceConfig {
    /// Hidden layer sizes. Recurrent layers for the recurrent variant,
    /// dense layers for the feed-forward variant.
    pub hidden_sizes: Vec<usize>,
    /// Dropout probability applied between layers during training.
    pub dropout: f64,
    /// Maximum number of training epochs.
    pub epochs: usize,
    /// Mini-batch size.
    pub batch_size: usize,
    /// Initial learning rate for Adam.
    pub learning_rate: f64,
    /// Epochs without validation improvement before stopping early.
    pub patience: usize,
    /// Epochs without improvement before halving the learning rate.
    pub lr_patience: usize,
    /// Lower bound for the learning rate after reductions.
    pub min_learning_rate: f64,
    /// Seed for weight initialization and dropout masks.
    pub seed: u64,
}

impl Default for SequenceConfig {
    fn default() -> Self {
        Self {
            hidden_sizes: vec![64, 32],
            dropout: 0.2,
            epochs: 50,
            batch_size: 32,
            learning_rate: 1e-3,
            patience: 10,
            lr_patience: 5,
            min_learning_rate: 1e-5,
            seed: 42,
        }
    }
}

/// Parameters for the trend/seasonal forecasters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendConfig {
    /// Number of evenly spaced trend changepoints (decomposition variant).
    pub changepoints: usize,
    /// Flexibility of the trend at changepoints. Larger values allow the
    /// slope to shift more freely; acts as an inverse ridge penalty.
    pub changepoint_flexibility: f64,
    /// Ridge strength applied to seasonal coefficients; smaller values let
    /// seasonality fit the data more closely.
    pub seasonality_strength: f64,
    /// Interval level for native prediction bounds (decomposition variant).
    pub interval_level: f64,
    /// Jitter magnitude for the pattern-table variant, as a fraction of the
    /// historical standard deviation. Heuristic constant preserved from the
    /// source system.
    pub jitter_fraction: f64,
    /// Base confidence percentage at horizon zero (pattern-table variant).
    pub confidence_base: f64,
    /// Confidence floor percentage.
    pub confidence_floor: f64,
    /// Confidence ceiling percentage.
    pub confidence_ceiling: f64,
    /// Seed for the pattern-table jitter.
    pub seed: u64,
}

impl Default for TrendConfig {
    fn default() -> Self {
        Self {
            changepoints: 10,
            changepoint_flexibility: 0.05,
            seasonality_strength: 10.0,
            interval_level: 0.95,
            jitter_fraction: 0.05,
            confidence_base: 85.0,
            confidence_floor: 60.0,
            confidence_ceiling: 95.0,
            seed: 42,
        }
    }
}

/// Thresholds for the statistical anomaly detectors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyConfig {
    /// Z-score threshold above which a point is flagged.
    pub threshold: f64,
    /// Rolling window length (samples) for the z-score detector.
    pub window: usize,
    /// Absolute percent change (as a fraction) that counts as sudden.
    pub sudden_change_threshold: f64,
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            threshold: 3.0,
            window: 24,
            sudden_change_threshold: 0.3,
        }
    }
}

/// Top-level configuration for the forecasting engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastConfig {
    /// Name of the target column in the input series.
    pub target_column: String,
    /// Length of the supervised feature windows.
    pub sequence_length: usize,
    /// Lags (in steps) used as autoregressive features.
    pub lags: Vec<usize>,
    /// Trailing windows for rolling mean/std features.
    pub rolling_windows: Vec<usize>,
    /// Ensemble weights as (sequence, trend). Normalized before use.
    pub ensemble_weights: (f64, f64),
    /// Fraction of the most recent windows held out for validation.
    pub validation_split: f64,
    /// Which sequence forecaster to build.
    pub sequence_variant: SequenceVariant,
    /// Sequence training hyperparameters.
    pub sequence: SequenceConfig,
    /// Which trend forecaster to build.
    pub trend_variant: TrendVariant,
    /// Trend model parameters.
    pub trend: TrendConfig,
    /// Anomaly detector thresholds.
    pub anomaly: AnomalyConfig,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            target_column: "demand".to_string(),
            sequence_length: 24,
            lags: vec![1, 24, 168],
            rolling_windows: vec![24, 168],
            ensemble_weights: (0.6, 0.4),
            validation_split: 0.2,
            sequence_variant: SequenceVariant::default(),
            sequence: SequenceConfig::default(),
            trend_variant: TrendVariant::default(),
            trend: TrendConfig::default(),
            anomaly: AnomalyConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_documented_values() {
        let config = ForecastConfig::default();
        assert_eq!(config.target_column, "demand");
        assert_eq!(config.sequence_length, 24);
        assert_eq!(config.lags, vec![1, 24, 168]);
        assert_eq!(config.rolling_windows, vec![24, 168]);
        assert_eq!(config.ensemble_weights, (0.6, 0.4));
        assert_eq!(config.anomaly.threshold, 3.0);
        assert_eq!(config.anomaly.window, 24);
        assert_eq!(config.anomaly.sudden_change_threshold, 0.3);
    }

    #[test]
    fn config_round_trips_through_json() {
        let config = ForecastConfig {
            sequence_variant: SequenceVariant::FeedForward,
            trend_variant: TrendVariant::PatternTable,
            ..ForecastConfig::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        let back: ForecastConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
