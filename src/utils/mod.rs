//! Statistical helpers and forecast accuracy metrics.

pub mod metrics;
pub mod stats;

pub use metrics::{calculate_metrics, AccuracyMetrics};
pub use stats::{mean, median, quantile, std_dev, variance};
