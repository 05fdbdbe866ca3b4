//! # gridcast
//!
//! Forecasting ensemble and anomaly-detection engine for periodic demand
//! signals with exogenous covariates.
//!
//! The pipeline turns a raw time-indexed series into supervised feature
//! windows, trains two independent forecasters (a windowed sequence
//! regressor and a trend/seasonality regressor), merges their outputs into
//! a single uncertainty-bounded forecast, and runs three statistical
//! outlier detectors over the same input stream.
//!
//! All operations are synchronous batch computations; each [`Engine`]
//! instance owns its own trained state, so callers keep one instance per
//! forecasting tenant.
//!
//! [`Engine`]: ensemble::Engine

pub mod anomaly;
pub mod config;
pub mod core;
pub mod ensemble;
pub mod error;
pub mod models;
pub mod preprocess;
pub mod utils;

pub use error::{ForecastError, Result};

pub mod prelude {
    pub use crate::anomaly::{AnomalyDetector, AnomalyReport};
    pub use crate::config::ForecastConfig;
    pub use crate::core::{ForecastResult, TimeSeries};
    pub use crate::ensemble::Engine;
    pub use crate::error::{ForecastError, Result};
    pub use crate::models::{SequenceModel, TrendModel};
}
