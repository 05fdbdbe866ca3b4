//! Error types for the gridcast library.

use thiserror::Error;

/// Result type alias for forecasting operations.
pub type Result<T> = std::result::Result<T, ForecastError>;

/// Errors that can occur during preprocessing, forecasting and detection.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ForecastError {
    /// Input data is empty.
    #[error("empty input data")]
    EmptyData,

    /// Fewer usable rows than the operation needs.
    #[error("insufficient data: need at least {needed}, got {got}")]
    InsufficientData { needed: usize, got: usize },

    /// Predict called on a model that has not been trained.
    #[error("{model} must be trained before prediction")]
    NotTrained { model: &'static str },

    /// Transform or inverse-transform called without fitted statistics.
    #[error("scaler must be fitted before transform")]
    ScalerNotFitted,

    /// Shape of a window or matrix does not match what was fit.
    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    /// Timestamp-related error.
    #[error("timestamp error: {0}")]
    TimestampError(String),

    /// Invalid parameter value.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// Both forecasters failed; no forecast can be produced.
    #[error("ensemble failure: no model produced a forecast")]
    EnsembleFailure,

    /// Model artifact could not be written or read.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// Numerical or internal computation error.
    #[error("computation error: {0}")]
    ComputationError(String),
}
