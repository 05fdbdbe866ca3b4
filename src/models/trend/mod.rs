//! Trend and seasonality forecasters.
//!
//! These work in original units directly from the time series, with no
//! feature windows; they supply the ensemble's second opinion and its
//! native uncertainty bounds.

mod decomposition;
mod pattern;

pub use decomposition::SeasonalDecomposition;
pub use pattern::PatternTable;

use crate::config::{TrendConfig, TrendVariant};
use crate::core::TimeSeries;
use crate::error::Result;
use crate::models::persist::LoadOutcome;
use chrono::{DateTime, Utc};
use std::path::Path;

/// One forecast step from a trend model, in original units.
#[derive(Debug, Clone, PartialEq)]
pub struct TrendPoint {
    pub point: f64,
    pub lower: f64,
    pub upper: f64,
    /// Model-native confidence percentage, when the variant provides one.
    pub confidence: Option<f64>,
}

/// Trend/seasonal forecaster over raw series values.
pub trait TrendModel {
    /// Short identifier used in logs and artifact names.
    fn name(&self) -> &'static str;

    /// Whether the model has been trained.
    fn is_trained(&self) -> bool;

    /// Fit the model to the full history.
    fn train(&mut self, series: &TimeSeries) -> Result<()>;

    /// Predict one [`TrendPoint`] per future timestamp.
    fn predict_future(&self, timestamps: &[DateTime<Utc>]) -> Result<Vec<TrendPoint>>;

    /// Write the trained state to a JSON artifact.
    fn save(&self, path: &Path) -> Result<()>;

    /// Replace this model's state from an artifact, if one can be read.
    fn load(&mut self, path: &Path) -> Result<LoadOutcome>;
}

/// Construct the configured trend forecaster.
pub fn build_trend_model(variant: TrendVariant, config: &TrendConfig) -> Box<dyn TrendModel> {
    match variant {
        TrendVariant::Decomposition => Box::new(SeasonalDecomposition::new(config.clone())),
        TrendVariant::PatternTable => Box::new(PatternTable::new(config.clone())),
    }
}
