//! Forecasting models.
//!
//! Two independent families sit behind object-safe traits: windowed
//! sequence regressors ([`SequenceModel`]) and trend/seasonality
//! regressors ([`TrendModel`]). The concrete variant is chosen at
//! construction time via configuration.

mod nn;
pub mod persist;
pub mod sequence;
pub mod trend;

pub use persist::{LoadOutcome, Loaded};
pub use sequence::{SequenceModel, TrainingReport};
pub use trend::{TrendModel, TrendPoint};
