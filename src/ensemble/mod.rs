//! Ensemble combination and the top-level forecasting engine.

mod combiner;
mod engine;

pub use combiner::combine;
pub use engine::{Engine, EvaluationReport};
