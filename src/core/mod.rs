//! Core data structures: time series input and forecast output.

mod forecast;
mod time_series;

pub use forecast::{ForecastResult, ForecastRow};
pub use time_series::TimeSeries;
