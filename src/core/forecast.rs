//! Forecast result table produced by the ensemble combiner.

use chrono::{DateTime, Utc};

/// One future step of the combined forecast.
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastRow {
    /// Timestamp of the forecast step.
    pub timestamp: DateTime<Utc>,
    /// Combined point estimate.
    pub predicted_value: f64,
    /// Lower uncertainty bound.
    pub lower_bound: f64,
    /// Upper uncertainty bound.
    pub upper_bound: f64,
    /// Confidence score in [0, 100] derived from the bound width.
    pub confidence: f64,
    /// Raw sequence-model estimate, when that model contributed.
    pub sequence_estimate: Option<f64>,
    /// Raw trend-model estimate, when that model contributed.
    pub trend_estimate: Option<f64>,
}

/// Ordered forecast table, one row per future step.
///
/// Produced fresh per call and never mutated in place.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ForecastResult {
    rows: Vec<ForecastRow>,
}

impl ForecastResult {
    /// Create a result from rows.
    pub fn new(rows: Vec<ForecastRow>) -> Self {
        Self { rows }
    }

    /// Forecast horizon (number of steps).
    pub fn horizon(&self) -> usize {
        self.rows.len()
    }

    /// Check if the forecast is empty.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// All rows in chronological order.
    pub fn rows(&self) -> &[ForecastRow] {
        &self.rows
    }

    /// Iterate over rows.
    pub fn iter(&self) -> impl Iterator<Item = &ForecastRow> {
        self.rows.iter()
    }

    /// Point estimates in chronological order.
    pub fn points(&self) -> Vec<f64> {
        self.rows.iter().map(|r| r.predicted_value).collect()
    }
}

impl IntoIterator for ForecastResult {
    type Item = ForecastRow;
    type IntoIter = std::vec::IntoIter<ForecastRow>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn make_row(hour: u32, value: f64) -> ForecastRow {
        ForecastRow {
            timestamp: Utc.with_ymd_and_hms(2024, 1, 1, hour, 0, 0).unwrap(),
            predicted_value: value,
            lower_bound: value - 1.0,
            upper_bound: value + 1.0,
            confidence: 90.0,
            sequence_estimate: Some(value + 0.1),
            trend_estimate: Some(value - 0.1),
        }
    }

    #[test]
    fn exposes_rows_and_points() {
        let result = ForecastResult::new(vec![make_row(0, 100.0), make_row(1, 110.0)]);

        assert_eq!(result.horizon(), 2);
        assert!(!result.is_empty());
        assert_eq!(result.points(), vec![100.0, 110.0]);
        assert_eq!(result.rows()[1].predicted_value, 110.0);
    }

    #[test]
    fn empty_result() {
        let result = ForecastResult::default();
        assert!(result.is_empty());
        assert_eq!(result.horizon(), 0);
    }
}
