//! Accuracy metrics for forecast evaluation.

use crate::error::{ForecastError, Result};

/// Accuracy metrics for a forecast against observed values.
#[derive(Debug, Clone, PartialEq)]
pub struct AccuracyMetrics {
    /// Mean Absolute Error
    pub mae: f64,
    /// Mean Squared Error
    pub mse: f64,
    /// Root Mean Squared Error
    pub rmse: f64,
    /// Mean Absolute Percentage Error (None if zeros in actual)
    pub mape: Option<f64>,
    /// Fraction of actual values inside the forecast interval, as a
    /// percentage (None when no bounds were supplied).
    pub interval_coverage: Option<f64>,
}

/// Calculate accuracy metrics between actual and predicted values.
///
/// `bounds` optionally supplies `(lower, upper)` interval slices to compute
/// interval coverage.
pub fn calculate_metrics(
    actual: &[f64],
    predicted: &[f64],
    bounds: Option<(&[f64], &[f64])>,
) -> Result<AccuracyMetrics> {
    if actual.is_empty() || predicted.is_empty() {
        return Err(ForecastError::EmptyData);
    }
    if actual.len() != predicted.len() {
        return Err(ForecastError::DimensionMismatch {
            expected: actual.len(),
            got: predicted.len(),
        });
    }

    let n = actual.len() as f64;
    let mae = actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| (a - p).abs())
        .sum::<f64>()
        / n;
    let mse = actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| (a - p).powi(2))
        .sum::<f64>()
        / n;
    let rmse = mse.sqrt();

    let mape = if actual.iter().any(|a| *a == 0.0) {
        None
    } else {
        Some(
            actual
                .iter()
                .zip(predicted)
                .map(|(a, p)| ((a - p) / a).abs())
                .sum::<f64>()
                / n
                * 100.0,
        )
    };

    let interval_coverage = match bounds {
        Some((lower, upper)) => {
            if lower.len() != actual.len() || upper.len() != actual.len() {
                return Err(ForecastError::DimensionMismatch {
                    expected: actual.len(),
                    got: lower.len().min(upper.len()),
                });
            }
            let inside = actual
                .iter()
                .enumerate()
                .filter(|(i, a)| **a >= lower[*i] && **a <= upper[*i])
                .count();
            Some(inside as f64 / n * 100.0)
        }
        None => None,
    };

    Ok(AccuracyMetrics {
        mae,
        mse,
        rmse,
        mape,
        interval_coverage,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn perfect_forecast_has_zero_error() {
        let actual = vec![100.0, 110.0, 120.0];
        let metrics = calculate_metrics(&actual, &actual, None).unwrap();

        assert_relative_eq!(metrics.mae, 0.0, epsilon = 1e-10);
        assert_relative_eq!(metrics.rmse, 0.0, epsilon = 1e-10);
        assert_relative_eq!(metrics.mape.unwrap(), 0.0, epsilon = 1e-10);
        assert!(metrics.interval_coverage.is_none());
    }

    #[test]
    fn computes_expected_errors() {
        let actual = vec![100.0, 100.0];
        let predicted = vec![90.0, 110.0];
        let metrics = calculate_metrics(&actual, &predicted, None).unwrap();

        assert_relative_eq!(metrics.mae, 10.0, epsilon = 1e-10);
        assert_relative_eq!(metrics.mse, 100.0, epsilon = 1e-10);
        assert_relative_eq!(metrics.rmse, 10.0, epsilon = 1e-10);
        assert_relative_eq!(metrics.mape.unwrap(), 10.0, epsilon = 1e-10);
    }

    #[test]
    fn mape_undefined_with_zero_actuals() {
        let metrics = calculate_metrics(&[0.0, 100.0], &[1.0, 99.0], None).unwrap();
        assert!(metrics.mape.is_none());
    }

    #[test]
    fn interval_coverage_counts_contained_points() {
        let actual = vec![100.0, 100.0, 100.0, 100.0];
        let predicted = vec![100.0; 4];
        let lower = vec![95.0, 95.0, 101.0, 95.0];
        let upper = vec![105.0, 105.0, 110.0, 99.0];

        let metrics =
            calculate_metrics(&actual, &predicted, Some((&lower, &upper))).unwrap();
        assert_relative_eq!(metrics.interval_coverage.unwrap(), 50.0, epsilon = 1e-10);
    }

    #[test]
    fn rejects_mismatched_lengths() {
        let result = calculate_metrics(&[1.0, 2.0], &[1.0], None);
        assert!(matches!(
            result,
            Err(ForecastError::DimensionMismatch { expected: 2, got: 1 })
        ));
    }
}
