//! Weighted combination of the sequence and trend forecasts.
//!
//! Uncertainty comes from model disagreement when both contribute; a
//! single surviving model falls back to its native bounds or a fixed
//! relative band. Pure functions, no model state.

use crate::core::{ForecastResult, ForecastRow};
use crate::error::{ForecastError, Result};
use crate::models::TrendPoint;
use chrono::{DateTime, Utc};

const EPS: f64 = 1e-10;
/// Half of the absolute disagreement becomes the interval half-width.
const DISAGREEMENT_FACTOR: f64 = 0.5;
/// Relative band when only the sequence model contributed.
const SINGLE_MODEL_BAND: f64 = 0.10;

/// Confidence percentage from the interval width relative to the point.
///
/// Tight intervals score near 100, intervals wider than twice the point
/// score 0. A zero point estimate yields zero confidence rather than a
/// division blow-up.
fn confidence_from_bounds(point: f64, lower: f64, upper: f64) -> f64 {
    if point.abs() < EPS {
        return 0.0;
    }
    (100.0 * (1.0 - (upper - lower) / (2.0 * point.abs()))).clamp(0.0, 100.0)
}

/// Combine per-step estimates into the final forecast table.
///
/// Either input may be absent (a model failed upstream); both absent is
/// an [`ForecastError::EnsembleFailure`]. Present inputs must match the
/// timestamp horizon exactly.
pub fn combine(
    timestamps: &[DateTime<Utc>],
    sequence: Option<&[f64]>,
    trend: Option<&[TrendPoint]>,
    weights: (f64, f64),
) -> Result<ForecastResult> {
    if let Some(seq) = sequence {
        if seq.len() != timestamps.len() {
            return Err(ForecastError::DimensionMismatch {
                expected: timestamps.len(),
                got: seq.len(),
            });
        }
    }
    if let Some(tr) = trend {
        if tr.len() != timestamps.len() {
            return Err(ForecastError::DimensionMismatch {
                expected: timestamps.len(),
                got: tr.len(),
            });
        }
    }

    let rows = match (sequence, trend) {
        (Some(seq), Some(tr)) => {
            let total = weights.0 + weights.1;
            if total <= 0.0 {
                return Err(ForecastError::InvalidParameter(
                    "ensemble weights must sum to a positive value".to_string(),
                ));
            }
            let (w_seq, w_trend) = (weights.0 / total, weights.1 / total);

            timestamps
                .iter()
                .zip(seq.iter().zip(tr))
                .map(|(&timestamp, (&s, t))| {
                    let point = w_seq * s + w_trend * t.point;
                    let half_width = DISAGREEMENT_FACTOR * (s - t.point).abs();
                    let (lower, upper) = (point - half_width, point + half_width);
                    ForecastRow {
                        timestamp,
                        predicted_value: point,
                        lower_bound: lower,
                        upper_bound: upper,
                        confidence: confidence_from_bounds(point, lower, upper),
                        sequence_estimate: Some(s),
                        trend_estimate: Some(t.point),
                    }
                })
                .collect()
        }
        (Some(seq), None) => timestamps
            .iter()
            .zip(seq)
            .map(|(&timestamp, &s)| {
                let band = SINGLE_MODEL_BAND * s.abs();
                let (lower, upper) = (s - band, s + band);
                ForecastRow {
                    timestamp,
                    predicted_value: s,
                    lower_bound: lower,
                    upper_bound: upper,
                    confidence: confidence_from_bounds(s, lower, upper),
                    sequence_estimate: Some(s),
                    trend_estimate: None,
                }
            })
            .collect(),
        (None, Some(tr)) => timestamps
            .iter()
            .zip(tr)
            .map(|(&timestamp, t)| ForecastRow {
                timestamp,
                predicted_value: t.point,
                lower_bound: t.lower,
                upper_bound: t.upper,
                confidence: t
                    .confidence
                    .unwrap_or_else(|| confidence_from_bounds(t.point, t.lower, t.upper)),
                sequence_estimate: None,
                trend_estimate: Some(t.point),
            })
            .collect(),
        (None, None) => return Err(ForecastError::EnsembleFailure),
    };

    Ok(ForecastResult::new(rows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::{Duration, TimeZone};

    fn hours(n: usize) -> Vec<DateTime<Utc>> {
        let base = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        (0..n).map(|i| base + Duration::hours(i as i64)).collect()
    }

    fn trend_points(values: &[f64]) -> Vec<TrendPoint> {
        values
            .iter()
            .map(|&v| TrendPoint {
                point: v,
                lower: v - 5.0,
                upper: v + 5.0,
                confidence: None,
            })
            .collect()
    }

    #[test]
    fn weighted_average_and_disagreement_bounds() {
        let timestamps = hours(1);
        let result = combine(
            &timestamps,
            Some(&[110.0]),
            Some(&trend_points(&[100.0])),
            (0.6, 0.4),
        )
        .unwrap();

        let row = &result.rows()[0];
        assert_relative_eq!(row.predicted_value, 106.0, epsilon = 1e-10);
        // Half of the 10-unit disagreement on each side.
        assert_relative_eq!(row.upper_bound - row.predicted_value, 5.0, epsilon = 1e-10);
        assert_relative_eq!(row.predicted_value - row.lower_bound, 5.0, epsilon = 1e-10);
        assert_eq!(row.sequence_estimate, Some(110.0));
        assert_eq!(row.trend_estimate, Some(100.0));
    }

    #[test]
    fn weights_are_normalized() {
        let timestamps = hours(1);
        let a = combine(
            &timestamps,
            Some(&[110.0]),
            Some(&trend_points(&[100.0])),
            (0.6, 0.4),
        )
        .unwrap();
        let b = combine(
            &timestamps,
            Some(&[110.0]),
            Some(&trend_points(&[100.0])),
            (6.0, 4.0),
        )
        .unwrap();
        assert_relative_eq!(
            a.rows()[0].predicted_value,
            b.rows()[0].predicted_value,
            epsilon = 1e-10
        );
    }

    #[test]
    fn perfect_agreement_collapses_the_interval() {
        let timestamps = hours(2);
        let result = combine(
            &timestamps,
            Some(&[100.0, 120.0]),
            Some(&trend_points(&[100.0, 120.0])),
            (0.6, 0.4),
        )
        .unwrap();

        for row in result.rows() {
            assert_relative_eq!(row.lower_bound, row.predicted_value, epsilon = 1e-10);
            assert_relative_eq!(row.upper_bound, row.predicted_value, epsilon = 1e-10);
            assert_relative_eq!(row.confidence, 100.0, epsilon = 1e-10);
        }
    }

    #[test]
    fn sequence_only_uses_a_relative_band() {
        let timestamps = hours(1);
        let result = combine(&timestamps, Some(&[200.0]), None, (0.6, 0.4)).unwrap();

        let row = &result.rows()[0];
        assert_relative_eq!(row.lower_bound, 180.0, epsilon = 1e-10);
        assert_relative_eq!(row.upper_bound, 220.0, epsilon = 1e-10);
        assert!(row.trend_estimate.is_none());
        // 10% band each side -> 90% confidence.
        assert_relative_eq!(row.confidence, 90.0, epsilon = 1e-10);
    }

    #[test]
    fn trend_only_keeps_native_bounds_and_confidence() {
        let timestamps = hours(1);
        let trend = vec![TrendPoint {
            point: 100.0,
            lower: 70.0,
            upper: 130.0,
            confidence: Some(82.5),
        }];
        let result = combine(&timestamps, None, Some(&trend), (0.6, 0.4)).unwrap();

        let row = &result.rows()[0];
        assert_relative_eq!(row.lower_bound, 70.0, epsilon = 1e-10);
        assert_relative_eq!(row.upper_bound, 130.0, epsilon = 1e-10);
        assert_relative_eq!(row.confidence, 82.5, epsilon = 1e-10);
        assert!(row.sequence_estimate.is_none());
    }

    #[test]
    fn both_absent_is_an_ensemble_failure() {
        let result = combine(&hours(3), None, None, (0.6, 0.4));
        assert!(matches!(result, Err(ForecastError::EnsembleFailure)));
    }

    #[test]
    fn horizon_mismatch_is_rejected() {
        let result = combine(&hours(3), Some(&[1.0, 2.0]), None, (0.6, 0.4));
        assert!(matches!(
            result,
            Err(ForecastError::DimensionMismatch { expected: 3, got: 2 })
        ));
    }

    #[test]
    fn zero_point_estimate_yields_zero_confidence() {
        let result = combine(&hours(1), Some(&[0.0]), None, (0.6, 0.4)).unwrap();
        assert_relative_eq!(result.rows()[0].confidence, 0.0, epsilon = 1e-10);
    }

    #[test]
    fn degenerate_weights_are_rejected() {
        let result = combine(
            &hours(1),
            Some(&[1.0]),
            Some(&trend_points(&[1.0])),
            (0.0, 0.0),
        );
        assert!(matches!(result, Err(ForecastError::InvalidParameter(_))));
    }
}
