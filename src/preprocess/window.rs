//! Rolling window statistics.
//!
//! Trailing windows feed the rolling features; the z-score anomaly
//! detector uses centered windows.

/// Compute a rolling mean.
///
/// Trailing windows (`center = false`) produce NaN until a full window of
/// history is available; centered windows produce NaN wherever a full
/// window does not fit around the point, so both edges of the series stay
/// undefined.
pub fn rolling_mean(series: &[f64], window: usize, center: bool) -> Vec<f64> {
    if series.is_empty() || window == 0 {
        return vec![f64::NAN; series.len()];
    }

    let n = series.len();
    let mut result = vec![f64::NAN; n];

    for i in 0..n {
        let Some((start, end)) = window_bounds(i, n, window, center) else {
            continue;
        };
        let segment = &series[start..end];
        result[i] = segment.iter().sum::<f64>() / segment.len() as f64;
    }

    result
}

/// Compute a rolling standard deviation (sample, n-1 denominator).
///
/// NaN where the window holds fewer than two points.
pub fn rolling_std(series: &[f64], window: usize, center: bool) -> Vec<f64> {
    if series.is_empty() || window < 2 {
        return vec![f64::NAN; series.len()];
    }

    let n = series.len();
    let mut result = vec![f64::NAN; n];

    for i in 0..n {
        let Some((start, end)) = window_bounds(i, n, window, center) else {
            continue;
        };
        let segment = &series[start..end];
        if segment.len() >= 2 {
            let mean = segment.iter().sum::<f64>() / segment.len() as f64;
            let var = segment.iter().map(|x| (x - mean).powi(2)).sum::<f64>()
                / (segment.len() - 1) as f64;
            result[i] = var.sqrt();
        }
    }

    result
}

fn window_bounds(i: usize, n: usize, window: usize, center: bool) -> Option<(usize, usize)> {
    if center {
        let half = window / 2;
        if i < half || i + (window - half) > n {
            return None;
        }
        Some((i - half, i + window - half))
    } else {
        if i + 1 < window {
            return None;
        }
        Some((i + 1 - window, i + 1))
    }
}
