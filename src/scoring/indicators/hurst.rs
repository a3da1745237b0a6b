// =============================================================================
// Hurst exponent — rescaled-range (R/S) analysis over log-returns
// =============================================================================
//
// H < 0.5  => mean-reverting series
// H = 0.5  => random walk
// H > 0.5  => trending / persistent series
//
// Unlike a fixed-window R/S split, this estimator regresses log(R/S) against
// log(lag) across a ladder of lags (2..20). At each lag the return series is
// cut into non-overlapping chunks of that length; for each chunk we compute
// the range of the mean-centered cumulative sum divided by the chunk's
// standard deviation, and average R/S across chunks. The Hurst exponent is
// the slope of a simple linear fit of log(mean R/S) on log(lag).
// =============================================================================

const MIN_LAG: usize = 2;
const MAX_LAG: usize = 20;

/// Estimate the Hurst exponent of a price series via R/S analysis of its
/// log-returns.
///
/// Returns `None` when there isn't enough data to cover the full lag ladder
/// (requires at least `2 * MAX_LAG + 1` prices) or when the regression is
/// degenerate (e.g. constant returns).
pub fn hurst_exponent(prices: &[f64]) -> Option<f64> {
    if prices.len() < 2 * MAX_LAG + 1 {
        return None;
    }
    if prices.iter().any(|p| *p <= 0.0 || !p.is_finite()) {
        return None;
    }

    let log_returns: Vec<f64> = prices
        .windows(2)
        .map(|w| (w[1] / w[0]).ln())
        .collect();

    let mut log_lags = Vec::with_capacity(MAX_LAG - MIN_LAG + 1);
    let mut log_rs = Vec::with_capacity(MAX_LAG - MIN_LAG + 1);

    for lag in MIN_LAG..=MAX_LAG {
        if let Some(rs) = mean_rescaled_range(&log_returns, lag) {
            if rs > 0.0 && rs.is_finite() {
                log_lags.push((lag as f64).ln());
                log_rs.push(rs.ln());
            }
        }
    }

    if log_lags.len() < 4 {
        return None;
    }

    let slope = ols_slope(&log_lags, &log_rs)?;
    if slope.is_finite() {
        Some(slope)
    } else {
        None
    }
}

/// Average rescaled range R/S across all non-overlapping chunks of `lag`
/// consecutive returns.
fn mean_rescaled_range(returns: &[f64], lag: usize) -> Option<f64> {
    let chunk_count = returns.len() / lag;
    if chunk_count == 0 {
        return None;
    }

    let mut rs_values = Vec::with_capacity(chunk_count);
    for chunk in returns.chunks(lag).take(chunk_count) {
        if chunk.len() < lag {
            break;
        }
        let mean = chunk.iter().sum::<f64>() / lag as f64;
        let std_dev = {
            let variance = chunk.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / lag as f64;
            variance.sqrt()
        };
        if std_dev == 0.0 {
            continue;
        }

        let mut cumulative = 0.0;
        let mut max_dev = f64::MIN;
        let mut min_dev = f64::MAX;
        for &r in chunk {
            cumulative += r - mean;
            max_dev = max_dev.max(cumulative);
            min_dev = min_dev.min(cumulative);
        }
        let range = max_dev - min_dev;
        rs_values.push(range / std_dev);
    }

    if rs_values.is_empty() {
        return None;
    }
    Some(rs_values.iter().sum::<f64>() / rs_values.len() as f64)
}

/// Ordinary least squares slope of `y` against `x`.
fn ols_slope(x: &[f64], y: &[f64]) -> Option<f64> {
    let n = x.len() as f64;
    if n < 2.0 {
        return None;
    }
    let mean_x = x.iter().sum::<f64>() / n;
    let mean_y = y.iter().sum::<f64>() / n;

    let mut numerator = 0.0;
    let mut denominator = 0.0;
    for (xi, yi) in x.iter().zip(y.iter()) {
        numerator += (xi - mean_x) * (yi - mean_y);
        denominator += (xi - mean_x).powi(2);
    }

    if denominator == 0.0 {
        return None;
    }
    Some(numerator / denominator)
}

/// Neutral fallback for the scorer when Hurst cannot be computed
/// (insufficient history): treated as a random walk.
pub const NEUTRAL_HURST: f64 = 0.5;

#[cfg(test)]
mod tests {
    use super::*;

    fn random_walk(n: usize, seed: u64) -> Vec<f64> {
        let mut state = seed;
        let mut price = 100.0;
        let mut out = Vec::with_capacity(n);
        for _ in 0..n {
            // xorshift, deterministic
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            let step = ((state % 2000) as f64 - 1000.0) / 100_000.0;
            price *= 1.0 + step;
            out.push(price);
        }
        out
    }

    fn mean_reverting(n: usize) -> Vec<f64> {
        let mut price = 100.0;
        let mut out = Vec::with_capacity(n);
        for i in 0..n {
            let pull = (100.0 - price) * 0.3;
            let oscillation = if i % 2 == 0 { 1.0 } else { -1.0 };
            price += pull + oscillation;
            out.push(price);
        }
        out
    }

    fn trending(n: usize) -> Vec<f64> {
        (0..n).map(|i| 100.0 + i as f64 * 0.5).collect()
    }

    #[test]
    fn insufficient_data_returns_none() {
        let prices: Vec<f64> = (0..10).map(|i| 100.0 + i as f64).collect();
        assert!(hurst_exponent(&prices).is_none());
    }

    #[test]
    fn determinism() {
        let prices = random_walk(100, 42);
        let a = hurst_exponent(&prices);
        let b = hurst_exponent(&prices);
        assert_eq!(a, b);
    }

    #[test]
    fn mean_reverting_series_scores_below_half() {
        let prices = mean_reverting(200);
        let h = hurst_exponent(&prices).expect("hurst should compute");
        assert!(h < 0.5, "expected H < 0.5 for mean-reverting series, got {h}");
    }

    #[test]
    fn trending_series_scores_above_half() {
        let prices = trending(200);
        let h = hurst_exponent(&prices).expect("hurst should compute");
        assert!(h > 0.5, "expected H > 0.5 for a persistently trending series, got {h}");
    }

    #[test]
    fn non_positive_price_rejected() {
        let mut prices = trending(100);
        prices[10] = 0.0;
        assert!(hurst_exponent(&prices).is_none());
    }
}
