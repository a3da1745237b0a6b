// =============================================================================
// Volume coefficient of variation
// =============================================================================
//
// CV = stdev(volume) / mean(volume)
//
// A low CV means trading activity is steady bar-to-bar (favorable for a grid
// that needs reliable fills); a high CV means volume is spiky and unreliable.
// =============================================================================

/// Coefficient of variation of a volume series.
///
/// Returns the sentinel `1.0` (treated as "unremarkable / neutral") when
/// fewer than 10 observations are available or the mean volume is zero.
pub fn volume_coefficient_of_variation(volumes: &[f64]) -> f64 {
    if volumes.len() < 10 {
        return 1.0;
    }

    let n = volumes.len() as f64;
    let mean = volumes.iter().sum::<f64>() / n;
    if mean == 0.0 {
        return 1.0;
    }

    let variance = volumes.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    let std_dev = variance.sqrt();

    std_dev / mean
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_series_returns_sentinel() {
        let volumes = vec![100.0; 5];
        assert_eq!(volume_coefficient_of_variation(&volumes), 1.0);
    }

    #[test]
    fn zero_mean_returns_sentinel() {
        let volumes = vec![0.0; 20];
        assert_eq!(volume_coefficient_of_variation(&volumes), 1.0);
    }

    #[test]
    fn constant_volume_has_zero_cv() {
        let volumes = vec![500.0; 20];
        let cv = volume_coefficient_of_variation(&volumes);
        assert!((cv - 0.0).abs() < 1e-9);
    }

    #[test]
    fn volatile_volume_has_higher_cv_than_steady() {
        let steady = vec![500.0, 510.0, 495.0, 505.0, 500.0, 498.0, 502.0, 500.0, 497.0, 503.0, 500.0];
        let spiky = vec![100.0, 900.0, 150.0, 800.0, 120.0, 950.0, 110.0, 870.0, 130.0, 890.0, 140.0];
        let cv_steady = volume_coefficient_of_variation(&steady);
        let cv_spiky = volume_coefficient_of_variation(&spiky);
        assert!(cv_spiky > cv_steady);
    }
}
