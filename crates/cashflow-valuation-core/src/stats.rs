// ---------------------------------------------------------------------------
// Descriptive statistics shared by the series and simulation modules
// ---------------------------------------------------------------------------

/// Arithmetic mean. Returns 0 for an empty slice.
pub(crate) fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation (ddof = 1). Fewer than two values give 0.
pub(crate) fn sample_std(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let ss = values.iter().map(|v| (v - m).powi(2)).sum::<f64>();
    (ss / (values.len() - 1) as f64).sqrt()
}

/// Compute the percentile value from a **sorted**, non-empty slice using linear interpolation.
#[cfg(feature = "monte_carlo")]
pub(crate) fn percentile_sorted(sorted: &[f64], p: f64) -> f64 {
    if sorted.len() == 1 {
        return sorted[0];
    }
    let rank = p / 100.0 * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    if lower == upper {
        sorted[lower]
    } else {
        let frac = rank - lower as f64;
        sorted[lower] * (1.0 - frac) + sorted[upper] * frac
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_std_uses_n_minus_one() {
        // Var = ((1-2.5)^2 + (2-2.5)^2 + (3-2.5)^2 + (4-2.5)^2) / 3 = 5/3
        let s = sample_std(&[1.0, 2.0, 3.0, 4.0]);
        assert!((s - (5.0_f64 / 3.0).sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_sample_std_single_value_is_zero() {
        assert_eq!(sample_std(&[42.0]), 0.0);
        assert_eq!(mean(&[]), 0.0);
    }

    #[cfg(feature = "monte_carlo")]
    #[test]
    fn test_percentile_interpolates() {
        let sorted = [0.0, 10.0, 20.0, 30.0, 40.0];
        assert_eq!(percentile_sorted(&sorted, 50.0), 20.0);
        assert!((percentile_sorted(&sorted, 5.0) - 2.0).abs() < 1e-12);
        assert_eq!(percentile_sorted(&[7.0], 95.0), 7.0);
    }
}
