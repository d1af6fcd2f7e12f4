//! Descriptive statistics over timing slices
//!
//! Every helper is total: empty or degenerate input returns a defined value
//! instead of NaN, so callers only need to decide on their own fallbacks.

/// Arithmetic mean, 0.0 for an empty slice
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation (ddof = 0), 0.0 for an empty slice
pub fn std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    let variance = values.iter().map(|x| (x - m).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

/// Coefficient of variation, `None` when it is undefined (fewer than two
/// values or a non-positive mean)
pub fn coefficient_of_variation(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values);
    if m <= 0.0 {
        return None;
    }
    Some(std_dev(values) / m)
}

/// Percentile with linear interpolation between closest ranks
///
/// `q` is in percent (0-100). Returns 0.0 for an empty slice.
pub fn percentile(values: &[f64], q: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let rank = (q / 100.0).clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let fraction = rank - lower as f64;

    sorted[lower] + (sorted[upper] - sorted[lower]) * fraction
}

pub fn median(values: &[f64]) -> f64 {
    percentile(values, 50.0)
}

/// Interquartile range (75th minus 25th percentile)
pub fn iqr(values: &[f64]) -> f64 {
    percentile(values, 75.0) - percentile(values, 25.0)
}

/// Population skewness; 0.0 below three samples or with zero spread
pub fn skewness(values: &[f64]) -> f64 {
    if values.len() < 3 {
        return 0.0;
    }
    let m = mean(values);
    let sd = std_dev(values);
    if sd == 0.0 {
        return 0.0;
    }
    values.iter().map(|x| ((x - m) / sd).powi(3)).sum::<f64>() / values.len() as f64
}

/// Least-squares slope of `values` against their index; 0.0 below three samples
pub fn linear_trend(values: &[f64]) -> f64 {
    if values.len() < 3 {
        return 0.0;
    }
    let n = values.len() as f64;
    let x_mean = (n - 1.0) / 2.0;
    let y_mean = mean(values);

    let (num, den) = values
        .iter()
        .enumerate()
        .fold((0.0, 0.0), |(num, den), (i, y)| {
            let dx = i as f64 - x_mean;
            (num + dx * (y - y_mean), den + dx * dx)
        });

    if den == 0.0 {
        0.0
    } else {
        num / den
    }
}

/// Mean of the first half vs the second half (`len / 2` split point)
pub fn half_means(values: &[f64]) -> (f64, f64) {
    let mid = values.len() / 2;
    (mean(&values[..mid]), mean(&values[mid..]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentile_interpolates() {
        let values = [1.0, 2.0, 3.0, 4.0];
        // rank = 0.25 * 3 = 0.75 -> 1 + 0.75
        assert!((percentile(&values, 25.0) - 1.75).abs() < 1e-12);
        assert!((percentile(&values, 50.0) - 2.5).abs() < 1e-12);
        assert_eq!(percentile(&values, 100.0), 4.0);
        assert_eq!(percentile(&[], 25.0), 0.0);
    }

    #[test]
    fn test_percentile_ignores_input_order() {
        assert_eq!(percentile(&[0.3, 0.1, 0.2], 50.0), 0.2);
    }

    #[test]
    fn test_std_dev_is_population() {
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert!((std_dev(&values) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_coefficient_of_variation_undefined_cases() {
        assert_eq!(coefficient_of_variation(&[1.0]), None);
        assert_eq!(coefficient_of_variation(&[0.0, 0.0]), None);
        assert_eq!(coefficient_of_variation(&[1.0, 1.0]), Some(0.0));
    }

    #[test]
    fn test_skewness() {
        assert_eq!(skewness(&[1.0, 2.0]), 0.0);
        assert_eq!(skewness(&[3.0, 3.0, 3.0]), 0.0);
        assert!(skewness(&[1.0, 1.0, 1.0, 10.0]) > 0.0);
        assert!(skewness(&[1.0, 1.0, 2.0, 3.0]).is_finite());
    }

    #[test]
    fn test_linear_trend() {
        assert!((linear_trend(&[1.0, 2.0, 3.0, 4.0]) - 1.0).abs() < 1e-12);
        assert!((linear_trend(&[0.3, 0.2, 0.1]) + 0.1).abs() < 1e-12);
        assert_eq!(linear_trend(&[1.0, 5.0]), 0.0);
    }

    #[test]
    fn test_half_means_uneven_split() {
        // mid = 2: [1, 1] vs [2, 2, 2]
        let (first, second) = half_means(&[1.0, 1.0, 2.0, 2.0, 2.0]);
        assert_eq!(first, 1.0);
        assert_eq!(second, 2.0);
    }
}
