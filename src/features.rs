//! Feature extraction
//!
//! Turns a raw tap sequence into a fixed 32-dimension vector:
//! - Position block (8): first and last four normalized presses
//! - Rhythm block (8): dot/dash proportions, durations and consistency
//! - Statistical block (10): moments of normalized presses and gaps
//! - Temporal block (6): duration, speed, stability and drift
//!
//! Durations are divided by the sample's base unit (25th percentile press) so
//! the vector does not depend on overall tapping speed. The block order is
//! fixed; stored profiles rely on it.

use crate::config::ExtractorConfig;
use crate::stats;
use crate::types::{FeatureVector, FEATURE_DIM};

/// Duration substituted for an empty press or gap list
pub const DEGENERATE_DURATION: f64 = 0.001;

const POSITION_SLOTS: usize = 4;

/// Canonical normalized dot and dash durations, used when a class is empty
const FALLBACK_DOT: f64 = 1.0;
const FALLBACK_DASH: f64 = 3.0;

/// Feature extractor for tap sequences
#[derive(Debug, Clone, Copy, Default)]
pub struct FeatureExtractor {
    config: ExtractorConfig,
}

impl FeatureExtractor {
    pub fn new(config: ExtractorConfig) -> Self {
        Self { config }
    }

    /// Extractor with a custom dot/dash threshold ratio
    pub fn with_threshold_ratio(ratio: f64) -> Self {
        Self::new(ExtractorConfig {
            dot_dash_threshold_ratio: ratio,
        })
    }

    /// Extract the feature vector of a tap sequence
    ///
    /// Never fails: empty input is replaced by a single [`DEGENERATE_DURATION`].
    pub fn extract(&self, presses: &[f64], gaps: &[f64]) -> FeatureVector {
        let presses = non_empty(presses);
        let gaps = non_empty(gaps);

        let base_unit = estimate_base_unit(&presses);

        let norm_presses: Vec<f64> = presses.iter().map(|p| p / base_unit).collect();
        let norm_gaps: Vec<f64> = gaps.iter().map(|g| g / base_unit).collect();

        let mut features = Vec::with_capacity(FEATURE_DIM);
        features.extend(position_features(&norm_presses));
        features.extend(self.rhythm_features(&presses, &gaps, base_unit));
        features.extend(statistical_features(&norm_presses, &norm_gaps));
        features.extend(temporal_features(&presses, &gaps));

        let mut values = [0.0; FEATURE_DIM];
        for (slot, value) in values.iter_mut().zip(features) {
            *slot = if value.is_finite() { value } else { 0.0 };
        }

        tracing::trace!(base_unit, presses = presses.len(), "extracted feature vector");
        FeatureVector::new(values)
    }

    /// Dot/dash features on raw durations (8 dims)
    fn rhythm_features(&self, presses: &[f64], gaps: &[f64], base_unit: f64) -> [f64; 8] {
        let threshold = base_unit * self.config.dot_dash_threshold_ratio;
        let (dots, dashes): (Vec<f64>, Vec<f64>) = presses.iter().partition(|&&p| p < threshold);

        let total = presses.len() as f64;
        let dot_ratio = dots.len() as f64 / total;
        let dash_ratio = dashes.len() as f64 / total;

        let avg_dot = if dots.is_empty() {
            FALLBACK_DOT
        } else {
            stats::mean(&dots) / base_unit
        };
        let avg_dash = if dashes.is_empty() {
            FALLBACK_DASH
        } else {
            stats::mean(&dashes) / base_unit
        };

        let cv_dots = stats::coefficient_of_variation(&dots).unwrap_or(0.0);
        let cv_dashes = stats::coefficient_of_variation(&dashes).unwrap_or(0.0);

        let dash_dot_ratio = if avg_dot > 0.0 {
            avg_dash / avg_dot
        } else {
            FALLBACK_DASH
        };

        let avg_gap = if gaps.is_empty() {
            1.0
        } else {
            stats::mean(gaps) / base_unit
        };

        [
            dot_ratio,
            dash_ratio,
            avg_dot,
            avg_dash,
            cv_dots,
            cv_dashes,
            dash_dot_ratio,
            avg_gap,
        ]
    }
}

fn non_empty(values: &[f64]) -> Vec<f64> {
    if values.is_empty() {
        vec![DEGENERATE_DURATION]
    } else {
        values.to_vec()
    }
}

/// 25th percentile press, kept strictly positive
fn estimate_base_unit(presses: &[f64]) -> f64 {
    let unit = stats::percentile(presses, 25.0);
    if unit > 0.0 && unit.is_finite() {
        unit
    } else {
        DEGENERATE_DURATION
    }
}

/// First four and last four presses, padded with the median (8 dims)
fn position_features(norm_presses: &[f64]) -> [f64; 2 * POSITION_SLOTS] {
    let median = stats::median(norm_presses);
    let n = norm_presses.len();
    let mut features = [median; 2 * POSITION_SLOTS];

    for (i, slot) in features[..POSITION_SLOTS].iter_mut().enumerate() {
        if let Some(&value) = norm_presses.get(i) {
            *slot = value;
        }
    }

    // Slot k of the tail block holds press n - 4 + k
    for (k, slot) in features[POSITION_SLOTS..].iter_mut().enumerate() {
        let back = POSITION_SLOTS - k;
        if back <= n {
            *slot = norm_presses[n - back];
        }
    }

    features
}

/// Distribution of normalized presses and gaps (10 dims)
fn statistical_features(norm_presses: &[f64], norm_gaps: &[f64]) -> [f64; 10] {
    let press_mean = stats::mean(norm_presses);
    let gap_mean = stats::mean(norm_gaps);

    let press_gap_ratio = if gap_mean > 0.0 {
        press_mean / gap_mean
    } else {
        1.0
    };

    [
        press_mean,
        stats::std_dev(norm_presses),
        stats::median(norm_presses),
        stats::iqr(norm_presses),
        stats::skewness(norm_presses),
        gap_mean,
        stats::std_dev(norm_gaps),
        stats::median(norm_gaps),
        stats::iqr(norm_gaps),
        press_gap_ratio,
    ]
}

/// Temporal dynamics on raw durations (6 dims)
fn temporal_features(presses: &[f64], gaps: &[f64]) -> [f64; 6] {
    let total_time: f64 = presses.iter().sum::<f64>() + gaps.iter().sum::<f64>();

    let elements_per_second = if total_time > 0.0 {
        presses.len() as f64 / total_time
    } else {
        0.0
    };

    let pooled: Vec<f64> = presses.iter().chain(gaps).copied().collect();
    let rhythm_stability = 1.0 / (1.0 + stats::std_dev(&pooled));

    let acceleration = if presses.len() > 3 {
        let (first, second) = stats::half_means(presses);
        if first > 0.0 {
            (second - first) / first
        } else {
            0.0
        }
    } else {
        0.0
    };

    [
        total_time,
        elements_per_second,
        rhythm_stability,
        acceleration,
        stats::linear_trend(presses),
        stats::linear_trend(gaps),
    ]
}
