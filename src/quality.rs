//! Rhythm quality analysis
//!
//! Scores how well a tapped sample follows the expected Morse pattern:
//! - Tempo consistency: spread of all durations
//! - Pattern accuracy: element, dot and dash counts vs the password
//! - Timing precision: spread within the dot and dash classes
//! - Rhythm stability: drift between the first and second half
//! - Dot/dash separation: dash length relative to the canonical 3x dot
//!
//! Every sub-score uses the same classification: a press is a dash when it is at
//! least twice the 25th percentile press.

use crate::stats;
use crate::types::{ExpectedPattern, QualityDetails, QualityScore};

/// Dot/dash split point as a multiple of the estimated dot
const CLASSIFICATION_RATIO: f64 = 2.0;

/// Canonical dash/dot duration ratio
const IDEAL_DASH_DOT_RATIO: f64 = 3.0;

/// CV at or below which tempo is considered perfect
const TEMPO_CV_PERFECT: f64 = 0.3;
/// CV at or above which tempo scores zero
const TEMPO_CV_WORST: f64 = 1.0;

/// Relative half-to-half change that drives stability to zero
const STABILITY_MAX_CHANGE: f64 = 0.4;

/// Score for metrics that cannot be measured on the sample
const NEUTRAL_SCORE: f64 = 0.5;
/// Separation score when only one class is present
const SINGLE_CLASS_SEPARATION: f64 = 0.7;

const WEIGHT_TEMPO: f64 = 0.25;
const WEIGHT_PATTERN: f64 = 0.30;
const WEIGHT_PRECISION: f64 = 0.20;
const WEIGHT_STABILITY: f64 = 0.15;
const WEIGHT_SEPARATION: f64 = 0.10;

/// Analyzer for rhythm quality
#[derive(Debug, Clone, Copy, Default)]
pub struct RhythmQualityAnalyzer;

impl RhythmQualityAnalyzer {
    pub fn new() -> Self {
        Self
    }

    /// Analyze a tapped sample against its expected pattern
    pub fn analyze(
        &self,
        presses: &[f64],
        gaps: &[f64],
        expected: &ExpectedPattern,
    ) -> QualityScore {
        if presses.is_empty() {
            return QualityScore::empty();
        }

        let tempo_consistency = tempo_consistency(presses, gaps);
        let pattern_accuracy = pattern_accuracy(presses, expected);
        let timing_precision = timing_precision(presses);
        let rhythm_stability = rhythm_stability(presses);
        let dot_dash_separation = dot_dash_separation(presses);

        let overall_score = (WEIGHT_TEMPO * tempo_consistency
            + WEIGHT_PATTERN * pattern_accuracy
            + WEIGHT_PRECISION * timing_precision
            + WEIGHT_STABILITY * rhythm_stability
            + WEIGHT_SEPARATION * dot_dash_separation)
            .clamp(0.0, 1.0);

        let avg_press = stats::mean(presses);
        let std_press = stats::std_dev(presses);
        let details = QualityDetails {
            avg_press,
            std_press,
            cv_press: if avg_press > 0.0 { std_press / avg_press } else { 0.0 },
            total_duration: presses.iter().sum::<f64>() + gaps.iter().sum::<f64>(),
        };

        tracing::debug!(
            overall_score,
            tempo_consistency,
            pattern_accuracy,
            timing_precision,
            rhythm_stability,
            dot_dash_separation,
            "analyzed rhythm"
        );

        QualityScore {
            overall_score,
            tempo_consistency,
            pattern_accuracy,
            timing_precision,
            rhythm_stability,
            dot_dash_separation,
            details: Some(details),
        }
    }
}

/// Split presses into (dots, dashes) around `dot_estimate * CLASSIFICATION_RATIO`
fn classify(presses: &[f64], dot_estimate: f64) -> (Vec<f64>, Vec<f64>) {
    let threshold = dot_estimate * CLASSIFICATION_RATIO;
    presses.iter().partition(|&&p| p < threshold)
}

fn estimate_dot(presses: &[f64]) -> f64 {
    stats::percentile(presses, 25.0)
}

/// Linear map of CV: <= 0.3 scores 1.0, >= 1.0 scores 0.0
fn tempo_consistency(presses: &[f64], gaps: &[f64]) -> f64 {
    let all: Vec<f64> = presses.iter().chain(gaps).copied().collect();
    if all.len() < 2 {
        return NEUTRAL_SCORE;
    }

    let mean = stats::mean(&all);
    if mean == 0.0 {
        return 0.0;
    }

    let cv = stats::std_dev(&all) / mean;
    (1.0 - (cv - TEMPO_CV_PERFECT) / (TEMPO_CV_WORST - TEMPO_CV_PERFECT)).clamp(0.0, 1.0)
}

/// `0.4 * count + 0.3 * (dots + dashes)` accuracy terms
fn pattern_accuracy(presses: &[f64], expected: &ExpectedPattern) -> f64 {
    let expected_elements = expected.total_elements as f64;
    let actual_elements = presses.len() as f64;

    let count_accuracy = if actual_elements >= expected_elements {
        (expected_elements / actual_elements).min(1.0)
    } else {
        actual_elements / expected_elements
    };

    let dot_estimate = estimate_dot(presses);
    if dot_estimate == 0.0 {
        return count_accuracy * 0.5;
    }

    let (dots, dashes) = classify(presses, dot_estimate);
    let dot_accuracy = count_term(dots.len(), expected.dots);
    let dash_accuracy = count_term(dashes.len(), expected.dashes);

    (0.4 * count_accuracy + 0.3 * (dot_accuracy + dash_accuracy)).clamp(0.0, 1.0)
}

/// `1 - relative count error`, floored at 0
fn count_term(actual: usize, expected: usize) -> f64 {
    let error = actual.abs_diff(expected) as f64 / expected.max(1) as f64;
    (1.0 - error).max(0.0)
}

/// Mean within-class consistency (1 - CV) of dots and dashes
fn timing_precision(presses: &[f64]) -> f64 {
    if presses.len() < 2 {
        return NEUTRAL_SCORE;
    }

    let dot_estimate = estimate_dot(presses);
    if dot_estimate == 0.0 {
        return 0.0;
    }

    let (dots, dashes) = classify(presses, dot_estimate);
    let class_consistency = |class: &[f64]| {
        stats::coefficient_of_variation(class).map_or(NEUTRAL_SCORE, |cv| 1.0 - cv)
    };

    let precision =
        (class_consistency(dots.as_slice()) + class_consistency(dashes.as_slice())) / 2.0;
    precision.clamp(0.0, 1.0)
}

/// 1.0 for no drift between halves, 0.0 at 40% or more
fn rhythm_stability(presses: &[f64]) -> f64 {
    if presses.len() < 4 {
        return NEUTRAL_SCORE;
    }

    let (first, second) = stats::half_means(presses);
    if first == 0.0 {
        return NEUTRAL_SCORE;
    }

    let relative_change = (second - first).abs() / first;
    (1.0 - relative_change / STABILITY_MAX_CHANGE).clamp(0.0, 1.0)
}

/// Closeness of the dash/dot ratio to 3.0
fn dot_dash_separation(presses: &[f64]) -> f64 {
    if presses.len() < 3 {
        return NEUTRAL_SCORE;
    }

    let dot_estimate = estimate_dot(presses);
    if dot_estimate == 0.0 {
        return 0.0;
    }

    let (dots, dashes) = classify(presses, dot_estimate);
    if dots.is_empty() || dashes.is_empty() {
        return SINGLE_CLASS_SEPARATION;
    }

    let mean_dot = stats::mean(&dots);
    let ratio = if mean_dot > 0.0 {
        stats::mean(&dashes) / mean_dot
    } else {
        0.0
    };
    let error = (ratio - IDEAL_DASH_DOT_RATIO).abs() / IDEAL_DASH_DOT_RATIO;
    (1.0 - error).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::PatternCodec;

    fn sos_pattern() -> ExpectedPattern {
        PatternCodec::parse("... --- ...")
    }

    fn sos_sample() -> (Vec<f64>, Vec<f64>) {
        (
            vec![0.1, 0.1, 0.1, 0.3, 0.3, 0.3, 0.1, 0.1, 0.1],
            vec![0.1, 0.1, 0.15, 0.1, 0.1, 0.15, 0.1, 0.1],
        )
    }

    #[test]
    fn test_sos_scenario() {
        let (presses, gaps) = sos_sample();
        let score = RhythmQualityAnalyzer::new().analyze(&presses, &gaps, &sos_pattern());

        assert_eq!(score.pattern_accuracy, 1.0);
        assert!(score.overall_score > 0.7, "overall = {}", score.overall_score);
        assert!(score.timing_precision > 0.99);
        assert!((score.dot_dash_separation - 1.0).abs() < 1e-9);
        // halves 0.15 vs 0.18 -> 20% change -> 0.5
        assert!((score.rhythm_stability - 0.5).abs() < 1e-9);
        assert!(score.details.is_some());
    }

    #[test]
    fn test_empty_presses_score_zero() {
        let score = RhythmQualityAnalyzer::new().analyze(&[], &[0.1, 0.2], &sos_pattern());
        assert_eq!(score, QualityScore::empty());
        assert_eq!(score.overall_score, 0.0);
        assert_eq!(score.tempo_consistency, 0.0);
        assert_eq!(score.dot_dash_separation, 0.0);
    }

    #[test]
    fn test_single_class_separation() {
        assert_eq!(dot_dash_separation(&[0.1, 0.1, 0.1, 0.1]), 0.7);
        assert_eq!(dot_dash_separation(&[0.3, 0.3, 0.3]), 0.7);
        assert_eq!(dot_dash_separation(&[0.3, 0.32, 0.31, 0.29]), 0.7);
    }

    #[test]
    fn test_separation_short_sample_is_neutral() {
        assert_eq!(dot_dash_separation(&[0.1, 0.3]), 0.5);
    }

    #[test]
    fn test_tempo_consistency_bounds() {
        // Perfectly regular -> CV 0 -> 1.0
        assert_eq!(tempo_consistency(&[0.1, 0.1, 0.1], &[0.1, 0.1]), 1.0);
        // Single value -> neutral
        assert_eq!(tempo_consistency(&[0.1], &[]), 0.5);
        // All zero -> 0.0
        assert_eq!(tempo_consistency(&[0.0, 0.0], &[]), 0.0);
        // Very irregular -> floor
        assert_eq!(tempo_consistency(&[0.01, 0.01, 0.01, 2.0], &[]), 0.0);
    }

    #[test]
    fn test_pattern_accuracy_penalizes_extra_taps() {
        let pattern = sos_pattern();
        let presses = [0.1, 0.1, 0.1, 0.3, 0.3, 0.3, 0.1, 0.1, 0.1, 0.1];
        let accuracy = pattern_accuracy(&presses, &pattern);
        // count 9/10, dots 1 - 1/6, dashes 1.0
        let expected = 0.4 * 0.9 + 0.3 * (1.0 - 1.0 / 6.0) + 0.3;
        assert!((accuracy - expected).abs() < 1e-9);
        assert!(accuracy < 1.0);
    }

    #[test]
    fn test_pattern_accuracy_missing_taps() {
        let pattern = sos_pattern();
        let accuracy = pattern_accuracy(&[0.1, 0.1, 0.1], &pattern);
        // count 3/9, dots 1 - 3/6, dashes 1 - 3/3 = 0
        let expected = 0.4 * (3.0 / 9.0) + 0.3 * 0.5;
        assert!((accuracy - expected).abs() < 1e-9);
    }

    #[test]
    fn test_pattern_accuracy_zero_dot_estimate() {
        let pattern = PatternCodec::parse("...");
        assert_eq!(pattern_accuracy(&[0.0, 0.0, 0.0], &pattern), 0.5);
    }

    #[test]
    fn test_timing_precision_single_member_class_is_neutral() {
        // dots [0.1, 0.1, 0.1] -> 1.0 ; one dash -> 0.5
        let precision = timing_precision(&[0.1, 0.1, 0.1, 0.3]);
        assert!((precision - 0.75).abs() < 1e-9);
        assert_eq!(timing_precision(&[0.1]), 0.5);
    }

    #[test]
    fn test_rhythm_stability() {
        assert_eq!(rhythm_stability(&[0.1, 0.1, 0.1]), 0.5);
        assert!((rhythm_stability(&[0.1, 0.1, 0.1, 0.1]) - 1.0).abs() < 1e-9);
        // 0.1 -> 0.2 is 100% change
        assert_eq!(rhythm_stability(&[0.1, 0.1, 0.2, 0.2]), 0.0);
    }

    #[test]
    fn test_scores_stay_in_unit_interval() {
        let pattern = PatternCodec::parse(".- -...");
        let samples: Vec<(Vec<f64>, Vec<f64>)> = vec![
            (vec![0.05, 2.0, 0.01, 0.9, 0.3], vec![1.5, 0.0, 0.2, 3.0]),
            (vec![0.2], vec![]),
            (vec![5.0, 0.001, 5.0, 0.001, 5.0, 0.001], vec![0.0; 5]),
        ];
        for (presses, gaps) in samples {
            let s = RhythmQualityAnalyzer::new().analyze(&presses, &gaps, &pattern);
            for value in [
                s.overall_score,
                s.tempo_consistency,
                s.pattern_accuracy,
                s.timing_precision,
                s.rhythm_stability,
                s.dot_dash_separation,
            ] {
                assert!((0.0..=1.0).contains(&value), "{value} out of range for {presses:?}");
            }
        }
    }
}
