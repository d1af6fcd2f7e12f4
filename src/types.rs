//! Core types for the Rhythm Auth engine
//!
//! This module defines the values that flow between stages: captured timing
//! samples, expected patterns, feature vectors, quality scores, enrollment
//! admissions, profiles and match results.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Index;

/// Number of dimensions in a [`FeatureVector`]
pub const FEATURE_DIM: usize = 32;

/// A captured tap sequence
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimingSample {
    /// Key press durations in seconds, in tap order
    pub presses: Vec<f64>,
    /// Gaps between consecutive taps in seconds
    #[serde(default)]
    pub gaps: Vec<f64>,
}

impl TimingSample {
    pub fn new(presses: Vec<f64>, gaps: Vec<f64>) -> Self {
        Self { presses, gaps }
    }

    pub fn is_empty(&self) -> bool {
        self.presses.is_empty()
    }
}

/// Expected symbolic pattern of a Morse password
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpectedPattern {
    /// Normalized Morse text, groups joined by single spaces
    pub morse_code: String,
    /// Dot/dash group per character
    pub groups: Vec<String>,
    /// Decoded password, `?` for unknown groups
    pub decoded: String,
    /// Number of character groups
    pub pattern_count: usize,
    /// Number of dots and dashes
    pub total_elements: usize,
    pub dots: usize,
    pub dashes: usize,
}

impl ExpectedPattern {
    /// True when every group decoded to a known character
    pub fn is_fully_decoded(&self) -> bool {
        !self.decoded.is_empty() && !self.decoded.contains(crate::codec::UNKNOWN_CHAR)
    }
}

/// Canonical timing of a single character
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExpectedTiming {
    pub pattern: &'static str,
    pub num_elements: usize,
    pub dots: usize,
    pub dashes: usize,
    /// Elements plus intra-character gaps in seconds; the inter-word gap for a space
    pub total_duration: f64,
}

/// Fixed-size feature vector
///
/// Layout: position (0-7), rhythm (8-15), statistical (16-25), temporal (26-31).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector([f64; FEATURE_DIM]);

impl FeatureVector {
    pub fn new(values: [f64; FEATURE_DIM]) -> Self {
        Self(values)
    }

    /// Build from a slice of exactly [`FEATURE_DIM`] values
    pub fn from_slice(values: &[f64]) -> Option<Self> {
        let array: [f64; FEATURE_DIM] = values.try_into().ok()?;
        Some(Self(array))
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn to_vec(&self) -> Vec<f64> {
        self.0.to_vec()
    }

    pub fn len(&self) -> usize {
        FEATURE_DIM
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn is_finite(&self) -> bool {
        self.0.iter().all(|v| v.is_finite())
    }
}

impl Index<usize> for FeatureVector {
    type Output = f64;

    fn index(&self, index: usize) -> &f64 {
        &self.0[index]
    }
}

/// Descriptive statistics attached to a quality score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityDetails {
    pub avg_press: f64,
    pub std_press: f64,
    pub cv_press: f64,
    pub total_duration: f64,
}

/// Rhythm quality of a tapped sample, all scores in [0, 1]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityScore {
    pub overall_score: f64,
    pub tempo_consistency: f64,
    pub pattern_accuracy: f64,
    pub timing_precision: f64,
    pub rhythm_stability: f64,
    pub dot_dash_separation: f64,
    /// Absent for empty samples
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<QualityDetails>,
}

impl QualityScore {
    /// Score of a sample with no taps
    pub fn empty() -> Self {
        Self {
            overall_score: 0.0,
            tempo_consistency: 0.0,
            pattern_accuracy: 0.0,
            timing_precision: 0.0,
            rhythm_stability: 0.0,
            dot_dash_separation: 0.0,
            details: None,
        }
    }

    /// Human-readable feedback for the overall score
    pub fn feedback(&self) -> &'static str {
        match self.overall_score {
            s if s >= 0.85 => "Excellent rhythm! Very consistent and accurate.",
            s if s >= 0.70 => "Good rhythm. Minor inconsistencies detected.",
            s if s >= 0.55 => "Moderate rhythm. Try to maintain a steadier tempo.",
            _ => "Rhythm needs improvement. Focus on consistency.",
        }
    }
}

/// Metrics the enrollment gate looks at
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateMetrics {
    pub pattern_accuracy: f64,
    pub timing_precision: f64,
    pub tempo_consistency: f64,
    /// Fraction of elements flagged as rhythm outliers, 0.0 when not measured
    #[serde(default)]
    pub outlier_ratio: Option<f64>,
}

impl GateMetrics {
    pub fn outlier_ratio(&self) -> f64 {
        self.outlier_ratio.unwrap_or(0.0)
    }
}

impl From<&QualityScore> for GateMetrics {
    fn from(score: &QualityScore) -> Self {
        Self {
            pattern_accuracy: score.pattern_accuracy,
            timing_precision: score.timing_precision,
            tempo_consistency: score.tempo_consistency,
            outlier_ratio: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdmissionStatus {
    Accepted,
    Rejected,
}

/// Why the enrollment gate discarded a sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionReason {
    PatternMismatch,
    TimingPrecisionTooLow,
    TooManyOutliers,
    EnrollmentFull,
}

impl RejectionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectionReason::PatternMismatch => "Pattern mismatch",
            RejectionReason::TimingPrecisionTooLow => "Timing precision too low",
            RejectionReason::TooManyOutliers => "Too many rhythm outliers",
            RejectionReason::EnrollmentFull => "Enrollment is full",
        }
    }
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of offering one sample to an enrollment session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdmissionResult {
    pub status: AdmissionStatus,
    /// Continuous quality, reported whether or not the sample was kept
    pub quality_score: f64,
    pub rejection_reason: Option<RejectionReason>,
    pub samples_collected: usize,
    pub samples_needed: usize,
}

impl AdmissionResult {
    pub fn is_accepted(&self) -> bool {
        self.status == AdmissionStatus::Accepted
    }
}

/// Statistical summary of accepted enrollment samples
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BiometricProfile {
    /// Quality-weighted mean feature vector
    pub mean_vector: FeatureVector,
    pub sample_count: usize,
    /// `1 - stddev(qualities)`, clamped to [0, 1]
    pub consistency_score: f64,
}

/// Distance metrics available to the matcher
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    Euclidean,
    Manhattan,
    Mahalanobis,
}

impl Metric {
    /// Voting order used by multi-metric authentication
    pub const ALL: [Metric; 3] = [Metric::Euclidean, Metric::Manhattan, Metric::Mahalanobis];

    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::Euclidean => "euclidean",
            Metric::Manhattan => "manhattan",
            Metric::Mahalanobis => "mahalanobis",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Single-metric authentication outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricOutcome {
    pub metric: Metric,
    pub distance: f64,
    pub accepted: bool,
    /// Effective threshold after floor and tolerance multiplier
    pub threshold: f64,
    /// `threshold - distance`
    pub margin: f64,
    pub confidence: f64,
}

/// Multi-metric authentication outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub euclidean: MetricOutcome,
    pub manhattan: MetricOutcome,
    pub mahalanobis: MetricOutcome,
    pub final_decision: bool,
    pub avg_confidence: f64,
    /// Number of metrics that accepted
    pub votes: usize,
    /// Vote tally formatted as `"k/3"`
    pub vote_tally: String,
}

impl MatchResult {
    pub fn outcome(&self, metric: Metric) -> &MetricOutcome {
        match metric {
            Metric::Euclidean => &self.euclidean,
            Metric::Manhattan => &self.manhattan,
            Metric::Mahalanobis => &self.mahalanobis,
        }
    }

    /// Primary (euclidean) distance
    pub fn distance(&self) -> f64 {
        self.euclidean.distance
    }

    /// Effective threshold shared by all metrics
    pub fn threshold(&self) -> f64 {
        self.euclidean.threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feature_vector_from_slice() {
        assert!(FeatureVector::from_slice(&[0.0; 31]).is_none());
        let v = FeatureVector::from_slice(&[1.5; FEATURE_DIM]).unwrap();
        assert_eq!(v[31], 1.5);
        assert_eq!(v.len(), FEATURE_DIM);
    }

    #[test]
    fn test_feature_vector_serializes_as_array() {
        let v = FeatureVector::new([0.25; FEATURE_DIM]);
        let json = serde_json::to_value(v).unwrap();
        assert_eq!(json.as_array().map(Vec::len), Some(FEATURE_DIM));
        let back: FeatureVector = serde_json::from_value(json).unwrap();
        assert_eq!(back, v);
    }

    #[test]
    fn test_rejection_reason_messages() {
        assert_eq!(RejectionReason::PatternMismatch.to_string(), "Pattern mismatch");
        assert_eq!(
            RejectionReason::TooManyOutliers.to_string(),
            "Too many rhythm outliers"
        );
    }

    #[test]
    fn test_feedback_bands() {
        let mut score = QualityScore::empty();
        assert!(score.feedback().starts_with("Rhythm needs improvement"));
        score.overall_score = 0.72;
        assert!(score.feedback().starts_with("Good"));
        score.overall_score = 0.9;
        assert!(score.feedback().starts_with("Excellent"));
    }

    #[test]
    fn test_gate_metrics_default_outlier_ratio() {
        let metrics: GateMetrics = serde_json::from_str(
            r#"{"pattern_accuracy": 1.0, "timing_precision": 0.9, "tempo_consistency": 0.8}"#,
        )
        .unwrap();
        assert_eq!(metrics.outlier_ratio(), 0.0);
    }
}
