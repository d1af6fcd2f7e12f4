//! Enrollment accumulation
//!
//! An [`EnrollmentSession`] collects feature vectors for one registration. Each
//! candidate sample passes a hard quality gate or is discarded; accepted samples
//! are later averaged into a [`BiometricProfile`], weighted by their quality.

use crate::config::{EnrollmentConfig, QualityGate};
use crate::error::ComputeError;
use crate::stats;
use crate::types::{
    AdmissionResult, AdmissionStatus, BiometricProfile, FeatureVector, GateMetrics,
    RejectionReason, FEATURE_DIM,
};
use serde::{Deserialize, Serialize};

const QUALITY_WEIGHT_TIMING: f64 = 0.40;
const QUALITY_WEIGHT_TEMPO: f64 = 0.30;
const QUALITY_WEIGHT_PATTERN: f64 = 0.20;
const QUALITY_WEIGHT_OUTLIERS: f64 = 0.10;

/// Accumulator for one in-progress registration
///
/// Not synchronized; a registration feeds it one sample at a time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrollmentSession {
    min_samples: usize,
    max_samples: usize,
    gate: QualityGate,
    /// Accepted feature vectors
    samples: Vec<FeatureVector>,
    /// Quality of each accepted sample, same order as `samples`
    qualities: Vec<f64>,
}

impl Default for EnrollmentSession {
    fn default() -> Self {
        Self::new(EnrollmentConfig::default())
    }
}

impl EnrollmentSession {
    pub fn new(config: EnrollmentConfig) -> Self {
        Self {
            min_samples: config.min_samples,
            max_samples: config.max_samples,
            gate: config.gate,
            samples: Vec::with_capacity(config.max_samples),
            qualities: Vec::with_capacity(config.max_samples),
        }
    }

    /// Session with the default gate and explicit sample bounds
    pub fn with_bounds(min_samples: usize, max_samples: usize) -> Self {
        Self::new(EnrollmentConfig {
            min_samples,
            max_samples,
            ..EnrollmentConfig::default()
        })
    }

    pub fn min_samples(&self) -> usize {
        self.min_samples
    }

    pub fn max_samples(&self) -> usize {
        self.max_samples
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    /// True once `min_samples` samples have been accepted
    pub fn is_complete(&self) -> bool {
        self.samples.len() >= self.min_samples
    }

    /// True while fewer than `max_samples` samples have been accepted
    pub fn can_accept_more(&self) -> bool {
        self.samples.len() < self.max_samples
    }

    /// Offer a sample to the session
    ///
    /// The sample is stored only if it passes every gate check and the session
    /// is not full. The continuous quality is reported either way.
    pub fn add(&mut self, vector: FeatureVector, metrics: &GateMetrics) -> AdmissionResult {
        let quality = compute_quality(metrics);

        let verdict = if self.can_accept_more() {
            self.check_gate(metrics)
        } else {
            Err(RejectionReason::EnrollmentFull)
        };

        let (status, rejection_reason) = match verdict {
            Ok(()) => {
                self.samples.push(vector);
                self.qualities.push(quality);
                tracing::info!(
                    quality,
                    collected = self.samples.len(),
                    "enrollment sample accepted"
                );
                (AdmissionStatus::Accepted, None)
            }
            Err(reason) => {
                tracing::info!(quality, %reason, "enrollment sample rejected");
                (AdmissionStatus::Rejected, Some(reason))
            }
        };

        AdmissionResult {
            status,
            quality_score: quality,
            rejection_reason,
            samples_collected: self.samples.len(),
            samples_needed: self.min_samples.saturating_sub(self.samples.len()),
        }
    }

    fn check_gate(&self, metrics: &GateMetrics) -> Result<(), RejectionReason> {
        if metrics.pattern_accuracy < self.gate.min_pattern_accuracy {
            return Err(RejectionReason::PatternMismatch);
        }
        if metrics.timing_precision < self.gate.min_timing_precision {
            return Err(RejectionReason::TimingPrecisionTooLow);
        }
        if metrics.outlier_ratio() > self.gate.max_outlier_ratio {
            return Err(RejectionReason::TooManyOutliers);
        }
        Ok(())
    }

    /// Normalized weights of the accepted samples, summing to 1
    pub fn weights(&self) -> Vec<f64> {
        let total: f64 = self.qualities.iter().sum();
        if total > 0.0 {
            self.qualities.iter().map(|q| q / total).collect()
        } else {
            let n = self.qualities.len() as f64;
            self.qualities.iter().map(|_| 1.0 / n).collect()
        }
    }

    /// Build the profile from accepted samples
    ///
    /// Fails with [`ComputeError::EmptyEnrollment`] when nothing was accepted.
    pub fn build_profile(&self) -> Result<BiometricProfile, ComputeError> {
        if self.samples.is_empty() {
            return Err(ComputeError::EmptyEnrollment);
        }

        let mut mean = [0.0; FEATURE_DIM];
        for (sample, weight) in self.samples.iter().zip(self.weights()) {
            for (acc, value) in mean.iter_mut().zip(sample.as_slice()) {
                *acc += weight * value;
            }
        }

        let consistency_score = (1.0 - stats::std_dev(&self.qualities)).clamp(0.0, 1.0);

        tracing::info!(
            samples = self.samples.len(),
            consistency_score,
            "built biometric profile"
        );

        Ok(BiometricProfile {
            mean_vector: FeatureVector::new(mean),
            sample_count: self.samples.len(),
            consistency_score,
        })
    }
}

/// Continuous quality in [0, 1]
///
/// `0.40 * timing + 0.30 * tempo + 0.20 * pattern + 0.10 * (1 - outliers)`
fn compute_quality(metrics: &GateMetrics) -> f64 {
    let quality = QUALITY_WEIGHT_TIMING * metrics.timing_precision
        + QUALITY_WEIGHT_TEMPO * metrics.tempo_consistency
        + QUALITY_WEIGHT_PATTERN * metrics.pattern_accuracy
        + QUALITY_WEIGHT_OUTLIERS * (1.0 - metrics.outlier_ratio());
    quality.clamp(0.0, 1.0)
}
