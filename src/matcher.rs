//! Profile matching
//!
//! Compares a fresh feature vector against a stored profile. Each metric gets
//! its own accept/reject verdict against a shared effective threshold, and the
//! multi-metric vote combines them into the final access decision.

use crate::config::MatcherConfig;
use crate::schema::{StoredProfile, MISSING_PROFILE_DISTANCE};
use crate::types::{MatchResult, Metric, MetricOutcome};
use nalgebra::{DMatrix, DVector};

/// Votes needed to accept without a euclidean accept
const MAJORITY_VOTES: usize = 2;

impl Metric {
    /// Distance between `test` and the profile mean
    ///
    /// `None` when the profile has no mean of the test dimension. Mahalanobis
    /// falls back to euclidean when the profile has no usable covariance.
    pub fn distance(
        self,
        test: &[f64],
        profile: &StoredProfile,
        regularization: f64,
    ) -> Option<f64> {
        let mean = profile
            .mean
            .as_deref()
            .filter(|mean| mean.len() == test.len())?;

        Some(match self {
            Metric::Euclidean => euclidean(test, mean),
            Metric::Manhattan => manhattan(test, mean),
            Metric::Mahalanobis => match profile.covariance.as_deref() {
                None => {
                    tracing::debug!("profile has no covariance, using euclidean distance");
                    euclidean(test, mean)
                }
                Some(covariance) => mahalanobis(test, mean, covariance, regularization)
                    .unwrap_or_else(|| {
                        tracing::warn!("covariance unusable, using euclidean distance");
                        euclidean(test, mean)
                    }),
            },
        })
    }
}

/// `sqrt(sum((a - b)^2))`
fn euclidean(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f64>()
        .sqrt()
}

/// `sum(|a - b|)`
fn manhattan(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y).abs()).sum()
}

/// `sqrt(d^T (C + eps * I)^-1 d)` with `d = test - mean`
///
/// `None` when the covariance is not square in the test dimension, is
/// singular, or the result is not finite.
fn mahalanobis(
    test: &[f64],
    mean: &[f64],
    rows: &[Vec<f64>],
    regularization: f64,
) -> Option<f64> {
    let n = test.len();
    if rows.len() != n || rows.iter().any(|row| row.len() != n) {
        return None;
    }

    let cov = DMatrix::from_fn(n, n, |i, j| rows[i][j]) + DMatrix::identity(n, n) * regularization;
    let inverse = cov.try_inverse()?;
    let diff = DVector::from_iterator(n, test.iter().zip(mean).map(|(x, y)| x - y));

    let distance = diff.dot(&(inverse * &diff)).sqrt();
    distance.is_finite().then_some(distance)
}

/// Confidence in a verdict
///
/// `1 - d/t` when accepted, `1 - t/d` when rejected, 0 when `t` is 0.
pub fn confidence(distance: f64, threshold: f64) -> f64 {
    if threshold == 0.0 {
        return 0.0;
    }
    if distance < threshold {
        1.0 - distance / threshold
    } else {
        1.0 - threshold / distance
    }
}

/// Distance-based matcher
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Matcher {
    config: MatcherConfig,
}

impl Matcher {
    pub fn new(config: MatcherConfig) -> Self {
        Self { config }
    }

    /// Matcher with a caller-supplied threshold
    pub fn with_threshold(threshold: f64) -> Self {
        Self::new(MatcherConfig {
            static_threshold: Some(threshold),
            ..MatcherConfig::default()
        })
    }

    pub fn config(&self) -> &MatcherConfig {
        &self.config
    }

    /// Threshold applied to every metric for this profile
    ///
    /// `max(base, min_threshold) * tolerance_multiplier`, where base is the
    /// profile's recommended threshold in dynamic mode, else the static one,
    /// else the default.
    pub fn effective_threshold(&self, profile: &StoredProfile) -> f64 {
        let recommended = profile
            .recommended_threshold
            .filter(|_| self.config.use_dynamic_threshold);
        let base = recommended
            .or(self.config.static_threshold)
            .unwrap_or(self.config.default_threshold);

        base.max(self.config.min_threshold) * self.config.tolerance_multiplier
    }

    /// Single-metric verdict
    pub fn authenticate(
        &self,
        test: &[f64],
        profile: &StoredProfile,
        metric: Metric,
    ) -> MetricOutcome {
        let Some(distance) = metric.distance(test, profile, self.config.regularization) else {
            if let Some(mean) = &profile.mean {
                tracing::warn!(
                    profile_dim = mean.len(),
                    test_dim = test.len(),
                    "profile dimension mismatch"
                );
            }
            return missing_profile(metric);
        };
        let threshold = self.effective_threshold(profile);

        MetricOutcome {
            metric,
            distance,
            accepted: distance < threshold,
            threshold,
            margin: threshold - distance,
            confidence: confidence(distance, threshold),
        }
    }

    /// Run all metrics and vote
    ///
    /// Access is granted when euclidean accepts alongside at least one vote,
    /// or when a majority of metrics accept.
    pub fn authenticate_with_multiple_metrics(
        &self,
        test: &[f64],
        profile: &StoredProfile,
    ) -> MatchResult {
        let [euclidean, manhattan, mahalanobis] =
            Metric::ALL.map(|metric| self.authenticate(test, profile, metric));

        let outcomes = [&euclidean, &manhattan, &mahalanobis];
        let votes = outcomes.iter().filter(|o| o.accepted).count();
        let avg_confidence =
            outcomes.iter().map(|o| o.confidence).sum::<f64>() / outcomes.len() as f64;
        let final_decision = (euclidean.accepted && votes >= 1) || votes >= MAJORITY_VOTES;

        tracing::info!(
            distance = euclidean.distance,
            threshold = euclidean.threshold,
            votes,
            final_decision,
            "authentication attempt"
        );

        MatchResult {
            vote_tally: format!("{}/{}", votes, outcomes.len()),
            euclidean,
            manhattan,
            mahalanobis,
            final_decision,
            avg_confidence,
            votes,
        }
    }
}

fn missing_profile(metric: Metric) -> MetricOutcome {
    MetricOutcome {
        metric,
        distance: MISSING_PROFILE_DISTANCE,
        accepted: false,
        threshold: 0.0,
        margin: -MISSING_PROFILE_DISTANCE,
        confidence: 1.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io;
    use std::sync::{Arc, Mutex};

    fn profile(mean: Vec<f64>) -> StoredProfile {
        StoredProfile {
            mean: Some(mean),
            ..StoredProfile::default()
        }
    }

    #[derive(Clone, Default)]
    struct LogBuffer(Arc<Mutex<Vec<u8>>>);

    impl io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    /// Run `f` under a subscriber that records every level
    fn capture_logs(f: impl FnOnce()) -> String {
        let buffer = LogBuffer::default();
        let writer = buffer.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::TRACE)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        tracing::subscriber::with_default(subscriber, f);

        let bytes = buffer.0.lock().unwrap().clone();
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn test_threshold_floor_and_multiplier() {
        let matcher = Matcher::default();
        let mut p = profile(vec![0.0]);

        for recommended in [0.0, 0.5, 1.0, 2.0, 2.5] {
            p.recommended_threshold = Some(recommended);
            assert!(matcher.effective_threshold(&p) >= 3.0 - 1e-12);
        }

        p.recommended_threshold = Some(4.0);
        assert!((matcher.effective_threshold(&p) - 4.8).abs() < 1e-12);
    }

    #[test]
    fn test_threshold_sources() {
        let mut p = profile(vec![0.0]);
        p.recommended_threshold = Some(5.0);

        // dynamic mode prefers the profile
        assert!((Matcher::with_threshold(10.0).effective_threshold(&p) - 6.0).abs() < 1e-12);

        let static_only = Matcher::new(MatcherConfig {
            static_threshold: Some(10.0),
            use_dynamic_threshold: false,
            ..MatcherConfig::default()
        });
        assert!((static_only.effective_threshold(&p) - 12.0).abs() < 1e-12);

        // default 2.0 is floored to 2.5
        let bare = profile(vec![0.0]);
        assert!((Matcher::default().effective_threshold(&bare) - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_confidence() {
        assert_eq!(confidence(1.0, 0.0), 0.0);
        assert!((confidence(1.5, 3.0) - 0.5).abs() < 1e-12);
        assert!((confidence(6.0, 3.0) - 0.5).abs() < 1e-12);
        assert_eq!(confidence(3.0, 3.0), 0.0);
    }

    #[test]
    fn test_exact_match_accepted() {
        let p = profile(vec![1.0, 2.0, 3.0]);
        let outcome = Matcher::default().authenticate(&[1.0, 2.0, 3.0], &p, Metric::Euclidean);

        assert!(outcome.accepted);
        assert_eq!(outcome.distance, 0.0);
        assert!((outcome.confidence - 1.0).abs() < 1e-12);
        assert!((outcome.margin - outcome.threshold).abs() < 1e-12);
    }

    #[test]
    fn test_euclidean_and_manhattan() {
        let p = profile(vec![0.0, 0.0]);
        let matcher = Matcher::default();
        let e = matcher.authenticate(&[3.0, 4.0], &p, Metric::Euclidean);
        let m = matcher.authenticate(&[3.0, 4.0], &p, Metric::Manhattan);

        assert!((e.distance - 5.0).abs() < 1e-12);
        assert!((m.distance - 7.0).abs() < 1e-12);
        assert!(!e.accepted);
        assert!(m.margin < 0.0);
    }

    #[test]
    fn test_mahalanobis_without_covariance_equals_euclidean() {
        let p = profile(vec![0.0, 0.0]);
        let matcher = Matcher::default();
        let e = matcher.authenticate(&[1.0, 2.0], &p, Metric::Euclidean);
        let m = matcher.authenticate(&[1.0, 2.0], &p, Metric::Mahalanobis);
        assert_eq!(e.distance, m.distance);
    }

    #[test]
    fn test_absent_covariance_falls_back_quietly() {
        let p = profile(vec![0.0, 0.0]);
        let logs = capture_logs(|| {
            Matcher::default().authenticate(&[1.0, 2.0], &p, Metric::Mahalanobis);
        });
        assert!(logs.contains("no covariance"), "{}", logs);
        assert!(!logs.contains("WARN"), "{}", logs);
    }

    #[test]
    fn test_misshapen_covariance_warns() {
        let mut p = profile(vec![0.0, 0.0]);
        p.covariance = Some(vec![vec![1.0, 0.0, 0.0]; 3]);
        let logs = capture_logs(|| {
            Matcher::default().authenticate(&[1.0, 2.0], &p, Metric::Mahalanobis);
        });
        assert!(logs.contains("WARN"), "{}", logs);
        assert!(logs.contains("covariance unusable"), "{}", logs);
    }

    #[test]
    fn test_mahalanobis_covariance_dimension_mismatch() {
        let mut p = profile(vec![0.0, 0.0]);
        p.covariance = Some(vec![vec![1.0, 0.0, 0.0]; 3]);
        let matcher = Matcher::default();
        let e = matcher.authenticate(&[1.0, 2.0], &p, Metric::Euclidean);
        let m = matcher.authenticate(&[1.0, 2.0], &p, Metric::Mahalanobis);
        assert_eq!(e.distance, m.distance);
    }

    #[test]
    fn test_mahalanobis_scales_by_variance() {
        let mut p = profile(vec![0.0, 0.0]);
        p.covariance = Some(vec![vec![4.0, 0.0], vec![0.0, 4.0]]);
        let outcome = Matcher::default().authenticate(&[3.0, 4.0], &p, Metric::Mahalanobis);

        // 5 / sqrt(4 + 1e-4)
        let expected = 5.0 / (4.0_f64 + 1e-4).sqrt();
        assert!((outcome.distance - expected).abs() < 1e-9);
    }

    #[test]
    fn test_mahalanobis_singular_covariance_is_regularized() {
        let mut p = profile(vec![0.0, 0.0]);
        p.covariance = Some(vec![vec![0.0, 0.0], vec![0.0, 0.0]]);
        let outcome = Matcher::default().authenticate(&[1e-3, 0.0], &p, Metric::Mahalanobis);
        // (1e-3)^2 / 1e-4 = 1e-2
        assert!((outcome.distance - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_metric_distance_requires_matching_mean() {
        let p = profile(vec![0.0; 3]);
        assert_eq!(Metric::Euclidean.distance(&[0.0; 4], &p, 1e-4), None);
        assert_eq!(Metric::Manhattan.distance(&[1.0; 3], &p, 1e-4), Some(3.0));
        assert_eq!(Metric::Mahalanobis.distance(&[0.0; 3], &StoredProfile::default(), 1e-4), None);
    }

    #[test]
    fn test_missing_mean_is_denied() {
        let result = Matcher::default().authenticate_with_multiple_metrics(
            &[0.0; 4],
            &StoredProfile::default(),
        );

        assert!(!result.final_decision);
        assert_eq!(result.distance(), 999.0);
        assert_eq!(result.threshold(), 0.0);
        assert_eq!(result.euclidean.confidence, 1.0);
        assert_eq!(result.vote_tally, "0/3");
    }

    #[test]
    fn test_mean_dimension_mismatch_is_denied() {
        let p = profile(vec![0.0; 3]);
        let result = Matcher::default().authenticate_with_multiple_metrics(&[0.0; 4], &p);
        assert!(!result.final_decision);
        assert_eq!(result.distance(), 999.0);
    }

    #[test]
    fn test_all_metrics_accept() {
        let p = profile(vec![0.5; 4]);
        let result = Matcher::default().authenticate_with_multiple_metrics(&[0.6; 4], &p);

        assert!(result.final_decision);
        assert_eq!(result.votes, 3);
        assert_eq!(result.vote_tally, "3/3");
        assert!(result.avg_confidence > 0.9);
    }

    #[test]
    fn test_euclidean_with_one_vote_accepts() {
        // euclidean 2.0 and mahalanobis (fallback) 2.0 accept, manhattan 4.0 rejects
        let p = profile(vec![0.0; 4]);
        let result = Matcher::default().authenticate_with_multiple_metrics(&[1.0; 4], &p);

        assert!(result.euclidean.accepted);
        assert!(!result.manhattan.accepted);
        assert_eq!(result.votes, 2);
        assert!(result.final_decision);
    }

    #[test]
    fn test_lone_mahalanobis_vote_is_denied() {
        // Wide covariance keeps mahalanobis small while the others grow
        let mut p = profile(vec![0.0, 0.0]);
        p.covariance = Some(vec![vec![100.0, 0.0], vec![0.0, 100.0]]);
        let matcher = Matcher::with_threshold(2.0);
        let result = matcher.authenticate_with_multiple_metrics(&[2.9, 0.0], &p);

        assert!(result.euclidean.accepted);
        assert!(result.mahalanobis.accepted);
        assert!(result.final_decision);

        let far = matcher.authenticate_with_multiple_metrics(&[10.0, 0.0], &p);
        assert!(!far.euclidean.accepted);
        assert!(!far.manhattan.accepted);
        assert!(far.mahalanobis.accepted);
        assert_eq!(far.votes, 1);
        assert!(!far.final_decision);
    }

    #[test]
    fn test_far_vector_is_denied() {
        let p = profile(vec![0.0; 4]);
        let result = Matcher::default().authenticate_with_multiple_metrics(&[5.0; 4], &p);

        assert!(!result.final_decision);
        assert_eq!(result.votes, 0);
        assert!(result.avg_confidence > 0.0);
    }
}
