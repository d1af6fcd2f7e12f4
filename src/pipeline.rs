//! Pipeline orchestration
//!
//! Ties the codec, analyzer, extractor, enrollment session, matcher and store
//! together into the two user-facing flows: registering a Morse password with
//! its rhythm, and authenticating a fresh tap sequence against it.
//!
//! Capture sources are outside this crate; both flows take [`TimingSample`]s.

use crate::codec::{PatternCodec, DASH, DOT, UNKNOWN_CHAR};
use crate::config::AuthConfig;
use crate::enrollment::EnrollmentSession;
use crate::error::ComputeError;
use crate::features::FeatureExtractor;
use crate::matcher::Matcher;
use crate::quality::RhythmQualityAnalyzer;
use crate::store::{EnrollmentMetrics, ProfileStore, UserRecord};
use crate::types::{
    AdmissionResult, ExpectedPattern, GateMetrics, MatchResult, QualityScore, TimingSample,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Result of offering one sample to a [`Registration`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionOutcome {
    /// 1-based attempt number, counting rejected samples
    pub attempt: usize,
    pub admission: AdmissionResult,
    pub quality: QualityScore,
    /// True once enough samples have been accepted to finish
    pub complete: bool,
}

/// In-progress registration of one user
///
/// Nothing is reserved in the store while samples are collected; the username
/// is checked on creation and again in [`Registration::finish`].
#[derive(Debug, Clone)]
pub struct Registration {
    username: String,
    pattern: ExpectedPattern,
    extractor: FeatureExtractor,
    analyzer: RhythmQualityAnalyzer,
    session: EnrollmentSession,
    accepted_scores: Vec<QualityScore>,
    attempts: usize,
}

impl Registration {
    /// Start a registration
    ///
    /// Fails on an empty username, a username already in `store`, or a
    /// password that does not decode to known characters.
    pub fn new(
        username: &str,
        morse_text: &str,
        config: AuthConfig,
        store: &dyn ProfileStore,
    ) -> Result<Self, ComputeError> {
        config.validate()?;

        let username = username.trim();
        if username.is_empty() {
            return Err(ComputeError::MissingField("username".to_string()));
        }
        if store.exists(username)? {
            return Err(ComputeError::UserExists(username.to_string()));
        }

        let pattern = parse_password(morse_text)?;

        tracing::info!(
            username,
            decoded = %pattern.decoded,
            elements = pattern.total_elements,
            "registration started"
        );

        Ok(Self {
            username: username.to_string(),
            pattern,
            extractor: FeatureExtractor::new(config.extractor),
            analyzer: RhythmQualityAnalyzer::new(),
            session: EnrollmentSession::new(config.enrollment),
            accepted_scores: Vec::new(),
            attempts: 0,
        })
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn pattern(&self) -> &ExpectedPattern {
        &self.pattern
    }

    pub fn session(&self) -> &EnrollmentSession {
        &self.session
    }

    pub fn attempts(&self) -> usize {
        self.attempts
    }

    pub fn is_complete(&self) -> bool {
        self.session.is_complete()
    }

    /// Analyze, extract and offer one sample
    ///
    /// An empty sample is [`ComputeError::NoInput`] and does not count as an
    /// attempt. Gate rejections are reported in the outcome.
    pub fn submit(&mut self, sample: &TimingSample) -> Result<SubmissionOutcome, ComputeError> {
        if sample.is_empty() {
            return Err(ComputeError::NoInput);
        }
        self.attempts += 1;

        let quality = self
            .analyzer
            .analyze(&sample.presses, &sample.gaps, &self.pattern);
        let vector = self.extractor.extract(&sample.presses, &sample.gaps);
        let admission = self.session.add(vector, &GateMetrics::from(&quality));

        if admission.is_accepted() {
            self.accepted_scores.push(quality.clone());
        }

        Ok(SubmissionOutcome {
            attempt: self.attempts,
            admission,
            quality,
            complete: self.session.is_complete(),
        })
    }

    /// Build the profile and save the user record
    pub fn finish(self, store: &mut dyn ProfileStore) -> Result<UserRecord, ComputeError> {
        if !self.session.is_complete() {
            return Err(ComputeError::EnrollmentIncomplete {
                collected: self.session.sample_count(),
                required: self.session.min_samples(),
            });
        }
        if store.exists(&self.username)? {
            return Err(ComputeError::UserExists(self.username));
        }

        let profile = self.session.build_profile()?;
        let record = UserRecord {
            user_id: Uuid::new_v4().to_string(),
            username: self.username,
            created_at: Utc::now(),
            decoded_word: self.pattern.decoded,
            morse_code: self.pattern.morse_code,
            pattern_count: self.pattern.pattern_count,
            total_elements: self.pattern.total_elements,
            biometric_profile: serde_json::to_value(profile.to_record())?,
            enrollment_metrics: average_metrics(&self.accepted_scores),
            last_updated: None,
        };

        store.save(record.clone())?;
        tracing::info!(
            username = %record.username,
            user_id = %record.user_id,
            samples = profile.sample_count,
            "registration complete"
        );
        Ok(record)
    }
}

/// Authenticate a tap sequence against a stored user
///
/// Unknown users and empty samples are errors; a profile that cannot be
/// matched is a denial.
pub fn authenticate_user(
    store: &dyn ProfileStore,
    username: &str,
    sample: &TimingSample,
    config: &AuthConfig,
) -> Result<MatchResult, ComputeError> {
    let username = username.trim();
    let record = store
        .get(username)?
        .ok_or_else(|| ComputeError::UserNotFound(username.to_string()))?;

    if sample.is_empty() {
        return Err(ComputeError::NoInput);
    }

    let profile = record.profile()?;
    let vector = FeatureExtractor::new(config.extractor).extract(&sample.presses, &sample.gaps);
    let result =
        Matcher::new(config.matcher).authenticate_with_multiple_metrics(vector.as_slice(), &profile);

    tracing::info!(
        username,
        granted = result.final_decision,
        votes = %result.vote_tally,
        "authentication"
    );
    Ok(result)
}

/// Check a typed password before capture
///
/// Em dashes count as dashes. Every group must consist of dots and dashes
/// only, so word separators are refused, and must decode to a known
/// character. Returns the parsed pattern, or an error naming the first bad
/// group.
pub fn parse_password(morse_text: &str) -> Result<ExpectedPattern, ComputeError> {
    let pattern = PatternCodec::parse(morse_text);
    if pattern.pattern_count == 0 {
        return Err(ComputeError::InvalidPattern("empty password".to_string()));
    }
    if let Some(group) = pattern
        .groups
        .iter()
        .find(|group| group.chars().any(|c| c != DOT && c != DASH))
    {
        return Err(ComputeError::InvalidPattern(format!(
            "group '{}' may only contain '{}' and '{}'",
            group, DOT, DASH
        )));
    }
    match pattern
        .groups
        .iter()
        .find(|group| PatternCodec::decode_group(group).is_none())
    {
        Some(group) => Err(ComputeError::InvalidPattern(format!(
            "unknown group '{}' decodes to '{}'",
            group, UNKNOWN_CHAR
        ))),
        None => Ok(pattern),
    }
}

/// Mean of the accepted scores, rounded to 4 decimals
fn average_metrics(scores: &[QualityScore]) -> EnrollmentMetrics {
    if scores.is_empty() {
        return EnrollmentMetrics::default();
    }
    let n = scores.len() as f64;
    let avg = |f: fn(&QualityScore) -> f64| round4(scores.iter().map(f).sum::<f64>() / n);

    EnrollmentMetrics {
        overall_score: avg(|s| s.overall_score),
        tempo_consistency: avg(|s| s.tempo_consistency),
        pattern_accuracy: avg(|s| s.pattern_accuracy),
        timing_precision: avg(|s| s.timing_precision),
    }
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryProfileStore;
    use crate::types::RejectionReason;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    const SOS: &str = "... --- ...";

    fn sos_sample(scale: f64) -> TimingSample {
        let presses = [0.1, 0.1, 0.1, 0.3, 0.3, 0.3, 0.1, 0.1, 0.1];
        let gaps = [0.1, 0.1, 0.15, 0.1, 0.1, 0.15, 0.1, 0.1];
        TimingSample::new(
            presses.iter().map(|p| p * scale).collect(),
            gaps.iter().map(|g| g * scale).collect(),
        )
    }

    /// Dashes where dots should be
    fn mismatched_sample() -> TimingSample {
        TimingSample::new(
            vec![0.3, 0.3, 0.3, 0.1, 0.1, 0.1, 0.3, 0.3, 0.3],
            vec![0.1; 8],
        )
    }

    fn enroll(store: &mut MemoryProfileStore, username: &str) -> UserRecord {
        let mut registration =
            Registration::new(username, SOS, AuthConfig::default(), store).unwrap();
        for scale in [1.0, 1.02, 0.98] {
            let outcome = registration.submit(&sos_sample(scale)).unwrap();
            assert!(outcome.admission.is_accepted(), "{:?}", outcome);
        }
        assert!(registration.is_complete());
        registration.finish(store).unwrap()
    }

    #[test]
    fn test_registration_saves_record() {
        let mut store = MemoryProfileStore::new();
        let record = enroll(&mut store, "alice");

        assert_eq!(record.decoded_word, "SOS");
        assert_eq!(record.morse_code, SOS);
        assert_eq!(record.pattern_count, 3);
        assert_eq!(record.total_elements, 9);
        assert_eq!(record.enrollment_metrics.pattern_accuracy, 1.0);
        assert!(Uuid::parse_str(&record.user_id).is_ok());
        assert_eq!(
            record.biometric_profile["schema_version"],
            json!("rhythm.profile.v1")
        );
        assert_eq!(store.get("alice").unwrap(), Some(record));
    }

    #[test]
    fn test_registration_refusals() {
        let mut store = MemoryProfileStore::new();
        enroll(&mut store, "alice");
        let config = AuthConfig::default();

        assert!(matches!(
            Registration::new("  ", SOS, config, &store),
            Err(ComputeError::MissingField(_))
        ));
        assert!(matches!(
            Registration::new("alice", SOS, config, &store),
            Err(ComputeError::UserExists(_))
        ));
        assert!(matches!(
            Registration::new("bob", "... -------- ...", config, &store),
            Err(ComputeError::InvalidPattern(_))
        ));
        assert!(matches!(
            Registration::new("bob", "   ", config, &store),
            Err(ComputeError::InvalidPattern(_))
        ));
    }

    #[test]
    fn test_rejected_samples_are_counted_but_not_kept() {
        let store = MemoryProfileStore::new();
        let mut registration =
            Registration::new("carol", SOS, AuthConfig::default(), &store).unwrap();

        let outcome = registration.submit(&mismatched_sample()).unwrap();
        assert_eq!(outcome.attempt, 1);
        assert_eq!(
            outcome.admission.rejection_reason,
            Some(RejectionReason::PatternMismatch)
        );
        assert_eq!(registration.session().sample_count(), 0);

        assert!(matches!(
            registration.submit(&TimingSample::default()),
            Err(ComputeError::NoInput)
        ));
        assert_eq!(registration.attempts(), 1);
    }

    #[test]
    fn test_finish_requires_completion() {
        let mut store = MemoryProfileStore::new();
        let mut registration =
            Registration::new("dave", SOS, AuthConfig::default(), &store).unwrap();
        registration.submit(&sos_sample(1.0)).unwrap();

        let err = registration.finish(&mut store).unwrap_err();
        assert!(matches!(
            err,
            ComputeError::EnrollmentIncomplete {
                collected: 1,
                required: 3
            }
        ));
        assert!(!store.exists("dave").unwrap());
    }

    #[test]
    fn test_genuine_attempt_is_granted() {
        let mut store = MemoryProfileStore::new();
        enroll(&mut store, "alice");

        let result =
            authenticate_user(&store, "alice", &sos_sample(1.0), &AuthConfig::default()).unwrap();
        assert!(result.final_decision, "{:?}", result);
        assert!(result.euclidean.accepted);
    }

    #[test]
    fn test_different_rhythm_is_farther() {
        let mut store = MemoryProfileStore::new();
        enroll(&mut store, "alice");
        let config = AuthConfig::default();

        let genuine = authenticate_user(&store, "alice", &sos_sample(1.0), &config).unwrap();
        let impostor = TimingSample::new(
            vec![0.4, 0.05, 0.9, 0.05, 1.2, 0.05, 0.6, 0.08, 0.3],
            vec![0.9, 0.02, 1.5, 0.3, 0.01, 2.0, 0.05, 0.7],
        );
        let other = authenticate_user(&store, "alice", &impostor, &config).unwrap();
        assert!(other.distance() > genuine.distance());
    }

    #[test]
    fn test_authenticate_errors() {
        let mut store = MemoryProfileStore::new();
        enroll(&mut store, "alice");
        let config = AuthConfig::default();

        assert!(matches!(
            authenticate_user(&store, "nobody", &sos_sample(1.0), &config),
            Err(ComputeError::UserNotFound(_))
        ));
        assert!(matches!(
            authenticate_user(&store, "alice", &TimingSample::default(), &config),
            Err(ComputeError::NoInput)
        ));
    }

    #[test]
    fn test_profile_without_mean_is_denied() {
        let mut store = MemoryProfileStore::new();
        let mut record = enroll(&mut store, "alice");
        record.biometric_profile = json!({ "sample_count": 3 });
        store.save(record).unwrap();

        let result =
            authenticate_user(&store, "alice", &sos_sample(1.0), &AuthConfig::default()).unwrap();
        assert!(!result.final_decision);
        assert_eq!(result.distance(), 999.0);
    }

    #[test]
    fn test_parse_password() {
        assert_eq!(parse_password("... --- ...").unwrap().decoded, "SOS");
        assert!(matches!(
            parse_password(".- ......."),
            Err(ComputeError::InvalidPattern(msg)) if msg.contains(".......")
        ));
    }

    #[test]
    fn test_parse_password_accepts_em_dashes() {
        let pattern = parse_password("... \u{2014}\u{2014}\u{2014} ...").unwrap();
        assert_eq!(pattern.decoded, "SOS");
        assert_eq!(pattern.morse_code, SOS);
        assert_eq!(pattern.total_elements, 9);
    }

    #[test]
    fn test_parse_password_refuses_non_morse_groups() {
        for text in ["/", "... / ...", ".-x", "abc"] {
            assert!(
                matches!(parse_password(text), Err(ComputeError::InvalidPattern(_))),
                "accepted {:?}",
                text
            );
        }

        let store = MemoryProfileStore::new();
        assert!(matches!(
            Registration::new("erin", "/", AuthConfig::default(), &store),
            Err(ComputeError::InvalidPattern(_))
        ));
    }

    #[test]
    fn test_average_metrics_rounding() {
        let score = |overall| QualityScore {
            overall_score: overall,
            ..QualityScore::empty()
        };
        let metrics = average_metrics(&[score(0.81234), score(0.81238)]);
        assert_eq!(metrics.overall_score, 0.8124);
        assert_eq!(average_metrics(&[]), EnrollmentMetrics::default());
    }
}
