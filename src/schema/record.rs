//! rhythm.profile.v1 record definition
//!
//! The canonical document a profile store persists for an enrolled user.
//! Optional fields are omitted when absent rather than written as null.

use crate::types::{BiometricProfile, FeatureVector};
use serde::{Deserialize, Serialize};

/// Current profile schema version
pub const PROFILE_SCHEMA_VERSION: &str = "rhythm.profile.v1";

/// Sentinel distance reported when a profile has no usable mean vector
pub const MISSING_PROFILE_DISTANCE: f64 = 999.0;

/// Persisted profile record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileRecord {
    pub schema_version: String,
    pub mean_vector: Vec<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub std_vector: Option<Vec<f64>>,
    /// Square covariance matrix, row-major
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cov_matrix: Option<Vec<Vec<f64>>>,
    /// Base threshold suggested at enrollment time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommended_threshold: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consistency_score: Option<f64>,
}

/// Profile as the matcher consumes it
///
/// Every field is optional: a stored document may predate the current schema.
/// A missing mean vector is an authentication failure, not a decode error.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoredProfile {
    pub mean: Option<Vec<f64>>,
    pub std: Option<Vec<f64>>,
    pub covariance: Option<Vec<Vec<f64>>>,
    pub recommended_threshold: Option<f64>,
    pub sample_count: Option<usize>,
    pub consistency_score: Option<f64>,
}

impl From<ProfileRecord> for StoredProfile {
    fn from(record: ProfileRecord) -> Self {
        Self {
            mean: Some(record.mean_vector),
            std: record.std_vector,
            covariance: record.cov_matrix,
            recommended_threshold: record.recommended_threshold,
            sample_count: record.sample_count,
            consistency_score: record.consistency_score,
        }
    }
}

impl From<&BiometricProfile> for StoredProfile {
    fn from(profile: &BiometricProfile) -> Self {
        StoredProfile::from(profile.to_record())
    }
}

impl BiometricProfile {
    /// Canonical record for persistence
    pub fn to_record(&self) -> ProfileRecord {
        ProfileRecord {
            schema_version: PROFILE_SCHEMA_VERSION.to_string(),
            mean_vector: self.mean_vector.to_vec(),
            std_vector: None,
            cov_matrix: None,
            recommended_threshold: None,
            sample_count: Some(self.sample_count),
            consistency_score: Some(self.consistency_score),
        }
    }

    /// Rebuild a profile from a canonical record
    ///
    /// Returns `None` when the mean vector does not have the feature dimension.
    pub fn from_record(record: &ProfileRecord) -> Option<Self> {
        Some(Self {
            mean_vector: FeatureVector::from_slice(&record.mean_vector)?,
            sample_count: record.sample_count.unwrap_or(0),
            consistency_score: record.consistency_score.unwrap_or(0.0),
        })
    }
}
