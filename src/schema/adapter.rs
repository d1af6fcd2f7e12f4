//! Decoding stored profile documents
//!
//! Documents carrying `schema_version` are decoded strictly against that
//! version. Documents without it are legacy imports: the mean vector may be
//! stored as `mean` or `mean_vector`, the deviation vector as `std`,
//! `std_vector` or `std_dev`. Unknown fields are ignored and malformed optional
//! fields are dropped.

use crate::error::ComputeError;
use crate::schema::record::{ProfileRecord, StoredProfile, PROFILE_SCHEMA_VERSION};
use serde_json::Value;

const LEGACY_MEAN_KEYS: &[&str] = &["mean", "mean_vector"];
const LEGACY_STD_KEYS: &[&str] = &["std", "std_vector", "std_dev"];

/// Adapter from stored JSON documents to [`StoredProfile`]
pub struct ProfileAdapter;

impl ProfileAdapter {
    /// Parse and decode a profile JSON string
    pub fn parse(json: &str) -> Result<StoredProfile, ComputeError> {
        let value: Value = serde_json::from_str(json)?;
        Self::decode(&value)
    }

    /// Decode a profile document
    pub fn decode(value: &Value) -> Result<StoredProfile, ComputeError> {
        let object = value.as_object().ok_or_else(|| {
            ComputeError::InvalidProfile("profile document must be a JSON object".to_string())
        })?;

        match object.get("schema_version") {
            Some(Value::String(version)) if version == PROFILE_SCHEMA_VERSION => {
                let record: ProfileRecord = serde_json::from_value(value.clone())?;
                Ok(record.into())
            }
            Some(other) => Err(ComputeError::UnsupportedSchema(match other {
                Value::String(s) => s.clone(),
                v => v.to_string(),
            })),
            None => {
                tracing::debug!("decoding legacy profile document");
                Ok(decode_legacy(value))
            }
        }
    }
}

/// Decode a profile document; see [`ProfileAdapter::decode`]
pub fn decode_profile(value: &Value) -> Result<StoredProfile, ComputeError> {
    ProfileAdapter::decode(value)
}

fn decode_legacy(value: &Value) -> StoredProfile {
    StoredProfile {
        mean: first_vector(value, LEGACY_MEAN_KEYS),
        std: first_vector(value, LEGACY_STD_KEYS),
        covariance: value.get("cov_matrix").and_then(as_matrix),
        recommended_threshold: value.get("recommended_threshold").and_then(as_number),
        sample_count: value
            .get("sample_count")
            .and_then(as_number)
            .filter(|n| *n >= 0.0)
            .map(|n| n as usize),
        consistency_score: value.get("consistency_score").and_then(as_number),
    }
}

/// First key holding a numeric array
fn first_vector(value: &Value, keys: &[&str]) -> Option<Vec<f64>> {
    keys.iter().find_map(|key| value.get(*key).and_then(as_vector))
}

fn as_vector(value: &Value) -> Option<Vec<f64>> {
    value.as_array()?.iter().map(as_number).collect()
}

fn as_matrix(value: &Value) -> Option<Vec<Vec<f64>>> {
    value.as_array()?.iter().map(as_vector).collect()
}

/// Numbers, or strings holding numbers
fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_decode_v1() {
        let profile = ProfileAdapter::decode(&json!({
            "schema_version": "rhythm.profile.v1",
            "mean_vector": [1.0, 2.0],
            "recommended_threshold": 1.5,
            "sample_count": 3
        }))
        .unwrap();

        assert_eq!(profile.mean, Some(vec![1.0, 2.0]));
        assert_eq!(profile.recommended_threshold, Some(1.5));
        assert_eq!(profile.sample_count, Some(3));
        assert_eq!(profile.covariance, None);
    }

    #[test]
    fn test_v1_requires_mean_vector() {
        let result = ProfileAdapter::decode(&json!({
            "schema_version": "rhythm.profile.v1",
            "mean": [1.0]
        }));
        assert!(matches!(result, Err(ComputeError::JsonError(_))));
    }

    #[test]
    fn test_unknown_version_rejected() {
        let result = ProfileAdapter::decode(&json!({
            "schema_version": "rhythm.profile.v9",
            "mean_vector": [1.0]
        }));
        assert!(matches!(result, Err(ComputeError::UnsupportedSchema(v)) if v == "rhythm.profile.v9"));
    }

    #[test]
    fn test_legacy_mean_vector_key() {
        let profile = ProfileAdapter::decode(&json!({
            "mean_vector": [0.5, 0.25],
            "sample_count": 3.0,
            "consistency_score": 0.9,
            "created_at": "Mon Jan 15 10:00:00 2024"
        }))
        .unwrap();

        assert_eq!(profile.mean, Some(vec![0.5, 0.25]));
        assert_eq!(profile.sample_count, Some(3));
        assert_eq!(profile.consistency_score, Some(0.9));
    }

    #[test]
    fn test_legacy_prefers_mean_over_mean_vector() {
        let profile = ProfileAdapter::decode(&json!({
            "mean": [1.0],
            "mean_vector": [2.0]
        }))
        .unwrap();
        assert_eq!(profile.mean, Some(vec![1.0]));
    }

    #[test]
    fn test_legacy_std_aliases() {
        let std_dev = ProfileAdapter::decode(&json!({ "mean": [0.0], "std_dev": [0.1] })).unwrap();
        assert_eq!(std_dev.std, Some(vec![0.1]));

        let both = ProfileAdapter::decode(&json!({
            "mean": [0.0],
            "std_vector": [0.2],
            "std": [0.3]
        }))
        .unwrap();
        assert_eq!(both.std, Some(vec![0.3]));
    }

    #[test]
    fn test_legacy_tolerates_missing_and_malformed_fields() {
        let profile = ProfileAdapter::decode(&json!({
            "mean": ["a", "b"],
            "cov_matrix": "not a matrix",
            "recommended_threshold": "2.75"
        }))
        .unwrap();

        assert_eq!(profile.mean, None);
        assert_eq!(profile.covariance, None);
        assert_eq!(profile.recommended_threshold, Some(2.75));
    }

    #[test]
    fn test_empty_document_has_no_mean() {
        let profile = ProfileAdapter::parse("{}").unwrap();
        assert_eq!(profile, StoredProfile::default());
    }

    #[test]
    fn test_non_object_rejected() {
        assert!(matches!(
            ProfileAdapter::parse("[1, 2, 3]"),
            Err(ComputeError::InvalidProfile(_))
        ));
    }
}
