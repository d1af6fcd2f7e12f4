//! User profile storage
//!
//! Stores are injected at call sites; nothing in the core holds a global
//! handle. The biometric profile is kept as the raw stored document so legacy
//! records survive a load/save cycle untouched and are only normalized when a
//! match is attempted.

use crate::error::ComputeError;
use crate::schema::{decode_profile, StoredProfile};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

/// Averaged quality of the accepted enrollment samples
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrollmentMetrics {
    pub overall_score: f64,
    pub tempo_consistency: f64,
    pub pattern_accuracy: f64,
    pub timing_precision: f64,
}

/// Everything persisted for one enrolled user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    pub user_id: String,
    pub username: String,
    pub created_at: DateTime<Utc>,
    pub decoded_word: String,
    pub morse_code: String,
    #[serde(default)]
    pub pattern_count: usize,
    #[serde(default)]
    pub total_elements: usize,
    /// Stored profile document, see [`crate::schema`]
    pub biometric_profile: serde_json::Value,
    #[serde(default)]
    pub enrollment_metrics: EnrollmentMetrics,
    /// Set when the profile is replaced after registration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
}

impl UserRecord {
    /// Decode the stored biometric profile
    pub fn profile(&self) -> Result<StoredProfile, ComputeError> {
        decode_profile(&self.biometric_profile)
    }

    /// Summary line for listings
    pub fn summary(&self) -> UserSummary {
        let consistency_score = self
            .biometric_profile
            .get("consistency_score")
            .and_then(serde_json::Value::as_f64)
            .unwrap_or(0.0);

        UserSummary {
            username: self.username.clone(),
            decoded_word: self.decoded_word.clone(),
            created_at: self.created_at,
            pattern_count: self.pattern_count,
            pattern_accuracy: self.enrollment_metrics.pattern_accuracy,
            consistency_score,
        }
    }
}

/// Per-user listing entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSummary {
    pub username: String,
    pub decoded_word: String,
    pub created_at: DateTime<Utc>,
    pub pattern_count: usize,
    pub pattern_accuracy: f64,
    pub consistency_score: f64,
}

/// Aggregate view over every stored user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreStatistics {
    pub total_users: usize,
    pub avg_consistency: f64,
    /// Most frequent `pattern_count`; ties go to the shorter password
    pub most_common_length: usize,
    /// (min, max) consistency score, (0, 0) for an empty store
    pub consistency_range: (f64, f64),
}

/// Summarize all users of a store
pub fn store_statistics(store: &dyn ProfileStore) -> Result<StoreStatistics, ComputeError> {
    let mut summaries = Vec::new();
    for username in store.list()? {
        if let Some(record) = store.get(&username)? {
            summaries.push(record.summary());
        }
    }

    if summaries.is_empty() {
        return Ok(StoreStatistics {
            total_users: 0,
            avg_consistency: 0.0,
            most_common_length: 0,
            consistency_range: (0.0, 0.0),
        });
    }

    let scores: Vec<f64> = summaries.iter().map(|s| s.consistency_score).collect();
    let mut length_counts: BTreeMap<usize, usize> = BTreeMap::new();
    for summary in &summaries {
        *length_counts.entry(summary.pattern_count).or_default() += 1;
    }
    // max_by_key keeps the last maximum, so walk lengths in descending order
    let most_common_length = length_counts
        .iter()
        .rev()
        .max_by_key(|(_, count)| **count)
        .map(|(length, _)| *length)
        .unwrap_or(0);

    Ok(StoreStatistics {
        total_users: summaries.len(),
        avg_consistency: scores.iter().sum::<f64>() / scores.len() as f64,
        most_common_length,
        consistency_range: (
            scores.iter().copied().fold(f64::INFINITY, f64::min),
            scores.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        ),
    })
}

/// Keyed storage of user records
pub trait ProfileStore {
    fn get(&self, username: &str) -> Result<Option<UserRecord>, ComputeError>;

    /// Insert or replace the record under its username
    fn save(&mut self, record: UserRecord) -> Result<(), ComputeError>;

    /// Usernames in ascending order
    fn list(&self) -> Result<Vec<String>, ComputeError>;

    /// Returns whether a record was removed
    fn delete(&mut self, username: &str) -> Result<bool, ComputeError>;

    fn exists(&self, username: &str) -> Result<bool, ComputeError> {
        Ok(self.get(username)?.is_some())
    }

    /// Replace the profile document of an existing user and stamp `last_updated`
    fn update_profile(
        &mut self,
        username: &str,
        profile: serde_json::Value,
    ) -> Result<UserRecord, ComputeError> {
        let mut record = self
            .get(username)?
            .ok_or_else(|| ComputeError::UserNotFound(username.to_string()))?;
        record.biometric_profile = profile;
        record.last_updated = Some(Utc::now());
        self.save(record.clone())?;
        tracing::info!(username, "updated biometric profile");
        Ok(record)
    }
}

/// In-process store
#[derive(Debug, Clone, Default)]
pub struct MemoryProfileStore {
    users: HashMap<String, UserRecord>,
}

impl MemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

impl ProfileStore for MemoryProfileStore {
    fn get(&self, username: &str) -> Result<Option<UserRecord>, ComputeError> {
        Ok(self.users.get(username).cloned())
    }

    fn save(&mut self, record: UserRecord) -> Result<(), ComputeError> {
        self.users.insert(record.username.clone(), record);
        Ok(())
    }

    fn list(&self) -> Result<Vec<String>, ComputeError> {
        let mut names: Vec<String> = self.users.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    fn delete(&mut self, username: &str) -> Result<bool, ComputeError> {
        Ok(self.users.remove(username).is_some())
    }

    fn exists(&self, username: &str) -> Result<bool, ComputeError> {
        Ok(self.users.contains_key(username))
    }
}

/// Store backed by a single JSON document keyed by username
///
/// The whole document is loaded on open and rewritten on every change. Writes
/// go to a sibling temp file which is then renamed over the original; the
/// in-memory map only changes once that write succeeded.
#[derive(Debug)]
pub struct JsonFileProfileStore {
    path: PathBuf,
    users: BTreeMap<String, UserRecord>,
}

impl JsonFileProfileStore {
    /// Open the store at `path`; a missing file is an empty store
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ComputeError> {
        let path = path.as_ref().to_path_buf();
        let users = if path.exists() {
            let contents = fs::read_to_string(&path)?;
            if contents.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&contents)?
            }
        } else {
            BTreeMap::new()
        };

        tracing::debug!(path = %path.display(), users = users.len(), "opened profile store");
        Ok(Self { path, users })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, users: &BTreeMap<String, UserRecord>) -> Result<(), ComputeError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        fs::write(&tmp, serde_json::to_string_pretty(users)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl ProfileStore for JsonFileProfileStore {
    fn get(&self, username: &str) -> Result<Option<UserRecord>, ComputeError> {
        Ok(self.users.get(username).cloned())
    }

    fn save(&mut self, record: UserRecord) -> Result<(), ComputeError> {
        tracing::info!(username = %record.username, "saving user record");
        let mut users = self.users.clone();
        users.insert(record.username.clone(), record);
        self.persist(&users)?;
        self.users = users;
        Ok(())
    }

    fn list(&self) -> Result<Vec<String>, ComputeError> {
        Ok(self.users.keys().cloned().collect())
    }

    fn delete(&mut self, username: &str) -> Result<bool, ComputeError> {
        let mut users = self.users.clone();
        if users.remove(username).is_none() {
            return Ok(false);
        }
        self.persist(&users)?;
        self.users = users;
        tracing::info!(username, "deleted user record");
        Ok(true)
    }

    fn exists(&self, username: &str) -> Result<bool, ComputeError> {
        Ok(self.users.contains_key(username))
    }
}
