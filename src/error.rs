//! Error types for Rhythm Auth

use thiserror::Error;

/// Errors that can occur outside the numeric core
///
/// Degenerate timing statistics never produce an error; they fall back to
/// defined values. These variants cover configuration, storage, schema decoding
/// and the few hard preconditions of the enrollment flow.
#[derive(Debug, Error)]
pub enum ComputeError {
    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid TOML: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Unsupported profile schema: {0}")]
    UnsupportedSchema(String),

    #[error("Invalid profile record: {0}")]
    InvalidProfile(String),

    #[error("Cannot build a profile without accepted samples")]
    EmptyEnrollment,

    #[error("Enrollment incomplete: {collected} of {required} samples accepted")]
    EnrollmentIncomplete { collected: usize, required: usize },

    #[error("Invalid Morse password: {0}")]
    InvalidPattern(String),

    #[error("User already exists: {0}")]
    UserExists(String),

    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("No taps captured")]
    NoInput,
}
