//! Rhythm Auth - tap-rhythm biometric authentication engine
//!
//! A user's password is a short Morse sequence; what is authenticated is the
//! personal rhythm with which it is tapped. Samples flow through a
//! deterministic pipeline: quality scoring → feature extraction → gated
//! enrollment → profile storage → multi-metric matching.
//!
//! ## Modules
//!
//! - **Codec**: Morse table, expected pattern of a password, canonical timing
//! - **Features / Quality**: 32-dimensional feature vector and rhythm quality score
//! - **Enrollment / Matcher**: gated profile building and distance voting
//! - **Schema / Store**: versioned profile records and injectable user storage

pub mod codec;
pub mod config;
pub mod enrollment;
pub mod error;
pub mod features;
pub mod matcher;
pub mod pipeline;
pub mod quality;
pub mod schema;
pub mod stats;
pub mod store;
pub mod types;

pub use codec::PatternCodec;
pub use config::AuthConfig;
pub use enrollment::EnrollmentSession;
pub use error::ComputeError;
pub use features::FeatureExtractor;
pub use matcher::Matcher;
pub use pipeline::{authenticate_user, parse_password, Registration, SubmissionOutcome};
pub use quality::RhythmQualityAnalyzer;
pub use store::{
    store_statistics, JsonFileProfileStore, MemoryProfileStore, ProfileStore, StoreStatistics,
    UserRecord,
};

// Schema exports
pub use schema::{decode_profile, StoredProfile, PROFILE_SCHEMA_VERSION};

/// Engine version
pub const RHYTHM_AUTH_VERSION: &str = env!("CARGO_PKG_VERSION");
