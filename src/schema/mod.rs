//! Stored profile schema
//!
//! This module defines the canonical `rhythm.profile.v1` record and the decode
//! step that turns stored documents, including legacy ones, into the profile
//! shape the matcher consumes.

mod adapter;
mod record;

pub use adapter::*;
pub use record::*;
