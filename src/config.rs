//! Engine configuration
//!
//! Every tuning constant of the engine is a named field here. Missing fields in
//! a config file take the defaults below, so a partial TOML or JSON document is
//! enough to override a single knob.

use crate::error::ComputeError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Dot/dash split point as a multiple of the base unit
pub const DEFAULT_DOT_DASH_THRESHOLD_RATIO: f64 = 2.0;

pub const DEFAULT_MIN_SAMPLES: usize = 3;
pub const DEFAULT_MAX_SAMPLES: usize = 5;

pub const DEFAULT_MIN_PATTERN_ACCURACY: f64 = 1.0;
pub const DEFAULT_MIN_TIMING_PRECISION: f64 = 0.85;
pub const DEFAULT_MAX_OUTLIER_RATIO: f64 = 0.25;

/// Threshold used when neither the profile nor the caller provides one
pub const DEFAULT_THRESHOLD: f64 = 2.0;

/// Floor under every effective threshold
pub const MIN_THRESHOLD: f64 = 2.5;

/// Multiplier applied after the floor (1.2 = 20% more lenient)
pub const TOLERANCE_MULTIPLIER: f64 = 1.2;

/// Ridge added to the covariance diagonal before inversion
pub const COVARIANCE_REGULARIZATION: f64 = 1e-4;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    pub dot_dash_threshold_ratio: f64,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            dot_dash_threshold_ratio: DEFAULT_DOT_DASH_THRESHOLD_RATIO,
        }
    }
}

/// Hard admission rule for enrollment samples
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityGate {
    pub min_pattern_accuracy: f64,
    pub min_timing_precision: f64,
    pub max_outlier_ratio: f64,
}

impl Default for QualityGate {
    fn default() -> Self {
        Self {
            min_pattern_accuracy: DEFAULT_MIN_PATTERN_ACCURACY,
            min_timing_precision: DEFAULT_MIN_TIMING_PRECISION,
            max_outlier_ratio: DEFAULT_MAX_OUTLIER_RATIO,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrollmentConfig {
    pub min_samples: usize,
    pub max_samples: usize,
    pub gate: QualityGate,
}

impl Default for EnrollmentConfig {
    fn default() -> Self {
        Self {
            min_samples: DEFAULT_MIN_SAMPLES,
            max_samples: DEFAULT_MAX_SAMPLES,
            gate: QualityGate::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherConfig {
    /// Caller-supplied threshold, used when the dynamic one is off or absent
    pub static_threshold: Option<f64>,
    /// Prefer the profile's `recommended_threshold` when present
    pub use_dynamic_threshold: bool,
    pub default_threshold: f64,
    pub min_threshold: f64,
    pub tolerance_multiplier: f64,
    pub regularization: f64,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            static_threshold: None,
            use_dynamic_threshold: true,
            default_threshold: DEFAULT_THRESHOLD,
            min_threshold: MIN_THRESHOLD,
            tolerance_multiplier: TOLERANCE_MULTIPLIER,
            regularization: COVARIANCE_REGULARIZATION,
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub extractor: ExtractorConfig,
    pub enrollment: EnrollmentConfig,
    pub matcher: MatcherConfig,
    /// Relative tolerance for per-character press validation
    pub validation_tolerance: f64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            extractor: ExtractorConfig::default(),
            enrollment: EnrollmentConfig::default(),
            matcher: MatcherConfig::default(),
            validation_tolerance: crate::codec::DEFAULT_VALIDATION_TOLERANCE,
        }
    }
}

impl AuthConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ComputeError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_str(s: &str) -> Result<Self, ComputeError> {
        let config: Self = serde_json::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a `.toml` or `.json` file
    pub fn load(path: &Path) -> Result<Self, ComputeError> {
        let content = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => Self::from_toml_str(&content),
            Some("json") => Self::from_json_str(&content),
            other => Err(ComputeError::InvalidConfig(format!(
                "Unsupported config extension: {}",
                other.unwrap_or("<none>")
            ))),
        }
    }

    pub fn validate(&self) -> Result<(), ComputeError> {
        let enrollment = &self.enrollment;
        if enrollment.min_samples == 0 {
            return Err(ComputeError::InvalidConfig(
                "enrollment.min_samples must be at least 1".to_string(),
            ));
        }
        if enrollment.min_samples > enrollment.max_samples {
            return Err(ComputeError::InvalidConfig(format!(
                "enrollment.min_samples ({}) exceeds max_samples ({})",
                enrollment.min_samples, enrollment.max_samples
            )));
        }
        require_positive(
            "extractor.dot_dash_threshold_ratio",
            self.extractor.dot_dash_threshold_ratio,
        )?;

        let matcher = &self.matcher;
        require_positive("matcher.tolerance_multiplier", matcher.tolerance_multiplier)?;
        require_positive("matcher.default_threshold", matcher.default_threshold)?;
        require_non_negative("matcher.min_threshold", matcher.min_threshold)?;
        require_non_negative("matcher.regularization", matcher.regularization)?;
        if let Some(threshold) = matcher.static_threshold {
            require_positive("matcher.static_threshold", threshold)?;
        }

        let gate = &enrollment.gate;
        require_non_negative("enrollment.gate.min_pattern_accuracy", gate.min_pattern_accuracy)?;
        require_non_negative("enrollment.gate.min_timing_precision", gate.min_timing_precision)?;
        require_non_negative("enrollment.gate.max_outlier_ratio", gate.max_outlier_ratio)?;

        if !(0.0..1.0).contains(&self.validation_tolerance) {
            return Err(ComputeError::InvalidConfig(
                "validation_tolerance must be in [0, 1)".to_string(),
            ));
        }
        Ok(())
    }
}

// NaN fails every comparison, so finiteness is checked first
fn require_positive(name: &str, value: f64) -> Result<(), ComputeError> {
    if !value.is_finite() || value <= 0.0 {
        return Err(ComputeError::InvalidConfig(format!(
            "{} must be a positive finite number, got {}",
            name, value
        )));
    }
    Ok(())
}

fn require_non_negative(name: &str, value: f64) -> Result<(), ComputeError> {
    if !value.is_finite() || value < 0.0 {
        return Err(ComputeError::InvalidConfig(format!(
            "{} must be a non-negative finite number, got {}",
            name, value
        )));
    }
    Ok(())
}
