//! Procura configuration
//!
//! Scoring weights and variance thresholds encode procurement-policy
//! decisions, so they live here as named defaults instead of literals in the
//! scoring code.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{ProcurementError, Result};

/// Weight of the technical score in an evaluator's total
pub const DEFAULT_TECHNICAL_WEIGHT: f64 = 0.4;
/// Weight of the financial score in an evaluator's total
pub const DEFAULT_FINANCIAL_WEIGHT: f64 = 0.6;
/// Variance below this is `Low`
pub const DEFAULT_LOW_VARIANCE_THRESHOLD: f64 = 25.0;
/// Variance at or above this is `High`
pub const DEFAULT_HIGH_VARIANCE_THRESHOLD: f64 = 100.0;
/// Outlier threshold as a multiple of the sample standard deviation
pub const DEFAULT_OUTLIER_STD_MULTIPLIER: f64 = 1.5;
/// Deviations at or below this many points are never outliers
pub const DEFAULT_OUTLIER_MIN_DEVIATION: f64 = 10.0;
/// Upper bound of a single criterion score
pub const DEFAULT_MAX_CRITERION_SCORE: f64 = 100.0;

/// Main configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcuraConfig {
    /// Scoring and consensus policy
    pub scoring: ScoringPolicy,

    /// Workflow controller settings
    pub workflow: WorkflowSettings,

    /// Audit trail settings
    pub audit: AuditSettings,
}

impl ProcuraConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the scoring policy
    pub fn with_scoring(mut self, scoring: ScoringPolicy) -> Self {
        self.scoring = scoring;
        self
    }

    /// Set the JSON-lines audit log path
    pub fn with_audit_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.audit.jsonl_path = Some(path.into());
        self
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Render as TOML
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| ProcurementError::InvalidConfig(e.to_string()))
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> Result<()> {
        self.scoring.validate()
    }
}

/// Scoring weights, variance bands and outlier policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringPolicy {
    pub technical_weight: f64,
    pub financial_weight: f64,

    /// `variance < low` is Low
    pub low_variance_threshold: f64,

    /// `variance >= high` is High; anything between is Medium
    pub high_variance_threshold: f64,

    /// Multiplier applied to the sample standard deviation
    pub outlier_std_multiplier: f64,

    /// Floor for the outlier threshold, in points
    pub outlier_min_deviation: f64,

    pub max_criterion_score: f64,
}

impl Default for ScoringPolicy {
    fn default() -> Self {
        Self {
            technical_weight: DEFAULT_TECHNICAL_WEIGHT,
            financial_weight: DEFAULT_FINANCIAL_WEIGHT,
            low_variance_threshold: DEFAULT_LOW_VARIANCE_THRESHOLD,
            high_variance_threshold: DEFAULT_HIGH_VARIANCE_THRESHOLD,
            outlier_std_multiplier: DEFAULT_OUTLIER_STD_MULTIPLIER,
            outlier_min_deviation: DEFAULT_OUTLIER_MIN_DEVIATION,
            max_criterion_score: DEFAULT_MAX_CRITERION_SCORE,
        }
    }
}

impl ScoringPolicy {
    /// Set the outlier threshold parameters
    pub fn with_outlier_threshold(mut self, std_multiplier: f64, min_deviation: f64) -> Self {
        self.outlier_std_multiplier = std_multiplier;
        self.outlier_min_deviation = min_deviation;
        self
    }

    /// Set the technical/financial weights
    pub fn with_weights(mut self, technical: f64, financial: f64) -> Self {
        self.technical_weight = technical;
        self.financial_weight = financial;
        self
    }

    pub fn validate(&self) -> Result<()> {
        let weights = [self.technical_weight, self.financial_weight];
        if weights.iter().any(|w| !(0.0..=1.0).contains(w)) {
            return Err(ProcurementError::InvalidConfig(format!(
                "scoring weights must lie in [0, 1], got {:?}",
                weights
            )));
        }
        if ((self.technical_weight + self.financial_weight) - 1.0).abs() > 1e-9 {
            return Err(ProcurementError::InvalidConfig(format!(
                "scoring weights must sum to 1.0, got {} + {}",
                self.technical_weight, self.financial_weight
            )));
        }
        if !(0.0 < self.low_variance_threshold
            && self.low_variance_threshold < self.high_variance_threshold)
        {
            return Err(ProcurementError::InvalidConfig(format!(
                "variance thresholds must satisfy 0 < low < high, got {} / {}",
                self.low_variance_threshold, self.high_variance_threshold
            )));
        }
        if self.outlier_std_multiplier < 0.0 || self.outlier_min_deviation < 0.0 {
            return Err(ProcurementError::InvalidConfig(
                "outlier threshold parameters must be non-negative".into(),
            ));
        }
        if self.max_criterion_score <= 0.0 {
            return Err(ProcurementError::InvalidConfig(
                "max_criterion_score must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Workflow controller settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowSettings {
    /// Reject bids from vendors the registry does not know
    pub require_registered_vendors: bool,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            require_registered_vendors: true,
        }
    }
}

/// Audit trail settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditSettings {
    /// Append audit events to this JSON-lines file
    pub jsonl_path: Option<PathBuf>,
}
