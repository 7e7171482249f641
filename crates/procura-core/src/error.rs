//! Error types for Procura Core
//!
//! This module defines all error types used by the workflow controller, the
//! evaluation aggregator and the consensus engine.
//! We use `thiserror` for ergonomic error definitions with automatic Display/Error implementations.

use thiserror::Error;

use crate::types::{EvaluatorId, TenderId, TenderStatus, VendorId};

/// Result type alias for Procura operations
pub type Result<T> = std::result::Result<T, ProcurementError>;

/// Main error type for Procura operations
///
/// Every rejected command maps onto one of these variants. None of them is
/// produced after a partial write: the aggregate is either fully transitioned
/// or untouched.
#[derive(Error, Debug)]
pub enum ProcurementError {
    /// The command's precondition on the tender state was not met
    #[error("Invalid transition on tender {tender_id}: cannot {command} while {status}: {reason}")]
    InvalidTransition {
        tender_id: TenderId,
        command: &'static str,
        status: TenderStatus,
        reason: String,
    },

    /// A score submission or score-level command was rejected at the boundary
    #[error("Invalid score: {0}")]
    InvalidScore(#[from] ScoreError),

    /// `complete_evaluation` was invoked before every submission arrived
    #[error("Quorum not met on tender {tender_id}: {completed}/{required} completed submissions")]
    QuorumNotMet {
        tender_id: TenderId,
        completed: usize,
        required: usize,
    },

    /// Optimistic version check failed; re-read and retry
    #[error("Write conflict on {entity} {id}: expected version {expected}, found {actual}")]
    WriteConflict {
        entity: &'static str,
        id: String,
        expected: u64,
        actual: u64,
    },

    /// A stored aggregate violates an invariant; requires manual correction
    #[error("Inconsistent state on tender {tender_id}: {reason}")]
    InconsistentState { tender_id: TenderId, reason: String },

    #[error("Tender not found: {0}")]
    TenderNotFound(TenderId),

    #[error("Tender already exists: {0}")]
    TenderAlreadyExists(TenderId),

    #[error("Vendor not found: {0}")]
    VendorNotFound(VendorId),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Configuration parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Reasons a score submission (or flag/justification) is rejected
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScoreError {
    #[error("criterion '{criterion}' scored {value}, must be within [0, {max}]")]
    OutOfRange {
        criterion: String,
        value: f64,
        max: f64,
    },

    #[error("no {0} criteria supplied")]
    EmptyCriteria(&'static str),

    #[error("score from {evaluator} for {vendor} is already completed")]
    AlreadyCompleted {
        evaluator: EvaluatorId,
        vendor: VendorId,
    },

    #[error("evaluator {0} is not assigned to this tender")]
    UnassignedEvaluator(EvaluatorId),

    #[error("vendor {0} is not under evaluation on this tender")]
    UnknownVendor(VendorId),

    #[error("no submission from {evaluator} for {vendor}")]
    NotSubmitted {
        evaluator: EvaluatorId,
        vendor: VendorId,
    },

    #[error("submission from {evaluator} for {vendor} is not flagged")]
    NotFlagged {
        evaluator: EvaluatorId,
        vendor: VendorId,
    },

    #[error("vendor {0} has no completed, unflagged scores")]
    NoContributingScores(VendorId),

    #[error("evaluator {0} does not chair this evaluation panel")]
    NotChair(EvaluatorId),

    #[error("a non-empty {0} is required")]
    MissingReason(&'static str),
}

impl ProcurementError {
    /// Whether retrying the same command later can succeed without any
    /// change on the caller's side other than re-reading state
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::QuorumNotMet { .. } | Self::WriteConflict { .. })
    }

    /// Short machine-readable kind, used for structured rejection reasons
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::InvalidScore(_) => "invalid_score",
            Self::QuorumNotMet { .. } => "quorum_not_met",
            Self::WriteConflict { .. } => "write_conflict",
            Self::InconsistentState { .. } => "inconsistent_state",
            Self::TenderNotFound(_) => "tender_not_found",
            Self::TenderAlreadyExists(_) => "tender_already_exists",
            Self::VendorNotFound(_) => "vendor_not_found",
            Self::InvalidConfig(_) | Self::ConfigParse(_) => "invalid_config",
            Self::Serialization(_) => "serialization",
            Self::Io(_) => "io",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_kinds() {
        let conflict = ProcurementError::WriteConflict {
            entity: "tender",
            id: "t-1".into(),
            expected: 3,
            actual: 4,
        };
        assert!(conflict.is_retryable());
        assert_eq!(conflict.kind(), "write_conflict");

        let invalid = ProcurementError::InvalidTransition {
            tender_id: TenderId::from("t-1"),
            command: "award",
            status: TenderStatus::Evaluation,
            reason: "NOC has not been approved".into(),
        };
        assert!(!invalid.is_retryable());
        assert!(invalid.to_string().contains("cannot award while Evaluation"));
    }

    #[test]
    fn test_score_error_converts() {
        let err: ProcurementError = ScoreError::EmptyCriteria("technical").into();
        assert_eq!(err.kind(), "invalid_score");
        assert!(err.to_string().contains("no technical criteria"));
    }
}
