//! Core types for Procura
//!
//! This module defines the fundamental types shared across the crate:
//! - Identifiers (tender, evaluator, vendor)
//! - Timestamps
//! - Tender lifecycle status and workflow steps
//! - Score submission status and variance levels

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Borrow the raw identifier
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

string_id!(
    /// Unique tender identifier
    TenderId
);
string_id!(
    /// Committee member identifier
    EvaluatorId
);
string_id!(
    /// Bidding vendor (company) identifier
    VendorId
);

impl TenderId {
    /// Generate a fresh identifier
    pub fn generate() -> Self {
        Self(format!("tender:{}", Uuid::new_v4()))
    }
}

/// Timestamp type alias
pub type Timestamp = DateTime<Utc>;

/// Create a timestamp for the current moment
pub fn now() -> Timestamp {
    Utc::now()
}

/// Round to one decimal place, half away from zero
pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Workflow step of the final stage (NOC approved and beyond)
pub const FINAL_WORKFLOW_STEP: u8 = 6;

/// Tender lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TenderStatus {
    Draft,
    Published,
    /// Bidding window closed, awaiting evaluation
    Bidding,
    Evaluation,
    NocRequested,
    NocApproved,
    ContractAwarded,
    Completed,
    Cancelled,
}

impl TenderStatus {
    /// Workflow step (1-6) that a tender in this status has reached
    ///
    /// `Cancelled` has no step of its own; a cancelled tender keeps the step
    /// it was cancelled at, so this returns `None`.
    pub fn workflow_step(self) -> Option<u8> {
        use TenderStatus::*;
        match self {
            Draft => Some(1),
            Published => Some(2),
            Bidding => Some(3),
            Evaluation => Some(4),
            NocRequested => Some(5),
            NocApproved | ContractAwarded | Completed => Some(FINAL_WORKFLOW_STEP),
            Cancelled => None,
        }
    }

    pub fn can_transition_to(self, next: TenderStatus) -> bool {
        use TenderStatus::*;
        match (self, next) {
            (s, Cancelled) => !s.is_terminal(),
            (Draft, Published) => true,
            (Published, Bidding) => true,
            (Bidding, Evaluation) => true,
            (Evaluation, Evaluation) => true,
            (Evaluation, NocRequested) => true,
            (NocRequested, NocApproved) => true,
            (NocApproved, ContractAwarded) => true,
            (ContractAwarded, Completed) => true,
            _ => false,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, TenderStatus::Completed | TenderStatus::Cancelled)
    }
}

impl fmt::Display for TenderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Status of one evaluator's submission for one vendor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoreStatus {
    /// Draft, may still be overwritten
    Pending,
    /// Final; counts toward quorum and consensus
    Completed,
    /// Held back for review; excluded from quorum and consensus
    Flagged,
}

impl fmt::Display for ScoreStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Spread classification of the evaluators' totals for one vendor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VarianceLevel {
    Low,
    Medium,
    High,
}

impl fmt::Display for VarianceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}
