//! Tender aggregate
//!
//! The tender is the unit of workflow ownership: all lifecycle transitions
//! produce a new `Tender` value and are persisted with an optimistic version
//! check. The aggregate itself never mutates in place outside of the
//! transition functions in [`crate::workflow`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::error::{ProcurementError, Result};
use crate::types::{
    Timestamp, TenderId, TenderStatus, VendorId, FINAL_WORKFLOW_STEP,
};

/// A public tender moving through the procurement workflow
///
/// # Invariants
///
/// - `workflow_step` lies in `1..=6` and never decreases
/// - `noc_approved` implies `noc_requested`
/// - `noc_requested` implies `evaluation_completed`
/// - an awarded (or completed) tender has an approved NOC and an awarded vendor
/// - `bids_received` equals the number of distinct bidders
///
/// Violations are reported by [`Tender::check_invariants`] and are never
/// repaired automatically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tender {
    pub id: TenderId,
    pub title: String,
    pub status: TenderStatus,
    pub workflow_step: u8,

    /// End of the bidding window
    pub close_date: Timestamp,

    pub bids_received: u32,
    pub bidders: BTreeSet<VendorId>,

    pub evaluation_completed: bool,

    pub noc_requested: bool,
    pub noc_requested_at: Option<Timestamp>,
    pub noc_approved: bool,
    pub noc_approved_at: Option<Timestamp>,

    pub awarded_vendor_id: Option<VendorId>,
    pub award_amount: Option<f64>,
    pub awarded_at: Option<Timestamp>,

    pub completed_at: Option<Timestamp>,
    pub cancelled_at: Option<Timestamp>,

    /// Optimistic concurrency version, bumped by the repository on each write
    pub version: u64,

    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Parameters for creating a tender in `Draft`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTender {
    /// Explicit id; generated when absent
    #[serde(default)]
    pub id: Option<TenderId>,
    pub title: String,
    pub close_date: Timestamp,
}

impl NewTender {
    pub fn new(title: impl Into<String>, close_date: Timestamp) -> Self {
        Self {
            id: None,
            title: title.into(),
            close_date,
        }
    }

    pub fn with_id(mut self, id: impl Into<TenderId>) -> Self {
        self.id = Some(id.into());
        self
    }
}

/// Read model returned by `get_tender_state`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenderState {
    pub status: TenderStatus,
    pub workflow_step: u8,
}

impl Tender {
    /// Create a draft tender at workflow step 1
    pub fn draft(new: NewTender, now: Timestamp) -> Self {
        Self {
            id: new.id.unwrap_or_else(TenderId::generate),
            title: new.title,
            status: TenderStatus::Draft,
            workflow_step: 1,
            close_date: new.close_date,
            bids_received: 0,
            bidders: BTreeSet::new(),
            evaluation_completed: false,
            noc_requested: false,
            noc_requested_at: None,
            noc_approved: false,
            noc_approved_at: None,
            awarded_vendor_id: None,
            award_amount: None,
            awarded_at: None,
            completed_at: None,
            cancelled_at: None,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn state(&self) -> TenderState {
        TenderState {
            status: self.status,
            workflow_step: self.workflow_step,
        }
    }

    /// Verify the aggregate's invariants
    ///
    /// # Errors
    ///
    /// Returns `InconsistentState` describing the first violation found.
    pub fn check_invariants(&self) -> Result<()> {
        let violation = |reason: String| {
            Err(ProcurementError::InconsistentState {
                tender_id: self.id.clone(),
                reason,
            })
        };

        if !(1..=FINAL_WORKFLOW_STEP).contains(&self.workflow_step) {
            return violation(format!("workflow step {} out of range", self.workflow_step));
        }
        if let Some(expected) = self.status.workflow_step() {
            if self.workflow_step != expected {
                return violation(format!(
                    "status {} implies step {}, found {}",
                    self.status, expected, self.workflow_step
                ));
            }
        }
        if self.noc_approved && !self.noc_requested {
            return violation("NOC approved without having been requested".into());
        }
        if self.noc_requested && !self.evaluation_completed {
            return violation("NOC requested before evaluation completed".into());
        }
        if matches!(
            self.status,
            TenderStatus::ContractAwarded | TenderStatus::Completed
        ) && (!self.noc_approved || self.awarded_vendor_id.is_none())
        {
            return violation(format!(
                "status {} without an approved NOC and awarded vendor",
                self.status
            ));
        }
        if self.bids_received as usize != self.bidders.len() {
            return violation(format!(
                "bids received {} disagrees with {} recorded bidders",
                self.bids_received,
                self.bidders.len()
            ));
        }
        Ok(())
    }
}
