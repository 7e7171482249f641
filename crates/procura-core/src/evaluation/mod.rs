//! Evaluation aggregator
//!
//! Tracks, for one tender, the evaluation panel, the vendors under
//! evaluation and every evaluator's [`IndividualScore`] per vendor, and
//! decides when evaluation is complete.
//!
//! Like the tender, the aggregate is transformed by pure methods that return
//! a new value; the service persists it with its own optimistic version.
//!
//! # Completion rule
//!
//! Evaluation is complete when every assigned evaluator holds a `Completed`
//! submission for every vendor under evaluation. `Flagged` submissions stay
//! on record but count neither toward quorum nor toward consensus until the
//! flag is resolved.

pub mod score;

pub use score::{IndividualScore, ScoreSheet, ScoreSubmission};

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::config::ScoringPolicy;
use crate::error::ScoreError;
use crate::types::{EvaluatorId, ScoreStatus, TenderId, Timestamp, VendorId};

/// What a submission did to the stored record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmitOutcome {
    Created,
    Updated,
    /// Identical replay; nothing stored
    Unchanged,
}

/// Chair decision forcing consensus for one vendor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusOverride {
    pub vendor_id: VendorId,
    pub chair_id: EvaluatorId,
    pub reason: String,
    pub recorded_at: Timestamp,
}

/// An (evaluator, vendor) pair still lacking a completed submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutstandingScore {
    pub evaluator_id: EvaluatorId,
    pub vendor_id: VendorId,
}

/// Quorum status of a tender's evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuorumReport {
    pub tender_id: TenderId,
    /// Assigned evaluators × vendors under evaluation
    pub required: usize,
    /// Completed, non-flagged submissions from assigned evaluators
    pub completed: usize,
    pub met: bool,
    pub missing: Vec<OutstandingScore>,

    /// Evaluation version the report was computed from
    #[serde(default)]
    pub evaluation_version: u64,
}

/// Evaluation aggregate of one tender
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TenderEvaluation {
    pub tender_id: TenderId,
    pub evaluators: BTreeSet<EvaluatorId>,
    pub chair: Option<EvaluatorId>,
    pub vendors: BTreeSet<VendorId>,
    pub scores: Vec<IndividualScore>,
    pub overrides: Vec<ConsensusOverride>,

    /// Optimistic concurrency version, bumped by the repository on each write
    pub version: u64,
}

impl TenderEvaluation {
    pub fn new(tender_id: TenderId) -> Self {
        Self {
            tender_id,
            evaluators: BTreeSet::new(),
            chair: None,
            vendors: BTreeSet::new(),
            scores: Vec::new(),
            overrides: Vec::new(),
            version: 0,
        }
    }

    /// Replace the evaluation panel
    ///
    /// The chair, when given, must sit on the panel.
    pub fn assign_panel(
        &self,
        evaluators: impl IntoIterator<Item = EvaluatorId>,
        chair: Option<EvaluatorId>,
    ) -> Result<Self, ScoreError> {
        let evaluators: BTreeSet<_> = evaluators.into_iter().collect();
        if let Some(chair) = &chair {
            if !evaluators.contains(chair) {
                return Err(ScoreError::UnassignedEvaluator(chair.clone()));
            }
        }
        let mut next = self.clone();
        next.scores.retain(|s| evaluators.contains(&s.evaluator_id));
        next.evaluators = evaluators;
        next.chair = chair;
        Ok(next)
    }

    /// Set the vendors under evaluation
    pub fn with_vendors(&self, vendors: impl IntoIterator<Item = VendorId>) -> Self {
        let mut next = self.clone();
        next.vendors = vendors.into_iter().collect();
        next
    }

    pub fn score(&self, evaluator: &EvaluatorId, vendor: &VendorId) -> Option<&IndividualScore> {
        self.scores
            .iter()
            .find(|s| &s.evaluator_id == evaluator && &s.vendor_id == vendor)
    }

    fn position(&self, evaluator: &EvaluatorId, vendor: &VendorId) -> Option<usize> {
        self.scores
            .iter()
            .position(|s| s.key() == (evaluator, vendor))
    }

    /// Submit or overwrite an evaluator's score for a vendor
    ///
    /// Overwrites are allowed while the stored score is not `Completed`.
    /// Replaying the stored values returns [`SubmitOutcome::Unchanged`] and
    /// leaves the aggregate untouched.
    pub fn submit(
        &self,
        submission: &ScoreSubmission,
        policy: &ScoringPolicy,
        now: Timestamp,
    ) -> Result<(Self, SubmitOutcome), ScoreError> {
        self.ensure_assigned(&submission.evaluator_id)?;
        self.ensure_vendor(&submission.vendor_id)?;
        submission.sheet.validate(policy)?;

        let existing = self.position(&submission.evaluator_id, &submission.vendor_id);
        if let Some(idx) = existing {
            let stored = &self.scores[idx];
            if stored.status == ScoreStatus::Completed {
                return Err(ScoreError::AlreadyCompleted {
                    evaluator: submission.evaluator_id.clone(),
                    vendor: submission.vendor_id.clone(),
                });
            }
            if stored.matches(submission) {
                return Ok((self.clone(), SubmitOutcome::Unchanged));
            }
        }

        let mut next = self.clone();
        let fresh = IndividualScore::from_submission(submission, policy, now);
        let outcome = match existing {
            Some(idx) => {
                next.scores[idx] = fresh;
                SubmitOutcome::Updated
            }
            None => {
                next.scores.push(fresh);
                SubmitOutcome::Created
            }
        };
        next.drop_override(&submission.vendor_id);
        Ok((next, outcome))
    }

    /// Hold a submission back from quorum and consensus
    pub fn flag(
        &self,
        evaluator: &EvaluatorId,
        vendor: &VendorId,
        reason: &str,
    ) -> Result<Self, ScoreError> {
        if reason.trim().is_empty() {
            return Err(ScoreError::MissingReason("flag reason"));
        }
        let idx = self.require_position(evaluator, vendor)?;
        let mut next = self.clone();
        next.scores[idx].status = ScoreStatus::Flagged;
        next.scores[idx].flag_reason = Some(reason.to_string());
        next.drop_override(vendor);
        Ok(next)
    }

    /// Lift a flag, restoring `Completed` if the score had been finalised
    pub fn resolve_flag(
        &self,
        evaluator: &EvaluatorId,
        vendor: &VendorId,
    ) -> Result<Self, ScoreError> {
        let idx = self.require_position(evaluator, vendor)?;
        if self.scores[idx].status != ScoreStatus::Flagged {
            return Err(ScoreError::NotFlagged {
                evaluator: evaluator.clone(),
                vendor: vendor.clone(),
            });
        }
        let mut next = self.clone();
        let score = &mut next.scores[idx];
        score.status = if score.completed_at.is_some() {
            ScoreStatus::Completed
        } else {
            ScoreStatus::Pending
        };
        score.flag_reason = None;
        next.drop_override(vendor);
        Ok(next)
    }

    /// Attach a written justification to a score
    pub fn justify(
        &self,
        evaluator: &EvaluatorId,
        vendor: &VendorId,
        justification: &str,
    ) -> Result<Self, ScoreError> {
        if justification.trim().is_empty() {
            return Err(ScoreError::MissingReason("justification"));
        }
        let idx = self.require_position(evaluator, vendor)?;
        let mut next = self.clone();
        next.scores[idx].justification = Some(justification.to_string());
        Ok(next)
    }

    /// Record a chair override for one vendor, replacing any earlier one
    pub fn override_consensus(
        &self,
        vendor: &VendorId,
        chair: &EvaluatorId,
        reason: &str,
        now: Timestamp,
    ) -> Result<Self, ScoreError> {
        if self.chair.as_ref() != Some(chair) {
            return Err(ScoreError::NotChair(chair.clone()));
        }
        self.ensure_vendor(vendor)?;
        if reason.trim().is_empty() {
            return Err(ScoreError::MissingReason("override reason"));
        }
        let mut next = self.clone();
        next.drop_override(vendor);
        next.overrides.push(ConsensusOverride {
            vendor_id: vendor.clone(),
            chair_id: chair.clone(),
            reason: reason.to_string(),
            recorded_at: now,
        });
        Ok(next)
    }

    pub fn override_for(&self, vendor: &VendorId) -> Option<&ConsensusOverride> {
        self.overrides.iter().find(|o| &o.vendor_id == vendor)
    }

    /// Completed, non-flagged scores for a vendor from assigned evaluators
    pub fn contributing_scores(&self, vendor: &VendorId) -> Vec<&IndividualScore> {
        self.scores
            .iter()
            .filter(|s| {
                &s.vendor_id == vendor
                    && s.is_contributing()
                    && self.evaluators.contains(&s.evaluator_id)
            })
            .collect()
    }

    /// Evaluate the completion rule
    pub fn quorum(&self) -> QuorumReport {
        let mut completed = 0;
        let mut missing = Vec::new();
        for vendor in &self.vendors {
            for evaluator in &self.evaluators {
                match self.score(evaluator, vendor) {
                    Some(s) if s.is_contributing() => completed += 1,
                    _ => missing.push(OutstandingScore {
                        evaluator_id: evaluator.clone(),
                        vendor_id: vendor.clone(),
                    }),
                }
            }
        }
        let required = self.evaluators.len() * self.vendors.len();
        QuorumReport {
            tender_id: self.tender_id.clone(),
            required,
            completed,
            met: required > 0 && completed == required,
            missing,
            evaluation_version: self.version,
        }
    }

    fn drop_override(&mut self, vendor: &VendorId) {
        self.overrides.retain(|o| &o.vendor_id != vendor);
    }

    fn ensure_assigned(&self, evaluator: &EvaluatorId) -> Result<(), ScoreError> {
        if !self.evaluators.contains(evaluator) {
            return Err(ScoreError::UnassignedEvaluator(evaluator.clone()));
        }
        Ok(())
    }

    fn ensure_vendor(&self, vendor: &VendorId) -> Result<(), ScoreError> {
        if !self.vendors.contains(vendor) {
            return Err(ScoreError::UnknownVendor(vendor.clone()));
        }
        Ok(())
    }

    fn require_position(
        &self,
        evaluator: &EvaluatorId,
        vendor: &VendorId,
    ) -> Result<usize, ScoreError> {
        self.position(evaluator, vendor)
            .ok_or_else(|| ScoreError::NotSubmitted {
                evaluator: evaluator.clone(),
                vendor: vendor.clone(),
            })
    }
}
