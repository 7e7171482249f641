//! Individual evaluator scores
//!
//! One `IndividualScore` holds one evaluator's criterion scores for one
//! vendor. The weighted total is always derived from the criteria through
//! the active [`ScoringPolicy`]; it is never accepted from the caller.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::config::ScoringPolicy;
use crate::error::ScoreError;
use crate::types::{round1, EvaluatorId, ScoreStatus, Timestamp, VendorId};

/// Per-criterion scores, split into the technical and financial groups
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreSheet {
    pub technical: BTreeMap<String, f64>,
    pub financial: BTreeMap<String, f64>,
}

impl ScoreSheet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn technical(mut self, criterion: impl Into<String>, score: f64) -> Self {
        self.technical.insert(criterion.into(), score);
        self
    }

    pub fn financial(mut self, criterion: impl Into<String>, score: f64) -> Self {
        self.financial.insert(criterion.into(), score);
        self
    }

    /// Every criterion in `[0, max]`, both groups non-empty
    pub fn validate(&self, policy: &ScoringPolicy) -> Result<(), ScoreError> {
        if self.technical.is_empty() {
            return Err(ScoreError::EmptyCriteria("technical"));
        }
        if self.financial.is_empty() {
            return Err(ScoreError::EmptyCriteria("financial"));
        }
        for (criterion, &value) in self.technical.iter().chain(self.financial.iter()) {
            if !value.is_finite() || !(0.0..=policy.max_criterion_score).contains(&value) {
                return Err(ScoreError::OutOfRange {
                    criterion: criterion.clone(),
                    value,
                    max: policy.max_criterion_score,
                });
            }
        }
        Ok(())
    }

    /// Mean of the technical criteria
    pub fn technical_score(&self) -> f64 {
        mean(self.technical.values())
    }

    /// Mean of the financial criteria
    pub fn financial_score(&self) -> f64 {
        mean(self.financial.values())
    }

    /// `technical_weight × technical + financial_weight × financial`, one decimal
    pub fn weighted_total(&self, policy: &ScoringPolicy) -> f64 {
        round1(
            policy.technical_weight * self.technical_score()
                + policy.financial_weight * self.financial_score(),
        )
    }
}

fn mean<'a>(values: impl ExactSizeIterator<Item = &'a f64>) -> f64 {
    let n = values.len();
    if n == 0 {
        return 0.0;
    }
    values.sum::<f64>() / n as f64
}

/// An evaluator's submission as received from the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreSubmission {
    pub evaluator_id: EvaluatorId,
    pub vendor_id: VendorId,
    pub sheet: ScoreSheet,

    /// Minutes the evaluator spent on this vendor
    #[serde(default)]
    pub time_spent_minutes: u32,

    /// Final submission; a non-final one stays `Pending` and may be replaced
    #[serde(default)]
    pub finalize: bool,
}

impl ScoreSubmission {
    pub fn new(
        evaluator_id: impl Into<EvaluatorId>,
        vendor_id: impl Into<VendorId>,
        sheet: ScoreSheet,
    ) -> Self {
        Self {
            evaluator_id: evaluator_id.into(),
            vendor_id: vendor_id.into(),
            sheet,
            time_spent_minutes: 0,
            finalize: true,
        }
    }

    pub fn draft(mut self) -> Self {
        self.finalize = false;
        self
    }

    pub fn time_spent(mut self, minutes: u32) -> Self {
        self.time_spent_minutes = minutes;
        self
    }

    pub fn target_status(&self) -> ScoreStatus {
        if self.finalize {
            ScoreStatus::Completed
        } else {
            ScoreStatus::Pending
        }
    }
}

/// One evaluator's stored score for one vendor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndividualScore {
    pub evaluator_id: EvaluatorId,
    pub vendor_id: VendorId,
    pub sheet: ScoreSheet,
    pub technical_score: f64,
    pub financial_score: f64,

    /// Weighted total, one decimal
    pub total_score: f64,

    pub status: ScoreStatus,
    pub flag_reason: Option<String>,

    /// Written justification for an outlying score
    pub justification: Option<String>,

    pub time_spent_minutes: u32,

    /// Time of the latest accepted submission
    pub submitted_at: Timestamp,

    /// Set once the submission was finalised
    pub completed_at: Option<Timestamp>,
}

impl IndividualScore {
    /// Build a stored score from a validated submission
    pub fn from_submission(
        submission: &ScoreSubmission,
        policy: &ScoringPolicy,
        now: Timestamp,
    ) -> Self {
        let status = submission.target_status();
        Self {
            evaluator_id: submission.evaluator_id.clone(),
            vendor_id: submission.vendor_id.clone(),
            sheet: submission.sheet.clone(),
            technical_score: round1(submission.sheet.technical_score()),
            financial_score: round1(submission.sheet.financial_score()),
            total_score: submission.sheet.weighted_total(policy),
            status,
            flag_reason: None,
            justification: None,
            time_spent_minutes: submission.time_spent_minutes,
            submitted_at: now,
            completed_at: (status == ScoreStatus::Completed).then_some(now),
        }
    }

    /// Whether `submission` would store exactly what is already stored
    pub fn matches(&self, submission: &ScoreSubmission) -> bool {
        self.status != ScoreStatus::Flagged
            && self.sheet == submission.sheet
            && self.time_spent_minutes == submission.time_spent_minutes
            && self.status == submission.target_status()
    }

    /// Counts toward quorum and consensus
    pub fn is_contributing(&self) -> bool {
        self.status == ScoreStatus::Completed
    }

    pub fn key(&self) -> (&EvaluatorId, &VendorId) {
        (&self.evaluator_id, &self.vendor_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::now;

    fn sheet(technical: f64, financial: f64) -> ScoreSheet {
        ScoreSheet::new()
            .technical("methodology", technical)
            .financial("price", financial)
    }

    #[test]
    fn test_weighted_total_default_policy() {
        let policy = ScoringPolicy::default();
        // 0.4 * 85 + 0.6 * 90 = 88.0
        assert_eq!(sheet(85.0, 90.0).weighted_total(&policy), 88.0);
        // 0.4 * 83 + 0.6 * 91 = 87.8
        assert_eq!(sheet(83.0, 91.0).weighted_total(&policy), 87.8);
    }

    #[test]
    fn test_weighted_total_custom_weights() {
        let policy = ScoringPolicy::default().with_weights(0.7, 0.3);
        assert!(policy.validate().is_ok());
        // 0.7 * 85 + 0.3 * 90 = 86.5
        assert_eq!(sheet(85.0, 90.0).weighted_total(&policy), 86.5);
    }

    #[test]
    fn test_group_means() {
        let sheet = ScoreSheet::new()
            .technical("methodology", 80.0)
            .technical("experience", 90.0)
            .financial("price", 70.0);
        assert_eq!(sheet.technical_score(), 85.0);
        assert_eq!(sheet.weighted_total(&ScoringPolicy::default()), 76.0);
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        let policy = ScoringPolicy::default();
        let err = sheet(101.0, 50.0).validate(&policy).unwrap_err();
        assert!(matches!(err, ScoreError::OutOfRange { .. }));
        assert!(sheet(-0.5, 50.0).validate(&policy).is_err());
        assert!(sheet(f64::NAN, 50.0).validate(&policy).is_err());
        assert!(sheet(0.0, 100.0).validate(&policy).is_ok());
    }

    #[test]
    fn test_validate_requires_both_groups() {
        let policy = ScoringPolicy::default();
        let only_technical = ScoreSheet::new().technical("methodology", 50.0);
        assert_eq!(
            only_technical.validate(&policy),
            Err(ScoreError::EmptyCriteria("financial"))
        );
    }

    #[test]
    fn test_from_submission_status() {
        let policy = ScoringPolicy::default();
        let draft = ScoreSubmission::new("E-1", "V-1", sheet(80.0, 80.0)).draft();
        let stored = IndividualScore::from_submission(&draft, &policy, now());
        assert_eq!(stored.status, ScoreStatus::Pending);
        assert!(stored.completed_at.is_none());
        assert!(stored.matches(&draft));

        let final_submission = ScoreSubmission::new("E-1", "V-1", sheet(80.0, 80.0));
        assert!(!stored.matches(&final_submission));
    }
}
