//! Consensus engine
//!
//! Reconciles the evaluators' independent totals for one vendor into a
//! consensus score, classifies their spread, and flags outlying scores that
//! need written justification.
//!
//! ```text
//! contributing scores (Completed, non-flagged)
//!         │
//!         ▼
//! ┌───────────────────────────────┐
//! │ mean (1 dp), population var.  │
//! │ sample std-dev                │
//! └───────────────────────────────┘
//!         │
//!         ├──► variance level: < low ─ Low │ < high ─ Medium │ else High
//!         │
//!         └──► outliers: |score − mean| > max(k × std-dev, floor)
//!                  │
//!                  ▼
//!       consensus = Low ∧ every outlier justified
//! ```
//!
//! Results are derived on every query from the current score set and are
//! never stored.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::config::ScoringPolicy;
use crate::evaluation::{ConsensusOverride, IndividualScore, TenderEvaluation};
use crate::types::{round1, EvaluatorId, Timestamp, VarianceLevel, VendorId};

/// One evaluator's total as it entered the calculation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContributingScore {
    pub evaluator_id: EvaluatorId,
    pub total_score: f64,
    pub submitted_at: Timestamp,
}

/// A score deviating from the consensus mean beyond the threshold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outlier {
    pub evaluator_id: EvaluatorId,
    pub vendor_id: VendorId,
    pub score: f64,
    /// `score − mean_score`
    pub deviation: f64,
    /// No written justification on file yet
    pub justification_required: bool,
    pub justification: Option<String>,
}

/// Derived consensus for one vendor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusResult {
    pub vendor_id: VendorId,
    pub scores: Vec<ContributingScore>,
    pub mean_score: f64,
    /// Population variance of the totals; 0 with fewer than two scores
    pub variance: f64,
    /// Sample standard deviation; 0 with fewer than two scores
    pub standard_deviation: f64,
    pub variance_level: VarianceLevel,
    pub outlier_threshold: f64,
    pub outliers: Vec<Outlier>,
    pub consensus_reached: bool,
    pub chair_override: Option<ConsensusOverride>,
    pub earliest_submission: Timestamp,
}

impl ConsensusResult {
    /// Consensus either derived or forced by the chair
    pub fn is_accepted(&self) -> bool {
        self.consensus_reached || self.chair_override.is_some()
    }

    pub fn unresolved_outliers(&self) -> impl Iterator<Item = &Outlier> {
        self.outliers.iter().filter(|o| o.justification_required)
    }
}

/// One row of a tender's vendor ranking
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedVendor {
    /// 1-based position
    pub rank: usize,
    pub vendor_id: VendorId,
    pub mean_score: f64,
    pub variance: f64,
    pub variance_level: VarianceLevel,
    pub consensus_reached: bool,
}

/// Stateless calculator parameterised by the scoring policy
#[derive(Debug, Clone, Default)]
pub struct ConsensusEngine {
    policy: ScoringPolicy,
}

impl ConsensusEngine {
    pub fn new(policy: ScoringPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &ScoringPolicy {
        &self.policy
    }

    /// Classify a population variance into a band
    pub fn classify_variance(&self, variance: f64) -> VarianceLevel {
        if variance < self.policy.low_variance_threshold {
            VarianceLevel::Low
        } else if variance < self.policy.high_variance_threshold {
            VarianceLevel::Medium
        } else {
            VarianceLevel::High
        }
    }

    /// Outlier threshold for a given sample standard deviation
    pub fn outlier_threshold(&self, standard_deviation: f64) -> f64 {
        (self.policy.outlier_std_multiplier * standard_deviation)
            .max(self.policy.outlier_min_deviation)
    }

    /// Compute consensus over one vendor's contributing scores
    ///
    /// Returns `None` when `scores` is empty.
    pub fn compute(
        &self,
        vendor_id: &VendorId,
        scores: &[&IndividualScore],
        chair_override: Option<&ConsensusOverride>,
    ) -> Option<ConsensusResult> {
        let earliest_submission = scores.iter().map(|s| s.submitted_at).min()?;
        let totals: Vec<f64> = scores.iter().map(|s| s.total_score).collect();
        let n = totals.len() as f64;

        let raw_mean = totals.iter().sum::<f64>() / n;
        let mean_score = round1(raw_mean);
        let squared: f64 = totals.iter().map(|t| (t - raw_mean).powi(2)).sum();

        let (variance, standard_deviation, variance_level) = if totals.len() < 2 {
            (0.0, 0.0, VarianceLevel::Low)
        } else {
            let variance = squared / n;
            let standard_deviation = (squared / (n - 1.0)).sqrt();
            (variance, standard_deviation, self.classify_variance(variance))
        };

        let outlier_threshold = self.outlier_threshold(standard_deviation);
        let outliers: Vec<Outlier> = scores
            .iter()
            .filter_map(|s| {
                let deviation = round1(s.total_score - mean_score);
                (deviation.abs() > outlier_threshold).then(|| Outlier {
                    evaluator_id: s.evaluator_id.clone(),
                    vendor_id: vendor_id.clone(),
                    score: s.total_score,
                    deviation,
                    justification_required: s.justification.is_none(),
                    justification: s.justification.clone(),
                })
            })
            .collect();

        let consensus_reached = variance_level == VarianceLevel::Low
            && outliers.iter().all(|o| !o.justification_required);

        Some(ConsensusResult {
            vendor_id: vendor_id.clone(),
            scores: scores
                .iter()
                .map(|s| ContributingScore {
                    evaluator_id: s.evaluator_id.clone(),
                    total_score: s.total_score,
                    submitted_at: s.submitted_at,
                })
                .collect(),
            mean_score,
            variance,
            standard_deviation,
            variance_level,
            outlier_threshold,
            outliers,
            consensus_reached,
            chair_override: chair_override.cloned(),
            earliest_submission,
        })
    }

    /// Consensus for one vendor of a tender's evaluation
    pub fn for_vendor(
        &self,
        evaluation: &TenderEvaluation,
        vendor_id: &VendorId,
    ) -> Option<ConsensusResult> {
        let scores = evaluation.contributing_scores(vendor_id);
        self.compute(vendor_id, &scores, evaluation.override_for(vendor_id))
    }

    /// Consensus for every vendor holding at least one contributing score
    pub fn evaluate(&self, evaluation: &TenderEvaluation) -> Vec<ConsensusResult> {
        evaluation
            .vendors
            .iter()
            .filter_map(|vendor| self.for_vendor(evaluation, vendor))
            .collect()
    }

    /// Order vendors by mean score, then lower variance, then earliest submission
    pub fn rank(&self, mut results: Vec<ConsensusResult>) -> Vec<RankedVendor> {
        results.sort_by(compare_for_ranking);
        results
            .into_iter()
            .enumerate()
            .map(|(i, r)| RankedVendor {
                rank: i + 1,
                vendor_id: r.vendor_id,
                mean_score: r.mean_score,
                variance: r.variance,
                variance_level: r.variance_level,
                consensus_reached: r.consensus_reached,
            })
            .collect()
    }
}

fn compare_for_ranking(a: &ConsensusResult, b: &ConsensusResult) -> Ordering {
    b.mean_score
        .partial_cmp(&a.mean_score)
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.variance.partial_cmp(&b.variance).unwrap_or(Ordering::Equal))
        .then_with(|| a.earliest_submission.cmp(&b.earliest_submission))
        .then_with(|| a.vendor_id.cmp(&b.vendor_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluation::{ScoreSheet, ScoreSubmission};
    use crate::types::{ScoreStatus, TenderId};
    use chrono::{Duration, TimeZone, Utc};

    fn at(minute: i64) -> Timestamp {
        Utc.with_ymd_and_hms(2024, 5, 2, 10, 0, 0).unwrap() + Duration::minutes(minute)
    }

    /// A stored score whose total is exactly `total`
    fn scored(evaluator: &str, vendor: &str, total: f64, minute: i64) -> IndividualScore {
        let sheet = ScoreSheet::new().technical("overall", total).financial("overall", total);
        let submission = ScoreSubmission::new(evaluator, vendor, sheet);
        IndividualScore::from_submission(&submission, &ScoringPolicy::default(), at(minute))
    }

    fn consensus(totals: &[f64], engine: &ConsensusEngine) -> ConsensusResult {
        let owned: Vec<IndividualScore> = totals
            .iter()
            .enumerate()
            .map(|(i, t)| scored(&format!("E-{}", i + 1), "V", *t, i as i64))
            .collect();
        let refs: Vec<&IndividualScore> = owned.iter().collect();
        engine.compute(&VendorId::from("V"), &refs, None).unwrap()
    }

    #[test]
    fn test_variance_boundaries() {
        let engine = ConsensusEngine::default();
        assert_eq!(engine.classify_variance(24.9), VarianceLevel::Low);
        assert_eq!(engine.classify_variance(25.0), VarianceLevel::Medium);
        assert_eq!(engine.classify_variance(99.9), VarianceLevel::Medium);
        assert_eq!(engine.classify_variance(100.0), VarianceLevel::High);
    }

    #[test]
    fn test_close_scores_reach_consensus() {
        let result = consensus(&[87.8, 87.2, 88.1], &ConsensusEngine::default());
        assert_eq!(result.mean_score, 87.7);
        assert!((result.variance - 0.14).abs() < 1e-6);
        assert_eq!(result.variance_level, VarianceLevel::Low);
        assert!(result.outliers.is_empty());
        assert!(result.consensus_reached);
    }

    #[test]
    fn test_single_score_is_low_variance() {
        let result = consensus(&[61.0], &ConsensusEngine::default());
        assert_eq!(result.variance, 0.0);
        assert_eq!(result.variance_level, VarianceLevel::Low);
        assert!(result.consensus_reached);
    }

    #[test]
    fn test_wide_spread_blocks_consensus() {
        let result = consensus(&[70.0, 85.0, 94.0], &ConsensusEngine::default());
        assert_eq!(result.mean_score, 83.0);
        assert!((result.variance - 98.0).abs() < 1e-9);
        assert_eq!(result.variance_level, VarianceLevel::Medium);
        assert!(!result.consensus_reached);
    }

    #[test]
    fn test_high_variance() {
        let result = consensus(&[40.0, 90.0], &ConsensusEngine::default());
        assert_eq!(result.variance, 625.0);
        assert_eq!(result.variance_level, VarianceLevel::High);
    }

    #[test]
    fn test_min_deviation_floor_suppresses_tiny_sample_flags() {
        // sample sd = 1.0, 1.5 × sd = 1.5 < floor of 10
        let result = consensus(&[80.0, 81.0, 82.0], &ConsensusEngine::default());
        assert_eq!(result.outlier_threshold, 10.0);
        assert!(result.outliers.is_empty());
    }

    #[test]
    fn test_outlier_requires_justification() {
        let policy = ScoringPolicy::default().with_outlier_threshold(1.0, 4.5);
        let engine = ConsensusEngine::new(policy);
        let result = consensus(&[88.0, 85.0, 94.0], &engine);
        assert_eq!(result.mean_score, 89.0);
        assert_eq!(result.variance_level, VarianceLevel::Low);
        assert_eq!(result.outliers.len(), 1);
        let outlier = &result.outliers[0];
        assert_eq!(outlier.score, 94.0);
        assert_eq!(outlier.deviation, 5.0);
        assert!(outlier.justification_required);
        assert_eq!(result.unresolved_outliers().count(), 1);
        assert!(!result.consensus_reached);
    }

    #[test]
    fn test_justified_outlier_no_longer_blocks() {
        let policy = ScoringPolicy::default().with_outlier_threshold(1.0, 4.5);
        let engine = ConsensusEngine::new(policy);
        let mut owned = vec![
            scored("E-1", "V", 88.0, 0),
            scored("E-2", "V", 85.0, 1),
            scored("E-3", "V", 94.0, 2),
        ];
        owned[2].justification = Some("site visit evidence".into());
        let refs: Vec<&IndividualScore> = owned.iter().collect();
        let result = engine.compute(&VendorId::from("V"), &refs, None).unwrap();
        assert_eq!(result.outliers.len(), 1);
        assert!(!result.outliers[0].justification_required);
        assert_eq!(result.unresolved_outliers().count(), 0);
        assert!(result.consensus_reached);
    }

    #[test]
    fn test_empty_input_yields_none() {
        assert!(ConsensusEngine::default()
            .compute(&VendorId::from("V"), &[], None)
            .is_none());
    }

    #[test]
    fn test_ranking_tie_breaks() {
        let engine = ConsensusEngine::default();
        let mut eval = TenderEvaluation::new(TenderId::from("T"))
            .assign_panel(
                vec![EvaluatorId::from("E-1"), EvaluatorId::from("E-2")],
                None,
            )
            .unwrap()
            .with_vendors(vec![
                VendorId::from("A"),
                VendorId::from("B"),
                VendorId::from("C"),
                VendorId::from("D"),
            ]);
        eval.scores = vec![
            // A: mean 80, variance 4
            scored("E-1", "A", 78.0, 0),
            scored("E-2", "A", 82.0, 0),
            // B: mean 80, variance 0, later submission
            scored("E-1", "B", 80.0, 5),
            scored("E-2", "B", 80.0, 5),
            // C: mean 80, variance 0, earlier submission
            scored("E-1", "C", 80.0, 1),
            scored("E-2", "C", 80.0, 1),
            // D: highest mean
            scored("E-1", "D", 91.0, 9),
            scored("E-2", "D", 91.0, 9),
        ];
        let ranking = engine.rank(engine.evaluate(&eval));
        let order: Vec<&str> = ranking.iter().map(|r| r.vendor_id.as_str()).collect();
        assert_eq!(order, vec!["D", "C", "B", "A"]);
        assert_eq!(ranking[0].rank, 1);
    }

    #[test]
    fn test_flagged_scores_excluded() {
        let engine = ConsensusEngine::default();
        let mut eval = TenderEvaluation::new(TenderId::from("T"))
            .assign_panel(vec![EvaluatorId::from("E-1"), EvaluatorId::from("E-2")], None)
            .unwrap()
            .with_vendors(vec![VendorId::from("V")]);
        eval.scores = vec![scored("E-1", "V", 90.0, 0), scored("E-2", "V", 10.0, 0)];
        eval.scores[1].status = ScoreStatus::Flagged;
        let result = engine.for_vendor(&eval, &VendorId::from("V")).unwrap();
        assert_eq!(result.mean_score, 90.0);
        assert_eq!(result.scores.len(), 1);
    }
}
