//! Procurement service
//!
//! Command/query façade over the tender and evaluation aggregates. Every
//! command follows the same path:
//!
//! 1. load the aggregate(s) and verify invariants (`InconsistentState`
//!    blocks the tender)
//! 2. run the pure transition
//! 3. write back with the version that was read (`WriteConflict` on a race);
//!    completion and score-level writes also pin the other aggregate's version
//! 4. append an audit entry, then fire notifications
//!
//! Steps 3 and 4 only run when step 2 succeeded, so a rejected command
//! leaves storage untouched.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

use crate::audit::{AuditRecord, AuditSink, InMemoryAuditLog};
use crate::config::ProcuraConfig;
use crate::consensus::{ConsensusEngine, ConsensusResult, RankedVendor};
use crate::error::{ProcurementError, Result, ScoreError};
use crate::evaluation::{
    IndividualScore, QuorumReport, ScoreSubmission, SubmitOutcome, TenderEvaluation,
};
use crate::notify::{Notification, Notifier, TracingNotifier};
use crate::registry::VendorRegistry;
use crate::store::{InMemoryRepository, TenderRepository};
use crate::tender::{NewTender, Tender, TenderState};
use crate::types::{EvaluatorId, TenderId, TenderStatus, Timestamp, VendorId};
use crate::workflow::{self, Command};

/// Source of the current time
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        crate::types::now()
    }
}

/// Manually driven clock for scripted runs and tests
#[derive(Debug)]
pub struct ManualClock {
    current: Mutex<Timestamp>,
}

impl ManualClock {
    pub fn new(start: Timestamp) -> Self {
        Self {
            current: Mutex::new(start),
        }
    }

    pub fn set(&self, at: Timestamp) {
        *self.current.lock() = at;
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut current = self.current.lock();
        *current += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        *self.current.lock()
    }
}

/// Result of `submit_score`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitReceipt {
    pub outcome: SubmitOutcome,
    pub score: IndividualScore,
}

/// Procurement command/query service
pub struct ProcurementService {
    config: ProcuraConfig,
    engine: ConsensusEngine,
    repository: Arc<dyn TenderRepository>,
    audit: Arc<dyn AuditSink>,
    notifier: Arc<dyn Notifier>,
    vendors: Option<Arc<dyn VendorRegistry>>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for ProcurementService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcurementService")
            .field("config", &self.config)
            .field("vendor_registry", &self.vendors.is_some())
            .finish_non_exhaustive()
    }
}

impl Default for ProcurementService {
    fn default() -> Self {
        Self::new(ProcuraConfig::default())
    }
}

impl ProcurementService {
    /// Create a service over in-memory collaborators
    pub fn new(config: ProcuraConfig) -> Self {
        Self {
            engine: ConsensusEngine::new(config.scoring.clone()),
            config,
            repository: Arc::new(InMemoryRepository::new()),
            audit: Arc::new(InMemoryAuditLog::new()),
            notifier: Arc::new(TracingNotifier),
            vendors: None,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_repository(mut self, repository: Arc<dyn TenderRepository>) -> Self {
        self.repository = repository;
        self
    }

    pub fn with_audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_vendor_registry(mut self, vendors: Arc<dyn VendorRegistry>) -> Self {
        self.vendors = Some(vendors);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    // ------------------------------------------------------------------
    // Workflow commands
    // ------------------------------------------------------------------

    /// Create a tender in `Draft`
    pub fn create_tender(&self, new: NewTender, actor: &str) -> Result<Tender> {
        let now = self.clock.now();
        let tender = Tender::draft(new, now);
        let evaluation = TenderEvaluation::new(tender.id.clone());
        let (tender, _) = self.repository.create(tender, evaluation)?;

        tracing::info!(tender_id = %tender.id, actor, "Tender created");
        self.record(
            AuditRecord::new(
                &tender.id,
                actor,
                "create_tender",
                None,
                tender.status.to_string(),
                now,
            )
            .with_detail(json!({ "title": tender.title, "close_date": tender.close_date })),
        );
        Ok(tender)
    }

    pub fn publish(&self, tender_id: &TenderId, actor: &str) -> Result<Tender> {
        self.execute(tender_id, actor, Command::Publish)
    }

    /// Record a vendor's bid on a published tender
    pub fn submit_bid(
        &self,
        tender_id: &TenderId,
        vendor_id: &VendorId,
        actor: &str,
    ) -> Result<Tender> {
        if let Some(registry) = &self.vendors {
            let required = self.config.workflow.require_registered_vendors;
            if required && registry.lookup(vendor_id).is_none() {
                tracing::warn!(
                    tender_id = %tender_id,
                    vendor_id = %vendor_id,
                    "Bid from unregistered vendor rejected"
                );
                return Err(ProcurementError::VendorNotFound(vendor_id.clone()));
            }
        }
        self.execute(
            tender_id,
            actor,
            Command::SubmitBid {
                vendor_id: vendor_id.clone(),
            },
        )
    }

    pub fn close_bidding(&self, tender_id: &TenderId, actor: &str) -> Result<Tender> {
        self.execute(tender_id, actor, Command::CloseBidding)
    }

    /// Start evaluation and put the bidders under evaluation
    pub fn start_evaluation(&self, tender_id: &TenderId, actor: &str) -> Result<Tender> {
        let tender = self.load_tender(tender_id)?;
        // Validate first so a rejected start writes nothing.
        workflow::start_evaluation(&tender, self.clock.now()).map_err(|e| self.rejected(e))?;

        // Bidders are frozen once bidding closed, so registering them ahead
        // of the tender write is idempotent.
        let evaluation = self.repository.get_evaluation(tender_id)?;
        if evaluation.vendors != tender.bidders {
            let next = evaluation.with_vendors(tender.bidders.iter().cloned());
            self.repository
                .save_evaluation_pinned(next, evaluation.version, tender.version)?;
        }
        self.execute(tender_id, actor, Command::StartEvaluation)
    }

    /// Mark evaluation complete once quorum is met
    ///
    /// The tender write is pinned to the evaluation version the quorum was
    /// computed from; a score-level write landing in between is reported as
    /// `WriteConflict`.
    pub fn complete_evaluation(&self, tender_id: &TenderId, actor: &str) -> Result<Tender> {
        let quorum = self.get_quorum(tender_id)?;
        self.execute(tender_id, actor, Command::CompleteEvaluation { quorum })
    }

    pub fn request_noc(&self, tender_id: &TenderId, actor: &str) -> Result<Tender> {
        self.execute(tender_id, actor, Command::RequestNoc)
    }

    pub fn approve_noc(&self, tender_id: &TenderId, actor: &str) -> Result<Tender> {
        self.execute(tender_id, actor, Command::ApproveNoc)
    }

    pub fn award(
        &self,
        tender_id: &TenderId,
        vendor_id: &VendorId,
        amount: f64,
        actor: &str,
    ) -> Result<Tender> {
        self.execute(
            tender_id,
            actor,
            Command::Award {
                vendor_id: vendor_id.clone(),
                amount,
            },
        )
    }

    pub fn complete_contract(&self, tender_id: &TenderId, actor: &str) -> Result<Tender> {
        self.execute(tender_id, actor, Command::CompleteContract)
    }

    pub fn cancel(&self, tender_id: &TenderId, actor: &str) -> Result<Tender> {
        self.execute(tender_id, actor, Command::Cancel)
    }

    /// Run one lifecycle command through load → transition → save → audit
    pub fn execute(&self, tender_id: &TenderId, actor: &str, command: Command) -> Result<Tender> {
        let current = self.load_tender(tender_id)?;
        let now = self.clock.now();
        let next = workflow::apply(&current, &command, now).map_err(|e| self.rejected(e))?;
        let saved = match &command {
            Command::CompleteEvaluation { quorum } => self.repository.save_tender_pinned(
                next,
                current.version,
                quorum.evaluation_version,
            ),
            _ => self.repository.save_tender(next, current.version),
        }
        .map_err(|e| self.rejected(e))?;

        tracing::info!(
            tender_id = %saved.id,
            actor,
            command = command.name(),
            from = %current.status,
            to = %saved.status,
            step = saved.workflow_step,
            "Tender transitioned"
        );
        self.record(
            AuditRecord::new(
                &saved.id,
                actor,
                command.name(),
                Some(current.status.to_string()),
                saved.status.to_string(),
                now,
            )
            .with_detail(serde_json::to_value(&command).unwrap_or_default()),
        );
        if let Some(notification) = notification_for(&command, &saved, actor, now) {
            if let Err(e) = self.notifier.notify(&notification) {
                tracing::warn!(
                    tender_id = %saved.id,
                    error = %e,
                    "Notification failed; transition kept"
                );
            }
        }
        Ok(saved)
    }

    // ------------------------------------------------------------------
    // Evaluation commands
    // ------------------------------------------------------------------

    /// Assign the evaluation panel before evaluation starts
    pub fn assign_panel(
        &self,
        tender_id: &TenderId,
        evaluators: Vec<EvaluatorId>,
        chair: Option<EvaluatorId>,
        actor: &str,
    ) -> Result<TenderEvaluation> {
        let detail = json!({ "evaluators": evaluators, "chair": chair });
        self.modify_evaluation(
            tender_id,
            actor,
            "assign_panel",
            Phase::BeforeEvaluation,
            detail,
            |eval, _| eval.assign_panel(evaluators, chair),
        )
    }

    /// Submit or overwrite an evaluator's score
    pub fn submit_score(
        &self,
        tender_id: &TenderId,
        submission: ScoreSubmission,
        actor: &str,
    ) -> Result<SubmitReceipt> {
        let tender = self.load_tender(tender_id)?;
        self.guard(&tender, "submit_score", Phase::Scoring)?;
        let evaluation = self.repository.get_evaluation(tender_id)?;
        let now = self.clock.now();

        let previous = evaluation
            .score(&submission.evaluator_id, &submission.vendor_id)
            .map(|s| s.status.to_string());
        let (next, outcome) = evaluation
            .submit(&submission, &self.config.scoring, now)
            .map_err(|e| self.rejected(e.into()))?;

        let next = if outcome == SubmitOutcome::Unchanged {
            tracing::debug!(
                tender_id = %tender_id,
                evaluator = %submission.evaluator_id,
                vendor = %submission.vendor_id,
                "Identical score replay ignored"
            );
            next
        } else {
            self.repository
                .save_evaluation_pinned(next, evaluation.version, tender.version)
                .map_err(|e| self.rejected(e))?
        };
        let score = next
            .score(&submission.evaluator_id, &submission.vendor_id)
            .cloned()
            .ok_or_else(|| ScoreError::NotSubmitted {
                evaluator: submission.evaluator_id.clone(),
                vendor: submission.vendor_id.clone(),
            })?;

        if outcome != SubmitOutcome::Unchanged {
            tracing::info!(
                tender_id = %tender_id,
                evaluator = %score.evaluator_id,
                vendor = %score.vendor_id,
                total = score.total_score,
                status = %score.status,
                ?outcome,
                "Score submitted"
            );
            self.record(
                AuditRecord::new(
                    tender_id,
                    actor,
                    "submit_score",
                    previous,
                    score.status.to_string(),
                    now,
                )
                .with_detail(json!({
                    "evaluator_id": score.evaluator_id,
                    "vendor_id": score.vendor_id,
                    "total_score": score.total_score,
                    "outcome": outcome,
                })),
            );
        }
        Ok(SubmitReceipt { outcome, score })
    }

    /// Flag a submission; it stops counting toward quorum and consensus
    pub fn flag_score(
        &self,
        tender_id: &TenderId,
        evaluator: &EvaluatorId,
        vendor: &VendorId,
        reason: &str,
        actor: &str,
    ) -> Result<TenderEvaluation> {
        let detail = json!({ "evaluator_id": evaluator, "vendor_id": vendor, "reason": reason });
        self.modify_evaluation(tender_id, actor, "flag_score", Phase::Scoring, detail, |eval, _| {
            eval.flag(evaluator, vendor, reason)
        })
    }

    pub fn resolve_flag(
        &self,
        tender_id: &TenderId,
        evaluator: &EvaluatorId,
        vendor: &VendorId,
        actor: &str,
    ) -> Result<TenderEvaluation> {
        let detail = json!({ "evaluator_id": evaluator, "vendor_id": vendor });
        self.modify_evaluation(tender_id, actor, "resolve_flag", Phase::Scoring, detail, |eval, _| {
            eval.resolve_flag(evaluator, vendor)
        })
    }

    /// Record written justification for an outlying score
    pub fn justify_outlier(
        &self,
        tender_id: &TenderId,
        evaluator: &EvaluatorId,
        vendor: &VendorId,
        justification: &str,
        actor: &str,
    ) -> Result<TenderEvaluation> {
        let detail = json!({ "evaluator_id": evaluator, "vendor_id": vendor });
        self.modify_evaluation(
            tender_id,
            actor,
            "justify_outlier",
            Phase::Deliberation,
            detail,
            |eval, _| eval.justify(evaluator, vendor, justification),
        )
    }

    /// Chair override of the derived consensus flag for one vendor
    pub fn override_consensus(
        &self,
        tender_id: &TenderId,
        vendor: &VendorId,
        chair: &EvaluatorId,
        reason: &str,
    ) -> Result<TenderEvaluation> {
        let detail = json!({ "vendor_id": vendor, "reason": reason });
        self.modify_evaluation(
            tender_id,
            chair.as_str(),
            "override_consensus",
            Phase::Deliberation,
            detail,
            |eval, now| eval.override_consensus(vendor, chair, reason, now),
        )
    }

    fn modify_evaluation<F>(
        &self,
        tender_id: &TenderId,
        actor: &str,
        action: &'static str,
        phase: Phase,
        detail: serde_json::Value,
        f: F,
    ) -> Result<TenderEvaluation>
    where
        F: FnOnce(
            &TenderEvaluation,
            Timestamp,
        ) -> std::result::Result<TenderEvaluation, ScoreError>,
    {
        let tender = self.load_tender(tender_id)?;
        self.guard(&tender, action, phase)?;
        let evaluation = self.repository.get_evaluation(tender_id)?;
        let now = self.clock.now();
        let next = f(&evaluation, now).map_err(|e| self.rejected(e.into()))?;
        let saved = self
            .repository
            .save_evaluation_pinned(next, evaluation.version, tender.version)
            .map_err(|e| self.rejected(e))?;

        tracing::info!(tender_id = %tender_id, actor, action, "Evaluation updated");
        self.record(
            AuditRecord::new(
                tender_id,
                actor,
                action,
                Some(format!("v{}", evaluation.version)),
                format!("v{}", saved.version),
                now,
            )
            .with_detail(detail),
        );
        Ok(saved)
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Load a tender, verifying its invariants
    pub fn get_tender(&self, tender_id: &TenderId) -> Result<Tender> {
        self.load_tender(tender_id)
    }

    pub fn get_tender_state(&self, tender_id: &TenderId) -> Result<TenderState> {
        Ok(self.load_tender(tender_id)?.state())
    }

    pub fn get_evaluation(&self, tender_id: &TenderId) -> Result<TenderEvaluation> {
        self.repository.get_evaluation(tender_id)
    }

    pub fn get_quorum(&self, tender_id: &TenderId) -> Result<QuorumReport> {
        Ok(self.repository.get_evaluation(tender_id)?.quorum())
    }

    /// Consensus for one vendor, computed from the current scores
    pub fn get_consensus(
        &self,
        tender_id: &TenderId,
        vendor_id: &VendorId,
    ) -> Result<ConsensusResult> {
        let evaluation = self.repository.get_evaluation(tender_id)?;
        if !evaluation.vendors.contains(vendor_id) {
            return Err(ScoreError::UnknownVendor(vendor_id.clone()).into());
        }
        let result = self
            .engine
            .for_vendor(&evaluation, vendor_id)
            .ok_or_else(|| ScoreError::NoContributingScores(vendor_id.clone()))?;
        tracing::debug!(
            tender_id = %tender_id,
            vendor = %vendor_id,
            mean = result.mean_score,
            level = %result.variance_level,
            consensus = result.consensus_reached,
            "Consensus computed"
        );
        Ok(result)
    }

    /// Consensus for every vendor with at least one contributing score
    pub fn get_all_consensus(&self, tender_id: &TenderId) -> Result<Vec<ConsensusResult>> {
        let evaluation = self.repository.get_evaluation(tender_id)?;
        Ok(self.engine.evaluate(&evaluation))
    }

    pub fn get_ranking_detail(&self, tender_id: &TenderId) -> Result<Vec<RankedVendor>> {
        Ok(self.engine.rank(self.get_all_consensus(tender_id)?))
    }

    /// Vendor ids, best first
    pub fn get_ranking(&self, tender_id: &TenderId) -> Result<Vec<VendorId>> {
        Ok(self
            .get_ranking_detail(tender_id)?
            .into_iter()
            .map(|r| r.vendor_id)
            .collect())
    }

    // ------------------------------------------------------------------

    fn load_tender(&self, tender_id: &TenderId) -> Result<Tender> {
        let tender = self.repository.get_tender(tender_id)?;
        if let Err(e) = tender.check_invariants() {
            tracing::error!(
                tender_id = %tender_id,
                error = %e,
                "Tender invariant violated; transitions blocked"
            );
            return Err(e);
        }
        Ok(tender)
    }

    fn guard(&self, tender: &Tender, command: &'static str, phase: Phase) -> Result<()> {
        let allowed = match phase {
            Phase::BeforeEvaluation => matches!(
                tender.status,
                TenderStatus::Draft | TenderStatus::Published | TenderStatus::Bidding
            ),
            Phase::Scoring => {
                tender.status == TenderStatus::Evaluation && !tender.evaluation_completed
            }
            Phase::Deliberation => tender.status == TenderStatus::Evaluation,
        };
        if allowed {
            return Ok(());
        }
        Err(self.rejected(ProcurementError::InvalidTransition {
            tender_id: tender.id.clone(),
            command,
            status: tender.status,
            reason: phase.describe().to_string(),
        }))
    }

    fn rejected(&self, error: ProcurementError) -> ProcurementError {
        tracing::warn!(kind = error.kind(), error = %error, "Command rejected");
        error
    }

    fn record(&self, record: AuditRecord) {
        let tender_id = record.tender_id.clone();
        if let Err(e) = self.audit.append(record) {
            tracing::error!(tender_id = %tender_id, error = %e, "Failed to append audit entry");
        }
    }
}

/// Tender phase a score-level command requires
#[derive(Debug, Clone, Copy)]
enum Phase {
    BeforeEvaluation,
    Scoring,
    Deliberation,
}

impl Phase {
    fn describe(self) -> &'static str {
        match self {
            Phase::BeforeEvaluation => "only allowed before evaluation starts",
            Phase::Scoring => "scores are only accepted while evaluation is open",
            Phase::Deliberation => "only allowed while the tender is under evaluation",
        }
    }
}

fn notification_for(
    command: &Command,
    tender: &Tender,
    actor: &str,
    at: Timestamp,
) -> Option<Notification> {
    let tender_id = tender.id.clone();
    match command {
        Command::RequestNoc => Some(Notification::NocRequested {
            tender_id,
            requested_by: actor.to_string(),
            at,
        }),
        Command::ApproveNoc => Some(Notification::NocApproved {
            tender_id,
            approved_by: actor.to_string(),
            at,
        }),
        Command::Award { vendor_id, amount } => Some(Notification::ContractAwarded {
            tender_id,
            vendor_id: vendor_id.clone(),
            amount: *amount,
            at,
        }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluation::ScoreSheet;
    use crate::notify::NotifyError;
    use crate::registry::{InMemoryVendorRegistry, Vendor};
    use chrono::{Duration, TimeZone, Utc};

    struct FailingNotifier;

    impl Notifier for FailingNotifier {
        fn notify(&self, _: &Notification) -> std::result::Result<(), NotifyError> {
            Err(NotifyError("smtp down".into()))
        }
    }

    fn start() -> Timestamp {
        Utc.with_ymd_and_hms(2024, 6, 3, 8, 0, 0).unwrap()
    }

    fn service() -> (ProcurementService, Arc<ManualClock>, Arc<InMemoryAuditLog>) {
        let clock = Arc::new(ManualClock::new(start()));
        let audit = Arc::new(InMemoryAuditLog::new());
        let svc = ProcurementService::default()
            .with_clock(clock.clone())
            .with_audit_sink(audit.clone());
        (svc, clock, audit)
    }

    fn evaluating(svc: &ProcurementService, clock: &ManualClock) -> TenderId {
        let tender = svc
            .create_tender(
                NewTender::new("School furniture", start() + Duration::days(14)).with_id("T-100"),
                "officer",
            )
            .unwrap();
        let id = tender.id;
        svc.assign_panel(
            &id,
            vec![EvaluatorId::from("E-1"), EvaluatorId::from("E-2")],
            Some(EvaluatorId::from("E-1")),
            "officer",
        )
        .unwrap();
        svc.publish(&id, "officer").unwrap();
        svc.submit_bid(&id, &VendorId::from("V-1"), "V-1").unwrap();
        clock.advance(Duration::days(14));
        svc.close_bidding(&id, "officer").unwrap();
        svc.start_evaluation(&id, "officer").unwrap();
        id
    }

    fn submission(evaluator: &str, t: f64, f: f64) -> ScoreSubmission {
        ScoreSubmission::new(
            evaluator,
            "V-1",
            ScoreSheet::new().technical("design", t).financial("price", f),
        )
    }

    #[test]
    fn test_close_bidding_waits_for_close_date() {
        let (svc, _clock, _) = service();
        let tender = svc
            .create_tender(NewTender::new("Desks", start() + Duration::days(1)), "officer")
            .unwrap();
        svc.publish(&tender.id, "officer").unwrap();
        let err = svc.close_bidding(&tender.id, "officer").unwrap_err();
        assert!(matches!(err, ProcurementError::InvalidTransition { .. }));
        assert_eq!(svc.get_tender(&tender.id).unwrap().version, 2);
    }

    #[test]
    fn test_start_evaluation_registers_bidders() {
        let (svc, clock, _) = service();
        let id = evaluating(&svc, &clock);
        let evaluation = svc.get_evaluation(&id).unwrap();
        assert!(evaluation.vendors.contains(&VendorId::from("V-1")));
        assert_eq!(svc.get_tender_state(&id).unwrap().workflow_step, 4);
    }

    #[test]
    fn test_quorum_gate_and_noc_flow() {
        let (svc, clock, audit) = service();
        let id = evaluating(&svc, &clock);
        svc.submit_score(&id, submission("E-1", 80.0, 90.0), "E-1").unwrap();

        let err = svc.complete_evaluation(&id, "chair").unwrap_err();
        assert!(matches!(err, ProcurementError::QuorumNotMet { completed: 1, required: 2, .. }));

        svc.submit_score(&id, submission("E-2", 82.0, 88.0), "E-2").unwrap();
        svc.complete_evaluation(&id, "chair").unwrap();
        svc.request_noc(&id, "officer").unwrap();
        svc.approve_noc(&id, "regulator").unwrap();
        let tender = svc.award(&id, &VendorId::from("V-1"), 48_500.0, "officer").unwrap();
        assert_eq!(tender.status, TenderStatus::ContractAwarded);

        let actions: Vec<String> = audit
            .entries_for(&id)
            .into_iter()
            .map(|e| e.record.action)
            .collect();
        assert!(actions.contains(&"award".to_string()));
        assert_eq!(actions.iter().filter(|a| *a == "submit_score").count(), 2);
        assert!(crate::audit::verify_chain(&audit.entries()));
    }

    #[test]
    fn test_scores_rejected_after_completion() {
        let (svc, clock, _) = service();
        let id = evaluating(&svc, &clock);
        svc.submit_score(&id, submission("E-1", 80.0, 90.0), "E-1").unwrap();
        svc.submit_score(&id, submission("E-2", 80.0, 90.0), "E-2").unwrap();
        svc.complete_evaluation(&id, "chair").unwrap();

        let err = svc
            .flag_score(&id, &EvaluatorId::from("E-1"), &VendorId::from("V-1"), "late", "chair")
            .unwrap_err();
        assert!(matches!(err, ProcurementError::InvalidTransition { command: "flag_score", .. }));
    }

    #[test]
    fn test_panel_locked_once_evaluation_starts() {
        let (svc, clock, _) = service();
        let id = evaluating(&svc, &clock);
        let err = svc
            .assign_panel(&id, vec![EvaluatorId::from("E-3")], None, "officer")
            .unwrap_err();
        assert!(matches!(err, ProcurementError::InvalidTransition { .. }));
    }

    #[test]
    fn test_notification_failure_keeps_transition() {
        let (svc, clock, _) = service();
        let svc = svc.with_notifier(Arc::new(FailingNotifier));
        let id = evaluating(&svc, &clock);
        svc.submit_score(&id, submission("E-1", 80.0, 90.0), "E-1").unwrap();
        svc.submit_score(&id, submission("E-2", 80.0, 90.0), "E-2").unwrap();
        svc.complete_evaluation(&id, "chair").unwrap();
        let tender = svc.request_noc(&id, "officer").unwrap();
        assert_eq!(tender.status, TenderStatus::NocRequested);
        assert!(svc.get_tender(&id).unwrap().noc_requested);
    }

    #[test]
    fn test_unregistered_vendor_bid_rejected() {
        let (svc, _clock, _) = service();
        let registry = InMemoryVendorRegistry::with_vendors([Vendor::new("V-1", "Acme")]);
        let svc = svc.with_vendor_registry(Arc::new(registry));
        let tender = svc
            .create_tender(NewTender::new("Chairs", start()), "officer")
            .unwrap();
        svc.publish(&tender.id, "officer").unwrap();
        assert!(svc.submit_bid(&tender.id, &VendorId::from("V-1"), "V-1").is_ok());
        let err = svc
            .submit_bid(&tender.id, &VendorId::from("V-404"), "V-404")
            .unwrap_err();
        assert!(matches!(err, ProcurementError::VendorNotFound(_)));
    }

    #[test]
    fn test_consensus_unknown_vendor() {
        let (svc, clock, _) = service();
        let id = evaluating(&svc, &clock);
        let err = svc.get_consensus(&id, &VendorId::from("V-9")).unwrap_err();
        assert!(matches!(err, ProcurementError::InvalidScore(ScoreError::UnknownVendor(_))));
        let err = svc.get_consensus(&id, &VendorId::from("V-1")).unwrap_err();
        assert!(matches!(
            err,
            ProcurementError::InvalidScore(ScoreError::NoContributingScores(_))
        ));
    }
}
