//! Scripted tender scenarios
//!
//! A scenario is a JSON document describing one tender and an ordered list of
//! steps. Each step is either a service command or a clock adjustment. Steps
//! may declare the error kind they expect, which lets a script exercise the
//! rejection paths as well as the happy path.

use anyhow::{bail, Context};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use procura_core::{
    ConsensusResult, EvaluatorId, ManualClock, NewTender, ProcurementService, RankedVendor,
    ScoreSheet, ScoreSubmission, Tender, TenderId, Timestamp, Vendor, VendorId,
};

fn default_actor() -> String {
    "officer".to_string()
}

/// A scripted tender
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    /// Initial clock time
    pub start: Timestamp,

    pub tender: ScenarioTender,

    /// Vendors known to the registry; empty disables registry checks
    #[serde(default)]
    pub vendors: Vec<Vendor>,

    pub steps: Vec<ScenarioStep>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioTender {
    #[serde(default)]
    pub id: Option<TenderId>,
    pub title: String,
    pub close_date: Timestamp,
}

/// One line of the script
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioStep {
    #[serde(default = "default_actor")]
    pub actor: String,

    /// Error kind the step must fail with, e.g. `invalid_transition`
    #[serde(default)]
    pub expect_error: Option<String>,

    #[serde(flatten)]
    pub action: Action,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    Publish,
    SubmitBid {
        vendor: VendorId,
    },
    CloseBidding,
    AssignPanel {
        evaluators: Vec<EvaluatorId>,
        #[serde(default)]
        chair: Option<EvaluatorId>,
    },
    StartEvaluation,
    SubmitScore {
        evaluator: EvaluatorId,
        vendor: VendorId,
        technical: BTreeMap<String, f64>,
        financial: BTreeMap<String, f64>,
        #[serde(default)]
        draft: bool,
        #[serde(default)]
        minutes: u32,
    },
    FlagScore {
        evaluator: EvaluatorId,
        vendor: VendorId,
        reason: String,
    },
    ResolveFlag {
        evaluator: EvaluatorId,
        vendor: VendorId,
    },
    JustifyOutlier {
        evaluator: EvaluatorId,
        vendor: VendorId,
        justification: String,
    },
    OverrideConsensus {
        vendor: VendorId,
        chair: EvaluatorId,
        reason: String,
    },
    CompleteEvaluation,
    RequestNoc,
    ApproveNoc,
    Award {
        vendor: VendorId,
        amount: f64,
    },
    CompleteContract,
    Cancel,
    /// Move the clock forward
    Advance {
        #[serde(default)]
        days: i64,
        #[serde(default)]
        hours: i64,
        #[serde(default)]
        minutes: i64,
    },
    /// Set the clock to an absolute time
    SetClock {
        at: Timestamp,
    },
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Publish => "publish",
            Self::SubmitBid { .. } => "submit_bid",
            Self::CloseBidding => "close_bidding",
            Self::AssignPanel { .. } => "assign_panel",
            Self::StartEvaluation => "start_evaluation",
            Self::SubmitScore { .. } => "submit_score",
            Self::FlagScore { .. } => "flag_score",
            Self::ResolveFlag { .. } => "resolve_flag",
            Self::JustifyOutlier { .. } => "justify_outlier",
            Self::OverrideConsensus { .. } => "override_consensus",
            Self::CompleteEvaluation => "complete_evaluation",
            Self::RequestNoc => "request_noc",
            Self::ApproveNoc => "approve_noc",
            Self::Award { .. } => "award",
            Self::CompleteContract => "complete_contract",
            Self::Cancel => "cancel",
            Self::Advance { .. } => "advance",
            Self::SetClock { .. } => "set_clock",
        }
    }
}

impl Scenario {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading scenario {}", path.display()))?;
        Self::from_json(&content).with_context(|| format!("parsing scenario {}", path.display()))
    }

    pub fn from_json(content: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(content)?)
    }
}

/// Result of one step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepOutcome {
    pub index: usize,
    pub action: String,
    pub actor: String,
    pub accepted: bool,
    pub error_kind: Option<String>,
    pub message: Option<String>,
    /// The outcome matched the script's expectation
    pub as_expected: bool,
}

/// Everything a replay produced
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayReport {
    pub steps: Vec<StepOutcome>,
    pub tender: Tender,
    pub consensus: Vec<ConsensusResult>,
    pub ranking: Vec<RankedVendor>,
}

impl ReplayReport {
    pub fn unexpected(&self) -> impl Iterator<Item = &StepOutcome> {
        self.steps.iter().filter(|s| !s.as_expected)
    }
}

/// Replays a scenario against a service driven by a manual clock
pub struct Replayer<'a> {
    service: &'a ProcurementService,
    clock: Arc<ManualClock>,
}

impl<'a> Replayer<'a> {
    pub fn new(service: &'a ProcurementService, clock: Arc<ManualClock>) -> Self {
        Self { service, clock }
    }

    pub fn run(&self, scenario: &Scenario) -> anyhow::Result<ReplayReport> {
        self.clock.set(scenario.start);
        let mut new = NewTender::new(scenario.tender.title.clone(), scenario.tender.close_date);
        if let Some(id) = &scenario.tender.id {
            new = new.with_id(id.clone());
        }
        let tender = self.service.create_tender(new, "officer")?;
        let id = tender.id;

        let mut steps = Vec::with_capacity(scenario.steps.len());
        for (index, step) in scenario.steps.iter().enumerate() {
            let outcome = match self.apply(&id, step) {
                Ok(()) => StepOutcome {
                    index,
                    action: step.action.name().to_string(),
                    actor: step.actor.clone(),
                    accepted: true,
                    error_kind: None,
                    message: None,
                    as_expected: step.expect_error.is_none(),
                },
                Err(e) => StepOutcome {
                    index,
                    action: step.action.name().to_string(),
                    actor: step.actor.clone(),
                    accepted: false,
                    error_kind: Some(e.kind().to_string()),
                    as_expected: step.expect_error.as_deref() == Some(e.kind()),
                    message: Some(e.to_string()),
                },
            };
            if !outcome.as_expected {
                tracing::warn!(
                    step = index,
                    action = %outcome.action,
                    error = ?outcome.message,
                    "Step did not behave as scripted"
                );
            }
            steps.push(outcome);
        }

        Ok(ReplayReport {
            steps,
            tender: self.service.get_tender(&id)?,
            consensus: self.service.get_all_consensus(&id)?,
            ranking: self.service.get_ranking_detail(&id)?,
        })
    }

    fn apply(&self, id: &TenderId, step: &ScenarioStep) -> procura_core::Result<()> {
        let svc = self.service;
        let actor = step.actor.as_str();
        match &step.action {
            Action::Publish => svc.publish(id, actor).map(drop),
            Action::SubmitBid { vendor } => svc.submit_bid(id, vendor, actor).map(drop),
            Action::CloseBidding => svc.close_bidding(id, actor).map(drop),
            Action::AssignPanel { evaluators, chair } => svc
                .assign_panel(id, evaluators.clone(), chair.clone(), actor)
                .map(drop),
            Action::StartEvaluation => svc.start_evaluation(id, actor).map(drop),
            Action::SubmitScore {
                evaluator,
                vendor,
                technical,
                financial,
                draft,
                minutes,
            } => {
                let sheet = ScoreSheet {
                    technical: technical.clone(),
                    financial: financial.clone(),
                };
                let mut submission = ScoreSubmission::new(evaluator.clone(), vendor.clone(), sheet)
                    .time_spent(*minutes);
                if *draft {
                    submission = submission.draft();
                }
                svc.submit_score(id, submission, actor).map(drop)
            }
            Action::FlagScore {
                evaluator,
                vendor,
                reason,
            } => svc.flag_score(id, evaluator, vendor, reason, actor).map(drop),
            Action::ResolveFlag { evaluator, vendor } => {
                svc.resolve_flag(id, evaluator, vendor, actor).map(drop)
            }
            Action::JustifyOutlier {
                evaluator,
                vendor,
                justification,
            } => svc
                .justify_outlier(id, evaluator, vendor, justification, actor)
                .map(drop),
            Action::OverrideConsensus {
                vendor,
                chair,
                reason,
            } => svc.override_consensus(id, vendor, chair, reason).map(drop),
            Action::CompleteEvaluation => svc.complete_evaluation(id, actor).map(drop),
            Action::RequestNoc => svc.request_noc(id, actor).map(drop),
            Action::ApproveNoc => svc.approve_noc(id, actor).map(drop),
            Action::Award { vendor, amount } => svc.award(id, vendor, *amount, actor).map(drop),
            Action::CompleteContract => svc.complete_contract(id, actor).map(drop),
            Action::Cancel => svc.cancel(id, actor).map(drop),
            Action::Advance {
                days,
                hours,
                minutes,
            } => {
                let by =
                    Duration::days(*days) + Duration::hours(*hours) + Duration::minutes(*minutes);
                self.clock.advance(by);
                Ok(())
            }
            Action::SetClock { at } => {
                self.clock.set(*at);
                Ok(())
            }
        }
    }
}

/// Fail when any step diverged from the script
pub fn ensure_as_scripted(report: &ReplayReport) -> anyhow::Result<()> {
    let diverged: Vec<String> = report
        .unexpected()
        .map(|s| format!("step {} ({})", s.index, s.action))
        .collect();
    if !diverged.is_empty() {
        bail!("scenario diverged at {}", diverged.join(", "));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use procura_core::{ProcuraConfig, TenderStatus};

    const SCRIPT: &str = r#"{
        "start": "2024-02-01T09:00:00Z",
        "tender": {
            "id": "T-42", "title": "Ambulance fleet", "close_date": "2024-02-08T09:00:00Z"
        },
        "steps": [
            { "action": "assign_panel", "evaluators": ["E-1", "E-2"], "chair": "E-1" },
            { "action": "publish" },
            { "action": "submit_bid", "vendor": "V-1", "actor": "V-1" },
            { "action": "close_bidding", "expect_error": "invalid_transition" },
            { "action": "advance", "days": 7 },
            { "action": "close_bidding" },
            { "action": "start_evaluation" },
            { "action": "submit_score", "evaluator": "E-1", "vendor": "V-1",
              "technical": { "design": 80 }, "financial": { "price": 90 } },
            { "action": "complete_evaluation", "expect_error": "quorum_not_met" },
            { "action": "submit_score", "evaluator": "E-2", "vendor": "V-1",
              "technical": { "design": 84 }, "financial": { "price": 88 } },
            { "action": "complete_evaluation" },
            { "action": "award", "vendor": "V-1", "amount": 1000,
              "expect_error": "invalid_transition" },
            { "action": "request_noc" },
            { "action": "approve_noc", "actor": "regulator" },
            { "action": "award", "vendor": "V-1", "amount": 410000 }
        ]
    }"#;

    fn replay(script: &str) -> ReplayReport {
        let scenario = Scenario::from_json(script).unwrap();
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).unwrap()));
        let service = ProcurementService::new(ProcuraConfig::default()).with_clock(clock.clone());
        Replayer::new(&service, clock).run(&scenario).unwrap()
    }

    #[test]
    fn test_replay_follows_script() {
        let report = replay(SCRIPT);
        assert!(ensure_as_scripted(&report).is_ok());
        assert_eq!(report.tender.status, TenderStatus::ContractAwarded);
        assert_eq!(report.tender.id, TenderId::from("T-42"));
        assert_eq!(report.ranking.len(), 1);
        assert_eq!(report.consensus[0].mean_score, 86.2);
    }

    #[test]
    fn test_divergence_is_reported() {
        let script = SCRIPT.replace(
            r#"{ "action": "close_bidding", "expect_error": "invalid_transition" },"#,
            r#"{ "action": "close_bidding" },"#,
        );
        let report = replay(&script);
        let diverged: Vec<usize> = report.unexpected().map(|s| s.index).collect();
        assert_eq!(diverged, vec![3]);
        assert!(ensure_as_scripted(&report).is_err());
    }

    #[test]
    fn test_sample_scenario_replays() {
        let scenario = Scenario::from_json(include_str!("../scenarios/sample.json")).unwrap();
        let clock = Arc::new(ManualClock::new(scenario.start));
        let registry = procura_core::InMemoryVendorRegistry::with_vendors(scenario.vendors.clone());
        let service = ProcurementService::new(ProcuraConfig::default())
            .with_clock(clock.clone())
            .with_vendor_registry(Arc::new(registry));

        let report = Replayer::new(&service, clock).run(&scenario).unwrap();
        assert!(ensure_as_scripted(&report).is_ok());
        assert_eq!(report.tender.status, TenderStatus::Completed);
        assert_eq!(report.ranking[0].vendor_id, VendorId::from("V-ALPHA"));
        assert_eq!(report.ranking[0].mean_score, 87.7);
        assert_eq!(report.ranking[1].mean_score, 86.5);
    }

    #[test]
    fn test_step_defaults() {
        let step: ScenarioStep = serde_json::from_str(r#"{ "action": "cancel" }"#).unwrap();
        assert_eq!(step.actor, "officer");
        assert!(step.expect_error.is_none());
        assert_eq!(step.action.name(), "cancel");
    }
}
