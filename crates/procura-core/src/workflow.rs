//! Workflow controller
//!
//! Pure transition functions over the [`Tender`] aggregate. Each function
//! takes the current tender and the command's inputs and returns either a
//! brand new tender or an error; the input is never modified, so a rejected
//! command cannot leave a partially applied transition behind.
//!
//! ```text
//! Draft ─publish─► Published ─close_bidding─► Bidding ─start_evaluation─► Evaluation
//!                                                                            │
//!                                                           complete_evaluation (quorum)
//!                                                                            │
//! Completed ◄─complete_contract─ ContractAwarded ◄─award─ NocApproved ◄─approve_noc─ NocRequested
//!
//! cancel: any non-terminal state ─► Cancelled
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{ProcurementError, Result};
use crate::evaluation::QuorumReport;
use crate::tender::Tender;
use crate::types::{Timestamp, TenderStatus, VendorId};

/// A lifecycle command against one tender
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    Publish,
    SubmitBid { vendor_id: VendorId },
    CloseBidding,
    StartEvaluation,
    CompleteEvaluation { quorum: QuorumReport },
    RequestNoc,
    ApproveNoc,
    Award { vendor_id: VendorId, amount: f64 },
    CompleteContract,
    Cancel,
}

impl Command {
    /// Name used in errors, logs and audit events
    pub fn name(&self) -> &'static str {
        match self {
            Self::Publish => "publish",
            Self::SubmitBid { .. } => "submit_bid",
            Self::CloseBidding => "close_bidding",
            Self::StartEvaluation => "start_evaluation",
            Self::CompleteEvaluation { .. } => "complete_evaluation",
            Self::RequestNoc => "request_noc",
            Self::ApproveNoc => "approve_noc",
            Self::Award { .. } => "award",
            Self::CompleteContract => "complete_contract",
            Self::Cancel => "cancel",
        }
    }
}

/// Apply a command, returning the transitioned tender
///
/// The resulting tender is checked for step monotonicity before it is
/// handed back.
pub fn apply(tender: &Tender, command: &Command, now: Timestamp) -> Result<Tender> {
    let next = match command {
        Command::Publish => publish(tender, now),
        Command::SubmitBid { vendor_id } => submit_bid(tender, vendor_id, now),
        Command::CloseBidding => close_bidding(tender, now),
        Command::StartEvaluation => start_evaluation(tender, now),
        Command::CompleteEvaluation { quorum } => complete_evaluation(tender, quorum, now),
        Command::RequestNoc => request_noc(tender, now),
        Command::ApproveNoc => approve_noc(tender, now),
        Command::Award { vendor_id, amount } => award(tender, vendor_id, *amount, now),
        Command::CompleteContract => complete_contract(tender, now),
        Command::Cancel => cancel(tender, now),
    }?;
    ensure_monotonic(tender, &next)?;
    Ok(next)
}

/// Draft → Published
pub fn publish(tender: &Tender, now: Timestamp) -> Result<Tender> {
    require_status(tender, "publish", TenderStatus::Draft)?;
    Ok(advance(tender, TenderStatus::Published, now))
}

/// Record a bid while the tender is published
///
/// A vendor bidding twice is recorded once.
pub fn submit_bid(tender: &Tender, vendor_id: &VendorId, now: Timestamp) -> Result<Tender> {
    require_status(tender, "submit_bid", TenderStatus::Published)?;
    let mut next = tender.clone();
    next.bidders.insert(vendor_id.clone());
    next.bids_received = next.bidders.len() as u32;
    next.updated_at = now;
    Ok(next)
}

/// Published → Bidding (closed), once the close date has passed
pub fn close_bidding(tender: &Tender, now: Timestamp) -> Result<Tender> {
    require_status(tender, "close_bidding", TenderStatus::Published)?;
    if tender.close_date > now {
        return Err(reject(
            tender,
            "close_bidding",
            format!("bidding window is open until {}", tender.close_date.to_rfc3339()),
        ));
    }
    Ok(advance(tender, TenderStatus::Bidding, now))
}

/// Bidding → Evaluation, requires at least one bid
pub fn start_evaluation(tender: &Tender, now: Timestamp) -> Result<Tender> {
    require_status(tender, "start_evaluation", TenderStatus::Bidding)?;
    if tender.bids_received == 0 {
        return Err(reject(tender, "start_evaluation", "no bids received".into()));
    }
    Ok(advance(tender, TenderStatus::Evaluation, now))
}

/// Mark evaluation complete once the aggregator reports quorum
pub fn complete_evaluation(
    tender: &Tender,
    quorum: &QuorumReport,
    now: Timestamp,
) -> Result<Tender> {
    require_status(tender, "complete_evaluation", TenderStatus::Evaluation)?;
    if tender.evaluation_completed {
        return Err(reject(
            tender,
            "complete_evaluation",
            "evaluation already completed".into(),
        ));
    }
    if quorum.tender_id != tender.id {
        return Err(reject(
            tender,
            "complete_evaluation",
            format!("quorum report belongs to tender {}", quorum.tender_id),
        ));
    }
    if !quorum.met {
        return Err(ProcurementError::QuorumNotMet {
            tender_id: tender.id.clone(),
            completed: quorum.completed,
            required: quorum.required,
        });
    }
    let mut next = advance(tender, TenderStatus::Evaluation, now);
    next.evaluation_completed = true;
    Ok(next)
}

/// Evaluation (completed) → NocRequested
pub fn request_noc(tender: &Tender, now: Timestamp) -> Result<Tender> {
    if !tender.evaluation_completed {
        return Err(reject(tender, "request_noc", "evaluation is not completed".into()));
    }
    require_status(tender, "request_noc", TenderStatus::Evaluation)?;
    let mut next = advance(tender, TenderStatus::NocRequested, now);
    next.noc_requested = true;
    next.noc_requested_at = Some(now);
    Ok(next)
}

/// NocRequested → NocApproved
pub fn approve_noc(tender: &Tender, now: Timestamp) -> Result<Tender> {
    if !tender.noc_requested {
        return Err(reject(tender, "approve_noc", "NOC was never requested".into()));
    }
    require_status(tender, "approve_noc", TenderStatus::NocRequested)?;
    let mut next = advance(tender, TenderStatus::NocApproved, now);
    next.noc_approved = true;
    next.noc_approved_at = Some(now);
    Ok(next)
}

/// NocApproved → ContractAwarded
///
/// The regulatory control point: no award without an approved NOC.
pub fn award(tender: &Tender, vendor_id: &VendorId, amount: f64, now: Timestamp) -> Result<Tender> {
    if !(tender.noc_approved && tender.status == TenderStatus::NocApproved) {
        let reason = if tender.noc_approved {
            format!("tender is {}, not awaiting award", tender.status)
        } else {
            "NOC has not been approved".to_string()
        };
        return Err(reject(tender, "award", reason));
    }
    let mut next = advance(tender, TenderStatus::ContractAwarded, now);
    next.awarded_vendor_id = Some(vendor_id.clone());
    next.award_amount = Some(amount);
    next.awarded_at = Some(now);
    Ok(next)
}

/// ContractAwarded → Completed
pub fn complete_contract(tender: &Tender, now: Timestamp) -> Result<Tender> {
    require_status(tender, "complete_contract", TenderStatus::ContractAwarded)?;
    let mut next = advance(tender, TenderStatus::Completed, now);
    next.completed_at = Some(now);
    Ok(next)
}

/// Any non-terminal state → Cancelled (irreversible)
pub fn cancel(tender: &Tender, now: Timestamp) -> Result<Tender> {
    if tender.status.is_terminal() {
        return Err(reject(tender, "cancel", "tender is already closed".into()));
    }
    let mut next = advance(tender, TenderStatus::Cancelled, now);
    next.cancelled_at = Some(now);
    Ok(next)
}

/// Fail with `InconsistentState` if `next` would move the step backwards
pub fn ensure_monotonic(prev: &Tender, next: &Tender) -> Result<()> {
    if next.workflow_step < prev.workflow_step {
        return Err(ProcurementError::InconsistentState {
            tender_id: prev.id.clone(),
            reason: format!(
                "workflow step would decrease from {} to {}",
                prev.workflow_step, next.workflow_step
            ),
        });
    }
    Ok(())
}

fn require_status(tender: &Tender, command: &'static str, expected: TenderStatus) -> Result<()> {
    if tender.status != expected {
        return Err(reject(tender, command, format!("requires status {}", expected)));
    }
    Ok(())
}

fn reject(tender: &Tender, command: &'static str, reason: String) -> ProcurementError {
    ProcurementError::InvalidTransition {
        tender_id: tender.id.clone(),
        command,
        status: tender.status,
        reason,
    }
}

fn advance(tender: &Tender, status: TenderStatus, now: Timestamp) -> Tender {
    debug_assert!(tender.status.can_transition_to(status));
    let mut next = tender.clone();
    next.status = status;
    if let Some(step) = status.workflow_step() {
        next.workflow_step = next.workflow_step.max(step);
    }
    next.updated_at = now;
    next
}
