//! Notification hooks
//!
//! Fire-and-forget: the service calls the [`Notifier`] after a transition
//! has been committed, and a delivery failure is only logged.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{TenderId, Timestamp, VendorId};

/// Workflow milestones that notify interested parties
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    NocRequested {
        tender_id: TenderId,
        requested_by: String,
        at: Timestamp,
    },
    NocApproved {
        tender_id: TenderId,
        approved_by: String,
        at: Timestamp,
    },
    ContractAwarded {
        tender_id: TenderId,
        vendor_id: VendorId,
        amount: f64,
        at: Timestamp,
    },
}

impl Notification {
    pub fn tender_id(&self) -> &TenderId {
        match self {
            Self::NocRequested { tender_id, .. }
            | Self::NocApproved { tender_id, .. }
            | Self::ContractAwarded { tender_id, .. } => tender_id,
        }
    }
}

#[derive(Error, Debug)]
#[error("notification delivery failed: {0}")]
pub struct NotifyError(pub String);

/// Delivery channel for workflow notifications
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// Notifier that only emits a `tracing` event
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        tracing::info!(
            tender_id = %notification.tender_id(),
            ?notification,
            "Workflow notification"
        );
        Ok(())
    }
}
