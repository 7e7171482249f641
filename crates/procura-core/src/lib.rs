//! Procura Core - tender workflow state machine and evaluator consensus scoring
//!
//! Procura Core drives a public tender from draft to contract completion and
//! aggregates the independent scores of an evaluation panel into a
//! per-vendor consensus and a final ranking.
//!
//! # Architecture
//!
//! The crate is split into pure domain layers and a thin service on top:
//!
//! 1. **Tender aggregate** (`tender`, `workflow`): pure transition functions,
//!    monotonic workflow steps, NOC gating before award
//! 2. **Evaluation aggregate** (`evaluation`): score submission, flags,
//!    justifications, chair overrides and the quorum rule
//! 3. **Consensus engine** (`consensus`): weighted totals, variance
//!    classification, outlier detection and ranking
//! 4. **Collaborators** (`store`, `audit`, `notify`, `registry`): versioned
//!    repository, hash-chained audit log, notifications, vendor lookup
//! 5. **Service** (`service`): load → transition → versioned save → audit
//!
//! # Quick Start
//!
//! ```
//! use chrono::{Duration, TimeZone, Utc};
//! use procura_core::{
//!     EvaluatorId, ManualClock, NewTender, ProcurementService, ScoreSheet, ScoreSubmission,
//!     TenderStatus, VendorId,
//! };
//! use std::sync::Arc;
//!
//! let start = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
//! let clock = Arc::new(ManualClock::new(start));
//! let service = ProcurementService::default().with_clock(clock.clone());
//!
//! let tender = service
//!     .create_tender(NewTender::new("Road resurfacing", start + Duration::days(7)), "officer")
//!     .unwrap();
//! let id = tender.id;
//!
//! service
//!     .assign_panel(&id, vec![EvaluatorId::from("E-1")], None, "officer")
//!     .unwrap();
//! service.publish(&id, "officer").unwrap();
//! service.submit_bid(&id, &VendorId::from("V-1"), "V-1").unwrap();
//! clock.advance(Duration::days(7));
//! service.close_bidding(&id, "officer").unwrap();
//! service.start_evaluation(&id, "officer").unwrap();
//!
//! let sheet = ScoreSheet::new().technical("method", 80.0).financial("price", 90.0);
//! service
//!     .submit_score(&id, ScoreSubmission::new("E-1", "V-1", sheet), "E-1")
//!     .unwrap();
//! service.complete_evaluation(&id, "chair").unwrap();
//!
//! assert_eq!(service.get_ranking(&id).unwrap(), vec![VendorId::from("V-1")]);
//! assert_eq!(service.get_tender_state(&id).unwrap().status, TenderStatus::Evaluation);
//! ```

#![deny(unsafe_code)]
#![warn(rust_2018_idioms, missing_debug_implementations, clippy::all)]

pub mod audit;
pub mod config;
pub mod consensus;
pub mod error;
pub mod evaluation;
pub mod notify;
pub mod registry;
pub mod service;
pub mod store;
pub mod tender;
pub mod types;
pub mod workflow;

// Re-export commonly used types for convenience
pub use audit::{verify_chain, AuditEntry, AuditRecord, AuditSink, InMemoryAuditLog, JsonlAuditLog};
pub use config::{ProcuraConfig, ScoringPolicy};
pub use consensus::{ConsensusEngine, ConsensusResult, Outlier, RankedVendor};
pub use error::{ProcurementError, Result, ScoreError};
pub use evaluation::{
    IndividualScore, QuorumReport, ScoreSheet, ScoreSubmission, SubmitOutcome, TenderEvaluation,
};
pub use notify::{Notification, Notifier, TracingNotifier};
pub use registry::{InMemoryVendorRegistry, Vendor, VendorRegistry};
pub use service::{Clock, ManualClock, ProcurementService, SubmitReceipt, SystemClock};
pub use store::{InMemoryRepository, TenderRepository};
pub use tender::{NewTender, Tender, TenderState};
pub use types::{
    EvaluatorId, ScoreStatus, TenderId, TenderStatus, Timestamp, VarianceLevel, VendorId,
};
pub use workflow::Command;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
