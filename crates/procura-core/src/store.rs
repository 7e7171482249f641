//! Repository collaborator
//!
//! Persistence is consumed through [`TenderRepository`]; the core only needs
//! versioned read/write access to the tender and evaluation aggregates.
//! Writes carry the version the caller read, and a mismatch is reported as
//! `WriteConflict` instead of being merged.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{ProcurementError, Result};
use crate::evaluation::TenderEvaluation;
use crate::tender::Tender;
use crate::types::TenderId;

/// Versioned storage of tender and evaluation aggregates
pub trait TenderRepository: Send + Sync {
    /// Store a new tender together with its (empty) evaluation, both at version 1
    fn create(
        &self,
        tender: Tender,
        evaluation: TenderEvaluation,
    ) -> Result<(Tender, TenderEvaluation)>;

    fn get_tender(&self, id: &TenderId) -> Result<Tender>;

    /// Replace the stored tender if its version still equals `expected_version`
    ///
    /// Returns the stored value with its version incremented.
    fn save_tender(&self, tender: Tender, expected_version: u64) -> Result<Tender>;

    fn get_evaluation(&self, id: &TenderId) -> Result<TenderEvaluation>;

    /// Replace the stored evaluation if its version still equals `expected_version`
    fn save_evaluation(
        &self,
        evaluation: TenderEvaluation,
        expected_version: u64,
    ) -> Result<TenderEvaluation>;

    /// Save a tender decided against evaluation version `evaluation_version`
    ///
    /// Fails with `WriteConflict` if either aggregate moved since it was read.
    /// Both checks and the write happen atomically.
    fn save_tender_pinned(
        &self,
        tender: Tender,
        expected_version: u64,
        evaluation_version: u64,
    ) -> Result<Tender>;

    /// Save an evaluation decided against tender version `tender_version`
    fn save_evaluation_pinned(
        &self,
        evaluation: TenderEvaluation,
        expected_version: u64,
        tender_version: u64,
    ) -> Result<TenderEvaluation>;

    fn tender_ids(&self) -> Vec<TenderId>;
}

fn conflict(entity: &'static str, id: &TenderId, expected: u64, actual: u64) -> ProcurementError {
    ProcurementError::WriteConflict {
        entity,
        id: id.to_string(),
        expected,
        actual,
    }
}

/// In-process repository backed by `parking_lot` locks
///
/// The version check and the write happen under the same write lock, so two
/// writers holding the same version cannot both succeed. Pinned writes take
/// the tender lock before the evaluation lock.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRepository {
    tenders: Arc<RwLock<HashMap<TenderId, Tender>>>,
    evaluations: Arc<RwLock<HashMap<TenderId, TenderEvaluation>>>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TenderRepository for InMemoryRepository {
    fn create(
        &self,
        mut tender: Tender,
        mut evaluation: TenderEvaluation,
    ) -> Result<(Tender, TenderEvaluation)> {
        let mut tenders = self.tenders.write();
        if tenders.contains_key(&tender.id) {
            return Err(ProcurementError::TenderAlreadyExists(tender.id));
        }
        tender.version = 1;
        evaluation.version = 1;
        tenders.insert(tender.id.clone(), tender.clone());
        self.evaluations
            .write()
            .insert(tender.id.clone(), evaluation.clone());
        Ok((tender, evaluation))
    }

    fn get_tender(&self, id: &TenderId) -> Result<Tender> {
        self.tenders
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| ProcurementError::TenderNotFound(id.clone()))
    }

    fn save_tender(&self, mut tender: Tender, expected_version: u64) -> Result<Tender> {
        let mut tenders = self.tenders.write();
        let stored = tenders
            .get_mut(&tender.id)
            .ok_or_else(|| ProcurementError::TenderNotFound(tender.id.clone()))?;
        if stored.version != expected_version {
            return Err(conflict("tender", &tender.id, expected_version, stored.version));
        }
        tender.version = expected_version + 1;
        *stored = tender.clone();
        Ok(tender)
    }

    fn get_evaluation(&self, id: &TenderId) -> Result<TenderEvaluation> {
        self.evaluations
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| ProcurementError::TenderNotFound(id.clone()))
    }

    fn save_evaluation(
        &self,
        mut evaluation: TenderEvaluation,
        expected_version: u64,
    ) -> Result<TenderEvaluation> {
        let mut evaluations = self.evaluations.write();
        let stored = evaluations
            .get_mut(&evaluation.tender_id)
            .ok_or_else(|| ProcurementError::TenderNotFound(evaluation.tender_id.clone()))?;
        if stored.version != expected_version {
            return Err(conflict(
                "evaluation",
                &evaluation.tender_id,
                expected_version,
                stored.version,
            ));
        }
        evaluation.version = expected_version + 1;
        *stored = evaluation.clone();
        Ok(evaluation)
    }

    fn save_tender_pinned(
        &self,
        mut tender: Tender,
        expected_version: u64,
        evaluation_version: u64,
    ) -> Result<Tender> {
        let mut tenders = self.tenders.write();
        let evaluations = self.evaluations.read();
        let stored = tenders
            .get_mut(&tender.id)
            .ok_or_else(|| ProcurementError::TenderNotFound(tender.id.clone()))?;
        if stored.version != expected_version {
            return Err(conflict("tender", &tender.id, expected_version, stored.version));
        }
        let current = evaluations
            .get(&tender.id)
            .map(|e| e.version)
            .ok_or_else(|| ProcurementError::TenderNotFound(tender.id.clone()))?;
        if current != evaluation_version {
            return Err(conflict("evaluation", &tender.id, evaluation_version, current));
        }
        tender.version = expected_version + 1;
        *stored = tender.clone();
        Ok(tender)
    }

    fn save_evaluation_pinned(
        &self,
        mut evaluation: TenderEvaluation,
        expected_version: u64,
        tender_version: u64,
    ) -> Result<TenderEvaluation> {
        let tenders = self.tenders.read();
        let mut evaluations = self.evaluations.write();
        let id = evaluation.tender_id.clone();
        let current = tenders
            .get(&id)
            .map(|t| t.version)
            .ok_or_else(|| ProcurementError::TenderNotFound(id.clone()))?;
        if current != tender_version {
            return Err(conflict("tender", &id, tender_version, current));
        }
        let stored = evaluations
            .get_mut(&id)
            .ok_or_else(|| ProcurementError::TenderNotFound(id.clone()))?;
        if stored.version != expected_version {
            return Err(conflict("evaluation", &id, expected_version, stored.version));
        }
        evaluation.version = expected_version + 1;
        *stored = evaluation.clone();
        Ok(evaluation)
    }

    fn tender_ids(&self) -> Vec<TenderId> {
        let mut ids: Vec<TenderId> = self.tenders.read().keys().cloned().collect();
        ids.sort();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tender::NewTender;
    use crate::types::now;

    fn seeded() -> (InMemoryRepository, Tender) {
        let repo = InMemoryRepository::new();
        let tender = Tender::draft(NewTender::new("Fleet leasing", now()).with_id("T-1"), now());
        let evaluation = TenderEvaluation::new(tender.id.clone());
        let (tender, _) = repo.create(tender, evaluation).unwrap();
        (repo, tender)
    }

    #[test]
    fn test_create_sets_version_one() {
        let (repo, tender) = seeded();
        assert_eq!(tender.version, 1);
        assert_eq!(repo.get_evaluation(&tender.id).unwrap().version, 1);
        assert_eq!(repo.tender_ids(), vec![TenderId::from("T-1")]);
    }

    #[test]
    fn test_duplicate_create_rejected() {
        let (repo, tender) = seeded();
        let evaluation = TenderEvaluation::new(tender.id.clone());
        let err = repo.create(tender, evaluation).unwrap_err();
        assert!(matches!(err, ProcurementError::TenderAlreadyExists(_)));
    }

    #[test]
    fn test_stale_write_conflicts() {
        let (repo, tender) = seeded();
        let saved = repo.save_tender(tender.clone(), 1).unwrap();
        assert_eq!(saved.version, 2);

        let err = repo.save_tender(tender, 1).unwrap_err();
        assert!(matches!(
            err,
            ProcurementError::WriteConflict { expected: 1, actual: 2, .. }
        ));
        assert_eq!(repo.get_tender(&saved.id).unwrap().version, 2);
    }

    #[test]
    fn test_stale_evaluation_write_conflicts() {
        let (repo, tender) = seeded();
        let evaluation = repo.get_evaluation(&tender.id).unwrap();
        let saved = repo.save_evaluation(evaluation.clone(), 1).unwrap();
        assert_eq!(saved.version, 2);

        let err = repo.save_evaluation(evaluation, 1).unwrap_err();
        assert!(matches!(
            err,
            ProcurementError::WriteConflict { entity: "evaluation", expected: 1, actual: 2, .. }
        ));
        assert_eq!(repo.get_evaluation(&tender.id).unwrap().version, 2);
    }

    #[test]
    fn test_pinned_tender_write_sees_evaluation_change() {
        let (repo, tender) = seeded();
        let evaluation = repo.get_evaluation(&tender.id).unwrap();
        repo.save_evaluation(evaluation, 1).unwrap();

        let err = repo.save_tender_pinned(tender.clone(), 1, 1).unwrap_err();
        assert!(matches!(err, ProcurementError::WriteConflict { entity: "evaluation", .. }));
        assert_eq!(repo.get_tender(&tender.id).unwrap().version, 1);

        let saved = repo.save_tender_pinned(tender, 1, 2).unwrap();
        assert_eq!(saved.version, 2);
    }

    #[test]
    fn test_pinned_evaluation_write_sees_tender_change() {
        let (repo, tender) = seeded();
        let evaluation = repo.get_evaluation(&tender.id).unwrap();
        repo.save_tender(tender, 1).unwrap();

        let err = repo
            .save_evaluation_pinned(evaluation.clone(), 1, 1)
            .unwrap_err();
        assert!(matches!(err, ProcurementError::WriteConflict { entity: "tender", .. }));
        assert_eq!(repo.get_evaluation(&evaluation.tender_id).unwrap().version, 1);

        let saved = repo.save_evaluation_pinned(evaluation, 1, 2).unwrap();
        assert_eq!(saved.version, 2);
    }

    #[test]
    fn test_missing_tender() {
        let repo = InMemoryRepository::new();
        let err = repo.get_tender(&TenderId::from("nope")).unwrap_err();
        assert!(matches!(err, ProcurementError::TenderNotFound(_)));
    }
}
