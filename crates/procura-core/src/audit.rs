//! Audit trail
//!
//! Every committed transition and every score-level command is appended to
//! an [`AuditSink`]. Entries are chained with BLAKE3: each entry's hash
//! covers the previous entry's hash, so a rewritten or dropped entry breaks
//! [`verify_chain`].

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::error::Result;
use crate::types::{TenderId, Timestamp};

/// Hash of the (virtual) entry preceding the first one
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// An event as produced by the service, before chaining
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub tender_id: TenderId,
    pub actor: String,
    pub action: String,
    pub previous_state: Option<String>,
    pub new_state: String,
    #[serde(default)]
    pub detail: serde_json::Value,
    pub timestamp: Timestamp,
}

impl AuditRecord {
    pub fn new(
        tender_id: &TenderId,
        actor: &str,
        action: impl Into<String>,
        previous_state: Option<String>,
        new_state: impl Into<String>,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            tender_id: tender_id.clone(),
            actor: actor.to_string(),
            action: action.into(),
            previous_state,
            new_state: new_state.into(),
            detail: serde_json::Value::Null,
            timestamp,
        }
    }

    pub fn with_detail(mut self, detail: serde_json::Value) -> Self {
        self.detail = detail;
        self
    }
}

/// A chained, append-only audit entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: Uuid,
    pub sequence: u64,
    #[serde(flatten)]
    pub record: AuditRecord,
    pub previous_hash: String,
    pub hash: String,
}

impl AuditEntry {
    fn chain(record: AuditRecord, sequence: u64, previous_hash: String) -> Result<Self> {
        let hash = entry_hash(&record, sequence, &previous_hash)?;
        Ok(Self {
            id: Uuid::new_v4(),
            sequence,
            record,
            previous_hash,
            hash,
        })
    }
}

fn entry_hash(record: &AuditRecord, sequence: u64, previous_hash: &str) -> Result<String> {
    let mut hasher = blake3::Hasher::new();
    hasher.update(previous_hash.as_bytes());
    hasher.update(&sequence.to_le_bytes());
    hasher.update(&serde_json::to_vec(record)?);
    Ok(hex::encode(hasher.finalize().as_bytes()))
}

/// Check sequence continuity and hash links of a run of entries
pub fn verify_chain(entries: &[AuditEntry]) -> bool {
    let mut previous = GENESIS_HASH.to_string();
    for (i, entry) in entries.iter().enumerate() {
        if entry.sequence != i as u64 + 1 || entry.previous_hash != previous {
            return false;
        }
        match entry_hash(&entry.record, entry.sequence, &entry.previous_hash) {
            Ok(hash) if hash == entry.hash => previous = hash,
            _ => return false,
        }
    }
    true
}

/// Append-only destination of audit events
pub trait AuditSink: Send + Sync {
    fn append(&self, record: AuditRecord) -> Result<AuditEntry>;
}

#[derive(Debug)]
struct ChainHead {
    sequence: u64,
    hash: String,
}

impl Default for ChainHead {
    fn default() -> Self {
        Self {
            sequence: 0,
            hash: GENESIS_HASH.to_string(),
        }
    }
}

impl ChainHead {
    fn next(&mut self, record: AuditRecord) -> Result<AuditEntry> {
        let entry = AuditEntry::chain(record, self.sequence + 1, self.hash.clone())?;
        self.sequence = entry.sequence;
        self.hash = entry.hash.clone();
        Ok(entry)
    }
}

/// Audit log kept in memory
#[derive(Debug, Default)]
pub struct InMemoryAuditLog {
    inner: Mutex<(ChainHead, Vec<AuditEntry>)>,
}

impl InMemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        self.inner.lock().1.clone()
    }

    pub fn entries_for(&self, tender_id: &TenderId) -> Vec<AuditEntry> {
        self.inner
            .lock()
            .1
            .iter()
            .filter(|e| &e.record.tender_id == tender_id)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().1.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AuditSink for InMemoryAuditLog {
    fn append(&self, record: AuditRecord) -> Result<AuditEntry> {
        let mut guard = self.inner.lock();
        let (head, entries) = &mut *guard;
        let entry = head.next(record)?;
        entries.push(entry.clone());
        Ok(entry)
    }
}

/// Audit log appended to a JSON-lines file
///
/// Reopening an existing file resumes the chain from its last entry.
#[derive(Debug)]
pub struct JsonlAuditLog {
    path: PathBuf,
    head: Mutex<ChainHead>,
}

impl JsonlAuditLog {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let head = match Self::read_entries(&path)?.last() {
            Some(last) => ChainHead {
                sequence: last.sequence,
                hash: last.hash.clone(),
            },
            None => ChainHead::default(),
        };
        Ok(Self {
            path,
            head: Mutex::new(head),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read back every entry in the file
    pub fn entries(&self) -> Result<Vec<AuditEntry>> {
        Self::read_entries(&self.path)
    }

    fn read_entries(path: &Path) -> Result<Vec<AuditEntry>> {
        if !path.exists() {
            return Ok(Vec::new());
        }
        let content = std::fs::read_to_string(path)?;
        let mut entries = Vec::new();
        for line in content.lines() {
            if line.trim().is_empty() {
                continue;
            }
            entries.push(serde_json::from_str::<AuditEntry>(line)?);
        }
        Ok(entries)
    }
}

impl AuditSink for JsonlAuditLog {
    fn append(&self, record: AuditRecord) -> Result<AuditEntry> {
        let mut head = self.head.lock();
        let entry = AuditEntry::chain(record, head.sequence + 1, head.hash.clone())?;

        let mut line = serde_json::to_string(&entry)?;
        line.push('\n');
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())?;

        head.sequence = entry.sequence;
        head.hash = entry.hash.clone();
        Ok(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::now;

    fn record(action: &str) -> AuditRecord {
        AuditRecord::new(
            &TenderId::from("T-1"),
            "officer",
            action,
            Some("Draft".into()),
            "Published",
            now(),
        )
    }

    #[test]
    fn test_in_memory_chain_verifies() {
        let log = InMemoryAuditLog::new();
        log.append(record("publish")).unwrap();
        log.append(record("close_bidding")).unwrap();
        let entries = log.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].previous_hash, GENESIS_HASH);
        assert_eq!(entries[1].previous_hash, entries[0].hash);
        assert!(verify_chain(&entries));
    }

    #[test]
    fn test_tampering_breaks_chain() {
        let log = InMemoryAuditLog::new();
        log.append(record("publish")).unwrap();
        log.append(record("award")).unwrap();
        let mut entries = log.entries();
        entries[0].record.actor = "someone else".into();
        assert!(!verify_chain(&entries));

        let mut dropped = log.entries();
        dropped.remove(0);
        assert!(!verify_chain(&dropped));
    }

    #[test]
    fn test_jsonl_resumes_chain() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit").join("events.jsonl");

        let log = JsonlAuditLog::open(&path).unwrap();
        log.append(record("publish")).unwrap();
        drop(log);

        let reopened = JsonlAuditLog::open(&path).unwrap();
        let entry = reopened.append(record("close_bidding")).unwrap();
        assert_eq!(entry.sequence, 2);

        let entries = reopened.entries().unwrap();
        assert_eq!(entries.len(), 2);
        assert!(verify_chain(&entries));
    }
}
