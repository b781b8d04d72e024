use super::{ApprovalStatus, PendingApproval};
use crate::config::LedgerConfig;
use crate::error::{LedgerError, StoreError};
use crate::ledger::FileLock;
use crate::utils::fs::{read_jsonl, write_jsonl_atomic};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};

pub const APPROVALS_FILE: &str = "approvals.jsonl";
const APPROVALS_LOCK_FILE: &str = "approvals.lock";

/// `approvals.jsonl`, one evolving line per approval id. Every write
/// rewrites the whole file under the store lock.
#[derive(Debug, Clone)]
pub struct ApprovalStore {
    path: PathBuf,
    lock: FileLock,
}

impl ApprovalStore {
    pub fn new(state_dir: &Path, lock_config: &LedgerConfig) -> Self {
        Self {
            path: state_dir.join(APPROVALS_FILE),
            lock: FileLock::new(state_dir.join(APPROVALS_LOCK_FILE), lock_config),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Newest first, optionally filtered by status.
    pub fn list(&self, status: Option<ApprovalStatus>) -> Result<Vec<PendingApproval>, StoreError> {
        let mut records: Vec<PendingApproval> = read_jsonl::<PendingApproval>(&self.path)?
            .into_iter()
            .filter(|r| status.is_none_or(|s| r.status == s))
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records)
    }

    pub fn get(&self, id: &str) -> Result<Option<PendingApproval>, StoreError> {
        Ok(read_jsonl::<PendingApproval>(&self.path)?
            .into_iter()
            .find(|r| r.id == id))
    }

    pub fn find_by_correlation(
        &self,
        correlation_id: &str,
        limit: usize,
    ) -> Result<Vec<PendingApproval>, StoreError> {
        Ok(self
            .list(None)?
            .into_iter()
            .filter(|r| r.correlation_id() == Some(correlation_id))
            .take(limit)
            .collect())
    }

    pub fn upsert(&self, record: &PendingApproval) -> Result<(), LedgerError> {
        self.modify(|records| {
            match records.iter_mut().find(|r| r.id == record.id) {
                Some(existing) => *existing = record.clone(),
                None => records.push(record.clone()),
            }
            true
        })
    }

    /// Upsert unless the stored record already reached a terminal state.
    /// Returns whether anything was written.
    pub fn upsert_if_pending(&self, record: &PendingApproval) -> Result<bool, LedgerError> {
        let mut written = false;
        self.modify(|records| {
            match records.iter_mut().find(|r| r.id == record.id) {
                Some(existing) if existing.status.is_terminal() => return false,
                Some(existing) => *existing = record.clone(),
                None => return false,
            }
            written = true;
            true
        })?;
        Ok(written)
    }

    pub fn delete(&self, id: &str) -> Result<bool, LedgerError> {
        let mut removed = false;
        self.modify(|records| {
            let before = records.len();
            records.retain(|r| r.id != id);
            removed = records.len() != before;
            removed
        })?;
        Ok(removed)
    }

    /// Expire pending records whose TTL has passed. With `autoclean` they
    /// are dropped, otherwise kept with status `expired`.
    pub fn cleanup_expired(&self, now: DateTime<Utc>, autoclean: bool) -> Result<usize, LedgerError> {
        let mut changed = 0;
        self.modify(|records| {
            records.retain_mut(|r| {
                if r.status != ApprovalStatus::Pending || !r.is_expired(now) {
                    return true;
                }
                changed += 1;
                if autoclean {
                    return false;
                }
                r.status = ApprovalStatus::Expired;
                r.error = Some("approval expired".into());
                true
            });
            changed > 0
        })?;
        Ok(changed)
    }

    /// Locked read-modify-write; `apply` returns whether to write back.
    fn modify<F>(&self, apply: F) -> Result<(), LedgerError>
    where
        F: FnOnce(&mut Vec<PendingApproval>) -> bool,
    {
        let _guard = self.lock.acquire()?;
        let mut records = read_jsonl::<PendingApproval>(&self.path)?;
        if apply(&mut records) {
            write_jsonl_atomic(&self.path, &records)?;
        }
        Ok(())
    }
}
