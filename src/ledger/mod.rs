//! Durable idempotency log shared by approvals, scheduled jobs and rules.

pub mod keys;
mod lock;
mod types;

pub use keys::{approval_execution_key, canonical_json, job_run_key, rule_action_key};
pub use lock::{FileLock, LockGuard};
pub use types::{LedgerKind, LedgerRecord, LedgerStatus, LockMode, LockTimeoutBehavior};

use crate::config::LedgerConfig;
use crate::error::LedgerError;
use crate::utils::fs::{
    JsonlContents, append_jsonl, load_jsonl, read_jsonl, write_jsonl_atomic,
};
use crate::utils::{Clock, system_clock};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const LEDGER_FILE: &str = "executions.jsonl";
pub const LEDGER_LOCK_FILE: &str = "executions.lock";

/// Append-only execution ledger backed by `executions.jsonl`.
///
/// `try_start` and `mark` run under the ledger's file lock, which makes the
/// check-then-append in `try_start` the one cross-caller synchronization
/// point for at-most-once execution.
#[derive(Clone)]
pub struct ExecutionLedger {
    path: PathBuf,
    lock: FileLock,
    max_records: usize,
    clock: Arc<dyn Clock>,
}

impl ExecutionLedger {
    pub fn new(state_dir: &Path, config: &LedgerConfig) -> Self {
        Self {
            path: state_dir.join(LEDGER_FILE),
            lock: FileLock::new(state_dir.join(LEDGER_LOCK_FILE), config),
            max_records: config.max_records.max(1),
            clock: system_clock(),
        }
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Register a `started` record for `key`.
    ///
    /// Returns `false` without writing when the latest record for `key` is
    /// already `started` or `succeeded`; the caller must then skip execution.
    pub fn try_start(
        &self,
        key: &str,
        kind: LedgerKind,
        correlation_id: Option<&str>,
        meta: Map<String, Value>,
    ) -> Result<bool, LedgerError> {
        let _guard = self.lock.acquire()?;
        let contents = self.load_for_write()?;
        if let Some(latest) = latest_for(&contents.records, key)
            && latest.status.blocks_start()
        {
            tracing::debug!(key, status = %latest.status, "ledger start suppressed");
            return Ok(false);
        }

        let record = LedgerRecord {
            key: key.to_string(),
            kind,
            status: LedgerStatus::Started,
            timestamp: self.clock.now(),
            correlation_id: correlation_id.map(str::to_string),
            meta,
        };
        self.append_and_trim(contents, record)?;
        Ok(true)
    }

    /// Append a new record for `key` carrying the prior meta merged with `meta_update`.
    pub fn mark(
        &self,
        key: &str,
        status: LedgerStatus,
        meta_update: Map<String, Value>,
    ) -> Result<(), LedgerError> {
        let _guard = self.lock.acquire()?;
        let contents = self.load_for_write()?;
        let latest = latest_for(&contents.records, key);

        let mut meta = latest.map(|r| r.meta.clone()).unwrap_or_default();
        meta.extend(meta_update);
        let record = LedgerRecord {
            key: key.to_string(),
            kind: latest.map_or(LedgerKind::JobRun, |r| r.kind),
            status,
            timestamp: self.clock.now(),
            correlation_id: latest.and_then(|r| r.correlation_id.clone()),
            meta,
        };
        self.append_and_trim(contents, record)
    }

    pub fn has_succeeded(&self, key: &str) -> Result<bool, LedgerError> {
        Ok(self
            .latest(key)?
            .is_some_and(|r| r.status == LedgerStatus::Succeeded))
    }

    pub fn latest(&self, key: &str) -> Result<Option<LedgerRecord>, LedgerError> {
        let records = self.read_all()?;
        Ok(latest_for(&records, key).cloned())
    }

    /// Up to `limit` records, oldest first.
    pub fn list_recent(&self, limit: usize) -> Result<Vec<LedgerRecord>, LedgerError> {
        let mut records = self.read_all()?;
        let skip = records.len().saturating_sub(limit);
        Ok(records.split_off(skip))
    }

    /// Every record for `key`, oldest first.
    pub fn history(&self, key: &str) -> Result<Vec<LedgerRecord>, LedgerError> {
        Ok(self
            .read_all()?
            .into_iter()
            .filter(|r| r.key == key)
            .collect())
    }

    /// Latest approval execution whose meta names `approval_id`.
    pub fn find_latest_for_approval(
        &self,
        approval_id: &str,
    ) -> Result<Option<LedgerRecord>, LedgerError> {
        let records = self.read_all()?;
        // `mark` carries meta forward, so the newest tagged line is the latest for its key.
        Ok(records
            .into_iter()
            .rev()
            .filter(|r| r.kind == LedgerKind::ApprovalExec)
            .find(|r| r.meta.get("approval_id").and_then(Value::as_str) == Some(approval_id)))
    }

    /// Drop the oldest records beyond `max_records`.
    pub fn trim(&self, max_records: usize) -> Result<(), LedgerError> {
        let _guard = self.lock.acquire()?;
        let records = self.read_all()?;
        if records.len() > max_records {
            let skip = records.len() - max_records;
            write_jsonl_atomic(&self.path, &records[skip..])?;
        }
        Ok(())
    }

    fn read_all(&self) -> Result<Vec<LedgerRecord>, LedgerError> {
        Ok(read_jsonl(&self.path)?)
    }

    fn load_for_write(&self) -> Result<JsonlContents<LedgerRecord>, LedgerError> {
        Ok(load_jsonl(&self.path)?)
    }

    /// Appends when the file is clean; a torn tail or a full ledger forces a
    /// full rewrite so the skipped fragment never ends up mid-file.
    fn append_and_trim(
        &self,
        contents: JsonlContents<LedgerRecord>,
        record: LedgerRecord,
    ) -> Result<(), LedgerError> {
        let JsonlContents {
            mut records,
            torn_tail,
        } = contents;
        if !torn_tail && records.len() < self.max_records {
            append_jsonl(&self.path, &record)?;
            return Ok(());
        }
        if torn_tail {
            tracing::warn!(path = %self.path.display(), "rewriting ledger over torn tail");
        }
        records.push(record);
        let skip = records.len().saturating_sub(self.max_records);
        write_jsonl_atomic(&self.path, &records[skip..])?;
        Ok(())
    }
}

impl std::fmt::Debug for ExecutionLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionLedger")
            .field("path", &self.path)
            .field("max_records", &self.max_records)
            .finish_non_exhaustive()
    }
}

fn latest_for<'a>(records: &'a [LedgerRecord], key: &str) -> Option<&'a LedgerRecord> {
    records.iter().rev().find(|r| r.key == key)
}
