//! Audit trail consumed by every core component.

use crate::error::StoreError;
use crate::utils::fs::{append_jsonl, read_jsonl};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

pub const EPISODIC_FILE: &str = "episodic.jsonl";

/// Append-only sink for audit entries (`kind` is e.g. `approval`, `rule`, `infra`).
pub trait AuditSink: Send + Sync {
    fn append(&self, kind: &str, summary: &str, meta: Value) -> anyhow::Result<()>;
}

/// Record an audit entry, logging instead of failing the caller.
pub fn record(sink: &dyn AuditSink, kind: &str, summary: &str, meta: Value) {
    if let Err(error) = sink.append(kind, summary, meta) {
        tracing::warn!(kind, summary, %error, "failed to append audit entry");
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: String,
    pub kind: String,
    pub summary: String,
    #[serde(default)]
    pub meta: Value,
    pub created_at: DateTime<Utc>,
}

impl AuditEntry {
    fn new(kind: &str, summary: &str, meta: Value) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind: kind.to_string(),
            summary: summary.to_string(),
            meta,
            created_at: Utc::now(),
        }
    }
}

/// Episodic memory file (`episodic.jsonl`) used as the audit trail.
#[derive(Debug, Clone)]
pub struct EpisodicLog {
    path: PathBuf,
}

impl EpisodicLog {
    pub fn new(state_dir: &Path) -> Self {
        Self {
            path: state_dir.join(EPISODIC_FILE),
        }
    }

    /// Newest-last entries, optionally filtered by kind.
    pub fn recent(&self, limit: usize, kind: Option<&str>) -> Result<Vec<AuditEntry>, StoreError> {
        let mut entries: Vec<AuditEntry> = read_jsonl::<AuditEntry>(&self.path)?
            .into_iter()
            .filter(|e| kind.is_none_or(|k| e.kind == k))
            .collect();
        let skip = entries.len().saturating_sub(limit);
        Ok(entries.split_off(skip))
    }
}

impl AuditSink for EpisodicLog {
    fn append(&self, kind: &str, summary: &str, meta: Value) -> anyhow::Result<()> {
        append_jsonl(&self.path, &AuditEntry::new(kind, summary, meta))?;
        Ok(())
    }
}

/// In-memory sink, handy for embedding and tests.
#[derive(Debug, Default)]
pub struct MemoryAudit {
    entries: Mutex<Vec<AuditEntry>>,
}

impl MemoryAudit {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    pub fn of_kind(&self, kind: &str) -> Vec<AuditEntry> {
        self.entries()
            .into_iter()
            .filter(|e| e.kind == kind)
            .collect()
    }
}

impl AuditSink for MemoryAudit {
    fn append(&self, kind: &str, summary: &str, meta: Value) -> anyhow::Result<()> {
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(AuditEntry::new(kind, summary, meta));
        Ok(())
    }
}
