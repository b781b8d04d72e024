use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Which caller namespace a ledger key belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum LedgerKind {
    ApprovalExec,
    JobRun,
    RuleAction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum LedgerStatus {
    Started,
    Succeeded,
    Failed,
    Skipped,
}

impl LedgerStatus {
    /// A key whose latest status blocks another `try_start`.
    pub fn blocks_start(self) -> bool {
        matches!(self, Self::Started | Self::Succeeded)
    }
}

/// One appended ledger line. Only the latest line per key is authoritative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerRecord {
    pub key: String,
    pub kind: LedgerKind,
    pub status: LedgerStatus,
    #[serde(alias = "ts_iso")]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub correlation_id: Option<String>,
    #[serde(default)]
    pub meta: Map<String, Value>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockMode {
    /// Cooperative sentinel file guarding every read-modify-write.
    #[default]
    File,
    /// No locking. Only safe with a single writer.
    None,
}

/// What a store does when the sentinel cannot be taken before the deadline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockTimeoutBehavior {
    /// Return `LedgerError::LockTimeout` and leave the store untouched.
    #[default]
    Fail,
    /// Log a warning and run unlocked.
    Proceed,
}
