use crate::orchestration::{
    ApprovalContext, ExecutionDisposition, PlanStep, StepResult,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
    Expired,
}

impl ApprovalStatus {
    pub fn is_terminal(self) -> bool {
        self != Self::Pending
    }
}

/// A write step waiting for a human decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingApproval {
    pub id: String,
    #[serde(alias = "created_at_iso")]
    pub created_at: DateTime<Utc>,
    #[serde(alias = "expires_at_iso")]
    pub expires_at: DateTime<Utc>,
    pub status: ApprovalStatus,
    /// Provenance of the request; always carries `correlation_id`.
    #[serde(default)]
    pub requester: Map<String, Value>,
    pub step: PlanStep,
    #[serde(default)]
    pub context: ApprovalContext,
    #[serde(default)]
    pub rationale: String,
    #[serde(default)]
    pub required_scopes: Vec<String>,
    /// Policy as evaluated when the record was created.
    #[serde(default)]
    pub policy_snapshot: Value,
    #[serde(default)]
    pub result: Option<StepResult>,
    #[serde(default)]
    pub error: Option<String>,
}

impl PendingApproval {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    pub fn correlation_id(&self) -> Option<&str> {
        self.requester.get("correlation_id").and_then(Value::as_str)
    }
}

/// Result of `approve`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApprovalOutcome {
    pub approval_id: String,
    pub disposition: ExecutionDisposition,
    pub result: StepResult,
    /// The record after the call; `None` when it was cleaned up.
    pub record: Option<PendingApproval>,
}

impl ApprovalOutcome {
    pub fn is_duplicate(&self) -> bool {
        self.disposition == ExecutionDisposition::DuplicateSuppressed
    }
}
