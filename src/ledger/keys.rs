//! Deterministic idempotency keys.
//!
//! Each key is the SHA-256 of a `|`-joined, namespaced tuple so unrelated
//! callers can share one ledger and re-derive a key without storing it.

use crate::orchestration::PlanStep;
use chrono::{DateTime, DurationRound, SecondsFormat, TimeDelta, Utc};
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Compact JSON with object keys sorted, used inside key material.
pub fn canonical_json(value: &Value) -> String {
    // serde_json's default Map is ordered, so plain serialization is canonical.
    serde_json::to_string(value).unwrap_or_default()
}

fn stable_hash(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(parts.join("|").as_bytes());
    hex::encode(hasher.finalize())
}

pub fn approval_execution_key(approval_id: &str, step: &PlanStep) -> String {
    let payload = canonical_json(&step.normalized_args());
    stable_hash(&[
        "approval_exec",
        approval_id,
        step.skill_name.as_deref().unwrap_or(""),
        &payload,
    ])
}

/// Key for one scheduled run.
///
/// A supplied `scheduled_at` is used as is. Without one the run is bucketed
/// to the minute of `now`, so repeated ticks within that minute collapse to
/// one key.
pub fn job_run_key(
    job_id: &str,
    scheduled_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    extra: &Value,
) -> String {
    let bucket = match scheduled_at {
        Some(at) => at.to_rfc3339_opts(SecondsFormat::AutoSi, false),
        None => minute_bucket(now),
    };
    let extra = match extra {
        Value::Null => "{}".to_string(),
        other => canonical_json(other),
    };
    stable_hash(&["job_run", job_id, &bucket, &extra])
}

pub fn rule_action_key(
    rule_id: &str,
    action_index: usize,
    item_id: Option<&str>,
    signature: &Value,
) -> String {
    let index = action_index.to_string();
    stable_hash(&[
        "rule_action",
        rule_id,
        &index,
        item_id.unwrap_or("none"),
        &canonical_json(signature),
    ])
}

fn minute_bucket(at: DateTime<Utc>) -> String {
    at.duration_trunc(TimeDelta::minutes(1))
        .unwrap_or(at)
        .to_rfc3339_opts(SecondsFormat::Secs, false)
}
