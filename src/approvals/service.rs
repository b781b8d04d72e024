use super::{ApprovalOutcome, ApprovalStatus, ApprovalStore, PendingApproval};
use crate::audit::{self, AuditSink};
use crate::config::ApprovalsConfig;
use crate::error::ApprovalError;
use crate::ledger::{ExecutionLedger, LedgerKind, LedgerStatus, approval_execution_key};
use crate::orchestration::{
    ApprovalContext, ExecutionDisposition, Executor, PlanStep, StepResult,
};
use crate::security::PolicyHandle;
use crate::skills::{SideEffect, SkillRegistry};
use crate::utils::{Clock, system_clock};
use chrono::TimeDelta;
use serde_json::{Map, Value, json};
use std::sync::Arc;
use std::time::Instant;

/// Human-gated execution of write steps.
///
/// Two idempotency layers guard `approve`: a cheap status check on the
/// stored record, then the ledger's `try_start`, which is authoritative
/// when two approvals race.
pub struct ApprovalService {
    store: ApprovalStore,
    ledger: ExecutionLedger,
    policy: PolicyHandle,
    audit: Arc<dyn AuditSink>,
    config: ApprovalsConfig,
    clock: Arc<dyn Clock>,
}

impl ApprovalService {
    pub fn new(
        store: ApprovalStore,
        ledger: ExecutionLedger,
        policy: PolicyHandle,
        audit: Arc<dyn AuditSink>,
        config: ApprovalsConfig,
    ) -> Self {
        Self {
            store,
            ledger,
            policy,
            audit,
            config,
            clock: system_clock(),
        }
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn store(&self) -> &ApprovalStore {
        &self.store
    }

    pub fn ledger(&self) -> &ExecutionLedger {
        &self.ledger
    }

    /// Persist a pending approval for a write step.
    ///
    /// Scopes come from `required_scopes` when given, else from the skill's
    /// capability. A policy denial creates nothing.
    pub fn create_pending(
        &self,
        step: &PlanStep,
        ctx: &ApprovalContext,
        requester: Map<String, Value>,
        rationale: String,
        registry: &SkillRegistry,
        required_scopes: Option<Vec<String>>,
    ) -> Result<PendingApproval, ApprovalError> {
        let skill_name = step
            .skill_name
            .as_deref()
            .ok_or(ApprovalError::MissingSkill)?;
        let capability = registry
            .capability(skill_name)
            .ok_or_else(|| ApprovalError::UnknownSkill(skill_name.to_string()))?;
        if capability.side_effect != SideEffect::Write {
            return Err(ApprovalError::NotWriteCapable(skill_name.to_string()));
        }

        let scopes = required_scopes
            .filter(|s| !s.is_empty())
            .unwrap_or(capability.required_scopes);
        let policy = self.policy.current();
        policy.check_scopes(&scopes)?;

        let mut requester = requester;
        let correlation_id = requester
            .get("correlation_id")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map_or_else(|| uuid::Uuid::new_v4().to_string(), str::to_string);
        requester.insert("correlation_id".into(), Value::String(correlation_id.clone()));

        let now = self.clock.now();
        let ttl = TimeDelta::try_hours(i64::from(self.config.ttl_hours.max(1)))
            .unwrap_or(TimeDelta::MAX);
        let record = PendingApproval {
            id: uuid::Uuid::new_v4().to_string(),
            created_at: now,
            expires_at: now + ttl,
            status: ApprovalStatus::Pending,
            requester,
            step: step.clone(),
            context: ctx.clone(),
            rationale,
            required_scopes: scopes,
            policy_snapshot: serde_json::to_value(policy.snapshot()).unwrap_or_default(),
            result: None,
            error: None,
        };
        self.store.upsert(&record)?;

        tracing::info!(approval_id = %record.id, skill = skill_name, %correlation_id, "approval created");
        audit::record(
            self.audit.as_ref(),
            "approval",
            &format!("Created pending approval for {skill_name}"),
            json!({
                "approval_id": record.id,
                "step_id": record.step.id,
                "required_scopes": record.required_scopes,
                "correlation_id": correlation_id,
            }),
        );
        Ok(record)
    }

    /// Approve and execute `id` at most once.
    pub async fn approve(
        &self,
        id: &str,
        approver_note: Option<&str>,
        executor: &Executor,
        registry: &SkillRegistry,
    ) -> Result<ApprovalOutcome, ApprovalError> {
        let Some(mut record) = self.store.get(id)? else {
            return self.duplicate_of_cleaned_record(id);
        };

        if record.status == ApprovalStatus::Approved {
            return Ok(ApprovalOutcome {
                approval_id: record.id.clone(),
                disposition: ExecutionDisposition::DuplicateSuppressed,
                result: StepResult::duplicate(&record.step.id),
                record: Some(record),
            });
        }
        if record.status != ApprovalStatus::Pending {
            return Err(ApprovalError::NotPending {
                id: record.id,
                status: record.status.to_string(),
            });
        }
        if record.is_expired(self.clock.now()) {
            self.expire(record)?;
            return Err(ApprovalError::Expired(id.to_string()));
        }

        // Scopes may have been disabled since the record was created.
        let policy = self.policy.reload();
        if let Err(denied) = policy.check_scopes(&record.required_scopes) {
            record.status = ApprovalStatus::Rejected;
            record.error = Some(denied.code());
            audit::record(
                self.audit.as_ref(),
                "approval",
                &format!("Rejected {} due to policy", skill_label(&record.step)),
                json!({
                    "approval_id": record.id,
                    "step_id": record.step.id,
                    "disabled_scopes": denied.disabled_scopes,
                }),
            );
            self.persist_or_clean(&record)?;
            return Err(denied.into());
        }

        let correlation_id = record
            .correlation_id()
            .map_or_else(|| uuid::Uuid::new_v4().to_string(), str::to_string);
        let started_at = Instant::now();
        let key = approval_execution_key(&record.id, &record.step);
        let started = self.ledger.try_start(
            &key,
            LedgerKind::ApprovalExec,
            Some(&correlation_id),
            meta(json!({
                "approval_id": record.id,
                "step_id": record.step.id,
                "skill_name": record.step.skill_name,
            })),
        )?;

        if !started {
            tracing::info!(approval_id = %record.id, %correlation_id, "approval execution already started; skipping");
            record.status = ApprovalStatus::Approved;
            record.result = Some(StepResult::duplicate(&record.step.id));
            record.error = None;
            audit::record(
                self.audit.as_ref(),
                "approval",
                &format!("Skipped duplicate approval for {}", skill_label(&record.step)),
                json!({
                    "approval_id": record.id,
                    "step_id": record.step.id,
                    "ok": true,
                    "approver_note": approver_note,
                    "correlation_id": correlation_id,
                    "skipped": true,
                    "reason": "idempotent_duplicate",
                }),
            );
            // The winning call owns the final record; only fill in a still-pending one.
            if !self.config.autoclean {
                self.store.upsert_if_pending(&record)?;
            }
            return Ok(ApprovalOutcome {
                approval_id: record.id.clone(),
                disposition: ExecutionDisposition::DuplicateSuppressed,
                result: StepResult::duplicate(&record.step.id),
                record: Some(record),
            });
        }

        let mut requester = Map::new();
        requester.insert("source".into(), json!("approval"));
        requester.insert("approval_id".into(), json!(record.id));
        requester.insert("approver_note".into(), json!(approver_note));
        requester.insert("correlation_id".into(), json!(correlation_id));

        let result = executor
            .execute_step(&record.step, &record.context, registry, self, &requester, true)
            .await;

        if result.ok {
            self.ledger.mark(&key, LedgerStatus::Succeeded, Map::new())?;
        } else {
            self.ledger.mark(
                &key,
                LedgerStatus::Failed,
                meta(json!({ "error": result.error.as_deref().unwrap_or("execution_failed") })),
            )?;
        }

        record.status = ApprovalStatus::Approved;
        record.result = Some(result.clone());
        record.error.clone_from(&result.error);
        record
            .requester
            .insert("correlation_id".into(), json!(correlation_id));
        audit::record(
            self.audit.as_ref(),
            "approval",
            &format!("Approved and executed {}", skill_label(&record.step)),
            json!({
                "approval_id": record.id,
                "step_id": record.step.id,
                "ok": result.ok,
                "approver_note": approver_note,
                "correlation_id": correlation_id,
            }),
        );
        let kept = self.persist_or_clean(&record)?;
        tracing::info!(
            approval_id = %record.id,
            ok = result.ok,
            duration_ms = u64::try_from(started_at.elapsed().as_millis()).unwrap_or(u64::MAX),
            "approval executed"
        );

        Ok(ApprovalOutcome {
            approval_id: record.id.clone(),
            disposition: ExecutionDisposition::Executed,
            result,
            record: kept.then_some(record),
        })
    }

    pub fn reject(&self, id: &str, reason: Option<&str>) -> Result<PendingApproval, ApprovalError> {
        let mut record = self
            .store
            .get(id)?
            .ok_or_else(|| ApprovalError::NotFound(id.to_string()))?;
        if record.status != ApprovalStatus::Pending {
            return Err(ApprovalError::NotPending {
                id: record.id,
                status: record.status.to_string(),
            });
        }
        if record.is_expired(self.clock.now()) {
            self.expire(record)?;
            return Err(ApprovalError::Expired(id.to_string()));
        }

        record.status = ApprovalStatus::Rejected;
        record.error = reason.map(str::to_string);
        audit::record(
            self.audit.as_ref(),
            "approval",
            &format!("Rejected {}", skill_label(&record.step)),
            json!({
                "approval_id": record.id,
                "reason": reason,
                "correlation_id": record.correlation_id(),
            }),
        );
        self.persist_or_clean(&record)?;
        tracing::info!(approval_id = %record.id, "approval rejected");
        Ok(record)
    }

    /// Eagerly expire stale pending approvals. Returns how many were affected.
    pub fn cleanup_expired(&self) -> Result<usize, ApprovalError> {
        let count = self
            .store
            .cleanup_expired(self.clock.now(), self.config.autoclean)?;
        if count > 0 {
            tracing::info!(count, "expired pending approvals");
            audit::record(
                self.audit.as_ref(),
                "approval",
                &format!("Expired {count} pending approval(s)"),
                json!({ "count": count, "autoclean": self.config.autoclean }),
            );
        }
        Ok(count)
    }

    pub fn list(&self, status: Option<ApprovalStatus>) -> Result<Vec<PendingApproval>, ApprovalError> {
        Ok(self.store.list(status)?)
    }

    fn expire(&self, mut record: PendingApproval) -> Result<(), ApprovalError> {
        record.status = ApprovalStatus::Expired;
        record.error = Some("approval expired".into());
        audit::record(
            self.audit.as_ref(),
            "approval",
            &format!("Expired {}", skill_label(&record.step)),
            json!({ "approval_id": record.id }),
        );
        self.persist_or_clean(&record)?;
        Ok(())
    }

    /// With autoclean a record that already executed may be gone from the
    /// store; the ledger still knows, so a repeat approve stays a no-op.
    fn duplicate_of_cleaned_record(&self, id: &str) -> Result<ApprovalOutcome, ApprovalError> {
        let Some(latest) = self.ledger.find_latest_for_approval(id)? else {
            return Err(ApprovalError::NotFound(id.to_string()));
        };
        if !latest.status.blocks_start() && latest.status != LedgerStatus::Failed {
            return Err(ApprovalError::NotFound(id.to_string()));
        }
        let step_id = latest
            .meta
            .get("step_id")
            .and_then(Value::as_str)
            .unwrap_or_default();
        Ok(ApprovalOutcome {
            approval_id: id.to_string(),
            disposition: ExecutionDisposition::DuplicateSuppressed,
            result: StepResult::duplicate(step_id),
            record: None,
        })
    }

    /// Terminal records are deleted under autoclean. Returns whether the record was kept.
    fn persist_or_clean(&self, record: &PendingApproval) -> Result<bool, ApprovalError> {
        if self.config.autoclean && record.status.is_terminal() {
            self.store.delete(&record.id)?;
            Ok(false)
        } else {
            self.store.upsert(record)?;
            Ok(true)
        }
    }
}

fn skill_label(step: &PlanStep) -> &str {
    step.skill_name.as_deref().unwrap_or("step")
}

fn meta(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

impl std::fmt::Debug for ApprovalService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApprovalService")
            .field("store", &self.store)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
