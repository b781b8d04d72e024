use super::{ApprovalContext, Plan, PlanStep, StepErrorKind, StepResult};
use crate::approvals::ApprovalService;
use crate::audit::{self, AuditSink};
use crate::error::{ApprovalError, ServiceError};
use crate::security::PolicyHandle;
use crate::skills::{InvalidArgs, SideEffect, SkillRegistry};
use serde_json::{Map, Value, json};
use std::sync::Arc;

/// Walks plan steps, applying policy, safe mode and the approval gate
/// before any skill runs.
pub struct Executor {
    policy: PolicyHandle,
    audit: Arc<dyn AuditSink>,
}

impl Executor {
    pub fn new(policy: PolicyHandle, audit: Arc<dyn AuditSink>) -> Self {
        Self { policy, audit }
    }

    /// Run one step. Never fails as a whole: every denial or error is
    /// reported in the returned [`StepResult`].
    ///
    /// With `force_execute_writes` the approval gate is skipped; that is how
    /// an approved record re-enters the executor.
    pub async fn execute_step(
        &self,
        step: &PlanStep,
        ctx: &ApprovalContext,
        registry: &SkillRegistry,
        approvals: &ApprovalService,
        requester: &Map<String, Value>,
        force_execute_writes: bool,
    ) -> StepResult {
        let Some(skill_name) = step.skill_name.as_deref() else {
            return StepResult::success(&step.id, format!("done:{}", step.description));
        };
        let Some(skill) = registry.get(skill_name) else {
            return StepResult::failure(
                &step.id,
                StepErrorKind::Validation,
                format!("unknown_skill:{skill_name}"),
            );
        };
        let capability = skill.capability();
        let policy = self.policy.current();

        if capability.side_effect == SideEffect::Write && policy.safe_mode() {
            tracing::info!(step_id = %step.id, skill = skill_name, "write step blocked by safe mode");
            return StepResult::failure(&step.id, StepErrorKind::SafeMode, "safe_mode_denied");
        }

        if let Err(denied) = policy.check_scopes(&capability.required_scopes) {
            self.policy_event(step, requester, &capability.required_scopes, "denied", Some(&denied.disabled_scopes));
            return StepResult::failure(&step.id, StepErrorKind::PolicyDenied, denied.code());
        }
        self.policy_event(step, requester, &capability.required_scopes, "allowed", None);

        let requires_approval =
            step.requires_approval || capability.side_effect == SideEffect::Write;
        if requires_approval && !force_execute_writes {
            return match approvals.create_pending(
                step,
                ctx,
                requester.clone(),
                approval_rationale(step),
                registry,
                Some(capability.required_scopes.clone()),
            ) {
                Ok(record) => StepResult::failure(
                    &step.id,
                    StepErrorKind::ApprovalRequired,
                    format!("approval_required:{}", record.id),
                ),
                Err(ApprovalError::PolicyDenied(denied)) => {
                    StepResult::failure(&step.id, StepErrorKind::PolicyDenied, denied.code())
                }
                Err(error) => {
                    StepResult::failure(&step.id, StepErrorKind::Execution, error.to_string())
                }
            };
        }

        match skill.execute(step.normalized_args()).await {
            Ok(output) => StepResult::success(&step.id, output.content),
            Err(error) => {
                let kind = classify(&error);
                tracing::warn!(step_id = %step.id, skill = skill_name, %kind, error = %format!("{error:#}"), "step failed");
                StepResult::failure(&step.id, kind, format!("{error:#}"))
            }
        }
    }

    /// Run every step in order; one failed step does not stop the rest.
    pub async fn execute_plan(
        &self,
        plan: &Plan,
        ctx: &ApprovalContext,
        registry: &SkillRegistry,
        approvals: &ApprovalService,
        requester: &Map<String, Value>,
        force_execute_writes: bool,
    ) -> Vec<StepResult> {
        let mut results = Vec::with_capacity(plan.steps.len());
        for step in &plan.steps {
            results.push(
                self.execute_step(step, ctx, registry, approvals, requester, force_execute_writes)
                    .await,
            );
        }
        results
    }

    fn policy_event(
        &self,
        step: &PlanStep,
        requester: &Map<String, Value>,
        required_scopes: &[String],
        decision: &str,
        disabled_scopes: Option<&[String]>,
    ) {
        let skill = step.skill_name.as_deref().unwrap_or_default();
        audit::record(
            self.audit.as_ref(),
            "policy",
            &format!("Policy {decision} {skill}"),
            json!({
                "decision": decision,
                "step_id": step.id,
                "skill_name": skill,
                "required_scopes": required_scopes,
                "disabled_scopes": disabled_scopes.unwrap_or_default(),
                "correlation_id": requester.get("correlation_id"),
                "source": requester.get("source").and_then(Value::as_str).unwrap_or("chat"),
            }),
        );
    }
}

fn classify(error: &anyhow::Error) -> StepErrorKind {
    if error.downcast_ref::<InvalidArgs>().is_some() {
        return StepErrorKind::Validation;
    }
    if error
        .downcast_ref::<ServiceError>()
        .is_some_and(ServiceError::is_degraded)
    {
        return StepErrorKind::ServiceDegraded;
    }
    StepErrorKind::Execution
}

/// Human-readable summary stored on the pending approval.
pub fn approval_rationale(step: &PlanStep) -> String {
    let skill = step.skill_name.as_deref().unwrap_or_default();
    if skill != "reminders.create" {
        return format!("This action will execute {skill}.");
    }
    let args = step.normalized_args();
    let message = args.get("message").and_then(Value::as_str);
    let due_at = args.get("due_at").and_then(Value::as_str);
    match (message, due_at) {
        (Some(message), Some(due_at)) => {
            format!("This action will create a reminder scheduled at {due_at} with message '{message}'.")
        }
        (Some(message), None) => format!("This action will create a reminder with message '{message}'."),
        _ => "This action will create a reminder.".to_string(),
    }
}
