use crate::support;
use benjamin::approvals::ApprovalStatus;
use benjamin::error::ApprovalError;
use benjamin::orchestration::{ApprovalContext, PlanStep, StepErrorKind};
use benjamin::security::{SafeModeStore, ScopeMode};
use serde_json::{Map, json};
use tempfile::TempDir;

fn reminder_step() -> PlanStep {
    PlanStep::skill("remind", "reminders.create", json!({ "message": "call mom" }))
}

#[tokio::test]
async fn allowlist_mode_without_scopes_denies_write_steps() {
    let tmp = TempDir::new().unwrap();
    let (ctx, _clock) = support::context(tmp.path(), |config| {
        config.policy.scope_mode = ScopeMode::Allowlist;
        config.policy.scopes_enabled.clear();
    });

    let result = ctx
        .executor
        .execute_step(
            &reminder_step(),
            &ApprovalContext::new("errands"),
            &ctx.registry,
            &ctx.approvals,
            &Map::new(),
            false,
        )
        .await;

    assert!(!result.ok);
    assert_eq!(result.error_kind, Some(StepErrorKind::PolicyDenied));
    assert_eq!(result.error.as_deref(), Some("policy_denied:reminders.write"));
    assert!(ctx.approvals.list(None).unwrap().is_empty());

    let err = ctx
        .approvals
        .create_pending(
            &reminder_step(),
            &ApprovalContext::default(),
            Map::new(),
            String::new(),
            &ctx.registry,
            None,
        )
        .unwrap_err();
    let ApprovalError::PolicyDenied(denied) = err else {
        panic!("expected a policy denial, got {err:?}");
    };
    assert_eq!(denied.disabled_scopes, vec!["reminders.write".to_string()]);
    assert!(ctx.approvals.list(None).unwrap().is_empty());
}

#[tokio::test]
async fn allowed_write_step_waits_for_approval() {
    let tmp = TempDir::new().unwrap();
    let (ctx, _clock) = support::context(tmp.path(), |_| {});

    let result = ctx
        .executor
        .execute_step(
            &reminder_step(),
            &ApprovalContext::new("errands"),
            &ctx.registry,
            &ctx.approvals,
            &Map::new(),
            false,
        )
        .await;

    assert_eq!(result.error_kind, Some(StepErrorKind::ApprovalRequired));
    let pending = ctx.approvals.list(Some(ApprovalStatus::Pending)).unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].required_scopes, vec!["reminders.write".to_string()]);
    assert!(!tmp.path().join("reminders.jsonl").exists());
}

#[tokio::test]
async fn safe_mode_switch_applies_after_reload() {
    let tmp = TempDir::new().unwrap();
    let (ctx, _clock) = support::context(tmp.path(), |_| {});

    SafeModeStore::new(tmp.path()).set_enabled(true).unwrap();
    // The handle keeps serving the old policy until it is reloaded.
    assert!(!ctx.policy.current().safe_mode());
    assert!(ctx.policy.reload().safe_mode());

    let result = ctx
        .executor
        .execute_step(
            &reminder_step(),
            &ApprovalContext::default(),
            &ctx.registry,
            &ctx.approvals,
            &Map::new(),
            false,
        )
        .await;
    assert_eq!(result.error_kind, Some(StepErrorKind::SafeMode));
    assert!(ctx.approvals.list(None).unwrap().is_empty());
}
