use crate::support;
use benjamin::approvals::ApprovalStatus;
use benjamin::rules::{Rule, RuleAction, RuleTrigger, TriggerKind};
use benjamin::utils::Clock;
use chrono::TimeDelta;
use serde_json::{Map, Value, json};
use std::fs;
use tempfile::TempDir;

fn standup_rule(now: chrono::DateTime<chrono::Utc>) -> Rule {
    let mut trigger = RuleTrigger::new(TriggerKind::Schedule);
    trigger.every_minutes = 1;
    let mut rule = Rule::new("daily standup", trigger, now);
    let mut args = Map::new();
    args.insert("message".into(), json!("stand up and stretch"));
    rule.actions.push(RuleAction::ProposeStep {
        skill_name: "reminders.create".into(),
        args,
        rationale: "Scheduled nudge".into(),
    });
    rule.cooldown_minutes = 30;
    rule
}

#[tokio::test]
async fn scheduled_rule_proposes_and_approval_executes_once() {
    let tmp = TempDir::new().unwrap();
    let (ctx, clock) = support::context(tmp.path(), |_| {});
    let rule = ctx.rules.store().upsert(&standup_rule(clock.now())).unwrap();

    let results = ctx.rules.run_due().await.unwrap();
    assert_eq!(results.len(), 1);
    let run = &results[0];
    assert!(run.ok && run.matched);
    assert_eq!(run.actions_executed, 1);
    assert!(run.notes.iter().any(|n| n.starts_with("approval_created:")));

    let pending = ctx.approvals.list(Some(ApprovalStatus::Pending)).unwrap();
    assert_eq!(pending.len(), 1);
    let approval = &pending[0];
    assert_eq!(approval.requester.get("source"), Some(&Value::from("rule")));
    assert_eq!(approval.requester.get("rule_id"), Some(&Value::from(rule.id.clone())));
    assert_eq!(approval.context.goal, "Rule matched: daily standup");

    let outcome = ctx
        .approvals
        .approve(&approval.id, Some("sure"), &ctx.executor, &ctx.registry)
        .await
        .unwrap();
    assert!(outcome.result.ok);
    assert!(!outcome.is_duplicate());
    let reminders = fs::read_to_string(tmp.path().join("reminders.jsonl")).unwrap();
    assert_eq!(reminders.lines().count(), 1);
    assert!(reminders.contains("stand up and stretch"));

    // Within the cooldown nothing is proposed, and state survives on disk.
    clock.advance(TimeDelta::minutes(5));
    let results = ctx.rules.run_due().await.unwrap();
    assert!(results[0].has_note("cooldown_active"));
    assert!(ctx.approvals.list(None).unwrap().is_empty());

    let stored = ctx.rules.store().get(&rule.id).unwrap().unwrap();
    assert_eq!(stored.state.seen_ids.len(), 1);
    assert!(stored.state.cooldown_until.is_some());

    let preview = ctx.rules.preview(&rule.id).await.unwrap();
    assert!(preview.notes.iter().any(|n| n == "blocked_by_cooldown"));
    assert!(preview.planned_actions.iter().all(|a| !a.would_run()));

    // After the cooldown a new minute bucket produces a fresh proposal.
    clock.advance(TimeDelta::minutes(30));
    let results = ctx.rules.run_due().await.unwrap();
    assert_eq!(results[0].actions_executed, 1);
    assert_eq!(ctx.approvals.list(Some(ApprovalStatus::Pending)).unwrap().len(), 1);
}

#[tokio::test]
async fn daemon_tick_runs_jobs_once_per_minute() {
    let tmp = TempDir::new().unwrap();
    let (ctx, clock) = support::context(tmp.path(), |_| {});
    ctx.rules.store().upsert(&standup_rule(clock.now())).unwrap();

    let report = benjamin::daemon::tick(&ctx).await;
    assert_eq!(report.rules_evaluated, Some(1));
    assert_eq!(report.approvals_expired, Some(0));

    let again = benjamin::daemon::tick(&ctx).await;
    assert_eq!(again.rules_evaluated, None);
    assert_eq!(ctx.approvals.list(None).unwrap().len(), 1);
}
