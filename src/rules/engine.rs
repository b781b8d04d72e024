use super::sources::TriggerSources;
use super::template::render_notify;
use super::types::{
    PlannedAction, Rule, RuleAction, RulePreview, RuleRunResult, TriggerItem,
};
use crate::approvals::ApprovalService;
use crate::audit::{self, AuditSink};
use crate::error::{ApprovalError, RuleError};
use crate::ledger::{LedgerKind, LedgerStatus, rule_action_key};
use crate::notify::Notifier;
use crate::orchestration::{ApprovalContext, PlanStep};
use crate::security::{PermissionsPolicy, PolicyHandle};
use crate::skills::{SideEffect, SkillRegistry};
use crate::utils::{Clock, system_clock};
use chrono::{SecondsFormat, TimeDelta};
use serde_json::{Map, Value, json};
use std::sync::Arc;

/// Trigger → condition → action evaluation for one rule at a time.
///
/// Rules share nothing with each other; all per-rule bookkeeping lives in
/// [`Rule::state`], which `evaluate_rule` mutates and the caller persists.
pub struct RuleEngine {
    approvals: Arc<ApprovalService>,
    registry: Arc<SkillRegistry>,
    notifier: Arc<dyn Notifier>,
    sources: TriggerSources,
    policy: PolicyHandle,
    audit: Arc<dyn AuditSink>,
    seen_ids_max: usize,
    clock: Arc<dyn Clock>,
}

enum Proposal {
    Created(String),
    AlreadyProposed,
    Blocked(String),
}

impl RuleEngine {
    pub fn new(
        approvals: Arc<ApprovalService>,
        registry: Arc<SkillRegistry>,
        notifier: Arc<dyn Notifier>,
        sources: TriggerSources,
        policy: PolicyHandle,
        audit: Arc<dyn AuditSink>,
        seen_ids_max: usize,
    ) -> Self {
        Self {
            approvals,
            registry,
            notifier,
            sources,
            policy,
            audit,
            seen_ids_max: seen_ids_max.max(1),
            clock: system_clock(),
        }
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn sources(&self) -> &TriggerSources {
        &self.sources
    }

    pub(crate) fn now(&self) -> chrono::DateTime<chrono::Utc> {
        self.clock.now()
    }

    /// Evaluate `rule` once, updating `rule.state` in place.
    ///
    /// Connector failures and per-action denials are reported in the
    /// result; only ledger or store failures are returned as errors.
    pub async fn evaluate_rule(&self, rule: &mut Rule) -> Result<RuleRunResult, RuleError> {
        let now = self.clock.now();
        let mut result = RuleRunResult::new(&rule.id);

        if rule.state.in_cooldown(now) {
            rule.state.last_run = Some(now);
            result.notes.push("cooldown_active".into());
            tracing::debug!(rule_id = %rule.id, "rule in cooldown");
            self.audit_run(rule, &result);
            return Ok(result);
        }
        rule.state.last_run = Some(now);

        let items = match self.sources.load(&rule.trigger, now).await {
            Ok(items) => items,
            Err(RuleError::Service(error)) if error.is_degraded() => {
                return Ok(self.failed_run(rule, result, "service_degraded", &error.to_string()));
            }
            Err(error @ (RuleError::Service(_) | RuleError::MissingSource(_))) => {
                return Ok(self.failed_run(rule, result, "trigger_failed", &error.to_string()));
            }
            Err(error) => return Err(error),
        };
        result.notes.push(format!("trigger_count={}", items.len()));

        let candidates: Vec<TriggerItem> = items
            .into_iter()
            .filter(|item| !rule.state.already_processed(item))
            .collect();
        let matches: Vec<TriggerItem> = candidates
            .iter()
            .filter(|item| rule.condition.matches(&item.text))
            .cloned()
            .collect();
        result.match_count = matches.len();
        result.matched = !matches.is_empty();

        if result.matched {
            rule.state.last_match = Some(now);
            let policy = self.policy.reload();
            for (index, action) in rule.actions.iter().enumerate() {
                if result.actions_executed >= rule.max_actions_per_run {
                    result.notes.push("action_cap_reached".into());
                    break;
                }
                match action {
                    RuleAction::Notify {
                        title,
                        body_template,
                    } => {
                        let body = render_notify(body_template, &matches, now);
                        match self
                            .notifier
                            .send(title, &body, json!({ "rule_id": rule.id }))
                            .await
                        {
                            Ok(()) => {
                                result.notes.push("notify_sent".into());
                                result.actions_executed += 1;
                            }
                            Err(error) => {
                                tracing::warn!(rule_id = %rule.id, notifier = self.notifier.name(), error = %format!("{error:#}"), "notify failed");
                                result.notes.push(format!("notify_failed:{error}"));
                            }
                        }
                    }
                    RuleAction::ProposeStep {
                        skill_name,
                        args,
                        rationale,
                    } => match self.propose(
                        rule, index, &policy, skill_name, args, rationale, &matches,
                    )? {
                        Proposal::Created(approval_id) => {
                            result.notes.push(format!("approval_created:{approval_id}"));
                            result.actions_executed += 1;
                        }
                        Proposal::AlreadyProposed => {
                            result.notes.push("deduped_by_ledger".into());
                        }
                        Proposal::Blocked(reason) => result.notes.push(reason),
                    },
                }
            }
        }

        // Every candidate is bookkept, matched or not, so nothing is reprocessed.
        for item in &candidates {
            rule.state.remember(item, self.seen_ids_max);
        }
        if result.actions_executed > 0 && rule.cooldown_minutes > 0 {
            rule.state.cooldown_until =
                Some(now + TimeDelta::minutes(i64::from(rule.cooldown_minutes)));
        }

        tracing::info!(
            rule_id = %rule.id,
            matched = result.matched,
            match_count = result.match_count,
            actions = result.actions_executed,
            "rule_evaluated"
        );
        self.audit_run(rule, &result);
        Ok(result)
    }

    /// Dry run of [`RuleEngine::evaluate_rule`]: no notification,
    /// no approval, no ledger write and no state change. Breakers are only
    /// peeked at, so a preview never opens or probes one.
    pub async fn evaluate_rule_preview(&self, rule: &Rule) -> Result<RulePreview, RuleError> {
        let now = self.clock.now();
        let mut notes = Vec::new();
        let cooldown = rule
            .state
            .cooldown_until
            .filter(|_| rule.state.in_cooldown(now));
        if cooldown.is_some() {
            notes.push("blocked_by_cooldown".to_string());
        }

        let items = self.sources.peek(&rule.trigger, now).await?;
        notes.push(format!("trigger_count={}", items.len()));
        let matched_items: Vec<TriggerItem> = items
            .into_iter()
            .filter(|item| !rule.state.already_processed(item))
            .filter(|item| rule.condition.matches(&item.text))
            .collect();

        let mut planned_actions = Vec::new();
        if matched_items.is_empty() {
            notes.push("no_match".into());
        } else {
            let policy = self.policy.current();
            let mut would_run = 0;
            for (index, action) in rule.actions.iter().enumerate() {
                if would_run >= rule.max_actions_per_run {
                    notes.push("action_cap_reached".into());
                    break;
                }
                let (summary, mut blocked_reason) = match action {
                    RuleAction::Notify { body_template, .. } => {
                        (render_notify(body_template, &matched_items, now), None)
                    }
                    RuleAction::ProposeStep {
                        skill_name,
                        args,
                        rationale,
                    } => {
                        let reason = match self.check_proposal(&policy, skill_name) {
                            Err(reason) => Some(reason),
                            Ok(_) => {
                                let key = proposal_key(rule, index, skill_name, args, rationale, &matched_items);
                                self.approvals
                                    .ledger()
                                    .latest(&key)?
                                    .filter(|record| record.status.blocks_start())
                                    .map(|_| "already_proposed".to_string())
                            }
                        };
                        (skill_name.clone(), reason)
                    }
                };
                if let Some(until) = cooldown {
                    blocked_reason = Some(format!(
                        "blocked_by_cooldown until {}",
                        until.to_rfc3339_opts(SecondsFormat::Secs, false)
                    ));
                }
                if blocked_reason.is_none() {
                    would_run += 1;
                }
                planned_actions.push(PlannedAction {
                    index,
                    action_type: action.type_name().to_string(),
                    summary,
                    blocked_reason,
                });
            }
        }

        Ok(RulePreview {
            rule_id: rule.id.clone(),
            matched_items,
            planned_actions,
            notes,
        })
    }

    /// Scopes a rule may propose `skill_name` with, or the reason it may not.
    /// The rules allowlist is checked before the general policy.
    fn check_proposal(
        &self,
        policy: &PermissionsPolicy,
        skill_name: &str,
    ) -> Result<Vec<String>, String> {
        let Some(capability) = self.registry.capability(skill_name) else {
            return Err(format!("unknown_skill:{skill_name}"));
        };
        if capability.side_effect != SideEffect::Write {
            return Err(format!("not_write_capable:{skill_name}"));
        }
        let scopes = capability.required_scopes;
        if let Err(denied) = policy.check_rules_allowlist(&scopes) {
            return Err(format!(
                "rules_allowlist_denied:{}",
                denied.disabled_scopes.join(",")
            ));
        }
        policy.check_scopes(&scopes).map_err(|denied| denied.code())?;
        Ok(scopes)
    }

    #[allow(clippy::too_many_arguments)]
    fn propose(
        &self,
        rule: &Rule,
        index: usize,
        policy: &PermissionsPolicy,
        skill_name: &str,
        args: &Map<String, Value>,
        rationale: &str,
        matches: &[TriggerItem],
    ) -> Result<Proposal, RuleError> {
        let scopes = match self.check_proposal(policy, skill_name) {
            Ok(scopes) => scopes,
            Err(reason) => {
                tracing::info!(rule_id = %rule.id, skill = skill_name, %reason, "rule proposal blocked");
                return Ok(Proposal::Blocked(reason));
            }
        };

        let key = proposal_key(rule, index, skill_name, args, rationale, matches);
        let correlation_id = uuid::Uuid::new_v4().to_string();
        let ledger = self.approvals.ledger();
        let started = ledger.try_start(
            &key,
            LedgerKind::RuleAction,
            Some(&correlation_id),
            object(json!({
                "rule_id": rule.id,
                "action_index": index,
                "skill_name": skill_name,
            })),
        )?;
        if !started {
            return Ok(Proposal::AlreadyProposed);
        }

        let step = PlanStep {
            id: uuid::Uuid::new_v4().to_string(),
            description: format!("Rule action for {skill_name}"),
            skill_name: Some(skill_name.to_string()),
            args: Value::Object(args.clone()),
            requires_approval: true,
        };
        let requester = object(json!({
            "source": "rule",
            "rule_id": rule.id,
            "correlation_id": correlation_id,
        }));
        let created = self.approvals.create_pending(
            &step,
            &ApprovalContext::new(format!("Rule matched: {}", rule.name)),
            requester,
            rationale.to_string(),
            &self.registry,
            Some(scopes),
        );

        match created {
            Ok(record) => {
                ledger.mark(
                    &key,
                    LedgerStatus::Succeeded,
                    object(json!({ "approval_id": record.id })),
                )?;
                Ok(Proposal::Created(record.id))
            }
            Err(error) => {
                ledger.mark(
                    &key,
                    LedgerStatus::Failed,
                    object(json!({ "error": error.to_string() })),
                )?;
                match error {
                    ApprovalError::PolicyDenied(denied) => Ok(Proposal::Blocked(denied.code())),
                    ApprovalError::Ledger(error) => Err(error.into()),
                    ApprovalError::Store(error) => Err(error.into()),
                    other => Ok(Proposal::Blocked(format!("proposal_failed:{other}"))),
                }
            }
        }
    }

    fn failed_run(
        &self,
        rule: &Rule,
        mut result: RuleRunResult,
        note: &str,
        error: &str,
    ) -> RuleRunResult {
        tracing::warn!(rule_id = %rule.id, %error, "rule trigger failed");
        result.ok = false;
        result.notes.push(note.to_string());
        result.error = Some(error.to_string());
        self.audit_run(rule, &result);
        result
    }

    fn audit_run(&self, rule: &Rule, result: &RuleRunResult) {
        let summary = match &result.error {
            Some(_) => format!("Rule {} failed", rule.name),
            None => format!(
                "Ran rule {}: matched={} count={}",
                rule.name, result.matched, result.match_count
            ),
        };
        audit::record(
            self.audit.as_ref(),
            "rule",
            &summary,
            json!({
                "rule_id": rule.id,
                "trigger_type": rule.trigger.kind.to_string(),
                "actions_executed": result.actions_executed,
                "notes": result.notes,
                "error": result.error,
            }),
        );
    }
}

/// Ledger key of a proposal: rule, action position, first matched item and
/// the action's content.
fn proposal_key(
    rule: &Rule,
    index: usize,
    skill_name: &str,
    args: &Map<String, Value>,
    rationale: &str,
    matches: &[TriggerItem],
) -> String {
    let signature = json!({
        "skill_name": skill_name,
        "args": args,
        "rationale": rationale,
    });
    rule_action_key(
        &rule.id,
        index,
        matches.first().map(|item| item.id.as_str()),
        &signature,
    )
}

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

impl std::fmt::Debug for RuleEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleEngine")
            .field("sources", &self.sources)
            .field("notifier", &self.notifier.name())
            .field("seen_ids_max", &self.seen_ids_max)
            .finish_non_exhaustive()
    }
}
