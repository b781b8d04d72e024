use crate::app::context::AppContext;
use crate::app::status::render_status;
use crate::approvals::ApprovalStatus;
use crate::audit;
use crate::cli::commands::{
    ApprovalCommands, BreakerCommands, Cli, Commands, LedgerCommands, PolicyCommands,
    RuleCommands, SafeModeCommands,
};
use crate::config::Config;
use crate::orchestration::{ApprovalContext, PlanStep};
use crate::rules::{Rule, RuleAction, RuleRunResult, RuleTrigger, TriggerKind};
use crate::security::{PolicyOverridesStore, SafeModeStore, scopes};
use anyhow::{Context, Result, bail};
use serde::Serialize;
use serde_json::{Map, Value, json};
use std::sync::Arc;

pub async fn dispatch(cli: Cli, config: Arc<Config>) -> Result<()> {
    let ctx = AppContext::new(config);
    match cli.command {
        Commands::Status => {
            println!("{}", render_status(&ctx)?);
            Ok(())
        }
        Commands::Approvals { approval_command } => approvals(&ctx, approval_command).await,
        Commands::Rules { rule_command } => rules(&ctx, rule_command).await,
        Commands::Breakers { breaker_command } => breakers(&ctx, &breaker_command),
        Commands::Policy { policy_command } => policy(&ctx, policy_command),
        Commands::SafeMode { safe_mode_command } => safe_mode(&ctx, &safe_mode_command),
        Commands::Ledger { ledger_command } => {
            let LedgerCommands::Recent { limit } = ledger_command;
            for record in ctx.ledger.list_recent(limit)? {
                println!(
                    "{}  {:<12} {:<9} {}",
                    record.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    record.kind,
                    record.status,
                    record.key
                );
            }
            Ok(())
        }
        Commands::Audit { limit, kind } => {
            for entry in ctx.audit.recent(limit, kind.as_deref())? {
                println!(
                    "{}  [{}] {}",
                    entry.created_at.format("%Y-%m-%d %H:%M:%S"),
                    entry.kind,
                    entry.summary
                );
            }
            Ok(())
        }
        Commands::Daemon => crate::daemon::run(Arc::new(ctx)).await,
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn parse_object(raw: &str, flag: &str) -> Result<Map<String, Value>> {
    match serde_json::from_str::<Value>(raw).with_context(|| format!("{flag} is not valid JSON"))? {
        Value::Object(map) => Ok(map),
        _ => bail!("{flag} must be a JSON object"),
    }
}

fn parse_status(raw: &str) -> Result<ApprovalStatus> {
    serde_json::from_value(Value::String(raw.to_ascii_lowercase()))
        .with_context(|| format!("unknown approval status '{raw}'"))
}

fn parse_trigger(raw: &str) -> Result<TriggerKind> {
    serde_json::from_value(Value::String(raw.to_ascii_lowercase()))
        .with_context(|| format!("unknown trigger type '{raw}' (schedule, gmail, calendar)"))
}

// ── Approvals ────────────────────────────────────────────────────────────────

async fn approvals(ctx: &AppContext, command: ApprovalCommands) -> Result<()> {
    match command {
        ApprovalCommands::List { status } => {
            let status = status.as_deref().map(parse_status).transpose()?;
            let records = ctx.approvals.list(status)?;
            if records.is_empty() {
                println!("No approvals.");
            }
            for record in records {
                println!(
                    "{}  {:<8} {:<20} expires {}  {}",
                    record.id,
                    record.status,
                    record.step.skill_name.as_deref().unwrap_or("-"),
                    record.expires_at.format("%Y-%m-%d %H:%M"),
                    record.rationale
                );
            }
            Ok(())
        }
        ApprovalCommands::Show { id } => match ctx.approvals.store().get(&id)? {
            Some(record) => print_json(&record),
            None => bail!("approval {id} not found"),
        },
        ApprovalCommands::Request { skill, args, goal } => {
            let args = parse_object(&args, "--args")?;
            let description = if goal.is_empty() {
                format!("Run {skill}")
            } else {
                goal.clone()
            };
            let step = PlanStep::skill(description, skill, Value::Object(args));
            let mut requester = Map::new();
            requester.insert("source".into(), json!("cli"));
            let result = ctx
                .executor
                .execute_step(
                    &step,
                    &ApprovalContext::new(goal),
                    &ctx.registry,
                    &ctx.approvals,
                    &requester,
                    false,
                )
                .await;
            print_json(&result)
        }
        ApprovalCommands::Approve { id, note } => {
            let outcome = ctx
                .approvals
                .approve(&id, note.as_deref(), &ctx.executor, &ctx.registry)
                .await?;
            if outcome.is_duplicate() {
                println!("Approval {id} was already executed; nothing ran.");
            } else if outcome.result.ok {
                println!(
                    "✅ Executed {id}: {}",
                    outcome.result.output.as_deref().unwrap_or_default()
                );
            } else {
                println!(
                    "❌ Execution of {id} failed: {}",
                    outcome.result.error.as_deref().unwrap_or("unknown error")
                );
            }
            Ok(())
        }
        ApprovalCommands::Reject { id, reason } => {
            let record = ctx.approvals.reject(&id, reason.as_deref())?;
            println!("Rejected {}.", record.id);
            Ok(())
        }
        ApprovalCommands::Cleanup => {
            let expired = ctx.approvals.cleanup_expired()?;
            println!("Expired {expired} approval(s).");
            Ok(())
        }
    }
}

// ── Rules ────────────────────────────────────────────────────────────────────

async fn rules(ctx: &AppContext, command: RuleCommands) -> Result<()> {
    let store = ctx.rules.store();
    match command {
        RuleCommands::List => {
            let rules = store.list_all()?;
            if rules.is_empty() {
                println!("No rules.");
            }
            for rule in rules {
                println!(
                    "{}  {} {:<9} every {:>3}m  {}  (last run: {})",
                    rule.id,
                    if rule.enabled { "on " } else { "off" },
                    rule.trigger.kind,
                    rule.trigger.every_minutes,
                    rule.name,
                    rule.state
                        .last_run
                        .map_or_else(|| "never".into(), |t| t.to_rfc3339())
                );
            }
            Ok(())
        }
        RuleCommands::Show { id } => match store.get(&id)? {
            Some(rule) => print_json(&rule),
            None => bail!("rule {id} not found"),
        },
        RuleCommands::Add {
            name,
            trigger,
            every_minutes,
            query,
            contains,
            not_contains,
            notify_title,
            notify_template,
            propose_skill,
            propose_args,
            rationale,
            cooldown_minutes,
            max_actions,
            disabled,
        } => {
            let mut trigger = RuleTrigger::new(parse_trigger(&trigger)?);
            trigger.every_minutes = every_minutes.max(1);
            trigger.query = query;

            let mut rule = Rule::new(name, trigger, ctx.clock.now());
            rule.enabled = !disabled;
            rule.condition.contains = contains;
            rule.condition.not_contains = not_contains;
            rule.cooldown_minutes = cooldown_minutes;
            rule.max_actions_per_run = max_actions.max(1);
            if let Some(title) = notify_title {
                rule.actions.push(RuleAction::Notify {
                    title,
                    body_template: notify_template,
                });
            }
            if let Some(skill_name) = propose_skill {
                if ctx.registry.get(&skill_name).is_none() {
                    bail!("unknown skill '{skill_name}'");
                }
                rule.actions.push(RuleAction::ProposeStep {
                    skill_name,
                    args: parse_object(&propose_args, "--propose-args")?,
                    rationale,
                });
            }
            if rule.actions.is_empty() {
                bail!("a rule needs at least one action (--notify-title or --propose-skill)");
            }

            let saved = store.upsert(&rule)?;
            audit::record(
                ctx.audit.as_ref(),
                "rule",
                &format!("Created rule {}", saved.name),
                json!({ "rule_id": saved.id }),
            );
            println!("Created rule {} ({})", saved.name, saved.id);
            Ok(())
        }
        RuleCommands::Enable { id } => toggle_rule(ctx, &id, true),
        RuleCommands::Disable { id } => toggle_rule(ctx, &id, false),
        RuleCommands::Remove { id } => {
            if !store.delete(&id)? {
                bail!("rule {id} not found");
            }
            audit::record(
                ctx.audit.as_ref(),
                "rule",
                &format!("Removed rule {id}"),
                json!({ "rule_id": id }),
            );
            println!("Removed rule {id}.");
            Ok(())
        }
        RuleCommands::Run { id } => {
            let results = match id {
                Some(id) => vec![ctx.rules.run_one(&id).await?],
                None => ctx.rules.run_all().await?,
            };
            if results.is_empty() {
                println!("No enabled rules.");
            }
            for result in &results {
                print_run(result);
            }
            Ok(())
        }
        RuleCommands::Preview { id } => {
            let preview = ctx.rules.preview(&id).await?;
            print_json(&preview)
        }
        RuleCommands::Reset { id } => match store.reset_state(&id)? {
            Some(rule) => {
                println!("Reset state of rule {} ({}).", rule.name, rule.id);
                Ok(())
            }
            None => bail!("rule {id} not found"),
        },
    }
}

fn toggle_rule(ctx: &AppContext, id: &str, enabled: bool) -> Result<()> {
    let Some(rule) = ctx.rules.store().set_enabled(id, enabled)? else {
        bail!("rule {id} not found");
    };
    println!(
        "Rule {} is now {}.",
        rule.name,
        if enabled { "enabled" } else { "disabled" }
    );
    Ok(())
}

fn print_run(result: &RuleRunResult) {
    let marker = if !result.ok {
        "❌"
    } else if result.matched {
        "✅"
    } else {
        "·"
    };
    println!(
        "{marker} {}  matches={} actions={}  {}",
        result.rule_id,
        result.match_count,
        result.actions_executed,
        result.notes.join(" ")
    );
    if let Some(error) = &result.error {
        println!("   error: {error}");
    }
}

// ── Breakers ─────────────────────────────────────────────────────────────────

fn breakers(ctx: &AppContext, command: &BreakerCommands) -> Result<()> {
    match command {
        BreakerCommands::Status => {
            let snapshot = ctx.breakers.snapshot();
            if snapshot.is_empty() {
                println!("No breakers recorded.");
            }
            for (service, breaker) in snapshot {
                println!(
                    "{service:<12} {:<9} failures={} last_error={}",
                    breaker.state,
                    breaker.failure_count,
                    breaker.last_error.as_deref().unwrap_or("-")
                );
            }
            Ok(())
        }
        BreakerCommands::Reset { service } => {
            let snapshot = ctx.breakers.reset(service);
            println!("Breaker {service} is {}.", snapshot.state);
            Ok(())
        }
    }
}

// ── Policy / safe mode ───────────────────────────────────────────────────────

fn policy(ctx: &AppContext, command: PolicyCommands) -> Result<()> {
    let overrides = PolicyOverridesStore::new(&ctx.config.state_dir);
    match command {
        PolicyCommands::Show => print_json(&ctx.policy.current().snapshot()),
        PolicyCommands::Enable { scopes } => update_scopes(ctx, &overrides, &scopes, &[]),
        PolicyCommands::Disable { scopes } => update_scopes(ctx, &overrides, &[], &scopes),
        PolicyCommands::RulesAllow { scopes } => {
            warn_unknown(&scopes);
            overrides.set_rules_allowed_scopes(&scopes)?;
            let policy = ctx.policy.reload();
            audit::record(
                ctx.audit.as_ref(),
                "policy",
                "Updated rules allowlist",
                json!({ "rules_allowed_scopes": policy.snapshot().rules_allowed_scopes }),
            );
            print_json(&policy.snapshot())
        }
        PolicyCommands::Scopes => {
            println!("Read scopes:  {}", scopes::READ_SCOPES.join(", "));
            println!("Write scopes: {}", scopes::WRITE_SCOPES.join(", "));
            println!();
            for capability in ctx.registry.capabilities() {
                println!(
                    "{:<24} {:<5} {}",
                    capability.name,
                    capability.side_effect,
                    capability.required_scopes.join(", ")
                );
            }
            Ok(())
        }
    }
}

fn update_scopes(
    ctx: &AppContext,
    overrides: &PolicyOverridesStore,
    enable: &[String],
    disable: &[String],
) -> Result<()> {
    warn_unknown(enable);
    warn_unknown(disable);
    overrides.update_scopes_enabled(&ctx.config.policy.scopes_enabled, enable, disable)?;
    let policy = ctx.policy.reload();
    audit::record(
        ctx.audit.as_ref(),
        "policy",
        "Updated enabled scopes",
        json!({ "enabled": enable, "disabled": disable }),
    );
    print_json(&policy.snapshot())
}

fn warn_unknown(requested: &[String]) {
    for scope in requested {
        if !scopes::is_known_scope(scope) {
            eprintln!("⚠️  ignoring unknown scope '{scope}'");
        }
    }
}

fn safe_mode(ctx: &AppContext, command: &SafeModeCommands) -> Result<()> {
    let store = SafeModeStore::new(&ctx.config.state_dir);
    let enabled = match command {
        SafeModeCommands::Status => {
            println!(
                "Safe mode is {}.",
                if ctx.policy.current().safe_mode() { "ON" } else { "off" }
            );
            return Ok(());
        }
        SafeModeCommands::On => true,
        SafeModeCommands::Off => false,
    };
    store.set_enabled(enabled)?;
    let policy = ctx.policy.reload();
    audit::record(
        ctx.audit.as_ref(),
        "policy",
        if enabled { "Safe mode enabled" } else { "Safe mode disabled" },
        json!({ "safe_mode": enabled }),
    );
    if !enabled && policy.safe_mode() {
        println!("Safe mode switch cleared, but [policy].safe_mode in config.toml keeps it ON.");
    } else {
        println!("Safe mode is {}.", if policy.safe_mode() { "ON" } else { "off" });
    }
    Ok(())
}
