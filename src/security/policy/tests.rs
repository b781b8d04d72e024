use super::*;
use crate::security::safe_mode::SafeModeStore;
use tempfile::TempDir;

fn scopes(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| (*s).to_string()).collect()
}

fn policy_with(config: PolicyConfig) -> PermissionsPolicy {
    PermissionsPolicy::new(&config, None, false)
}

// ── Default mode ─────────────────────────────────────────

#[test]
fn default_mode_enables_reads_only() {
    let policy = policy_with(PolicyConfig::default());
    assert!(policy.check_scopes(&scopes(&["gmail.read", "calendar.read"])).is_ok());

    let err = policy
        .check_scopes(&scopes(&["calendar.write", "gmail.read", "gmail.send"]))
        .unwrap_err();
    assert_eq!(err.layer, PolicyLayer::Scopes);
    assert_eq!(err.disabled_scopes, vec!["calendar.write", "gmail.send"]);
}

#[test]
fn explicit_write_scope_is_enabled() {
    let policy = policy_with(PolicyConfig {
        scopes_enabled: scopes(&["calendar.write"]),
        ..PolicyConfig::default()
    });
    assert!(policy.check_scopes(&scopes(&["calendar.write"])).is_ok());
    assert!(policy.check_scopes(&scopes(&["gmail.send"])).is_err());
}

// ── Allowlist mode ───────────────────────────────────────

#[test]
fn allowlist_mode_makes_nothing_implicit() {
    let policy = policy_with(PolicyConfig {
        scope_mode: ScopeMode::Allowlist,
        ..PolicyConfig::default()
    });
    let err = policy.check_scopes(&scopes(&["gmail.read"])).unwrap_err();
    assert_eq!(err.disabled_scopes, vec!["gmail.read"]);
    assert!(policy.snapshot().scopes_enabled.is_empty());
}

#[test]
fn empty_requirement_always_passes() {
    let policy = policy_with(PolicyConfig {
        scope_mode: ScopeMode::Allowlist,
        ..PolicyConfig::default()
    });
    assert!(policy.check_scopes(&[]).is_ok());
    assert!(policy.check_rules_allowlist(&[]).is_ok());
}

// ── Rules allowlist ──────────────────────────────────────

#[test]
fn rules_allowlist_is_independent_of_general_policy() {
    let policy = policy_with(PolicyConfig {
        scopes_enabled: scopes(&["calendar.write", "reminders.write"]),
        ..PolicyConfig::default()
    });
    assert!(policy.check_scopes(&scopes(&["calendar.write"])).is_ok());

    let err = policy
        .check_rules_allowlist(&scopes(&["calendar.write"]))
        .unwrap_err();
    assert_eq!(err.layer, PolicyLayer::RulesAllowlist);
    assert!(policy.check_rules_allowlist(&scopes(&["reminders.write"])).is_ok());
}

// ── Overrides ────────────────────────────────────────────

#[test]
fn override_lists_replace_config_lists() {
    let config = PolicyConfig {
        scopes_enabled: scopes(&["calendar.write"]),
        ..PolicyConfig::default()
    };
    let overrides = PolicyOverrides {
        scopes_enabled: Some(scopes(&["gmail.draft"])),
        rules_allowed_scopes: None,
    };
    let policy = PermissionsPolicy::new(&config, Some(overrides), false);
    assert!(policy.check_scopes(&scopes(&["gmail.draft"])).is_ok());
    assert!(policy.check_scopes(&scopes(&["calendar.write"])).is_err());
    assert_eq!(policy.snapshot().rules_allowed_scopes, vec!["reminders.write"]);
}

#[test]
fn overrides_ignored_when_disabled() {
    let config = PolicyConfig {
        overrides_enabled: false,
        ..PolicyConfig::default()
    };
    let overrides = PolicyOverrides {
        scopes_enabled: Some(scopes(&["gmail.send"])),
        rules_allowed_scopes: None,
    };
    let policy = PermissionsPolicy::new(&config, Some(overrides), false);
    assert!(policy.check_scopes(&scopes(&["gmail.send"])).is_err());
}

#[test]
fn override_store_updates_and_drops_unknown_scopes() {
    let tmp = TempDir::new().unwrap();
    let store = PolicyOverridesStore::new(tmp.path());

    let saved = store
        .update_scopes_enabled(
            &scopes(&["calendar.write"]),
            &scopes(&["gmail.draft", "not.a.scope"]),
            &[],
        )
        .unwrap();
    assert_eq!(
        saved.scopes_enabled,
        Some(scopes(&["calendar.write", "gmail.draft"]))
    );

    let saved = store
        .update_scopes_enabled(&[], &[], &scopes(&["calendar.write"]))
        .unwrap();
    assert_eq!(saved.scopes_enabled, Some(scopes(&["gmail.draft"])));
    assert_eq!(store.load(), Some(saved));
}

// ── Safe mode ────────────────────────────────────────────

#[test]
fn safe_mode_disables_writes_and_rule_proposals() {
    let config = PolicyConfig {
        scopes_enabled: scopes(&["reminders.write"]),
        ..PolicyConfig::default()
    };
    let policy = PermissionsPolicy::new(&config, None, true);
    assert!(policy.check_scopes(&scopes(&["reminders.write"])).is_err());
    assert!(policy.check_scopes(&scopes(&["gmail.read"])).is_ok());
    assert!(policy
        .check_rules_allowlist(&scopes(&["reminders.write"]))
        .is_err());

    let snap = policy.snapshot();
    assert!(snap.safe_mode);
    assert!(snap.rules_allowed_scopes.is_empty());
}

#[test]
fn safe_mode_gates_autonomous_behaviours() {
    let normal = policy_with(PolicyConfig::default());
    assert!(normal.allows_autonomous(AutonomousBehavior::Drafting));

    let safe = PermissionsPolicy::new(&PolicyConfig::default(), None, true);
    assert!(!safe.allows_autonomous(AutonomousBehavior::Drafting));
    assert!(safe.allows_autonomous(AutonomousBehavior::Summarizer));
    assert!(!safe.allows_autonomous(AutonomousBehavior::RuleBuilder));
}

// ── Handle ───────────────────────────────────────────────

#[test]
fn handle_reload_picks_up_file_changes() {
    let tmp = TempDir::new().unwrap();
    let handle = PolicyHandle::load(PolicyConfig::default(), tmp.path());
    assert!(handle.current().check_scopes(&scopes(&["calendar.write"])).is_err());

    PolicyOverridesStore::new(tmp.path())
        .update_scopes_enabled(&[], &scopes(&["calendar.write"]), &[])
        .unwrap();
    // Snapshot is stable until an explicit reload.
    assert!(handle.current().check_scopes(&scopes(&["calendar.write"])).is_err());
    assert!(handle.reload().check_scopes(&scopes(&["calendar.write"])).is_ok());

    SafeModeStore::new(tmp.path()).set_enabled(true).unwrap();
    assert!(handle.reload().safe_mode());
    assert!(handle.current().check_scopes(&scopes(&["calendar.write"])).is_err());
}
