use benjamin::config::Config;
use benjamin::ledger::{LockMode, LockTimeoutBehavior};
use benjamin::security::ScopeMode;

#[test]
fn empty_file_deserializes_with_defaults() {
    let parsed: Config = toml::from_str("").expect("empty config should deserialize");

    assert_eq!(parsed.policy.scope_mode, ScopeMode::Default);
    assert!(parsed.policy.scopes_enabled.is_empty());
    assert_eq!(parsed.policy.rules_allowed_scopes, vec!["reminders.write".to_string()]);
    assert_eq!(parsed.ledger.lock_mode, LockMode::File);
    assert_eq!(parsed.ledger.on_lock_timeout, LockTimeoutBehavior::Fail);
    assert_eq!(parsed.breakers.failure_threshold, 3);
    assert_eq!(parsed.approvals.ttl_hours, 72);
    assert!(parsed.approvals.autoclean);
    assert_eq!(parsed.rules.seen_ids_max, 200);
    assert!(parsed.notifications.webhook_url.is_none());
    parsed.validate().unwrap();
}

#[test]
fn sections_override_defaults() {
    let toml = r#"
state_dir = "~/benjamin-state"

[policy]
scope_mode = "allowlist"
scopes_enabled = ["gmail.read", "calendar.write"]

[ledger]
lock_mode = "none"
on_lock_timeout = "proceed"

[breakers]
failure_threshold = 1
services = ["gmail"]

[approvals]
ttl_hours = 1
autoclean = false
"#;

    let parsed: Config = toml::from_str(toml).expect("config should deserialize");
    assert_eq!(parsed.state_dir_override.as_deref(), Some("~/benjamin-state"));
    assert_eq!(parsed.policy.scope_mode, ScopeMode::Allowlist);
    assert_eq!(parsed.policy.scopes_enabled.len(), 2);
    assert_eq!(parsed.ledger.lock_mode, LockMode::None);
    assert_eq!(parsed.ledger.on_lock_timeout, LockTimeoutBehavior::Proceed);
    assert_eq!(parsed.breakers.services, vec!["gmail".to_string()]);
    assert!(!parsed.approvals.autoclean);
}

#[test]
fn zero_threshold_is_rejected() {
    let parsed: Config = toml::from_str("[breakers]\nfailure_threshold = 0\n").unwrap();
    assert!(parsed.validate().is_err());
}
