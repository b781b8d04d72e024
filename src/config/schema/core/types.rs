use super::super::{
    ApprovalsConfig, BreakerConfig, DaemonConfig, LedgerConfig, NotificationsConfig,
    PolicyConfig, RulesConfig,
};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(skip)]
    pub config_path: PathBuf,
    /// Resolved state directory. Populated from `state_dir_override` or the default.
    #[serde(skip)]
    pub state_dir: PathBuf,
    /// Optional `state_dir = "..."` in config.toml; `~` is expanded.
    #[serde(default, rename = "state_dir", skip_serializing_if = "Option::is_none")]
    pub state_dir_override: Option<String>,

    #[serde(default)]
    pub policy: PolicyConfig,

    #[serde(default)]
    pub ledger: LedgerConfig,

    #[serde(default)]
    pub breakers: BreakerConfig,

    #[serde(default)]
    pub approvals: ApprovalsConfig,

    #[serde(default)]
    pub rules: RulesConfig,

    #[serde(default)]
    pub notifications: NotificationsConfig,

    #[serde(default)]
    pub daemon: DaemonConfig,
}

impl Default for Config {
    fn default() -> Self {
        let base = default_base_dir();
        Self {
            config_path: base.join("config.toml"),
            state_dir: base.join("state"),
            state_dir_override: None,
            policy: PolicyConfig::default(),
            ledger: LedgerConfig::default(),
            breakers: BreakerConfig::default(),
            approvals: ApprovalsConfig::default(),
            rules: RulesConfig::default(),
            notifications: NotificationsConfig::default(),
            daemon: DaemonConfig::default(),
        }
    }
}

pub(super) fn default_base_dir() -> PathBuf {
    directories::UserDirs::new()
        .map_or_else(|| PathBuf::from("."), |u| u.home_dir().to_path_buf())
        .join(".benjamin")
}

impl Config {
    /// Defaults rooted at an explicit state directory. Used by tests and `--state-dir`.
    pub fn for_state_dir(state_dir: impl Into<PathBuf>) -> Self {
        let state_dir = state_dir.into();
        Self {
            config_path: state_dir.join("config.toml"),
            state_dir,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.breakers.validate()?;
        self.approvals.validate()?;
        self.rules.validate()?;
        if self.ledger.max_records == 0 {
            anyhow::bail!("ledger.max_records must be >= 1");
        }
        if self.daemon.poll_secs == 0 {
            anyhow::bail!("daemon.poll_secs must be >= 1");
        }
        for scope in self
            .policy
            .scopes_enabled
            .iter()
            .chain(&self.policy.rules_allowed_scopes)
        {
            if !crate::security::scopes::is_known_scope(scope) {
                tracing::warn!(scope = %scope, "unknown scope in policy config");
            }
        }
        Ok(())
    }

    pub fn state_path(&self, file: &str) -> PathBuf {
        self.state_dir.join(file)
    }

    pub(super) fn resolve_state_dir(&mut self, base: &Path) {
        self.state_dir = match self.state_dir_override.as_deref() {
            Some(raw) if !raw.trim().is_empty() => {
                PathBuf::from(shellexpand::tilde(raw.trim()).into_owned())
            }
            _ => base.join("state"),
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{LockMode, LockTimeoutBehavior};
    use crate::security::policy::ScopeMode;

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.ledger.max_records, 5_000);
        assert_eq!(config.ledger.lock_mode, LockMode::File);
        assert_eq!(config.ledger.lock_timeout_ms, 2_000);
        assert_eq!(config.ledger.on_lock_timeout, LockTimeoutBehavior::Fail);
        assert!(config.breakers.enabled);
        assert_eq!(config.breakers.failure_threshold, 3);
        assert_eq!(config.breakers.open_seconds, 60);
        assert_eq!(config.breakers.half_open_max_trials, 1);
        assert_eq!(config.approvals.ttl_hours, 72);
        assert!(config.approvals.autoclean);
        assert_eq!(config.policy.scope_mode, ScopeMode::Default);
        assert_eq!(config.policy.rules_allowed_scopes, vec!["reminders.write"]);
        assert!(config.state_dir.ends_with("state"));
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let raw = r#"
[policy]
scope_mode = "allowlist"
scopes_enabled = ["calendar.write"]

[breakers]
failure_threshold = 5
"#;
        let config: Config = toml::from_str(raw).unwrap();
        assert_eq!(config.policy.scope_mode, ScopeMode::Allowlist);
        assert_eq!(config.policy.scopes_enabled, vec!["calendar.write"]);
        assert_eq!(config.breakers.failure_threshold, 5);
        assert_eq!(config.breakers.open_seconds, 60);
        assert_eq!(config.approvals.ttl_hours, 72);
    }

    #[test]
    fn zero_threshold_fails_validation() {
        let mut config = Config::default();
        config.breakers.failure_threshold = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn state_dir_override_expands_and_wins() {
        let mut config = Config {
            state_dir_override: Some("/tmp/benjamin-test-state".into()),
            ..Config::default()
        };
        config.resolve_state_dir(Path::new("/unused"));
        assert_eq!(config.state_dir, PathBuf::from("/tmp/benjamin-test-state"));

        config.state_dir_override = None;
        config.resolve_state_dir(Path::new("/base"));
        assert_eq!(config.state_dir, PathBuf::from("/base/state"));
    }
}
