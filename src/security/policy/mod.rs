mod handle;
mod overrides;
mod types;

pub use handle::PolicyHandle;
pub use overrides::{PolicyOverrides, PolicyOverridesStore};
pub use types::{AutonomousBehavior, PolicySnapshot, ScopeMode};

use crate::config::PolicyConfig;
use crate::error::{PolicyDenied, PolicyLayer};
use crate::security::safe_mode::SafeModeStore;
use crate::security::scopes;
use std::collections::BTreeSet;
use std::path::Path;

/// Scope-based authorization with two independent layers: the general scope
/// policy for human-approved actions, and the narrower rules allowlist for
/// actions a trigger may propose on its own.
#[derive(Debug, Clone)]
pub struct PermissionsPolicy {
    mode: ScopeMode,
    scopes_enabled: BTreeSet<String>,
    rules_allowed_scopes: BTreeSet<String>,
    overrides_enabled: bool,
    safe_mode: bool,
    safe_mode_allow_summarizer: bool,
    safe_mode_allow_rule_builder: bool,
}

impl PermissionsPolicy {
    pub fn new(config: &PolicyConfig, overrides: Option<PolicyOverrides>, safe_mode: bool) -> Self {
        let overrides = if config.overrides_enabled {
            overrides.unwrap_or_default()
        } else {
            PolicyOverrides::default()
        };
        let scopes_enabled = overrides
            .scopes_enabled
            .unwrap_or_else(|| config.scopes_enabled.clone());
        let rules_allowed_scopes = overrides
            .rules_allowed_scopes
            .unwrap_or_else(|| config.rules_allowed_scopes.clone());

        Self {
            mode: config.scope_mode,
            scopes_enabled: normalize(scopes_enabled),
            rules_allowed_scopes: normalize(rules_allowed_scopes),
            overrides_enabled: config.overrides_enabled,
            safe_mode: safe_mode || config.safe_mode,
            safe_mode_allow_summarizer: config.safe_mode_allow_summarizer,
            safe_mode_allow_rule_builder: config.safe_mode_allow_rule_builder,
        }
    }

    /// Evaluate config together with the override file and safe-mode switch in `state_dir`.
    pub fn load(config: &PolicyConfig, state_dir: &Path) -> Self {
        let overrides = if config.overrides_enabled {
            PolicyOverridesStore::new(state_dir).load()
        } else {
            None
        };
        let safe_mode = SafeModeStore::new(state_dir).is_enabled();
        Self::new(config, overrides, safe_mode)
    }

    pub fn mode(&self) -> ScopeMode {
        self.mode
    }

    pub fn safe_mode(&self) -> bool {
        self.safe_mode
    }

    pub fn overrides_enabled(&self) -> bool {
        self.overrides_enabled
    }

    pub fn is_scope_enabled(&self, scope: &str) -> bool {
        if self.safe_mode && scopes::is_write_scope(scope) {
            return false;
        }
        match self.mode {
            ScopeMode::Allowlist => self.scopes_enabled.contains(scope),
            ScopeMode::Default => {
                scopes::is_read_scope(scope) || self.scopes_enabled.contains(scope)
            }
        }
    }

    /// General scope policy. The denial lists every missing scope, sorted.
    pub fn check_scopes(&self, required: &[String]) -> Result<(), PolicyDenied> {
        let disabled: BTreeSet<&String> = required
            .iter()
            .filter(|scope| !self.is_scope_enabled(scope))
            .collect();
        deny_unless_empty(PolicyLayer::Scopes, disabled)
    }

    /// Rules allowlist. Independent of the general policy and empty in safe mode.
    pub fn check_rules_allowlist(&self, required: &[String]) -> Result<(), PolicyDenied> {
        let disabled: BTreeSet<&String> = required
            .iter()
            .filter(|scope| self.safe_mode || !self.rules_allowed_scopes.contains(*scope))
            .collect();
        deny_unless_empty(PolicyLayer::RulesAllowlist, disabled)
    }

    pub fn allows_autonomous(&self, behavior: AutonomousBehavior) -> bool {
        if !self.safe_mode {
            return true;
        }
        match behavior {
            AutonomousBehavior::Drafting => false,
            AutonomousBehavior::Summarizer => self.safe_mode_allow_summarizer,
            AutonomousBehavior::RuleBuilder => self.safe_mode_allow_rule_builder,
        }
    }

    pub fn snapshot(&self) -> PolicySnapshot {
        PolicySnapshot {
            mode: self.mode,
            scopes_enabled: scopes::all_scopes()
                .filter(|scope| self.is_scope_enabled(scope))
                .map(str::to_string)
                .collect(),
            rules_allowed_scopes: if self.safe_mode {
                Vec::new()
            } else {
                self.rules_allowed_scopes.iter().cloned().collect()
            },
            overrides_enabled: self.overrides_enabled,
            safe_mode: self.safe_mode,
        }
    }
}

fn normalize(scopes: Vec<String>) -> BTreeSet<String> {
    scopes
        .into_iter()
        .map(|scope| scope.trim().to_string())
        .filter(|scope| !scope.is_empty())
        .collect()
}

fn deny_unless_empty(layer: PolicyLayer, disabled: BTreeSet<&String>) -> Result<(), PolicyDenied> {
    if disabled.is_empty() {
        return Ok(());
    }
    Err(PolicyDenied {
        layer,
        disabled_scopes: disabled.into_iter().cloned().collect(),
    })
}

#[cfg(test)]
mod tests;
