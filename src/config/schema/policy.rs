use crate::security::policy::ScopeMode;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// `default` enables read scopes implicitly; `allowlist` enables nothing implicitly.
    #[serde(default)]
    pub scope_mode: ScopeMode,
    /// Scopes enabled beyond the implicit read set (or the full set in allowlist mode).
    #[serde(default)]
    pub scopes_enabled: Vec<String>,
    /// Scopes the rules engine may propose on its own.
    #[serde(default = "default_rules_allowed_scopes")]
    pub rules_allowed_scopes: Vec<String>,
    /// Whether `policy_overrides.json` in the state dir is consulted.
    #[serde(default = "default_true")]
    pub overrides_enabled: bool,
    /// Force safe mode regardless of the persisted switch.
    #[serde(default)]
    pub safe_mode: bool,
    #[serde(default = "default_true")]
    pub safe_mode_allow_summarizer: bool,
    #[serde(default)]
    pub safe_mode_allow_rule_builder: bool,
}

fn default_rules_allowed_scopes() -> Vec<String> {
    vec!["reminders.write".into()]
}

fn default_true() -> bool {
    true
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            scope_mode: ScopeMode::Default,
            scopes_enabled: Vec::new(),
            rules_allowed_scopes: default_rules_allowed_scopes(),
            overrides_enabled: true,
            safe_mode: false,
            safe_mode_allow_summarizer: true,
            safe_mode_allow_rule_builder: false,
        }
    }
}
