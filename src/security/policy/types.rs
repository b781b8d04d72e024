use serde::{Deserialize, Serialize};

/// How read scopes are treated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ScopeMode {
    /// Read scopes are implicitly enabled; write scopes need explicit enablement.
    #[default]
    Default,
    /// Nothing is implicit, reads included.
    Allowlist,
}

/// Autonomous behaviours that safe mode can switch off independently of scopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum AutonomousBehavior {
    /// Automated drafting of outbound content. Never allowed in safe mode.
    Drafting,
    /// Summarising already-fetched content.
    Summarizer,
    /// Turning natural language into new rules.
    RuleBuilder,
}

/// Point-in-time view of the evaluated policy, stored on approvals for audit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicySnapshot {
    pub mode: ScopeMode,
    /// Effective enabled scopes (implicit reads included in default mode).
    pub scopes_enabled: Vec<String>,
    pub rules_allowed_scopes: Vec<String>,
    pub overrides_enabled: bool,
    #[serde(default)]
    pub safe_mode: bool,
}
