use thiserror::Error;

// ─── Top-level error hierarchy ───────────────────────────────────────────────

/// Structured error hierarchy for `benjamin`.
///
/// Each subsystem defines its own error variant. Library callers can match on
/// these to decide recovery strategy; collaborators (skills, notifiers,
/// trigger sources) continue to use `anyhow::Result` for ad-hoc context chains.
#[derive(Debug, Error)]
pub enum BenjaminError {
    // ── Config ───────────────────────────────────────────────────────────
    #[error("config: {0}")]
    Config(#[from] ConfigError),

    // ── Stores ───────────────────────────────────────────────────────────
    #[error("store: {0}")]
    Store(#[from] StoreError),

    // ── Ledger ───────────────────────────────────────────────────────────
    #[error("ledger: {0}")]
    Ledger(#[from] LedgerError),

    // ── Breakers ─────────────────────────────────────────────────────────
    #[error("service: {0}")]
    Service(#[from] ServiceError),

    // ── Policy ───────────────────────────────────────────────────────────
    #[error(transparent)]
    PolicyDenied(#[from] PolicyDenied),

    // ── Approvals ────────────────────────────────────────────────────────
    #[error("approval: {0}")]
    Approval(#[from] ApprovalError),

    // ── Rules ────────────────────────────────────────────────────────────
    #[error("rule: {0}")]
    Rule(#[from] RuleError),

    // ── Generic fallthrough (wraps anyhow for interop) ──────────────────
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

// ─── Config errors ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load config: {0}")]
    Load(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

// ─── Store errors ────────────────────────────────────────────────────────────

/// Structural failures of a file-backed store. These are the only failures
/// that unwind past a component boundary.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed record in {path}: {message}")]
    Malformed { path: String, message: String },

    #[error("serialize: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl StoreError {
    pub fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

// ─── Ledger errors ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("could not acquire ledger lock {path} within {waited_ms}ms")]
    LockTimeout { path: String, waited_ms: u64 },

    #[error(transparent)]
    Store(#[from] StoreError),
}

// ─── Breaker / degraded service errors ──────────────────────────────────────

/// Outcome of a breaker-guarded call that did not produce a value.
///
/// `Degraded` means the wrapped function was never invoked; `Call` carries the
/// wrapped function's own failure (which has already been counted).
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("service_degraded:{service}{}", error_suffix(.last_error))]
    Degraded {
        service: String,
        last_error: Option<String>,
    },

    #[error(transparent)]
    Call(anyhow::Error),
}

fn error_suffix(last_error: &Option<String>) -> String {
    last_error
        .as_deref()
        .map(|error| format!(": {error}"))
        .unwrap_or_default()
}

impl ServiceError {
    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Degraded { .. })
    }
}

// ─── Policy denial ──────────────────────────────────────────────────────────

/// Which authorization layer produced a denial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyLayer {
    /// General scope policy (human-approved actions).
    Scopes,
    /// Narrower allowlist for autonomous rule proposals.
    RulesAllowlist,
}

/// A scope check failed. Always lists the exact scopes that were missing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("policy_denied:{} ({})", .disabled_scopes.join(","), change_hint(.layer))]
pub struct PolicyDenied {
    pub layer: PolicyLayer,
    pub disabled_scopes: Vec<String>,
}

fn change_hint(layer: &PolicyLayer) -> &'static str {
    match layer {
        PolicyLayer::Scopes => {
            "enable via [policy].scopes_enabled in config.toml or policy_overrides.json"
        }
        PolicyLayer::RulesAllowlist => {
            "enable via [policy].rules_allowed_scopes in config.toml or policy_overrides.json"
        }
    }
}

impl PolicyDenied {
    /// Compact machine-readable form, e.g. `policy_denied:calendar.write`.
    pub fn code(&self) -> String {
        format!("policy_denied:{}", self.disabled_scopes.join(","))
    }
}

// ─── Approval errors ────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ApprovalError {
    #[error("approval {0} not found")]
    NotFound(String),

    #[error("approval {id} is {status}")]
    NotPending { id: String, status: String },

    #[error("approval {0} expired")]
    Expired(String),

    #[error("approval requires a skill step")]
    MissingSkill,

    #[error("unknown skill {0}")]
    UnknownSkill(String),

    #[error("approval can only be created for write skills ({0} is read-only)")]
    NotWriteCapable(String),

    #[error(transparent)]
    PolicyDenied(#[from] PolicyDenied),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

// ─── Rule errors ────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum RuleError {
    #[error("rule {0} not found")]
    NotFound(String),

    #[error("invalid rule: {0}")]
    Invalid(String),

    #[error("no trigger source registered for {0}")]
    MissingSource(String),

    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

// ─── Convenience re-exports ─────────────────────────────────────────────────

/// Shorthand result type for the crate.
pub type Result<T> = std::result::Result<T, BenjaminError>;
