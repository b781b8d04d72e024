use super::Config;
use crate::ledger::LockMode;
use crate::security::policy::ScopeMode;
use std::path::PathBuf;

fn env_nonempty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_flag(key: &str) -> Option<bool> {
    match env_nonempty(key)?.to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Some(true),
        "0" | "false" | "off" | "no" => Some(false),
        other => {
            tracing::warn!(key, value = other, "ignoring unrecognised boolean env value");
            None
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = env_nonempty(key)?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparsable env value");
            None
        }
    }
}

fn env_csv(key: &str) -> Option<Vec<String>> {
    let raw = std::env::var(key).ok()?;
    Some(
        raw.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
    )
}

impl Config {
    pub fn apply_env_overrides(&mut self) {
        if let Some(dir) = env_nonempty("BENJAMIN_STATE_DIR") {
            self.state_dir = PathBuf::from(shellexpand::tilde(&dir).into_owned());
        }

        // ── Policy ──
        if let Some(mode) = env_nonempty("BENJAMIN_SCOPE_MODE") {
            match mode.to_ascii_lowercase().as_str() {
                "default" => self.policy.scope_mode = ScopeMode::Default,
                "allowlist" => self.policy.scope_mode = ScopeMode::Allowlist,
                other => tracing::warn!(value = other, "unknown BENJAMIN_SCOPE_MODE"),
            }
        }
        if let Some(scopes) = env_csv("BENJAMIN_SCOPES_ENABLED") {
            self.policy.scopes_enabled = scopes;
        }
        if let Some(scopes) = env_csv("BENJAMIN_RULES_ALLOWED_SCOPES") {
            self.policy.rules_allowed_scopes = scopes;
        }
        if let Some(on) = env_flag("BENJAMIN_POLICY_OVERRIDES") {
            self.policy.overrides_enabled = on;
        }
        if let Some(on) = env_flag("BENJAMIN_SAFE_MODE") {
            self.policy.safe_mode = on;
        }
        if let Some(on) = env_flag("BENJAMIN_SAFE_MODE_ALLOW_SUMMARIZER") {
            self.policy.safe_mode_allow_summarizer = on;
        }
        if let Some(on) = env_flag("BENJAMIN_SAFE_MODE_ALLOW_RULE_BUILDER") {
            self.policy.safe_mode_allow_rule_builder = on;
        }

        // ── Ledger ──
        if let Some(max) = env_parse::<usize>("BENJAMIN_LEDGER_MAX")
            && max > 0
        {
            self.ledger.max_records = max;
        }
        if let Some(mode) = env_nonempty("BENJAMIN_LEDGER_LOCK_MODE") {
            match mode.to_ascii_lowercase().as_str() {
                "file" => self.ledger.lock_mode = LockMode::File,
                "none" => self.ledger.lock_mode = LockMode::None,
                other => tracing::warn!(value = other, "unknown BENJAMIN_LEDGER_LOCK_MODE"),
            }
        }

        // ── Breakers ──
        if let Some(on) = env_flag("BENJAMIN_BREAKERS_ENABLED") {
            self.breakers.enabled = on;
        }
        if let Some(n) = env_parse::<u32>("BENJAMIN_BREAKER_FAILURE_THRESHOLD") {
            self.breakers.failure_threshold = n.max(1);
        }
        if let Some(n) = env_parse::<u64>("BENJAMIN_BREAKER_OPEN_SECONDS") {
            self.breakers.open_seconds = n.max(1);
        }
        if let Some(n) = env_parse::<u32>("BENJAMIN_BREAKER_HALFOPEN_MAX_TRIALS") {
            self.breakers.half_open_max_trials = n.max(1);
        }

        // ── Approvals ──
        if let Some(hours) = env_parse::<u32>("BENJAMIN_APPROVALS_TTL_HOURS") {
            self.approvals.ttl_hours = hours.max(1);
        }
        if let Some(on) = env_flag("BENJAMIN_APPROVALS_AUTOCLEAN") {
            self.approvals.autoclean = on;
        }

        if let Some(url) = env_nonempty("BENJAMIN_WEBHOOK_URL") {
            self.notifications.webhook_url = Some(url);
        }
    }
}
