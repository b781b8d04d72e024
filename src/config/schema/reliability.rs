use crate::ledger::{LockMode, LockTimeoutBehavior};
use anyhow::Result;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Records kept after every write; oldest are dropped first.
    #[serde(default = "default_ledger_max_records")]
    pub max_records: usize,
    #[serde(default)]
    pub lock_mode: LockMode,
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
    #[serde(default)]
    pub on_lock_timeout: LockTimeoutBehavior,
    /// A sentinel older than this is assumed abandoned by a crashed process.
    #[serde(default = "default_stale_lock_secs")]
    pub stale_lock_secs: u64,
}

fn default_ledger_max_records() -> usize {
    5_000
}

fn default_lock_timeout_ms() -> u64 {
    2_000
}

fn default_stale_lock_secs() -> u64 {
    30
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            max_records: default_ledger_max_records(),
            lock_mode: LockMode::File,
            lock_timeout_ms: default_lock_timeout_ms(),
            on_lock_timeout: LockTimeoutBehavior::Fail,
            stale_lock_secs: default_stale_lock_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    #[serde(default = "default_open_seconds")]
    pub open_seconds: u64,
    #[serde(default = "default_half_open_max_trials")]
    pub half_open_max_trials: u32,
    /// Services that get a breaker at startup; others are created on first use.
    #[serde(default = "default_services")]
    pub services: Vec<String>,
}

fn default_true() -> bool {
    true
}

fn default_failure_threshold() -> u32 {
    3
}

fn default_open_seconds() -> u64 {
    60
}

fn default_half_open_max_trials() -> u32 {
    1
}

fn default_services() -> Vec<String> {
    vec!["llm".into(), "gmail".into(), "calendar".into()]
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            failure_threshold: default_failure_threshold(),
            open_seconds: default_open_seconds(),
            half_open_max_trials: default_half_open_max_trials(),
            services: default_services(),
        }
    }
}

impl BreakerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.failure_threshold == 0 {
            anyhow::bail!("breakers.failure_threshold must be >= 1");
        }
        if self.open_seconds == 0 {
            anyhow::bail!("breakers.open_seconds must be >= 1");
        }
        if self.half_open_max_trials == 0 {
            anyhow::bail!("breakers.half_open_max_trials must be >= 1");
        }
        Ok(())
    }
}
