use anyhow::Result;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalsConfig {
    #[serde(default = "default_ttl_hours")]
    pub ttl_hours: u32,
    /// Delete records on reaching a terminal state instead of keeping them.
    #[serde(default = "default_true")]
    pub autoclean: bool,
}

fn default_ttl_hours() -> u32 {
    72
}

fn default_true() -> bool {
    true
}

impl Default for ApprovalsConfig {
    fn default() -> Self {
        Self {
            ttl_hours: default_ttl_hours(),
            autoclean: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RulesConfig {
    /// Cap applied to every rule's `seen_ids` set.
    #[serde(default = "default_seen_ids_max")]
    pub seen_ids_max: usize,
}

fn default_seen_ids_max() -> usize {
    200
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            seen_ids_max: default_seen_ids_max(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotificationsConfig {
    /// JSON webhook receiving `{title, body, meta}`; notifications are only logged when unset.
    #[serde(default)]
    pub webhook_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    #[serde(default = "default_poll_secs")]
    pub poll_secs: u64,
}

fn default_poll_secs() -> u64 {
    30
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            poll_secs: default_poll_secs(),
        }
    }
}

impl ApprovalsConfig {
    pub fn validate(&self) -> Result<()> {
        if self.ttl_hours == 0 {
            anyhow::bail!("approvals.ttl_hours must be >= 1");
        }
        Ok(())
    }
}

impl RulesConfig {
    pub fn validate(&self) -> Result<()> {
        if self.seen_ids_max == 0 {
            anyhow::bail!("rules.seen_ids_max must be >= 1");
        }
        Ok(())
    }
}
