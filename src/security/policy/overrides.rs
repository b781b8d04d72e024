use crate::error::StoreError;
use crate::security::scopes;
use crate::utils::fs::{read_json, write_json_atomic};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Contents of `policy_overrides.json`. A present list replaces the
/// corresponding config list; an absent one leaves it alone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scopes_enabled: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rules_allowed_scopes: Option<Vec<String>>,
}

#[derive(Debug, Clone)]
pub struct PolicyOverridesStore {
    path: PathBuf,
}

impl PolicyOverridesStore {
    pub fn new(state_dir: &Path) -> Self {
        Self {
            path: state_dir.join("policy_overrides.json"),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Option<PolicyOverrides> {
        read_json(&self.path)
    }

    pub fn save(&self, overrides: &PolicyOverrides) -> Result<(), StoreError> {
        write_json_atomic(&self.path, overrides)
    }

    /// Add and remove scopes from the persisted `scopes_enabled` list,
    /// seeding it from `base` when the file has no list yet. Unknown scopes
    /// are dropped.
    pub fn update_scopes_enabled(
        &self,
        base: &[String],
        enable: &[String],
        disable: &[String],
    ) -> Result<PolicyOverrides, StoreError> {
        let mut overrides = self.load().unwrap_or_default();
        let mut current: BTreeSet<String> = overrides
            .scopes_enabled
            .clone()
            .unwrap_or_else(|| base.to_vec())
            .into_iter()
            .collect();
        current.extend(enable.iter().cloned());
        for scope in disable {
            current.remove(scope);
        }
        current.retain(|scope| scopes::is_known_scope(scope));
        overrides.scopes_enabled = Some(current.into_iter().collect());
        self.save(&overrides)?;
        Ok(overrides)
    }

    /// Replace the persisted rules allowlist.
    pub fn set_rules_allowed_scopes(
        &self,
        allowed: &[String],
    ) -> Result<PolicyOverrides, StoreError> {
        let mut overrides = self.load().unwrap_or_default();
        let list: BTreeSet<String> = allowed
            .iter()
            .filter(|scope| scopes::is_known_scope(scope))
            .cloned()
            .collect();
        overrides.rules_allowed_scopes = Some(list.into_iter().collect());
        self.save(&overrides)?;
        Ok(overrides)
    }
}
