use super::migrate;
use super::types::{RULE_SCHEMA_VERSION, Rule, RuleState};
use crate::config::LedgerConfig;
use crate::error::{LedgerError, StoreError};
use crate::ledger::FileLock;
use crate::utils::fs::{read_jsonl, write_jsonl_atomic};
use crate::utils::{Clock, system_clock};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const RULES_FILE: &str = "rules.jsonl";
const RULES_LOCK_FILE: &str = "rules.lock";

/// `rules.jsonl`, one line per rule. Records are upgraded to the current
/// schema on load and written back in that schema.
#[derive(Clone)]
pub struct RuleStore {
    path: PathBuf,
    lock: FileLock,
    seen_ids_max: usize,
    clock: Arc<dyn Clock>,
}

impl RuleStore {
    pub fn new(state_dir: &Path, lock_config: &LedgerConfig, seen_ids_max: usize) -> Self {
        Self {
            path: state_dir.join(RULES_FILE),
            lock: FileLock::new(state_dir.join(RULES_LOCK_FILE), lock_config),
            seen_ids_max: seen_ids_max.max(1),
            clock: system_clock(),
        }
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn seen_ids_max(&self) -> usize {
        self.seen_ids_max
    }

    /// Newest first.
    pub fn list_all(&self) -> Result<Vec<Rule>, StoreError> {
        let mut rules = self.load()?;
        rules.reverse();
        Ok(rules)
    }

    pub fn get(&self, id: &str) -> Result<Option<Rule>, StoreError> {
        Ok(self.load()?.into_iter().find(|r| r.id == id))
    }

    /// Insert or replace `rule`, stamping `updated_at`.
    pub fn upsert(&self, rule: &Rule) -> Result<Rule, LedgerError> {
        let mut saved = rule.clone();
        saved.schema_version = RULE_SCHEMA_VERSION;
        saved.updated_at = self.clock.now();
        saved.state.enforce_cap(self.seen_ids_max);
        self.modify(|rules| {
            match rules.iter_mut().find(|r| r.id == saved.id) {
                Some(existing) => *existing = saved.clone(),
                None => rules.push(saved.clone()),
            }
            true
        })?;
        Ok(saved)
    }

    pub fn delete(&self, id: &str) -> Result<bool, LedgerError> {
        let mut removed = false;
        self.modify(|rules| {
            let before = rules.len();
            rules.retain(|r| r.id != id);
            removed = rules.len() != before;
            removed
        })?;
        Ok(removed)
    }

    pub fn set_enabled(&self, id: &str, enabled: bool) -> Result<Option<Rule>, LedgerError> {
        let now = self.clock.now();
        self.update(id, |rule| {
            rule.enabled = enabled;
            rule.updated_at = now;
        })
    }

    /// Replace only the evaluation state, leaving operator edits intact.
    pub fn save_state(&self, id: &str, state: &RuleState) -> Result<Option<Rule>, LedgerError> {
        let cap = self.seen_ids_max;
        self.update(id, |rule| {
            rule.state = state.clone();
            rule.state.enforce_cap(cap);
        })
    }

    pub fn reset_state(&self, id: &str) -> Result<Option<Rule>, LedgerError> {
        self.save_state(id, &RuleState::default())
    }

    fn update<F>(&self, id: &str, apply: F) -> Result<Option<Rule>, LedgerError>
    where
        F: FnOnce(&mut Rule),
    {
        let mut updated = None;
        self.modify(|rules| {
            let Some(rule) = rules.iter_mut().find(|r| r.id == id) else {
                return false;
            };
            apply(rule);
            updated = Some(rule.clone());
            true
        })?;
        Ok(updated)
    }

    fn load(&self) -> Result<Vec<Rule>, StoreError> {
        read_jsonl::<Value>(&self.path)?
            .into_iter()
            .enumerate()
            .map(|(idx, value)| {
                let mut rule = migrate::upgrade(value).map_err(|message| StoreError::Malformed {
                    path: self.path.display().to_string(),
                    message: format!("rule {}: {message}", idx + 1),
                })?;
                rule.state.enforce_cap(self.seen_ids_max);
                Ok(rule)
            })
            .collect()
    }

    fn modify<F>(&self, apply: F) -> Result<(), LedgerError>
    where
        F: FnOnce(&mut Vec<Rule>) -> bool,
    {
        let _guard = self.lock.acquire()?;
        let mut rules = self.load()?;
        if apply(&mut rules) {
            write_jsonl_atomic(&self.path, &rules)?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for RuleStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleStore")
            .field("path", &self.path)
            .field("seen_ids_max", &self.seen_ids_max)
            .finish_non_exhaustive()
    }
}
