use super::engine::RuleEngine;
use super::store::RuleStore;
use super::types::{Rule, RulePreview, RuleRunResult};
use crate::error::RuleError;

/// Loads rules from the store, evaluates them and persists their state.
#[derive(Debug)]
pub struct RuleRunner {
    store: RuleStore,
    engine: RuleEngine,
}

impl RuleRunner {
    pub fn new(store: RuleStore, engine: RuleEngine) -> Self {
        Self { store, engine }
    }

    pub fn store(&self) -> &RuleStore {
        &self.store
    }

    pub fn engine(&self) -> &RuleEngine {
        &self.engine
    }

    /// Evaluate enabled rules whose `every_minutes` interval has elapsed.
    pub async fn run_due(&self) -> Result<Vec<RuleRunResult>, RuleError> {
        let now = self.engine.now();
        let due: Vec<Rule> = self
            .store
            .list_all()?
            .into_iter()
            .filter(|rule| rule.is_due(now))
            .collect();
        self.run_each(due).await
    }

    /// Evaluate every enabled rule regardless of its interval.
    pub async fn run_all(&self) -> Result<Vec<RuleRunResult>, RuleError> {
        let enabled: Vec<Rule> = self
            .store
            .list_all()?
            .into_iter()
            .filter(|rule| rule.enabled)
            .collect();
        self.run_each(enabled).await
    }

    /// Evaluate one rule by id, even when it is disabled.
    pub async fn run_one(&self, id: &str) -> Result<RuleRunResult, RuleError> {
        let rule = self
            .store
            .get(id)?
            .ok_or_else(|| RuleError::NotFound(id.to_string()))?;
        self.evaluate_and_save(rule).await
    }

    pub async fn preview(&self, id: &str) -> Result<RulePreview, RuleError> {
        let rule = self
            .store
            .get(id)?
            .ok_or_else(|| RuleError::NotFound(id.to_string()))?;
        self.engine.evaluate_rule_preview(&rule).await
    }

    async fn run_each(&self, rules: Vec<Rule>) -> Result<Vec<RuleRunResult>, RuleError> {
        let mut results = Vec::with_capacity(rules.len());
        for rule in rules {
            results.push(self.evaluate_and_save(rule).await?);
        }
        Ok(results)
    }

    async fn evaluate_and_save(&self, mut rule: Rule) -> Result<RuleRunResult, RuleError> {
        let result = self.engine.evaluate_rule(&mut rule).await?;
        self.store.save_state(&rule.id, &rule.state)?;
        Ok(result)
    }
}
