//! Rules engine: polled triggers, substring conditions, and notify or
//! propose-step actions with per-rule dedup and cooldown.

mod engine;
pub mod migrate;
mod runner;
mod sources;
mod store;
pub mod template;
mod types;

pub use engine::RuleEngine;
pub use runner::RuleRunner;
pub use sources::{TriggerSource, TriggerSources};
pub use store::{RULES_FILE, RuleStore};
pub use types::{
    PlannedAction, RULE_SCHEMA_VERSION, Rule, RuleAction, RuleCondition, RulePreview,
    RuleRunResult, RuleState, RuleTrigger, TriggerItem, TriggerKind,
};
