//! Skill registry consumed by the executor.

mod registry;
mod reminders;
mod traits;

pub use registry::SkillRegistry;
pub use reminders::{REMINDERS_FILE, Reminder, ReminderSkill};
pub use traits::{InvalidArgs, SideEffect, Skill, SkillCapability, SkillOutput};

use std::path::Path;
use std::sync::Arc;

/// Registry holding the built-in skills rooted at `state_dir`.
pub fn builtin_registry(state_dir: &Path) -> SkillRegistry {
    let mut registry = SkillRegistry::new();
    registry.register(Arc::new(ReminderSkill::new(state_dir)));
    registry
}
