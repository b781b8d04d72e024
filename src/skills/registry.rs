use super::{Skill, SkillCapability};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Default, Clone)]
pub struct SkillRegistry {
    skills: HashMap<String, Arc<dyn Skill>>,
}

impl SkillRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a skill. Replaces any existing skill with the same name.
    pub fn register(&mut self, skill: Arc<dyn Skill>) {
        self.skills.insert(skill.name().to_string(), skill);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Skill>> {
        self.skills.get(name)
    }

    pub fn capability(&self, name: &str) -> Option<SkillCapability> {
        self.skills.get(name).map(|skill| skill.capability())
    }

    /// Capabilities of every registered skill, sorted by name.
    pub fn capabilities(&self) -> Vec<SkillCapability> {
        let mut caps: Vec<SkillCapability> =
            self.skills.values().map(|skill| skill.capability()).collect();
        caps.sort_by(|a, b| a.name.cmp(&b.name));
        caps
    }
}

impl std::fmt::Debug for SkillRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&str> = self.skills.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("SkillRegistry").field("skills", &names).finish()
    }
}
