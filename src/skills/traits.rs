use crate::security::scopes;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;

/// Whether a skill only observes or changes something outside the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SideEffect {
    Read,
    Write,
}

/// Result of a skill execution
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SkillOutput {
    pub content: String,
    #[serde(default)]
    pub data: Value,
}

impl SkillOutput {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            data: Value::Null,
        }
    }
}

/// Malformed skill arguments. Reported per step, never retried.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid arguments: {0}")]
pub struct InvalidArgs(pub String);

/// Static description of what a skill may do and which scopes it needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillCapability {
    pub name: String,
    pub side_effect: SideEffect,
    pub required_scopes: Vec<String>,
}

/// An action the executor can run
pub trait Skill: Send + Sync {
    fn name(&self) -> &str;

    fn side_effect(&self) -> SideEffect;

    /// Explicitly declared scopes. Empty means "use the default mapping".
    fn declared_scopes(&self) -> Vec<String> {
        Vec::new()
    }

    fn execute<'a>(
        &'a self,
        args: Value,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<SkillOutput>> + Send + 'a>>;

    fn capability(&self) -> SkillCapability {
        let declared = self.declared_scopes();
        let required_scopes = if declared.is_empty() {
            scopes::default_scopes_for_skill(self.name(), self.side_effect())
        } else {
            declared
        };
        SkillCapability {
            name: self.name().to_string(),
            side_effect: self.side_effect(),
            required_scopes,
        }
    }
}
