use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One step of a plan. Steps without a skill are informational.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanStep {
    #[serde(default = "new_step_id")]
    pub id: String,
    pub description: String,
    #[serde(default)]
    pub skill_name: Option<String>,
    #[serde(default)]
    pub args: Value,
    #[serde(default)]
    pub requires_approval: bool,
}

fn new_step_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

impl PlanStep {
    pub fn skill(description: impl Into<String>, skill_name: impl Into<String>, args: Value) -> Self {
        Self {
            id: new_step_id(),
            description: description.into(),
            skill_name: Some(skill_name.into()),
            args,
            requires_approval: false,
        }
    }

    /// Args with JSON-encoded strings decoded, so both encodings behave the same.
    pub fn normalized_args(&self) -> Value {
        if let Value::String(raw) = &self.args
            && let Ok(parsed) = serde_json::from_str::<Value>(raw)
        {
            return parsed;
        }
        self.args.clone()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub goal: String,
    pub steps: Vec<PlanStep>,
}

/// What an approval was requested for, replayed when it is executed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalContext {
    #[serde(default)]
    pub goal: String,
    #[serde(default)]
    pub cwd: Option<String>,
}

impl ApprovalContext {
    pub fn new(goal: impl Into<String>) -> Self {
        Self {
            goal: goal.into(),
            cwd: None,
        }
    }
}

/// Why a step did not produce output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum StepErrorKind {
    PolicyDenied,
    SafeMode,
    ApprovalRequired,
    ServiceDegraded,
    Validation,
    Execution,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub step_id: String,
    pub ok: bool,
    #[serde(default)]
    pub output: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<StepErrorKind>,
}

pub const DUPLICATE_OUTPUT: &str = r#"{"skipped":true,"reason":"idempotent_duplicate"}"#;

impl StepResult {
    pub fn success(step_id: &str, output: impl Into<String>) -> Self {
        Self {
            step_id: step_id.to_string(),
            ok: true,
            output: Some(output.into()),
            error: None,
            error_kind: None,
        }
    }

    pub fn failure(step_id: &str, kind: StepErrorKind, error: impl Into<String>) -> Self {
        Self {
            step_id: step_id.to_string(),
            ok: false,
            output: None,
            error: Some(error.into()),
            error_kind: Some(kind),
        }
    }

    /// Successful no-op: the action already ran (or is running) elsewhere.
    pub fn duplicate(step_id: &str) -> Self {
        Self::success(step_id, DUPLICATE_OUTPUT)
    }

    pub fn is_duplicate(&self) -> bool {
        self.ok && self.output.as_deref() == Some(DUPLICATE_OUTPUT)
    }
}

/// Whether a call actually ran the action or was suppressed as a duplicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ExecutionDisposition {
    Executed,
    DuplicateSuppressed,
}
