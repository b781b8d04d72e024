use super::{InvalidArgs, SideEffect, Skill, SkillOutput};
use crate::utils::fs::append_jsonl;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

pub const REMINDERS_FILE: &str = "reminders.jsonl";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reminder {
    pub id: String,
    pub message: String,
    #[serde(default)]
    pub due_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct CreateArgs {
    message: String,
    #[serde(default)]
    due_at: Option<DateTime<Utc>>,
}

/// `reminders.create`: appends a reminder to `reminders.jsonl`.
#[derive(Debug, Clone)]
pub struct ReminderSkill {
    path: PathBuf,
}

impl ReminderSkill {
    pub fn new(state_dir: &Path) -> Self {
        Self {
            path: state_dir.join(REMINDERS_FILE),
        }
    }

    fn parse_args(args: Value) -> Result<CreateArgs, InvalidArgs> {
        let parsed: CreateArgs =
            serde_json::from_value(args).map_err(|e| InvalidArgs(e.to_string()))?;
        if parsed.message.trim().is_empty() {
            return Err(InvalidArgs("message must not be empty".into()));
        }
        Ok(parsed)
    }
}

impl Skill for ReminderSkill {
    fn name(&self) -> &str {
        "reminders.create"
    }

    fn side_effect(&self) -> SideEffect {
        SideEffect::Write
    }

    fn execute<'a>(
        &'a self,
        args: Value,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<SkillOutput>> + Send + 'a>> {
        Box::pin(async move {
            let args = Self::parse_args(args)?;
            let reminder = Reminder {
                id: uuid::Uuid::new_v4().to_string(),
                message: args.message.trim().to_string(),
                due_at: args.due_at,
                created_at: Utc::now(),
            };
            append_jsonl(&self.path, &reminder)?;
            tracing::info!(reminder_id = %reminder.id, "reminder created");
            Ok(SkillOutput {
                content: format!("Reminder created: {}", reminder.message),
                data: json!({ "reminder_id": reminder.id }),
            })
        })
    }
}
