use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Current on-disk layout of a rule record.
pub const RULE_SCHEMA_VERSION: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TriggerKind {
    /// Fires one heartbeat item per evaluation.
    Schedule,
    Gmail,
    Calendar,
}

impl TriggerKind {
    /// Breaker-guarded service backing this trigger, if any.
    pub fn service(self) -> Option<&'static str> {
        match self {
            Self::Schedule => None,
            Self::Gmail => Some("gmail"),
            Self::Calendar => Some("calendar"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleTrigger {
    #[serde(rename = "type")]
    pub kind: TriggerKind,
    #[serde(default = "default_every_minutes")]
    pub every_minutes: u32,
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    #[serde(default = "default_hours_ahead")]
    pub hours_ahead: u32,
}

fn default_every_minutes() -> u32 {
    5
}

fn default_max_results() -> usize {
    5
}

fn default_hours_ahead() -> u32 {
    24
}

impl RuleTrigger {
    pub fn new(kind: TriggerKind) -> Self {
        Self {
            kind,
            every_minutes: default_every_minutes(),
            query: None,
            max_results: default_max_results(),
            hours_ahead: default_hours_ahead(),
        }
    }

    #[must_use]
    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }
}

/// Case-insensitive substring filter applied to each candidate's text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleCondition {
    #[serde(default)]
    pub contains: Option<String>,
    #[serde(default)]
    pub not_contains: Option<String>,
}

impl RuleCondition {
    pub fn matches(&self, text: &str) -> bool {
        let haystack = text.to_lowercase();
        if let Some(needle) = non_empty(self.contains.as_deref())
            && !haystack.contains(&needle.to_lowercase())
        {
            return false;
        }
        if let Some(needle) = non_empty(self.not_contains.as_deref())
            && haystack.contains(&needle.to_lowercase())
        {
            return false;
        }
        true
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|s| !s.trim().is_empty())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuleAction {
    /// Send a notification rendered from `body_template`.
    Notify { title: String, body_template: String },
    /// Propose a write step through the approval workflow.
    ProposeStep {
        skill_name: String,
        #[serde(default)]
        args: Map<String, Value>,
        #[serde(default)]
        rationale: String,
    },
}

impl RuleAction {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Notify { .. } => "notify",
            Self::ProposeStep { .. } => "propose_step",
        }
    }
}

/// Evaluation bookkeeping carried on each rule.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleState {
    #[serde(default, alias = "last_run_iso")]
    pub last_run: Option<DateTime<Utc>>,
    #[serde(default, alias = "last_match_iso")]
    pub last_match: Option<DateTime<Utc>>,
    #[serde(default, alias = "cooldown_until_iso")]
    pub cooldown_until: Option<DateTime<Utc>>,
    /// Oldest first; capped by `rules.seen_ids_max`.
    #[serde(default)]
    pub seen_ids: Vec<String>,
    /// Newest item timestamp already processed. Never moves backwards.
    #[serde(default, alias = "last_cursor_iso")]
    pub last_cursor: Option<DateTime<Utc>>,
}

impl RuleState {
    pub fn in_cooldown(&self, now: DateTime<Utc>) -> bool {
        self.cooldown_until.is_some_and(|until| until > now)
    }

    pub fn has_seen(&self, id: &str) -> bool {
        self.seen_ids.iter().any(|seen| seen == id)
    }

    /// Whether `item` was already handled by an earlier pass.
    pub fn already_processed(&self, item: &TriggerItem) -> bool {
        if self.has_seen(&item.id) {
            return true;
        }
        match (item.timestamp, self.last_cursor) {
            (Some(ts), Some(cursor)) => ts <= cursor,
            _ => false,
        }
    }

    /// Record `item` as processed, evicting the oldest ids past `cap`.
    pub fn remember(&mut self, item: &TriggerItem, cap: usize) {
        if !self.has_seen(&item.id) {
            self.seen_ids.push(item.id.clone());
        }
        self.enforce_cap(cap);
        if let Some(ts) = item.timestamp
            && self.last_cursor.is_none_or(|cursor| ts > cursor)
        {
            self.last_cursor = Some(ts);
        }
    }

    pub fn enforce_cap(&mut self, cap: usize) {
        let cap = cap.max(1);
        if self.seen_ids.len() > cap {
            let excess = self.seen_ids.len() - cap;
            self.seen_ids.drain(..excess);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    #[serde(default = "current_schema_version")]
    pub schema_version: u32,
    #[serde(default = "new_rule_id")]
    pub id: String,
    pub name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(alias = "created_at_iso")]
    pub created_at: DateTime<Utc>,
    #[serde(alias = "updated_at_iso")]
    pub updated_at: DateTime<Utc>,
    pub trigger: RuleTrigger,
    #[serde(default)]
    pub condition: RuleCondition,
    #[serde(default)]
    pub actions: Vec<RuleAction>,
    #[serde(default)]
    pub cooldown_minutes: u32,
    #[serde(default = "default_max_actions")]
    pub max_actions_per_run: usize,
    #[serde(default)]
    pub state: RuleState,
}

fn current_schema_version() -> u32 {
    RULE_SCHEMA_VERSION
}

fn new_rule_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn default_true() -> bool {
    true
}

fn default_max_actions() -> usize {
    3
}

impl Rule {
    pub fn new(name: impl Into<String>, trigger: RuleTrigger, now: DateTime<Utc>) -> Self {
        Self {
            schema_version: RULE_SCHEMA_VERSION,
            id: new_rule_id(),
            name: name.into(),
            enabled: true,
            created_at: now,
            updated_at: now,
            trigger,
            condition: RuleCondition::default(),
            actions: Vec::new(),
            cooldown_minutes: 0,
            max_actions_per_run: default_max_actions(),
            state: RuleState::default(),
        }
    }

    /// Whether the runner should evaluate this rule at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        if !self.enabled {
            return false;
        }
        let every = chrono::TimeDelta::minutes(i64::from(self.trigger.every_minutes.max(1)));
        self.state.last_run.is_none_or(|last| now - last >= every)
    }
}

/// One candidate produced by a trigger source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerItem {
    pub id: String,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    /// Searchable text the condition is matched against.
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub raw: Value,
}

impl TriggerItem {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            timestamp: None,
            text: text.into(),
            raw: Value::Null,
        }
    }

    #[must_use]
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

/// Outcome of one `evaluate_rule` pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleRunResult {
    pub rule_id: String,
    pub ok: bool,
    pub matched: bool,
    pub match_count: usize,
    /// Actions that actually ran (notification sent or approval created).
    #[serde(default)]
    pub actions_executed: usize,
    #[serde(default)]
    pub notes: Vec<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl RuleRunResult {
    pub(crate) fn new(rule_id: &str) -> Self {
        Self {
            rule_id: rule_id.to_string(),
            ok: true,
            matched: false,
            match_count: 0,
            actions_executed: 0,
            notes: Vec::new(),
            error: None,
        }
    }

    pub fn has_note(&self, note: &str) -> bool {
        self.notes.iter().any(|n| n == note)
    }
}

/// An action a preview says would run, or why it would not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedAction {
    pub index: usize,
    pub action_type: String,
    /// Rendered notification body, or the proposed skill name.
    pub summary: String,
    #[serde(default)]
    pub blocked_reason: Option<String>,
}

impl PlannedAction {
    pub fn would_run(&self) -> bool {
        self.blocked_reason.is_none()
    }
}

/// Dry-run result of `evaluate_rule_preview`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RulePreview {
    pub rule_id: String,
    pub matched_items: Vec<TriggerItem>,
    pub planned_actions: Vec<PlannedAction>,
    #[serde(default)]
    pub notes: Vec<String>,
}
