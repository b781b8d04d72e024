//! Scope vocabulary and the default scope mapping for built-in skills.

use crate::skills::SideEffect;

pub const READ_SCOPES: &[&str] = &[
    "filesystem.read",
    "web.read",
    "calendar.read",
    "gmail.read",
    "memory.read",
    "rules.read",
    "jobs.read",
];

pub const WRITE_SCOPES: &[&str] = &[
    "reminders.write",
    "calendar.write",
    "gmail.draft",
    "gmail.send",
    "memory.write",
    "rules.write",
    "jobs.write",
];

const SKILL_SCOPE_DEFAULTS: &[(&str, &[&str])] = &[
    ("filesystem", &["filesystem.read"]),
    ("filesystem.search_read", &["filesystem.read"]),
    ("web.search", &["web.read"]),
    ("web_search", &["web.read"]),
    ("calendar.search", &["calendar.read"]),
    ("calendar.create_event", &["calendar.write"]),
    ("gmail.search", &["gmail.read"]),
    ("gmail.read_message", &["gmail.read"]),
    ("gmail.thread_summary", &["gmail.read"]),
    ("gmail.draft_email", &["gmail.draft"]),
    ("reminders.create", &["reminders.write"]),
];

/// Every known scope, read scopes first, in declaration order.
pub fn all_scopes() -> impl Iterator<Item = &'static str> {
    READ_SCOPES.iter().chain(WRITE_SCOPES).copied()
}

pub fn is_known_scope(scope: &str) -> bool {
    all_scopes().any(|known| known == scope)
}

pub fn is_read_scope(scope: &str) -> bool {
    READ_SCOPES.contains(&scope)
}

pub fn is_write_scope(scope: &str) -> bool {
    WRITE_SCOPES.contains(&scope)
}

/// Scopes a skill needs when it does not declare any itself.
///
/// Known built-ins map to their specific scope; anything else falls back to
/// the generic `jobs.*` scope matching its side effect.
pub fn default_scopes_for_skill(skill_name: &str, side_effect: SideEffect) -> Vec<String> {
    if let Some((_, scopes)) = SKILL_SCOPE_DEFAULTS
        .iter()
        .find(|(name, _)| *name == skill_name)
    {
        return scopes.iter().map(|s| (*s).to_string()).collect();
    }
    match side_effect {
        SideEffect::Write => vec!["jobs.write".into()],
        SideEffect::Read => vec!["jobs.read".into()],
    }
}
