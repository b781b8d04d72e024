//! Rendering of `notify` bodies.
//!
//! Templates see `count`, `top1`, `top2` and `now_iso`. They are rendered
//! with Tera; a template Tera rejects falls back to plain placeholder
//! substitution so a typo never silences a notification.

use super::types::TriggerItem;
use chrono::{DateTime, SecondsFormat, Utc};
use tera::{Context, Tera};

const TOP_MAX_CHARS: usize = 160;

pub fn render_notify(template: &str, matches: &[TriggerItem], now: DateTime<Utc>) -> String {
    let count = matches.len();
    let top1 = headline(matches.first());
    let top2 = headline(matches.get(1));
    let now_iso = now.to_rfc3339_opts(SecondsFormat::Secs, false);

    let mut ctx = Context::new();
    ctx.insert("count", &count);
    ctx.insert("top1", &top1);
    ctx.insert("top2", &top2);
    ctx.insert("now_iso", &now_iso);

    match Tera::one_off(template, &ctx, false) {
        Ok(rendered) => rendered,
        Err(error) => {
            tracing::warn!(%error, "notify template rejected; using plain substitution");
            template
                .replace("{{count}}", &count.to_string())
                .replace("{{top1}}", &top1)
                .replace("{{top2}}", &top2)
                .replace("{{now_iso}}", &now_iso)
        }
    }
}

/// First non-empty line of an item's text, shortened for a notification.
fn headline(item: Option<&TriggerItem>) -> String {
    let line = item
        .and_then(|i| i.text.lines().map(str::trim).find(|l| !l.is_empty()))
        .unwrap_or_default();
    match line.char_indices().nth(TOP_MAX_CHARS) {
        Some((idx, _)) => format!("{}...", line[..idx].trim_end()),
        None => line.to_string(),
    }
}
