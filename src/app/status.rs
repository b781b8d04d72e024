use crate::app::context::AppContext;
use crate::approvals::ApprovalStatus;
use crate::reliability::BreakerState;
use anyhow::Result;

/// One-screen overview of policy, breakers, approvals and rules.
pub fn render_status(ctx: &AppContext) -> Result<String> {
    let policy = ctx.policy.current();
    let snapshot = policy.snapshot();

    let mut lines = vec![
        format!("◆ benjamin {}", env!("CARGO_PKG_VERSION")),
        String::new(),
        format!("Config:     {}", ctx.config.config_path.display()),
        format!("State dir:  {}", ctx.config.state_dir.display()),
        String::new(),
        format!("Scope mode: {}", snapshot.mode),
        format!(
            "Safe mode:  {}",
            if snapshot.safe_mode { "ON" } else { "off" }
        ),
        format!("Scopes:     {}", join_or_none(&snapshot.scopes_enabled)),
        format!("Rules may:  {}", join_or_none(&snapshot.rules_allowed_scopes)),
        format!(
            "Overrides:  {}",
            if snapshot.overrides_enabled {
                "enabled"
            } else {
                "disabled"
            }
        ),
        String::new(),
    ];

    let breakers = ctx.breakers.snapshot();
    if breakers.is_empty() {
        lines.push("Breakers:   (none configured)".into());
    } else {
        lines.push("Breakers:".into());
        for (service, breaker) in &breakers {
            let marker = match breaker.state {
                BreakerState::Closed => "✅",
                BreakerState::HalfOpen => "⚠️",
                BreakerState::Open => "❌",
            };
            lines.push(format!(
                "  {marker} {service:<12} {} (failures: {})",
                breaker.state, breaker.failure_count
            ));
        }
    }

    let pending = ctx.approvals.list(Some(ApprovalStatus::Pending))?;
    lines.push(String::new());
    lines.push(format!("Pending approvals: {}", pending.len()));

    let rules = ctx.rules.store().list_all()?;
    let enabled = rules.iter().filter(|rule| rule.enabled).count();
    lines.push(format!("Rules:             {enabled} enabled / {} total", rules.len()));

    Ok(lines.join("\n"))
}

fn join_or_none(items: &[String]) -> String {
    if items.is_empty() {
        "(none)".into()
    } else {
        items.join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[test]
    fn status_reports_empty_state() {
        let tmp = TempDir::new().unwrap();
        let ctx = AppContext::new(Arc::new(Config::for_state_dir(tmp.path())));

        let text = render_status(&ctx).unwrap();
        assert!(text.contains("Safe mode:  off"));
        for service in ["llm", "gmail", "calendar"] {
            assert!(
                text.contains(&format!("✅ {service:<12} closed (failures: 0)")),
                "missing seeded breaker {service}: {text}"
            );
        }
        assert!(!text.contains("(none configured)"));
        assert!(text.contains("Pending approvals: 0"));
        assert!(text.contains("0 enabled / 0 total"));
    }

    #[test]
    fn status_without_configured_services_says_so() {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::for_state_dir(tmp.path());
        config.breakers.services.clear();
        let ctx = AppContext::new(Arc::new(config));

        let text = render_status(&ctx).unwrap();
        assert!(text.contains("Breakers:   (none configured)"));
    }
}
