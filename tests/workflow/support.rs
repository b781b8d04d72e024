use benjamin::utils::ManualClock;
use benjamin::{AppContext, Config};
use chrono::{DateTime, TimeZone, Utc};
use std::path::Path;
use std::sync::Arc;

pub fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 5, 4, 9, 0, 0).unwrap()
}

/// Fully wired context on `dir` with a manual clock and reminders enabled.
pub fn context(dir: &Path, tweak: impl FnOnce(&mut Config)) -> (AppContext, Arc<ManualClock>) {
    let mut config = Config::for_state_dir(dir);
    config.policy.scopes_enabled = vec!["reminders.write".into()];
    tweak(&mut config);

    let clock = Arc::new(ManualClock::new(start()));
    let ctx = AppContext::with_clock(Arc::new(config), clock.clone());
    (ctx, clock)
}
