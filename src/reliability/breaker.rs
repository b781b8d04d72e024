use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum BreakerState {
    #[default]
    Closed,
    Open,
    HalfOpen,
}

/// A state change reported by the breaker, `(from, to)`.
pub type Transition = (BreakerState, BreakerState);

/// Persisted per-service breaker state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakerSnapshot {
    #[serde(default)]
    pub state: BreakerState,
    #[serde(default)]
    pub failure_count: u32,
    #[serde(default, alias = "opened_at_iso")]
    pub opened_at: Option<DateTime<Utc>>,
    #[serde(default, alias = "last_failure_iso")]
    pub last_failure: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_error: Option<String>,
    #[serde(default)]
    pub half_open_trials_used: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerThresholds {
    pub failure_threshold: u32,
    pub open_seconds: u64,
    pub half_open_max_trials: u32,
}

impl Default for BreakerThresholds {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            open_seconds: 60,
            half_open_max_trials: 1,
        }
    }
}

impl BreakerThresholds {
    fn threshold(&self) -> u32 {
        self.failure_threshold.max(1)
    }

    fn cooldown(&self) -> TimeDelta {
        let secs = i64::try_from(self.open_seconds.max(1)).unwrap_or(i64::MAX);
        TimeDelta::try_seconds(secs).unwrap_or(TimeDelta::MAX)
    }

    fn max_trials(&self) -> u32 {
        self.half_open_max_trials.max(1)
    }
}

/// Three-state circuit breaker for one downstream service.
///
/// Time is always passed in so that cooldown expiry is evaluated lazily on
/// the next `allow_request` and tests can drive it deterministically.
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    service: String,
    thresholds: BreakerThresholds,
    snapshot: BreakerSnapshot,
}

impl CircuitBreaker {
    pub fn new(service: impl Into<String>, thresholds: BreakerThresholds) -> Self {
        Self::restore(service, thresholds, BreakerSnapshot::default())
    }

    pub fn restore(
        service: impl Into<String>,
        thresholds: BreakerThresholds,
        snapshot: BreakerSnapshot,
    ) -> Self {
        Self {
            service: service.into(),
            thresholds,
            snapshot,
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn state(&self) -> BreakerState {
        self.snapshot.state
    }

    pub fn snapshot(&self) -> &BreakerSnapshot {
        &self.snapshot
    }

    /// Gate for one call. May move `open -> half_open` when the cooldown
    /// has elapsed; every permitted half-open call consumes a probe slot.
    pub fn allow_request(&mut self, now: DateTime<Utc>) -> bool {
        let s = &mut self.snapshot;
        if s.state == BreakerState::Open {
            let cooled = s
                .opened_at
                .is_none_or(|opened| now >= opened + self.thresholds.cooldown());
            if !cooled {
                return false;
            }
            s.state = BreakerState::HalfOpen;
            s.half_open_trials_used = 0;
        }
        match s.state {
            BreakerState::Closed => true,
            BreakerState::HalfOpen if s.half_open_trials_used >= self.thresholds.max_trials() => {
                false
            }
            BreakerState::HalfOpen => {
                s.half_open_trials_used += 1;
                true
            }
            BreakerState::Open => false,
        }
    }

    /// What `allow_request` would answer at `now`, without moving state or
    /// consuming a probe slot.
    pub fn would_allow(&self, now: DateTime<Utc>) -> bool {
        let s = &self.snapshot;
        match s.state {
            BreakerState::Closed => true,
            BreakerState::Open => s
                .opened_at
                .is_none_or(|opened| now >= opened + self.thresholds.cooldown()),
            BreakerState::HalfOpen => s.half_open_trials_used < self.thresholds.max_trials(),
        }
    }

    pub fn record_success(&mut self) -> Option<Transition> {
        let previous = self.snapshot.state;
        self.snapshot = BreakerSnapshot::default();
        (previous != BreakerState::Closed).then_some((previous, BreakerState::Closed))
    }

    pub fn record_failure(&mut self, error: &str, now: DateTime<Utc>) -> Option<Transition> {
        let threshold = self.thresholds.threshold();
        let s = &mut self.snapshot;
        let previous = s.state;
        s.last_error = Some(error.to_string());
        s.last_failure = Some(now);

        if previous == BreakerState::HalfOpen {
            // A failed probe reopens at full strength, never "one short of open".
            s.failure_count = threshold.max(s.failure_count.saturating_add(1));
            s.state = BreakerState::Open;
            s.opened_at = Some(now);
            s.half_open_trials_used = 0;
            return Some((previous, BreakerState::Open));
        }

        s.failure_count = s.failure_count.saturating_add(1);
        if s.failure_count >= threshold && previous != BreakerState::Open {
            s.state = BreakerState::Open;
            s.opened_at = Some(now);
            s.half_open_trials_used = 0;
            return Some((previous, BreakerState::Open));
        }
        None
    }

    /// Operator reset back to `closed`.
    pub fn reset(&mut self) -> Option<Transition> {
        self.record_success()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 1, 12, 0, 0).unwrap()
    }

    fn breaker(threshold: u32, open_seconds: u64, trials: u32) -> CircuitBreaker {
        CircuitBreaker::new(
            "gmail",
            BreakerThresholds {
                failure_threshold: threshold,
                open_seconds,
                half_open_max_trials: trials,
            },
        )
    }

    #[test]
    fn opens_at_threshold_and_stays_open_until_cooldown() {
        let mut b = breaker(3, 60, 1);
        assert_eq!(b.record_failure("boom", t0()), None);
        assert_eq!(b.record_failure("boom", t0()), None);
        assert_eq!(
            b.record_failure("boom", t0()),
            Some((BreakerState::Closed, BreakerState::Open))
        );
        assert_eq!(b.snapshot().opened_at, Some(t0()));

        assert!(!b.allow_request(t0() + TimeDelta::seconds(59)));
        assert_eq!(b.state(), BreakerState::Open);
        assert!(b.allow_request(t0() + TimeDelta::seconds(60)));
        assert_eq!(b.state(), BreakerState::HalfOpen);
    }

    #[test]
    fn half_open_permits_exactly_max_trials() {
        let mut b = breaker(1, 10, 2);
        b.record_failure("x", t0());
        let later = t0() + TimeDelta::seconds(10);
        assert!(b.allow_request(later));
        assert!(b.allow_request(later));
        assert!(!b.allow_request(later));
    }

    #[test]
    fn would_allow_does_not_move_state() {
        let mut b = breaker(1, 30, 1);
        b.record_failure("boom", t0());
        let before = b.snapshot().clone();

        assert!(!b.would_allow(t0() + TimeDelta::seconds(10)));
        assert!(b.would_allow(t0() + TimeDelta::seconds(30)));
        assert_eq!(b.snapshot(), &before);

        assert!(b.allow_request(t0() + TimeDelta::seconds(30)));
        assert!(!b.would_allow(t0() + TimeDelta::seconds(31)));
        assert_eq!(b.snapshot().half_open_trials_used, 1);
    }

    #[test]
    fn half_open_success_closes_and_resets() {
        let mut b = breaker(1, 10, 1);
        b.record_failure("x", t0());
        assert!(b.allow_request(t0() + TimeDelta::seconds(10)));
        assert_eq!(
            b.record_success(),
            Some((BreakerState::HalfOpen, BreakerState::Closed))
        );
        assert_eq!(b.snapshot(), &BreakerSnapshot::default());
        assert_eq!(b.record_success(), None);
    }

    #[test]
    fn half_open_failure_reopens_at_threshold() {
        let mut b = breaker(3, 10, 1);
        for _ in 0..3 {
            b.record_failure("x", t0());
        }
        let later = t0() + TimeDelta::seconds(10);
        assert!(b.allow_request(later));
        assert_eq!(
            b.record_failure("again", later),
            Some((BreakerState::HalfOpen, BreakerState::Open))
        );
        assert!(b.snapshot().failure_count >= 3);
        assert_eq!(b.snapshot().opened_at, Some(later));
        assert_eq!(b.snapshot().last_error.as_deref(), Some("again"));
        assert!(!b.allow_request(later + TimeDelta::seconds(5)));
    }

    #[test]
    fn zero_thresholds_are_clamped_to_one() {
        let mut b = breaker(0, 0, 0);
        assert!(b.record_failure("x", t0()).is_some());
        assert!(b.allow_request(t0() + TimeDelta::seconds(1)));
        assert!(!b.allow_request(t0() + TimeDelta::seconds(1)));
    }

    #[test]
    fn snapshot_accepts_legacy_iso_field_names() {
        let raw = r#"{"state":"open","failure_count":3,"opened_at_iso":"2026-05-01T12:00:00+00:00","last_error":"timeout"}"#;
        let snap: BreakerSnapshot = serde_json::from_str(raw).unwrap();
        assert_eq!(snap.state, BreakerState::Open);
        assert_eq!(snap.opened_at, Some(t0()));
        assert_eq!(snap.half_open_trials_used, 0);
    }
}
