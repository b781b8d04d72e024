use super::{BreakerSnapshot, BreakerStore, BreakerThresholds, CircuitBreaker, Transition};
use crate::audit::{self, AuditSink};
use crate::config::BreakerConfig;
use crate::error::ServiceError;
use crate::utils::{Clock, system_clock};
use serde_json::json;
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Owns every service breaker, persists them to `breakers.json` after each
/// mutation and audits state transitions.
///
/// The internal mutex is never held across the wrapped call.
pub struct BreakerManager {
    enabled: bool,
    thresholds: BreakerThresholds,
    breakers: Mutex<HashMap<String, CircuitBreaker>>,
    store: BreakerStore,
    audit: Arc<dyn AuditSink>,
    clock: Arc<dyn Clock>,
}

#[derive(Clone, Copy)]
enum Outcome<'a> {
    Success,
    Failure(&'a str),
}

impl BreakerManager {
    pub fn new(state_dir: &Path, config: &BreakerConfig, audit: Arc<dyn AuditSink>) -> Self {
        Self::with_clock(state_dir, config, audit, system_clock())
    }

    pub fn with_clock(
        state_dir: &Path,
        config: &BreakerConfig,
        audit: Arc<dyn AuditSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let thresholds = BreakerThresholds {
            failure_threshold: config.failure_threshold.max(1),
            open_seconds: config.open_seconds.max(1),
            half_open_max_trials: config.half_open_max_trials.max(1),
        };
        let store = BreakerStore::new(state_dir);
        let mut persisted = store.load();

        let mut breakers = HashMap::new();
        for service in &config.services {
            let snapshot = persisted.remove(service).unwrap_or_default();
            breakers.insert(
                service.clone(),
                CircuitBreaker::restore(service.as_str(), thresholds, snapshot),
            );
        }
        // Services first seen in an earlier run keep their state too.
        for (service, snapshot) in persisted {
            breakers.insert(
                service.clone(),
                CircuitBreaker::restore(service, thresholds, snapshot),
            );
        }

        Self {
            enabled: config.enabled,
            thresholds,
            breakers: Mutex::new(breakers),
            store,
            audit,
            clock,
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Current state of `service`; unknown services report a fresh closed breaker.
    pub fn get(&self, service: &str) -> BreakerSnapshot {
        self.lock()
            .get(service)
            .map(|b| b.snapshot().clone())
            .unwrap_or_default()
    }

    pub fn snapshot(&self) -> BTreeMap<String, BreakerSnapshot> {
        snapshot_of(&self.lock())
    }

    /// Run `call` behind the breaker for `service`.
    ///
    /// A denied request returns [`ServiceError::Degraded`] without invoking
    /// `call`. When breakers are disabled this is a plain passthrough.
    pub async fn wrap<T, F, Fut>(&self, service: &str, call: F) -> Result<T, ServiceError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        if !self.enabled {
            return call().await.map_err(ServiceError::Call);
        }
        self.admit(service)?;
        match call().await {
            Ok(value) => {
                self.settle(service, Outcome::Success);
                Ok(value)
            }
            Err(error) => {
                self.settle(service, Outcome::Failure(&format!("{error:#}")));
                Err(ServiceError::Call(error))
            }
        }
    }

    /// Read-only gate check for `service`: never persists, audits or
    /// consumes a half-open probe slot.
    pub fn peek(&self, service: &str) -> Result<(), ServiceError> {
        if !self.enabled {
            return Ok(());
        }
        let now = self.clock.now();
        let breakers = self.lock();
        match breakers.get(service) {
            Some(breaker) if !breaker.would_allow(now) => Err(ServiceError::Degraded {
                service: service.to_string(),
                last_error: breaker.snapshot().last_error.clone(),
            }),
            _ => Ok(()),
        }
    }

    /// Synchronous counterpart of [`BreakerManager::wrap`].
    pub fn wrap_blocking<T, F>(&self, service: &str, call: F) -> Result<T, ServiceError>
    where
        F: FnOnce() -> anyhow::Result<T>,
    {
        if !self.enabled {
            return call().map_err(ServiceError::Call);
        }
        self.admit(service)?;
        match call() {
            Ok(value) => {
                self.settle(service, Outcome::Success);
                Ok(value)
            }
            Err(error) => {
                self.settle(service, Outcome::Failure(&format!("{error:#}")));
                Err(ServiceError::Call(error))
            }
        }
    }

    /// Force `service` back to closed.
    pub fn reset(&self, service: &str) -> BreakerSnapshot {
        let (transition, snapshot, all) = {
            let mut breakers = self.lock();
            let breaker = self.entry(&mut breakers, service);
            let transition = breaker.reset();
            let snapshot = breaker.snapshot().clone();
            (transition, snapshot, snapshot_of(&breakers))
        };
        self.persist(&all);
        if let Some(transition) = transition {
            self.audit_transition(service, transition, "manual reset");
        }
        snapshot
    }

    fn admit(&self, service: &str) -> Result<(), ServiceError> {
        let now = self.clock.now();
        let (allowed, transition, last_error, all) = {
            let mut breakers = self.lock();
            let breaker = self.entry(&mut breakers, service);
            let before = breaker.state();
            let allowed = breaker.allow_request(now);
            let after = breaker.state();
            let transition = (before != after).then_some((before, after));
            let last_error = breaker.snapshot().last_error.clone();
            (allowed, transition, last_error, snapshot_of(&breakers))
        };
        self.persist(&all);
        if let Some(transition) = transition {
            self.audit_transition(service, transition, "cooldown elapsed");
        }
        if allowed {
            Ok(())
        } else {
            tracing::debug!(service, "breaker denied request");
            Err(ServiceError::Degraded {
                service: service.to_string(),
                last_error,
            })
        }
    }

    fn settle(&self, service: &str, outcome: Outcome<'_>) {
        let now = self.clock.now();
        let (transition, failure_count, all) = {
            let mut breakers = self.lock();
            let breaker = self.entry(&mut breakers, service);
            let transition = match outcome {
                Outcome::Success => breaker.record_success(),
                Outcome::Failure(error) => breaker.record_failure(error, now),
            };
            let failure_count = breaker.snapshot().failure_count;
            (transition, failure_count, snapshot_of(&breakers))
        };
        self.persist(&all);

        match (transition, outcome) {
            (Some(transition), Outcome::Success) => {
                self.audit_transition(service, transition, "request succeeded");
            }
            (Some(transition), Outcome::Failure(error)) => {
                self.audit_transition(service, transition, error);
            }
            (None, Outcome::Failure(error)) => {
                tracing::debug!(service, failure_count, error, "breaker failure recorded");
            }
            (None, Outcome::Success) => {}
        }
    }

    fn entry<'a>(
        &self,
        breakers: &'a mut HashMap<String, CircuitBreaker>,
        service: &str,
    ) -> &'a mut CircuitBreaker {
        breakers
            .entry(service.to_string())
            .or_insert_with(|| CircuitBreaker::new(service, self.thresholds))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, CircuitBreaker>> {
        self.breakers
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn persist(&self, all: &BTreeMap<String, BreakerSnapshot>) {
        if let Err(error) = self.store.save(all) {
            tracing::warn!(path = %self.store.path().display(), %error, "failed to persist breakers");
        }
    }

    fn audit_transition(&self, service: &str, (from, to): Transition, reason: &str) {
        tracing::info!(service, %from, %to, reason, "circuit breaker transition");
        audit::record(
            self.audit.as_ref(),
            "infra",
            &format!("Circuit breaker {service} transitioned {from}->{to}"),
            json!({
                "service": service,
                "from_state": from.to_string(),
                "to_state": to.to_string(),
                "reason": reason,
                "ts_iso": self.clock.now().to_rfc3339(),
            }),
        );
    }
}

fn snapshot_of(breakers: &HashMap<String, CircuitBreaker>) -> BTreeMap<String, BreakerSnapshot> {
    breakers
        .iter()
        .map(|(name, breaker)| (name.clone(), breaker.snapshot().clone()))
        .collect()
}

impl std::fmt::Debug for BreakerManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BreakerManager")
            .field("enabled", &self.enabled)
            .field("thresholds", &self.thresholds)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemoryAudit;
    use crate::reliability::BreakerState;
    use crate::utils::ManualClock;
    use chrono::{TimeDelta, TimeZone, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    struct Fixture {
        _tmp: TempDir,
        manager: BreakerManager,
        audit: Arc<MemoryAudit>,
        clock: Arc<ManualClock>,
    }

    fn fixture(config: BreakerConfig) -> Fixture {
        let tmp = TempDir::new().unwrap();
        let audit = MemoryAudit::new();
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 5, 1, 8, 0, 0).unwrap(),
        ));
        let manager = BreakerManager::with_clock(tmp.path(), &config, audit.clone(), clock.clone());
        Fixture {
            _tmp: tmp,
            manager,
            audit,
            clock,
        }
    }

    fn threshold_one() -> BreakerConfig {
        BreakerConfig {
            failure_threshold: 1,
            open_seconds: 30,
            ..BreakerConfig::default()
        }
    }

    #[tokio::test]
    async fn gmail_scenario_open_degrade_probe_close() {
        let fx = fixture(threshold_one());
        let calls = AtomicUsize::new(0);

        let first: Result<(), _> = fx
            .manager
            .wrap("gmail", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                anyhow::bail!("imap timeout")
            })
            .await;
        assert!(matches!(first, Err(ServiceError::Call(_))));
        assert_eq!(fx.manager.get("gmail").state, BreakerState::Open);

        let second: Result<(), _> = fx
            .manager
            .wrap("gmail", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await;
        match second {
            Err(ServiceError::Degraded { service, last_error }) => {
                assert_eq!(service, "gmail");
                assert_eq!(last_error.as_deref(), Some("imap timeout"));
            }
            other => panic!("expected degraded, got {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        fx.clock.advance(TimeDelta::seconds(30));
        let third = fx
            .manager
            .wrap("gmail", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok("inbox")
            })
            .await
            .unwrap();
        assert_eq!(third, "inbox");
        let snap = fx.manager.get("gmail");
        assert_eq!(snap.state, BreakerState::Closed);
        assert_eq!(snap.failure_count, 0);

        let summaries: Vec<String> = fx
            .audit
            .of_kind("infra")
            .into_iter()
            .map(|e| e.summary)
            .collect();
        assert_eq!(
            summaries,
            vec![
                "Circuit breaker gmail transitioned closed->open",
                "Circuit breaker gmail transitioned open->half_open",
                "Circuit breaker gmail transitioned half_open->closed",
            ]
        );
    }

    #[test]
    fn failures_below_threshold_are_not_audited() {
        let fx = fixture(BreakerConfig::default());
        for _ in 0..2 {
            let _ = fx
                .manager
                .wrap_blocking::<(), _>("llm", || anyhow::bail!("503"));
        }
        assert_eq!(fx.manager.get("llm").failure_count, 2);
        assert_eq!(fx.manager.get("llm").state, BreakerState::Closed);
        assert!(fx.audit.entries().is_empty());
    }

    #[test]
    fn state_survives_restart() {
        let tmp = TempDir::new().unwrap();
        let audit = MemoryAudit::new();
        let config = threshold_one();
        {
            let manager = BreakerManager::new(tmp.path(), &config, audit.clone());
            let _ = manager.wrap_blocking::<(), _>("calendar", || anyhow::bail!("quota"));
        }
        let reloaded = BreakerManager::new(tmp.path(), &config, audit);
        let snap = reloaded.get("calendar");
        assert_eq!(snap.state, BreakerState::Open);
        assert_eq!(snap.last_error.as_deref(), Some("quota"));
        assert!(reloaded.snapshot().contains_key("llm"));
    }

    #[test]
    fn disabled_manager_is_a_passthrough() {
        let fx = fixture(BreakerConfig {
            enabled: false,
            failure_threshold: 1,
            ..BreakerConfig::default()
        });
        for _ in 0..3 {
            let err = fx
                .manager
                .wrap_blocking::<(), _>("gmail", || anyhow::bail!("down"))
                .unwrap_err();
            assert!(!err.is_degraded());
        }
        assert_eq!(fx.manager.get("gmail").state, BreakerState::Closed);
    }

    #[test]
    fn peek_reports_without_touching_state() {
        let fx = fixture(threshold_one());
        let _ = fx
            .manager
            .wrap_blocking::<(), _>("gmail", || anyhow::bail!("timeout"));
        let audited = fx.audit.of_kind("infra").len();
        let before = fx.manager.get("gmail");

        assert!(fx.manager.peek("gmail").unwrap_err().is_degraded());
        fx.clock.advance(TimeDelta::seconds(31));
        assert!(fx.manager.peek("gmail").is_ok());
        assert!(fx.manager.peek("never-seen").is_ok());

        assert_eq!(fx.manager.get("gmail"), before);
        assert_eq!(fx.audit.of_kind("infra").len(), audited);
        assert!(!fx.manager.snapshot().contains_key("never-seen"));
    }

    #[test]
    fn unknown_services_get_a_breaker_on_first_use() {
        let fx = fixture(threshold_one());
        let _ = fx
            .manager
            .wrap_blocking::<(), _>("weather", || anyhow::bail!("dns"));
        assert_eq!(fx.manager.snapshot()["weather"].state, BreakerState::Open);

        let snap = fx.manager.reset("weather");
        assert_eq!(snap.state, BreakerState::Closed);
        assert_eq!(fx.audit.of_kind("infra").len(), 2);
    }
}
