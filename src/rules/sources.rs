use super::types::{RuleTrigger, TriggerItem, TriggerKind};
use crate::error::{RuleError, ServiceError};
use crate::reliability::BreakerManager;
use chrono::{DateTime, DurationRound, TimeDelta, Utc};
use serde_json::json;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Read-only connector a rule polls for candidate items.
pub trait TriggerSource: Send + Sync {
    fn search<'a>(
        &'a self,
        query: &'a str,
        limit: usize,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Vec<TriggerItem>>> + Send + 'a>>;
}

/// Trigger sources by kind. Connector calls go through the breaker for
/// the kind's service when a manager is attached.
#[derive(Default, Clone)]
pub struct TriggerSources {
    sources: HashMap<TriggerKind, Arc<dyn TriggerSource>>,
    breakers: Option<Arc<BreakerManager>>,
}

impl TriggerSources {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_breakers(mut self, breakers: Arc<BreakerManager>) -> Self {
        self.breakers = Some(breakers);
        self
    }

    pub fn register(&mut self, kind: TriggerKind, source: Arc<dyn TriggerSource>) {
        self.sources.insert(kind, source);
    }

    pub fn has(&self, kind: TriggerKind) -> bool {
        kind == TriggerKind::Schedule || self.sources.contains_key(&kind)
    }

    /// Candidate items for `trigger` at `now`.
    pub async fn load(
        &self,
        trigger: &RuleTrigger,
        now: DateTime<Utc>,
    ) -> Result<Vec<TriggerItem>, RuleError> {
        self.fetch(trigger, now, Gate::Guarded).await
    }

    /// Like [`TriggerSources::load`], but the breaker is only consulted:
    /// the connector's outcome is not recorded against it.
    pub async fn peek(
        &self,
        trigger: &RuleTrigger,
        now: DateTime<Utc>,
    ) -> Result<Vec<TriggerItem>, RuleError> {
        self.fetch(trigger, now, Gate::PeekOnly).await
    }

    async fn fetch(
        &self,
        trigger: &RuleTrigger,
        now: DateTime<Utc>,
        gate: Gate,
    ) -> Result<Vec<TriggerItem>, RuleError> {
        if trigger.kind == TriggerKind::Schedule {
            return Ok(vec![heartbeat(now)]);
        }
        let source = self
            .sources
            .get(&trigger.kind)
            .ok_or_else(|| RuleError::MissingSource(trigger.kind.to_string()))?;
        let query = trigger.query.as_deref().unwrap_or_default();
        let limit = trigger.max_results.max(1);

        let items = match (trigger.kind.service(), &self.breakers, gate) {
            (Some(service), Some(breakers), Gate::Guarded) => {
                breakers
                    .wrap(service, || source.search(query, limit))
                    .await?
            }
            (Some(service), Some(breakers), Gate::PeekOnly) => {
                breakers.peek(service)?;
                source
                    .search(query, limit)
                    .await
                    .map_err(ServiceError::Call)?
            }
            _ => source
                .search(query, limit)
                .await
                .map_err(ServiceError::Call)?,
        };
        Ok(items.into_iter().take(limit).collect())
    }
}

#[derive(Debug, Clone, Copy)]
enum Gate {
    Guarded,
    PeekOnly,
}

/// One tick per minute bucket, so repeated evaluations within the same
/// minute collapse onto the same item.
fn heartbeat(now: DateTime<Utc>) -> TriggerItem {
    let bucket = now.duration_trunc(TimeDelta::minutes(1)).unwrap_or(now);
    TriggerItem {
        id: format!("heartbeat:{}", bucket.timestamp()),
        timestamp: Some(bucket),
        text: "heartbeat scheduler tick".into(),
        raw: json!({ "title": "heartbeat", "snippet": "scheduler tick" }),
    }
}

impl std::fmt::Debug for TriggerSources {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut kinds: Vec<String> = self.sources.keys().map(ToString::to_string).collect();
        kinds.sort();
        f.debug_struct("TriggerSources")
            .field("kinds", &kinds)
            .field("guarded", &self.breakers.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemoryAudit;
    use crate::config::BreakerConfig;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    struct FlakySource {
        calls: AtomicUsize,
    }

    impl TriggerSource for FlakySource {
        fn search<'a>(
            &'a self,
            _query: &'a str,
            _limit: usize,
        ) -> Pin<Box<dyn Future<Output = anyhow::Result<Vec<TriggerItem>>> + Send + 'a>> {
            Box::pin(async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                anyhow::bail!("gmail timeout")
            })
        }
    }

    #[tokio::test]
    async fn schedule_heartbeat_is_stable_within_a_minute() {
        let sources = TriggerSources::new();
        let trigger = RuleTrigger::new(TriggerKind::Schedule);
        let a = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 5).unwrap();
        let b = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 55).unwrap();
        let c = Utc.with_ymd_and_hms(2026, 3, 1, 9, 1, 0).unwrap();

        let first = sources.load(&trigger, a).await.unwrap();
        let second = sources.load(&trigger, b).await.unwrap();
        let third = sources.load(&trigger, c).await.unwrap();
        assert_eq!(first, second);
        assert_ne!(first[0].id, third[0].id);
    }

    #[tokio::test]
    async fn peek_leaves_the_breaker_alone() {
        let tmp = TempDir::new().unwrap();
        let config = BreakerConfig {
            failure_threshold: 1,
            ..BreakerConfig::default()
        };
        let audit = MemoryAudit::new();
        let breakers = Arc::new(BreakerManager::new(tmp.path(), &config, audit.clone()));
        let source = Arc::new(FlakySource {
            calls: AtomicUsize::new(0),
        });
        let mut sources = TriggerSources::new().with_breakers(breakers.clone());
        sources.register(TriggerKind::Gmail, source.clone());
        let trigger = RuleTrigger::new(TriggerKind::Gmail).with_query("report");

        let failed = sources.peek(&trigger, Utc::now()).await.unwrap_err();
        assert!(matches!(failed, RuleError::Service(ServiceError::Call(_))));
        assert_eq!(breakers.get("gmail").failure_count, 0);
        assert!(audit.of_kind("infra").is_empty());

        sources.load(&trigger, Utc::now()).await.unwrap_err();
        let opened = breakers.get("gmail");
        let denied = sources.peek(&trigger, Utc::now()).await.unwrap_err();
        assert!(matches!(denied, RuleError::Service(ref e) if e.is_degraded()));
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
        assert_eq!(breakers.get("gmail"), opened);
    }

    #[tokio::test]
    async fn unregistered_connector_is_an_error() {
        let sources = TriggerSources::new();
        let err = sources
            .load(&RuleTrigger::new(TriggerKind::Calendar), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, RuleError::MissingSource(kind) if kind == "calendar"));
    }

    #[tokio::test]
    async fn open_breaker_short_circuits_the_connector() {
        let tmp = TempDir::new().unwrap();
        let config = BreakerConfig {
            failure_threshold: 1,
            ..BreakerConfig::default()
        };
        let breakers = Arc::new(BreakerManager::new(tmp.path(), &config, MemoryAudit::new()));
        let source = Arc::new(FlakySource {
            calls: AtomicUsize::new(0),
        });
        let mut sources = TriggerSources::new().with_breakers(breakers);
        sources.register(TriggerKind::Gmail, source.clone());
        let trigger = RuleTrigger::new(TriggerKind::Gmail).with_query("report");

        let first = sources.load(&trigger, Utc::now()).await.unwrap_err();
        assert!(matches!(first, RuleError::Service(ServiceError::Call(_))));
        let second = sources.load(&trigger, Utc::now()).await.unwrap_err();
        assert!(matches!(second, RuleError::Service(ref e) if e.is_degraded()));
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }
}
