use benjamin::audit::MemoryAudit;
use benjamin::config::BreakerConfig;
use benjamin::error::ServiceError;
use benjamin::reliability::{BreakerManager, BreakerState};
use benjamin::utils::ManualClock;
use chrono::TimeDelta;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;

fn gmail_config(trials: u32) -> BreakerConfig {
    BreakerConfig {
        failure_threshold: 1,
        open_seconds: 120,
        half_open_max_trials: trials,
        services: vec!["gmail".into()],
        ..BreakerConfig::default()
    }
}

async fn call(manager: &BreakerManager, calls: &AtomicUsize, succeed: bool) -> Result<(), ServiceError> {
    manager
        .wrap("gmail", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            if succeed {
                Ok(())
            } else {
                Err(anyhow::anyhow!("imap timeout"))
            }
        })
        .await
}

#[tokio::test]
async fn gmail_opens_degrades_then_recovers() {
    let tmp = TempDir::new().unwrap();
    let clock = Arc::new(ManualClock::new(crate::support::start()));
    let audit = MemoryAudit::new();
    let manager =
        BreakerManager::with_clock(tmp.path(), &gmail_config(1), audit.clone(), clock.clone());
    let calls = AtomicUsize::new(0);

    let first = call(&manager, &calls, false).await.unwrap_err();
    assert!(!first.is_degraded());
    assert_eq!(manager.get("gmail").state, BreakerState::Open);

    let second = call(&manager, &calls, true).await.unwrap_err();
    assert!(second.is_degraded());
    assert!(second.to_string().contains("imap timeout"));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    clock.advance(TimeDelta::seconds(121));
    call(&manager, &calls, true).await.unwrap();
    let snapshot = manager.get("gmail");
    assert_eq!(snapshot.state, BreakerState::Closed);
    assert_eq!(snapshot.failure_count, 0);
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    let transitions = audit.of_kind("infra");
    assert!(transitions.iter().any(|e| e.summary.contains("closed->open")));
    assert!(transitions.iter().any(|e| e.summary.contains("half_open->closed")));
}

#[tokio::test]
async fn open_state_survives_a_restart() {
    let tmp = TempDir::new().unwrap();
    let clock = Arc::new(ManualClock::new(crate::support::start()));
    let calls = AtomicUsize::new(0);

    {
        let manager = BreakerManager::with_clock(
            tmp.path(),
            &gmail_config(1),
            MemoryAudit::new(),
            clock.clone(),
        );
        call(&manager, &calls, false).await.unwrap_err();
    }

    let restarted =
        BreakerManager::with_clock(tmp.path(), &gmail_config(1), MemoryAudit::new(), clock);
    assert_eq!(restarted.get("gmail").state, BreakerState::Open);
    let err = call(&restarted, &calls, true).await.unwrap_err();
    assert!(err.is_degraded());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn failed_probe_reopens_and_restarts_cooldown() {
    let tmp = TempDir::new().unwrap();
    let clock = Arc::new(ManualClock::new(crate::support::start()));
    let manager =
        BreakerManager::with_clock(tmp.path(), &gmail_config(2), MemoryAudit::new(), clock.clone());
    let calls = AtomicUsize::new(0);

    call(&manager, &calls, false).await.unwrap_err();
    clock.advance(TimeDelta::seconds(120));

    // First probe fails: the breaker reopens and the cooldown restarts.
    let probe = call(&manager, &calls, false).await.unwrap_err();
    assert!(!probe.is_degraded());
    assert_eq!(manager.get("gmail").state, BreakerState::Open);
    assert!(call(&manager, &calls, true).await.unwrap_err().is_degraded());
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}
