use benjamin::approvals::{ApprovalService, ApprovalStatus, ApprovalStore};
use benjamin::audit::{AuditSink, MemoryAudit};
use benjamin::config::{ApprovalsConfig, LedgerConfig, PolicyConfig};
use benjamin::ledger::{ExecutionLedger, LedgerStatus, approval_execution_key};
use benjamin::orchestration::{ApprovalContext, ExecutionDisposition, Executor, PlanStep};
use benjamin::security::PolicyHandle;
use benjamin::skills::{SideEffect, Skill, SkillOutput, SkillRegistry};
use serde_json::{Map, Value, json};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::TempDir;

/// Write skill that only counts how often it really ran.
struct SlowCounter {
    runs: Arc<AtomicUsize>,
}

impl Skill for SlowCounter {
    fn name(&self) -> &str {
        "reminders.create"
    }

    fn side_effect(&self) -> SideEffect {
        SideEffect::Write
    }

    fn execute<'a>(
        &'a self,
        _args: Value,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<SkillOutput>> + Send + 'a>> {
        Box::pin(async move {
            tokio::time::sleep(Duration::from_millis(25)).await;
            self.runs.fetch_add(1, Ordering::SeqCst);
            Ok(SkillOutput::text("counted"))
        })
    }
}

/// One "process": its own store, ledger, policy and executor on a shared dir.
struct Instance {
    service: ApprovalService,
    executor: Executor,
    registry: SkillRegistry,
}

fn instance(dir: &Path, runs: &Arc<AtomicUsize>) -> Instance {
    let policy_config = PolicyConfig {
        scopes_enabled: vec!["reminders.write".into()],
        ..PolicyConfig::default()
    };
    let ledger_config = LedgerConfig::default();
    let policy = PolicyHandle::load(policy_config, PathBuf::from(dir));
    let audit: Arc<dyn AuditSink> = MemoryAudit::new();

    let mut registry = SkillRegistry::new();
    registry.register(Arc::new(SlowCounter { runs: runs.clone() }));

    Instance {
        service: ApprovalService::new(
            ApprovalStore::new(dir, &ledger_config),
            ExecutionLedger::new(dir, &ledger_config),
            policy.clone(),
            audit.clone(),
            ApprovalsConfig::default(),
        ),
        executor: Executor::new(policy, audit),
        registry,
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn independent_instances_execute_an_approval_once() {
    let tmp = TempDir::new().unwrap();
    let runs = Arc::new(AtomicUsize::new(0));

    let creator = instance(tmp.path(), &runs);
    let step = PlanStep::skill(
        "remind me",
        "reminders.create",
        json!({ "message": "water the plants" }),
    );
    let record = creator
        .service
        .create_pending(
            &step,
            &ApprovalContext::new("garden"),
            Map::new(),
            "This action will execute reminders.create.".into(),
            &creator.registry,
            None,
        )
        .unwrap();

    let mut handles = Vec::new();
    for _ in 0..4 {
        let dir = tmp.path().to_path_buf();
        let runs = runs.clone();
        let id = record.id.clone();
        handles.push(tokio::spawn(async move {
            let inst = instance(&dir, &runs);
            inst.service
                .approve(&id, None, &inst.executor, &inst.registry)
                .await
        }));
    }

    let mut executed = 0;
    for handle in handles {
        let outcome = tokio_test::assert_ok!(handle.await.unwrap());
        assert!(outcome.result.ok);
        if outcome.disposition == ExecutionDisposition::Executed {
            executed += 1;
        }
    }
    assert_eq!(executed, 1);
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    let ledger = ExecutionLedger::new(tmp.path(), &LedgerConfig::default());
    let history = ledger
        .history(&approval_execution_key(&record.id, &record.step))
        .unwrap();
    let terminal = history
        .iter()
        .filter(|r| matches!(r.status, LedgerStatus::Succeeded | LedgerStatus::Failed))
        .count();
    assert_eq!(terminal, 1);
}

#[tokio::test]
async fn restarted_instance_sees_previous_execution() {
    let tmp = TempDir::new().unwrap();
    let runs = Arc::new(AtomicUsize::new(0));

    let first = instance(tmp.path(), &runs);
    let step = PlanStep::skill("remind", "reminders.create", json!({ "message": "stretch" }));
    let record = first
        .service
        .create_pending(
            &step,
            &ApprovalContext::default(),
            Map::new(),
            String::new(),
            &first.registry,
            None,
        )
        .unwrap();
    first
        .service
        .approve(&record.id, Some("go"), &first.executor, &first.registry)
        .await
        .unwrap();

    // Fresh objects, same disk: the record is gone (autoclean) but the
    // ledger still remembers the execution.
    let second = instance(tmp.path(), &runs);
    assert!(second.service.list(Some(ApprovalStatus::Pending)).unwrap().is_empty());
    let again = second
        .service
        .approve(&record.id, None, &second.executor, &second.registry)
        .await
        .unwrap();
    assert!(again.is_duplicate());
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}
