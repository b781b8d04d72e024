use crate::approvals::{ApprovalService, ApprovalStore};
use crate::audit::EpisodicLog;
use crate::config::Config;
use crate::ledger::ExecutionLedger;
use crate::notify;
use crate::orchestration::Executor;
use crate::reliability::BreakerManager;
use crate::rules::{RuleEngine, RuleRunner, RuleStore, TriggerSources};
use crate::security::PolicyHandle;
use crate::skills::{SkillRegistry, builtin_registry};
use crate::utils::{Clock, system_clock};
use std::sync::Arc;

/// Every core component wired against one state directory.
pub struct AppContext {
    pub config: Arc<Config>,
    pub clock: Arc<dyn Clock>,
    pub policy: PolicyHandle,
    pub audit: Arc<EpisodicLog>,
    pub ledger: ExecutionLedger,
    pub breakers: Arc<BreakerManager>,
    pub registry: Arc<SkillRegistry>,
    pub approvals: Arc<ApprovalService>,
    pub executor: Executor,
    pub rules: RuleRunner,
}

impl AppContext {
    pub fn new(config: Arc<Config>) -> Self {
        Self::with_clock(config, system_clock())
    }

    pub fn with_clock(config: Arc<Config>, clock: Arc<dyn Clock>) -> Self {
        let state_dir = config.state_dir.as_path();
        let policy = PolicyHandle::load(config.policy.clone(), state_dir);
        let audit = Arc::new(EpisodicLog::new(state_dir));
        let ledger = ExecutionLedger::new(state_dir, &config.ledger).with_clock(clock.clone());
        let breakers = Arc::new(BreakerManager::with_clock(
            state_dir,
            &config.breakers,
            audit.clone(),
            clock.clone(),
        ));
        let registry = Arc::new(builtin_registry(state_dir));

        let approvals = Arc::new(
            ApprovalService::new(
                ApprovalStore::new(state_dir, &config.ledger),
                ledger.clone(),
                policy.clone(),
                audit.clone(),
                config.approvals.clone(),
            )
            .with_clock(clock.clone()),
        );
        let executor = Executor::new(policy.clone(), audit.clone());

        // Mail and calendar connectors live outside this crate; embedders
        // register them on a `TriggerSources` of their own.
        let sources = TriggerSources::new().with_breakers(breakers.clone());
        let engine = RuleEngine::new(
            approvals.clone(),
            registry.clone(),
            notify::from_config(&config.notifications),
            sources,
            policy.clone(),
            audit.clone(),
            config.rules.seen_ids_max,
        )
        .with_clock(clock.clone());
        let store = RuleStore::new(state_dir, &config.ledger, config.rules.seen_ids_max)
            .with_clock(clock.clone());

        Self {
            rules: RuleRunner::new(store, engine),
            config,
            clock,
            policy,
            audit,
            ledger,
            breakers,
            registry,
            approvals,
            executor,
        }
    }
}

impl std::fmt::Debug for AppContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppContext")
            .field("state_dir", &self.config.state_dir)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}
