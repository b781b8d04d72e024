//! Long-running loop: evaluates due rules and expires stale approvals.

use crate::app::context::AppContext;
use crate::ledger::{LedgerKind, LedgerStatus, job_run_key};
use anyhow::Result;
use serde_json::{Map, Value, json};
use std::future::Future;
use std::sync::Arc;
use tokio::time::{Duration, MissedTickBehavior};

const RULES_JOB: &str = "rules.evaluate_due";
const CLEANUP_JOB: &str = "approvals.cleanup_expired";

/// What one tick did. `None` means the job was skipped because it already
/// ran in the current minute.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub rules_evaluated: Option<usize>,
    pub approvals_expired: Option<usize>,
}

pub async fn run(ctx: Arc<AppContext>) -> Result<()> {
    let poll_secs = ctx.config.daemon.poll_secs.max(1);
    let mut interval = tokio::time::interval(Duration::from_secs(poll_secs));
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tracing::info!(
        poll_secs,
        state_dir = %ctx.config.state_dir.display(),
        "daemon started"
    );
    loop {
        tokio::select! {
            _ = interval.tick() => {
                let report = tick(&ctx).await;
                tracing::debug!(?report, "daemon tick");
            }
            signal = tokio::signal::ctrl_c() => {
                signal?;
                tracing::info!("daemon stopping");
                return Ok(());
            }
        }
    }
}

/// One pass of every daemon job. Failures are logged, never fatal.
pub async fn tick(ctx: &AppContext) -> TickReport {
    ctx.policy.reload();

    let rules_evaluated = guarded(ctx, RULES_JOB, || async {
        ctx.rules
            .run_due()
            .await
            .map(|results| results.len())
            .map_err(anyhow::Error::from)
    })
    .await;

    let approvals_expired = guarded(ctx, CLEANUP_JOB, || async {
        ctx.approvals
            .cleanup_expired()
            .map_err(anyhow::Error::from)
    })
    .await;

    TickReport {
        rules_evaluated,
        approvals_expired,
    }
}

/// Run `job` at most once per minute bucket, tracked in the ledger.
async fn guarded<F, Fut>(ctx: &AppContext, job: &str, run: F) -> Option<usize>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<usize>>,
{
    let key = job_run_key(job, None, ctx.clock.now(), &Value::Null);
    match ctx
        .ledger
        .try_start(&key, LedgerKind::JobRun, None, meta(json!({ "job_id": job })))
    {
        Ok(true) => {}
        Ok(false) => {
            tracing::debug!(job, "job already ran this minute");
            return None;
        }
        Err(error) => {
            tracing::warn!(job, %error, "could not record job start");
            return None;
        }
    }

    let outcome = run().await;
    let (status, update) = match &outcome {
        Ok(count) => (LedgerStatus::Succeeded, json!({ "count": count })),
        Err(error) => {
            tracing::warn!(job, error = %format!("{error:#}"), "daemon job failed");
            (LedgerStatus::Failed, json!({ "error": error.to_string() }))
        }
    };
    if let Err(error) = ctx.ledger.mark(&key, status, meta(update)) {
        tracing::warn!(job, %error, "could not record job outcome");
    }
    outcome.ok()
}

fn meta(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}
