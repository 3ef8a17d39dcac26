use std::str::FromStr;
use std::sync::Arc;

use allocator::{AllocatorConfig, CapacityAllocator, ClaimOutcome, StaticPriorityList};
use backend::capability::{AuthContext, Role};
use backend::config::AppConfig;
use backend::db;
use backend::metrics::Counters;
use backend::reconciler::StatusReconciler;
use backend::release::ReleaseCoordinator;
use chrono::Utc;
use common::logger::init_tracing;
use platform::{PlatformClient, StaticToken, StatusGateway};
use uuid::Uuid;

/// Externally triggered, single-invocation operations: a cron job runs
/// `reconcile`, a terminal action runs `claim <worker>` or
/// `release <worker> <assignment>`. No in-process scheduler.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let is_production = std::env::var("APP_ENV").unwrap_or_default() == "production";
    init_tracing(is_production);

    let cfg = AppConfig::from_env();
    let store = db::connect(&cfg.database_url).await?;
    let gateway: Arc<dyn StatusGateway> = Arc::new(PlatformClient::new(
        cfg.platform_base_url.clone(),
        Arc::new(StaticToken::new(cfg.bearer_token.clone())),
        cfg.retry.clone(),
        cfg.http_timeout,
    )?);
    let counters = Counters::default();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let op = args.first().map(String::as_str).unwrap_or("reconcile");

    match op {
        "reconcile" => {
            let scope = match args.get(1) {
                Some(raw) => Some(Uuid::from_str(raw)?),
                None => None,
            };

            let reconciler = StatusReconciler::new(
                gateway,
                store.clone(),
                store.clone(),
                store,
                cfg.merchant_id.clone(),
                cfg.allowed_statuses.clone(),
                counters,
            );

            let summary = reconciler.run_sweep(scope).await?;
            tracing::info!(
                checked = summary.checked,
                invalidated = summary.invalidated,
                skipped = summary.skipped,
                invalidated_orders = ?summary.invalidated_orders,
                "reconciliation sweep complete"
            );
        }

        "claim" => {
            let worker_id = parse_uuid_arg(&args, 1, "worker id")?;

            let allocator = CapacityAllocator::new(
                gateway,
                store.clone(),
                store,
                Arc::new(StaticPriorityList::default()),
                cfg.merchant_id.clone(),
                AllocatorConfig {
                    claimable_status: cfg.claimable_status.clone(),
                    scan_limit: cfg.scan_limit,
                    claim_retries: cfg.claim_retries,
                },
            );

            match allocator.claim_next_order(worker_id, Utc::now()).await? {
                ClaimOutcome::Claimed(a) => {
                    tracing::info!(order_number = %a.order_number, "claimed")
                }
                ClaimOutcome::AtCapacity { current, max } => {
                    tracing::info!(current, max, "worker at capacity")
                }
                ClaimOutcome::NoEligibleOrders => tracing::info!("no eligible orders"),
            }
        }

        "release" => {
            let worker_id = parse_uuid_arg(&args, 1, "worker id")?;
            let assignment_id = parse_uuid_arg(&args, 2, "assignment id")?;

            let coordinator = ReleaseCoordinator::new(
                gateway,
                store.clone(),
                store.clone(),
                store,
                cfg.merchant_id.clone(),
                cfg.release_status.clone(),
                cfg.release_poll_attempts,
                cfg.release_poll_delay,
                counters,
            );

            let auth = AuthContext::new(worker_id, role_from_env());
            let outcome = coordinator.release(&auth, assignment_id, None).await?;
            tracing::info!(
                confirmed = outcome.confirmed,
                remote_status = ?outcome.remote_status.map(|s| s.label()),
                "release complete"
            );
        }

        other => anyhow::bail!("unknown operation '{other}' (reconcile | claim | release)"),
    }

    Ok(())
}

fn parse_uuid_arg(args: &[String], index: usize, what: &str) -> anyhow::Result<Uuid> {
    let raw = args
        .get(index)
        .ok_or_else(|| anyhow::anyhow!("missing {what} argument"))?;
    Ok(Uuid::from_str(raw)?)
}

fn role_from_env() -> Role {
    match std::env::var("ACTOR_ROLE").unwrap_or_default().as_str() {
        "admin" => Role::Admin,
        "supervisor" => Role::Supervisor,
        _ => Role::Worker,
    }
}
