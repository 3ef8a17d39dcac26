//! Pure eligibility rules, kept separate from the engine's IO.

use assignment::Worker;
use platform::{RemoteOrder, StatusTarget};

use crate::types::ClaimError;

/// A worker may claim only while active and opted in to auto-claiming.
pub fn worker_may_claim(worker: &Worker) -> Result<(), ClaimError> {
    if !worker.active {
        return Err(ClaimError::WorkerInactive(worker.id));
    }
    if !worker.auto_claim {
        return Err(ClaimError::AutoClaimDisabled(worker.id));
    }
    Ok(())
}

pub fn has_capacity(current: u64, max: u32) -> bool {
    current < u64::from(max)
}

/// The status pool a worker draws from: its own scope when set,
/// otherwise the shared claimable pool.
pub fn claim_scope<'a>(worker: &'a Worker, default: &'a StatusTarget) -> &'a StatusTarget {
    worker.scope.as_ref().unwrap_or(default)
}

pub fn order_in_scope(order: &RemoteOrder, scope: &StatusTarget) -> bool {
    order.status.matches(scope)
}
