use std::sync::Arc;

use chrono::{DateTime, Utc};
use platform::{GatewayError, StatusGateway};
use tracing::{debug, info, instrument, warn};

use assignment::{Assignment, AssignmentStore, WorkerId, WorkerStore};

use crate::eligibility::{claim_scope, has_capacity, order_in_scope, worker_may_claim};
use crate::types::{AllocatorConfig, ClaimError, ClaimOutcome, PriorityProvider};

/// Claims the next order for a worker, one attempt per call.
///
/// Selection order is: priority ids first, then the remote listing
/// oldest first. The store's uniqueness constraint is the only
/// arbiter of races; losing one just moves on to the next candidate.
pub struct CapacityAllocator {
    gateway: Arc<dyn StatusGateway>,
    assignments: Arc<dyn AssignmentStore>,
    workers: Arc<dyn WorkerStore>,
    priority: Arc<dyn PriorityProvider>,
    merchant_id: String,
    config: AllocatorConfig,
}

impl CapacityAllocator {
    pub fn new(
        gateway: Arc<dyn StatusGateway>,
        assignments: Arc<dyn AssignmentStore>,
        workers: Arc<dyn WorkerStore>,
        priority: Arc<dyn PriorityProvider>,
        merchant_id: impl Into<String>,
        config: AllocatorConfig,
    ) -> Self {
        Self {
            gateway,
            assignments,
            workers,
            priority,
            merchant_id: merchant_id.into(),
            config,
        }
    }

    #[instrument(skip(self), fields(worker_id = %worker_id))]
    pub async fn claim_next_order(
        &self,
        worker_id: WorkerId,
        now: DateTime<Utc>,
    ) -> Result<ClaimOutcome, ClaimError> {
        let worker = self
            .workers
            .fetch_worker(worker_id)
            .await?
            .ok_or(ClaimError::WorkerUnknown(worker_id))?;

        worker_may_claim(&worker)?;

        let current = self.assignments.count_active_for_worker(worker_id).await?;
        if !has_capacity(current, worker.max_orders) {
            debug!(current, max = worker.max_orders, "worker at capacity");
            return Ok(ClaimOutcome::AtCapacity {
                current,
                max: worker.max_orders,
            });
        }

        let scope = claim_scope(&worker, &self.config.claimable_status).clone();
        let held = self.assignments.active_order_ids().await?;

        let mut candidates = Vec::new();

        // Priority orders jump the queue. Fetch failures here are
        // tolerated; the regular listing still gets its chance.
        for order_id in self.priority.priority_order_ids().await? {
            if held.contains(&order_id) {
                continue;
            }
            match self.gateway.get_order(&self.merchant_id, order_id).await {
                Ok(order) if order_in_scope(&order, &scope) => candidates.push(order),
                Ok(order) => {
                    debug!(
                        order_id,
                        status = %order.status.label(),
                        "priority order outside claimable scope"
                    );
                }
                Err(GatewayError::NotFound) => {
                    debug!(order_id, "priority order no longer exists");
                }
                Err(e) => {
                    warn!(order_id, error = %e, "priority order fetch failed");
                }
            }
        }

        let listing = self
            .gateway
            .list_orders(&self.merchant_id, Some(&scope), self.config.scan_limit)
            .await?;

        for order in listing {
            if held.contains(&order.id) {
                continue;
            }
            if candidates.iter().any(|c| c.id == order.id) {
                continue;
            }
            candidates.push(order);
        }

        let mut conflicts = 0u32;
        for order in candidates {
            let claim = Assignment::claim(&order, worker_id, now);
            if self.assignments.insert_claim(&claim).await? {
                info!(
                    order_id = order.id,
                    order_number = %order.number,
                    "order claimed"
                );
                return Ok(ClaimOutcome::Claimed(claim));
            }

            // Someone else won the race between our listing and the insert.
            conflicts += 1;
            debug!(order_id = order.id, conflicts, "claim race lost");
            if conflicts > self.config.claim_retries {
                warn!(conflicts, "claim retry budget exhausted");
                break;
            }
        }

        Ok(ClaimOutcome::NoEligibleOrders)
    }
}
