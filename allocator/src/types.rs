use async_trait::async_trait;
use platform::{GatewayError, StatusTarget};
use thiserror::Error;

use assignment::Assignment;

/// Tuning knobs for the claiming engine.
#[derive(Debug, Clone)]
pub struct AllocatorConfig {
    /// Remote status pool that unclaimed orders are drawn from, used
    /// when a worker carries no scope of its own.
    pub claimable_status: StatusTarget,

    /// How many remote orders one claim attempt will look at.
    pub scan_limit: usize,

    /// How many lost claim races one attempt tolerates before giving up.
    pub claim_retries: u32,
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self {
            claimable_status: StatusTarget::by_slug("in-progress"),
            scan_limit: 50,
            claim_retries: 1,
        }
    }
}

/// Source of order ids that should be claimed ahead of the age order.
#[async_trait]
pub trait PriorityProvider: Send + Sync {
    async fn priority_order_ids(&self) -> anyhow::Result<Vec<i64>>;
}

/// Fixed priority list, set at startup.
#[derive(Debug, Clone, Default)]
pub struct StaticPriorityList {
    ids: Vec<i64>,
}

impl StaticPriorityList {
    pub fn new(ids: Vec<i64>) -> Self {
        Self { ids }
    }
}

#[async_trait]
impl PriorityProvider for StaticPriorityList {
    async fn priority_order_ids(&self) -> anyhow::Result<Vec<i64>> {
        Ok(self.ids.clone())
    }
}

/// Result of one claim attempt that ran to completion.
#[derive(Debug)]
pub enum ClaimOutcome {
    Claimed(Assignment),

    /// The worker already holds `current` of `max` allowed orders.
    AtCapacity { current: u64, max: u32 },

    /// Nothing in the pool was claimable for this worker right now.
    NoEligibleOrders,
}

#[derive(Error, Debug)]
pub enum ClaimError {
    #[error("worker {0} is not registered")]
    WorkerUnknown(assignment::WorkerId),

    #[error("worker {0} is deactivated")]
    WorkerInactive(assignment::WorkerId),

    #[error("worker {0} has automatic claiming disabled")]
    AutoClaimDisabled(assignment::WorkerId),

    #[error("remote platform unavailable")]
    Remote(#[from] GatewayError),

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}
