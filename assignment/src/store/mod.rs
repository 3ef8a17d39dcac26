pub mod sqlite_store;

use std::collections::HashSet;

use crate::model::{
    Assignment, AssignmentId, HistoryEntry, WebhookEvent, WebhookLogEntry, Worker, WorkerId,
};

/// Durable record of active and terminal claims.
#[async_trait::async_trait]
pub trait AssignmentStore: Send + Sync {
    /// Insert a fresh claim.
    ///
    /// Returns `Ok(false)` when the order is already exclusively
    /// claimed by another active assignment (the expected race outcome,
    /// not an error).
    async fn insert_claim(&self, assignment: &Assignment) -> anyhow::Result<bool>;

    async fn save(&self, assignment: &Assignment) -> anyhow::Result<()>;

    async fn fetch_by_id(&self, id: AssignmentId) -> anyhow::Result<Option<Assignment>>;

    async fn fetch_active_by_order(&self, order_id: i64) -> anyhow::Result<Option<Assignment>>;

    /// Active assignments, optionally restricted to one worker.
    async fn load_active(&self, worker: Option<WorkerId>) -> anyhow::Result<Vec<Assignment>>;

    async fn count_active_for_worker(&self, worker: WorkerId) -> anyhow::Result<u64>;

    /// Order ids currently held by any active assignment.
    async fn active_order_ids(&self) -> anyhow::Result<HashSet<i64>>;
}

/// Capacity profiles.
#[async_trait::async_trait]
pub trait WorkerStore: Send + Sync {
    async fn fetch_worker(&self, id: WorkerId) -> anyhow::Result<Option<Worker>>;
    async fn save_worker(&self, worker: &Worker) -> anyhow::Result<()>;
}

/// Append-only archive of assignments that exited the active lifecycle.
#[async_trait::async_trait]
pub trait HistoryStore: Send + Sync {
    async fn append(&self, entry: &HistoryEntry) -> anyhow::Result<()>;
    async fn list_for_worker(
        &self,
        worker: WorkerId,
        limit: usize,
    ) -> anyhow::Result<Vec<HistoryEntry>>;
}

/// Raw webhook deliveries plus the deduplicated event projection.
#[async_trait::async_trait]
pub trait WebhookStore: Send + Sync {
    async fn log_delivery(&self, entry: &WebhookLogEntry) -> anyhow::Result<()>;

    /// Returns `Ok(false)` when an event with the same
    /// (order id, status) pair already exists.
    async fn insert_event(&self, event: &WebhookEvent) -> anyhow::Result<bool>;

    async fn recent_deliveries(&self, limit: usize) -> anyhow::Result<Vec<WebhookLogEntry>>;
}
