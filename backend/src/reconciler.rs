//! Detects remote status drift on active assignments.
//!
//! A sweep walks every active assignment, reads the remote order, and
//! compares the observed status against the allow-list. Matches only
//! refresh the cached status; anything else invalidates the assignment
//! and archives it. One unreachable order never stops a sweep.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use chrono::Utc;
use common::logger::TraceId;
use platform::{StatusGateway, StatusTarget};
use tracing::{info, instrument, warn};

use assignment::{Assignment, AssignmentStore, HistoryEntry, HistoryStore, WorkerStore};

use crate::metrics::Counters;

#[derive(Debug, Default)]
pub struct ReconcileSummary {
    pub checked: usize,
    pub invalidated: usize,
    /// Fetch or store failures that left an assignment untouched.
    pub skipped: usize,
    pub invalidated_orders: Vec<i64>,
}

pub struct StatusReconciler {
    gateway: Arc<dyn StatusGateway>,
    assignments: Arc<dyn AssignmentStore>,
    workers: Arc<dyn WorkerStore>,
    history: Arc<dyn HistoryStore>,
    merchant_id: String,
    allowed: Vec<StatusTarget>,
    counters: Counters,
}

impl StatusReconciler {
    pub fn new(
        gateway: Arc<dyn StatusGateway>,
        assignments: Arc<dyn AssignmentStore>,
        workers: Arc<dyn WorkerStore>,
        history: Arc<dyn HistoryStore>,
        merchant_id: impl Into<String>,
        allowed: Vec<StatusTarget>,
        counters: Counters,
    ) -> Self {
        Self {
            gateway,
            assignments,
            workers,
            history,
            merchant_id: merchant_id.into(),
            allowed,
            counters,
        }
    }

    /// Sweep every active assignment, or just one worker's.
    #[instrument(skip(self), fields(sweep_id = %TraceId::new()))]
    pub async fn run_sweep(
        &self,
        scope: Option<assignment::WorkerId>,
    ) -> anyhow::Result<ReconcileSummary> {
        let active = self.assignments.load_active(scope).await?;
        let mut summary = ReconcileSummary::default();

        for assignment in active {
            summary.checked += 1;
            self.counters.reconcile_checked.fetch_add(1, Ordering::Relaxed);

            match self.reconcile_one(assignment).await {
                Ok(Some(order_id)) => {
                    summary.invalidated += 1;
                    summary.invalidated_orders.push(order_id);
                    self.counters
                        .reconcile_invalidated
                        .fetch_add(1, Ordering::Relaxed);
                }
                Ok(None) => {}
                Err(e) => {
                    // Isolation: this assignment gets another look next
                    // sweep.
                    summary.skipped += 1;
                    self.counters.reconcile_skipped.fetch_add(1, Ordering::Relaxed);
                    warn!(error = %e, "reconciliation skipped an assignment");
                }
            }
        }

        info!(
            checked = summary.checked,
            invalidated = summary.invalidated,
            skipped = summary.skipped,
            "reconciliation sweep finished"
        );

        Ok(summary)
    }

    /// Returns the order id when the assignment was invalidated.
    async fn reconcile_one(&self, mut assignment: Assignment) -> anyhow::Result<Option<i64>> {
        let order = self
            .gateway
            .get_order(&self.merchant_id, assignment.order_id)
            .await?;

        if self.allowed.iter().any(|t| order.status.matches(t)) {
            // Still in an allowed status; keep the cached view fresh.
            if order.status != assignment.remote_status {
                assignment.remote_status = order.status;
                self.assignments.save(&assignment).await?;
            }
            return Ok(None);
        }

        let order_id = assignment.order_id;
        let observed = order.status.label();
        let now = Utc::now();

        if let Err(e) = assignment.mark_removed(order.status, now) {
            return Err(anyhow::anyhow!(e));
        }

        let worker_name = match self.workers.fetch_worker(assignment.worker_id).await? {
            Some(w) => w.name,
            None => assignment.worker_id.to_string(),
        };
        let note = assignment
            .note
            .clone()
            .unwrap_or_else(|| format!("status changed remotely to {observed}"));

        // Archive before persisting the removal. If the append fails
        // the assignment stays active and the next sweep retries it.
        self.history
            .append(&HistoryEntry::from_assignment(
                &assignment,
                &worker_name,
                note,
                now,
            ))
            .await?;
        self.assignments.save(&assignment).await?;

        warn!(order_id, observed = %observed, "assignment invalidated by remote drift");
        Ok(Some(order_id))
    }
}
