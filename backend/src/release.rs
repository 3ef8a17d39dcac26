//! Releases an active assignment back to the shared pool.
//!
//! The remote write is the commit point and fails closed: if the
//! platform does not accept the status write, nothing changes locally.
//! Once the write is accepted the local release always goes through;
//! the follow-up confirmation poll only reports whether the platform
//! was observed reflecting it in time.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use chrono::Utc;
use platform::{GatewayError, RemoteStatus, StatusGateway, StatusTarget};
use thiserror::Error;
use tracing::{info, instrument, warn};

use assignment::{
    Assignment, AssignmentId, AssignmentStore, HistoryEntry, HistoryStore, WorkerStore,
};

use crate::capability::AuthContext;
use crate::metrics::Counters;

#[derive(Error, Debug)]
pub enum ReleaseError {
    #[error("assignment {0} not found")]
    NotFound(AssignmentId),

    #[error("assignment is {status} and cannot be released")]
    NotReleasable { status: assignment::AssignmentStatus },

    #[error("actor may not release this assignment")]
    Forbidden,

    /// The remote write did not succeed, so the assignment stays put.
    #[error("remote status write failed")]
    Remote(#[from] GatewayError),

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

#[derive(Debug)]
pub struct ReleaseOutcome {
    pub assignment: Assignment,

    /// Whether the platform was observed carrying the released status
    /// within the polling window. `false` is a visibility statement,
    /// not a failure.
    pub confirmed: bool,

    /// Last remote status seen while polling.
    pub remote_status: Option<RemoteStatus>,
}

pub struct ReleaseCoordinator {
    gateway: Arc<dyn StatusGateway>,
    assignments: Arc<dyn AssignmentStore>,
    workers: Arc<dyn WorkerStore>,
    history: Arc<dyn HistoryStore>,
    merchant_id: String,
    release_target: StatusTarget,
    poll_attempts: u32,
    poll_delay: Duration,
    counters: Counters,
}

impl ReleaseCoordinator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        gateway: Arc<dyn StatusGateway>,
        assignments: Arc<dyn AssignmentStore>,
        workers: Arc<dyn WorkerStore>,
        history: Arc<dyn HistoryStore>,
        merchant_id: impl Into<String>,
        release_target: StatusTarget,
        poll_attempts: u32,
        poll_delay: Duration,
        counters: Counters,
    ) -> Self {
        Self {
            gateway,
            assignments,
            workers,
            history,
            merchant_id: merchant_id.into(),
            release_target,
            poll_attempts,
            poll_delay,
            counters,
        }
    }

    /// `target` overrides the configured release status for this one
    /// call; `None` uses the coordinator's default.
    #[instrument(skip(self, auth, target), fields(assignment_id = %assignment_id))]
    pub async fn release(
        &self,
        auth: &AuthContext,
        assignment_id: AssignmentId,
        target: Option<&StatusTarget>,
    ) -> Result<ReleaseOutcome, ReleaseError> {
        let target = target.unwrap_or(&self.release_target);
        let mut assignment = self
            .assignments
            .fetch_by_id(assignment_id)
            .await?
            .ok_or(ReleaseError::NotFound(assignment_id))?;

        if !auth.may_release(assignment.worker_id) {
            return Err(ReleaseError::Forbidden);
        }

        if !matches!(
            assignment.status,
            assignment::AssignmentStatus::Assigned | assignment::AssignmentStatus::Preparing
        ) {
            return Err(ReleaseError::NotReleasable {
                status: assignment.status,
            });
        }

        // Commit point. A failure here leaves the claim untouched.
        self.gateway
            .set_order_status(&self.merchant_id, assignment.order_id, target)
            .await?;

        // The write is in; from here the local release always happens.
        // Confirmation only decides what we can tell the caller.
        let (confirmed, remote_status) = self.confirm(assignment.order_id, target).await;

        let now = Utc::now();
        if let Err(e) = assignment.mark_released(now) {
            // Status was checked above; this only fires on a race with
            // another writer.
            return Err(ReleaseError::Store(anyhow::anyhow!(e)));
        }
        if let Some(observed) = &remote_status {
            assignment.remote_status = observed.clone();
        }

        let worker_name = match self.workers.fetch_worker(assignment.worker_id).await? {
            Some(w) => w.name,
            None => assignment.worker_id.to_string(),
        };

        // Archive first. A failed append surfaces as an error while the
        // row is still active, so the release can be retried.
        self.history
            .append(&HistoryEntry::from_assignment(
                &assignment,
                &worker_name,
                "released back to pool",
                now,
            ))
            .await?;
        self.assignments.save(&assignment).await?;

        self.counters.releases.fetch_add(1, Ordering::Relaxed);
        info!(order_id = assignment.order_id, "assignment released");

        if confirmed {
            self.counters.releases_confirmed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.counters.releases_unconfirmed.fetch_add(1, Ordering::Relaxed);
            warn!(
                order_id = assignment.order_id,
                "release not confirmed within polling window"
            );
        }

        Ok(ReleaseOutcome {
            assignment,
            confirmed,
            remote_status,
        })
    }

    /// Bounded poll for the platform reflecting the released status.
    /// Read failures are tolerated; the window just keeps shrinking.
    async fn confirm(&self, order_id: i64, target: &StatusTarget) -> (bool, Option<RemoteStatus>) {
        let mut last_seen = None;

        for attempt in 1..=self.poll_attempts {
            match self.gateway.get_order(&self.merchant_id, order_id).await {
                Ok(order) => {
                    if order.status.matches(target) {
                        return (true, Some(order.status));
                    }
                    last_seen = Some(order.status);
                }
                Err(e) => {
                    warn!(order_id, attempt, error = %e, "confirmation read failed");
                }
            }

            if attempt < self.poll_attempts {
                tokio::time::sleep(self.poll_delay).await;
            }
        }

        (false, last_seen)
    }
}
