use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use platform::{OrderItem, RemoteOrder, RemoteStatus, StatusTarget};

pub type AssignmentId = Uuid;
pub type WorkerId = Uuid;

/// Local lifecycle status of an assignment.
///
/// Active statuses keep the order claimed; the three terminal statuses
/// are reachable only through the named transitions below and never
/// leave the table (terminal rows are retained for audit).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignmentStatus {
    Assigned,
    Preparing,
    Shipped,
    Completed,
    Released,
    Removed,
}

impl AssignmentStatus {
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            AssignmentStatus::Assigned | AssignmentStatus::Preparing | AssignmentStatus::Shipped
        )
    }
}

impl fmt::Display for AssignmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AssignmentStatus::Assigned => "Assigned",
            AssignmentStatus::Preparing => "Preparing",
            AssignmentStatus::Shipped => "Shipped",
            AssignmentStatus::Completed => "Completed",
            AssignmentStatus::Released => "Released",
            AssignmentStatus::Removed => "Removed",
        };
        f.write_str(s)
    }
}

impl FromStr for AssignmentStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Assigned" => Ok(AssignmentStatus::Assigned),
            "Preparing" => Ok(AssignmentStatus::Preparing),
            "Shipped" => Ok(AssignmentStatus::Shipped),
            "Completed" => Ok(AssignmentStatus::Completed),
            "Released" => Ok(AssignmentStatus::Released),
            "Removed" => Ok(AssignmentStatus::Removed),
            other => Err(anyhow::anyhow!("Invalid AssignmentStatus value: {}", other)),
        }
    }
}

#[derive(Error, Debug, PartialEq)]
pub enum TransitionError {
    #[error("invalid transition from {from} to {to}")]
    Invalid {
        from: AssignmentStatus,
        to: AssignmentStatus,
    },

    #[error("remote order is not in progress (currently: {observed})")]
    RemoteNotInProgress { observed: String },
}

/// One worker's exclusive claim on one remote order.
#[derive(Debug, Clone)]
pub struct Assignment {
    pub id: AssignmentId,
    pub order_id: i64,
    pub order_number: String,
    pub worker_id: WorkerId,
    pub status: AssignmentStatus,

    /// Last-known remote status, refreshed whenever a remote-confirmed
    /// transition touches this row.
    pub remote_status: RemoteStatus,

    pub assigned_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub removed_at: Option<DateTime<Utc>>,
    pub note: Option<String>,

    /// Order contents snapshotted at claim time.
    pub items: Vec<OrderItem>,
    pub order_total_cents: i64,
}

impl Assignment {
    /// Build a fresh claim from a remote order snapshot.
    pub fn claim(order: &RemoteOrder, worker_id: WorkerId, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            order_id: order.id,
            order_number: order.number.clone(),
            worker_id,
            status: AssignmentStatus::Assigned,
            remote_status: order.status.clone(),
            assigned_at: now,
            started_at: None,
            completed_at: None,
            removed_at: None,
            note: None,
            items: order.items.clone(),
            order_total_cents: order.total_cents,
        }
    }

    /// Worker begins warehouse preparation.
    pub fn start(&mut self, now: DateTime<Utc>) -> Result<(), TransitionError> {
        self.transition_guard(AssignmentStatus::Assigned, AssignmentStatus::Preparing)?;
        self.status = AssignmentStatus::Preparing;
        self.started_at = Some(now);
        Ok(())
    }

    /// Prepared order handed to the carrier.
    pub fn ship(&mut self) -> Result<(), TransitionError> {
        self.transition_guard(AssignmentStatus::Preparing, AssignmentStatus::Shipped)?;
        self.status = AssignmentStatus::Shipped;
        Ok(())
    }

    /// Worker finishes the order.
    ///
    /// Gated on the last-known remote status: completion is only valid
    /// while the remote platform still shows the order in progress.
    pub fn complete(
        &mut self,
        in_progress: &[StatusTarget],
        now: DateTime<Utc>,
    ) -> Result<(), TransitionError> {
        self.transition_guard(AssignmentStatus::Preparing, AssignmentStatus::Completed)?;

        if !in_progress.iter().any(|t| self.remote_status.matches(t)) {
            return Err(TransitionError::RemoteNotInProgress {
                observed: self.remote_status.label(),
            });
        }

        self.status = AssignmentStatus::Completed;
        self.completed_at = Some(now);
        Ok(())
    }

    /// Coordinator-driven exit: the claim is handed back to the pool.
    pub fn mark_released(&mut self, now: DateTime<Utc>) -> Result<(), TransitionError> {
        if !matches!(
            self.status,
            AssignmentStatus::Assigned | AssignmentStatus::Preparing
        ) {
            return Err(TransitionError::Invalid {
                from: self.status,
                to: AssignmentStatus::Released,
            });
        }
        self.status = AssignmentStatus::Released;
        self.removed_at = Some(now);
        Ok(())
    }

    /// Reconciler-driven exit: remote status drifted outside the
    /// allow-list while the assignment was active.
    pub fn mark_removed(
        &mut self,
        observed: RemoteStatus,
        now: DateTime<Utc>,
    ) -> Result<(), TransitionError> {
        if !self.status.is_active() {
            return Err(TransitionError::Invalid {
                from: self.status,
                to: AssignmentStatus::Removed,
            });
        }
        self.note = Some(format!("status changed remotely to {}", observed.label()));
        self.remote_status = observed;
        self.status = AssignmentStatus::Removed;
        self.removed_at = Some(now);
        Ok(())
    }

    fn transition_guard(
        &self,
        expected: AssignmentStatus,
        to: AssignmentStatus,
    ) -> Result<(), TransitionError> {
        if self.status != expected {
            return Err(TransitionError::Invalid {
                from: self.status,
                to,
            });
        }
        Ok(())
    }
}

/// Capacity profile of a named actor eligible to claim orders.
#[derive(Debug, Clone)]
pub struct Worker {
    pub id: WorkerId,
    pub name: String,
    pub active: bool,
    /// Hard cap on concurrent active assignments.
    pub max_orders: u32,
    /// Whether the worker participates in automatic claiming.
    pub auto_claim: bool,
    /// Optional restriction to a specific remote-status pool.
    pub scope: Option<StatusTarget>,
}

/// Write-once archival record of an assignment that left the active set.
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub id: Uuid,
    pub worker_id: WorkerId,
    pub worker_name: String,
    pub order_id: i64,
    pub order_number: String,
    pub items: Vec<OrderItem>,
    pub final_status: AssignmentStatus,
    pub assigned_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: DateTime<Utc>,
    /// `finished_at - started_at`; None when work never started.
    pub duration_secs: Option<i64>,
    pub final_remote_status: Option<String>,
    pub note: String,
}

impl HistoryEntry {
    pub fn from_assignment(
        assignment: &Assignment,
        worker_name: &str,
        note: impl Into<String>,
        finished_at: DateTime<Utc>,
    ) -> Self {
        let duration_secs = assignment
            .started_at
            .map(|started| (finished_at - started).num_seconds());

        Self {
            id: Uuid::new_v4(),
            worker_id: assignment.worker_id,
            worker_name: worker_name.to_string(),
            order_id: assignment.order_id,
            order_number: assignment.order_number.clone(),
            items: assignment.items.clone(),
            final_status: assignment.status,
            assigned_at: assignment.assigned_at,
            started_at: assignment.started_at,
            finished_at,
            duration_secs,
            final_remote_status: Some(assignment.remote_status.label()),
            note: note.into(),
        }
    }
}

/// Raw record of one inbound webhook delivery; written unconditionally.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookLogEntry {
    pub id: Uuid,
    pub raw_body: String,
    pub payload: Option<serde_json::Value>,
    /// None when no signature header was supplied.
    pub signature_ok: Option<bool>,
    pub order_id: Option<i64>,
    pub status: Option<String>,
    pub event_type: Option<String>,
    pub parse_error: Option<String>,
    pub received_at: DateTime<Utc>,
}

/// Deduplicated business projection of webhook traffic, unique per
/// (order id, status).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEvent {
    pub id: Uuid,
    pub event_type: String,
    pub order_id: i64,
    pub status: String,
    pub payload: serde_json::Value,
    pub received_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order(id: i64) -> RemoteOrder {
        RemoteOrder {
            id,
            number: format!("A-{id}"),
            status: RemoteStatus {
                id: Some(3),
                slug: Some("in-progress".into()),
                name: Some("In progress".into()),
            },
            created_at: Some(Utc::now()),
            items: vec![],
            total_cents: 1_000,
        }
    }

    fn in_progress_set() -> Vec<StatusTarget> {
        vec![StatusTarget::by_id(3), StatusTarget::by_slug("in-progress")]
    }

    #[test]
    fn forward_path_assigned_preparing_completed() {
        let now = Utc::now();
        let mut a = Assignment::claim(&order(1), Uuid::new_v4(), now);

        a.start(now).unwrap();
        assert_eq!(a.status, AssignmentStatus::Preparing);
        assert!(a.started_at.is_some());

        a.complete(&in_progress_set(), now).unwrap();
        assert_eq!(a.status, AssignmentStatus::Completed);
        assert!(a.completed_at.is_some());
    }

    #[test]
    fn no_direct_assigned_to_completed_skip() {
        let now = Utc::now();
        let mut a = Assignment::claim(&order(1), Uuid::new_v4(), now);

        let err = a.complete(&in_progress_set(), now).unwrap_err();
        assert_eq!(
            err,
            TransitionError::Invalid {
                from: AssignmentStatus::Assigned,
                to: AssignmentStatus::Completed,
            }
        );
        assert_eq!(a.status, AssignmentStatus::Assigned, "no mutation on failure");
    }

    #[test]
    fn completion_requires_remote_in_progress() {
        let now = Utc::now();
        let mut a = Assignment::claim(&order(1), Uuid::new_v4(), now);
        a.start(now).unwrap();

        a.remote_status = RemoteStatus {
            id: Some(9),
            slug: Some("cancelled".into()),
            name: Some("Cancelled".into()),
        };

        let err = a.complete(&in_progress_set(), now).unwrap_err();
        assert!(matches!(err, TransitionError::RemoteNotInProgress { .. }));
        assert_eq!(a.status, AssignmentStatus::Preparing);
        assert!(a.completed_at.is_none());
    }

    #[test]
    fn release_only_from_assigned_or_preparing() {
        let now = Utc::now();
        let mut a = Assignment::claim(&order(1), Uuid::new_v4(), now);
        a.start(now).unwrap();
        a.ship().unwrap();

        let err = a.mark_released(now).unwrap_err();
        assert!(matches!(err, TransitionError::Invalid { .. }));

        let mut b = Assignment::claim(&order(2), Uuid::new_v4(), now);
        b.mark_released(now).unwrap();
        assert_eq!(b.status, AssignmentStatus::Released);
        assert!(b.removed_at.is_some());
    }

    #[test]
    fn removal_records_observed_status_in_note() {
        let now = Utc::now();
        let mut a = Assignment::claim(&order(1), Uuid::new_v4(), now);

        a.mark_removed(
            RemoteStatus {
                id: None,
                slug: Some("cancelled".into()),
                name: Some("Cancelled".into()),
            },
            now,
        )
        .unwrap();

        assert_eq!(a.status, AssignmentStatus::Removed);
        assert_eq!(a.note.as_deref(), Some("status changed remotely to Cancelled"));
    }

    #[test]
    fn terminal_assignment_cannot_be_removed_again() {
        let now = Utc::now();
        let mut a = Assignment::claim(&order(1), Uuid::new_v4(), now);
        a.mark_released(now).unwrap();

        assert!(a.mark_removed(RemoteStatus::default(), now).is_err());
    }

    #[test]
    fn history_duration_depends_on_started_at() {
        let t0 = Utc::now();
        let t1 = t0 + chrono::Duration::seconds(90);

        let mut a = Assignment::claim(&order(1), Uuid::new_v4(), t0);
        let entry = HistoryEntry::from_assignment(&a, "ada", "never started", t1);
        assert_eq!(entry.duration_secs, None);

        a.start(t0).unwrap();
        let entry = HistoryEntry::from_assignment(&a, "ada", "ran for a while", t1);
        assert_eq!(entry.duration_secs, Some(90));
    }

    #[test]
    fn status_round_trips_through_strings() {
        for s in [
            AssignmentStatus::Assigned,
            AssignmentStatus::Preparing,
            AssignmentStatus::Shipped,
            AssignmentStatus::Completed,
            AssignmentStatus::Released,
            AssignmentStatus::Removed,
        ] {
            assert_eq!(s.to_string().parse::<AssignmentStatus>().unwrap(), s);
        }
        assert!("Bogus".parse::<AssignmentStatus>().is_err());
    }
}
