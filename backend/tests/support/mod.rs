//! In-memory doubles for the workflow coordinator tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use assignment::{
    Assignment, AssignmentId, AssignmentStore, HistoryEntry, HistoryStore, WebhookEvent,
    WebhookLogEntry, WebhookStore, Worker, WorkerId, WorkerStore,
};
use platform::{
    GatewayError, OrderItem, RemoteOrder, RemoteStatus, StatusGateway, StatusTarget,
};

pub fn in_progress() -> RemoteStatus {
    RemoteStatus {
        id: Some(3),
        slug: Some("in-progress".into()),
        name: Some("In progress".into()),
    }
}

pub fn cancelled() -> RemoteStatus {
    RemoteStatus {
        id: Some(9),
        slug: Some("cancelled".into()),
        name: Some("Cancelled".into()),
    }
}

pub fn order(id: i64, status: RemoteStatus) -> RemoteOrder {
    RemoteOrder {
        id,
        number: format!("A-{id}"),
        status,
        created_at: Some(Utc::now()),
        items: vec![OrderItem {
            sku: format!("SKU-{id}"),
            name: "Widget".into(),
            quantity: 1,
            unit_price_cents: 500,
        }],
        total_cents: 500,
    }
}

pub fn worker(name: &str) -> Worker {
    Worker {
        id: Uuid::new_v4(),
        name: name.into(),
        active: true,
        max_orders: 3,
        auto_claim: true,
        scope: None,
    }
}

/// Gateway double with scriptable reads and writes.
///
/// Reads consume a per-order snapshot queue; the last snapshot repeats
/// once the queue is drained, so a status "settles".
#[derive(Default)]
pub struct MockGateway {
    snapshots: Mutex<HashMap<i64, VecDeque<RemoteOrder>>>,
    pub write_error: Mutex<Option<GatewayError>>,
    pub writes: Mutex<Vec<(i64, StatusTarget)>>,
}

impl MockGateway {
    pub fn push_snapshot(&self, order: RemoteOrder) {
        self.snapshots
            .lock()
            .unwrap()
            .entry(order.id)
            .or_default()
            .push_back(order);
    }

    pub fn fail_next_write(&self, error: GatewayError) {
        *self.write_error.lock().unwrap() = Some(error);
    }

    pub fn write_count(&self) -> usize {
        self.writes.lock().unwrap().len()
    }
}

#[async_trait]
impl StatusGateway for MockGateway {
    async fn get_order(
        &self,
        _merchant_id: &str,
        order_id: i64,
    ) -> Result<RemoteOrder, GatewayError> {
        let mut snapshots = self.snapshots.lock().unwrap();
        let queue = snapshots.get_mut(&order_id).ok_or(GatewayError::NotFound)?;
        if queue.is_empty() {
            return Err(GatewayError::NotFound);
        }
        if queue.len() > 1 {
            Ok(queue.pop_front().unwrap())
        } else {
            Ok(queue[0].clone())
        }
    }

    async fn set_order_status(
        &self,
        _merchant_id: &str,
        order_id: i64,
        target: &StatusTarget,
    ) -> Result<(), GatewayError> {
        if let Some(e) = self.write_error.lock().unwrap().take() {
            return Err(e);
        }
        self.writes.lock().unwrap().push((order_id, target.clone()));
        Ok(())
    }

    async fn list_orders(
        &self,
        _merchant_id: &str,
        scope: Option<&StatusTarget>,
        limit: usize,
    ) -> Result<Vec<RemoteOrder>, GatewayError> {
        let snapshots = self.snapshots.lock().unwrap();
        let mut out: Vec<RemoteOrder> = snapshots
            .values()
            .filter_map(|q| q.front().cloned())
            .filter(|o| scope.is_none_or(|s| o.status.matches(s)))
            .collect();
        out.sort_by_key(|o| o.created_at);
        out.truncate(limit);
        Ok(out)
    }
}

/// One in-memory store backing all four persistence traits.
#[derive(Default)]
pub struct MemoryStore {
    pub assignments: Mutex<Vec<Assignment>>,
    pub workers: Mutex<HashMap<WorkerId, Worker>>,
    pub history: Mutex<Vec<HistoryEntry>>,
    pub deliveries: Mutex<Vec<WebhookLogEntry>>,
    pub events: Mutex<Vec<WebhookEvent>>,
    history_down: AtomicBool,
}

impl MemoryStore {
    pub fn add_worker(&self, w: Worker) {
        self.workers.lock().unwrap().insert(w.id, w);
    }

    /// Every subsequent history append fails.
    pub fn fail_history_appends(&self) {
        self.history_down.store(true, Ordering::Relaxed);
    }

    pub fn add_assignment(&self, a: Assignment) {
        self.assignments.lock().unwrap().push(a);
    }

    pub fn assignment(&self, id: AssignmentId) -> Assignment {
        self.assignments
            .lock()
            .unwrap()
            .iter()
            .find(|a| a.id == id)
            .cloned()
            .unwrap()
    }

    pub fn history_len(&self) -> usize {
        self.history.lock().unwrap().len()
    }

    pub fn delivery_count(&self) -> usize {
        self.deliveries.lock().unwrap().len()
    }

    pub fn event_count(&self) -> usize {
        self.events.lock().unwrap().len()
    }
}

#[async_trait]
impl AssignmentStore for MemoryStore {
    async fn insert_claim(&self, assignment: &Assignment) -> anyhow::Result<bool> {
        let mut assignments = self.assignments.lock().unwrap();
        if assignments
            .iter()
            .any(|a| a.order_id == assignment.order_id && a.status.is_active())
        {
            return Ok(false);
        }
        assignments.push(assignment.clone());
        Ok(true)
    }

    async fn save(&self, assignment: &Assignment) -> anyhow::Result<()> {
        let mut assignments = self.assignments.lock().unwrap();
        if let Some(slot) = assignments.iter_mut().find(|a| a.id == assignment.id) {
            *slot = assignment.clone();
        } else {
            assignments.push(assignment.clone());
        }
        Ok(())
    }

    async fn fetch_by_id(&self, id: AssignmentId) -> anyhow::Result<Option<Assignment>> {
        Ok(self
            .assignments
            .lock()
            .unwrap()
            .iter()
            .find(|a| a.id == id)
            .cloned())
    }

    async fn fetch_active_by_order(&self, order_id: i64) -> anyhow::Result<Option<Assignment>> {
        Ok(self
            .assignments
            .lock()
            .unwrap()
            .iter()
            .find(|a| a.order_id == order_id && a.status.is_active())
            .cloned())
    }

    async fn load_active(&self, worker: Option<WorkerId>) -> anyhow::Result<Vec<Assignment>> {
        Ok(self
            .assignments
            .lock()
            .unwrap()
            .iter()
            .filter(|a| a.status.is_active())
            .filter(|a| worker.is_none_or(|w| a.worker_id == w))
            .cloned()
            .collect())
    }

    async fn count_active_for_worker(&self, worker: WorkerId) -> anyhow::Result<u64> {
        Ok(self
            .assignments
            .lock()
            .unwrap()
            .iter()
            .filter(|a| a.worker_id == worker && a.status.is_active())
            .count() as u64)
    }

    async fn active_order_ids(&self) -> anyhow::Result<HashSet<i64>> {
        Ok(self
            .assignments
            .lock()
            .unwrap()
            .iter()
            .filter(|a| a.status.is_active())
            .map(|a| a.order_id)
            .collect())
    }
}

#[async_trait]
impl WorkerStore for MemoryStore {
    async fn fetch_worker(&self, id: WorkerId) -> anyhow::Result<Option<Worker>> {
        Ok(self.workers.lock().unwrap().get(&id).cloned())
    }

    async fn save_worker(&self, worker: &Worker) -> anyhow::Result<()> {
        self.workers.lock().unwrap().insert(worker.id, worker.clone());
        Ok(())
    }
}

#[async_trait]
impl HistoryStore for MemoryStore {
    async fn append(&self, entry: &HistoryEntry) -> anyhow::Result<()> {
        if self.history_down.load(Ordering::Relaxed) {
            anyhow::bail!("history store unavailable");
        }
        self.history.lock().unwrap().push(entry.clone());
        Ok(())
    }

    async fn list_for_worker(
        &self,
        worker: WorkerId,
        limit: usize,
    ) -> anyhow::Result<Vec<HistoryEntry>> {
        let mut entries: Vec<HistoryEntry> = self
            .history
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.worker_id == worker)
            .cloned()
            .collect();
        entries.sort_by_key(|e| std::cmp::Reverse(e.finished_at));
        entries.truncate(limit);
        Ok(entries)
    }
}

#[async_trait]
impl WebhookStore for MemoryStore {
    async fn log_delivery(&self, entry: &WebhookLogEntry) -> anyhow::Result<()> {
        self.deliveries.lock().unwrap().push(entry.clone());
        Ok(())
    }

    async fn insert_event(&self, event: &WebhookEvent) -> anyhow::Result<bool> {
        let mut events = self.events.lock().unwrap();
        if events
            .iter()
            .any(|e| e.order_id == event.order_id && e.status == event.status)
        {
            return Ok(false);
        }
        events.push(event.clone());
        Ok(true)
    }

    async fn recent_deliveries(&self, limit: usize) -> anyhow::Result<Vec<WebhookLogEntry>> {
        let mut deliveries: Vec<WebhookLogEntry> =
            self.deliveries.lock().unwrap().iter().cloned().collect();
        deliveries.sort_by_key(|d| std::cmp::Reverse(d.received_at));
        deliveries.truncate(limit);
        Ok(deliveries)
    }
}
