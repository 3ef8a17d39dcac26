//! In-memory doubles for the claiming engine tests.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use uuid::Uuid;

use assignment::{
    Assignment, AssignmentId, AssignmentStore, Worker, WorkerId, WorkerStore,
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

/// An order created `age_minutes` ago, oldest orders sorting first.
pub fn order(id: i64, age_minutes: i64, status: RemoteStatus) -> RemoteOrder {
    RemoteOrder {
        id,
        number: format!("A-{id}"),
        status,
        created_at: Some(Utc::now() - Duration::minutes(age_minutes)),
        items: vec![OrderItem {
            sku: format!("SKU-{id}"),
            name: "Widget".into(),
            quantity: 1,
            unit_price_cents: 500,
        }],
        total_cents: 500,
    }
}

pub fn worker(max_orders: u32) -> Worker {
    Worker {
        id: Uuid::new_v4(),
        name: "ada".into(),
        active: true,
        max_orders,
        auto_claim: true,
        scope: None,
    }
}

/// Gateway double backed by a fixed order list.
#[derive(Default)]
pub struct MockGateway {
    pub orders: Mutex<Vec<RemoteOrder>>,
    pub fail_listing: AtomicBool,
}

impl MockGateway {
    pub fn with_orders(orders: Vec<RemoteOrder>) -> Self {
        Self {
            orders: Mutex::new(orders),
            fail_listing: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl StatusGateway for MockGateway {
    async fn get_order(
        &self,
        _merchant_id: &str,
        order_id: i64,
    ) -> Result<RemoteOrder, GatewayError> {
        self.orders
            .lock()
            .unwrap()
            .iter()
            .find(|o| o.id == order_id)
            .cloned()
            .ok_or(GatewayError::NotFound)
    }

    async fn set_order_status(
        &self,
        _merchant_id: &str,
        _order_id: i64,
        _target: &StatusTarget,
    ) -> Result<(), GatewayError> {
        Ok(())
    }

    async fn list_orders(
        &self,
        _merchant_id: &str,
        scope: Option<&StatusTarget>,
        limit: usize,
    ) -> Result<Vec<RemoteOrder>, GatewayError> {
        if self.fail_listing.load(Ordering::SeqCst) {
            return Err(GatewayError::Transient(503));
        }

        let mut orders: Vec<RemoteOrder> = self
            .orders
            .lock()
            .unwrap()
            .iter()
            .filter(|o| scope.is_none_or(|s| o.status.matches(s)))
            .cloned()
            .collect();
        orders.sort_by_key(|o| o.created_at);
        orders.truncate(limit);
        Ok(orders)
    }
}

/// Assignment and worker store double; claim races are simulated by
/// marking order ids as contested.
#[derive(Default)]
pub struct MemoryStore {
    pub assignments: Mutex<Vec<Assignment>>,
    pub workers: Mutex<HashMap<WorkerId, Worker>>,
    pub contested_orders: Mutex<HashSet<i64>>,
}

impl MemoryStore {
    pub fn add_worker(&self, w: Worker) {
        self.workers.lock().unwrap().insert(w.id, w);
    }

    pub fn contest(&self, order_id: i64) {
        self.contested_orders.lock().unwrap().insert(order_id);
    }
}

#[async_trait]
impl AssignmentStore for MemoryStore {
    async fn insert_claim(&self, assignment: &Assignment) -> anyhow::Result<bool> {
        if self
            .contested_orders
            .lock()
            .unwrap()
            .contains(&assignment.order_id)
        {
            return Ok(false);
        }

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
