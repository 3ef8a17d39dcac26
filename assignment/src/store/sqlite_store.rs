//! SQLite-backed persistence for the back office.
//!
//! One pool serves all four store traits:
//!
//!   - assignments survive restarts and keep terminal rows for audit
//!   - claim exclusivity is enforced by a partial unique index on
//!     `order_id` over the active statuses, not by application locks
//!   - history and the webhook delivery log are append-only
//!   - webhook events carry a uniqueness constraint on (order_id, status)

use std::collections::HashSet;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::model::{
    Assignment, AssignmentId, AssignmentStatus, HistoryEntry, WebhookEvent, WebhookLogEntry,
    Worker, WorkerId,
};
use crate::store::{AssignmentStore, HistoryStore, WebhookStore, WorkerStore};

/// SQL fragment naming the statuses that keep an order claimed.
const ACTIVE_STATUSES: &str = "('Assigned','Preparing','Shipped')";

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect and ensure the schema exists.
    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        let pool = SqlitePool::connect(url).await?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
CREATE TABLE IF NOT EXISTS assignments (
  id TEXT PRIMARY KEY,
  order_id BIGINT NOT NULL,
  order_number TEXT NOT NULL,
  worker_id TEXT NOT NULL,
  status TEXT NOT NULL,
  remote_status_json TEXT NOT NULL,
  assigned_at TEXT NOT NULL,
  started_at TEXT,
  completed_at TEXT,
  removed_at TEXT,
  note TEXT,
  items_json TEXT NOT NULL,
  order_total_cents BIGINT NOT NULL
);
"#,
        )
        .execute(&self.pool)
        .await?;

        // Claim exclusivity: at most one *active* assignment per order.
        sqlx::query(&format!(
            r#"
CREATE UNIQUE INDEX IF NOT EXISTS idx_assignments_active_order
ON assignments(order_id) WHERE status IN {ACTIVE_STATUSES};
"#
        ))
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"CREATE INDEX IF NOT EXISTS idx_assignments_worker ON assignments(worker_id);"#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
CREATE TABLE IF NOT EXISTS workers (
  id TEXT PRIMARY KEY,
  name TEXT NOT NULL,
  active INTEGER NOT NULL CHECK (active IN (0,1)),
  max_orders BIGINT NOT NULL,
  auto_claim INTEGER NOT NULL CHECK (auto_claim IN (0,1)),
  scope_json TEXT
);
"#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
CREATE TABLE IF NOT EXISTS history (
  id TEXT PRIMARY KEY,
  worker_id TEXT NOT NULL,
  worker_name TEXT NOT NULL,
  order_id BIGINT NOT NULL,
  order_number TEXT NOT NULL,
  items_json TEXT NOT NULL,
  final_status TEXT NOT NULL,
  assigned_at TEXT NOT NULL,
  started_at TEXT,
  finished_at TEXT NOT NULL,
  duration_secs BIGINT,
  final_remote_status TEXT,
  note TEXT NOT NULL
);
"#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
CREATE TABLE IF NOT EXISTS webhook_log (
  id TEXT PRIMARY KEY,
  raw_body TEXT NOT NULL,
  payload_json TEXT,
  signature_ok INTEGER,
  order_id BIGINT,
  status TEXT,
  event_type TEXT,
  parse_error TEXT,
  received_at TEXT NOT NULL
);
"#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
CREATE TABLE IF NOT EXISTS webhook_events (
  id TEXT PRIMARY KEY,
  event_type TEXT NOT NULL,
  order_id BIGINT NOT NULL,
  status TEXT NOT NULL,
  payload_json TEXT NOT NULL,
  received_at TEXT NOT NULL,
  UNIQUE(order_id, status)
);
"#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl AssignmentStore for SqliteStore {
    async fn insert_claim(&self, assignment: &Assignment) -> anyhow::Result<bool> {
        let result = sqlx::query(
            r#"
INSERT INTO assignments (
  id, order_id, order_number, worker_id, status,
  remote_status_json, assigned_at, started_at, completed_at, removed_at,
  note, items_json, order_total_cents
)
VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?);
"#,
        )
        .bind(assignment.id.to_string())
        .bind(assignment.order_id)
        .bind(&assignment.order_number)
        .bind(assignment.worker_id.to_string())
        .bind(assignment.status.to_string())
        .bind(serde_json::to_string(&assignment.remote_status)?)
        .bind(assignment.assigned_at)
        .bind(assignment.started_at)
        .bind(assignment.completed_at)
        .bind(assignment.removed_at)
        .bind(&assignment.note)
        .bind(serde_json::to_string(&assignment.items)?)
        .bind(assignment.order_total_cents)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(true),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, assignment: &Assignment) -> anyhow::Result<()> {
        sqlx::query(
            r#"
UPDATE assignments SET
  status = ?,
  remote_status_json = ?,
  started_at = ?,
  completed_at = ?,
  removed_at = ?,
  note = ?
WHERE id = ?;
"#,
        )
        .bind(assignment.status.to_string())
        .bind(serde_json::to_string(&assignment.remote_status)?)
        .bind(assignment.started_at)
        .bind(assignment.completed_at)
        .bind(assignment.removed_at)
        .bind(&assignment.note)
        .bind(assignment.id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn fetch_by_id(&self, id: AssignmentId) -> anyhow::Result<Option<Assignment>> {
        let row = sqlx::query("SELECT * FROM assignments WHERE id = ?;")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(r) => Ok(Some(row_to_assignment(&r)?)),
            None => Ok(None),
        }
    }

    async fn fetch_active_by_order(&self, order_id: i64) -> anyhow::Result<Option<Assignment>> {
        let row = sqlx::query(&format!(
            "SELECT * FROM assignments WHERE order_id = ? AND status IN {ACTIVE_STATUSES};"
        ))
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(r) => Ok(Some(row_to_assignment(&r)?)),
            None => Ok(None),
        }
    }

    async fn load_active(&self, worker: Option<WorkerId>) -> anyhow::Result<Vec<Assignment>> {
        let rows = match worker {
            Some(w) => {
                sqlx::query(&format!(
                    "SELECT * FROM assignments \
                     WHERE worker_id = ? AND status IN {ACTIVE_STATUSES} \
                     ORDER BY assigned_at ASC;"
                ))
                .bind(w.to_string())
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(&format!(
                    "SELECT * FROM assignments WHERE status IN {ACTIVE_STATUSES} \
                     ORDER BY assigned_at ASC;"
                ))
                .fetch_all(&self.pool)
                .await?
            }
        };

        let mut out = Vec::with_capacity(rows.len());
        for r in rows {
            match row_to_assignment(&r) {
                Ok(a) => out.push(a),
                Err(e) => {
                    // poison-row resilience: skip but don't fail the batch
                    tracing::warn!(error = %e, "skipping malformed assignment row");
                }
            }
        }

        Ok(out)
    }

    async fn count_active_for_worker(&self, worker: WorkerId) -> anyhow::Result<u64> {
        let row = sqlx::query(&format!(
            "SELECT COUNT(*) AS n FROM assignments \
             WHERE worker_id = ? AND status IN {ACTIVE_STATUSES};"
        ))
        .bind(worker.to_string())
        .fetch_one(&self.pool)
        .await?;

        let n: i64 = row.get("n");
        Ok(n.max(0) as u64)
    }

    async fn active_order_ids(&self) -> anyhow::Result<HashSet<i64>> {
        let rows = sqlx::query(&format!(
            "SELECT order_id FROM assignments WHERE status IN {ACTIVE_STATUSES};"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(|r| r.get::<i64, _>("order_id")).collect())
    }
}

#[async_trait]
impl WorkerStore for SqliteStore {
    async fn fetch_worker(&self, id: WorkerId) -> anyhow::Result<Option<Worker>> {
        let row = sqlx::query("SELECT * FROM workers WHERE id = ?;")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(r) => Ok(Some(row_to_worker(&r)?)),
            None => Ok(None),
        }
    }

    async fn save_worker(&self, worker: &Worker) -> anyhow::Result<()> {
        let scope_json = worker
            .scope
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        sqlx::query(
            r#"
INSERT INTO workers (id, name, active, max_orders, auto_claim, scope_json)
VALUES (?, ?, ?, ?, ?, ?)
ON CONFLICT(id) DO UPDATE SET
  name = excluded.name,
  active = excluded.active,
  max_orders = excluded.max_orders,
  auto_claim = excluded.auto_claim,
  scope_json = excluded.scope_json;
"#,
        )
        .bind(worker.id.to_string())
        .bind(&worker.name)
        .bind(worker.active as i64)
        .bind(worker.max_orders as i64)
        .bind(worker.auto_claim as i64)
        .bind(scope_json)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl HistoryStore for SqliteStore {
    async fn append(&self, entry: &HistoryEntry) -> anyhow::Result<()> {
        sqlx::query(
            r#"
INSERT INTO history (
  id, worker_id, worker_name, order_id, order_number, items_json,
  final_status, assigned_at, started_at, finished_at, duration_secs,
  final_remote_status, note
)
VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?);
"#,
        )
        .bind(entry.id.to_string())
        .bind(entry.worker_id.to_string())
        .bind(&entry.worker_name)
        .bind(entry.order_id)
        .bind(&entry.order_number)
        .bind(serde_json::to_string(&entry.items)?)
        .bind(entry.final_status.to_string())
        .bind(entry.assigned_at)
        .bind(entry.started_at)
        .bind(entry.finished_at)
        .bind(entry.duration_secs)
        .bind(&entry.final_remote_status)
        .bind(&entry.note)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_for_worker(
        &self,
        worker: WorkerId,
        limit: usize,
    ) -> anyhow::Result<Vec<HistoryEntry>> {
        let rows = sqlx::query(
            "SELECT * FROM history WHERE worker_id = ? ORDER BY finished_at DESC LIMIT ?;",
        )
        .bind(worker.to_string())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for r in rows {
            out.push(row_to_history(&r)?);
        }
        Ok(out)
    }
}

#[async_trait]
impl WebhookStore for SqliteStore {
    async fn log_delivery(&self, entry: &WebhookLogEntry) -> anyhow::Result<()> {
        let payload_json = entry
            .payload
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        sqlx::query(
            r#"
INSERT INTO webhook_log (
  id, raw_body, payload_json, signature_ok, order_id, status,
  event_type, parse_error, received_at
)
VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?);
"#,
        )
        .bind(entry.id.to_string())
        .bind(&entry.raw_body)
        .bind(payload_json)
        .bind(entry.signature_ok.map(|b| b as i64))
        .bind(entry.order_id)
        .bind(&entry.status)
        .bind(&entry.event_type)
        .bind(&entry.parse_error)
        .bind(entry.received_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn insert_event(&self, event: &WebhookEvent) -> anyhow::Result<bool> {
        let result = sqlx::query(
            r#"
INSERT INTO webhook_events (id, event_type, order_id, status, payload_json, received_at)
VALUES (?, ?, ?, ?, ?, ?);
"#,
        )
        .bind(event.id.to_string())
        .bind(&event.event_type)
        .bind(event.order_id)
        .bind(&event.status)
        .bind(serde_json::to_string(&event.payload)?)
        .bind(event.received_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(true),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn recent_deliveries(&self, limit: usize) -> anyhow::Result<Vec<WebhookLogEntry>> {
        let rows = sqlx::query("SELECT * FROM webhook_log ORDER BY received_at DESC LIMIT ?;")
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;

        let mut out = Vec::with_capacity(rows.len());
        for r in rows {
            out.push(row_to_log_entry(&r)?);
        }
        Ok(out)
    }
}

/* =========================
Row mapping
========================= */

fn parse_uuid(s: &str, column: &str) -> anyhow::Result<Uuid> {
    Uuid::parse_str(s).map_err(|e| anyhow::anyhow!("invalid {column} '{s}': {e}"))
}

fn row_to_assignment(r: &SqliteRow) -> anyhow::Result<Assignment> {
    let id = parse_uuid(&r.get::<String, _>("id"), "assignment id")?;
    let worker_id = parse_uuid(&r.get::<String, _>("worker_id"), "worker id")?;

    let status_str: String = r.get("status");
    let status = AssignmentStatus::from_str(&status_str)?;

    let remote_status_json: String = r.get("remote_status_json");
    let remote_status = serde_json::from_str(&remote_status_json)?;

    let items_json: String = r.get("items_json");
    let items = serde_json::from_str(&items_json)?;

    Ok(Assignment {
        id,
        order_id: r.get("order_id"),
        order_number: r.get("order_number"),
        worker_id,
        status,
        remote_status,
        assigned_at: r.get::<DateTime<Utc>, _>("assigned_at"),
        started_at: r.get::<Option<DateTime<Utc>>, _>("started_at"),
        completed_at: r.get::<Option<DateTime<Utc>>, _>("completed_at"),
        removed_at: r.get::<Option<DateTime<Utc>>, _>("removed_at"),
        note: r.get("note"),
        items,
        order_total_cents: r.get("order_total_cents"),
    })
}

fn row_to_worker(r: &SqliteRow) -> anyhow::Result<Worker> {
    let id = parse_uuid(&r.get::<String, _>("id"), "worker id")?;

    let scope = r
        .get::<Option<String>, _>("scope_json")
        .map(|s| serde_json::from_str(&s))
        .transpose()?;

    let max_orders: i64 = r.get("max_orders");

    Ok(Worker {
        id,
        name: r.get("name"),
        active: r.get::<i64, _>("active") == 1,
        max_orders: max_orders.clamp(0, u32::MAX as i64) as u32,
        auto_claim: r.get::<i64, _>("auto_claim") == 1,
        scope,
    })
}

fn row_to_history(r: &SqliteRow) -> anyhow::Result<HistoryEntry> {
    let items_json: String = r.get("items_json");
    let final_status_str: String = r.get("final_status");

    Ok(HistoryEntry {
        id: parse_uuid(&r.get::<String, _>("id"), "history id")?,
        worker_id: parse_uuid(&r.get::<String, _>("worker_id"), "worker id")?,
        worker_name: r.get("worker_name"),
        order_id: r.get("order_id"),
        order_number: r.get("order_number"),
        items: serde_json::from_str(&items_json)?,
        final_status: AssignmentStatus::from_str(&final_status_str)?,
        assigned_at: r.get::<DateTime<Utc>, _>("assigned_at"),
        started_at: r.get::<Option<DateTime<Utc>>, _>("started_at"),
        finished_at: r.get::<DateTime<Utc>, _>("finished_at"),
        duration_secs: r.get("duration_secs"),
        final_remote_status: r.get("final_remote_status"),
        note: r.get("note"),
    })
}

fn row_to_log_entry(r: &SqliteRow) -> anyhow::Result<WebhookLogEntry> {
    let payload = r
        .get::<Option<String>, _>("payload_json")
        .map(|s| serde_json::from_str(&s))
        .transpose()?;

    Ok(WebhookLogEntry {
        id: parse_uuid(&r.get::<String, _>("id"), "webhook log id")?,
        raw_body: r.get("raw_body"),
        payload,
        signature_ok: r.get::<Option<i64>, _>("signature_ok").map(|v| v == 1),
        order_id: r.get("order_id"),
        status: r.get("status"),
        event_type: r.get("event_type"),
        parse_error: r.get("parse_error"),
        received_at: r.get::<DateTime<Utc>, _>("received_at"),
    })
}
