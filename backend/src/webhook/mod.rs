//! Webhook ingestion.
//!
//! Every delivery is written to the raw log first, whatever its state:
//! unsigned, badly signed, unparseable. Only deliveries that survive
//! verification and parsing become business events, and those are
//! deduplicated on (order id, status). A delivery is acknowledged even
//! when nothing could be made of it; rejecting would only make the
//! platform retry a payload we will never understand.

pub mod signature;

use std::sync::Arc;
use std::sync::atomic::Ordering;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::logger::TraceId;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use assignment::{WebhookEvent, WebhookLogEntry, WebhookStore};

use crate::metrics::Counters;
use crate::webhook::signature::verify_signature;

/// Downstream consumer of deduplicated webhook events.
///
/// `is_duplicate_status` tells the handler an event with the same
/// (order id, status) was seen before, so it can skip re-applying side
/// effects. Handler failures are logged and never surface to the
/// sender.
#[async_trait]
pub trait WebhookHandler: Send + Sync {
    async fn handle_event(
        &self,
        event: &WebhookEvent,
        is_duplicate_status: bool,
    ) -> anyhow::Result<()>;
}

/// What happened to one delivery.
#[derive(Debug, PartialEq)]
pub struct IngestReceipt {
    /// The delivery was acknowledged. Only a signature-enforcement
    /// rejection flips this off; "accepted but not processed" is the
    /// normal answer for payloads we cannot use.
    pub accepted: bool,

    /// Signature verdict; `None` when no signature or no secret was
    /// available to check against.
    pub verified: Option<bool>,

    pub parsed: bool,

    /// An event with the same (order id, status) already existed.
    pub duplicate: bool,
}

pub struct WebhookIngestor {
    store: Arc<dyn WebhookStore>,
    handler: Option<Arc<dyn WebhookHandler>>,
    secret: Option<String>,
    enforce_signatures: bool,
    counters: Counters,
}

impl WebhookIngestor {
    pub fn new(
        store: Arc<dyn WebhookStore>,
        handler: Option<Arc<dyn WebhookHandler>>,
        secret: Option<String>,
        enforce_signatures: bool,
        counters: Counters,
    ) -> Self {
        Self {
            store,
            handler,
            secret,
            enforce_signatures,
            counters,
        }
    }

    #[instrument(skip_all, fields(delivery_id = %TraceId::new()))]
    pub async fn ingest(
        &self,
        raw_body: &str,
        signature: Option<&str>,
        now: DateTime<Utc>,
    ) -> anyhow::Result<IngestReceipt> {
        self.counters.webhooks_received.fetch_add(1, Ordering::Relaxed);

        let verified = match (&self.secret, signature) {
            (Some(secret), Some(sig)) => {
                Some(verify_signature(secret.as_bytes(), raw_body.as_bytes(), sig))
            }
            _ => None,
        };

        let (payload, parse_error) = match serde_json::from_str::<Value>(raw_body) {
            Ok(v) => (Some(v), None),
            Err(e) => (None, Some(e.to_string())),
        };

        let fields = payload.as_ref().map(extract_fields).unwrap_or_default();

        // The raw log is written before any business branch; losing it
        // must not lose the acknowledgement too.
        let log_result = self
            .store
            .log_delivery(&WebhookLogEntry {
                id: Uuid::new_v4(),
                raw_body: raw_body.to_string(),
                payload: payload.clone(),
                signature_ok: verified,
                order_id: fields.order_id,
                status: fields.status.clone(),
                event_type: fields.event_type.clone(),
                parse_error,
                received_at: now,
            })
            .await;
        if let Err(e) = log_result {
            warn!(error = %e, "webhook delivery log write failed");
        }

        if self.enforce_signatures && self.secret.is_some() && verified != Some(true) {
            self.counters.webhooks_rejected.fetch_add(1, Ordering::Relaxed);
            warn!(verified = ?verified, "webhook rejected by signature policy");
            return Ok(IngestReceipt {
                accepted: false,
                verified,
                parsed: payload.is_some(),
                duplicate: false,
            });
        }

        let (Some(order_id), Some(status)) = (fields.order_id, fields.status.clone()) else {
            debug!("webhook carried no (order, status) pair; logged only");
            return Ok(IngestReceipt {
                accepted: true,
                verified,
                parsed: payload.is_some(),
                duplicate: false,
            });
        };

        let event = WebhookEvent {
            id: Uuid::new_v4(),
            event_type: fields
                .event_type
                .unwrap_or_else(|| "order.updated".to_string()),
            order_id,
            status: status.clone(),
            payload: payload.unwrap_or(Value::Null),
            received_at: now,
        };
        let inserted = self.store.insert_event(&event).await?;

        if inserted {
            info!(order_id, status = %status, "webhook event recorded");
        } else {
            self.counters.webhooks_duplicate.fetch_add(1, Ordering::Relaxed);
            debug!(order_id, status = %status, "duplicate webhook event");
        }

        if let Some(handler) = &self.handler {
            // Best effort; the sender already got its acknowledgement.
            if let Err(e) = handler.handle_event(&event, !inserted).await {
                warn!(order_id, error = %e, "webhook handler failed");
            }
        }

        Ok(IngestReceipt {
            accepted: true,
            verified,
            parsed: true,
            duplicate: !inserted,
        })
    }
}

#[derive(Debug, Default)]
struct ExtractedFields {
    order_id: Option<i64>,
    status: Option<String>,
    event_type: Option<String>,
}

/// Pull the business fields out of whichever payload shape arrived.
///
/// Platforms wrap the order in an envelope or send it flat; status can
/// be an object, a slug, or a bare id.
fn extract_fields(payload: &Value) -> ExtractedFields {
    let order = payload.get("order").unwrap_or(payload);

    let order_id = order
        .get("order_id")
        .or_else(|| order.get("id"))
        .and_then(|v| match v {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        });

    let status = order
        .get("status")
        .or_else(|| order.get("order_status"))
        .map(|v| platform::normalize_remote_status(v).label())
        .filter(|s| s != "unknown");

    let event_type = ["event", "event_type", "type", "topic"]
        .iter()
        .find_map(|k| payload.get(*k))
        .and_then(Value::as_str)
        .map(str::to_string);

    ExtractedFields {
        order_id,
        status,
        event_type,
    }
}
