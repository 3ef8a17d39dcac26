//! HTTP client for the remote commerce platform's order endpoints.
//!
//! Every call goes through the shared retry layer and carries the hard
//! per-request timeout configured at construction. The client holds no
//! local state beyond connection plumbing.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, Response};
use serde_json::{Value, json};
use tracing::{debug, instrument, warn};

use crate::errors::GatewayError;
use crate::retry::{RetryPolicy, with_retry};
use crate::token::TokenProvider;
use crate::types::{
    OrderItem, RemoteOrder, RemoteStatus, StatusTarget, normalize_remote_status, value_as_i64,
    value_as_string,
};

/// Read/write access to remote order state.
///
/// This is the seam the workflow engine mocks in tests; the production
/// implementation is [`PlatformClient`].
#[async_trait]
pub trait StatusGateway: Send + Sync {
    async fn get_order(
        &self,
        merchant_id: &str,
        order_id: i64,
    ) -> Result<RemoteOrder, GatewayError>;

    async fn set_order_status(
        &self,
        merchant_id: &str,
        order_id: i64,
        target: &StatusTarget,
    ) -> Result<(), GatewayError>;

    /// Orders in the given status scope, oldest first.
    async fn list_orders(
        &self,
        merchant_id: &str,
        scope: Option<&StatusTarget>,
        limit: usize,
    ) -> Result<Vec<RemoteOrder>, GatewayError>;
}

#[derive(Clone)]
pub struct PlatformClient {
    http: Client,
    base_url: String,
    token: Arc<dyn TokenProvider>,
    retry: RetryPolicy,
}

impl PlatformClient {
    pub fn new(
        base_url: impl Into<String>,
        token: Arc<dyn TokenProvider>,
        retry: RetryPolicy,
        timeout: Duration,
    ) -> Result<Self, GatewayError> {
        let http = Client::builder()
            .timeout(timeout)
            .pool_idle_timeout(Duration::from_secs(30))
            .tcp_keepalive(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.into(),
            token,
            retry,
        })
    }

    async fn bearer(&self) -> Result<String, GatewayError> {
        let token = self
            .token
            .bearer_token()
            .await
            .map_err(|_| GatewayError::Auth)?;
        Ok(format!("Bearer {token}"))
    }

    /// One GET attempt: send, classify, decode.
    async fn get_json(&self, url: &str) -> Result<Value, GatewayError> {
        let auth = self.bearer().await?;
        let resp = self.http.get(url).header("Authorization", auth).send().await?;
        let resp = classify(resp).await?;
        let body = resp.json().await?;
        Ok(body)
    }
}

#[async_trait]
impl StatusGateway for PlatformClient {
    #[instrument(skip(self), level = "debug")]
    async fn get_order(
        &self,
        merchant_id: &str,
        order_id: i64,
    ) -> Result<RemoteOrder, GatewayError> {
        let url = format!(
            "{}/merchants/{}/orders/{}",
            self.base_url, merchant_id, order_id
        );

        let body = with_retry(&self.retry, "get_order", || self.get_json(&url)).await?;
        let order = parse_order(&body)?;

        debug!(
            order_id = order.id,
            status = %order.status.label(),
            "remote order fetched"
        );

        Ok(order)
    }

    #[instrument(skip(self, target), level = "debug")]
    async fn set_order_status(
        &self,
        merchant_id: &str,
        order_id: i64,
        target: &StatusTarget,
    ) -> Result<(), GatewayError> {
        let url = format!(
            "{}/merchants/{}/orders/{}/status",
            self.base_url, merchant_id, order_id
        );

        let mut payload = serde_json::Map::new();
        if let Some(id) = target.id {
            payload.insert("status_id".into(), json!(id));
        }
        if let Some(slug) = &target.slug {
            payload.insert("status_slug".into(), json!(slug));
        }
        let payload = Value::Object(payload);

        with_retry(&self.retry, "set_order_status", || async {
            let auth = self.bearer().await?;
            let resp = self
                .http
                .put(&url)
                .header("Authorization", auth)
                .json(&payload)
                .send()
                .await?;
            classify(resp).await?;
            Ok(())
        })
        .await?;

        debug!(order_id, target = ?target, "remote status written");
        Ok(())
    }

    #[instrument(skip(self, scope), level = "debug")]
    async fn list_orders(
        &self,
        merchant_id: &str,
        scope: Option<&StatusTarget>,
        limit: usize,
    ) -> Result<Vec<RemoteOrder>, GatewayError> {
        let mut url = format!(
            "{}/merchants/{}/orders?sort=created_at&direction=asc&limit={}",
            self.base_url, merchant_id, limit
        );

        if let Some(scope) = scope {
            if let Some(slug) = &scope.slug {
                url.push_str(&format!("&status={slug}"));
            } else if let Some(id) = scope.id {
                url.push_str(&format!("&status_id={id}"));
            }
        }

        let body = with_retry(&self.retry, "list_orders", || self.get_json(&url)).await?;

        let raw_orders = body
            .get("orders")
            .and_then(Value::as_array)
            .or_else(|| body.as_array())
            .ok_or_else(|| GatewayError::InvalidResponse("expected an order list".into()))?;

        let mut out = Vec::with_capacity(raw_orders.len());
        for raw in raw_orders {
            match parse_order(raw) {
                Ok(o) => out.push(o),
                Err(e) => {
                    // One malformed entry must not poison the listing.
                    warn!(error = %e, "skipping malformed order in listing");
                }
            }
        }

        Ok(out)
    }
}

/// Map an HTTP response onto the gateway error taxonomy.
async fn classify(resp: Response) -> Result<Response, GatewayError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let code = status.as_u16();
    if status.is_server_error() || code == 429 {
        return Err(GatewayError::Transient(code));
    }
    match code {
        404 => Err(GatewayError::NotFound),
        401 | 403 => Err(GatewayError::Auth),
        _ => {
            let body = resp.text().await.unwrap_or_default();
            Err(GatewayError::RemoteRejected { status: code, body })
        }
    }
}

/// Decode one order object, tolerating the envelope and field-name
/// variants the platform has shipped over the years.
fn parse_order(v: &Value) -> Result<RemoteOrder, GatewayError> {
    let obj = v.get("order").unwrap_or(v);

    let id = value_as_i64(obj.get("id"))
        .ok_or_else(|| GatewayError::InvalidResponse("order id missing".into()))?;

    let number = value_as_string(obj.get("number"))
        .or_else(|| value_as_string(obj.get("order_number")))
        .unwrap_or_else(|| id.to_string());

    let status = obj
        .get("status")
        .or_else(|| obj.get("order_status"))
        .map(normalize_remote_status)
        .unwrap_or_else(RemoteStatus::default);

    let created_at = obj
        .get("created_at")
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|d| d.with_timezone(&Utc));

    let items = obj
        .get("items")
        .or_else(|| obj.get("line_items"))
        .and_then(Value::as_array)
        .map(|arr| arr.iter().filter_map(parse_item).collect())
        .unwrap_or_default();

    let total_cents = value_as_i64(obj.get("total_cents"))
        .or_else(|| value_as_i64(obj.get("total")))
        .unwrap_or(0);

    Ok(RemoteOrder {
        id,
        number,
        status,
        created_at,
        items,
        total_cents,
    })
}

fn parse_item(v: &Value) -> Option<OrderItem> {
    let sku = value_as_string(v.get("sku"))?;
    Some(OrderItem {
        sku,
        name: value_as_string(v.get("name")).unwrap_or_default(),
        quantity: value_as_i64(v.get("quantity")).unwrap_or(1).max(0) as u32,
        unit_price_cents: value_as_i64(v.get("unit_price_cents"))
            .or_else(|| value_as_i64(v.get("price")))
            .unwrap_or(0),
    })
}
