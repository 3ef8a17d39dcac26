use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Identifies a remote order status for a write or a comparison.
///
/// Stores expose statuses by numeric id, by slug, or both, so either
/// field alone is a valid target.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusTarget {
    pub id: Option<i64>,
    pub slug: Option<String>,
}

impl StatusTarget {
    pub fn by_id(id: i64) -> Self {
        Self {
            id: Some(id),
            slug: None,
        }
    }

    pub fn by_slug(slug: impl Into<String>) -> Self {
        Self {
            id: None,
            slug: Some(slug.into()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.id.is_none() && self.slug.is_none()
    }
}

/// Normalized view of a remote order status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteStatus {
    pub id: Option<i64>,
    pub slug: Option<String>,
    pub name: Option<String>,
}

impl RemoteStatus {
    /// Matches by id OR slug; the remote system may expose either
    /// depending on store configuration.
    pub fn matches(&self, target: &StatusTarget) -> bool {
        if let (Some(a), Some(b)) = (self.id, target.id) {
            if a == b {
                return true;
            }
        }
        matches!((&self.slug, &target.slug), (Some(a), Some(b)) if a == b)
    }

    /// Human-readable label for notes and logs.
    pub fn label(&self) -> String {
        if let Some(name) = &self.name {
            return name.clone();
        }
        if let Some(slug) = &self.slug {
            return slug.clone();
        }
        match self.id {
            Some(id) => format!("status #{id}"),
            None => "unknown".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    pub sku: String,
    pub name: String,
    pub quantity: u32,
    pub unit_price_cents: i64,
}

/// Order snapshot as returned by the remote platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteOrder {
    pub id: i64,
    pub number: String,
    pub status: RemoteStatus,
    pub created_at: Option<DateTime<Utc>>,
    pub items: Vec<OrderItem>,
    pub total_cents: i64,
}

/// Normalize the historical shapes a status field has arrived in.
///
/// Observed variants:
///   - object: `{"id": 3, "slug": "in-progress", "name": "In progress"}`
///   - bare number: `3`
///   - numeric string: `"3"`
///   - slug string: `"in-progress"`
///
/// Shape variance stops here; business logic only ever sees
/// `RemoteStatus`.
pub fn normalize_remote_status(raw: &Value) -> RemoteStatus {
    match raw {
        Value::Object(obj) => RemoteStatus {
            id: value_as_i64(obj.get("id")),
            slug: value_as_string(obj.get("slug")),
            name: value_as_string(obj.get("name")),
        },
        Value::Number(n) => RemoteStatus {
            id: n.as_i64(),
            slug: None,
            name: None,
        },
        Value::String(s) => match s.parse::<i64>() {
            Ok(id) => RemoteStatus {
                id: Some(id),
                slug: None,
                name: None,
            },
            Err(_) => RemoteStatus {
                id: None,
                slug: Some(s.clone()),
                name: None,
            },
        },
        _ => RemoteStatus::default(),
    }
}

pub(crate) fn value_as_i64(v: Option<&Value>) -> Option<i64> {
    match v {
        Some(Value::Number(n)) => n.as_i64(),
        Some(Value::String(s)) => s.parse().ok(),
        _ => None,
    }
}

pub(crate) fn value_as_string(v: Option<&Value>) -> Option<String> {
    match v {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}
