use std::time::Duration;

use platform::{RetryPolicy, StatusTarget};

#[derive(Clone, Debug)]
pub struct AppConfig {
    /// Database connection string.
    pub database_url: String,

    // =========================
    // Remote platform
    // =========================
    pub platform_base_url: String,
    pub merchant_id: String,
    pub bearer_token: String,

    /// Hard per-request timeout, applied before any retry accounting.
    pub http_timeout: Duration,
    pub retry: RetryPolicy,

    // =========================
    // Claiming
    // =========================
    /// Status pool unclaimed orders are drawn from.
    pub claimable_status: StatusTarget,

    /// How many remote orders one claim attempt scans.
    pub scan_limit: usize,

    /// Lost claim races tolerated per attempt.
    pub claim_retries: u32,

    // =========================
    // Reconciliation
    // =========================
    /// Remote statuses an active assignment is allowed to sit in.
    /// Anything else invalidates the assignment.
    pub allowed_statuses: Vec<StatusTarget>,

    /// Remote statuses that count as "still in progress" when a worker
    /// tries to complete an order.
    pub in_progress_statuses: Vec<StatusTarget>,

    // =========================
    // Release
    // =========================
    /// Remote status an order is written back to when released.
    pub release_status: StatusTarget,

    /// Confirmation polling after a release write.
    pub release_poll_attempts: u32,
    pub release_poll_delay: Duration,

    // =========================
    // Webhooks
    // =========================
    /// Shared secret for webhook signature verification. Unset means
    /// deliveries are ingested unverified.
    pub webhook_secret: Option<String>,

    /// Reject (but still log) deliveries that fail verification.
    pub webhook_enforce_signatures: bool,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            database_url: env_or("DATABASE_URL", "sqlite://backoffice_dev.db"),

            platform_base_url: env_or("PLATFORM_BASE_URL", "https://api.example-commerce.dev/v1"),
            merchant_id: env_or("MERCHANT_ID", "demo-merchant"),
            bearer_token: env_or("PLATFORM_TOKEN", ""),

            http_timeout: Duration::from_millis(env_parse("HTTP_TIMEOUT_MS", 10_000)),
            retry: RetryPolicy::default(),

            claimable_status: parse_status_target(&env_or("CLAIMABLE_STATUS", "in-progress")),
            scan_limit: env_parse("CLAIM_SCAN_LIMIT", 50),
            claim_retries: env_parse("CLAIM_RETRIES", 3),

            allowed_statuses: parse_status_list(&env_or(
                "ALLOWED_STATUSES",
                "in-progress,ready-to-ship,shipped",
            )),
            in_progress_statuses: parse_status_list(&env_or("IN_PROGRESS_STATUSES", "in-progress")),

            release_status: parse_status_target(&env_or("RELEASE_STATUS", "in-progress")),
            release_poll_attempts: env_parse("RELEASE_POLL_ATTEMPTS", 5),
            release_poll_delay: Duration::from_millis(env_parse("RELEASE_POLL_DELAY_MS", 1_000)),

            webhook_secret: std::env::var("WEBHOOK_SECRET").ok().filter(|s| !s.is_empty()),
            webhook_enforce_signatures: env_or("WEBHOOK_ENFORCE_SIGNATURES", "false") == "true",
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// One status reference: `"7"` (id), `"shipped"` (slug) or
/// `"7:shipped"` (both).
fn parse_status_target(raw: &str) -> StatusTarget {
    let raw = raw.trim();
    if let Some((id, slug)) = raw.split_once(':') {
        return StatusTarget {
            id: id.trim().parse().ok(),
            slug: Some(slug.trim().to_string()).filter(|s| !s.is_empty()),
        };
    }
    match raw.parse::<i64>() {
        Ok(id) => StatusTarget::by_id(id),
        Err(_) => StatusTarget::by_slug(raw),
    }
}

/// Comma-separated list of status references.
fn parse_status_list(raw: &str) -> Vec<StatusTarget> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(parse_status_target)
        .collect()
}
