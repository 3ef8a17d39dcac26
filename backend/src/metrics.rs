use std::sync::Arc;
use std::sync::atomic::AtomicU64;

/// Minimal counters for operational visibility.
#[derive(Clone, Default)]
pub struct Counters {
    pub releases: Arc<AtomicU64>,
    pub releases_confirmed: Arc<AtomicU64>,
    pub releases_unconfirmed: Arc<AtomicU64>,

    pub reconcile_checked: Arc<AtomicU64>,
    pub reconcile_invalidated: Arc<AtomicU64>,
    pub reconcile_skipped: Arc<AtomicU64>,

    pub webhooks_received: Arc<AtomicU64>,
    pub webhooks_rejected: Arc<AtomicU64>,
    pub webhooks_duplicate: Arc<AtomicU64>,
}
