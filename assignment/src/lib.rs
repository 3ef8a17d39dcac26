pub mod model;
pub mod store;

pub use model::{
    Assignment, AssignmentId, AssignmentStatus, HistoryEntry, TransitionError, WebhookEvent,
    WebhookLogEntry, Worker, WorkerId,
};
pub use store::{AssignmentStore, HistoryStore, WebhookStore, WorkerStore};
