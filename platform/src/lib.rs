pub mod client;
pub mod errors;
pub mod retry;
pub mod token;
pub mod types;

pub use client::{PlatformClient, StatusGateway};
pub use errors::GatewayError;
pub use retry::{RetryPolicy, with_retry};
pub use token::{StaticToken, TokenProvider};
pub use types::{OrderItem, RemoteOrder, RemoteStatus, StatusTarget, normalize_remote_status};
