use thiserror::Error;

/// Failure taxonomy for remote platform calls.
///
/// `Transient` is the only variant the retry layer re-attempts; a
/// `Timeout` is deliberately distinct so callers can decide whether a
/// higher-level retry is warranted.
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("remote platform unavailable (http {0})")]
    Transient(u16),

    #[error("remote call timed out")]
    Timeout,

    #[error("remote platform rejected the request (http {status}): {body}")]
    RemoteRejected { status: u16, body: String },

    #[error("order not found on remote platform")]
    NotFound,

    #[error("authentication with the remote platform failed")]
    Auth,

    #[error("unexpected response shape: {0}")]
    InvalidResponse(String),

    #[error("http transport error: {0}")]
    Http(reqwest::Error),
}

impl GatewayError {
    pub fn is_transient(&self) -> bool {
        matches!(self, GatewayError::Transient(_))
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            GatewayError::Timeout
        } else {
            GatewayError::Http(e)
        }
    }
}
