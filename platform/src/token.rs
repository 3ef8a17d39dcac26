use async_trait::async_trait;

/// Source of the bearer token presented to the remote platform.
///
/// Refresh-on-expiry lives with the token-management collaborator; the
/// gateway just asks for a currently-valid token per call.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn bearer_token(&self) -> anyhow::Result<String>;
}

/// Fixed token handed in at startup.
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

#[async_trait]
impl TokenProvider for StaticToken {
    async fn bearer_token(&self) -> anyhow::Result<String> {
        Ok(self.0.clone())
    }
}
