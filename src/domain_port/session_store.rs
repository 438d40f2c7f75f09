use crate::domain_model::SessionCredentials;

/// Where the current session credentials live.
///
/// Every outbound request reads from it; only sign-in, a successful refresh
/// and sign-out write to it.
#[async_trait::async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self) -> Result<Option<SessionCredentials>, SessionStoreError>;
    /// Replace the stored credentials with `credentials` as one unit.
    async fn set(&self, credentials: SessionCredentials) -> Result<(), SessionStoreError>;
    async fn clear(&self) -> Result<(), SessionStoreError>;
}

#[derive(Debug, thiserror::Error)]
pub enum SessionStoreError {
    #[error("session store io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("corrupt session data: {0}")]
    Corrupt(#[from] serde_json::Error),
}
