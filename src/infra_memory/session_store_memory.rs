use crate::domain_model::SessionCredentials;
use crate::domain_port::*;
use tokio::sync::RwLock;

/// Session that lives as long as the process.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    credentials: RwLock<Option<SessionCredentials>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl SessionStore for MemorySessionStore {
    async fn get(&self) -> Result<Option<SessionCredentials>, SessionStoreError> {
        Ok(self.credentials.read().await.clone())
    }

    async fn set(&self, credentials: SessionCredentials) -> Result<(), SessionStoreError> {
        *self.credentials.write().await = Some(credentials);
        Ok(())
    }

    async fn clear(&self) -> Result<(), SessionStoreError> {
        *self.credentials.write().await = None;
        Ok(())
    }
}
