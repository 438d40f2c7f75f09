use crate::application_port::AuthError;
use crate::domain_model::{ApiRequest, ApiResponse};
use crate::domain_port::{SessionStoreError, TransportError};
use reqwest::StatusCode;

/// Why a refresh cycle ended the session. Every request waiting on the same
/// cycle receives a clone of the same value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RefreshFailure {
    #[error("no refresh token available")]
    NoRefreshToken,
    #[error("refresh token rejected: {0}")]
    Rejected(String),
    #[error("refresh failed: {0}")]
    Unavailable(String),
    #[error("could not store refreshed session: {0}")]
    Store(String),
}

impl From<AuthError> for RefreshFailure {
    fn from(error: AuthError) -> Self {
        match error {
            AuthError::Transient(e) => RefreshFailure::Unavailable(e),
            other => RefreshFailure::Rejected(other.to_string()),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Store(#[from] SessionStoreError),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error("request failed with status {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("could not decode response: {0}")]
    Decode(#[from] serde_json::Error),
    /// The request was still unauthorized after being replayed with a fresh
    /// token.
    #[error("unauthorized")]
    Unauthorized,
    #[error("session expired: {0}")]
    SessionExpired(RefreshFailure),
    #[error("token refresh was abandoned before it completed")]
    RefreshAborted,
}

#[async_trait::async_trait]
pub trait ApiClient: Send + Sync {
    /// Send `request` with the current session attached, refreshing the
    /// session at most once if the backend answers 401.
    async fn request(&self, request: ApiRequest) -> Result<ApiResponse, ClientError>;
}
