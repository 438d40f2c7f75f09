use crate::domain_model::{RefreshToken, SessionCredentials};
use serde::Serialize;

#[derive(Debug, Clone, thiserror::Error)]
pub enum AuthError {
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("rejected by auth service ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("auth service unavailable: {0}")]
    Transient(String),
    #[error("malformed auth response: {0}")]
    Malformed(String),
}

impl AuthError {
    /// Whether trying the same call again later could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, AuthError::Transient(_))
    }
}

#[derive(Clone, Serialize)]
pub struct SignInInput {
    pub email: String,
    pub password: String,
}

impl std::fmt::Debug for SignInInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignInInput")
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

/// Calls to the authentication endpoints of the backend. These never carry a
/// bearer token.
#[async_trait::async_trait]
pub trait AuthService: Send + Sync {
    async fn sign_in(&self, input: SignInInput) -> Result<SessionCredentials, AuthError>;
    /// Exchange a refresh token for a new credential pair.
    async fn refresh(&self, refresh_token: &RefreshToken)
    -> Result<SessionCredentials, AuthError>;
}
