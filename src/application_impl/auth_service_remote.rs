use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::*;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Token pair as returned by the sign-in and refresh endpoints.
#[derive(Deserialize)]
struct TokenPair {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshBody<'a> {
    refresh_token: &'a str,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

/// [`AuthService`] backed by the backend's authentication endpoints.
pub struct RemoteAuthService {
    transport: Arc<dyn HttpTransport>,
    sign_in_path: String,
    refresh_path: String,
}

impl RemoteAuthService {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        sign_in_path: impl Into<String>,
        refresh_path: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            sign_in_path: sign_in_path.into(),
            refresh_path: refresh_path.into(),
        }
    }

    async fn post<B: Serialize>(&self, path: &str, body: &B) -> Result<TokenPair, AuthError> {
        let body = serde_json::to_value(body).map_err(|e| AuthError::Malformed(e.to_string()))?;
        let response = self
            .transport
            .send(ApiRequest::post(path).with_json(body))
            .await
            .map_err(|e| match e {
                TransportError::InvalidRequest(e) => AuthError::Malformed(e),
                other => AuthError::Transient(other.to_string()),
            })?;
        debug!(path, status = %response.status, "auth endpoint answered");
        classify(response)
    }
}

fn classify(response: ApiResponse) -> Result<TokenPair, AuthError> {
    let status = response.status;
    if status.is_success() {
        return response
            .json::<TokenPair>()
            .map_err(|e| AuthError::Malformed(e.to_string()));
    }
    if status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
    {
        return Err(AuthError::Transient(format!("status {status}")));
    }
    let message = response
        .json::<ErrorBody>()
        .map(|body| body.message)
        .unwrap_or_else(|_| response.text());
    Err(AuthError::Rejected {
        status: status.as_u16(),
        message,
    })
}

#[async_trait::async_trait]
impl AuthService for RemoteAuthService {
    async fn sign_in(&self, input: SignInInput) -> Result<SessionCredentials, AuthError> {
        let pair = self
            .post(&self.sign_in_path, &input)
            .await
            .map_err(|e| match e {
                AuthError::Rejected {
                    status: 401 | 403, ..
                } => AuthError::InvalidCredentials,
                other => other,
            })?;
        Ok(SessionCredentials::new(
            AccessToken(pair.access_token),
            pair.refresh_token.map(RefreshToken),
        ))
    }

    async fn refresh(
        &self,
        refresh_token: &RefreshToken,
    ) -> Result<SessionCredentials, AuthError> {
        let body = RefreshBody {
            refresh_token: refresh_token.as_str(),
        };
        let pair = self.post(&self.refresh_path, &body).await?;
        // Backends that do not rotate refresh tokens omit the field.
        let refresh_token = pair
            .refresh_token
            .map(RefreshToken)
            .unwrap_or_else(|| refresh_token.clone());
        Ok(SessionCredentials::new(
            AccessToken(pair.access_token),
            Some(refresh_token),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};
    use std::sync::Mutex;

    /// Answers every request with one canned response and keeps the requests.
    struct CannedTransport {
        answer: Result<ApiResponse, TransportError>,
        seen: Mutex<Vec<ApiRequest>>,
    }

    impl CannedTransport {
        fn new(answer: Result<ApiResponse, TransportError>) -> Arc<Self> {
            Arc::new(Self {
                answer,
                seen: Mutex::new(Vec::new()),
            })
        }

        fn json(status: StatusCode, body: Value) -> Arc<Self> {
            Self::new(Ok(ApiResponse::json_body(status, &body)))
        }
    }

    #[async_trait::async_trait]
    impl HttpTransport for CannedTransport {
        async fn send(&self, request: ApiRequest) -> Result<ApiResponse, TransportError> {
            self.seen.lock().unwrap().push(request);
            self.answer.clone()
        }
    }

    fn service(transport: Arc<CannedTransport>) -> RemoteAuthService {
        RemoteAuthService::new(transport, "auth/sign-in", "auth/refresh-token")
    }

    #[tokio::test]
    async fn refresh_posts_camel_case_token_and_reads_snake_case_pair() {
        let transport = CannedTransport::json(
            StatusCode::OK,
            json!({ "access_token": "t2", "refresh_token": "r2" }),
        );

        let credentials = service(transport.clone())
            .refresh(&RefreshToken("r1".into()))
            .await
            .unwrap();

        assert_eq!(credentials.access_token.as_str(), "t2");
        assert_eq!(credentials.refresh_token.unwrap().as_str(), "r2");
        let seen = transport.seen.lock().unwrap();
        assert_eq!(seen[0].path, "auth/refresh-token");
        assert_eq!(seen[0].method, reqwest::Method::POST);
        assert_eq!(seen[0].body, Some(json!({ "refreshToken": "r1" })));
        assert!(seen[0].bearer().is_none());
    }

    #[tokio::test]
    async fn refresh_keeps_old_refresh_token_when_not_rotated() {
        let transport = CannedTransport::json(StatusCode::OK, json!({ "access_token": "t2" }));

        let credentials = service(transport)
            .refresh(&RefreshToken("r1".into()))
            .await
            .unwrap();

        assert_eq!(credentials.refresh_token.unwrap().as_str(), "r1");
    }

    #[tokio::test]
    async fn server_errors_and_network_failures_are_transient() {
        let unavailable = CannedTransport::json(StatusCode::SERVICE_UNAVAILABLE, json!({}));
        let err = service(unavailable)
            .refresh(&RefreshToken("r1".into()))
            .await
            .unwrap_err();
        assert!(err.is_transient());

        let throttled = CannedTransport::json(StatusCode::TOO_MANY_REQUESTS, json!({}));
        let err = service(throttled)
            .refresh(&RefreshToken("r1".into()))
            .await
            .unwrap_err();
        assert!(err.is_transient());

        let offline = CannedTransport::new(Err(TransportError::Timeout));
        let err = service(offline)
            .refresh(&RefreshToken("r1".into()))
            .await
            .unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn invalid_refresh_token_is_rejected_with_backend_message() {
        let transport = CannedTransport::json(
            StatusCode::UNAUTHORIZED,
            json!({ "message": "refresh token expired" }),
        );

        let err = service(transport)
            .refresh(&RefreshToken("r1".into()))
            .await
            .unwrap_err();

        match err {
            AuthError::Rejected { status, message } => {
                assert_eq!(status, 401);
                assert_eq!(message, "refresh token expired");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn unexpected_payload_is_malformed() {
        let transport = CannedTransport::json(StatusCode::OK, json!({ "token": "t2" }));

        let err = service(transport)
            .refresh(&RefreshToken("r1".into()))
            .await
            .unwrap_err();

        assert!(matches!(err, AuthError::Malformed(_)));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn sign_in_maps_unauthorized_to_invalid_credentials() {
        let transport = CannedTransport::json(StatusCode::UNAUTHORIZED, json!({}));

        let err = service(transport.clone())
            .sign_in(SignInInput {
                email: "ada@example.com".into(),
                password: "nope".into(),
            })
            .await
            .unwrap_err();

        assert!(matches!(err, AuthError::InvalidCredentials));
        let seen = transport.seen.lock().unwrap();
        assert_eq!(seen[0].path, "auth/sign-in");
        assert_eq!(
            seen[0].body,
            Some(json!({ "email": "ada@example.com", "password": "nope" }))
        );
    }
}
