use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::*;
use reqwest::StatusCode;
use reqwest::header::{AUTHORIZATION, HeaderName, HeaderValue};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{broadcast, oneshot};
use tracing::{Instrument, debug, error, info, warn};

const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");
const EVENT_CAPACITY: usize = 16;

type RefreshOutcome = Result<AccessToken, RefreshFailure>;

/// How hard a refresh cycle tries before giving up on the session.
///
/// Only transient failures (network errors, 5xx) are retried. A refresh token
/// the backend rejects ends the session on the first answer.
#[derive(Debug, Clone)]
pub struct RefreshPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for RefreshPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_millis(200),
        }
    }
}

#[derive(Default)]
struct RefreshState {
    in_flight: bool,
    waiters: Vec<oneshot::Sender<RefreshOutcome>>,
}

enum RefreshTicket<'a> {
    Leader(LeaderGuard<'a>),
    Waiter(oneshot::Receiver<RefreshOutcome>),
}

/// Held by the request running the refresh cycle.
///
/// Dropping it without `finish` (the leader future was cancelled) clears the
/// in-flight flag and drops every waiter's sender, so nobody waits forever.
struct LeaderGuard<'a> {
    state: &'a Mutex<RefreshState>,
    released: bool,
}

impl LeaderGuard<'_> {
    fn finish(mut self, outcome: &RefreshOutcome) {
        let waiters = self.release();
        debug!(waiters = waiters.len(), "releasing requests waiting on refresh");
        for waiter in waiters {
            let _ = waiter.send(outcome.clone());
        }
    }

    // Clearing the flag and taking the queue happen under one lock, so the
    // queue is empty before another cycle can start.
    fn release(&mut self) -> Vec<oneshot::Sender<RefreshOutcome>> {
        self.released = true;
        let mut state = lock(self.state);
        state.in_flight = false;
        std::mem::take(&mut state.waiters)
    }
}

impl Drop for LeaderGuard<'_> {
    fn drop(&mut self) {
        if !self.released {
            warn!("token refresh abandoned");
            self.release();
        }
    }
}

fn lock(state: &Mutex<RefreshState>) -> MutexGuard<'_, RefreshState> {
    // The state is a flag and a list, both valid after a panic elsewhere.
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// HTTP client that attaches the session's bearer token to every request and
/// transparently refreshes the session when the backend answers 401.
///
/// Concurrent 401s share a single refresh call: the first becomes the leader,
/// the rest wait for its outcome and then replay with the same new token.
/// Each request is replayed at most once.
pub struct AuthenticatedClient {
    transport: Arc<dyn HttpTransport>,
    auth_service: Arc<dyn AuthService>,
    session_store: Arc<dyn SessionStore>,
    policy: RefreshPolicy,
    refresh: Mutex<RefreshState>,
    events: broadcast::Sender<SessionEvent>,
}

impl AuthenticatedClient {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        auth_service: Arc<dyn AuthService>,
        session_store: Arc<dyn SessionStore>,
        policy: RefreshPolicy,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            transport,
            auth_service,
            session_store,
            policy,
            refresh: Mutex::new(RefreshState::default()),
            events,
        }
    }

    /// Session lifecycle events. `Expired` means the user must sign in again.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub async fn is_signed_in(&self) -> Result<bool, ClientError> {
        Ok(self.session_store.get().await?.is_some())
    }

    pub async fn sign_in(&self, input: SignInInput) -> Result<(), ClientError> {
        let credentials = self.auth_service.sign_in(input).await?;
        self.session_store.set(credentials).await?;
        info!("signed in");
        let _ = self.events.send(SessionEvent::SignedIn);
        Ok(())
    }

    pub async fn sign_out(&self) -> Result<(), ClientError> {
        self.session_store.clear().await?;
        info!("signed out");
        let _ = self.events.send(SessionEvent::SignedOut);
        Ok(())
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        self.call_json(ApiRequest::get(path)).await
    }

    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, ClientError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let body = serde_json::to_value(body)?;
        self.call_json(ApiRequest::post(path).with_json(body)).await
    }

    pub async fn put_json<B, T>(&self, path: &str, body: &B) -> Result<T, ClientError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let body = serde_json::to_value(body)?;
        self.call_json(ApiRequest::put(path).with_json(body)).await
    }

    pub async fn patch_json<B, T>(&self, path: &str, body: &B) -> Result<T, ClientError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let body = serde_json::to_value(body)?;
        self.call_json(ApiRequest::patch(path).with_json(body)).await
    }

    pub async fn delete(&self, path: &str) -> Result<(), ClientError> {
        let response = self.request(ApiRequest::delete(path)).await?;
        error_for_status(response)?;
        Ok(())
    }

    async fn call_json<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T, ClientError> {
        let response = self.request(request).await?;
        let response = error_for_status(response)?;
        Ok(response.json()?)
    }

    async fn execute(&self, request: ApiRequest) -> Result<ApiResponse, ClientError> {
        let attached = self
            .session_store
            .get()
            .await?
            .map(|session| session.access_token);

        let response = self.send_with(request.clone(), attached.as_ref()).await?;
        if response.status != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }
        debug!("access token rejected");

        let token = self.token_after_unauthorized(attached.as_ref()).await?;
        let replayed = self.send_with(request, Some(&token)).await?;
        if replayed.status == StatusCode::UNAUTHORIZED {
            warn!("request still unauthorized after token refresh");
            return Err(ClientError::Unauthorized);
        }
        Ok(replayed)
    }

    async fn send_with(
        &self,
        mut request: ApiRequest,
        token: Option<&AccessToken>,
    ) -> Result<ApiResponse, ClientError> {
        request.headers.remove(AUTHORIZATION);
        if let Some(token) = token {
            let mut value = HeaderValue::from_str(&token.bearer()).map_err(|e| {
                TransportError::InvalidRequest(format!("access token is not a valid header: {e}"))
            })?;
            value.set_sensitive(true);
            request.headers.insert(AUTHORIZATION, value);
        }
        Ok(self.transport.send(request).await?)
    }

    async fn token_after_unauthorized(
        &self,
        attached: Option<&AccessToken>,
    ) -> Result<AccessToken, ClientError> {
        match self.refresh_ticket() {
            RefreshTicket::Waiter(receiver) => {
                debug!("refresh in flight, waiting");
                receiver
                    .await
                    .map_err(|_| ClientError::RefreshAborted)?
                    .map_err(ClientError::SessionExpired)
            }
            RefreshTicket::Leader(guard) => {
                let outcome = self.refresh_cycle(attached).await;
                guard.finish(&outcome);
                outcome.map_err(ClientError::SessionExpired)
            }
        }
    }

    fn refresh_ticket(&self) -> RefreshTicket<'_> {
        let mut state = lock(&self.refresh);
        if state.in_flight {
            let (sender, receiver) = oneshot::channel();
            state.waiters.push(sender);
            RefreshTicket::Waiter(receiver)
        } else {
            state.in_flight = true;
            RefreshTicket::Leader(LeaderGuard {
                state: &self.refresh,
                released: false,
            })
        }
    }

    async fn refresh_cycle(&self, attached: Option<&AccessToken>) -> RefreshOutcome {
        let outcome = match self.session_store.get().await {
            Err(e) => Err(RefreshFailure::Store(e.to_string())),
            // A cycle that finished after this request was sent already
            // replaced the token; reuse it instead of refreshing again.
            Ok(Some(current)) if Some(&current.access_token) != attached => {
                debug!("session already refreshed");
                return Ok(current.access_token);
            }
            Ok(Some(SessionCredentials {
                refresh_token: Some(refresh_token),
                ..
            })) => self.exchange(&refresh_token).await,
            // Also reached by a late 401 after a failed cycle already cleared
            // the session; that request signs out again and emits its own
            // `Expired`, so subscribers should treat repeats as one.
            Ok(_) => Err(RefreshFailure::NoRefreshToken),
        };

        if let Err(failure) = &outcome {
            self.expire(failure).await;
        }
        outcome
    }

    async fn exchange(&self, refresh_token: &RefreshToken) -> RefreshOutcome {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut backoff = self.policy.backoff;
        let mut attempt = 1;

        loop {
            match self.auth_service.refresh(refresh_token).await {
                Ok(credentials) => {
                    let access_token = credentials.access_token.clone();
                    self.session_store
                        .set(credentials)
                        .await
                        .map_err(|e| RefreshFailure::Store(e.to_string()))?;
                    info!(attempt, "session refreshed");
                    let _ = self.events.send(SessionEvent::Refreshed);
                    return Ok(access_token);
                }
                Err(e) if e.is_transient() && attempt < max_attempts => {
                    warn!(attempt, max_attempts, error = %e, "token refresh failed, retrying");
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    async fn expire(&self, failure: &RefreshFailure) {
        warn!(reason = %failure, "session expired, signing out");
        if let Err(e) = self.session_store.clear().await {
            error!(error = %e, "could not clear session");
        }
        let _ = self.events.send(SessionEvent::Expired {
            reason: failure.to_string(),
        });
    }
}

#[async_trait::async_trait]
impl ApiClient for AuthenticatedClient {
    async fn request(&self, mut request: ApiRequest) -> Result<ApiResponse, ClientError> {
        let request_id = uuid::Uuid::new_v4();
        let span = tracing::info_span!(
            "api_request",
            %request_id,
            method = %request.method,
            path = %request.path
        );
        let value = HeaderValue::from_str(&request_id.to_string())
            .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;
        request.headers.insert(REQUEST_ID_HEADER, value);
        self.execute(request).instrument(span).await
    }
}

/// Turn a non-2xx response into [`ClientError::Status`].
pub fn error_for_status(response: ApiResponse) -> Result<ApiResponse, ClientError> {
    if response.is_success() {
        Ok(response)
    } else {
        Err(ClientError::Status {
            status: response.status,
            body: response.text(),
        })
    }
}
