use crate::domain_model::*;
use crate::domain_port::*;
use reqwest::{Method, StatusCode};
use serde_json::{Value, json};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// How the fake answers a scripted refresh failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FakeFailure {
    /// 503, the client may retry.
    Unavailable,
    /// 401, the refresh token is no good.
    Rejected,
    /// 200 with a body that is not a token pair.
    Malformed,
}

#[derive(Default)]
struct State {
    accounts: HashMap<String, String>,
    access_tokens: HashSet<String>,
    refresh_tokens: HashSet<String>,
    issued: u64,
    refresh_failures: VecDeque<FakeFailure>,
    refresh_delay: Duration,
    reject_all: bool,
    routes: HashMap<String, (StatusCode, Value)>,
    requests: Vec<ApiRequest>,
}

impl State {
    fn issue(&mut self) -> (String, String) {
        self.issued += 1;
        let access = format!("access-{}", self.issued);
        let refresh = format!("refresh-{}", self.issued);
        self.access_tokens.insert(access.clone());
        self.refresh_tokens.insert(refresh.clone());
        (access, refresh)
    }
}

fn token_pair(access: String, refresh: String) -> ApiResponse {
    ApiResponse::json_body(
        StatusCode::OK,
        &json!({ "access_token": access, "refresh_token": refresh }),
    )
}

fn message(status: StatusCode, text: &str) -> ApiResponse {
    ApiResponse::json_body(status, &json!({ "message": text }))
}

/// In-process stand-in for the course backend.
///
/// Tokens are minted as `access-N` / `refresh-N`. Resource paths answer 401
/// unless the request carries a live access token, and otherwise echo what
/// they received. Refresh rotates the refresh token.
pub struct FakeBackend {
    state: Mutex<State>,
    refresh_calls: AtomicUsize,
}

impl Default for FakeBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeBackend {
    pub const SIGN_IN_PATH: &'static str = "auth/sign-in";
    pub const REFRESH_PATH: &'static str = "auth/refresh-token";

    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            refresh_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_account(self, email: &str, password: &str) -> Self {
        self.state()
            .accounts
            .insert(email.to_owned(), password.to_owned());
        self
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mint a live session without going through sign-in.
    pub fn issue_session(&self) -> SessionCredentials {
        let (access, refresh) = self.state().issue();
        SessionCredentials::new(AccessToken(access), Some(RefreshToken(refresh)))
    }

    /// Every access token issued so far stops being accepted.
    pub fn expire_access_tokens(&self) {
        self.state().access_tokens.clear();
    }

    pub fn revoke_refresh_tokens(&self) {
        self.state().refresh_tokens.clear();
    }

    /// Answer 401 on every resource path, whatever the token.
    pub fn reject_all_tokens(&self, reject: bool) {
        self.state().reject_all = reject;
    }

    /// Fail the next refresh calls, in order, before behaving normally again.
    pub fn fail_next_refreshes(&self, failures: impl IntoIterator<Item = FakeFailure>) {
        self.state().refresh_failures.extend(failures);
    }

    pub fn set_refresh_delay(&self, delay: Duration) {
        self.state().refresh_delay = delay;
    }

    /// Canned answer for an authorized request to `path`.
    pub fn set_route(&self, path: &str, status: StatusCode, body: Value) {
        self.state().routes.insert(path.to_owned(), (status, body));
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    /// Requests received on resource paths, in arrival order.
    pub fn requests(&self) -> Vec<ApiRequest> {
        self.state().requests.clone()
    }

    fn sign_in(&self, body: Option<&Value>) -> ApiResponse {
        let email = body.and_then(|b| b["email"].as_str()).unwrap_or_default();
        let password = body.and_then(|b| b["password"].as_str()).unwrap_or_default();

        let mut state = self.state();
        if state.accounts.get(email).map(String::as_str) != Some(password) {
            return message(StatusCode::UNAUTHORIZED, "invalid credentials");
        }
        let (access, refresh) = state.issue();
        token_pair(access, refresh)
    }

    async fn refresh(&self, body: Option<&Value>) -> ApiResponse {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.state().refresh_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state();
        match state.refresh_failures.pop_front() {
            Some(FakeFailure::Unavailable) => {
                return message(StatusCode::SERVICE_UNAVAILABLE, "try again later");
            }
            Some(FakeFailure::Rejected) => {
                return message(StatusCode::UNAUTHORIZED, "refresh token rejected");
            }
            Some(FakeFailure::Malformed) => {
                return ApiResponse::json_body(StatusCode::OK, &json!({ "ok": true }));
            }
            None => {}
        }

        let presented = body
            .and_then(|b| b["refreshToken"].as_str())
            .unwrap_or_default();
        if !state.refresh_tokens.remove(presented) {
            return message(StatusCode::UNAUTHORIZED, "invalid refresh token");
        }
        let (access, refresh) = state.issue();
        token_pair(access, refresh)
    }

    fn resource(&self, path: &str, request: ApiRequest) -> ApiResponse {
        let mut state = self.state();
        let bearer = request.bearer().map(str::to_owned);
        let method = request.method.to_string();
        let body = request.body.clone().unwrap_or(Value::Null);
        state.requests.push(request);

        let authorized = !state.reject_all
            && bearer
                .as_deref()
                .is_some_and(|token| state.access_tokens.contains(token));
        if !authorized {
            return message(StatusCode::UNAUTHORIZED, "unauthorized");
        }
        if let Some((status, body)) = state.routes.get(path) {
            return ApiResponse::json_body(*status, body);
        }
        ApiResponse::json_body(
            StatusCode::OK,
            &json!({ "path": path, "method": method, "token": bearer, "body": body }),
        )
    }
}

#[async_trait::async_trait]
impl HttpTransport for FakeBackend {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, TransportError> {
        let path = request.path.trim_start_matches('/').to_owned();
        let is_post = request.method == Method::POST;
        if is_post && path == Self::SIGN_IN_PATH {
            return Ok(self.sign_in(request.body.as_ref()));
        }
        if is_post && path == Self::REFRESH_PATH {
            return Ok(self.refresh(request.body.as_ref()).await);
        }
        Ok(self.resource(&path, request))
    }
}
