use crate::application_impl::*;
use crate::application_port::*;
use crate::domain_port::*;
use crate::infra_fake::*;
use crate::infra_file::*;
use crate::infra_memory::*;
use crate::infra_reqwest::*;
use crate::logger::*;
use crate::settings::Settings;
use std::sync::Arc;
use std::time::Duration;

/// Account the `fake` auth backend accepts.
pub const DEMO_EMAIL: &str = "demo@coursehub.dev";
pub const DEMO_PASSWORD: &str = "demo";

const DEFAULT_SESSION_PATH: &str = ".coursehub/session.json";

/// A ready-to-use client built from settings.
pub struct App {
    pub client: Arc<AuthenticatedClient>,
}

impl App {
    pub fn try_new(settings: &Settings) -> anyhow::Result<Self> {
        // The fake backend forgets its tokens when the process exits, so a
        // persisted session could never be refreshed by the next run.
        if settings.auth.backend == "fake" && settings.session.backend == "file" {
            return Err(anyhow::anyhow!(
                "the fake auth backend needs session.backend = \"memory\""
            ));
        }

        let transport: Arc<dyn HttpTransport> = match settings.auth.backend.as_str() {
            "fake" => {
                warn!("using the in-process fake backend");
                Arc::new(FakeBackend::new().with_account(DEMO_EMAIL, DEMO_PASSWORD))
            }
            "remote" => Arc::new(ReqwestTransport::new(
                &settings.api.base_url,
                Duration::from_secs(settings.api.timeout_secs),
            )?),
            other => return Err(anyhow::anyhow!("Unknown auth backend: {}", other)),
        };

        let (sign_in_path, refresh_path) = match settings.auth.backend.as_str() {
            "fake" => (FakeBackend::SIGN_IN_PATH, FakeBackend::REFRESH_PATH),
            _ => (
                settings.api.sign_in_path.as_str(),
                settings.api.refresh_path.as_str(),
            ),
        };
        let auth_service: Arc<dyn AuthService> = Arc::new(RemoteAuthService::new(
            transport.clone(),
            sign_in_path,
            refresh_path,
        ));

        let session_store: Arc<dyn SessionStore> = match settings.session.backend.as_str() {
            "memory" => Arc::new(MemorySessionStore::new()),
            "file" => Arc::new(FileSessionStore::new(
                settings
                    .session
                    .path
                    .as_deref()
                    .unwrap_or(DEFAULT_SESSION_PATH),
            )),
            other => return Err(anyhow::anyhow!("Unknown session backend: {}", other)),
        };

        let policy = RefreshPolicy {
            max_attempts: settings.refresh.max_attempts,
            backoff: Duration::from_millis(settings.refresh.backoff_ms),
        };

        let client = Arc::new(AuthenticatedClient::new(
            transport,
            auth_service,
            session_store,
            policy,
        ));

        debug!(
            auth = %settings.auth.backend,
            session = %settings.session.backend,
            "client ready"
        );
        Ok(Self { client })
    }
}
