use anyhow::{Result, anyhow};
use config::{Config, Environment, File};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub api: Api,
    pub auth: Auth,
    pub session: Session,
    pub refresh: Refresh,
    pub log: Log,
}

#[derive(Debug, Deserialize)]
pub struct Api {
    pub base_url: String,
    pub timeout_secs: u64,
    pub sign_in_path: String,
    pub refresh_path: String,
}

#[derive(Debug, Deserialize)]
pub struct Auth {
    pub backend: String, // "remote" or "fake"
}

#[derive(Debug, Deserialize)]
pub struct Session {
    pub backend: String, // "memory" or "file"
    pub path: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Refresh {
    pub max_attempts: u32,
    pub backoff_ms: u64,
}

#[derive(Debug, Deserialize)]
pub struct Log {
    pub filter: String,
}

#[cfg(debug_assertions)]
const SETTINGS_PATH: &str = "settings/dev.toml";
#[cfg(not(debug_assertions))]
const SETTINGS_PATH: &str = "settings/release.toml";

/// Load settings from `path` (or the build's default file), then apply
/// `COURSEHUB__<SECTION>__<KEY>` environment overrides.
pub fn parse_settings(path: Option<&str>) -> Result<Settings> {
    let path = path.unwrap_or(SETTINGS_PATH);

    let settings: Settings = Config::builder()
        .set_default("api.timeout_secs", 30)?
        .set_default("api.sign_in_path", "auth/sign-in")?
        .set_default("api.refresh_path", "auth/refresh-token")?
        .set_default("auth.backend", "remote")?
        .set_default("session.backend", "memory")?
        .set_default("refresh.max_attempts", 3)?
        .set_default("refresh.backoff_ms", 200)?
        .set_default("log.filter", "info")?
        .add_source(File::with_name(path))
        .add_source(Environment::with_prefix("COURSEHUB").separator("__"))
        .build()
        .map_err(|e| anyhow!(e))?
        .try_deserialize()
        .map_err(|e| anyhow!(e))?;

    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_settings(contents: &str) -> String {
        let dir = std::env::temp_dir().join(format!("coursehub-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("settings.toml");
        std::fs::write(&path, contents).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[test]
    fn fills_defaults_around_required_keys() {
        let path = write_settings(
            r#"
            [api]
            base_url = "https://learn.example.com/api/"
            "#,
        );

        let settings = parse_settings(Some(&path)).unwrap();

        assert_eq!(settings.api.base_url, "https://learn.example.com/api/");
        assert_eq!(settings.api.timeout_secs, 30);
        assert_eq!(settings.api.refresh_path, "auth/refresh-token");
        assert_eq!(settings.auth.backend, "remote");
        assert_eq!(settings.session.backend, "memory");
        assert!(settings.session.path.is_none());
        assert_eq!(settings.refresh.max_attempts, 3);
        assert_eq!(settings.log.filter, "info");
    }

    #[test]
    fn file_values_override_defaults() {
        let path = write_settings(
            r#"
            [api]
            base_url = "http://localhost:3000/"
            timeout_secs = 5

            [session]
            backend = "file"
            path = "/tmp/coursehub/session.json"

            [refresh]
            max_attempts = 1
            backoff_ms = 0
            "#,
        );

        let settings = parse_settings(Some(&path)).unwrap();

        assert_eq!(settings.api.timeout_secs, 5);
        assert_eq!(settings.session.backend, "file");
        assert_eq!(
            settings.session.path.as_deref(),
            Some("/tmp/coursehub/session.json")
        );
        assert_eq!(settings.refresh.max_attempts, 1);
    }

    #[test]
    fn missing_base_url_is_an_error() {
        let path = write_settings("[log]\nfilter = \"debug\"\n");
        assert!(parse_settings(Some(&path)).is_err());
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(parse_settings(Some("")).is_err());
    }
}
