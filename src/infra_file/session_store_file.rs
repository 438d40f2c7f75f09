use crate::domain_model::SessionCredentials;
use crate::domain_port::*;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Session persisted as a JSON file, so it survives between CLI runs.
///
/// Writes go to a sibling temp file that is renamed over the target, so a
/// reader never sees half of a credential pair.
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait::async_trait]
impl SessionStore for FileSessionStore {
    async fn get(&self) -> Result<Option<SessionCredentials>, SessionStoreError> {
        match fs::read(&self.path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn set(&self, credentials: SessionCredentials) -> Result<(), SessionStoreError> {
        let data = serde_json::to_vec_pretty(&credentials)?;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let temp = self.temp_path();
        fs::write(&temp, data).await?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&temp, std::fs::Permissions::from_mode(0o600)).await?;
        }
        fs::rename(&temp, &self.path).await?;
        Ok(())
    }

    async fn clear(&self) -> Result<(), SessionStoreError> {
        match fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain_model::{AccessToken, RefreshToken};

    fn scratch_store() -> FileSessionStore {
        let dir = std::env::temp_dir().join(format!("coursehub-{}", uuid::Uuid::new_v4()));
        FileSessionStore::new(dir.join("session.json"))
    }

    #[tokio::test]
    async fn round_trips_through_disk() {
        let store = scratch_store();
        assert!(store.get().await.unwrap().is_none());

        let credentials = SessionCredentials::new(
            AccessToken("t1".into()),
            Some(RefreshToken("r1".into())),
        );
        store.set(credentials.clone()).await.unwrap();

        let reopened = FileSessionStore::new(store.path());
        assert_eq!(reopened.get().await.unwrap(), Some(credentials));
        assert!(!store.temp_path().exists());

        store.clear().await.unwrap();
        store.clear().await.unwrap();
        assert!(store.get().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn corrupt_file_is_reported() {
        let store = scratch_store();
        std::fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        std::fs::write(store.path(), b"{not json").unwrap();

        assert!(matches!(
            store.get().await,
            Err(SessionStoreError::Corrupt(_))
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn session_file_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let store = scratch_store();
        store
            .set(SessionCredentials::new(AccessToken("t1".into()), None))
            .await
            .unwrap();

        let mode = std::fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
