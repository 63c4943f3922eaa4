use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;

use super::{Snapshot, StateStore};

/// JSON snapshot on local disk.
///
/// Saves go to a sibling temp file first and are renamed into place, so a
/// crash mid-write leaves the previous snapshot intact.
pub struct FileStateStore {
    path: PathBuf,
}

impl FileStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl StateStore for FileStateStore {
    async fn load(&self) -> Result<Option<Snapshot>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => {
                let snapshot = Snapshot::decode(&bytes)
                    .with_context(|| format!("corrupt state file {}", self.path.display()))?;
                Ok(Some(snapshot))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %self.path.display(), "no state file yet, starting empty");
                Ok(None)
            }
            Err(e) => Err(e)
                .with_context(|| format!("failed to read state file {}", self.path.display())),
        }
    }

    async fn save(&self, snapshot: &Snapshot) -> Result<()> {
        let bytes = snapshot.encode()?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
        }

        let tmp = self.temp_path();
        tokio::fs::write(&tmp, &bytes)
            .await
            .with_context(|| format!("failed to write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("failed to replace {}", self.path.display()))?;

        tracing::debug!(
            path = %self.path.display(),
            apps = snapshot.apps.len(),
            requests = snapshot.requests.len(),
            "state snapshot saved"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_file_loads_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStateStore::new(dir.path().join("absent.json"));
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStateStore::new(dir.path().join("nested/state.json"));

        let snapshot = Snapshot::default();
        store.save(&snapshot).await.unwrap();

        assert_eq!(store.load().await.unwrap(), Some(snapshot));
        assert!(!store.temp_path().exists());
    }

    #[tokio::test]
    async fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        tokio::fs::write(&path, b"{ not json").await.unwrap();

        let err = FileStateStore::new(&path).load().await.unwrap_err();
        assert!(format!("{:#}", err).contains("corrupt state file"));
    }

    #[test]
    fn test_temp_path_is_sibling() {
        let store = FileStateStore::new("/var/lib/reactgate/state.json");
        assert_eq!(
            store.temp_path(),
            PathBuf::from("/var/lib/reactgate/state.json.tmp")
        );
    }
}
