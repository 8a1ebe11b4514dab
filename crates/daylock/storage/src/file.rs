//! File-backed key-value store.
//!
//! One JSON file per key inside a data directory. Writes go to a temporary
//! file first and are renamed into place, so a crash mid-write leaves the
//! previous value intact.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use crate::traits::KeyValueStore;
use crate::{StorageError, StorageResult};

/// Key-value store rooted at a directory.
#[derive(Debug, Clone)]
pub struct FileKeyValueStore {
    dir: PathBuf,
}

impl FileKeyValueStore {
    /// Open (and create if needed) a store rooted at `dir`.
    pub async fn open(dir: impl Into<PathBuf>) -> StorageResult<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> StorageResult<PathBuf> {
        if key.is_empty()
            || !key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        {
            return Err(StorageError::InvalidInput(format!(
                "key {key:?} must be non-empty ASCII alphanumerics, '.', '_' or '-'"
            )));
        }
        Ok(self.dir.join(format!("{key}.json")))
    }
}

#[async_trait]
impl KeyValueStore for FileKeyValueStore {
    async fn get(&self, key: &str) -> StorageResult<Option<String>> {
        let path = self.path_for(key)?;
        match tokio::fs::read_to_string(&path).await {
            Ok(raw) => Ok(Some(raw)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn set(&self, key: &str, value: String) -> StorageResult<()> {
        let path = self.path_for(key)?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, value.as_bytes()).await?;
        tokio::fs::rename(&tmp, &path).await?;
        debug!(key, path = %path.display(), "stored key");
        Ok(())
    }

    async fn remove(&self, key: &str) -> StorageResult<()> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn values_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileKeyValueStore::open(dir.path()).await.unwrap();
        store
            .set("daylock.time_cache", r#"{"a":1}"#.to_string())
            .await
            .unwrap();

        let reopened = FileKeyValueStore::open(dir.path()).await.unwrap();
        assert_eq!(
            reopened.get("daylock.time_cache").await.unwrap().as_deref(),
            Some(r#"{"a":1}"#)
        );
    }

    #[tokio::test]
    async fn missing_key_reads_as_none_and_removes_cleanly() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileKeyValueStore::open(dir.path()).await.unwrap();

        assert!(store.get("absent").await.unwrap().is_none());
        store.remove("absent").await.unwrap();
    }

    #[tokio::test]
    async fn rejects_path_like_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileKeyValueStore::open(dir.path()).await.unwrap();

        let err = store.set("../escape", "x".to_string()).await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidInput(_)));
    }
}
