//! Blob store implementations.

use anyhow::Context;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use wayfinder_core::storage::BlobStore;
use wayfinder_core::{Result, WayfinderError};

use crate::paths::WayfinderPaths;

/// Stores each key as one file under a base directory.
///
/// Writes go to a temporary file that is synced and then renamed over the
/// target, so a crash never leaves a half-written blob behind.
#[derive(Debug, Clone)]
pub struct FileBlobStore {
    base_dir: PathBuf,
}

impl FileBlobStore {
    const EXTENSION: &'static str = "blob";

    /// Creates a store rooted at the platform data directory.
    pub fn new() -> Result<Self> {
        Ok(Self::with_base_dir(WayfinderPaths::blob_dir()?))
    }

    /// Creates a store rooted at `base_dir` (for testing).
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn blob_path(&self, key: &str) -> PathBuf {
        let file_stem: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.base_dir
            .join(format!("{}.{}", file_stem, Self::EXTENSION))
    }

    async fn write_atomically(&self, key: &str, value: &[u8]) -> anyhow::Result<()> {
        fs::create_dir_all(&self.base_dir)
            .await
            .context("Failed to create blob directory")?;

        let path = self.blob_path(key);
        let tmp_path = path.with_extension("tmp");

        let mut tmp_file = fs::File::create(&tmp_path)
            .await
            .with_context(|| format!("Failed to create temp blob for '{}'", key))?;
        tmp_file
            .write_all(value)
            .await
            .with_context(|| format!("Failed to write blob '{}'", key))?;
        tmp_file
            .sync_all()
            .await
            .with_context(|| format!("Failed to sync blob '{}'", key))?;
        drop(tmp_file);

        fs::rename(&tmp_path, &path)
            .await
            .with_context(|| format!("Failed to replace blob '{}'", key))?;
        Ok(())
    }
}

#[async_trait]
impl BlobStore for FileBlobStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.blob_path(key);
        match fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(WayfinderError::io(format!(
                "Failed to read blob '{}': {}",
                key, e
            ))),
        }
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<()> {
        self.write_atomically(key, &value)
            .await
            .map_err(|e| WayfinderError::io(format!("{:#}", e)))?;
        tracing::trace!("[FileBlobStore] Wrote {} bytes to '{}'", value.len(), key);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        match fs::remove_file(self.blob_path(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(WayfinderError::io(format!(
                "Failed to remove blob '{}': {}",
                key, e
            ))),
        }
    }
}

/// Process-local blob store used by tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct InMemoryBlobStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Vec<u8>>>> {
        self.blobs
            .lock()
            .map_err(|_| WayfinderError::internal("in-memory blob store lock poisoned"))
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.lock()?.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<()> {
        self.lock()?.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.lock()?.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_file_store_round_trip_and_overwrite() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileBlobStore::with_base_dir(temp_dir.path().join("blobs"));

        assert_eq!(store.get("wayfinder.threads").await.unwrap(), None);

        store
            .set("wayfinder.threads", b"first".to_vec())
            .await
            .unwrap();
        store
            .set("wayfinder.threads", b"second".to_vec())
            .await
            .unwrap();

        assert_eq!(
            store.get("wayfinder.threads").await.unwrap(),
            Some(b"second".to_vec())
        );
        assert!(!temp_dir.path().join("blobs/wayfinder.threads.tmp").exists());
    }

    #[tokio::test]
    async fn test_file_store_remove_missing_key_is_ok() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileBlobStore::with_base_dir(temp_dir.path());
        store.remove("nothing").await.unwrap();
    }

    #[tokio::test]
    async fn test_keys_are_sanitized_to_file_names() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileBlobStore::with_base_dir(temp_dir.path());
        store.set("../escape", b"x".to_vec()).await.unwrap();
        assert!(temp_dir.path().join(".._escape.blob").exists());
    }

    #[tokio::test]
    async fn test_in_memory_store() {
        let store = InMemoryBlobStore::new();
        store.set("k", vec![1, 2, 3]).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some(vec![1, 2, 3]));
        store.remove("k").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
    }
}
