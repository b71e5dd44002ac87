//! Thread tree repository backed by a [`BlobStore`].
//!
//! The whole tree is stored as one versioned JSON document under
//! [`THREADS_KEY`](crate::THREADS_KEY). Uses version-migrate for automatic
//! schema migration on load.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use version_migrate::Migrator;

use wayfinder_core::error::Result;
use wayfinder_core::storage::BlobStore;
use wayfinder_core::thread::{Thread, ThreadTree, ThreadTreeRepository};
use wayfinder_core::WayfinderError;

use crate::dto::create_thread_tree_migrator;
use crate::THREADS_KEY;

pub struct BlobThreadTreeRepository {
    store: Arc<dyn BlobStore>,
    key: String,
    migrator: Migrator,
}

impl BlobThreadTreeRepository {
    pub fn new(store: Arc<dyn BlobStore>) -> Self {
        Self::with_key(store, THREADS_KEY)
    }

    /// Creates a repository that stores the tree under a custom key.
    pub fn with_key(store: Arc<dyn BlobStore>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
            migrator: create_thread_tree_migrator(),
        }
    }

    /// Encodes the tree exactly as `save` would store it.
    pub fn encode(&self, tree: &ThreadTree) -> Result<String> {
        let threads: Vec<Thread> = tree.clone().into_threads();
        self.migrator
            .save_domain_flat("thread_tree", threads)
            .map_err(|e| WayfinderError::Serialization {
                format: "JSON".to_string(),
                message: format!("Failed to serialize thread tree: {}", e),
            })
    }
}

#[async_trait]
impl ThreadTreeRepository for BlobThreadTreeRepository {
    async fn load(&self) -> Result<Option<ThreadTree>> {
        let Some(bytes) = self.store.get(&self.key).await? else {
            return Ok(None);
        };

        // Parse JSON and migrate to latest version
        let json_value: serde_json::Value = serde_json::from_slice(&bytes)?;
        let threads: Vec<Thread> = self
            .migrator
            .load_flat_from("thread_tree", json_value)
            .map_err(|e| {
                WayfinderError::Migration(format!("Failed to migrate thread tree: {}", e))
            })?;

        tracing::debug!(
            "[ThreadTreeRepository] Loaded {} threads ({} bytes)",
            threads.len(),
            bytes.len()
        );
        Ok(Some(ThreadTree::from_threads(threads, Utc::now())))
    }

    async fn save(&self, tree: &ThreadTree) -> Result<usize> {
        let serialized = self.encode(tree)?;
        let size = serialized.len();
        self.store.set(&self.key, serialized.into_bytes()).await?;
        Ok(size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob_store::{FileBlobStore, InMemoryBlobStore};
    use tempfile::TempDir;
    use wayfinder_core::thread::{Exchange, CATCH_ALL_THREAD_ID};

    fn sample_tree() -> ThreadTree {
        let now = Utc::now();
        let mut tree = ThreadTree::new(now);
        tree.append_exchange(
            CATCH_ALL_THREAD_ID,
            Exchange::begin("help", Vec::new(), false, now),
            now,
        )
        .unwrap();
        let topic = tree.ensure_topic_thread("Shadow Realm", now).unwrap();
        tree.thread_mut(&topic).unwrap().insights.seed("RPG");
        tree
    }

    #[tokio::test]
    async fn test_load_returns_none_when_nothing_stored() {
        let repo = BlobThreadTreeRepository::new(Arc::new(InMemoryBlobStore::new()));
        assert!(repo.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let store = Arc::new(FileBlobStore::with_base_dir(temp_dir.path()));
        let repo = BlobThreadTreeRepository::new(store);

        let tree = sample_tree();
        let written = repo.save(&tree).await.unwrap();
        assert!(written > 0);

        let loaded = repo.load().await.unwrap().unwrap();
        assert_eq!(loaded.order(), tree.order());
        assert_eq!(
            loaded.thread("shadow-realm").unwrap().insights.len(),
            3
        );
        assert_eq!(
            loaded.thread(CATCH_ALL_THREAD_ID).unwrap().exchanges[0].user.text,
            "help"
        );
    }

    #[tokio::test]
    async fn test_corrupt_blob_is_an_error() {
        let store = Arc::new(InMemoryBlobStore::new());
        store.set(THREADS_KEY, b"not json".to_vec()).await.unwrap();
        let repo = BlobThreadTreeRepository::new(store);
        let err = repo.load().await.unwrap_err();
        assert!(err.is_serialization());
    }
}
