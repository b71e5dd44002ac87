//! Durable key-value blob store.

use crate::error::Result;
use async_trait::async_trait;

/// A generic byte store keyed by string.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Returns the stored bytes, or `None` if the key was never written.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Replaces the value stored under `key`.
    async fn set(&self, key: &str, value: Vec<u8>) -> Result<()>;

    /// Removes `key`; removing a missing key succeeds.
    async fn remove(&self, key: &str) -> Result<()>;
}
