//! Thread tree repository trait.

use super::tree::ThreadTree;
use crate::error::Result;
use async_trait::async_trait;

/// Durable storage for the whole thread tree.
///
/// The tree is always loaded and stored as one unit; the persistence
/// debouncer decides when `save` runs.
#[async_trait]
pub trait ThreadTreeRepository: Send + Sync {
    /// Loads the stored tree.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(ThreadTree))`: a tree was stored
    /// - `Ok(None)`: nothing stored yet
    /// - `Err(_)`: the stored data could not be read or decoded
    async fn load(&self) -> Result<Option<ThreadTree>>;

    /// Serializes and stores the tree.
    ///
    /// # Returns
    ///
    /// - `Ok(bytes)`: size of the serialized payload that was written
    /// - `Err(_)`: encoding or the underlying write failed
    async fn save(&self, tree: &ThreadTree) -> Result<usize>;
}
