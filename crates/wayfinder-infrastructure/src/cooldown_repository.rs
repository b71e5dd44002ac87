//! Blob-backed cooldown persistence.

use async_trait::async_trait;
use std::sync::Arc;

use wayfinder_core::error::Result;
use wayfinder_core::quota::{CooldownRepository, CooldownState};
use wayfinder_core::storage::BlobStore;

use crate::COOLDOWN_KEY;

pub struct BlobCooldownRepository {
    store: Arc<dyn BlobStore>,
}

impl BlobCooldownRepository {
    pub fn new(store: Arc<dyn BlobStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl CooldownRepository for BlobCooldownRepository {
    async fn load(&self) -> Result<Option<CooldownState>> {
        match self.store.get(COOLDOWN_KEY).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, state: &CooldownState) -> Result<()> {
        self.store
            .set(COOLDOWN_KEY, serde_json::to_vec(state)?)
            .await
    }

    async fn clear(&self) -> Result<()> {
        self.store.remove(COOLDOWN_KEY).await
    }
}
