//! Usage and cooldown storage traits.

use super::model::{QueryKind, UsageSnapshot};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Monthly usage counters for the current user.
#[async_trait]
pub trait UsageStore: Send + Sync {
    async fn get_usage(&self) -> Result<UsageSnapshot>;

    /// Adds `n` to the counter for `kind`.
    async fn increment_query_count(&self, kind: QueryKind, n: u32) -> Result<()>;
}

/// Persisted provider cooldown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CooldownState {
    pub expires_at: DateTime<Utc>,
}

impl CooldownState {
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

/// Stores the cooldown expiry so it survives restarts.
#[async_trait]
pub trait CooldownRepository: Send + Sync {
    async fn load(&self) -> Result<Option<CooldownState>>;

    async fn save(&self, state: &CooldownState) -> Result<()>;

    async fn clear(&self) -> Result<()>;
}
