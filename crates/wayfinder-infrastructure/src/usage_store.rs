//! Blob-backed monthly usage counters.
//!
//! Counters are kept per calendar month (UTC). The first read or increment in
//! a new month starts from zero.

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;

use wayfinder_core::clock::Clock;
use wayfinder_core::config::QuotaConfig;
use wayfinder_core::error::Result;
use wayfinder_core::quota::{QueryKind, Tier, UsageSnapshot, UsageStore};
use wayfinder_core::storage::BlobStore;

use crate::USAGE_KEY;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageRecord {
    #[serde(default)]
    tier: Tier,
    /// `YYYY-MM` of the counted month.
    period: String,
    #[serde(default)]
    text_count: u32,
    #[serde(default)]
    image_count: u32,
}

impl UsageRecord {
    fn fresh(tier: Tier, now: DateTime<Utc>) -> Self {
        Self {
            tier,
            period: period_of(now),
            text_count: 0,
            image_count: 0,
        }
    }
}

fn period_of(now: DateTime<Utc>) -> String {
    format!("{:04}-{:02}", now.year(), now.month())
}

pub struct BlobUsageStore {
    store: Arc<dyn BlobStore>,
    clock: Arc<dyn Clock>,
    limits: QuotaConfig,
    /// Serializes read-modify-write cycles on the record.
    write_lock: Mutex<()>,
}

impl BlobUsageStore {
    pub fn new(store: Arc<dyn BlobStore>, clock: Arc<dyn Clock>, limits: QuotaConfig) -> Self {
        Self {
            store,
            clock,
            limits,
            write_lock: Mutex::new(()),
        }
    }

    /// Changes the user's tier, keeping this month's counters.
    pub async fn set_tier(&self, tier: Tier) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut record = self.current_record().await?;
        record.tier = tier;
        self.write_record(&record).await
    }

    async fn current_record(&self) -> Result<UsageRecord> {
        let now = self.clock.now();
        let record = match self.store.get(USAGE_KEY).await? {
            Some(bytes) => serde_json::from_slice::<UsageRecord>(&bytes)?,
            None => return Ok(UsageRecord::fresh(Tier::default(), now)),
        };

        if record.period != period_of(now) {
            tracing::info!(
                "[UsageStore] New usage period {}, resetting counters",
                period_of(now)
            );
            return Ok(UsageRecord::fresh(record.tier, now));
        }
        Ok(record)
    }

    async fn write_record(&self, record: &UsageRecord) -> Result<()> {
        let bytes = serde_json::to_vec(record)?;
        self.store.set(USAGE_KEY, bytes).await
    }
}

#[async_trait]
impl UsageStore for BlobUsageStore {
    async fn get_usage(&self) -> Result<UsageSnapshot> {
        let record = self.current_record().await?;
        let limits = self.limits.limits_for(record.tier);
        Ok(UsageSnapshot {
            tier: record.tier,
            text_count: record.text_count,
            text_limit: limits.text_limit,
            image_count: record.image_count,
            image_limit: limits.image_limit,
        })
    }

    async fn increment_query_count(&self, kind: QueryKind, n: u32) -> Result<()> {
        if n == 0 {
            return Ok(());
        }
        let _guard = self.write_lock.lock().await;
        let mut record = self.current_record().await?;
        match kind {
            QueryKind::Text => record.text_count = record.text_count.saturating_add(n),
            QueryKind::Image => record.image_count = record.image_count.saturating_add(n),
        }
        self.write_record(&record).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob_store::InMemoryBlobStore;
    use chrono::{Duration, TimeZone};
    use wayfinder_core::clock::ManualClock;

    fn store_at(clock: Arc<ManualClock>) -> BlobUsageStore {
        BlobUsageStore::new(
            Arc::new(InMemoryBlobStore::new()),
            clock,
            QuotaConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_fresh_store_is_free_tier_at_zero() {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 4, 10, 0, 0, 0).unwrap(),
        ));
        let usage = store_at(clock).get_usage().await.unwrap();
        assert_eq!(usage.tier, Tier::Free);
        assert_eq!(usage.text_count, 0);
        assert_eq!(usage.text_limit, 55);
        assert_eq!(usage.image_limit, 5);
    }

    #[tokio::test]
    async fn test_increments_are_counted_per_kind() {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 4, 10, 0, 0, 0).unwrap(),
        ));
        let store = store_at(clock);
        store.increment_query_count(QueryKind::Text, 1).await.unwrap();
        store.increment_query_count(QueryKind::Image, 2).await.unwrap();
        store.increment_query_count(QueryKind::Text, 1).await.unwrap();

        let usage = store.get_usage().await.unwrap();
        assert_eq!(usage.text_count, 2);
        assert_eq!(usage.image_count, 2);
    }

    #[tokio::test]
    async fn test_counters_reset_in_new_month_but_tier_is_kept() {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 4, 30, 23, 0, 0).unwrap(),
        ));
        let store = store_at(clock.clone());
        store.set_tier(Tier::Plus).await.unwrap();
        store.increment_query_count(QueryKind::Text, 7).await.unwrap();

        clock.advance(Duration::hours(2));
        let usage = store.get_usage().await.unwrap();
        assert_eq!(usage.tier, Tier::Plus);
        assert_eq!(usage.text_count, 0);
        assert_eq!(usage.text_limit, 1_500);
    }
}
