//! Tiered usage gate consulted before every dispatch.

use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use wayfinder_core::quota::{evaluate, QueryKind, QuotaDecision, UsageSnapshot, UsageStore};
use wayfinder_core::Result;

/// Outcome of a pre-dispatch check.
///
/// An allowed check carries a [`QuotaPermit`]. Other sends wait in
/// [`QuotaGate::check`] until that permit is recorded or dropped, so two
/// concurrent sends can never both take the last query of a tier.
#[derive(Debug)]
pub struct QuotaCheck {
    pub decision: QuotaDecision,
    pub usage: UsageSnapshot,
    pub permit: Option<QuotaPermit>,
}

/// Admission for one send, held from the check until its usage is recorded.
#[derive(Debug)]
pub struct QuotaPermit {
    image_count: u32,
    _admission: OwnedMutexGuard<()>,
}

pub struct QuotaGate {
    usage: Arc<dyn UsageStore>,
    admission: Arc<Mutex<()>>,
}

impl QuotaGate {
    pub fn new(usage: Arc<dyn UsageStore>) -> Self {
        Self {
            usage,
            admission: Arc::new(Mutex::new(())),
        }
    }

    /// Checks whether a send carrying `image_count` images may go out.
    pub async fn check(&self, image_count: u32) -> Result<QuotaCheck> {
        let admission = Arc::clone(&self.admission).lock_owned().await;
        let usage = self.usage.get_usage().await?;
        let decision = evaluate(&usage, image_count);
        let permit = match decision {
            QuotaDecision::Allowed => Some(QuotaPermit {
                image_count,
                _admission: admission,
            }),
            QuotaDecision::LimitReached { kind } => {
                tracing::info!(
                    "[QuotaGate] {} limit reached for {} tier ({}/{} text, {}/{} image)",
                    kind,
                    usage.tier,
                    usage.text_count,
                    usage.text_limit,
                    usage.image_count,
                    usage.image_limit
                );
                None
            }
        };
        Ok(QuotaCheck {
            decision,
            usage,
            permit,
        })
    }

    /// Counts a dispatched send: one text query plus one per image.
    ///
    /// The admission is released once the counters are written, whether or
    /// not the write succeeded.
    pub async fn record(&self, permit: QuotaPermit) -> Result<()> {
        self.usage.increment_query_count(QueryKind::Text, 1).await?;
        if permit.image_count > 0 {
            self.usage
                .increment_query_count(QueryKind::Image, permit.image_count)
                .await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;
    use wayfinder_core::quota::Tier;

    struct MemoryUsage {
        snapshot: StdMutex<UsageSnapshot>,
    }

    impl MemoryUsage {
        fn at(text_count: u32) -> Arc<Self> {
            Arc::new(Self {
                snapshot: StdMutex::new(UsageSnapshot {
                    tier: Tier::Free,
                    text_count,
                    text_limit: 55,
                    image_count: 0,
                    image_limit: 5,
                }),
            })
        }
    }

    #[async_trait]
    impl UsageStore for MemoryUsage {
        async fn get_usage(&self) -> Result<UsageSnapshot> {
            tokio::time::sleep(Duration::from_millis(1)).await;
            Ok(*self.snapshot.lock().unwrap())
        }

        async fn increment_query_count(&self, kind: QueryKind, n: u32) -> Result<()> {
            tokio::time::sleep(Duration::from_millis(1)).await;
            let mut snapshot = self.snapshot.lock().unwrap();
            match kind {
                QueryKind::Text => snapshot.text_count += n,
                QueryKind::Image => snapshot.image_count += n,
            }
            Ok(())
        }
    }

    async fn check_and_record(gate: &QuotaGate) -> QuotaDecision {
        let check = gate.check(0).await.unwrap();
        if let Some(permit) = check.permit {
            gate.record(permit).await.unwrap();
        }
        check.decision
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_checks_cannot_share_the_last_query() {
        let usage = MemoryUsage::at(54);
        let gate = QuotaGate::new(usage.clone());

        let (first, second) = tokio::join!(check_and_record(&gate), check_and_record(&gate));

        let mut decisions = vec![first, second];
        decisions.sort_by_key(|d| matches!(d, QuotaDecision::LimitReached { .. }));
        assert_eq!(decisions[0], QuotaDecision::Allowed);
        assert_eq!(
            decisions[1],
            QuotaDecision::LimitReached {
                kind: QueryKind::Text
            }
        );
        assert_eq!(usage.snapshot.lock().unwrap().text_count, 55);
    }

    #[tokio::test]
    async fn test_refused_check_carries_no_permit_and_frees_admission() {
        let gate = QuotaGate::new(MemoryUsage::at(55));
        let refused = gate.check(0).await.unwrap();
        assert!(refused.permit.is_none());

        let again = gate.check(0).await.unwrap();
        assert!(again.permit.is_none());
    }

    #[tokio::test]
    async fn test_dropped_permit_releases_admission() {
        let usage = MemoryUsage::at(10);
        let gate = QuotaGate::new(usage.clone());
        let first = gate.check(2).await.unwrap();
        drop(first);

        let second = gate.check(2).await.unwrap();
        gate.record(second.permit.expect("Should be allowed")).await.unwrap();
        let snapshot = *usage.snapshot.lock().unwrap();
        assert_eq!((snapshot.text_count, snapshot.image_count), (11, 2));
    }
}
