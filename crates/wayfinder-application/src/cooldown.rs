//! Global provider cooldown.
//!
//! Armed when the provider reports its own quota was exceeded. While active,
//! every dispatch short-circuits. The expiry is persisted so a restart does
//! not lift the cooldown early, and a single timer task clears it once the
//! expiry passes.

use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;
use wayfinder_core::clock::Clock;
use wayfinder_core::quota::{CooldownRepository, CooldownState};
use wayfinder_core::Result;

struct CooldownInner {
    repository: Arc<dyn CooldownRepository>,
    clock: Arc<dyn Clock>,
    duration: Duration,
    expires_at: Mutex<Option<DateTime<Utc>>>,
    timer: Mutex<Option<JoinHandle<()>>>,
}

#[derive(Clone)]
pub struct CooldownGate {
    inner: Arc<CooldownInner>,
}

impl CooldownGate {
    pub fn new(
        repository: Arc<dyn CooldownRepository>,
        clock: Arc<dyn Clock>,
        duration: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(CooldownInner {
                repository,
                clock,
                duration,
                expires_at: Mutex::new(None),
                timer: Mutex::new(None),
            }),
        }
    }

    /// Loads a persisted cooldown. An expired one is cleared from storage.
    pub async fn restore(&self) -> Result<()> {
        let Some(state) = self.inner.repository.load().await? else {
            return Ok(());
        };
        let now = self.inner.clock.now();
        if !state.is_active_at(now) {
            self.inner.repository.clear().await?;
            return Ok(());
        }
        *lock(&self.inner.expires_at) = Some(state.expires_at);
        self.schedule_clear(state.expires_at);
        tracing::info!(
            "[CooldownGate] Restored cooldown until {}",
            state.expires_at.to_rfc3339()
        );
        Ok(())
    }

    /// Starts the cooldown. Re-arming while active is a no-op.
    ///
    /// Returns `true` when a new cooldown was started.
    pub async fn arm(&self) -> Result<bool> {
        let now = self.inner.clock.now();
        let expires_at = {
            let mut current = lock(&self.inner.expires_at);
            if current.is_some_and(|expiry| now < expiry) {
                return Ok(false);
            }
            let expires_at = now
                + chrono::Duration::from_std(self.inner.duration)
                    .unwrap_or_else(|_| chrono::Duration::hours(1));
            *current = Some(expires_at);
            expires_at
        };

        tracing::warn!(
            "[CooldownGate] Provider quota exceeded, resting until {}",
            expires_at.to_rfc3339()
        );
        self.schedule_clear(expires_at);
        self.inner
            .repository
            .save(&CooldownState { expires_at })
            .await?;
        Ok(true)
    }

    pub fn is_active(&self) -> bool {
        self.remaining().is_some()
    }

    /// Time left until the cooldown ends, if one is active.
    pub fn remaining(&self) -> Option<Duration> {
        let expiry = (*lock(&self.inner.expires_at))?;
        (expiry - self.inner.clock.now()).to_std().ok().filter(|d| !d.is_zero())
    }

    /// Ends the cooldown immediately.
    pub async fn clear(&self) -> Result<()> {
        *lock(&self.inner.expires_at) = None;
        if let Some(timer) = lock(&self.inner.timer).take() {
            timer.abort();
        }
        self.inner.repository.clear().await
    }

    fn schedule_clear(&self, expires_at: DateTime<Utc>) {
        let delay = (expires_at - self.inner.clock.now())
            .to_std()
            .unwrap_or(Duration::ZERO);
        let inner = Arc::clone(&self.inner);
        let timer = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let cleared = {
                let mut current = lock(&inner.expires_at);
                if *current == Some(expires_at) {
                    *current = None;
                    true
                } else {
                    false
                }
            };
            if cleared {
                tracing::info!("[CooldownGate] Cooldown expired");
                if let Err(e) = inner.repository.clear().await {
                    tracing::warn!("[CooldownGate] Failed to clear persisted cooldown: {}", e);
                }
            }
        });
        if let Some(previous) = lock(&self.inner.timer).replace(timer) {
            previous.abort();
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
