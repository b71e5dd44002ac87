//! Engine assembly.

use std::sync::Arc;
use wayfinder_core::clock::Clock;
use wayfinder_core::config::EngineConfig;
use wayfinder_core::quota::UsageStore;
use wayfinder_core::storage::BlobStore;
use wayfinder_core::thread::{ThreadTree, ThreadTreeRepository};
use wayfinder_core::Result;
use wayfinder_infrastructure::{BlobCooldownRepository, BlobThreadTreeRepository, BlobUsageStore};
use wayfinder_interaction::CompletionDispatcher;

use crate::cooldown::CooldownGate;
use crate::persistence::PersistenceDebouncer;
use crate::prompt::PromptComposer;
use crate::quota_gate::QuotaGate;
use crate::reconciler::ConversationReconciler;
use crate::state::TreeHandle;

/// A running engine: the reconciler plus its background writer.
pub struct Engine {
    reconciler: Arc<ConversationReconciler>,
    usage: Arc<BlobUsageStore>,
    persistence: PersistenceDebouncer,
}

impl Engine {
    /// Restores persisted state from `store` and starts the engine.
    ///
    /// Exchanges and panel fetches left in flight by a previous process are
    /// marked interrupted, and a cooldown that has not expired yet is
    /// re-armed.
    pub async fn start(
        config: &EngineConfig,
        store: Arc<dyn BlobStore>,
        dispatcher: Arc<dyn CompletionDispatcher>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let repository = Arc::new(BlobThreadTreeRepository::new(Arc::clone(&store)));
        let tree = match repository.load().await? {
            Some(mut tree) => {
                let interrupted = tree.mark_interrupted();
                if interrupted > 0 {
                    tracing::info!(
                        "[Engine] Marked {} exchanges from the previous session as interrupted",
                        interrupted
                    );
                }
                tree
            }
            None => ThreadTree::new(clock.now()),
        };
        let tree = TreeHandle::new(tree);

        let cooldown = CooldownGate::new(
            Arc::new(BlobCooldownRepository::new(Arc::clone(&store))),
            Arc::clone(&clock),
            config.cooldown(),
        );
        if let Err(e) = cooldown.restore().await {
            tracing::warn!("[Engine] Could not restore cooldown state: {}", e);
        }

        let usage = Arc::new(BlobUsageStore::new(
            store,
            Arc::clone(&clock),
            config.quota.clone(),
        ));
        let reconciler = Arc::new(ConversationReconciler::new(
            tree.clone(),
            dispatcher,
            QuotaGate::new(Arc::clone(&usage) as Arc<dyn UsageStore>),
            cooldown,
            Arc::new(PromptComposer::new(config.history_window)?),
            clock,
        ));
        let persistence = PersistenceDebouncer::spawn(
            tree,
            repository as Arc<dyn ThreadTreeRepository>,
            config.debounce(),
            config.soft_size_limit_bytes,
        );

        tracing::info!("[Engine] Started");
        Ok(Self {
            reconciler,
            usage,
            persistence,
        })
    }

    pub fn reconciler(&self) -> &Arc<ConversationReconciler> {
        &self.reconciler
    }

    pub fn usage(&self) -> &BlobUsageStore {
        &self.usage
    }

    /// Writes pending thread changes now.
    pub async fn flush(&self) -> Result<()> {
        self.persistence.flush().await
    }

    /// Cancels in-flight sends and writes the final state.
    pub async fn shutdown(&self) -> Result<()> {
        for entry_id in self.reconciler.in_flight() {
            self.reconciler.cancel(&entry_id);
        }
        self.persistence.shutdown().await
    }
}
