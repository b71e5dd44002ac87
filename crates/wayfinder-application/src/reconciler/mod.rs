//! The conversation reconciler: single writer of the thread tree.

pub mod apply;

use futures::StreamExt;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use wayfinder_core::clock::Clock;
use wayfinder_core::directive::{scan, Finality};
use wayfinder_core::insight::{ModifyOutcome, ModifyResolution, PanelStatus};
use wayfinder_core::quota::{QueryKind, QuotaDecision};
use wayfinder_core::thread::{
    EntryStatus, Exchange, FeedbackVote, ImageAttachment, SystemMessageKind, ThreadTree,
};
use wayfinder_core::{Result, WayfinderError};
use wayfinder_interaction::{cancellable, CompletionDispatcher, CompletionRequest, DispatchError};

use crate::cooldown::CooldownGate;
use crate::insight_service::InsightService;
use crate::notices;
use crate::prompt::PromptComposer;
use crate::quota_gate::QuotaGate;
use crate::state::TreeHandle;

pub use apply::{finalize_exchange, FinalizeReport};

/// A message typed (or captured) by the user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserMessage {
    pub text: String,
    pub images: Vec<ImageAttachment>,
    /// Sent from the companion overlay rather than the main window.
    pub from_companion: bool,
}

impl UserMessage {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn with_image(mut self, image: ImageAttachment) -> Self {
        self.images.push(image);
        self
    }

    fn is_empty(&self) -> bool {
        self.text.trim().is_empty() && self.images.is_empty()
    }
}

/// How a send ended. Dispatch failures are reported here, never as `Err`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// Nothing to send.
    Ignored,
    /// The free tier is used up; an upgrade prompt was posted.
    LimitReached { kind: QueryKind },
    /// The provider cooldown is active; a notice was posted.
    CoolingDown { remaining: Duration },
    Completed {
        entry_id: String,
        thread_id: String,
        migrated: bool,
    },
    Cancelled { entry_id: String },
    Failed { entry_id: String, error: String },
}

/// Routes user sends through quota, dispatch, extraction and migration.
///
/// All thread-tree mutation goes through this type (or the [`TreeHandle`]
/// it hands to the insight service), so sorting and persistence revisions
/// stay consistent. Several sends may be in flight at once; each one is
/// tracked by a cancellation token keyed by its model entry id.
pub struct ConversationReconciler {
    tree: TreeHandle,
    dispatcher: Arc<dyn CompletionDispatcher>,
    quota: QuotaGate,
    cooldown: CooldownGate,
    composer: Arc<PromptComposer>,
    insights: InsightService,
    clock: Arc<dyn Clock>,
    in_flight: Mutex<HashMap<String, CancellationToken>>,
}

impl ConversationReconciler {
    pub fn new(
        tree: TreeHandle,
        dispatcher: Arc<dyn CompletionDispatcher>,
        quota: QuotaGate,
        cooldown: CooldownGate,
        composer: Arc<PromptComposer>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let insights = InsightService::new(
            tree.clone(),
            Arc::clone(&dispatcher),
            Arc::clone(&composer),
            cooldown.clone(),
        );
        Self {
            tree,
            dispatcher,
            quota,
            cooldown,
            composer,
            insights,
            clock,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    pub fn tree(&self) -> &TreeHandle {
        &self.tree
    }

    pub fn cooldown(&self) -> &CooldownGate {
        &self.cooldown
    }

    /// Sends `message` from the thread `thread_id` and waits for the response.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown thread and storage errors from the
    /// usage store. Provider errors and cancellation are reported through
    /// [`SendOutcome`].
    pub async fn send(&self, thread_id: &str, message: UserMessage) -> Result<SendOutcome> {
        if message.is_empty() {
            return Ok(SendOutcome::Ignored);
        }
        if !self.tree.read(|tree| tree.contains(thread_id)) {
            return Err(WayfinderError::not_found("thread", thread_id));
        }

        if let Some(remaining) = self.cooldown.remaining() {
            let now = self.clock.now();
            self.tree.mutate(|tree| {
                tree.thread_mut(thread_id).map(|thread| {
                    thread.push_system_message(
                        SystemMessageKind::CooldownNotice,
                        notices::resting(remaining),
                        now,
                    )
                })
            })?;
            return Ok(SendOutcome::CoolingDown { remaining });
        }

        let image_count = u32::try_from(message.images.len()).unwrap_or(u32::MAX);
        let check = self.quota.check(image_count).await?;
        let tier = check.usage.tier;
        let Some(permit) = check.permit else {
            let kind = match check.decision {
                QuotaDecision::LimitReached { kind } => kind,
                QuotaDecision::Allowed => QueryKind::Text,
            };
            let now = self.clock.now();
            self.tree.mutate(|tree| {
                tree.thread_mut(thread_id).map(|thread| {
                    thread.push_system_message(
                        SystemMessageKind::UpgradePrompt,
                        notices::upgrade_prompt(kind, &check.usage),
                        now,
                    )
                })
            })?;
            return Ok(SendOutcome::LimitReached { kind });
        };

        let (entry_id, request) = self.begin_exchange(thread_id, message)?;
        if let Err(e) = self.quota.record(permit).await {
            tracing::warn!("[Reconciler] Failed to record usage for {}: {}", entry_id, e);
        }

        let cancel = CancellationToken::new();
        lock(&self.in_flight).insert(entry_id.clone(), cancel.clone());
        let response = if tier.prefers_single_shot() {
            self.dispatcher.complete(request, cancel.clone()).await
        } else {
            self.stream_response(&entry_id, request, cancel.clone())
                .await
        };
        lock(&self.in_flight).remove(&entry_id);

        let response = match response {
            Ok(_) if cancel.is_cancelled() => Err(DispatchError::Cancelled),
            other => other,
        };

        match response {
            Ok(raw) => self.complete_exchange(&entry_id, &raw),
            Err(DispatchError::Cancelled) => {
                tracing::info!("[Reconciler] Dispatch {} cancelled", entry_id);
                self.dispatcher.release_session(thread_id);
                self.settle(&entry_id, EntryStatus::Cancelled, notices::CANCELLED_TEXT);
                Ok(SendOutcome::Cancelled { entry_id })
            }
            Err(DispatchError::QuotaExceeded(message)) => {
                tracing::warn!("[Reconciler] Provider quota exceeded: {}", message);
                if let Err(e) = self.cooldown.arm().await {
                    tracing::warn!("[Reconciler] Failed to persist cooldown: {}", e);
                }
                let text = notices::resting(self.cooldown.remaining().unwrap_or_default());
                self.settle(&entry_id, EntryStatus::Failed, &text);
                Ok(SendOutcome::Failed {
                    entry_id,
                    error: text,
                })
            }
            Err(DispatchError::Other(message)) => {
                tracing::error!("[Reconciler] Dispatch {} failed: {}", entry_id, message);
                self.settle(&entry_id, EntryStatus::Failed, &notices::failure(&message));
                Ok(SendOutcome::Failed {
                    entry_id,
                    error: message,
                })
            }
        }
    }

    /// Cancels the in-flight dispatch for `entry_id`.
    ///
    /// Returns `false` when nothing is in flight under that id.
    pub fn cancel(&self, entry_id: &str) -> bool {
        match lock(&self.in_flight).get(entry_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Ids of model entries whose dispatch has not finished.
    pub fn in_flight(&self) -> Vec<String> {
        lock(&self.in_flight).keys().cloned().collect()
    }

    pub fn set_pinned(&self, thread_id: &str, pinned: bool) -> Result<()> {
        self.tree.mutate(|tree| tree.set_pinned(thread_id, pinned))
    }

    pub fn rename_thread(&self, thread_id: &str, title: &str) -> Result<()> {
        self.tree.mutate(|tree| tree.rename(thread_id, title))
    }

    /// Deletes a thread, cancelling its in-flight dispatches and releasing
    /// its provider session.
    pub fn delete_thread(&self, thread_id: &str) -> Result<()> {
        let removed = self.tree.mutate(|tree| tree.delete_thread(thread_id))?;
        {
            let in_flight = lock(&self.in_flight);
            for exchange in &removed.exchanges {
                if let Some(token) = in_flight.get(exchange.id()) {
                    token.cancel();
                }
            }
        }
        self.dispatcher.release_session(thread_id);
        tracing::info!(
            "[Reconciler] Deleted thread '{}' ({} exchanges)",
            thread_id,
            removed.exchanges.len()
        );
        Ok(())
    }

    pub fn set_feedback(&self, entry_id: &str, vote: Option<FeedbackVote>) -> Result<()> {
        self.tree.mutate(|tree| tree.set_feedback(entry_id, vote))
    }

    pub fn set_panel_feedback(
        &self,
        thread_id: &str,
        panel_id: &str,
        vote: Option<FeedbackVote>,
    ) -> Result<()> {
        self.tree
            .mutate(|tree| tree.thread_mut(thread_id)?.insights.set_feedback(panel_id, vote))
    }

    pub fn mark_panel_read(&self, thread_id: &str, panel_id: &str) -> Result<()> {
        self.tree
            .mutate(|tree| tree.thread_mut(thread_id)?.insights.mark_read(panel_id))
    }

    /// Applies the user's choice on a pending panel modification.
    ///
    /// A refused create-new (slug collision) posts a panel notice to the
    /// thread and leaves the request pending.
    pub fn resolve_panel_modify(
        &self,
        thread_id: &str,
        panel_id: &str,
        resolution: ModifyResolution,
    ) -> Result<ModifyOutcome> {
        let now = self.clock.now();
        self.tree.mutate(|tree| -> Result<ModifyOutcome> {
            let thread = tree.thread_mut(thread_id)?;
            let outcome = thread.insights.resolve_modify(panel_id, resolution)?;
            if let ModifyOutcome::SlugCollision { slug } = &outcome {
                thread.push_system_message(
                    SystemMessageKind::PanelNotice,
                    notices::panel_exists(slug),
                    now,
                );
            }
            Ok(outcome)
        })
    }

    pub fn dismiss_panel_modify(&self, thread_id: &str, panel_id: &str) -> Result<bool> {
        self.tree
            .mutate(|tree| -> Result<bool> {
                Ok(tree.thread_mut(thread_id)?.insights.dismiss_modify(panel_id))
            })
    }

    pub fn delete_panel(&self, thread_id: &str, panel_id: &str) -> Result<bool> {
        self.tree
            .mutate(|tree| -> Result<bool> {
                Ok(tree.thread_mut(thread_id)?.insights.delete(panel_id))
            })
    }

    /// Fetches fresh content for one panel.
    pub async fn refresh_panel(
        &self,
        thread_id: &str,
        panel_id: &str,
        cancel: CancellationToken,
    ) -> Result<PanelStatus> {
        self.insights.refresh(thread_id, panel_id, cancel).await
    }

    /// Appends the user exchange and builds the provider request from the
    /// thread as it was before the append.
    fn begin_exchange(
        &self,
        thread_id: &str,
        message: UserMessage,
    ) -> Result<(String, CompletionRequest)> {
        let now = self.clock.now();
        self.tree.mutate(|tree| -> Result<(String, CompletionRequest)> {
            let thread = tree
                .thread(thread_id)
                .ok_or_else(|| WayfinderError::not_found("thread", thread_id))?;
            let mut request = CompletionRequest::new(
                thread_id,
                self.composer.compose_message(thread, &message.text),
            );
            request.system_instructions = self.composer.system_instructions(thread)?;
            request.history = self.composer.history(thread);
            request.images = message.images.clone();

            let exchange =
                Exchange::begin(message.text, message.images, message.from_companion, now);
            let entry_id = exchange.id().to_string();
            tree.append_exchange(thread_id, exchange, now)?;
            tracing::debug!("[Reconciler] Dispatching {} from '{}'", entry_id, thread_id);
            Ok((entry_id, request))
        })
    }

    /// Streams the response, refreshing the placeholder's visible text on
    /// every delta. Returns the raw buffer.
    async fn stream_response(
        &self,
        entry_id: &str,
        request: CompletionRequest,
        cancel: CancellationToken,
    ) -> std::result::Result<String, DispatchError> {
        let stream = self
            .dispatcher
            .stream_complete(request, cancel.clone())
            .await?;
        let mut stream = cancellable(stream, cancel);
        let mut buffer = String::new();

        while let Some(delta) = stream.next().await {
            buffer.push_str(&delta?);
            let display_text = scan(&buffer, Finality::Streaming).display_text;
            self.tree.mutate(|tree| {
                if let Ok(entry) = tree.find_model_entry_mut(entry_id) {
                    entry.text = display_text;
                    entry.status = EntryStatus::Streaming;
                }
            });
        }
        Ok(buffer)
    }

    fn complete_exchange(&self, entry_id: &str, raw: &str) -> Result<SendOutcome> {
        let extraction = scan(raw, Finality::Final);
        if extraction.malformed > 0 {
            tracing::debug!(
                "[Reconciler] {} malformed directives dropped from {}",
                extraction.malformed,
                entry_id
            );
        }
        let now = self.clock.now();
        let report = match self
            .tree
            .mutate(|tree| finalize_exchange(tree, entry_id, &extraction, now))
        {
            Ok(report) => report,
            Err(e) if e.is_not_found() => {
                tracing::info!("[Reconciler] {} was removed before it finished", entry_id);
                return Ok(SendOutcome::Cancelled {
                    entry_id: entry_id.to_string(),
                });
            }
            Err(e) => return Err(e),
        };

        if report.migrated {
            self.dispatcher
                .rekey_session(&report.source, &report.target);
        }
        Ok(SendOutcome::Completed {
            entry_id: entry_id.to_string(),
            thread_id: report.target,
            migrated: report.migrated,
        })
    }

    /// Ends a dispatch without applying directives.
    fn settle(&self, entry_id: &str, status: EntryStatus, text: &str) {
        self.tree.mutate(|tree: &mut ThreadTree| {
            match tree.find_model_entry_mut(entry_id) {
                Ok(entry) => {
                    entry.status = status;
                    entry.text = text.to_string();
                }
                Err(_) => {
                    tracing::debug!(
                        "[Reconciler] {} no longer exists, nothing to settle",
                        entry_id
                    );
                }
            }
        });
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
