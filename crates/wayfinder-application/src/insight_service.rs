//! On-demand insight panel refresh.

use futures::StreamExt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use wayfinder_core::directive::{strip, Finality};
use wayfinder_core::insight::PanelStatus;
use wayfinder_core::Result;
use wayfinder_interaction::{cancellable, CompletionDispatcher, CompletionRequest, DispatchError};

use crate::cooldown::CooldownGate;
use crate::notices;
use crate::prompt::PromptComposer;
use crate::state::TreeHandle;

const CANCELLED_PANEL_TEXT: &str = "Refresh was cancelled.";

/// Fetches panel content from the provider.
///
/// Search-grounded panels use the single-shot completion; every other panel
/// streams into the board chunk by chunk. Failures stay local to the panel.
pub struct InsightService {
    tree: TreeHandle,
    dispatcher: Arc<dyn CompletionDispatcher>,
    composer: Arc<PromptComposer>,
    cooldown: CooldownGate,
}

impl InsightService {
    pub fn new(
        tree: TreeHandle,
        dispatcher: Arc<dyn CompletionDispatcher>,
        composer: Arc<PromptComposer>,
        cooldown: CooldownGate,
    ) -> Self {
        Self {
            tree,
            dispatcher,
            composer,
            cooldown,
        }
    }

    /// Refreshes one panel and returns its final status.
    ///
    /// # Errors
    ///
    /// Only lookup failures (unknown thread or panel) are returned; provider
    /// errors end up as the panel's `error` content.
    pub async fn refresh(
        &self,
        thread_id: &str,
        panel_id: &str,
        cancel: CancellationToken,
    ) -> Result<PanelStatus> {
        if let Some(remaining) = self.cooldown.remaining() {
            let text = notices::resting(remaining);
            self.tree.mutate(|tree| {
                tree.thread_mut(thread_id)?
                    .insights
                    .fail_fetch(panel_id, &text)
            })?;
            return Ok(PanelStatus::Error);
        }

        let request = self.tree.mutate(|tree| -> Result<CompletionRequest> {
            let thread = tree.thread_mut(thread_id)?;
            let panel = thread.insights.begin_fetch(panel_id)?.clone();
            let mut request = CompletionRequest::new(
                thread_id,
                format!("Write the \"{}\" panel now.", panel.title),
            );
            request.system_instructions = self.composer.panel_instructions(thread, &panel)?;
            request.search_grounded = panel.search_grounded && thread.allows_search_grounding();
            Ok(request)
        })?;

        tracing::debug!(
            "[InsightService] Refreshing panel '{}' in '{}' (grounded: {})",
            panel_id,
            thread_id,
            request.search_grounded
        );

        let result = if request.search_grounded {
            self.dispatcher
                .complete(request, cancel)
                .await
                .map(|text| strip(&text, Finality::Final))
        } else {
            self.stream_into_panel(thread_id, panel_id, request, cancel)
                .await
        };

        match result {
            Ok(content) => {
                self.tree.mutate(|tree| {
                    tree.thread_mut(thread_id)?
                        .insights
                        .finish_fetch(panel_id, Some(content))
                })?;
                Ok(PanelStatus::Loaded)
            }
            Err(e) => {
                let text = match &e {
                    DispatchError::Cancelled => CANCELLED_PANEL_TEXT.to_string(),
                    DispatchError::QuotaExceeded(_) => {
                        if let Err(arm_err) = self.cooldown.arm().await {
                            tracing::warn!(
                                "[InsightService] Failed to persist cooldown: {}",
                                arm_err
                            );
                        }
                        notices::resting(self.cooldown.remaining().unwrap_or_default())
                    }
                    DispatchError::Other(message) => notices::failure(message),
                };
                tracing::warn!("[InsightService] Panel '{}' refresh failed: {}", panel_id, e);
                self.tree.mutate(|tree| {
                    tree.thread_mut(thread_id)?
                        .insights
                        .fail_fetch(panel_id, &text)
                })?;
                Ok(PanelStatus::Error)
            }
        }
    }

    async fn stream_into_panel(
        &self,
        thread_id: &str,
        panel_id: &str,
        request: CompletionRequest,
        cancel: CancellationToken,
    ) -> std::result::Result<String, DispatchError> {
        let stream = self
            .dispatcher
            .stream_complete(request, cancel.clone())
            .await?;
        let mut stream = cancellable(stream, cancel);
        let mut buffer = String::new();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            buffer.push_str(&chunk);
            self.tree
                .mutate(|tree| {
                    tree.thread_mut(thread_id)?
                        .insights
                        .stream_chunk(panel_id, &chunk)
                })
                .map_err(|e| DispatchError::Other(e.to_string()))?;
        }

        Ok(strip(&buffer, Finality::Final))
    }
}
