//! Completion dispatcher contract.

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use wayfinder_core::thread::ImageAttachment;

/// Stream of text deltas from the provider.
pub type TextStream = BoxStream<'static, Result<String, DispatchError>>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// The provider refused the call because of its own rate limit or quota.
    #[error("provider quota exceeded: {0}")]
    QuotaExceeded(String),
    #[error("dispatch cancelled")]
    Cancelled,
    #[error("{0}")]
    Other(String),
}

impl DispatchError {
    pub fn is_quota_exceeded(&self) -> bool {
        matches!(self, DispatchError::QuotaExceeded(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, DispatchError::Cancelled)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Model,
}

/// One prior message sent as conversation history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryTurn {
    pub role: TurnRole,
    pub text: String,
}

impl HistoryTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: TurnRole::User,
            text: text.into(),
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: TurnRole::Model,
            text: text.into(),
        }
    }
}

/// A composed prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionRequest {
    /// Thread the provider session is keyed by.
    pub thread_id: String,
    pub system_instructions: String,
    pub history: Vec<HistoryTurn>,
    pub message: String,
    pub images: Vec<ImageAttachment>,
    /// Ask the provider to ground the answer with web search.
    pub search_grounded: bool,
}

impl CompletionRequest {
    pub fn new(thread_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            thread_id: thread_id.into(),
            system_instructions: String::new(),
            history: Vec::new(),
            message: message.into(),
            images: Vec::new(),
            search_grounded: false,
        }
    }
}

/// Sends prompts to a text-generation provider.
///
/// Implementations key any provider-side session state by thread id.
#[async_trait]
pub trait CompletionDispatcher: Send + Sync {
    /// Starts a streaming completion.
    ///
    /// Once `cancel` fires the stream yields [`DispatchError::Cancelled`] and
    /// ends; no further deltas are delivered.
    async fn stream_complete(
        &self,
        request: CompletionRequest,
        cancel: CancellationToken,
    ) -> Result<TextStream, DispatchError>;

    /// Runs a single-shot completion and returns the full text.
    async fn complete(
        &self,
        request: CompletionRequest,
        cancel: CancellationToken,
    ) -> Result<String, DispatchError>;

    /// Moves the session handle of thread `from` to thread `to`.
    fn rekey_session(&self, from: &str, to: &str) {
        let _ = (from, to);
    }

    /// Drops the session handle of `thread_id`, if any.
    fn release_session(&self, thread_id: &str) {
        let _ = thread_id;
    }
}

/// Wraps `inner` so that it stops with [`DispatchError::Cancelled`] as soon
/// as `cancel` fires.
pub fn cancellable(inner: TextStream, cancel: CancellationToken) -> TextStream {
    stream::unfold(Some((inner, cancel)), |state| async move {
        let (mut inner, cancel) = state?;
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            item = inner.next() => Some(item),
        };
        match next {
            None => Some((Err(DispatchError::Cancelled), None)),
            Some(item) => item.map(|item| (item, Some((inner, cancel)))),
        }
    })
    .boxed()
}
