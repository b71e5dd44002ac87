//! Insight panel model.

use crate::thread::FeedbackVote;
use serde::{Deserialize, Serialize};

/// Content shown in a panel until its first real content arrives.
pub const PLACEHOLDER_CONTENT: &str = "Gathering insight...";

/// Lifecycle of a single panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PanelStatus {
    Loading,
    Streaming,
    Loaded,
    Error,
}

/// A named knowledge sub-document attached to a topic thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsightPanel {
    pub id: String,
    pub title: String,
    pub content: String,
    pub status: PanelStatus,
    #[serde(default)]
    pub is_unread: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<FeedbackVote>,
    /// Instruction used for on-demand refreshes of this panel.
    pub instruction: String,
    /// Whether on-demand refreshes should use search grounding.
    #[serde(default)]
    pub search_grounded: bool,
}

impl InsightPanel {
    pub fn loading(
        id: impl Into<String>,
        title: impl Into<String>,
        instruction: impl Into<String>,
        search_grounded: bool,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            content: PLACEHOLDER_CONTENT.to_string(),
            status: PanelStatus::Loading,
            is_unread: false,
            feedback: None,
            instruction: instruction.into(),
            search_grounded,
        }
    }

    pub fn is_fetching(&self) -> bool {
        matches!(self.status, PanelStatus::Loading | PanelStatus::Streaming)
    }
}

/// A model-proposed change to a panel awaiting the user's decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingModify {
    pub panel_id: String,
    pub proposed_title: String,
    pub proposed_content: String,
}

/// How the user resolved a [`PendingModify`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModifyResolution {
    /// Replace the named panel's title and content.
    Overwrite,
    /// Add a new panel whose id is the slug of the proposed title.
    CreateNew,
}

/// Result of [`InsightBoard::resolve_modify`](super::InsightBoard::resolve_modify).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModifyOutcome {
    Overwritten { panel_id: String },
    Created { panel_id: String },
    /// The create-new path was refused; the request stays pending.
    SlugCollision { slug: String },
}
