//! Thread domain model.

use super::exchange::Exchange;
use crate::directive::{InventoryItem, Milestone};
use crate::insight::InsightBoard;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Id of the permanent catch-all thread.
pub const CATCH_ALL_THREAD_ID: &str = "general";

const CATCH_ALL_TITLE: &str = "General";

/// A goal the model set for the player on this thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveGoal {
    pub description: String,
    #[serde(default)]
    pub completed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SystemMessageKind {
    /// The free-tier limit was reached.
    UpgradePrompt,
    /// The provider is rate limited.
    CooldownNotice,
    /// Insight panel notices such as refused panel creation.
    PanelNotice,
}

/// Engine-authored text shown in a thread, outside the exchange list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemMessage {
    pub kind: SystemMessageKind,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

/// A conversation bucket: either the catch-all or a topic thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thread {
    /// Stable id; topic threads use the slug of their topic name.
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub exchanges: Vec<Exchange>,
    #[serde(default)]
    pub system_messages: Vec<SystemMessage>,
    #[serde(default)]
    pub topic_name: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    /// 0..=100 completion estimate.
    #[serde(default)]
    pub progress: u8,
    #[serde(default)]
    pub pinned: bool,
    pub created_at: DateTime<Utc>,
    pub last_interaction_at: DateTime<Utc>,
    #[serde(default)]
    pub goal: Option<ActiveGoal>,
    #[serde(default)]
    pub insights: InsightBoard,
    #[serde(default)]
    pub milestones: Vec<Milestone>,
    #[serde(default)]
    pub inventory: Vec<InventoryItem>,
    /// The topic is not publicly released, so web sources are unreliable.
    #[serde(default)]
    pub is_unreleased: bool,
}

impl Thread {
    pub fn new(id: impl Into<String>, title: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            exchanges: Vec::new(),
            system_messages: Vec::new(),
            topic_name: None,
            category: None,
            progress: 0,
            pinned: false,
            created_at: now,
            last_interaction_at: now,
            goal: None,
            insights: InsightBoard::default(),
            milestones: Vec::new(),
            inventory: Vec::new(),
            is_unreleased: false,
        }
    }

    pub fn catch_all(now: DateTime<Utc>) -> Self {
        Self::new(CATCH_ALL_THREAD_ID, CATCH_ALL_TITLE, now)
    }

    pub fn is_catch_all(&self) -> bool {
        self.id == CATCH_ALL_THREAD_ID
    }

    pub fn push_system_message(
        &mut self,
        kind: SystemMessageKind,
        text: impl Into<String>,
        now: DateTime<Utc>,
    ) {
        self.system_messages.push(SystemMessage {
            kind,
            text: text.into(),
            created_at: now,
        });
    }

    /// Records a milestone unless an identical one is already present.
    pub fn record_milestone(&mut self, milestone: Milestone) -> bool {
        if self.milestones.contains(&milestone) {
            return false;
        }
        self.milestones.push(milestone);
        true
    }

    /// Search grounding is skipped for unreleased topics.
    pub fn allows_search_grounding(&self) -> bool {
        !self.is_unreleased
    }

    pub fn active_goal(&self) -> Option<&ActiveGoal> {
        self.goal.as_ref().filter(|goal| !goal.completed)
    }
}
