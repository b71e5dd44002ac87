//! Thread tree DTOs and migrations
//!
//! ## Version History
//! - **1.0.0**: Initial schema. Threads in display order; exchanges, panels
//!   and directive payloads embedded with their domain serde layout.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use version_migrate::{FromDomain, IntoDomain, Versioned};

use wayfinder_core::directive::{InventoryItem, Milestone};
use wayfinder_core::insight::InsightBoard;
use wayfinder_core::thread::{ActiveGoal, Exchange, SystemMessage, Thread};

// ============================================================================
// Thread DTOs
// ============================================================================

/// Thread DTO V1.0.0
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadV1_0_0 {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub exchanges: Vec<Exchange>,
    #[serde(default)]
    pub system_messages: Vec<SystemMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default)]
    pub progress: u8,
    #[serde(default)]
    pub pinned: bool,
    pub created_at: DateTime<Utc>,
    pub last_interaction_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goal: Option<ActiveGoal>,
    #[serde(default)]
    pub insights: InsightBoard,
    #[serde(default)]
    pub milestones: Vec<Milestone>,
    #[serde(default)]
    pub inventory: Vec<InventoryItem>,
    #[serde(default)]
    pub is_unreleased: bool,
}

impl From<Thread> for ThreadV1_0_0 {
    fn from(thread: Thread) -> Self {
        ThreadV1_0_0 {
            id: thread.id,
            title: thread.title,
            exchanges: thread.exchanges,
            system_messages: thread.system_messages,
            topic_name: thread.topic_name,
            category: thread.category,
            progress: thread.progress,
            pinned: thread.pinned,
            created_at: thread.created_at,
            last_interaction_at: thread.last_interaction_at,
            goal: thread.goal,
            insights: thread.insights,
            milestones: thread.milestones,
            inventory: thread.inventory,
            is_unreleased: thread.is_unreleased,
        }
    }
}

impl From<ThreadV1_0_0> for Thread {
    fn from(dto: ThreadV1_0_0) -> Self {
        Thread {
            id: dto.id,
            title: dto.title,
            exchanges: dto.exchanges,
            system_messages: dto.system_messages,
            topic_name: dto.topic_name,
            category: dto.category,
            progress: dto.progress.min(100),
            pinned: dto.pinned,
            created_at: dto.created_at,
            last_interaction_at: dto.last_interaction_at,
            goal: dto.goal,
            insights: dto.insights,
            milestones: dto.milestones,
            inventory: dto.inventory,
            is_unreleased: dto.is_unreleased,
        }
    }
}

// ============================================================================
// ThreadTree DTOs
// ============================================================================

/// Thread tree DTO V1.0.0
#[derive(Debug, Clone, Serialize, Deserialize, Versioned)]
#[versioned(version = "1.0.0")]
#[serde(rename_all = "camelCase")]
pub struct ThreadTreeV1_0_0 {
    /// Threads in display order
    pub threads: Vec<ThreadV1_0_0>,
}

/// Convert ThreadTreeV1_0_0 DTO to the stored thread list
impl IntoDomain<Vec<Thread>> for ThreadTreeV1_0_0 {
    fn into_domain(self) -> Vec<Thread> {
        self.threads.into_iter().map(Thread::from).collect()
    }
}

/// Convert the thread list to ThreadTreeV1_0_0 DTO (for version-migrate save support)
impl FromDomain<Vec<Thread>> for ThreadTreeV1_0_0 {
    fn from_domain(threads: Vec<Thread>) -> Self {
        ThreadTreeV1_0_0 {
            threads: threads.into_iter().map(ThreadV1_0_0::from).collect(),
        }
    }
}

// ============================================================================
// Migrator factory
// ============================================================================

/// Creates a Migrator for thread tree entities.
pub fn create_thread_tree_migrator() -> version_migrate::Migrator {
    let mut migrator = version_migrate::Migrator::builder().build();
    let path = version_migrate::Migrator::define("thread_tree")
        .from::<ThreadTreeV1_0_0>()
        .into_with_save::<Vec<Thread>>();
    migrator
        .register(path)
        .expect("Failed to register thread_tree migration path");
    migrator
}

#[cfg(test)]
mod tests {
    use super::*;
    use wayfinder_core::thread::CATCH_ALL_THREAD_ID;

    #[test]
    fn test_save_embeds_version_and_loads_back() {
        let migrator = create_thread_tree_migrator();
        let now = Utc::now();
        let mut topic = Thread::new("shadow-realm", "Shadow Realm", now);
        topic.progress = 10;
        let threads = vec![Thread::catch_all(now), topic];

        let json = migrator
            .save_domain_flat("thread_tree", threads.clone())
            .unwrap();
        assert!(json.contains("1.0.0"));

        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        let loaded: Vec<Thread> = migrator.load_flat_from("thread_tree", value).unwrap();
        assert_eq!(loaded, threads);
        assert_eq!(loaded[0].id, CATCH_ALL_THREAD_ID);
    }
}
