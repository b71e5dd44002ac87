//! The thread tree and its pure transitions.
//!
//! Every mutation that can change sort order ends with [`ThreadTree::resort`],
//! so `ordered()` always reflects the invariant: catch-all first, then pinned
//! threads, then the rest by most recent interaction.

use super::exchange::{EntryStatus, Exchange, FeedbackVote, ModelEntry};
use super::model::{Thread, CATCH_ALL_THREAD_ID};
use crate::error::{Result, WayfinderError};
use crate::slug::slugify;
use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::collections::HashMap;

const INTERRUPTED_TEXT: &str = "This response was interrupted before it finished.";

#[derive(Debug, Clone, PartialEq)]
pub struct ThreadTree {
    threads: HashMap<String, Thread>,
    order: Vec<String>,
}

impl ThreadTree {
    /// Creates a tree containing only the catch-all thread.
    pub fn new(now: DateTime<Utc>) -> Self {
        let mut tree = Self {
            threads: HashMap::new(),
            order: Vec::new(),
        };
        tree.ensure_catch_all(now);
        tree
    }

    /// Rebuilds a tree from stored threads, repairing the catch-all if missing.
    pub fn from_threads(threads: impl IntoIterator<Item = Thread>, now: DateTime<Utc>) -> Self {
        let mut tree = Self {
            threads: HashMap::new(),
            order: Vec::new(),
        };
        for thread in threads {
            let id = thread.id.clone();
            if tree.threads.insert(id.clone(), thread).is_none() {
                tree.order.push(id);
            }
        }
        tree.ensure_catch_all(now);
        tree.resort();
        tree
    }

    /// Threads in display order, consuming the tree.
    pub fn into_threads(mut self) -> Vec<Thread> {
        self.order
            .iter()
            .filter_map(|id| self.threads.remove(id))
            .collect()
    }

    pub fn ensure_catch_all(&mut self, now: DateTime<Utc>) {
        if !self.threads.contains_key(CATCH_ALL_THREAD_ID) {
            self.threads
                .insert(CATCH_ALL_THREAD_ID.to_string(), Thread::catch_all(now));
            self.order.insert(0, CATCH_ALL_THREAD_ID.to_string());
        }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, thread_id: &str) -> bool {
        self.threads.contains_key(thread_id)
    }

    pub fn thread(&self, thread_id: &str) -> Option<&Thread> {
        self.threads.get(thread_id)
    }

    pub fn thread_mut(&mut self, thread_id: &str) -> Result<&mut Thread> {
        self.threads
            .get_mut(thread_id)
            .ok_or_else(|| WayfinderError::not_found("thread", thread_id))
    }

    /// Thread ids in display order.
    pub fn order(&self) -> &[String] {
        &self.order
    }

    pub fn ordered(&self) -> impl Iterator<Item = &Thread> {
        self.order.iter().filter_map(|id| self.threads.get(id))
    }

    /// Returns the id of the topic thread for `topic_name`, creating it if absent.
    ///
    /// # Errors
    ///
    /// Returns `InvalidOperation` when the name has no slug-able characters.
    pub fn ensure_topic_thread(&mut self, topic_name: &str, now: DateTime<Utc>) -> Result<String> {
        let id = slugify(topic_name);
        if id.is_empty() {
            return Err(WayfinderError::invalid_operation(format!(
                "topic name '{}' does not produce a thread id",
                topic_name
            )));
        }
        if !self.threads.contains_key(&id) {
            let mut thread = Thread::new(id.clone(), topic_name.trim(), now);
            thread.topic_name = Some(topic_name.trim().to_string());
            self.threads.insert(id.clone(), thread);
            self.order.push(id.clone());
            self.resort();
            tracing::info!("[ThreadTree] Created topic thread '{}'", id);
        }
        Ok(id)
    }

    /// Appends an exchange and bumps the thread's interaction time.
    pub fn append_exchange(
        &mut self,
        thread_id: &str,
        exchange: Exchange,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let thread = self.thread_mut(thread_id)?;
        thread.exchanges.push(exchange);
        thread.last_interaction_at = now;
        self.resort();
        Ok(())
    }

    /// Finds the thread currently holding the exchange whose model entry is `entry_id`.
    pub fn locate(&self, entry_id: &str) -> Option<&str> {
        self.threads
            .values()
            .find(|thread| thread.exchanges.iter().any(|e| e.id() == entry_id))
            .map(|thread| thread.id.as_str())
    }

    pub fn find_model_entry(&self, entry_id: &str) -> Option<&ModelEntry> {
        self.threads
            .values()
            .flat_map(|thread| thread.exchanges.iter())
            .find(|exchange| exchange.id() == entry_id)
            .map(|exchange| &exchange.model)
    }

    pub fn find_model_entry_mut(&mut self, entry_id: &str) -> Result<&mut ModelEntry> {
        self.threads
            .values_mut()
            .flat_map(|thread| thread.exchanges.iter_mut())
            .find(|exchange| exchange.id() == entry_id)
            .map(|exchange| &mut exchange.model)
            .ok_or_else(|| WayfinderError::not_found("model entry", entry_id))
    }

    /// Moves one exchange from `from` to the end of `to`.
    ///
    /// The target's existing exchanges are never touched; the moved exchange
    /// is always appended after them.
    pub fn migrate_exchange(
        &mut self,
        entry_id: &str,
        from: &str,
        to: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        if from == to {
            return Ok(());
        }
        if !self.threads.contains_key(to) {
            return Err(WayfinderError::not_found("thread", to));
        }

        let source = self.thread_mut(from)?;
        let position = source
            .exchanges
            .iter()
            .position(|exchange| exchange.id() == entry_id)
            .ok_or_else(|| WayfinderError::not_found("exchange", entry_id))?;
        let exchange = source.exchanges.remove(position);

        let target = self.thread_mut(to)?;
        target.exchanges.push(exchange);
        target.last_interaction_at = now;
        self.resort();

        tracing::info!(
            "[ThreadTree] Migrated exchange {} from '{}' to '{}'",
            entry_id,
            from,
            to
        );
        Ok(())
    }

    pub fn resort(&mut self) {
        let threads = &self.threads;
        self.order.retain(|id| threads.contains_key(id));
        self.order.sort_by(|a, b| match (threads.get(a), threads.get(b)) {
            (Some(a), Some(b)) => compare_threads(a, b),
            _ => Ordering::Equal,
        });
    }

    pub fn set_pinned(&mut self, thread_id: &str, pinned: bool) -> Result<()> {
        self.thread_mut(thread_id)?.pinned = pinned;
        self.resort();
        Ok(())
    }

    pub fn rename(&mut self, thread_id: &str, title: &str) -> Result<()> {
        let title = title.trim();
        if title.is_empty() {
            return Err(WayfinderError::invalid_operation("thread title cannot be empty"));
        }
        self.thread_mut(thread_id)?.title = title.to_string();
        Ok(())
    }

    /// Removes a thread. The catch-all thread cannot be deleted.
    pub fn delete_thread(&mut self, thread_id: &str) -> Result<Thread> {
        if thread_id == CATCH_ALL_THREAD_ID {
            return Err(WayfinderError::invalid_operation(
                "the catch-all thread cannot be deleted",
            ));
        }
        let thread = self
            .threads
            .remove(thread_id)
            .ok_or_else(|| WayfinderError::not_found("thread", thread_id))?;
        self.order.retain(|id| id != thread_id);
        Ok(thread)
    }

    pub fn set_feedback(&mut self, entry_id: &str, vote: Option<FeedbackVote>) -> Result<()> {
        self.find_model_entry_mut(entry_id)?.feedback = vote;
        Ok(())
    }

    /// Marks entries and panels left in flight by a previous process.
    ///
    /// Returns the number of model entries that were marked interrupted.
    pub fn mark_interrupted(&mut self) -> usize {
        let mut count = 0;
        for thread in self.threads.values_mut() {
            for exchange in &mut thread.exchanges {
                if exchange.model.is_in_flight() {
                    exchange.model.status = EntryStatus::Interrupted;
                    if exchange.model.text.trim().is_empty() {
                        exchange.model.text = INTERRUPTED_TEXT.to_string();
                    }
                    count += 1;
                }
            }
            thread.insights.recover_interrupted();
        }
        count
    }
}

fn compare_threads(a: &Thread, b: &Thread) -> Ordering {
    b.is_catch_all()
        .cmp(&a.is_catch_all())
        .then_with(|| b.pinned.cmp(&a.pinned))
        .then_with(|| b.last_interaction_at.cmp(&a.last_interaction_at))
        .then_with(|| a.id.cmp(&b.id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 5, 1, 9, 0, 0).unwrap()
    }

    fn exchange(text: &str, at: DateTime<Utc>) -> Exchange {
        Exchange::begin(text, Vec::new(), false, at)
    }

    #[test]
    fn test_new_tree_has_catch_all() {
        let tree = ThreadTree::new(t0());
        assert_eq!(tree.order(), [CATCH_ALL_THREAD_ID.to_string()]);
        assert!(tree.thread(CATCH_ALL_THREAD_ID).unwrap().is_catch_all());
    }

    #[test]
    fn test_sort_order_catch_all_then_pinned_then_recent() {
        let mut tree = ThreadTree::new(t0());
        let old = tree.ensure_topic_thread("Old Game", t0()).unwrap();
        let recent = tree.ensure_topic_thread("Recent Game", t0()).unwrap();
        let pinned = tree.ensure_topic_thread("Pinned Game", t0()).unwrap();

        tree.append_exchange(&old, exchange("a", t0()), t0() + Duration::minutes(1))
            .unwrap();
        tree.append_exchange(&recent, exchange("b", t0()), t0() + Duration::minutes(5))
            .unwrap();
        tree.set_pinned(&pinned, true).unwrap();

        assert_eq!(
            tree.order(),
            [
                CATCH_ALL_THREAD_ID.to_string(),
                pinned,
                recent,
                old
            ]
        );
    }

    #[test]
    fn test_catch_all_stays_first_even_when_stale() {
        let mut tree = ThreadTree::new(t0() - Duration::days(30));
        let topic = tree.ensure_topic_thread("Shadow Realm", t0()).unwrap();
        tree.set_pinned(&topic, true).unwrap();
        assert_eq!(tree.order()[0], CATCH_ALL_THREAD_ID);
    }

    #[test]
    fn test_migrate_moves_exchange_without_copies() {
        let mut tree = ThreadTree::new(t0());
        let first = exchange("earlier", t0());
        let moving = exchange("Where is the key?", t0());
        let moving_id = moving.id().to_string();
        tree.append_exchange(CATCH_ALL_THREAD_ID, first, t0()).unwrap();
        tree.append_exchange(CATCH_ALL_THREAD_ID, moving, t0()).unwrap();

        let topic = tree.ensure_topic_thread("Shadow Realm", t0()).unwrap();
        tree.append_exchange(&topic, exchange("existing", t0()), t0())
            .unwrap();

        tree.migrate_exchange(&moving_id, CATCH_ALL_THREAD_ID, &topic, t0() + Duration::seconds(3))
            .unwrap();

        let catch_all = tree.thread(CATCH_ALL_THREAD_ID).unwrap();
        assert_eq!(catch_all.exchanges.len(), 1);
        assert_eq!(catch_all.exchanges[0].user.text, "earlier");

        let topic_thread = tree.thread(&topic).unwrap();
        let texts: Vec<_> = topic_thread
            .exchanges
            .iter()
            .map(|e| e.user.text.as_str())
            .collect();
        assert_eq!(texts, ["existing", "Where is the key?"]);
        assert_eq!(tree.locate(&moving_id), Some(topic.as_str()));
    }

    #[test]
    fn test_migrate_unknown_exchange_fails() {
        let mut tree = ThreadTree::new(t0());
        let topic = tree.ensure_topic_thread("Shadow Realm", t0()).unwrap();
        let err = tree
            .migrate_exchange("missing", CATCH_ALL_THREAD_ID, &topic, t0())
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_catch_all_cannot_be_deleted() {
        let mut tree = ThreadTree::new(t0());
        let err = tree.delete_thread(CATCH_ALL_THREAD_ID).unwrap_err();
        assert!(err.is_invalid_operation());

        let topic = tree.ensure_topic_thread("Shadow Realm", t0()).unwrap();
        tree.delete_thread(&topic).unwrap();
        assert!(!tree.contains(&topic));
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn test_ensure_topic_thread_reuses_existing() {
        let mut tree = ThreadTree::new(t0());
        let a = tree.ensure_topic_thread("Shadow Realm", t0()).unwrap();
        let b = tree.ensure_topic_thread("shadow realm", t0()).unwrap();
        assert_eq!(a, b);
        assert_eq!(tree.len(), 2);
        assert!(tree.ensure_topic_thread("???", t0()).is_err());
    }

    #[test]
    fn test_restore_marks_in_flight_entries_interrupted() {
        let mut tree = ThreadTree::new(t0());
        tree.append_exchange(CATCH_ALL_THREAD_ID, exchange("hi", t0()), t0())
            .unwrap();
        let threads = tree.into_threads();

        let mut restored = ThreadTree::from_threads(threads, t0());
        assert_eq!(restored.mark_interrupted(), 1);
        let entry = &restored.thread(CATCH_ALL_THREAD_ID).unwrap().exchanges[0].model;
        assert_eq!(entry.status, EntryStatus::Interrupted);
        assert!(!entry.text.is_empty());
    }

    #[test]
    fn test_from_threads_repairs_missing_catch_all() {
        let tree = ThreadTree::from_threads(vec![Thread::new("zelda", "Zelda", t0())], t0());
        assert_eq!(tree.order()[0], CATCH_ALL_THREAD_ID);
        assert_eq!(tree.len(), 2);
    }
}
