//! Shared, revisioned thread tree.

use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use wayfinder_core::thread::ThreadTree;

/// The single mutable thread tree plus a revision counter.
///
/// Every [`TreeHandle::mutate`] bumps the revision, which is what the
/// persistence debouncer and any UI subscriber listen to. The lock is a
/// plain mutex and is never held across an await.
#[derive(Clone)]
pub struct TreeHandle {
    tree: Arc<Mutex<ThreadTree>>,
    revisions: Arc<watch::Sender<u64>>,
}

impl TreeHandle {
    pub fn new(tree: ThreadTree) -> Self {
        let (revisions, _) = watch::channel(0);
        Self {
            tree: Arc::new(Mutex::new(tree)),
            revisions: Arc::new(revisions),
        }
    }

    /// Runs `f` against the tree without bumping the revision.
    pub fn read<R>(&self, f: impl FnOnce(&ThreadTree) -> R) -> R {
        let guard = self.lock();
        f(&*guard)
    }

    /// Runs `f` against the tree and publishes a new revision.
    pub fn mutate<R>(&self, f: impl FnOnce(&mut ThreadTree) -> R) -> R {
        let mut guard = self.lock();
        let result = f(&mut *guard);
        drop(guard);
        self.revisions.send_modify(|revision| *revision += 1);
        result
    }

    /// A copy of the current tree.
    pub fn snapshot(&self) -> ThreadTree {
        self.lock().clone()
    }

    pub fn revision(&self) -> u64 {
        *self.revisions.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revisions.subscribe()
    }

    fn lock(&self) -> MutexGuard<'_, ThreadTree> {
        self.tree
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
