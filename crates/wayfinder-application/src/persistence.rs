//! Debounced persistence of the thread tree.
//!
//! The debouncer subscribes to [`TreeHandle`] revisions. After the last
//! revision in a burst it waits for the quiet period, then serializes the
//! whole tree once. `flush` and `shutdown` force the write immediately.

use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use wayfinder_core::thread::ThreadTreeRepository;
use wayfinder_core::{Result, WayfinderError};

use crate::state::TreeHandle;

enum Command {
    Flush(oneshot::Sender<Result<()>>),
}

pub struct PersistenceDebouncer {
    commands: mpsc::UnboundedSender<Command>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<Result<()>>>>,
}

impl PersistenceDebouncer {
    /// Starts the background writer.
    ///
    /// # Arguments
    ///
    /// * `tree` - The tree whose revisions trigger writes
    /// * `repository` - Where the serialized tree is stored
    /// * `quiet_period` - Trailing delay after the last mutation
    /// * `soft_size_limit` - Serialized size above which a warning is logged
    pub fn spawn(
        tree: TreeHandle,
        repository: Arc<dyn ThreadTreeRepository>,
        quiet_period: Duration,
        soft_size_limit: usize,
    ) -> Self {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let revisions = tree.subscribe();
        let writer = Writer {
            written_revision: tree.revision(),
            tree,
            repository,
            soft_size_limit,
        };
        let task = tokio::spawn(run(
            writer,
            revisions,
            command_rx,
            cancel.clone(),
            quiet_period,
        ));

        Self {
            commands,
            cancel,
            task: Mutex::new(Some(task)),
        }
    }

    /// Writes any pending changes now.
    pub async fn flush(&self) -> Result<()> {
        let (reply, done) = oneshot::channel();
        self.commands
            .send(Command::Flush(reply))
            .map_err(|_| WayfinderError::internal("persistence writer has stopped"))?;
        done.await
            .map_err(|_| WayfinderError::internal("persistence writer dropped flush request"))?
    }

    /// Writes pending changes and stops the writer.
    pub async fn shutdown(&self) -> Result<()> {
        self.cancel.cancel();
        let task = self
            .task
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        match task {
            Some(task) => task
                .await
                .map_err(|e| {
                    WayfinderError::internal(format!("persistence writer panicked: {}", e))
                })?,
            None => Ok(()),
        }
    }
}

impl Drop for PersistenceDebouncer {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

struct Writer {
    tree: TreeHandle,
    repository: Arc<dyn ThreadTreeRepository>,
    soft_size_limit: usize,
    written_revision: u64,
}

impl Writer {
    async fn write_if_dirty(&mut self) -> Result<()> {
        let revision = self.tree.revision();
        if revision == self.written_revision {
            return Ok(());
        }

        let snapshot = self.tree.snapshot();
        match self.repository.save(&snapshot).await {
            Ok(size) => {
                self.written_revision = revision;
                if size > self.soft_size_limit {
                    tracing::warn!(
                        "[PersistenceDebouncer] Thread tree is {} bytes, above the {} byte soft limit",
                        size,
                        self.soft_size_limit
                    );
                } else {
                    tracing::debug!(
                        "[PersistenceDebouncer] Wrote revision {} ({} bytes)",
                        revision,
                        size
                    );
                }
                Ok(())
            }
            Err(e) => {
                // Left dirty; the next mutation or flush retries.
                tracing::error!("[PersistenceDebouncer] Failed to write thread tree: {}", e);
                Err(e)
            }
        }
    }
}

async fn run(
    mut writer: Writer,
    mut revisions: watch::Receiver<u64>,
    mut commands: mpsc::UnboundedReceiver<Command>,
    cancel: CancellationToken,
    quiet_period: Duration,
) -> Result<()> {
    loop {
        let mut reply = None;
        tokio::select! {
            _ = cancel.cancelled() => break,
            changed = revisions.changed() => {
                if changed.is_err() {
                    break;
                }
                let deadline = tokio::time::sleep(quiet_period);
                tokio::pin!(deadline);
                loop {
                    tokio::select! {
                        _ = &mut deadline => break,
                        _ = cancel.cancelled() => break,
                        changed = revisions.changed() => {
                            if changed.is_err() {
                                break;
                            }
                            deadline.as_mut().reset(Instant::now() + quiet_period);
                        }
                        Some(Command::Flush(sender)) = commands.recv() => {
                            reply = Some(sender);
                            break;
                        }
                    }
                }
            }
            Some(Command::Flush(sender)) = commands.recv() => {
                reply = Some(sender);
            }
        }

        let result = writer.write_if_dirty().await;
        if let Some(reply) = reply {
            let _ = reply.send(result);
        }
        if cancel.is_cancelled() {
            break;
        }
    }

    writer.write_if_dirty().await
}
