use std::sync::Arc;

use cbt_core::model::{Answers, Flags, SessionKey};
use storage::repository::{CheckpointRepository, StorageError};
use tokio::sync::{mpsc, oneshot};

enum Command {
    Answers(Answers),
    Flags(Flags),
    Clear(oneshot::Sender<Result<(), StorageError>>),
    Flush(oneshot::Sender<()>),
}

/// Background writer for a session's checkpoint slots.
///
/// Saves are queued and return immediately. Every save carries the whole
/// current mapping and the queue is drained in order, so whichever write lands
/// last leaves a complete snapshot behind. Failed writes are logged and
/// dropped; the next save repairs the slot.
///
/// The task exits once the writer is dropped and the queue is empty.
pub(crate) struct CheckpointWriter {
    key: SessionKey,
    tx: mpsc::UnboundedSender<Command>,
}

impl CheckpointWriter {
    pub(crate) fn spawn(store: Arc<dyn CheckpointRepository>, key: SessionKey) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let task_key = key.clone();
        tokio::spawn(async move {
            while let Some(cmd) = rx.recv().await {
                match cmd {
                    Command::Answers(answers) => {
                        if let Err(err) = store.write_answers(&task_key, &answers).await {
                            tracing::warn!(session = %task_key, error = %err, "answers checkpoint failed");
                        }
                    }
                    Command::Flags(flags) => {
                        if let Err(err) = store.write_flags(&task_key, &flags).await {
                            tracing::warn!(session = %task_key, error = %err, "flags checkpoint failed");
                        }
                    }
                    Command::Clear(reply) => {
                        let _ = reply.send(store.clear(&task_key).await);
                    }
                    Command::Flush(reply) => {
                        let _ = reply.send(());
                    }
                }
            }
            tracing::trace!(session = %task_key, "checkpoint writer stopped");
        });
        Self { key, tx }
    }

    fn enqueue(&self, cmd: Command) -> bool {
        if self.tx.send(cmd).is_err() {
            tracing::warn!(session = %self.key, "checkpoint writer is gone; skipping write");
            return false;
        }
        true
    }

    pub(crate) fn save_answers(&self, answers: Answers) {
        self.enqueue(Command::Answers(answers));
    }

    pub(crate) fn save_flags(&self, flags: Flags) {
        self.enqueue(Command::Flags(flags));
    }

    /// Delete both slots after every earlier queued save has landed.
    pub(crate) async fn clear(&self) -> Result<(), StorageError> {
        Self::cleared(self.request_clear()).await
    }

    /// Queue the delete without waiting, so callers can order it under a lock.
    pub(crate) fn request_clear(&self) -> oneshot::Receiver<Result<(), StorageError>> {
        let (reply, done) = oneshot::channel();
        // A stopped writer drops `reply`, which `cleared` reports.
        self.enqueue(Command::Clear(reply));
        done
    }

    /// Wait for a delete queued with [`Self::request_clear`].
    pub(crate) async fn cleared(
        done: oneshot::Receiver<Result<(), StorageError>>,
    ) -> Result<(), StorageError> {
        done.await
            .map_err(|_| StorageError::Connection("checkpoint writer stopped".into()))?
    }

    /// Wait until every queued save has been attempted.
    pub(crate) async fn flush(&self) {
        let (reply, done) = oneshot::channel();
        if self.enqueue(Command::Flush(reply)) {
            let _ = done.await;
        }
    }
}
