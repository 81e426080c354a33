use async_trait::async_trait;
use cbt_core::model::{
    Answers, AttemptId, AttemptRecord, ExamId, Flags, SessionKey, StudentId,
};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

//
// ─── CHECKPOINTS ───────────────────────────────────────────────────────────────
//

/// One of the two independent checkpoint slots kept per session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CheckpointSlot {
    Answers,
    Flags,
}

impl CheckpointSlot {
    pub const ALL: [CheckpointSlot; 2] = [CheckpointSlot::Answers, CheckpointSlot::Flags];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            CheckpointSlot::Answers => "answers",
            CheckpointSlot::Flags => "flags",
        }
    }

    /// Flat key such as `answers:exam-42` or `flags:practice`.
    #[must_use]
    pub fn key_for(self, session: &SessionKey) -> String {
        format!("{}:{}", self.as_str(), session)
    }
}

impl fmt::Display for CheckpointSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn decode_or_absent<T: DeserializeOwned>(
    slot: CheckpointSlot,
    session: &SessionKey,
    raw: Option<String>,
) -> Option<T> {
    let raw = raw?;
    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(err) => {
            tracing::warn!(%slot, %session, error = %err, "discarding malformed checkpoint");
            None
        }
    }
}

/// Key-value store holding in-progress answers and flags so a session can be
/// resumed after a reload.
///
/// Adapters only implement the raw string operations; typed access and JSON
/// encoding are shared. Unparseable content reads as absent.
#[async_trait]
pub trait CheckpointRepository: Send + Sync {
    /// Fetch the raw payload of a slot.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backend cannot be reached.
    async fn read_raw(
        &self,
        slot: CheckpointSlot,
        session: &SessionKey,
    ) -> Result<Option<String>, StorageError>;

    /// Replace the payload of a slot.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the payload cannot be stored.
    async fn write_raw(
        &self,
        slot: CheckpointSlot,
        session: &SessionKey,
        payload: &str,
    ) -> Result<(), StorageError>;

    /// Remove a slot. Removing a missing slot is not an error.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backend cannot be reached.
    async fn delete(&self, slot: CheckpointSlot, session: &SessionKey)
    -> Result<(), StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` only for backend failures; malformed data is `Ok(None)`.
    async fn read_answers(&self, session: &SessionKey) -> Result<Option<Answers>, StorageError> {
        let raw = self.read_raw(CheckpointSlot::Answers, session).await?;
        Ok(decode_or_absent(CheckpointSlot::Answers, session, raw))
    }

    /// # Errors
    ///
    /// Returns `StorageError` if encoding or the write fails.
    async fn write_answers(
        &self,
        session: &SessionKey,
        answers: &Answers,
    ) -> Result<(), StorageError> {
        let payload =
            serde_json::to_string(answers).map_err(|e| StorageError::Serialization(e.to_string()))?;
        self.write_raw(CheckpointSlot::Answers, session, &payload)
            .await
    }

    /// # Errors
    ///
    /// Returns `StorageError` only for backend failures; malformed data is `Ok(None)`.
    async fn read_flags(&self, session: &SessionKey) -> Result<Option<Flags>, StorageError> {
        let raw = self.read_raw(CheckpointSlot::Flags, session).await?;
        Ok(decode_or_absent(CheckpointSlot::Flags, session, raw))
    }

    /// # Errors
    ///
    /// Returns `StorageError` if encoding or the write fails.
    async fn write_flags(&self, session: &SessionKey, flags: &Flags) -> Result<(), StorageError> {
        let payload =
            serde_json::to_string(flags).map_err(|e| StorageError::Serialization(e.to_string()))?;
        self.write_raw(CheckpointSlot::Flags, session, &payload).await
    }

    /// Remove both slots of a session.
    ///
    /// # Errors
    ///
    /// Returns the first `StorageError` encountered.
    async fn clear(&self, session: &SessionKey) -> Result<(), StorageError> {
        for slot in CheckpointSlot::ALL {
            self.delete(slot, session).await?;
        }
        Ok(())
    }
}

//
// ─── ATTEMPTS ──────────────────────────────────────────────────────────────────
//

/// A stored attempt together with its assigned identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptRow {
    pub id: AttemptId,
    pub attempt: AttemptRecord,
}

impl AttemptRow {
    #[must_use]
    pub fn new(id: AttemptId, attempt: AttemptRecord) -> Self {
        Self { id, attempt }
    }
}

/// Recorder of finished attempts.
#[async_trait]
pub trait AttemptRepository: Send + Sync {
    /// Store a submitted attempt and return its identifier.
    ///
    /// No deduplication happens here; each call stores a new row.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the attempt cannot be stored.
    async fn append_attempt(&self, attempt: &AttemptRecord) -> Result<AttemptId, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if missing, or other storage errors.
    async fn get_attempt(&self, id: AttemptId) -> Result<AttemptRecord, StorageError>;

    /// Attempts by a student, newest first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn list_attempts_for_student(
        &self,
        student: &StudentId,
        limit: u32,
    ) -> Result<Vec<AttemptRow>, StorageError>;

    /// Attempts at an exam, newest first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn list_attempts_for_exam(
        &self,
        exam: &ExamId,
        limit: u32,
    ) -> Result<Vec<AttemptRow>, StorageError>;
}

//
// ─── IN-MEMORY ─────────────────────────────────────────────────────────────────
//

/// Simple in-memory repository implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    checkpoints: Arc<Mutex<HashMap<String, String>>>,
    attempts: Arc<Mutex<Vec<AttemptRow>>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn newest_first(
        &self,
        limit: u32,
        keep: impl Fn(&AttemptRecord) -> bool,
    ) -> Result<Vec<AttemptRow>, StorageError> {
        let guard = self
            .attempts
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let mut rows: Vec<AttemptRow> = guard
            .iter()
            .filter(|row| keep(&row.attempt))
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            b.attempt
                .submitted_at()
                .cmp(&a.attempt.submitted_at())
                .then(b.id.cmp(&a.id))
        });
        rows.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        Ok(rows)
    }
}

#[async_trait]
impl CheckpointRepository for InMemoryRepository {
    async fn read_raw(
        &self,
        slot: CheckpointSlot,
        session: &SessionKey,
    ) -> Result<Option<String>, StorageError> {
        let guard = self
            .checkpoints
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.get(&slot.key_for(session)).cloned())
    }

    async fn write_raw(
        &self,
        slot: CheckpointSlot,
        session: &SessionKey,
        payload: &str,
    ) -> Result<(), StorageError> {
        let mut guard = self
            .checkpoints
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.insert(slot.key_for(session), payload.to_owned());
        Ok(())
    }

    async fn delete(
        &self,
        slot: CheckpointSlot,
        session: &SessionKey,
    ) -> Result<(), StorageError> {
        let mut guard = self
            .checkpoints
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.remove(&slot.key_for(session));
        Ok(())
    }
}

#[async_trait]
impl AttemptRepository for InMemoryRepository {
    async fn append_attempt(&self, attempt: &AttemptRecord) -> Result<AttemptId, StorageError> {
        let mut guard = self
            .attempts
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let id = AttemptId::try_from(guard.len())
            .map_err(|_| StorageError::Serialization("attempt id overflow".into()))?
            + 1;
        guard.push(AttemptRow::new(id, attempt.clone()));
        Ok(id)
    }

    async fn get_attempt(&self, id: AttemptId) -> Result<AttemptRecord, StorageError> {
        let guard = self
            .attempts
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard
            .iter()
            .find(|row| row.id == id)
            .map(|row| row.attempt.clone())
            .ok_or(StorageError::NotFound)
    }

    async fn list_attempts_for_student(
        &self,
        student: &StudentId,
        limit: u32,
    ) -> Result<Vec<AttemptRow>, StorageError> {
        self.newest_first(limit, |a| a.student_id() == student)
    }

    async fn list_attempts_for_exam(
        &self,
        exam: &ExamId,
        limit: u32,
    ) -> Result<Vec<AttemptRow>, StorageError> {
        self.newest_first(limit, |a| a.exam_id() == Some(exam))
    }
}

/// Aggregates the checkpoint store and the attempt recorder behind trait
/// objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub checkpoints: Arc<dyn CheckpointRepository>,
    pub attempts: Arc<dyn AttemptRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let repo = InMemoryRepository::new();
        let checkpoints: Arc<dyn CheckpointRepository> = Arc::new(repo.clone());
        let attempts: Arc<dyn AttemptRepository> = Arc::new(repo);
        Self {
            checkpoints,
            attempts,
        }
    }
}
