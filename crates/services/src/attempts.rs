use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

use cbt_core::model::{AttemptId, AttemptRecord, ExamId, StudentId};
use storage::repository::{AttemptRepository, AttemptRow, InMemoryRepository};

use crate::error::AttemptServiceError;

/// Presentation-agnostic list item for a submitted attempt.
///
/// No pre-formatted strings; the caller formats timestamps and scores.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttemptListItem {
    pub id: AttemptId,
    pub exam_id: Option<ExamId>,
    pub submitted_at: DateTime<Utc>,
    pub score: u32,
    pub total: u32,
    pub percentage: u32,
    pub answered: usize,
    pub flagged: usize,
}

impl AttemptListItem {
    #[must_use]
    pub fn from_row(row: &AttemptRow) -> Self {
        let attempt = &row.attempt;
        Self {
            id: row.id,
            exam_id: attempt.exam_id().cloned(),
            submitted_at: attempt.submitted_at(),
            score: attempt.score(),
            total: attempt.total(),
            percentage: attempt.percentage(),
            answered: attempt.answers().len(),
            flagged: attempt.flags().values().filter(|f| **f).count(),
        }
    }
}

/// Read-side facade over recorded attempts (history lists, result review).
#[derive(Clone)]
pub struct AttemptService {
    attempts: Arc<dyn AttemptRepository>,
}

impl AttemptService {
    #[must_use]
    pub fn new(attempts: Arc<dyn AttemptRepository>) -> Self {
        Self { attempts }
    }

    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryRepository::new()))
    }

    /// A student's attempts, newest first.
    ///
    /// # Errors
    ///
    /// Returns `AttemptServiceError::Storage` on repository failures.
    pub async fn history_for_student(
        &self,
        student: &StudentId,
        limit: u32,
    ) -> Result<Vec<AttemptListItem>, AttemptServiceError> {
        let rows = self
            .attempts
            .list_attempts_for_student(student, limit)
            .await?;
        Ok(rows.iter().map(AttemptListItem::from_row).collect())
    }

    /// Attempts at one exam, newest first.
    ///
    /// # Errors
    ///
    /// Returns `AttemptServiceError::Storage` on repository failures.
    pub async fn history_for_exam(
        &self,
        exam: &ExamId,
        limit: u32,
    ) -> Result<Vec<AttemptListItem>, AttemptServiceError> {
        let rows = self.attempts.list_attempts_for_exam(exam, limit).await?;
        Ok(rows.iter().map(AttemptListItem::from_row).collect())
    }

    /// Full record of one attempt, including answers and flags.
    ///
    /// # Errors
    ///
    /// Returns `AttemptServiceError::Storage` (including `NotFound`).
    pub async fn attempt(&self, id: AttemptId) -> Result<AttemptRecord, AttemptServiceError> {
        Ok(self.attempts.get_attempt(id).await?)
    }
}
