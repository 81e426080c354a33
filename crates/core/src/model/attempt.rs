use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::answer::{Answers, Flags};
use crate::model::ids::{CourseId, ExamId, StudentId};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum AttemptError {
    #[error("submitted_at is before started_at")]
    InvalidTimeRange,

    #[error("score ({score}) exceeds total ({total})")]
    ScoreExceedsTotal { score: u32, total: u32 },

    #[error("percentage out of range: {0}")]
    InvalidPercentage(u32),
}

/// Outcome of submitting an exam session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamResult {
    pub score: u32,
    pub total: u32,
    pub percentage: u32,
    pub answers: Answers,
    pub flags: Flags,
    pub submitted_at: DateTime<Utc>,
}

/// A finished attempt as recorded by the submission sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptRecord {
    exam_id: Option<ExamId>,
    student_id: StudentId,
    course_id: Option<CourseId>,
    score: u32,
    total: u32,
    percentage: u32,
    answers: Answers,
    flags: Flags,
    started_at: DateTime<Utc>,
    submitted_at: DateTime<Utc>,
}

impl AttemptRecord {
    /// Build a record for a freshly submitted result.
    ///
    /// A submission stamped before `started_at` (wall clock stepped back
    /// mid-exam) is recorded as submitted at `started_at`.
    ///
    /// # Errors
    ///
    /// Returns `AttemptError` if the score does not fit the total.
    pub fn from_result(
        exam_id: Option<ExamId>,
        student_id: StudentId,
        course_id: Option<CourseId>,
        started_at: DateTime<Utc>,
        result: ExamResult,
    ) -> Result<Self, AttemptError> {
        Self::from_persisted(
            exam_id,
            student_id,
            course_id,
            result.score,
            result.total,
            result.percentage,
            result.answers,
            result.flags,
            started_at,
            result.submitted_at.max(started_at),
        )
    }

    /// Rehydrate an attempt from persisted storage.
    ///
    /// # Errors
    ///
    /// Returns `AttemptError` if counts or timestamps do not line up.
    #[allow(clippy::too_many_arguments)]
    pub fn from_persisted(
        exam_id: Option<ExamId>,
        student_id: StudentId,
        course_id: Option<CourseId>,
        score: u32,
        total: u32,
        percentage: u32,
        answers: Answers,
        flags: Flags,
        started_at: DateTime<Utc>,
        submitted_at: DateTime<Utc>,
    ) -> Result<Self, AttemptError> {
        if submitted_at < started_at {
            return Err(AttemptError::InvalidTimeRange);
        }
        if score > total {
            return Err(AttemptError::ScoreExceedsTotal { score, total });
        }
        if percentage > 100 {
            return Err(AttemptError::InvalidPercentage(percentage));
        }

        Ok(Self {
            exam_id,
            student_id,
            course_id,
            score,
            total,
            percentage,
            answers,
            flags,
            started_at,
            submitted_at,
        })
    }

    #[must_use]
    pub fn exam_id(&self) -> Option<&ExamId> {
        self.exam_id.as_ref()
    }

    #[must_use]
    pub fn student_id(&self) -> &StudentId {
        &self.student_id
    }

    #[must_use]
    pub fn course_id(&self) -> Option<&CourseId> {
        self.course_id.as_ref()
    }

    #[must_use]
    pub fn score(&self) -> u32 {
        self.score
    }

    #[must_use]
    pub fn total(&self) -> u32 {
        self.total
    }

    #[must_use]
    pub fn percentage(&self) -> u32 {
        self.percentage
    }

    #[must_use]
    pub fn answers(&self) -> &Answers {
        &self.answers
    }

    #[must_use]
    pub fn flags(&self) -> &Flags {
        &self.flags
    }

    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    #[must_use]
    pub fn submitted_at(&self) -> DateTime<Utc> {
        self.submitted_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;

    fn result(score: u32, total: u32, percentage: u32) -> ExamResult {
        ExamResult {
            score,
            total,
            percentage,
            answers: Answers::new(),
            flags: Flags::new(),
            submitted_at: fixed_now(),
        }
    }

    #[test]
    fn rejects_score_above_total() {
        let err = AttemptRecord::from_result(
            None,
            StudentId::new("s1"),
            None,
            fixed_now(),
            result(4, 3, 100),
        )
        .unwrap_err();
        assert_eq!(err, AttemptError::ScoreExceedsTotal { score: 4, total: 3 });
    }

    #[test]
    fn fresh_result_survives_clock_stepping_back() {
        let started_at = fixed_now() + chrono::Duration::seconds(90);
        let record = AttemptRecord::from_result(
            None,
            StudentId::new("s1"),
            None,
            started_at,
            result(1, 3, 33),
        )
        .unwrap();
        assert_eq!(record.started_at(), started_at);
        assert_eq!(record.submitted_at(), started_at);
    }

    #[test]
    fn persisted_row_rejects_submission_before_start() {
        let err = AttemptRecord::from_persisted(
            None,
            StudentId::new("s1"),
            None,
            1,
            3,
            33,
            Answers::new(),
            Flags::new(),
            fixed_now() + chrono::Duration::seconds(1),
            fixed_now(),
        )
        .unwrap_err();
        assert_eq!(err, AttemptError::InvalidTimeRange);
    }

    #[test]
    fn result_serializes_camel_case() {
        let json = serde_json::to_value(result(2, 3, 67)).unwrap();
        assert_eq!(json["percentage"], 67);
        assert!(json.get("submittedAt").is_some());
    }
}
