use serde::{Deserialize, Serialize};

use crate::model::ids::{CourseId, ExamId, SessionKey};

/// Minutes allotted when an exam does not specify its own duration.
pub const DEFAULT_DURATION_MINUTES: u32 = 10;

/// How an attempt is run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExamMode {
    /// Ungraded attempt; the countdown starts inert.
    Practice,
    /// Graded attempt with a running countdown and submission at expiry.
    #[serde(alias = "exam")]
    TimedExam,
}

impl ExamMode {
    #[must_use]
    pub fn is_timed(self) -> bool {
        matches!(self, ExamMode::TimedExam)
    }
}

/// Metadata of a published exam.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExamInfo {
    pub id: ExamId,
    pub title: String,
    #[serde(default, rename = "courseId", alias = "course_id")]
    pub course_id: Option<CourseId>,
    #[serde(default, rename = "duration")]
    pub duration_minutes: Option<u32>,
}

impl ExamInfo {
    #[must_use]
    pub fn session_key(&self) -> SessionKey {
        SessionKey::Exam(self.id.clone())
    }

    #[must_use]
    pub fn duration_or_default(&self) -> u32 {
        self.duration_minutes.unwrap_or(DEFAULT_DURATION_MINUTES)
    }
}
