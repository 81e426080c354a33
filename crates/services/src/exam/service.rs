use std::sync::Arc;

use cbt_core::model::{ExamInfo, Question, StudentId};
use storage::repository::{AttemptRepository, CheckpointRepository, Storage};

use super::controller::{ExamSessionController, SessionConfig};
use crate::Clock;

/// Starts exam sessions against a fixed pair of sinks and one clock.
#[derive(Clone)]
pub struct ExamService {
    clock: Clock,
    checkpoints: Arc<dyn CheckpointRepository>,
    attempts: Arc<dyn AttemptRepository>,
}

impl ExamService {
    #[must_use]
    pub fn new(
        clock: Clock,
        checkpoints: Arc<dyn CheckpointRepository>,
        attempts: Arc<dyn AttemptRepository>,
    ) -> Self {
        Self {
            clock,
            checkpoints,
            attempts,
        }
    }

    #[must_use]
    pub fn from_storage(clock: Clock, storage: &Storage) -> Self {
        Self::new(
            clock,
            Arc::clone(&storage.checkpoints),
            Arc::clone(&storage.attempts),
        )
    }

    /// Start an untimed practice session over the shared pool.
    pub async fn start_practice(
        &self,
        student_id: StudentId,
        questions: Vec<Question>,
    ) -> ExamSessionController {
        self.start(SessionConfig::practice(student_id), questions)
            .await
    }

    /// Start a timed attempt at a published exam.
    pub async fn start_exam(
        &self,
        exam: &ExamInfo,
        student_id: StudentId,
        questions: Vec<Question>,
    ) -> ExamSessionController {
        self.start(SessionConfig::for_exam(exam, student_id), questions)
            .await
    }

    /// Start a session with explicit parameters; the service clock wins.
    pub async fn start(
        &self,
        config: SessionConfig,
        questions: Vec<Question>,
    ) -> ExamSessionController {
        ExamSessionController::start(
            config.with_clock(self.clock),
            questions,
            Arc::clone(&self.checkpoints),
            Arc::clone(&self.attempts),
        )
        .await
    }
}
