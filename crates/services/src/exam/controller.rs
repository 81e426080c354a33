use std::ops::ControlFlow;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;

use cbt_core::Clock;
use cbt_core::model::{
    AnswerValue, Answers, AttemptRecord, CourseId, DEFAULT_DURATION_MINUTES, ExamId, ExamInfo,
    ExamMode, Flags, Question, QuestionId, SessionKey, StudentId,
};
use storage::repository::{AttemptRepository, CheckpointRepository, StorageError};

use super::checkpoint::CheckpointWriter;
use super::countdown::{Countdown, TICK_PERIOD};
use super::events::{SessionEvent, SubmissionReceipt, SubmitTrigger};
use super::session::{
    ExamSession, QuestionStatus, ReviewItem, SessionProgress, SessionStatus, TickOutcome,
};
use crate::error::SessionError;

const EVENT_CAPACITY: usize = 64;

//
// ─── CONFIG ────────────────────────────────────────────────────────────────────
//

/// Parameters of one exam attempt.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub mode: ExamMode,
    pub duration_minutes: u32,
    pub exam_id: Option<ExamId>,
    pub course_id: Option<CourseId>,
    pub student_id: StudentId,
    pub clock: Clock,
}

impl SessionConfig {
    /// Untimed practice over the shared question pool.
    #[must_use]
    pub fn practice(student_id: StudentId) -> Self {
        Self {
            mode: ExamMode::Practice,
            duration_minutes: DEFAULT_DURATION_MINUTES,
            exam_id: None,
            course_id: None,
            student_id,
            clock: Clock::default(),
        }
    }

    /// Timed attempt at a published exam.
    #[must_use]
    pub fn for_exam(exam: &ExamInfo, student_id: StudentId) -> Self {
        Self {
            mode: ExamMode::TimedExam,
            duration_minutes: exam.duration_or_default(),
            exam_id: Some(exam.id.clone()),
            course_id: exam.course_id.clone(),
            student_id,
            clock: Clock::default(),
        }
    }

    #[must_use]
    pub fn with_mode(mut self, mode: ExamMode) -> Self {
        self.mode = mode;
        self
    }

    #[must_use]
    pub fn with_duration(mut self, minutes: u32) -> Self {
        self.duration_minutes = minutes;
        self
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn session_key(&self) -> SessionKey {
        SessionKey::for_exam(self.exam_id.as_ref())
    }
}

/// Everything a renderer needs to draw the session at one instant.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub key: String,
    pub mode: ExamMode,
    pub status: SessionStatus,
    pub current_index: usize,
    pub current_question: Option<Question>,
    pub answers: Answers,
    pub flags: Flags,
    pub progress: SessionProgress,
}

//
// ─── SHARED STATE ──────────────────────────────────────────────────────────────
//

struct Shared {
    key: SessionKey,
    session: Mutex<ExamSession>,
    countdown: Mutex<Option<Countdown>>,
    attempts: Arc<dyn AttemptRepository>,
    events: broadcast::Sender<SessionEvent>,
    exam_id: Option<ExamId>,
    course_id: Option<CourseId>,
    student_id: StudentId,
    clock: Clock,
    started_at: DateTime<Utc>,
}

impl Shared {
    fn session(&self) -> MutexGuard<'_, ExamSession> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn countdown_slot(&self) -> MutexGuard<'_, Option<Countdown>> {
        self.countdown.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn start_countdown(self: &Arc<Self>) {
        let mut slot = self.countdown_slot();
        if slot.as_ref().is_some_and(Countdown::is_active) {
            return;
        }
        let shared = Arc::clone(self);
        *slot = Some(Countdown::spawn(TICK_PERIOD, move || {
            let shared = Arc::clone(&shared);
            async move { shared.on_tick().await }
        }));
    }

    fn stop_countdown(&self) {
        let countdown = self.countdown_slot().take();
        if let Some(countdown) = countdown {
            countdown.cancel();
        }
    }

    fn countdown_active(&self) -> bool {
        self.countdown_slot()
            .as_ref()
            .is_some_and(Countdown::is_active)
    }

    async fn on_tick(self: &Arc<Self>) -> ControlFlow<()> {
        let outcome = self.session().tick();
        match outcome {
            TickOutcome::Idle => ControlFlow::Break(()),
            TickOutcome::Ticked { remaining_seconds } => {
                self.emit(SessionEvent::Tick { remaining_seconds });
                ControlFlow::Continue(())
            }
            TickOutcome::Expired => {
                self.emit(SessionEvent::Tick {
                    remaining_seconds: 0,
                });
                tracing::info!(session = %self.key, "time is up, submitting");
                if let Err(err) = self.submit(SubmitTrigger::Timeout).await {
                    tracing::error!(session = %self.key, error = %err, "automatic submission failed");
                }
                ControlFlow::Break(())
            }
        }
    }

    /// Grade and hand the attempt to the sink.
    ///
    /// The session is only locked once the sink accepts the attempt. While the
    /// call is in flight the countdown is held; if the sink fails it runs again
    /// with the time that was left.
    async fn submit(
        self: &Arc<Self>,
        trigger: SubmitTrigger,
    ) -> Result<SubmissionReceipt, SessionError> {
        let submitted_at = self.clock.now();
        let (result, held) = {
            let mut session = self.session();
            let held = session.hold();
            (session.result(submitted_at), held)
        };
        if held {
            self.stop_countdown();
        }

        let stored = match AttemptRecord::from_result(
            self.exam_id.clone(),
            self.student_id.clone(),
            self.course_id.clone(),
            self.started_at,
            result.clone(),
        ) {
            Ok(record) => self
                .attempts
                .append_attempt(&record)
                .await
                .map_err(SessionError::from),
            Err(err) => Err(SessionError::from(err)),
        };

        match stored {
            Ok(attempt_id) => {
                self.session().mark_submitted();
                self.stop_countdown();
                tracing::info!(
                    session = %self.key,
                    attempt_id,
                    score = result.score,
                    total = result.total,
                    ?trigger,
                    "exam submitted"
                );
                let receipt = SubmissionReceipt { attempt_id, result };
                self.emit(SessionEvent::Submitted {
                    trigger,
                    receipt: receipt.clone(),
                });
                Ok(receipt)
            }
            Err(err) => {
                tracing::warn!(session = %self.key, error = %err, ?trigger, "submission was not recorded");
                let restarted = self.session().release(held);
                if restarted {
                    self.start_countdown();
                } else if trigger == SubmitTrigger::Timeout {
                    self.stop_countdown();
                }
                self.emit(SessionEvent::SubmitFailed {
                    trigger,
                    error: err.to_string(),
                });
                Err(err)
            }
        }
    }
}

fn restored<T: Default>(
    loaded: Result<Option<T>, StorageError>,
    key: &SessionKey,
    what: &'static str,
) -> T {
    match loaded {
        Ok(Some(value)) => value,
        Ok(None) => T::default(),
        Err(err) => {
            tracing::warn!(session = %key, error = %err, "could not load {what} checkpoint, starting empty");
            T::default()
        }
    }
}

//
// ─── CONTROLLER ────────────────────────────────────────────────────────────────
//

/// Owns one exam attempt from the first question to submission.
///
/// Answers and flags are checkpointed in the background after every change.
/// In timed mode a one-second countdown runs while the session is not paused
/// and submits automatically when it reaches zero. The countdown is cancelled
/// on submission, `close`, and drop.
///
/// Methods that spawn the countdown (`start`, `resume`) must run inside a
/// tokio runtime.
pub struct ExamSessionController {
    shared: Arc<Shared>,
    writer: CheckpointWriter,
}

impl ExamSessionController {
    /// Begin a session, restoring any checkpoint stored under its key.
    ///
    /// Unreadable or malformed checkpoints start the session empty.
    pub async fn start(
        config: SessionConfig,
        questions: Vec<Question>,
        checkpoints: Arc<dyn CheckpointRepository>,
        attempts: Arc<dyn AttemptRepository>,
    ) -> Self {
        let key = config.session_key();
        let answers: Answers = restored(checkpoints.read_answers(&key).await, &key, "answers");
        let flags: Flags = restored(checkpoints.read_flags(&key).await, &key, "flags");

        tracing::info!(
            session = %key,
            mode = ?config.mode,
            questions = questions.len(),
            restored_answers = answers.len(),
            duration_minutes = config.duration_minutes,
            "exam session started"
        );

        let session = ExamSession::new(
            key.clone(),
            config.mode,
            questions,
            config.duration_minutes,
            answers,
            flags,
        );
        let running = session.is_running();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        let shared = Arc::new(Shared {
            key: key.clone(),
            session: Mutex::new(session),
            countdown: Mutex::new(None),
            attempts,
            events,
            exam_id: config.exam_id,
            course_id: config.course_id,
            student_id: config.student_id,
            clock: config.clock,
            started_at: config.clock.now(),
        });
        let writer = CheckpointWriter::spawn(checkpoints, key);

        if running {
            shared.start_countdown();
        }

        Self { shared, writer }
    }

    /// Receive ticks, pauses, submissions and other session events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.shared.events.subscribe()
    }

    #[must_use]
    pub fn key(&self) -> &SessionKey {
        &self.shared.key
    }

    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.shared.started_at
    }

    // ─── Navigation ────────────────────────────────────────────────────────

    pub fn next(&self) {
        self.shared.session().next();
    }

    pub fn previous(&self) {
        self.shared.session().previous();
    }

    pub fn jump_to(&self, index: usize) {
        self.shared.session().jump_to(index);
    }

    #[must_use]
    pub fn current_index(&self) -> usize {
        self.shared.session().current_index()
    }

    #[must_use]
    pub fn current_question(&self) -> Option<Question> {
        self.shared.session().current_question().cloned()
    }

    // ─── Answering ─────────────────────────────────────────────────────────

    /// Record (or overwrite) an answer and queue a checkpoint of all answers.
    ///
    /// Unlike a plain upsert, ids that are not part of this session's question
    /// list are refused, so stray keys never reach the checkpoint or the result.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Submitted` or `SessionError::UnknownQuestion`.
    /// Checkpoint failures are never reported here.
    pub fn record_answer(
        &self,
        question_id: QuestionId,
        value: AnswerValue,
    ) -> Result<(), SessionError> {
        let mut session = self.shared.session();
        session.record_answer(question_id, value)?;
        // Queued under the lock so it cannot overtake a concurrent reset.
        self.writer.save_answers(session.answers().clone());
        Ok(())
    }

    /// Flip a question's flag and queue a checkpoint of all flags.
    ///
    /// Like [`Self::record_answer`], ids outside the question list are refused.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Submitted` or `SessionError::UnknownQuestion`.
    pub fn toggle_flag(&self, question_id: &QuestionId) -> Result<bool, SessionError> {
        let mut session = self.shared.session();
        let flagged = session.toggle_flag(question_id)?;
        self.writer.save_flags(session.flags().clone());
        Ok(flagged)
    }

    /// Flip the flag of the displayed question.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Submitted` after submission.
    pub fn toggle_current_flag(&self) -> Result<Option<bool>, SessionError> {
        let mut session = self.shared.session();
        let flagged = session.toggle_current_flag()?;
        if flagged.is_some() {
            self.writer.save_flags(session.flags().clone());
        }
        Ok(flagged)
    }

    // ─── Timing ────────────────────────────────────────────────────────────

    /// # Errors
    ///
    /// Returns `SessionError::Submitted` after submission.
    pub fn pause(&self) -> Result<(), SessionError> {
        let changed = self.shared.session().pause()?;
        if changed {
            self.shared.stop_countdown();
            self.shared.emit(SessionEvent::Paused);
            tracing::debug!(session = %self.shared.key, "countdown paused");
        }
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `SessionError::Submitted` after submission.
    pub fn resume(&self) -> Result<(), SessionError> {
        let changed = self.shared.session().resume()?;
        if changed {
            self.shared.start_countdown();
            self.shared.emit(SessionEvent::Resumed);
            tracing::debug!(session = %self.shared.key, "countdown resumed");
        }
        Ok(())
    }

    #[must_use]
    pub fn remaining_seconds(&self) -> u32 {
        self.shared.session().remaining_seconds()
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.shared.session().is_running()
    }

    /// Whether a countdown task is currently alive.
    #[must_use]
    pub fn countdown_active(&self) -> bool {
        self.shared.countdown_active()
    }

    // ─── Progress & review ─────────────────────────────────────────────────

    #[must_use]
    pub fn completion_percent(&self) -> u32 {
        self.shared.session().completion_percent()
    }

    #[must_use]
    pub fn progress(&self) -> SessionProgress {
        self.shared.session().progress()
    }

    #[must_use]
    pub fn status_of(&self, index: usize) -> Option<QuestionStatus> {
        self.shared.session().status_of(index)
    }

    #[must_use]
    pub fn review(&self) -> Vec<ReviewItem> {
        self.shared.session().review()
    }

    #[must_use]
    pub fn answers(&self) -> Answers {
        self.shared.session().answers().clone()
    }

    #[must_use]
    pub fn flags(&self) -> Flags {
        self.shared.session().flags().clone()
    }

    #[must_use]
    pub fn is_submitted(&self) -> bool {
        self.shared.session().is_submitted()
    }

    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        let session = self.shared.session();
        SessionSnapshot {
            key: session.key().to_string(),
            mode: session.mode(),
            status: session.status(),
            current_index: session.current_index(),
            current_question: session.current_question().cloned(),
            answers: session.answers().clone(),
            flags: session.flags().clone(),
            progress: session.progress(),
        }
    }

    // ─── Submission & teardown ─────────────────────────────────────────────

    /// Grade the attempt and hand it to the submission sink.
    ///
    /// Checkpoints are kept for the review screen. Calling this again records
    /// another attempt; duplicates are not filtered here.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Storage` if the sink rejects the attempt. The
    /// session then stays open: answers can still change, a running countdown
    /// carries on, and the caller can retry.
    pub async fn submit(&self) -> Result<SubmissionReceipt, SessionError> {
        self.shared.submit(SubmitTrigger::Manual).await
    }

    /// Erase answers and flags, in memory and in the checkpoint store.
    ///
    /// Only ever runs on an explicit call; callers confirm with the user first.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Storage` if the checkpoint slots cannot be deleted.
    pub async fn reset(&self) -> Result<(), SessionError> {
        let cleared = {
            let mut session = self.shared.session();
            session.reset();
            self.writer.request_clear()
        };
        CheckpointWriter::cleared(cleared).await?;
        self.shared.emit(SessionEvent::Reset);
        tracing::info!(session = %self.shared.key, "progress reset");
        Ok(())
    }

    /// Wait for queued checkpoint writes to be attempted.
    pub async fn flush(&self) {
        self.writer.flush().await;
    }

    /// Leave the session without submitting.
    ///
    /// Stops the countdown and lets pending checkpoint writes finish.
    pub async fn close(self) {
        self.shared.stop_countdown();
        self.writer.flush().await;
        self.shared.emit(SessionEvent::Closed);
        tracing::info!(session = %self.shared.key, "exam session closed");
    }
}

impl Drop for ExamSessionController {
    fn drop(&mut self) {
        self.shared.stop_countdown();
    }
}
