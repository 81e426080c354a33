use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

use cbt_core::model::{
    AnswerValue, Answers, ExamMode, ExamResult, Flags, Question, QuestionId, QuestionKind,
    SessionKey,
};
use cbt_core::scoring;

use crate::error::SessionError;

//
// ─── STATE ─────────────────────────────────────────────────────────────────────
//

/// Lifecycle of one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Submitted,
}

/// What a single countdown tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The countdown is not driving this session (paused, practice, expired or submitted).
    Idle,
    Ticked { remaining_seconds: u32 },
    /// Time ran out on this tick. Reported exactly once per session.
    Expired,
}

/// Review-grid state of a question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionStatus {
    Answered,
    Flagged,
    Empty,
}

/// One row of the review-and-submit list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReviewItem {
    pub index: usize,
    pub question_id: QuestionId,
    pub kind: QuestionKind,
    pub prompt: String,
    pub answer: Option<AnswerValue>,
    pub flagged: bool,
    pub status: QuestionStatus,
}

/// Aggregated view of session progress, useful for UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionProgress {
    pub total: usize,
    pub answered: usize,
    pub flagged: usize,
    pub percent: u32,
    pub remaining_seconds: u32,
    pub is_running: bool,
}

//
// ─── SESSION ───────────────────────────────────────────────────────────────────
//

/// Headless state of a single exam attempt.
///
/// Holds the question pointer, answers, flags and countdown state. It performs
/// no I/O; the controller wraps it with checkpointing, the countdown task and
/// submission.
pub struct ExamSession {
    key: SessionKey,
    mode: ExamMode,
    questions: Vec<Question>,
    current: usize,
    answers: Answers,
    flags: Flags,
    remaining_seconds: u32,
    running: bool,
    expired: bool,
    status: SessionStatus,
}

impl ExamSession {
    /// Create a session seeded with previously checkpointed answers and flags.
    #[must_use]
    pub fn new(
        key: SessionKey,
        mode: ExamMode,
        questions: Vec<Question>,
        duration_minutes: u32,
        answers: Answers,
        flags: Flags,
    ) -> Self {
        Self {
            key,
            mode,
            questions,
            current: 0,
            answers,
            flags,
            remaining_seconds: duration_minutes.saturating_mul(60),
            running: mode.is_timed(),
            expired: false,
            status: SessionStatus::Active,
        }
    }

    #[must_use]
    pub fn key(&self) -> &SessionKey {
        &self.key
    }

    #[must_use]
    pub fn mode(&self) -> ExamMode {
        self.mode
    }

    #[must_use]
    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    #[must_use]
    pub fn current_index(&self) -> usize {
        self.current
    }

    #[must_use]
    pub fn current_question(&self) -> Option<&Question> {
        self.questions.get(self.current)
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
    pub fn remaining_seconds(&self) -> u32 {
        self.remaining_seconds
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running
    }

    #[must_use]
    pub fn status(&self) -> SessionStatus {
        self.status
    }

    #[must_use]
    pub fn is_submitted(&self) -> bool {
        self.status == SessionStatus::Submitted
    }

    fn ensure_active(&self) -> Result<(), SessionError> {
        match self.status {
            SessionStatus::Active => Ok(()),
            SessionStatus::Submitted => Err(SessionError::Submitted),
        }
    }

    fn contains(&self, id: &QuestionId) -> bool {
        self.questions.iter().any(|q| q.id() == id)
    }

    // ─── Navigation ────────────────────────────────────────────────────────

    /// Move to the next question; stays put on the last one.
    pub fn next(&mut self) {
        if self.current + 1 < self.questions.len() {
            self.current += 1;
        }
    }

    /// Move to the previous question; stays put on the first one.
    pub fn previous(&mut self) {
        self.current = self.current.saturating_sub(1);
    }

    /// Jump straight to a question from the review grid.
    ///
    /// Out-of-range indices are clamped to the last question.
    pub fn jump_to(&mut self, index: usize) {
        let Some(last) = self.questions.len().checked_sub(1) else {
            return;
        };
        if index > last {
            tracing::debug!(index, last, "clamping out-of-range jump");
        }
        self.current = index.min(last);
    }

    // ─── Answering ─────────────────────────────────────────────────────────

    /// Record (or overwrite) the answer to a question.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Submitted` after submission and
    /// `SessionError::UnknownQuestion` for ids outside this session.
    pub fn record_answer(
        &mut self,
        question_id: QuestionId,
        value: AnswerValue,
    ) -> Result<(), SessionError> {
        self.ensure_active()?;
        if !self.contains(&question_id) {
            return Err(SessionError::UnknownQuestion(question_id));
        }
        self.answers.insert(question_id, value);
        Ok(())
    }

    /// Flip the review flag of a question and return the new value.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Submitted` after submission and
    /// `SessionError::UnknownQuestion` for ids outside this session.
    pub fn toggle_flag(&mut self, question_id: &QuestionId) -> Result<bool, SessionError> {
        self.ensure_active()?;
        if !self.contains(question_id) {
            return Err(SessionError::UnknownQuestion(question_id.clone()));
        }
        let flag = self.flags.entry(question_id.clone()).or_insert(false);
        *flag = !*flag;
        Ok(*flag)
    }

    /// Flip the flag of the displayed question. `None` when there are no questions.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Submitted` after submission.
    pub fn toggle_current_flag(&mut self) -> Result<Option<bool>, SessionError> {
        let Some(id) = self.current_question().map(|q| q.id().clone()) else {
            return Ok(None);
        };
        self.toggle_flag(&id).map(Some)
    }

    // ─── Timing ────────────────────────────────────────────────────────────

    /// Stop the countdown. Returns whether anything changed.
    ///
    /// Practice sessions never run a countdown, so this is a no-op there.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Submitted` after submission.
    pub fn pause(&mut self) -> Result<bool, SessionError> {
        self.ensure_active()?;
        if !self.mode.is_timed() || !self.running {
            return Ok(false);
        }
        self.running = false;
        Ok(true)
    }

    /// Restart the countdown if time remains. Returns whether anything changed.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Submitted` after submission.
    pub fn resume(&mut self) -> Result<bool, SessionError> {
        self.ensure_active()?;
        if !self.mode.is_timed() || self.running || self.expired || self.remaining_seconds == 0 {
            return Ok(false);
        }
        self.running = true;
        Ok(true)
    }

    /// Advance the countdown by one second.
    pub fn tick(&mut self) -> TickOutcome {
        if !self.running || self.expired || self.is_submitted() {
            return TickOutcome::Idle;
        }
        self.remaining_seconds = self.remaining_seconds.saturating_sub(1);
        if self.remaining_seconds == 0 {
            self.expired = true;
            self.running = false;
            return TickOutcome::Expired;
        }
        TickOutcome::Ticked {
            remaining_seconds: self.remaining_seconds,
        }
    }

    // ─── Progress ──────────────────────────────────────────────────────────

    fn answered_count(&self) -> usize {
        self.questions
            .iter()
            .filter(|q| self.answers.contains_key(q.id()))
            .count()
    }

    fn is_flagged(&self, id: &QuestionId) -> bool {
        self.flags.get(id).copied().unwrap_or(false)
    }

    /// Percentage of questions with a recorded answer.
    #[must_use]
    pub fn completion_percent(&self) -> u32 {
        scoring::completion_percent(self.answered_count(), self.questions.len())
    }

    #[must_use]
    pub fn progress(&self) -> SessionProgress {
        SessionProgress {
            total: self.questions.len(),
            answered: self.answered_count(),
            flagged: self
                .questions
                .iter()
                .filter(|q| self.is_flagged(q.id()))
                .count(),
            percent: self.completion_percent(),
            remaining_seconds: self.remaining_seconds,
            is_running: self.running,
        }
    }

    /// Review-grid state; an answer wins over a flag.
    #[must_use]
    pub fn status_of(&self, index: usize) -> Option<QuestionStatus> {
        let question = self.questions.get(index)?;
        let status = if self.answers.contains_key(question.id()) {
            QuestionStatus::Answered
        } else if self.is_flagged(question.id()) {
            QuestionStatus::Flagged
        } else {
            QuestionStatus::Empty
        };
        Some(status)
    }

    #[must_use]
    pub fn review(&self) -> Vec<ReviewItem> {
        self.questions
            .iter()
            .enumerate()
            .filter_map(|(index, q)| {
                Some(ReviewItem {
                    index,
                    question_id: q.id().clone(),
                    kind: q.kind(),
                    prompt: q.prompt().to_owned(),
                    answer: self.answers.get(q.id()).cloned(),
                    flagged: self.is_flagged(q.id()),
                    status: self.status_of(index)?,
                })
            })
            .collect()
    }

    // ─── Submission ────────────────────────────────────────────────────────

    /// Grade the current answers without touching session state.
    #[must_use]
    pub fn result(&self, submitted_at: DateTime<Utc>) -> ExamResult {
        let score = scoring::score(&self.questions, &self.answers);
        ExamResult {
            score: score.correct,
            total: score.total,
            percentage: score.percentage,
            answers: self.answers.clone(),
            flags: self.flags.clone(),
            submitted_at,
        }
    }

    /// Stop the countdown while a submission is in flight.
    ///
    /// Returns whether it was running, to be handed back to [`Self::release`].
    pub fn hold(&mut self) -> bool {
        std::mem::replace(&mut self.running, false)
    }

    /// Restart a countdown stopped by [`Self::hold`] after the attempt was not
    /// accepted. Returns whether the countdown runs again.
    pub fn release(&mut self, was_running: bool) -> bool {
        if !was_running || self.expired || self.remaining_seconds == 0 || self.is_submitted() {
            return false;
        }
        self.running = true;
        true
    }

    /// Lock the session once its attempt has been accepted.
    pub fn mark_submitted(&mut self) {
        self.running = false;
        self.status = SessionStatus::Submitted;
    }

    /// Grade the answers and mark the session submitted in one step.
    ///
    /// Calling this again recomputes the result from current state.
    pub fn submit(&mut self, submitted_at: DateTime<Utc>) -> ExamResult {
        let result = self.result(submitted_at);
        self.mark_submitted();
        result
    }

    /// Drop all answers and flags held in memory.
    pub fn reset(&mut self) {
        self.answers.clear();
        self.flags.clear();
    }
}

impl fmt::Debug for ExamSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExamSession")
            .field("key", &self.key)
            .field("mode", &self.mode)
            .field("questions_len", &self.questions.len())
            .field("current", &self.current)
            .field("answers_len", &self.answers.len())
            .field("remaining_seconds", &self.remaining_seconds)
            .field("running", &self.running)
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use cbt_core::time::fixed_now;

    fn single(id: &str, correct: usize) -> Question {
        Question::new(
            id,
            QuestionKind::SingleChoice,
            format!("Question {id}"),
            vec!["a".into(), "b".into(), "c".into()],
        )
        .unwrap()
        .with_correct_answer(AnswerValue::Choice(correct))
    }

    fn session(mode: ExamMode, questions: Vec<Question>, minutes: u32) -> ExamSession {
        ExamSession::new(
            SessionKey::Practice,
            mode,
            questions,
            minutes,
            Answers::new(),
            Flags::new(),
        )
    }

    fn three() -> Vec<Question> {
        vec![single("q1", 0), single("q2", 0), single("q3", 0)]
    }

    #[test]
    fn start_state_follows_mode() {
        let timed = session(ExamMode::TimedExam, three(), 2);
        assert!(timed.is_running());
        assert_eq!(timed.remaining_seconds(), 120);
        assert_eq!(timed.current_index(), 0);

        let practice = session(ExamMode::Practice, three(), 2);
        assert!(!practice.is_running());
    }

    #[test]
    fn navigation_stays_in_range() {
        let mut s = session(ExamMode::Practice, three(), 1);
        s.previous();
        assert_eq!(s.current_index(), 0);
        for _ in 0..5 {
            s.next();
        }
        assert_eq!(s.current_index(), 2);
        s.jump_to(1);
        assert_eq!(s.current_index(), 1);
        s.jump_to(42);
        assert_eq!(s.current_index(), 2);
        s.previous();
        s.previous();
        s.previous();
        assert_eq!(s.current_index(), 0);
    }

    #[test]
    fn navigation_is_noop_without_questions() {
        let mut s = session(ExamMode::Practice, Vec::new(), 1);
        s.next();
        s.previous();
        s.jump_to(3);
        assert_eq!(s.current_index(), 0);
        assert!(s.current_question().is_none());
        assert_eq!(s.completion_percent(), 0);
        assert_eq!(s.toggle_current_flag().unwrap(), None);
    }

    #[test]
    fn recording_same_answer_twice_is_idempotent() {
        let mut s = session(ExamMode::Practice, three(), 1);
        s.record_answer(QuestionId::new("q1"), AnswerValue::Choice(2))
            .unwrap();
        let first = s.answers().clone();
        s.record_answer(QuestionId::new("q1"), AnswerValue::Choice(2))
            .unwrap();
        assert_eq!(s.answers(), &first);
    }

    #[test]
    fn unknown_question_is_rejected() {
        let mut s = session(ExamMode::Practice, three(), 1);
        let err = s
            .record_answer(QuestionId::new("nope"), AnswerValue::Choice(0))
            .unwrap_err();
        assert!(matches!(err, SessionError::UnknownQuestion(_)));
    }

    #[test]
    fn flag_toggles_through_cycle() {
        let mut s = session(ExamMode::Practice, three(), 1);
        let id = QuestionId::new("q2");
        assert!(!s.flags().contains_key(&id));
        assert!(s.toggle_flag(&id).unwrap());
        assert!(!s.toggle_flag(&id).unwrap());
        assert!(s.toggle_flag(&id).unwrap());
        assert_eq!(s.flags().get(&id), Some(&true));
    }

    #[test]
    fn completion_percent_rounds() {
        let mut s = session(ExamMode::Practice, three(), 1);
        assert_eq!(s.completion_percent(), 0);
        s.record_answer(QuestionId::new("q1"), AnswerValue::Choice(0))
            .unwrap();
        assert_eq!(s.completion_percent(), 33);
        s.record_answer(QuestionId::new("q2"), AnswerValue::Choice(0))
            .unwrap();
        assert_eq!(s.completion_percent(), 67);
    }

    #[test]
    fn submit_scores_single_choice() {
        let mut s = session(ExamMode::TimedExam, three(), 1);
        for (id, choice) in [("q1", 0), ("q2", 1), ("q3", 0)] {
            s.record_answer(QuestionId::new(id), AnswerValue::Choice(choice))
                .unwrap();
        }

        let result = s.submit(fixed_now());
        assert_eq!(result.score, 2);
        assert_eq!(result.total, 3);
        assert_eq!(result.percentage, 67);
        assert_eq!(result.submitted_at, fixed_now());
        assert!(!s.is_running());
        assert!(s.is_submitted());
    }

    #[test]
    fn submit_is_repeatable() {
        let mut s = session(ExamMode::Practice, three(), 1);
        s.record_answer(QuestionId::new("q1"), AnswerValue::Choice(0))
            .unwrap();
        let first = s.submit(fixed_now());
        let second = s.submit(fixed_now());
        assert_eq!(first, second);
    }

    #[test]
    fn grading_leaves_the_session_open() {
        let mut s = session(ExamMode::TimedExam, three(), 1);
        s.record_answer(QuestionId::new("q1"), AnswerValue::Choice(0))
            .unwrap();

        let result = s.result(fixed_now());
        assert_eq!(result.score, 1);
        assert!(!s.is_submitted());
        assert!(s.is_running());
        s.record_answer(QuestionId::new("q2"), AnswerValue::Choice(0))
            .unwrap();
    }

    #[test]
    fn held_countdown_is_released_only_with_time_left() {
        let mut s = session(ExamMode::TimedExam, three(), 1);
        let was_running = s.hold();
        assert!(was_running);
        assert!(!s.is_running());
        assert_eq!(s.tick(), TickOutcome::Idle);
        assert!(s.release(was_running));
        assert!(s.is_running());

        let mut paused = session(ExamMode::TimedExam, three(), 1);
        paused.pause().unwrap();
        let was_running = paused.hold();
        assert!(!paused.release(was_running));
        assert!(!paused.is_running());

        let mut done = session(ExamMode::TimedExam, three(), 0);
        assert_eq!(done.tick(), TickOutcome::Expired);
        assert!(!done.release(true));
    }

    #[test]
    fn submitted_session_rejects_edits_but_allows_review() {
        let mut s = session(ExamMode::TimedExam, three(), 1);
        s.submit(fixed_now());

        assert!(matches!(
            s.record_answer(QuestionId::new("q1"), AnswerValue::Choice(0)),
            Err(SessionError::Submitted)
        ));
        assert!(matches!(
            s.toggle_flag(&QuestionId::new("q1")),
            Err(SessionError::Submitted)
        ));
        assert!(matches!(s.resume(), Err(SessionError::Submitted)));

        s.jump_to(2);
        assert_eq!(s.current_index(), 2);
        assert_eq!(s.review().len(), 3);
    }

    #[test]
    fn tick_counts_down_and_expires_once() {
        let mut s = session(ExamMode::TimedExam, three(), 0);
        assert_eq!(s.tick(), TickOutcome::Expired);
        assert_eq!(s.tick(), TickOutcome::Idle);
        assert!(!s.resume().unwrap());

        let mut s = session(ExamMode::TimedExam, three(), 1);
        assert_eq!(
            s.tick(),
            TickOutcome::Ticked {
                remaining_seconds: 59
            }
        );
        for _ in 0..58 {
            assert!(matches!(s.tick(), TickOutcome::Ticked { .. }));
        }
        assert_eq!(s.tick(), TickOutcome::Expired);
        assert_eq!(s.remaining_seconds(), 0);
        assert_eq!(s.tick(), TickOutcome::Idle);
    }

    #[test]
    fn pause_and_resume() {
        let mut s = session(ExamMode::TimedExam, three(), 1);
        assert!(s.pause().unwrap());
        assert_eq!(s.tick(), TickOutcome::Idle);
        assert_eq!(s.remaining_seconds(), 60);
        assert!(!s.pause().unwrap());
        assert!(s.resume().unwrap());
        assert!(s.is_running());
        assert_eq!(s.remaining_seconds(), 60);
    }

    #[test]
    fn practice_ignores_pause_and_resume() {
        let mut s = session(ExamMode::Practice, three(), 1);
        assert!(!s.pause().unwrap());
        assert!(!s.resume().unwrap());
        assert_eq!(s.tick(), TickOutcome::Idle);
    }

    #[test]
    fn status_prefers_answer_over_flag() {
        let mut s = session(ExamMode::Practice, three(), 1);
        s.toggle_flag(&QuestionId::new("q1")).unwrap();
        s.record_answer(QuestionId::new("q1"), AnswerValue::Choice(0))
            .unwrap();
        s.toggle_flag(&QuestionId::new("q2")).unwrap();

        assert_eq!(s.status_of(0), Some(QuestionStatus::Answered));
        assert_eq!(s.status_of(1), Some(QuestionStatus::Flagged));
        assert_eq!(s.status_of(2), Some(QuestionStatus::Empty));
        assert_eq!(s.status_of(3), None);

        let progress = s.progress();
        assert_eq!(progress.answered, 1);
        assert_eq!(progress.flagged, 2);
    }

    #[test]
    fn reset_clears_answers_and_flags() {
        let mut s = session(ExamMode::Practice, three(), 1);
        s.record_answer(QuestionId::new("q1"), AnswerValue::Choice(0))
            .unwrap();
        s.toggle_flag(&QuestionId::new("q1")).unwrap();
        s.reset();
        assert!(s.answers().is_empty());
        assert!(s.flags().is_empty());
    }
}
