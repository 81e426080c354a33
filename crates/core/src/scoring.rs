//! Automatic grading of a submitted answer sheet.
//!
//! Only single-choice and true/false questions are graded here. Multi-choice
//! and free-text answers need a human or external grader, so they never add to
//! the score but still count toward the total.

use crate::model::{Answers, Question};

/// Result of grading an answer sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Score {
    pub correct: u32,
    pub total: u32,
    pub percentage: u32,
}

/// Integer percentage `round(100 * part / whole)`, or 0 when `whole` is 0.
///
/// Halves round up, matching what a learner sees on screen.
#[must_use]
pub fn percent(part: usize, whole: usize) -> u32 {
    if whole == 0 {
        return 0;
    }
    let part = part as u128;
    let whole = whole as u128;
    let rounded = (200 * part + whole) / (2 * whole);
    u32::try_from(rounded).unwrap_or(u32::MAX)
}

/// Share of questions that have a recorded answer.
#[must_use]
pub fn completion_percent(answered: usize, total: usize) -> u32 {
    percent(answered, total)
}

/// Grade `answers` against the reference answers in `questions`.
///
/// Comparison is strict: a recorded `Choice(0)` never matches a reference
/// `Text("0")`.
#[must_use]
pub fn score(questions: &[Question], answers: &Answers) -> Score {
    let correct = questions
        .iter()
        .filter(|q| q.kind().is_auto_scored())
        .filter(|q| match (answers.get(q.id()), q.correct_answer()) {
            (Some(given), Some(expected)) => given == expected,
            _ => false,
        })
        .count();

    let total = questions.len();
    Score {
        correct: u32::try_from(correct).unwrap_or(u32::MAX),
        total: u32::try_from(total).unwrap_or(u32::MAX),
        percentage: percent(correct, total),
    }
}
