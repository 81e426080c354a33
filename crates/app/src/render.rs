use std::fmt::Write as _;

use cbt_core::model::{AnswerValue, Question, QuestionKind};
use cbt_core::time::format_countdown;
use services::{
    AttemptListItem, QuestionStatus, ReviewItem, SessionEvent, SessionProgress, SubmissionReceipt,
    SubmitTrigger,
};

/// `Question 2 of 5 | 40% complete | 9:58` (or `paused`, `practice`).
pub fn header(index: usize, progress: &SessionProgress, timed: bool) -> String {
    let clock = if !timed {
        "practice".to_owned()
    } else if progress.is_running {
        format_countdown(progress.remaining_seconds)
    } else {
        format!("{} paused", format_countdown(progress.remaining_seconds))
    };
    format!(
        "Question {} of {} | {}% complete | {clock}",
        index + 1,
        progress.total,
        progress.percent,
    )
}

pub fn question(q: &Question, answer: Option<&AnswerValue>, flagged: bool) -> String {
    let mut out = String::new();
    let marker = if flagged { " [flagged]" } else { "" };
    let _ = writeln!(out, "{}{marker}", q.prompt());

    for (i, choice) in q.choices().iter().enumerate() {
        let picked = match (answer, q.kind()) {
            (Some(AnswerValue::Choice(idx)), _) => *idx == i,
            (Some(AnswerValue::Choices(labels)), QuestionKind::MultiChoice) => {
                labels.contains(choice)
            }
            _ => false,
        };
        let bullet = if picked { '*' } else { ' ' };
        let _ = writeln!(out, "  {bullet} {}. {choice}", i + 1);
    }
    if let (QuestionKind::FreeText, Some(AnswerValue::Text(text))) = (q.kind(), answer) {
        let _ = writeln!(out, "  > {text}");
    }
    out
}

fn status_label(status: QuestionStatus) -> &'static str {
    match status {
        QuestionStatus::Answered => "answered",
        QuestionStatus::Flagged => "flagged",
        QuestionStatus::Empty => "empty",
    }
}

/// Review-and-submit grid, one line per question.
pub fn review(items: &[ReviewItem]) -> String {
    let mut out = String::new();
    for item in items {
        let flag = if item.flagged { " (flagged)" } else { "" };
        let answer = item
            .answer
            .as_ref()
            .map_or_else(|| "-".to_owned(), ToString::to_string);
        let _ = writeln!(
            out,
            "{:>3}. [{}] {}  answer: {answer}{flag}",
            item.index + 1,
            status_label(item.status),
            item.prompt,
        );
    }
    out
}

pub fn receipt(receipt: &SubmissionReceipt) -> String {
    format!(
        "Submitted attempt #{}: {}/{} correct ({}%)",
        receipt.attempt_id, receipt.result.score, receipt.result.total, receipt.result.percentage
    )
}

/// One-line notice for events the prompt loop did not cause itself.
pub fn event(event: &SessionEvent) -> Option<String> {
    match event {
        SessionEvent::Tick { remaining_seconds } if *remaining_seconds == 60 => {
            Some("One minute left.".to_owned())
        }
        SessionEvent::Submitted {
            trigger: SubmitTrigger::Timeout,
            receipt: r,
        } => Some(format!("Time is up. {}", receipt(r))),
        SessionEvent::SubmitFailed {
            trigger: SubmitTrigger::Timeout,
            error,
        } => Some(format!(
            "Time is up, but the attempt was not recorded: {error}. Type `submit` to retry."
        )),
        _ => None,
    }
}

pub fn history(items: &[AttemptListItem]) -> String {
    if items.is_empty() {
        return "No attempts yet.\n".to_owned();
    }
    let mut out = String::new();
    for item in items {
        let exam = item.exam_id.as_ref().map_or("practice", |id| id.as_str());
        let _ = writeln!(
            out,
            "#{:<4} {}  {exam:<16} {}/{} ({}%)  answered {} flagged {}",
            item.id,
            item.submitted_at.format("%Y-%m-%d %H:%M"),
            item.score,
            item.total,
            item.percentage,
            item.answered,
            item.flagged,
        );
    }
    out
}
