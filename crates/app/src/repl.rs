use std::io::Write;

use services::{ExamSessionController, SessionEvent, SubmitTrigger};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::broadcast::error::RecvError;

use crate::commands::{self, Command, HELP};
use crate::render;

type Error = Box<dyn std::error::Error>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Finished,
}

struct Prompt<'a, W> {
    session: &'a ExamSessionController,
    out: &'a mut W,
    confirming_reset: bool,
}

impl<W: Write> Prompt<'_, W> {
    fn show(&mut self) -> Result<(), Error> {
        let snap = self.session.snapshot();
        writeln!(
            self.out,
            "\n{}",
            render::header(snap.current_index, &snap.progress, snap.mode.is_timed())
        )?;
        match &snap.current_question {
            Some(q) => {
                let flagged = snap.flags.get(q.id()).copied().unwrap_or(false);
                write!(
                    self.out,
                    "{}",
                    render::question(q, snap.answers.get(q.id()), flagged)
                )?;
            }
            None => writeln!(self.out, "This exam has no questions.")?,
        }
        Ok(())
    }

    fn review(&mut self) -> Result<(), Error> {
        write!(self.out, "{}", render::review(&self.session.review()))?;
        let progress = self.session.progress();
        writeln!(
            self.out,
            "{} of {} answered, {} flagged",
            progress.answered, progress.total, progress.flagged
        )?;
        Ok(())
    }

    async fn on_line(&mut self, line: &str) -> Result<Flow, Error> {
        if std::mem::take(&mut self.confirming_reset) {
            if line.trim().eq_ignore_ascii_case("yes") {
                match self.session.reset().await {
                    Ok(()) => writeln!(self.out, "All answers and flags erased.")?,
                    Err(err) => writeln!(self.out, "Reset failed: {err}")?,
                }
            } else {
                writeln!(self.out, "Reset cancelled.")?;
            }
            return Ok(Flow::Continue);
        }

        let command = match commands::parse_line(line) {
            Ok(command) => command,
            Err(err) => {
                writeln!(self.out, "{err}")?;
                return Ok(Flow::Continue);
            }
        };
        tracing::trace!(?command, "prompt command");

        match command {
            Command::Previous => {
                self.session.previous();
                self.show()?;
            }
            Command::Next => {
                self.session.next();
                self.show()?;
            }
            Command::Goto(index) => {
                self.session.jump_to(index);
                self.show()?;
            }
            Command::Show => self.show()?,
            Command::Flag => match self.session.toggle_current_flag() {
                Ok(Some(true)) => writeln!(self.out, "Flagged for review.")?,
                Ok(Some(false)) => writeln!(self.out, "Flag removed.")?,
                Ok(None) => writeln!(self.out, "Nothing to flag.")?,
                Err(err) => writeln!(self.out, "{err}")?,
            },
            Command::Review => self.review()?,
            Command::Answer(raw) => {
                let Some(question) = self.session.current_question() else {
                    writeln!(self.out, "Nothing to answer.")?;
                    return Ok(Flow::Continue);
                };
                let saved = commands::parse_answer(&question, &raw)
                    .map_err(|e| e.to_string())
                    .and_then(|value| {
                        self.session
                            .record_answer(question.id().clone(), value)
                            .map_err(|e| e.to_string())
                    });
                match saved {
                    Ok(()) => self.show()?,
                    Err(err) => writeln!(self.out, "{err}")?,
                }
            }
            Command::Pause => match self.session.pause() {
                Ok(()) => self.show()?,
                Err(err) => writeln!(self.out, "{err}")?,
            },
            Command::Resume => match self.session.resume() {
                Ok(()) => self.show()?,
                Err(err) => writeln!(self.out, "{err}")?,
            },
            Command::Submit => match self.session.submit().await {
                Ok(receipt) => {
                    writeln!(self.out, "{}", render::receipt(&receipt))?;
                    self.review()?;
                    return Ok(Flow::Finished);
                }
                Err(err) => writeln!(
                    self.out,
                    "Submission failed: {err}. Your answers are kept; type `submit` to retry."
                )?,
            },
            Command::Reset => {
                self.confirming_reset = true;
                writeln!(
                    self.out,
                    "Erase every answer and flag in this exam? Type `yes` to confirm."
                )?;
            }
            Command::Close => {
                writeln!(self.out, "Progress saved. Come back any time.")?;
                return Ok(Flow::Finished);
            }
            Command::Help => writeln!(self.out, "{HELP}")?,
        }
        Ok(Flow::Continue)
    }
}

/// Drive one session from line input until it is submitted, closed, or the
/// input ends. The session is closed (never submitted) on the way out.
///
/// # Errors
///
/// Returns I/O errors from reading input or writing output.
pub async fn run<R, W>(
    session: ExamSessionController,
    input: R,
    out: &mut W,
) -> Result<(), Error>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let mut events = session.subscribe();
    let mut lines = input.lines();
    let mut prompt = Prompt {
        session: &session,
        out,
        confirming_reset: false,
    };
    prompt.show()?;

    loop {
        prompt.out.flush()?;
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if prompt.on_line(&line).await? == Flow::Finished {
                    break;
                }
            }
            event = events.recv() => match event {
                Ok(event) => {
                    if let Some(notice) = render::event(&event) {
                        writeln!(prompt.out, "\n{notice}")?;
                    }
                    if matches!(
                        event,
                        SessionEvent::Submitted { trigger: SubmitTrigger::Timeout, .. }
                    ) {
                        break;
                    }
                }
                Err(RecvError::Lagged(missed)) => {
                    tracing::debug!(missed, "prompt fell behind session events");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    prompt.out.flush()?;
    session.close().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cbt_core::model::{AnswerValue, ExamId, ExamInfo, Question, QuestionKind, StudentId};
    use cbt_core::time::fixed_clock;
    use services::ExamService;
    use std::sync::Arc;
    use std::time::Duration;
    use storage::repository::{AttemptRepository, InMemoryRepository};

    fn questions() -> Vec<Question> {
        let capital = Question::new(
            "q1",
            QuestionKind::SingleChoice,
            "Capital of France?",
            vec!["Berlin".into(), "Paris".into()],
        )
        .unwrap()
        .with_correct_answer(AnswerValue::Choice(1));
        let sky = Question::new("q2", QuestionKind::TrueFalse, "The sky is green.", Vec::new())
            .unwrap()
            .with_correct_answer(AnswerValue::Choice(1));
        vec![capital, sky]
    }

    fn service(repo: &InMemoryRepository) -> ExamService {
        ExamService::new(fixed_clock(), Arc::new(repo.clone()), Arc::new(repo.clone()))
    }

    fn exam(minutes: u32) -> ExamInfo {
        ExamInfo {
            id: ExamId::new("geo"),
            title: "Geography".into(),
            course_id: None,
            duration_minutes: Some(minutes),
        }
    }

    async fn drive(session: ExamSessionController, script: &str) -> String {
        let mut out = Vec::new();
        run(session, script.as_bytes(), &mut out).await.unwrap();
        String::from_utf8(out).unwrap()
    }

    #[tokio::test]
    async fn answering_and_submitting() {
        let repo = InMemoryRepository::new();
        let session = service(&repo)
            .start_practice(StudentId::new("s1"), questions())
            .await;

        let out = drive(session, "a paris\nn\na 1\nf\ns\nsubmit\nn\n").await;

        assert!(out.contains("Submitted attempt #1: 1/2 correct (50%)"));
        assert!(out.contains("Flagged for review."));
        assert!(out.contains("2 of 2 answered, 1 flagged"));
        let rows = repo
            .list_attempts_for_student(&StudentId::new("s1"), 10)
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn reset_needs_confirmation() {
        let repo = InMemoryRepository::new();
        let session = service(&repo)
            .start_practice(StudentId::new("s1"), questions())
            .await;

        let out = drive(session, "a 2\nreset\nno\nreset\nyes\nclose\n").await;

        assert!(out.contains("Reset cancelled."));
        assert!(out.contains("All answers and flags erased."));
        assert!(out.contains("Progress saved."));
        assert!(
            repo.list_attempts_for_student(&StudentId::new("s1"), 10)
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn bad_input_is_reported_and_ignored() {
        let repo = InMemoryRepository::new();
        let session = service(&repo)
            .start_practice(StudentId::new("s1"), questions())
            .await;

        let out = drive(session, "jump\na 7\ngoto 2\n").await;

        assert!(out.contains("unknown command `jump`"));
        assert!(out.contains("does not match any choice (1-2)"));
        assert!(out.contains("Question 2 of 2"));
    }

    #[tokio::test]
    async fn end_of_input_keeps_progress_without_submitting() {
        let repo = InMemoryRepository::new();
        let svc = service(&repo);
        let session = svc.start_exam(&exam(10), StudentId::new("s1"), questions()).await;

        drive(session, "a 2\n").await;

        let again = svc.start_exam(&exam(10), StudentId::new("s1"), questions()).await;
        assert_eq!(again.answers().len(), 1);
        assert!(
            repo.list_attempts_for_exam(&ExamId::new("geo"), 10)
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_ends_the_prompt() {
        let repo = InMemoryRepository::new();
        let session = service(&repo)
            .start_exam(&exam(0), StudentId::new("s1"), questions())
            .await;

        let (reader, _writer) = tokio::io::duplex(64);
        let input = tokio::io::BufReader::new(reader);
        let mut out = Vec::new();
        tokio::time::timeout(Duration::from_secs(5), run(session, input, &mut out))
            .await
            .unwrap()
            .unwrap();

        let out = String::from_utf8(out).unwrap();
        assert!(out.contains("Time is up. Submitted attempt #1: 0/2 correct (0%)"));
    }
}
