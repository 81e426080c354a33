use cbt_core::model::{AnswerValue, Question, QuestionKind};
use thiserror::Error;

const ARROW_LEFT: &str = "\u{1b}[D";
const ARROW_RIGHT: &str = "\u{1b}[C";

/// One line typed at the session prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Previous,
    Next,
    Flag,
    Review,
    /// Zero-based target.
    Goto(usize),
    /// Raw answer text, interpreted against the current question.
    Answer(String),
    Pause,
    Resume,
    Submit,
    Reset,
    Close,
    Help,
    /// Blank line: redraw the current question.
    Show,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum CommandError {
    #[error("unknown command `{0}`, type `help` for a list")]
    Unknown(String),
    #[error("`{0}` needs an argument")]
    MissingArgument(&'static str),
    #[error("`{0}` is not a question number")]
    BadQuestionNumber(String),
    #[error("`{raw}` does not match any choice (1-{count})")]
    NoSuchChoice { raw: String, count: usize },
}

pub const HELP: &str = "\
commands:
  n, ->        next question
  p, <-        previous question
  f            flag / unflag the current question
  s            review answers and flags
  goto N       jump to question N
  a ANSWER     answer: choice number or text, `1,3` for checkboxes
  pause        pause the countdown
  resume       resume the countdown
  submit       submit the attempt
  reset        erase all answers and flags (asks first)
  close        leave without submitting
  help         this list";

/// Parse one input line.
///
/// # Errors
///
/// Returns `CommandError` for unknown words or malformed arguments.
pub fn parse_line(line: &str) -> Result<Command, CommandError> {
    let line = line.trim();
    match line {
        "" => return Ok(Command::Show),
        ARROW_LEFT => return Ok(Command::Previous),
        ARROW_RIGHT => return Ok(Command::Next),
        _ => {}
    }

    let (word, rest) = line
        .split_once(char::is_whitespace)
        .map_or((line, ""), |(w, r)| (w, r.trim()));

    match word.to_ascii_lowercase().as_str() {
        "p" | "prev" | "previous" => Ok(Command::Previous),
        "n" | "next" => Ok(Command::Next),
        "f" | "flag" => Ok(Command::Flag),
        "s" | "review" => Ok(Command::Review),
        "goto" | "g" => {
            if rest.is_empty() {
                return Err(CommandError::MissingArgument("goto"));
            }
            match rest.parse::<usize>() {
                Ok(n) if n > 0 => Ok(Command::Goto(n - 1)),
                _ => Err(CommandError::BadQuestionNumber(rest.to_owned())),
            }
        }
        "a" | "answer" => {
            if rest.is_empty() {
                Err(CommandError::MissingArgument("a"))
            } else {
                Ok(Command::Answer(rest.to_owned()))
            }
        }
        "pause" => Ok(Command::Pause),
        "resume" => Ok(Command::Resume),
        "submit" => Ok(Command::Submit),
        "reset" => Ok(Command::Reset),
        "close" | "quit" | "q" => Ok(Command::Close),
        "help" | "h" | "?" => Ok(Command::Help),
        _ => Err(CommandError::Unknown(word.to_owned())),
    }
}

/// Interpret answer text for a question.
///
/// Choice questions take a 1-based number or the choice text (case is
/// ignored). Checkbox questions take a comma-separated list of either.
/// Free-text questions take the text verbatim.
///
/// # Errors
///
/// Returns `CommandError::NoSuchChoice` when a choice cannot be resolved.
pub fn parse_answer(question: &Question, raw: &str) -> Result<AnswerValue, CommandError> {
    match question.kind() {
        QuestionKind::FreeText => Ok(AnswerValue::text(raw)),
        QuestionKind::SingleChoice | QuestionKind::TrueFalse => {
            resolve_choice(question.choices(), raw).map(AnswerValue::Choice)
        }
        QuestionKind::MultiChoice => {
            let choices = question.choices();
            let picked = raw
                .split(',')
                .map(str::trim)
                .filter(|part| !part.is_empty())
                .map(|part| resolve_choice(choices, part).map(|i| choices[i].clone()))
                .collect::<Result<Vec<_>, _>>()?;
            if picked.is_empty() {
                return Err(CommandError::MissingArgument("a"));
            }
            Ok(AnswerValue::choices(picked))
        }
    }
}

fn resolve_choice(choices: &[String], raw: &str) -> Result<usize, CommandError> {
    let raw = raw.trim();
    if let Ok(n) = raw.parse::<usize>() {
        if (1..=choices.len()).contains(&n) {
            return Ok(n - 1);
        }
    } else if let Some(index) = choices.iter().position(|c| c.eq_ignore_ascii_case(raw)) {
        return Ok(index);
    }
    Err(CommandError::NoSuchChoice {
        raw: raw.to_owned(),
        count: choices.len(),
    })
}
