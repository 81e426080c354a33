use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::answer::AnswerValue;
use crate::model::ids::QuestionId;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum QuestionError {
    #[error("question id cannot be empty")]
    EmptyId,

    #[error("question {id} has no prompt")]
    EmptyPrompt { id: String },

    #[error("question {id} is choice-based but has no choices")]
    MissingChoices { id: String },

    #[error("free-text question {id} cannot carry choices")]
    UnexpectedChoices { id: String },

    #[error("question {id} is listed more than once")]
    DuplicateId { id: String },
}

//
// ─── KIND ──────────────────────────────────────────────────────────────────────
//

/// The presentation kind of a question.
///
/// Serialized names match the question files authored for the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QuestionKind {
    #[serde(rename = "mcq")]
    SingleChoice,
    #[serde(rename = "checkbox")]
    MultiChoice,
    #[serde(rename = "truefalse")]
    TrueFalse,
    #[serde(rename = "text")]
    FreeText,
}

impl QuestionKind {
    /// Whether answers of this kind are graded automatically on submission.
    #[must_use]
    pub fn is_auto_scored(self) -> bool {
        matches!(self, QuestionKind::SingleChoice | QuestionKind::TrueFalse)
    }

    #[must_use]
    pub fn is_choice_based(self) -> bool {
        !matches!(self, QuestionKind::FreeText)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            QuestionKind::SingleChoice => "mcq",
            QuestionKind::MultiChoice => "checkbox",
            QuestionKind::TrueFalse => "truefalse",
            QuestionKind::FreeText => "text",
        }
    }
}

//
// ─── QUESTION ──────────────────────────────────────────────────────────────────
//

/// Unvalidated question as read from a question source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionDraft {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: QuestionKind,
    #[serde(rename = "question")]
    pub prompt: String,
    #[serde(default)]
    pub choices: Vec<String>,
    #[serde(rename = "answer", default)]
    pub correct_answer: Option<AnswerValue>,
    #[serde(default)]
    pub points: Option<u32>,
}

impl QuestionDraft {
    /// Validate the draft into an immutable `Question`.
    ///
    /// True/false questions without explicit choices get `True`/`False`.
    ///
    /// # Errors
    ///
    /// Returns `QuestionError` if the id or prompt is blank, or if the choices
    /// do not fit the kind.
    pub fn validate(self) -> Result<Question, QuestionError> {
        let id = self.id.trim().to_owned();
        if id.is_empty() {
            return Err(QuestionError::EmptyId);
        }
        if self.prompt.trim().is_empty() {
            return Err(QuestionError::EmptyPrompt { id });
        }

        let choices = match self.kind {
            QuestionKind::FreeText if !self.choices.is_empty() => {
                return Err(QuestionError::UnexpectedChoices { id });
            }
            QuestionKind::TrueFalse if self.choices.is_empty() => {
                vec!["True".to_owned(), "False".to_owned()]
            }
            kind if kind.is_choice_based() && self.choices.is_empty() => {
                return Err(QuestionError::MissingChoices { id });
            }
            _ => self.choices,
        };

        Ok(Question {
            id: QuestionId::new(id),
            kind: self.kind,
            prompt: self.prompt,
            choices,
            correct_answer: self.correct_answer,
            points: self.points,
        })
    }
}

/// A question presented during an exam session. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Question {
    id: QuestionId,
    kind: QuestionKind,
    prompt: String,
    choices: Vec<String>,
    correct_answer: Option<AnswerValue>,
    points: Option<u32>,
}

impl Question {
    /// Build a question without a reference answer.
    ///
    /// # Errors
    ///
    /// See [`QuestionDraft::validate`].
    pub fn new(
        id: impl Into<String>,
        kind: QuestionKind,
        prompt: impl Into<String>,
        choices: Vec<String>,
    ) -> Result<Self, QuestionError> {
        QuestionDraft {
            id: id.into(),
            kind,
            prompt: prompt.into(),
            choices,
            correct_answer: None,
            points: None,
        }
        .validate()
    }

    /// Attach the reference answer used for automatic scoring.
    #[must_use]
    pub fn with_correct_answer(mut self, answer: AnswerValue) -> Self {
        self.correct_answer = Some(answer);
        self
    }

    #[must_use]
    pub fn with_points(mut self, points: u32) -> Self {
        self.points = Some(points);
        self
    }

    #[must_use]
    pub fn id(&self) -> &QuestionId {
        &self.id
    }

    #[must_use]
    pub fn kind(&self) -> QuestionKind {
        self.kind
    }

    #[must_use]
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    #[must_use]
    pub fn choices(&self) -> &[String] {
        &self.choices
    }

    #[must_use]
    pub fn correct_answer(&self) -> Option<&AnswerValue> {
        self.correct_answer.as_ref()
    }

    #[must_use]
    pub fn points(&self) -> Option<u32> {
        self.points
    }
}

/// Validate a whole question list, rejecting duplicate ids.
///
/// # Errors
///
/// Returns the first `QuestionError` encountered.
pub fn validate_questions(
    drafts: impl IntoIterator<Item = QuestionDraft>,
) -> Result<Vec<Question>, QuestionError> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for draft in drafts {
        let question = draft.validate()?;
        if !seen.insert(question.id().clone()) {
            return Err(QuestionError::DuplicateId {
                id: question.id().to_string(),
            });
        }
        out.push(question);
    }
    Ok(out)
}
