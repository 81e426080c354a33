use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::model::ids::QuestionId;

/// A recorded answer.
///
/// The shape depends on the question kind (text for free-text, a choice index
/// for single-choice and true/false, a set of choice labels for multi-choice),
/// but sessions treat it opaquely. Serialized untagged so a checkpoint reads as
/// plain JSON: `"text"`, `2`, `["a", "b"]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnswerValue {
    Choice(usize),
    Text(String),
    Choices(BTreeSet<String>),
}

impl AnswerValue {
    #[must_use]
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    #[must_use]
    pub fn choices<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Choices(labels.into_iter().map(Into::into).collect())
    }
}

impl fmt::Display for AnswerValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnswerValue::Choice(idx) => write!(f, "#{idx}"),
            AnswerValue::Text(text) => write!(f, "{text:?}"),
            AnswerValue::Choices(labels) => {
                f.write_str("[")?;
                for (i, label) in labels.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{label:?}")?;
                }
                f.write_str("]")
            }
        }
    }
}

/// Answers keyed by question; absence means "unanswered".
pub type Answers = BTreeMap<QuestionId, AnswerValue>;

/// Marked-for-review flags keyed by question; present once toggled at least once.
pub type Flags = BTreeMap<QuestionId, bool>;
