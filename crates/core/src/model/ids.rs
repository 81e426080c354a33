use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Error type for parsing an ID from a string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseIdError {
    kind: &'static str,
}

impl fmt::Display for ParseIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to parse {} from string: value is blank", self.kind)
    }
}

impl std::error::Error for ParseIdError {}

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({:?})"), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $name {
            type Err = ParseIdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    return Err(ParseIdError {
                        kind: stringify!($name),
                    });
                }
                Ok(Self::new(trimmed))
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self::new(value)
            }
        }
    };
}

string_id!(
    /// Identifier of a question, unique within one exam session.
    QuestionId
);
string_id!(
    /// Identifier of a published exam.
    ExamId
);
string_id!(
    /// Identifier of the student taking an exam.
    StudentId
);
string_id!(
    /// Identifier of the course an exam belongs to.
    CourseId
);

/// Storage identifier for a submitted attempt.
///
/// NOTE: This is `i64` to match `SQLite` row IDs.
pub type AttemptId = i64;

/// Key under which a session's answers and flags are checkpointed.
///
/// Sessions for a published exam are keyed by the exam id; practice sessions
/// without an exam share the `practice` slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SessionKey {
    Exam(ExamId),
    Practice,
}

impl SessionKey {
    pub const PRACTICE: &'static str = "practice";

    #[must_use]
    pub fn for_exam(exam_id: Option<&ExamId>) -> Self {
        exam_id.map_or(Self::Practice, |id| Self::Exam(id.clone()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            SessionKey::Exam(id) => id.as_str(),
            SessionKey::Practice => Self::PRACTICE,
        }
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
