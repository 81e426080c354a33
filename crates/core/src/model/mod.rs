mod answer;
mod attempt;
mod exam;
mod ids;
mod question;

pub use answer::{AnswerValue, Answers, Flags};
pub use attempt::{AttemptError, AttemptRecord, ExamResult};
pub use exam::{DEFAULT_DURATION_MINUTES, ExamInfo, ExamMode};
pub use ids::{AttemptId, CourseId, ExamId, ParseIdError, QuestionId, SessionKey, StudentId};
pub use question::{Question, QuestionDraft, QuestionError, QuestionKind, validate_questions};
