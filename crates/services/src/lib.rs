#![forbid(unsafe_code)]

pub mod attempts;
pub mod error;
pub mod exam;

pub use cbt_core::Clock;

pub use attempts::{AttemptListItem, AttemptService};
pub use error::{AttemptServiceError, SessionError};
pub use exam::{
    ExamService, ExamSession, ExamSessionController, QuestionStatus, ReviewItem, SessionConfig,
    SessionEvent, SessionProgress, SessionSnapshot, SessionStatus, SubmissionReceipt,
    SubmitTrigger,
};
