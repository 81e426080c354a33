mod checkpoint;
mod controller;
mod countdown;
mod events;
mod service;
mod session;

// Public API of the exam subsystem.
pub use crate::error::SessionError;
pub use controller::{ExamSessionController, SessionConfig, SessionSnapshot};
pub use countdown::{Countdown, TICK_PERIOD};
pub use events::{SessionEvent, SubmissionReceipt, SubmitTrigger};
pub use service::ExamService;
pub use session::{
    ExamSession, QuestionStatus, ReviewItem, SessionProgress, SessionStatus, TickOutcome,
};
