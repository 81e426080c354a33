use cbt_core::model::{AttemptId, ExamResult};

/// What caused a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitTrigger {
    Manual,
    Timeout,
}

/// A result accepted by the submission sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionReceipt {
    pub attempt_id: AttemptId,
    pub result: ExamResult,
}

/// Notifications pushed to whoever renders the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Tick { remaining_seconds: u32 },
    Paused,
    Resumed,
    Submitted {
        trigger: SubmitTrigger,
        receipt: SubmissionReceipt,
    },
    SubmitFailed {
        trigger: SubmitTrigger,
        error: String,
    },
    Reset,
    Closed,
}
