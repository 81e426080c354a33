//! Shared error types for the services crate.

use thiserror::Error;

use cbt_core::model::{AttemptError, QuestionId};
use storage::repository::StorageError;

/// Errors emitted by the exam session controller.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SessionError {
    #[error("session already submitted")]
    Submitted,
    #[error("question {0} is not part of this session")]
    UnknownQuestion(QuestionId),
    #[error(transparent)]
    Attempt(#[from] AttemptError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted by `AttemptService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AttemptServiceError {
    #[error(transparent)]
    Storage(#[from] StorageError),
}
