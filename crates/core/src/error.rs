use thiserror::Error;

use crate::model::{AttemptError, ParseIdError, QuestionError};

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Question(#[from] QuestionError),
    #[error(transparent)]
    Attempt(#[from] AttemptError),
    #[error(transparent)]
    ParseId(#[from] ParseIdError),
}
