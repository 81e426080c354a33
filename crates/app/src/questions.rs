use std::path::{Path, PathBuf};

use cbt_core::model::{ExamInfo, Question, QuestionDraft, QuestionError, validate_questions};
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum QuestionFileError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("malformed question file: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Question(#[from] QuestionError),
    #[error("question file has no questions")]
    Empty,
}

#[derive(Debug, Deserialize)]
struct QuestionFile {
    #[serde(default)]
    exam: Option<ExamInfo>,
    questions: Vec<QuestionDraft>,
}

/// A validated question set, with the exam it belongs to when published.
#[derive(Debug, Clone)]
pub struct QuestionSet {
    pub exam: Option<ExamInfo>,
    pub questions: Vec<Question>,
}

/// Parse a question file body.
///
/// # Errors
///
/// Returns `QuestionFileError` on malformed JSON, invalid questions, or an
/// empty list.
pub fn parse(body: &str) -> Result<QuestionSet, QuestionFileError> {
    let file: QuestionFile = serde_json::from_str(body)?;
    if file.questions.is_empty() {
        return Err(QuestionFileError::Empty);
    }
    let questions = validate_questions(file.questions)?;
    Ok(QuestionSet {
        exam: file.exam,
        questions,
    })
}

/// Read and parse a question file from disk.
///
/// # Errors
///
/// See [`parse`]; I/O failures are reported with the offending path.
pub fn load(path: &Path) -> Result<QuestionSet, QuestionFileError> {
    let body = std::fs::read_to_string(path).map_err(|source| QuestionFileError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let set = parse(&body)?;
    tracing::debug!(
        path = %path.display(),
        questions = set.questions.len(),
        exam = set.exam.as_ref().map(|e| e.id.as_str()),
        "question file loaded"
    );
    Ok(set)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cbt_core::model::{AnswerValue, ExamId, QuestionKind};

    const BIOLOGY: &str = r#"{
        "exam": { "id": "bio-101", "title": "Cells", "courseId": "bio", "duration": 15 },
        "questions": [
            { "id": "q1", "type": "mcq", "question": "Powerhouse of the cell?",
              "choices": ["Nucleus", "Mitochondria"], "answer": 1 },
            { "id": "q2", "type": "truefalse", "question": "Plants have cell walls.", "answer": 0 },
            { "id": "q3", "type": "text", "question": "Define osmosis." }
        ]
    }"#;

    #[test]
    fn parses_exam_and_questions() {
        let set = parse(BIOLOGY).unwrap();
        let exam = set.exam.unwrap();
        assert_eq!(exam.id, ExamId::new("bio-101"));
        assert_eq!(exam.duration_minutes, Some(15));
        assert_eq!(set.questions.len(), 3);
        assert_eq!(set.questions[0].correct_answer(), Some(&AnswerValue::Choice(1)));
        assert_eq!(set.questions[1].choices(), ["True", "False"]);
        assert_eq!(set.questions[2].kind(), QuestionKind::FreeText);
    }

    #[test]
    fn exam_block_is_optional() {
        let set = parse(r#"{ "questions": [ { "id": "q", "type": "text", "question": "?" } ] }"#)
            .unwrap();
        assert!(set.exam.is_none());
    }

    #[test]
    fn rejects_empty_and_invalid_sets() {
        assert!(matches!(
            parse(r#"{ "questions": [] }"#),
            Err(QuestionFileError::Empty)
        ));
        assert!(matches!(
            parse(r#"{ "questions": [ { "id": "q", "type": "mcq", "question": "?" } ] }"#),
            Err(QuestionFileError::Question(QuestionError::MissingChoices { .. }))
        ));
        assert!(matches!(parse("{"), Err(QuestionFileError::Json(_))));
    }

    #[test]
    fn missing_file_names_the_path() {
        let err = load(Path::new("/nonexistent/cbt-questions.json")).unwrap_err();
        assert!(err.to_string().contains("cbt-questions.json"));
    }
}
