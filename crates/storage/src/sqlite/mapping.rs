use cbt_core::model::{Answers, AttemptRecord, CourseId, ExamId, Flags, StudentId};
use sqlx::Row;

use crate::repository::{AttemptRow, StorageError};

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

pub(crate) fn conn<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

fn u32_from_i64(field: &'static str, v: i64) -> Result<u32, StorageError> {
    u32::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid {field}: {v}")))
}

pub(crate) fn map_attempt_row(row: &sqlx::sqlite::SqliteRow) -> Result<AttemptRow, StorageError> {
    let id: i64 = row.try_get("id").map_err(ser)?;

    let exam_id = row
        .try_get::<Option<String>, _>("exam_id")
        .map_err(ser)?
        .map(ExamId::new);
    let student_id = StudentId::new(row.try_get::<String, _>("student_id").map_err(ser)?);
    let course_id = row
        .try_get::<Option<String>, _>("course_id")
        .map_err(ser)?
        .map(CourseId::new);

    let score = u32_from_i64("score", row.try_get::<i64, _>("score").map_err(ser)?)?;
    let total = u32_from_i64("total", row.try_get::<i64, _>("total").map_err(ser)?)?;
    let percentage = u32_from_i64(
        "percentage",
        row.try_get::<i64, _>("percentage").map_err(ser)?,
    )?;

    let answers: Answers =
        serde_json::from_str(&row.try_get::<String, _>("answers").map_err(ser)?).map_err(ser)?;
    let flags: Flags =
        serde_json::from_str(&row.try_get::<String, _>("flags").map_err(ser)?).map_err(ser)?;

    let attempt = AttemptRecord::from_persisted(
        exam_id,
        student_id,
        course_id,
        score,
        total,
        percentage,
        answers,
        flags,
        row.try_get("started_at").map_err(ser)?,
        row.try_get("submitted_at").map_err(ser)?,
    )
    .map_err(ser)?;

    Ok(AttemptRow::new(id, attempt))
}
