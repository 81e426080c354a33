use cbt_core::model::{AttemptId, AttemptRecord, ExamId, StudentId};

use super::SqliteRepository;
use super::mapping::{conn, map_attempt_row, ser};
use crate::repository::{AttemptRepository, AttemptRow, StorageError};

const SELECT_ATTEMPT: &str = r"
    SELECT
        id, exam_id, student_id, course_id, score, total, percentage,
        answers, flags, started_at, submitted_at
    FROM exam_attempts
";

impl SqliteRepository {
    async fn list_attempts_where(
        &self,
        column: &'static str,
        value: &str,
        limit: u32,
    ) -> Result<Vec<AttemptRow>, StorageError> {
        let sql = format!(
            "{SELECT_ATTEMPT} WHERE {column} = ?1 ORDER BY submitted_at DESC, id DESC LIMIT ?2"
        );
        let rows = sqlx::query(&sql)
            .bind(value)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await
            .map_err(conn)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(map_attempt_row(&row)?);
        }
        Ok(out)
    }
}

#[async_trait::async_trait]
impl AttemptRepository for SqliteRepository {
    async fn append_attempt(&self, attempt: &AttemptRecord) -> Result<AttemptId, StorageError> {
        let answers = serde_json::to_string(attempt.answers()).map_err(ser)?;
        let flags = serde_json::to_string(attempt.flags()).map_err(ser)?;

        let res = sqlx::query(
            r"
                INSERT INTO exam_attempts (
                    exam_id, student_id, course_id, score, total, percentage,
                    answers, flags, started_at, submitted_at
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ",
        )
        .bind(attempt.exam_id().map(ExamId::as_str))
        .bind(attempt.student_id().as_str())
        .bind(attempt.course_id().map(|c| c.as_str()))
        .bind(i64::from(attempt.score()))
        .bind(i64::from(attempt.total()))
        .bind(i64::from(attempt.percentage()))
        .bind(answers)
        .bind(flags)
        .bind(attempt.started_at())
        .bind(attempt.submitted_at())
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        Ok(res.last_insert_rowid())
    }

    async fn get_attempt(&self, id: AttemptId) -> Result<AttemptRecord, StorageError> {
        let sql = format!("{SELECT_ATTEMPT} WHERE id = ?1");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?
            .ok_or(StorageError::NotFound)?;

        Ok(map_attempt_row(&row)?.attempt)
    }

    async fn list_attempts_for_student(
        &self,
        student: &StudentId,
        limit: u32,
    ) -> Result<Vec<AttemptRow>, StorageError> {
        self.list_attempts_where("student_id", student.as_str(), limit)
            .await
    }

    async fn list_attempts_for_exam(
        &self,
        exam: &ExamId,
        limit: u32,
    ) -> Result<Vec<AttemptRow>, StorageError> {
        self.list_attempts_where("exam_id", exam.as_str(), limit)
            .await
    }
}
