use cbt_core::model::{
    AnswerValue, Answers, AttemptRecord, CourseId, ExamId, ExamResult, Flags, QuestionId,
    SessionKey, StudentId,
};
use cbt_core::time::fixed_now;
use chrono::Duration;
use storage::repository::{
    AttemptRepository, CheckpointRepository, CheckpointSlot, Storage, StorageError,
};
use storage::sqlite::SqliteRepository;

async fn connect(name: &str) -> SqliteRepository {
    let url = format!("sqlite:file:{name}?mode=memory&cache=shared");
    let repo = SqliteRepository::connect(&url).await.expect("connect");
    repo.migrate().await.expect("migrate");
    repo
}

fn attempt(student: &str, exam: &str, offset_minutes: i64) -> AttemptRecord {
    let mut answers = Answers::new();
    answers.insert(QuestionId::new("q1"), AnswerValue::Choice(0));
    answers.insert(QuestionId::new("q2"), AnswerValue::choices(["a", "c"]));
    let mut flags = Flags::new();
    flags.insert(QuestionId::new("q2"), true);

    AttemptRecord::from_result(
        Some(ExamId::new(exam)),
        StudentId::new(student),
        Some(CourseId::new("course-1")),
        fixed_now(),
        ExamResult {
            score: 1,
            total: 2,
            percentage: 50,
            answers,
            flags,
            submitted_at: fixed_now() + Duration::minutes(offset_minutes),
        },
    )
    .unwrap()
}

#[tokio::test]
async fn sqlite_checkpoints_upsert_and_delete() {
    let repo = connect("memdb_checkpoints").await;
    let key = SessionKey::Exam(ExamId::new("exam-1"));

    let mut answers = Answers::new();
    answers.insert(QuestionId::new("q1"), AnswerValue::text("first"));
    repo.write_answers(&key, &answers).await.unwrap();

    answers.insert(QuestionId::new("q1"), AnswerValue::text("second"));
    repo.write_answers(&key, &answers).await.unwrap();

    let mut flags = Flags::new();
    flags.insert(QuestionId::new("q1"), false);
    repo.write_flags(&key, &flags).await.unwrap();

    assert_eq!(repo.read_answers(&key).await.unwrap(), Some(answers));
    assert_eq!(repo.read_flags(&key).await.unwrap(), Some(flags));
    assert_eq!(repo.read_answers(&SessionKey::Practice).await.unwrap(), None);

    repo.clear(&key).await.unwrap();
    assert_eq!(repo.read_raw(CheckpointSlot::Answers, &key).await.unwrap(), None);
    assert_eq!(repo.read_raw(CheckpointSlot::Flags, &key).await.unwrap(), None);
}

#[tokio::test]
async fn sqlite_malformed_checkpoint_reads_as_absent() {
    let repo = connect("memdb_malformed").await;
    repo.write_raw(CheckpointSlot::Flags, &SessionKey::Practice, "[1, 2")
        .await
        .unwrap();

    assert_eq!(repo.read_flags(&SessionKey::Practice).await.unwrap(), None);
}

#[tokio::test]
async fn sqlite_attempts_roundtrip_and_list() {
    let repo = connect("memdb_attempts").await;

    let first = repo.append_attempt(&attempt("s1", "e1", 1)).await.unwrap();
    let second = repo.append_attempt(&attempt("s1", "e2", 2)).await.unwrap();
    let other = repo.append_attempt(&attempt("s2", "e1", 3)).await.unwrap();

    let fetched = repo.get_attempt(first).await.unwrap();
    assert_eq!(fetched, attempt("s1", "e1", 1));

    let mine = repo
        .list_attempts_for_student(&StudentId::new("s1"), 10)
        .await
        .unwrap();
    let ids: Vec<_> = mine.iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![second, first]);

    let for_exam = repo
        .list_attempts_for_exam(&ExamId::new("e1"), 10)
        .await
        .unwrap();
    let ids: Vec<_> = for_exam.iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![other, first]);

    assert!(matches!(
        repo.get_attempt(999).await,
        Err(StorageError::NotFound)
    ));
}

#[tokio::test]
async fn sqlite_migrations_are_idempotent() {
    let repo = connect("memdb_migrate_twice").await;
    repo.migrate().await.expect("second migrate");
}

#[tokio::test]
async fn storage_sqlite_wires_both_repositories() {
    let storage = Storage::sqlite("sqlite:file:memdb_storage?mode=memory&cache=shared")
        .await
        .expect("storage");
    let key = SessionKey::Practice;

    storage
        .checkpoints
        .write_flags(&key, &Flags::new())
        .await
        .unwrap();
    let id = storage
        .attempts
        .append_attempt(&attempt("s9", "e9", 0))
        .await
        .unwrap();

    assert!(storage.checkpoints.read_flags(&key).await.unwrap().is_some());
    assert_eq!(storage.attempts.get_attempt(id).await.unwrap().score(), 1);
}
