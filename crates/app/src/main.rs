use std::path::PathBuf;

use cbt_core::model::{CourseId, ExamId, ExamInfo, ExamMode, StudentId};
use services::{AttemptService, Clock, ExamService, SessionConfig};
use storage::repository::Storage;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

mod commands;
mod questions;
mod render;
mod repl;

const HISTORY_LIMIT: u32 = 20;

#[derive(Debug, Error)]
enum ArgsError {
    #[error("{flag} requires a value")]
    MissingValue { flag: &'static str },
    #[error("unknown argument: {0}")]
    UnknownArg(String),
    #[error("invalid --mode value: {raw} (expected practice or exam)")]
    InvalidMode { raw: String },
    #[error("invalid --duration value: {raw}")]
    InvalidDuration { raw: String },
    #[error("invalid {flag} value: {raw:?}")]
    InvalidId { flag: &'static str, raw: String },
    #[error("invalid --db value: {raw}")]
    InvalidDbUrl { raw: String },
    #[error("run requires --questions <file>")]
    MissingQuestions,
}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

fn parse_id<T: std::str::FromStr>(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<T, ArgsError> {
    let value = require_value(args, flag)?;
    value
        .parse()
        .map_err(|_| ArgsError::InvalidId { flag, raw: value })
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cbt run --questions <file> [--mode practice|exam] [--duration <min>]");
    eprintln!("          [--exam-id <id>] [--course-id <id>] [--student-id <id>] [--db <sqlite_url>]");
    eprintln!("  cbt history [--student-id <id>] [--db <sqlite_url>]");
    eprintln!();
    eprintln!("Defaults:");
    eprintln!("  --db sqlite:cbt.sqlite3");
    eprintln!("  --mode exam when the question file names an exam, practice otherwise");
    eprintln!("  --duration from the question file, else 10");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  CBT_DB_URL, CBT_STUDENT_ID, CBT_LOG (e.g. CBT_LOG=debug)");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Run,
    History,
}

impl Command {
    fn from_arg(arg: &str) -> Option<Self> {
        match arg {
            "run" => Some(Self::Run),
            "history" => Some(Self::History),
            _ => None,
        }
    }
}

#[derive(Debug)]
struct Args {
    db_url: String,
    student_id: StudentId,
    questions: Option<PathBuf>,
    mode: Option<ExamMode>,
    duration_minutes: Option<u32>,
    exam_id: Option<ExamId>,
    course_id: Option<CourseId>,
}

impl Args {
    fn from_env() -> Self {
        let db_url = std::env::var("CBT_DB_URL")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .map_or_else(|| normalize_sqlite_url("cbt.sqlite3".into()), normalize_sqlite_url);
        let student_id = std::env::var("CBT_STUDENT_ID")
            .ok()
            .and_then(|value| value.parse().ok())
            .unwrap_or_else(|| StudentId::new("local"));
        Self {
            db_url,
            student_id,
            questions: None,
            mode: None,
            duration_minutes: None,
            exam_id: None,
            course_id: None,
        }
    }

    fn parse(
        cmd: Command,
        args: &mut impl Iterator<Item = String>,
    ) -> Result<Self, ArgsError> {
        let mut parsed = Self::from_env();

        while let Some(arg) = args.next() {
            match (cmd, arg.as_str()) {
                (_, "--db") => {
                    let value = require_value(args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    parsed.db_url = normalize_sqlite_url(value);
                }
                (_, "--student-id") => parsed.student_id = parse_id(args, "--student-id")?,
                (Command::Run, "--questions") => {
                    parsed.questions = Some(require_value(args, "--questions")?.into());
                }
                (Command::Run, "--mode") => {
                    let value = require_value(args, "--mode")?;
                    parsed.mode = Some(match value.as_str() {
                        "practice" => ExamMode::Practice,
                        "exam" | "timed" => ExamMode::TimedExam,
                        _ => return Err(ArgsError::InvalidMode { raw: value }),
                    });
                }
                (Command::Run, "--duration") => {
                    let value = require_value(args, "--duration")?;
                    let minutes: u32 = value
                        .parse()
                        .map_err(|_| ArgsError::InvalidDuration { raw: value.clone() })?;
                    parsed.duration_minutes = Some(minutes);
                }
                (Command::Run, "--exam-id") => parsed.exam_id = Some(parse_id(args, "--exam-id")?),
                (Command::Run, "--course-id") => {
                    parsed.course_id = Some(parse_id(args, "--course-id")?);
                }
                (_, "--help" | "-h") => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        if cmd == Command::Run && parsed.questions.is_none() {
            return Err(ArgsError::MissingQuestions);
        }
        Ok(parsed)
    }

    /// Session parameters from flags layered over the question file's exam block.
    fn session_config(&self, exam: Option<&ExamInfo>) -> SessionConfig {
        let mut config = match exam {
            Some(exam) => SessionConfig::for_exam(exam, self.student_id.clone()),
            None => SessionConfig::practice(self.student_id.clone()),
        };
        if let Some(exam_id) = &self.exam_id {
            config.exam_id = Some(exam_id.clone());
            if exam.is_none() {
                config.mode = ExamMode::TimedExam;
            }
        }
        if let Some(course_id) = &self.course_id {
            config.course_id = Some(course_id.clone());
        }
        if let Some(mode) = self.mode {
            config = config.with_mode(mode);
        }
        if let Some(minutes) = self.duration_minutes {
            config = config.with_duration(minutes);
        }
        config
    }
}

fn normalize_sqlite_url(raw: String) -> String {
    if raw == "sqlite::memory:" || raw.starts_with("sqlite://") {
        return raw;
    }

    let trimmed = raw.trim().to_string();
    let path_str = trimmed
        .strip_prefix("sqlite:")
        .unwrap_or(trimmed.as_str())
        .to_string();
    let path = std::path::Path::new(&path_str);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}", absolute.display())
}

fn prepare_sqlite_file(db_url: &str) -> Result<(), Box<dyn std::error::Error>> {
    if db_url == "sqlite::memory:" {
        return Ok(());
    }

    let path = db_url
        .strip_prefix("sqlite://")
        .ok_or_else(|| ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        })?;
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() {
        return Err(ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        }
        .into());
    }

    let path = std::path::Path::new(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    if !path.exists() {
        std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)?;
    }

    Ok(())
}

fn init_tracing() {
    // Logs go to stderr so they never interleave with the prompt on stdout.
    let filter = EnvFilter::try_from_env("CBT_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let mut argv = std::env::args().skip(1);

    let cmd = match argv.next() {
        None => {
            print_usage();
            return Ok(());
        }
        Some(first) if first == "--help" || first == "-h" => {
            print_usage();
            return Ok(());
        }
        Some(first) => Command::from_arg(&first).ok_or_else(|| {
            eprintln!("unknown subcommand: {first}");
            print_usage();
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "unknown subcommand")
        })?,
    };

    let parsed = Args::parse(cmd, &mut argv).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;
    tracing::debug!(?cmd, db = %parsed.db_url, "starting");

    // Open + migrate SQLite at startup; services only see the repository traits.
    prepare_sqlite_file(&parsed.db_url)?;
    let storage = Storage::sqlite(&parsed.db_url).await?;

    match cmd {
        Command::Run => {
            let path = parsed.questions.as_deref().ok_or(ArgsError::MissingQuestions)?;
            let set = questions::load(path)?;
            let config = parsed.session_config(set.exam.as_ref());
            if let Some(exam) = &set.exam {
                println!("{}", exam.title);
            }

            let service = ExamService::from_storage(Clock::system(), &storage);
            let session = service.start(config, set.questions).await;
            let input = tokio::io::BufReader::new(tokio::io::stdin());
            let mut stdout = std::io::stdout();
            repl::run(session, input, &mut stdout).await
        }
        Command::History => {
            let attempts = AttemptService::new(storage.attempts.clone());
            let items = attempts
                .history_for_student(&parsed.student_id, HISTORY_LIMIT)
                .await?;
            print!("{}", render::history(&items));
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() {
    init_tracing();
    if let Err(err) = run().await {
        // At this layer (binary glue), printing once is fine.
        eprintln!("{err}");
        std::process::exit(2);
    }
}
