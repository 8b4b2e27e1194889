use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use practice_core::model::{ChoiceId, PackageId, QuestionId, SessionId, SessionStatus, UserId};
use serde::Serialize;
use services::{AppServices, Clock, EngineConfig, SessionError};
use tracing_subscriber::EnvFilter;

const DEFAULT_DB_URL: &str = "sqlite:practice.sqlite3";

/// Drive practice sessions against a `SQLite` question bank.
#[derive(Debug, Parser)]
#[command(name = "practice", version)]
struct Cli {
    /// Database URL; relative paths resolve against the working directory.
    #[arg(long = "db", global = true, env = "PRACTICE_DB_URL", default_value = DEFAULT_DB_URL)]
    db_url: String,

    /// Acting user.
    #[arg(long, global = true, env = "PRACTICE_USER_ID", default_value_t = UserId::new(1))]
    user: UserId,

    /// Pin the clock to an RFC3339 instant instead of the system time.
    #[arg(long, global = true)]
    now: Option<DateTime<Utc>>,

    /// Time budget per question for timed sessions.
    #[arg(
        long,
        global = true,
        env = "PRACTICE_SECONDS_PER_QUESTION",
        default_value_t = EngineConfig::DEFAULT_SECONDS_PER_QUESTION
    )]
    seconds_per_question: u32,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Start a new session.
    Start {
        /// Restrict questions to one package.
        #[arg(long)]
        package: Option<PackageId>,
        /// Run under a global time budget.
        #[arg(long)]
        timed: bool,
        /// Number of questions.
        #[arg(long, default_value_t = 10)]
        count: u32,
    },
    /// Show a session, expiring it if its time ran out.
    Show { session: SessionId },
    /// List sessions, newest first.
    List {
        #[arg(long)]
        status: Option<SessionStatus>,
        #[arg(long)]
        limit: Option<u32>,
        #[arg(long, default_value_t = 0)]
        offset: u32,
    },
    /// Pause an untimed session.
    Pause { session: SessionId },
    /// Resume a paused session.
    Resume { session: SessionId },
    /// Answer the current question.
    Answer {
        session: SessionId,
        question: QuestionId,
        choice: ChoiceId,
    },
    /// Score of a session.
    Summary { session: SessionId },
    /// Per-question review of a finished session.
    Review { session: SessionId },
}

fn normalize_sqlite_url(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed == "sqlite::memory:" || trimmed.starts_with("sqlite://") {
        return trimmed.to_string();
    }

    let path_str = trimmed.strip_prefix("sqlite:").unwrap_or(trimmed);
    let path = Path::new(path_str);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}", absolute.display())
}

fn prepare_sqlite_dir(db_url: &str) -> anyhow::Result<()> {
    let Some(path) = db_url.strip_prefix("sqlite://") else {
        return Ok(());
    };
    let path = path.split('?').next().unwrap_or(path);
    anyhow::ensure!(!path.is_empty(), "invalid --db value: {db_url}");

    if let Some(parent) = Path::new(path).parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating database directory {}", parent.display()))?;
    }
    Ok(())
}

fn emit<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let db_url = normalize_sqlite_url(&cli.db_url);
    prepare_sqlite_dir(&db_url)?;

    let clock = cli.now.map_or_else(Clock::default_clock, Clock::fixed);
    let config = EngineConfig::default()
        .with_seconds_per_question(cli.seconds_per_question)
        .context("invalid --seconds-per-question")?;

    tracing::debug!(db = %db_url, user = %cli.user, "opening practice database");
    let services = AppServices::new_sqlite(&db_url, clock, config)
        .await
        .with_context(|| format!("opening {db_url}"))?;
    let engine = services.practice();
    let user = cli.user;

    match cli.command {
        Command::Start {
            package,
            timed,
            count,
        } => emit(&engine.create_session(user, package, timed, count).await?),
        Command::Show { session } => emit(&engine.get_session(user, session).await?),
        Command::List {
            status,
            limit,
            offset,
        } => emit(&engine.list_sessions(user, status, limit, offset).await?),
        Command::Pause { session } => emit(&engine.pause_session(user, session).await?),
        Command::Resume { session } => emit(&engine.resume_session(user, session).await?),
        Command::Answer {
            session,
            question,
            choice,
        } => emit(
            &engine
                .submit_answer(user, session, question, choice)
                .await?,
        ),
        Command::Summary { session } => emit(&engine.get_summary(user, session).await?),
        Command::Review { session } => emit(&engine.get_review(user, session).await?),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if cli.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            if let Some(session_err) = err.downcast_ref::<SessionError>() {
                tracing::debug!(kind = ?session_err.kind(), "engine rejected the request");
            }
            eprintln!("error: {err:#}");
            ExitCode::from(2)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_paths_become_absolute_urls() {
        let url = normalize_sqlite_url("sqlite:data/practice.sqlite3");
        assert!(url.starts_with("sqlite:///"));
        assert!(url.ends_with("data/practice.sqlite3"));
    }

    #[test]
    fn default_url_resolves_to_an_absolute_path() {
        let cli = Cli::try_parse_from(["practice", "list"]).unwrap();
        let url = normalize_sqlite_url(&cli.db_url);
        assert!(url.starts_with("sqlite:///"), "{url}");
        assert!(url.ends_with("/practice.sqlite3"));
    }

    #[test]
    fn memory_and_absolute_urls_pass_through() {
        assert_eq!(normalize_sqlite_url("sqlite::memory:"), "sqlite::memory:");
        assert_eq!(
            normalize_sqlite_url("sqlite:///tmp/p.db"),
            "sqlite:///tmp/p.db"
        );
    }

    #[test]
    fn cli_parses_answer_with_global_flags() {
        let cli = Cli::try_parse_from([
            "practice",
            "answer",
            "3f2a9c1e-8a4b-4c3d-9e8f-0a1b2c3d4e5f",
            "7",
            "2",
            "--user",
            "5",
            "--now",
            "2024-01-01T00:00:00Z",
        ])
        .unwrap();
        assert_eq!(cli.user, UserId::new(5));
        assert!(cli.now.is_some());
        assert!(matches!(
            cli.command,
            Command::Answer { question, choice, .. }
                if question == QuestionId::new(7) && choice == ChoiceId::new(2)
        ));
    }
}
