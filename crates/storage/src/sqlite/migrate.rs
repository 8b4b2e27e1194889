use chrono::Utc;
use sqlx::SqlitePool;

use super::SqliteInitError;

/// Runs the versioned migrations for the practice schema.
///
/// Version 1 creates the question bank, sessions, the answer log, and indexes.
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), SqliteInitError> {
    async fn is_applied(pool: &SqlitePool, version: i64) -> Result<bool, sqlx::Error> {
        let row = sqlx::query("SELECT 1 FROM schema_migrations WHERE version = ?1")
            .bind(version)
            .fetch_optional(pool)
            .await?;
        Ok(row.is_some())
    }

    sqlx::query(
        r"
            CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            );
            ",
    )
    .execute(pool)
    .await?;

    if !is_applied(pool, 1).await? {
        let mut tx = pool.begin().await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS questions (
                    id INTEGER PRIMARY KEY,
                    package_id INTEGER,
                    prompt TEXT NOT NULL,
                    choices TEXT NOT NULL,
                    correct_choice_id INTEGER NOT NULL,
                    explanation TEXT NOT NULL
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS practice_sessions (
                    id TEXT PRIMARY KEY,
                    user_id INTEGER NOT NULL,
                    package_id INTEGER,
                    time_limit_seconds INTEGER
                        CHECK (time_limit_seconds IS NULL OR time_limit_seconds > 0),
                    question_order TEXT NOT NULL,
                    current_index INTEGER NOT NULL CHECK (current_index >= 0),
                    correct_count INTEGER NOT NULL CHECK (correct_count >= 0),
                    status TEXT NOT NULL CHECK (status IN ('active', 'paused', 'finished')),
                    elapsed_seconds TEXT NOT NULL,
                    created_at TEXT NOT NULL,
                    started_at TEXT NOT NULL,
                    current_question_started_at TEXT NOT NULL,
                    paused_at TEXT,
                    last_activity_at TEXT NOT NULL,
                    revision INTEGER NOT NULL CHECK (revision >= 0)
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS practice_answers (
                    id INTEGER PRIMARY KEY,
                    session_id TEXT NOT NULL,
                    position INTEGER NOT NULL CHECK (position >= 0),
                    question_id INTEGER NOT NULL,
                    choice_id INTEGER NOT NULL,
                    correct INTEGER NOT NULL CHECK (correct IN (0, 1)),
                    explanation TEXT NOT NULL,
                    time_taken_seconds INTEGER NOT NULL CHECK (time_taken_seconds >= 0),
                    answered_at TEXT NOT NULL,
                    UNIQUE (session_id, position),
                    FOREIGN KEY (session_id) REFERENCES practice_sessions(id) ON DELETE CASCADE
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE INDEX IF NOT EXISTS idx_questions_package_id
                    ON questions (package_id, id);
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE INDEX IF NOT EXISTS idx_practice_sessions_user_created
                    ON practice_sessions (user_id, created_at DESC, id DESC);
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE INDEX IF NOT EXISTS idx_practice_sessions_user_status
                    ON practice_sessions (user_id, status);
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                INSERT INTO schema_migrations (version, applied_at)
                VALUES (?1, ?2)
                ON CONFLICT(version) DO NOTHING
            ",
        )
        .bind(1_i64)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
    }

    Ok(())
}
