use chrono::{DateTime, Utc};
use practice_core::model::{PracticeSession, SessionId, SessionStatus, UserId};
use sqlx::{Executor, Sqlite};

use super::{
    SqliteRepository,
    mapping::{
        conn, encode_elapsed, encode_order, id_i64, map_session_row, package_id_to_i64, usize_i64,
    },
};
use crate::repository::{SessionPrecondition, SessionRepository, StorageError};

const SESSION_COLUMNS: &str = r"
    id, user_id, package_id, time_limit_seconds, question_order, current_index,
    correct_count, status, elapsed_seconds, created_at, started_at,
    current_question_started_at, paused_at, last_activity_at, revision
";

/// Conditional update of the mutable session columns.
///
/// Returns the number of rows touched: zero means the precondition failed or
/// the session does not exist.
pub(super) async fn update_session<'e, E>(
    executor: E,
    session: &PracticeSession,
    expected: SessionPrecondition,
) -> Result<u64, StorageError>
where
    E: Executor<'e, Database = Sqlite>,
{
    let res = sqlx::query(
        r"
            UPDATE practice_sessions SET
                current_index = ?1,
                correct_count = ?2,
                status = ?3,
                elapsed_seconds = ?4,
                current_question_started_at = ?5,
                paused_at = ?6,
                last_activity_at = ?7,
                revision = ?8
            WHERE id = ?9 AND user_id = ?10 AND status = ?11 AND revision = ?12
        ",
    )
    .bind(usize_i64("current_index", session.current_index())?)
    .bind(i64::from(session.correct_count()))
    .bind(session.status().as_str())
    .bind(encode_elapsed(session.elapsed_seconds())?)
    .bind(session.current_question_started_at())
    .bind(session.paused_at())
    .bind(session.last_activity_at())
    .bind(id_i64("revision", session.revision())?)
    .bind(session.id().to_string())
    .bind(id_i64("user_id", session.user_id().value())?)
    .bind(expected.status.as_str())
    .bind(id_i64("revision", expected.revision)?)
    .execute(executor)
    .await
    .map_err(conn)?;

    Ok(res.rows_affected())
}

impl SqliteRepository {
    /// Tell a failed precondition apart from a missing session.
    pub(super) async fn missing_or_conflict(&self, session: &PracticeSession) -> StorageError {
        let user_id = match id_i64("user_id", session.user_id().value()) {
            Ok(id) => id,
            Err(e) => return e,
        };
        let found = sqlx::query("SELECT 1 FROM practice_sessions WHERE id = ?1 AND user_id = ?2")
            .bind(session.id().to_string())
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await;
        match found {
            Ok(Some(_)) => StorageError::Conflict,
            Ok(None) => StorageError::NotFound,
            Err(e) => conn(e),
        }
    }
}

#[async_trait::async_trait]
impl SessionRepository for SqliteRepository {
    async fn insert_session(&self, session: &PracticeSession) -> Result<(), StorageError> {
        let res = sqlx::query(
            r"
                INSERT INTO practice_sessions (
                    id, user_id, package_id, time_limit_seconds, question_order, current_index,
                    correct_count, status, elapsed_seconds, created_at, started_at,
                    current_question_started_at, paused_at, last_activity_at, revision
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
            ",
        )
        .bind(session.id().to_string())
        .bind(id_i64("user_id", session.user_id().value())?)
        .bind(package_id_to_i64(session.package_id())?)
        .bind(session.time_limit_seconds().map(i64::from))
        .bind(encode_order(session.question_order())?)
        .bind(usize_i64("current_index", session.current_index())?)
        .bind(i64::from(session.correct_count()))
        .bind(session.status().as_str())
        .bind(encode_elapsed(session.elapsed_seconds())?)
        .bind(session.created_at())
        .bind(session.started_at())
        .bind(session.current_question_started_at())
        .bind(session.paused_at())
        .bind(session.last_activity_at())
        .bind(id_i64("revision", session.revision())?)
        .execute(&self.pool)
        .await;

        match res {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(StorageError::Conflict)
            }
            Err(e) => Err(conn(e)),
        }
    }

    async fn load_session(
        &self,
        user_id: UserId,
        id: SessionId,
    ) -> Result<PracticeSession, StorageError> {
        let sql = format!(
            "SELECT {SESSION_COLUMNS} FROM practice_sessions WHERE id = ?1 AND user_id = ?2"
        );
        let row = sqlx::query(&sql)
            .bind(id.to_string())
            .bind(id_i64("user_id", user_id.value())?)
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?
            .ok_or(StorageError::NotFound)?;

        map_session_row(&row)
    }

    async fn save_session(
        &self,
        session: &PracticeSession,
        expected: SessionPrecondition,
    ) -> Result<(), StorageError> {
        if update_session(&self.pool, session, expected).await? == 0 {
            return Err(self.missing_or_conflict(session).await);
        }
        Ok(())
    }

    async fn list_sessions(
        &self,
        user_id: UserId,
        status: Option<SessionStatus>,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<PracticeSession>, StorageError> {
        let mut sql = format!("SELECT {SESSION_COLUMNS} FROM practice_sessions WHERE user_id = ?1");
        let mut bind_index = 2;
        if status.is_some() {
            sql.push_str(" AND status = ?");
            sql.push_str(&bind_index.to_string());
            bind_index += 1;
        }
        sql.push_str(" ORDER BY created_at DESC, id DESC");
        sql.push_str(" LIMIT ?");
        sql.push_str(&bind_index.to_string());
        sql.push_str(" OFFSET ?");
        sql.push_str(&(bind_index + 1).to_string());

        let mut query = sqlx::query(&sql).bind(id_i64("user_id", user_id.value())?);
        if let Some(status) = status {
            query = query.bind(status.as_str());
        }
        query = query.bind(i64::from(limit)).bind(i64::from(offset));

        let rows = query.fetch_all(&self.pool).await.map_err(conn)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(map_session_row(&row)?);
        }
        Ok(out)
    }

    async fn due_timed_sessions(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<Vec<PracticeSession>, StorageError> {
        // Deadlines are compared in Rust; timestamps are stored as text.
        let sql = format!(
            "SELECT {SESSION_COLUMNS} FROM practice_sessions
             WHERE user_id = ?1 AND status = ?2 AND time_limit_seconds IS NOT NULL"
        );
        let rows = sqlx::query(&sql)
            .bind(id_i64("user_id", user_id.value())?)
            .bind(SessionStatus::Active.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(conn)?;

        let mut due = Vec::new();
        for row in rows {
            let session = map_session_row(&row)?;
            if session.is_past_deadline(now) {
                due.push(session);
            }
        }
        Ok(due)
    }
}
