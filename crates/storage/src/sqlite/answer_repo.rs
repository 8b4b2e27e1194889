use practice_core::model::{AnswerRecord, PracticeSession, SessionId};

use super::{
    SqliteRepository,
    mapping::{conn, id_i64, map_answer_row, usize_i64},
    session_repo::update_session,
};
use crate::repository::{
    AnswerLogRepository, AnswerPersistence, SessionPrecondition, StorageError,
};

#[async_trait::async_trait]
impl AnswerLogRepository for SqliteRepository {
    async fn answers_for_session(
        &self,
        session_id: SessionId,
    ) -> Result<Vec<AnswerRecord>, StorageError> {
        let rows = sqlx::query(
            r"
                SELECT
                    session_id, position, question_id, choice_id, correct,
                    explanation, time_taken_seconds, answered_at
                FROM practice_answers
                WHERE session_id = ?1
                ORDER BY position ASC
            ",
        )
        .bind(session_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(map_answer_row(&row)?);
        }
        Ok(out)
    }
}

#[async_trait::async_trait]
impl AnswerPersistence for SqliteRepository {
    async fn apply_answer(
        &self,
        session: &PracticeSession,
        expected: SessionPrecondition,
        answer: &AnswerRecord,
    ) -> Result<(), StorageError> {
        if answer.session_id != session.id() {
            return Err(StorageError::Conflict);
        }

        let mut tx = self.pool.begin().await.map_err(conn)?;

        if update_session(&mut *tx, session, expected).await? == 0 {
            tx.rollback().await.map_err(conn)?;
            return Err(self.missing_or_conflict(session).await);
        }

        let inserted = sqlx::query(
            r"
                INSERT INTO practice_answers (
                    session_id, position, question_id, choice_id, correct,
                    explanation, time_taken_seconds, answered_at
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ",
        )
        .bind(answer.session_id.to_string())
        .bind(usize_i64("position", answer.index)?)
        .bind(id_i64("question_id", answer.question_id.value())?)
        .bind(id_i64("choice_id", answer.choice_id.value())?)
        .bind(i64::from(answer.correct))
        .bind(answer.explanation.as_str())
        .bind(i64::from(answer.time_taken_seconds))
        .bind(answer.answered_at)
        .execute(&mut *tx)
        .await;

        match inserted {
            Ok(_) => {}
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                tx.rollback().await.map_err(conn)?;
                return Err(StorageError::Conflict);
            }
            Err(e) => return Err(conn(e)),
        }

        tx.commit().await.map_err(conn)
    }
}
