use practice_core::model::{PackageId, QuestionId, QuestionItem};

use super::{
    SqliteRepository,
    mapping::{conn, encode_choices, id_i64, map_question_row, package_id_to_i64},
};
use crate::repository::{QuestionBank, StorageError};

impl SqliteRepository {
    /// Add or replace a question in the bank.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if ids overflow or the write fails.
    pub async fn upsert_question(&self, item: &QuestionItem) -> Result<(), StorageError> {
        sqlx::query(
            r"
                INSERT INTO questions (
                    id, package_id, prompt, choices, correct_choice_id, explanation
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                ON CONFLICT(id) DO UPDATE SET
                    package_id = excluded.package_id,
                    prompt = excluded.prompt,
                    choices = excluded.choices,
                    correct_choice_id = excluded.correct_choice_id,
                    explanation = excluded.explanation
            ",
        )
        .bind(id_i64("question_id", item.id().value())?)
        .bind(package_id_to_i64(item.package_id())?)
        .bind(item.prompt())
        .bind(encode_choices(item.choices())?)
        .bind(id_i64("correct_choice_id", item.correct_choice_id().value())?)
        .bind(item.explanation())
        .execute(&self.pool)
        .await
        .map_err(conn)?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl QuestionBank for SqliteRepository {
    async fn candidate_ids(
        &self,
        package_id: Option<PackageId>,
        count: u32,
    ) -> Result<Vec<QuestionId>, StorageError> {
        let ids: Vec<i64> = match package_id_to_i64(package_id)? {
            Some(package) => sqlx::query_scalar(
                "SELECT id FROM questions WHERE package_id = ?1 ORDER BY id ASC LIMIT ?2",
            )
            .bind(package)
            .bind(i64::from(count))
            .fetch_all(&self.pool)
            .await
            .map_err(conn)?,
            None => sqlx::query_scalar("SELECT id FROM questions ORDER BY id ASC LIMIT ?1")
                .bind(i64::from(count))
                .fetch_all(&self.pool)
                .await
                .map_err(conn)?,
        };

        ids.into_iter()
            .map(|id| {
                u64::try_from(id)
                    .map(QuestionId::new)
                    .map_err(|_| StorageError::Serialization(format!("invalid question id: {id}")))
            })
            .collect()
    }

    async fn get_item(&self, id: QuestionId) -> Result<QuestionItem, StorageError> {
        let row = sqlx::query(
            r"
                SELECT id, package_id, prompt, choices, correct_choice_id, explanation
                FROM questions
                WHERE id = ?1
            ",
        )
        .bind(id_i64("question_id", id.value())?)
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?
        .ok_or(StorageError::NotFound)?;

        map_question_row(&row)
    }
}
