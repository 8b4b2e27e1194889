use std::collections::BTreeMap;

use practice_core::model::{
    AnswerRecord, Choice, ChoiceId, PackageId, PracticeSession, QuestionId, QuestionItem,
    SessionId, SessionSnapshot, SessionStatus, UserId,
};
use sqlx::Row;

use crate::repository::StorageError;

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

pub(crate) fn conn(e: sqlx::Error) -> StorageError {
    StorageError::Connection(e.to_string())
}

fn i64_to_u64(field: &'static str, v: i64) -> Result<u64, StorageError> {
    u64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} sign overflow")))
}

pub(crate) fn id_i64(field: &'static str, v: u64) -> Result<i64, StorageError> {
    i64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} overflow")))
}

pub(crate) fn usize_i64(field: &'static str, v: usize) -> Result<i64, StorageError> {
    i64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} overflow")))
}

fn u32_from_i64(field: &'static str, v: i64) -> Result<u32, StorageError> {
    u32::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid {field}: {v}")))
}

fn usize_from_i64(field: &'static str, v: i64) -> Result<usize, StorageError> {
    usize::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid {field}: {v}")))
}

pub(crate) fn package_id_to_i64(id: Option<PackageId>) -> Result<Option<i64>, StorageError> {
    id.map(|p| id_i64("package_id", p.value())).transpose()
}

pub(crate) fn parse_status(s: &str) -> Result<SessionStatus, StorageError> {
    s.parse::<SessionStatus>().map_err(ser)
}

pub(crate) fn parse_session_id(s: &str) -> Result<SessionId, StorageError> {
    s.parse::<SessionId>().map_err(ser)
}

/// Question order is stored as a JSON array of ids.
pub(crate) fn encode_order(order: &[QuestionId]) -> Result<String, StorageError> {
    serde_json::to_string(order).map_err(ser)
}

/// Per-question time is stored as a JSON array of `[question_id, seconds]`
/// pairs.
pub(crate) fn encode_elapsed(elapsed: &BTreeMap<QuestionId, u32>) -> Result<String, StorageError> {
    let pairs: Vec<(QuestionId, u32)> = elapsed.iter().map(|(q, s)| (*q, *s)).collect();
    serde_json::to_string(&pairs).map_err(ser)
}

pub(crate) fn encode_choices(choices: &[Choice]) -> Result<String, StorageError> {
    serde_json::to_string(choices).map_err(ser)
}

pub(crate) fn map_session_row(row: &sqlx::sqlite::SqliteRow) -> Result<PracticeSession, StorageError> {
    let order_json: String = row.try_get("question_order").map_err(ser)?;
    let question_order: Vec<QuestionId> = serde_json::from_str(&order_json).map_err(ser)?;

    let elapsed_json: String = row.try_get("elapsed_seconds").map_err(ser)?;
    let elapsed_pairs: Vec<(QuestionId, u32)> =
        serde_json::from_str(&elapsed_json).map_err(ser)?;

    let time_limit_seconds = row
        .try_get::<Option<i64>, _>("time_limit_seconds")
        .map_err(ser)?
        .map(|v| u32_from_i64("time_limit_seconds", v))
        .transpose()?;

    let snapshot = SessionSnapshot {
        id: parse_session_id(&row.try_get::<String, _>("id").map_err(ser)?)?,
        user_id: UserId::new(i64_to_u64(
            "user_id",
            row.try_get::<i64, _>("user_id").map_err(ser)?,
        )?),
        package_id: row
            .try_get::<Option<i64>, _>("package_id")
            .map_err(ser)?
            .map(|v| i64_to_u64("package_id", v).map(PackageId::new))
            .transpose()?,
        time_limit_seconds,
        question_order,
        current_index: usize_from_i64(
            "current_index",
            row.try_get::<i64, _>("current_index").map_err(ser)?,
        )?,
        correct_count: u32_from_i64(
            "correct_count",
            row.try_get::<i64, _>("correct_count").map_err(ser)?,
        )?,
        status: parse_status(&row.try_get::<String, _>("status").map_err(ser)?)?,
        elapsed_seconds: elapsed_pairs.into_iter().collect(),
        created_at: row.try_get("created_at").map_err(ser)?,
        started_at: row.try_get("started_at").map_err(ser)?,
        current_question_started_at: row.try_get("current_question_started_at").map_err(ser)?,
        paused_at: row.try_get("paused_at").map_err(ser)?,
        last_activity_at: row.try_get("last_activity_at").map_err(ser)?,
        revision: i64_to_u64("revision", row.try_get::<i64, _>("revision").map_err(ser)?)?,
    };

    PracticeSession::from_snapshot(snapshot).map_err(ser)
}

pub(crate) fn map_answer_row(row: &sqlx::sqlite::SqliteRow) -> Result<AnswerRecord, StorageError> {
    Ok(AnswerRecord {
        session_id: parse_session_id(&row.try_get::<String, _>("session_id").map_err(ser)?)?,
        index: usize_from_i64("position", row.try_get::<i64, _>("position").map_err(ser)?)?,
        question_id: QuestionId::new(i64_to_u64(
            "question_id",
            row.try_get::<i64, _>("question_id").map_err(ser)?,
        )?),
        choice_id: ChoiceId::new(i64_to_u64(
            "choice_id",
            row.try_get::<i64, _>("choice_id").map_err(ser)?,
        )?),
        correct: row.try_get::<i64, _>("correct").map_err(ser)? != 0,
        explanation: row.try_get("explanation").map_err(ser)?,
        time_taken_seconds: u32_from_i64(
            "time_taken_seconds",
            row.try_get::<i64, _>("time_taken_seconds").map_err(ser)?,
        )?,
        answered_at: row.try_get("answered_at").map_err(ser)?,
    })
}

pub(crate) fn map_question_row(row: &sqlx::sqlite::SqliteRow) -> Result<QuestionItem, StorageError> {
    let choices_json: String = row.try_get("choices").map_err(ser)?;
    let choices: Vec<Choice> = serde_json::from_str(&choices_json).map_err(ser)?;

    QuestionItem::new(
        QuestionId::new(i64_to_u64("id", row.try_get::<i64, _>("id").map_err(ser)?)?),
        row.try_get::<Option<i64>, _>("package_id")
            .map_err(ser)?
            .map(|v| i64_to_u64("package_id", v).map(PackageId::new))
            .transpose()?,
        row.try_get::<String, _>("prompt").map_err(ser)?,
        choices,
        ChoiceId::new(i64_to_u64(
            "correct_choice_id",
            row.try_get::<i64, _>("correct_choice_id").map_err(ser)?,
        )?),
        row.try_get::<String, _>("explanation").map_err(ser)?,
    )
    .map_err(ser)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn elapsed_encoding_is_a_pair_list() {
        let mut elapsed = BTreeMap::new();
        elapsed.insert(QuestionId::new(7), 42);
        elapsed.insert(QuestionId::new(3), 5);
        assert_eq!(encode_elapsed(&elapsed).unwrap(), "[[3,5],[7,42]]");
    }

    #[test]
    fn rejects_unknown_status() {
        assert!(matches!(
            parse_status("archived"),
            Err(StorageError::Serialization(_))
        ));
    }
}
