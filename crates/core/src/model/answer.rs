use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::ids::{ChoiceId, QuestionId, SessionId};

/// One entry of a session's append-only answer log.
///
/// Written in the same atomic step as the session update that scored it, so
/// a stored record always agrees with the session's `correct_count` and
/// `current_index`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerRecord {
    pub session_id: SessionId,
    /// Position of the question in the session's question order.
    pub index: usize,
    pub question_id: QuestionId,
    pub choice_id: ChoiceId,
    pub correct: bool,
    pub explanation: String,
    /// Seconds credited to the question when it was answered.
    pub time_taken_seconds: u32,
    pub answered_at: DateTime<Utc>,
}

impl AnswerRecord {
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        session_id: SessionId,
        index: usize,
        question_id: QuestionId,
        choice_id: ChoiceId,
        correct: bool,
        explanation: impl Into<String>,
        time_taken_seconds: u32,
        answered_at: DateTime<Utc>,
    ) -> Self {
        Self {
            session_id,
            index,
            question_id,
            choice_id,
            correct,
            explanation: explanation.into(),
            time_taken_seconds,
            answered_at,
        }
    }
}
