use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

use crate::model::answer::AnswerRecord;
use crate::model::ids::{ChoiceId, QuestionId};
use crate::model::question::{QuestionItem, QuestionView};
use crate::model::session::{PracticeSession, SessionStatus};

//
// ─── ERRORS ───────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ReviewError {
    #[error("session is not finished")]
    NotFinished,

    #[error("question {0} is missing from the question bank")]
    MissingQuestion(QuestionId),
}

//
// ─── REVIEW ITEM ──────────────────────────────────────────────────────────────
//

/// One row of a post-hoc session review, in question order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewItem {
    pub index: usize,
    pub question: QuestionView,
    pub selected_choice_id: Option<ChoiceId>,
    pub correct: Option<bool>,
    pub explanation: Option<String>,
    pub time_taken_seconds: u32,
    pub correct_choice_id: ChoiceId,
}

/// Rebuild the review of a finished session.
///
/// The review is never stored: it is a pure function of the question order,
/// the per-question timing map, the answer log, and the bank entries. Questions
/// left unanswered (a timed session that ran out) still carry their correct
/// choice and accumulated time.
///
/// # Errors
///
/// `ReviewError::NotFinished` for sessions still in progress,
/// `ReviewError::MissingQuestion` when `items` lacks a question in the order.
pub fn build_review(
    session: &PracticeSession,
    answers: &[AnswerRecord],
    items: &HashMap<QuestionId, QuestionItem>,
) -> Result<Vec<ReviewItem>, ReviewError> {
    if session.status() != SessionStatus::Finished {
        return Err(ReviewError::NotFinished);
    }

    let by_question: HashMap<QuestionId, &AnswerRecord> = answers
        .iter()
        .filter(|a| a.session_id == session.id())
        .map(|a| (a.question_id, a))
        .collect();

    session
        .question_order()
        .iter()
        .enumerate()
        .map(|(index, question_id)| {
            let item = items
                .get(question_id)
                .ok_or(ReviewError::MissingQuestion(*question_id))?;
            let answer = by_question.get(question_id);
            Ok(ReviewItem {
                index,
                question: item.view(),
                selected_choice_id: answer.map(|a| a.choice_id),
                correct: answer.map(|a| a.correct),
                explanation: answer.map(|a| a.explanation.clone()),
                time_taken_seconds: session.elapsed_for(*question_id),
                correct_choice_id: item.correct_choice_id(),
            })
        })
        .collect()
}

//
// ─── SCORE ────────────────────────────────────────────────────────────────────
//

/// Aggregate score of a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionScore {
    /// Number of questions in the session.
    pub total: u32,
    pub answered: u32,
    pub correct_count: u32,
    /// `correct_count / total`, zero for an empty session.
    pub accuracy: f64,
}

impl SessionScore {
    #[must_use]
    pub fn new(total: u32, answered: u32, correct_count: u32) -> Self {
        let accuracy = if total == 0 {
            0.0
        } else {
            f64::from(correct_count) / f64::from(total)
        };
        Self {
            total,
            answered,
            correct_count,
            accuracy,
        }
    }

    #[must_use]
    pub fn from_session(session: &PracticeSession) -> Self {
        let total = u32::try_from(session.target_count()).unwrap_or(u32::MAX);
        let answered = u32::try_from(session.current_index()).unwrap_or(u32::MAX);
        Self::new(total, answered, session.correct_count())
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ids::{SessionId, UserId};
    use crate::model::question::Choice;
    use crate::time::fixed_now;
    use chrono::Duration;

    fn item(id: u64) -> QuestionItem {
        QuestionItem::new(
            QuestionId::new(id),
            None,
            format!("Q{id}"),
            vec![
                Choice::new(ChoiceId::new(1), "a"),
                Choice::new(ChoiceId::new(2), "b"),
            ],
            ChoiceId::new(2),
            format!("E{id}"),
        )
        .unwrap()
    }

    fn bank(n: u64) -> HashMap<QuestionId, QuestionItem> {
        (1..=n).map(|i| (QuestionId::new(i), item(i))).collect()
    }

    #[test]
    fn review_replays_order_and_keeps_unanswered_questions() {
        let now = fixed_now();
        let order: Vec<_> = (1..=3).map(QuestionId::new).collect();
        let mut session =
            PracticeSession::new(SessionId::generate(), UserId::new(1), None, Some(180), order, now)
                .unwrap();
        let answered_at = now + Duration::seconds(40);
        session
            .record_answer(QuestionId::new(1), true, answered_at)
            .unwrap();
        assert!(session.expire_if_due(now + Duration::seconds(200)));

        let answers = vec![AnswerRecord::new(
            session.id(),
            0,
            QuestionId::new(1),
            ChoiceId::new(2),
            true,
            "E1",
            40,
            answered_at,
        )];

        let review = build_review(&session, &answers, &bank(3)).unwrap();
        assert_eq!(review.len(), 3);
        assert_eq!(
            review.iter().map(|r| r.question.id).collect::<Vec<_>>(),
            session.question_order()
        );

        assert_eq!(review[0].selected_choice_id, Some(ChoiceId::new(2)));
        assert_eq!(review[0].correct, Some(true));
        assert_eq!(review[0].time_taken_seconds, 40);

        assert_eq!(review[1].selected_choice_id, None);
        assert_eq!(review[1].explanation, None);
        assert_eq!(review[1].time_taken_seconds, 140);
        assert_eq!(review[2].time_taken_seconds, 0);
        assert!(review.iter().all(|r| r.correct_choice_id == ChoiceId::new(2)));
    }

    #[test]
    fn review_requires_finished_session_and_full_bank() {
        let now = fixed_now();
        let order: Vec<_> = (1..=2).map(QuestionId::new).collect();
        let mut session =
            PracticeSession::new(SessionId::generate(), UserId::new(1), None, None, order, now)
                .unwrap();
        assert_eq!(
            build_review(&session, &[], &bank(2)),
            Err(ReviewError::NotFinished)
        );

        session.record_answer(QuestionId::new(1), false, now).unwrap();
        session.record_answer(QuestionId::new(2), false, now).unwrap();
        assert_eq!(
            build_review(&session, &[], &bank(1)),
            Err(ReviewError::MissingQuestion(QuestionId::new(2)))
        );
    }

    #[test]
    fn score_accuracy_is_zero_for_empty_total() {
        let score = SessionScore::new(0, 0, 0);
        assert!(score.accuracy.abs() < f64::EPSILON);

        let score = SessionScore::new(4, 4, 3);
        assert!((score.accuracy - 0.75).abs() < f64::EPSILON);
    }
}
