use chrono::{DateTime, Utc};
use serde::Serialize;

use practice_core::model::{
    ChoiceId, PackageId, PracticeSession, QuestionId, QuestionView, SessionId, SessionStatus,
};

/// Seconds accumulated on one question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QuestionTime {
    pub question_id: QuestionId,
    pub seconds: u32,
}

/// Client-facing state of a single session.
///
/// Never carries the correct choice of the current question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionView {
    pub id: SessionId,
    pub package_id: Option<PackageId>,
    pub status: SessionStatus,
    pub is_timed: bool,
    pub time_limit_seconds: Option<u32>,
    /// Present only for timed, active sessions.
    pub time_remaining_seconds: Option<u32>,
    pub target_count: usize,
    pub current_index: usize,
    pub correct_count: u32,
    pub current_question: Option<QuestionView>,
    pub time_spent: Vec<QuestionTime>,
    pub created_at: DateTime<Utc>,
    pub started_at: DateTime<Utc>,
    pub paused_at: Option<DateTime<Utc>>,
    pub last_activity_at: DateTime<Utc>,
}

impl SessionView {
    #[must_use]
    pub fn from_session(
        session: &PracticeSession,
        now: DateTime<Utc>,
        current_question: Option<QuestionView>,
    ) -> Self {
        let time_spent = session
            .question_order()
            .iter()
            .filter_map(|qid| {
                session.elapsed_seconds().get(qid).map(|seconds| QuestionTime {
                    question_id: *qid,
                    seconds: *seconds,
                })
            })
            .collect();

        Self {
            id: session.id(),
            package_id: session.package_id(),
            status: session.status(),
            is_timed: session.is_timed(),
            time_limit_seconds: session.time_limit_seconds(),
            time_remaining_seconds: session.time_remaining_seconds(now),
            target_count: session.target_count(),
            current_index: session.current_index(),
            correct_count: session.correct_count(),
            current_question,
            time_spent,
            created_at: session.created_at(),
            started_at: session.started_at(),
            paused_at: session.paused_at(),
            last_activity_at: session.last_activity_at(),
        }
    }
}

/// One row of a session listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionListItem {
    pub id: SessionId,
    pub package_id: Option<PackageId>,
    pub status: SessionStatus,
    pub is_timed: bool,
    pub time_limit_seconds: Option<u32>,
    pub time_remaining_seconds: Option<u32>,
    pub target_count: usize,
    pub current_index: usize,
    pub correct_count: u32,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
}

impl SessionListItem {
    #[must_use]
    pub fn from_session(session: &PracticeSession, now: DateTime<Utc>) -> Self {
        Self {
            id: session.id(),
            package_id: session.package_id(),
            status: session.status(),
            is_timed: session.is_timed(),
            time_limit_seconds: session.time_limit_seconds(),
            time_remaining_seconds: session.time_remaining_seconds(now),
            target_count: session.target_count(),
            current_index: session.current_index(),
            correct_count: session.correct_count(),
            created_at: session.created_at(),
            last_activity_at: session.last_activity_at(),
        }
    }
}

/// An offset page of results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub limit: u32,
    pub offset: u32,
    pub has_more: bool,
}

/// Result of a scored submission. The explanation is disclosed immediately.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnswerOutcome {
    pub question_id: QuestionId,
    pub correct: bool,
    pub explanation: String,
    pub correct_choice_id: ChoiceId,
    pub time_taken_seconds: u32,
    pub done: bool,
    pub current_index: usize,
    pub correct_count: u32,
    pub next_question: Option<QuestionView>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use practice_core::model::UserId;
    use practice_core::time::fixed_now;

    #[test]
    fn time_remaining_only_for_timed_active_sessions() {
        let order = vec![QuestionId::new(1), QuestionId::new(2)];
        let timed = PracticeSession::new(
            SessionId::generate(),
            UserId::new(1),
            None,
            Some(120),
            order.clone(),
            fixed_now(),
        )
        .unwrap();
        let untimed =
            PracticeSession::new(SessionId::generate(), UserId::new(1), None, None, order, fixed_now())
                .unwrap();

        let now = fixed_now() + Duration::seconds(45);
        assert_eq!(
            SessionListItem::from_session(&timed, now).time_remaining_seconds,
            Some(75)
        );
        assert_eq!(
            SessionListItem::from_session(&untimed, now).time_remaining_seconds,
            None
        );
    }

    #[test]
    fn time_spent_follows_question_order() {
        let mut session = PracticeSession::new(
            SessionId::generate(),
            UserId::new(1),
            None,
            None,
            vec![QuestionId::new(9), QuestionId::new(3)],
            fixed_now(),
        )
        .unwrap();
        session
            .record_answer(QuestionId::new(9), true, fixed_now() + Duration::seconds(8))
            .unwrap();

        let view = SessionView::from_session(&session, fixed_now(), None);
        assert_eq!(
            view.time_spent,
            vec![QuestionTime {
                question_id: QuestionId::new(9),
                seconds: 8
            }]
        );
        assert_eq!(view.current_index, 1);
    }

    #[test]
    fn serialized_view_does_not_leak_the_answer_key() {
        use practice_core::model::{Choice, QuestionItem};

        let item = QuestionItem::new(
            QuestionId::new(1),
            None,
            "2 + 2?",
            vec![
                Choice::new(ChoiceId::new(1), "4"),
                Choice::new(ChoiceId::new(2), "5"),
            ],
            ChoiceId::new(1),
            "arithmetic",
        )
        .unwrap();
        let session = PracticeSession::new(
            SessionId::generate(),
            UserId::new(1),
            None,
            None,
            vec![item.id()],
            fixed_now(),
        )
        .unwrap();

        let view = SessionView::from_session(&session, fixed_now(), Some(item.view()));
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["status"], "active");
        assert_eq!(json["current_question"]["prompt"], "2 + 2?");
        assert!(json["current_question"].get("correct_choice_id").is_none());
        assert!(json["current_question"].get("explanation").is_none());
    }
}
