use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use practice_core::model::PracticeSession;
use storage::repository::{SessionPrecondition, SessionRepository, StorageError};

use crate::error::SessionError;

/// Reload-and-retry budget when a lazy expiry write loses a race.
pub(crate) const MAX_EXPIRY_ATTEMPTS: usize = 3;

/// Finish `session` if its time budget has lapsed and persist the transition.
///
/// Runs at the top of every engine entry point. The write is conditional on
/// the status and revision the session had before expiring; on conflict the
/// fresh record replaces `session` and resolution runs again, so a writer that
/// already finished the session wins and no time is credited twice.
///
/// Returns `true` only when this call performed the transition.
pub(crate) async fn resolve_expiry(
    sessions: &dyn SessionRepository,
    session: &mut PracticeSession,
    now: DateTime<Utc>,
) -> Result<bool, SessionError> {
    for attempt in 1..=MAX_EXPIRY_ATTEMPTS {
        let expected = SessionPrecondition::capture(session);
        if !session.expire_if_due(now) {
            return Ok(false);
        }

        match sessions.save_session(session, expected).await {
            Ok(()) => {
                info!(
                    session_id = %session.id(),
                    user_id = %session.user_id(),
                    answered = session.current_index(),
                    target = session.target_count(),
                    "timed session expired"
                );
                return Ok(true);
            }
            Err(StorageError::Conflict) => {
                warn!(
                    session_id = %session.id(),
                    attempt,
                    "expiry write conflicted; reloading"
                );
                *session = sessions
                    .load_session(session.user_id(), session.id())
                    .await?;
            }
            Err(err) => return Err(err.into()),
        }
    }

    debug!(session_id = %session.id(), "expiry retries exhausted");
    Err(SessionError::Conflict)
}

#[cfg(test)]
mod tests {
    use super::*;
    use practice_core::model::{QuestionId, SessionId, SessionStatus, UserId};
    use practice_core::time::fixed_now;
    use chrono::Duration;
    use storage::repository::InMemoryRepository;

    fn timed_session() -> PracticeSession {
        PracticeSession::new(
            SessionId::generate(),
            UserId::new(1),
            None,
            Some(120),
            vec![QuestionId::new(1), QuestionId::new(2)],
            fixed_now(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn expires_once_and_persists() {
        let repo = InMemoryRepository::new();
        let mut session = timed_session();
        repo.insert_session(&session).await.unwrap();

        let late = fixed_now() + Duration::seconds(125);
        assert!(resolve_expiry(&repo, &mut session, late).await.unwrap());
        assert!(!resolve_expiry(&repo, &mut session, late).await.unwrap());

        let stored = repo.load_session(UserId::new(1), session.id()).await.unwrap();
        assert_eq!(stored.status(), SessionStatus::Finished);
        assert_eq!(stored.elapsed_for(QuestionId::new(1)), 120);
    }

    #[tokio::test]
    async fn losing_a_race_adopts_the_winner() {
        let repo = InMemoryRepository::new();
        let session = timed_session();
        repo.insert_session(&session).await.unwrap();

        let mut winner = session.clone();
        let mut loser = session.clone();
        let late = fixed_now() + Duration::seconds(125);

        assert!(resolve_expiry(&repo, &mut winner, late).await.unwrap());
        let later = late + Duration::seconds(30);
        assert!(!resolve_expiry(&repo, &mut loser, later).await.unwrap());

        assert_eq!(loser, winner);
        assert_eq!(loser.elapsed_for(QuestionId::new(1)), 120);
    }

    #[tokio::test]
    async fn before_deadline_is_a_no_op() {
        let repo = InMemoryRepository::new();
        let mut session = timed_session();
        repo.insert_session(&session).await.unwrap();
        let before = session.clone();

        let early = fixed_now() + Duration::seconds(30);
        assert!(!resolve_expiry(&repo, &mut session, early).await.unwrap());
        assert_eq!(session, before);
    }
}
