use async_trait::async_trait;
use chrono::{DateTime, Utc};
use practice_core::model::{
    AnswerRecord, PackageId, PracticeSession, QuestionId, QuestionItem, SessionId, SessionStatus,
    UserId,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// State a conditional write expects to find in storage.
///
/// Captured from a session *before* it is mutated; the write only applies if
/// the stored row still has this status and revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionPrecondition {
    pub status: SessionStatus,
    pub revision: u64,
}

impl SessionPrecondition {
    #[must_use]
    pub fn capture(session: &PracticeSession) -> Self {
        Self {
            status: session.status(),
            revision: session.revision(),
        }
    }

    #[must_use]
    pub fn matches(&self, stored: &PracticeSession) -> bool {
        stored.status() == self.status && stored.revision() == self.revision
    }
}

/// Read-only source of quiz questions.
#[async_trait]
pub trait QuestionBank: Send + Sync {
    /// Up to `count` candidate ids, ascending, optionally scoped to a package.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn candidate_ids(
        &self,
        package_id: Option<PackageId>,
        count: u32,
    ) -> Result<Vec<QuestionId>, StorageError>;

    /// Fetch one question including its answer key.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the bank has no such question.
    async fn get_item(&self, id: QuestionId) -> Result<QuestionItem, StorageError>;
}

/// Durable session records, keyed by `(user, session)`.
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Store a freshly created session.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if the id is already taken.
    async fn insert_session(&self, session: &PracticeSession) -> Result<(), StorageError>;

    /// Load a session owned by `user_id`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if it does not exist or belongs to
    /// someone else.
    async fn load_session(
        &self,
        user_id: UserId,
        id: SessionId,
    ) -> Result<PracticeSession, StorageError>;

    /// Conditionally overwrite the mutable state of a session.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` when the stored status or revision no
    /// longer matches `expected`, `StorageError::NotFound` when the session is
    /// gone.
    async fn save_session(
        &self,
        session: &PracticeSession,
        expected: SessionPrecondition,
    ) -> Result<(), StorageError>;

    /// A page of a user's sessions, newest first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn list_sessions(
        &self,
        user_id: UserId,
        status: Option<SessionStatus>,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<PracticeSession>, StorageError>;

    /// A user's active timed sessions whose deadline is at or before `now`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn due_timed_sessions(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<Vec<PracticeSession>, StorageError>;
}

#[async_trait]
pub trait AnswerLogRepository: Send + Sync {
    /// Answers recorded for a session, in question order.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn answers_for_session(
        &self,
        session_id: SessionId,
    ) -> Result<Vec<AnswerRecord>, StorageError>;
}

/// Atomic "save session + append answer".
#[async_trait]
pub trait AnswerPersistence: Send + Sync {
    /// Apply the scored session and append its answer record as one unit:
    /// either both become visible or neither does.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if the precondition fails or an answer
    /// already exists at that position.
    async fn apply_answer(
        &self,
        session: &PracticeSession,
        expected: SessionPrecondition,
        answer: &AnswerRecord,
    ) -> Result<(), StorageError>;
}

#[derive(Default)]
struct MemoryState {
    sessions: HashMap<SessionId, PracticeSession>,
    answers: Vec<AnswerRecord>,
    questions: BTreeMap<QuestionId, QuestionItem>,
}

/// Simple in-memory repository implementation for testing and prototyping.
///
/// One mutex guards all collections so conditional writes and answer appends
/// are atomic with respect to each other.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    state: Arc<Mutex<MemoryState>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, MemoryState>, StorageError> {
        self.state
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))
    }

    /// Add or replace a question in the bank.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Connection` if the lock is poisoned.
    pub async fn upsert_question(&self, item: QuestionItem) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        guard.questions.insert(item.id(), item);
        Ok(())
    }
}

#[async_trait]
impl QuestionBank for InMemoryRepository {
    async fn candidate_ids(
        &self,
        package_id: Option<PackageId>,
        count: u32,
    ) -> Result<Vec<QuestionId>, StorageError> {
        let guard = self.lock()?;
        let take = usize::try_from(count).unwrap_or(usize::MAX);
        Ok(guard
            .questions
            .values()
            .filter(|q| package_id.is_none() || q.package_id() == package_id)
            .map(QuestionItem::id)
            .take(take)
            .collect())
    }

    async fn get_item(&self, id: QuestionId) -> Result<QuestionItem, StorageError> {
        let guard = self.lock()?;
        guard.questions.get(&id).cloned().ok_or(StorageError::NotFound)
    }
}

fn check_precondition(
    stored: Option<&PracticeSession>,
    session: &PracticeSession,
    expected: SessionPrecondition,
) -> Result<(), StorageError> {
    let stored = stored
        .filter(|s| s.user_id() == session.user_id())
        .ok_or(StorageError::NotFound)?;
    if expected.matches(stored) {
        Ok(())
    } else {
        Err(StorageError::Conflict)
    }
}

#[async_trait]
impl SessionRepository for InMemoryRepository {
    async fn insert_session(&self, session: &PracticeSession) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        if guard.sessions.contains_key(&session.id()) {
            return Err(StorageError::Conflict);
        }
        guard.sessions.insert(session.id(), session.clone());
        Ok(())
    }

    async fn load_session(
        &self,
        user_id: UserId,
        id: SessionId,
    ) -> Result<PracticeSession, StorageError> {
        let guard = self.lock()?;
        guard
            .sessions
            .get(&id)
            .filter(|s| s.user_id() == user_id)
            .cloned()
            .ok_or(StorageError::NotFound)
    }

    async fn save_session(
        &self,
        session: &PracticeSession,
        expected: SessionPrecondition,
    ) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        check_precondition(guard.sessions.get(&session.id()), session, expected)?;
        guard.sessions.insert(session.id(), session.clone());
        Ok(())
    }

    async fn list_sessions(
        &self,
        user_id: UserId,
        status: Option<SessionStatus>,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<PracticeSession>, StorageError> {
        let guard = self.lock()?;
        let mut sessions: Vec<PracticeSession> = guard
            .sessions
            .values()
            .filter(|s| s.user_id() == user_id)
            .filter(|s| status.is_none_or(|wanted| s.status() == wanted))
            .cloned()
            .collect();
        sessions.sort_by(|a, b| {
            b.created_at()
                .cmp(&a.created_at())
                .then_with(|| b.id().cmp(&a.id()))
        });
        Ok(sessions
            .into_iter()
            .skip(usize::try_from(offset).unwrap_or(usize::MAX))
            .take(usize::try_from(limit).unwrap_or(usize::MAX))
            .collect())
    }

    async fn due_timed_sessions(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<Vec<PracticeSession>, StorageError> {
        let guard = self.lock()?;
        Ok(guard
            .sessions
            .values()
            .filter(|s| s.user_id() == user_id)
            .filter(|s| s.status() == SessionStatus::Active && s.is_past_deadline(now))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl AnswerLogRepository for InMemoryRepository {
    async fn answers_for_session(
        &self,
        session_id: SessionId,
    ) -> Result<Vec<AnswerRecord>, StorageError> {
        let guard = self.lock()?;
        let mut answers: Vec<AnswerRecord> = guard
            .answers
            .iter()
            .filter(|a| a.session_id == session_id)
            .cloned()
            .collect();
        answers.sort_by_key(|a| a.index);
        Ok(answers)
    }
}

#[async_trait]
impl AnswerPersistence for InMemoryRepository {
    async fn apply_answer(
        &self,
        session: &PracticeSession,
        expected: SessionPrecondition,
        answer: &AnswerRecord,
    ) -> Result<(), StorageError> {
        if answer.session_id != session.id() {
            return Err(StorageError::Conflict);
        }
        let mut guard = self.lock()?;
        check_precondition(guard.sessions.get(&session.id()), session, expected)?;
        if guard
            .answers
            .iter()
            .any(|a| a.session_id == answer.session_id && a.index == answer.index)
        {
            return Err(StorageError::Conflict);
        }
        guard.sessions.insert(session.id(), session.clone());
        guard.answers.push(answer.clone());
        Ok(())
    }
}

/// Aggregates the session-engine repositories behind trait objects for easy
/// backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub sessions: Arc<dyn SessionRepository>,
    pub answers: Arc<dyn AnswerLogRepository>,
    pub answer_writes: Arc<dyn AnswerPersistence>,
    pub questions: Arc<dyn QuestionBank>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        Self::from_in_memory(&InMemoryRepository::new())
    }

    /// Wire every repository to the same in-memory backend.
    #[must_use]
    pub fn from_in_memory(repo: &InMemoryRepository) -> Self {
        Self {
            sessions: Arc::new(repo.clone()),
            answers: Arc::new(repo.clone()),
            answer_writes: Arc::new(repo.clone()),
            questions: Arc::new(repo.clone()),
        }
    }
}
