use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use practice_core::model::{
    AnswerRecord, ChoiceId, PackageId, PauseOutcome, PracticeSession, QuestionId, ReviewItem,
    SessionId, SessionScore, SessionStatus, UserId, build_review,
};
use storage::repository::{
    AnswerLogRepository, AnswerPersistence, QuestionBank, SessionPrecondition, SessionRepository,
    Storage, StorageError,
};

use super::expiry::resolve_expiry;
use super::queries::SessionQueries;
use super::view::{AnswerOutcome, Page, SessionListItem, SessionView};
use crate::Clock;
use crate::config::EngineConfig;
use crate::error::SessionError;

/// The practice-session lifecycle engine.
///
/// Every entry point reads the clock once, loads the session scoped to its
/// owner, and resolves lazy expiry before doing anything else. Writes are
/// conditional on the status and revision the session had when loaded.
#[derive(Clone)]
pub struct PracticeService {
    clock: Clock,
    config: EngineConfig,
    sessions: Arc<dyn SessionRepository>,
    answers: Arc<dyn AnswerLogRepository>,
    answer_writes: Arc<dyn AnswerPersistence>,
    questions: Arc<dyn QuestionBank>,
}

impl PracticeService {
    #[must_use]
    pub fn new(
        clock: Clock,
        sessions: Arc<dyn SessionRepository>,
        answers: Arc<dyn AnswerLogRepository>,
        answer_writes: Arc<dyn AnswerPersistence>,
        questions: Arc<dyn QuestionBank>,
    ) -> Self {
        Self {
            clock,
            config: EngineConfig::default(),
            sessions,
            answers,
            answer_writes,
            questions,
        }
    }

    #[must_use]
    pub fn from_storage(clock: Clock, storage: &Storage) -> Self {
        Self::new(
            clock,
            Arc::clone(&storage.sessions),
            Arc::clone(&storage.answers),
            Arc::clone(&storage.answer_writes),
            Arc::clone(&storage.questions),
        )
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn clock(&self) -> Clock {
        self.clock
    }

    #[must_use]
    pub fn config(&self) -> EngineConfig {
        self.config
    }

    //
    // ─── CREATION ──────────────────────────────────────────────────────────────
    //

    /// Start a new session over the first `count` bank questions.
    ///
    /// `count` is clamped to `[1, max_questions]` and then to the number of
    /// candidates available. Timed sessions get a budget of
    /// `seconds_per_question` per selected question.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Empty` when the bank has no candidates, or
    /// storage errors.
    pub async fn create_session(
        &self,
        user_id: UserId,
        package_id: Option<PackageId>,
        timed: bool,
        count: u32,
    ) -> Result<SessionView, SessionError> {
        let now = self.clock.now();
        let requested = self.config.clamp_count(count);
        let order =
            SessionQueries::select_questions(self.questions.as_ref(), package_id, requested)
                .await?;

        let selected = u32::try_from(order.len()).unwrap_or(u32::MAX);
        let time_limit = timed.then(|| self.config.time_limit_for(selected));
        let session =
            PracticeSession::new(SessionId::generate(), user_id, package_id, time_limit, order, now)?;
        let first = SessionQueries::current_view(self.questions.as_ref(), &session).await?;

        self.sessions.insert_session(&session).await?;
        info!(
            session_id = %session.id(),
            user_id = %user_id,
            count = selected,
            timed,
            "practice session created"
        );

        Ok(SessionView::from_session(&session, now, first))
    }

    //
    // ─── READS ─────────────────────────────────────────────────────────────────
    //

    /// Current state of a session, finishing it first if its time ran out.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NotFound` for unknown or foreign sessions.
    pub async fn get_session(
        &self,
        user_id: UserId,
        session_id: SessionId,
    ) -> Result<SessionView, SessionError> {
        let now = self.clock.now();
        let session = self.load_resolved(user_id, session_id, now).await?;
        self.view(&session, now).await
    }

    /// One page of the caller's sessions, newest first.
    ///
    /// Every lapsed timed session of the caller is expired before the page is
    /// read, so the status filter and `offset` see post-expiry statuses.
    ///
    /// # Errors
    ///
    /// Returns `SessionError` on storage failures.
    pub async fn list_sessions(
        &self,
        user_id: UserId,
        status: Option<SessionStatus>,
        limit: Option<u32>,
        offset: u32,
    ) -> Result<Page<SessionListItem>, SessionError> {
        let now = self.clock.now();
        let limit = self.config.clamp_page_size(limit);

        let due = self.sessions.due_timed_sessions(user_id, now).await?;
        if !due.is_empty() {
            debug!(user_id = %user_id, count = due.len(), "expiring lapsed sessions before listing");
        }
        for mut session in due {
            resolve_expiry(self.sessions.as_ref(), &mut session, now).await?;
        }

        let mut rows = self
            .sessions
            .list_sessions(user_id, status, limit.saturating_add(1), offset)
            .await?;

        let page_len = usize::try_from(limit).unwrap_or(usize::MAX);
        let has_more = rows.len() > page_len;
        rows.truncate(page_len);

        let items = rows
            .iter()
            .map(|session| SessionListItem::from_session(session, now))
            .collect();

        Ok(Page {
            items,
            limit,
            offset,
            has_more,
        })
    }

    /// Score of a session; `accuracy` is over the full question count.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NotFound` for unknown or foreign sessions.
    pub async fn get_summary(
        &self,
        user_id: UserId,
        session_id: SessionId,
    ) -> Result<SessionScore, SessionError> {
        let now = self.clock.now();
        let session = self.load_resolved(user_id, session_id, now).await?;
        Ok(SessionScore::from_session(&session))
    }

    /// Rebuild the per-question review of a finished session.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NotFinished` while the session is still open.
    pub async fn get_review(
        &self,
        user_id: UserId,
        session_id: SessionId,
    ) -> Result<Vec<ReviewItem>, SessionError> {
        let now = self.clock.now();
        let session = self.load_resolved(user_id, session_id, now).await?;
        if session.status() != SessionStatus::Finished {
            return Err(SessionError::NotFinished);
        }

        let answers = self.answers.answers_for_session(session.id()).await?;
        let items = SessionQueries::items_for(self.questions.as_ref(), &session).await?;
        Ok(build_review(&session, &answers, &items)?)
    }

    //
    // ─── MUTATIONS ─────────────────────────────────────────────────────────────
    //

    /// Pause an untimed session. Pausing a paused session changes nothing.
    ///
    /// # Errors
    ///
    /// `State(InvalidForTimed)` for timed sessions, `State(AlreadyFinished)`
    /// once finished, `Conflict` if another writer got there first.
    pub async fn pause_session(
        &self,
        user_id: UserId,
        session_id: SessionId,
    ) -> Result<SessionView, SessionError> {
        let now = self.clock.now();
        let mut session = self.load_resolved(user_id, session_id, now).await?;
        let expected = SessionPrecondition::capture(&session);

        match session.pause(now)? {
            PauseOutcome::AlreadyPaused => {
                debug!(session_id = %session_id, "session already paused");
            }
            PauseOutcome::Paused => {
                self.sessions
                    .save_session(&session, expected)
                    .await
                    .map_err(|err| write_failed(session_id, "pause", err))?;
                info!(session_id = %session_id, user_id = %user_id, "session paused");
            }
        }

        self.view(&session, now).await
    }

    /// Resume a paused session; time spent paused is not counted.
    ///
    /// # Errors
    ///
    /// `State(InvalidForTimed)`, `State(AlreadyFinished)`, `State(NotPaused)`,
    /// or `Conflict`.
    pub async fn resume_session(
        &self,
        user_id: UserId,
        session_id: SessionId,
    ) -> Result<SessionView, SessionError> {
        let now = self.clock.now();
        let mut session = self.load_resolved(user_id, session_id, now).await?;
        let expected = SessionPrecondition::capture(&session);

        session.resume(now)?;
        self.sessions
            .save_session(&session, expected)
            .await
            .map_err(|err| write_failed(session_id, "resume", err))?;
        info!(session_id = %session_id, user_id = %user_id, "session resumed");

        self.view(&session, now).await
    }

    /// Score `choice_id` for the current question and advance.
    ///
    /// The session update and the answer log entry are written atomically.
    /// A submission never retries on conflict.
    ///
    /// # Errors
    ///
    /// `TimeExpired` if the budget lapsed (the session is finished and the
    /// answer discarded), `State(Complete | NotActive | Mismatch)`,
    /// `UnknownQuestion`, `UnknownChoice`, or `Conflict`.
    pub async fn submit_answer(
        &self,
        user_id: UserId,
        session_id: SessionId,
        question_id: QuestionId,
        choice_id: ChoiceId,
    ) -> Result<AnswerOutcome, SessionError> {
        let now = self.clock.now();
        let mut session = self.load_resolved(user_id, session_id, now).await?;
        if session.finished_by_time() {
            debug!(session_id = %session_id, "submission after time budget lapsed");
            return Err(SessionError::TimeExpired);
        }
        session.ensure_accepts_answer(question_id)?;

        let item = SessionQueries::item(self.questions.as_ref(), question_id).await?;
        if !item.has_choice(choice_id) {
            return Err(SessionError::UnknownChoice {
                question: question_id,
                choice: choice_id,
            });
        }
        let correct = item.is_correct(choice_id);

        let expected = SessionPrecondition::capture(&session);
        let progress = session.record_answer(question_id, correct, now)?;
        // Resolved before the commit so a bank failure cannot follow a persisted answer.
        let next_question = SessionQueries::current_view(self.questions.as_ref(), &session).await?;
        let answer = AnswerRecord::new(
            session.id(),
            progress.index,
            question_id,
            choice_id,
            correct,
            item.explanation(),
            progress.time_taken_seconds,
            now,
        );
        self.answer_writes
            .apply_answer(&session, expected, &answer)
            .await
            .map_err(|err| write_failed(session_id, "answer", err))?;
        info!(
            session_id = %session_id,
            user_id = %user_id,
            index = progress.index,
            correct,
            done = progress.done,
            "answer recorded"
        );

        Ok(AnswerOutcome {
            question_id,
            correct,
            explanation: answer.explanation,
            correct_choice_id: item.correct_choice_id(),
            time_taken_seconds: progress.time_taken_seconds,
            done: progress.done,
            current_index: session.current_index(),
            correct_count: session.correct_count(),
            next_question,
        })
    }

    //
    // ─── HELPERS ───────────────────────────────────────────────────────────────
    //

    async fn load_resolved(
        &self,
        user_id: UserId,
        session_id: SessionId,
        now: DateTime<Utc>,
    ) -> Result<PracticeSession, SessionError> {
        let mut session = self.sessions.load_session(user_id, session_id).await?;
        resolve_expiry(self.sessions.as_ref(), &mut session, now).await?;
        Ok(session)
    }

    async fn view(
        &self,
        session: &PracticeSession,
        now: DateTime<Utc>,
    ) -> Result<SessionView, SessionError> {
        let current = SessionQueries::current_view(self.questions.as_ref(), session).await?;
        Ok(SessionView::from_session(session, now, current))
    }
}

fn write_failed(session_id: SessionId, op: &'static str, err: StorageError) -> SessionError {
    if matches!(err, StorageError::Conflict) {
        warn!(session_id = %session_id, op, "conditional write lost to a concurrent update");
    }
    err.into()
}
