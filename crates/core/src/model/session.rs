use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::model::ids::{PackageId, QuestionId, SessionId, UserId};
use crate::time::seconds_between;

//
// ─── ERRORS ───────────────────────────────────────────────────────────────────
//

/// A transition that the session's current state does not allow.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SessionStateError {
    #[error("timed sessions cannot be paused or resumed")]
    InvalidForTimed,

    #[error("session is already finished")]
    AlreadyFinished,

    #[error("session is not active")]
    NotActive,

    #[error("session is not paused")]
    NotPaused,

    #[error("every question in the session has been answered")]
    Complete,

    #[error("expected an answer for question {expected}, got {got}")]
    Mismatch { expected: QuestionId, got: QuestionId },
}

/// Rejected session shape, at creation or when rehydrating persisted state.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SessionBuildError {
    #[error("a session needs at least one question")]
    EmptyQuestionOrder,

    #[error("question {0} appears more than once")]
    DuplicateQuestion(QuestionId),

    #[error("time limit must be positive")]
    ZeroTimeLimit,

    #[error("current index {index} is past the last question ({len})")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("persisted state is inconsistent: {0}")]
    InvalidPersistedState(String),
}

//
// ─── STATUS ───────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Paused,
    Finished,
}

impl SessionStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::Paused => "paused",
            SessionStatus::Finished => "finished",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown session status: {0}")]
pub struct ParseStatusError(String);

impl FromStr for SessionStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "active" => Ok(Self::Active),
            "paused" => Ok(Self::Paused),
            "finished" => Ok(Self::Finished),
            other => Err(ParseStatusError(other.to_owned())),
        }
    }
}

//
// ─── TRANSITION OUTCOMES ──────────────────────────────────────────────────────
//

/// Result of a pause request that was allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseOutcome {
    /// The session moved from `Active` to `Paused`.
    Paused,
    /// The session was already paused; nothing changed.
    AlreadyPaused,
}

/// Bookkeeping produced by recording an answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnswerProgress {
    /// Position of the answered question in the question order.
    pub index: usize,
    /// Total seconds accumulated on the answered question.
    pub time_taken_seconds: u32,
    /// Whether this answer finished the session.
    pub done: bool,
}

//
// ─── PERSISTED SHAPE ──────────────────────────────────────────────────────────
//

/// Every field of a session as stored by a repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub id: SessionId,
    pub user_id: UserId,
    pub package_id: Option<PackageId>,
    pub time_limit_seconds: Option<u32>,
    pub question_order: Vec<QuestionId>,
    pub current_index: usize,
    pub correct_count: u32,
    pub status: SessionStatus,
    pub elapsed_seconds: BTreeMap<QuestionId, u32>,
    pub created_at: DateTime<Utc>,
    pub started_at: DateTime<Utc>,
    pub current_question_started_at: DateTime<Utc>,
    pub paused_at: Option<DateTime<Utc>>,
    pub last_activity_at: DateTime<Utc>,
    pub revision: u64,
}

//
// ─── SESSION ──────────────────────────────────────────────────────────────────
//

/// A student's run through a fixed, ordered list of questions.
///
/// All transitions are pure functions of `(self, now)`. Nothing here reads the
/// clock or touches storage; callers persist the result with a conditional
/// write keyed on the status and revision observed before the transition.
///
/// Every mutating transition bumps `revision`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PracticeSession {
    id: SessionId,
    user_id: UserId,
    package_id: Option<PackageId>,
    time_limit_seconds: Option<u32>,
    question_order: Vec<QuestionId>,
    current_index: usize,
    correct_count: u32,
    status: SessionStatus,
    elapsed_seconds: BTreeMap<QuestionId, u32>,
    created_at: DateTime<Utc>,
    started_at: DateTime<Utc>,
    current_question_started_at: DateTime<Utc>,
    paused_at: Option<DateTime<Utc>>,
    last_activity_at: DateTime<Utc>,
    revision: u64,
}

fn check_order(order: &[QuestionId]) -> Result<(), SessionBuildError> {
    if order.is_empty() {
        return Err(SessionBuildError::EmptyQuestionOrder);
    }
    let mut seen = HashSet::with_capacity(order.len());
    for id in order {
        if !seen.insert(*id) {
            return Err(SessionBuildError::DuplicateQuestion(*id));
        }
    }
    Ok(())
}

impl PracticeSession {
    /// Start a new session at `now`.
    ///
    /// `time_limit_seconds` is `Some` for timed sessions.
    ///
    /// # Errors
    ///
    /// Returns `SessionBuildError` if the order is empty or repeats a question,
    /// or if the time limit is zero.
    pub fn new(
        id: SessionId,
        user_id: UserId,
        package_id: Option<PackageId>,
        time_limit_seconds: Option<u32>,
        question_order: Vec<QuestionId>,
        now: DateTime<Utc>,
    ) -> Result<Self, SessionBuildError> {
        check_order(&question_order)?;
        if time_limit_seconds == Some(0) {
            return Err(SessionBuildError::ZeroTimeLimit);
        }

        Ok(Self {
            id,
            user_id,
            package_id,
            time_limit_seconds,
            question_order,
            current_index: 0,
            correct_count: 0,
            status: SessionStatus::Active,
            elapsed_seconds: BTreeMap::new(),
            created_at: now,
            started_at: now,
            current_question_started_at: now,
            paused_at: None,
            last_activity_at: now,
            revision: 0,
        })
    }

    /// Rehydrate a session from persisted storage.
    ///
    /// # Errors
    ///
    /// Returns `SessionBuildError` if the snapshot violates a session invariant.
    pub fn from_snapshot(s: SessionSnapshot) -> Result<Self, SessionBuildError> {
        check_order(&s.question_order)?;
        if s.time_limit_seconds == Some(0) {
            return Err(SessionBuildError::ZeroTimeLimit);
        }
        let len = s.question_order.len();
        if s.current_index > len {
            return Err(SessionBuildError::IndexOutOfRange {
                index: s.current_index,
                len,
            });
        }
        if s.current_index == len && s.status != SessionStatus::Finished {
            return Err(SessionBuildError::InvalidPersistedState(
                "all questions answered but session not finished".into(),
            ));
        }
        if s.time_limit_seconds.is_some() && s.status == SessionStatus::Paused {
            return Err(SessionBuildError::InvalidPersistedState(
                "timed session is paused".into(),
            ));
        }
        if usize::try_from(s.correct_count).map_or(true, |c| c > s.current_index) {
            return Err(SessionBuildError::InvalidPersistedState(
                "more correct answers than answered questions".into(),
            ));
        }
        if let Some(stray) = s
            .elapsed_seconds
            .keys()
            .find(|q| !s.question_order.contains(q))
        {
            return Err(SessionBuildError::InvalidPersistedState(format!(
                "time recorded for question {stray} outside the session"
            )));
        }

        Ok(Self {
            id: s.id,
            user_id: s.user_id,
            package_id: s.package_id,
            time_limit_seconds: s.time_limit_seconds,
            question_order: s.question_order,
            current_index: s.current_index,
            correct_count: s.correct_count,
            status: s.status,
            elapsed_seconds: s.elapsed_seconds,
            created_at: s.created_at,
            started_at: s.started_at,
            current_question_started_at: s.current_question_started_at,
            paused_at: s.paused_at,
            last_activity_at: s.last_activity_at,
            revision: s.revision,
        })
    }

    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    #[must_use]
    pub fn package_id(&self) -> Option<PackageId> {
        self.package_id
    }

    #[must_use]
    pub fn is_timed(&self) -> bool {
        self.time_limit_seconds.is_some()
    }

    #[must_use]
    pub fn time_limit_seconds(&self) -> Option<u32> {
        self.time_limit_seconds
    }

    #[must_use]
    pub fn question_order(&self) -> &[QuestionId] {
        &self.question_order
    }

    #[must_use]
    pub fn target_count(&self) -> usize {
        self.question_order.len()
    }

    #[must_use]
    pub fn current_index(&self) -> usize {
        self.current_index
    }

    /// Question currently being served, `None` once every question is answered.
    #[must_use]
    pub fn current_question(&self) -> Option<QuestionId> {
        self.question_order.get(self.current_index).copied()
    }

    #[must_use]
    pub fn correct_count(&self) -> u32 {
        self.correct_count
    }

    #[must_use]
    pub fn status(&self) -> SessionStatus {
        self.status
    }

    #[must_use]
    pub fn elapsed_seconds(&self) -> &BTreeMap<QuestionId, u32> {
        &self.elapsed_seconds
    }

    /// Seconds accumulated on `question_id`, zero if it was never current.
    #[must_use]
    pub fn elapsed_for(&self, question_id: QuestionId) -> u32 {
        self.elapsed_seconds.get(&question_id).copied().unwrap_or(0)
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    #[must_use]
    pub fn current_question_started_at(&self) -> DateTime<Utc> {
        self.current_question_started_at
    }

    #[must_use]
    pub fn paused_at(&self) -> Option<DateTime<Utc>> {
        self.paused_at
    }

    #[must_use]
    pub fn last_activity_at(&self) -> DateTime<Utc> {
        self.last_activity_at
    }

    #[must_use]
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Instant the time budget runs out, for timed sessions.
    #[must_use]
    pub fn deadline(&self) -> Option<DateTime<Utc>> {
        self.time_limit_seconds
            .map(|limit| self.started_at + Duration::seconds(i64::from(limit)))
    }

    /// True when a timed session has used up its budget at `now`.
    #[must_use]
    pub fn is_past_deadline(&self, now: DateTime<Utc>) -> bool {
        self.time_limit_seconds
            .is_some_and(|limit| seconds_between(self.started_at, now) >= limit)
    }

    /// Seconds left on the budget; only reported for timed, active sessions.
    #[must_use]
    pub fn time_remaining_seconds(&self, now: DateTime<Utc>) -> Option<u32> {
        if self.status != SessionStatus::Active {
            return None;
        }
        self.time_limit_seconds
            .map(|limit| limit.saturating_sub(seconds_between(self.started_at, now)))
    }

    /// True when the session ended because the budget lapsed rather than
    /// because every question was answered.
    #[must_use]
    pub fn finished_by_time(&self) -> bool {
        self.status == SessionStatus::Finished
            && self.is_timed()
            && self.current_index < self.question_order.len()
    }

    //
    // ─── TRANSITIONS ─────────────────────────────────────────────────────────
    //

    /// Force-finish a timed, active session whose budget has lapsed.
    ///
    /// Credits the current question with the time spent on it up to the
    /// deadline; time past the deadline is never counted. Returns `true` when
    /// the session transitioned. A no-op for untimed, paused and finished
    /// sessions, so repeated calls never re-credit time.
    pub fn expire_if_due(&mut self, now: DateTime<Utc>) -> bool {
        if self.status != SessionStatus::Active || !self.is_past_deadline(now) {
            return false;
        }
        let until = self.deadline().map_or(now, |deadline| deadline.min(now));
        self.credit_current(until);
        self.status = SessionStatus::Finished;
        self.touch(now);
        true
    }

    /// Pause an untimed, active session.
    ///
    /// # Errors
    ///
    /// `InvalidForTimed` for any timed session, `AlreadyFinished` once the
    /// session has finished.
    pub fn pause(&mut self, now: DateTime<Utc>) -> Result<PauseOutcome, SessionStateError> {
        if self.is_timed() {
            return Err(SessionStateError::InvalidForTimed);
        }
        match self.status {
            SessionStatus::Finished => Err(SessionStateError::AlreadyFinished),
            SessionStatus::Paused => Ok(PauseOutcome::AlreadyPaused),
            SessionStatus::Active => {
                self.credit_current(now);
                self.status = SessionStatus::Paused;
                self.paused_at = Some(now);
                self.touch(now);
                Ok(PauseOutcome::Paused)
            }
        }
    }

    /// Resume a paused session. The time spent paused is never counted.
    ///
    /// # Errors
    ///
    /// `InvalidForTimed`, `AlreadyFinished`, or `NotPaused` for an active
    /// session.
    pub fn resume(&mut self, now: DateTime<Utc>) -> Result<(), SessionStateError> {
        if self.is_timed() {
            return Err(SessionStateError::InvalidForTimed);
        }
        match self.status {
            SessionStatus::Finished => Err(SessionStateError::AlreadyFinished),
            SessionStatus::Active => Err(SessionStateError::NotPaused),
            SessionStatus::Paused => {
                self.status = SessionStatus::Active;
                self.paused_at = None;
                self.current_question_started_at = now;
                self.touch(now);
                Ok(())
            }
        }
    }

    /// Check that `question_id` may be answered now, without mutating anything.
    ///
    /// # Errors
    ///
    /// `Complete` when finished, `NotActive` when paused, `Mismatch` when the
    /// submission does not address the current question.
    pub fn ensure_accepts_answer(&self, question_id: QuestionId) -> Result<(), SessionStateError> {
        match self.status {
            SessionStatus::Finished => return Err(SessionStateError::Complete),
            SessionStatus::Paused => return Err(SessionStateError::NotActive),
            SessionStatus::Active => {}
        }
        let expected = self.current_question().ok_or(SessionStateError::Complete)?;
        if expected != question_id {
            return Err(SessionStateError::Mismatch {
                expected,
                got: question_id,
            });
        }
        Ok(())
    }

    /// Score the current question and advance to the next one.
    ///
    /// # Errors
    ///
    /// Same as [`Self::ensure_accepts_answer`]; on error nothing changes.
    pub fn record_answer(
        &mut self,
        question_id: QuestionId,
        correct: bool,
        now: DateTime<Utc>,
    ) -> Result<AnswerProgress, SessionStateError> {
        self.ensure_accepts_answer(question_id)?;

        let index = self.current_index;
        self.credit_current(now);
        if correct {
            self.correct_count = self.correct_count.saturating_add(1);
        }
        self.current_index += 1;
        self.current_question_started_at = now;
        let done = self.current_index == self.question_order.len();
        if done {
            self.status = SessionStatus::Finished;
        }
        self.touch(now);

        Ok(AnswerProgress {
            index,
            time_taken_seconds: self.elapsed_for(question_id),
            done,
        })
    }

    fn credit_current(&mut self, until: DateTime<Utc>) {
        let Some(question_id) = self.current_question() else {
            return;
        };
        let spent = seconds_between(self.current_question_started_at, until);
        let slot = self.elapsed_seconds.entry(question_id).or_insert(0);
        *slot = slot.saturating_add(spent);
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.last_activity_at = now;
        self.revision += 1;
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
