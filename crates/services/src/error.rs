//! Shared error types for the services crate.

use thiserror::Error;

use practice_core::model::{
    ChoiceId, QuestionId, ReviewError, SessionBuildError, SessionStateError,
};
use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;

/// Coarse classification of engine errors for an outer API layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Session or question absent, or not owned by the caller.
    NotFound,
    /// The session's status forbids the operation.
    InvalidState,
    /// The submission addressed something other than the current question.
    Mismatch,
    /// The time budget ran out; the session has been finished.
    TimeExpired,
    /// A concurrent writer changed the session first.
    Conflict,
    Persistence,
}

/// Errors emitted by `PracticeService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SessionError {
    #[error("session not found")]
    NotFound,
    #[error("no questions available for session")]
    Empty,
    #[error("time limit exceeded; session finished")]
    TimeExpired,
    #[error("session is not finished")]
    NotFinished,
    #[error("question {0} is not in the question bank")]
    UnknownQuestion(QuestionId),
    #[error("choice {choice} does not belong to question {question}")]
    UnknownChoice {
        question: QuestionId,
        choice: ChoiceId,
    },
    #[error("session was modified concurrently")]
    Conflict,
    #[error(transparent)]
    State(#[from] SessionStateError),
    #[error(transparent)]
    Build(#[from] SessionBuildError),
    #[error(transparent)]
    Review(ReviewError),
    #[error(transparent)]
    Storage(StorageError),
}

impl From<ReviewError> for SessionError {
    fn from(err: ReviewError) -> Self {
        match err {
            ReviewError::NotFinished => Self::NotFinished,
            ReviewError::MissingQuestion(id) => Self::UnknownQuestion(id),
            other => Self::Review(other),
        }
    }
}

impl From<StorageError> for SessionError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound => Self::NotFound,
            StorageError::Conflict => Self::Conflict,
            other => Self::Storage(other),
        }
    }
}

impl SessionError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound | Self::Empty | Self::UnknownQuestion(_) => ErrorKind::NotFound,
            Self::State(SessionStateError::Mismatch { .. }) | Self::UnknownChoice { .. } => {
                ErrorKind::Mismatch
            }
            Self::State(_) | Self::NotFinished | Self::Build(_) | Self::Review(_) => {
                ErrorKind::InvalidState
            }
            Self::TimeExpired => ErrorKind::TimeExpired,
            Self::Conflict => ErrorKind::Conflict,
            Self::Storage(_) => ErrorKind::Persistence,
        }
    }
}

/// Errors emitted when validating `EngineConfig`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("seconds per question must be positive")]
    ZeroSecondsPerQuestion,
    #[error("max questions must be positive")]
    ZeroMaxQuestions,
    #[error("page sizes must satisfy 1 <= default ({default}) <= max ({max})")]
    InvalidPageSize { default: u32, max: u32 },
}

/// Errors emitted while bootstrapping app services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppServicesError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_errors_map_to_engine_errors() {
        assert!(matches!(
            SessionError::from(StorageError::NotFound),
            SessionError::NotFound
        ));
        assert!(matches!(
            SessionError::from(StorageError::Conflict),
            SessionError::Conflict
        ));
        let err = SessionError::from(StorageError::Connection("down".into()));
        assert_eq!(err.kind(), ErrorKind::Persistence);
    }

    #[test]
    fn kinds_follow_taxonomy() {
        let mismatch = SessionError::State(SessionStateError::Mismatch {
            expected: QuestionId::new(1),
            got: QuestionId::new(2),
        });
        assert_eq!(mismatch.kind(), ErrorKind::Mismatch);
        assert_eq!(
            SessionError::State(SessionStateError::InvalidForTimed).kind(),
            ErrorKind::InvalidState
        );
        assert_eq!(SessionError::TimeExpired.kind(), ErrorKind::TimeExpired);
        assert_eq!(
            SessionError::UnknownQuestion(QuestionId::new(9)).kind(),
            ErrorKind::NotFound
        );
    }
}
