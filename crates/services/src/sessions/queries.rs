use std::collections::HashMap;

use practice_core::model::{
    PackageId, PracticeSession, QuestionId, QuestionItem, QuestionView, SessionStatus,
};
use storage::repository::{QuestionBank, StorageError};

use crate::error::SessionError;

/// Question bank lookups shared by the engine entry points.
pub(crate) struct SessionQueries;

impl SessionQueries {
    /// First `count` candidate ids for a new session.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Empty` when the bank has no candidates.
    pub async fn select_questions(
        bank: &dyn QuestionBank,
        package_id: Option<PackageId>,
        count: u32,
    ) -> Result<Vec<QuestionId>, SessionError> {
        let mut ids = bank.candidate_ids(package_id, count).await?;
        ids.truncate(usize::try_from(count).unwrap_or(usize::MAX));
        if ids.is_empty() {
            return Err(SessionError::Empty);
        }
        Ok(ids)
    }

    /// Fetch one bank entry, reporting absence as `UnknownQuestion`.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::UnknownQuestion` if the bank lacks `id`.
    pub async fn item(bank: &dyn QuestionBank, id: QuestionId) -> Result<QuestionItem, SessionError> {
        match bank.get_item(id).await {
            Ok(item) => Ok(item),
            Err(StorageError::NotFound) => Err(SessionError::UnknownQuestion(id)),
            Err(err) => Err(err.into()),
        }
    }

    /// Client-safe view of the question the session is serving, if any.
    ///
    /// Finished and paused sessions do not expose a question.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::UnknownQuestion` if the bank lost the entry.
    pub async fn current_view(
        bank: &dyn QuestionBank,
        session: &PracticeSession,
    ) -> Result<Option<QuestionView>, SessionError> {
        if session.status() != SessionStatus::Active {
            return Ok(None);
        }
        match session.current_question() {
            Some(id) => Ok(Some(Self::item(bank, id).await?.view())),
            None => Ok(None),
        }
    }

    /// Every bank entry referenced by the session's question order.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::UnknownQuestion` for the first missing entry.
    pub async fn items_for(
        bank: &dyn QuestionBank,
        session: &PracticeSession,
    ) -> Result<HashMap<QuestionId, QuestionItem>, SessionError> {
        let mut items = HashMap::with_capacity(session.target_count());
        for id in session.question_order() {
            items.insert(*id, Self::item(bank, *id).await?);
        }
        Ok(items)
    }
}
