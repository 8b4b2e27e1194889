use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

use crate::model::ids::{ChoiceId, PackageId, QuestionId};

//
// ─── ERRORS ───────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum QuestionError {
    #[error("question prompt is empty")]
    EmptyPrompt,

    #[error("question has no choices")]
    NoChoices,

    #[error("duplicate choice id {0}")]
    DuplicateChoice(ChoiceId),

    #[error("correct choice {0} is not one of the choices")]
    UnknownCorrectChoice(ChoiceId),
}

//
// ─── CHOICE ───────────────────────────────────────────────────────────────────
//

/// One selectable answer of a multiple-choice question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Choice {
    pub id: ChoiceId,
    pub text: String,
}

impl Choice {
    #[must_use]
    pub fn new(id: ChoiceId, text: impl Into<String>) -> Self {
        Self {
            id,
            text: text.into(),
        }
    }
}

//
// ─── QUESTION ITEM ────────────────────────────────────────────────────────────
//

/// A question as served by the question bank, including the answer key.
///
/// Never hand this to a client before the question is answered; project it
/// with [`QuestionItem::view`] instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionItem {
    id: QuestionId,
    package_id: Option<PackageId>,
    prompt: String,
    choices: Vec<Choice>,
    correct_choice_id: ChoiceId,
    explanation: String,
}

impl QuestionItem {
    /// Build a validated question.
    ///
    /// # Errors
    ///
    /// Returns `QuestionError` if the prompt is blank, there are no choices,
    /// choice ids repeat, or the correct choice is not among the choices.
    pub fn new(
        id: QuestionId,
        package_id: Option<PackageId>,
        prompt: impl Into<String>,
        choices: Vec<Choice>,
        correct_choice_id: ChoiceId,
        explanation: impl Into<String>,
    ) -> Result<Self, QuestionError> {
        let prompt = prompt.into();
        if prompt.trim().is_empty() {
            return Err(QuestionError::EmptyPrompt);
        }
        if choices.is_empty() {
            return Err(QuestionError::NoChoices);
        }
        let mut seen = HashSet::with_capacity(choices.len());
        for choice in &choices {
            if !seen.insert(choice.id) {
                return Err(QuestionError::DuplicateChoice(choice.id));
            }
        }
        if !seen.contains(&correct_choice_id) {
            return Err(QuestionError::UnknownCorrectChoice(correct_choice_id));
        }

        Ok(Self {
            id,
            package_id,
            prompt,
            choices,
            correct_choice_id,
            explanation: explanation.into(),
        })
    }

    #[must_use]
    pub fn id(&self) -> QuestionId {
        self.id
    }

    #[must_use]
    pub fn package_id(&self) -> Option<PackageId> {
        self.package_id
    }

    #[must_use]
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    #[must_use]
    pub fn choices(&self) -> &[Choice] {
        &self.choices
    }

    #[must_use]
    pub fn correct_choice_id(&self) -> ChoiceId {
        self.correct_choice_id
    }

    #[must_use]
    pub fn explanation(&self) -> &str {
        &self.explanation
    }

    #[must_use]
    pub fn has_choice(&self, choice_id: ChoiceId) -> bool {
        self.choices.iter().any(|c| c.id == choice_id)
    }

    #[must_use]
    pub fn is_correct(&self, choice_id: ChoiceId) -> bool {
        self.correct_choice_id == choice_id
    }

    /// Client-safe projection without the answer key.
    #[must_use]
    pub fn view(&self) -> QuestionView {
        QuestionView {
            id: self.id,
            prompt: self.prompt.clone(),
            choices: self.choices.clone(),
        }
    }
}

/// Prompt and choices of a question, with no correct-answer leakage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionView {
    pub id: QuestionId,
    pub prompt: String,
    pub choices: Vec<Choice>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn choices() -> Vec<Choice> {
        vec![
            Choice::new(ChoiceId::new(1), "3"),
            Choice::new(ChoiceId::new(2), "4"),
        ]
    }

    #[test]
    fn validates_answer_key() {
        let err = QuestionItem::new(
            QuestionId::new(1),
            None,
            "2 + 2?",
            choices(),
            ChoiceId::new(9),
            "",
        )
        .unwrap_err();
        assert_eq!(err, QuestionError::UnknownCorrectChoice(ChoiceId::new(9)));
    }

    #[test]
    fn rejects_duplicate_choices_and_blank_prompt() {
        let dup = vec![
            Choice::new(ChoiceId::new(1), "a"),
            Choice::new(ChoiceId::new(1), "b"),
        ];
        assert_eq!(
            QuestionItem::new(QuestionId::new(1), None, "Q", dup, ChoiceId::new(1), "")
                .unwrap_err(),
            QuestionError::DuplicateChoice(ChoiceId::new(1))
        );
        assert_eq!(
            QuestionItem::new(QuestionId::new(1), None, "  ", choices(), ChoiceId::new(1), "")
                .unwrap_err(),
            QuestionError::EmptyPrompt
        );
    }

    #[test]
    fn view_hides_answer_key() {
        let item = QuestionItem::new(
            QuestionId::new(5),
            Some(PackageId::new(2)),
            "2 + 2?",
            choices(),
            ChoiceId::new(2),
            "Two pairs make four.",
        )
        .unwrap();

        assert!(item.is_correct(ChoiceId::new(2)));
        assert!(item.has_choice(ChoiceId::new(1)));
        assert!(!item.has_choice(ChoiceId::new(3)));

        let view = item.view();
        assert_eq!(view.id, QuestionId::new(5));
        assert_eq!(view.choices.len(), 2);
    }
}
