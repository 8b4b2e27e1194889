mod expiry;
mod queries;
mod service;
mod view;

// Public API of the session subsystem.
pub use crate::error::SessionError;
pub use service::PracticeService;
pub use view::{AnswerOutcome, Page, QuestionTime, SessionListItem, SessionView};
