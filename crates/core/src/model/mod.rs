mod answer;
mod ids;
mod question;
mod review;
mod session;

pub use ids::{ChoiceId, PackageId, ParseIdError, QuestionId, SessionId, UserId};

pub use answer::AnswerRecord;
pub use question::{Choice, QuestionError, QuestionItem, QuestionView};
pub use review::{ReviewError, ReviewItem, SessionScore, build_review};
pub use session::{
    AnswerProgress, ParseStatusError, PauseOutcome, PracticeSession, SessionBuildError,
    SessionSnapshot, SessionStateError, SessionStatus,
};
