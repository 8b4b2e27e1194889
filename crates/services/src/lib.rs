#![forbid(unsafe_code)]

pub mod app_services;
pub mod config;
pub mod error;
pub mod sessions;

pub use practice_core::Clock;

pub use app_services::AppServices;
pub use config::EngineConfig;
pub use error::{AppServicesError, ConfigError, ErrorKind, SessionError};
pub use sessions::{
    AnswerOutcome, Page, PracticeService, QuestionTime, SessionListItem, SessionView,
};
