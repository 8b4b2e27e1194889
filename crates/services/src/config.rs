use crate::error::ConfigError;

/// Tunables for the practice engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    seconds_per_question: u32,
    max_questions: u32,
    default_page_size: u32,
    max_page_size: u32,
}

impl EngineConfig {
    pub const DEFAULT_SECONDS_PER_QUESTION: u32 = 60;
    pub const DEFAULT_MAX_QUESTIONS: u32 = 50;
    pub const DEFAULT_PAGE_SIZE: u32 = 20;
    pub const DEFAULT_MAX_PAGE_SIZE: u32 = 100;

    /// # Errors
    ///
    /// Returns `ConfigError` for zero budgets or an inconsistent page size pair.
    pub fn new(
        seconds_per_question: u32,
        max_questions: u32,
        default_page_size: u32,
        max_page_size: u32,
    ) -> Result<Self, ConfigError> {
        if seconds_per_question == 0 {
            return Err(ConfigError::ZeroSecondsPerQuestion);
        }
        if max_questions == 0 {
            return Err(ConfigError::ZeroMaxQuestions);
        }
        if default_page_size == 0 || default_page_size > max_page_size {
            return Err(ConfigError::InvalidPageSize {
                default: default_page_size,
                max: max_page_size,
            });
        }
        Ok(Self {
            seconds_per_question,
            max_questions,
            default_page_size,
            max_page_size,
        })
    }

    /// Default config with a different per-question budget.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ZeroSecondsPerQuestion` for zero.
    pub fn with_seconds_per_question(self, seconds: u32) -> Result<Self, ConfigError> {
        Self::new(
            seconds,
            self.max_questions,
            self.default_page_size,
            self.max_page_size,
        )
    }

    #[must_use]
    pub fn seconds_per_question(&self) -> u32 {
        self.seconds_per_question
    }

    #[must_use]
    pub fn max_questions(&self) -> u32 {
        self.max_questions
    }

    #[must_use]
    pub fn default_page_size(&self) -> u32 {
        self.default_page_size
    }

    #[must_use]
    pub fn max_page_size(&self) -> u32 {
        self.max_page_size
    }

    /// Clamp a requested question count into `[1, max_questions]`.
    #[must_use]
    pub fn clamp_count(&self, requested: u32) -> u32 {
        requested.clamp(1, self.max_questions)
    }

    /// Resolve a requested page size, falling back to the default.
    #[must_use]
    pub fn clamp_page_size(&self, requested: Option<u32>) -> u32 {
        requested
            .unwrap_or(self.default_page_size)
            .clamp(1, self.max_page_size)
    }

    /// Time budget for a timed session of `count` questions.
    #[must_use]
    pub fn time_limit_for(&self, count: u32) -> u32 {
        count.saturating_mul(self.seconds_per_question)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            seconds_per_question: Self::DEFAULT_SECONDS_PER_QUESTION,
            max_questions: Self::DEFAULT_MAX_QUESTIONS,
            default_page_size: Self::DEFAULT_PAGE_SIZE,
            max_page_size: Self::DEFAULT_MAX_PAGE_SIZE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_engine_constants() {
        let config = EngineConfig::default();
        assert_eq!(config.seconds_per_question(), 60);
        assert_eq!(config.max_questions(), 50);
        assert_eq!(config.time_limit_for(2), 120);
    }

    #[test]
    fn clamps_counts_and_pages() {
        let config = EngineConfig::default();
        assert_eq!(config.clamp_count(0), 1);
        assert_eq!(config.clamp_count(500), 50);
        assert_eq!(config.clamp_page_size(None), 20);
        assert_eq!(config.clamp_page_size(Some(0)), 1);
        assert_eq!(config.clamp_page_size(Some(1000)), 100);
    }

    #[test]
    fn rejects_inconsistent_values() {
        assert_eq!(
            EngineConfig::new(0, 50, 20, 100),
            Err(ConfigError::ZeroSecondsPerQuestion)
        );
        assert_eq!(
            EngineConfig::new(60, 0, 20, 100),
            Err(ConfigError::ZeroMaxQuestions)
        );
        assert_eq!(
            EngineConfig::new(60, 50, 200, 100),
            Err(ConfigError::InvalidPageSize {
                default: 200,
                max: 100
            })
        );
    }
}
