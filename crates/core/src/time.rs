use chrono::{DateTime, Duration, Utc};

/// The single time source for session timing.
///
/// Services hold a copy and read it at the top of every entry point, so tests
/// can simulate elapsed time by handing out a clock fixed further in the future.
#[derive(Debug, Clone, Copy, Default)]
pub enum Clock {
    #[default]
    Default,
    Fixed(DateTime<Utc>),
}

impl Clock {
    /// Returns a clock that uses the current system time.
    #[must_use]
    pub fn default_clock() -> Self {
        Self::Default
    }

    /// Returns a clock fixed at the given timestamp.
    #[must_use]
    pub fn fixed(at: DateTime<Utc>) -> Self {
        Self::Fixed(at)
    }

    /// Returns the current time according to the clock.
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        match self {
            Clock::Default => Utc::now(),
            Clock::Fixed(t) => *t,
        }
    }

    /// If this is a fixed clock, advance it by the given duration.
    ///
    /// Has no effect on `Clock::Default`.
    pub fn advance(&mut self, delta: Duration) {
        if let Clock::Fixed(t) = self {
            *t += delta;
        }
    }

    /// Returns a copy of this clock moved forward by `seconds`.
    #[must_use]
    pub fn advanced_by_secs(mut self, seconds: i64) -> Self {
        self.advance(Duration::seconds(seconds));
        self
    }
}

/// Whole seconds from `earlier` to `later`, clamped at zero.
///
/// A backwards step (clock skew, a backdated anchor) yields zero rather than a
/// negative credit.
#[must_use]
pub fn seconds_between(earlier: DateTime<Utc>, later: DateTime<Utc>) -> u32 {
    let secs = later.signed_duration_since(earlier).num_seconds();
    u32::try_from(secs.max(0)).unwrap_or(u32::MAX)
}

/// Deterministic timestamp for tests and examples (2023-11-14T22:13:20Z).
pub const FIXED_TEST_TIMESTAMP: i64 = 1_700_000_000;

/// Returns a deterministic `DateTime<Utc>` for tests and doc examples.
///
/// # Panics
///
/// Panics if the fixed timestamp cannot be represented.
#[must_use]
pub fn fixed_now() -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(FIXED_TEST_TIMESTAMP, 0)
        .expect("fixed timestamp should be valid")
}

/// Returns a `Clock` fixed at the deterministic test timestamp.
#[must_use]
pub fn fixed_clock() -> Clock {
    Clock::fixed(fixed_now())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_clock_advances() {
        let clock = fixed_clock().advanced_by_secs(90);
        assert_eq!(clock.now(), fixed_now() + Duration::seconds(90));
    }

    #[test]
    fn default_clock_ignores_advance() {
        let mut clock = Clock::default_clock();
        clock.advance(Duration::days(365));
        assert!(clock.now() < Utc::now() + Duration::days(1));
    }

    #[test]
    fn seconds_between_clamps_negative_spans() {
        let now = fixed_now();
        assert_eq!(seconds_between(now, now + Duration::seconds(61)), 61);
        assert_eq!(seconds_between(now + Duration::seconds(5), now), 0);
        assert_eq!(
            seconds_between(now, now + Duration::milliseconds(1_999)),
            1
        );
    }
}
