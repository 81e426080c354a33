use chrono::{DateTime, Duration, Utc};

/// Source of wall-clock timestamps for attempt records.
///
/// The countdown cadence is driven by the async runtime's timer; this clock
/// only stamps `started_at` / `submitted_at`, which keeps records deterministic
/// in tests.
#[derive(Debug, Clone, Copy, Default)]
pub enum Clock {
    #[default]
    System,
    Fixed(DateTime<Utc>),
}

impl Clock {
    #[must_use]
    pub fn system() -> Self {
        Self::System
    }

    #[must_use]
    pub fn fixed(at: DateTime<Utc>) -> Self {
        Self::Fixed(at)
    }

    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        match self {
            Clock::System => Utc::now(),
            Clock::Fixed(t) => *t,
        }
    }

    /// Move a fixed clock forward. No effect on the system clock.
    pub fn advance(&mut self, delta: Duration) {
        if let Clock::Fixed(t) = self {
            *t += delta;
        }
    }

    /// Time elapsed between `start` and now, never negative.
    #[must_use]
    pub fn since(&self, start: DateTime<Utc>) -> Duration {
        (self.now() - start).max(Duration::zero())
    }
}

/// Deterministic timestamp for tests (2023-11-14T22:13:20Z).
pub const FIXED_TEST_TIMESTAMP: i64 = 1_700_000_000;

/// Returns a deterministic `DateTime<Utc>` for tests.
///
/// # Panics
///
/// Panics if the fixed timestamp cannot be represented.
#[must_use]
pub fn fixed_now() -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(FIXED_TEST_TIMESTAMP, 0)
        .expect("fixed timestamp should be valid")
}

#[must_use]
pub fn fixed_clock() -> Clock {
    Clock::fixed(fixed_now())
}

/// Formats a countdown as `m:ss`, the way the exam header shows it.
#[must_use]
pub fn format_countdown(remaining_seconds: u32) -> String {
    format!("{}:{:02}", remaining_seconds / 60, remaining_seconds % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_clock_advances() {
        let mut clock = fixed_clock();
        clock.advance(Duration::seconds(90));
        assert_eq!(clock.since(fixed_now()), Duration::seconds(90));
    }

    #[test]
    fn since_never_negative() {
        let clock = fixed_clock();
        assert_eq!(
            clock.since(fixed_now() + Duration::minutes(1)),
            Duration::zero()
        );
    }

    #[test]
    fn countdown_format_pads_seconds() {
        assert_eq!(format_countdown(600), "10:00");
        assert_eq!(format_countdown(65), "1:05");
        assert_eq!(format_countdown(0), "0:00");
    }
}
