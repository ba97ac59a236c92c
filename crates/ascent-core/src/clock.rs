//! Injectable wall-clock abstraction.
//!
//! Every component that is sensitive to "today" or "now" reads time through
//! the [`Clock`] trait instead of calling `Utc::now()` directly. Production
//! code uses [`SystemClock`]; tests use [`FixedClock`] to pin the calendar
//! to a known date and advance it deterministically.

use std::sync::Mutex;

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};

/// Source of wall-clock time.
pub trait Clock: Send + Sync {
    /// Current instant.
    fn now(&self) -> DateTime<Utc>;

    /// Current calendar date.
    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }
}

/// Real wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock frozen at a settable instant.
pub struct FixedClock {
    at: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    /// Create a clock pinned to the given instant.
    pub fn new(at: DateTime<Utc>) -> Self {
        Self { at: Mutex::new(at) }
    }

    /// Create a clock pinned to midnight UTC on the given date.
    pub fn at_date(date: NaiveDate) -> Self {
        let at = Utc
            .from_utc_datetime(&date.and_hms_opt(0, 0, 0).unwrap_or_default());
        Self::new(at)
    }

    /// Move the clock to a new instant.
    pub fn set(&self, at: DateTime<Utc>) {
        if let Ok(mut guard) = self.at.lock() {
            *guard = at;
        }
    }

    /// Advance the clock by a duration.
    pub fn advance(&self, by: Duration) {
        if let Ok(mut guard) = self.at.lock() {
            *guard += by;
        }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.at
            .lock()
            .map(|guard| *guard)
            .unwrap_or_else(|_| Utc::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_clock_advances() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
        let clock = FixedClock::at_date(date);
        assert_eq!(clock.today(), date);

        clock.advance(Duration::days(2));
        assert_eq!(clock.today(), NaiveDate::from_ymd_opt(2025, 3, 3).unwrap());
    }

    #[test]
    fn test_fixed_clock_set() {
        let clock = FixedClock::at_date(NaiveDate::from_ymd_opt(2025, 1, 1).unwrap());
        let later = Utc.with_ymd_and_hms(2025, 6, 15, 12, 30, 0).unwrap();
        clock.set(later);
        assert_eq!(clock.now(), later);
    }
}
