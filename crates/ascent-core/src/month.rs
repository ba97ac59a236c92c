//! Calendar-month keys and day-of-month arithmetic.
//!
//! Challenges, baselines, lifecycle status records and previews are all
//! keyed by calendar month. `MonthKey` wraps a validated (year, month) pair
//! and provides the date arithmetic the engines need: month boundaries,
//! day counts, succession and week-of-month bucketing.

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// A calendar month, e.g. 2025-03.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MonthKey {
    pub year: i32,
    /// 1-12
    pub month: u32,
}

impl MonthKey {
    /// Create a month key. The month is clamped into 1..=12.
    pub fn new(year: i32, month: u32) -> Self {
        Self {
            year,
            month: month.clamp(1, 12),
        }
    }

    /// The month containing the given date.
    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    /// First day of the month.
    pub fn first_day(&self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.year, self.month, 1).unwrap_or_default()
    }

    /// Last day of the month.
    pub fn last_day(&self) -> NaiveDate {
        let next = self.next();
        next.first_day().pred_opt().unwrap_or_default()
    }

    /// Number of days in the month (28-31).
    pub fn days_in_month(&self) -> u32 {
        self.last_day().day()
    }

    /// The following month.
    pub fn next(&self) -> Self {
        if self.month == 12 {
            Self::new(self.year + 1, 1)
        } else {
            Self::new(self.year, self.month + 1)
        }
    }

    /// The preceding month.
    pub fn prev(&self) -> Self {
        if self.month == 1 {
            Self::new(self.year - 1, 12)
        } else {
            Self::new(self.year, self.month - 1)
        }
    }

    /// Whether the given date falls inside this month.
    pub fn contains(&self, date: NaiveDate) -> bool {
        date.year() == self.year && date.month() == self.month
    }

    /// Signed month distance from `other` to `self`.
    ///
    /// `MonthKey::new(2025, 3).months_since(&MonthKey::new(2025, 1))` is 2.
    pub fn months_since(&self, other: &MonthKey) -> i32 {
        (self.year - other.year) * 12 + (self.month as i32 - other.month as i32)
    }
}

impl fmt::Display for MonthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for MonthKey {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ValidationError::InvalidMonthKey(s.to_string());
        let (year_str, month_str) = s.split_once('-').ok_or_else(invalid)?;
        let year: i32 = year_str.parse().map_err(|_| invalid())?;
        let month: u32 = month_str.parse().map_err(|_| invalid())?;
        if !(1..=12).contains(&month) {
            return Err(invalid());
        }
        Ok(Self { year, month })
    }
}

/// Week bucket for a day of month: 1..=5, each bucket spanning 7 days.
pub fn week_of_month(date: NaiveDate) -> u32 {
    date.day().div_ceil(7)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_month_boundaries() {
        let feb = MonthKey::new(2025, 2);
        assert_eq!(feb.first_day(), NaiveDate::from_ymd_opt(2025, 2, 1).unwrap());
        assert_eq!(feb.last_day(), NaiveDate::from_ymd_opt(2025, 2, 28).unwrap());
        assert_eq!(feb.days_in_month(), 28);

        // Leap year
        let feb_leap = MonthKey::new(2024, 2);
        assert_eq!(feb_leap.days_in_month(), 29);
    }

    #[test]
    fn test_year_rollover() {
        let dec = MonthKey::new(2024, 12);
        assert_eq!(dec.next(), MonthKey::new(2025, 1));
        assert_eq!(MonthKey::new(2025, 1).prev(), dec);
    }

    #[test]
    fn test_months_since_across_years() {
        let a = MonthKey::new(2025, 2);
        let b = MonthKey::new(2024, 11);
        assert_eq!(a.months_since(&b), 3);
        assert_eq!(b.months_since(&a), -3);
    }

    #[test]
    fn test_parse_round_trip() {
        let key: MonthKey = "2025-07".parse().unwrap();
        assert_eq!(key, MonthKey::new(2025, 7));
        assert_eq!(key.to_string(), "2025-07");

        assert!("2025-13".parse::<MonthKey>().is_err());
        assert!("garbage".parse::<MonthKey>().is_err());
    }

    #[test]
    fn test_week_of_month() {
        let d = |day| NaiveDate::from_ymd_opt(2025, 3, day).unwrap();
        assert_eq!(week_of_month(d(1)), 1);
        assert_eq!(week_of_month(d(7)), 1);
        assert_eq!(week_of_month(d(8)), 2);
        assert_eq!(week_of_month(d(28)), 4);
        assert_eq!(week_of_month(d(29)), 5); // 31-day months reach week 5
        assert_eq!(week_of_month(d(31)), 5);
    }
}
