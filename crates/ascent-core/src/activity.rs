//! External activity collaborators.
//!
//! The core never owns the user's activity data. It consumes two seams:
//!
//! - [`ActivityLedger`]: the XP transaction log, the single source of truth
//!   for "what happened and when". Amounts are signed; a negative amount is
//!   an undo (deleted habit completion, removed journal entry).
//! - [`DomainActivity`]: day-scoped queries against the habit/journal/goal
//!   stores, used by the baseline analyzer and the daily feature-usage
//!   analysis.
//!
//! [`LedgerStore`] is a store-backed reference implementation of both, so
//! the CLI and integration tests run without a host application.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::error::StoreError;
use crate::store::{keys, RecordStore};

/// Where an XP delta came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum XpSource {
    HabitCompletion,
    HabitBonus,
    JournalEntry,
    JournalBonus,
    GoalProgress,
    GoalCompletion,
    ChallengeBonus,
    Other,
}

impl XpSource {
    /// Stable identifier used in descriptions and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            XpSource::HabitCompletion => "habit_completion",
            XpSource::HabitBonus => "habit_bonus",
            XpSource::JournalEntry => "journal_entry",
            XpSource::JournalBonus => "journal_bonus",
            XpSource::GoalProgress => "goal_progress",
            XpSource::GoalCompletion => "goal_completion",
            XpSource::ChallengeBonus => "challenge_bonus",
            XpSource::Other => "other",
        }
    }
}

/// One entry in the XP ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct XpTransaction {
    /// Signed XP delta. Negative amounts undo earlier activity.
    pub amount: i64,
    pub source: XpSource,
    #[serde(default)]
    pub source_id: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    pub at: DateTime<Utc>,
}

/// Result of crediting XP.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct XpAward {
    pub leveled_up: bool,
    pub new_level: u32,
}

/// The XP transaction log.
pub trait ActivityLedger: Send + Sync {
    /// Credit (or, with a negative amount, debit) XP.
    fn add_xp(
        &self,
        amount: i64,
        source: XpSource,
        source_id: Option<&str>,
        description: &str,
    ) -> Result<XpAward, StoreError>;

    /// All transactions whose date falls in `start..=end`.
    fn transactions_in_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<XpTransaction>, StoreError>;

    /// All transactions on a single day.
    fn transactions_on(&self, date: NaiveDate) -> Result<Vec<XpTransaction>, StoreError> {
        self.transactions_in_range(date, date)
    }
}

/// Day-scoped queries against the habit/journal/goal stores.
pub trait DomainActivity: Send + Sync {
    /// Habit completions recorded on `date`.
    fn habit_completions_on(&self, date: NaiveDate) -> Result<u32, StoreError>;

    /// Journal entries recorded on `date`.
    fn journal_entries_on(&self, date: NaiveDate) -> Result<u32, StoreError>;

    /// Goal progress updates recorded on `date`.
    fn goal_progress_on(&self, date: NaiveDate) -> Result<u32, StoreError>;
}

/// XP needed to advance one level.
const XP_PER_LEVEL: i64 = 500;

/// Store-backed ledger. Transactions are grouped per day under
/// `ledger:<date>` keys; the level is derived from the lifetime total.
pub struct LedgerStore {
    store: Arc<dyn RecordStore>,
    clock: Arc<dyn Clock>,
}

impl LedgerStore {
    pub fn new(store: Arc<dyn RecordStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    fn day_transactions(&self, date: NaiveDate) -> Result<Vec<XpTransaction>, StoreError> {
        match self.store.get(&keys::ledger_day(date))? {
            Some(raw) => {
                serde_json::from_str(&raw).map_err(|e| StoreError::CorruptRecord {
                    key: keys::ledger_day(date),
                    message: e.to_string(),
                })
            }
            None => Ok(Vec::new()),
        }
    }

    fn lifetime_total(&self) -> Result<i64, StoreError> {
        let mut total = 0i64;
        for key in self.store.keys_with_prefix("ledger:")? {
            if let Some(raw) = self.store.get(&key)? {
                let txns: Vec<XpTransaction> =
                    serde_json::from_str(&raw).map_err(|e| StoreError::CorruptRecord {
                        key: key.clone(),
                        message: e.to_string(),
                    })?;
                total += txns.iter().map(|t| t.amount).sum::<i64>();
            }
        }
        Ok(total)
    }

    fn level_for(total: i64) -> u32 {
        (total.max(0) / XP_PER_LEVEL) as u32 + 1
    }
}

impl ActivityLedger for LedgerStore {
    fn add_xp(
        &self,
        amount: i64,
        source: XpSource,
        source_id: Option<&str>,
        description: &str,
    ) -> Result<XpAward, StoreError> {
        let now = self.clock.now();
        let date = now.date_naive();

        let level_before = Self::level_for(self.lifetime_total()?);

        let mut txns = self.day_transactions(date)?;
        txns.push(XpTransaction {
            amount,
            source,
            source_id: source_id.map(str::to_string),
            description: Some(description.to_string()),
            at: now,
        });
        let raw = serde_json::to_string(&txns)
            .map_err(|e| StoreError::QueryFailed(e.to_string()))?;
        self.store.set(&keys::ledger_day(date), &raw)?;

        let new_level = Self::level_for(self.lifetime_total()?);
        Ok(XpAward {
            leveled_up: new_level > level_before,
            new_level,
        })
    }

    fn transactions_in_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<XpTransaction>, StoreError> {
        let mut out = Vec::new();
        let mut day = start;
        while day <= end {
            out.extend(self.day_transactions(day)?);
            match day.succ_opt() {
                Some(next) => day = next,
                None => break,
            }
        }
        Ok(out)
    }
}

impl DomainActivity for LedgerStore {
    fn habit_completions_on(&self, date: NaiveDate) -> Result<u32, StoreError> {
        let count = self
            .day_transactions(date)?
            .iter()
            .filter(|t| t.source == XpSource::HabitCompletion)
            .map(|t| t.amount.signum())
            .sum::<i64>();
        Ok(count.max(0) as u32)
    }

    fn journal_entries_on(&self, date: NaiveDate) -> Result<u32, StoreError> {
        let count = self
            .day_transactions(date)?
            .iter()
            .filter(|t| t.source == XpSource::JournalEntry)
            .map(|t| t.amount.signum())
            .sum::<i64>();
        Ok(count.max(0) as u32)
    }

    fn goal_progress_on(&self, date: NaiveDate) -> Result<u32, StoreError> {
        let count = self
            .day_transactions(date)?
            .iter()
            .filter(|t| {
                matches!(t.source, XpSource::GoalProgress | XpSource::GoalCompletion)
            })
            .map(|t| t.amount.signum())
            .sum::<i64>();
        Ok(count.max(0) as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::store::MemoryStore;

    fn ledger_at(date: NaiveDate) -> LedgerStore {
        LedgerStore::new(
            Arc::new(MemoryStore::new()),
            Arc::new(FixedClock::at_date(date)),
        )
    }

    #[test]
    fn test_add_and_query_by_day() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 10).unwrap();
        let ledger = ledger_at(date);

        ledger
            .add_xp(10, XpSource::HabitCompletion, Some("h1"), "morning run")
            .unwrap();
        ledger
            .add_xp(5, XpSource::JournalEntry, None, "entry")
            .unwrap();

        let txns = ledger.transactions_on(date).unwrap();
        assert_eq!(txns.len(), 2);
        assert_eq!(ledger.habit_completions_on(date).unwrap(), 1);
        assert_eq!(ledger.journal_entries_on(date).unwrap(), 1);
        assert_eq!(ledger.goal_progress_on(date).unwrap(), 0);
    }

    #[test]
    fn test_negative_amount_undoes_count() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 10).unwrap();
        let ledger = ledger_at(date);

        ledger
            .add_xp(10, XpSource::HabitCompletion, Some("h1"), "done")
            .unwrap();
        ledger
            .add_xp(-10, XpSource::HabitCompletion, Some("h1"), "undone")
            .unwrap();

        assert_eq!(ledger.habit_completions_on(date).unwrap(), 0);
    }

    #[test]
    fn test_level_up() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 10).unwrap();
        let ledger = ledger_at(date);

        let award = ledger
            .add_xp(499, XpSource::Other, None, "grind")
            .unwrap();
        assert!(!award.leveled_up);
        assert_eq!(award.new_level, 1);

        let award = ledger.add_xp(1, XpSource::Other, None, "ding").unwrap();
        assert!(award.leveled_up);
        assert_eq!(award.new_level, 2);
    }
}
