//! Behavioral baseline analysis.
//!
//! Folds a window of day-level activity facts (habit completions, journal
//! entries, goal progress, XP events) into a [`UserActivityBaseline`]: the
//! normalized per-domain averages and consistency metrics that challenge
//! generation scales against. Classification rules:
//! - **active day**: any XP was earned that day
//! - **triple-feature day**: habits, journal and goals all saw activity
//! - **perfect day**: at least 1 habit completion and 3 journal entries
//!   (goals optional)
//!
//! Baselines are cached per (month, user) for 24 hours and are immutable
//! once generated -- recomputation supersedes, never mutates. Any internal
//! failure degrades to a conservative hard-coded minimal baseline so the
//! generation engine always receives *some* baseline.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::activity::{ActivityLedger, DomainActivity};
use crate::cache::TtlCache;
use crate::clock::Clock;
use crate::error::StoreError;
use crate::month::MonthKey;

/// How much signal the window contained, by active-day count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataQuality {
    /// Fewer than 5 active days
    Minimal,
    /// 5-19 active days
    Partial,
    /// 20+ active days
    Complete,
}

impl DataQuality {
    fn classify(active_days: u32) -> Self {
        if active_days < 5 {
            DataQuality::Minimal
        } else if active_days < 20 {
            DataQuality::Partial
        } else {
            DataQuality::Complete
        }
    }
}

/// Normalized 30-day summary of a user's activity.
///
/// Immutable once generated; superseded by recomputation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserActivityBaseline {
    pub month: MonthKey,
    pub user_id: String,
    pub window_start: NaiveDate,
    pub window_end: NaiveDate,

    /// Days on which any XP was earned.
    pub total_active_days: u32,

    // Per-domain daily averages, over active days.
    pub daily_habit_completions: f64,
    pub daily_journal_entries: f64,
    pub daily_goal_progress: f64,

    // Per-domain totals over the window.
    pub total_habit_completions: u32,
    pub total_journal_entries: u32,
    pub total_goal_progress_days: u32,

    // Longest consecutive-day runs.
    pub longest_habit_streak: u32,
    pub longest_journal_streak: u32,
    pub longest_engagement_streak: u32,

    // Consistency metrics.
    pub triple_feature_days: u32,
    pub perfect_days: u32,
    /// Evenness of activity across the three domains, 0-1.
    pub balance_score: f64,

    pub monthly_xp_total: i64,
    pub daily_xp_average: f64,

    pub data_quality: DataQuality,
    pub generated_at: DateTime<Utc>,
}

impl UserActivityBaseline {
    /// The conservative baseline substituted when analysis fails.
    pub fn minimal_fallback(month: MonthKey, user_id: &str, now: DateTime<Utc>) -> Self {
        let window_end = now.date_naive();
        let window_start = window_end - Duration::days(29);
        Self {
            month,
            user_id: user_id.to_string(),
            window_start,
            window_end,
            total_active_days: 0,
            daily_habit_completions: 0.0,
            daily_journal_entries: 0.0,
            daily_goal_progress: 0.0,
            total_habit_completions: 0,
            total_journal_entries: 0,
            total_goal_progress_days: 0,
            longest_habit_streak: 0,
            longest_journal_streak: 0,
            longest_engagement_streak: 0,
            triple_feature_days: 0,
            perfect_days: 0,
            balance_score: 0.0,
            monthly_xp_total: 0,
            daily_xp_average: 0.0,
            data_quality: DataQuality::Minimal,
            generated_at: now,
        }
    }
}

/// Options for a baseline computation.
#[derive(Debug, Clone)]
pub struct BaselineOptions {
    /// Length of the analysis window, in days.
    pub window_days: u32,
    /// Bypass the cache and recompute.
    pub force_recompute: bool,
}

impl Default for BaselineOptions {
    fn default() -> Self {
        Self {
            window_days: 30,
            force_recompute: false,
        }
    }
}

/// Default freshness of a cached baseline.
const DEFAULT_CACHE_TTL_HOURS: i64 = 24;

/// Folds day-level activity into baselines.
pub struct BaselineAnalyzer {
    ledger: Arc<dyn ActivityLedger>,
    domains: Arc<dyn DomainActivity>,
    clock: Arc<dyn Clock>,
    user_id: String,
    cache: Mutex<TtlCache<String, UserActivityBaseline>>,
}

impl BaselineAnalyzer {
    pub fn new(
        ledger: Arc<dyn ActivityLedger>,
        domains: Arc<dyn DomainActivity>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            ledger,
            domains,
            clock,
            user_id: "local".to_string(),
            cache: Mutex::new(TtlCache::new(Duration::hours(DEFAULT_CACHE_TTL_HOURS))),
        }
    }

    pub fn with_user(mut self, user_id: &str) -> Self {
        self.user_id = user_id.to_string();
        self
    }

    pub fn with_cache_ttl_hours(mut self, hours: u32) -> Self {
        self.cache = Mutex::new(TtlCache::new(Duration::hours(hours.max(1) as i64)));
        self
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Compute (or fetch from cache) the baseline for a month.
    ///
    /// Never fails: any internal error degrades to
    /// [`UserActivityBaseline::minimal_fallback`].
    pub fn calculate_monthly_baseline(
        &self,
        month: MonthKey,
        options: &BaselineOptions,
    ) -> UserActivityBaseline {
        let now = self.clock.now();
        let cache_key = format!("{month}:{}", self.user_id);

        if !options.force_recompute {
            if let Ok(mut cache) = self.cache.lock() {
                if let Some(cached) = cache.get(&cache_key, now) {
                    return cached;
                }
            }
        }

        match self.try_calculate(month, options) {
            Ok(baseline) => {
                if let Ok(mut cache) = self.cache.lock() {
                    cache.insert(cache_key, baseline.clone(), now);
                }
                baseline
            }
            Err(e) => {
                tracing::warn!(
                    month = %month,
                    error = %e,
                    "baseline analysis failed, substituting minimal baseline"
                );
                UserActivityBaseline::minimal_fallback(month, &self.user_id, now)
            }
        }
    }

    /// Drop any cached baseline for a month.
    pub fn invalidate(&self, month: MonthKey) {
        let cache_key = format!("{month}:{}", self.user_id);
        if let Ok(mut cache) = self.cache.lock() {
            cache.invalidate(&cache_key);
        }
    }

    fn try_calculate(
        &self,
        month: MonthKey,
        options: &BaselineOptions,
    ) -> Result<UserActivityBaseline, StoreError> {
        let now = self.clock.now();
        let window_end = now.date_naive();
        let window_days = options.window_days.max(1);
        let window_start = window_end - Duration::days(window_days as i64 - 1);

        let mut active_days = 0u32;
        let mut triple_days = 0u32;
        let mut perfect_days = 0u32;
        let mut total_habits = 0u32;
        let mut total_journal = 0u32;
        let mut total_goal_days = 0u32;
        let mut xp_total = 0i64;

        let mut habit_flags = Vec::with_capacity(window_days as usize);
        let mut journal_flags = Vec::with_capacity(window_days as usize);
        let mut active_flags = Vec::with_capacity(window_days as usize);

        let mut day = window_start;
        while day <= window_end {
            let habits = self.domains.habit_completions_on(day)?;
            let journal = self.domains.journal_entries_on(day)?;
            let goals = self.domains.goal_progress_on(day)?;
            let xp_day: i64 = self
                .ledger
                .transactions_on(day)?
                .iter()
                .map(|t| t.amount)
                .sum();

            let active = xp_day > 0;
            if active {
                active_days += 1;
            }
            if habits > 0 && journal > 0 && goals > 0 {
                triple_days += 1;
            }
            if habits >= 1 && journal >= 3 {
                perfect_days += 1;
            }

            total_habits += habits;
            total_journal += journal;
            if goals > 0 {
                total_goal_days += 1;
            }
            xp_total += xp_day;

            habit_flags.push(habits > 0);
            journal_flags.push(journal > 0);
            active_flags.push(active);

            match day.succ_opt() {
                Some(next) => day = next,
                None => break,
            }
        }

        let denom = active_days.max(1) as f64;

        Ok(UserActivityBaseline {
            month,
            user_id: self.user_id.clone(),
            window_start,
            window_end,
            total_active_days: active_days,
            daily_habit_completions: total_habits as f64 / denom,
            daily_journal_entries: total_journal as f64 / denom,
            daily_goal_progress: total_goal_days as f64 / denom,
            total_habit_completions: total_habits,
            total_journal_entries: total_journal,
            total_goal_progress_days: total_goal_days,
            longest_habit_streak: longest_run(&habit_flags),
            longest_journal_streak: longest_run(&journal_flags),
            longest_engagement_streak: longest_run(&active_flags),
            triple_feature_days: triple_days,
            perfect_days,
            balance_score: balance_score(total_habits, total_journal, total_goal_days),
            monthly_xp_total: xp_total,
            daily_xp_average: xp_total as f64 / denom,
            data_quality: DataQuality::classify(active_days),
            generated_at: now,
        })
    }
}

/// Length of the longest consecutive run of `true`.
fn longest_run(flags: &[bool]) -> u32 {
    let mut best = 0u32;
    let mut current = 0u32;
    for &flag in flags {
        if flag {
            current += 1;
            best = best.max(current);
        } else {
            current = 0;
        }
    }
    best
}

/// Evenness of activity across the three domains: 1.0 when perfectly even,
/// 0.0 when everything came from a single domain (or nothing happened).
fn balance_score(habits: u32, journal: u32, goals: u32) -> f64 {
    let total = (habits + journal + goals) as f64;
    if total == 0.0 {
        return 0.0;
    }
    let shares = [
        habits as f64 / total,
        journal as f64 / total,
        goals as f64 / total,
    ];
    let max = shares.iter().cloned().fold(f64::MIN, f64::max);
    let min = shares.iter().cloned().fold(f64::MAX, f64::min);
    (1.0 - (max - min)).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::{LedgerStore, XpSource};
    use crate::clock::FixedClock;
    use crate::store::MemoryStore;

    fn setup(today: NaiveDate) -> (Arc<LedgerStore>, Arc<FixedClock>, BaselineAnalyzer) {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(FixedClock::at_date(today));
        let ledger = Arc::new(LedgerStore::new(store, clock.clone()));
        let analyzer = BaselineAnalyzer::new(ledger.clone(), ledger.clone(), clock.clone());
        (ledger, clock, analyzer)
    }

    #[test]
    fn test_longest_run() {
        assert_eq!(longest_run(&[]), 0);
        assert_eq!(longest_run(&[true, true, false, true, true, true]), 3);
        assert_eq!(longest_run(&[false, false]), 0);
    }

    #[test]
    fn test_balance_score() {
        // Perfectly even
        assert!((balance_score(10, 10, 10) - 1.0).abs() < 1e-9);
        // All in one domain
        assert!(balance_score(30, 0, 0) < 0.01);
        // Nothing at all
        assert_eq!(balance_score(0, 0, 0), 0.0);
    }

    #[test]
    fn test_empty_window_is_minimal() {
        let today = NaiveDate::from_ymd_opt(2025, 3, 15).unwrap();
        let (_ledger, _clock, analyzer) = setup(today);

        let baseline = analyzer
            .calculate_monthly_baseline(MonthKey::new(2025, 3), &BaselineOptions::default());
        assert_eq!(baseline.total_active_days, 0);
        assert_eq!(baseline.data_quality, DataQuality::Minimal);
    }

    #[test]
    fn test_fold_counts_and_quality() {
        let today = NaiveDate::from_ymd_opt(2025, 3, 30).unwrap();
        let (ledger, clock, analyzer) = setup(today);

        // Six consecutive active days ending today: habits + 3 journal
        // entries each day, goals on the last two.
        for offset in (0u32..6).rev() {
            clock.set(
                chrono::TimeZone::with_ymd_and_hms(
                    &Utc,
                    2025,
                    3,
                    30 - offset,
                    12,
                    0,
                    0,
                )
                .unwrap(),
            );
            ledger
                .add_xp(10, XpSource::HabitCompletion, Some("h1"), "habit")
                .unwrap();
            for _ in 0..3 {
                ledger
                    .add_xp(5, XpSource::JournalEntry, None, "entry")
                    .unwrap();
            }
            if offset < 2 {
                ledger
                    .add_xp(8, XpSource::GoalProgress, Some("g1"), "goal")
                    .unwrap();
            }
        }
        clock.set(chrono::TimeZone::with_ymd_and_hms(&Utc, 2025, 3, 30, 23, 0, 0).unwrap());

        let baseline = analyzer
            .calculate_monthly_baseline(MonthKey::new(2025, 3), &BaselineOptions::default());

        assert_eq!(baseline.total_active_days, 6);
        assert_eq!(baseline.data_quality, DataQuality::Partial); // 5..20
        assert_eq!(baseline.total_habit_completions, 6);
        assert_eq!(baseline.total_journal_entries, 18);
        assert_eq!(baseline.total_goal_progress_days, 2);
        assert_eq!(baseline.perfect_days, 6); // habit >= 1 and journal >= 3
        assert_eq!(baseline.triple_feature_days, 2);
        assert_eq!(baseline.longest_habit_streak, 6);
        assert_eq!(baseline.longest_engagement_streak, 6);
        assert!((baseline.daily_habit_completions - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_cache_serves_until_stale() {
        let today = NaiveDate::from_ymd_opt(2025, 3, 15).unwrap();
        let (ledger, clock, analyzer) = setup(today);
        let month = MonthKey::new(2025, 3);

        let first = analyzer.calculate_monthly_baseline(month, &BaselineOptions::default());
        assert_eq!(first.total_active_days, 0);

        // New activity lands, but the cached baseline is still fresh.
        ledger
            .add_xp(10, XpSource::HabitCompletion, None, "habit")
            .unwrap();
        let cached = analyzer.calculate_monthly_baseline(month, &BaselineOptions::default());
        assert_eq!(cached.total_active_days, 0);

        // Force bypasses the cache.
        let forced = analyzer.calculate_monthly_baseline(
            month,
            &BaselineOptions {
                force_recompute: true,
                ..Default::default()
            },
        );
        assert_eq!(forced.total_active_days, 1);

        // And 25 hours later the cache has gone stale on its own.
        clock.advance(Duration::hours(25));
        let stale = analyzer.calculate_monthly_baseline(month, &BaselineOptions::default());
        assert_eq!(stale.total_active_days, 1);
    }
}
