//! Daily snapshot and weekly breakdown derivation.
//!
//! Snapshots are append-only per-day records: one per (challenge, date),
//! created on the day's first event and updated in place for the rest of
//! the day. The weekly breakdown buckets the month into `ceil(day / 7)`
//! weeks (a fifth bucket exists for 29-31 day months).

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};

use crate::activity::DomainActivity;
use crate::challenge::types::{DailyProgressSnapshot, MonthlyChallengeProgress};
use crate::error::StoreError;
use crate::month::week_of_month;

/// Feature-usage flags for one day, derived from the full activity log.
#[derive(Debug, Clone, Copy, Default)]
pub struct DayFeatures {
    /// Habits, journal and goals all saw activity.
    pub triple_feature: bool,
    /// At least 1 habit completion and 3 journal entries.
    pub perfect: bool,
}

/// Analyze a day's domain activity. Same classification rules as the
/// baseline analyzer.
pub fn day_features(
    domains: &Arc<dyn DomainActivity>,
    date: NaiveDate,
) -> Result<DayFeatures, StoreError> {
    let habits = domains.habit_completions_on(date)?;
    let journal = domains.journal_entries_on(date)?;
    let goals = domains.goal_progress_on(date)?;
    Ok(DayFeatures {
        triple_feature: habits > 0 && journal > 0 && goals > 0,
        perfect: habits >= 1 && journal >= 3,
    })
}

/// Fold an event's applied deltas into the day's snapshot.
pub fn update_snapshot(
    snapshot: &mut DailyProgressSnapshot,
    day_deltas: &BTreeMap<String, i64>,
    progress: &MonthlyChallengeProgress,
    features: DayFeatures,
    xp_amount: i64,
    now: DateTime<Utc>,
) {
    for (key, delta) in day_deltas {
        *snapshot.deltas.entry(key.clone()).or_insert(0) += delta;
    }
    snapshot.cumulative = progress.accumulated.clone();
    snapshot.completion_percentage = progress.completion_percentage;
    snapshot.triple_feature_day = features.triple_feature;
    snapshot.perfect_day = features.perfect;
    snapshot.xp_earned += xp_amount;
    snapshot.updated_at = now;
}

/// Fold an event's applied deltas into the week bucket for `date`, and
/// refresh the bucket's active-day count.
pub fn update_weekly(
    progress: &mut MonthlyChallengeProgress,
    date: NaiveDate,
    day_deltas: &BTreeMap<String, i64>,
) {
    let week = week_of_month(date);
    let active_in_week = progress
        .active_days
        .iter()
        .filter(|d| week_of_month(**d) == week)
        .count() as u32;

    let bucket = progress.week_mut(week);
    for (key, delta) in day_deltas {
        *bucket.totals.entry(key.clone()).or_insert(0) += delta;
    }
    bucket.active_days = active_in_week;
}

/// Recompute the consecutive active-day streak ending today.
pub fn refresh_streaks(progress: &mut MonthlyChallengeProgress, today: NaiveDate) {
    let mut streak = 0u32;
    let mut day = today;
    while progress.active_days.contains(&day) {
        streak += 1;
        match day.pred_opt() {
            Some(prev) => day = prev,
            None => break,
        }
    }
    progress.current_streak_days = streak;
    progress.longest_streak_days = progress.longest_streak_days.max(streak);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::baseline::UserActivityBaseline;
    use crate::challenge::types::{
        ChallengeCategory, GenerationReason, MonthlyChallenge, MonthlyChallengeProgress,
    };
    use crate::month::MonthKey;

    fn empty_progress() -> MonthlyChallengeProgress {
        let month = MonthKey::new(2025, 3);
        let now = Utc::now();
        let challenge = MonthlyChallenge {
            id: "c1".into(),
            month,
            category: ChallengeCategory::Habits,
            star_level: 1,
            title: String::new(),
            description: String::new(),
            start_date: month.first_day(),
            end_date: month.last_day(),
            xp_reward: 300,
            requirements: Vec::new(),
            baseline_snapshot: UserActivityBaseline::minimal_fallback(month, "local", now),
            generation_reason: GenerationReason::Standard,
            template_id: None,
            is_active: true,
            created_at: now,
        };
        MonthlyChallengeProgress::new(&challenge, now)
    }

    #[test]
    fn test_weekly_bucketing() {
        let mut progress = empty_progress();
        let d9 = NaiveDate::from_ymd_opt(2025, 3, 9).unwrap();
        progress.active_days.insert(d9);

        let mut deltas = BTreeMap::new();
        deltas.insert("journal_entries".to_string(), 2);
        update_weekly(&mut progress, d9, &deltas);

        // Day 9 lands in week 2.
        assert_eq!(progress.weekly[1].active_days, 1);
        assert_eq!(progress.weekly[1].totals["journal_entries"], 2);
        assert_eq!(progress.weekly[0].active_days, 0);
    }

    #[test]
    fn test_streak_counts_backwards_from_today() {
        let mut progress = empty_progress();
        let d = |day| NaiveDate::from_ymd_opt(2025, 3, day).unwrap();
        for day in [3, 4, 5, 8, 9, 10] {
            progress.active_days.insert(d(day));
        }

        refresh_streaks(&mut progress, d(10));
        assert_eq!(progress.current_streak_days, 3); // 8, 9, 10

        refresh_streaks(&mut progress, d(12));
        assert_eq!(progress.current_streak_days, 0); // gap
        assert_eq!(progress.longest_streak_days, 3);
    }
}
