//! Challenge data model.
//!
//! One concrete [`MonthlyChallenge`] exists per calendar month (at most one
//! active at a time). Its [`MonthlyChallengeProgress`] is the single mutable
//! record; daily snapshots and weekly breakdowns are derived, append-only
//! analytics.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::baseline::UserActivityBaseline;
use crate::month::MonthKey;

/// Challenge categories, one difficulty rating each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChallengeCategory {
    Habits,
    Journal,
    Goals,
    Consistency,
}

impl ChallengeCategory {
    pub fn all() -> [ChallengeCategory; 4] {
        [
            ChallengeCategory::Habits,
            ChallengeCategory::Journal,
            ChallengeCategory::Goals,
            ChallengeCategory::Consistency,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ChallengeCategory::Habits => "habits",
            ChallengeCategory::Journal => "journal",
            ChallengeCategory::Goals => "goals",
            ChallengeCategory::Consistency => "consistency",
        }
    }
}

impl fmt::Display for ChallengeCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stable identifiers linking activity events to challenge requirements.
pub mod tracking {
    pub const SCHEDULED_HABIT_COMPLETIONS: &str = "scheduled_habit_completions";
    pub const JOURNAL_ENTRIES: &str = "journal_entries";
    pub const GOAL_PROGRESS_UPDATES: &str = "goal_progress_updates";
    pub const GOAL_COMPLETIONS: &str = "goal_completions";
    pub const ACTIVE_DAYS: &str = "active_days";
    pub const TRIPLE_FEATURE_DAYS: &str = "triple_feature_days";
    pub const PERFECT_DAYS: &str = "perfect_days";
    pub const MONTHLY_XP_TOTAL: &str = "monthly_xp_total";

    /// Keys counting distinct days. Their targets can never exceed the
    /// number of days in the challenge month.
    pub fn is_day_count(key: &str) -> bool {
        matches!(key, ACTIVE_DAYS | TRIPLE_FEATURE_DAYS | PERFECT_DAYS)
    }

    /// Keys accumulating raw XP. Their targets are capped by the daily XP
    /// cap times the days in the month.
    pub fn is_xp_total(key: &str) -> bool {
        key == MONTHLY_XP_TOTAL
    }

    /// Keys that are not incremented per event but recomputed from the
    /// daily aggregate analysis.
    pub fn is_derived(key: &str) -> bool {
        matches!(key, ACTIVE_DAYS | TRIPLE_FEATURE_DAYS | PERFECT_DAYS)
    }
}

/// Why a challenge was generated the way it was.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationReason {
    /// Normal personalized pipeline.
    Standard,
    /// No usable baseline; deliberately easy fixed challenge.
    FirstMonth,
    /// The pipeline failed; fixed minimal challenge substituted.
    Fallback,
}

fn default_milestone_fractions() -> Vec<f64> {
    vec![0.25, 0.50, 0.75]
}

/// A trackable sub-goal of a challenge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonthlyChallengeRequirement {
    pub tracking_key: String,
    pub target: u32,
    /// The baseline metric value the target was derived from.
    pub baseline_value: f64,
    /// The multiplier actually applied (after range clamping).
    pub scaling_multiplier: f64,
    #[serde(default = "default_milestone_fractions")]
    pub milestone_fractions: Vec<f64>,
    /// The baseline metric was absent or non-positive and a category
    /// fallback constant was substituted.
    #[serde(default)]
    pub used_fallback: bool,
    pub description: String,
}

/// One concrete challenge instance for a calendar month.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonthlyChallenge {
    pub id: String,
    pub month: MonthKey,
    pub category: ChallengeCategory,
    /// Difficulty tier 1-5.
    pub star_level: u8,
    pub title: String,
    pub description: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub xp_reward: u32,
    pub requirements: Vec<MonthlyChallengeRequirement>,
    /// Frozen snapshot of the baseline used at generation time.
    pub baseline_snapshot: UserActivityBaseline,
    pub generation_reason: GenerationReason,
    #[serde(default)]
    pub template_id: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl MonthlyChallenge {
    /// Clamp stored fields into their valid ranges after deserialization.
    pub fn sanitize(&mut self) {
        self.star_level = self.star_level.clamp(1, 5);
        for req in &mut self.requirements {
            if req.milestone_fractions.is_empty() {
                req.milestone_fractions = default_milestone_fractions();
            }
        }
    }
}

/// Completion-percentage milestones, in percent.
pub const MILESTONE_PERCENTS: [f64; 3] = [25.0, 50.0, 75.0];

/// Per-week rollup of challenge activity. Week 5 exists for 29-31 day
/// months and stays empty otherwise.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeeklyBreakdown {
    /// 1-5
    pub week: u32,
    pub active_days: u32,
    /// Net delta accumulated per tracking key during the week.
    #[serde(default)]
    pub totals: BTreeMap<String, i64>,
}

impl WeeklyBreakdown {
    fn empty(week: u32) -> Self {
        Self {
            week,
            active_days: 0,
            totals: BTreeMap::new(),
        }
    }
}

/// The one mutable record per challenge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonthlyChallengeProgress {
    pub challenge_id: String,
    /// Accumulated value per tracking key. Never below 0.
    pub accumulated: BTreeMap<String, i64>,
    /// 0-100. Recomputed on every update; not monotonic, because negative
    /// events can reduce it.
    pub completion_percentage: f64,
    pub active_days: BTreeSet<NaiveDate>,
    pub weekly: Vec<WeeklyBreakdown>,
    /// One flag per entry of [`MILESTONE_PERCENTS`].
    pub milestones_reached: [bool; 3],
    /// Consecutive active-day streak within the challenge window.
    pub current_streak_days: u32,
    pub longest_streak_days: u32,
    pub days_remaining: u32,
    /// Linear pace projection of the final completion percentage.
    pub projected_completion: f64,
    pub is_completed: bool,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl MonthlyChallengeProgress {
    /// Fresh progress record for a challenge, all counters at zero.
    pub fn new(challenge: &MonthlyChallenge, now: DateTime<Utc>) -> Self {
        let accumulated = challenge
            .requirements
            .iter()
            .map(|r| (r.tracking_key.clone(), 0i64))
            .collect();
        Self {
            challenge_id: challenge.id.clone(),
            accumulated,
            completion_percentage: 0.0,
            active_days: BTreeSet::new(),
            weekly: (1..=5).map(WeeklyBreakdown::empty).collect(),
            milestones_reached: [false; 3],
            current_streak_days: 0,
            longest_streak_days: 0,
            days_remaining: 0,
            projected_completion: 0.0,
            is_completed: false,
            completed_at: None,
            updated_at: now,
        }
    }

    /// Apply a signed delta to a tracking key, clamped so the accumulated
    /// value never drops below zero. Returns the delta actually applied.
    pub fn apply_delta(&mut self, tracking_key: &str, delta: i64) -> i64 {
        let entry = self.accumulated.entry(tracking_key.to_string()).or_insert(0);
        let before = *entry;
        *entry = (before + delta).max(0);
        *entry - before
    }

    /// Set a derived key to an absolute value (never below zero).
    pub fn set_value(&mut self, tracking_key: &str, value: i64) {
        self.accumulated
            .insert(tracking_key.to_string(), value.max(0));
    }

    pub fn value(&self, tracking_key: &str) -> i64 {
        self.accumulated.get(tracking_key).copied().unwrap_or(0)
    }

    /// Recompute the completion percentage: unweighted average across
    /// requirements of `min(accumulated / target, 1) * 100`.
    pub fn recompute_completion(&mut self, requirements: &[MonthlyChallengeRequirement]) {
        if requirements.is_empty() {
            self.completion_percentage = 0.0;
            return;
        }
        let sum: f64 = requirements
            .iter()
            .map(|req| {
                if req.target == 0 {
                    return 1.0;
                }
                let accumulated = self.value(&req.tracking_key).max(0) as f64;
                (accumulated / req.target as f64).min(1.0)
            })
            .sum();
        self.completion_percentage = (sum / requirements.len() as f64 * 100.0).clamp(0.0, 100.0);
    }

    /// The weekly bucket for a day of month.
    pub fn week_mut(&mut self, week: u32) -> &mut WeeklyBreakdown {
        let idx = (week.clamp(1, 5) - 1) as usize;
        &mut self.weekly[idx]
    }

    /// Clamp stored fields into their valid ranges after deserialization.
    pub fn sanitize(&mut self) {
        for value in self.accumulated.values_mut() {
            *value = (*value).max(0);
        }
        self.completion_percentage = self.completion_percentage.clamp(0.0, 100.0);
        self.projected_completion = self.projected_completion.clamp(0.0, 100.0);
        if self.weekly.len() < 5 {
            let existing = self.weekly.len() as u32;
            for week in existing + 1..=5 {
                self.weekly.push(WeeklyBreakdown::empty(week));
            }
        }
    }
}

/// Per-day derived record; one per (challenge, date).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyProgressSnapshot {
    pub challenge_id: String,
    pub date: NaiveDate,
    /// Net delta applied per tracking key on this day.
    pub deltas: BTreeMap<String, i64>,
    /// Accumulated values at the end of the day.
    pub cumulative: BTreeMap<String, i64>,
    pub completion_percentage: f64,
    pub triple_feature_day: bool,
    pub perfect_day: bool,
    pub xp_earned: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DailyProgressSnapshot {
    pub fn new(challenge_id: &str, date: NaiveDate, now: DateTime<Utc>) -> Self {
        Self {
            challenge_id: challenge_id.to_string(),
            date,
            deltas: BTreeMap::new(),
            cumulative: BTreeMap::new(),
            completion_percentage: 0.0,
            triple_feature_day: false,
            perfect_day: false,
            xp_earned: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A speculative next-month challenge computed ahead of time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChallengePreviewData {
    pub month: MonthKey,
    pub challenge: MonthlyChallenge,
    pub generated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl ChallengePreviewData {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// One month of category/template usage, for rotation scoring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RotationEntry {
    pub month: MonthKey,
    pub category: ChallengeCategory,
    #[serde(default)]
    pub template_id: Option<String>,
}

/// Months of rotation history to retain.
const ROTATION_RETAIN_MONTHS: usize = 12;

/// Append-only category/template usage history.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RotationHistory {
    pub entries: Vec<RotationEntry>,
}

impl RotationHistory {
    /// Record a month's selection, superseding any earlier entry for the
    /// same month and trimming old history.
    pub fn record(&mut self, entry: RotationEntry) {
        self.entries.retain(|e| e.month != entry.month);
        self.entries.push(entry);
        self.entries.sort_by_key(|e| e.month);
        if self.entries.len() > ROTATION_RETAIN_MONTHS {
            let excess = self.entries.len() - ROTATION_RETAIN_MONTHS;
            self.entries.drain(0..excess);
        }
    }

    /// The category used `months_back` months before `month`, if recorded.
    pub fn category_used(&self, month: &MonthKey, months_back: i32) -> Option<ChallengeCategory> {
        self.entries
            .iter()
            .find(|e| month.months_since(&e.month) == months_back)
            .map(|e| e.category)
    }

    /// Whether a template was used within the last `window` months
    /// before `month`.
    pub fn template_used_within(&self, month: &MonthKey, template_id: &str, window: i32) -> bool {
        self.entries.iter().any(|e| {
            let back = month.months_since(&e.month);
            back >= 1 && back <= window && e.template_id.as_deref() == Some(template_id)
        })
    }
}

/// Month-to-month completion streak.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChallengeStreak {
    pub consecutive_months: u32,
    pub longest_months: u32,
    #[serde(default)]
    pub last_completed_month: Option<MonthKey>,
}

impl ChallengeStreak {
    /// Record a completed month, extending or restarting the streak.
    pub fn record_completion(&mut self, month: MonthKey) {
        let consecutive = match self.last_completed_month {
            Some(last) if month.months_since(&last) == 1 => self.consecutive_months + 1,
            Some(last) if month.months_since(&last) <= 0 => self.consecutive_months,
            _ => 1,
        };
        self.consecutive_months = consecutive;
        self.longest_months = self.longest_months.max(consecutive);
        self.last_completed_month = Some(month);
    }
}
