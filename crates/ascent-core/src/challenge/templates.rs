//! Static challenge-template catalog.
//!
//! Templates are immutable configuration data: each names a category, the
//! baseline metrics its requirements scale from, the allowed multiplier
//! range, a star-level floor, a priority weight for selection scoring, and
//! optional seasonality/cooldown. The builtin catalog carries three
//! templates per category.

use crate::baseline::{DataQuality, UserActivityBaseline};
use crate::challenge::types::{tracking, ChallengeCategory};

/// Which baseline metric a requirement scales from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaselineMetric {
    TotalHabitCompletions,
    TotalJournalEntries,
    GoalProgressDays,
    ActiveDays,
    TripleFeatureDays,
    PerfectDays,
    MonthlyXpTotal,
    LongestEngagementStreak,
}

impl BaselineMetric {
    /// Read the metric's value from a baseline.
    pub fn read(&self, baseline: &UserActivityBaseline) -> f64 {
        match self {
            BaselineMetric::TotalHabitCompletions => baseline.total_habit_completions as f64,
            BaselineMetric::TotalJournalEntries => baseline.total_journal_entries as f64,
            BaselineMetric::GoalProgressDays => baseline.total_goal_progress_days as f64,
            BaselineMetric::ActiveDays => baseline.total_active_days as f64,
            BaselineMetric::TripleFeatureDays => baseline.triple_feature_days as f64,
            BaselineMetric::PerfectDays => baseline.perfect_days as f64,
            BaselineMetric::MonthlyXpTotal => baseline.monthly_xp_total as f64,
            BaselineMetric::LongestEngagementStreak => baseline.longest_engagement_streak as f64,
        }
    }
}

/// One requirement of a template, before scaling.
#[derive(Debug, Clone)]
pub struct RequirementTemplate {
    pub tracking_key: &'static str,
    pub metric: BaselineMetric,
    /// Inclusive clamp applied to the star multiplier.
    pub multiplier_range: (f64, f64),
    pub description: &'static str,
}

/// Static catalog entry.
#[derive(Debug, Clone)]
pub struct MonthlyChallengeTemplate {
    pub id: &'static str,
    pub category: ChallengeCategory,
    pub title: &'static str,
    pub description: &'static str,
    /// Star tier required before this template is eligible.
    pub min_star_level: u8,
    /// Minimum baseline data quality this template wants.
    pub min_data_quality: DataQuality,
    /// Base selection score.
    pub priority: f64,
    /// Months (1-12) in which the template gets a seasonal bonus.
    pub seasonal_months: &'static [u32],
    /// Months a template sits out after being used.
    pub cooldown_months: u32,
    pub requirements: Vec<RequirementTemplate>,
}

/// The category-specific constant substituted when a baseline metric is
/// absent or non-positive.
pub fn fallback_metric_value(category: ChallengeCategory) -> f64 {
    match category {
        ChallengeCategory::Habits => 20.0,
        ChallengeCategory::Journal => 25.0,
        ChallengeCategory::Goals => 10.0,
        ChallengeCategory::Consistency => 12.0,
    }
}

/// Per-tracking-key minimum target at a star level. Scaled targets are
/// raised to this floor.
pub fn minimum_target(tracking_key: &str, star: u8) -> u32 {
    let star = star.clamp(1, 5) as u32;
    match tracking_key {
        tracking::SCHEDULED_HABIT_COMPLETIONS => 15 + 3 * (star - 1),
        tracking::JOURNAL_ENTRIES => 20 + 4 * (star - 1),
        tracking::GOAL_PROGRESS_UPDATES => 10 + 2 * (star - 1),
        tracking::GOAL_COMPLETIONS => star,
        tracking::ACTIVE_DAYS => 12 + 2 * (star - 1),
        tracking::TRIPLE_FEATURE_DAYS => 5 + 2 * (star - 1),
        tracking::PERFECT_DAYS => 4 + 2 * (star - 1),
        tracking::MONTHLY_XP_TOTAL => 300 + 150 * (star - 1),
        _ => 1,
    }
}

/// First-month floors per requirement type.
pub fn first_month_target(tracking_key: &str) -> u32 {
    match tracking_key {
        tracking::SCHEDULED_HABIT_COMPLETIONS => 15,
        tracking::JOURNAL_ENTRIES => 20,
        tracking::GOAL_PROGRESS_UPDATES => 10,
        tracking::ACTIVE_DAYS => 12,
        other => minimum_target(other, 1),
    }
}

/// The builtin template catalog.
pub fn builtin_templates() -> Vec<MonthlyChallengeTemplate> {
    vec![
        // ── Habits ───────────────────────────────────────────────────
        MonthlyChallengeTemplate {
            id: "habit_steady_cadence",
            category: ChallengeCategory::Habits,
            title: "Steady Cadence",
            description: "Keep your scheduled habits moving every week.",
            min_star_level: 1,
            min_data_quality: DataQuality::Minimal,
            priority: 60.0,
            seasonal_months: &[],
            cooldown_months: 2,
            requirements: vec![RequirementTemplate {
                tracking_key: tracking::SCHEDULED_HABIT_COMPLETIONS,
                metric: BaselineMetric::TotalHabitCompletions,
                multiplier_range: (0.9, 1.4),
                description: "Complete scheduled habits",
            }],
        },
        MonthlyChallengeTemplate {
            id: "habit_showing_up",
            category: ChallengeCategory::Habits,
            title: "Showing Up",
            description: "Habits plus presence: complete habits and stay active.",
            min_star_level: 2,
            min_data_quality: DataQuality::Partial,
            priority: 50.0,
            seasonal_months: &[],
            cooldown_months: 3,
            requirements: vec![
                RequirementTemplate {
                    tracking_key: tracking::SCHEDULED_HABIT_COMPLETIONS,
                    metric: BaselineMetric::TotalHabitCompletions,
                    multiplier_range: (0.9, 1.3),
                    description: "Complete scheduled habits",
                },
                RequirementTemplate {
                    tracking_key: tracking::ACTIVE_DAYS,
                    metric: BaselineMetric::ActiveDays,
                    multiplier_range: (0.8, 1.2),
                    description: "Be active on distinct days",
                },
            ],
        },
        MonthlyChallengeTemplate {
            id: "habit_power_month",
            category: ChallengeCategory::Habits,
            title: "Power Month",
            description: "A heavy habit month with an XP stretch target.",
            min_star_level: 3,
            min_data_quality: DataQuality::Partial,
            priority: 40.0,
            seasonal_months: &[1, 9],
            cooldown_months: 4,
            requirements: vec![
                RequirementTemplate {
                    tracking_key: tracking::SCHEDULED_HABIT_COMPLETIONS,
                    metric: BaselineMetric::TotalHabitCompletions,
                    multiplier_range: (1.0, 1.5),
                    description: "Complete scheduled habits",
                },
                RequirementTemplate {
                    tracking_key: tracking::MONTHLY_XP_TOTAL,
                    metric: BaselineMetric::MonthlyXpTotal,
                    multiplier_range: (1.0, 1.3),
                    description: "Earn XP over the month",
                },
            ],
        },
        // ── Journal ──────────────────────────────────────────────────
        MonthlyChallengeTemplate {
            id: "journal_momentum",
            category: ChallengeCategory::Journal,
            title: "Journal Momentum",
            description: "Write regularly and keep the pen moving.",
            min_star_level: 1,
            min_data_quality: DataQuality::Minimal,
            priority: 60.0,
            seasonal_months: &[],
            cooldown_months: 2,
            requirements: vec![RequirementTemplate {
                tracking_key: tracking::JOURNAL_ENTRIES,
                metric: BaselineMetric::TotalJournalEntries,
                multiplier_range: (0.9, 1.4),
                description: "Write journal entries",
            }],
        },
        MonthlyChallengeTemplate {
            id: "journal_deep_practice",
            category: ChallengeCategory::Journal,
            title: "Deep Practice",
            description: "Pair a steady journal with perfect days.",
            min_star_level: 2,
            min_data_quality: DataQuality::Partial,
            priority: 50.0,
            seasonal_months: &[],
            cooldown_months: 3,
            requirements: vec![
                RequirementTemplate {
                    tracking_key: tracking::JOURNAL_ENTRIES,
                    metric: BaselineMetric::TotalJournalEntries,
                    multiplier_range: (0.9, 1.3),
                    description: "Write journal entries",
                },
                RequirementTemplate {
                    tracking_key: tracking::PERFECT_DAYS,
                    metric: BaselineMetric::PerfectDays,
                    multiplier_range: (0.8, 1.25),
                    description: "Log perfect days",
                },
            ],
        },
        MonthlyChallengeTemplate {
            id: "journal_reflection_sprint",
            category: ChallengeCategory::Journal,
            title: "Reflection Sprint",
            description: "A reflective month: entries plus day-in day-out presence.",
            min_star_level: 3,
            min_data_quality: DataQuality::Partial,
            priority: 40.0,
            seasonal_months: &[1, 12],
            cooldown_months: 4,
            requirements: vec![
                RequirementTemplate {
                    tracking_key: tracking::JOURNAL_ENTRIES,
                    metric: BaselineMetric::TotalJournalEntries,
                    multiplier_range: (1.0, 1.5),
                    description: "Write journal entries",
                },
                RequirementTemplate {
                    tracking_key: tracking::ACTIVE_DAYS,
                    metric: BaselineMetric::ActiveDays,
                    multiplier_range: (0.8, 1.2),
                    description: "Be active on distinct days",
                },
            ],
        },
        // ── Goals ────────────────────────────────────────────────────
        MonthlyChallengeTemplate {
            id: "goal_progress_push",
            category: ChallengeCategory::Goals,
            title: "Progress Push",
            description: "Move your goals forward, update by update.",
            min_star_level: 1,
            min_data_quality: DataQuality::Minimal,
            priority: 60.0,
            seasonal_months: &[],
            cooldown_months: 2,
            requirements: vec![RequirementTemplate {
                tracking_key: tracking::GOAL_PROGRESS_UPDATES,
                metric: BaselineMetric::GoalProgressDays,
                multiplier_range: (0.9, 1.4),
                description: "Record goal progress updates",
            }],
        },
        MonthlyChallengeTemplate {
            id: "goal_finisher",
            category: ChallengeCategory::Goals,
            title: "Finisher",
            description: "Close goals out, not just inch them forward.",
            min_star_level: 2,
            min_data_quality: DataQuality::Partial,
            priority: 50.0,
            seasonal_months: &[],
            cooldown_months: 3,
            requirements: vec![
                RequirementTemplate {
                    tracking_key: tracking::GOAL_PROGRESS_UPDATES,
                    metric: BaselineMetric::GoalProgressDays,
                    multiplier_range: (0.9, 1.3),
                    description: "Record goal progress updates",
                },
                RequirementTemplate {
                    tracking_key: tracking::GOAL_COMPLETIONS,
                    metric: BaselineMetric::GoalProgressDays,
                    multiplier_range: (0.1, 0.3),
                    description: "Complete goals",
                },
            ],
        },
        MonthlyChallengeTemplate {
            id: "goal_xp_drive",
            category: ChallengeCategory::Goals,
            title: "XP Drive",
            description: "Goal work with an XP total to chase.",
            min_star_level: 3,
            min_data_quality: DataQuality::Partial,
            priority: 40.0,
            seasonal_months: &[6],
            cooldown_months: 4,
            requirements: vec![
                RequirementTemplate {
                    tracking_key: tracking::GOAL_PROGRESS_UPDATES,
                    metric: BaselineMetric::GoalProgressDays,
                    multiplier_range: (1.0, 1.5),
                    description: "Record goal progress updates",
                },
                RequirementTemplate {
                    tracking_key: tracking::MONTHLY_XP_TOTAL,
                    metric: BaselineMetric::MonthlyXpTotal,
                    multiplier_range: (1.0, 1.3),
                    description: "Earn XP over the month",
                },
            ],
        },
        // ── Consistency ──────────────────────────────────────────────
        MonthlyChallengeTemplate {
            id: "consistency_show_up_daily",
            category: ChallengeCategory::Consistency,
            title: "Show Up Daily",
            description: "Be active as many days as you can.",
            min_star_level: 1,
            min_data_quality: DataQuality::Minimal,
            priority: 60.0,
            seasonal_months: &[],
            cooldown_months: 2,
            requirements: vec![RequirementTemplate {
                tracking_key: tracking::ACTIVE_DAYS,
                metric: BaselineMetric::ActiveDays,
                multiplier_range: (0.9, 1.3),
                description: "Be active on distinct days",
            }],
        },
        MonthlyChallengeTemplate {
            id: "consistency_triple_threat",
            category: ChallengeCategory::Consistency,
            title: "Triple Threat",
            description: "Days where habits, journal and goals all see action.",
            min_star_level: 2,
            min_data_quality: DataQuality::Partial,
            priority: 50.0,
            seasonal_months: &[],
            cooldown_months: 3,
            requirements: vec![
                RequirementTemplate {
                    tracking_key: tracking::TRIPLE_FEATURE_DAYS,
                    metric: BaselineMetric::TripleFeatureDays,
                    multiplier_range: (0.8, 1.25),
                    description: "Log triple-feature days",
                },
                RequirementTemplate {
                    tracking_key: tracking::ACTIVE_DAYS,
                    metric: BaselineMetric::ActiveDays,
                    multiplier_range: (0.8, 1.2),
                    description: "Be active on distinct days",
                },
            ],
        },
        MonthlyChallengeTemplate {
            id: "consistency_perfect_run",
            category: ChallengeCategory::Consistency,
            title: "Perfect Run",
            description: "Stack perfect days on top of a full month of XP.",
            min_star_level: 3,
            min_data_quality: DataQuality::Complete,
            priority: 40.0,
            seasonal_months: &[12],
            cooldown_months: 4,
            requirements: vec![
                RequirementTemplate {
                    tracking_key: tracking::PERFECT_DAYS,
                    metric: BaselineMetric::PerfectDays,
                    multiplier_range: (0.8, 1.25),
                    description: "Log perfect days",
                },
                RequirementTemplate {
                    tracking_key: tracking::MONTHLY_XP_TOTAL,
                    metric: BaselineMetric::MonthlyXpTotal,
                    multiplier_range: (1.0, 1.3),
                    description: "Earn XP over the month",
                },
            ],
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_covers_every_category() {
        let templates = builtin_templates();
        for category in ChallengeCategory::all() {
            let count = templates.iter().filter(|t| t.category == category).count();
            assert!(count >= 3, "{category} has {count} templates");
        }
    }

    #[test]
    fn test_every_category_has_a_one_star_template() {
        // The low-star fallback path depends on this.
        let templates = builtin_templates();
        for category in ChallengeCategory::all() {
            assert!(
                templates
                    .iter()
                    .any(|t| t.category == category && t.min_star_level == 1),
                "{category} lacks a 1-star template"
            );
        }
    }

    #[test]
    fn test_template_ids_unique() {
        let templates = builtin_templates();
        let mut ids: Vec<_> = templates.iter().map(|t| t.id).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), templates.len());
    }

    #[test]
    fn test_multiplier_ranges_well_formed() {
        for template in builtin_templates() {
            for req in &template.requirements {
                assert!(req.multiplier_range.0 <= req.multiplier_range.1);
                assert!(req.multiplier_range.0 > 0.0);
            }
        }
    }

    #[test]
    fn test_first_month_floors() {
        use crate::challenge::types::tracking;
        assert_eq!(first_month_target(tracking::SCHEDULED_HABIT_COMPLETIONS), 15);
        assert_eq!(first_month_target(tracking::JOURNAL_ENTRIES), 20);
        assert_eq!(first_month_target(tracking::GOAL_PROGRESS_UPDATES), 10);
        assert_eq!(first_month_target(tracking::ACTIVE_DAYS), 12);
    }

    #[test]
    fn test_minimum_target_scales_with_stars() {
        use crate::challenge::types::tracking;
        let key = tracking::JOURNAL_ENTRIES;
        let mut last = 0;
        for star in 1..=5 {
            let floor = minimum_target(key, star);
            assert!(floor > last);
            last = floor;
        }
    }
}
