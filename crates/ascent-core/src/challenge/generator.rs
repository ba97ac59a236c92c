//! Challenge generation engine.
//!
//! Consumes a baseline, the current star ratings and the recent rotation
//! history, and produces a concrete [`MonthlyChallenge`]:
//!
//! 1. Users with no usable signal get a fixed, deliberately easy
//!    first-month challenge.
//! 2. Otherwise a category is chosen by weighted scoring (engagement,
//!    anti-repetition, star-tier bonus, data-quality bonus).
//! 3. A template is chosen within the category by priority, seasonality,
//!    repeat penalty and random variance.
//! 4. Requirement targets are scaled from baseline metrics by the star
//!    multiplier, clamped to template ranges, floored at per-key minimums
//!    and capped by calendar and XP limits.
//!
//! Any pipeline failure degrades to a fixed minimal fallback challenge --
//! generation never fails outright. Generation is idempotent per month:
//! an existing challenge is returned unchanged and no second write occurs.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rand::prelude::*;
use rand_pcg::Mcg128Xsl64;
use uuid::Uuid;

use crate::baseline::{DataQuality, UserActivityBaseline};
use crate::challenge::templates::{
    builtin_templates, fallback_metric_value, first_month_target, minimum_target,
    MonthlyChallengeTemplate,
};
use crate::challenge::types::{
    tracking, ChallengeCategory, GenerationReason, MonthlyChallenge, MonthlyChallengeProgress,
    MonthlyChallengeRequirement, RotationEntry, RotationHistory,
};
use crate::clock::Clock;
use crate::error::{CoreError, GenerationError, Result};
use crate::events::{Event, EventBus};
use crate::month::MonthKey;
use crate::stars::{star_multiplier, UserChallengeRatings};
use crate::store::ChallengeRepository;

/// Tuning knobs for generation.
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    /// Daily XP ceiling used to cap monthly XP targets.
    pub daily_xp_cap: u32,
    /// Seed for template-selection variance (None = entropy).
    pub variance_seed: Option<u64>,
    /// Category used when every weight collapses to zero, and for the
    /// fallback challenge.
    pub default_category: ChallengeCategory,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            daily_xp_cap: 500,
            variance_seed: None,
            default_category: ChallengeCategory::Habits,
        }
    }
}

/// Everything generation needs to know about the user.
#[derive(Debug, Clone)]
pub struct GenerationContext {
    pub month: MonthKey,
    pub baseline: Option<UserActivityBaseline>,
    pub ratings: UserChallengeRatings,
    pub rotation: RotationHistory,
    pub is_first_month: bool,
}

/// How the challenge came to be.
#[derive(Debug, Clone)]
pub struct GenerationMetadata {
    pub reason: GenerationReason,
    pub template_id: Option<String>,
    /// Final weight per category, for diagnostics.
    pub category_weights: Vec<(ChallengeCategory, f64)>,
    pub warnings: Vec<String>,
    pub generated_at: DateTime<Utc>,
}

/// Result of a generation call. Always carries a challenge.
#[derive(Debug, Clone)]
pub struct GenerationOutcome {
    pub challenge: MonthlyChallenge,
    pub metadata: GenerationMetadata,
    /// False when the pipeline degraded to the fallback challenge.
    pub success: bool,
    /// False when an existing challenge was returned unchanged.
    pub newly_created: bool,
}

/// Active days below which the first-month path is taken.
const LOW_DATA_ACTIVE_DAYS: u32 = 7;

/// Penalty schedule for a category used 1/2/3 months back.
const RECENT_USE_PENALTIES: [f64; 3] = [0.8, 0.4, 0.1];
const RECENT_USE_PENALTY_CAP: f64 = 0.9;

/// An alternative category beats a repeated top pick at 70% of its weight.
const ALTERNATIVE_WEIGHT_RATIO: f64 = 0.7;

/// Template scoring bonuses.
const SEASONAL_BONUS: f64 = 30.0;
const REPEAT_PENALTY: f64 = 40.0;
const TEMPLATE_REPEAT_WINDOW: i32 = 6;
const VARIANCE_RANGE: f64 = 20.0;

/// Fraction of the daily XP cap above which an XP target draws a warning.
const XP_WARNING_RATIO: f64 = 0.8;

fn base_xp_reward(star: u8) -> u32 {
    match star.clamp(1, 5) {
        1 => 300,
        2 => 450,
        3 => 600,
        4 => 750,
        _ => 900,
    }
}

/// The generation engine.
pub struct ChallengeGenerator {
    repo: ChallengeRepository,
    bus: Arc<dyn EventBus>,
    clock: Arc<dyn Clock>,
    config: GeneratorConfig,
    templates: Vec<MonthlyChallengeTemplate>,
}

impl ChallengeGenerator {
    pub fn new(
        repo: ChallengeRepository,
        bus: Arc<dyn EventBus>,
        clock: Arc<dyn Clock>,
        config: GeneratorConfig,
    ) -> Self {
        Self {
            repo,
            bus,
            clock,
            config,
            templates: builtin_templates(),
        }
    }

    /// Assemble a generation context for a month from stored state.
    pub fn context_for_month(
        &self,
        month: MonthKey,
        baseline: Option<UserActivityBaseline>,
    ) -> Result<GenerationContext> {
        let ratings = self.repo.ratings()?;
        let rotation = self.repo.rotation()?;
        // No rotation entries means no challenge has ever been generated.
        let is_first_month = rotation.entries.is_empty();
        Ok(GenerationContext {
            month,
            baseline,
            ratings,
            rotation,
            is_first_month,
        })
    }

    /// Generate (or return the existing) challenge for the context month.
    pub fn generate(&self, ctx: &GenerationContext) -> Result<GenerationOutcome> {
        if let Some(existing) = self.repo.challenge_for_month(&ctx.month)? {
            return Ok(GenerationOutcome {
                metadata: GenerationMetadata {
                    reason: existing.generation_reason,
                    template_id: existing.template_id.clone(),
                    category_weights: Vec::new(),
                    warnings: Vec::new(),
                    generated_at: existing.created_at,
                },
                success: existing.generation_reason != GenerationReason::Fallback,
                newly_created: false,
                challenge: existing,
            });
        }

        let (challenge, metadata) = match self.build(ctx) {
            Ok(pair) => pair,
            Err(e) => {
                tracing::warn!(
                    month = %ctx.month,
                    error = %e,
                    "challenge pipeline failed, generating fallback challenge"
                );
                self.build_fallback(ctx, &e)
            }
        };

        self.persist(&challenge)?;
        let success = metadata.reason != GenerationReason::Fallback;
        Ok(GenerationOutcome {
            challenge,
            metadata,
            success,
            newly_created: true,
        })
    }

    /// Build a challenge for a future month without persisting anything.
    pub fn build_preview(&self, ctx: &GenerationContext) -> Result<MonthlyChallenge> {
        let (challenge, _metadata) = match self.build(ctx) {
            Ok(pair) => pair,
            Err(e) => self.build_fallback(ctx, &e),
        };
        Ok(challenge)
    }

    /// Persist a previously built (previewed) challenge as the month's
    /// challenge. Idempotent like [`generate`](Self::generate).
    pub fn adopt_preview(&self, challenge: MonthlyChallenge) -> Result<GenerationOutcome> {
        if let Some(existing) = self.repo.challenge_for_month(&challenge.month)? {
            return Ok(GenerationOutcome {
                metadata: GenerationMetadata {
                    reason: existing.generation_reason,
                    template_id: existing.template_id.clone(),
                    category_weights: Vec::new(),
                    warnings: Vec::new(),
                    generated_at: existing.created_at,
                },
                success: existing.generation_reason != GenerationReason::Fallback,
                newly_created: false,
                challenge: existing,
            });
        }

        let mut challenge = challenge;
        challenge.is_active = true;
        self.persist(&challenge)?;
        let reason = challenge.generation_reason;
        Ok(GenerationOutcome {
            metadata: GenerationMetadata {
                reason,
                template_id: challenge.template_id.clone(),
                category_weights: Vec::new(),
                warnings: Vec::new(),
                generated_at: self.clock.now(),
            },
            success: reason != GenerationReason::Fallback,
            newly_created: true,
            challenge,
        })
    }

    // ── Pipeline ─────────────────────────────────────────────────────

    fn build(
        &self,
        ctx: &GenerationContext,
    ) -> Result<(MonthlyChallenge, GenerationMetadata), CoreError> {
        let low_data = match &ctx.baseline {
            None => true,
            Some(b) => {
                b.total_active_days < LOW_DATA_ACTIVE_DAYS
                    || b.data_quality == DataQuality::Minimal
            }
        };
        if ctx.is_first_month || low_data {
            return Ok(self.build_first_month(ctx));
        }

        let baseline = ctx
            .baseline
            .as_ref()
            .ok_or_else(|| GenerationError::PipelineFailed("baseline missing".into()))?;

        // 1. Category selection.
        let (category, weights) = self.select_category(ctx, baseline);
        let star = ctx.ratings.stars(category);

        // 2. Template selection.
        let mut rng = self.rng();
        let template = self.select_template(category, star, baseline.data_quality, ctx, &mut rng)?;

        // 3. Requirement scaling.
        let mut warnings = Vec::new();
        let requirements =
            self.scale_requirements(template, baseline, star, &ctx.month, &mut warnings);
        if requirements.is_empty() {
            return Err(GenerationError::PipelineFailed(format!(
                "template '{}' produced no requirements",
                template.id
            ))
            .into());
        }

        let now = self.clock.now();
        let challenge = MonthlyChallenge {
            id: Uuid::new_v4().to_string(),
            month: ctx.month,
            category,
            star_level: star,
            title: template.title.to_string(),
            description: template.description.to_string(),
            start_date: ctx.month.first_day(),
            end_date: ctx.month.last_day(),
            xp_reward: base_xp_reward(star),
            requirements,
            baseline_snapshot: baseline.clone(),
            generation_reason: GenerationReason::Standard,
            template_id: Some(template.id.to_string()),
            is_active: true,
            created_at: now,
        };
        let metadata = GenerationMetadata {
            reason: GenerationReason::Standard,
            template_id: Some(template.id.to_string()),
            category_weights: weights,
            warnings,
            generated_at: now,
        };
        Ok((challenge, metadata))
    }

    /// Fixed, deliberately easy challenge for users without usable signal.
    fn build_first_month(
        &self,
        ctx: &GenerationContext,
    ) -> (MonthlyChallenge, GenerationMetadata) {
        let now = self.clock.now();
        let baseline = ctx.baseline.clone().unwrap_or_else(|| {
            UserActivityBaseline::minimal_fallback(ctx.month, self.repo.user_id(), now)
        });

        // Conservative: 30%-reduced baseline-derived targets, floored at
        // the first-month minimums per requirement type.
        let keys_and_values = [
            (
                tracking::SCHEDULED_HABIT_COMPLETIONS,
                baseline.total_habit_completions as f64,
                "Complete scheduled habits",
            ),
            (
                tracking::JOURNAL_ENTRIES,
                baseline.total_journal_entries as f64,
                "Write journal entries",
            ),
            (
                tracking::GOAL_PROGRESS_UPDATES,
                baseline.total_goal_progress_days as f64,
                "Record goal progress updates",
            ),
            (
                tracking::ACTIVE_DAYS,
                baseline.total_active_days as f64,
                "Be active on distinct days",
            ),
        ];
        let requirements = keys_and_values
            .iter()
            .map(|(key, value, desc)| {
                let floor = first_month_target(key);
                let reduced = (value * 0.7).ceil() as u32;
                MonthlyChallengeRequirement {
                    tracking_key: (*key).to_string(),
                    target: reduced.max(floor),
                    baseline_value: *value,
                    scaling_multiplier: 0.7,
                    milestone_fractions: vec![0.25, 0.50, 0.75],
                    used_fallback: *value <= 0.0,
                    description: (*desc).to_string(),
                }
            })
            .collect();

        let challenge = MonthlyChallenge {
            id: Uuid::new_v4().to_string(),
            month: ctx.month,
            category: ChallengeCategory::Consistency,
            star_level: 1,
            title: "Getting Started".to_string(),
            description: "A gentle first month across habits, journal and goals.".to_string(),
            start_date: ctx.month.first_day(),
            end_date: ctx.month.last_day(),
            xp_reward: base_xp_reward(1),
            requirements,
            baseline_snapshot: baseline,
            generation_reason: GenerationReason::FirstMonth,
            template_id: None,
            is_active: true,
            created_at: now,
        };
        let metadata = GenerationMetadata {
            reason: GenerationReason::FirstMonth,
            template_id: None,
            category_weights: Vec::new(),
            warnings: Vec::new(),
            generated_at: now,
        };
        (challenge, metadata)
    }

    /// Fixed minimal challenge substituted when the pipeline fails.
    fn build_fallback(
        &self,
        ctx: &GenerationContext,
        error: &CoreError,
    ) -> (MonthlyChallenge, GenerationMetadata) {
        let now = self.clock.now();
        let category = self.config.default_category;
        let baseline = ctx.baseline.clone().unwrap_or_else(|| {
            UserActivityBaseline::minimal_fallback(ctx.month, self.repo.user_id(), now)
        });
        let key = tracking::SCHEDULED_HABIT_COMPLETIONS;
        let target = minimum_target(key, 1);

        let challenge = MonthlyChallenge {
            id: Uuid::new_v4().to_string(),
            month: ctx.month,
            category,
            star_level: 1,
            title: "Back to Basics".to_string(),
            description: "A minimal, reliable month while we sort things out.".to_string(),
            start_date: ctx.month.first_day(),
            end_date: ctx.month.last_day(),
            xp_reward: 250,
            requirements: vec![MonthlyChallengeRequirement {
                tracking_key: key.to_string(),
                target,
                baseline_value: 0.0,
                scaling_multiplier: 1.0,
                milestone_fractions: vec![0.25, 0.50, 0.75],
                used_fallback: true,
                description: "Complete scheduled habits".to_string(),
            }],
            baseline_snapshot: baseline,
            generation_reason: GenerationReason::Fallback,
            template_id: None,
            is_active: true,
            created_at: now,
        };
        let metadata = GenerationMetadata {
            reason: GenerationReason::Fallback,
            template_id: None,
            category_weights: Vec::new(),
            warnings: vec![format!("pipeline error: {error}")],
            generated_at: now,
        };
        (challenge, metadata)
    }

    // ── Category selection ───────────────────────────────────────────

    fn select_category(
        &self,
        ctx: &GenerationContext,
        baseline: &UserActivityBaseline,
    ) -> (ChallengeCategory, Vec<(ChallengeCategory, f64)>) {
        let mut weights: Vec<(ChallengeCategory, f64)> = ChallengeCategory::all()
            .into_iter()
            .map(|category| {
                let base = base_category_weight(category);
                let engagement = engagement_multiplier(category, baseline);
                let penalty = recent_use_penalty(&ctx.rotation, &ctx.month, category);
                let star_bonus = star_level_bonus(ctx.ratings.stars(category));
                let quality_bonus = data_quality_bonus(baseline.data_quality);
                let weight = base * engagement * (1.0 - penalty) + star_bonus + quality_bonus;
                (category, weight)
            })
            .collect();
        weights.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        let top = weights[0];
        if top.1 <= 0.0 {
            return (self.config.default_category, weights);
        }

        // Anti-repetition: prefer a close runner-up over last month's pick.
        let last_month = ctx.rotation.category_used(&ctx.month, 1);
        if Some(top.0) == last_month {
            if let Some(alternative) = weights[1..]
                .iter()
                .find(|(_, w)| *w >= top.1 * ALTERNATIVE_WEIGHT_RATIO)
            {
                return (alternative.0, weights);
            }
        }
        (top.0, weights)
    }

    // ── Template selection ───────────────────────────────────────────

    fn select_template(
        &self,
        category: ChallengeCategory,
        star: u8,
        quality: DataQuality,
        ctx: &GenerationContext,
        rng: &mut Mcg128Xsl64,
    ) -> Result<&MonthlyChallengeTemplate, CoreError> {
        let eligible: Vec<&MonthlyChallengeTemplate> = self
            .templates
            .iter()
            .filter(|t| t.category == category)
            .filter(|t| t.min_star_level <= star && t.min_data_quality <= quality)
            .collect();

        if eligible.is_empty() {
            // Nothing meets the star floor: fall back to the
            // lowest-requirement template in the category.
            return self
                .templates
                .iter()
                .filter(|t| t.category == category)
                .min_by(|a, b| {
                    (a.min_star_level, a.priority as i64)
                        .cmp(&(b.min_star_level, b.priority as i64))
                })
                .ok_or_else(|| {
                    GenerationError::NoTemplate {
                        category: category.to_string(),
                    }
                    .into()
                });
        }

        let scored = eligible.into_iter().map(|t| {
            let seasonal = if t.seasonal_months.contains(&ctx.month.month) {
                SEASONAL_BONUS
            } else {
                0.0
            };
            let window = TEMPLATE_REPEAT_WINDOW.max(t.cooldown_months as i32);
            let repeat = if ctx.rotation.template_used_within(&ctx.month, t.id, window) {
                REPEAT_PENALTY
            } else {
                0.0
            };
            let variance = rng.gen_range(-VARIANCE_RANGE..=VARIANCE_RANGE);
            (t, t.priority + seasonal - repeat + variance)
        });

        scored
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(t, _)| t)
            .ok_or_else(|| {
                GenerationError::NoTemplate {
                    category: category.to_string(),
                }
                .into()
            })
    }

    // ── Requirement scaling ──────────────────────────────────────────

    fn scale_requirements(
        &self,
        template: &MonthlyChallengeTemplate,
        baseline: &UserActivityBaseline,
        star: u8,
        month: &MonthKey,
        warnings: &mut Vec<String>,
    ) -> Vec<MonthlyChallengeRequirement> {
        let days_in_month = month.days_in_month();
        template
            .requirements
            .iter()
            .map(|req| {
                let read = req.metric.read(baseline);
                let (baseline_value, used_fallback) = if read > 0.0 {
                    (read, false)
                } else {
                    (fallback_metric_value(template.category), true)
                };

                let (lo, hi) = req.multiplier_range;
                let multiplier = star_multiplier(star).clamp(lo, hi);
                let mut target = (baseline_value * multiplier).ceil() as u32;

                let floor = minimum_target(req.tracking_key, star);
                if target < floor {
                    target = floor;
                }

                // Day-count targets cannot exceed the calendar.
                if tracking::is_day_count(req.tracking_key) && target > days_in_month {
                    target = days_in_month;
                }

                // XP targets are capped by the daily cap, with a warning
                // once the implied daily average crowds the cap.
                if tracking::is_xp_total(req.tracking_key) {
                    let cap = self.config.daily_xp_cap * days_in_month;
                    if target > cap {
                        target = cap;
                    }
                    let implied_daily = target as f64 / days_in_month as f64;
                    if implied_daily > self.config.daily_xp_cap as f64 * XP_WARNING_RATIO {
                        warnings.push(format!(
                            "monthly XP target {target} implies a daily average above {:.0}% of the daily cap",
                            XP_WARNING_RATIO * 100.0
                        ));
                    }
                }

                MonthlyChallengeRequirement {
                    tracking_key: req.tracking_key.to_string(),
                    target,
                    baseline_value,
                    scaling_multiplier: multiplier,
                    milestone_fractions: vec![0.25, 0.50, 0.75],
                    used_fallback,
                    description: req.description.to_string(),
                }
            })
            .collect()
    }

    // ── Persistence ──────────────────────────────────────────────────

    fn persist(&self, challenge: &MonthlyChallenge) -> Result<()> {
        let now = self.clock.now();
        self.repo.save_challenge(challenge)?;
        self.repo
            .save_progress(&MonthlyChallengeProgress::new(challenge, now))?;

        let mut rotation = self.repo.rotation()?;
        rotation.record(RotationEntry {
            month: challenge.month,
            category: challenge.category,
            template_id: challenge.template_id.clone(),
        });
        self.repo.save_rotation(&rotation)?;

        self.bus.publish(Event::ChallengeGenerated {
            challenge_id: challenge.id.clone(),
            month: challenge.month,
            category: challenge.category,
            star_level: challenge.star_level,
            reason: challenge.generation_reason,
            at: now,
        });
        Ok(())
    }

    fn rng(&self) -> Mcg128Xsl64 {
        match self.config.variance_seed {
            Some(seed) => Mcg128Xsl64::seed_from_u64(seed),
            None => Mcg128Xsl64::from_entropy(),
        }
    }
}

// ── Weighting helpers ────────────────────────────────────────────────

fn base_category_weight(category: ChallengeCategory) -> f64 {
    match category {
        ChallengeCategory::Habits => 1.0,
        ChallengeCategory::Journal => 0.9,
        ChallengeCategory::Goals => 0.85,
        ChallengeCategory::Consistency => 0.8,
    }
}

/// How engaged the user already is with a category, 0.25-1.5.
fn engagement_multiplier(category: ChallengeCategory, baseline: &UserActivityBaseline) -> f64 {
    let score = match category {
        ChallengeCategory::Habits => baseline.daily_habit_completions / 3.0,
        ChallengeCategory::Journal => baseline.daily_journal_entries / 3.0,
        ChallengeCategory::Goals => baseline.daily_goal_progress,
        ChallengeCategory::Consistency => baseline.total_active_days as f64 / 30.0,
    };
    score.clamp(0.25, 1.5)
}

/// Discourage repeating recently used categories: 0.8 / 0.4 / 0.1 for
/// 1 / 2 / 3 months back, capped at 0.9.
fn recent_use_penalty(
    rotation: &RotationHistory,
    month: &MonthKey,
    category: ChallengeCategory,
) -> f64 {
    let mut penalty = 0.0;
    for (idx, &amount) in RECENT_USE_PENALTIES.iter().enumerate() {
        let months_back = idx as i32 + 1;
        if rotation.category_used(month, months_back) == Some(category) {
            penalty += amount;
        }
    }
    penalty.min(RECENT_USE_PENALTY_CAP)
}

/// Mid-tier categories are the most interesting; mastered ones the least.
fn star_level_bonus(stars: u8) -> f64 {
    match stars.clamp(1, 5) {
        2 | 3 => 0.30,
        4 => 0.15,
        1 => 0.10,
        _ => 0.0,
    }
}

fn data_quality_bonus(quality: DataQuality) -> f64 {
    match quality {
        DataQuality::Complete => 0.10,
        DataQuality::Partial => 0.05,
        DataQuality::Minimal => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::events::MemoryBus;
    use crate::store::{MemoryStore, RecordStore};
    use chrono::NaiveDate;

    fn setup() -> (ChallengeGenerator, ChallengeRepository, Arc<MemoryBus>) {
        let store: Arc<dyn RecordStore> = Arc::new(MemoryStore::new());
        let repo = ChallengeRepository::new(store, "local");
        let bus = Arc::new(MemoryBus::new());
        let clock = Arc::new(FixedClock::at_date(
            NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
        ));
        let config = GeneratorConfig {
            variance_seed: Some(42),
            ..Default::default()
        };
        let generator = ChallengeGenerator::new(repo.clone(), bus.clone(), clock, config);
        (generator, repo, bus)
    }

    fn rich_baseline(month: MonthKey) -> UserActivityBaseline {
        let mut baseline =
            UserActivityBaseline::minimal_fallback(month, "local", Utc::now());
        baseline.total_active_days = 24;
        baseline.daily_habit_completions = 2.5;
        baseline.daily_journal_entries = 2.0;
        baseline.daily_goal_progress = 0.5;
        baseline.total_habit_completions = 60;
        baseline.total_journal_entries = 48;
        baseline.total_goal_progress_days = 12;
        baseline.triple_feature_days = 8;
        baseline.perfect_days = 6;
        baseline.monthly_xp_total = 4000;
        baseline.data_quality = DataQuality::Complete;
        baseline
    }

    #[test]
    fn test_first_month_scenario() {
        let (generator, _repo, _bus) = setup();
        let month = MonthKey::new(2025, 3);
        let ctx = generator.context_for_month(month, None).unwrap();
        assert!(ctx.is_first_month);

        let outcome = generator.generate(&ctx).unwrap();
        let challenge = &outcome.challenge;
        assert_eq!(challenge.generation_reason, GenerationReason::FirstMonth);
        assert_eq!(challenge.star_level, 1);

        let target_for = |key: &str| {
            challenge
                .requirements
                .iter()
                .find(|r| r.tracking_key == key)
                .map(|r| r.target)
                .unwrap()
        };
        assert!(target_for(tracking::SCHEDULED_HABIT_COMPLETIONS) >= 15);
        assert!(target_for(tracking::JOURNAL_ENTRIES) >= 20);
        assert!(target_for(tracking::GOAL_PROGRESS_UPDATES) >= 10);
        assert!(target_for(tracking::ACTIVE_DAYS) >= 12);
    }

    #[test]
    fn test_generation_is_idempotent() {
        let (generator, repo, bus) = setup();
        let month = MonthKey::new(2025, 3);
        let ctx = generator.context_for_month(month, None).unwrap();

        let first = generator.generate(&ctx).unwrap();
        assert!(first.newly_created);
        let events_after_first = bus.events().len();

        // Second call returns the persisted challenge and performs no write.
        let ctx = generator.context_for_month(month, None).unwrap();
        let second = generator.generate(&ctx).unwrap();
        assert!(!second.newly_created);
        assert_eq!(second.challenge.id, first.challenge.id);
        assert_eq!(bus.events().len(), events_after_first);
        assert!(repo.challenge_for_month(&month).unwrap().is_some());
    }

    #[test]
    fn test_standard_pipeline_scales_from_baseline() {
        let (generator, repo, _bus) = setup();
        let month = MonthKey::new(2025, 4);
        // Pretend a previous month existed so this is not first-month.
        let mut rotation = repo.rotation().unwrap();
        rotation.record(RotationEntry {
            month: MonthKey::new(2025, 3),
            category: ChallengeCategory::Journal,
            template_id: Some("journal_momentum".into()),
        });
        repo.save_rotation(&rotation).unwrap();

        let ctx = generator
            .context_for_month(month, Some(rich_baseline(month)))
            .unwrap();
        let outcome = generator.generate(&ctx).unwrap();
        assert!(outcome.success);
        assert_eq!(
            outcome.challenge.generation_reason,
            GenerationReason::Standard
        );
        // Journal was used last month, so anti-repetition should steer away.
        assert_ne!(outcome.challenge.category, ChallengeCategory::Journal);

        for req in &outcome.challenge.requirements {
            assert!(req.target >= minimum_target(&req.tracking_key, outcome.challenge.star_level));
            if tracking::is_day_count(&req.tracking_key) {
                assert!(req.target <= month.days_in_month());
            }
        }
    }

    #[test]
    fn test_low_data_takes_first_month_path() {
        let (generator, repo, _bus) = setup();
        let month = MonthKey::new(2025, 4);
        let mut rotation = repo.rotation().unwrap();
        rotation.record(RotationEntry {
            month: MonthKey::new(2025, 3),
            category: ChallengeCategory::Habits,
            template_id: None,
        });
        repo.save_rotation(&rotation).unwrap();

        // 3 active days: below the 7-day threshold.
        let mut baseline = rich_baseline(month);
        baseline.total_active_days = 3;
        baseline.data_quality = DataQuality::Minimal;

        let ctx = generator.context_for_month(month, Some(baseline)).unwrap();
        let outcome = generator.generate(&ctx).unwrap();
        assert_eq!(
            outcome.challenge.generation_reason,
            GenerationReason::FirstMonth
        );
    }

    #[test]
    fn test_xp_target_capped_by_daily_cap() {
        let (generator, _repo, _bus) = setup();
        let month = MonthKey::new(2025, 4);
        let mut baseline = rich_baseline(month);
        // Absurd XP baseline to force the cap.
        baseline.monthly_xp_total = 10_000_000;

        let mut warnings = Vec::new();
        let template = builtin_templates()
            .into_iter()
            .find(|t| t.id == "habit_power_month")
            .unwrap();
        let requirements =
            generator.scale_requirements(&template, &baseline, 5, &month, &mut warnings);
        let xp_req = requirements
            .iter()
            .find(|r| r.tracking_key == tracking::MONTHLY_XP_TOTAL)
            .unwrap();
        assert_eq!(xp_req.target, 500 * month.days_in_month());
        assert!(!warnings.is_empty());
    }

    #[test]
    fn test_weighting_prefers_recent_rest() {
        let mut rotation = RotationHistory::default();
        let month = MonthKey::new(2025, 5);
        rotation.record(RotationEntry {
            month: MonthKey::new(2025, 4),
            category: ChallengeCategory::Habits,
            template_id: None,
        });
        assert!((recent_use_penalty(&rotation, &month, ChallengeCategory::Habits) - 0.8).abs() < 1e-9);
        assert_eq!(
            recent_use_penalty(&rotation, &month, ChallengeCategory::Goals),
            0.0
        );
    }

    #[test]
    fn test_preview_builds_without_writes() {
        let (generator, repo, _bus) = setup();
        let month = MonthKey::new(2025, 4);
        let ctx = generator.context_for_month(month, None).unwrap();
        let preview = generator.build_preview(&ctx).unwrap();
        assert_eq!(preview.month, month);
        assert!(repo.challenge_for_month(&month).unwrap().is_none());

        // Adoption persists it.
        let outcome = generator.adopt_preview(preview.clone()).unwrap();
        assert!(outcome.newly_created);
        assert_eq!(
            repo.challenge_for_month(&month).unwrap().unwrap().id,
            preview.id
        );
    }
}
