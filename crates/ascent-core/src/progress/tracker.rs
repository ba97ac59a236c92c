//! Activity ingestion and challenge progress.
//!
//! [`ProgressTracker::on_activity`] is the single ingestion point for all
//! gamification events. Each event maps to the tracking keys it is
//! semantically linked to (plus the raw XP total), applies clamped deltas,
//! recomputes completion, maintains the day snapshot and weekly breakdown,
//! detects milestones and finalizes completion.
//!
//! Updates for one challenge are strictly serialized behind a per-id lock:
//! an event acquires the challenge's lock, re-reads the progress record
//! fresh from the store, mutates and writes it back. Events for different
//! challenges proceed independently. This is what keeps five simultaneous
//! +1 events from losing increments.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};

use crate::activity::{ActivityLedger, DomainActivity, XpSource};
use crate::challenge::types::{
    tracking, DailyProgressSnapshot, MonthlyChallenge, MonthlyChallengeProgress,
    MILESTONE_PERCENTS,
};
use crate::clock::Clock;
use crate::error::Result;
use crate::events::{Event, EventBus};
use crate::progress::snapshot::{
    day_features, refresh_streaks, update_snapshot, update_weekly, DayFeatures,
};
use crate::stars::StarRatingEngine;
use crate::store::ChallengeRepository;

/// Bonus tuning.
#[derive(Debug, Clone)]
pub struct ProgressConfig {
    /// Base milestone bonuses for 25% / 50% / 75%.
    pub milestone_bonuses: [u32; 3],
    /// Completion bonus as a percentage of the base reward.
    pub completion_bonus_pct: u32,
    /// Extra XP per consecutive completed month beyond the first.
    pub streak_bonus_per_month: u32,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            milestone_bonuses: [50, 100, 150],
            completion_bonus_pct: 20,
            streak_bonus_per_month: 50,
        }
    }
}

/// Active-day ratio above which milestone bonuses get the consistency boost.
const CONSISTENCY_BOOST_RATIO: f64 = 0.8;
/// Active-day count above which milestone bonuses get the activity boost.
const ACTIVITY_BOOST_DAYS: usize = 20;

/// The tracking keys an event source increments (besides the XP total).
fn source_tracking_key(source: XpSource) -> Option<&'static str> {
    match source {
        XpSource::HabitCompletion => Some(tracking::SCHEDULED_HABIT_COMPLETIONS),
        XpSource::JournalEntry => Some(tracking::JOURNAL_ENTRIES),
        XpSource::GoalProgress => Some(tracking::GOAL_PROGRESS_UPDATES),
        XpSource::GoalCompletion => Some(tracking::GOAL_COMPLETIONS),
        XpSource::HabitBonus
        | XpSource::JournalBonus
        | XpSource::ChallengeBonus
        | XpSource::Other => None,
    }
}

/// Converts streamed activity events into challenge progress.
pub struct ProgressTracker {
    repo: ChallengeRepository,
    stars: StarRatingEngine,
    ledger: Arc<dyn ActivityLedger>,
    domains: Arc<dyn DomainActivity>,
    bus: Arc<dyn EventBus>,
    clock: Arc<dyn Clock>,
    config: ProgressConfig,
    /// One lock per challenge id; guards the read-modify-write cycle.
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl ProgressTracker {
    pub fn new(
        repo: ChallengeRepository,
        stars: StarRatingEngine,
        ledger: Arc<dyn ActivityLedger>,
        domains: Arc<dyn DomainActivity>,
        bus: Arc<dyn EventBus>,
        clock: Arc<dyn Clock>,
        config: ProgressConfig,
    ) -> Self {
        Self {
            repo,
            stars,
            ledger,
            domains,
            bus,
            clock,
            config,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Ingest one gamification event. The sign of `amount` distinguishes
    /// increments from decrements. Never propagates errors to the host.
    pub fn on_activity(&self, source: XpSource, amount: i64, source_id: Option<&str>) {
        if let Err(e) = self.try_on_activity(source, amount, source_id) {
            tracing::warn!(
                source = source.as_str(),
                amount,
                error = %e,
                "progress update failed"
            );
        }
    }

    fn try_on_activity(
        &self,
        source: XpSource,
        amount: i64,
        _source_id: Option<&str>,
    ) -> Result<()> {
        let challenges = self.repo.active_challenges()?;
        if challenges.is_empty() {
            return Ok(()); // no active challenge: event is a no-op here
        }
        for challenge in challenges {
            let lock = self.lock_for(&challenge.id);
            let _guard = lock
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            // Progress is re-read fresh under the lock; the repository
            // never serves a cached copy.
            self.apply_event(&challenge, source, amount)?;
        }
        Ok(())
    }

    fn lock_for(&self, challenge_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self
            .locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        locks
            .entry(challenge_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn apply_event(
        &self,
        challenge: &MonthlyChallenge,
        source: XpSource,
        amount: i64,
    ) -> Result<()> {
        let now = self.clock.now();
        let today = self.clock.today();

        let mut progress = match self.repo.progress(&challenge.id)? {
            Some(p) => p,
            None => MonthlyChallengeProgress::new(challenge, now),
        };
        if progress.is_completed {
            return Ok(()); // finalized once, never reopened
        }

        let requirement_keys: Vec<&str> = challenge
            .requirements
            .iter()
            .map(|r| r.tracking_key.as_str())
            .collect();

        // 1. Signed increments for semantically linked keys.
        let mut day_deltas: BTreeMap<String, i64> = BTreeMap::new();
        if let Some(key) = source_tracking_key(source) {
            if requirement_keys.contains(&key) && !tracking::is_derived(key) && amount != 0 {
                let applied = progress.apply_delta(key, amount.signum());
                if applied != 0 {
                    day_deltas.insert(key.to_string(), applied);
                }
            }
        }
        if requirement_keys.contains(&tracking::MONTHLY_XP_TOTAL) && amount != 0 {
            let applied = progress.apply_delta(tracking::MONTHLY_XP_TOTAL, amount);
            if applied != 0 {
                day_deltas.insert(tracking::MONTHLY_XP_TOTAL.to_string(), applied);
            }
        }

        // 2. Active-day set (idempotent insert) and derived day counts from
        //    the daily aggregate analysis.
        progress.active_days.insert(today);
        let features = day_features(&self.domains, today)?;
        let mut snapshot = match self.repo.snapshot(&challenge.id, today)? {
            Some(s) => s,
            None => DailyProgressSnapshot::new(&challenge.id, today, now),
        };
        self.refresh_derived(&mut progress, &snapshot, features, &requirement_keys);

        // 3. Completion percentage.
        progress.recompute_completion(&challenge.requirements);

        // 4. Days remaining and linear pace projection.
        progress.days_remaining = (challenge.end_date - today).num_days().max(0) as u32;
        let days_active = progress.active_days.len().max(1) as f64;
        let projected = (progress.completion_percentage / days_active)
            * (days_active + progress.days_remaining as f64);
        progress.projected_completion = projected.min(100.0);
        refresh_streaks(&mut progress, today);

        // 5. Day snapshot and weekly breakdown.
        update_snapshot(&mut snapshot, &day_deltas, &progress, features, amount, now);
        update_weekly(&mut progress, today, &day_deltas);

        // 6. Milestones.
        self.check_milestones(challenge, &mut progress, now)?;

        // 7. Completion.
        if progress.completion_percentage >= 100.0 && !progress.is_completed {
            self.finalize(challenge, &mut progress, now)?;
        }

        progress.updated_at = now;
        self.repo.save_progress(&progress)?;
        self.repo.save_snapshot(&snapshot)?;

        for (key, delta) in &day_deltas {
            self.bus.publish(Event::ProgressUpdated {
                challenge_id: challenge.id.clone(),
                tracking_key: key.clone(),
                delta: *delta,
                completion_percentage: progress.completion_percentage,
                at: now,
            });
        }
        Ok(())
    }

    /// Recompute the derived day-count keys from aggregates: active days
    /// from the set, triple-feature/perfect days from the flag history.
    fn refresh_derived(
        &self,
        progress: &mut MonthlyChallengeProgress,
        today_snapshot: &DailyProgressSnapshot,
        features: DayFeatures,
        requirement_keys: &[&str],
    ) {
        if requirement_keys.contains(&tracking::ACTIVE_DAYS) {
            progress.set_value(tracking::ACTIVE_DAYS, progress.active_days.len() as i64);
        }
        // Day-flag counts move by the flag's transition for today.
        if requirement_keys.contains(&tracking::TRIPLE_FEATURE_DAYS) {
            let delta = i64::from(features.triple_feature) - i64::from(today_snapshot.triple_feature_day);
            progress.apply_delta(tracking::TRIPLE_FEATURE_DAYS, delta);
        }
        if requirement_keys.contains(&tracking::PERFECT_DAYS) {
            let delta = i64::from(features.perfect) - i64::from(today_snapshot.perfect_day);
            progress.apply_delta(tracking::PERFECT_DAYS, delta);
        }
    }

    /// Mark newly crossed milestones, award their one-time bonuses and
    /// emit celebration events. Reached milestones never re-trigger.
    fn check_milestones(
        &self,
        challenge: &MonthlyChallenge,
        progress: &mut MonthlyChallengeProgress,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let today = now.date_naive();
        let elapsed = (today - challenge.start_date).num_days().max(0) as f64 + 1.0;
        let consistency = progress.active_days.len() as f64 / elapsed;

        for (idx, threshold) in MILESTONE_PERCENTS.iter().enumerate() {
            if progress.milestones_reached[idx] || progress.completion_percentage < *threshold {
                continue;
            }
            progress.milestones_reached[idx] = true;

            let mut multiplier = 1.0;
            if consistency >= CONSISTENCY_BOOST_RATIO {
                multiplier += 0.20;
            }
            if progress.active_days.len() >= ACTIVITY_BOOST_DAYS {
                multiplier += 0.10;
            }
            let bonus = (self.config.milestone_bonuses[idx] as f64 * multiplier).round() as u32;

            self.ledger.add_xp(
                bonus as i64,
                XpSource::ChallengeBonus,
                Some(&challenge.id),
                &format!("{}% milestone bonus", *threshold as u8),
            )?;
            self.bus.publish(Event::MilestoneReached {
                challenge_id: challenge.id.clone(),
                percent: *threshold as u8,
                bonus_xp: bonus,
                at: now,
            });
        }
        Ok(())
    }

    /// Finalize a completed challenge: rewards, star feedback, streak
    /// update, archive, event.
    fn finalize(
        &self,
        challenge: &MonthlyChallenge,
        progress: &mut MonthlyChallengeProgress,
        now: DateTime<Utc>,
    ) -> Result<()> {
        progress.is_completed = true;
        progress.completed_at = Some(now);

        let mut streak = self.repo.streak()?;
        streak.record_completion(challenge.month);
        self.repo.save_streak(&streak)?;

        let base = challenge.xp_reward;
        let completion_bonus = base * self.config.completion_bonus_pct / 100;
        let streak_bonus =
            streak.consecutive_months.saturating_sub(1) * self.config.streak_bonus_per_month;
        let total = base + completion_bonus + streak_bonus;

        self.ledger.add_xp(
            total as i64,
            XpSource::ChallengeBonus,
            Some(&challenge.id),
            "Monthly challenge completed",
        )?;
        self.stars.process_completion(
            challenge.category,
            progress.completion_percentage,
            true,
        )?;

        let mut archived = challenge.clone();
        archived.is_active = false;
        self.repo.save_challenge(&archived)?;

        self.bus.publish(Event::ChallengeCompleted {
            challenge_id: challenge.id.clone(),
            month: challenge.month,
            xp_awarded: total,
            streak_months: streak.consecutive_months,
            at: now,
        });
        tracing::info!(
            challenge_id = %challenge.id,
            month = %challenge.month,
            xp = total,
            "challenge completed"
        );
        Ok(())
    }
}
