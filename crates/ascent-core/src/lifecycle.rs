//! Challenge lifecycle management.
//!
//! A wall-clock-driven state machine. It owns no threads: the host calls
//! [`LifecycleManager::startup_check`] on launch/resume and
//! [`LifecycleManager::tick`] periodically (hourly by default; the manager
//! guards its own cadence). A tick performs, in order: due-retry
//! processing, month-transition re-check, preview generation (from day 25),
//! archival of completed/expired challenges, expired-preview cleanup, and a
//! health-check timestamp update.
//!
//! Failures matching a retriable pattern (network / timeout / connection /
//! temporary / storage) are retried with bounded attempts and a fixed
//! delay; recovery re-invokes the operation that failed. Exhausting the
//! budget lands in the `Error` state and raises a lifecycle event. No entry
//! point ever panics or propagates an error to the host.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Datelike, Utc};
use serde::{Deserialize, Serialize};

use crate::baseline::{BaselineAnalyzer, BaselineOptions};
use crate::challenge::generator::ChallengeGenerator;
use crate::challenge::types::ChallengePreviewData;
use crate::clock::Clock;
use crate::error::CoreError;
use crate::events::{Event, EventBus};
use crate::month::MonthKey;
use crate::stars::StarRatingEngine;
use crate::store::ChallengeRepository;

/// Scheduler states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    /// The month has no challenge and one should be generated.
    GenerationNeeded,
    /// Generation in flight.
    Generating,
    /// The month's challenge exists and is live.
    Active,
    /// Mid-month with no challenge; waiting for the 1st.
    AwaitingMonthStart,
    /// Retry budget exhausted or non-retriable failure.
    Error,
    /// A retriable failure is waiting for its next attempt.
    Recovery,
}

/// One recorded state change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleTransition {
    pub from: LifecycleState,
    pub to: LifecycleState,
    pub reason: String,
    pub at: DateTime<Utc>,
}

/// One recorded failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleErrorEntry {
    /// Operation context tag, e.g. "generate_challenge".
    pub operation: String,
    pub message: String,
    pub retry_count: u32,
    pub retriable: bool,
    pub at: DateTime<Utc>,
}

/// Aggregate counters for diagnostics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LifecycleMetrics {
    pub generation_attempts: u32,
    pub generations_succeeded: u32,
    pub previews_generated: u32,
    pub challenges_archived: u32,
    #[serde(default)]
    pub last_health_check: Option<DateTime<Utc>>,
}

/// The operation a pending retry will re-invoke.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryOperation {
    GenerateChallenge,
    GeneratePreview,
    MonthTransition,
}

impl RetryOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            RetryOperation::GenerateChallenge => "generate_challenge",
            RetryOperation::GeneratePreview => "generate_preview",
            RetryOperation::MonthTransition => "month_transition",
        }
    }
}

/// A scheduled re-attempt of a failed operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingRetry {
    pub operation: RetryOperation,
    pub attempts: u32,
    pub next_attempt_at: DateTime<Utc>,
}

/// Transitions kept in the bounded history.
const MAX_TRANSITIONS: usize = 20;
/// Errors kept in the bounded log.
const MAX_ERRORS: usize = 10;

/// One lifecycle record per month. Created lazily on first query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChallengeLifecycleStatus {
    pub month: MonthKey,
    pub state: LifecycleState,
    #[serde(default)]
    pub transitions: Vec<LifecycleTransition>,
    #[serde(default)]
    pub errors: Vec<LifecycleErrorEntry>,
    #[serde(default)]
    pub metrics: LifecycleMetrics,
    #[serde(default)]
    pub pending_retry: Option<PendingRetry>,
    pub updated_at: DateTime<Utc>,
}

impl ChallengeLifecycleStatus {
    pub fn new(month: MonthKey, now: DateTime<Utc>) -> Self {
        Self {
            month,
            state: LifecycleState::GenerationNeeded,
            transitions: Vec::new(),
            errors: Vec::new(),
            metrics: LifecycleMetrics::default(),
            pending_retry: None,
            updated_at: now,
        }
    }

    /// Transition to a new state, recording it in the bounded history.
    pub fn set_state(&mut self, to: LifecycleState, reason: &str, now: DateTime<Utc>) {
        if self.state == to {
            return;
        }
        self.transitions.push(LifecycleTransition {
            from: self.state,
            to,
            reason: reason.to_string(),
            at: now,
        });
        if self.transitions.len() > MAX_TRANSITIONS {
            let excess = self.transitions.len() - MAX_TRANSITIONS;
            self.transitions.drain(0..excess);
        }
        self.state = to;
        self.updated_at = now;
    }

    /// Record a failure in the bounded error log. A repeat of the most
    /// recent (operation, message) pair updates its retry count instead of
    /// consuming another slot.
    pub fn record_error(
        &mut self,
        operation: &str,
        message: &str,
        retry_count: u32,
        retriable: bool,
        now: DateTime<Utc>,
    ) {
        if let Some(last) = self.errors.last_mut() {
            if last.operation == operation && last.message == message {
                last.retry_count = retry_count;
                last.at = now;
                self.updated_at = now;
                return;
            }
        }
        self.errors.push(LifecycleErrorEntry {
            operation: operation.to_string(),
            message: message.to_string(),
            retry_count,
            retriable,
            at: now,
        });
        if self.errors.len() > MAX_ERRORS {
            let excess = self.errors.len() - MAX_ERRORS;
            self.errors.drain(0..excess);
        }
        self.updated_at = now;
    }
}

/// Lifecycle tuning.
#[derive(Debug, Clone)]
pub struct LifecyclePolicy {
    pub max_retry_attempts: u32,
    pub retry_delay_secs: i64,
    /// Minimum minutes between maintenance runs.
    pub tick_interval_mins: i64,
    /// Day of month from which next-month previews are generated.
    pub preview_day: u32,
    pub preview_ttl_days: i64,
}

impl Default for LifecyclePolicy {
    fn default() -> Self {
        Self {
            max_retry_attempts: 3,
            retry_delay_secs: 300,
            tick_interval_mins: 60,
            preview_day: 25,
            preview_ttl_days: 7,
        }
    }
}

/// Whether a failure message matches the retriable pattern.
fn is_retriable(message: &str) -> bool {
    let lowered = message.to_lowercase();
    ["network", "timeout", "connection", "temporary", "storage"]
        .iter()
        .any(|pattern| lowered.contains(pattern))
}

/// A failed operation tagged with its retry context.
struct OpFailure {
    operation: RetryOperation,
    error: CoreError,
}

impl OpFailure {
    fn new(operation: RetryOperation, error: impl Into<CoreError>) -> Self {
        Self {
            operation,
            error: error.into(),
        }
    }
}

/// The scheduler. Owns no threads; driven by the host.
pub struct LifecycleManager {
    repo: ChallengeRepository,
    generator: ChallengeGenerator,
    analyzer: BaselineAnalyzer,
    stars: StarRatingEngine,
    bus: Arc<dyn EventBus>,
    clock: Arc<dyn Clock>,
    policy: LifecyclePolicy,
    last_tick: Mutex<Option<DateTime<Utc>>>,
}

impl LifecycleManager {
    pub fn new(
        repo: ChallengeRepository,
        generator: ChallengeGenerator,
        analyzer: BaselineAnalyzer,
        stars: StarRatingEngine,
        bus: Arc<dyn EventBus>,
        clock: Arc<dyn Clock>,
        policy: LifecyclePolicy,
    ) -> Self {
        Self {
            repo,
            generator,
            analyzer,
            stars,
            bus,
            clock,
            policy,
            last_tick: Mutex::new(None),
        }
    }

    /// The current month's lifecycle status, created lazily. Never fails:
    /// a store failure degrades to a fresh default record.
    pub fn get_lifecycle_status(&self) -> ChallengeLifecycleStatus {
        let month = MonthKey::from_date(self.clock.today());
        self.load_status(month)
    }

    /// Startup (and resume-from-background) check: reconcile the stored
    /// challenge with the real current month. Never propagates errors.
    pub fn startup_check(&self) -> ChallengeLifecycleStatus {
        let now = self.clock.now();
        let month = MonthKey::from_date(now.date_naive());
        let mut status = self.load_status(month);

        if let Err(failure) = self.month_transition(&mut status) {
            self.handle_failure(&mut status, failure);
        }
        // Waiting for the 1st still allows preview work (no-op before the
        // preview window opens).
        if status.state == LifecycleState::AwaitingMonthStart {
            if let Err(failure) = self.ensure_preview(&mut status) {
                self.handle_failure(&mut status, failure);
            }
        }
        self.save_status(&status);
        status
    }

    /// Periodic maintenance. Runs at most once per tick interval; pass
    /// through [`force_tick`](Self::force_tick) to bypass the guard.
    pub fn tick(&self) -> ChallengeLifecycleStatus {
        let now = self.clock.now();
        {
            let mut last = match self.last_tick.lock() {
                Ok(guard) => guard,
                Err(_) => return self.get_lifecycle_status(),
            };
            if let Some(at) = *last {
                if now - at < Duration::minutes(self.policy.tick_interval_mins) {
                    return self.get_lifecycle_status();
                }
            }
            *last = Some(now);
        }
        self.run_maintenance()
    }

    /// Maintenance without the cadence guard.
    pub fn force_tick(&self) -> ChallengeLifecycleStatus {
        if let Ok(mut last) = self.last_tick.lock() {
            *last = Some(self.clock.now());
        }
        self.run_maintenance()
    }

    fn run_maintenance(&self) -> ChallengeLifecycleStatus {
        let now = self.clock.now();
        let month = MonthKey::from_date(now.date_naive());
        let mut status = self.load_status(month);

        // 1. Due retries first: recovery re-invokes the failed operation.
        self.process_pending_retry(&mut status);

        // The Error state is terminal for this month's scheduler work;
        // only a startup check or the next month leaves it.
        let halted =
            status.state == LifecycleState::Error || status.pending_retry.is_some();

        // 2. Month-transition re-check.
        if !halted {
            if let Err(failure) = self.month_transition(&mut status) {
                self.handle_failure(&mut status, failure);
            }
        }

        // 3. Preview window.
        if status.state != LifecycleState::Error && status.pending_retry.is_none() {
            if let Err(failure) = self.ensure_preview(&mut status) {
                self.handle_failure(&mut status, failure);
            }
        }

        // 4. Archival of completed and expired challenges.
        if let Err(failure) = self.archive_check(&mut status) {
            self.handle_failure(&mut status, failure);
        }

        // 5. Expired-preview cleanup.
        if let Err(failure) = self.cleanup_expired_previews() {
            self.handle_failure(&mut status, failure);
        }

        // 6. Health stamp.
        status.metrics.last_health_check = Some(self.clock.now());
        status.updated_at = self.clock.now();
        self.save_status(&status);
        status
    }

    // ── Operations ───────────────────────────────────────────────────

    /// Reconcile the stored challenge with the real current month.
    fn month_transition(&self, status: &mut ChallengeLifecycleStatus) -> Result<(), OpFailure> {
        let now = self.clock.now();
        let today = now.date_naive();
        let month = status.month;

        let existing = self
            .repo
            .challenge_for_month(&month)
            .map_err(|e| OpFailure::new(RetryOperation::MonthTransition, e))?;
        if existing.is_some() {
            status.set_state(LifecycleState::Active, "challenge present for month", now);
            return Ok(());
        }

        if today.day() == 1 {
            status.set_state(LifecycleState::GenerationNeeded, "month started", now);
            self.generate_for_month(status, month)
                .map_err(|e| OpFailure::new(RetryOperation::GenerateChallenge, e))?;
            status.set_state(LifecycleState::Active, "challenge generated", now);
        } else {
            status.set_state(
                LifecycleState::AwaitingMonthStart,
                "mid-month without challenge, waiting for the 1st",
                now,
            );
        }
        Ok(())
    }

    /// Generate the month's challenge, preferring a fresh preview.
    fn generate_for_month(
        &self,
        status: &mut ChallengeLifecycleStatus,
        month: MonthKey,
    ) -> Result<(), CoreError> {
        let now = self.clock.now();
        status.set_state(LifecycleState::Generating, "generation started", now);
        status.metrics.generation_attempts += 1;

        let fresh_preview = self
            .repo
            .preview(&month)?
            .filter(|p| !p.is_expired(now));

        let outcome = match fresh_preview {
            Some(preview) => self.generator.adopt_preview(preview.challenge)?,
            None => {
                let baseline = self
                    .analyzer
                    .calculate_monthly_baseline(month, &BaselineOptions::default());
                self.repo.save_baseline(&baseline)?;
                let ctx = self.generator.context_for_month(month, Some(baseline))?;
                self.generator.generate(&ctx)?
            }
        };

        if outcome.newly_created {
            status.metrics.generations_succeeded += 1;
        }
        // The preview, if any, has served its purpose.
        self.repo.remove_preview(&month)?;
        Ok(())
    }

    /// Generate a next-month preview once the preview window opens.
    fn ensure_preview(&self, status: &mut ChallengeLifecycleStatus) -> Result<(), OpFailure> {
        let now = self.clock.now();
        let today = now.date_naive();
        if today.day() < self.policy.preview_day {
            return Ok(());
        }

        let next = status.month.next();
        let as_failure = |e: CoreError| OpFailure::new(RetryOperation::GeneratePreview, e);

        let already_generated = self
            .repo
            .challenge_for_month(&next)
            .map_err(|e| as_failure(e.into()))?
            .is_some();
        if already_generated {
            return Ok(());
        }
        if let Some(preview) = self.repo.preview(&next).map_err(|e| as_failure(e.into()))? {
            if !preview.is_expired(now) {
                return Ok(()); // fresh preview already cached
            }
        }

        let baseline = self
            .analyzer
            .calculate_monthly_baseline(next, &BaselineOptions::default());
        let ctx = self
            .generator
            .context_for_month(next, Some(baseline))
            .map_err(as_failure)?;
        let challenge = self.generator.build_preview(&ctx).map_err(as_failure)?;
        let category = challenge.category;
        let preview = ChallengePreviewData {
            month: next,
            challenge,
            generated_at: now,
            expires_at: now + Duration::days(self.policy.preview_ttl_days),
        };
        self.repo
            .save_preview(&preview)
            .map_err(|e| as_failure(e.into()))?;

        status.metrics.previews_generated += 1;
        self.bus.publish(Event::PreviewReady {
            month: next,
            category,
            at: now,
        });
        Ok(())
    }

    /// Deactivate completed challenges and close out expired ones.
    fn archive_check(&self, status: &mut ChallengeLifecycleStatus) -> Result<(), OpFailure> {
        let today = self.clock.today();
        let as_failure = |e: CoreError| OpFailure::new(RetryOperation::MonthTransition, e);

        let active = self
            .repo
            .active_challenges()
            .map_err(|e| as_failure(e.into()))?;
        for mut challenge in active {
            let progress = self
                .repo
                .progress(&challenge.id)
                .map_err(|e| as_failure(e.into()))?;
            let completed = progress.as_ref().map(|p| p.is_completed).unwrap_or(false);

            if completed {
                challenge.is_active = false;
                self.repo
                    .save_challenge(&challenge)
                    .map_err(|e| as_failure(e.into()))?;
                status.metrics.challenges_archived += 1;
            } else if challenge.end_date < today {
                // The month ended without completion: a failure event for
                // the star progression engine, then archive.
                let pct = progress
                    .map(|p| p.completion_percentage)
                    .unwrap_or(0.0);
                self.stars
                    .process_completion(challenge.category, pct, false)
                    .map_err(as_failure)?;
                challenge.is_active = false;
                self.repo
                    .save_challenge(&challenge)
                    .map_err(|e| as_failure(e.into()))?;
                status.metrics.challenges_archived += 1;
            }
        }
        Ok(())
    }

    fn cleanup_expired_previews(&self) -> Result<(), OpFailure> {
        let now = self.clock.now();
        let as_failure = |e: CoreError| OpFailure::new(RetryOperation::GeneratePreview, e);
        for preview in self.repo.all_previews().map_err(|e| as_failure(e.into()))? {
            if preview.is_expired(now) {
                self.repo
                    .remove_preview(&preview.month)
                    .map_err(|e| as_failure(e.into()))?;
            }
        }
        Ok(())
    }

    // ── Failure handling ─────────────────────────────────────────────

    fn process_pending_retry(&self, status: &mut ChallengeLifecycleStatus) {
        let now = self.clock.now();
        let Some(pending) = status.pending_retry.clone() else {
            return;
        };
        if now < pending.next_attempt_at {
            return;
        }

        status.pending_retry = None;
        let result = match pending.operation {
            RetryOperation::GenerateChallenge | RetryOperation::MonthTransition => {
                self.month_transition(status)
            }
            RetryOperation::GeneratePreview => self.ensure_preview(status),
        };
        match result {
            Ok(()) => {
                tracing::info!(
                    operation = pending.operation.as_str(),
                    attempts = pending.attempts,
                    "lifecycle recovery succeeded"
                );
                // A preview retry leaves the month state untouched; settle
                // it back to Active / AwaitingMonthStart.
                if pending.operation == RetryOperation::GeneratePreview {
                    if let Err(failure) = self.month_transition(status) {
                        self.handle_failure(status, failure);
                    }
                }
            }
            Err(mut failure) => {
                // Carry the attempt count forward.
                failure.operation = pending.operation;
                self.handle_failure_with_attempts(status, failure, pending.attempts);
            }
        }
    }

    fn handle_failure(&self, status: &mut ChallengeLifecycleStatus, failure: OpFailure) {
        self.handle_failure_with_attempts(status, failure, 0);
    }

    fn handle_failure_with_attempts(
        &self,
        status: &mut ChallengeLifecycleStatus,
        failure: OpFailure,
        prior_attempts: u32,
    ) {
        let now = self.clock.now();
        let message = failure.error.to_string();
        let retriable = is_retriable(&message);
        let attempts = prior_attempts + 1;

        tracing::warn!(
            operation = failure.operation.as_str(),
            error = %message,
            attempts,
            retriable,
            "lifecycle operation failed"
        );
        status.record_error(failure.operation.as_str(), &message, attempts, retriable, now);

        if retriable && attempts <= self.policy.max_retry_attempts {
            status.pending_retry = Some(PendingRetry {
                operation: failure.operation,
                attempts,
                next_attempt_at: now + Duration::seconds(self.policy.retry_delay_secs),
            });
            status.set_state(LifecycleState::Recovery, "retriable failure, retry scheduled", now);
        } else {
            status.pending_retry = None;
            status.set_state(
                LifecycleState::Error,
                "retries exhausted or non-retriable failure",
                now,
            );
            self.bus.publish(Event::LifecycleFailed {
                operation: failure.operation.as_str().to_string(),
                message,
                at: now,
            });
        }
    }

    // ── Status persistence ───────────────────────────────────────────

    fn load_status(&self, month: MonthKey) -> ChallengeLifecycleStatus {
        match self.repo.lifecycle_status(&month) {
            Ok(Some(status)) => status,
            Ok(None) => ChallengeLifecycleStatus::new(month, self.clock.now()),
            Err(e) => {
                tracing::error!(month = %month, error = %e, "lifecycle status unreadable");
                ChallengeLifecycleStatus::new(month, self.clock.now())
            }
        }
    }

    fn save_status(&self, status: &ChallengeLifecycleStatus) {
        if let Err(e) = self.repo.save_lifecycle_status(status) {
            tracing::error!(month = %status.month, error = %e, "failed to persist lifecycle status");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::LedgerStore;
    use crate::challenge::generator::{ChallengeGenerator, GeneratorConfig};
    use crate::clock::FixedClock;
    use crate::error::StoreError;
    use crate::events::MemoryBus;
    use crate::store::{MemoryStore, RecordStore};
    use chrono::NaiveDate;

    /// Store that fails the first N writes of challenge records with a
    /// retriable-looking message.
    struct FlakyStore {
        inner: MemoryStore,
        failures_left: Mutex<u32>,
    }

    impl FlakyStore {
        fn new(failures: u32) -> Self {
            Self {
                inner: MemoryStore::new(),
                failures_left: Mutex::new(failures),
            }
        }
    }

    impl RecordStore for FlakyStore {
        fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
            self.inner.get(key)
        }

        fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
            if key.starts_with("challenge:") {
                let mut left = self.failures_left.lock().unwrap();
                if *left > 0 {
                    *left -= 1;
                    return Err(StoreError::QueryFailed("Network timeout".into()));
                }
            }
            self.inner.set(key, value)
        }

        fn remove(&self, key: &str) -> Result<(), StoreError> {
            self.inner.remove(key)
        }

        fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
            self.inner.keys_with_prefix(prefix)
        }
    }

    fn manager_with(
        store: Arc<dyn RecordStore>,
        date: NaiveDate,
    ) -> (LifecycleManager, Arc<FixedClock>, Arc<MemoryBus>, ChallengeRepository) {
        let clock = Arc::new(FixedClock::at_date(date));
        let bus = Arc::new(MemoryBus::new());
        let repo = ChallengeRepository::new(store.clone(), "local");
        let ledger = Arc::new(LedgerStore::new(store, clock.clone()));
        let analyzer = BaselineAnalyzer::new(ledger.clone(), ledger, clock.clone());
        let generator = ChallengeGenerator::new(
            repo.clone(),
            bus.clone(),
            clock.clone(),
            GeneratorConfig {
                variance_seed: Some(7),
                ..Default::default()
            },
        );
        let stars = StarRatingEngine::new(repo.clone(), bus.clone(), clock.clone());
        let manager = LifecycleManager::new(
            repo.clone(),
            generator,
            analyzer,
            stars,
            bus.clone(),
            clock.clone(),
            LifecyclePolicy::default(),
        );
        (manager, clock, bus, repo)
    }

    #[test]
    fn test_is_retriable_patterns() {
        assert!(is_retriable("Network timeout"));
        assert!(is_retriable("connection refused"));
        assert!(is_retriable("Temporary failure in storage layer"));
        assert!(!is_retriable("template catalog empty"));
    }

    #[test]
    fn test_startup_on_the_first_generates() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
        let (manager, _clock, _bus, repo) = manager_with(Arc::new(MemoryStore::new()), date);

        let status = manager.startup_check();
        assert_eq!(status.state, LifecycleState::Active);
        assert!(repo
            .challenge_for_month(&MonthKey::new(2025, 3))
            .unwrap()
            .is_some());
        assert_eq!(status.metrics.generations_succeeded, 1);
    }

    #[test]
    fn test_startup_mid_month_awaits() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 14).unwrap();
        let (manager, _clock, _bus, repo) = manager_with(Arc::new(MemoryStore::new()), date);

        let status = manager.startup_check();
        assert_eq!(status.state, LifecycleState::AwaitingMonthStart);
        assert!(repo
            .challenge_for_month(&MonthKey::new(2025, 3))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_preview_window_opens_on_day_25() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 24).unwrap();
        let (manager, clock, bus, repo) = manager_with(Arc::new(MemoryStore::new()), date);

        manager.force_tick();
        assert!(repo.preview(&MonthKey::new(2025, 4)).unwrap().is_none());

        clock.set(chrono::TimeZone::with_ymd_and_hms(&Utc, 2025, 3, 25, 9, 0, 0).unwrap());
        let status = manager.force_tick();
        let preview = repo.preview(&MonthKey::new(2025, 4)).unwrap().unwrap();
        assert_eq!(preview.month, MonthKey::new(2025, 4));
        assert_eq!(status.metrics.previews_generated, 1);
        assert!(bus
            .events()
            .iter()
            .any(|e| matches!(e, Event::PreviewReady { .. })));

        // A fresh preview is not regenerated.
        let status = manager.force_tick();
        assert_eq!(status.metrics.previews_generated, 1);
    }

    #[test]
    fn test_month_start_adopts_fresh_preview() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 26).unwrap();
        let (manager, clock, _bus, repo) = manager_with(Arc::new(MemoryStore::new()), date);

        manager.force_tick();
        let preview = repo.preview(&MonthKey::new(2025, 4)).unwrap().unwrap();
        let preview_id = preview.challenge.id.clone();

        clock.set(chrono::TimeZone::with_ymd_and_hms(&Utc, 2025, 4, 1, 0, 30, 0).unwrap());
        let status = manager.startup_check();
        assert_eq!(status.state, LifecycleState::Active);
        let challenge = repo
            .challenge_for_month(&MonthKey::new(2025, 4))
            .unwrap()
            .unwrap();
        assert_eq!(challenge.id, preview_id);
        // The consumed preview is gone.
        assert!(repo.preview(&MonthKey::new(2025, 4)).unwrap().is_none());
    }

    #[test]
    fn test_retriable_failure_recovers() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
        let store = Arc::new(FlakyStore::new(1));
        let (manager, clock, _bus, repo) = manager_with(store, date);

        // First attempt hits the injected "Network timeout".
        let status = manager.startup_check();
        assert_eq!(status.state, LifecycleState::Recovery);
        assert!(!status.errors.is_empty());
        assert!(status.pending_retry.is_some());

        // Past the retry delay, the tick re-invokes the operation.
        clock.advance(Duration::hours(2));
        let status = manager.tick();
        assert_eq!(status.state, LifecycleState::Active);
        assert!(repo
            .challenge_for_month(&MonthKey::new(2025, 3))
            .unwrap()
            .is_some());
        // The error log still shows the first failure.
        assert!(!status.errors.is_empty());
    }

    #[test]
    fn test_retry_budget_exhaustion_lands_in_error() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
        let store = Arc::new(FlakyStore::new(99));
        let (manager, clock, bus, _repo) = manager_with(store, date);

        let mut status = manager.startup_check();
        for _ in 0..4 {
            clock.advance(Duration::hours(2));
            status = manager.tick();
        }
        assert_eq!(status.state, LifecycleState::Error);
        assert!(status.pending_retry.is_none());
        assert!(bus
            .events()
            .iter()
            .any(|e| matches!(e, Event::LifecycleFailed { .. })));
    }

    #[test]
    fn test_expired_challenge_archived_as_failure() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
        let (manager, clock, _bus, repo) = manager_with(Arc::new(MemoryStore::new()), date);
        manager.startup_check();

        // Cross into April without completing March.
        clock.set(chrono::TimeZone::with_ymd_and_hms(&Utc, 2025, 4, 1, 8, 0, 0).unwrap());
        manager.force_tick();

        let march = repo
            .challenge_for_month(&MonthKey::new(2025, 3))
            .unwrap()
            .unwrap();
        assert!(!march.is_active);
        // The failure was fed to the star engine.
        let ratings = repo.ratings().unwrap();
        assert_eq!(ratings.history.len(), 1);
        assert_eq!(ratings.rating(march.category).consecutive_failures, 1);
    }

    #[test]
    fn test_tick_guard_suppresses_back_to_back_runs() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 25).unwrap();
        let (manager, clock, _bus, repo) = manager_with(Arc::new(MemoryStore::new()), date);

        manager.tick();
        assert!(repo.preview(&MonthKey::new(2025, 4)).unwrap().is_some());
        repo.remove_preview(&MonthKey::new(2025, 4)).unwrap();

        // Within the hour: guarded, no work done.
        clock.advance(Duration::minutes(10));
        manager.tick();
        assert!(repo.preview(&MonthKey::new(2025, 4)).unwrap().is_none());

        // After the interval the work happens again.
        clock.advance(Duration::hours(1));
        manager.tick();
        assert!(repo.preview(&MonthKey::new(2025, 4)).unwrap().is_some());
    }

    #[test]
    fn test_bounded_histories() {
        let now = Utc::now();
        let mut status = ChallengeLifecycleStatus::new(MonthKey::new(2025, 3), now);
        for i in 0..50 {
            let (from, to) = if i % 2 == 0 {
                (LifecycleState::Active, LifecycleState::Recovery)
            } else {
                (LifecycleState::Recovery, LifecycleState::Active)
            };
            status.state = from;
            status.set_state(to, "flap", now);
            status.record_error("generate_challenge", &format!("boom {i}"), 1, false, now);
        }
        assert!(status.transitions.len() <= MAX_TRANSITIONS);
        assert!(status.errors.len() <= MAX_ERRORS);
    }
}
