//! Typed repository over the record store.
//!
//! Every engine reads and writes through `ChallengeRepository` rather than
//! touching raw keys. Records are decoded with serde defaulting and then
//! range-clamped (`sanitize`), so a partial or hand-edited record degrades
//! to safe values instead of failing the caller. The repository performs no
//! caching -- every read hits the store, which is what the per-challenge
//! serialization protocol relies on.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::{keys, RecordStore};
use crate::baseline::UserActivityBaseline;
use crate::challenge::types::{
    ChallengePreviewData, ChallengeStreak, DailyProgressSnapshot, MonthlyChallenge,
    MonthlyChallengeProgress, RotationHistory,
};
use crate::error::StoreError;
use crate::lifecycle::ChallengeLifecycleStatus;
use crate::month::MonthKey;
use crate::stars::UserChallengeRatings;

/// Typed load/save over an untyped record store.
#[derive(Clone)]
pub struct ChallengeRepository {
    store: Arc<dyn RecordStore>,
    user_id: String,
}

impl ChallengeRepository {
    pub fn new(store: Arc<dyn RecordStore>, user_id: &str) -> Self {
        Self {
            store,
            user_id: user_id.to_string(),
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn store(&self) -> Arc<dyn RecordStore> {
        self.store.clone()
    }

    fn load<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        match self.store.get(key)? {
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|e| StoreError::CorruptRecord {
                    key: key.to_string(),
                    message: e.to_string(),
                }),
            None => Ok(None),
        }
    }

    fn save<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        let raw =
            serde_json::to_string(value).map_err(|e| StoreError::QueryFailed(e.to_string()))?;
        self.store.set(key, &raw)
    }

    // ── Challenges ───────────────────────────────────────────────────

    pub fn challenge(&self, id: &str) -> Result<Option<MonthlyChallenge>, StoreError> {
        let mut challenge: Option<MonthlyChallenge> = self.load(&keys::challenge(id))?;
        if let Some(c) = challenge.as_mut() {
            c.sanitize();
        }
        Ok(challenge)
    }

    /// The challenge generated for a month, via the month index.
    pub fn challenge_for_month(
        &self,
        month: &MonthKey,
    ) -> Result<Option<MonthlyChallenge>, StoreError> {
        match self.store.get(&keys::challenge_month(month))? {
            Some(id) => self.challenge(&id),
            None => Ok(None),
        }
    }

    /// Persist a challenge and its month index entry together.
    pub fn save_challenge(&self, challenge: &MonthlyChallenge) -> Result<(), StoreError> {
        self.save(&keys::challenge(&challenge.id), challenge)?;
        self.store
            .set(&keys::challenge_month(&challenge.month), &challenge.id)
    }

    /// All challenges currently flagged active. At most one in practice.
    pub fn active_challenges(&self) -> Result<Vec<MonthlyChallenge>, StoreError> {
        let mut out = Vec::new();
        for key in self.store.keys_with_prefix(keys::CHALLENGE_PREFIX)? {
            if let Some(raw) = self.store.get(&key)? {
                let mut challenge: MonthlyChallenge =
                    serde_json::from_str(&raw).map_err(|e| StoreError::CorruptRecord {
                        key: key.clone(),
                        message: e.to_string(),
                    })?;
                challenge.sanitize();
                if challenge.is_active {
                    out.push(challenge);
                }
            }
        }
        Ok(out)
    }

    // ── Progress ─────────────────────────────────────────────────────

    pub fn progress(
        &self,
        challenge_id: &str,
    ) -> Result<Option<MonthlyChallengeProgress>, StoreError> {
        let mut progress: Option<MonthlyChallengeProgress> =
            self.load(&keys::progress(challenge_id))?;
        if let Some(p) = progress.as_mut() {
            p.sanitize();
        }
        Ok(progress)
    }

    pub fn save_progress(&self, progress: &MonthlyChallengeProgress) -> Result<(), StoreError> {
        self.save(&keys::progress(&progress.challenge_id), progress)
    }

    // ── Daily snapshots ──────────────────────────────────────────────

    pub fn snapshot(
        &self,
        challenge_id: &str,
        date: NaiveDate,
    ) -> Result<Option<DailyProgressSnapshot>, StoreError> {
        self.load(&keys::snapshot(challenge_id, date))
    }

    pub fn save_snapshot(&self, snapshot: &DailyProgressSnapshot) -> Result<(), StoreError> {
        self.save(&keys::snapshot(&snapshot.challenge_id, snapshot.date), snapshot)
    }

    /// All snapshots for a challenge, ordered by date.
    pub fn snapshots_for(
        &self,
        challenge_id: &str,
    ) -> Result<Vec<DailyProgressSnapshot>, StoreError> {
        let mut out = Vec::new();
        for key in self
            .store
            .keys_with_prefix(&keys::snapshot_prefix(challenge_id))?
        {
            if let Some(raw) = self.store.get(&key)? {
                out.push(serde_json::from_str(&raw).map_err(|e| StoreError::CorruptRecord {
                    key: key.clone(),
                    message: e.to_string(),
                })?);
            }
        }
        Ok(out)
    }

    // ── Ratings ──────────────────────────────────────────────────────

    /// Stored ratings, or a fresh default record.
    pub fn ratings(&self) -> Result<UserChallengeRatings, StoreError> {
        let mut ratings: UserChallengeRatings = self
            .load(&keys::ratings(&self.user_id))?
            .unwrap_or_else(|| {
                UserChallengeRatings::new(&self.user_id, DateTime::<Utc>::UNIX_EPOCH)
            });
        ratings.sanitize();
        Ok(ratings)
    }

    pub fn save_ratings(&self, ratings: &UserChallengeRatings) -> Result<(), StoreError> {
        self.save(&keys::ratings(&self.user_id), ratings)
    }

    // ── Baselines ────────────────────────────────────────────────────

    pub fn baseline(&self, month: &MonthKey) -> Result<Option<UserActivityBaseline>, StoreError> {
        self.load(&keys::baseline(month, &self.user_id))
    }

    pub fn save_baseline(&self, baseline: &UserActivityBaseline) -> Result<(), StoreError> {
        self.save(&keys::baseline(&baseline.month, &self.user_id), baseline)
    }

    // ── Lifecycle status ─────────────────────────────────────────────

    pub fn lifecycle_status(
        &self,
        month: &MonthKey,
    ) -> Result<Option<ChallengeLifecycleStatus>, StoreError> {
        self.load(&keys::lifecycle(month))
    }

    pub fn save_lifecycle_status(
        &self,
        status: &ChallengeLifecycleStatus,
    ) -> Result<(), StoreError> {
        self.save(&keys::lifecycle(&status.month), status)
    }

    // ── Previews ─────────────────────────────────────────────────────

    pub fn preview(&self, month: &MonthKey) -> Result<Option<ChallengePreviewData>, StoreError> {
        self.load(&keys::preview(month))
    }

    pub fn save_preview(&self, preview: &ChallengePreviewData) -> Result<(), StoreError> {
        self.save(&keys::preview(&preview.month), preview)
    }

    pub fn remove_preview(&self, month: &MonthKey) -> Result<(), StoreError> {
        self.store.remove(&keys::preview(month))
    }

    /// Every stored preview, expired or not.
    pub fn all_previews(&self) -> Result<Vec<ChallengePreviewData>, StoreError> {
        let mut out = Vec::new();
        for key in self.store.keys_with_prefix(keys::PREVIEW_PREFIX)? {
            if let Some(raw) = self.store.get(&key)? {
                out.push(serde_json::from_str(&raw).map_err(|e| StoreError::CorruptRecord {
                    key: key.clone(),
                    message: e.to_string(),
                })?);
            }
        }
        Ok(out)
    }

    // ── Rotation & streak ────────────────────────────────────────────

    pub fn rotation(&self) -> Result<RotationHistory, StoreError> {
        Ok(self
            .load(&keys::rotation(&self.user_id))?
            .unwrap_or_default())
    }

    pub fn save_rotation(&self, rotation: &RotationHistory) -> Result<(), StoreError> {
        self.save(&keys::rotation(&self.user_id), rotation)
    }

    pub fn streak(&self) -> Result<ChallengeStreak, StoreError> {
        Ok(self.load(&keys::streak(&self.user_id))?.unwrap_or_default())
    }

    pub fn save_streak(&self, streak: &ChallengeStreak) -> Result<(), StoreError> {
        self.save(&keys::streak(&self.user_id), streak)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::challenge::types::{ChallengeCategory, GenerationReason, MonthlyChallenge};
    use crate::store::MemoryStore;

    fn repo() -> ChallengeRepository {
        ChallengeRepository::new(Arc::new(MemoryStore::new()), "local")
    }

    fn challenge(month: MonthKey) -> MonthlyChallenge {
        let now = Utc::now();
        MonthlyChallenge {
            id: "c1".into(),
            month,
            category: ChallengeCategory::Habits,
            star_level: 2,
            title: "t".into(),
            description: String::new(),
            start_date: month.first_day(),
            end_date: month.last_day(),
            xp_reward: 500,
            requirements: Vec::new(),
            baseline_snapshot: UserActivityBaseline::minimal_fallback(month, "local", now),
            generation_reason: GenerationReason::Standard,
            template_id: None,
            is_active: true,
            created_at: now,
        }
    }

    #[test]
    fn test_challenge_month_index() {
        let repo = repo();
        let month = MonthKey::new(2025, 3);
        repo.save_challenge(&challenge(month)).unwrap();

        let loaded = repo.challenge_for_month(&month).unwrap().unwrap();
        assert_eq!(loaded.id, "c1");
        assert!(repo
            .challenge_for_month(&MonthKey::new(2025, 4))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_active_filtering() {
        let repo = repo();
        let month = MonthKey::new(2025, 3);
        let mut c = challenge(month);
        repo.save_challenge(&c).unwrap();
        assert_eq!(repo.active_challenges().unwrap().len(), 1);

        c.is_active = false;
        repo.save_challenge(&c).unwrap();
        assert!(repo.active_challenges().unwrap().is_empty());
    }

    #[test]
    fn test_sanitize_on_load_clamps_star_level() {
        let repo = repo();
        let month = MonthKey::new(2025, 3);
        let mut c = challenge(month);
        c.star_level = 9; // corrupt
        repo.save_challenge(&c).unwrap();

        let loaded = repo.challenge("c1").unwrap().unwrap();
        assert_eq!(loaded.star_level, 5);
    }

    #[test]
    fn test_defaults_for_missing_records() {
        let repo = repo();
        assert!(repo.ratings().unwrap().ratings.is_empty());
        assert!(repo.rotation().unwrap().entries.is_empty());
        assert_eq!(repo.streak().unwrap().consecutive_months, 0);
    }
}
