//! Shared service construction for CLI commands.
//!
//! Each command builds the services it needs from one [`Ctx`]: the sqlite
//! store, the system clock, the tracing event bus and the loaded config.

use std::error::Error;
use std::sync::Arc;

use ascent_core::{
    ActivityLedger, AscentConfig, BaselineAnalyzer, ChallengeCategory, ChallengeGenerator,
    ChallengeRepository, Clock, DomainActivity, EventBus, LedgerStore, LifecycleManager,
    ProgressTracker, RecordStore, SqliteStore, StarRatingEngine, SystemClock, TracingBus,
    XpSource,
};

pub struct Ctx {
    pub config: AscentConfig,
    pub store: Arc<dyn RecordStore>,
    pub clock: Arc<dyn Clock>,
    pub bus: Arc<dyn EventBus>,
}

impl Ctx {
    pub fn open() -> Result<Self, Box<dyn Error>> {
        Ok(Self {
            config: AscentConfig::load()?,
            store: Arc::new(SqliteStore::open()?),
            clock: Arc::new(SystemClock),
            bus: Arc::new(TracingBus),
        })
    }

    pub fn repo(&self) -> ChallengeRepository {
        ChallengeRepository::new(self.store.clone(), &self.config.user_id)
    }

    pub fn ledger(&self) -> Arc<LedgerStore> {
        Arc::new(LedgerStore::new(self.store.clone(), self.clock.clone()))
    }

    pub fn analyzer(&self) -> BaselineAnalyzer {
        let ledger = self.ledger();
        let domains: Arc<dyn DomainActivity> = ledger.clone();
        let ledger: Arc<dyn ActivityLedger> = ledger;
        BaselineAnalyzer::new(ledger, domains, self.clock.clone())
            .with_user(&self.config.user_id)
            .with_cache_ttl_hours(self.config.baseline.cache_ttl_hours)
    }

    pub fn generator(&self) -> ChallengeGenerator {
        ChallengeGenerator::new(
            self.repo(),
            self.bus.clone(),
            self.clock.clone(),
            (&self.config.generation).into(),
        )
    }

    pub fn stars(&self) -> StarRatingEngine {
        StarRatingEngine::new(self.repo(), self.bus.clone(), self.clock.clone())
    }

    pub fn lifecycle(&self) -> LifecycleManager {
        LifecycleManager::new(
            self.repo(),
            self.generator(),
            self.analyzer(),
            self.stars(),
            self.bus.clone(),
            self.clock.clone(),
            (&self.config.lifecycle).into(),
        )
    }

    pub fn tracker(&self) -> ProgressTracker {
        let ledger = self.ledger();
        let domains: Arc<dyn DomainActivity> = ledger.clone();
        let ledger: Arc<dyn ActivityLedger> = ledger;
        ProgressTracker::new(
            self.repo(),
            self.stars(),
            ledger,
            domains,
            self.bus.clone(),
            self.clock.clone(),
            (&self.config.progress).into(),
        )
    }
}

/// Parse a CLI source name into an [`XpSource`].
pub fn parse_source(raw: &str) -> Result<XpSource, Box<dyn Error>> {
    let source = match raw {
        "habit" | "habit_completion" => XpSource::HabitCompletion,
        "journal" | "journal_entry" => XpSource::JournalEntry,
        "goal" | "goal_progress" => XpSource::GoalProgress,
        "goal_completion" => XpSource::GoalCompletion,
        "other" => XpSource::Other,
        _ => return Err(format!("unknown source '{raw}'").into()),
    };
    Ok(source)
}

/// Parse a CLI category name into a [`ChallengeCategory`].
pub fn parse_category(raw: &str) -> Result<ChallengeCategory, Box<dyn Error>> {
    let category = match raw {
        "habits" => ChallengeCategory::Habits,
        "journal" => ChallengeCategory::Journal,
        "goals" => ChallengeCategory::Goals,
        "consistency" => ChallengeCategory::Consistency,
        _ => return Err(format!("unknown category '{raw}'").into()),
    };
    Ok(category)
}
