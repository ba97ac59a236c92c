//! # Ascent Core Library
//!
//! This library provides the core business logic for Ascent's monthly
//! engagement challenges. It implements a CLI-first philosophy where all
//! operations are available via a standalone CLI binary, with any GUI
//! being a thin layer over the same core library.
//!
//! ## Architecture
//!
//! - **Baseline Analyzer**: folds 30 days of activity into normalized
//!   per-domain metrics
//! - **Star Progression**: per-category difficulty tiers (1-5) driven by a
//!   small state machine
//! - **Challenge Generation**: weighted category/template selection and
//!   baseline-driven target scaling
//! - **Lifecycle Manager**: a wall-clock tick-driven scheduler -- the
//!   caller invokes `tick()` periodically; there are no internal threads
//! - **Progress Tracker**: converts streamed activity events into
//!   progress, milestones and completion
//!
//! Storage, the XP ledger, the domain stores, the event bus and the clock
//! are all trait seams injected at construction, so every engine is
//! testable against in-memory fakes and a fixed clock.
//!
//! ## Key Components
//!
//! - [`BaselineAnalyzer`]: activity summarization with a 24 h cache
//! - [`StarRatingEngine`]: difficulty tier transitions
//! - [`ChallengeGenerator`]: monthly challenge creation
//! - [`LifecycleManager`]: scheduling, previews, retries, archival
//! - [`ProgressTracker`]: event ingestion and completion

pub mod activity;
pub mod baseline;
pub mod cache;
pub mod challenge;
pub mod clock;
pub mod config;
pub mod error;
pub mod events;
pub mod lifecycle;
pub mod month;
pub mod progress;
pub mod stars;
pub mod store;

pub use activity::{ActivityLedger, DomainActivity, LedgerStore, XpAward, XpSource, XpTransaction};
pub use baseline::{BaselineAnalyzer, BaselineOptions, DataQuality, UserActivityBaseline};
pub use cache::TtlCache;
pub use challenge::{
    builtin_templates, ChallengeCategory, ChallengeGenerator, ChallengePreviewData,
    ChallengeStreak, GenerationContext, GenerationOutcome, GenerationReason, GeneratorConfig,
    MonthlyChallenge, MonthlyChallengeProgress, MonthlyChallengeRequirement,
    MonthlyChallengeTemplate,
};
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::AscentConfig;
pub use error::{CoreError, GenerationError, LifecycleError, Result, StoreError, ValidationError};
pub use events::{Event, EventBus, MemoryBus, NullBus, TracingBus};
pub use lifecycle::{
    ChallengeLifecycleStatus, LifecycleManager, LifecyclePolicy, LifecycleState,
};
pub use month::MonthKey;
pub use progress::{ProgressConfig, ProgressTracker};
pub use stars::{
    apply_star_scaling, star_multiplier, RatingChangeReason, StarRatingEngine,
    StarRatingHistoryEntry, UserChallengeRatings,
};
pub use store::{ChallengeRepository, MemoryStore, RecordStore, SqliteStore};
