//! Monthly challenge model, template catalog and generation engine.

pub mod generator;
pub mod templates;
pub mod types;

pub use generator::{
    ChallengeGenerator, GenerationContext, GenerationMetadata, GenerationOutcome, GeneratorConfig,
};
pub use templates::{builtin_templates, BaselineMetric, MonthlyChallengeTemplate, RequirementTemplate};
pub use types::{
    ChallengeCategory, ChallengePreviewData, ChallengeStreak, DailyProgressSnapshot,
    GenerationReason, MonthlyChallenge, MonthlyChallengeProgress, MonthlyChallengeRequirement,
    RotationEntry, RotationHistory, WeeklyBreakdown,
};
