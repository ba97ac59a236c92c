//! TOML-based application configuration.
//!
//! Stores tuning knobs for the engines:
//! - Baseline analysis window and cache freshness
//! - Generation caps and variance seeding
//! - Lifecycle retry/preview policy
//! - Progress bonus amounts
//!
//! Configuration is stored at `~/.config/ascent/config.toml`. Every field
//! is serde-defaulted, so a partial (or absent) file yields a complete
//! config.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::challenge::generator::GeneratorConfig;
use crate::challenge::types::ChallengeCategory;
use crate::error::CoreError;
use crate::lifecycle::LifecyclePolicy;
use crate::progress::ProgressConfig;
use crate::store::data_dir;

/// Baseline analysis configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaselineSettings {
    #[serde(default = "default_window_days")]
    pub window_days: u32,
    #[serde(default = "default_cache_ttl_hours")]
    pub cache_ttl_hours: u32,
}

/// Challenge generation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationSettings {
    #[serde(default = "default_daily_xp_cap")]
    pub daily_xp_cap: u32,
    /// Seed for template-selection variance (omit for entropy).
    #[serde(default)]
    pub variance_seed: Option<u64>,
    #[serde(default = "default_category")]
    pub default_category: ChallengeCategory,
}

/// Lifecycle scheduler configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleSettings {
    #[serde(default = "default_max_retry_attempts")]
    pub max_retry_attempts: u32,
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: i64,
    #[serde(default = "default_tick_interval_mins")]
    pub tick_interval_mins: i64,
    #[serde(default = "default_preview_day")]
    pub preview_day: u32,
    #[serde(default = "default_preview_ttl_days")]
    pub preview_ttl_days: i64,
}

/// Progress bonus configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressSettings {
    #[serde(default = "default_milestone_bonuses")]
    pub milestone_bonuses: [u32; 3],
    #[serde(default = "default_completion_bonus_pct")]
    pub completion_bonus_pct: u32,
    #[serde(default = "default_streak_bonus_per_month")]
    pub streak_bonus_per_month: u32,
}

/// Application configuration.
///
/// Serialized to/from TOML at `~/.config/ascent/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AscentConfig {
    #[serde(default = "default_user_id")]
    pub user_id: String,
    #[serde(default)]
    pub baseline: BaselineSettings,
    #[serde(default)]
    pub generation: GenerationSettings,
    #[serde(default)]
    pub lifecycle: LifecycleSettings,
    #[serde(default)]
    pub progress: ProgressSettings,
}

// Default functions
fn default_user_id() -> String {
    "local".to_string()
}
fn default_window_days() -> u32 {
    30
}
fn default_cache_ttl_hours() -> u32 {
    24
}
fn default_daily_xp_cap() -> u32 {
    500
}
fn default_category() -> ChallengeCategory {
    ChallengeCategory::Habits
}
fn default_max_retry_attempts() -> u32 {
    3
}
fn default_retry_delay_secs() -> i64 {
    300
}
fn default_tick_interval_mins() -> i64 {
    60
}
fn default_preview_day() -> u32 {
    25
}
fn default_preview_ttl_days() -> i64 {
    7
}
fn default_milestone_bonuses() -> [u32; 3] {
    [50, 100, 150]
}
fn default_completion_bonus_pct() -> u32 {
    20
}
fn default_streak_bonus_per_month() -> u32 {
    50
}

impl Default for BaselineSettings {
    fn default() -> Self {
        Self {
            window_days: default_window_days(),
            cache_ttl_hours: default_cache_ttl_hours(),
        }
    }
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            daily_xp_cap: default_daily_xp_cap(),
            variance_seed: None,
            default_category: default_category(),
        }
    }
}

impl Default for LifecycleSettings {
    fn default() -> Self {
        Self {
            max_retry_attempts: default_max_retry_attempts(),
            retry_delay_secs: default_retry_delay_secs(),
            tick_interval_mins: default_tick_interval_mins(),
            preview_day: default_preview_day(),
            preview_ttl_days: default_preview_ttl_days(),
        }
    }
}

impl Default for ProgressSettings {
    fn default() -> Self {
        Self {
            milestone_bonuses: default_milestone_bonuses(),
            completion_bonus_pct: default_completion_bonus_pct(),
            streak_bonus_per_month: default_streak_bonus_per_month(),
        }
    }
}

impl Default for AscentConfig {
    fn default() -> Self {
        Self {
            user_id: default_user_id(),
            baseline: BaselineSettings::default(),
            generation: GenerationSettings::default(),
            lifecycle: LifecycleSettings::default(),
            progress: ProgressSettings::default(),
        }
    }
}

impl AscentConfig {
    /// Path to the config file.
    pub fn path() -> Result<PathBuf, CoreError> {
        Ok(data_dir()?.join("config.toml"))
    }

    /// Load the config, falling back to defaults when the file is missing.
    pub fn load() -> Result<Self, CoreError> {
        let path = Self::path()?;
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(&path)?;
        toml::from_str(&raw).map_err(|e| CoreError::Config(e.to_string()))
    }

    /// Write the config back to disk.
    pub fn save(&self) -> Result<(), CoreError> {
        let raw =
            toml::to_string_pretty(self).map_err(|e| CoreError::Config(e.to_string()))?;
        std::fs::write(Self::path()?, raw)?;
        Ok(())
    }
}

impl From<&GenerationSettings> for GeneratorConfig {
    fn from(settings: &GenerationSettings) -> Self {
        Self {
            daily_xp_cap: settings.daily_xp_cap,
            variance_seed: settings.variance_seed,
            default_category: settings.default_category,
        }
    }
}

impl From<&LifecycleSettings> for LifecyclePolicy {
    fn from(settings: &LifecycleSettings) -> Self {
        Self {
            max_retry_attempts: settings.max_retry_attempts,
            retry_delay_secs: settings.retry_delay_secs,
            tick_interval_mins: settings.tick_interval_mins,
            preview_day: settings.preview_day,
            preview_ttl_days: settings.preview_ttl_days,
        }
    }
}

impl From<&ProgressSettings> for ProgressConfig {
    fn from(settings: &ProgressSettings) -> Self {
        Self {
            milestone_bonuses: settings.milestone_bonuses,
            completion_bonus_pct: settings.completion_bonus_pct,
            streak_bonus_per_month: settings.streak_bonus_per_month,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_toml_yields_defaults() {
        let config: AscentConfig = toml::from_str("").unwrap();
        assert_eq!(config.user_id, "local");
        assert_eq!(config.baseline.window_days, 30);
        assert_eq!(config.lifecycle.preview_day, 25);
        assert_eq!(config.progress.milestone_bonuses, [50, 100, 150]);
    }

    #[test]
    fn test_partial_toml_keeps_other_defaults() {
        let config: AscentConfig = toml::from_str(
            "[lifecycle]\nmax_retry_attempts = 5\n\n[generation]\nvariance_seed = 99\n",
        )
        .unwrap();
        assert_eq!(config.lifecycle.max_retry_attempts, 5);
        assert_eq!(config.lifecycle.retry_delay_secs, 300);
        assert_eq!(config.generation.variance_seed, Some(99));
        assert_eq!(config.generation.daily_xp_cap, 500);
    }

    #[test]
    fn test_round_trip() {
        let config = AscentConfig::default();
        let raw = toml::to_string_pretty(&config).unwrap();
        let parsed: AscentConfig = toml::from_str(&raw).unwrap();
        assert_eq!(parsed.baseline.window_days, config.baseline.window_days);
    }
}
