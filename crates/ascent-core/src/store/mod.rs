//! Record storage.
//!
//! The core persists every record through the [`RecordStore`] trait: a
//! namespaced key-value surface (`get`/`set`/`remove` plus prefix listing).
//! Nothing above this module assumes a particular backing technology; the
//! crate ships [`MemoryStore`] for tests and [`SqliteStore`] as the
//! reference on-disk implementation. The only atomicity the engines rely on
//! is a single `set` call -- a challenge and its requirements are one
//! record, written together.

mod memory;
pub mod repository;
pub mod sqlite;

pub use memory::MemoryStore;
pub use repository::ChallengeRepository;
pub use sqlite::SqliteStore;

use std::path::PathBuf;

use crate::error::StoreError;

/// Key-value record store. Values are JSON strings.
pub trait RecordStore: Send + Sync {
    /// Fetch the record stored at `key`, if any.
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Store `value` at `key`, replacing any existing record.
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Delete the record at `key`. Deleting a missing key is not an error.
    fn remove(&self, key: &str) -> Result<(), StoreError>;

    /// All keys beginning with `prefix`, in lexicographic order.
    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError>;
}

/// Key namespacing, one scheme per record kind.
pub mod keys {
    use crate::month::MonthKey;
    use chrono::NaiveDate;

    pub fn challenge(id: &str) -> String {
        format!("challenge:{id}")
    }

    pub const CHALLENGE_PREFIX: &str = "challenge:";

    /// Month index: maps a month to the id of its challenge.
    pub fn challenge_month(month: &MonthKey) -> String {
        format!("challenge_month:{month}")
    }

    pub fn progress(challenge_id: &str) -> String {
        format!("progress:{challenge_id}")
    }

    pub fn baseline(month: &MonthKey, user_id: &str) -> String {
        format!("baseline:{month}:{user_id}")
    }

    pub fn ratings(user_id: &str) -> String {
        format!("ratings:{user_id}")
    }

    pub fn lifecycle(month: &MonthKey) -> String {
        format!("lifecycle:{month}")
    }

    pub fn preview(month: &MonthKey) -> String {
        format!("preview:{month}")
    }

    pub const PREVIEW_PREFIX: &str = "preview:";

    pub fn rotation(user_id: &str) -> String {
        format!("rotation:{user_id}")
    }

    pub fn streak(user_id: &str) -> String {
        format!("streak:{user_id}")
    }

    pub fn snapshot(challenge_id: &str, date: NaiveDate) -> String {
        format!("snapshot:{challenge_id}:{date}")
    }

    pub fn snapshot_prefix(challenge_id: &str) -> String {
        format!("snapshot:{challenge_id}:")
    }

    pub fn ledger_day(date: NaiveDate) -> String {
        format!("ledger:{date}")
    }
}

/// Returns `~/.config/ascent[-dev]/` based on ASCENT_ENV.
///
/// Set ASCENT_ENV=dev to use a development data directory.
///
/// # Errors
/// Returns an error if the config directory cannot be created.
pub fn data_dir() -> Result<PathBuf, StoreError> {
    let base_dir = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config");

    let env = std::env::var("ASCENT_ENV").unwrap_or_else(|_| "production".to_string());

    let dir = if env == "dev" {
        base_dir.join("ascent-dev")
    } else {
        base_dir.join("ascent")
    };

    std::fs::create_dir_all(&dir).map_err(|e| StoreError::OpenFailed {
        path: dir.display().to_string(),
        message: e.to_string(),
    })?;
    Ok(dir)
}
