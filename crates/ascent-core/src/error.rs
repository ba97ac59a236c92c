//! Core error types for ascent-core.
//!
//! This module defines a comprehensive error hierarchy using thiserror
//! for better error handling and reporting across the library.

use thiserror::Error;

/// Core error type for ascent-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Record-store errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Challenge-generation errors
    #[error("Generation error: {0}")]
    Generation(#[from] GenerationError),

    /// Lifecycle errors
    #[error("Lifecycle error: {0}")]
    Lifecycle(#[from] LifecycleError),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic errors with context
    #[error("{0}")]
    Custom(String),
}

/// Record-store errors.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Failed to open the backing store
    #[error("Failed to open store at {path}: {message}")]
    OpenFailed { path: String, message: String },

    /// Read or write against the store failed
    #[error("Store query failed: {0}")]
    QueryFailed(String),

    /// A stored record could not be decoded
    #[error("Corrupt record at key '{key}': {message}")]
    CorruptRecord { key: String, message: String },

    /// The store is locked by another writer
    #[error("Store is locked")]
    Locked,
}

/// Challenge-generation errors.
#[derive(Error, Debug)]
pub enum GenerationError {
    /// No template satisfies the selection constraints
    #[error("No template available for category '{category}'")]
    NoTemplate { category: String },

    /// A requirement could not be scaled from the baseline
    #[error("Failed to scale requirement '{tracking_key}': {message}")]
    ScalingFailed {
        tracking_key: String,
        message: String,
    },

    /// A challenge already exists for the target month
    #[error("Challenge already exists for {month}")]
    AlreadyExists { month: String },

    /// The generation pipeline failed and the fallback also failed
    #[error("Generation pipeline failed: {0}")]
    PipelineFailed(String),
}

/// Lifecycle errors.
#[derive(Error, Debug)]
pub enum LifecycleError {
    /// An operation exceeded its retry budget
    #[error("Retry budget exhausted for {operation} after {attempts} attempts")]
    RetriesExhausted { operation: String, attempts: u32 },

    /// A scheduled operation failed
    #[error("{operation} failed: {message}")]
    OperationFailed { operation: String, message: String },

    /// The lifecycle status record is missing or unreadable
    #[error("Lifecycle status unavailable for {month}")]
    StatusUnavailable { month: String },
}

/// Validation errors.
#[derive(Error, Debug)]
pub enum ValidationError {
    /// Invalid date range
    #[error("Invalid date range: end ({end}) must not precede start ({start})")]
    InvalidDateRange {
        start: chrono::NaiveDate,
        end: chrono::NaiveDate,
    },

    /// A value fell outside its permitted range
    #[error("Value {value} for '{field}' outside [{min}, {max}]")]
    OutOfRange {
        field: String,
        value: f64,
        min: f64,
        max: f64,
    },

    /// A month string could not be parsed
    #[error("Invalid month key '{0}': expected YYYY-MM")]
    InvalidMonthKey(String),

    /// Invalid value
    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },
}

// Helper implementations for converting from other error types

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(err, _msg) => {
                if err.code == rusqlite::ErrorCode::DatabaseLocked {
                    StoreError::Locked
                } else {
                    StoreError::QueryFailed(err.to_string())
                }
            }
            _ => StoreError::QueryFailed(err.to_string()),
        }
    }
}

impl From<Box<dyn std::error::Error + Send + Sync>> for CoreError {
    fn from(err: Box<dyn std::error::Error + Send + Sync>) -> Self {
        CoreError::Custom(err.to_string())
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
