//! Progress tracking for the active challenge.

pub mod snapshot;
pub mod tracker;

pub use snapshot::DayFeatures;
pub use tracker::{ProgressConfig, ProgressTracker};
