//! Advisory notifications emitted by the engines.
//!
//! Every externally interesting state change produces an [`Event`] on the
//! [`EventBus`]. Delivery is fire-and-forget: the bus gives no guarantee and
//! expects no acknowledgment. UI layers subscribe for celebrations and
//! status updates; the engines never read events back.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::challenge::types::{ChallengeCategory, GenerationReason};
use crate::month::MonthKey;
use crate::stars::RatingChangeReason;

/// Every externally visible state change in the system produces an Event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    /// A new monthly challenge was generated and persisted.
    ChallengeGenerated {
        challenge_id: String,
        month: MonthKey,
        category: ChallengeCategory,
        star_level: u8,
        reason: GenerationReason,
        at: DateTime<Utc>,
    },
    /// A requirement's accumulated value changed.
    ProgressUpdated {
        challenge_id: String,
        tracking_key: String,
        delta: i64,
        completion_percentage: f64,
        at: DateTime<Utc>,
    },
    /// A completion-percentage milestone was crossed for the first time.
    MilestoneReached {
        challenge_id: String,
        percent: u8,
        bonus_xp: u32,
        at: DateTime<Utc>,
    },
    /// The active challenge reached 100% and was finalized.
    ChallengeCompleted {
        challenge_id: String,
        month: MonthKey,
        xp_awarded: u32,
        streak_months: u32,
        at: DateTime<Utc>,
    },
    /// A next-month preview is available.
    PreviewReady {
        month: MonthKey,
        category: ChallengeCategory,
        at: DateTime<Utc>,
    },
    /// A category's star rating changed.
    StarRatingChanged {
        category: ChallengeCategory,
        previous_stars: u8,
        new_stars: u8,
        reason: RatingChangeReason,
        at: DateTime<Utc>,
    },
    /// A lifecycle operation exhausted its retries or hit a
    /// non-retriable failure.
    LifecycleFailed {
        operation: String,
        message: String,
        at: DateTime<Utc>,
    },
}

/// Fire-and-forget event sink. Implementations must never block for long
/// and must never panic back into the caller.
pub trait EventBus: Send + Sync {
    fn publish(&self, event: Event);
}

/// Bus that drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullBus;

impl EventBus for NullBus {
    fn publish(&self, _event: Event) {}
}

/// Bus that records events in memory. Used by tests and the CLI.
#[derive(Debug, Default)]
pub struct MemoryBus {
    events: Mutex<Vec<Event>>,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all events published so far.
    pub fn events(&self) -> Vec<Event> {
        self.events
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    /// Drain and return all recorded events.
    pub fn take(&self) -> Vec<Event> {
        self.events
            .lock()
            .map(|mut guard| std::mem::take(&mut *guard))
            .unwrap_or_default()
    }
}

impl EventBus for MemoryBus {
    fn publish(&self, event: Event) {
        if let Ok(mut guard) = self.events.lock() {
            guard.push(event);
        }
    }
}

/// Bus that logs every event through `tracing` at info level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingBus;

impl EventBus for TracingBus {
    fn publish(&self, event: Event) {
        match serde_json::to_string(&event) {
            Ok(json) => tracing::info!(target: "ascent::events", event = %json),
            Err(_) => tracing::info!(target: "ascent::events", ?event),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_bus_records_and_drains() {
        let bus = MemoryBus::new();
        bus.publish(Event::LifecycleFailed {
            operation: "generate_challenge".into(),
            message: "boom".into(),
            at: Utc::now(),
        });
        assert_eq!(bus.events().len(), 1);
        assert_eq!(bus.take().len(), 1);
        assert!(bus.events().is_empty());
    }

    #[test]
    fn test_event_serializes_tagged() {
        let event = Event::MilestoneReached {
            challenge_id: "c1".into(),
            percent: 25,
            bonus_xp: 50,
            at: Utc::now(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"MilestoneReached\""));
    }
}
