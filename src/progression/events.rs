//! Activity lifecycle events.
//!
//! Events are plain serializable facts staged in the outbox alongside the
//! activity write and consumed by the dispatcher. The timestamp anchor is
//! always the activity start time, not the emission time: week and date
//! arithmetic downstream must bucket by when the run happened.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Discriminant for handler registration and filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Created,
    Updated,
    Deleted,
}

/// An immutable fact about an activity lifecycle change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActivityEvent {
    /// An activity was recorded; `distance_km` is the full value to add.
    Created {
        user_id: Uuid,
        activity_id: Uuid,
        distance_km: f64,
        started_at: DateTime<Utc>,
    },
    /// An activity's distance changed; handlers apply the delta, never the
    /// full new value.
    Updated {
        user_id: Uuid,
        activity_id: Uuid,
        old_distance_km: f64,
        new_distance_km: f64,
        started_at: DateTime<Utc>,
    },
    /// An activity was deleted; `distance_km` is the value to subtract.
    Deleted {
        user_id: Uuid,
        activity_id: Uuid,
        distance_km: f64,
        started_at: DateTime<Utc>,
    },
}

impl ActivityEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            ActivityEvent::Created { .. } => EventKind::Created,
            ActivityEvent::Updated { .. } => EventKind::Updated,
            ActivityEvent::Deleted { .. } => EventKind::Deleted,
        }
    }

    pub fn user_id(&self) -> Uuid {
        match self {
            ActivityEvent::Created { user_id, .. }
            | ActivityEvent::Updated { user_id, .. }
            | ActivityEvent::Deleted { user_id, .. } => *user_id,
        }
    }

    pub fn activity_id(&self) -> Uuid {
        match self {
            ActivityEvent::Created { activity_id, .. }
            | ActivityEvent::Updated { activity_id, .. }
            | ActivityEvent::Deleted { activity_id, .. } => *activity_id,
        }
    }

    /// The activity start time anchoring all date math for this event.
    pub fn started_at(&self) -> DateTime<Utc> {
        match self {
            ActivityEvent::Created { started_at, .. }
            | ActivityEvent::Updated { started_at, .. }
            | ActivityEvent::Deleted { started_at, .. } => *started_at,
        }
    }

    /// The signed distance delta this event applies to the cumulative total.
    pub fn distance_delta(&self) -> f64 {
        match self {
            ActivityEvent::Created { distance_km, .. } => *distance_km,
            ActivityEvent::Updated {
                old_distance_km,
                new_distance_km,
                ..
            } => new_distance_km - old_distance_km,
            ActivityEvent::Deleted { distance_km, .. } => -distance_km,
        }
    }
}
