//! Core activity types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One GPS sample of a run's route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutePoint {
    pub lat: f64,
    pub lng: f64,
    pub timestamp: Option<DateTime<Utc>>,
}

/// One logged run. Immutable apart from explicit updates, which are tracked
/// as a distance delta for downstream propagation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Activity {
    pub id: Uuid,
    pub user_id: Uuid,
    pub distance_km: f64,
    pub duration_secs: u32,
    /// Average pace in seconds per km (e.g. 360 = 6:00/km)
    pub average_pace_secs: Option<u32>,
    pub calories: Option<u32>,
    pub average_heart_rate: Option<u16>,
    pub cadence: Option<u16>,
    pub route: Option<Vec<RoutePoint>>,
    pub started_at: DateTime<Utc>,
    pub memo: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Fields accepted when recording or updating an activity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityRequest {
    pub distance_km: f64,
    pub duration_secs: u32,
    pub average_pace_secs: Option<u32>,
    pub calories: Option<u32>,
    pub average_heart_rate: Option<u16>,
    pub cadence: Option<u16>,
    pub route: Option<Vec<RoutePoint>>,
    pub started_at: DateTime<Utc>,
    pub memo: Option<String>,
}

impl Activity {
    /// Build a new activity for a user from a request.
    pub fn from_request(user_id: Uuid, request: ActivityRequest) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            distance_km: request.distance_km,
            duration_secs: request.duration_secs,
            average_pace_secs: request.average_pace_secs,
            calories: request.calories,
            average_heart_rate: request.average_heart_rate,
            cadence: request.cadence,
            route: request.route,
            started_at: request.started_at,
            memo: request.memo,
            created_at: Utc::now(),
        }
    }

    /// Apply an update request in place.
    pub fn apply(&mut self, request: ActivityRequest) {
        self.distance_km = request.distance_km;
        self.duration_secs = request.duration_secs;
        self.average_pace_secs = request.average_pace_secs;
        self.calories = request.calories;
        self.average_heart_rate = request.average_heart_rate;
        self.cadence = request.cadence;
        self.route = request.route;
        self.started_at = request.started_at;
        self.memo = request.memo;
    }
}

/// Aggregate statistics over a query window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityStats {
    pub total_distance_km: f64,
    pub total_count: u32,
    pub total_duration_secs: Option<u32>,
    pub average_pace_secs: Option<u32>,
}

/// Aggregate statistics over one summary period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodSummary {
    pub total_distance_km: f64,
    pub total_count: u32,
    pub total_duration_secs: u32,
    pub average_pace_secs: Option<u32>,
}

/// This week / this month / last month rollup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivitySummary {
    pub this_week: PeriodSummary,
    pub this_month: PeriodSummary,
    pub last_month: PeriodSummary,
}
