//! Core user types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::progression::level::calculate_level;

/// A registered user with cumulative progression state.
///
/// `total_distance_km` and `level` are owned by the progression pipeline:
/// they change only when the level-update handler processes an activity
/// event, never directly from request handling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub nickname: String,
    pub weight_kg: Option<f64>,
    pub height_cm: Option<f64>,
    /// Derived level in 1-10, computed from cumulative distance
    pub level: u8,
    /// Cumulative running distance in kilometers
    pub total_distance_km: f64,
    /// Optimistic concurrency token, bumped on every progression write
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Create a new user with the given nickname.
    pub fn new(nickname: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            nickname,
            weight_kg: None,
            height_cm: None,
            level: 1,
            total_distance_km: 0.0,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply a signed distance delta to the cumulative total.
    pub fn add_distance(&mut self, delta_km: f64) {
        self.total_distance_km += delta_km;
    }

    /// Recompute the level from the cumulative distance.
    pub fn update_level(&mut self) {
        self.level = calculate_level(self.total_distance_km);
    }

    /// Apply a profile update; only provided fields are changed.
    pub fn update_profile(
        &mut self,
        nickname: Option<String>,
        weight_kg: Option<f64>,
        height_cm: Option<f64>,
    ) {
        if let Some(nickname) = nickname {
            self.nickname = nickname;
        }
        if let Some(weight) = weight_kg {
            self.weight_kg = Some(weight);
        }
        if let Some(height) = height_cm {
            self.height_cm = Some(height);
        }
        self.updated_at = Utc::now();
    }
}
