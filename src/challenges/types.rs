//! Core challenge types.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What a challenge measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChallengeType {
    /// Accumulate a total distance within the window
    Distance,
    /// Log a number of runs within the window
    Count,
}

impl ChallengeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChallengeType::Distance => "distance",
            ChallengeType::Count => "count",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "distance" => Some(ChallengeType::Distance),
            "count" => Some(ChallengeType::Count),
            _ => None,
        }
    }
}

/// A time-boxed goal multiple users can join.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Challenge {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub challenge_type: ChallengeType,
    /// Goal distance in km (distance challenges)
    pub target_distance_km: Option<f64>,
    /// Goal run count (count challenges)
    pub target_count: Option<u32>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    /// Minimum recommended level, 1-10; None means open to all
    pub recommended_min_level: Option<u8>,
    pub created_at: DateTime<Utc>,
}

impl Challenge {
    /// Whether the challenge window contains the given date (inclusive).
    pub fn is_active(&self, date: NaiveDate) -> bool {
        date >= self.start_date && date <= self.end_date
    }
}

/// Participation lifecycle.
///
/// `Completed` and `Expired` are terminal: a participation never leaves
/// either state, regardless of later events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipationStatus {
    Active,
    Completed,
    Expired,
}

impl ParticipationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParticipationStatus::Active => "active",
            ParticipationStatus::Completed => "completed",
            ParticipationStatus::Expired => "expired",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "active" => Some(ParticipationStatus::Active),
            "completed" => Some(ParticipationStatus::Completed),
            "expired" => Some(ParticipationStatus::Expired),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, ParticipationStatus::Active)
    }
}

/// A user's enrollment and running progress against a challenge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChallengeParticipation {
    pub id: Uuid,
    pub challenge_id: Uuid,
    pub user_id: Uuid,
    pub current_distance_km: f64,
    pub current_count: u32,
    pub status: ParticipationStatus,
    pub completed_at: Option<DateTime<Utc>>,
    pub joined_at: DateTime<Utc>,
    /// Optimistic concurrency token, bumped on every progress write
    pub version: i64,
}

impl ChallengeParticipation {
    /// Create a fresh participation.
    pub fn new(challenge_id: Uuid, user_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            challenge_id,
            user_id,
            current_distance_km: 0.0,
            current_count: 0,
            status: ParticipationStatus::Active,
            completed_at: None,
            joined_at: Utc::now(),
            version: 0,
        }
    }

    /// Add distance progress.
    pub fn add_distance(&mut self, distance_km: f64) {
        self.current_distance_km += distance_km;
    }

    /// Add one run to the count progress.
    pub fn add_count(&mut self) {
        self.current_count += 1;
    }

    /// Whether the challenge goal has been met.
    ///
    /// Progress is never capped at the target; only the transition matters.
    pub fn goal_achieved(&self, challenge: &Challenge) -> bool {
        match challenge.challenge_type {
            ChallengeType::Distance => challenge
                .target_distance_km
                .map_or(false, |target| self.current_distance_km >= target),
            ChallengeType::Count => challenge
                .target_count
                .map_or(false, |target| self.current_count >= target),
        }
    }

    /// Mark completed (terminal).
    pub fn complete(&mut self) {
        self.status = ParticipationStatus::Completed;
        self.completed_at = Some(Utc::now());
    }

    /// Mark expired (terminal). Only an active participation can expire.
    pub fn expire(&mut self) {
        if self.status == ParticipationStatus::Active {
            self.status = ParticipationStatus::Expired;
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == ParticipationStatus::Completed
    }
}
