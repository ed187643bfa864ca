//! Core training plan types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The race distance a plan prepares for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalType {
    FiveK,
    TenK,
    HalfMarathon,
}

impl GoalType {
    pub fn as_str(&self) -> &'static str {
        match self {
            GoalType::FiveK => "five_k",
            GoalType::TenK => "ten_k",
            GoalType::HalfMarathon => "half_marathon",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "five_k" => Some(GoalType::FiveK),
            "ten_k" => Some(GoalType::TenK),
            "half_marathon" => Some(GoalType::HalfMarathon),
            _ => None,
        }
    }
}

/// Plan difficulty tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanDifficulty {
    Beginner,
    Intermediate,
    Advanced,
}

impl PlanDifficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanDifficulty::Beginner => "beginner",
            PlanDifficulty::Intermediate => "intermediate",
            PlanDifficulty::Advanced => "advanced",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "beginner" => Some(PlanDifficulty::Beginner),
            "intermediate" => Some(PlanDifficulty::Intermediate),
            "advanced" => Some(PlanDifficulty::Advanced),
            _ => None,
        }
    }

    /// Difficulty matching a user level: 1-3 beginner, 4-6 intermediate,
    /// 7+ advanced.
    pub fn for_level(level: u8) -> Self {
        match level {
            0..=3 => PlanDifficulty::Beginner,
            4..=6 => PlanDifficulty::Intermediate,
            _ => PlanDifficulty::Advanced,
        }
    }
}

/// A multi-week training plan definition. Read-mostly; never mutated by the
/// progression pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingPlan {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub goal_type: GoalType,
    pub difficulty: PlanDifficulty,
    pub total_weeks: u32,
    pub total_runs: u32,
    pub created_at: DateTime<Utc>,
}

/// One week of a plan's schedule. A `None` target is always satisfied.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanWeek {
    pub plan_id: Uuid,
    /// 1-based week index
    pub week_number: u32,
    pub target_distance_km: Option<f64>,
    pub target_runs: Option<u32>,
    pub description: Option<String>,
}

/// A user's progress through a training plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanParticipation {
    pub id: Uuid,
    pub plan_id: Uuid,
    pub user_id: Uuid,
    pub started_at: DateTime<Utc>,
    /// 1-based tracked week; only ever increases
    pub current_week: u32,
    /// Set once when the final week's targets are met; terminal
    pub completed_at: Option<DateTime<Utc>>,
    /// Optimistic concurrency token, bumped on every progress write
    pub version: i64,
}

impl PlanParticipation {
    /// Start a plan at week 1.
    pub fn new(plan_id: Uuid, user_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            plan_id,
            user_id,
            started_at: Utc::now(),
            current_week: 1,
            completed_at: None,
            version: 0,
        }
    }

    /// Advance to the next week.
    pub fn advance_week(&mut self) {
        self.current_week += 1;
    }

    /// Mark completed (terminal).
    pub fn complete(&mut self) {
        self.completed_at = Some(Utc::now());
    }

    pub fn is_in_progress(&self) -> bool {
        self.completed_at.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_difficulty_for_level() {
        assert_eq!(PlanDifficulty::for_level(1), PlanDifficulty::Beginner);
        assert_eq!(PlanDifficulty::for_level(3), PlanDifficulty::Beginner);
        assert_eq!(PlanDifficulty::for_level(4), PlanDifficulty::Intermediate);
        assert_eq!(PlanDifficulty::for_level(6), PlanDifficulty::Intermediate);
        assert_eq!(PlanDifficulty::for_level(7), PlanDifficulty::Advanced);
        assert_eq!(PlanDifficulty::for_level(10), PlanDifficulty::Advanced);
    }

    #[test]
    fn test_participation_lifecycle() {
        let mut participation = PlanParticipation::new(Uuid::new_v4(), Uuid::new_v4());
        assert_eq!(participation.current_week, 1);
        assert!(participation.is_in_progress());

        participation.advance_week();
        assert_eq!(participation.current_week, 2);

        participation.complete();
        assert!(!participation.is_in_progress());
    }
}
