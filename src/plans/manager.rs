//! Training plan management.
//!
//! Handles plan creation, recommendation, and starting. Week advancement is
//! applied by the progression pipeline, not here.

use chrono::Utc;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::store::PlanStore;
use super::types::{GoalType, PlanDifficulty, PlanParticipation, PlanWeek, TrainingPlan};
use crate::storage::{Database, DatabaseError};
use crate::users::UserStore;

/// Per-week targets supplied when creating a plan.
#[derive(Debug, Clone)]
pub struct WeekSpec {
    pub target_distance_km: Option<f64>,
    pub target_runs: Option<u32>,
    pub description: Option<String>,
}

/// Training plan manager.
pub struct PlanManager {
    db: Arc<Mutex<Database>>,
}

impl PlanManager {
    /// Create a new plan manager.
    pub fn new(db: Arc<Mutex<Database>>) -> Self {
        Self { db }
    }

    /// Create a plan with one schedule row per entry in `weeks`.
    pub async fn create_plan(
        &self,
        name: String,
        description: Option<String>,
        goal_type: GoalType,
        difficulty: PlanDifficulty,
        weeks: Vec<WeekSpec>,
    ) -> Result<TrainingPlan, PlanError> {
        if weeks.is_empty() {
            return Err(PlanError::EmptySchedule);
        }

        let total_runs = weeks.iter().filter_map(|w| w.target_runs).sum();
        let plan = TrainingPlan {
            id: Uuid::new_v4(),
            name,
            description,
            goal_type,
            difficulty,
            total_weeks: weeks.len() as u32,
            total_runs,
            created_at: Utc::now(),
        };

        let rows: Vec<PlanWeek> = weeks
            .into_iter()
            .enumerate()
            .map(|(i, spec)| PlanWeek {
                plan_id: plan.id,
                week_number: (i + 1) as u32,
                target_distance_km: spec.target_distance_km,
                target_runs: spec.target_runs,
                description: spec.description,
            })
            .collect();

        let db = self.db.lock().await;
        PlanStore::new(db.connection()).insert_plan(&plan, &rows)?;

        Ok(plan)
    }

    /// List plans with optional goal/difficulty filters.
    pub async fn plans(
        &self,
        goal_type: Option<GoalType>,
        difficulty: Option<PlanDifficulty>,
    ) -> Result<Vec<TrainingPlan>, PlanError> {
        let db = self.db.lock().await;
        let plans = PlanStore::new(db.connection()).list_plans(goal_type, difficulty)?;
        Ok(plans)
    }

    /// Recommended plans for a user: matches the difficulty tier for the
    /// user's level (or easier), up to three.
    pub async fn recommended_plans(
        &self,
        user_id: Uuid,
        goal_type: Option<GoalType>,
    ) -> Result<Vec<TrainingPlan>, PlanError> {
        let db = self.db.lock().await;
        let user = UserStore::new(db.connection())
            .get(user_id)?
            .ok_or(PlanError::UserNotFound(user_id))?;

        let recommended = PlanDifficulty::for_level(user.level);
        let plans = PlanStore::new(db.connection())
            .list_plans(goal_type, None)?
            .into_iter()
            .filter(|p| p.difficulty <= recommended)
            .take(3)
            .collect();

        Ok(plans)
    }

    /// Start a plan for a user.
    pub async fn start_plan(
        &self,
        user_id: Uuid,
        plan_id: Uuid,
    ) -> Result<PlanParticipation, PlanError> {
        let db = self.db.lock().await;
        let store = PlanStore::new(db.connection());

        UserStore::new(db.connection())
            .get(user_id)?
            .ok_or(PlanError::UserNotFound(user_id))?;
        store
            .get_plan(plan_id)?
            .ok_or(PlanError::NotFound(plan_id))?;

        if store.has_active_participation(user_id, plan_id)? {
            return Err(PlanError::AlreadyStarted);
        }

        let participation = PlanParticipation::new(plan_id, user_id);
        store.insert_participation(&participation)?;

        Ok(participation)
    }

    /// All of a user's participations with their plans.
    pub async fn my_plans(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<(PlanParticipation, TrainingPlan)>, PlanError> {
        let db = self.db.lock().await;
        let participations = PlanStore::new(db.connection()).participations_for_user(user_id)?;
        Ok(participations)
    }

    /// Week schedule for a plan.
    pub async fn schedule(&self, plan_id: Uuid) -> Result<Vec<PlanWeek>, PlanError> {
        let db = self.db.lock().await;
        let store = PlanStore::new(db.connection());
        store
            .get_plan(plan_id)?
            .ok_or(PlanError::NotFound(plan_id))?;
        let weeks = store.weeks_for_plan(plan_id)?;
        Ok(weeks)
    }
}

/// Plan errors.
#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    #[error("Plan not found: {0}")]
    NotFound(Uuid),

    #[error("User not found: {0}")]
    UserNotFound(Uuid),

    #[error("Plan already in progress")]
    AlreadyStarted,

    #[error("Plan has no week schedule")]
    EmptySchedule,

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error(transparent)]
    Storage(#[from] DatabaseError),
}
