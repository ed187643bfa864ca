//! Training plan and participation persistence operations.

use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::types::{GoalType, PlanDifficulty, PlanParticipation, PlanWeek, TrainingPlan};
use crate::storage::{parse_timestamp, parse_uuid};

const PLAN_COLUMNS: &str =
    "id, name, description, goal_type, difficulty, total_weeks, total_runs, created_at";

/// Plan store for a database connection or transaction.
pub struct PlanStore<'a> {
    conn: &'a Connection,
}

impl<'a> PlanStore<'a> {
    /// Create a new plan store with the given connection.
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    // ========== Plans & schedules ==========

    /// Insert a plan and its week schedule.
    pub fn insert_plan(&self, plan: &TrainingPlan, weeks: &[PlanWeek]) -> rusqlite::Result<()> {
        self.conn.execute(
            "INSERT INTO training_plans (id, name, description, goal_type, difficulty,
             total_weeks, total_runs, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                plan.id.to_string(),
                plan.name,
                plan.description,
                plan.goal_type.as_str(),
                plan.difficulty.as_str(),
                plan.total_weeks,
                plan.total_runs,
                plan.created_at.to_rfc3339(),
            ],
        )?;

        let mut stmt = self.conn.prepare(
            "INSERT INTO plan_weeks (plan_id, week_number, target_distance_km, target_runs, description)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )?;
        for week in weeks {
            stmt.execute(params![
                week.plan_id.to_string(),
                week.week_number,
                week.target_distance_km,
                week.target_runs,
                week.description,
            ])?;
        }

        Ok(())
    }

    /// Get a plan by ID.
    pub fn get_plan(&self, id: Uuid) -> rusqlite::Result<Option<TrainingPlan>> {
        self.conn
            .query_row(
                &format!("SELECT {PLAN_COLUMNS} FROM training_plans WHERE id = ?1"),
                params![id.to_string()],
                parse_plan_row,
            )
            .optional()
    }

    /// List plans, optionally filtered by goal type and difficulty.
    pub fn list_plans(
        &self,
        goal_type: Option<GoalType>,
        difficulty: Option<PlanDifficulty>,
    ) -> rusqlite::Result<Vec<TrainingPlan>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {PLAN_COLUMNS} FROM training_plans
             WHERE (?1 IS NULL OR goal_type = ?1)
               AND (?2 IS NULL OR difficulty = ?2)
             ORDER BY difficulty, name"
        ))?;

        let rows = stmt.query_map(
            params![
                goal_type.map(|g| g.as_str()),
                difficulty.map(|d| d.as_str()),
            ],
            parse_plan_row,
        )?;
        rows.collect()
    }

    /// Schedule rows for one plan, in week order.
    pub fn weeks_for_plan(&self, plan_id: Uuid) -> rusqlite::Result<Vec<PlanWeek>> {
        let mut stmt = self.conn.prepare(
            "SELECT plan_id, week_number, target_distance_km, target_runs, description
             FROM plan_weeks WHERE plan_id = ?1 ORDER BY week_number ASC",
        )?;

        let rows = stmt.query_map(params![plan_id.to_string()], parse_week_row)?;
        rows.collect()
    }

    /// Schedule rows for several plans in one query, so progress checks over
    /// many active plans avoid a lookup per plan.
    pub fn weeks_for_plans(&self, plan_ids: &[Uuid]) -> rusqlite::Result<Vec<PlanWeek>> {
        if plan_ids.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = (1..=plan_ids.len())
            .map(|i| format!("?{}", i))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT plan_id, week_number, target_distance_km, target_runs, description
             FROM plan_weeks WHERE plan_id IN ({}) ORDER BY plan_id, week_number",
            placeholders
        );

        let ids: Vec<String> = plan_ids.iter().map(|id| id.to_string()).collect();
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(ids.iter()), parse_week_row)?;
        rows.collect()
    }

    // ========== Participations ==========

    /// Insert a new participation.
    pub fn insert_participation(&self, participation: &PlanParticipation) -> rusqlite::Result<()> {
        self.conn.execute(
            "INSERT INTO plan_participations (id, plan_id, user_id, started_at,
             current_week, completed_at, version)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                participation.id.to_string(),
                participation.plan_id.to_string(),
                participation.user_id.to_string(),
                participation.started_at.to_rfc3339(),
                participation.current_week,
                participation.completed_at.map(|dt| dt.to_rfc3339()),
                participation.version,
            ],
        )?;

        Ok(())
    }

    /// Whether the user has this plan in progress.
    pub fn has_active_participation(&self, user_id: Uuid, plan_id: Uuid) -> rusqlite::Result<bool> {
        let mut stmt = self.conn.prepare(
            "SELECT id FROM plan_participations
             WHERE user_id = ?1 AND plan_id = ?2 AND completed_at IS NULL",
        )?;
        stmt.exists(params![user_id.to_string(), plan_id.to_string()])
    }

    /// In-progress participations for a user, with their plans.
    pub fn active_participations_for_user(
        &self,
        user_id: Uuid,
    ) -> rusqlite::Result<Vec<(PlanParticipation, TrainingPlan)>> {
        let mut stmt = self.conn.prepare(
            "SELECT pp.id, pp.plan_id, pp.user_id, pp.started_at, pp.current_week,
             pp.completed_at, pp.version,
             tp.id, tp.name, tp.description, tp.goal_type, tp.difficulty,
             tp.total_weeks, tp.total_runs, tp.created_at
             FROM plan_participations pp
             JOIN training_plans tp ON tp.id = pp.plan_id
             WHERE pp.user_id = ?1 AND pp.completed_at IS NULL",
        )?;

        let rows = stmt.query_map(params![user_id.to_string()], parse_joined_row)?;
        rows.collect()
    }

    /// All participations for a user, with their plans.
    pub fn participations_for_user(
        &self,
        user_id: Uuid,
    ) -> rusqlite::Result<Vec<(PlanParticipation, TrainingPlan)>> {
        let mut stmt = self.conn.prepare(
            "SELECT pp.id, pp.plan_id, pp.user_id, pp.started_at, pp.current_week,
             pp.completed_at, pp.version,
             tp.id, tp.name, tp.description, tp.goal_type, tp.difficulty,
             tp.total_weeks, tp.total_runs, tp.created_at
             FROM plan_participations pp
             JOIN training_plans tp ON tp.id = pp.plan_id
             WHERE pp.user_id = ?1
             ORDER BY pp.started_at ASC",
        )?;

        let rows = stmt.query_map(params![user_id.to_string()], parse_joined_row)?;
        rows.collect()
    }

    /// Persist participation progress guarded by the version the caller read.
    /// Returns false on a conflicting concurrent write.
    pub fn update_participation(
        &self,
        participation: &PlanParticipation,
    ) -> rusqlite::Result<bool> {
        let updated = self.conn.execute(
            "UPDATE plan_participations SET current_week = ?2, completed_at = ?3,
             version = version + 1
             WHERE id = ?1 AND version = ?4",
            params![
                participation.id.to_string(),
                participation.current_week,
                participation.completed_at.map(|dt| dt.to_rfc3339()),
                participation.version,
            ],
        )?;

        Ok(updated > 0)
    }
}

/// Parse a database row into a TrainingPlan.
fn parse_plan_row(row: &rusqlite::Row) -> rusqlite::Result<TrainingPlan> {
    parse_plan_at(row, 0)
}

/// Parse a TrainingPlan starting at a column offset (for JOIN queries).
fn parse_plan_at(row: &rusqlite::Row, offset: usize) -> rusqlite::Result<TrainingPlan> {
    let id_str: String = row.get(offset)?;
    let goal_str: String = row.get(offset + 3)?;
    let difficulty_str: String = row.get(offset + 4)?;
    let created_str: String = row.get(offset + 7)?;

    let goal_type = GoalType::from_str(&goal_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            offset + 3,
            rusqlite::types::Type::Text,
            format!("unknown goal type: {}", goal_str).into(),
        )
    })?;
    let difficulty = PlanDifficulty::from_str(&difficulty_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            offset + 4,
            rusqlite::types::Type::Text,
            format!("unknown difficulty: {}", difficulty_str).into(),
        )
    })?;

    Ok(TrainingPlan {
        id: parse_uuid(&id_str)?,
        name: row.get(offset + 1)?,
        description: row.get(offset + 2)?,
        goal_type,
        difficulty,
        total_weeks: row.get(offset + 5)?,
        total_runs: row.get(offset + 6)?,
        created_at: parse_timestamp(&created_str)?,
    })
}

/// Parse a database row into a PlanWeek.
fn parse_week_row(row: &rusqlite::Row) -> rusqlite::Result<PlanWeek> {
    let plan_id_str: String = row.get(0)?;
    Ok(PlanWeek {
        plan_id: parse_uuid(&plan_id_str)?,
        week_number: row.get(1)?,
        target_distance_km: row.get(2)?,
        target_runs: row.get(3)?,
        description: row.get(4)?,
    })
}

/// Parse a database row into a PlanParticipation.
fn parse_participation_row(row: &rusqlite::Row) -> rusqlite::Result<PlanParticipation> {
    let id_str: String = row.get(0)?;
    let plan_id_str: String = row.get(1)?;
    let user_id_str: String = row.get(2)?;
    let started_str: String = row.get(3)?;
    let completed_str: Option<String> = row.get(5)?;

    Ok(PlanParticipation {
        id: parse_uuid(&id_str)?,
        plan_id: parse_uuid(&plan_id_str)?,
        user_id: parse_uuid(&user_id_str)?,
        started_at: parse_timestamp(&started_str)?,
        current_week: row.get(4)?,
        completed_at: completed_str.as_deref().map(parse_timestamp).transpose()?,
        version: row.get(6)?,
    })
}

/// Parse a participation JOIN plan row.
fn parse_joined_row(row: &rusqlite::Row) -> rusqlite::Result<(PlanParticipation, TrainingPlan)> {
    let participation = parse_participation_row(row)?;
    let plan = parse_plan_at(row, 7)?;
    Ok((participation, plan))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Database;
    use crate::users::{User, UserStore};
    use chrono::Utc;

    fn test_plan(name: &str, difficulty: PlanDifficulty, total_weeks: u32) -> TrainingPlan {
        TrainingPlan {
            id: Uuid::new_v4(),
            name: name.to_string(),
            description: None,
            goal_type: GoalType::FiveK,
            difficulty,
            total_weeks,
            total_runs: total_weeks * 3,
            created_at: Utc::now(),
        }
    }

    fn test_weeks(plan: &TrainingPlan) -> Vec<PlanWeek> {
        (1..=plan.total_weeks)
            .map(|w| PlanWeek {
                plan_id: plan.id,
                week_number: w,
                target_distance_km: Some(8.0 + w as f64 * 1.5),
                target_runs: Some(3),
                description: None,
            })
            .collect()
    }

    fn seed_user(db: &Database) -> User {
        let user = User::new("runner".to_string());
        UserStore::new(db.connection()).insert(&user).unwrap();
        user
    }

    #[test]
    fn test_insert_plan_with_schedule() {
        let db = Database::open_in_memory().unwrap();
        let store = PlanStore::new(db.connection());

        let plan = test_plan("5K Beginner", PlanDifficulty::Beginner, 8);
        store.insert_plan(&plan, &test_weeks(&plan)).unwrap();

        let loaded = store.get_plan(plan.id).unwrap().expect("Plan not found");
        assert_eq!(loaded.name, "5K Beginner");
        assert_eq!(loaded.total_weeks, 8);

        let weeks = store.weeks_for_plan(plan.id).unwrap();
        assert_eq!(weeks.len(), 8);
        assert_eq!(weeks[0].week_number, 1);
        assert_eq!(weeks[7].week_number, 8);
    }

    #[test]
    fn test_list_plans_filters() {
        let db = Database::open_in_memory().unwrap();
        let store = PlanStore::new(db.connection());

        let beginner = test_plan("5K Beginner", PlanDifficulty::Beginner, 8);
        let advanced = test_plan("5K Advanced", PlanDifficulty::Advanced, 6);
        store.insert_plan(&beginner, &[]).unwrap();
        store.insert_plan(&advanced, &[]).unwrap();

        assert_eq!(store.list_plans(None, None).unwrap().len(), 2);
        assert_eq!(
            store
                .list_plans(None, Some(PlanDifficulty::Beginner))
                .unwrap()
                .len(),
            1
        );
        assert_eq!(
            store
                .list_plans(Some(GoalType::HalfMarathon), None)
                .unwrap()
                .len(),
            0
        );
    }

    #[test]
    fn test_weeks_for_plans_batches() {
        let db = Database::open_in_memory().unwrap();
        let store = PlanStore::new(db.connection());

        let first = test_plan("A", PlanDifficulty::Beginner, 2);
        let second = test_plan("B", PlanDifficulty::Beginner, 3);
        store.insert_plan(&first, &test_weeks(&first)).unwrap();
        store.insert_plan(&second, &test_weeks(&second)).unwrap();

        let weeks = store.weeks_for_plans(&[first.id, second.id]).unwrap();
        assert_eq!(weeks.len(), 5);
        assert!(store.weeks_for_plans(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_participation_round_trip_and_conflict() {
        let db = Database::open_in_memory().unwrap();
        let store = PlanStore::new(db.connection());
        let user = seed_user(&db);

        let plan = test_plan("5K Beginner", PlanDifficulty::Beginner, 8);
        store.insert_plan(&plan, &test_weeks(&plan)).unwrap();

        let participation = PlanParticipation::new(plan.id, user.id);
        store.insert_participation(&participation).unwrap();
        assert!(store.has_active_participation(user.id, plan.id).unwrap());

        let active = store.active_participations_for_user(user.id).unwrap();
        assert_eq!(active.len(), 1);

        let (mut loaded, loaded_plan) = active.into_iter().next().unwrap();
        assert_eq!(loaded_plan.id, plan.id);

        loaded.advance_week();
        assert!(store.update_participation(&loaded).unwrap());
        // Stale version
        assert!(!store.update_participation(&loaded).unwrap());

        let all = store.participations_for_user(user.id).unwrap();
        assert_eq!(all[0].0.current_week, 2);
        assert_eq!(all[0].0.version, 1);
    }

    #[test]
    fn test_completed_participation_not_active() {
        let db = Database::open_in_memory().unwrap();
        let store = PlanStore::new(db.connection());
        let user = seed_user(&db);

        let plan = test_plan("5K Beginner", PlanDifficulty::Beginner, 8);
        store.insert_plan(&plan, &[]).unwrap();

        let mut participation = PlanParticipation::new(plan.id, user.id);
        store.insert_participation(&participation).unwrap();

        participation.complete();
        store.update_participation(&participation).unwrap();

        assert!(store.active_participations_for_user(user.id).unwrap().is_empty());
        assert!(!store.has_active_participation(user.id, plan.id).unwrap());
    }
}
