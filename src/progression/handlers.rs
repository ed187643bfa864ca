//! Progression handlers.
//!
//! Each handler applies one kind of derived update for one event, in its own
//! transaction, fully isolated from the other handlers for the same event.
//! Errors carry an explicit retry classification: not-found is logged and
//! skipped, transient failures are retried by the dispatcher, invariant
//! violations surface immediately.

use chrono::Duration;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use super::events::{ActivityEvent, EventKind};
use crate::activities::ActivityStore;
use crate::challenges::{ChallengeStore, ChallengeType};
use crate::plans::{PlanStore, PlanWeek};
use crate::storage::{Database, DatabaseError};
use crate::users::UserStore;

/// Handler failure with an explicit retry classification.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    /// Referenced row vanished before the handler ran: log and skip.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Infrastructure hiccup (lock conflict, busy database): retry.
    #[error("Transient failure: {0}")]
    Transient(String),

    /// Programming or invariant violation: surface, never retry.
    #[error("Invariant violation: {0}")]
    Invariant(String),
}

impl HandlerError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, HandlerError::Transient(_))
    }
}

impl From<rusqlite::Error> for HandlerError {
    fn from(e: rusqlite::Error) -> Self {
        match &e {
            rusqlite::Error::SqliteFailure(failure, _)
                if matches!(
                    failure.code,
                    rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
                ) =>
            {
                HandlerError::Transient(e.to_string())
            }
            _ => HandlerError::Invariant(e.to_string()),
        }
    }
}

impl From<DatabaseError> for HandlerError {
    fn from(e: DatabaseError) -> Self {
        match e {
            DatabaseError::TransactionFailed(msg) => HandlerError::Transient(msg),
            other => HandlerError::Invariant(other.to_string()),
        }
    }
}

/// An async unit of work applying one kind of derived update per event.
pub trait ProgressionHandler: Send + Sync {
    /// Stable name used in logs.
    fn name(&self) -> &'static str;

    /// Which event kinds this handler consumes.
    fn accepts(&self, kind: EventKind) -> bool;

    /// Apply the update in a fresh transaction on the given database.
    fn handle(&self, db: &mut Database, event: &ActivityEvent) -> Result<(), HandlerError>;
}

/// The standard handler set, in registration order.
pub fn default_handlers() -> Vec<Arc<dyn ProgressionHandler>> {
    vec![
        Arc::new(LevelUpdateHandler),
        Arc::new(ChallengeProgressHandler),
        Arc::new(PlanProgressHandler),
    ]
}

/// Applies the signed distance delta to the user's cumulative total and
/// recomputes the level.
pub struct LevelUpdateHandler;

impl ProgressionHandler for LevelUpdateHandler {
    fn name(&self) -> &'static str {
        "level_update"
    }

    fn accepts(&self, _kind: EventKind) -> bool {
        true
    }

    fn handle(&self, db: &mut Database, event: &ActivityEvent) -> Result<(), HandlerError> {
        let user_id = event.user_id();
        let delta_km = event.distance_delta();

        let tx = db.transaction()?;
        let users = UserStore::new(&tx);

        let mut user = users
            .get(user_id)?
            .ok_or_else(|| HandlerError::NotFound(format!("user {}", user_id)))?;

        user.add_distance(delta_km);
        user.update_level();

        if !users.update_progression(&user)? {
            return Err(HandlerError::Transient(format!(
                "version conflict on user {}",
                user_id
            )));
        }

        tx.commit()?;

        tracing::info!(
            "Level update applied: user_id={}, delta_km={:.2}, new_level={}, total_km={:.2}",
            user_id,
            delta_km,
            user.level,
            user.total_distance_km
        );

        Ok(())
    }
}

/// Advances progress on every active participation whose challenge window
/// contains the activity date.
pub struct ChallengeProgressHandler;

impl ProgressionHandler for ChallengeProgressHandler {
    fn name(&self) -> &'static str {
        "challenge_progress"
    }

    fn accepts(&self, kind: EventKind) -> bool {
        kind == EventKind::Created
    }

    fn handle(&self, db: &mut Database, event: &ActivityEvent) -> Result<(), HandlerError> {
        let ActivityEvent::Created {
            user_id,
            distance_km,
            started_at,
            ..
        } = event
        else {
            return Ok(());
        };
        let activity_date = started_at.date_naive();

        let tx = db.transaction()?;
        let store = ChallengeStore::new(&tx);

        let participations = store.active_participations_for_user(*user_id)?;
        let mut updated = 0;

        for (mut participation, challenge) in participations {
            if !challenge.is_active(activity_date) {
                continue;
            }

            match challenge.challenge_type {
                ChallengeType::Distance => participation.add_distance(*distance_km),
                ChallengeType::Count => participation.add_count(),
            }

            if participation.goal_achieved(&challenge) {
                participation.complete();
                tracing::info!(
                    "Challenge completed: user_id={}, challenge_id={}",
                    user_id,
                    challenge.id
                );
            }

            if !store.update_participation(&participation)? {
                return Err(HandlerError::Transient(format!(
                    "version conflict on participation {}",
                    participation.id
                )));
            }
            updated += 1;
        }

        tx.commit()?;

        tracing::debug!(
            "Challenge progress applied: user_id={}, updated_count={}",
            user_id,
            updated
        );

        Ok(())
    }
}

/// Checks the tracked week of every in-progress plan and advances it when
/// the week's targets are met.
pub struct PlanProgressHandler;

impl ProgressionHandler for PlanProgressHandler {
    fn name(&self) -> &'static str {
        "plan_progress"
    }

    fn accepts(&self, kind: EventKind) -> bool {
        kind == EventKind::Created
    }

    fn handle(&self, db: &mut Database, event: &ActivityEvent) -> Result<(), HandlerError> {
        let ActivityEvent::Created {
            user_id,
            started_at,
            ..
        } = event
        else {
            return Ok(());
        };
        let activity_date = started_at.date_naive();

        let tx = db.transaction()?;
        let plans = PlanStore::new(&tx);
        let activities = ActivityStore::new(&tx);

        let active = plans.active_participations_for_user(*user_id)?;
        if active.is_empty() {
            return Ok(());
        }

        // One schedule query for all active plans
        let plan_ids: Vec<Uuid> = active.iter().map(|(_, plan)| plan.id).collect();
        let mut week_map: HashMap<Uuid, HashMap<u32, PlanWeek>> = HashMap::new();
        for week in plans.weeks_for_plans(&plan_ids)? {
            week_map
                .entry(week.plan_id)
                .or_default()
                .insert(week.week_number, week);
        }

        for (mut participation, plan) in active {
            let plan_start = participation.started_at;
            let elapsed_week =
                (activity_date - plan_start.date_naive()).num_days() / 7 + 1;

            // An activity outside the tracked week does not advance it
            if elapsed_week != participation.current_week as i64 {
                continue;
            }
            if elapsed_week > plan.total_weeks as i64 {
                continue;
            }

            let Some(week) = week_map
                .get(&plan.id)
                .and_then(|weeks| weeks.get(&participation.current_week))
            else {
                continue;
            };

            let week_start = plan_start + Duration::weeks(elapsed_week - 1);
            let week_end = week_start + Duration::weeks(1);
            let week_distance_km =
                activities.sum_distance_in_range(*user_id, week_start, week_end)?;
            let week_runs = activities.count_in_range(*user_id, week_start, week_end)?;

            let distance_ok = week
                .target_distance_km
                .map_or(true, |target| week_distance_km >= target);
            let runs_ok = week.target_runs.map_or(true, |target| week_runs >= target);

            if distance_ok && runs_ok {
                if participation.current_week >= plan.total_weeks {
                    participation.complete();
                    tracing::info!(
                        "Plan completed: user_id={}, plan_id={}",
                        user_id,
                        plan.id
                    );
                } else {
                    participation.advance_week();
                    tracing::info!(
                        "Plan week advanced: user_id={}, plan_id={}, new_week={}",
                        user_id,
                        plan.id,
                        participation.current_week
                    );
                }

                if !plans.update_participation(&participation)? {
                    return Err(HandlerError::Transient(format!(
                        "version conflict on participation {}",
                        participation.id
                    )));
                }
            }
        }

        tx.commit()?;

        Ok(())
    }
}
