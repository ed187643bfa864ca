//! Activity recording and read-side statistics.
//!
//! Writes commit the activity row and its outbox event in one transaction,
//! then evict the per-user caches and nudge the dispatcher. The caller never
//! waits on (or observes) the downstream progression handlers.

use chrono::{DateTime, Datelike, Days, Months, NaiveDate, NaiveTime, Utc};
use std::sync::Arc;
use tokio::sync::{Mutex, Notify};
use uuid::Uuid;

use super::store::ActivityStore;
use super::types::{Activity, ActivityRequest, ActivityStats, ActivitySummary, PeriodSummary};
use crate::cache::{Cache, ACTIVITY_STATS_CACHE, ACTIVITY_SUMMARY_CACHE};
use crate::progression::events::ActivityEvent;
use crate::progression::outbox::OutboxStore;
use crate::storage::{Database, DatabaseError};
use crate::users::UserStore;

/// Activity manager: the pipeline's inbound interface.
pub struct ActivityManager {
    db: Arc<Mutex<Database>>,
    cache: Arc<dyn Cache>,
    dispatch: Arc<Notify>,
}

impl ActivityManager {
    /// Create a new activity manager.
    ///
    /// `dispatch` is the dispatcher's trigger handle; it is notified after
    /// every committed write so staged events are picked up immediately.
    pub fn new(db: Arc<Mutex<Database>>, cache: Arc<dyn Cache>, dispatch: Arc<Notify>) -> Self {
        Self {
            db,
            cache,
            dispatch,
        }
    }

    /// Record a new activity.
    pub async fn create(
        &self,
        user_id: Uuid,
        request: ActivityRequest,
    ) -> Result<Activity, ActivityError> {
        let activity = Activity::from_request(user_id, request);

        {
            let mut db = self.db.lock().await;
            let tx = db.transaction()?;

            UserStore::new(&tx)
                .get(user_id)?
                .ok_or(ActivityError::UserNotFound(user_id))?;

            ActivityStore::new(&tx).insert(&activity)?;
            OutboxStore::new(&tx).stage(&ActivityEvent::Created {
                user_id,
                activity_id: activity.id,
                distance_km: activity.distance_km,
                started_at: activity.started_at,
            })?;

            tx.commit()?;
        }

        self.evict_user_caches(user_id);
        self.dispatch.notify_one();

        Ok(activity)
    }

    /// Update an activity. An event is staged only when the distance changed.
    pub async fn update(
        &self,
        user_id: Uuid,
        activity_id: Uuid,
        request: ActivityRequest,
    ) -> Result<Activity, ActivityError> {
        let activity = {
            let mut db = self.db.lock().await;
            let tx = db.transaction()?;

            let store = ActivityStore::new(&tx);
            let mut activity = store
                .get(activity_id)?
                .filter(|a| a.user_id == user_id)
                .ok_or(ActivityError::NotFound(activity_id))?;

            let old_distance_km = activity.distance_km;
            activity.apply(request);
            store.update(&activity)?;

            if old_distance_km != activity.distance_km {
                OutboxStore::new(&tx).stage(&ActivityEvent::Updated {
                    user_id,
                    activity_id,
                    old_distance_km,
                    new_distance_km: activity.distance_km,
                    started_at: activity.started_at,
                })?;
            }

            tx.commit()?;
            activity
        };

        self.evict_user_caches(user_id);
        self.dispatch.notify_one();

        Ok(activity)
    }

    /// Delete an activity. The deletion event is staged in the deleting
    /// transaction so the two commit or roll back together.
    pub async fn delete(&self, user_id: Uuid, activity_id: Uuid) -> Result<(), ActivityError> {
        {
            let mut db = self.db.lock().await;
            let tx = db.transaction()?;

            let store = ActivityStore::new(&tx);
            let activity = store
                .get(activity_id)?
                .filter(|a| a.user_id == user_id)
                .ok_or(ActivityError::NotFound(activity_id))?;

            OutboxStore::new(&tx).stage(&ActivityEvent::Deleted {
                user_id,
                activity_id,
                distance_km: activity.distance_km,
                started_at: activity.started_at,
            })?;
            store.delete(activity_id)?;

            tx.commit()?;
        }

        self.evict_user_caches(user_id);
        self.dispatch.notify_one();

        Ok(())
    }

    /// Get one activity. Another user's activity reads as not found.
    pub async fn get(&self, user_id: Uuid, activity_id: Uuid) -> Result<Activity, ActivityError> {
        let db = self.db.lock().await;
        ActivityStore::new(db.connection())
            .get(activity_id)?
            .filter(|a| a.user_id == user_id)
            .ok_or(ActivityError::NotFound(activity_id))
    }

    /// List a user's activities, most recent first.
    pub async fn list(
        &self,
        user_id: Uuid,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Activity>, ActivityError> {
        let db = self.db.lock().await;
        let activities = ActivityStore::new(db.connection()).list_for_user(user_id, limit, offset)?;
        Ok(activities)
    }

    /// Aggregate statistics. With a year and month the window is that month
    /// (memoized); with only a year, that year; with neither, lifetime totals
    /// from the user's cumulative distance.
    pub async fn stats(
        &self,
        user_id: Uuid,
        year: Option<i32>,
        month: Option<u32>,
    ) -> Result<ActivityStats, ActivityError> {
        let cache_key = match (year, month) {
            (Some(y), Some(m)) => Some(format!("{}_{}_{}", user_id, y, m)),
            _ => None,
        };

        if let Some(key) = &cache_key {
            if let Some(value) = self.cache.get(ACTIVITY_STATS_CACHE, key) {
                if let Ok(stats) = serde_json::from_value(value) {
                    return Ok(stats);
                }
            }
        }

        let stats = {
            let db = self.db.lock().await;
            let user = UserStore::new(db.connection())
                .get(user_id)?
                .ok_or(ActivityError::UserNotFound(user_id))?;
            let store = ActivityStore::new(db.connection());

            match (year, month) {
                (Some(y), Some(m)) => {
                    let start =
                        NaiveDate::from_ymd_opt(y, m, 1).ok_or(ActivityError::InvalidPeriod)?;
                    let end = start + Months::new(1);
                    window_stats(&store, user_id, day_start(start), day_start(end))?
                }
                (Some(y), None) => {
                    let start =
                        NaiveDate::from_ymd_opt(y, 1, 1).ok_or(ActivityError::InvalidPeriod)?;
                    let end = start + Months::new(12);
                    window_stats(&store, user_id, day_start(start), day_start(end))?
                }
                _ => ActivityStats {
                    total_distance_km: user.total_distance_km,
                    total_count: store.count_for_user(user_id)?,
                    total_duration_secs: None,
                    average_pace_secs: None,
                },
            }
        };

        if let Some(key) = &cache_key {
            if let Ok(value) = serde_json::to_value(&stats) {
                self.cache.put(ACTIVITY_STATS_CACHE, key, value);
            }
        }

        Ok(stats)
    }

    /// Weekly/monthly summary: this week (Monday start), this month, and
    /// last month. Memoized per user until the next write or rollover.
    pub async fn summary(&self, user_id: Uuid) -> Result<ActivitySummary, ActivityError> {
        let key = user_id.to_string();
        if let Some(value) = self.cache.get(ACTIVITY_SUMMARY_CACHE, &key) {
            if let Ok(summary) = serde_json::from_value(value) {
                return Ok(summary);
            }
        }

        let summary = {
            let db = self.db.lock().await;
            UserStore::new(db.connection())
                .get(user_id)?
                .ok_or(ActivityError::UserNotFound(user_id))?;
            let store = ActivityStore::new(db.connection());

            let today = Utc::now().date_naive();
            let week_start = today - Days::new(today.weekday().num_days_from_monday() as u64);
            let month_start = today.with_day(1).unwrap_or(today);
            let last_month_start = month_start - Months::new(1);

            ActivitySummary {
                this_week: period_summary(
                    &store,
                    user_id,
                    day_start(week_start),
                    day_start(week_start + Days::new(7)),
                )?,
                this_month: period_summary(
                    &store,
                    user_id,
                    day_start(month_start),
                    day_start(month_start + Months::new(1)),
                )?,
                last_month: period_summary(
                    &store,
                    user_id,
                    day_start(last_month_start),
                    day_start(month_start),
                )?,
            }
        };

        if let Ok(value) = serde_json::to_value(&summary) {
            self.cache.put(ACTIVITY_SUMMARY_CACHE, &key, value);
        }

        Ok(summary)
    }

    /// Evict the per-user read caches after a write.
    fn evict_user_caches(&self, user_id: Uuid) {
        self.cache
            .invalidate(ACTIVITY_SUMMARY_CACHE, &user_id.to_string());

        let today = Utc::now().date_naive();
        self.cache.invalidate(
            ACTIVITY_STATS_CACHE,
            &format!("{}_{}_{}", user_id, today.year(), today.month()),
        );
    }
}

/// Midnight UTC at the start of a date.
fn day_start(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

/// Compute window statistics from the activity rows in range.
fn window_stats(
    store: &ActivityStore,
    user_id: Uuid,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> rusqlite::Result<ActivityStats> {
    let activities = store.in_range(user_id, start, end)?;

    let total_distance_km: f64 = activities.iter().map(|a| a.distance_km).sum();
    let total_duration_secs: u32 = activities.iter().map(|a| a.duration_secs).sum();
    let paces: Vec<u32> = activities.iter().filter_map(|a| a.average_pace_secs).collect();
    let average_pace_secs = if paces.is_empty() {
        None
    } else {
        Some(paces.iter().sum::<u32>() / paces.len() as u32)
    };

    Ok(ActivityStats {
        total_distance_km,
        total_count: activities.len() as u32,
        total_duration_secs: Some(total_duration_secs),
        average_pace_secs,
    })
}

/// Compute a period summary from the activity rows in range.
fn period_summary(
    store: &ActivityStore,
    user_id: Uuid,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> rusqlite::Result<PeriodSummary> {
    let activities = store.in_range(user_id, start, end)?;

    let total_distance_km: f64 = activities.iter().map(|a| a.distance_km).sum();
    let total_duration_secs: u32 = activities.iter().map(|a| a.duration_secs).sum();
    let paces: Vec<u32> = activities.iter().filter_map(|a| a.average_pace_secs).collect();
    let average_pace_secs = if paces.is_empty() {
        None
    } else {
        Some(paces.iter().sum::<u32>() / paces.len() as u32)
    };

    Ok(PeriodSummary {
        total_distance_km,
        total_count: activities.len() as u32,
        total_duration_secs,
        average_pace_secs,
    })
}

/// Activity errors.
#[derive(Debug, thiserror::Error)]
pub enum ActivityError {
    #[error("Activity not found: {0}")]
    NotFound(Uuid),

    #[error("User not found: {0}")]
    UserNotFound(Uuid),

    #[error("Invalid statistics period")]
    InvalidPeriod,

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error(transparent)]
    Storage(#[from] DatabaseError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::users::User;

    struct Fixture {
        db: Arc<Mutex<Database>>,
        cache: Arc<MemoryCache>,
        manager: ActivityManager,
        user: User,
    }

    async fn setup() -> Fixture {
        let db = Arc::new(Mutex::new(Database::open_in_memory().unwrap()));
        let cache = Arc::new(MemoryCache::new());
        let manager = ActivityManager::new(db.clone(), cache.clone(), Arc::new(Notify::new()));

        let user = User::new("runner".to_string());
        {
            let guard = db.lock().await;
            UserStore::new(guard.connection()).insert(&user).unwrap();
        }

        Fixture {
            db,
            cache,
            manager,
            user,
        }
    }

    fn request(distance_km: f64) -> ActivityRequest {
        ActivityRequest {
            distance_km,
            duration_secs: 1800,
            average_pace_secs: Some(360),
            calories: None,
            average_heart_rate: None,
            cadence: None,
            route: None,
            started_at: Utc::now(),
            memo: None,
        }
    }

    #[tokio::test]
    async fn test_create_stages_event_in_outbox() {
        let fixture = setup().await;

        let activity = fixture
            .manager
            .create(fixture.user.id, request(6.0))
            .await
            .unwrap();

        let db = fixture.db.lock().await;
        let pending = OutboxStore::new(db.connection()).pending(10).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(
            pending[0].event,
            ActivityEvent::Created {
                user_id: fixture.user.id,
                activity_id: activity.id,
                distance_km: 6.0,
                started_at: activity.started_at,
            }
        );
    }

    #[tokio::test]
    async fn test_create_unknown_user_stages_nothing() {
        let fixture = setup().await;

        let result = fixture.manager.create(Uuid::new_v4(), request(6.0)).await;
        assert!(matches!(result, Err(ActivityError::UserNotFound(_))));

        let db = fixture.db.lock().await;
        assert_eq!(OutboxStore::new(db.connection()).count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_update_stages_event_only_on_distance_change() {
        let fixture = setup().await;

        let activity = fixture
            .manager
            .create(fixture.user.id, request(6.0))
            .await
            .unwrap();

        // Drain the creation event
        {
            let db = fixture.db.lock().await;
            let outbox = OutboxStore::new(db.connection());
            for staged in outbox.pending(10).unwrap() {
                outbox.delete(staged.id).unwrap();
            }
        }

        // Same distance: no event
        let mut same = request(6.0);
        same.memo = Some("felt great".to_string());
        fixture
            .manager
            .update(fixture.user.id, activity.id, same)
            .await
            .unwrap();
        {
            let db = fixture.db.lock().await;
            assert_eq!(OutboxStore::new(db.connection()).count().unwrap(), 0);
        }

        // Changed distance: delta event
        fixture
            .manager
            .update(fixture.user.id, activity.id, request(8.5))
            .await
            .unwrap();
        let db = fixture.db.lock().await;
        let pending = OutboxStore::new(db.connection()).pending(10).unwrap();
        assert_eq!(pending.len(), 1);
        match &pending[0].event {
            ActivityEvent::Updated {
                old_distance_km,
                new_distance_km,
                ..
            } => {
                assert_eq!(*old_distance_km, 6.0);
                assert_eq!(*new_distance_km, 8.5);
            }
            other => panic!("expected Updated event, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_foreign_activity_reads_as_not_found() {
        let fixture = setup().await;
        let activity = fixture
            .manager
            .create(fixture.user.id, request(6.0))
            .await
            .unwrap();

        let stranger = Uuid::new_v4();
        assert!(matches!(
            fixture.manager.get(stranger, activity.id).await,
            Err(ActivityError::NotFound(_))
        ));
        assert!(matches!(
            fixture.manager.delete(stranger, activity.id).await,
            Err(ActivityError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_stages_deletion_event() {
        let fixture = setup().await;
        let activity = fixture
            .manager
            .create(fixture.user.id, request(6.0))
            .await
            .unwrap();

        fixture
            .manager
            .delete(fixture.user.id, activity.id)
            .await
            .unwrap();

        let db = fixture.db.lock().await;
        let pending = OutboxStore::new(db.connection()).pending(10).unwrap();
        assert_eq!(pending.len(), 2);
        assert!(matches!(
            pending[1].event,
            ActivityEvent::Deleted { distance_km, .. } if distance_km == 6.0
        ));
        assert!(ActivityStore::new(db.connection())
            .get(activity.id)
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_summary_memoized_and_evicted_on_write() {
        let fixture = setup().await;
        fixture
            .manager
            .create(fixture.user.id, request(6.0))
            .await
            .unwrap();

        let first = fixture.manager.summary(fixture.user.id).await.unwrap();
        assert_eq!(first.this_week.total_count, 1);
        assert_eq!(fixture.cache.len(ACTIVITY_SUMMARY_CACHE), 1);

        // A new write evicts; the next summary sees both runs
        fixture
            .manager
            .create(fixture.user.id, request(4.0))
            .await
            .unwrap();
        let second = fixture.manager.summary(fixture.user.id).await.unwrap();
        assert_eq!(second.this_week.total_count, 2);
        assert!((second.this_week.total_distance_km - 10.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_lifetime_stats_use_cumulative_distance() {
        let fixture = setup().await;
        fixture
            .manager
            .create(fixture.user.id, request(6.0))
            .await
            .unwrap();

        // Lifetime totals come from the user's pipeline-maintained distance,
        // which no handler has updated yet
        let stats = fixture.manager.stats(fixture.user.id, None, None).await.unwrap();
        assert_eq!(stats.total_distance_km, 0.0);
        assert_eq!(stats.total_count, 1);
        assert_eq!(stats.total_duration_secs, None);
    }

    #[tokio::test]
    async fn test_monthly_stats_memoized() {
        let fixture = setup().await;
        fixture
            .manager
            .create(fixture.user.id, request(6.0))
            .await
            .unwrap();

        let today = Utc::now().date_naive();
        let stats = fixture
            .manager
            .stats(fixture.user.id, Some(today.year()), Some(today.month()))
            .await
            .unwrap();
        assert_eq!(stats.total_count, 1);
        assert_eq!(fixture.cache.len(ACTIVITY_STATS_CACHE), 1);
    }
}
