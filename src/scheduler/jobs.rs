//! The two standing maintenance jobs: challenge expiry and stats rollover.

use chrono::{Datelike, Days, NaiveTime, Utc, Weekday};
use std::sync::Arc;

use super::{BatchJob, JobError, Schedule};
use crate::activities::ActivityStore;
use crate::cache::{Cache, ACTIVITY_STATS_CACHE, ACTIVITY_SUMMARY_CACHE};
use crate::challenges::ChallengeStore;
use crate::storage::config::JobSettings;
use crate::storage::Database;

/// Daily job transitioning still-active participations of ended challenges
/// to the expired state. Completed participations are never touched.
pub struct ChallengeExpiryJob {
    schedule: Schedule,
}

impl ChallengeExpiryJob {
    pub fn new(settings: &JobSettings) -> Self {
        Self {
            schedule: Schedule::DailyAt {
                hour: settings.expiry_hour,
                minute: settings.expiry_minute,
            },
        }
    }
}

impl BatchJob for ChallengeExpiryJob {
    fn name(&self) -> &'static str {
        "challenge_expiry"
    }

    fn schedule(&self) -> Schedule {
        self.schedule
    }

    fn run(&self, db: &mut Database) -> Result<(), JobError> {
        tracing::info!("Challenge expiry started");

        let yesterday = Utc::now().date_naive() - Days::new(1);

        let tx = db.transaction()?;
        let store = ChallengeStore::new(&tx);

        let ended = store.ending_before(yesterday)?;
        let mut expired_count = 0;

        for challenge in &ended {
            for mut participation in store.active_participations_for_challenge(challenge.id)? {
                participation.expire();
                if store.update_participation(&participation)? {
                    expired_count += 1;
                } else {
                    // Concurrent progress write; tomorrow's run picks it up
                    tracing::debug!(
                        "Skipped conflicting participation {}",
                        participation.id
                    );
                }
            }
        }

        tx.commit()?;

        tracing::info!(
            "Challenge expiry finished: ended_challenges={}, expired_participants={}",
            ended.len(),
            expired_count
        );

        Ok(())
    }
}

/// Weekly job logging last week's aggregate statistics and invalidating the
/// time-bucketed read caches so subsequent reads recompute.
pub struct StatsRolloverJob {
    cache: Arc<dyn Cache>,
    schedule: Schedule,
}

impl StatsRolloverJob {
    pub fn new(cache: Arc<dyn Cache>, settings: &JobSettings) -> Self {
        Self {
            cache,
            schedule: Schedule::WeeklyAt {
                weekday: Weekday::Mon,
                hour: settings.rollover_hour,
                minute: settings.rollover_minute,
            },
        }
    }
}

impl BatchJob for StatsRolloverJob {
    fn name(&self) -> &'static str {
        "stats_rollover"
    }

    fn schedule(&self) -> Schedule {
        self.schedule
    }

    fn run(&self, db: &mut Database) -> Result<(), JobError> {
        tracing::info!("Weekly stats rollover started");

        // Last week, Monday 00:00 to Monday 00:00
        let today = Utc::now().date_naive();
        let this_monday = today - Days::new(today.weekday().num_days_from_monday() as u64);
        let last_monday = this_monday - Days::new(7);
        let week_start = last_monday.and_time(NaiveTime::MIN).and_utc();
        let week_end = this_monday.and_time(NaiveTime::MIN).and_utc();

        let store = ActivityStore::new(db.connection());
        let total_runs = store.count_all_in_range(week_start, week_end)?;
        let total_distance_km = store.sum_distance_all_in_range(week_start, week_end)?;

        tracing::info!(
            "Last week: period={} ~ {}, total_runs={}, total_distance={:.1}km",
            last_monday,
            this_monday,
            total_runs,
            total_distance_km
        );

        // Per-bucket isolation: one failed eviction must not stop the rest
        for bucket in [ACTIVITY_SUMMARY_CACHE, ACTIVITY_STATS_CACHE] {
            match self.cache.clear(bucket) {
                Ok(()) => tracing::debug!("Cache cleared: {}", bucket),
                Err(e) => tracing::warn!("Cache clear failed: {}: {}", bucket, e),
            }
        }

        tracing::info!("Weekly stats rollover finished");

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheError, MemoryCache};
    use crate::challenges::{
        Challenge, ChallengeParticipation, ChallengeType, ParticipationStatus,
    };
    use crate::users::{User, UserStore};
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};
    use uuid::Uuid;

    fn seed_user(db: &Database) -> User {
        let user = User::new("runner".to_string());
        UserStore::new(db.connection()).insert(&user).unwrap();
        user
    }

    fn seed_challenge_ended_days_ago(db: &Database, days: u64) -> Challenge {
        let today = Utc::now().date_naive();
        let challenge = Challenge {
            id: Uuid::new_v4(),
            name: "Ended".to_string(),
            description: None,
            challenge_type: ChallengeType::Distance,
            target_distance_km: Some(50.0),
            target_count: None,
            start_date: today - Days::new(days + 30),
            end_date: today - Days::new(days),
            recommended_min_level: None,
            created_at: Utc::now(),
        };
        ChallengeStore::new(db.connection())
            .insert_challenge(&challenge)
            .unwrap();
        challenge
    }

    #[test]
    fn test_expiry_touches_only_active_participations() {
        let mut db = Database::open_in_memory().unwrap();
        let challenge = seed_challenge_ended_days_ago(&db, 2);

        let active_user = seed_user(&db);
        let completed_user = seed_user(&db);

        let active = ChallengeParticipation::new(challenge.id, active_user.id);
        let mut completed = ChallengeParticipation::new(challenge.id, completed_user.id);
        completed.add_distance(55.0);
        completed.complete();

        let store = ChallengeStore::new(db.connection());
        store.insert_participation(&active).unwrap();
        store.insert_participation(&completed).unwrap();

        ChallengeExpiryJob::new(&JobSettings::default())
            .run(&mut db)
            .unwrap();

        let store = ChallengeStore::new(db.connection());
        let (active_after, _) = store
            .get_participation(active_user.id, challenge.id)
            .unwrap()
            .unwrap();
        let (completed_after, _) = store
            .get_participation(completed_user.id, challenge.id)
            .unwrap()
            .unwrap();

        assert_eq!(active_after.status, ParticipationStatus::Expired);
        assert_eq!(completed_after.status, ParticipationStatus::Completed);
        assert!(completed_after.completed_at.is_some());
    }

    #[test]
    fn test_expiry_ignores_challenge_ended_yesterday() {
        let mut db = Database::open_in_memory().unwrap();
        // End date is yesterday: not yet before yesterday
        let challenge = seed_challenge_ended_days_ago(&db, 1);
        let user = seed_user(&db);

        let participation = ChallengeParticipation::new(challenge.id, user.id);
        ChallengeStore::new(db.connection())
            .insert_participation(&participation)
            .unwrap();

        ChallengeExpiryJob::new(&JobSettings::default())
            .run(&mut db)
            .unwrap();

        let (after, _) = ChallengeStore::new(db.connection())
            .get_participation(user.id, challenge.id)
            .unwrap()
            .unwrap();
        assert_eq!(after.status, ParticipationStatus::Active);
    }

    #[test]
    fn test_rollover_clears_both_buckets() {
        let mut db = Database::open_in_memory().unwrap();
        let cache = Arc::new(MemoryCache::new());
        cache.put(ACTIVITY_SUMMARY_CACHE, "user-1", json!(1));
        cache.put(ACTIVITY_STATS_CACHE, "user-1_2025_6", json!(2));

        StatsRolloverJob::new(cache.clone(), &JobSettings::default())
            .run(&mut db)
            .unwrap();

        assert!(cache.is_empty(ACTIVITY_SUMMARY_CACHE));
        assert!(cache.is_empty(ACTIVITY_STATS_CACHE));
    }

    /// Fails clears on one bucket to prove per-bucket isolation.
    struct FailingBucketCache {
        inner: MemoryCache,
        failing: &'static str,
        clears: AtomicU32,
    }

    impl Cache for FailingBucketCache {
        fn get(&self, cache: &str, key: &str) -> Option<serde_json::Value> {
            self.inner.get(cache, key)
        }

        fn put(&self, cache: &str, key: &str, value: serde_json::Value) {
            self.inner.put(cache, key, value)
        }

        fn invalidate(&self, cache: &str, key: &str) {
            self.inner.invalidate(cache, key)
        }

        fn clear(&self, cache: &str) -> Result<(), CacheError> {
            self.clears.fetch_add(1, Ordering::SeqCst);
            if cache == self.failing {
                return Err(CacheError::Unavailable("simulated".to_string()));
            }
            self.inner.clear(cache)
        }
    }

    #[test]
    fn test_rollover_isolates_bucket_failures() {
        let mut db = Database::open_in_memory().unwrap();
        let cache = Arc::new(FailingBucketCache {
            inner: MemoryCache::new(),
            failing: ACTIVITY_SUMMARY_CACHE,
            clears: AtomicU32::new(0),
        });
        cache.inner.put(ACTIVITY_STATS_CACHE, "user-1_2025_6", json!(2));

        StatsRolloverJob::new(cache.clone(), &JobSettings::default())
            .run(&mut db)
            .unwrap();

        // The failing bucket did not stop the second eviction
        assert_eq!(cache.clears.load(Ordering::SeqCst), 2);
        assert!(cache.inner.is_empty(ACTIVITY_STATS_CACHE));
    }
}
