//! Activity persistence operations.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::types::{Activity, RoutePoint};
use crate::storage::{parse_timestamp, parse_uuid};

const ACTIVITY_COLUMNS: &str = "id, user_id, distance_km, duration_secs, average_pace_secs,
     calories, average_heart_rate, cadence, route_json, started_at, memo, created_at";

/// Activity store for a database connection or transaction.
pub struct ActivityStore<'a> {
    conn: &'a Connection,
}

impl<'a> ActivityStore<'a> {
    /// Create a new activity store with the given connection.
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Insert a new activity.
    pub fn insert(&self, activity: &Activity) -> rusqlite::Result<()> {
        self.conn.execute(
            "INSERT INTO activities (id, user_id, distance_km, duration_secs, average_pace_secs,
             calories, average_heart_rate, cadence, route_json, started_at, memo, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                activity.id.to_string(),
                activity.user_id.to_string(),
                activity.distance_km,
                activity.duration_secs,
                activity.average_pace_secs,
                activity.calories,
                activity.average_heart_rate,
                activity.cadence,
                route_to_json(&activity.route)?,
                activity.started_at.to_rfc3339(),
                activity.memo,
                activity.created_at.to_rfc3339(),
            ],
        )?;

        Ok(())
    }

    /// Get an activity by ID.
    pub fn get(&self, id: Uuid) -> rusqlite::Result<Option<Activity>> {
        self.conn
            .query_row(
                &format!("SELECT {ACTIVITY_COLUMNS} FROM activities WHERE id = ?1"),
                params![id.to_string()],
                parse_activity_row,
            )
            .optional()
    }

    /// Update an existing activity.
    pub fn update(&self, activity: &Activity) -> rusqlite::Result<()> {
        self.conn.execute(
            "UPDATE activities SET distance_km = ?2, duration_secs = ?3, average_pace_secs = ?4,
             calories = ?5, average_heart_rate = ?6, cadence = ?7, route_json = ?8,
             started_at = ?9, memo = ?10
             WHERE id = ?1",
            params![
                activity.id.to_string(),
                activity.distance_km,
                activity.duration_secs,
                activity.average_pace_secs,
                activity.calories,
                activity.average_heart_rate,
                activity.cadence,
                route_to_json(&activity.route)?,
                activity.started_at.to_rfc3339(),
                activity.memo,
            ],
        )?;

        Ok(())
    }

    /// Delete an activity by ID.
    pub fn delete(&self, id: Uuid) -> rusqlite::Result<()> {
        self.conn
            .execute("DELETE FROM activities WHERE id = ?1", params![id.to_string()])?;
        Ok(())
    }

    /// List a user's activities, most recent first.
    pub fn list_for_user(
        &self,
        user_id: Uuid,
        limit: u32,
        offset: u32,
    ) -> rusqlite::Result<Vec<Activity>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {ACTIVITY_COLUMNS} FROM activities
             WHERE user_id = ?1 ORDER BY started_at DESC LIMIT ?2 OFFSET ?3"
        ))?;

        let rows = stmt.query_map(
            params![user_id.to_string(), limit, offset],
            parse_activity_row,
        )?;
        rows.collect()
    }

    /// Count all activities for a user.
    pub fn count_for_user(&self, user_id: Uuid) -> rusqlite::Result<u32> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM activities WHERE user_id = ?1",
            params![user_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count as u32)
    }

    /// Activities for a user with `start <= started_at < end`.
    pub fn in_range(
        &self,
        user_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> rusqlite::Result<Vec<Activity>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {ACTIVITY_COLUMNS} FROM activities
             WHERE user_id = ?1 AND started_at >= ?2 AND started_at < ?3
             ORDER BY started_at ASC"
        ))?;

        let rows = stmt.query_map(
            params![user_id.to_string(), start.to_rfc3339(), end.to_rfc3339()],
            parse_activity_row,
        )?;
        rows.collect()
    }

    /// Total distance for a user with `start <= started_at < end`.
    pub fn sum_distance_in_range(
        &self,
        user_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> rusqlite::Result<f64> {
        self.conn.query_row(
            "SELECT COALESCE(SUM(distance_km), 0) FROM activities
             WHERE user_id = ?1 AND started_at >= ?2 AND started_at < ?3",
            params![user_id.to_string(), start.to_rfc3339(), end.to_rfc3339()],
            |row| row.get(0),
        )
    }

    /// Run count for a user with `start <= started_at < end`.
    pub fn count_in_range(
        &self,
        user_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> rusqlite::Result<u32> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM activities
             WHERE user_id = ?1 AND started_at >= ?2 AND started_at < ?3",
            params![user_id.to_string(), start.to_rfc3339(), end.to_rfc3339()],
            |row| row.get(0),
        )?;
        Ok(count as u32)
    }

    /// Run count across all users in a window (stats rollover).
    pub fn count_all_in_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> rusqlite::Result<u32> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM activities WHERE started_at >= ?1 AND started_at < ?2",
            params![start.to_rfc3339(), end.to_rfc3339()],
            |row| row.get(0),
        )?;
        Ok(count as u32)
    }

    /// Total distance across all users in a window (stats rollover).
    pub fn sum_distance_all_in_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> rusqlite::Result<f64> {
        self.conn.query_row(
            "SELECT COALESCE(SUM(distance_km), 0) FROM activities
             WHERE started_at >= ?1 AND started_at < ?2",
            params![start.to_rfc3339(), end.to_rfc3339()],
            |row| row.get(0),
        )
    }
}

/// Serialize an optional route for storage.
fn route_to_json(route: &Option<Vec<RoutePoint>>) -> rusqlite::Result<Option<String>> {
    route
        .as_ref()
        .map(|points| {
            serde_json::to_string(points)
                .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))
        })
        .transpose()
}

/// Parse a database row into an Activity.
fn parse_activity_row(row: &rusqlite::Row) -> rusqlite::Result<Activity> {
    let id_str: String = row.get(0)?;
    let user_id_str: String = row.get(1)?;
    let route_json: Option<String> = row.get(8)?;
    let started_str: String = row.get(9)?;
    let created_str: String = row.get(11)?;

    let route = route_json
        .map(|json| {
            serde_json::from_str(&json).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(8, rusqlite::types::Type::Text, Box::new(e))
            })
        })
        .transpose()?;

    Ok(Activity {
        id: parse_uuid(&id_str)?,
        user_id: parse_uuid(&user_id_str)?,
        distance_km: row.get(2)?,
        duration_secs: row.get(3)?,
        average_pace_secs: row.get(4)?,
        calories: row.get(5)?,
        average_heart_rate: row.get(6)?,
        cadence: row.get(7)?,
        route,
        started_at: parse_timestamp(&started_str)?,
        memo: row.get(10)?,
        created_at: parse_timestamp(&created_str)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activities::types::ActivityRequest;
    use crate::storage::Database;
    use crate::users::{User, UserStore};
    use chrono::Duration;

    fn seed_user(db: &Database) -> User {
        let user = User::new("runner".to_string());
        UserStore::new(db.connection()).insert(&user).unwrap();
        user
    }

    fn request(distance_km: f64, started_at: DateTime<Utc>) -> ActivityRequest {
        ActivityRequest {
            distance_km,
            duration_secs: 1800,
            average_pace_secs: Some(360),
            calories: Some(350),
            average_heart_rate: Some(152),
            cadence: Some(176),
            route: None,
            started_at,
            memo: None,
        }
    }

    #[test]
    fn test_insert_and_get_activity() {
        let db = Database::open_in_memory().unwrap();
        let store = ActivityStore::new(db.connection());
        let user = seed_user(&db);

        let activity = Activity::from_request(user.id, request(5.2, Utc::now()));
        store.insert(&activity).unwrap();

        let loaded = store.get(activity.id).unwrap().expect("Activity not found");
        assert_eq!(loaded.distance_km, 5.2);
        assert_eq!(loaded.average_pace_secs, Some(360));
        assert_eq!(loaded.user_id, user.id);
    }

    #[test]
    fn test_route_round_trip() {
        let db = Database::open_in_memory().unwrap();
        let store = ActivityStore::new(db.connection());
        let user = seed_user(&db);

        let mut req = request(5.0, Utc::now());
        req.route = Some(vec![
            RoutePoint {
                lat: 37.5665,
                lng: 126.978,
                timestamp: None,
            },
            RoutePoint {
                lat: 37.5670,
                lng: 126.979,
                timestamp: None,
            },
        ]);

        let activity = Activity::from_request(user.id, req);
        store.insert(&activity).unwrap();

        let loaded = store.get(activity.id).unwrap().unwrap();
        let route = loaded.route.expect("Route missing");
        assert_eq!(route.len(), 2);
        assert_eq!(route[0].lat, 37.5665);
    }

    #[test]
    fn test_range_queries() {
        let db = Database::open_in_memory().unwrap();
        let store = ActivityStore::new(db.connection());
        let user = seed_user(&db);

        let base = Utc::now();
        for (days_ago, distance) in [(1i64, 5.0), (3, 7.5), (10, 10.0)] {
            let activity =
                Activity::from_request(user.id, request(distance, base - Duration::days(days_ago)));
            store.insert(&activity).unwrap();
        }

        let week_start = base - Duration::days(7);
        let sum = store.sum_distance_in_range(user.id, week_start, base).unwrap();
        assert!((sum - 12.5).abs() < 1e-9);
        assert_eq!(store.count_in_range(user.id, week_start, base).unwrap(), 2);
        assert_eq!(store.in_range(user.id, week_start, base).unwrap().len(), 2);
        assert_eq!(store.count_for_user(user.id).unwrap(), 3);
    }

    #[test]
    fn test_update_and_delete() {
        let db = Database::open_in_memory().unwrap();
        let store = ActivityStore::new(db.connection());
        let user = seed_user(&db);

        let mut activity = Activity::from_request(user.id, request(5.0, Utc::now()));
        store.insert(&activity).unwrap();

        activity.apply(request(8.0, activity.started_at));
        store.update(&activity).unwrap();
        assert_eq!(store.get(activity.id).unwrap().unwrap().distance_km, 8.0);

        store.delete(activity.id).unwrap();
        assert!(store.get(activity.id).unwrap().is_none());
    }

    #[test]
    fn test_list_orders_most_recent_first() {
        let db = Database::open_in_memory().unwrap();
        let store = ActivityStore::new(db.connection());
        let user = seed_user(&db);

        let base = Utc::now();
        let old = Activity::from_request(user.id, request(3.0, base - Duration::days(2)));
        let new = Activity::from_request(user.id, request(4.0, base));
        store.insert(&old).unwrap();
        store.insert(&new).unwrap();

        let listed = store.list_for_user(user.id, 10, 0).unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, new.id);
        assert_eq!(listed[1].id, old.id);
    }
}
