//! User persistence operations.

use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::types::User;
use crate::storage::{parse_timestamp, parse_uuid};

/// User store for a database connection or transaction.
pub struct UserStore<'a> {
    conn: &'a Connection,
}

impl<'a> UserStore<'a> {
    /// Create a new user store with the given connection.
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Insert a new user.
    pub fn insert(&self, user: &User) -> rusqlite::Result<()> {
        self.conn.execute(
            "INSERT INTO users (id, nickname, weight_kg, height_cm, level,
             total_distance_km, version, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                user.id.to_string(),
                user.nickname,
                user.weight_kg,
                user.height_cm,
                user.level,
                user.total_distance_km,
                user.version,
                user.created_at.to_rfc3339(),
                user.updated_at.to_rfc3339(),
            ],
        )?;

        Ok(())
    }

    /// Get a user by ID.
    pub fn get(&self, id: Uuid) -> rusqlite::Result<Option<User>> {
        self.conn
            .query_row(
                "SELECT id, nickname, weight_kg, height_cm, level,
                 total_distance_km, version, created_at, updated_at
                 FROM users WHERE id = ?1",
                params![id.to_string()],
                parse_user_row,
            )
            .optional()
    }

    /// Update profile fields (nickname, weight, height).
    pub fn update_profile(&self, user: &User) -> rusqlite::Result<()> {
        self.conn.execute(
            "UPDATE users SET nickname = ?2, weight_kg = ?3, height_cm = ?4, updated_at = ?5
             WHERE id = ?1",
            params![
                user.id.to_string(),
                user.nickname,
                user.weight_kg,
                user.height_cm,
                user.updated_at.to_rfc3339(),
            ],
        )?;

        Ok(())
    }

    /// Persist progression state (cumulative distance + level) guarded by the
    /// version the caller read. Returns false when another writer got there
    /// first; the caller retries with a fresh read.
    pub fn update_progression(&self, user: &User) -> rusqlite::Result<bool> {
        let updated = self.conn.execute(
            "UPDATE users SET total_distance_km = ?2, level = ?3,
             version = version + 1, updated_at = ?4
             WHERE id = ?1 AND version = ?5",
            params![
                user.id.to_string(),
                user.total_distance_km,
                user.level,
                chrono::Utc::now().to_rfc3339(),
                user.version,
            ],
        )?;

        Ok(updated > 0)
    }
}

/// Parse a database row into a User.
fn parse_user_row(row: &rusqlite::Row) -> rusqlite::Result<User> {
    let id_str: String = row.get(0)?;
    let created_at_str: String = row.get(7)?;
    let updated_at_str: String = row.get(8)?;

    Ok(User {
        id: parse_uuid(&id_str)?,
        nickname: row.get(1)?,
        weight_kg: row.get(2)?,
        height_cm: row.get(3)?,
        level: row.get(4)?,
        total_distance_km: row.get(5)?,
        version: row.get(6)?,
        created_at: parse_timestamp(&created_at_str)?,
        updated_at: parse_timestamp(&updated_at_str)?,
    })
}
