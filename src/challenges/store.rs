//! Challenge and participation persistence operations.

use chrono::{NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::types::{Challenge, ChallengeParticipation, ChallengeType, ParticipationStatus};
use crate::storage::{parse_date, parse_timestamp, parse_uuid};

const CHALLENGE_COLUMNS: &str = "id, name, description, challenge_type, target_distance_km,
     target_count, start_date, end_date, recommended_min_level, created_at";

const PARTICIPATION_COLUMNS: &str = "id, challenge_id, user_id, current_distance_km,
     current_count, status, completed_at, joined_at, version";

/// Challenge store for a database connection or transaction.
pub struct ChallengeStore<'a> {
    conn: &'a Connection,
}

impl<'a> ChallengeStore<'a> {
    /// Create a new challenge store with the given connection.
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    // ========== Challenges ==========

    /// Insert a new challenge.
    pub fn insert_challenge(&self, challenge: &Challenge) -> rusqlite::Result<()> {
        self.conn.execute(
            "INSERT INTO challenges (id, name, description, challenge_type, target_distance_km,
             target_count, start_date, end_date, recommended_min_level, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                challenge.id.to_string(),
                challenge.name,
                challenge.description,
                challenge.challenge_type.as_str(),
                challenge.target_distance_km,
                challenge.target_count,
                challenge.start_date.to_string(),
                challenge.end_date.to_string(),
                challenge.recommended_min_level,
                challenge.created_at.to_rfc3339(),
            ],
        )?;

        Ok(())
    }

    /// Get a challenge by ID.
    pub fn get_challenge(&self, id: Uuid) -> rusqlite::Result<Option<Challenge>> {
        self.conn
            .query_row(
                &format!("SELECT {CHALLENGE_COLUMNS} FROM challenges WHERE id = ?1"),
                params![id.to_string()],
                parse_challenge_row,
            )
            .optional()
    }

    /// Challenges whose window contains the given date, soonest-ending first.
    pub fn active_by_date(&self, date: NaiveDate) -> rusqlite::Result<Vec<Challenge>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {CHALLENGE_COLUMNS} FROM challenges
             WHERE start_date <= ?1 AND end_date >= ?1
             ORDER BY end_date ASC"
        ))?;

        let rows = stmt.query_map(params![date.to_string()], parse_challenge_row)?;
        rows.collect()
    }

    /// Challenges whose end date is strictly before the given date.
    pub fn ending_before(&self, date: NaiveDate) -> rusqlite::Result<Vec<Challenge>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {CHALLENGE_COLUMNS} FROM challenges WHERE end_date < ?1"
        ))?;

        let rows = stmt.query_map(params![date.to_string()], parse_challenge_row)?;
        rows.collect()
    }

    // ========== Participations ==========

    /// Insert a new participation.
    pub fn insert_participation(
        &self,
        participation: &ChallengeParticipation,
    ) -> rusqlite::Result<()> {
        self.conn.execute(
            "INSERT INTO challenge_participations (id, challenge_id, user_id,
             current_distance_km, current_count, status, completed_at, joined_at, version)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                participation.id.to_string(),
                participation.challenge_id.to_string(),
                participation.user_id.to_string(),
                participation.current_distance_km,
                participation.current_count,
                participation.status.as_str(),
                participation.completed_at.map(|dt| dt.to_rfc3339()),
                participation.joined_at.to_rfc3339(),
                participation.version,
            ],
        )?;

        Ok(())
    }

    /// Whether the user already joined the challenge.
    pub fn participation_exists(
        &self,
        user_id: Uuid,
        challenge_id: Uuid,
    ) -> rusqlite::Result<bool> {
        let mut stmt = self.conn.prepare(
            "SELECT id FROM challenge_participations WHERE user_id = ?1 AND challenge_id = ?2",
        )?;
        stmt.exists(params![user_id.to_string(), challenge_id.to_string()])
    }

    /// Get a participation with its challenge.
    pub fn get_participation(
        &self,
        user_id: Uuid,
        challenge_id: Uuid,
    ) -> rusqlite::Result<Option<(ChallengeParticipation, Challenge)>> {
        self.conn
            .query_row(
                "SELECT p.id, p.challenge_id, p.user_id, p.current_distance_km,
                 p.current_count, p.status, p.completed_at, p.joined_at, p.version,
                 c.id, c.name, c.description, c.challenge_type, c.target_distance_km,
                 c.target_count, c.start_date, c.end_date, c.recommended_min_level, c.created_at
                 FROM challenge_participations p
                 JOIN challenges c ON c.id = p.challenge_id
                 WHERE p.user_id = ?1 AND p.challenge_id = ?2",
                params![user_id.to_string(), challenge_id.to_string()],
                parse_joined_row,
            )
            .optional()
    }

    /// All participations for a user, with their challenges.
    pub fn participations_for_user(
        &self,
        user_id: Uuid,
    ) -> rusqlite::Result<Vec<(ChallengeParticipation, Challenge)>> {
        let mut stmt = self.conn.prepare(
            "SELECT p.id, p.challenge_id, p.user_id, p.current_distance_km,
             p.current_count, p.status, p.completed_at, p.joined_at, p.version,
             c.id, c.name, c.description, c.challenge_type, c.target_distance_km,
             c.target_count, c.start_date, c.end_date, c.recommended_min_level, c.created_at
             FROM challenge_participations p
             JOIN challenges c ON c.id = p.challenge_id
             WHERE p.user_id = ?1
             ORDER BY p.joined_at ASC",
        )?;

        let rows = stmt.query_map(params![user_id.to_string()], parse_joined_row)?;
        rows.collect()
    }

    /// Still-active participations for a user, with their challenges.
    pub fn active_participations_for_user(
        &self,
        user_id: Uuid,
    ) -> rusqlite::Result<Vec<(ChallengeParticipation, Challenge)>> {
        let mut stmt = self.conn.prepare(
            "SELECT p.id, p.challenge_id, p.user_id, p.current_distance_km,
             p.current_count, p.status, p.completed_at, p.joined_at, p.version,
             c.id, c.name, c.description, c.challenge_type, c.target_distance_km,
             c.target_count, c.start_date, c.end_date, c.recommended_min_level, c.created_at
             FROM challenge_participations p
             JOIN challenges c ON c.id = p.challenge_id
             WHERE p.user_id = ?1 AND p.status = 'active'",
        )?;

        let rows = stmt.query_map(params![user_id.to_string()], parse_joined_row)?;
        rows.collect()
    }

    /// Still-active participations in a challenge (expiry batch).
    pub fn active_participations_for_challenge(
        &self,
        challenge_id: Uuid,
    ) -> rusqlite::Result<Vec<ChallengeParticipation>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {PARTICIPATION_COLUMNS} FROM challenge_participations
             WHERE challenge_id = ?1 AND status = 'active'"
        ))?;

        let rows = stmt.query_map(params![challenge_id.to_string()], parse_participation_row)?;
        rows.collect()
    }

    /// Challenge IDs the user has joined.
    pub fn joined_challenge_ids(&self, user_id: Uuid) -> rusqlite::Result<Vec<Uuid>> {
        let mut stmt = self.conn.prepare(
            "SELECT challenge_id FROM challenge_participations WHERE user_id = ?1",
        )?;

        let rows = stmt.query_map(params![user_id.to_string()], |row| {
            let id_str: String = row.get(0)?;
            parse_uuid(&id_str)
        })?;
        rows.collect()
    }

    /// Persist participation progress guarded by the version the caller read.
    /// Returns false on a conflicting concurrent write.
    pub fn update_participation(
        &self,
        participation: &ChallengeParticipation,
    ) -> rusqlite::Result<bool> {
        let updated = self.conn.execute(
            "UPDATE challenge_participations SET current_distance_km = ?2, current_count = ?3,
             status = ?4, completed_at = ?5, version = version + 1
             WHERE id = ?1 AND version = ?6",
            params![
                participation.id.to_string(),
                participation.current_distance_km,
                participation.current_count,
                participation.status.as_str(),
                participation.completed_at.map(|dt| dt.to_rfc3339()),
                participation.version,
            ],
        )?;

        Ok(updated > 0)
    }
}

/// Parse a database row into a Challenge.
fn parse_challenge_row(row: &rusqlite::Row) -> rusqlite::Result<Challenge> {
    parse_challenge_at(row, 0)
}

/// Parse a Challenge starting at a column offset (for JOIN queries).
fn parse_challenge_at(row: &rusqlite::Row, offset: usize) -> rusqlite::Result<Challenge> {
    let id_str: String = row.get(offset)?;
    let type_str: String = row.get(offset + 3)?;
    let start_str: String = row.get(offset + 6)?;
    let end_str: String = row.get(offset + 7)?;
    let created_str: String = row.get(offset + 9)?;

    let challenge_type = ChallengeType::from_str(&type_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            offset + 3,
            rusqlite::types::Type::Text,
            format!("unknown challenge type: {}", type_str).into(),
        )
    })?;

    Ok(Challenge {
        id: parse_uuid(&id_str)?,
        name: row.get(offset + 1)?,
        description: row.get(offset + 2)?,
        challenge_type,
        target_distance_km: row.get(offset + 4)?,
        target_count: row.get(offset + 5)?,
        start_date: parse_date(&start_str)?,
        end_date: parse_date(&end_str)?,
        recommended_min_level: row.get(offset + 8)?,
        created_at: parse_timestamp(&created_str)?,
    })
}

/// Parse a database row into a ChallengeParticipation.
fn parse_participation_row(row: &rusqlite::Row) -> rusqlite::Result<ChallengeParticipation> {
    let id_str: String = row.get(0)?;
    let challenge_id_str: String = row.get(1)?;
    let user_id_str: String = row.get(2)?;
    let status_str: String = row.get(5)?;
    let completed_str: Option<String> = row.get(6)?;
    let joined_str: String = row.get(7)?;

    let status = ParticipationStatus::from_str(&status_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            5,
            rusqlite::types::Type::Text,
            format!("unknown participation status: {}", status_str).into(),
        )
    })?;

    Ok(ChallengeParticipation {
        id: parse_uuid(&id_str)?,
        challenge_id: parse_uuid(&challenge_id_str)?,
        user_id: parse_uuid(&user_id_str)?,
        current_distance_km: row.get(3)?,
        current_count: row.get(4)?,
        status,
        completed_at: completed_str.as_deref().map(parse_timestamp).transpose()?,
        joined_at: parse_timestamp(&joined_str)?,
        version: row.get(8)?,
    })
}

/// Parse a participation JOIN challenge row.
fn parse_joined_row(
    row: &rusqlite::Row,
) -> rusqlite::Result<(ChallengeParticipation, Challenge)> {
    let participation = parse_participation_row(row)?;
    let challenge = parse_challenge_at(row, 9)?;
    Ok((participation, challenge))
}
