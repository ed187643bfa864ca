//! Challenge management.
//!
//! Handles challenge creation, joining, and listing. Progress updates are
//! applied by the progression pipeline, not here.

use chrono::{NaiveDate, Utc};
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::store::ChallengeStore;
use super::types::{Challenge, ChallengeParticipation, ChallengeType};
use crate::storage::{Database, DatabaseError};
use crate::users::UserStore;

/// Challenge manager.
pub struct ChallengeManager {
    db: Arc<Mutex<Database>>,
}

impl ChallengeManager {
    /// Create a new challenge manager.
    pub fn new(db: Arc<Mutex<Database>>) -> Self {
        Self { db }
    }

    /// Create a new challenge.
    #[allow(clippy::too_many_arguments)]
    pub async fn create_challenge(
        &self,
        name: String,
        description: Option<String>,
        challenge_type: ChallengeType,
        target_distance_km: Option<f64>,
        target_count: Option<u32>,
        start_date: NaiveDate,
        end_date: NaiveDate,
        recommended_min_level: Option<u8>,
    ) -> Result<Challenge, ChallengeError> {
        let target_valid = match challenge_type {
            ChallengeType::Distance => target_distance_km.map_or(false, |t| t > 0.0),
            ChallengeType::Count => target_count.map_or(false, |t| t > 0),
        };
        if !target_valid || end_date < start_date {
            return Err(ChallengeError::InvalidDefinition);
        }

        let challenge = Challenge {
            id: Uuid::new_v4(),
            name,
            description,
            challenge_type,
            target_distance_km,
            target_count,
            start_date,
            end_date,
            recommended_min_level,
            created_at: Utc::now(),
        };

        let db = self.db.lock().await;
        ChallengeStore::new(db.connection()).insert_challenge(&challenge)?;

        Ok(challenge)
    }

    /// Challenges active today.
    pub async fn active_challenges(&self) -> Result<Vec<Challenge>, ChallengeError> {
        let db = self.db.lock().await;
        let challenges =
            ChallengeStore::new(db.connection()).active_by_date(Utc::now().date_naive())?;
        Ok(challenges)
    }

    /// Recommended challenges for a user: active, not yet joined, and within
    /// the user's level, sorted by how close the recommended level sits to
    /// the user's own.
    pub async fn recommended_challenges(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<Challenge>, ChallengeError> {
        let db = self.db.lock().await;
        let store = ChallengeStore::new(db.connection());

        let user = UserStore::new(db.connection())
            .get(user_id)?
            .ok_or(ChallengeError::UserNotFound(user_id))?;

        let joined = store.joined_challenge_ids(user_id)?;
        let mut candidates: Vec<Challenge> = store
            .active_by_date(Utc::now().date_naive())?
            .into_iter()
            .filter(|c| !joined.contains(&c.id))
            .filter(|c| c.recommended_min_level.map_or(true, |min| min <= user.level))
            .collect();

        candidates.sort_by_key(|c| {
            let min = c.recommended_min_level.unwrap_or(1);
            (min as i16 - user.level as i16).abs()
        });

        Ok(candidates)
    }

    /// Join a challenge.
    pub async fn join(
        &self,
        user_id: Uuid,
        challenge_id: Uuid,
    ) -> Result<ChallengeParticipation, ChallengeError> {
        let db = self.db.lock().await;
        let store = ChallengeStore::new(db.connection());

        UserStore::new(db.connection())
            .get(user_id)?
            .ok_or(ChallengeError::UserNotFound(user_id))?;

        let challenge = store
            .get_challenge(challenge_id)?
            .ok_or(ChallengeError::NotFound(challenge_id))?;

        if store.participation_exists(user_id, challenge_id)? {
            return Err(ChallengeError::AlreadyJoined);
        }

        if !challenge.is_active(Utc::now().date_naive()) {
            return Err(ChallengeError::NotActive);
        }

        let participation = ChallengeParticipation::new(challenge_id, user_id);
        store.insert_participation(&participation)?;

        Ok(participation)
    }

    /// All of a user's participations with their challenges.
    pub async fn my_challenges(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<(ChallengeParticipation, Challenge)>, ChallengeError> {
        let db = self.db.lock().await;
        let participations =
            ChallengeStore::new(db.connection()).participations_for_user(user_id)?;
        Ok(participations)
    }

    /// Progress of a single participation.
    pub async fn progress(
        &self,
        user_id: Uuid,
        challenge_id: Uuid,
    ) -> Result<(ChallengeParticipation, Challenge), ChallengeError> {
        let db = self.db.lock().await;
        ChallengeStore::new(db.connection())
            .get_participation(user_id, challenge_id)?
            .ok_or(ChallengeError::NotJoined)
    }
}

/// Challenge errors.
#[derive(Debug, thiserror::Error)]
pub enum ChallengeError {
    #[error("Challenge not found: {0}")]
    NotFound(Uuid),

    #[error("User not found: {0}")]
    UserNotFound(Uuid),

    #[error("Already joined this challenge")]
    AlreadyJoined,

    #[error("Not joined this challenge")]
    NotJoined,

    #[error("Challenge is not in its active window")]
    NotActive,

    #[error("Invalid challenge definition")]
    InvalidDefinition,

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error(transparent)]
    Storage(#[from] DatabaseError),
}
