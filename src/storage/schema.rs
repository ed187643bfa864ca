//! Database schema definitions for RunTrack.

/// SQL schema for creating all database tables.
pub const SCHEMA: &str = r#"
-- Users table
CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY,
    nickname TEXT NOT NULL,
    weight_kg REAL,
    height_cm REAL,
    level INTEGER NOT NULL DEFAULT 1,
    total_distance_km REAL NOT NULL DEFAULT 0,
    version INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- Activities table (one row per logged run)
CREATE TABLE IF NOT EXISTS activities (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL REFERENCES users(id),
    distance_km REAL NOT NULL,
    duration_secs INTEGER NOT NULL,
    average_pace_secs INTEGER,
    calories INTEGER,
    average_heart_rate INTEGER,
    cadence INTEGER,
    route_json TEXT,
    started_at TEXT NOT NULL,
    memo TEXT,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_activities_user_id ON activities(user_id);
CREATE INDEX IF NOT EXISTS idx_activities_user_started ON activities(user_id, started_at);

-- Challenges table
CREATE TABLE IF NOT EXISTS challenges (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    description TEXT,
    challenge_type TEXT NOT NULL,
    target_distance_km REAL,
    target_count INTEGER,
    start_date TEXT NOT NULL,
    end_date TEXT NOT NULL,
    recommended_min_level INTEGER,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_challenges_dates ON challenges(start_date, end_date);
CREATE INDEX IF NOT EXISTS idx_challenges_end_date ON challenges(end_date);

-- Challenge participations table
CREATE TABLE IF NOT EXISTS challenge_participations (
    id TEXT PRIMARY KEY,
    challenge_id TEXT NOT NULL REFERENCES challenges(id),
    user_id TEXT NOT NULL REFERENCES users(id),
    current_distance_km REAL NOT NULL DEFAULT 0,
    current_count INTEGER NOT NULL DEFAULT 0,
    status TEXT NOT NULL DEFAULT 'active',
    completed_at TEXT,
    joined_at TEXT NOT NULL,
    version INTEGER NOT NULL DEFAULT 0,
    UNIQUE(challenge_id, user_id)
);

CREATE INDEX IF NOT EXISTS idx_challenge_participations_user ON challenge_participations(user_id, status);
CREATE INDEX IF NOT EXISTS idx_challenge_participations_challenge ON challenge_participations(challenge_id, status);

-- Training plans table
CREATE TABLE IF NOT EXISTS training_plans (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    description TEXT,
    goal_type TEXT NOT NULL,
    difficulty TEXT NOT NULL,
    total_weeks INTEGER NOT NULL,
    total_runs INTEGER NOT NULL,
    created_at TEXT NOT NULL
);

-- Plan weeks table (per-week schedule rows)
CREATE TABLE IF NOT EXISTS plan_weeks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    plan_id TEXT NOT NULL REFERENCES training_plans(id) ON DELETE CASCADE,
    week_number INTEGER NOT NULL,
    target_distance_km REAL,
    target_runs INTEGER,
    description TEXT,
    UNIQUE(plan_id, week_number)
);

-- Plan participations table
CREATE TABLE IF NOT EXISTS plan_participations (
    id TEXT PRIMARY KEY,
    plan_id TEXT NOT NULL REFERENCES training_plans(id),
    user_id TEXT NOT NULL REFERENCES users(id),
    started_at TEXT NOT NULL,
    current_week INTEGER NOT NULL DEFAULT 1,
    completed_at TEXT,
    version INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_plan_participations_user ON plan_participations(user_id, completed_at);

-- Outbox table (events staged in the same transaction as the activity write)
CREATE TABLE IF NOT EXISTS outbox_events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    payload TEXT NOT NULL,
    staged_at TEXT NOT NULL
);
"#;

/// SQL for the schema version tracking table.
pub const SCHEMA_VERSION_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL
);
"#;

/// Current schema version.
pub const CURRENT_VERSION: i32 = 1;
