//! Database Migrations — PostgreSQL schema for the Cultivation Path
//!
//! The level catalog is compiled in (`crate::catalog`), not stored here;
//! only per-user mutable data and the append logs live in the database.

/// SQL migration for creating all tables
pub const MIGRATION_V1: &str = r#"
-- ============================================================================
-- Cultivation Path Schema v1
-- ============================================================================

-- ============================================================================
-- 1. User Profiles
-- ============================================================================

CREATE TABLE IF NOT EXISTS profiles (
    user_id         VARCHAR(100) PRIMARY KEY,
    display_name    VARCHAR(100) NOT NULL,
    email           VARCHAR(255) NOT NULL,

    total_xp        BIGINT NOT NULL DEFAULT 0 CHECK (total_xp >= 0),
    current_level   INTEGER NOT NULL DEFAULT 0,
    unlocked_content JSONB NOT NULL DEFAULT '[]',
    attributes      JSONB NOT NULL DEFAULT '{}',
    stats           JSONB NOT NULL DEFAULT '{}',

    -- Optimistic-concurrency token; bumped by every committed write
    version         BIGINT NOT NULL DEFAULT 0,

    created_at      TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW(),
    updated_at      TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW()
);

-- ============================================================================
-- 2. XP Transaction Log (append-only)
-- ============================================================================

CREATE TABLE IF NOT EXISTS xp_transactions (
    id              BIGSERIAL PRIMARY KEY,
    user_id         VARCHAR(100) NOT NULL REFERENCES profiles(user_id) ON DELETE CASCADE,
    amount          BIGINT NOT NULL CHECK (amount >= 0),
    reason          TEXT NOT NULL,
    source          VARCHAR(32) NOT NULL,
    source_id       VARCHAR(200),
    resulting_total_xp BIGINT NOT NULL,
    resulting_level INTEGER NOT NULL,
    caused_level_up BOOLEAN NOT NULL DEFAULT FALSE,
    created_at      TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW()
);

-- At most one accepted transaction per (user, source id). The award commit
-- inserts against this index inside the same transaction as the profile
-- update; a constraint hit is the duplicate-detection signal.
CREATE UNIQUE INDEX IF NOT EXISTS idx_xp_tx_source
    ON xp_transactions(user_id, source_id) WHERE source_id IS NOT NULL;

CREATE INDEX IF NOT EXISTS idx_xp_tx_user
    ON xp_transactions(user_id, created_at DESC);

-- ============================================================================
-- 3. Level-Up History (append-only, best-effort)
-- ============================================================================

CREATE TABLE IF NOT EXISTS level_up_history (
    id              BIGSERIAL PRIMARY KEY,
    user_id         VARCHAR(100) NOT NULL REFERENCES profiles(user_id) ON DELETE CASCADE,
    from_level      INTEGER NOT NULL,
    to_level        INTEGER NOT NULL,
    total_xp_at_level_up BIGINT NOT NULL,
    trigger_reason  TEXT NOT NULL,
    created_at      TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW()
);

CREATE INDEX IF NOT EXISTS idx_level_up_user
    ON level_up_history(user_id, created_at DESC);
"#;

/// Get all migration SQL statements in order
pub fn get_migrations() -> Vec<(&'static str, &'static str)> {
    vec![("v1_initial_schema", MIGRATION_V1)]
}
