//! PostgreSQL Storage — durable progression data
//!
//! Uses `sqlx` for async queries. Profiles carry a `version` column for
//! optimistic concurrency; the award commit runs as one SQL transaction so
//! the idempotency constraint and the conditional profile update either both
//! apply or neither does.
//!
//! ## Tables
//! - profiles, xp_transactions, level_up_history

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::FromRow;
use tracing::{debug, info};

use crate::model::{LevelUpRecord, UserProfile, XpSource, XpTransaction};

use super::migrations;
use super::repository::{CommitOutcome, ProgressionStore, StorageError, StoreResult};

/// PostgreSQL connection pool wrapper
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Connect to PostgreSQL and run migrations
    pub async fn new(database_url: &str, max_connections: u32) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        info!("PostgreSQL connected (max_connections={})", max_connections);

        let store = Self { pool };
        store.run_migrations().await?;

        Ok(store)
    }

    /// Connect with an existing pool (for testing)
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get reference to the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run all pending migrations
    pub async fn run_migrations(&self) -> StoreResult<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS _migrations (
                name VARCHAR(100) PRIMARY KEY,
                applied_at TIMESTAMP WITH TIME ZONE DEFAULT NOW()
            )",
        )
        .execute(&self.pool)
        .await?;

        for (name, sql) in migrations::get_migrations() {
            let applied: bool =
                sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM _migrations WHERE name = $1)")
                    .bind(name)
                    .fetch_one(&self.pool)
                    .await?;

            if !applied {
                info!("Running migration: {}", name);
                sqlx::raw_sql(sql).execute(&self.pool).await?;

                sqlx::query("INSERT INTO _migrations (name) VALUES ($1)")
                    .bind(name)
                    .execute(&self.pool)
                    .await?;

                info!("Migration applied: {}", name);
            } else {
                debug!("Migration already applied: {}", name);
            }
        }

        Ok(())
    }
}

// ============================================================================
// Row Types
// ============================================================================

#[derive(FromRow)]
struct ProfileRow {
    user_id: String,
    display_name: String,
    email: String,
    total_xp: i64,
    current_level: i32,
    unlocked_content: serde_json::Value,
    attributes: serde_json::Value,
    stats: serde_json::Value,
    version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ProfileRow {
    fn into_profile(self) -> StoreResult<UserProfile> {
        let mut profile = UserProfile {
            user_id: self.user_id,
            display_name: self.display_name,
            email: self.email,
            total_xp: self.total_xp,
            current_level: self.current_level as u32,
            current_xp: 0,
            next_level_xp: None,
            unlocked_content: serde_json::from_value(self.unlocked_content)
                .map_err(|e| StorageError::Corrupt(format!("unlocked_content: {}", e)))?,
            attributes: serde_json::from_value(self.attributes)
                .map_err(|e| StorageError::Corrupt(format!("attributes: {}", e)))?,
            stats: serde_json::from_value(self.stats)
                .map_err(|e| StorageError::Corrupt(format!("stats: {}", e)))?,
            version: self.version,
            created_at: self.created_at,
            updated_at: self.updated_at,
        };
        // Display XP is derived, never stored
        profile.recompute_progress();
        Ok(profile)
    }
}

#[derive(FromRow)]
struct TransactionRow {
    user_id: String,
    amount: i64,
    reason: String,
    source: String,
    source_id: Option<String>,
    resulting_total_xp: i64,
    resulting_level: i32,
    caused_level_up: bool,
    created_at: DateTime<Utc>,
}

impl TransactionRow {
    fn into_transaction(self) -> StoreResult<XpTransaction> {
        let source = XpSource::from_str(&self.source)
            .ok_or_else(|| StorageError::Corrupt(format!("unknown xp source: {}", self.source)))?;
        Ok(XpTransaction {
            user_id: self.user_id,
            amount: self.amount,
            reason: self.reason,
            source,
            source_id: self.source_id,
            resulting_total_xp: self.resulting_total_xp,
            resulting_level: self.resulting_level as u32,
            caused_level_up: self.caused_level_up,
            timestamp: self.created_at,
        })
    }
}

#[derive(FromRow)]
struct LevelUpRow {
    user_id: String,
    from_level: i32,
    to_level: i32,
    total_xp_at_level_up: i64,
    trigger_reason: String,
    created_at: DateTime<Utc>,
}

impl LevelUpRow {
    fn into_record(self) -> LevelUpRecord {
        LevelUpRecord {
            user_id: self.user_id,
            from_level: self.from_level as u32,
            to_level: self.to_level as u32,
            total_xp_at_level_up: self.total_xp_at_level_up,
            timestamp: self.created_at,
            trigger_reason: self.trigger_reason,
        }
    }
}

const PROFILE_COLUMNS: &str = "user_id, display_name, email, total_xp, current_level, \
     unlocked_content, attributes, stats, version, created_at, updated_at";

const TRANSACTION_COLUMNS: &str = "user_id, amount, reason, source, source_id, \
     resulting_total_xp, resulting_level, caused_level_up, created_at";

// ============================================================================
// ProgressionStore Implementation
// ============================================================================

#[async_trait]
impl ProgressionStore for PostgresStore {
    async fn get_profile(&self, user_id: &str) -> StoreResult<Option<UserProfile>> {
        let row = sqlx::query_as::<_, ProfileRow>(&format!(
            "SELECT {} FROM profiles WHERE user_id = $1",
            PROFILE_COLUMNS
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(ProfileRow::into_profile).transpose()
    }

    async fn create_profile(&self, profile: &UserProfile) -> StoreResult<UserProfile> {
        sqlx::query(
            "INSERT INTO profiles (user_id, display_name, email, total_xp, current_level,
                                   unlocked_content, attributes, stats, version, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $10)
             ON CONFLICT (user_id) DO NOTHING",
        )
        .bind(&profile.user_id)
        .bind(&profile.display_name)
        .bind(&profile.email)
        .bind(profile.total_xp)
        .bind(profile.current_level as i32)
        .bind(serde_json::to_value(&profile.unlocked_content).unwrap_or_default())
        .bind(serde_json::to_value(&profile.attributes).unwrap_or_default())
        .bind(serde_json::to_value(&profile.stats).unwrap_or_default())
        .bind(profile.version)
        .bind(profile.created_at)
        .execute(&self.pool)
        .await?;

        // Re-read so concurrent initializations converge on the stored row
        self.get_profile(&profile.user_id)
            .await?
            .ok_or_else(|| StorageError::NotFound(profile.user_id.clone()))
    }

    async fn update_profile(
        &self,
        profile: &UserProfile,
        expected_version: i64,
    ) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE profiles SET display_name = $2, email = $3, total_xp = $4,
                    current_level = $5, unlocked_content = $6, attributes = $7,
                    stats = $8, version = $9, updated_at = $10
             WHERE user_id = $1 AND version = $11",
        )
        .bind(&profile.user_id)
        .bind(&profile.display_name)
        .bind(&profile.email)
        .bind(profile.total_xp)
        .bind(profile.current_level as i32)
        .bind(serde_json::to_value(&profile.unlocked_content).unwrap_or_default())
        .bind(serde_json::to_value(&profile.attributes).unwrap_or_default())
        .bind(serde_json::to_value(&profile.stats).unwrap_or_default())
        .bind(profile.version)
        .bind(profile.updated_at)
        .bind(expected_version)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn commit_award(
        &self,
        profile: &UserProfile,
        expected_version: i64,
        tx: &XpTransaction,
    ) -> StoreResult<CommitOutcome> {
        let mut db_tx = self.pool.begin().await?;

        // The transaction insert goes first: the unique constraint on
        // (user_id, source_id) is the duplicate-detection signal, atomic
        // with the profile update that follows.
        let inserted = sqlx::query(
            "INSERT INTO xp_transactions (user_id, amount, reason, source, source_id,
                                          resulting_total_xp, resulting_level,
                                          caused_level_up, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
             ON CONFLICT (user_id, source_id) WHERE source_id IS NOT NULL DO NOTHING",
        )
        .bind(&tx.user_id)
        .bind(tx.amount)
        .bind(&tx.reason)
        .bind(tx.source.as_str())
        .bind(&tx.source_id)
        .bind(tx.resulting_total_xp)
        .bind(tx.resulting_level as i32)
        .bind(tx.caused_level_up)
        .bind(tx.timestamp)
        .execute(&mut *db_tx)
        .await?;

        if inserted.rows_affected() == 0 {
            db_tx.rollback().await?;
            let source_id = tx
                .source_id
                .as_deref()
                .ok_or_else(|| StorageError::Corrupt("conflict without source id".into()))?;
            let prior = self
                .find_transaction(&tx.user_id, source_id)
                .await?
                .ok_or_else(|| StorageError::NotFound(format!("prior tx {}", source_id)))?;
            return Ok(CommitOutcome::Duplicate(prior));
        }

        let updated = sqlx::query(
            "UPDATE profiles SET total_xp = $2, current_level = $3, unlocked_content = $4,
                    attributes = $5, stats = $6, version = $7, updated_at = $8
             WHERE user_id = $1 AND version = $9",
        )
        .bind(&profile.user_id)
        .bind(profile.total_xp)
        .bind(profile.current_level as i32)
        .bind(serde_json::to_value(&profile.unlocked_content).unwrap_or_default())
        .bind(serde_json::to_value(&profile.attributes).unwrap_or_default())
        .bind(serde_json::to_value(&profile.stats).unwrap_or_default())
        .bind(profile.version)
        .bind(profile.updated_at)
        .bind(expected_version)
        .execute(&mut *db_tx)
        .await?;

        if updated.rows_affected() == 0 {
            db_tx.rollback().await?;
            return Ok(CommitOutcome::Conflict);
        }

        db_tx.commit().await?;
        Ok(CommitOutcome::Committed)
    }

    async fn find_transaction(
        &self,
        user_id: &str,
        source_id: &str,
    ) -> StoreResult<Option<XpTransaction>> {
        let row = sqlx::query_as::<_, TransactionRow>(&format!(
            "SELECT {} FROM xp_transactions WHERE user_id = $1 AND source_id = $2",
            TRANSACTION_COLUMNS
        ))
        .bind(user_id)
        .bind(source_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TransactionRow::into_transaction).transpose()
    }

    async fn append_level_ups(&self, records: &[LevelUpRecord]) -> StoreResult<()> {
        for rec in records {
            sqlx::query(
                "INSERT INTO level_up_history (user_id, from_level, to_level,
                                               total_xp_at_level_up, trigger_reason, created_at)
                 VALUES ($1, $2, $3, $4, $5, $6)",
            )
            .bind(&rec.user_id)
            .bind(rec.from_level as i32)
            .bind(rec.to_level as i32)
            .bind(rec.total_xp_at_level_up)
            .bind(&rec.trigger_reason)
            .bind(rec.timestamp)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    async fn list_transactions(
        &self,
        user_id: &str,
        limit: u32,
    ) -> StoreResult<Vec<XpTransaction>> {
        let rows = sqlx::query_as::<_, TransactionRow>(&format!(
            "SELECT {} FROM xp_transactions
             WHERE user_id = $1 ORDER BY created_at DESC, id DESC LIMIT $2",
            TRANSACTION_COLUMNS
        ))
        .bind(user_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(TransactionRow::into_transaction)
            .collect()
    }

    async fn list_level_ups(
        &self,
        user_id: &str,
        limit: u32,
    ) -> StoreResult<Vec<LevelUpRecord>> {
        let rows = sqlx::query_as::<_, LevelUpRow>(
            "SELECT user_id, from_level, to_level, total_xp_at_level_up, trigger_reason, created_at
             FROM level_up_history
             WHERE user_id = $1 ORDER BY created_at DESC, id DESC LIMIT $2",
        )
        .bind(user_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(LevelUpRow::into_record).collect())
    }
}
