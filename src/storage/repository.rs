//! Repository trait — abstraction layer for progression persistence
//!
//! The engine talks to storage only through `ProgressionStore`, making it
//! easy to swap backends (in-memory for tests, PostgreSQL in production).
//!
//! The one non-obvious method is `commit_award`: the profile update and the
//! transaction append must land as a single atomic unit per user, with the
//! idempotency check folded into the same unit. Splitting them would reopen
//! the lost-update and double-grant races this engine exists to close.

use async_trait::async_trait;

use crate::model::{LevelUpRecord, UserProfile, XpTransaction};

/// Generic result type for storage operations
pub type StoreResult<T> = Result<T, StorageError>;

/// Error type for storage operations
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("version conflict for user {0}")]
    Conflict(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("corrupt record: {0}")]
    Corrupt(String),
}

/// Outcome of an atomic award commit
#[derive(Debug)]
pub enum CommitOutcome {
    /// Profile updated and transaction appended
    Committed,
    /// A transaction for this `(user_id, source_id)` already exists; the
    /// prior record is returned and nothing was mutated
    Duplicate(XpTransaction),
    /// The profile's version no longer matches; caller should reload and retry
    Conflict,
}

/// Persistence seam for the progression engine
#[async_trait]
pub trait ProgressionStore: Send + Sync {
    async fn get_profile(&self, user_id: &str) -> StoreResult<Option<UserProfile>>;

    /// Insert the profile if absent. Returns the stored profile either way,
    /// so concurrent initializations converge on one record.
    async fn create_profile(&self, profile: &UserProfile) -> StoreResult<UserProfile>;

    /// Conditional profile write: applies `profile` only if the stored
    /// version equals `expected_version`. Returns whether it was applied.
    async fn update_profile(
        &self,
        profile: &UserProfile,
        expected_version: i64,
    ) -> StoreResult<bool>;

    /// Atomically append `tx` and apply `profile` (conditioned on
    /// `expected_version`). The transaction's `(user_id, source_id)`
    /// uniqueness is enforced inside the same unit; a hit reports
    /// `Duplicate` with the prior record.
    async fn commit_award(
        &self,
        profile: &UserProfile,
        expected_version: i64,
        tx: &XpTransaction,
    ) -> StoreResult<CommitOutcome>;

    /// Prior accepted transaction for `(user_id, source_id)`, if any
    async fn find_transaction(
        &self,
        user_id: &str,
        source_id: &str,
    ) -> StoreResult<Option<XpTransaction>>;

    /// Append level-up audit records (best-effort side log)
    async fn append_level_ups(&self, records: &[LevelUpRecord]) -> StoreResult<()>;

    /// XP transactions for a user, newest first
    async fn list_transactions(
        &self,
        user_id: &str,
        limit: u32,
    ) -> StoreResult<Vec<XpTransaction>>;

    /// Level-up records for a user, newest first
    async fn list_level_ups(&self, user_id: &str, limit: u32)
        -> StoreResult<Vec<LevelUpRecord>>;
}
