//! In-memory store — test and local-development backend
//!
//! Everything lives under one `parking_lot` mutex, so each operation is
//! trivially atomic. Version checks still apply: the engine reads a profile
//! outside the lock, so concurrent awards race on the version token exactly
//! as they would against PostgreSQL.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::model::{LevelUpRecord, UserProfile, XpTransaction};

use super::repository::{CommitOutcome, ProgressionStore, StorageError, StoreResult};

struct UserRecord {
    profile: UserProfile,
    transactions: Vec<XpTransaction>,
    /// source_id → index into `transactions`
    by_source: HashMap<String, usize>,
    level_ups: Vec<LevelUpRecord>,
}

/// In-process `ProgressionStore` backend
#[derive(Default)]
pub struct MemoryStore {
    users: Mutex<HashMap<String, UserRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total accepted transactions for a user (test helper)
    pub fn transaction_count(&self, user_id: &str) -> usize {
        self.users
            .lock()
            .get(user_id)
            .map(|r| r.transactions.len())
            .unwrap_or(0)
    }
}

#[async_trait]
impl ProgressionStore for MemoryStore {
    async fn get_profile(&self, user_id: &str) -> StoreResult<Option<UserProfile>> {
        Ok(self.users.lock().get(user_id).map(|r| r.profile.clone()))
    }

    async fn create_profile(&self, profile: &UserProfile) -> StoreResult<UserProfile> {
        let mut users = self.users.lock();
        let record = users
            .entry(profile.user_id.clone())
            .or_insert_with(|| UserRecord {
                profile: profile.clone(),
                transactions: Vec::new(),
                by_source: HashMap::new(),
                level_ups: Vec::new(),
            });
        Ok(record.profile.clone())
    }

    async fn update_profile(
        &self,
        profile: &UserProfile,
        expected_version: i64,
    ) -> StoreResult<bool> {
        let mut users = self.users.lock();
        let record = users
            .get_mut(&profile.user_id)
            .ok_or_else(|| StorageError::NotFound(profile.user_id.clone()))?;

        if record.profile.version != expected_version {
            return Ok(false);
        }
        record.profile = profile.clone();
        Ok(true)
    }

    async fn commit_award(
        &self,
        profile: &UserProfile,
        expected_version: i64,
        tx: &XpTransaction,
    ) -> StoreResult<CommitOutcome> {
        let mut users = self.users.lock();
        let record = users
            .get_mut(&profile.user_id)
            .ok_or_else(|| StorageError::NotFound(profile.user_id.clone()))?;

        // Duplicate detection wins over version checks: a retried award for
        // an already-committed source id must report the prior outcome, not
        // a conflict.
        if let Some(source_id) = &tx.source_id {
            if let Some(&idx) = record.by_source.get(source_id) {
                return Ok(CommitOutcome::Duplicate(record.transactions[idx].clone()));
            }
        }

        if record.profile.version != expected_version {
            return Ok(CommitOutcome::Conflict);
        }

        record.profile = profile.clone();
        record.transactions.push(tx.clone());
        if let Some(source_id) = &tx.source_id {
            record
                .by_source
                .insert(source_id.clone(), record.transactions.len() - 1);
        }
        Ok(CommitOutcome::Committed)
    }

    async fn find_transaction(
        &self,
        user_id: &str,
        source_id: &str,
    ) -> StoreResult<Option<XpTransaction>> {
        let users = self.users.lock();
        Ok(users.get(user_id).and_then(|record| {
            record
                .by_source
                .get(source_id)
                .map(|&idx| record.transactions[idx].clone())
        }))
    }

    async fn append_level_ups(&self, records: &[LevelUpRecord]) -> StoreResult<()> {
        let mut users = self.users.lock();
        for rec in records {
            let record = users
                .get_mut(&rec.user_id)
                .ok_or_else(|| StorageError::NotFound(rec.user_id.clone()))?;
            record.level_ups.push(rec.clone());
        }
        Ok(())
    }

    async fn list_transactions(
        &self,
        user_id: &str,
        limit: u32,
    ) -> StoreResult<Vec<XpTransaction>> {
        let users = self.users.lock();
        Ok(users
            .get(user_id)
            .map(|record| {
                record
                    .transactions
                    .iter()
                    .rev()
                    .take(limit as usize)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn list_level_ups(
        &self,
        user_id: &str,
        limit: u32,
    ) -> StoreResult<Vec<LevelUpRecord>> {
        let users = self.users.lock();
        Ok(users
            .get(user_id)
            .map(|record| {
                record
                    .level_ups
                    .iter()
                    .rev()
                    .take(limit as usize)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::XpSource;
    use chrono::Utc;

    fn profile(user_id: &str) -> UserProfile {
        UserProfile::new(user_id, "Tester", "t@example.com", Utc::now())
    }

    fn tx(user_id: &str, source_id: Option<&str>) -> XpTransaction {
        XpTransaction {
            user_id: user_id.to_string(),
            amount: 10,
            reason: "test".to_string(),
            source: XpSource::Task,
            source_id: source_id.map(String::from),
            resulting_total_xp: 10,
            resulting_level: 0,
            caused_level_up: false,
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_create_profile_is_idempotent() {
        let store = MemoryStore::new();
        let first = store.create_profile(&profile("u1")).await.unwrap();

        let mut other = profile("u1");
        other.display_name = "Impostor".to_string();
        let second = store.create_profile(&other).await.unwrap();

        assert_eq!(first.display_name, second.display_name, "first write wins");
    }

    #[tokio::test]
    async fn test_commit_award_detects_stale_version() {
        let store = MemoryStore::new();
        store.create_profile(&profile("u1")).await.unwrap();

        let mut updated = profile("u1");
        updated.total_xp = 10;
        updated.version = 1;

        let outcome = store.commit_award(&updated, 0, &tx("u1", None)).await.unwrap();
        assert!(matches!(outcome, CommitOutcome::Committed));

        // Same expected version again — stale now
        let outcome = store.commit_award(&updated, 0, &tx("u1", None)).await.unwrap();
        assert!(matches!(outcome, CommitOutcome::Conflict));
    }

    #[tokio::test]
    async fn test_commit_award_detects_duplicate_source() {
        let store = MemoryStore::new();
        store.create_profile(&profile("u1")).await.unwrap();

        let mut updated = profile("u1");
        updated.version = 1;

        let outcome = store
            .commit_award(&updated, 0, &tx("u1", Some("src-1")))
            .await
            .unwrap();
        assert!(matches!(outcome, CommitOutcome::Committed));

        // Retried with the same source id, even at the right version
        let mut again = updated.clone();
        again.version = 2;
        let outcome = store
            .commit_award(&again, 1, &tx("u1", Some("src-1")))
            .await
            .unwrap();
        match outcome {
            CommitOutcome::Duplicate(prior) => assert_eq!(prior.amount, 10),
            other => panic!("expected duplicate, got {:?}", other),
        }
        assert_eq!(store.transaction_count("u1"), 1);
    }

    #[tokio::test]
    async fn test_list_transactions_newest_first() {
        let store = MemoryStore::new();
        store.create_profile(&profile("u1")).await.unwrap();

        for i in 0..3i64 {
            let mut updated = profile("u1");
            updated.version = i + 1;
            let source_id = format!("src-{}", i);
            let mut t = tx("u1", Some(source_id.as_str()));
            t.amount = i;
            store.commit_award(&updated, i, &t).await.unwrap();
        }

        let listed = store.list_transactions("u1", 2).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].amount, 2, "newest first");
        assert_eq!(listed[1].amount, 1);
    }
}
