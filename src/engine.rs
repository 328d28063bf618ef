//! Progression Engine — the orchestrating core of the Cultivation Path
//!
//! Applies XP rewards idempotently, derives levels from cumulative XP via
//! the catalog, detects (possibly cascading) level-ups, and answers
//! permission and content queries. Constructed with injected storage and
//! clock collaborators; no global state.
//!
//! Concurrency model: every profile write is conditioned on the profile's
//! `version` token. On a conflict the engine reloads and retries a bounded
//! number of times, then surfaces the conflict to the caller, who may safely
//! retry the whole call because awards are idempotent per source id.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::catalog;
use crate::model::{
    AttributeUpdate, AwardResult, LevelRequirements, LevelUpRecord, RequirementStatus,
    StatsUpdate, UserProfile, XpSource, XpTransaction,
};
use crate::storage::repository::{CommitOutcome, ProgressionStore, StorageError};

/// Timestamp source, injected so tests can pin time
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock implementation used in production
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Error type for engine operations.
///
/// A duplicate award is deliberately *not* an error: it is a normal
/// idempotent no-op surfaced as `duplicate: true` on the result.
#[derive(Debug, thiserror::Error)]
pub enum ProgressionError {
    #[error("invalid amount {0}: awards must be non-negative")]
    InvalidAmount(i64),
    #[error("no profile for user {0}")]
    ProfileNotFound(String),
    #[error("persistence conflict for user {0} after {1} attempts")]
    Conflict(String, u32),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Reloads before a version conflict is surfaced to the caller
const MAX_COMMIT_ATTEMPTS: u32 = 5;

/// The progression core. One instance serves all users; cheap to clone
/// behind an `Arc`.
pub struct ProgressionEngine {
    store: Arc<dyn ProgressionStore>,
    clock: Arc<dyn Clock>,
}

impl ProgressionEngine {
    pub fn new(store: Arc<dyn ProgressionStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub fn with_system_clock(store: Arc<dyn ProgressionStore>) -> Self {
        Self::new(store, Arc::new(SystemClock))
    }

    // ========================================================================
    // Profile Lifecycle
    // ========================================================================

    /// Create the profile if absent; returns the stored profile either way.
    ///
    /// Profiles are only ever created here — `award_xp` does not auto-create
    /// (an award for an unknown user is a caller bug, not a signup path).
    pub async fn initialize_profile(
        &self,
        user_id: &str,
        display_name: &str,
        email: &str,
    ) -> Result<UserProfile, ProgressionError> {
        if let Some(existing) = self.store.get_profile(user_id).await? {
            return Ok(existing);
        }
        let profile = UserProfile::new(user_id, display_name, email, self.clock.now());
        let stored = self.store.create_profile(&profile).await?;
        info!("Initialized profile for user {}", user_id);
        Ok(stored)
    }

    pub async fn get_profile(
        &self,
        user_id: &str,
    ) -> Result<Option<UserProfile>, ProgressionError> {
        Ok(self.store.get_profile(user_id).await?)
    }

    // ========================================================================
    // Award XP
    // ========================================================================

    /// Grant XP to a user, at most once per `(user_id, source_id)`.
    ///
    /// Callers retrying after a network failure must reuse the same
    /// `source_id` so the retry is absorbed as a duplicate.
    pub async fn award_xp(
        &self,
        user_id: &str,
        amount: i64,
        reason: &str,
        source: XpSource,
        source_id: Option<&str>,
    ) -> Result<AwardResult, ProgressionError> {
        if amount < 0 {
            return Err(ProgressionError::InvalidAmount(amount));
        }

        // Fast duplicate path. The authoritative check lives inside the
        // store's atomic commit; this read just avoids pointless work for
        // the common retry case.
        if let Some(sid) = source_id {
            if let Some(prior) = self.store.find_transaction(user_id, sid).await? {
                return Ok(Self::prior_outcome(&prior));
            }
        }

        for attempt in 0..MAX_COMMIT_ATTEMPTS {
            let profile = self
                .store
                .get_profile(user_id)
                .await?
                .ok_or_else(|| ProgressionError::ProfileNotFound(user_id.to_string()))?;

            // Zero-amount awards report current totals without logging a
            // transaction.
            if amount == 0 {
                return Ok(AwardResult {
                    new_total_xp: profile.total_xp,
                    new_level: profile.current_level,
                    leveled_up: false,
                    from_level: None,
                    unlocked_content: Vec::new(),
                    unlocked_permissions: Vec::new(),
                    duplicate: false,
                });
            }

            let now = self.clock.now();
            let old_level = profile.current_level;

            let mut updated = profile.clone();
            updated.total_xp += amount;
            updated.recompute_progress();
            updated.version += 1;
            updated.updated_at = now;

            let leveled_up = updated.current_level > old_level;
            let tx = XpTransaction {
                user_id: user_id.to_string(),
                amount,
                reason: reason.to_string(),
                source,
                source_id: source_id.map(String::from),
                resulting_total_xp: updated.total_xp,
                resulting_level: updated.current_level,
                caused_level_up: leveled_up,
                timestamp: now,
            };

            match self.store.commit_award(&updated, profile.version, &tx).await? {
                CommitOutcome::Duplicate(prior) => return Ok(Self::prior_outcome(&prior)),
                CommitOutcome::Conflict => {
                    debug!(
                        "Award commit conflict for user {} (attempt {}), reloading",
                        user_id,
                        attempt + 1
                    );
                    continue;
                }
                CommitOutcome::Committed => {
                    if leveled_up {
                        self.record_level_ups(&updated, old_level, reason, now).await;
                    }
                    return Ok(Self::committed_outcome(&updated, old_level, leveled_up));
                }
            }
        }

        Err(ProgressionError::Conflict(
            user_id.to_string(),
            MAX_COMMIT_ATTEMPTS,
        ))
    }

    /// Append one audit record per boundary crossed, ascending. Best-effort:
    /// the XP commit already landed, so failures here are logged and
    /// swallowed (the history is re-derivable from the transaction log).
    async fn record_level_ups(
        &self,
        profile: &UserProfile,
        old_level: u32,
        reason: &str,
        now: DateTime<Utc>,
    ) {
        let records: Vec<LevelUpRecord> = (old_level..profile.current_level)
            .map(|from| LevelUpRecord {
                user_id: profile.user_id.clone(),
                from_level: from,
                to_level: from + 1,
                total_xp_at_level_up: profile.total_xp,
                timestamp: now,
                trigger_reason: reason.to_string(),
            })
            .collect();

        info!(
            "User {} advanced {} -> {} ({} XP)",
            profile.user_id, old_level, profile.current_level, profile.total_xp
        );

        if let Err(e) = self.store.append_level_ups(&records).await {
            warn!(
                "Level-up history append failed for user {}: {}",
                profile.user_id, e
            );
        }
    }

    fn committed_outcome(profile: &UserProfile, old_level: u32, leveled_up: bool) -> AwardResult {
        let (unlocked_content, unlocked_permissions) = if leveled_up {
            (
                catalog::content_through_level(profile.current_level)
                    .into_iter()
                    .map(String::from)
                    .collect(),
                catalog::effective_permissions(profile.current_level)
                    .into_iter()
                    .map(String::from)
                    .collect(),
            )
        } else {
            (Vec::new(), Vec::new())
        };

        AwardResult {
            new_total_xp: profile.total_xp,
            new_level: profile.current_level,
            leveled_up,
            from_level: leveled_up.then_some(old_level),
            unlocked_content,
            unlocked_permissions,
            duplicate: false,
        }
    }

    /// Reconstruct the result of an already-accepted award from its
    /// transaction record, tagged as a duplicate.
    fn prior_outcome(prior: &XpTransaction) -> AwardResult {
        AwardResult {
            new_total_xp: prior.resulting_total_xp,
            new_level: prior.resulting_level,
            leveled_up: prior.caused_level_up,
            from_level: None,
            unlocked_content: Vec::new(),
            unlocked_permissions: Vec::new(),
            duplicate: true,
        }
    }

    // ========================================================================
    // Permission & Requirement Queries
    // ========================================================================

    pub async fn check_permission(
        &self,
        user_id: &str,
        permission: &str,
    ) -> Result<bool, ProgressionError> {
        let profile = self.require_profile(user_id).await?;
        Ok(catalog::effective_permissions(profile.current_level).contains(&permission))
    }

    pub async fn check_permissions(
        &self,
        user_id: &str,
        permissions: &[String],
    ) -> Result<HashMap<String, bool>, ProgressionError> {
        let profile = self.require_profile(user_id).await?;
        let effective = catalog::effective_permissions(profile.current_level);
        Ok(permissions
            .iter()
            .map(|p| (p.clone(), effective.contains(&p.as_str())))
            .collect())
    }

    pub async fn get_unlocked_content(
        &self,
        user_id: &str,
    ) -> Result<Vec<String>, ProgressionError> {
        let profile = self.require_profile(user_id).await?;
        Ok(profile.unlocked_content)
    }

    /// XP gap and special requirements for entering the next level.
    /// Special requirements are evaluated against the profile's live stats
    /// counters, not stubbed.
    pub async fn check_level_requirements(
        &self,
        user_id: &str,
    ) -> Result<LevelRequirements, ProgressionError> {
        let profile = self.require_profile(user_id).await?;

        let Some(next) = catalog::get_level(profile.current_level + 1) else {
            // Already at the summit of the path
            return Ok(LevelRequirements {
                can_level_up: false,
                next_level: None,
                xp_needed: 0,
                special_requirements: Vec::new(),
            });
        };

        let xp_needed = (next.required_total_xp - profile.total_xp).max(0);
        let special_requirements: Vec<RequirementStatus> = next
            .special_requirements
            .iter()
            .map(|req| {
                let current = profile.stats.counter(req.kind);
                RequirementStatus {
                    description: req.description.to_string(),
                    required: req.threshold,
                    current,
                    satisfied: current >= req.threshold,
                }
            })
            .collect();

        Ok(LevelRequirements {
            can_level_up: xp_needed == 0 && special_requirements.iter().all(|r| r.satisfied),
            next_level: Some(next.level),
            xp_needed,
            special_requirements,
        })
    }

    // ========================================================================
    // Attribute & Stat Updates
    // ========================================================================

    /// Merge an attribute update, clamping each value to [0, 100]
    pub async fn update_attributes(
        &self,
        user_id: &str,
        update: &AttributeUpdate,
    ) -> Result<bool, ProgressionError> {
        self.mutate_profile(user_id, |profile| {
            profile.attributes.apply(update);
            true
        })
        .await
    }

    /// Merge an engagement-stats update
    pub async fn update_stats(
        &self,
        user_id: &str,
        update: &StatsUpdate,
    ) -> Result<bool, ProgressionError> {
        self.mutate_profile(user_id, |profile| {
            profile.stats.apply(update);
            true
        })
        .await
    }

    /// Record a completed task id. Idempotent: returns false when the task
    /// was already recorded, without writing.
    pub async fn complete_task(
        &self,
        user_id: &str,
        task_id: &str,
    ) -> Result<bool, ProgressionError> {
        self.mutate_profile(user_id, |profile| {
            if profile.stats.completed_tasks.iter().any(|t| t == task_id) {
                return false;
            }
            profile.stats.completed_tasks.push(task_id.to_string());
            true
        })
        .await
    }

    /// Read-modify-write on the non-XP profile fields with bounded
    /// conflict retries. The closure returns whether anything changed;
    /// unchanged profiles are not written.
    async fn mutate_profile<F>(&self, user_id: &str, mutate: F) -> Result<bool, ProgressionError>
    where
        F: Fn(&mut UserProfile) -> bool,
    {
        for _ in 0..MAX_COMMIT_ATTEMPTS {
            let mut profile = self.require_profile(user_id).await?;
            let expected_version = profile.version;

            if !mutate(&mut profile) {
                return Ok(false);
            }
            profile.version += 1;
            profile.updated_at = self.clock.now();

            if self.store.update_profile(&profile, expected_version).await? {
                return Ok(true);
            }
        }
        Err(ProgressionError::Conflict(
            user_id.to_string(),
            MAX_COMMIT_ATTEMPTS,
        ))
    }

    // ========================================================================
    // History Queries
    // ========================================================================

    pub async fn get_xp_history(
        &self,
        user_id: &str,
        limit: u32,
    ) -> Result<Vec<XpTransaction>, ProgressionError> {
        Ok(self.store.list_transactions(user_id, limit).await?)
    }

    pub async fn get_level_up_history(
        &self,
        user_id: &str,
        limit: u32,
    ) -> Result<Vec<LevelUpRecord>, ProgressionError> {
        Ok(self.store.list_level_ups(user_id, limit).await?)
    }

    async fn require_profile(&self, user_id: &str) -> Result<UserProfile, ProgressionError> {
        self.store
            .get_profile(user_id)
            .await?
            .ok_or_else(|| ProgressionError::ProfileNotFound(user_id.to_string()))
    }
}
