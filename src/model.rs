//! Domain types — profiles, transactions, level-up records
//!
//! The progression engine exclusively owns writes to all three record kinds;
//! everything else in the application goes through its operations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::catalog::{self, RequirementKind};

// ============================================================================
// XP Sources
// ============================================================================

/// Closed set of reward origins. `source_id` idempotency applies regardless
/// of the category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum XpSource {
    Reading,
    Task,
    Community,
    Poetry,
    AiInteraction,
    Achievement,
    Admin,
}

impl XpSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            XpSource::Reading => "reading",
            XpSource::Task => "task",
            XpSource::Community => "community",
            XpSource::Poetry => "poetry",
            XpSource::AiInteraction => "ai_interaction",
            XpSource::Achievement => "achievement",
            XpSource::Admin => "admin",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "reading" => Some(XpSource::Reading),
            "task" => Some(XpSource::Task),
            "community" => Some(XpSource::Community),
            "poetry" => Some(XpSource::Poetry),
            "ai_interaction" => Some(XpSource::AiInteraction),
            "achievement" => Some(XpSource::Achievement),
            "admin" => Some(XpSource::Admin),
            _ => None,
        }
    }
}

// ============================================================================
// Attributes & Stats
// ============================================================================

/// Five independent scholar attributes, each clamped to [0, 100].
/// Incremented by gameplay actions outside this engine; the engine only
/// clamps and persists them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attributes {
    pub comprehension: i16,
    pub diligence: i16,
    pub insight: i16,
    pub eloquence: i16,
    pub virtue: i16,
}

pub const ATTRIBUTE_MAX: i16 = 100;

fn clamp_attr(value: i16) -> i16 {
    value.clamp(0, ATTRIBUTE_MAX)
}

impl Attributes {
    /// Merge a partial update, clamping every touched field
    pub fn apply(&mut self, update: &AttributeUpdate) {
        if let Some(v) = update.comprehension {
            self.comprehension = clamp_attr(v);
        }
        if let Some(v) = update.diligence {
            self.diligence = clamp_attr(v);
        }
        if let Some(v) = update.insight {
            self.insight = clamp_attr(v);
        }
        if let Some(v) = update.eloquence {
            self.eloquence = clamp_attr(v);
        }
        if let Some(v) = update.virtue {
            self.virtue = clamp_attr(v);
        }
    }
}

/// Partial attribute write; absent fields are left untouched
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AttributeUpdate {
    pub comprehension: Option<i16>,
    pub diligence: Option<i16>,
    pub insight: Option<i16>,
    pub eloquence: Option<i16>,
    pub virtue: Option<i16>,
}

/// Engagement counters maintained by external collaborators and persisted
/// opaquely here. Special level requirements read these.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudyStats {
    pub total_read_minutes: i64,
    pub chapters_read: i64,
    pub posts_created: i64,
    pub comments_created: i64,
    pub likes_received: i64,
    pub current_streak_days: i64,
    pub longest_streak_days: i64,
    pub ai_conversations: i64,
    pub poems_composed: i64,
    pub completed_tasks: Vec<String>,
}

impl StudyStats {
    /// Merge a partial update; absent fields are left untouched
    pub fn apply(&mut self, update: &StatsUpdate) {
        if let Some(v) = update.total_read_minutes {
            self.total_read_minutes = v;
        }
        if let Some(v) = update.chapters_read {
            self.chapters_read = v;
        }
        if let Some(v) = update.posts_created {
            self.posts_created = v;
        }
        if let Some(v) = update.comments_created {
            self.comments_created = v;
        }
        if let Some(v) = update.likes_received {
            self.likes_received = v;
        }
        if let Some(v) = update.current_streak_days {
            self.current_streak_days = v;
            if v > self.longest_streak_days {
                self.longest_streak_days = v;
            }
        }
        if let Some(v) = update.ai_conversations {
            self.ai_conversations = v;
        }
        if let Some(v) = update.poems_composed {
            self.poems_composed = v;
        }
    }

    /// Counter backing a given special-requirement kind
    pub fn counter(&self, kind: RequirementKind) -> i64 {
        match kind {
            RequirementKind::ChaptersRead => self.chapters_read,
            RequirementKind::PostsCreated => self.posts_created,
            RequirementKind::CommentsCreated => self.comments_created,
            RequirementKind::StreakDays => self.current_streak_days,
            RequirementKind::PoemsComposed => self.poems_composed,
        }
    }
}

/// Partial stats write; absent fields are left untouched
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatsUpdate {
    pub total_read_minutes: Option<i64>,
    pub chapters_read: Option<i64>,
    pub posts_created: Option<i64>,
    pub comments_created: Option<i64>,
    pub likes_received: Option<i64>,
    pub current_streak_days: Option<i64>,
    pub ai_conversations: Option<i64>,
    pub poems_composed: Option<i64>,
}

// ============================================================================
// User Profile
// ============================================================================

/// One user's durable progression record.
///
/// `current_level` is always `catalog::level_from_xp(total_xp)` — recomputed
/// on every accepted reward, never stored out of sync. `version` is the
/// optimistic-concurrency token bumped by every committed write.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: String,
    pub display_name: String,
    pub email: String,
    pub total_xp: i64,
    pub current_level: u32,
    /// XP earned since entering the current level (display value)
    pub current_xp: i64,
    /// XP span of the current level, absent at max level (display value)
    pub next_level_xp: Option<i64>,
    pub unlocked_content: Vec<String>,
    pub attributes: Attributes,
    pub stats: StudyStats,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserProfile {
    /// Fresh level-0 profile
    pub fn new(user_id: &str, display_name: &str, email: &str, now: DateTime<Utc>) -> Self {
        let mut profile = Self {
            user_id: user_id.to_string(),
            display_name: display_name.to_string(),
            email: email.to_string(),
            total_xp: 0,
            current_level: 0,
            current_xp: 0,
            next_level_xp: None,
            unlocked_content: Vec::new(),
            attributes: Attributes::default(),
            stats: StudyStats::default(),
            version: 0,
            created_at: now,
            updated_at: now,
        };
        profile.recompute_progress();
        profile
    }

    /// Re-derive level, display XP, and the content union from `total_xp`.
    ///
    /// Unioning content from the catalog is idempotent, so re-running this
    /// after the fact is always safe.
    pub fn recompute_progress(&mut self) {
        self.current_level = catalog::level_from_xp(self.total_xp);
        let progress = catalog::xp_progress(self.total_xp);
        self.current_xp = progress.current_xp;
        self.next_level_xp = progress.next_level_xp;

        for content in catalog::content_through_level(self.current_level) {
            if !self.unlocked_content.iter().any(|c| c == content) {
                self.unlocked_content.push(content.to_string());
            }
        }
    }
}

// ============================================================================
// Append-only Records
// ============================================================================

/// One accepted XP reward. At most one transaction may ever exist for a
/// given `(user_id, source_id)` pair when a source id is provided.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct XpTransaction {
    pub user_id: String,
    pub amount: i64,
    pub reason: String,
    pub source: XpSource,
    pub source_id: Option<String>,
    pub resulting_total_xp: i64,
    pub resulting_level: u32,
    pub caused_level_up: bool,
    pub timestamp: DateTime<Utc>,
}

/// One level boundary crossed. A single large award can produce several of
/// these, in ascending order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LevelUpRecord {
    pub user_id: String,
    pub from_level: u32,
    pub to_level: u32,
    pub total_xp_at_level_up: i64,
    pub timestamp: DateTime<Utc>,
    pub trigger_reason: String,
}

// ============================================================================
// Operation Results
// ============================================================================

/// Outcome of `award_xp`. `duplicate` reports idempotent absorption of a
/// retried source id; callers should not show a second notification for it.
#[derive(Debug, Clone, Serialize)]
pub struct AwardResult {
    pub new_total_xp: i64,
    pub new_level: u32,
    pub leveled_up: bool,
    pub from_level: Option<u32>,
    pub unlocked_content: Vec<String>,
    pub unlocked_permissions: Vec<String>,
    pub duplicate: bool,
}

/// Answer to `check_level_requirements`
#[derive(Debug, Clone, Serialize)]
pub struct LevelRequirements {
    pub can_level_up: bool,
    /// Next level on the path, absent at max level
    pub next_level: Option<u32>,
    /// XP still missing for the next threshold (0 when satisfied or at max)
    pub xp_needed: i64,
    pub special_requirements: Vec<RequirementStatus>,
}

/// Evaluation of one special requirement against the profile's stats
#[derive(Debug, Clone, Serialize)]
pub struct RequirementStatus {
    pub description: String,
    pub required: i64,
    pub current: i64,
    pub satisfied: bool,
}

// ============================================================================
// Tests
// ============================================================================
