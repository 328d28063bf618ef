//! Level Catalog — static definition of the Cultivation Path
//!
//! Immutable, ordered table of level definitions: XP thresholds, the
//! permissions granted at each stage, the content unlocked, and optional
//! non-XP requirements. Everything here is pure and deterministic; safe to
//! call from any thread without locking.

use serde::Serialize;

/// One stage on the Cultivation Path (levels 0..=7)
#[derive(Debug, Clone, Serialize)]
pub struct LevelDefinition {
    pub level: u32,
    pub name: &'static str,
    /// Total XP needed to *enter* this level (monotonically increasing)
    pub required_total_xp: i64,
    /// Permission tokens granted at this level (effective set is cumulative)
    pub permissions: &'static [&'static str],
    /// Content made available on reaching this level
    pub unlocked_content: &'static [&'static str],
    /// Non-XP gates, evaluated against the profile's engagement stats
    pub special_requirements: &'static [SpecialRequirement],
}

/// A non-XP gate for entering a level
#[derive(Debug, Clone, Serialize)]
pub struct SpecialRequirement {
    pub kind: RequirementKind,
    pub threshold: i64,
    pub description: &'static str,
}

/// Which engagement counter a special requirement reads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RequirementKind {
    ChaptersRead,
    PostsCreated,
    CommentsCreated,
    StreakDays,
    PoemsComposed,
}

// ============================================================================
// The Cultivation Path
// ============================================================================

pub const LEVELS: &[LevelDefinition] = &[
    LevelDefinition {
        level: 0,
        name: "Mortal",
        required_total_xp: 0,
        permissions: &["read_chapters", "use_ai_explain"],
        unlocked_content: &["chapters_1_10", "reading_guide"],
        special_requirements: &[],
    },
    LevelDefinition {
        level: 1,
        name: "Qi Refinement",
        required_total_xp: 100,
        permissions: &["create_comment", "like_post"],
        unlocked_content: &["chapters_11_25", "character_map"],
        special_requirements: &[],
    },
    LevelDefinition {
        level: 2,
        name: "Foundation Establishment",
        required_total_xp: 300,
        permissions: &["create_post"],
        unlocked_content: &["chapters_26_50", "annotation_notes"],
        special_requirements: &[],
    },
    LevelDefinition {
        level: 3,
        name: "Golden Core",
        required_total_xp: 600,
        permissions: &["compose_poetry"],
        unlocked_content: &["chapters_51_75", "poetry_anthology"],
        special_requirements: &[],
    },
    LevelDefinition {
        level: 4,
        name: "Nascent Soul",
        required_total_xp: 1_000,
        permissions: &["create_collection"],
        unlocked_content: &["chapters_76_100", "scholar_commentary"],
        special_requirements: &[],
    },
    LevelDefinition {
        level: 5,
        name: "Spirit Severing",
        required_total_xp: 2_000,
        permissions: &["mentor_users"],
        unlocked_content: &["rare_manuscripts"],
        special_requirements: &[SpecialRequirement {
            kind: RequirementKind::ChaptersRead,
            threshold: 40,
            description: "Read at least 40 chapters",
        }],
    },
    LevelDefinition {
        level: 6,
        name: "Void Refinement",
        required_total_xp: 3_500,
        permissions: &["curate_content"],
        unlocked_content: &["critical_editions"],
        special_requirements: &[
            SpecialRequirement {
                kind: RequirementKind::PostsCreated,
                threshold: 10,
                description: "Author at least 10 community posts",
            },
            SpecialRequirement {
                kind: RequirementKind::StreakDays,
                threshold: 7,
                description: "Keep a 7-day reading streak",
            },
        ],
    },
    LevelDefinition {
        level: 7,
        name: "Ascension",
        required_total_xp: 6_000,
        permissions: &["moderate_community"],
        unlocked_content: &["master_archive"],
        special_requirements: &[
            SpecialRequirement {
                kind: RequirementKind::ChaptersRead,
                threshold: 100,
                description: "Read all 100 chapters",
            },
            SpecialRequirement {
                kind: RequirementKind::PoemsComposed,
                threshold: 5,
                description: "Compose at least 5 poems",
            },
        ],
    },
];

// ============================================================================
// Lookup Functions
// ============================================================================

/// Highest level on the path
pub fn max_level() -> u32 {
    (LEVELS.len() - 1) as u32
}

/// Definition for a specific level, if it exists
pub fn get_level(level: u32) -> Option<&'static LevelDefinition> {
    LEVELS.get(level as usize)
}

/// Highest level whose entry threshold is satisfied by `total_xp`.
///
/// Total over all non-negative XP values: anything below the first
/// non-zero threshold maps to level 0.
pub fn level_from_xp(total_xp: i64) -> u32 {
    LEVELS
        .iter()
        .rposition(|def| total_xp >= def.required_total_xp)
        .unwrap_or(0) as u32
}

/// Display progress within the current level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct XpProgress {
    /// XP earned since entering the current level
    pub current_xp: i64,
    /// XP span of the current level, absent at max level
    pub next_level_xp: Option<i64>,
}

/// XP earned within the current level and the span to the next one
pub fn xp_progress(total_xp: i64) -> XpProgress {
    let level = level_from_xp(total_xp);
    let base = LEVELS[level as usize].required_total_xp;
    let next_level_xp = LEVELS
        .get(level as usize + 1)
        .map(|next| next.required_total_xp - base);

    XpProgress {
        current_xp: total_xp - base,
        next_level_xp,
    }
}

/// Union of permission tokens over levels 0..=`level`, in catalog order
pub fn effective_permissions(level: u32) -> Vec<&'static str> {
    let mut perms = Vec::new();
    for def in LEVELS.iter().take(level as usize + 1) {
        for p in def.permissions {
            if !perms.contains(p) {
                perms.push(*p);
            }
        }
    }
    perms
}

/// Union of content ids over levels 0..=`level`, in catalog order
pub fn content_through_level(level: u32) -> Vec<&'static str> {
    let mut content = Vec::new();
    for def in LEVELS.iter().take(level as usize + 1) {
        for c in def.unlocked_content {
            if !content.contains(c) {
                content.push(*c);
            }
        }
    }
    content
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levels_densely_ordered() {
        for (idx, def) in LEVELS.iter().enumerate() {
            assert_eq!(def.level as usize, idx, "levels must be dense from 0");
        }
    }

    #[test]
    fn test_thresholds_strictly_increasing() {
        for pair in LEVELS.windows(2) {
            assert!(
                pair[1].required_total_xp > pair[0].required_total_xp,
                "threshold for level {} must exceed level {}",
                pair[1].level,
                pair[0].level
            );
        }
        assert_eq!(LEVELS[0].required_total_xp, 0, "level 0 starts at 0 XP");
    }

    #[test]
    fn test_level_from_xp_boundaries() {
        assert_eq!(level_from_xp(0), 0);
        assert_eq!(level_from_xp(99), 0);
        assert_eq!(level_from_xp(100), 1);
        assert_eq!(level_from_xp(299), 1);
        assert_eq!(level_from_xp(300), 2);
        assert_eq!(level_from_xp(6_000), 7);
        assert_eq!(level_from_xp(i64::MAX), max_level());
    }

    #[test]
    fn test_level_from_xp_is_total() {
        // Every non-negative XP value maps to the largest satisfied threshold
        for xp in 0..7_000 {
            let level = level_from_xp(xp);
            assert!(xp >= LEVELS[level as usize].required_total_xp);
            if let Some(next) = LEVELS.get(level as usize + 1) {
                assert!(xp < next.required_total_xp);
            }
        }
    }

    #[test]
    fn test_xp_progress_invariant() {
        for xp in 0..7_000 {
            let p = xp_progress(xp);
            assert!(p.current_xp >= 0, "current_xp negative at {}", xp);
            if let Some(span) = p.next_level_xp {
                assert!(
                    p.current_xp < span,
                    "current_xp {} >= span {} at total {}",
                    p.current_xp,
                    span,
                    xp
                );
            }
        }
        // At max level there is no next span
        assert_eq!(xp_progress(10_000).next_level_xp, None);
    }

    #[test]
    fn test_effective_permissions_cumulative() {
        let mortal = effective_permissions(0);
        assert!(mortal.contains(&"read_chapters"));
        assert!(!mortal.contains(&"create_post"));

        let core = effective_permissions(3);
        // Lower-level grants are retained
        assert!(core.contains(&"read_chapters"));
        assert!(core.contains(&"create_comment"));
        assert!(core.contains(&"create_post"));
        assert!(core.contains(&"compose_poetry"));
        assert!(!core.contains(&"moderate_community"));

        // Each level adds at least one permission, so the set grows
        for level in 1..=max_level() {
            assert!(
                effective_permissions(level).len() > effective_permissions(level - 1).len()
            );
        }
    }

    #[test]
    fn test_content_through_level() {
        let content = content_through_level(1);
        assert!(content.contains(&"chapters_1_10"));
        assert!(content.contains(&"chapters_11_25"));
        assert!(!content.contains(&"rare_manuscripts"));
    }

    #[test]
    fn test_get_level_bounds() {
        assert!(get_level(0).is_some());
        assert!(get_level(max_level()).is_some());
        assert!(get_level(max_level() + 1).is_none());
    }
}
