//! Cultivation Path Progression Server Library
//!
//! Core modules for the progression service behind the classical-novel
//! study app:
//! - Level catalog (static thresholds, permissions, unlockable content)
//! - Progression engine (idempotent XP awards, cascading level-ups)
//! - Storage layer (repository trait, in-memory + PostgreSQL backends)
//! - HTTP/JSON API endpoints for the web client

pub mod catalog; // Static level definitions and pure lookups
pub mod model; // Profiles, transactions, level-up records
pub mod engine; // Progression core (award, queries, updates)
pub mod storage; // Repository trait + memory/PostgreSQL backends
pub mod api; // HTTP/JSON API endpoints
pub mod metrics; // Server metrics (Prometheus + JSON export)

// Re-export commonly used types
pub use engine::{ProgressionEngine, ProgressionError, SystemClock};
pub use model::{AwardResult, UserProfile, XpSource};
pub use storage::memory::MemoryStore;
pub use storage::postgres::PostgresStore;
