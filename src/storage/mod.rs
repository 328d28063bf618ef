//! Storage Layer — persistence for the progression engine
//!
//! Implements the Repository pattern behind one trait:
//!
//! ```text
//! [ProgressionEngine]
//!       ↓
//! [ProgressionStore trait]
//!       ↓
//! ┌──────────────┬───────────────┐
//! │ MemoryStore  │ PostgresStore │
//! │ (tests/dev)  │ (production)  │
//! └──────────────┴───────────────┘
//! ```
//!
//! ## Usage
//! ```rust,ignore
//! let store = storage::init_store(Some("postgres://..."), 10).await?;
//! let profile = store.get_profile("user-1").await?;
//! ```

pub mod memory;
pub mod migrations;
pub mod postgres;
pub mod repository;

use std::sync::Arc;
use tracing::info;

use self::memory::MemoryStore;
use self::postgres::PostgresStore;
use self::repository::ProgressionStore;

/// Initialize the storage backend.
///
/// With a database URL: PostgreSQL with migrations applied. Without one:
/// the in-process memory store (development and tests).
pub async fn init_store(
    database_url: Option<&str>,
    pg_max_connections: u32,
) -> anyhow::Result<Arc<dyn ProgressionStore>> {
    match database_url {
        Some(url) => {
            let store = PostgresStore::new(url, pg_max_connections).await?;
            info!("PostgreSQL progression store initialized");
            Ok(Arc::new(store))
        }
        None => {
            info!("No DATABASE_URL set, using in-memory progression store");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}
