use std::sync::Arc;

use tracing::info;

use cultivation_server::engine::ProgressionEngine;
use cultivation_server::{api, storage};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .init();

    info!("Starting Cultivation Path progression server...");

    // ========================================================================
    // 1. Storage backend (PostgreSQL when DATABASE_URL is set, else memory)
    // ========================================================================
    let database_url = std::env::var("DATABASE_URL").ok();
    let pg_max_connections: u32 = std::env::var("PG_MAX_CONNECTIONS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(10);

    let store = storage::init_store(database_url.as_deref(), pg_max_connections).await?;

    // ========================================================================
    // 2. Progression engine
    // ========================================================================
    let engine = Arc::new(ProgressionEngine::with_system_clock(store));

    // ========================================================================
    // 3. HTTP API server (blocks until shutdown)
    // ========================================================================
    let port: u16 = std::env::var("API_PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(50051);

    api::start_api_server(engine, port)
        .await
        .map_err(|e| anyhow::anyhow!("API server error: {}", e))?;

    Ok(())
}
