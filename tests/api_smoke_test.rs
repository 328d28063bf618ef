//! API Smoke Tests
//!
//! Validates that the HTTP API router responds correctly end to end.
//! Runs entirely against the in-memory store — no database needed.

use std::sync::Arc;

use axum::body::Body;
use http::Request;
use serde_json::{json, Value};
use tower::ServiceExt;

use cultivation_server::api::{self, ApiState};
use cultivation_server::engine::ProgressionEngine;
use cultivation_server::metrics::ServerMetrics;
use cultivation_server::storage::memory::MemoryStore;

/// Helper: build the full router over a fresh memory store
fn create_test_router() -> axum::Router {
    let store = Arc::new(MemoryStore::new());
    let engine = Arc::new(ProgressionEngine::with_system_clock(store));
    let state = ApiState {
        engine,
        metrics: ServerMetrics::new(),
    };
    api::build_router(state)
}

/// Helper: POST a JSON body and parse the JSON response
async fn post_json(router: &axum::Router, path: &str, body: Value) -> Value {
    let req = Request::builder()
        .method("POST")
        .uri(path)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();

    let resp = router.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), 200, "POST {} should return 200", path);

    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

// ============================================================================
// Health & Metrics Endpoints
// ============================================================================

#[tokio::test]
async fn test_health_endpoint() {
    let router = create_test_router();

    let req = Request::builder()
        .method("GET")
        .uri("/health")
        .body(Body::empty())
        .unwrap();

    let resp = router.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), 200);

    let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["status"], "ok");
    assert!(!json["version"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn test_metrics_endpoints() {
    let router = create_test_router();

    let req = Request::builder()
        .method("GET")
        .uri("/metrics")
        .body(Body::empty())
        .unwrap();
    let resp = router.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), 200);
    let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("cultivation_requests_total"));
    assert!(text.contains("cultivation_awards_total"));

    let req = Request::builder()
        .method("GET")
        .uri("/metrics/json")
        .body(Body::empty())
        .unwrap();
    let resp = router.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), 200);
    let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert!(json["uptime_secs"].is_number());
    assert!(json["awards_granted"].is_number());
}

// ============================================================================
// Progression Flow
// ============================================================================

#[tokio::test]
async fn test_initialize_award_and_fetch_profile() {
    let router = create_test_router();

    let init = post_json(
        &router,
        "/cultivation.ProgressionService/InitializeProfile",
        json!({"user_id": "u1", "display_name": "Wukong", "email": "wukong@example.com"}),
    )
    .await;
    assert_eq!(init["success"], true);
    assert_eq!(init["profile"]["current_level"], 0);

    let award = post_json(
        &router,
        "/cultivation.ProgressionService/AwardXp",
        json!({
            "user_id": "u1",
            "amount": 120,
            "reason": "read ch1",
            "source": "reading",
            "source_id": "ch-1"
        }),
    )
    .await;
    assert_eq!(award["success"], true);
    assert_eq!(award["result"]["new_total_xp"], 120);
    assert_eq!(award["result"]["new_level"], 1);
    assert_eq!(award["result"]["leveled_up"], true);
    assert_eq!(award["result"]["from_level"], 0);
    assert_eq!(award["result"]["duplicate"], false);

    let profile = post_json(
        &router,
        "/cultivation.ProgressionService/GetProfile",
        json!({"user_id": "u1"}),
    )
    .await;
    assert_eq!(profile["profile"]["total_xp"], 120);
    assert_eq!(profile["profile"]["current_level"], 1);
    assert_eq!(profile["profile"]["current_xp"], 20);
}

#[tokio::test]
async fn test_award_replay_reports_duplicate() {
    let router = create_test_router();
    post_json(
        &router,
        "/cultivation.ProgressionService/InitializeProfile",
        json!({"user_id": "u1", "display_name": "Wukong", "email": "w@example.com"}),
    )
    .await;

    let body = json!({
        "user_id": "u1",
        "amount": 50,
        "reason": "task done",
        "source": "task",
        "source_id": "task-7"
    });
    let first = post_json(&router, "/cultivation.ProgressionService/AwardXp", body.clone()).await;
    let second = post_json(&router, "/cultivation.ProgressionService/AwardXp", body).await;

    assert_eq!(first["result"]["duplicate"], false);
    assert_eq!(second["success"], true);
    assert_eq!(second["result"]["duplicate"], true);
    assert_eq!(second["result"]["new_total_xp"], 50, "totals unchanged");

    let history = post_json(
        &router,
        "/cultivation.ProgressionService/GetXpHistory",
        json!({"user_id": "u1"}),
    )
    .await;
    assert_eq!(history["transactions"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_award_for_unknown_user_reports_failure() {
    let router = create_test_router();

    let resp = post_json(
        &router,
        "/cultivation.ProgressionService/AwardXp",
        json!({
            "user_id": "ghost",
            "amount": 10,
            "reason": "reading",
            "source": "reading"
        }),
    )
    .await;
    assert_eq!(resp["success"], false);
    assert!(resp["failure_reason"]
        .as_str()
        .unwrap()
        .contains("no profile"));
}

#[tokio::test]
async fn test_check_permissions_endpoint() {
    let router = create_test_router();
    post_json(
        &router,
        "/cultivation.ProgressionService/InitializeProfile",
        json!({"user_id": "u1", "display_name": "Wukong", "email": "w@example.com"}),
    )
    .await;

    let resp = post_json(
        &router,
        "/cultivation.ProgressionService/CheckPermissions",
        json!({"user_id": "u1", "permissions": ["read_chapters", "create_post"]}),
    )
    .await;
    assert_eq!(resp["success"], true);
    assert_eq!(resp["granted"]["read_chapters"], true);
    assert_eq!(resp["granted"]["create_post"], false);
}

#[tokio::test]
async fn test_update_stats_and_level_requirements() {
    let router = create_test_router();
    post_json(
        &router,
        "/cultivation.ProgressionService/InitializeProfile",
        json!({"user_id": "u1", "display_name": "Wukong", "email": "w@example.com"}),
    )
    .await;

    let updated = post_json(
        &router,
        "/cultivation.ProgressionService/UpdateStats",
        json!({"user_id": "u1", "stats": {"chapters_read": 5}}),
    )
    .await;
    assert_eq!(updated["success"], true);
    assert_eq!(updated["updated"], true);

    let reqs = post_json(
        &router,
        "/cultivation.ProgressionService/CheckLevelRequirements",
        json!({"user_id": "u1"}),
    )
    .await;
    assert_eq!(reqs["success"], true);
    assert_eq!(reqs["requirements"]["next_level"], 1);
    assert_eq!(reqs["requirements"]["xp_needed"], 100);
}

#[tokio::test]
async fn test_complete_task_endpoint_idempotent() {
    let router = create_test_router();
    post_json(
        &router,
        "/cultivation.ProgressionService/InitializeProfile",
        json!({"user_id": "u1", "display_name": "Wukong", "email": "w@example.com"}),
    )
    .await;

    let body = json!({"user_id": "u1", "task_id": "daily-read"});
    let first = post_json(&router, "/cultivation.ProgressionService/CompleteTask", body.clone()).await;
    let second = post_json(&router, "/cultivation.ProgressionService/CompleteTask", body).await;

    assert_eq!(first["updated"], true);
    assert_eq!(second["success"], true);
    assert_eq!(second["updated"], false, "repeat completion is a no-op");
}

#[tokio::test]
async fn test_get_unlocked_content_endpoint() {
    let router = create_test_router();
    post_json(
        &router,
        "/cultivation.ProgressionService/InitializeProfile",
        json!({"user_id": "u1", "display_name": "Wukong", "email": "w@example.com"}),
    )
    .await;
    post_json(
        &router,
        "/cultivation.ProgressionService/AwardXp",
        json!({
            "user_id": "u1",
            "amount": 700,
            "reason": "marathon",
            "source": "reading",
            "source_id": "m-1"
        }),
    )
    .await;

    let resp = post_json(
        &router,
        "/cultivation.ProgressionService/GetUnlockedContent",
        json!({"user_id": "u1"}),
    )
    .await;
    let content = resp["content"].as_array().unwrap();
    assert!(content.iter().any(|c| c == "chapters_1_10"));
    assert!(content.iter().any(|c| c == "chapters_51_75"));

    let levels = post_json(
        &router,
        "/cultivation.ProgressionService/GetLevelUpHistory",
        json!({"user_id": "u1"}),
    )
    .await;
    assert_eq!(levels["level_ups"].as_array().unwrap().len(), 3);
}
