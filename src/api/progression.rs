//! ProgressionService — Cultivation Path endpoints
//!
//! Endpoints:
//! - POST /cultivation.ProgressionService/InitializeProfile
//! - POST /cultivation.ProgressionService/GetProfile
//! - POST /cultivation.ProgressionService/AwardXp
//! - POST /cultivation.ProgressionService/CheckPermission
//! - POST /cultivation.ProgressionService/CheckPermissions
//! - POST /cultivation.ProgressionService/GetUnlockedContent
//! - POST /cultivation.ProgressionService/CheckLevelRequirements
//! - POST /cultivation.ProgressionService/UpdateAttributes
//! - POST /cultivation.ProgressionService/UpdateStats
//! - POST /cultivation.ProgressionService/CompleteTask
//! - POST /cultivation.ProgressionService/GetXpHistory
//! - POST /cultivation.ProgressionService/GetLevelUpHistory

use axum::{extract::State, routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::ApiState;
use crate::model::{
    AttributeUpdate, AwardResult, LevelRequirements, LevelUpRecord, StatsUpdate, UserProfile,
    XpSource, XpTransaction,
};

pub fn routes() -> Router<ApiState> {
    Router::new()
        .route(
            "/cultivation.ProgressionService/InitializeProfile",
            post(initialize_profile),
        )
        .route("/cultivation.ProgressionService/GetProfile", post(get_profile))
        .route("/cultivation.ProgressionService/AwardXp", post(award_xp))
        .route(
            "/cultivation.ProgressionService/CheckPermission",
            post(check_permission),
        )
        .route(
            "/cultivation.ProgressionService/CheckPermissions",
            post(check_permissions),
        )
        .route(
            "/cultivation.ProgressionService/GetUnlockedContent",
            post(get_unlocked_content),
        )
        .route(
            "/cultivation.ProgressionService/CheckLevelRequirements",
            post(check_level_requirements),
        )
        .route(
            "/cultivation.ProgressionService/UpdateAttributes",
            post(update_attributes),
        )
        .route(
            "/cultivation.ProgressionService/UpdateStats",
            post(update_stats),
        )
        .route(
            "/cultivation.ProgressionService/CompleteTask",
            post(complete_task),
        )
        .route(
            "/cultivation.ProgressionService/GetXpHistory",
            post(get_xp_history),
        )
        .route(
            "/cultivation.ProgressionService/GetLevelUpHistory",
            post(get_level_up_history),
        )
}

/// Default page size for the history endpoints
const DEFAULT_HISTORY_LIMIT: u32 = 50;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Deserialize)]
pub struct InitializeProfileRequest {
    pub user_id: String,
    pub display_name: String,
    pub email: String,
}

#[derive(Deserialize)]
pub struct UserRequest {
    pub user_id: String,
}

#[derive(Serialize)]
pub struct ProfileResponse {
    pub success: bool,
    pub failure_reason: String,
    pub profile: Option<UserProfile>,
}

#[derive(Deserialize)]
pub struct AwardXpRequest {
    pub user_id: String,
    pub amount: i64,
    pub reason: String,
    pub source: XpSource,
    pub source_id: Option<String>,
}

#[derive(Serialize)]
pub struct AwardXpResponse {
    pub success: bool,
    pub failure_reason: String,
    pub result: Option<AwardResult>,
}

#[derive(Deserialize)]
pub struct CheckPermissionRequest {
    pub user_id: String,
    pub permission: String,
}

#[derive(Serialize)]
pub struct CheckPermissionResponse {
    pub success: bool,
    pub failure_reason: String,
    pub granted: bool,
}

#[derive(Deserialize)]
pub struct CheckPermissionsRequest {
    pub user_id: String,
    pub permissions: Vec<String>,
}

#[derive(Serialize)]
pub struct CheckPermissionsResponse {
    pub success: bool,
    pub failure_reason: String,
    pub granted: HashMap<String, bool>,
}

#[derive(Serialize)]
pub struct UnlockedContentResponse {
    pub success: bool,
    pub failure_reason: String,
    pub content: Vec<String>,
}

#[derive(Serialize)]
pub struct LevelRequirementsResponse {
    pub success: bool,
    pub failure_reason: String,
    pub requirements: Option<LevelRequirements>,
}

#[derive(Deserialize)]
pub struct UpdateAttributesRequest {
    pub user_id: String,
    pub attributes: AttributeUpdate,
}

#[derive(Deserialize)]
pub struct UpdateStatsRequest {
    pub user_id: String,
    pub stats: StatsUpdate,
}

#[derive(Deserialize)]
pub struct CompleteTaskRequest {
    pub user_id: String,
    pub task_id: String,
}

#[derive(Serialize)]
pub struct UpdateResponse {
    pub success: bool,
    pub failure_reason: String,
    pub updated: bool,
}

#[derive(Deserialize)]
pub struct HistoryRequest {
    pub user_id: String,
    pub limit: Option<u32>,
}

#[derive(Serialize)]
pub struct XpHistoryResponse {
    pub success: bool,
    pub failure_reason: String,
    pub transactions: Vec<XpTransaction>,
}

#[derive(Serialize)]
pub struct LevelUpHistoryResponse {
    pub success: bool,
    pub failure_reason: String,
    pub level_ups: Vec<LevelUpRecord>,
}

// ============================================================================
// Handlers
// ============================================================================

async fn initialize_profile(
    State(state): State<ApiState>,
    Json(req): Json<InitializeProfileRequest>,
) -> Json<ProfileResponse> {
    match state
        .engine
        .initialize_profile(&req.user_id, &req.display_name, &req.email)
        .await
    {
        Ok(profile) => Json(ProfileResponse {
            success: true,
            failure_reason: String::new(),
            profile: Some(profile),
        }),
        Err(e) => {
            tracing::error!("InitializeProfile failed for {}: {}", req.user_id, e);
            Json(ProfileResponse {
                success: false,
                failure_reason: e.to_string(),
                profile: None,
            })
        }
    }
}

async fn get_profile(
    State(state): State<ApiState>,
    Json(req): Json<UserRequest>,
) -> Json<ProfileResponse> {
    match state.engine.get_profile(&req.user_id).await {
        Ok(profile) => Json(ProfileResponse {
            success: true,
            failure_reason: String::new(),
            profile,
        }),
        Err(e) => {
            tracing::error!("GetProfile failed for {}: {}", req.user_id, e);
            Json(ProfileResponse {
                success: false,
                failure_reason: e.to_string(),
                profile: None,
            })
        }
    }
}

async fn award_xp(
    State(state): State<ApiState>,
    Json(req): Json<AwardXpRequest>,
) -> Json<AwardXpResponse> {
    match state
        .engine
        .award_xp(
            &req.user_id,
            req.amount,
            &req.reason,
            req.source,
            req.source_id.as_deref(),
        )
        .await
    {
        Ok(result) => {
            state.metrics.record_award(result.duplicate, result.leveled_up);
            Json(AwardXpResponse {
                success: true,
                failure_reason: String::new(),
                result: Some(result),
            })
        }
        Err(e) => {
            tracing::error!("AwardXp failed for {}: {}", req.user_id, e);
            Json(AwardXpResponse {
                success: false,
                failure_reason: e.to_string(),
                result: None,
            })
        }
    }
}

async fn check_permission(
    State(state): State<ApiState>,
    Json(req): Json<CheckPermissionRequest>,
) -> Json<CheckPermissionResponse> {
    match state
        .engine
        .check_permission(&req.user_id, &req.permission)
        .await
    {
        Ok(granted) => Json(CheckPermissionResponse {
            success: true,
            failure_reason: String::new(),
            granted,
        }),
        Err(e) => {
            tracing::error!("CheckPermission failed for {}: {}", req.user_id, e);
            Json(CheckPermissionResponse {
                success: false,
                failure_reason: e.to_string(),
                granted: false,
            })
        }
    }
}

async fn check_permissions(
    State(state): State<ApiState>,
    Json(req): Json<CheckPermissionsRequest>,
) -> Json<CheckPermissionsResponse> {
    match state
        .engine
        .check_permissions(&req.user_id, &req.permissions)
        .await
    {
        Ok(granted) => Json(CheckPermissionsResponse {
            success: true,
            failure_reason: String::new(),
            granted,
        }),
        Err(e) => {
            tracing::error!("CheckPermissions failed for {}: {}", req.user_id, e);
            Json(CheckPermissionsResponse {
                success: false,
                failure_reason: e.to_string(),
                granted: HashMap::new(),
            })
        }
    }
}

async fn get_unlocked_content(
    State(state): State<ApiState>,
    Json(req): Json<UserRequest>,
) -> Json<UnlockedContentResponse> {
    match state.engine.get_unlocked_content(&req.user_id).await {
        Ok(content) => Json(UnlockedContentResponse {
            success: true,
            failure_reason: String::new(),
            content,
        }),
        Err(e) => {
            tracing::error!("GetUnlockedContent failed for {}: {}", req.user_id, e);
            Json(UnlockedContentResponse {
                success: false,
                failure_reason: e.to_string(),
                content: Vec::new(),
            })
        }
    }
}

async fn check_level_requirements(
    State(state): State<ApiState>,
    Json(req): Json<UserRequest>,
) -> Json<LevelRequirementsResponse> {
    match state.engine.check_level_requirements(&req.user_id).await {
        Ok(requirements) => Json(LevelRequirementsResponse {
            success: true,
            failure_reason: String::new(),
            requirements: Some(requirements),
        }),
        Err(e) => {
            tracing::error!("CheckLevelRequirements failed for {}: {}", req.user_id, e);
            Json(LevelRequirementsResponse {
                success: false,
                failure_reason: e.to_string(),
                requirements: None,
            })
        }
    }
}

async fn update_attributes(
    State(state): State<ApiState>,
    Json(req): Json<UpdateAttributesRequest>,
) -> Json<UpdateResponse> {
    match state
        .engine
        .update_attributes(&req.user_id, &req.attributes)
        .await
    {
        Ok(updated) => Json(UpdateResponse {
            success: true,
            failure_reason: String::new(),
            updated,
        }),
        Err(e) => {
            tracing::error!("UpdateAttributes failed for {}: {}", req.user_id, e);
            Json(UpdateResponse {
                success: false,
                failure_reason: e.to_string(),
                updated: false,
            })
        }
    }
}

async fn update_stats(
    State(state): State<ApiState>,
    Json(req): Json<UpdateStatsRequest>,
) -> Json<UpdateResponse> {
    match state.engine.update_stats(&req.user_id, &req.stats).await {
        Ok(updated) => Json(UpdateResponse {
            success: true,
            failure_reason: String::new(),
            updated,
        }),
        Err(e) => {
            tracing::error!("UpdateStats failed for {}: {}", req.user_id, e);
            Json(UpdateResponse {
                success: false,
                failure_reason: e.to_string(),
                updated: false,
            })
        }
    }
}

async fn complete_task(
    State(state): State<ApiState>,
    Json(req): Json<CompleteTaskRequest>,
) -> Json<UpdateResponse> {
    match state.engine.complete_task(&req.user_id, &req.task_id).await {
        Ok(newly_completed) => Json(UpdateResponse {
            success: true,
            failure_reason: String::new(),
            updated: newly_completed,
        }),
        Err(e) => {
            tracing::error!("CompleteTask failed for {}: {}", req.user_id, e);
            Json(UpdateResponse {
                success: false,
                failure_reason: e.to_string(),
                updated: false,
            })
        }
    }
}

async fn get_xp_history(
    State(state): State<ApiState>,
    Json(req): Json<HistoryRequest>,
) -> Json<XpHistoryResponse> {
    let limit = req.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
    match state.engine.get_xp_history(&req.user_id, limit).await {
        Ok(transactions) => Json(XpHistoryResponse {
            success: true,
            failure_reason: String::new(),
            transactions,
        }),
        Err(e) => {
            tracing::error!("GetXpHistory failed for {}: {}", req.user_id, e);
            Json(XpHistoryResponse {
                success: false,
                failure_reason: e.to_string(),
                transactions: Vec::new(),
            })
        }
    }
}

async fn get_level_up_history(
    State(state): State<ApiState>,
    Json(req): Json<HistoryRequest>,
) -> Json<LevelUpHistoryResponse> {
    let limit = req.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
    match state.engine.get_level_up_history(&req.user_id, limit).await {
        Ok(level_ups) => Json(LevelUpHistoryResponse {
            success: true,
            failure_reason: String::new(),
            level_ups,
        }),
        Err(e) => {
            tracing::error!("GetLevelUpHistory failed for {}: {}", req.user_id, e);
            Json(LevelUpHistoryResponse {
                success: false,
                failure_reason: e.to_string(),
                level_ups: Vec::new(),
            })
        }
    }
}
