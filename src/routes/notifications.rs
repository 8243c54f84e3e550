use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde_json::json;

use crate::middleware::auth::CurrentUser;
use crate::routes::{failure, internal, ApiResult};
use crate::services::notifications::NotificationService;
use crate::services::stats::StatsService;
use crate::AppState;

pub async fn list_notifications(
    State(state): State<AppState>,
    current: CurrentUser,
) -> ApiResult {
    let notifications = NotificationService::list(&state.db, current.user.id)
        .await
        .map_err(internal)?;
    Ok(Json(json!({ "success": true, "notifications": notifications })))
}

pub async fn mark_read(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<i64>,
) -> ApiResult {
    let updated = NotificationService::mark_read(&state.db, id, current.user.id)
        .await
        .map_err(internal)?;
    if !updated {
        return Err(failure(StatusCode::NOT_FOUND, "Notification not found"));
    }
    Ok(Json(json!({ "success": true, "message": "Notification marked as read" })))
}

pub async fn mark_all_read(
    State(state): State<AppState>,
    current: CurrentUser,
) -> ApiResult {
    let updated = NotificationService::mark_all_read(&state.db, current.user.id)
        .await
        .map_err(internal)?;
    Ok(Json(json!({ "success": true, "updated": updated })))
}

/// The caller's own ticket counts, for the user dashboard.
pub async fn user_dashboard(
    State(state): State<AppState>,
    current: CurrentUser,
) -> ApiResult {
    let stats = StatsService::user_dashboard(&state.db, current.user.id)
        .await
        .map_err(internal)?;
    Ok(Json(json!({ "success": true, "stats": stats })))
}
