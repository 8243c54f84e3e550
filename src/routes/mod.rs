use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};

use crate::services::auth::AuthError;

pub mod admin;
pub mod attributes;
pub mod auth;
pub mod health;
pub mod knowledge;
pub mod notifications;
pub mod profile;
pub mod tickets;

pub type ApiError = (StatusCode, Json<Value>);
pub type ApiResult<T = Json<Value>> = Result<T, ApiError>;

pub fn failure(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(json!({ "success": false, "message": message.into() })),
    )
}

pub fn internal(e: impl std::fmt::Display) -> ApiError {
    tracing::error!("Request failed: {e}");
    failure(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
}

pub fn map_auth_err(e: AuthError) -> ApiError {
    let status = match &e {
        AuthError::Invalid(_) => StatusCode::BAD_REQUEST,
        AuthError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        AuthError::NotFound(_) => StatusCode::NOT_FOUND,
        AuthError::Conflict(_) => StatusCode::CONFLICT,
        AuthError::Db(err) => return internal(err),
        AuthError::Internal(err) => return internal(err),
    };
    failure(status, e.to_string())
}
