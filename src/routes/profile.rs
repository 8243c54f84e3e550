use axum::extract::State;
use axum::Json;
use serde_json::json;

use crate::middleware::auth::CurrentUser;
use crate::models::user::{ChangePasswordRequest, TwoFactorCodeRequest, UpdateProfileRequest};
use crate::routes::{map_auth_err, ApiResult};
use crate::services::auth::AuthService;
use crate::AppState;

pub async fn get_profile(current: CurrentUser) -> ApiResult {
    Ok(Json(json!({ "success": true, "user": current.user.summary() })))
}

pub async fn update_profile(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(req): Json<UpdateProfileRequest>,
) -> ApiResult {
    let (updated, verify_code) = AuthService::update_profile(&state.db, &current.user, &req)
        .await
        .map_err(map_auth_err)?;
    // An email change requires re-verification.
    if let Some(code) = verify_code {
        if let Some(mailer) = &state.email {
            if let Err(e) = mailer.send_verification_email(&updated.email, &code).await {
                tracing::warn!("Verification email failed: {e}");
            }
        } else {
            tracing::info!(email = %updated.email, "Email disabled, verification code: {code}");
        }
    }
    Ok(Json(json!({ "success": true, "user": updated.summary() })))
}

pub async fn change_password(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(req): Json<ChangePasswordRequest>,
) -> ApiResult {
    AuthService::change_password(&state.db, &current.user, &req)
        .await
        .map_err(map_auth_err)?;
    Ok(Json(json!({ "success": true, "message": "Password changed" })))
}

pub async fn two_factor_setup(
    State(state): State<AppState>,
    current: CurrentUser,
) -> ApiResult {
    let (url, qr) = AuthService::totp_setup(&state.db, &current.user, &state.config.totp_issuer)
        .await
        .map_err(map_auth_err)?;
    Ok(Json(json!({ "success": true, "otpauth_url": url, "qr_code": qr })))
}

pub async fn two_factor_enable(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(req): Json<TwoFactorCodeRequest>,
) -> ApiResult {
    AuthService::totp_enable(&state.db, &current.user, &req.code)
        .await
        .map_err(map_auth_err)?;
    Ok(Json(json!({ "success": true, "message": "Two-factor authentication enabled" })))
}

pub async fn two_factor_disable(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(req): Json<TwoFactorCodeRequest>,
) -> ApiResult {
    AuthService::totp_disable(&state.db, &current.user, &req.code)
        .await
        .map_err(map_auth_err)?;
    Ok(Json(json!({ "success": true, "message": "Two-factor authentication disabled" })))
}
