use axum::extract::State;
use axum::http::header::SET_COOKIE;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{AppendHeaders, IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};

use crate::middleware::auth::{extract_token, get_cookie, CurrentUser};
use crate::models::auth::TokenKind;
use crate::models::user::{
    ForgotPasswordRequest, LoginRequest, LoginTwoFactorRequest, RegisterRequest,
    ResendVerificationRequest, ResetPasswordRequest, User, VerifyEmailRequest,
    VerifyResetCodeRequest,
};
use crate::routes::{failure, internal, map_auth_err, ApiError, ApiResult};
use crate::services::auth::{AuthService, LoginOutcome};
use crate::services::tokens::{ACCESS_TTL_SECS, REFRESH_TTL_SECS};
use crate::AppState;

fn session_cookie(name: &str, value: &str, max_age: i64) -> String {
    format!("{name}={value}; Path=/; HttpOnly; Max-Age={max_age}; SameSite=Lax")
}

fn clear_cookie(name: &str) -> String {
    session_cookie(name, "", 0)
}

fn issue_session(state: &AppState, user: &User) -> Result<(String, String), ApiError> {
    let access = state
        .tokens
        .issue_access(user.id, user.role())
        .map_err(internal)?;
    let refresh = state
        .tokens
        .issue_refresh(user.id, user.role())
        .map_err(internal)?;
    Ok((access, refresh))
}

fn session_response(state: &AppState, user: &User) -> Result<Response, ApiError> {
    let (access, refresh) = issue_session(state, user)?;
    let headers = AppendHeaders([
        (SET_COOKIE, session_cookie("access_token", &access, ACCESS_TTL_SECS)),
        (SET_COOKIE, session_cookie("refresh_token", &refresh, REFRESH_TTL_SECS)),
    ]);
    let body = Json(json!({
        "success": true,
        "access_token": access,
        "refresh_token": refresh,
        "user": user.summary(),
    }));
    Ok((headers, body).into_response())
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let (user, token) = AuthService::register(&state.db, &req)
        .await
        .map_err(map_auth_err)?;

    if let Some(mailer) = &state.email {
        if let Err(e) = mailer.send_verification_email(&user.email, &token).await {
            tracing::warn!("Verification email failed: {e}");
        }
    } else {
        tracing::info!(email = %user.email, "Email disabled, verification code: {token}");
    }

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "message": "Registration successful, please verify your email",
            "user": user.summary(),
        })),
    ))
}

pub async fn verify_email(
    State(state): State<AppState>,
    Json(req): Json<VerifyEmailRequest>,
) -> ApiResult {
    AuthService::verify_email(&state.db, &req.email, &req.token)
        .await
        .map_err(map_auth_err)?;
    Ok(Json(json!({ "success": true, "message": "Email verified" })))
}

pub async fn resend_verification(
    State(state): State<AppState>,
    Json(req): Json<ResendVerificationRequest>,
) -> ApiResult {
    let (user, token) = AuthService::resend_verification(&state.db, &req.email)
        .await
        .map_err(map_auth_err)?;
    if let Some(mailer) = &state.email {
        if let Err(e) = mailer.send_verification_email(&user.email, &token).await {
            tracing::warn!("Verification email failed: {e}");
        }
    }
    Ok(Json(json!({ "success": true, "message": "Verification code sent" })))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Response, ApiError> {
    match AuthService::login(&state.db, &req).await.map_err(map_auth_err)? {
        LoginOutcome::TwoFactorRequired { user_id } => Ok(Json(json!({
            "success": true,
            "two_factor_required": true,
            "user_id": user_id,
        }))
        .into_response()),
        LoginOutcome::Success(user) => session_response(&state, &user),
    }
}

pub async fn login_two_factor(
    State(state): State<AppState>,
    Json(req): Json<LoginTwoFactorRequest>,
) -> Result<Response, ApiError> {
    let user = AuthService::login_two_factor(&state.db, req.user_id, &req.code)
        .await
        .map_err(map_auth_err)?;
    session_response(&state, &user)
}

/// Exchanges a valid refresh token (cookie or bearer) for a fresh access
/// token cookie.
pub async fn refresh_token(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let raw = get_cookie(&headers, "refresh_token")
        .or_else(|| extract_token(&headers))
        .ok_or_else(|| failure(StatusCode::UNAUTHORIZED, "Refresh token required"))?;

    let claims = state
        .tokens
        .verify(&raw)
        .map_err(|e| failure(StatusCode::UNAUTHORIZED, e.to_string()))?;
    if claims.kind != TokenKind::Refresh {
        return Err(failure(StatusCode::UNAUTHORIZED, "Not a refresh token"));
    }

    let user = AuthService::find_by_id(&state.db, claims.sub)
        .await
        .map_err(map_auth_err)?
        .ok_or_else(|| failure(StatusCode::UNAUTHORIZED, "Account no longer exists"))?;

    let access = state
        .tokens
        .issue_access(user.id, user.role())
        .map_err(internal)?;
    let headers = AppendHeaders([(
        SET_COOKIE,
        session_cookie("access_token", &access, ACCESS_TTL_SECS),
    )]);
    let body = Json(json!({ "success": true, "access_token": access }));
    Ok((headers, body).into_response())
}

/// Revokes every credential the request carries and clears both cookies.
pub async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
    current: CurrentUser,
) -> Result<Response, ApiError> {
    state.tokens.revoke(&current.raw_token);
    if let Some(token) = get_cookie(&headers, "access_token") {
        state.tokens.revoke(&token);
    }
    if let Some(token) = get_cookie(&headers, "refresh_token") {
        state.tokens.revoke(&token);
    }

    let headers = AppendHeaders([
        (SET_COOKIE, clear_cookie("access_token")),
        (SET_COOKIE, clear_cookie("refresh_token")),
    ]);
    let body = Json(json!({ "success": true, "message": "Logged out" }));
    Ok((headers, body).into_response())
}

pub async fn forgot_password(
    State(state): State<AppState>,
    Json(req): Json<ForgotPasswordRequest>,
) -> ApiResult {
    // Uniform answer regardless of account existence.
    if let Some((user, code)) = AuthService::forgot_password(&state.db, &req.email)
        .await
        .map_err(map_auth_err)?
    {
        if let Some(mailer) = &state.email {
            if let Err(e) = mailer.send_password_reset_email(&user.email, &code).await {
                tracing::warn!("Password reset email failed: {e}");
            }
        } else {
            tracing::info!(email = %user.email, "Email disabled, reset code: {code}");
        }
    }
    Ok(Json(json!({
        "success": true,
        "message": "If the account exists, a reset code has been sent",
    })))
}

pub async fn verify_reset_code(
    State(state): State<AppState>,
    Json(req): Json<VerifyResetCodeRequest>,
) -> ApiResult {
    let token = AuthService::verify_reset_code(&state.db, &req.email, &req.code)
        .await
        .map_err(map_auth_err)?;
    Ok(Json(json!({ "success": true, "reset_token": token })))
}

pub async fn reset_password(
    State(state): State<AppState>,
    Json(req): Json<ResetPasswordRequest>,
) -> ApiResult {
    AuthService::reset_password(&state.db, &req.token, &req.new_password)
        .await
        .map_err(map_auth_err)?;
    Ok(Json(json!({ "success": true, "message": "Password has been reset" })))
}
