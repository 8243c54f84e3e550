use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::{header, HeaderMap, StatusCode};
use axum::Json;
use serde_json::{json, Value};

use crate::models::auth::Claims;
use crate::models::user::User;
use crate::services::auth::AuthService;
use crate::AppState;

/// Reads a cookie value from the Cookie header, if present.
pub fn get_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    let raw = headers.get(header::COOKIE)?.to_str().ok()?;
    for pair in raw.split(';') {
        let Some((k, v)) = pair.trim().split_once('=') else {
            continue;
        };
        if k == name {
            return Some(v.to_owned());
        }
    }
    None
}

/// Pulls the bearer token from the Authorization header, falling back to the
/// access_token and then refresh_token cookies.
pub fn extract_token(headers: &HeaderMap) -> Option<String> {
    if let Some(value) = headers.get(header::AUTHORIZATION) {
        if let Ok(value) = value.to_str() {
            if let Some(token) = value.strip_prefix("Bearer ") {
                if !token.is_empty() {
                    return Some(token.to_owned());
                }
            }
        }
    }
    get_cookie(headers, "access_token").or_else(|| get_cookie(headers, "refresh_token"))
}

fn unauthorized(message: &str) -> (StatusCode, Json<Value>) {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "success": false, "message": message })),
    )
}

/// Authenticated caller: verified token plus the matching user row.
pub struct CurrentUser {
    pub user: User,
    pub claims: Claims,
    pub raw_token: String,
}

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = (StatusCode, Json<Value>);

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let raw_token = extract_token(&parts.headers)
            .ok_or_else(|| unauthorized("Authentication required"))?;

        let claims = state
            .tokens
            .verify(&raw_token)
            .map_err(|e| unauthorized(&e.to_string()))?;

        let user = AuthService::find_by_id(&state.db, claims.sub)
            .await
            .map_err(|e| {
                tracing::error!("User lookup failed: {e}");
                unauthorized("Authentication required")
            })?
            .ok_or_else(|| unauthorized("Account no longer exists"))?;

        Ok(CurrentUser {
            user,
            claims,
            raw_token,
        })
    }
}

/// Caller with the staff or admin role.
pub struct StaffUser(pub CurrentUser);

impl FromRequestParts<AppState> for StaffUser {
    type Rejection = (StatusCode, Json<Value>);

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let current = CurrentUser::from_request_parts(parts, state).await?;
        if !current.user.role().is_staff() {
            return Err((
                StatusCode::FORBIDDEN,
                Json(json!({ "success": false, "message": "Staff access required" })),
            ));
        }
        Ok(StaffUser(current))
    }
}

/// Caller with the admin role.
pub struct AdminUser(pub CurrentUser);

impl FromRequestParts<AppState> for AdminUser {
    type Rejection = (StatusCode, Json<Value>);

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let current = CurrentUser::from_request_parts(parts, state).await?;
        if current.user.role() != crate::models::user::UserRole::Admin {
            return Err((
                StatusCode::FORBIDDEN,
                Json(json!({ "success": false, "message": "Admin access required" })),
            ));
        }
        Ok(AdminUser(current))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn cookie_parsing_handles_multiple_pairs() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("a=1; access_token=abc.def.ghi; b=2"),
        );
        assert_eq!(get_cookie(&headers, "access_token").as_deref(), Some("abc.def.ghi"));
        assert_eq!(get_cookie(&headers, "b").as_deref(), Some("2"));
        assert_eq!(get_cookie(&headers, "missing"), None);
    }

    #[test]
    fn bearer_header_wins_over_cookies() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Bearer header-token"),
        );
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("access_token=cookie-token"),
        );
        assert_eq!(extract_token(&headers).as_deref(), Some("header-token"));
    }

    #[test]
    fn refresh_cookie_is_last_resort() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("refresh_token=refresh-only"),
        );
        assert_eq!(extract_token(&headers).as_deref(), Some("refresh-only"));
    }
}
